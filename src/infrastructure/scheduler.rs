//! Playlist Scheduler
//!
//! Drives a [`PlaybackEngine`] in real time. The engine decides what plays
//! next; this module turns its steps into sink executions and single-shot
//! advance timers, and publishes [`PlaybackEvent`]s.
//!
//! All state lives behind one lock that acts as the control context.
//! Executions and timers run as separate tasks and only touch state by
//! re-entering through that lock with the epoch they were started for.

use crate::domain::models::{PlaybackEvent, PlaybackStatus};
use crate::domain::playback::{Dispatch, PlaybackEngine, Step, Timing};
use crate::domain::playlist::{Playlist, PlaylistItem};
use crate::domain::presets::PresetCatalog;
use crate::error::PlaybackError;
use crate::infrastructure::sink::{ExecutionOutcome, ExecutionSink, ResolvedItem};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument, Span};

/// Answers whether the panel is connected; playback refuses to start otherwise
pub trait ConnectionGate: Send + Sync {
    fn is_connected(&self) -> bool;
}

struct Runtime {
    engine: PlaybackEngine,
    pending_timer: Option<AbortHandle>,
    gate: Option<Arc<dyn ConnectionGate>>,
    listeners: Vec<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl Runtime {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn publish(&mut self) {
        for event in self.engine.take_events() {
            self.emit(event);
        }
    }
}

struct Shared {
    catalog: Arc<dyn PresetCatalog>,
    sink: Arc<dyn ExecutionSink>,
    span: Span,
    runtime: Mutex<Runtime>,
}

/// Loops a playlist on the panel. Cheap to clone.
#[derive(Clone)]
pub struct PlaylistScheduler {
    shared: Arc<Shared>,
}

impl PlaylistScheduler {
    pub fn new(catalog: Arc<dyn PresetCatalog>, sink: Arc<dyn ExecutionSink>) -> Self {
        Self::with_span(catalog, sink, tracing::info_span!("scheduler"))
    }

    pub fn with_span(catalog: Arc<dyn PresetCatalog>, sink: Arc<dyn ExecutionSink>, span: Span) -> Self {
        Self::build(catalog, sink, Playlist::default(), span)
    }

    /// Start from `playlist`. Items added later are clamped to its minimum
    /// duration.
    pub fn with_playlist(
        catalog: Arc<dyn PresetCatalog>,
        sink: Arc<dyn ExecutionSink>,
        playlist: Playlist,
    ) -> Self {
        Self::build(catalog, sink, playlist, tracing::info_span!("scheduler"))
    }

    fn build(
        catalog: Arc<dyn PresetCatalog>,
        sink: Arc<dyn ExecutionSink>,
        playlist: Playlist,
        span: Span,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                catalog,
                sink,
                span,
                runtime: Mutex::new(Runtime {
                    engine: PlaybackEngine::new(playlist),
                    pending_timer: None,
                    gate: None,
                    listeners: Vec::new(),
                }),
            }),
        }
    }

    /// Require `gate` to report connected before `start()` succeeds
    pub fn set_gate(&self, gate: Arc<dyn ConnectionGate>) {
        self.shared.runtime.lock().gate = Some(gate);
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.runtime.lock().listeners.push(tx);
        rx
    }

    pub fn status(&self) -> PlaybackStatus {
        self.shared.runtime.lock().engine.status()
    }

    pub fn playlist(&self) -> Playlist {
        self.shared.runtime.lock().engine.playlist().clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.runtime.lock().engine.is_running()
    }

    /// Replace the items. Stop first when replacing during playback.
    pub fn set_playlist(&self, items: Vec<PlaylistItem>) {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        if rt.engine.is_running() {
            warn!("Playlist replaced while playing");
        }
        rt.engine.set_playlist(items);
    }

    pub fn add_item(&self, preset_reference: impl Into<String>, duration: f64, use_dynamic_duration: bool) {
        let _enter = self.shared.span.enter();
        self.shared
            .runtime
            .lock()
            .engine
            .add_item(preset_reference, duration, use_dynamic_duration);
    }

    /// Out-of-range indices are ignored. Emptying a running playlist stops it.
    pub fn remove_item(&self, index: usize) -> bool {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        let removed = rt.engine.remove_item(index);
        if !rt.engine.is_running() {
            rt.cancel_timer();
        }
        rt.publish();
        removed
    }

    pub fn move_item(&self, index: usize, direction: i32) -> bool {
        self.shared.runtime.lock().engine.move_item(index, direction)
    }

    pub fn clear(&self) {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        rt.cancel_timer();
        rt.engine.clear();
        rt.publish();
    }

    /// Start from the first item, or resume if paused.
    ///
    /// The first item is dispatched immediately.
    pub fn start(&self) -> Result<(), PlaybackError> {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();

        if let Some(gate) = &rt.gate {
            if !gate.is_connected() {
                warn!("Cannot start playlist: not connected");
                return Err(PlaybackError::NotConnected);
            }
        }

        let step = rt.engine.start(self.shared.catalog.as_ref())?;
        self.apply(&mut rt, step);
        rt.publish();
        Ok(())
    }

    /// Returns whether playback was playing
    pub fn pause(&self) -> bool {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        let paused = rt.engine.pause();
        if paused {
            rt.cancel_timer();
        }
        rt.publish();
        paused
    }

    /// Re-dispatch the current item with its full duration.
    /// Returns whether playback was paused.
    pub fn resume(&self) -> bool {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        if !rt.engine.is_paused() {
            return false;
        }
        let step = rt.engine.resume(self.shared.catalog.as_ref());
        self.apply(&mut rt, step);
        rt.publish();
        true
    }

    /// Returns whether playback was running
    pub fn stop(&self) -> bool {
        let _enter = self.shared.span.enter();
        let mut rt = self.shared.runtime.lock();
        rt.cancel_timer();
        let stopped = rt.engine.stop();
        rt.publish();
        stopped
    }

    fn apply(&self, rt: &mut Runtime, step: Step) {
        rt.cancel_timer();
        match step {
            Step::Idle => {}
            Step::Retry { epoch, after } => self.arm_timer(rt, epoch, Instant::now() + after),
            Step::Dispatch(dispatch) => self.dispatch(rt, dispatch),
        }
    }

    fn dispatch(&self, rt: &mut Runtime, dispatch: Dispatch) {
        let Dispatch {
            epoch,
            index,
            item,
            preset,
            timing,
        } = dispatch;

        // A dynamic item advances after its stored duration unless the sink
        // reports one in time.
        let dispatched_at = Instant::now();
        self.arm_timer(rt, epoch, dispatched_at + timing.resolve(None));

        let resolved = ResolvedItem {
            preset,
            playlist_index: Some(index),
            use_dynamic_duration: item.use_dynamic_duration,
        };
        let sink = Arc::clone(&self.shared.sink);
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(
            async move {
                let outcome = sink.execute(resolved).await;
                if let Some(scheduler) = upgrade(&weak) {
                    scheduler.execution_finished(epoch, index, timing, dispatched_at, outcome);
                }
            }
            .instrument(self.shared.span.clone()),
        );
    }

    fn arm_timer(&self, rt: &mut Runtime, epoch: u64, deadline: Instant) {
        rt.cancel_timer();
        let weak = Arc::downgrade(&self.shared);
        let task = tokio::spawn(
            async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(scheduler) = upgrade(&weak) {
                    scheduler.timer_fired(epoch);
                }
            }
            .instrument(self.shared.span.clone()),
        );
        rt.pending_timer = Some(task.abort_handle());
        let delay = deadline.saturating_duration_since(Instant::now());
        debug!(epoch, ?delay, "Advance timer armed");
    }

    fn timer_fired(&self, epoch: u64) {
        let mut rt = self.shared.runtime.lock();
        if !rt.engine.is_live(epoch) {
            debug!(epoch, "Stale advance timer ignored");
            return;
        }
        rt.pending_timer = None;
        let step = rt.engine.timer_fired(epoch, self.shared.catalog.as_ref());
        self.apply(&mut rt, step);
        rt.publish();
    }

    fn execution_finished(
        &self,
        epoch: u64,
        index: usize,
        timing: Timing,
        dispatched_at: Instant,
        outcome: ExecutionOutcome,
    ) {
        let mut rt = self.shared.runtime.lock();

        if !outcome.ok {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            warn!("Execution of item {} failed: {}", index, error);
            rt.emit(PlaybackEvent::ExecutionFailed { index, error });
        }

        let Timing::Reported { .. } = timing else {
            return;
        };
        let Some(reported) = outcome.reported() else {
            return;
        };
        if rt.engine.is_live(epoch) {
            let deadline = dispatched_at + timing.resolve(Some(reported));
            self.arm_timer(&mut rt, epoch, deadline);
        } else {
            debug!(epoch, "Duration report for a superseded item ignored");
        }
    }
}

fn upgrade(weak: &Weak<Shared>) -> Option<PlaylistScheduler> {
    weak.upgrade().map(|shared| PlaylistScheduler { shared })
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.runtime.get_mut().cancel_timer();
    }
}
