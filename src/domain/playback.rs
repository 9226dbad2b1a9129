//! Playlist playback state machine.
//!
//! The engine knows nothing about timers or threads. Every operation
//! returns a [`Step`] telling the driver what to do next (dispatch an item,
//! arm a retry timer, or nothing) and queues [`PlaybackEvent`]s for it to
//! publish. Each dispatch opens a new epoch; timer firings and duration
//! reports carrying an older epoch are stale and ignored.

use crate::domain::models::{PlaybackEvent, PlaybackStatus};
use crate::domain::playlist::{Playlist, PlaylistItem};
use crate::domain::presets::{Preset, PresetCatalog};
use crate::error::PlaybackError;
use std::time::Duration;

/// How long to wait before advancing past a dispatched item
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timing {
    /// Advance after the stored duration
    Fixed(Duration),
    /// Advance after `fallback` unless the sink reports a duration first
    Reported { fallback: Duration },
}

impl Timing {
    pub fn resolve(&self, reported: Option<Duration>) -> Duration {
        match *self {
            Timing::Fixed(delay) => delay,
            Timing::Reported { fallback } => reported
                .filter(|d| !d.is_zero())
                .unwrap_or(fallback),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub epoch: u64,
    pub index: usize,
    pub item: PlaylistItem,
    pub preset: Preset,
    pub timing: Timing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Dispatch(Dispatch),
    /// Nothing resolvable; try advancing again after `after`
    Retry { epoch: u64, after: Duration },
    Idle,
}

#[derive(Debug, Default)]
pub struct PlaybackEngine {
    playlist: Playlist,
    running: bool,
    paused: bool,
    current_index: Option<usize>,
    epoch: u64,
    events: Vec<PlaybackEvent>,
}

impl PlaybackEngine {
    pub fn new(playlist: Playlist) -> Self {
        Self {
            playlist,
            ..Default::default()
        }
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether work tagged with `epoch` may still schedule an advance
    pub fn is_live(&self, epoch: u64) -> bool {
        self.running && !self.paused && epoch == self.epoch
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            running: self.running,
            paused: self.paused,
            current_index: self.current_index,
            len: self.playlist.len(),
            current_preset: self
                .current_index
                .and_then(|i| self.playlist.get(i))
                .map(|item| item.preset_reference.clone()),
        }
    }

    pub fn take_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Replace the items. Does not stop playback; callers stop first.
    pub fn set_playlist(&mut self, items: Vec<PlaylistItem>) {
        self.playlist.replace(items);
        self.current_index = None;
        tracing::debug!("Playlist set with {} items", self.playlist.len());
    }

    pub fn add_item(&mut self, preset_reference: impl Into<String>, duration: f64, use_dynamic_duration: bool) {
        self.playlist
            .add_item(preset_reference, duration, use_dynamic_duration);
    }

    pub fn remove_item(&mut self, index: usize) -> bool {
        let removed = self.playlist.remove_item(index);
        if removed && self.playlist.is_empty() {
            self.stop();
        }
        removed
    }

    pub fn move_item(&mut self, index: usize, direction: i32) -> bool {
        self.playlist.move_item(index, direction)
    }

    pub fn clear(&mut self) {
        self.stop();
        self.playlist.clear();
        tracing::debug!("Playlist cleared");
    }

    /// Begin at the first item, or resume if paused
    pub fn start(&mut self, catalog: &dyn PresetCatalog) -> Result<Step, PlaybackError> {
        if self.running && self.paused {
            return Ok(self.resume(catalog));
        }
        if self.playlist.is_empty() {
            tracing::warn!("Attempted to start empty playlist");
            return Err(PlaybackError::EmptyPlaylist);
        }

        self.running = true;
        self.paused = false;
        self.current_index = Some(0);
        self.events.push(PlaybackEvent::Started);
        tracing::info!("Playlist started");
        Ok(self.dispatch_from(0, catalog))
    }

    /// Halt the current item. Its remaining time is not kept.
    pub fn pause(&mut self) -> bool {
        if !self.running || self.paused {
            return false;
        }
        self.paused = true;
        self.epoch += 1;
        let index = self.current_index.unwrap_or(0);
        self.events.push(PlaybackEvent::Paused { index });
        tracing::info!("Playlist paused at item {}", index);
        true
    }

    /// Re-dispatch the current item with its full duration
    pub fn resume(&mut self, catalog: &dyn PresetCatalog) -> Step {
        if !self.running || !self.paused {
            return Step::Idle;
        }
        self.paused = false;
        let index = self.current_index.unwrap_or(0);
        self.events.push(PlaybackEvent::Resumed { index });
        tracing::info!("Playlist resumed at item {}", index);
        self.dispatch_from(index, catalog)
    }

    /// Returns whether playback was running
    pub fn stop(&mut self) -> bool {
        let was_running = self.running;
        self.running = false;
        self.paused = false;
        self.current_index = None;
        self.epoch += 1;
        if was_running {
            self.events.push(PlaybackEvent::Stopped);
            tracing::info!("Playlist stopped");
        }
        was_running
    }

    /// Move to the next item, wrapping to the start
    pub fn advance(&mut self, catalog: &dyn PresetCatalog) -> Step {
        if !self.running || self.paused || self.playlist.is_empty() {
            return Step::Idle;
        }
        let next = match self.current_index {
            Some(i) if i + 1 < self.playlist.len() => i + 1,
            _ => 0,
        };
        self.dispatch_from(next, catalog)
    }

    /// Advance if the timer for `epoch` is still the live one
    pub fn timer_fired(&mut self, epoch: u64, catalog: &dyn PresetCatalog) -> Step {
        if !self.is_live(epoch) {
            tracing::debug!(epoch, current = self.epoch, "Ignoring stale timer");
            return Step::Idle;
        }
        self.advance(catalog)
    }

    /// Dispatch the first resolvable item at or after `start`, trying each
    /// item at most once
    fn dispatch_from(&mut self, start: usize, catalog: &dyn PresetCatalog) -> Step {
        let len = self.playlist.len();
        if len == 0 {
            return Step::Idle;
        }
        let start = start % len;

        for offset in 0..len {
            let index = (start + offset) % len;
            let Some(item) = self.playlist.get(index).cloned() else {
                continue;
            };

            match catalog.resolve(&item.preset_reference) {
                Some(preset) => {
                    self.current_index = Some(index);
                    self.epoch += 1;

                    let display = item.display_time();
                    let timing = if item.use_dynamic_duration && preset.reports_own_duration() {
                        Timing::Reported { fallback: display }
                    } else {
                        Timing::Fixed(display)
                    };

                    tracing::info!(
                        "Playing '{}' ({}/{})",
                        item.preset_reference,
                        index + 1,
                        len
                    );
                    self.events.push(PlaybackEvent::Dispatched {
                        index,
                        preset_name: item.preset_reference.clone(),
                    });

                    return Step::Dispatch(Dispatch {
                        epoch: self.epoch,
                        index,
                        item,
                        preset,
                        timing,
                    });
                }
                None => {
                    tracing::warn!("Preset '{}' not found, skipping", item.preset_reference);
                    self.events.push(PlaybackEvent::Skipped {
                        index,
                        preset_name: item.preset_reference,
                    });
                }
            }
        }

        let retry_after = self
            .playlist
            .get(start)
            .map(PlaylistItem::display_time)
            .unwrap_or_default();
        self.current_index = Some(start);
        self.epoch += 1;
        tracing::error!(
            "No preset in the playlist resolves; retrying in {:?}",
            retry_after
        );
        self.events.push(PlaybackEvent::Stalled { retry_after });
        Step::Retry {
            epoch: self.epoch,
            after: retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::presets::{PresetKind, PresetLibrary};

    fn catalog(names: &[&str]) -> PresetLibrary {
        PresetLibrary::new(
            names
                .iter()
                .map(|n| Preset::new(*n, PresetKind::Text))
                .collect(),
        )
    }

    fn engine(items: &[(&str, f64)]) -> PlaybackEngine {
        let mut engine = PlaybackEngine::default();
        for (name, duration) in items {
            engine.add_item(*name, *duration, false);
        }
        engine
    }

    fn dispatched(step: Step) -> Dispatch {
        match step {
            Step::Dispatch(d) => d,
            other => panic!("expected dispatch, got {other:?}"),
        }
    }

    #[test]
    fn test_start_empty_fails() {
        let mut engine = PlaybackEngine::default();
        assert_eq!(
            engine.start(&catalog(&[])),
            Err(PlaybackError::EmptyPlaylist)
        );
        assert!(!engine.is_running());
    }

    #[test]
    fn test_start_dispatches_first_item_immediately() {
        let cat = catalog(&["A", "B"]);
        let mut engine = engine(&[("A", 5.0), ("B", 10.0)]);

        let d = dispatched(engine.start(&cat).unwrap());
        assert_eq!(d.index, 0);
        assert_eq!(d.preset.name, "A");
        assert_eq!(d.timing, Timing::Fixed(Duration::from_secs(5)));
        assert!(engine.is_running());
        assert_eq!(engine.current_index(), Some(0));
        assert_eq!(
            engine.take_events(),
            [
                PlaybackEvent::Started,
                PlaybackEvent::Dispatched {
                    index: 0,
                    preset_name: "A".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_advance_wraps_around() {
        let cat = catalog(&["A", "B", "C"]);
        let mut engine = engine(&[("A", 1.0), ("B", 1.0), ("C", 1.0)]);
        engine.start(&cat).unwrap();

        let indices: Vec<usize> = (0..3).map(|_| dispatched(engine.advance(&cat)).index).collect();
        assert_eq!(indices, [1, 2, 0]);
        assert_eq!(engine.current_index(), Some(0));
    }

    #[test]
    fn test_stale_references_are_skipped() {
        let cat = catalog(&["A", "C"]);
        let mut engine = engine(&[("A", 1.0), ("missing", 1.0), ("C", 1.0)]);
        engine.start(&cat).unwrap();
        engine.take_events();

        let d = dispatched(engine.advance(&cat));
        assert_eq!(d.index, 2);
        assert_eq!(
            engine.take_events()[0],
            PlaybackEvent::Skipped {
                index: 1,
                preset_name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_all_stale_terminates_without_dispatch() {
        let cat = catalog(&[]);
        let mut engine = engine(&[("x", 3.0), ("y", 1.0), ("z", 1.0)]);

        let step = engine.start(&cat).unwrap();
        assert!(matches!(step, Step::Retry { after, .. } if after == Duration::from_secs(3)));

        let events = engine.take_events();
        let skips = events
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::Skipped { .. }))
            .count();
        assert_eq!(skips, 3);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Dispatched { .. })));

        // the retry timer advances and stalls again, still bounded
        let Step::Retry { epoch, .. } = engine.advance(&cat) else {
            panic!("expected retry");
        };
        assert!(engine.is_live(epoch));
        assert_eq!(
            engine
                .take_events()
                .iter()
                .filter(|e| matches!(e, PlaybackEvent::Skipped { .. }))
                .count(),
            3
        );
    }

    #[test]
    fn test_pause_resume_keeps_index() {
        let cat = catalog(&["A", "B", "C"]);
        let mut engine = engine(&[("A", 1.0), ("B", 7.0), ("C", 1.0)]);
        engine.start(&cat).unwrap();
        let before = dispatched(engine.advance(&cat));

        assert!(engine.pause());
        assert!(!engine.pause());
        assert!(!engine.is_live(before.epoch));
        assert_eq!(engine.advance(&cat), Step::Idle);

        let after = dispatched(engine.resume(&cat));
        assert_eq!(after.index, before.index);
        assert_eq!(after.timing, Timing::Fixed(Duration::from_secs(7)));
        assert!(after.epoch > before.epoch);
    }

    #[test]
    fn test_start_while_paused_resumes() {
        let cat = catalog(&["A", "B"]);
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        engine.start(&cat).unwrap();
        engine.advance(&cat);
        engine.pause();

        let d = dispatched(engine.start(&cat).unwrap());
        assert_eq!(d.index, 1);
        assert!(!engine.is_paused());
    }

    #[test]
    fn test_stop_is_idempotent_and_invalidates_timers() {
        let cat = catalog(&["A"]);
        let mut engine = engine(&[("A", 1.0)]);
        let d = dispatched(engine.start(&cat).unwrap());

        assert!(engine.stop());
        assert!(!engine.stop());
        assert_eq!(engine.current_index(), None);
        assert_eq!(engine.timer_fired(d.epoch, &cat), Step::Idle);
        assert_eq!(
            engine
                .take_events()
                .iter()
                .filter(|e| **e == PlaybackEvent::Stopped)
                .count(),
            1
        );
    }

    #[test]
    fn test_stale_epoch_timer_ignored() {
        let cat = catalog(&["A", "B"]);
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        let first = dispatched(engine.start(&cat).unwrap());
        let second = dispatched(engine.timer_fired(first.epoch, &cat));
        assert_eq!(second.index, 1);

        assert_eq!(engine.timer_fired(first.epoch, &cat), Step::Idle);
        assert_eq!(engine.current_index(), Some(1));
    }

    #[test]
    fn test_dynamic_timing_only_for_reporting_presets() {
        let cat = PresetLibrary::new(vec![
            Preset::new("Fire", PresetKind::Animation),
            Preset::new("Hello", PresetKind::Text),
        ]);
        let mut engine = PlaybackEngine::default();
        engine.add_item("Fire", 4.0, true);
        engine.add_item("Hello", 2.0, true);

        let fire = dispatched(engine.start(&cat).unwrap());
        assert_eq!(
            fire.timing,
            Timing::Reported {
                fallback: Duration::from_secs(4)
            }
        );
        let hello = dispatched(engine.advance(&cat));
        assert_eq!(hello.timing, Timing::Fixed(Duration::from_secs(2)));
    }

    #[test]
    fn test_reported_timing_falls_back() {
        let timing = Timing::Reported {
            fallback: Duration::from_secs(4),
        };
        assert_eq!(timing.resolve(None), Duration::from_secs(4));
        assert_eq!(timing.resolve(Some(Duration::ZERO)), Duration::from_secs(4));
        assert_eq!(
            timing.resolve(Some(Duration::from_secs(9))),
            Duration::from_secs(9)
        );
        assert_eq!(
            Timing::Fixed(Duration::from_secs(1)).resolve(Some(Duration::from_secs(9))),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_removing_last_item_stops() {
        let cat = catalog(&["A"]);
        let mut engine = engine(&[("A", 1.0)]);
        engine.start(&cat).unwrap();

        assert!(engine.remove_item(0));
        assert!(!engine.is_running());
        assert!(!engine.remove_item(0));
    }

    #[test]
    fn test_status_snapshot() {
        let cat = catalog(&["A", "B"]);
        let mut engine = engine(&[("A", 1.0), ("B", 1.0)]);
        assert_eq!(engine.status().current_preset, None);

        engine.start(&cat).unwrap();
        engine.advance(&cat);
        let status = engine.status();
        assert!(status.running);
        assert_eq!(status.len, 2);
        assert_eq!(status.current_index, Some(1));
        assert_eq!(status.current_preset.as_deref(), Some("B"));
    }
}
