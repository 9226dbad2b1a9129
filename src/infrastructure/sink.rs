//! Execution sink boundary: renders one resolved preset on the panel.

use crate::domain::presets::Preset;
use async_trait::async_trait;
use std::time::Duration;

/// A preset ready to be shown, with the playlist context it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub preset: Preset,
    /// Position in the playlist, `None` for a one-off execution
    pub playlist_index: Option<usize>,
    pub use_dynamic_duration: bool,
}

impl ResolvedItem {
    pub fn standalone(preset: Preset) -> Self {
        Self {
            preset,
            playlist_index: None,
            use_dynamic_duration: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutionOutcome {
    pub ok: bool,
    pub error: Option<String>,
    /// Seconds the content says it will run for (generated animations)
    pub reported_duration: Option<f64>,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            reported_duration: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.reported_duration = Some(seconds);
        self
    }

    /// The reported duration, if it is usable as a delay
    pub fn reported(&self) -> Option<Duration> {
        self.reported_duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// Renders items on the physical display.
///
/// May be slow; callers always run it off the control path.
#[async_trait]
pub trait ExecutionSink: Send + Sync + 'static {
    async fn execute(&self, item: ResolvedItem) -> ExecutionOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_ignores_unusable_values() {
        assert_eq!(ExecutionOutcome::success().reported(), None);
        assert_eq!(ExecutionOutcome::success().with_duration(0.0).reported(), None);
        assert_eq!(ExecutionOutcome::success().with_duration(-3.0).reported(), None);
        assert_eq!(
            ExecutionOutcome::success().with_duration(2.5).reported(),
            Some(Duration::from_millis(2500))
        );
    }
}
