//! Auto-refresh scheduling.
//!
//! A single task owns the countdown timer and the [`machine::Machine`];
//! ticks, manual controls and refresh completions all arrive on one queue
//! so a manual reset can never race an automatic fire.

pub mod engine;
pub mod history;
pub mod machine;

pub use self::engine::{spawn, RunOutcome, SchedulerError, SchedulerHandle};
pub use self::history::{HistoryEntry, RunStatus, Trigger};
pub use self::machine::Phase;

use anyhow::Result;
use serde::Serialize;

/// The work performed on every refresh cycle.
///
/// On success returns a short human-readable summary for the run history.
#[async_trait::async_trait]
pub trait RefreshAction: Send + Sync {
    async fn refresh(&self) -> Result<String>;
}

/// Read-only scheduler state for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: Phase,
    pub interval_secs: u64,
    pub time_left_secs: u64,
    pub is_active: bool,
    pub is_refreshing: bool,
    pub consecutive_failures: usize,
    pub last_run: Option<HistoryEntry>,
    pub recent_runs: Vec<HistoryEntry>,
}

impl SchedulerStatus {
    /// Countdown label: `M:SS`, or the current activity.
    pub fn display(&self) -> String {
        if !self.is_active {
            return "Auto-refresh disabled".to_string();
        }
        if self.is_refreshing {
            return "Refreshing...".to_string();
        }
        format!("{}:{:02}", self.time_left_secs / 60, self.time_left_secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(is_active: bool, is_refreshing: bool, time_left_secs: u64) -> SchedulerStatus {
        SchedulerStatus {
            phase: Phase::Armed,
            interval_secs: 600,
            time_left_secs,
            is_active,
            is_refreshing,
            consecutive_failures: 0,
            last_run: None,
            recent_runs: Vec::new(),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(status(true, false, 600).display(), "10:00");
        assert_eq!(status(true, false, 65).display(), "1:05");
        assert_eq!(status(true, true, 0).display(), "Refreshing...");
        assert_eq!(status(false, false, 0).display(), "Auto-refresh disabled");
    }
}
