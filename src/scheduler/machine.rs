//! Auto-refresh state machine.
//!
//! - `Idle --enable--> Armed` with a full countdown.
//! - `Armed --countdown hits 0 / run now--> Refreshing`.
//! - `Idle --run now--> Refreshing` without re-arming afterwards.
//! - `Refreshing --finished--> Armed` if still enabled, else `Idle`.
//! - `Armed --disable--> Idle`, countdown forced to 0.
//!
//! The machine is pure: every transition returns the single timer [`Effect`]
//! the driver has to carry out.

use serde::{Deserialize, Serialize};

/// Externally visible phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Armed,
    Refreshing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Armed { time_left: u64 },
    /// `rearm` records whether auto-refresh is still enabled once the
    /// in-flight refresh completes.
    Refreshing { rearm: bool },
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Start a fresh one-second countdown timer.
    ArmTimer,
    /// Cancel the pending countdown timer.
    CancelTimer,
    /// Cancel the countdown timer and launch the refresh action.
    StartRefresh,
}

#[derive(Debug, Clone)]
pub struct Machine {
    interval_secs: u64,
    state: State,
}

impl Machine {
    /// A machine that starts `Armed` when `active`, otherwise `Idle`.
    /// Returns the effect needed to bring the driver into that state.
    pub fn new(interval_secs: u64, active: bool) -> (Self, Effect) {
        let mut machine = Self {
            interval_secs: interval_secs.max(1),
            state: State::Idle,
        };
        let effect = if active { machine.enable() } else { Effect::None };
        (machine, effect)
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Idle => Phase::Idle,
            State::Armed { .. } => Phase::Armed,
            State::Refreshing { .. } => Phase::Refreshing,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            State::Armed { .. } | State::Refreshing { rearm: true }
        )
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(self.state, State::Refreshing { .. })
    }

    /// Seconds until the next automatic refresh; 0 unless `Armed`.
    pub fn time_left(&self) -> u64 {
        match self.state {
            State::Armed { time_left } => time_left,
            _ => 0,
        }
    }

    pub fn enable(&mut self) -> Effect {
        match self.state {
            State::Idle => {
                self.state = State::Armed {
                    time_left: self.interval_secs,
                };
                Effect::ArmTimer
            }
            State::Refreshing { rearm: false } => {
                self.state = State::Refreshing { rearm: true };
                Effect::None
            }
            _ => Effect::None,
        }
    }

    pub fn disable(&mut self) -> Effect {
        match self.state {
            State::Armed { .. } => {
                self.state = State::Idle;
                Effect::CancelTimer
            }
            State::Refreshing { rearm: true } => {
                self.state = State::Refreshing { rearm: false };
                Effect::None
            }
            _ => Effect::None,
        }
    }

    pub fn toggle(&mut self) -> Effect {
        if self.is_active() {
            self.disable()
        } else {
            self.enable()
        }
    }

    /// One second of countdown elapsed. Ticks outside `Armed` are stale and
    /// ignored.
    pub fn tick(&mut self) -> Effect {
        let State::Armed { time_left } = self.state else {
            return Effect::None;
        };
        let time_left = time_left.saturating_sub(1);
        if time_left == 0 {
            self.state = State::Refreshing { rearm: true };
            Effect::StartRefresh
        } else {
            self.state = State::Armed { time_left };
            Effect::None
        }
    }

    /// Manual "reset and run now". Returns `Effect::None` when a refresh is
    /// already in flight.
    pub fn run_now(&mut self) -> Effect {
        let rearm = match self.state {
            State::Refreshing { .. } => return Effect::None,
            State::Armed { .. } => true,
            State::Idle => false,
        };
        self.state = State::Refreshing { rearm };
        Effect::StartRefresh
    }

    /// The in-flight refresh completed, successfully or not.
    pub fn refresh_finished(&mut self) -> Effect {
        match self.state {
            State::Refreshing { rearm: true } => {
                self.state = State::Armed {
                    time_left: self.interval_secs,
                };
                Effect::ArmTimer
            }
            State::Refreshing { rearm: false } => {
                self.state = State::Idle;
                Effect::None
            }
            _ => Effect::None,
        }
    }
}
