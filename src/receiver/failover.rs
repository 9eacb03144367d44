//! # Failover Controller
//!
//! Decides which receiver drives the control loop and whether a decoded
//! channel candidate may become the active channel set.
//!
//! Rules applied to every decoded RC-channels frame:
//!
//! 1. **Flyaway gate** (channel 11): a value above 1600 asserts flyaway for
//!    that source, whichever source is active. After it drops again the
//!    source stays held for a 50 ms quiet period.
//! 2. **Acceptance**: only the active source, with flyaway clear, may update
//!    the active channel set.
//! 3. **Auto-switch** (channel 10, accepted frames only): above 1600 while A
//!    is active switches to B; below 700 while B is active switches back to
//!    A. The gap between the two thresholds is the hysteresis.
//!
//! The automatic path has no dwell timer; only [`FailoverController::request_switch`]
//! enforces the 150 ms minimum between switches.

use tracing::{debug, info, warn};

use super::source::Source;
use crate::crsf::protocol::ChannelSet;

/// Supervisory channel used as the flyaway/failsafe flag
pub const FLYAWAY_CHANNEL: usize = 11;

/// Flyaway asserted above this value
pub const FLYAWAY_THRESHOLD: u16 = 1600;

/// Hold time after flyaway clears before data is trusted again
pub const FLYAWAY_QUIET_PERIOD_US: u64 = 50_000;

/// Channel whose value drives automatic source switching
pub const MODE_CHANNEL: usize = 10;

/// A → B when the mode channel rises above this value
pub const MODE_SWITCH_HIGH: u16 = 1600;

/// B → A when the mode channel falls below this value
pub const MODE_SWITCH_LOW: u16 = 700;

/// Minimum time between a switch and a manual toggle
pub const MANUAL_SWITCH_DWELL_US: u64 = 150_000;

/// Flyaway state of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlyawayState {
    #[default]
    Clear,
    /// Flyaway channel high since the given time
    Asserted { since_us: u64 },
    /// Flyaway channel dropped at the given time; quiet period running
    Settling { cleared_at_us: u64 },
}

impl FlyawayState {
    fn next(self, flyaway_value: u16, now_us: u64) -> Self {
        let asserted = flyaway_value > FLYAWAY_THRESHOLD;

        match (self, asserted) {
            (FlyawayState::Asserted { since_us }, true) => FlyawayState::Asserted { since_us },
            (_, true) => FlyawayState::Asserted { since_us: now_us },
            (FlyawayState::Clear, false) => FlyawayState::Clear,
            (FlyawayState::Asserted { .. }, false) => FlyawayState::Settling { cleared_at_us: now_us },
            (FlyawayState::Settling { cleared_at_us }, false) => {
                if now_us.saturating_sub(cleared_at_us) >= FLYAWAY_QUIET_PERIOD_US {
                    FlyawayState::Clear
                } else {
                    FlyawayState::Settling { cleared_at_us }
                }
            }
        }
    }
}

/// Verdict on one channel candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Candidate becomes the active channel set; `switched_to` is set when
    /// it also triggered an automatic switch
    Accepted { switched_to: Option<Source> },
    /// Candidate came from the inactive source
    Standby,
    /// Candidate came from the active source while flyaway is held
    FlyawayHold,
}

/// Process-wide failover state
#[derive(Debug, Clone)]
pub struct FailoverController {
    active: Source,
    flyaway: [FlyawayState; 2],
    attached: [bool; 2],
    last_switch_us: Option<u64>,
}

impl FailoverController {
    pub fn new(default_source: Source) -> Self {
        Self {
            active: default_source,
            flyaway: [FlyawayState::Clear; 2],
            attached: [true; 2],
            last_switch_us: None,
        }
    }

    pub fn active_source(&self) -> Source {
        self.active
    }

    pub fn flyaway_state(&self, source: Source) -> FlyawayState {
        self.flyaway[source.index()]
    }

    pub fn last_switch_us(&self) -> Option<u64> {
        self.last_switch_us
    }

    /// Mark a source whose port could not be opened
    ///
    /// It is never switched to afterwards. If it was the active source, the
    /// other one takes over immediately.
    pub fn detach(&mut self, source: Source) {
        self.attached[source.index()] = false;
        if self.active == source && self.is_attached(source.other()) {
            self.active = source.other();
            info!(to = %self.active, "Receiver {} detached, handing over", source);
        }
    }

    pub fn is_attached(&self, source: Source) -> bool {
        self.attached[source.index()]
    }

    /// Gate one decoded channel candidate
    ///
    /// # Arguments
    ///
    /// * `source` - Source that decoded the candidate
    /// * `candidate` - Decoded channel set
    /// * `now_us` - Current time in microseconds
    pub fn on_channels(&mut self, source: Source, candidate: &ChannelSet, now_us: u64) -> Decision {
        self.evaluate(source, candidate, now_us, true)
    }

    /// Gate one candidate like [`FailoverController::on_channels`] but never
    /// switch automatically
    ///
    /// Used for the remaining candidates of a poll in which a switch already
    /// happened, so disagreeing mode channels cannot bounce A → B → A.
    pub fn on_channels_without_switch(&mut self, source: Source, candidate: &ChannelSet, now_us: u64) -> Decision {
        self.evaluate(source, candidate, now_us, false)
    }

    fn evaluate(&mut self, source: Source, candidate: &ChannelSet, now_us: u64, auto_switch: bool) -> Decision {
        let previous = self.flyaway[source.index()];
        let state = previous.next(candidate[FLYAWAY_CHANNEL], now_us);
        self.flyaway[source.index()] = state;

        if state != previous {
            debug!(source = %source, ?previous, ?state, "Flyaway state changed");
        }

        if source != self.active {
            return Decision::Standby;
        }
        if state != FlyawayState::Clear {
            return Decision::FlyawayHold;
        }

        if !auto_switch {
            return Decision::Accepted { switched_to: None };
        }

        let target = match self.active {
            Source::A if candidate[MODE_CHANNEL] > MODE_SWITCH_HIGH => Some(Source::B),
            Source::B if candidate[MODE_CHANNEL] < MODE_SWITCH_LOW => Some(Source::A),
            _ => None,
        };

        let switched_to = match target {
            Some(target) if self.is_attached(target) => {
                self.switch_to(target, now_us);
                info!(
                    from = %source,
                    to = %target,
                    mode_channel = candidate[MODE_CHANNEL],
                    "Automatic receiver switch"
                );
                Some(target)
            }
            Some(target) => {
                debug!(to = %target, "Automatic switch refused: receiver port not attached");
                None
            }
            None => None,
        };

        Decision::Accepted { switched_to }
    }

    /// Toggle the active source by hand
    ///
    /// Refused within 150 ms of the previous switch, or when the other source
    /// is not attached.
    ///
    /// # Returns
    ///
    /// * `bool` - Whether the active source changed
    pub fn request_switch(&mut self, now_us: u64) -> bool {
        if let Some(last) = self.last_switch_us {
            if now_us.saturating_sub(last) < MANUAL_SWITCH_DWELL_US {
                debug!("Manual switch refused: minimum dwell not elapsed");
                return false;
            }
        }

        let target = self.active.other();
        if !self.is_attached(target) {
            warn!(to = %target, "Manual switch refused: receiver port not attached");
            return false;
        }

        self.switch_to(target, now_us);
        info!(to = %target, "Manual receiver switch");
        true
    }

    fn switch_to(&mut self, target: Source, now_us: u64) {
        self.active = target;
        self.last_switch_us = Some(now_us);
    }
}
