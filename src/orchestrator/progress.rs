//! Advisory progress estimate for a separation job
//!
//! The percentage never decreases and stays below 100 until the job has
//! produced its stems.

use crate::transport::RemoteJobState;

/// After the source is uploaded
pub const UPLOADED_PERCENT: u8 = 10;
/// Once the remote job is known to exist
pub const SUBMITTED_PERCENT: u8 = 15;
/// Highest estimate before completion
pub const CEILING_PERCENT: u8 = 95;
/// Simulated ramp increment per progress tick
pub const RAMP_STEP: u8 = 5;

/// Rate of the asymptotic estimate for unreported polls
const POLL_DECAY: f64 = 0.05;

#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    percent: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Move up to `target` (capped at the ceiling). Returns whether it moved.
    fn raise(&mut self, target: u8) -> bool {
        let target = target.min(CEILING_PERCENT);
        if target > self.percent {
            self.percent = target;
            true
        } else {
            false
        }
    }

    pub fn uploaded(&mut self) -> bool {
        self.raise(UPLOADED_PERCENT)
    }

    /// One step of the simulated ramp while a synchronous call is outstanding
    pub fn ramp(&mut self) -> bool {
        let next = self.percent.max(UPLOADED_PERCENT).saturating_add(RAMP_STEP);
        self.raise(next)
    }

    /// Fold in a polled status. `polls` counts status reads so far.
    ///
    /// Reported progress wins when present, either as a 0-1 fraction or as a
    /// 0-100 percent. Otherwise the estimate approaches the ceiling as polls
    /// accumulate.
    pub fn observe(&mut self, state: RemoteJobState, reported: Option<f64>, polls: u32) -> bool {
        match state {
            RemoteJobState::Starting => self.raise(SUBMITTED_PERCENT),
            RemoteJobState::Processing => {
                let estimate = match reported {
                    Some(value) => reported_percent(value).max(SUBMITTED_PERCENT),
                    None => asymptotic(polls),
                };
                self.raise(estimate)
            }
            RemoteJobState::Succeeded | RemoteJobState::Failed | RemoteJobState::Canceled => false,
        }
    }
}

fn reported_percent(value: f64) -> u8 {
    let percent = if value <= 1.0 { value * 100.0 } else { value };
    percent.clamp(0.0, 100.0).round() as u8
}

fn asymptotic(polls: u32) -> u8 {
    let span = f64::from(CEILING_PERCENT - SUBMITTED_PERCENT);
    let approach = 1.0 - (-POLL_DECAY * f64::from(polls)).exp();
    (f64::from(SUBMITTED_PERCENT) + span * approach).floor() as u8
}
