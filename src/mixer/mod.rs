//! Multi-track mix engine
//!
//! N synchronized stem tracks on one shared transport with per-track
//! volume, mute and solo.

mod engine;
mod gain;
mod media;
mod session;
mod settings;
mod track;
mod transport;

use std::time::Duration;

pub use engine::{ClockKind, MixEngine, TransportSnapshot};
pub use gain::{any_soloed, effective_gain, is_audible, MAX_VOLUME};
pub use media::{MediaEvent, MediaFactory, MediaPlayer};
pub use session::MixSession;
pub use settings::{MixSettings, TrackMix};
pub use track::{StemSource, StemTrack, TrackAvailability, TrackView};
pub use transport::{TransportManager, TransportState};

/// Defaults for a new mix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixOptions {
    /// Initial volume of every track (0-100)
    pub default_volume: u8,
    /// Length of the simulated clock in seconds when no media reports one
    pub nominal_duration: f64,
    /// How often the playhead is refreshed while playing
    pub tick_interval: Duration,
}

impl Default for MixOptions {
    fn default() -> Self {
        Self {
            default_volume: 80,
            nominal_duration: 180.0,
            tick_interval: Duration::from_millis(100),
        }
    }
}
