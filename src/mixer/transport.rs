//! Shared transport clock for a mix
//!
//! One playhead and one play/pause state for every track in a mix. The
//! playhead is either driven from the reference track or advanced by wall
//! time when the mix runs on the simulated clock.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Play state of a mix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Stopped or paused; a freshly built mix starts here
    #[default]
    Paused,
    /// Every ready track is running
    Playing,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Paused => write!(f, "Paused"),
            TransportState::Playing => write!(f, "Playing"),
        }
    }
}

/// Play state and playhead shared by every track of a mix.
///
/// The playhead is clamped to the mix duration once one is known. Stopping
/// is pausing at zero.
#[derive(Debug, Clone, Default)]
pub struct TransportManager {
    /// Play or pause
    state: TransportState,

    /// Playhead in seconds
    playhead_position: f64,

    /// Logical duration of the mix in seconds (0 while unknown)
    duration: f64,
}

impl TransportManager {
    /// Create a paused transport at position zero
    ///
    /// # Example
    /// ```
    /// use stemdeck::mixer::TransportManager;
    /// let transport = TransportManager::new();
    /// assert!(transport.is_paused());
    /// assert_eq!(transport.position(), 0.0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the current playhead. False when already playing.
    ///
    /// # Example
    /// ```
    /// use stemdeck::mixer::TransportManager;
    /// let mut transport = TransportManager::new();
    /// assert!(transport.play());
    /// assert!(!transport.play());
    /// assert!(transport.is_playing());
    /// ```
    pub fn play(&mut self) -> bool {
        match self.state {
            TransportState::Paused => {
                self.state = TransportState::Playing;
                tracing::debug!(position = self.playhead_position, "transport play");
                true
            }
            TransportState::Playing => false,
        }
    }

    /// Hold the playhead where it is. False when already paused.
    pub fn pause(&mut self) -> bool {
        match self.state {
            TransportState::Playing => {
                self.state = TransportState::Paused;
                tracing::debug!(position = self.playhead_position, "transport pause");
                true
            }
            TransportState::Paused => false,
        }
    }

    /// Pause and rewind to zero
    ///
    /// # Example
    /// ```
    /// use stemdeck::mixer::TransportManager;
    /// let mut transport = TransportManager::new();
    /// transport.set_duration(30.0);
    /// transport.play();
    /// transport.seek(10.0);
    /// transport.stop();
    /// assert!(transport.is_paused());
    /// assert_eq!(transport.position(), 0.0);
    /// ```
    pub fn stop(&mut self) {
        self.state = TransportState::Paused;
        self.playhead_position = 0.0;
    }

    /// Move the playhead to `position` seconds
    ///
    /// Clamped to `[0, duration]` when the duration is known, `>= 0` otherwise.
    /// Returns the position actually applied.
    ///
    /// # Example
    /// ```
    /// use stemdeck::mixer::TransportManager;
    /// let mut transport = TransportManager::new();
    /// transport.set_duration(8.0);
    /// assert_eq!(transport.seek(5.0), 5.0);
    /// assert_eq!(transport.seek(-1.0), 0.0);
    /// assert_eq!(transport.seek(99.0), 8.0);
    /// ```
    pub fn seek(&mut self, position: f64) -> f64 {
        self.playhead_position = self.clamp(position);
        self.playhead_position
    }

    /// Overwrite the playhead from an external clock (the reference track)
    pub fn sync_position(&mut self, position: f64) {
        self.playhead_position = self.clamp(position);
    }

    /// Advance the playhead by `seconds` while playing
    ///
    /// Returns true when the playhead reached the end of a known duration.
    ///
    /// # Example
    /// ```
    /// use stemdeck::mixer::TransportManager;
    /// let mut transport = TransportManager::new();
    /// transport.set_duration(1.0);
    /// transport.play();
    /// assert!(!transport.advance(0.5));
    /// assert!(transport.advance(0.5));
    /// assert_eq!(transport.position(), 1.0);
    /// ```
    pub fn advance(&mut self, seconds: f64) -> bool {
        if self.state != TransportState::Playing {
            return false;
        }
        self.playhead_position = self.clamp(self.playhead_position + seconds.max(0.0));
        self.at_end()
    }

    /// Whether the playhead sits at the end of a known duration
    pub fn at_end(&self) -> bool {
        self.duration > 0.0 && self.playhead_position >= self.duration
    }

    fn clamp(&self, position: f64) -> f64 {
        let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    /// Playhead in seconds
    pub fn position(&self) -> f64 {
        self.playhead_position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Set the logical duration; the playhead is pulled back inside it
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.playhead_position = self.clamp(self.playhead_position);
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == TransportState::Paused
    }

    pub fn state(&self) -> TransportState {
        self.state
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
