//! Media abstraction for playable stems
//!
//! The host supplies the actual audio elements. The engine only tells them
//! what to do and learns about readiness, end-of-media and load failures
//! through [`MediaEvent`]s that the host forwards.

/// Something the host's media layer reports about one track
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Media loaded and can be played; duration in seconds
    Ready { duration: f64 },
    /// Playback reached the end of the media
    Ended,
    /// Media could not be loaded or decoded
    Failed { reason: String },
}

/// One playable unit owned by a track.
///
/// Calls must take effect before they return; `seek` followed by
/// `position` reports the new position.
pub trait MediaPlayer: Send {
    /// Start fetching the media at `url`
    fn load(&mut self, url: &str);

    fn play(&mut self);

    fn pause(&mut self);

    /// Move to `position` seconds
    fn seek(&mut self, position: f64);

    /// Current position in seconds
    fn position(&self) -> f64;

    /// Linear output gain, 0.0 to 1.0
    fn set_gain(&mut self, gain: f32);

    /// Stop playback and drop the source. Idempotent.
    fn release(&mut self);
}

/// Creates media players for tracks that have a source URL.
pub trait MediaFactory: Send {
    fn create(&mut self, track_id: &str) -> Box<dyn MediaPlayer>;
}

impl<F> MediaFactory for F
where
    F: FnMut(&str) -> Box<dyn MediaPlayer> + Send,
{
    fn create(&mut self, track_id: &str) -> Box<dyn MediaPlayer> {
        self(track_id)
    }
}
