//! Stem tracks
//!
//! A track is one channel in the mix: its user-controlled volume/mute/solo
//! state and, when it has a source URL, the media player that renders it.

use serde::{Deserialize, Serialize};

use super::media::MediaPlayer;
use crate::stem::{stem_label, StemDescriptor};

/// Load state of a track's media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TrackAvailability {
    /// No source; follows the shared clock without audio
    Placeholder,
    /// Media requested, not ready yet
    Loading,
    /// Media ready to play
    Ready,
    /// Media failed; the rest of the mix carries on without it
    Unavailable { reason: String },
}

/// What a track is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemSource {
    pub id: String,
    pub url: Option<String>,
}

impl StemSource {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: Some(url.into()),
        }
    }

    /// A track without media
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
        }
    }
}

impl From<StemDescriptor> for StemSource {
    fn from(stem: StemDescriptor) -> Self {
        Self {
            id: stem.id,
            url: Some(stem.url),
        }
    }
}

impl From<&StemDescriptor> for StemSource {
    fn from(stem: &StemDescriptor) -> Self {
        Self::new(stem.id.clone(), stem.url.clone())
    }
}

/// One playable channel of a mix.
pub struct StemTrack {
    pub(super) id: String,
    pub(super) label: String,
    pub(super) source_url: Option<String>,
    pub(super) volume: u8,
    pub(super) muted: bool,
    pub(super) soloed: bool,
    pub(super) availability: TrackAvailability,
    pub(super) duration: Option<f64>,
    pub(super) media: Option<Box<dyn MediaPlayer>>,
}

impl StemTrack {
    pub(super) fn new(source: StemSource, volume: u8) -> Self {
        let availability = if source.url.is_some() {
            TrackAvailability::Loading
        } else {
            TrackAvailability::Placeholder
        };

        Self {
            label: stem_label(&source.id),
            id: source.id,
            source_url: source.url,
            volume,
            muted: false,
            soloed: false,
            availability,
            duration: None,
            media: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    pub fn availability(&self) -> &TrackAvailability {
        &self.availability
    }

    /// Media duration once known
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Has media that is ready to take transport commands
    pub(super) fn is_ready(&self) -> bool {
        self.media.is_some() && self.availability == TrackAvailability::Ready
    }

    /// Has media that is loading or ready
    pub(super) fn is_healthy_media(&self) -> bool {
        self.media.is_some()
            && matches!(
                self.availability,
                TrackAvailability::Loading | TrackAvailability::Ready
            )
    }

    /// Ready media, if any
    pub(super) fn ready_media(&mut self) -> Option<&mut Box<dyn MediaPlayer>> {
        if self.availability == TrackAvailability::Ready {
            self.media.as_mut()
        } else {
            None
        }
    }

    /// Stop and drop the media. Safe to call repeatedly.
    pub(super) fn release(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.release();
            tracing::debug!(track = %self.id, "released media");
        }
    }

    pub(super) fn mark_unavailable(&mut self, reason: impl Into<String>) {
        self.release();
        self.availability = TrackAvailability::Unavailable {
            reason: reason.into(),
        };
    }
}

/// Read-only view of a track for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackView {
    pub id: String,
    pub label: String,
    pub volume: u8,
    pub muted: bool,
    pub soloed: bool,
    /// Gain after mute/solo resolution
    pub gain: f32,
    pub availability: TrackAvailability,
    /// Position in seconds
    pub position: f64,
}
