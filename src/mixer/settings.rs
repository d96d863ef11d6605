//! Persisted mix settings
//!
//! The volume/mute/solo state of a mix as stored in a project's
//! `separation_config.mix`.

use serde::{Deserialize, Serialize};

/// Settings of one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMix {
    pub id: String,
    pub volume: u8,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub soloed: bool,
}

/// Settings of a whole mix, in track order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixSettings {
    #[serde(default)]
    pub tracks: Vec<TrackMix>,
}

impl MixSettings {
    pub fn track(&self, id: &str) -> Option<&TrackMix> {
        self.tracks.iter().find(|t| t.id == id)
    }
}
