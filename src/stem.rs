//! Stem identifiers and descriptors shared by the orchestrator, the mixer
//! and the project store.

use serde::{Deserialize, Serialize};

/// Known stem ids and their display labels.
pub const KNOWN_STEMS: &[(&str, &str)] = &[
    ("vocals", "Vocals"),
    ("drums", "Drums"),
    ("bass", "Bass"),
    ("other", "Other"),
    ("instrumental", "Instrumental"),
    ("guitar", "Guitar"),
    ("piano", "Piano"),
];

/// Display label for a stem id, falling back to the raw id.
pub fn stem_label(id: &str) -> String {
    let key = id.trim().to_lowercase();
    KNOWN_STEMS
        .iter()
        .find(|(known, _)| *known == key)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| id.to_string())
}

/// One separated stem as handed from a finished job to the mixer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemDescriptor {
    pub id: String,
    pub label: String,
    pub url: String,
}

impl StemDescriptor {
    /// Create a descriptor, deriving the label from the id.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: stem_label(&id),
            id,
            url: url.into(),
        }
    }
}
