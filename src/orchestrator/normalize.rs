//! Stem map normalization
//!
//! Services return stems as a map of stem id to a URL, a bare base64
//! payload, or an object carrying a `url`. This turns that map into ordered
//! descriptors the mix engine can load.

use serde_json::Value;

use crate::config::OutputFormat;
use crate::stem::StemDescriptor;
use crate::transport::StemMap;

const URL_PREFIXES: &[&str] = &["http://", "https://", "data:", "blob:"];

/// Shorter base64-looking values are treated as opaque locations
const MIN_INLINE_PAYLOAD_LEN: usize = 256;

/// Ordered descriptors in the service's key order.
///
/// Entries that carry no usable location are skipped. When `requested` is
/// non-empty only those stems (case-insensitive) are kept.
pub fn normalize_stems(
    output: &StemMap,
    requested: Option<&[String]>,
    format: OutputFormat,
) -> Vec<StemDescriptor> {
    let requested = requested.filter(|r| !r.is_empty());

    output
        .iter()
        .filter(|(id, _)| {
            requested.map_or(true, |wanted| {
                wanted.iter().any(|w| w.trim().eq_ignore_ascii_case(id.trim()))
            })
        })
        .filter_map(|(id, value)| {
            let url = match value {
                Value::String(s) => to_url(s, format),
                Value::Object(map) => map
                    .get("url")
                    .and_then(Value::as_str)
                    .and_then(|s| to_url(s, format)),
                _ => None,
            };

            if url.is_none() {
                tracing::debug!(stem = %id, "stem entry without a usable location skipped");
            }
            url.map(|url| StemDescriptor::new(id.clone(), url))
        })
        .collect()
}

fn to_url(raw: &str, format: OutputFormat) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_ascii_lowercase();
    if URL_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
        return Some(trimmed.to_string());
    }

    if trimmed.len() >= MIN_INLINE_PAYLOAD_LEN && is_base64(trimmed) {
        let payload: String = trimmed.split_whitespace().collect();
        return Some(format!("data:{};base64,{}", format.mime_type(), payload));
    }

    Some(trimmed.to_string())
}

fn is_base64(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=') || c.is_ascii_whitespace())
}
