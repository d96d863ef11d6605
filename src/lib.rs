//! Stemdeck - Stem Separation and Multi-Track Mixing
//!
//! Stemdeck is the core of an audio editor that sends a song to a remote
//! separation service and mixes the stems that come back.
//!
//! # Architecture
//!
//! Components, leaf first:
//! - `transport`: uploads source audio and talks to the separation service
//!   (synchronous invoke or submit-then-poll)
//! - `orchestrator`: the lifecycle of one separation job
//!   (idle, uploading, processing, complete, error) with cancellation
//! - `mixer`: N stem tracks on one transport clock with volume, mute and solo
//! - `store`: record and blob storage collaborators
//!
//! A finished job hands `{id, label, url}` stems to the mixer; the final mix
//! settings are saved back onto the project record.

pub mod cli;
pub mod config;
pub mod error;
pub mod mixer;
pub mod orchestrator;
pub mod stem;
pub mod store;
pub mod transport;

pub use config::{BackendConfig, BackendStyle, OutputFormat};
pub use error::{ErrorKind, Result, StemError};
pub use mixer::{MixEngine, MixSession, MixSettings};
pub use orchestrator::{JobStage, SeparationJob, SeparationOrchestrator, SourceAudio};
pub use stem::StemDescriptor;
