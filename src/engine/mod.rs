//! # Media Engines
//!
//! Consumers of a resolved [`crate::types::StreamDescriptor`]. Both engines
//! share the same front half: [`source`] opens the media URL and [`pipe`]
//! moves its body through a bounded channel on a separate task. They differ
//! in what drains that channel:
//!
//! ```text
//! media URL → source → pipe ─┬→ decode → output   (PlaybackEngine)
//!                            └→ temp file → rename (DownloadEngine)
//! ```
//!
//! Each engine runs at most one operation at a time and takes a
//! [`tokio_util::sync::CancellationToken`] that the CLI wires to ctrl+c.

pub mod decode;
pub mod download;
pub mod output;
pub mod pipe;
pub mod playback;
pub mod source;

pub use download::{DownloadEngine, DownloadOutcome, DownloadProgress};
pub use output::{AudioDevice, AudioOutput, AudioSpec, RodioOutput};
pub use playback::{PlaybackEngine, PlaybackOutcome, PlaybackState, PlaybackStatus};
