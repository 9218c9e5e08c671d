//! Error taxonomy shared by the session, resolver and engines.
//!
//! Every variant carries enough context (resource id, byte position, path or
//! the underlying transport failure) for the CLI to render a precise message.
//! Only [`Error::RemoteUnavailable`] is meant to be retried, and only by the
//! caller; nothing in the library retries on its own apart from the single
//! coordinated token refresh.

use std::{io, path::PathBuf, time::Duration};

use crate::types::MediaKind;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device authorization expired before it was approved")]
    AuthFlowExpired,

    #[error("device authorization was denied")]
    AuthDenied,

    #[error("not authenticated, run `tidecli login`")]
    NotAuthenticated,

    #[error("{kind} {id} not found")]
    NotFound { kind: MediaKind, id: String },

    #[error("remote service unavailable ({context}): {reason}")]
    RemoteUnavailable { context: String, reason: String },

    #[error(
        "stream for {resource_id} interrupted at {:.1}s after {bytes} bytes: {reason}",
        position.as_secs_f64()
    )]
    StreamInterrupted {
        resource_id: String,
        position: Duration,
        bytes: u64,
        reason: String,
    },

    #[error("download of {resource_id} truncated after {written} bytes{}: {reason}", expected_suffix(*expected))]
    Truncated {
        resource_id: String,
        written: u64,
        expected: Option<u64>,
        reason: String,
    },

    #[error("cannot write to {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("operation cancelled")]
    Cancelled,

    #[error("remote service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{kind} {id} is a collection and cannot be streamed directly")]
    NotPlayable { kind: MediaKind, id: String },

    #[error("unsupported playback manifest: {0}")]
    UnsupportedManifest(String),

    #[error("cannot decode audio: {0}")]
    Decode(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("another operation is already running")]
    Busy,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential file {}: {source}", path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RemoteUnavailable { .. })
    }

    pub(crate) fn unavailable(context: impl Into<String>, reason: impl ToString) -> Self {
        Error::RemoteUnavailable {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

fn expected_suffix(expected: Option<u64>) -> String {
    match expected {
        Some(total) => format!(" of {total}"),
        None => String::new(),
    }
}
