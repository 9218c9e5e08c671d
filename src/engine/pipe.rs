//! Bounded byte pipeline between a network response and its consumer.
//!
//! The reading side runs as its own task and hands chunks over a bounded
//! channel. When the channel is full the reader suspends, which is the only
//! backpressure either engine needs. The reader stops at the next chunk
//! boundary once the cancellation token fires, and it records how the stream
//! ended so that the consumer can tell a clean end from a dropped connection
//! after it has drained the channel.

use bytes::Bytes;
use reqwest::Response;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// How the reading side stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeEnd {
    /// The body ended and its length matched the announced total, if any.
    Complete,
    /// The connection failed or closed early.
    Failed(String),
    /// The cancellation token fired.
    Cancelled,
    /// The consumer hung up first.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct PipeSummary {
    pub bytes: u64,
    pub expected: Option<u64>,
    pub end: PipeEnd,
}

/// Starts pulling `response` into a channel holding at most `capacity` chunks.
///
/// `expected` is the total the body has to reach to count as complete; it is
/// usually the response's content length.
pub fn spawn(
    mut response: Response,
    capacity: usize,
    expected: Option<u64>,
    cancel: CancellationToken,
) -> (mpsc::Receiver<Bytes>, JoinHandle<PipeSummary>) {
    let (tx, rx) = mpsc::channel::<Bytes>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut bytes = 0u64;

        let end = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PipeEnd::Cancelled,
                chunk = response.chunk() => chunk,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break completion(bytes, expected),
                Err(e) => break PipeEnd::Failed(e.to_string()),
            };
            if chunk.is_empty() {
                continue;
            }
            bytes += chunk.len() as u64;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break PipeEnd::Cancelled,
                sent = tx.send(chunk) => {
                    if sent.is_err() {
                        break PipeEnd::Abandoned;
                    }
                }
            }
        };

        tracing::debug!(bytes, ?expected, ?end, "network reader stopped");
        PipeSummary {
            bytes,
            expected,
            end,
        }
    });

    (rx, handle)
}

fn completion(bytes: u64, expected: Option<u64>) -> PipeEnd {
    match expected {
        Some(total) if bytes < total => {
            PipeEnd::Failed(format!("connection closed after {bytes} of {total} bytes"))
        }
        _ => PipeEnd::Complete,
    }
}
