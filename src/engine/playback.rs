//! Playback Engine.
//!
//! A playback runs on two sides joined by the bounded byte pipeline from
//! [`crate::engine::pipe`]:
//!
//! - the network side, an async task pulling the media response
//! - the output side, a blocking thread that decodes, keeps up to
//!   `device_chunks` decoded packets queued on the device and waits while that
//!   queue is full
//!
//! Both sides watch the same cancellation token; the output side checks it
//! every `poll_interval` while it waits, so a cancelled playback returns within
//! one poll plus one network chunk. The device is always closed before
//! [`PlaybackEngine::play`] returns.

use std::{collections::VecDeque, sync::Arc, thread, time::Duration};

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    config::PlaybackSettings,
    engine::{
        decode::{FeedReader, StreamDecoder},
        output::{AudioOutput, DeviceGuard},
        pipe::{self, PipeEnd},
        source,
    },
    error::{Error, Result},
    management::AuthSession,
    types::StreamDescriptor,
    utils,
};

/// Phase of the current (or last) playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Buffering,
    Playing,
    Stopped,
    Finished,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Audio handed to the device and already played.
    pub position: Duration,
}

/// How a playback that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The stream was exhausted and the device drained.
    Finished { position: Duration },
    /// The caller cancelled.
    Stopped { position: Duration },
}

/// Streams resolved tracks to an [`AudioOutput`], one at a time.
pub struct PlaybackEngine {
    session: Arc<AuthSession>,
    output: Arc<dyn AudioOutput>,
    settings: PlaybackSettings,
    busy: Mutex<()>,
    status: watch::Sender<PlaybackStatus>,
}

impl PlaybackEngine {
    pub fn new(session: Arc<AuthSession>, output: Arc<dyn AudioOutput>) -> Self {
        let settings = session.settings().playback.clone();
        Self::with_settings(session, output, settings)
    }

    pub fn with_settings(
        session: Arc<AuthSession>,
        output: Arc<dyn AudioOutput>,
        settings: PlaybackSettings,
    ) -> Self {
        let (status, _) = watch::channel(PlaybackStatus {
            state: PlaybackState::Idle,
            position: Duration::ZERO,
        });
        PlaybackEngine {
            session,
            output,
            settings,
            busy: Mutex::new(()),
            status,
        }
    }

    /// Receiver of state and position updates, published every poll interval
    /// while audio plays.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    /// Latest published status.
    pub fn status(&self) -> PlaybackStatus {
        *self.status.borrow()
    }

    /// Plays `descriptor` to the end or until `cancel` fires.
    ///
    /// A connection that drops mid-stream is reported as
    /// [`Error::StreamInterrupted`] after the audio already queued has been
    /// played out. Only one playback may run at a time; a second concurrent
    /// call fails with [`Error::Busy`].
    pub async fn play(
        &self,
        descriptor: StreamDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let _busy = self.busy.try_lock().map_err(|_| Error::Busy)?;
        self.publish(PlaybackState::Buffering, Duration::ZERO);
        tracing::info!(id = %descriptor.resource_id, "playback starting");

        let result = self.run(descriptor, cancel).await;
        let status = match &result {
            Ok(PlaybackOutcome::Finished { position }) => (PlaybackState::Finished, *position),
            Ok(PlaybackOutcome::Stopped { position }) => (PlaybackState::Stopped, *position),
            Err(Error::StreamInterrupted { position, .. }) => (PlaybackState::Failed, *position),
            Err(_) => (PlaybackState::Failed, self.status().position),
        };
        self.publish(status.0, status.1);
        tracing::info!(state = ?status.0, position = ?status.1, "playback ended");
        result
    }

    async fn run(
        &self,
        descriptor: StreamDescriptor,
        cancel: &CancellationToken,
    ) -> Result<PlaybackOutcome> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(PlaybackOutcome::Stopped { position: Duration::ZERO }),
            response = source::open(&self.session, &descriptor) => response?,
        };
        let expected = response.content_length().or(descriptor.expected_size);

        // a child token lets the consumer stop the reader without touching the caller's token
        let stop = cancel.child_token();
        // dropping this future mid-playback must still stop the reader and the consumer
        let _stop_on_drop = stop.clone().drop_guard();
        let (rx, reader) = pipe::spawn(response, self.settings.network_chunks, expected, stop.clone());

        let consumer = Consumer {
            extension: utils::extension_for(&descriptor.format),
            output: Arc::clone(&self.output),
            settings: self.settings.clone(),
            cancel: stop.clone(),
            status: self.status.clone(),
        };
        let consumed = tokio::task::spawn_blocking(move || consumer.run(FeedReader::new(rx))).await;
        stop.cancel();

        let summary = reader
            .await
            .map_err(|e| Error::AudioDevice(format!("network reader failed: {e}")))?;
        let (position, consumed) =
            consumed.map_err(|e| Error::AudioDevice(format!("playback thread failed: {e}")))?;

        if cancel.is_cancelled() {
            return Ok(PlaybackOutcome::Stopped { position });
        }
        if let PipeEnd::Failed(reason) = summary.end {
            return Err(Error::StreamInterrupted {
                resource_id: descriptor.resource_id,
                position,
                bytes: summary.bytes,
                reason,
            });
        }
        consumed?;
        Ok(PlaybackOutcome::Finished { position })
    }

    fn publish(&self, state: PlaybackState, position: Duration) {
        self.status.send_replace(PlaybackStatus { state, position });
    }
}

/// Output side of one playback, run on a blocking thread.
struct Consumer {
    extension: &'static str,
    output: Arc<dyn AudioOutput>,
    settings: PlaybackSettings,
    cancel: CancellationToken,
    status: watch::Sender<PlaybackStatus>,
}

impl Consumer {
    /// Returns the played position alongside the result, which is needed
    /// even when decoding failed.
    fn run(self, reader: FeedReader) -> (Duration, Result<()>) {
        let mut clock = PlayClock::default();
        let result = self.drive(reader, &mut clock);
        (clock.position(), result)
    }

    fn drive(&self, reader: FeedReader, clock: &mut PlayClock) -> Result<()> {
        let mut decoder = StreamDecoder::open(reader, Some(self.extension))?;
        let mut device: Option<DeviceGuard> = None;
        let mut started = false;

        while let Some(chunk) = decoder.next_chunk()? {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            if device.is_none() {
                device = Some(DeviceGuard(self.output.open(chunk.spec)?));
            }
            let Some(device) = device.as_mut() else {
                continue;
            };

            while device.0.queued() >= self.settings.device_chunks {
                if !self.wait(clock, device) {
                    return Ok(());
                }
            }

            device.0.enqueue(chunk.spec, chunk.samples)?;
            clock.push(chunk.duration);

            if !started && clock.queued() >= self.settings.prebuffer_chunks {
                device.0.start();
                started = true;
                self.publish(PlaybackState::Playing, clock.position());
            }
        }

        let Some(device) = &mut device else {
            return Ok(());
        };
        if !started {
            device.0.start();
            self.publish(PlaybackState::Playing, clock.position());
        }
        while device.0.queued() > 0 {
            if !self.wait(clock, device) {
                return Ok(());
            }
        }
        clock.sync(0);
        Ok(())
    }

    /// Sleeps one poll interval and refreshes the position. False once cancelled.
    fn wait(&self, clock: &mut PlayClock, device: &DeviceGuard) -> bool {
        thread::sleep(self.settings.poll_interval);
        if self.cancel.is_cancelled() {
            return false;
        }
        clock.sync(device.0.queued());
        self.publish(PlaybackState::Playing, clock.position());
        true
    }

    fn publish(&self, state: PlaybackState, position: Duration) {
        self.status.send_replace(PlaybackStatus { state, position });
    }
}

/// Tracks the played position from the durations of queued chunks.
#[derive(Debug, Default)]
struct PlayClock {
    decoded: Duration,
    pending: VecDeque<Duration>,
}

impl PlayClock {
    fn push(&mut self, duration: Duration) {
        self.decoded += duration;
        self.pending.push_back(duration);
    }

    /// Forgets the chunks the device no longer holds.
    fn sync(&mut self, still_queued: usize) {
        while self.pending.len() > still_queued {
            self.pending.pop_front();
        }
    }

    fn queued(&self) -> usize {
        self.pending.len()
    }

    fn position(&self) -> Duration {
        self.decoded
            .saturating_sub(self.pending.iter().copied().sum::<Duration>())
    }
}
