mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use common::{Harness, MediaMode, TRACK_ID, wav};
use tidecli::{
    Error, Result,
    config::PlaybackSettings,
    engine::{AudioDevice, AudioOutput, AudioSpec, PlaybackEngine, PlaybackOutcome, PlaybackState},
    management::AuthSession,
    tidal::CatalogResolver,
    types::{MediaKind, StreamDescriptor},
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct DeviceStats {
    held: AtomicBool,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Output whose devices "play" in real time, `speed` times faster, and
/// refuse to open twice at once.
struct FakeOutput {
    stats: Arc<DeviceStats>,
    speed: f64,
}

impl AudioOutput for FakeOutput {
    fn open(&self, _spec: AudioSpec) -> Result<Box<dyn AudioDevice>> {
        if self.stats.held.swap(true, Ordering::SeqCst) {
            return Err(Error::AudioDevice("device in use".to_string()));
        }
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            stats: Arc::clone(&self.stats),
            speed: self.speed,
            ends: Vec::new(),
            started_at: None,
            closed: false,
        }))
    }
}

struct FakeDevice {
    stats: Arc<DeviceStats>,
    speed: f64,
    /// Play time at which each queued chunk is done.
    ends: Vec<Duration>,
    started_at: Option<Instant>,
    closed: bool,
}

impl FakeDevice {
    fn played(&self) -> Duration {
        self.started_at
            .map_or(Duration::ZERO, |t| t.elapsed().mul_f64(self.speed))
    }
}

impl AudioDevice for FakeDevice {
    fn enqueue(&mut self, spec: AudioSpec, samples: Vec<f32>) -> Result<()> {
        assert!(!self.closed, "enqueue after close");
        let frames = samples.len() / spec.channels.max(1) as usize;
        let begin = self.ends.last().copied().unwrap_or_default().max(self.played());
        self.ends.push(begin + spec.duration_of(frames));
        Ok(())
    }

    fn queued(&self) -> usize {
        let played = self.played();
        self.ends.iter().filter(|end| **end > played).count()
    }

    fn start(&mut self) {
        self.started_at.get_or_insert_with(Instant::now);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.ends.clear();
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            self.stats.held.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn engine(session: Arc<AuthSession>, speed: f64, settings: PlaybackSettings) -> (PlaybackEngine, Arc<DeviceStats>) {
    let stats = Arc::new(DeviceStats::default());
    let output = FakeOutput {
        stats: Arc::clone(&stats),
        speed,
    };
    (PlaybackEngine::with_settings(session, Arc::new(output), settings), stats)
}

async fn descriptor(session: &Arc<AuthSession>, id: &str) -> StreamDescriptor {
    CatalogResolver::new(Arc::clone(session))
        .resolve(id, MediaKind::Track)
        .await
        .unwrap()
}

fn small_buffers() -> PlaybackSettings {
    PlaybackSettings {
        network_chunks: 4,
        device_chunks: 4,
        prebuffer_chunks: 2,
        poll_interval: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_plays_to_the_end() {
    let h = Harness::new().await;
    h.service.add_track(TRACK_ID, wav(1.0, 8000), "audio/wav", MediaMode::Full);
    let session = h.logged_in().await;
    let (engine, stats) = engine(Arc::clone(&session), 4.0, PlaybackSettings::default());
    let status = engine.subscribe();

    let outcome = engine
        .play(descriptor(&session, TRACK_ID).await, &CancellationToken::new())
        .await
        .unwrap();

    let PlaybackOutcome::Finished { position } = outcome else {
        panic!("expected Finished, got {outcome:?}");
    };
    assert!(position > Duration::from_millis(900), "{position:?}");
    assert!(position <= Duration::from_millis(1050), "{position:?}");
    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    assert_eq!(status.borrow().state, PlaybackState::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_stops_promptly_and_frees_device() {
    let h = Harness::new().await;
    h.service.add_track(TRACK_ID, wav(10.0, 8000), "audio/wav", MediaMode::Full);
    h.service.add_track("441808189", wav(0.5, 8000), "audio/wav", MediaMode::Full);
    let session = h.logged_in().await;
    let (engine, stats) = engine(Arc::clone(&session), 1.0, small_buffers());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let cancelled_at = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
        Instant::now()
    });

    let outcome = engine
        .play(descriptor(&session, TRACK_ID).await, &cancel)
        .await
        .unwrap();
    let returned_at = Instant::now();
    let cancelled_at = cancelled_at.await.unwrap();

    let PlaybackOutcome::Stopped { position } = outcome else {
        panic!("expected Stopped, got {outcome:?}");
    };
    assert!(position < Duration::from_secs(2), "{position:?}");
    assert!(returned_at.duration_since(cancelled_at) < Duration::from_secs(2));
    assert_eq!(stats.closed.load(Ordering::SeqCst), 1);
    assert_eq!(engine.status().state, PlaybackState::Stopped);

    // the device was released, so the next playback can open it
    let outcome = engine
        .play(descriptor(&session, "441808189").await, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, PlaybackOutcome::Finished { .. }));
    assert_eq!(stats.opened.load(Ordering::SeqCst), 2);
    assert_eq!(stats.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_play_future_frees_device() {
    let h = Harness::new().await;
    h.service.add_track(TRACK_ID, wav(10.0, 8000), "audio/wav", MediaMode::Full);
    h.service.add_track("441808189", wav(0.5, 8000), "audio/wav", MediaMode::Full);
    let session = h.logged_in().await;
    let (engine, stats) = engine(Arc::clone(&session), 1.0, small_buffers());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(500),
        engine.play(descriptor(&session, TRACK_ID).await, &CancellationToken::new()),
    )
    .await;
    assert!(abandoned.is_err(), "a 10s track cannot finish in 500ms");
    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);

    // the blocking side notices within a few poll intervals
    let deadline = Instant::now() + Duration::from_secs(2);
    while stats.held.load(Ordering::SeqCst) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!stats.held.load(Ordering::SeqCst), "device still held");
    assert_eq!(stats.closed.load(Ordering::SeqCst), 1);

    let outcome = engine
        .play(descriptor(&session, "441808189").await, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, PlaybackOutcome::Finished { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_stream_is_interrupted() {
    let h = Harness::new().await;
    let data = wav(2.0, 8000);
    let half = data.len() / 2;
    h.service.add_track(TRACK_ID, data, "audio/wav", MediaMode::DropAt(half));
    let session = h.logged_in().await;
    let (engine, stats) = engine(Arc::clone(&session), 8.0, small_buffers());

    let err = engine
        .play(descriptor(&session, TRACK_ID).await, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::StreamInterrupted {
            resource_id,
            bytes,
            position,
            ..
        } => {
            assert_eq!(resource_id, TRACK_ID);
            assert!(bytes > 0 && bytes <= half as u64, "{bytes}");
            assert!(position < Duration::from_millis(1500), "{position:?}");
        }
        other => panic!("expected StreamInterrupted, got {other:?}"),
    }
    assert!(!stats.held.load(Ordering::SeqCst));
    assert_eq!(engine.status().state, PlaybackState::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_concurrent_play_is_busy() {
    let h = Harness::new().await;
    h.service.add_track(TRACK_ID, wav(10.0, 8000), "audio/wav", MediaMode::Full);
    let session = h.logged_in().await;
    let (engine, _stats) = engine(Arc::clone(&session), 1.0, small_buffers());
    let first = descriptor(&session, TRACK_ID).await;
    let second = descriptor(&session, TRACK_ID).await;

    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(engine.play(first, &cancel), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let result = engine.play(second, &CancellationToken::new()).await;
        cancel.cancel();
        result
    });

    assert!(matches!(second, Err(Error::Busy)));
    assert!(matches!(first, Ok(PlaybackOutcome::Stopped { .. })));
}

#[tokio::test]
async fn test_unknown_media_fails_without_device() {
    let h = Harness::new().await;
    h.service.add_track(TRACK_ID, wav(0.2, 8000), "audio/wav", MediaMode::Full);
    let session = h.logged_in().await;
    let (engine, stats) = engine(Arc::clone(&session), 1.0, small_buffers());

    let mut descriptor = descriptor(&session, TRACK_ID).await;
    descriptor.media_url = format!("{}/media/1", h.base);
    let err = engine
        .play(descriptor, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
    assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
}
