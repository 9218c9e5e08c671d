use std::{io::Write, sync::Arc, time::Duration};

use colored::Colorize;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    cli::{cancel_on_interrupt, open_session, track_ids},
    engine::{PlaybackEngine, PlaybackOutcome, PlaybackState, PlaybackStatus, RodioOutput},
    error,
    error::Error,
    info,
    tidal::CatalogResolver,
    types::MediaKind,
    utils, warning,
};

pub async fn play(id: String, kind: MediaKind) {
    let session = open_session().await;
    let resolver = CatalogResolver::new(Arc::clone(&session));
    let engine = PlaybackEngine::new(session, Arc::new(RodioOutput));
    let cancel = cancel_on_interrupt();

    let ids = track_ids(&resolver, &id, kind).await;
    let count = ids.len();

    for (index, track_id) in ids.into_iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        // media URLs expire, so each track is resolved right before it plays
        let descriptor = match resolver.resolve(&track_id, MediaKind::Track).await {
            Ok(descriptor) => descriptor,
            Err(e) if count > 1 && e.is_retryable() => {
                warning!("Skipping {}: {}", track_id, e);
                continue;
            }
            Err(e) => error!("{}", e),
        };

        let title = descriptor
            .track
            .as_ref()
            .map(|t| t.display_title())
            .unwrap_or_else(|| track_id.clone());
        if count > 1 {
            info!("[{}/{}] {}", index + 1, count, title.bold());
        } else {
            info!("{}", title.bold());
        }

        let line = spawn_status_line(engine.subscribe(), descriptor.expected_duration);
        let result = engine.play(descriptor, &cancel).await;
        line.abort();
        println!();

        match result {
            Ok(PlaybackOutcome::Finished { .. }) => {}
            Ok(PlaybackOutcome::Stopped { position }) => {
                warning!("Stopped at {}", utils::format_duration(position));
                break;
            }
            Err(e @ Error::StreamInterrupted { .. }) if count > 1 => {
                warning!("{}", e);
            }
            Err(e) => error!("{}", e),
        }
    }
}

/// Redraws `▶ m:ss / m:ss` whenever the engine publishes a new position.
fn spawn_status_line(
    mut status: watch::Receiver<PlaybackStatus>,
    total: Option<Duration>,
) -> JoinHandle<()> {
    let total = total
        .map(utils::format_duration)
        .unwrap_or_else(|| "--:--".to_string());

    tokio::spawn(async move {
        let mut last = String::new();
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            let marker = match current.state {
                PlaybackState::Buffering => "…",
                _ => "▶",
            };
            let line = format!("{marker} {} / {total}", utils::format_duration(current.position));
            if line != last {
                print!("\r{}   ", line.blue());
                let _ = std::io::stdout().flush();
                last = line;
            }
        }
    })
}
