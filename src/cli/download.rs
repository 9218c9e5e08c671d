use std::{path::PathBuf, sync::Arc};

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    cli::{cancel_on_interrupt, open_session, track_ids},
    engine::{DownloadEngine, DownloadProgress},
    error,
    error::Error,
    tidal::CatalogResolver,
    types::MediaKind,
    success, warning,
};

pub async fn download(id: String, kind: MediaKind, output: Option<PathBuf>, overwrite: bool) {
    let session = open_session().await;
    let directory = output.unwrap_or_else(|| session.settings().download_dir.clone());
    let resolver = CatalogResolver::new(Arc::clone(&session));
    let engine = DownloadEngine::new(session);
    let cancel = cancel_on_interrupt();

    let ids = track_ids(&resolver, &id, kind).await;
    let count = ids.len();
    let mut saved = 0usize;

    for track_id in ids {
        if cancel.is_cancelled() {
            break;
        }

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

        let pb = progress_bar(&title);
        let result = engine
            .download(descriptor, &directory, overwrite, &cancel, |p: DownloadProgress| {
                if let Some(total) = p.total {
                    pb.set_length(total);
                }
                pb.set_position(p.written);
            })
            .await;
        pb.finish_and_clear();

        match result {
            Ok(outcome) => {
                saved += 1;
                success!("Saved {} ({} bytes)", outcome.path.display(), outcome.bytes);
            }
            Err(Error::AlreadyExists { path }) => {
                warning!("{} already exists, pass --overwrite to replace it", path.display());
            }
            Err(Error::Cancelled) => {
                warning!("Download cancelled, partial file removed");
                break;
            }
            Err(e @ (Error::Truncated { .. } | Error::RemoteUnavailable { .. })) if count > 1 => {
                warning!("{}", e);
            }
            Err(e) => error!("{}", e),
        }
    }

    if count > 1 {
        success!("{} of {} tracks saved to {}", saved, count, directory.display());
    }
}

fn progress_bar(title: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{msg} [{bar:30.blue}] {bytes}/{total_bytes} {bytes_per_sec}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(title.to_string());
    pb
}
