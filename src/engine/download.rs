//! Download Engine.
//!
//! Bytes go from the network reader through a small bounded channel into a
//! hidden temp file next to the final path. The temp file is renamed into
//! place only once the body ended cleanly and its length matches the announced
//! total; on every other path it is removed.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use futures::AsyncWriteExt;
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    config::DownloadSettings,
    engine::{
        pipe::{self, PipeEnd},
        source,
    },
    error::{Error, Result},
    management::AuthSession,
    types::StreamDescriptor,
    utils::{self, ProgressThrottle},
};

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub written: u64,
    pub total: Option<u64>,
}

/// A finished download, renamed into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the written file.
    pub sha256: String,
}

/// Lifecycle of a [`DownloadTask`]; only `Complete` keeps the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Exclusive owner of one temp file until it is either renamed into place or
/// removed. Dropping an unfinished task removes the temp file.
#[derive(Debug)]
pub struct DownloadTask {
    pub destination: PathBuf,
    pub temp_path: PathBuf,
    pub written: u64,
    pub total: Option<u64>,
    pub state: TaskState,
}

impl DownloadTask {
    fn new(destination: PathBuf) -> Self {
        let temp_path = temp_path_for(&destination);
        DownloadTask {
            destination,
            temp_path,
            written: 0,
            total: None,
            state: TaskState::Pending,
        }
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            written: self.written,
            total: self.total,
        }
    }

    async fn discard(&mut self) {
        self.state = TaskState::Failed;
        match async_fs::remove_file(&self.temp_path).await {
            Ok(()) => tracing::debug!(path = %self.temp_path.display(), "partial download removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "cannot remove partial download")
            }
        }
    }
}

impl Drop for DownloadTask {
    fn drop(&mut self) {
        if self.state != TaskState::Complete {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Saves resolved streams to disk, one download at a time.
///
/// Bytes are hashed while they are written and the file only appears under
/// its final name once complete. A concurrent second call fails with
/// [`Error::Busy`].
pub struct DownloadEngine {
    session: Arc<AuthSession>,
    settings: DownloadSettings,
    busy: Mutex<()>,
}

impl DownloadEngine {
    /// Engine using the download settings of the session.
    pub fn new(session: Arc<AuthSession>) -> Self {
        let settings = session.settings().download.clone();
        Self::with_settings(session, settings)
    }

    pub fn with_settings(session: Arc<AuthSession>, settings: DownloadSettings) -> Self {
        DownloadEngine {
            session,
            settings,
            busy: Mutex::new(()),
        }
    }

    /// Downloads `descriptor` into `directory`, creating it when missing.
    ///
    /// The file name is derived from the track metadata. An existing file of
    /// that name is only replaced when `overwrite` is set. `on_progress` is
    /// called at most once per progress interval plus once at the end.
    pub async fn download<F>(
        &self,
        descriptor: StreamDescriptor,
        directory: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<DownloadOutcome>
    where
        F: FnMut(DownloadProgress),
    {
        let _busy = self.busy.try_lock().map_err(|_| Error::Busy)?;

        prepare_directory(directory).await?;
        let extension = utils::extension_for(&descriptor.format);
        let name = utils::file_name_for(descriptor.track.as_ref(), &descriptor.resource_id, extension);
        let destination = directory.join(name);
        if !overwrite && exists(&destination).await {
            return Err(Error::AlreadyExists { path: destination });
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = source::open(&self.session, &descriptor) => response?,
        };

        let mut task = DownloadTask::new(destination);
        task.total = response.content_length().or(descriptor.expected_size);

        let mut file = match async_fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&task.temp_path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                task.state = TaskState::Failed;
                return Err(Error::DestinationUnwritable {
                    path: task.temp_path.clone(),
                    source: e,
                });
            }
        };
        task.state = TaskState::InProgress;
        tracing::debug!(temp = %task.temp_path.display(), total = ?task.total, "download started");

        let stop = cancel.child_token();
        let (mut rx, reader) = pipe::spawn(response, self.settings.pipeline_chunks, task.total, stop.clone());

        let mut hasher = Sha256::new();
        let mut throttle = ProgressThrottle::new(self.settings.progress_interval);
        let mut write_error: Option<io::Error> = None;

        while let Some(chunk) = rx.recv().await {
            if let Err(e) = file.write_all(&chunk).await {
                write_error = Some(e);
                break;
            }
            hasher.update(&chunk);
            task.written += chunk.len() as u64;
            if throttle.ready(Instant::now()) {
                on_progress(task.progress());
            }
        }
        drop(rx);
        stop.cancel();

        if write_error.is_none() {
            if let Err(e) = finish_file(&mut file).await {
                write_error = Some(e);
            }
        }
        drop(file);

        let summary = reader.await;

        if let Some(source) = write_error {
            task.discard().await;
            return Err(Error::DestinationUnwritable {
                path: task.temp_path.clone(),
                source,
            });
        }
        if cancel.is_cancelled() {
            task.discard().await;
            return Err(Error::Cancelled);
        }

        let end = match summary {
            Ok(summary) => summary.end,
            Err(e) => PipeEnd::Failed(format!("network reader failed: {e}")),
        };
        let failure = match end {
            PipeEnd::Failed(reason) => Some(reason),
            PipeEnd::Cancelled | PipeEnd::Abandoned => Some("stream stopped early".to_string()),
            PipeEnd::Complete => match task.total {
                Some(total) if task.written != total => {
                    Some(format!("received {} bytes, expected {total}", task.written))
                }
                _ => None,
            },
        };

        if let Some(reason) = failure {
            task.discard().await;
            if task.written == 0 {
                return Err(Error::unavailable(descriptor.resource_id, reason));
            }
            return Err(Error::Truncated {
                resource_id: descriptor.resource_id,
                written: task.written,
                expected: task.total,
                reason,
            });
        }

        if !overwrite && exists(&task.destination).await {
            task.discard().await;
            return Err(Error::AlreadyExists {
                path: task.destination.clone(),
            });
        }
        if let Err(e) = async_fs::rename(&task.temp_path, &task.destination).await {
            task.discard().await;
            return Err(Error::DestinationUnwritable {
                path: task.destination.clone(),
                source: e,
            });
        }
        task.state = TaskState::Complete;
        on_progress(task.progress());

        let sha256 = format!("{:x}", hasher.finalize());
        tracing::info!(
            path = %task.destination.display(),
            bytes = task.written,
            "download complete"
        );

        Ok(DownloadOutcome {
            path: task.destination.clone(),
            bytes: task.written,
            sha256,
        })
    }
}

/// Creates `directory` if needed and makes sure it really is one.
async fn prepare_directory(directory: &Path) -> Result<()> {
    let unwritable = |source: io::Error| Error::DestinationUnwritable {
        path: directory.to_path_buf(),
        source,
    };

    async_fs::create_dir_all(directory).await.map_err(unwritable)?;
    let metadata = async_fs::metadata(directory).await.map_err(unwritable)?;
    if !metadata.is_dir() {
        return Err(unwritable(io::Error::other("not a directory")));
    }
    Ok(())
}

async fn exists(path: &Path) -> bool {
    async_fs::metadata(path).await.is_ok()
}

async fn finish_file(file: &mut async_fs::File) -> io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.{suffix}.part"))
}
