use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use futures::AsyncWriteExt;
use rand::{Rng, distr::Alphanumeric};
use tokio::sync::Mutex;

use crate::{
    config,
    error::{Error, Result},
    types::TokenBundle,
};

/// Persists the token bundle as JSON at a fixed per-user path.
///
/// A missing or unreadable file loads as "absent" so that a first run and a
/// run after `logout` look the same. Saves go through a sibling temp file and
/// a rename, and writers inside the process are serialised by `write_lock`.
pub struct CredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CredentialStore {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at [`config::credentials_path`].
    pub fn default_location() -> Self {
        Self::new(config::credentials_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored bundle. A missing or unreadable file is `None`.
    pub async fn load(&self) -> Option<TokenBundle> {
        let content = match async_fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read credentials");
                return None;
            }
        };

        match serde_json::from_str::<TokenBundle>(&content) {
            Ok(bundle) => Some(bundle),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt credentials");
                None
            }
        }
    }

    /// Replaces the stored bundle atomically; readers see either the old
    /// file or the new one, never a partial write.
    pub async fn save(&self, bundle: &TokenBundle) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec_pretty(bundle)
            .map_err(|e| self.io_error(std::io::Error::other(e)))?;

        let tmp = self.temp_path();
        if let Err(e) = write_private(&tmp, &json).await {
            let _ = async_fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }

        if let Err(e) = async_fs::rename(&tmp, &self.path).await {
            let _ = async_fs::remove_file(&tmp).await;
            return Err(self.io_error(e));
        }

        tracing::debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    /// Removes the credential file. Clearing an already empty store succeeds.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match async_fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credentials.json".to_string());
        self.path.with_file_name(format!(".{name}.{suffix}.tmp"))
    }

    fn io_error(&self, source: std::io::Error) -> Error {
        Error::Credentials {
            path: self.path.clone(),
            source,
        }
    }
}

/// Writes `data` to a new file readable only by the owner, then syncs it.
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = async_fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        async_fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}
