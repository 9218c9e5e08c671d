//! Configuration management for tidecli.
//!
//! Values come from environment variables, optionally seeded from a `.env`
//! file in the per-user config directory. The resolution order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in `<config_dir>/tidecli/`
//! 3. Defaults compiled into this module (where applicable)
//!
//! Everything the session and engines need is gathered once into an
//! immutable [`Settings`] value by [`Settings::from_env`].

use std::{env, path::PathBuf, time::Duration};

use crate::{
    error::{Error, Result},
    types::AudioQuality,
};

const APP_DIR: &str = "tidecli";

pub const DEFAULT_AUTH_URL: &str = "https://auth.tidal.com/v1/oauth2";
pub const DEFAULT_API_URL: &str = "https://api.tidal.com/v1";
pub const DEFAULT_SCOPE: &str = "r_usr w_usr w_sub";
pub const DEFAULT_COUNTRY: &str = "US";

/// Returns the per-user configuration directory of the application.
///
/// - Linux: `~/.config/tidecli`
/// - macOS: `~/Library/Application Support/tidecli`
/// - Windows: `%APPDATA%/tidecli`
pub fn config_dir() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Fixed location of the credential file.
pub fn credentials_path() -> PathBuf {
    config_dir().join("credentials.json")
}

/// Loads environment variables from `<config_dir>/tidecli/.env`.
///
/// Creates the config directory when missing. A missing `.env` file is not an
/// error since every value can also come from the process environment.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the `.env` file
/// exists but cannot be parsed.
pub async fn load_env() -> std::result::Result<(), String> {
    let dir = config_dir();
    async_fs::create_dir_all(&dir)
        .await
        .map_err(|e| e.to_string())?;

    let path = dir.join(".env");
    if !path.is_file() {
        return Ok(());
    }

    dotenv::from_path(&path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Returns the OAuth client id registered for device authorization.
///
/// Reads `TIDECLI_CLIENT_ID`.
pub fn client_id() -> Result<String> {
    required("TIDECLI_CLIENT_ID")
}

/// Returns the OAuth client secret paired with [`client_id`].
///
/// Reads `TIDECLI_CLIENT_SECRET`. The secret is sent as HTTP basic auth to
/// the token endpoint and must never be logged.
pub fn client_secret() -> Result<String> {
    required("TIDECLI_CLIENT_SECRET")
}

/// Base URL of the OAuth endpoints, `TIDECLI_AUTH_URL`.
pub fn auth_url() -> String {
    optional("TIDECLI_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.to_string())
}

/// Base URL of the catalog API, `TIDECLI_API_URL`.
pub fn api_url() -> String {
    optional("TIDECLI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

/// Scope requested during device authorization, `TIDECLI_SCOPE`.
pub fn scope() -> String {
    optional("TIDECLI_SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.to_string())
}

/// Requested stream quality, `TIDECLI_QUALITY`.
pub fn quality() -> Result<AudioQuality> {
    match optional("TIDECLI_QUALITY") {
        None => Ok(AudioQuality::Lossless),
        Some(value) => parse_quality(&value),
    }
}

/// Parses a configured stream quality.
///
/// Only `LOW`, `HIGH` and `LOSSLESS` are accepted: hi-res tiers are served as
/// segmented DASH streams, which cannot be played or downloaded.
pub fn parse_quality(value: &str) -> Result<AudioQuality> {
    match AudioQuality::parse(value) {
        Some(AudioQuality::HiResLossless) => Err(Error::Config(format!(
            "TIDECLI_QUALITY `{value}` is not supported, use LOW, HIGH or LOSSLESS"
        ))),
        Some(quality) => Ok(quality),
        None => Err(Error::Config(format!("unknown TIDECLI_QUALITY `{value}`"))),
    }
}

/// Country used for catalog requests when the token does not carry one.
pub fn country() -> String {
    optional("TIDECLI_COUNTRY").unwrap_or_else(|| DEFAULT_COUNTRY.to_string())
}

/// Default download directory, `TIDECLI_DOWNLOAD_DIR`.
pub fn download_dir() -> PathBuf {
    optional("TIDECLI_DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| Error::Config(format!("{key} must be set")))
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Buffering knobs of the playback pipeline.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Network chunks that may wait for the decoder before the reader suspends.
    pub network_chunks: usize,
    /// Decoded packets queued on the device before the decoder suspends.
    pub device_chunks: usize,
    /// Decoded packets queued before output starts.
    pub prebuffer_chunks: usize,
    /// How often a suspended consumer re-checks the device and cancellation.
    pub poll_interval: Duration,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            network_chunks: 16,
            device_chunks: 32,
            prebuffer_chunks: 8,
            poll_interval: Duration::from_millis(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Chunks buffered between the network reader and the file writer.
    pub pipeline_chunks: usize,
    /// Minimum delay between two progress reports.
    pub progress_interval: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            pipeline_chunks: 8,
            progress_interval: Duration::from_millis(100),
        }
    }
}

/// Runtime settings shared by the session, resolver and engines.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub api_url: String,
    pub scope: String,
    pub quality: AudioQuality,
    pub country: String,
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_margin: Duration,
    pub credentials_path: PathBuf,
    pub download_dir: PathBuf,
    pub playback: PlaybackSettings,
    pub download: DownloadSettings,
}

impl Settings {
    /// Assembles settings from the environment (see module docs).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: client_id()?,
            client_secret: client_secret()?,
            auth_url: auth_url(),
            api_url: api_url(),
            scope: scope(),
            quality: quality()?,
            country: country(),
            refresh_margin: Duration::from_secs(60),
            credentials_path: credentials_path(),
            download_dir: download_dir(),
            playback: PlaybackSettings::default(),
            download: DownloadSettings::default(),
        })
    }

    /// Settings pointing every endpoint at `base`; used to run against a local
    /// stand-in of the remote service.
    pub fn with_base_url(base: &str, credentials_path: PathBuf) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            client_id: "tidecli-client".to_string(),
            client_secret: "tidecli-secret".to_string(),
            auth_url: format!("{base}/oauth2"),
            api_url: format!("{base}/v1"),
            scope: DEFAULT_SCOPE.to_string(),
            quality: AudioQuality::Lossless,
            country: DEFAULT_COUNTRY.to_string(),
            refresh_margin: Duration::from_secs(60),
            credentials_path,
            download_dir: PathBuf::from("./downloads"),
            playback: PlaybackSettings::default(),
            download: DownloadSettings::default(),
        }
    }
}
