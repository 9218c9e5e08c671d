use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Access/refresh token pair with its expiry, as persisted in the credential file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which `access_token` stops being valid.
    pub expires_at: i64,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl TokenBundle {
    /// Builds a bundle from a fresh grant issued at `now`.
    pub fn from_grant(grant: TokenResponse, now: i64) -> Option<Self> {
        let refresh_token = grant.refresh_token?;
        let user = grant.user.unwrap_or_default();
        Some(Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: now + grant.expires_in,
            user_id: user.user_id.or(grant.user_id),
            username: user.username,
            country_code: user.country_code,
        })
    }

    /// Applies a refresh grant. The refresh token only changes when the
    /// service rotated it; user metadata is kept when the grant omits it.
    pub fn renewed(&self, grant: TokenResponse, now: i64) -> Self {
        let user = grant.user.unwrap_or_default();
        Self {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: now + grant.expires_in,
            user_id: user.user_id.or(grant.user_id).or(self.user_id),
            username: user.username.or_else(|| self.username.clone()),
            country_code: user.country_code.or_else(|| self.country_code.clone()),
        }
    }

    /// True when the access token has expired or expires within `margin` seconds.
    pub fn is_stale(&self, now: i64, margin: i64) -> bool {
        self.expires_at - margin <= now
    }
}

/// Response of the device authorization endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    pub interval: u64,
}

impl DeviceCode {
    /// URL to show the user, preferring the one with the code pre-filled.
    pub fn url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub user: Option<TokenUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUser {
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

/// Error body returned by the OAuth endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthError {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Error body returned by the catalog endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    #[serde(default)]
    pub status: u16,
    #[serde(default, alias = "sub_status")]
    pub sub_status: u64,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MediaKind {
    Track,
    Album,
    Playlist,
    Artist,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Track => "track",
            MediaKind::Album => "album",
            MediaKind::Playlist => "playlist",
            MediaKind::Artist => "artist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioQuality {
    Low,
    High,
    Lossless,
    HiResLossless,
}

impl AudioQuality {
    pub fn as_param(&self) -> &'static str {
        match self {
            AudioQuality::Low => "LOW",
            AudioQuality::High => "HIGH",
            AudioQuality::Lossless => "LOSSLESS",
            AudioQuality::HiResLossless => "HI_RES_LOSSLESS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(AudioQuality::Low),
            "HIGH" => Some(AudioQuality::High),
            "LOSSLESS" => Some(AudioQuality::Lossless),
            "HI_RES_LOSSLESS" | "HI_RES" => Some(AudioQuality::HiResLossless),
            _ => None,
        }
    }
}

impl fmt::Display for AudioQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_param())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u64,
    pub title: String,
    /// Length in seconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub track_number: Option<u32>,
    #[serde(default)]
    pub artist: Option<ArtistRef>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: Option<AlbumRef>,
    #[serde(default)]
    pub audio_quality: Option<String>,
}

impl Track {
    pub fn artist_name(&self) -> Option<&str> {
        self.artist
            .as_ref()
            .or_else(|| self.artists.first())
            .map(|a| a.name.as_str())
    }

    pub fn display_title(&self) -> String {
        match self.artist_name() {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsPage<T> {
    pub items: Vec<T>,
}

/// Album and playlist listings wrap each entry with its type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionItem {
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    pub track_id: u64,
    #[serde(default)]
    pub audio_quality: Option<String>,
    pub manifest_mime_type: String,
    pub manifest: String,
}

/// Decoded `application/vnd.tidal.bts` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BtsManifest {
    pub mime_type: String,
    #[serde(default)]
    pub codecs: Option<String>,
    #[serde(default)]
    pub encryption_type: Option<String>,
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    pub mime_type: String,
    pub codec: Option<String>,
    pub quality: Option<AudioQuality>,
}

/// How the media URL has to be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHint {
    /// Send the session's bearer token with the media request.
    pub bearer: bool,
    pub headers: Vec<(String, String)>,
}

/// A resolved, time-limited pointer to playable audio.
///
/// Deliberately not `Clone`: the engines consume it, so every attempt has to
/// go back to the resolver for a fresh media URL.
#[derive(Debug)]
pub struct StreamDescriptor {
    pub resource_id: String,
    pub media_url: String,
    pub format: StreamFormat,
    pub expected_size: Option<u64>,
    pub expected_duration: Option<Duration>,
    pub auth_hint: AuthHint,
    pub track: Option<Track>,
}

#[derive(Tabled)]
pub struct DescriptorTableRow {
    pub field: String,
    pub value: String,
}

#[derive(Tabled)]
pub struct TrackTableRow {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub duration: String,
}
