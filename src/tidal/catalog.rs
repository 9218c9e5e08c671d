use std::{sync::Arc, time::Duration};

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    management::AuthSession,
    tidal::manifest,
    types::{
        ApiError, AudioQuality, AuthHint, CollectionItem, ItemsPage, MediaKind, PlaybackInfo,
        StreamDescriptor, StreamFormat, Track,
    },
};

/// Page size used when listing collections.
const COLLECTION_LIMIT: u32 = 100;

/// Translates catalog identifiers into stream descriptors.
///
/// Every call goes through [`AuthSession::send`]. Nothing is cached: media
/// URLs handed out by the service are only valid for a short time.
pub struct CatalogResolver {
    session: Arc<AuthSession>,
}

impl CatalogResolver {
    pub fn new(session: Arc<AuthSession>) -> Self {
        CatalogResolver { session }
    }

    /// Resolves a track into a playable descriptor.
    ///
    /// Looks up the track first so that an unknown id is reported as
    /// [`Error::NotFound`], then asks for the playback manifest at the
    /// configured quality. Collections have no stream of their own; list them
    /// with [`CatalogResolver::tracks_of`] and resolve each track.
    pub async fn resolve(&self, id: &str, kind: MediaKind) -> Result<StreamDescriptor> {
        if kind != MediaKind::Track {
            return Err(Error::NotPlayable {
                kind,
                id: id.to_string(),
            });
        }

        let track = self.track(id).await?;

        let quality = self.session.settings().quality;
        let info: PlaybackInfo = self
            .get(
                &format!("tracks/{id}/playbackinfopostpaywall"),
                &[
                    ("audioquality", quality.as_param().to_string()),
                    ("playbackmode", "STREAM".to_string()),
                    ("assetpresentation", "FULL".to_string()),
                ],
                kind,
                id,
            )
            .await?;
        let bts = manifest::decode(&info)?;

        tracing::debug!(id, mime = %bts.mime_type, quality = ?info.audio_quality, "track resolved");

        Ok(StreamDescriptor {
            resource_id: id.to_string(),
            media_url: bts.urls[0].clone(),
            format: StreamFormat {
                mime_type: bts.mime_type,
                codec: bts.codecs,
                quality: info
                    .audio_quality
                    .as_deref()
                    .and_then(AudioQuality::parse)
                    .or(Some(quality)),
            },
            expected_size: None,
            expected_duration: (track.duration > 0).then(|| Duration::from_secs(track.duration)),
            auth_hint: AuthHint::default(),
            track: Some(track),
        })
    }

    /// Fetches the metadata of a single track.
    pub async fn track(&self, id: &str) -> Result<Track> {
        validate_id(id, MediaKind::Track)?;
        self.get(&format!("tracks/{id}"), &[], MediaKind::Track, id)
            .await
    }

    /// Lists the tracks of an album, playlist or artist (top tracks). A track
    /// id yields that single track.
    pub async fn tracks_of(&self, id: &str, kind: MediaKind) -> Result<Vec<Track>> {
        validate_id(id, kind)?;
        let limit = [("limit", COLLECTION_LIMIT.to_string())];

        match kind {
            MediaKind::Track => Ok(vec![self.track(id).await?]),
            MediaKind::Album | MediaKind::Playlist => {
                let path = match kind {
                    MediaKind::Album => format!("albums/{id}/items"),
                    _ => format!("playlists/{id}/items"),
                };
                let page: ItemsPage<CollectionItem> = self.get(&path, &limit, kind, id).await?;
                Ok(page
                    .items
                    .into_iter()
                    .filter(|entry| entry.item_type.as_deref().is_none_or(|t| t == "track"))
                    .filter_map(|entry| entry.item)
                    .collect())
            }
            MediaKind::Artist => {
                let page: ItemsPage<Track> = self
                    .get(&format!("artists/{id}/toptracks"), &limit, kind, id)
                    .await?;
                Ok(page.items)
            }
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        kind: MediaKind,
        id: &str,
    ) -> Result<T> {
        let url = format!("{}/{}", self.session.settings().api_url, path);
        let country = self.session.country_code().await;
        let request = self
            .session
            .http()
            .get(&url)
            .query(&[("countryCode", country)])
            .query(query);

        let response = self.session.send(request).await?;
        let response = check_status(response, kind, id).await?;
        let status = response.status().as_u16();

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                Error::Rejected {
                    status,
                    message: format!("unexpected response from {path}: {e}"),
                }
            } else {
                Error::unavailable(path.to_string(), e)
            }
        })
    }
}

/// Maps a catalog response status onto the error taxonomy.
pub(crate) async fn check_status(response: Response, kind: MediaKind, id: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let context = response.url().path().to_string();
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound {
            kind,
            id: id.to_string(),
        }),
        StatusCode::UNAUTHORIZED => Err(Error::NotAuthenticated),
        StatusCode::TOO_MANY_REQUESTS => Err(Error::unavailable(context, "rate limited")),
        s if s.is_server_error() => Err(Error::unavailable(context, format!("HTTP {}", s.as_u16()))),
        s => {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .ok()
                .map(|e| e.user_message)
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            Err(Error::Rejected {
                status: s.as_u16(),
                message,
            })
        }
    }
}

/// Track, album and artist ids are numeric; playlists use UUIDs.
fn validate_id(id: &str, kind: MediaKind) -> Result<()> {
    let valid = match kind {
        MediaKind::Playlist => !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'),
        _ => id.parse::<u64>().is_ok(),
    };

    if valid {
        Ok(())
    } else {
        Err(Error::NotFound {
            kind,
            id: id.to_string(),
        })
    }
}
