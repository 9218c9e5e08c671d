//! In-process stand-in for the TIDAL auth, catalog and media endpoints.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    f32::consts::PI,
    io::{self, Cursor},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Extension, Form, Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use tidecli::{
    config::Settings,
    management::{AuthSession, CredentialStore},
    tidal::manifest::{BTS_MIME_TYPE, DASH_MIME_TYPE},
    types::{BtsManifest, TokenBundle},
};

pub const TRACK_ID: &str = "441808188";
pub const ALBUM_ID: &str = "77640617";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMode {
    ApproveAfter(usize),
    Deny,
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    Grant,
    Revoked,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMode {
    Full,
    /// Sends this many bytes, then drops the connection.
    DropAt(usize),
    /// Sends 4 KiB chunks with a pause in between.
    Slow(Duration),
}

#[derive(Debug, Clone)]
pub struct MediaEntry {
    pub title: String,
    pub data: Vec<u8>,
    pub mime: String,
    pub mode: MediaMode,
    pub dash: bool,
}

pub struct FakeService {
    pub base: Mutex<String>,
    pub device_mode: Mutex<DeviceMode>,
    pub refresh_mode: Mutex<RefreshMode>,
    pub refresh_delay: Mutex<Duration>,
    /// Bearer token the catalog accepts.
    pub valid_token: Mutex<String>,
    pub media: Mutex<HashMap<String, MediaEntry>>,
    pub outage: AtomicBool,
    pub last_country: Mutex<Option<String>>,
    pub device_polls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub track_calls: AtomicUsize,
    pub playback_calls: AtomicUsize,
    pub media_calls: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeService {
            base: Mutex::new(String::new()),
            device_mode: Mutex::new(DeviceMode::ApproveAfter(2)),
            refresh_mode: Mutex::new(RefreshMode::Grant),
            refresh_delay: Mutex::new(Duration::ZERO),
            valid_token: Mutex::new("access-0".to_string()),
            media: Mutex::new(HashMap::new()),
            outage: AtomicBool::new(false),
            last_country: Mutex::new(None),
            device_polls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            track_calls: AtomicUsize::new(0),
            playback_calls: AtomicUsize::new(0),
            media_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_track(&self, id: &str, data: Vec<u8>, mime: &str, mode: MediaMode) {
        self.media.lock().unwrap().insert(
            id.to_string(),
            MediaEntry {
                title: "Song".to_string(),
                data,
                mime: mime.to_string(),
                mode,
                dash: false,
            },
        );
    }

    pub fn set_device_mode(&self, mode: DeviceMode) {
        *self.device_mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn set_valid_token(&self, token: &str) {
        *self.valid_token.lock().unwrap() = token.to_string();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }
}

/// Binds the fake on an ephemeral port and returns its base URL.
pub async fn start(service: Arc<FakeService>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *service.base.lock().unwrap() = base.clone();

    let app = Router::new()
        .route("/oauth2/device_authorization", post(device_authorization))
        .route("/oauth2/token", post(token))
        .route("/v1/tracks/{id}", get(track))
        .route("/v1/tracks/{id}/playbackinfopostpaywall", get(playback_info))
        .route("/v1/albums/{id}/items", get(album_items))
        .route("/media/{id}", get(media))
        .layer(Extension(service));

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

async fn device_authorization(
    Extension(service): Extension<Arc<FakeService>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    assert_eq!(form.get("client_id").map(String::as_str), Some("tidecli-client"));
    let base = service.base.lock().unwrap().clone();
    Json(json!({
        "deviceCode": "device-code",
        "userCode": "ABCD-EFGH",
        "verificationUri": format!("{base}/device"),
        "verificationUriComplete": format!("{base}/device?code=ABCD-EFGH"),
        "expiresIn": 30,
        "interval": 0,
    }))
    .into_response()
}

async fn token(
    Extension(service): Extension<Arc<FakeService>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    assert!(headers.contains_key(header::AUTHORIZATION), "token endpoint needs basic auth");

    match form.get("grant_type").map(String::as_str) {
        Some("urn:ietf:params:oauth:grant-type:device_code") => {
            let polls = service.device_polls.fetch_add(1, Ordering::SeqCst) + 1;
            let mode = *service.device_mode.lock().unwrap();
            match mode {
                DeviceMode::ApproveAfter(pending) if polls > pending => {
                    service.set_valid_token("access-0");
                    grant("access-0", Some("refresh-0"))
                }
                DeviceMode::ApproveAfter(_) => oauth_error("authorization_pending"),
                DeviceMode::Deny => oauth_error("access_denied"),
                DeviceMode::Expire => oauth_error("expired_token"),
            }
        }
        Some("refresh_token") => {
            let n = service.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = *service.refresh_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mode = *service.refresh_mode.lock().unwrap();
            match mode {
                RefreshMode::Grant => {
                    let access = format!("access-{n}");
                    service.set_valid_token(&access);
                    grant(&access, Some(&format!("refresh-{n}")))
                }
                RefreshMode::Revoked => oauth_error("invalid_grant"),
                RefreshMode::Down => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            }
        }
        _ => oauth_error("unsupported_grant_type"),
    }
}

fn grant(access: &str, refresh: Option<&str>) -> Response {
    Json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
        "user_id": 42,
        "user": { "userId": 42, "username": "listener", "countryCode": "NO" },
    }))
    .into_response()
}

fn oauth_error(code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": code, "error_description": code })),
    )
        .into_response()
}

fn track_json(id: &str, title: &str) -> serde_json::Value {
    json!({
        "id": id.parse::<u64>().unwrap_or(0),
        "title": title,
        "duration": 10,
        "trackNumber": 1,
        "artist": { "id": 7, "name": "Artist" },
        "artists": [{ "id": 7, "name": "Artist" }],
        "album": { "id": 77640617, "title": "Album" },
        "audioQuality": "LOSSLESS",
    })
}

fn catalog_guard(service: &FakeService, headers: &HeaderMap, query: &HashMap<String, String>) -> Option<Response> {
    *service.last_country.lock().unwrap() = query.get("countryCode").cloned();
    if service.outage.load(Ordering::SeqCst) {
        return Some(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }
    if !service.authorized(headers) {
        return Some(
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "status": 401, "subStatus": 11003, "userMessage": "expired token" })),
            )
                .into_response(),
        );
    }
    None
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "status": 404, "subStatus": 2001, "userMessage": format!("{what} not found") })),
    )
        .into_response()
}

async fn track(
    Extension(service): Extension<Arc<FakeService>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    service.track_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(rejection) = catalog_guard(&service, &headers, &query) {
        return rejection;
    }

    let title = service.media.lock().unwrap().get(&id).map(|e| e.title.clone());
    match title {
        Some(title) => Json(track_json(&id, &title)).into_response(),
        None => not_found("track"),
    }
}

async fn playback_info(
    Extension(service): Extension<Arc<FakeService>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    service.playback_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(rejection) = catalog_guard(&service, &headers, &query) {
        return rejection;
    }
    assert_eq!(query.get("playbackmode").map(String::as_str), Some("STREAM"));

    let entry = service.media.lock().unwrap().get(&id).cloned();
    let Some(entry) = entry else {
        return not_found("track");
    };

    let base = service.base.lock().unwrap().clone();
    let manifest_mime_type = if entry.dash { DASH_MIME_TYPE } else { BTS_MIME_TYPE };
    let manifest = encode_manifest(&BtsManifest {
        mime_type: entry.mime.clone(),
        codecs: None,
        encryption_type: Some("NONE".to_string()),
        urls: vec![format!("{base}/media/{id}")],
    });
    Json(json!({
        "trackId": id.parse::<u64>().unwrap_or(0),
        "audioQuality": query.get("audioquality"),
        "manifestMimeType": manifest_mime_type,
        "manifest": manifest,
    }))
    .into_response()
}

/// Base64 JSON, the way the service ships BTS manifests.
fn encode_manifest(manifest: &BtsManifest) -> String {
    STANDARD.encode(serde_json::to_vec(manifest).unwrap())
}

async fn album_items(
    Extension(service): Extension<Arc<FakeService>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Some(rejection) = catalog_guard(&service, &headers, &query) {
        return rejection;
    }
    if id != ALBUM_ID {
        return not_found("album");
    }

    let mut ids: Vec<String> = service.media.lock().unwrap().keys().cloned().collect();
    ids.sort();
    let mut items: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| json!({ "item": track_json(id, "Song"), "type": "track" }))
        .collect();
    items.push(json!({ "item": null, "type": "video" }));
    Json(json!({ "items": items, "totalNumberOfItems": items.len() })).into_response()
}

async fn media(Extension(service): Extension<Arc<FakeService>>, Path(id): Path<String>) -> Response {
    service.media_calls.fetch_add(1, Ordering::SeqCst);
    let entry = service.media.lock().unwrap().get(&id).cloned();
    let Some(entry) = entry else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let total = entry.data.len();
    let body = match entry.mode {
        MediaMode::Full => Body::from(entry.data),
        MediaMode::DropAt(at) => chunked(entry.data[..at.min(total)].to_vec(), Duration::ZERO, true),
        MediaMode::Slow(pause) => chunked(entry.data, pause, false),
    };

    Response::builder()
        .header(header::CONTENT_TYPE, entry.mime)
        .header(header::CONTENT_LENGTH, total)
        .body(body)
        .unwrap()
}

/// Streams `data` in 4 KiB pieces, optionally failing once it ran out.
fn chunked(data: Vec<u8>, pause: Duration, fail: bool) -> Body {
    let chunks: Vec<Bytes> = data.chunks(4096).map(Bytes::copy_from_slice).collect();
    let stream = futures::stream::unfold(
        (chunks.into_iter(), fail),
        move |(mut chunks, fail)| async move {
            match chunks.next() {
                Some(chunk) => {
                    if !pause.is_zero() {
                        tokio::time::sleep(pause).await;
                    }
                    Some((Ok(chunk), (chunks, fail)))
                }
                None if fail => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Err(io::Error::other("connection reset")), (chunks, false)))
                }
                None => None,
            }
        },
    );
    Body::from_stream(stream)
}

/// A fake service, a temp dir for credentials and downloads, and settings
/// pointing at both.
pub struct Harness {
    pub service: Arc<FakeService>,
    pub base: String,
    pub dir: TempDir,
    pub settings: Arc<Settings>,
}

impl Harness {
    pub async fn new() -> Self {
        let service = FakeService::new();
        let base = start(Arc::clone(&service)).await;
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_base_url(&base, dir.path().join("credentials.json"));
        Harness {
            service,
            base,
            dir,
            settings: Arc::new(settings),
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.dir.path().join("credentials.json")
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(self.credentials_path())
    }

    /// Stores `bundle` (if any) and restores a session from it.
    pub async fn session(&self, bundle: Option<TokenBundle>) -> Arc<AuthSession> {
        if let Some(bundle) = bundle {
            self.store().save(&bundle).await.unwrap();
        }
        Arc::new(AuthSession::restore(Arc::clone(&self.settings), self.store()).await)
    }

    /// Session holding a token the fake accepts for the next hour.
    pub async fn logged_in(&self) -> Arc<AuthSession> {
        self.session(Some(bundle("access-0", 3600))).await
    }
}

/// Bundle whose access token expires `expires_in` seconds from now.
pub fn bundle(access: &str, expires_in: i64) -> TokenBundle {
    TokenBundle {
        access_token: access.to_string(),
        refresh_token: "refresh-0".to_string(),
        expires_at: Utc::now().timestamp() + expires_in,
        user_id: Some(42),
        username: Some("listener".to_string()),
        country_code: None,
    }
}

/// Deterministic pseudo-random payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

/// Mono 16-bit WAV with a sine tone.
pub fn wav(seconds: f32, sample_rate: u32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let frames = (seconds * sample_rate as f32) as u32;
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (t * 440.0 * 2.0 * PI).sin() * 0.3;
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Names of all entries in `dir`, hidden ones included.
pub fn entries(dir: &std::path::Path) -> Vec<String> {
    match std::fs::read_dir(dir) {
        Ok(read) => read
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
