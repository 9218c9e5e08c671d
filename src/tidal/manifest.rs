use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    error::{Error, Result},
    types::{BtsManifest, PlaybackInfo},
};

pub const BTS_MIME_TYPE: &str = "application/vnd.tidal.bts";
pub const DASH_MIME_TYPE: &str = "application/dash+xml";

/// Decodes the base64 manifest of a playback-info response.
///
/// Only unencrypted BTS manifests are supported; they point straight at a
/// single media file. DASH manifests (segmented hi-res streams) are rejected.
pub fn decode(info: &PlaybackInfo) -> Result<BtsManifest> {
    match info.manifest_mime_type.as_str() {
        BTS_MIME_TYPE => {}
        DASH_MIME_TYPE => {
            return Err(Error::UnsupportedManifest(
                "segmented DASH stream, request LOSSLESS or lower".to_string(),
            ));
        }
        other => return Err(Error::UnsupportedManifest(other.to_string())),
    }

    let raw = STANDARD
        .decode(info.manifest.trim())
        .map_err(|e| Error::UnsupportedManifest(format!("invalid base64: {e}")))?;
    let manifest: BtsManifest = serde_json::from_slice(&raw)
        .map_err(|e| Error::UnsupportedManifest(format!("invalid manifest: {e}")))?;

    match manifest.encryption_type.as_deref() {
        None | Some("NONE") => {}
        Some(other) => {
            return Err(Error::UnsupportedManifest(format!("encrypted stream ({other})")));
        }
    }
    if manifest.urls.is_empty() {
        return Err(Error::UnsupportedManifest("manifest lists no media URL".to_string()));
    }

    Ok(manifest)
}
