use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::types::{DescriptorTableRow, StreamDescriptor, StreamFormat, Track, TrackTableRow};

/// Keeps alphanumerics, spaces, `-` and `_`; trims the result.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"{artist} - {title}.{ext}"`, or `track_{id}.{ext}` when the metadata
/// sanitises to nothing.
pub fn file_name_for(track: Option<&Track>, resource_id: &str, extension: &str) -> String {
    let stem = track
        .map(|t| sanitize_filename(&t.display_title()))
        .filter(|s| !s.is_empty() && s != "-");

    match stem {
        Some(stem) => format!("{stem}.{extension}"),
        None => format!("track_{}.{extension}", sanitize_filename(resource_id)),
    }
}

/// File extension for a stream, from the codec first and the MIME type second.
pub fn extension_for(format: &StreamFormat) -> &'static str {
    let codec = format.codec.as_deref().unwrap_or_default().to_ascii_lowercase();
    if codec == "flac" {
        return "flac";
    }
    if codec.starts_with("mp4a") || codec == "aac" || codec == "alac" {
        return "m4a";
    }
    if codec == "mp3" {
        return "mp3";
    }

    match format.mime_type.to_ascii_lowercase().as_str() {
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/mpeg" | "audio/mp3" => "mp3",
        _ => "bin",
    }
}

/// `m:ss`, or `h:mm:ss` from one hour on.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Local time of a unix timestamp plus how far away it is from `now`.
pub fn format_expiry(expires_at: i64, now: i64) -> String {
    let when = DateTime::from_timestamp(expires_at, 0)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| expires_at.to_string());

    let left = expires_at - now;
    if left <= 0 {
        return format!("{when} (expired)");
    }
    format!("{when} (in {})", format_duration(Duration::from_secs(left as u64)))
}

/// Field/value rows describing a resolved stream, for `tidecli resolve`.
///
/// Optional fields (codec, quality, duration, size) only appear when known.
pub fn descriptor_rows(descriptor: &StreamDescriptor) -> Vec<DescriptorTableRow> {
    let mut rows = vec![
        ("id", descriptor.resource_id.clone()),
        ("format", descriptor.format.mime_type.clone()),
    ];
    if let Some(track) = &descriptor.track {
        rows.insert(1, ("track", track.display_title()));
    }
    if let Some(codec) = &descriptor.format.codec {
        rows.push(("codec", codec.clone()));
    }
    if let Some(quality) = descriptor.format.quality {
        rows.push(("quality", quality.to_string()));
    }
    if let Some(duration) = descriptor.expected_duration {
        rows.push(("duration", format_duration(duration)));
    }
    if let Some(size) = descriptor.expected_size {
        rows.push(("size", format!("{size} bytes")));
    }
    rows.push(("url", descriptor.media_url.clone()));

    rows.into_iter()
        .map(|(field, value)| DescriptorTableRow {
            field: field.to_string(),
            value,
        })
        .collect()
}

/// One table row per track, in the given order. Tracks without an artist
/// show `-`.
pub fn track_rows(tracks: &[Track]) -> Vec<TrackTableRow> {
    tracks
        .iter()
        .map(|t| TrackTableRow {
            id: t.id,
            title: t.title.clone(),
            artist: t.artist_name().unwrap_or("-").to_string(),
            duration: format_duration(Duration::from_secs(t.duration)),
        })
        .collect()
}

/// Lets through at most one event per interval.
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    /// Throttle letting one event through per `interval`.
    pub fn new(interval: Duration) -> Self {
        ProgressThrottle {
            interval,
            last: None,
        }
    }

    /// True when an event at `now` should be reported; the first one always is.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
