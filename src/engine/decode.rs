use std::{
    io::{self, ErrorKind, Read},
    time::Duration,
};

use bytes::{Buf, Bytes};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, ReadOnlySource},
    meta::MetadataOptions,
    probe::Hint,
};
use tokio::sync::mpsc;

use crate::{
    engine::output::AudioSpec,
    error::{Error, Result},
};

/// Blocking [`Read`] over the receiving end of a byte pipeline.
///
/// Must only be used from a blocking thread. A closed channel reads as end of
/// stream; whether that end was clean is decided from the pipe summary.
pub struct FeedReader {
    rx: mpsc::Receiver<Bytes>,
    front: Bytes,
}

impl FeedReader {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        FeedReader {
            rx,
            front: Bytes::new(),
        }
    }
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.front.is_empty() {
            match self.rx.blocking_recv() {
                Some(chunk) => self.front = chunk,
                None => return Ok(0),
            }
        }

        let n = self.front.len().min(buf.len());
        buf[..n].copy_from_slice(&self.front[..n]);
        self.front.advance(n);
        Ok(n)
    }
}

/// One decoded packet, interleaved.
#[derive(Debug)]
pub struct DecodedChunk {
    pub spec: AudioSpec,
    pub samples: Vec<f32>,
    pub duration: Duration,
}

/// Incremental decoder over a forward-only byte source.
pub struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

impl StreamDecoder {
    /// Probes the container. Blocks until enough bytes arrived to identify it.
    pub fn open<R>(reader: R, extension: Option<&str>) -> Result<Self>
    where
        R: Read + Send + Sync + 'static,
    {
        let source = ReadOnlySource::new(reader);
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("cannot identify stream: {e}")))?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| Error::Decode("stream has no audio track".to_string()))?;
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("unsupported codec: {e}")))?;

        tracing::debug!(
            sample_rate = ?track.codec_params.sample_rate,
            channels = ?track.codec_params.channels.map(|c| c.count()),
            "decoder opened"
        );

        Ok(StreamDecoder {
            format,
            decoder,
            track_id,
        })
    }

    /// Decodes the next packet. `None` marks the end of the stream.
    ///
    /// Corrupt packets are skipped; a dropped connection surfaces as an early
    /// end here and is classified by the caller.
    pub fn next_chunk(&mut self) -> Result<Option<DecodedChunk>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(Error::Decode(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = e, "skipping corrupt packet");
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            let frames = decoded.frames();
            if frames == 0 {
                continue;
            }

            let signal = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, signal);
            buffer.copy_interleaved_ref(decoded);

            let spec = AudioSpec {
                channels: signal.channels.count() as u16,
                sample_rate: signal.rate,
            };
            return Ok(Some(DecodedChunk {
                spec,
                samples: buffer.samples().to_vec(),
                duration: spec.duration_of(frames),
            }));
        }
    }
}
