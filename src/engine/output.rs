use std::time::Duration;

use rodio::{OutputStream, OutputStreamBuilder, Sink, buffer::SamplesBuffer};

use crate::error::{Error, Result};

/// Layout of interleaved `f32` samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioSpec {
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

/// An open output device fed with decoded chunks.
///
/// Devices are opened, fed and closed on the same blocking thread, so they do
/// not need to be `Send`.
pub trait AudioDevice {
    /// Queues one chunk behind those already queued.
    fn enqueue(&mut self, spec: AudioSpec, samples: Vec<f32>) -> Result<()>;

    /// Chunks queued but not fully played yet.
    fn queued(&self) -> usize;

    /// Starts (or resumes) audible output.
    fn start(&mut self);

    /// Drops everything queued and releases the device. Must be idempotent.
    fn close(&mut self);
}

/// Factory for output devices, shared across playbacks.
pub trait AudioOutput: Send + Sync + 'static {
    fn open(&self, spec: AudioSpec) -> Result<Box<dyn AudioDevice>>;
}

/// The system's default output through rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl AudioOutput for RodioOutput {
    fn open(&self, spec: AudioSpec) -> Result<Box<dyn AudioDevice>> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| Error::AudioDevice(e.to_string()))?;
        // rodio reports the drop of the stream on stderr
        stream.log_on_drop(false);

        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        tracing::debug!(channels = spec.channels, rate = spec.sample_rate, "audio device opened");

        Ok(Box::new(RodioDevice {
            sink: Some(sink),
            stream: Some(stream),
        }))
    }
}

struct RodioDevice {
    sink: Option<Sink>,
    stream: Option<OutputStream>,
}

impl AudioDevice for RodioDevice {
    fn enqueue(&mut self, spec: AudioSpec, samples: Vec<f32>) -> Result<()> {
        let sink = self
            .sink
            .as_ref()
            .ok_or_else(|| Error::AudioDevice("device already closed".to_string()))?;
        sink.append(SamplesBuffer::new(spec.channels, spec.sample_rate, samples));
        Ok(())
    }

    fn queued(&self) -> usize {
        self.sink.as_ref().map_or(0, |sink| sink.len())
    }

    fn start(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn close(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        if self.stream.take().is_some() {
            tracing::debug!("audio device closed");
        }
    }
}

impl Drop for RodioDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Closes the wrapped device on every exit path, including unwinding.
pub(crate) struct DeviceGuard(pub Box<dyn AudioDevice>);

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}
