//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated (TIME_CRITICAL on
//! Windows) priority. It **must not**:
//! - Allocate heap memory (beyond the first-callback mix buffer growth)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by converting samples in place and writing
//! into an SPSC ring buffer producer whose `push_slice` is lock-free.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioCapture` therefore must be created and dropped on the same thread.
//! The pipeline accomplishes this by calling `open_default` inside `spawn_blocking`.

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use crate::{
    buffering::{AudioProducer, Producer},
    error::{Result, VoxgateError},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to
    /// default input device and then first available device.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| VoxgateError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(VoxgateError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| VoxgateError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer, &running),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer, &running),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer, &running),
            SampleFormat::U8 => build_stream::<u8>(&device, &config, producer, &running),
            fmt => {
                return Err(VoxgateError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VoxgateError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone and push f32 PCM frames into `producer`.
    ///
    /// Must be called from the thread that will also drop this value.
    /// In practice this means calling it inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// Returns `VoxgateError::NoDefaultInputDevice` when no microphone is available,
    /// or `VoxgateError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Build the capture stream for one concrete sample type.
///
/// Every format funnels through the same callback: convert to f32, mix the
/// interleaved channels down to mono, push into the ring.
#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: &Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let running = Arc::clone(running);
    let mut mix_buf: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mix_buf.resize(frames, 0.0);
                for (frame, out) in data.chunks_exact(channels).zip(mix_buf.iter_mut()) {
                    let mut sum = 0f32;
                    for &s in frame {
                        sum += f32::from_sample(s);
                    }
                    *out = sum / channels as f32;
                }
                let written = producer.push_slice(&mix_buf);
                if written < mix_buf.len() {
                    warn!(
                        "ring buffer full: dropped {} frames",
                        mix_buf.len() - written
                    );
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| VoxgateError::AudioStream(e.to_string()))
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(VoxgateError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(producer: AudioProducer, running: Arc<AtomicBool>) -> Result<Self> {
        Self::open_with_preference(producer, running, None)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
