//! `VoxgateEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! VoxgateEngine::new()       → config validated, status = Idle
//!     └─► start()            → audio open, pipeline spawned, status = Listening
//!         └─► stop()         → running=false, stream dropped, status = Stopped
//! ```
//!
//! `start()`/`stop()` are idempotent: calling them in the wrong state returns
//! an error rather than panicking.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! `AudioCapture` is therefore created *inside* the `spawn_blocking` closure so
//! it never crosses a thread boundary. A bounded(1) crossbeam channel carries
//! the open result (and the device's actual sample rate) back to the `start()`
//! caller.

pub mod pipeline;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    audio::AudioCapture,
    buffering::create_audio_ring,
    error::{Result, VoxgateError},
    events::{ActivityEvent, EngineStatus, EngineStatusEvent, VoiceEvent},
    spectrum::SpectrumAnalyzer,
    vad::{Detector, DetectorConfig},
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `VoxgateEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Detector tuning. `sample_rate` is overridden by the actual capture
    /// rate once a device is open.
    pub detector: DetectorConfig,
    /// Spectral magnitude smoothing across frames, in [0, 1).
    /// Default: 0.99.
    pub smoothing_time_constant: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            smoothing_time_constant: 0.99,
        }
    }
}

/// The two edge callbacks a host can inject.
///
/// Invoked on the pipeline thread right after the corresponding edge
/// commits, so keep them short; anything slow belongs behind a channel.
#[derive(Default)]
pub struct EdgeHooks {
    pub on_start: Option<Box<dyn FnMut() + Send>>,
    pub on_stop: Option<Box<dyn FnMut() + Send>>,
}

/// The top-level engine handle.
///
/// `VoxgateEngine` is `Send + Sync` — all fields use interior mutability.
/// Wrap in `Arc<VoxgateEngine>` to share between the host and
/// event-forwarding async tasks.
pub struct VoxgateEngine {
    config: EngineConfig,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    /// Canonical status (written atomically via Mutex, read from hosts).
    status: Arc<Mutex<EngineStatus>>,
    /// Injected edge callbacks, shared with the pipeline thread.
    hooks: Arc<Mutex<EdgeHooks>>,
    /// Broadcast sender for voice edge events.
    voice_tx: broadcast::Sender<VoiceEvent>,
    /// Broadcast sender for status events.
    status_tx: broadcast::Sender<EngineStatusEvent>,
    /// Broadcast sender for per-tick activity events.
    activity_tx: broadcast::Sender<ActivityEvent>,
    /// Monotonically increasing edge sequence counter.
    seq: Arc<AtomicU64>,
    /// Shared pipeline diagnostics counters.
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
}

impl VoxgateEngine {
    /// Create a new engine. Does not start capturing — call `start()`.
    ///
    /// # Errors
    /// `VoxgateError::Config` if the detector config or smoothing constant
    /// is unusable; the engine is never constructed in a bad state.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.detector.validate()?;
        if !(0.0..1.0).contains(&config.smoothing_time_constant) {
            return Err(VoxgateError::Config(format!(
                "smoothing_time_constant must be in [0, 1), got {}",
                config.smoothing_time_constant
            )));
        }

        let (voice_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            hooks: Arc::new(Mutex::new(EdgeHooks::default())),
            voice_tx,
            status_tx,
            activity_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
        })
    }

    /// Register the callback invoked when the gate opens.
    /// Replaces any previously registered callback.
    pub fn on_start<F>(&self, f: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.hooks.lock().on_start = Some(Box::new(f));
    }

    /// Register the callback invoked when the gate closes.
    /// Replaces any previously registered callback.
    pub fn on_stop<F>(&self, f: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.hooks.lock().on_stop = Some(Box::new(f));
    }

    /// Start audio capture and the pipeline.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. The pipeline continues running in a background blocking
    /// thread, so a tokio runtime must be active.
    ///
    /// # Errors
    /// - `VoxgateError::AlreadyRunning` if already started.
    /// - `VoxgateError::NoDefaultInputDevice` / `VoxgateError::AudioStream`
    ///   on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// If `preferred_input_device` is `None`, default input selection is used.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(VoxgateError::AlreadyRunning);
        }

        self.diagnostics.reset();
        self.running.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_audio_ring();

        // Clone all Arc-wrapped state before moving into the closure.
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let hooks = Arc::clone(&self.hooks);
        let voice_tx = self.voice_tx.clone();
        let activity_tx = self.activity_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Bounded(1) ack: the pipeline thread reports open success/failure,
        // carrying the actual capture sample rate on success.
        let (open_tx, open_rx) = crossbeam_channel::bounded::<Result<u32>>(1);

        tokio::task::spawn_blocking(move || {
            // ── Open audio device (must happen on THIS thread — cpal::Stream is !Send) ──
            let capture = match AudioCapture::open_with_preference(
                producer,
                Arc::clone(&running),
                preferred_input_device.as_deref(),
            ) {
                Ok(c) => c,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            // ── Build detector + analyzer at the device's real rate ──────────
            let detector_config = DetectorConfig {
                sample_rate: capture.sample_rate,
                ..config.detector
            };
            let built = Detector::new(detector_config).and_then(|detector| {
                let analyzer = SpectrumAnalyzer::new(
                    detector.config().transform_size,
                    config.smoothing_time_constant,
                    detector.config().sample_rate,
                )?;
                Ok((detector, analyzer))
            });
            let (detector, analyzer) = match built {
                Ok(pair) => pair,
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    // capture drops here, releasing the device.
                    return;
                }
            };

            let _ = open_tx.send(Ok(capture.sample_rate));

            // ── Run pipeline ──────────────────────────────────────────────────
            pipeline::run(pipeline::PipelineContext {
                detector,
                analyzer,
                consumer,
                running,
                voice_tx,
                activity_tx,
                hooks,
                seq,
                diagnostics,
            });

            // Stream drops here, releasing the audio device on this thread.
            drop(capture);
        });

        // Block start() until device open is confirmed (receives actual sample rate).
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                self.set_status(EngineStatus::Listening, None);
                info!(sample_rate = rate, "engine started — listening");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent — spawn_blocking panicked?
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(VoxgateError::Other(anyhow::anyhow!(
                    "pipeline task died unexpectedly"
                )))
            }
        }
    }

    /// Stop audio capture and the pipeline.
    ///
    /// # Errors
    /// - `VoxgateError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(VoxgateError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Subscribe to committed voice edge events.
    pub fn subscribe_edges(&self) -> broadcast::Receiver<VoiceEvent> {
        self.voice_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-tick activity events (energy, signal, gate state).
    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_bad_detector_config() {
        let config = EngineConfig {
            detector: DetectorConfig {
                transform_size: 300,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            VoxgateEngine::new(config),
            Err(VoxgateError::Config(_))
        ));
    }

    #[test]
    fn new_rejects_bad_smoothing() {
        let config = EngineConfig {
            smoothing_time_constant: 1.0,
            ..Default::default()
        };
        assert!(VoxgateEngine::new(config).is_err());
    }

    #[test]
    fn fresh_engine_is_idle_and_refuses_stop() {
        let engine = VoxgateEngine::new(EngineConfig::default()).unwrap();
        assert_eq!(engine.status(), EngineStatus::Idle);
        assert!(matches!(engine.stop(), Err(VoxgateError::NotRunning)));
    }
}
