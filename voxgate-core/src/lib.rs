//! # voxgate-core
//!
//! Reusable adaptive voice-activity gate SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → Pipeline(spawn_blocking)
//!                                                    │
//!                                           SpectrumAnalyzer (dB frame)
//!                                                    │
//!                                            Detector (gate decision)
//!                                                    │
//!                                    broadcast::Sender<VoiceEvent> + hooks
//! ```
//!
//! The audio callback is zero-alloc. All heap work happens in the pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod spectrum;
pub mod vad;

// Convenience re-exports for downstream crates
pub use engine::{EdgeHooks, EngineConfig, VoxgateEngine};
pub use error::{Result, VoxgateError};
pub use events::{ActivityEvent, EngineStatus, EngineStatusEvent, VoiceEvent};
pub use spectrum::SpectrumAnalyzer;
pub use vad::{Detector, DetectorConfig, Edge, FilterBand, Tick};
