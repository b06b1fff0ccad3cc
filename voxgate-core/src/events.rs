//! Event types broadcast by the engine.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them over whatever transport they use (stdout JSON lines, IPC,
//! websockets) without re-mapping.

use serde::{Deserialize, Serialize};

use crate::vad::Edge;

// ---------------------------------------------------------------------------
// Voice edge events
// ---------------------------------------------------------------------------

/// Emitted once per committed voice-state transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Which way the gate moved.
    pub edge: Edge,
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

/// Emitted once per detector tick — a live meter of what the gate sees.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Weighted band energy of the tick's frame.
    pub energy: f64,
    /// Energy minus the noise floor the tick was judged against.
    pub signal: f64,
    /// Debounced voice-active state after the tick.
    pub active: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Emitted when the engine lifecycle state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Actively capturing audio and gating.
    Listening,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
