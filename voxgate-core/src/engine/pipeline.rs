//! Blocking pipeline loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → pending sample queue
//! 2. For each complete frame_interval block:
//!    a. Slide the block into the spectrum analyzer's window
//!    b. Compute the dB frame
//!    c. Tick the detector (energy → trend → floor → commit)
//!    d. Broadcast ActivityEvent; on a committed edge, broadcast
//!       VoiceEvent and invoke the injected callback
//! ```
//!
//! This entire loop runs in `spawn_blocking`, keeping the Tokio async
//! executor free for the host's own I/O.

use std::sync::OnceLock;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::{
    buffering::{AudioConsumer, Consumer},
    engine::EdgeHooks,
    events::{ActivityEvent, VoiceEvent},
    spectrum::SpectrumAnalyzer,
    vad::{Detector, Edge, Tick},
};

pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub ticks: AtomicUsize,
    pub edges_started: AtomicUsize,
    pub edges_stopped: AtomicUsize,
}

impl Default for PipelineDiagnostics {
    fn default() -> Self {
        Self {
            samples_in: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
            edges_started: AtomicUsize::new(0),
            edges_stopped: AtomicUsize::new(0),
        }
    }
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.edges_started.store(0, Ordering::Relaxed);
        self.edges_stopped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            edges_started: self.edges_started.load(Ordering::Relaxed),
            edges_stopped: self.edges_stopped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub ticks: usize,
    pub edges_started: usize,
    pub edges_stopped: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub detector: Detector,
    pub analyzer: SpectrumAnalyzer,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    pub voice_tx: broadcast::Sender<VoiceEvent>,
    pub activity_tx: broadcast::Sender<ActivityEvent>,
    pub hooks: Arc<Mutex<EdgeHooks>>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Chunk size drained from the ring buffer per iteration.
/// 20 ms at 48 kHz = 960 samples; frame blocks are cut from the pending
/// queue, so the drain size does not have to match `frame_interval`.
const DRAIN_CHUNK: usize = 960;

/// Minimum sleep when the ring is empty (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

/// Cadence of the periodic level log, in ticks.
const LEVEL_LOG_EVERY: u64 = 50;

/// Run the blocking pipeline until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    let frame_interval = ctx.detector.config().frame_interval;
    info!(
        sample_rate = ctx.detector.config().sample_rate,
        frame_interval,
        tick_ms = format_args!("{:.2}", ctx.detector.config().tick_period() * 1_000.0),
        "pipeline started"
    );

    // Scratch buffer for ring drains, reused each iteration.
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // Samples drained but not yet consumed as a full frame block.
    let mut pending: Vec<f32> = Vec::with_capacity(DRAIN_CHUNK + frame_interval);
    // Independent sequence for activity events.
    let mut activity_seq = 0u64;

    loop {
        // ── 0. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 1. Drain ring buffer ──────────────────────────────────────────
        let n = ctx.consumer.pop_slice(&mut raw);

        if n == 0 {
            // Nothing to process — yield to avoid burning 100 % CPU.
            // A partial block in `pending` needs more samples anyway.
            std::thread::sleep(Duration::from_millis(empty_sleep_ms()));
            continue;
        }

        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);
        pending.extend_from_slice(&raw[..n]);

        // ── 2. Tick once per complete frame block ─────────────────────────
        let mut consumed = 0;
        while pending.len() - consumed >= frame_interval {
            let block = &pending[consumed..consumed + frame_interval];
            consumed += frame_interval;

            ctx.analyzer.push(block);
            let frame = ctx.analyzer.db_frame();
            let tick = ctx.detector.process(frame);
            ctx.diagnostics.ticks.fetch_add(1, Ordering::Relaxed);

            trace!(
                energy = tick.energy,
                signal = tick.signal,
                offset = tick.offset,
                threshold_pos = tick.threshold_pos,
                threshold_neg = tick.threshold_neg,
                trend = tick.trend,
                active = tick.active,
                "tick"
            );

            let _ = ctx.activity_tx.send(ActivityEvent {
                seq: activity_seq,
                energy: tick.energy,
                signal: tick.signal,
                active: tick.active,
            });
            activity_seq = activity_seq.saturating_add(1);

            // Log gate level periodically for diagnostics.
            if activity_seq % LEVEL_LOG_EVERY == 0 {
                debug!(
                    energy = format_args!("{:.3e}", tick.energy),
                    offset = format_args!("{:.3e}", tick.offset),
                    trend = tick.trend,
                    active = tick.active,
                    "gate level check"
                );
            }

            if let Some(edge) = tick.edge {
                emit_edge(&mut ctx, edge, &tick);
            }
        }
        if consumed > 0 {
            pending.drain(..consumed);
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        ticks = snap.ticks,
        edges_started = snap.edges_started,
        edges_stopped = snap.edges_stopped,
        "pipeline stopped — diagnostics"
    );
}

/// Broadcast a committed edge and invoke the matching injected callback.
fn emit_edge(ctx: &mut PipelineContext, edge: Edge, tick: &Tick) {
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    match edge {
        Edge::Start => ctx.diagnostics.edges_started.fetch_add(1, Ordering::Relaxed),
        Edge::Stop => ctx.diagnostics.edges_stopped.fetch_add(1, Ordering::Relaxed),
    };

    let emitted = ctx.voice_tx.send(VoiceEvent { seq, edge }).is_ok();
    info!(
        seq,
        ?edge,
        signal = format_args!("{:.3e}", tick.signal),
        trend = tick.trend,
        emitted,
        "voice edge"
    );

    // Edges are rare, so taking the hook lock here stays off the hot path.
    let mut hooks = ctx.hooks.lock();
    let hook = match edge {
        Edge::Start => hooks.on_start.as_mut(),
        Edge::Stop => hooks.on_stop.as_mut(),
    };
    if let Some(f) = hook {
        f();
    }
}

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("VOXGATE_PIPELINE_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}
