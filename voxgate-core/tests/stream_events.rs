use std::f64::consts::PI;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use voxgate_core::buffering::{create_audio_ring, Producer};
use voxgate_core::engine::{pipeline, EdgeHooks};
use voxgate_core::events::VoiceEvent;
use voxgate_core::spectrum::SpectrumAnalyzer;
use voxgate_core::vad::{Detector, DetectorConfig, Edge, FilterBand};

/// 8 kHz capture, 128-point transform, one tick per 128 samples (16 ms),
/// all bins weighted 1. Smoothing is disabled so the dB frames follow the
/// input without lag and the tick indices below stay exact.
fn gate_config() -> DetectorConfig {
    DetectorConfig {
        sample_rate: 8_000,
        transform_size: 128,
        frame_interval: 128,
        filter_shape: vec![FilterBand::new(4_000.0, 1.0)],
        ..Default::default()
    }
}

/// One frame block of a 1 kHz unit tone — exactly 16 cycles per block, so
/// repeated blocks form a phase-continuous tone landing on bin 16.
fn tone_block() -> Vec<f32> {
    (0..128)
        .map(|i| (2.0 * PI * 1_000.0 * i as f64 / 8_000.0).sin() as f32)
        .collect()
}

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<VoiceEvent>,
    timeout: Duration,
) -> VoiceEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for voice event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("voice channel closed unexpectedly"),
        }
    }
}

fn spawn_pipeline(
    consumer: voxgate_core::buffering::AudioConsumer,
    running: Arc<AtomicBool>,
    voice_tx: broadcast::Sender<VoiceEvent>,
    hooks: Arc<Mutex<EdgeHooks>>,
) -> (
    thread::JoinHandle<()>,
    Arc<pipeline::PipelineDiagnostics>,
) {
    let cfg = gate_config();
    let analyzer =
        SpectrumAnalyzer::new(cfg.transform_size, 0.0, cfg.sample_rate).expect("analyzer");
    let (activity_tx, _) = broadcast::channel(256);
    let diagnostics = Arc::new(pipeline::PipelineDiagnostics::default());

    let ctx = pipeline::PipelineContext {
        detector: Detector::new(cfg).expect("detector"),
        analyzer,
        consumer,
        running,
        voice_tx,
        activity_tx,
        hooks,
        seq: Arc::new(AtomicU64::new(0)),
        diagnostics: Arc::clone(&diagnostics),
    };

    (thread::spawn(move || pipeline::run(ctx)), diagnostics)
}

#[test]
fn gate_open_latency_under_500ms() {
    let (mut producer, consumer) = create_audio_ring();
    let tone = tone_block();
    for _ in 0..20 {
        producer.push_slice(&tone);
    }

    let running = Arc::new(AtomicBool::new(true));
    let (voice_tx, mut voice_rx) = broadcast::channel(16);
    let hooks = Arc::new(Mutex::new(EdgeHooks::default()));

    let start = Instant::now();
    let (handle, _) = spawn_pipeline(consumer, Arc::clone(&running), voice_tx, hooks);

    let first = recv_event_with_timeout(&mut voice_rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    running.store(false, Ordering::SeqCst);
    handle.join().expect("pipeline thread panicked");

    assert_eq!(first.edge, Edge::Start);
    assert!(
        elapsed < Duration::from_millis(500),
        "gate open latency too high: {:?} (target < 500ms)",
        elapsed
    );
}

#[test]
fn two_bursts_emit_strictly_alternating_edges() {
    let (mut producer, consumer) = create_audio_ring();
    let tone = tone_block();
    let silence = vec![0.0f32; 128 * 30];
    // Burst A, gap, burst B, gap — 100 ticks in total.
    for _ in 0..20 {
        producer.push_slice(&tone);
    }
    producer.push_slice(&silence);
    for _ in 0..20 {
        producer.push_slice(&tone);
    }
    producer.push_slice(&silence);

    let running = Arc::new(AtomicBool::new(true));
    let (voice_tx, mut voice_rx) = broadcast::channel(16);

    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));
    let hooks = Arc::new(Mutex::new(EdgeHooks::default()));
    {
        let starts = Arc::clone(&starts);
        let stops = Arc::clone(&stops);
        let mut guard = hooks.lock();
        guard.on_start = Some(Box::new(move || {
            starts.fetch_add(1, Ordering::Relaxed);
        }));
        guard.on_stop = Some(Box::new(move || {
            stops.fetch_add(1, Ordering::Relaxed);
        }));
    }

    let (handle, diagnostics) =
        spawn_pipeline(consumer, Arc::clone(&running), voice_tx, hooks);

    let mut edges = Vec::new();
    for _ in 0..4 {
        edges.push(recv_event_with_timeout(&mut voice_rx, Duration::from_secs(2)));
    }

    running.store(false, Ordering::SeqCst);
    handle.join().expect("pipeline thread panicked");

    let kinds: Vec<Edge> = edges.iter().map(|ev| ev.edge).collect();
    assert_eq!(kinds, vec![Edge::Start, Edge::Stop, Edge::Start, Edge::Stop]);
    let seqs: Vec<u64> = edges.iter().map(|ev| ev.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    assert_eq!(starts.load(Ordering::Relaxed), 2);
    assert_eq!(stops.load(Ordering::Relaxed), 2);

    let snap = diagnostics.snapshot();
    assert_eq!(snap.ticks, 100);
    assert_eq!(snap.samples_in, 128 * 100);
    assert_eq!(snap.edges_started, 2);
    assert_eq!(snap.edges_stopped, 2);
}
