//! Two-stage pipeline: ingestion queue, preprocessing worker, prepared
//! queue, playback worker.
//!
//! The idle loop owns the transport whenever no clip is playing. The playback
//! worker borrows it for the length of a session and hands it back under the
//! control mutex, which also serialises `clear`. Admission only takes the
//! short `admission` lock, so it never waits on the idle loop.

use crate::artifacts::ArtifactStore;
use crate::audio;
use crate::config::Config;
use crate::defaults::{IDLE_RESUME_POLL_MS, REPORT_BUFFER};
use crate::encode::{BlendEncoder, FrameEncoder, FrameTime, LiveLinkEncoder};
use crate::error::{FacelinkError, Result};
use crate::frame::FrameSequence;
use crate::idle::{IdleClip, IdleLoop};
use crate::inference::{self, AnimationGenerator};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::post_processor::PostProcessor;
use crate::pipeline::preprocess::{PreprocessStation, generate_frames};
use crate::pipeline::station::StationRunner;
use crate::pipeline::types::{
    AudioRequest, Counters, Job, PlaybackOutcome, PlaybackReport, PreparedClip, SchedulerStatus,
};
use crate::playback::{PlaybackSession, SyncPlayer};
use crate::transport::{self, FrameTransport};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Control {
    idle: IdleLoop,
    in_session: bool,
}

struct Shared {
    control: Mutex<Control>,
    /// Orders `submit` against the shutdown sentinel.
    admission: Mutex<()>,
    ingest_tx: Sender<Job<AudioRequest>>,
    ingest_rx: Receiver<Job<AudioRequest>>,
    prepared_tx: Sender<Job<PreparedClip>>,
    prepared_rx: Receiver<Job<PreparedClip>>,
    next_id: AtomicU64,
    accepting: AtomicBool,
    counters: Arc<Counters>,
    reports: Mutex<Option<Sender<PlaybackReport>>>,
}

impl Shared {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn queues_empty(&self) -> bool {
        self.ingest_rx.is_empty() && self.prepared_rx.is_empty()
    }

    /// Start idle if nothing is playing or waiting. Caller holds the lock.
    fn resume_idle(&self, control: &mut Control) {
        if control.in_session
            || control.idle.is_running()
            || !self.accepting.load(Ordering::SeqCst)
            || !self.queues_empty()
        {
            return;
        }
        control.idle.start();
    }

    fn lend_transport(&self) -> Option<Box<dyn FrameTransport>> {
        let mut control = self.lock_control();
        let transport = control.idle.suspend()?;
        control.in_session = true;
        Some(transport)
    }

    fn return_transport(&self, transport: Box<dyn FrameTransport>) {
        let mut control = self.lock_control();
        control.idle.park(transport);
        control.in_session = false;
        self.resume_idle(&mut control);
    }

    fn publish(&self, report: PlaybackReport) {
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = reports.as_ref() else {
            return;
        };
        match tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                tracing::debug!(id = report.id, "report channel full, report dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                *reports = None;
            }
        }
    }

    fn play_clip(
        &self,
        blend: &BlendEncoder,
        player: &SyncPlayer,
        clip: PreparedClip,
    ) -> PlaybackReport {
        let PreparedClip { request, frames } = clip;
        let frame_count = frames.len();
        let report = |outcome| PlaybackReport {
            id: request.id,
            frames: frame_count,
            queued_for: request.enqueued.elapsed(),
            outcome,
        };

        // Validate before touching the idle loop so a rejected clip leaves it running
        let packets = match blend.encode(&frames, FrameTime::now(blend.fps())) {
            Ok(packets) => packets,
            Err(e) => {
                Counters::bump(&self.counters.failed);
                tracing::warn!(id = request.id, "clip skipped: {}", e);
                return report(PlaybackOutcome::Skipped {
                    reason: e.to_string(),
                });
            }
        };

        let Some(transport) = self.lend_transport() else {
            Counters::bump(&self.counters.failed);
            tracing::error!(id = request.id, "no transport available, clip skipped");
            return report(PlaybackOutcome::Skipped {
                reason: "transport unavailable".to_string(),
            });
        };

        let queued = report(PlaybackOutcome::Completed);
        tracing::info!(
            id = request.id,
            frames = frame_count,
            queued_ms = queued.queued_for.as_millis() as u64,
            "playing clip"
        );

        let session = PlaybackSession {
            id: request.id,
            audio: request.audio.clone(),
            packets,
            fps: blend.fps(),
        };
        let (outcome, transport) = player.play(&session, transport);
        self.return_transport(transport);

        Counters::bump(&self.counters.played);
        if outcome.is_degraded() {
            Counters::bump(&self.counters.degraded);
        }
        PlaybackReport {
            outcome: outcome.to_playback_outcome(),
            ..queued
        }
    }
}

/// Remove every queued item, keeping a shutdown sentinel in place.
fn drain<T>(rx: &Receiver<Job<T>>, tx: &Sender<Job<T>>) -> usize {
    let mut removed = 0;
    let mut sentinel = false;
    while let Ok(job) = rx.try_recv() {
        match job {
            Job::Item(_) => removed += 1,
            Job::Shutdown => sentinel = true,
        }
    }
    if sentinel {
        tx.send(Job::Shutdown).ok();
    }
    removed
}

fn playback_loop(shared: Arc<Shared>, blend: BlendEncoder, player: SyncPlayer) {
    let poll = Duration::from_millis(IDLE_RESUME_POLL_MS);
    loop {
        let clip = match shared.prepared_rx.recv_timeout(poll) {
            Ok(Job::Item(clip)) => clip,
            Ok(Job::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                // Requests dropped upstream never reach this worker
                let mut control = shared.lock_control();
                shared.resume_idle(&mut control);
                continue;
            }
        };
        let report = shared.play_clip(&blend, &player, clip);
        shared.publish(report);
    }
    tracing::debug!("playback worker stopped");
}

struct Setup {
    station: PreprocessStation,
    blend: BlendEncoder,
    player: SyncPlayer,
    reporter: Arc<dyn ErrorReporter>,
}

struct Workers {
    preprocess: StationRunner<PreprocessStation>,
    playback: JoinHandle<()>,
}

/// Accepts clips, animates them in order and plays them between idle loops.
pub struct Scheduler {
    shared: Arc<Shared>,
    generator: Arc<dyn AnimationGenerator>,
    post: PostProcessor,
    setup: Option<Setup>,
    workers: Mutex<Option<Workers>>,
}

impl Scheduler {
    /// Clips are blended against the idle clip's first frame.
    pub fn new(
        generator: Arc<dyn AnimationGenerator>,
        post: PostProcessor,
        encoder: Arc<dyn FrameEncoder>,
        idle: IdleLoop,
        player: SyncPlayer,
        fps: u32,
    ) -> Result<Self> {
        let blend = BlendEncoder::new(encoder, idle.baseline(), fps)?;
        let counters = Arc::new(Counters::default());
        let (ingest_tx, ingest_rx) = unbounded();
        let (prepared_tx, prepared_rx) = unbounded();

        let shared = Arc::new(Shared {
            control: Mutex::new(Control {
                idle,
                in_session: false,
            }),
            admission: Mutex::new(()),
            ingest_tx,
            ingest_rx,
            prepared_tx,
            prepared_rx,
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
            counters: counters.clone(),
            reports: Mutex::new(None),
        });

        Ok(Self {
            shared,
            generator: generator.clone(),
            post: post.clone(),
            setup: Some(Setup {
                station: PreprocessStation::new(generator, post, counters),
                blend,
                player,
                reporter: Arc::new(LogReporter),
            }),
            workers: Mutex::new(None),
        })
    }

    /// Wire up every component from configuration.
    ///
    /// Fails on configuration errors: wrong output shape, an unreadable idle
    /// clip, a missing audio device or an unusable transport address.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let fps = config.animation.frame_rate;

        let generator = inference::build_generator(&config.inference)?;
        let post = PostProcessor::new(config.animation.output_dim, config.animation.smoothing)?;
        let encoder: Arc<dyn FrameEncoder> =
            Arc::new(LiveLinkEncoder::new(&config.transport.subject_name, fps));
        let clip = match &config.idle.clip {
            Some(path) => IdleClip::load(path)?,
            None => IdleClip::neutral(),
        };
        let transport = transport::connect(&config.transport)?;
        tracing::info!(
            transport = %transport.describe(),
            generator = generator.name(),
            fps,
            "pipeline configured"
        );

        let idle = IdleLoop::new(clip, encoder.clone(), fps, transport);
        let player = SyncPlayer::new(audio::build_player(&config.audio)?, config.animation.pacing);

        let scheduler = Self::new(generator, post, encoder, idle, player, fps)?;
        if config.artifacts.enabled {
            Ok(scheduler.with_artifacts(ArtifactStore::new(config.artifacts.resolved_dir())))
        } else {
            Ok(scheduler)
        }
    }

    /// Persist every prepared clip. Only effective before [`start`](Self::start).
    pub fn with_artifacts(mut self, store: ArtifactStore) -> Self {
        if let Some(setup) = self.setup.take() {
            self.setup = Some(Setup {
                station: setup.station.with_artifacts(store),
                ..setup
            });
        }
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        if let Some(setup) = self.setup.as_mut() {
            setup.reporter = reporter;
        }
        self
    }

    /// Spawn both workers and start the idle loop.
    pub fn start(&mut self) -> Result<()> {
        let Some(setup) = self.setup.take() else {
            return Err(FacelinkError::Worker {
                message: "scheduler already started".to_string(),
            });
        };

        let preprocess = StationRunner::spawn(
            setup.station,
            self.shared.ingest_rx.clone(),
            self.shared.prepared_tx.clone(),
            setup.reporter,
        );

        let shared = self.shared.clone();
        let playback = thread::Builder::new()
            .name("facelink-playback".to_string())
            .spawn(move || playback_loop(shared, setup.blend, setup.player))
            .map_err(|e| FacelinkError::Worker {
                message: format!("failed to spawn playback worker: {}", e),
            })?;

        *self.lock_workers() = Some(Workers {
            preprocess,
            playback,
        });

        let mut control = self.shared.lock_control();
        self.shared.resume_idle(&mut control);
        tracing::info!("scheduler started");
        Ok(())
    }

    /// Queue a clip and return its sequence id. Never blocks on playback.
    ///
    /// Fails with `ShuttingDown` once shutdown has begun or the preprocessing
    /// worker has exited.
    pub fn submit(&self, audio: impl Into<Arc<[u8]>>) -> Result<u64> {
        let _admission = self
            .shared
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(FacelinkError::ShuttingDown);
        }
        if self.preprocess_exited() {
            self.shared.accepting.store(false, Ordering::SeqCst);
            tracing::error!("preprocessing worker has exited, no longer accepting clips");
            return Err(FacelinkError::ShuttingDown);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let request = AudioRequest::new(id, audio);
        let bytes = request.audio.len();
        self.shared
            .ingest_tx
            .send(Job::Item(request))
            .map_err(|_| FacelinkError::ShuttingDown)?;
        Counters::bump(&self.shared.counters.accepted);

        tracing::debug!(id, bytes, "request queued");
        Ok(id)
    }

    /// Drop everything still queued. The clip currently playing, and the one
    /// being preprocessed, are left alone.
    ///
    /// Returns `(requests, clips)` removed.
    pub fn clear(&self) -> (usize, usize) {
        let mut control = self.shared.lock_control();
        let requests = drain(&self.shared.ingest_rx, &self.shared.ingest_tx);
        let clips = drain(&self.shared.prepared_rx, &self.shared.prepared_tx);
        self.shared.resume_idle(&mut control);

        if requests + clips > 0 {
            tracing::info!(requests, clips, "queues cleared");
        }
        (requests, clips)
    }

    /// Generate frames for `audio` without queueing or playing it.
    ///
    /// Blocks for the duration of inference.
    pub fn shapes(&self, audio: &[u8]) -> Result<Option<FrameSequence>> {
        generate_frames(self.generator.as_ref(), &self.post, audio)
    }

    pub fn status(&self) -> SchedulerStatus {
        let idle_running = self.shared.lock_control().idle.is_running();
        SchedulerStatus {
            pending_requests: self.shared.ingest_rx.len(),
            prepared_clips: self.shared.prepared_rx.len(),
            idle_running,
            workers_running: self.workers_running(),
            accepting: self.is_accepting(),
            ..self.shared.counters.snapshot()
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Option<Workers>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when both workers are started and neither thread has ended.
    fn workers_running(&self) -> bool {
        self.lock_workers().as_ref().is_some_and(|workers| {
            !workers.preprocess.is_finished() && !workers.playback.is_finished()
        })
    }

    fn preprocess_exited(&self) -> bool {
        self.lock_workers()
            .as_ref()
            .is_some_and(|workers| workers.preprocess.is_finished())
    }

    /// Receive a [`PlaybackReport`] per playback attempt.
    ///
    /// Replaces any earlier receiver. Reports are dropped when the receiver
    /// falls more than a few dozen behind.
    pub fn with_reports(&self) -> Receiver<PlaybackReport> {
        let (tx, rx) = bounded(REPORT_BUFFER);
        *self
            .shared
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        rx
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting, let both workers finish what is queued, stop idle and
    /// release the transport. Safe to call more than once.
    pub fn shutdown(&self) {
        {
            let _admission = self
                .shared
                .admission
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.shared.accepting.store(false, Ordering::SeqCst);
        }

        let workers = self.lock_workers().take();
        if let Some(workers) = workers {
            self.shared.ingest_tx.send(Job::Shutdown).ok();
            if let Err(e) = workers.preprocess.join() {
                tracing::error!("{}", e);
            }
            self.shared.prepared_tx.send(Job::Shutdown).ok();
            if workers.playback.join().is_err() {
                tracing::error!("playback worker panicked");
            }
        }

        let mut control = self.shared.lock_control();
        if let Some(transport) = control.idle.suspend() {
            tracing::debug!(transport = %transport.describe(), "transport released");
        }
        tracing::info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self
            .workers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            self.shutdown();
        }
    }
}
