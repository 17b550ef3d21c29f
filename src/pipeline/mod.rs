//! Frame sampling loop.
//!
//! The host calls `step()` once per redraw opportunity. Each step:
//! 1. applies every detection round that resolved since the last step,
//! 2. resolves rounds that outlived the detection timeout,
//! 3. captures the current frame, assigns it the next request id and hands it
//!    to the detection client without waiting for the answer.
//!
//! Rounds therefore overlap whenever detection is slower than the redraw rate.
//! Results are applied only inside `step()` on the host's thread, so the surface
//! and the stats have a single writer. A result is applied only if its request
//! id is higher than every id applied before it (`RequestWatermark`); late
//! results from older rounds are discarded.
//!
//! `stop()` drops the completion channel before releasing the source, so rounds
//! still in flight resolve into nothing.
//!
//! A source that stops producing frames (unplugged, revoked) moves the pipeline
//! to `Failed` after `max_missed_frames` consecutive empty captures.

mod scheduler;
mod state;

pub use scheduler::{IntervalScheduler, RedrawScheduler};
pub use state::{PipelinePhase, RequestWatermark};

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::classify::Classifier;
use crate::detect::{filter_by_confidence, Completion, Detection, DetectionClient};
use crate::error::{AcquisitionError, DetectionError};
use crate::ingest::{FrameSource, LiveVideoHandle};
use crate::overlay::{ImageSurface, OverlayRenderer, OverlayStyle, Surface};
use crate::stats::{aggregate, StatsSnapshot};

/// Default confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

const HEARTBEAT_EVERY: u64 = 30;

/// Tunables for one pipeline instance.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Detections below this confidence are dropped before classification.
    pub confidence_threshold: f32,
    /// Rounds allowed in flight at once, counting workers still stuck in the
    /// backend after their round timed out. When saturated, redraws skip capture.
    pub max_in_flight: usize,
    /// Consecutive redraws without a usable frame before the source is
    /// declared lost.
    pub max_missed_frames: u32,
    /// How long a source may take to produce its first frame.
    pub ready_timeout: Duration,
    pub style: OverlayStyle,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            max_in_flight: 8,
            max_missed_frames: 150,
            ready_timeout: Duration::from_secs(10),
            style: OverlayStyle::default(),
        }
    }
}

/// Running totals since the pipeline was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineCounters {
    pub dispatched: u64,
    pub applied: u64,
    pub stale_discarded: u64,
    pub detection_errors: u64,
    pub timeouts: u64,
    pub render_errors: u64,
    pub skipped_saturated: u64,
    /// Redraws where the source had no frame, or a frame of the wrong size.
    pub missed_frames: u64,
}

/// What one `step()` did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Rounds whose results were applied to the surface and stats.
    pub applied: usize,
    /// Per-round errors surfaced as the viewer notice.
    pub errors: usize,
    /// Late results discarded as stale.
    pub discarded: usize,
    /// Request id dispatched this step, if any.
    pub dispatched: Option<u64>,
}

/// Outcome of applying one resolved round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Resolution {
    Applied,
    Errored,
    Discarded,
}

/// One viewer's frame-sampling pipeline.
pub struct Pipeline<S: Surface = ImageSurface> {
    source: Box<dyn FrameSource>,
    client: DetectionClient,
    classifier: Classifier,
    renderer: OverlayRenderer,
    surface: S,
    settings: PipelineSettings,

    phase: PipelinePhase,
    handle: Option<LiveVideoHandle>,
    acquiring_since: Option<Instant>,
    completion_tx: Option<Sender<Completion>>,
    completion_rx: Option<Receiver<Completion>>,
    /// Dispatch instant per outstanding request id.
    in_flight: BTreeMap<u64, Instant>,

    /// Monotonic across restarts.
    next_request_id: u64,
    current_request_id: Option<u64>,
    watermark: RequestWatermark,
    stats: StatsSnapshot,
    detections: Vec<Detection>,
    last_error: Option<String>,
    /// Request id whose error set `last_error`, if a round did.
    notice_request_id: Option<u64>,
    missed_in_row: u32,
    counters: PipelineCounters,
}

impl Pipeline<ImageSurface> {
    pub fn new(
        source: Box<dyn FrameSource>,
        client: DetectionClient,
        classifier: Classifier,
        settings: PipelineSettings,
    ) -> Self {
        Self::with_surface(source, client, classifier, settings, ImageSurface::new())
    }
}

impl<S: Surface> Pipeline<S> {
    pub fn with_surface(
        source: Box<dyn FrameSource>,
        client: DetectionClient,
        classifier: Classifier,
        settings: PipelineSettings,
        surface: S,
    ) -> Self {
        let renderer = OverlayRenderer::new(classifier.clone(), settings.style.clone());
        Self {
            source,
            client,
            classifier,
            renderer,
            surface,
            settings,
            phase: PipelinePhase::Idle,
            handle: None,
            acquiring_since: None,
            completion_tx: None,
            completion_rx: None,
            in_flight: BTreeMap::new(),
            next_request_id: 1,
            current_request_id: None,
            watermark: RequestWatermark::new(),
            stats: StatsSnapshot::default(),
            detections: Vec::new(),
            last_error: None,
            notice_request_id: None,
            missed_in_row: 0,
            counters: PipelineCounters::default(),
        }
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == PipelinePhase::Running
    }

    /// Snapshot of the most recently applied round.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
    }

    /// Filtered detections of the most recently applied round.
    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// User-visible notice: acquisition failure or the latest per-round error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Id of the most recently dispatched round.
    pub fn current_request_id(&self) -> Option<u64> {
        self.current_request_id
    }

    pub fn last_applied_request_id(&self) -> Option<u64> {
        self.watermark.last_applied()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn counters(&self) -> PipelineCounters {
        self.counters
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Acquire the frame source and begin sampling.
    ///
    /// On failure the pipeline moves to `Failed` with the reason as its notice;
    /// calling `start` again retries from scratch.
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.phase.is_active() {
            log::debug!("pipeline already {}; start ignored", self.phase);
            return Ok(());
        }

        self.phase = PipelinePhase::Acquiring;
        self.reset_round_state();

        let handle = match self.source.acquire() {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("frame source {} failed: {}", self.source.describe(), err);
                self.last_error = Some(err.to_string());
                self.phase = PipelinePhase::Failed;
                return Err(err);
            }
        };

        let (tx, rx) = mpsc::channel();
        self.completion_tx = Some(tx);
        self.completion_rx = Some(rx);
        self.acquiring_since = Some(Instant::now());
        log::info!(
            "pipeline acquiring {} (detector: {}, threshold: {:.2})",
            self.source.describe(),
            self.client.backend_name(),
            self.settings.confidence_threshold
        );

        let ready = self.source.is_ready(&handle);
        self.handle = Some(handle);
        if ready {
            self.enter_running();
        }
        Ok(())
    }

    /// Run one loop iteration. Call once per redraw opportunity.
    pub fn step(&mut self) -> StepReport {
        let mut report = StepReport::default();
        match self.phase {
            PipelinePhase::Acquiring => {
                self.poll_readiness();
                if self.phase != PipelinePhase::Running {
                    return report;
                }
            }
            PipelinePhase::Running => {}
            _ => return report,
        }

        self.drain_completions(&mut report);
        self.expire_overdue(&mut report);
        report.dispatched = self.capture_and_dispatch();
        if self.missed_in_row >= self.settings.max_missed_frames {
            let err = AcquisitionError::Unavailable(format!(
                "{} stopped producing frames",
                self.source.describe()
            ));
            self.fail(err);
        }
        report
    }

    /// Block up to `timeout` for one in-flight round to resolve, and apply it.
    ///
    /// Returns true if a round resolved. Does not capture.
    pub fn process_next_completion(&mut self, timeout: Duration) -> bool {
        if self.phase != PipelinePhase::Running {
            return false;
        }
        let received = match &self.completion_rx {
            Some(rx) => rx.recv_timeout(timeout),
            None => return false,
        };
        match received {
            Ok(completion) => {
                self.resolve(completion);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Stop sampling and release the frame source.
    ///
    /// In-flight rounds are left to finish on their own; their results have
    /// nowhere to go.
    pub fn stop(&mut self) {
        if !self.phase.is_active() {
            return;
        }
        self.phase = PipelinePhase::Stopping;

        self.completion_rx = None;
        self.completion_tx = None;
        let abandoned = self.in_flight.len();
        self.in_flight.clear();
        self.acquiring_since = None;

        if let Some(handle) = self.handle.take() {
            self.source.release(handle);
        }
        log::info!(
            "pipeline stopped ({} round(s) abandoned in flight, {} applied total)",
            abandoned,
            self.counters.applied
        );
        self.phase = PipelinePhase::Idle;
    }

    fn reset_round_state(&mut self) {
        self.watermark.reset();
        self.stats = StatsSnapshot::default();
        self.detections.clear();
        self.last_error = None;
        self.notice_request_id = None;
        self.missed_in_row = 0;
        self.in_flight.clear();
        self.current_request_id = None;
    }

    fn enter_running(&mut self) {
        self.phase = PipelinePhase::Running;
        self.acquiring_since = None;
        log::info!("pipeline running");
    }

    fn poll_readiness(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };
        if self.source.is_ready(handle) {
            self.enter_running();
            return;
        }
        let waited = self
            .acquiring_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        if waited >= self.settings.ready_timeout {
            let err = AcquisitionError::NotReady(format!(
                "{} produced no frame within {}ms",
                self.source.describe(),
                self.settings.ready_timeout.as_millis()
            ));
            self.fail(err);
        }
    }

    /// Give up on the source: release it and surface `err` as the notice.
    fn fail(&mut self, err: AcquisitionError) {
        log::error!("{err}");
        self.completion_rx = None;
        self.completion_tx = None;
        self.in_flight.clear();
        self.acquiring_since = None;
        if let Some(handle) = self.handle.take() {
            self.source.release(handle);
        }
        self.last_error = Some(err.to_string());
        self.notice_request_id = None;
        self.phase = PipelinePhase::Failed;
    }

    fn drain_completions(&mut self, report: &mut StepReport) {
        loop {
            let received = match &self.completion_rx {
                Some(rx) => rx.try_recv(),
                None => return,
            };
            match received {
                Ok(completion) => match self.resolve(completion) {
                    Resolution::Applied => report.applied += 1,
                    Resolution::Errored => report.errors += 1,
                    Resolution::Discarded => report.discarded += 1,
                },
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return,
            }
        }
    }

    fn expire_overdue(&mut self, report: &mut StepReport) {
        let timeout = self.client.timeout();
        let overdue: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, dispatched_at)| dispatched_at.elapsed() >= timeout)
            .map(|(id, _)| *id)
            .collect();
        for request_id in overdue {
            self.in_flight.remove(&request_id);
            self.counters.timeouts += 1;
            self.counters.detection_errors += 1;
            if self.surface_error(request_id, &DetectionError::Timeout(timeout)) {
                report.errors += 1;
            } else {
                report.discarded += 1;
            }
        }
    }

    fn capture_and_dispatch(&mut self) -> Option<u64> {
        let busy = self.in_flight.len().max(self.client.live_workers());
        if busy >= self.settings.max_in_flight {
            self.counters.skipped_saturated += 1;
            log::debug!(
                "skipping capture: {} round(s) in flight, {} worker(s) live (max {})",
                self.in_flight.len(),
                self.client.live_workers(),
                self.settings.max_in_flight
            );
            return None;
        }
        let tx = self.completion_tx.clone()?;
        let handle = self.handle.as_ref()?;
        let native = self.source.dimensions(handle);
        let frame = match self.source.current_frame(handle) {
            Some(frame) => frame,
            None => {
                self.record_missed_frame("no frame available");
                return None;
            }
        };
        if let Some((width, height)) = native {
            if (frame.width, frame.height) != (width, height) {
                self.record_missed_frame(&format!(
                    "frame is {}x{}, source reports {}x{}",
                    frame.width, frame.height, width, height
                ));
                return None;
            }
        }
        self.missed_in_row = 0;

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.current_request_id = Some(request_id);

        if let Err(err) = self.client.dispatch(request_id, frame, tx) {
            log::warn!("round {request_id} not dispatched: {err:#}");
            self.counters.detection_errors += 1;
            self.last_error = Some(format!("{err:#}"));
            return None;
        }
        self.in_flight.insert(request_id, Instant::now());
        self.counters.dispatched += 1;

        if request_id % HEARTBEAT_EVERY == 0 {
            log::debug!(
                "heartbeat: round #{}, {} in flight, last applied {:?}, stats {:?}",
                request_id,
                self.in_flight.len(),
                self.watermark.last_applied(),
                self.stats
            );
        }
        Some(request_id)
    }

    fn record_missed_frame(&mut self, reason: &str) {
        self.missed_in_row += 1;
        self.counters.missed_frames += 1;
        log::debug!("capture skipped ({reason}); {} in a row", self.missed_in_row);
    }

    fn resolve(&mut self, completion: Completion) -> Resolution {
        let Completion {
            request_id,
            frame,
            outcome,
            elapsed,
        } = completion;

        if self.in_flight.remove(&request_id).is_none() {
            // Already resolved as a timeout.
            log::debug!("round {request_id} resolved after its deadline; discarded");
            self.counters.stale_discarded += 1;
            return Resolution::Discarded;
        }

        let detections = match outcome {
            Ok(detections) => detections,
            Err(err) => {
                self.counters.detection_errors += 1;
                if matches!(err, DetectionError::Timeout(_)) {
                    self.counters.timeouts += 1;
                }
                return if self.surface_error(request_id, &err) {
                    Resolution::Errored
                } else {
                    Resolution::Discarded
                };
            }
        };

        if !self.watermark.advance(request_id) {
            log::debug!(
                "round {} is stale (last applied {:?}); discarded",
                request_id,
                self.watermark.last_applied()
            );
            self.counters.stale_discarded += 1;
            return Resolution::Discarded;
        }

        let filtered = filter_by_confidence(detections, self.settings.confidence_threshold);
        if let Err(err) = self.renderer.render(&mut self.surface, &frame, &filtered) {
            log::warn!("round {request_id}: overlay skipped: {err}");
            self.counters.render_errors += 1;
        }
        self.stats = aggregate(&self.classifier, &filtered);
        self.detections = filtered;
        self.last_error = None;
        self.notice_request_id = None;
        self.counters.applied += 1;
        log::debug!(
            "round {} applied in {}ms (frame age {}ms): {:?}",
            request_id,
            elapsed.as_millis(),
            frame.age_ms(),
            self.stats
        );
        Resolution::Applied
    }

    /// Show a per-round error unless a newer round has already been applied or
    /// has already set the notice. Last good overlay and stats are left
    /// untouched either way.
    fn surface_error(&mut self, request_id: u64, err: &DetectionError) -> bool {
        let superseded = self
            .notice_request_id
            .is_some_and(|shown| request_id < shown);
        if !self.watermark.is_fresh(request_id) || superseded {
            log::debug!("round {request_id} failed after a newer round resolved: {err}");
            self.counters.stale_discarded += 1;
            return false;
        }
        log::warn!("round {} failed ({}): {}", request_id, err.kind(), err);
        self.last_error = Some(err.to_string());
        self.notice_request_id = Some(request_id);
        true
    }
}

impl<S: Surface> Drop for Pipeline<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drive `pipeline` from `scheduler` until scheduling is cancelled or the
/// pipeline leaves `Running`, then stop it.
///
/// `on_step` runs after every step, e.g. to publish the surface.
pub fn run<S, R, F>(pipeline: &mut Pipeline<S>, scheduler: &mut R, mut on_step: F)
where
    S: Surface,
    R: RedrawScheduler,
    F: FnMut(&Pipeline<S>, &StepReport),
{
    while scheduler.next_redraw() {
        if !pipeline.phase().is_active() {
            break;
        }
        let report = pipeline.step();
        on_step(pipeline, &report);
    }
    pipeline.stop();
}
