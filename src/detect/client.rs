use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::error::DetectionError;
use crate::frame::FrameSample;

/// Resolution of one detection round, success or failure.
///
/// The frame travels with the result so the round can be drawn onto exactly the
/// image it was detected on.
#[derive(Debug)]
pub struct Completion {
    pub request_id: u64,
    pub frame: FrameSample,
    pub outcome: Result<Vec<Detection>, DetectionError>,
    pub elapsed: Duration,
}

/// Dispatches frames to a detector backend without blocking the caller.
///
/// Clones share one live-worker count.
#[derive(Clone)]
pub struct DetectionClient {
    backend: Arc<dyn DetectorBackend>,
    timeout: Duration,
    live_workers: Arc<AtomicUsize>,
}

/// Decrements the live-worker count when the worker leaves the backend, panics
/// included.
struct WorkerGuard(Arc<AtomicUsize>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DetectionClient {
    pub fn new(backend: Arc<dyn DetectorBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            live_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Bounded wait per round. Rounds outstanding longer than this are
    /// resolved as `DetectionError::Timeout` by the pipeline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Worker threads still inside the backend, including rounds the pipeline
    /// already gave up on.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Run one round on a worker thread and report through `completions`.
    ///
    /// If the receiving side is gone by the time the round resolves (the
    /// pipeline was stopped), the result is dropped silently.
    pub fn dispatch(
        &self,
        request_id: u64,
        frame: FrameSample,
        completions: Sender<Completion>,
    ) -> Result<()> {
        let backend = Arc::clone(&self.backend);
        self.live_workers.fetch_add(1, Ordering::SeqCst);
        let guard = WorkerGuard(Arc::clone(&self.live_workers));
        let spawned = std::thread::Builder::new()
            .name(format!("detect-{request_id}"))
            .spawn(move || {
                let started = Instant::now();
                let outcome = backend.detect(&frame);
                // Out of the backend; the count must drop before the pipeline hears back.
                drop(guard);
                let completion = Completion {
                    request_id,
                    frame,
                    outcome,
                    elapsed: started.elapsed(),
                };
                if completions.send(completion).is_err() {
                    log::debug!("round {request_id} resolved after stop; result discarded");
                }
            });
        // On spawn failure the closure (and its guard) is dropped, undoing the count.
        spawned
            .with_context(|| format!("failed to spawn detection worker for round {request_id}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SyntheticBackend;
    use std::sync::mpsc;

    #[test]
    fn dispatch_reports_back_with_frame() {
        let client = DetectionClient::new(Arc::new(SyntheticBackend::new()), Duration::from_secs(1));
        let (tx, rx) = mpsc::channel();
        client
            .dispatch(42, FrameSample::filled(64, 48, [1, 2, 3]), tx)
            .unwrap();
        let completion = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(completion.request_id, 42);
        assert_eq!((completion.frame.width, completion.frame.height), (64, 48));
        assert!(completion.outcome.is_ok());
    }

    #[test]
    fn dispatch_after_receiver_dropped_is_inert() {
        let client = DetectionClient::new(Arc::new(SyntheticBackend::new()), Duration::from_secs(1));
        let (tx, rx) = mpsc::channel();
        drop(rx);
        client
            .dispatch(1, FrameSample::filled(8, 8, [0, 0, 0]), tx)
            .unwrap();
    }

    #[test]
    fn live_workers_counts_until_worker_exits() {
        let client = DetectionClient::new(Arc::new(SyntheticBackend::new()), Duration::from_secs(1));
        assert_eq!(client.live_workers(), 0);
        let (tx, rx) = mpsc::channel();
        client
            .dispatch(7, FrameSample::filled(16, 16, [5, 5, 5]), tx)
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        // Released before the completion is sent.
        assert_eq!(client.clone().live_workers(), 0);
    }
}
