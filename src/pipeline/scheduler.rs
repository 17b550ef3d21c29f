use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Host pacing primitive: one call per redraw opportunity.
pub trait RedrawScheduler {
    /// Block until the next redraw. Returns false once the host has cancelled
    /// scheduling; no further steps must run after that.
    fn next_redraw(&mut self) -> bool;
}

/// Redraw opportunities at a fixed display rate.
///
/// Missed deadlines are not replayed: a slow step pushes the next redraw out
/// instead of producing a burst.
pub struct IntervalScheduler {
    interval: Duration,
    next_at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_at: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / fps.max(1) as f64))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Flag that cancels scheduling when set (e.g. from a Ctrl+C handler).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl RedrawScheduler for IntervalScheduler {
    fn next_redraw(&mut self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if let Some(next_at) = self.next_at {
            if next_at > now {
                std::thread::sleep(next_at - now);
            }
        }
        self.next_at = Some(Instant::now() + self.interval);
        !self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paces_redraws() {
        let mut scheduler = IntervalScheduler::new(Duration::from_millis(20));
        let start = Instant::now();
        for _ in 0..4 {
            assert!(scheduler.next_redraw());
        }
        // First redraw is immediate, the next three wait one interval each.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn cancel_stops_scheduling() {
        let mut scheduler = IntervalScheduler::from_fps(1000);
        assert!(scheduler.next_redraw());
        scheduler.cancel_handle().store(true, Ordering::SeqCst);
        assert!(!scheduler.next_redraw());
        assert!(!scheduler.next_redraw());
    }
}
