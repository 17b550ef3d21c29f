use std::fmt;

use serde::Serialize;

/// Lifecycle of one viewer pipeline.
///
/// `Idle -> Acquiring -> Running -> Stopping -> Idle`, with `Failed` reachable
/// from `Acquiring` or `Running`. A failed pipeline may be started again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PipelinePhase {
    Idle,
    Acquiring,
    Running,
    Stopping,
    Failed,
}

impl PipelinePhase {
    /// Holding a frame source (and possibly in-flight rounds).
    pub fn is_active(self) -> bool {
        matches!(self, PipelinePhase::Acquiring | PipelinePhase::Running)
    }

    pub fn label(self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Acquiring => "acquiring",
            PipelinePhase::Running => "running",
            PipelinePhase::Stopping => "stopping",
            PipelinePhase::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Highest request id whose result has been applied.
///
/// A result is fresh only if its id is strictly greater than every id applied
/// before it, so the displayed rounds form a non-decreasing sequence no matter
/// in which order rounds resolve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestWatermark {
    last_applied: Option<u64>,
}

impl RequestWatermark {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    pub fn is_fresh(&self, request_id: u64) -> bool {
        self.last_applied.map_or(true, |last| request_id > last)
    }

    /// Record `request_id` as applied. Returns false (and changes nothing) when
    /// it is not fresh.
    pub fn advance(&mut self, request_id: u64) -> bool {
        if !self.is_fresh(request_id) {
            return false;
        }
        self.last_applied = Some(request_id);
        true
    }

    pub fn reset(&mut self) {
        self.last_applied = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_results_never_regress() {
        let mut mark = RequestWatermark::new();
        assert!(mark.is_fresh(1));
        assert!(mark.advance(2));
        assert!(!mark.advance(1));
        assert!(!mark.advance(2));
        assert_eq!(mark.last_applied(), Some(2));
        assert!(mark.advance(5));
        assert!(!mark.is_fresh(4));
        mark.reset();
        assert!(mark.is_fresh(1));
    }

    #[test]
    fn active_phases() {
        assert!(PipelinePhase::Running.is_active());
        assert!(PipelinePhase::Acquiring.is_active());
        assert!(!PipelinePhase::Idle.is_active());
        assert!(!PipelinePhase::Failed.is_active());
        assert_eq!(PipelinePhase::Stopping.to_string(), "stopping");
    }
}
