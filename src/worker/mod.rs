//! Worker abstraction: the capability boundary between the orchestrator and
//! the analysis crews it dispatches.
//!
//! Crews are black boxes supplied by the host application. The orchestrator
//! only knows a worker id and the [`Crew::analyze`] call contract; everything
//! about how a crew produces its [`AnalysisResult`] is out of scope.

pub mod simulated;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CrewError;
use crate::escalation::types::AnalysisResult;

/// Identifier for an analysis crew (e.g. "dependency_analysis_crew").
pub type WorkerId = String;

/// The payload handed to a crew for one invocation.
///
/// Owned (no borrows) so the future can be `'static` and spawned onto the
/// runtime for parallel fan-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrewRequest {
    /// The worker id this invocation targets. Crews serving multiple ids can
    /// branch on it; single-purpose crews may ignore it.
    pub worker: WorkerId,
    pub page: String,
    pub agent_id: String,
    /// Domain payload from the originating request, passed through verbatim.
    pub payload: Option<Value>,
    /// Prior-stage outputs injected for hierarchical senior review and
    /// executive synthesis. `None` for first-pass invocations.
    pub enrichment: Option<Value>,
}

/// A specialized, potentially slow analysis capability.
///
/// `analyze` is the only operation the orchestrator ever calls. A returned
/// `Err` (or a panic inside the future) counts as that worker's failure and
/// is degraded to a missing result; it never aborts the whole escalation.
pub trait Crew: Send + Sync {
    fn analyze(&self, request: CrewRequest) -> BoxFuture<'static, Result<AnalysisResult, CrewError>>;
}

impl std::fmt::Debug for dyn Crew {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Crew")
    }
}

/// Lookup table from worker id to crew implementation.
///
/// Built once by the host application and shared immutably (wrap in `Arc`)
/// with the workflow manager.
#[derive(Default)]
pub struct CrewRegistry {
    crews: HashMap<WorkerId, Arc<dyn Crew>>,
}

impl CrewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: impl Into<WorkerId>, crew: Arc<dyn Crew>) {
        self.crews.insert(worker.into(), crew);
    }

    pub fn get(&self, worker: &str) -> Option<Arc<dyn Crew>> {
        self.crews.get(worker).cloned()
    }

    /// Like [`get`](Self::get), but a missing registration is a typed error
    /// for callers that report the miss.
    pub fn lookup(&self, worker: &str) -> Result<Arc<dyn Crew>, CrewError> {
        self.get(worker).ok_or_else(|| CrewError::Unavailable {
            worker: worker.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.crews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crews.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::simulated::SimulatedCrew;
    use super::*;

    #[test]
    fn registry_lookup_hits_and_misses() {
        let mut registry = CrewRegistry::new();
        registry.register(
            "dependency_analysis_crew",
            Arc::new(SimulatedCrew::instant()),
        );

        assert!(registry.get("dependency_analysis_crew").is_some());
        assert!(registry.get("nonexistent_crew").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_miss_is_a_typed_unavailable_error() {
        let registry = CrewRegistry::new();
        let err = registry.lookup("nonexistent_crew").unwrap_err();
        assert!(matches!(err, CrewError::Unavailable { ref worker } if worker == "nonexistent_crew"));
    }
}
