//! Progress tracker: the single owner of all mutation of a live escalation.
//!
//! Every write the execution handler performs -- progress checkpoints,
//! activity-log appends, insight appends, completion and failure transitions
//! -- goes through this component so concurrent status readers always see a
//! consistent record. Writes against a terminal escalation are refused with
//! [`ProgressError::Terminal`]; the activity log and insight list are
//! append-only; progress is monotonically non-decreasing.

use chrono::Utc;
use serde_json::Value;

use super::registry::EscalationRegistry;
use super::types::{
    ActivityEntry, Escalation, EscalationKind, EscalationResults, EscalationStatus, Insight,
};
use crate::error::ProgressError;

#[derive(Clone)]
pub struct ProgressTracker {
    registry: EscalationRegistry,
}

impl ProgressTracker {
    pub fn new(registry: EscalationRegistry) -> Self {
        ProgressTracker { registry }
    }

    /// Record a phase checkpoint: progress percentage, phase name, and
    /// description. The first checkpoint above zero moves the escalation out
    /// of `initializing` into `thinking` or `pondering` per its kind.
    pub fn checkpoint(
        &self,
        id: &str,
        progress: u8,
        phase: &str,
        description: &str,
    ) -> Result<(), ProgressError> {
        self.mutate(id, |esc| {
            // Monotonic: a stale or repeated checkpoint never rolls back.
            esc.progress = esc.progress.max(progress.min(100));
            if esc.progress > 0 && esc.status == EscalationStatus::Initializing {
                esc.status = match esc.kind {
                    EscalationKind::SingleWorker => EscalationStatus::Thinking,
                    EscalationKind::Collaborative => EscalationStatus::Pondering,
                };
            }
            esc.current_phase = phase.to_string();
            esc.phase_description = description.to_string();
            tracing::debug!(
                escalation_id = %esc.id,
                phase,
                progress = esc.progress,
                "phase checkpoint"
            );
        })
    }

    /// Append one activity-log entry.
    pub fn log_activity(
        &self,
        id: &str,
        activity: &str,
        phase: &str,
        detail: Option<Value>,
    ) -> Result<(), ProgressError> {
        self.mutate(id, |esc| {
            esc.activity_log.push(ActivityEntry {
                timestamp: Utc::now(),
                activity: activity.to_string(),
                phase: phase.to_string(),
                detail,
            });
        })
    }

    /// Append extracted or synthesized insights.
    pub fn add_insights(&self, id: &str, insights: Vec<Insight>) -> Result<(), ProgressError> {
        if insights.is_empty() {
            return Ok(());
        }
        self.mutate(id, |esc| {
            esc.insights.extend(insights);
        })
    }

    /// Terminal transition to `completed`: progress 100, results written
    /// exactly once, final activity entry appended.
    pub fn complete(&self, id: &str, results: EscalationResults) -> Result<(), ProgressError> {
        self.mutate(id, |esc| {
            let now = Utc::now();
            esc.progress = 100;
            esc.status = EscalationStatus::Completed;
            esc.completed_at = Some(now);
            esc.results = Some(results);
            esc.current_phase = "completed".to_string();
            esc.phase_description = "Escalation completed".to_string();
            esc.activity_log.push(ActivityEntry {
                timestamp: now,
                activity: "Escalation completed".to_string(),
                phase: "completed".to_string(),
                detail: None,
            });
            tracing::info!(escalation_id = %esc.id, "escalation completed");
        })
    }

    /// Terminal transition to `failed`: error written exactly once, final
    /// activity entry describes the failure. Mutually exclusive with results.
    pub fn fail(&self, id: &str, phase: &str, error: &str) -> Result<(), ProgressError> {
        self.mutate(id, |esc| {
            let now = Utc::now();
            esc.status = EscalationStatus::Failed;
            esc.failed_at = Some(now);
            esc.error = Some(error.to_string());
            esc.phase_description = format!("Failed during {phase}");
            esc.activity_log.push(ActivityEntry {
                timestamp: now,
                activity: format!("Escalation failed: {error}"),
                phase: phase.to_string(),
                detail: None,
            });
            tracing::warn!(escalation_id = %esc.id, phase, error, "escalation failed");
        })
    }

    /// All writes funnel through here: not-found and terminal-freeze checks,
    /// then the mutation plus an `updated_at` stamp under one lock hold.
    fn mutate(
        &self,
        id: &str,
        f: impl FnOnce(&mut Escalation),
    ) -> Result<(), ProgressError> {
        self.registry
            .update(id, |esc| {
                if esc.status.is_terminal() {
                    return Err(ProgressError::Terminal {
                        id: esc.id.clone(),
                        status: esc.status.as_str().to_string(),
                    });
                }
                f(esc);
                esc.updated_at = Utc::now();
                Ok(())
            })
            .ok_or_else(|| ProgressError::NotFound(id.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::types::{EscalationContext, Priority, TriggerKind};
    use tokio_util::sync::CancellationToken;

    fn setup(kind: EscalationKind) -> (EscalationRegistry, ProgressTracker) {
        let registry = EscalationRegistry::new(CancellationToken::new());
        let now = Utc::now();
        registry.insert(
            Escalation {
                id: "e1".into(),
                kind,
                status: EscalationStatus::Initializing,
                progress: 0,
                current_phase: "initializing".into(),
                phase_description: "Escalation accepted".into(),
                priority: Priority::Medium,
                context: EscalationContext {
                    page: "dependencies".into(),
                    agent_id: "network_architecture_specialist".into(),
                    trigger: TriggerKind::Think,
                    flow_id: None,
                    page_data: None,
                },
                delegation_strategy: None,
                activity_log: vec![],
                insights: vec![],
                results: None,
                error: None,
                started_at: now,
                updated_at: now,
                completed_at: None,
                failed_at: None,
                cancelled_at: None,
                estimated_completion: now,
            },
            registry.child_token(),
        );
        let tracker = ProgressTracker::new(registry.clone());
        (registry, tracker)
    }

    fn empty_results() -> EscalationResults {
        EscalationResults {
            summary: "done".into(),
            insights: vec![],
            recommendations: vec![],
            worker_reports: vec![],
            collaboration: None,
        }
    }

    #[test]
    fn first_checkpoint_moves_single_worker_to_thinking() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker
            .checkpoint("e1", 10, "crew_initialization", "Crew spinning up")
            .unwrap();

        let snap = registry.snapshot("e1").unwrap();
        assert_eq!(snap.status, EscalationStatus::Thinking);
        assert_eq!(snap.progress, 10);
        assert_eq!(snap.current_phase, "crew_initialization");
    }

    #[test]
    fn first_checkpoint_moves_collaborative_to_pondering() {
        let (registry, tracker) = setup(EscalationKind::Collaborative);
        tracker
            .checkpoint("e1", 10, "collaboration_setup", "Assembling crews")
            .unwrap();
        assert_eq!(
            registry.snapshot("e1").unwrap().status,
            EscalationStatus::Pondering
        );
    }

    #[test]
    fn progress_never_decreases() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker.checkpoint("e1", 60, "pattern_recognition", "x").unwrap();
        tracker.checkpoint("e1", 30, "strategic_analysis", "stale").unwrap();
        assert_eq!(registry.snapshot("e1").unwrap().progress, 60);
    }

    #[test]
    fn complete_sets_progress_100_and_results_once() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker.complete("e1", empty_results()).unwrap();

        let snap = registry.snapshot("e1").unwrap();
        assert_eq!(snap.status, EscalationStatus::Completed);
        assert_eq!(snap.progress, 100);
        assert!(snap.results.is_some());
        assert!(snap.error.is_none());
        assert!(snap.completed_at.is_some());
    }

    #[test]
    fn fail_sets_error_and_never_results() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker.fail("e1", "strategic_analysis", "boom").unwrap();

        let snap = registry.snapshot("e1").unwrap();
        assert_eq!(snap.status, EscalationStatus::Failed);
        assert!(snap.error.is_some());
        assert!(snap.results.is_none());
        assert!(snap.failed_at.is_some());
        // The failure is recorded in the activity log.
        assert!(snap
            .activity_log
            .last()
            .unwrap()
            .activity
            .contains("boom"));
    }

    #[test]
    fn writes_after_terminal_are_refused() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker.complete("e1", empty_results()).unwrap();

        let before = registry.snapshot("e1").unwrap();
        assert!(matches!(
            tracker.checkpoint("e1", 99, "late", "late"),
            Err(ProgressError::Terminal { .. })
        ));
        assert!(matches!(
            tracker.log_activity("e1", "late", "late", None),
            Err(ProgressError::Terminal { .. })
        ));
        assert!(matches!(
            tracker.fail("e1", "late", "late"),
            Err(ProgressError::Terminal { .. })
        ));

        let after = registry.snapshot("e1").unwrap();
        assert_eq!(after.activity_log.len(), before.activity_log.len());
        assert_eq!(after.progress, before.progress);
        assert!(after.error.is_none());
    }

    #[test]
    fn writes_after_cancel_are_refused() {
        let (registry, tracker) = setup(EscalationKind::SingleWorker);
        tracker.checkpoint("e1", 30, "strategic_analysis", "x").unwrap();
        registry.cancel("e1").unwrap();

        assert!(matches!(
            tracker.checkpoint("e1", 60, "pattern_recognition", "x"),
            Err(ProgressError::Terminal { .. })
        ));
        // Last progress before cancellation stays frozen.
        assert_eq!(registry.snapshot("e1").unwrap().progress, 30);
    }

    #[test]
    fn unknown_escalation_is_not_found() {
        let (_registry, tracker) = setup(EscalationKind::SingleWorker);
        assert!(matches!(
            tracker.checkpoint("ghost", 10, "p", "d"),
            Err(ProgressError::NotFound(_))
        ));
    }
}
