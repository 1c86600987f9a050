//! Workflow manager: the orchestration entry point.
//!
//! Accepts escalation requests, creates and registers the escalation record,
//! and hands execution off to the [`ExecutionHandler`] as an independent
//! background task. Start calls return immediately with the new id; progress
//! is observed through `get_status` polling and the record reaches exactly
//! one of `completed`, `failed`, or `cancelled`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::executor::{ExecutionHandler, ExecutionPlan};
use super::insights::ExtractorSet;
use super::policy;
use super::registry::EscalationRegistry;
use super::trigger;
use super::types::{
    CancelAck, CollaborationMode, DelegationStrategy, Escalation, EscalationContext, EscalationId,
    EscalationKind, EscalationStatus, EscalationSummary, Priority, StatusSnapshot, TriggerKind,
};
use crate::config::OrchestratorConfig;
use crate::error::{EscalationError, ValidationError};
use crate::worker::CrewRegistry;

/// Inbound request for a single-worker escalation ("think harder").
#[derive(Clone, Debug)]
pub struct SingleEscalationRequest {
    pub page: String,
    pub agent_id: String,
    pub trigger: TriggerKind,
    pub flow_id: Option<String>,
    pub page_data: Option<Value>,
}

/// Inbound request for a collaborative escalation ("collaborate more").
/// The delegation strategy is built and validated server-side.
#[derive(Clone, Debug)]
pub struct CollaborativeEscalationRequest {
    pub page: String,
    pub agent_id: String,
    pub mode: CollaborationMode,
    pub flow_id: Option<String>,
    pub page_data: Option<Value>,
}

pub struct WorkflowManager {
    registry: EscalationRegistry,
    handler: ExecutionHandler,
    config: OrchestratorConfig,
}

impl WorkflowManager {
    pub fn new(crews: Arc<CrewRegistry>, config: OrchestratorConfig) -> Self {
        let registry = EscalationRegistry::new(tokio_util::sync::CancellationToken::new());
        let handler = ExecutionHandler::new(
            registry.clone(),
            crews,
            Arc::new(ExtractorSet::default()),
            config.clone(),
        );
        WorkflowManager {
            registry,
            handler,
            config,
        }
    }

    /// Start a single-worker escalation. Validates the request, registers the
    /// record, and returns the new id without waiting for execution.
    pub fn start_single(
        &self,
        request: SingleEscalationRequest,
    ) -> Result<EscalationId, ValidationError> {
        trigger::validate(&request.page, request.trigger, request.page_data.as_ref())?;

        let worker = trigger::select_worker(&request.page, &request.agent_id);
        let priority = trigger::priority(request.trigger, request.page_data.as_ref());
        let context = EscalationContext {
            page: request.page,
            agent_id: request.agent_id,
            trigger: request.trigger,
            flow_id: request.flow_id,
            page_data: request.page_data,
        };

        tracing::info!(
            page = %context.page,
            agent_id = %context.agent_id,
            worker = %worker,
            ?priority,
            "starting single-worker escalation"
        );

        Ok(self.launch(
            EscalationKind::SingleWorker,
            priority,
            context,
            None,
            self.config.single_estimate_minutes,
            |worker| ExecutionPlan::Single { worker },
            worker,
        ))
    }

    /// Start a collaborative escalation. The policy manager builds the
    /// delegation strategy; an invalid strategy rejects the request before
    /// any record is created.
    pub fn start_collaborative(
        &self,
        request: CollaborativeEscalationRequest,
    ) -> Result<EscalationId, ValidationError> {
        trigger::validate(
            &request.page,
            TriggerKind::PonderMore,
            request.page_data.as_ref(),
        )?;

        let strategy =
            policy::build_strategy(&request.page, &request.agent_id, request.mode, &self.config);
        policy::validate_strategy(&strategy)?;

        let priority = trigger::priority(TriggerKind::PonderMore, request.page_data.as_ref());
        let context = EscalationContext {
            page: request.page,
            agent_id: request.agent_id,
            trigger: TriggerKind::PonderMore,
            flow_id: request.flow_id,
            page_data: request.page_data,
        };

        tracing::info!(
            page = %context.page,
            agent_id = %context.agent_id,
            pattern = strategy.pattern.as_str(),
            additional = strategy.additional_workers.len(),
            "starting collaborative escalation"
        );

        let duration = strategy.duration_minutes;
        Ok(self.launch(
            EscalationKind::Collaborative,
            priority,
            context,
            Some(strategy.clone()),
            duration,
            |strategy| ExecutionPlan::Collaborative { strategy },
            strategy,
        ))
    }

    /// Return an immutable status snapshot of the escalation.
    pub fn get_status(&self, id: &str) -> Result<StatusSnapshot, EscalationError> {
        self.registry
            .status(id)
            .ok_or_else(|| EscalationError::NotFound(id.to_string()))
    }

    /// Full clone of the escalation record, including activity log and insights.
    pub fn escalation(&self, id: &str) -> Result<Escalation, EscalationError> {
        self.registry
            .snapshot(id)
            .ok_or_else(|| EscalationError::NotFound(id.to_string()))
    }

    /// Request cancellation. Best-effort: the running execution task observes
    /// the signal at its next phase boundary or crew dispatch.
    pub fn cancel(&self, id: &str) -> Result<CancelAck, EscalationError> {
        self.registry.cancel(id)
    }

    /// Summaries of all escalations in a flow, newest first.
    pub fn list_for_flow(&self, flow_id: &str) -> Vec<EscalationSummary> {
        self.registry.list_for_flow(flow_id)
    }

    /// Sweep terminal escalations older than `max_age`.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.registry.cleanup(max_age)
    }

    /// Sweep using the configured retention window.
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup(Duration::from_secs(self.config.retention_secs))
    }

    /// Await the escalation's background task, if it is still attached.
    /// Status queries remain valid afterwards.
    pub async fn join(&self, id: &str) {
        if let Some(handle) = self.registry.take_join_handle(id) {
            let _ = handle.await;
        }
    }

    /// Cancel everything and drain all execution tasks.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    /// Create, register, and spawn. `seed` is the plan input (worker id or
    /// strategy) so both start paths share the same launch sequence.
    #[allow(clippy::too_many_arguments)]
    fn launch<S: Send + 'static>(
        &self,
        kind: EscalationKind,
        priority: Priority,
        context: EscalationContext,
        strategy: Option<DelegationStrategy>,
        estimate_minutes: u32,
        plan: impl FnOnce(S) -> ExecutionPlan + Send + 'static,
        seed: S,
    ) -> EscalationId {
        let id: EscalationId = Uuid::new_v4().to_string();
        let now = Utc::now();

        let escalation = Escalation {
            id: id.clone(),
            kind,
            status: EscalationStatus::Initializing,
            progress: 0,
            current_phase: "initializing".to_string(),
            phase_description: "Escalation accepted".to_string(),
            priority,
            context: context.clone(),
            delegation_strategy: strategy,
            activity_log: vec![],
            insights: vec![],
            results: None,
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            estimated_completion: now + chrono::Duration::minutes(i64::from(estimate_minutes)),
        };

        let cancel_token = self.registry.child_token();
        self.registry.insert(escalation, cancel_token.clone());

        let handler = self.handler.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            handler.run(task_id, context, plan(seed), cancel_token).await;
        });
        self.registry.set_join_handle(&id, handle);

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::simulated::SimulatedCrew;
    use crate::escalation::trigger::KNOWN_WORKERS;

    fn manager() -> WorkflowManager {
        let mut crews = CrewRegistry::new();
        for worker in KNOWN_WORKERS {
            crews.register(worker, Arc::new(SimulatedCrew::instant()));
        }
        WorkflowManager::new(Arc::new(crews), OrchestratorConfig {
            sequential_pause_ms: 0,
            ..OrchestratorConfig::default()
        })
    }

    #[tokio::test]
    async fn start_single_returns_immediately_and_completes() {
        let mgr = manager();
        let id = mgr
            .start_single(SingleEscalationRequest {
                page: "dependencies".into(),
                agent_id: "network_architecture_specialist".into(),
                trigger: TriggerKind::Think,
                flow_id: None,
                page_data: None,
            })
            .unwrap();

        // The record exists before the run finishes.
        assert!(mgr.get_status(&id).is_ok());

        mgr.join(&id).await;
        let status = mgr.get_status(&id).unwrap();
        assert_eq!(status.status, EscalationStatus::Completed);
        assert_eq!(status.progress, 100);
        assert!(status.insights_count >= 1);
    }

    #[tokio::test]
    async fn invalid_request_leaves_no_record_behind(){
        let mgr = manager();
        let err = mgr.start_single(SingleEscalationRequest {
            page: "not_a_page".into(),
            agent_id: "whoever".into(),
            trigger: TriggerKind::Think,
            flow_id: Some("flow-1".into()),
            page_data: None,
        });
        assert!(err.is_err());
        assert!(mgr.list_for_flow("flow-1").is_empty());
    }

    #[tokio::test]
    async fn status_of_unknown_escalation_is_not_found() {
        let mgr = manager();
        assert!(matches!(
            mgr.get_status("ghost"),
            Err(EscalationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn collaborative_records_strategy_on_the_escalation() {
        let mgr = manager();
        let id = mgr
            .start_collaborative(CollaborativeEscalationRequest {
                page: "asset_inventory".into(),
                agent_id: "asset_intelligence_specialist".into(),
                mode: CollaborationMode::ExpertPanel,
                flow_id: None,
                page_data: None,
            })
            .unwrap();

        let esc = mgr.escalation(&id).unwrap();
        let strategy = esc.delegation_strategy.unwrap();
        assert_eq!(strategy.additional_workers.len(), 2);
        mgr.join(&id).await;
    }
}
