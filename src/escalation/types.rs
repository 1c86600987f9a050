//! Type definitions for the escalation orchestration subsystem.
//!
//! These types form the shared vocabulary between the workflow manager, the
//! execution handler, the progress tracker, and status-query callers. All
//! query-facing types derive [`serde::Serialize`] for JSON responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::worker::WorkerId;

/// Unique identifier for an escalation.
///
/// Uses UUID v4 strings for collision-free IDs that are readable in logs.
pub type EscalationId = String;

/// Distinguishes a single-worker deep dive ("think") from a multi-worker
/// collaborative run ("ponder more").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationKind {
    SingleWorker,
    Collaborative,
}

/// Lifecycle state machine of an escalation.
///
/// `Initializing` transitions to `Thinking` (single-worker) or `Pondering`
/// (collaborative) the first time progress is reported above zero. The three
/// terminal states freeze all live fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Initializing,
    Thinking,
    Pondering,
    Completed,
    Failed,
    Cancelled,
}

impl EscalationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscalationStatus::Completed | EscalationStatus::Failed | EscalationStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Initializing => "initializing",
            EscalationStatus::Thinking => "thinking",
            EscalationStatus::Pondering => "pondering",
            EscalationStatus::Completed => "completed",
            EscalationStatus::Failed => "failed",
            EscalationStatus::Cancelled => "cancelled",
        }
    }
}

/// Priority class computed once at creation from the trigger and payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// What kind of request initiated the escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Single-worker deep dive. Always allowed through, even with sparse context.
    Think,
    /// Collaborative deep dive. Always allowed through, even with sparse context.
    PonderMore,
    Automatic,
    Manual,
}

impl TriggerKind {
    /// Parse the wire-level trigger string. Returns `None` for unknown kinds.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "think" => Some(TriggerKind::Think),
            "ponder_more" => Some(TriggerKind::PonderMore),
            "automatic" => Some(TriggerKind::Automatic),
            "manual" => Some(TriggerKind::Manual),
            _ => None,
        }
    }

    /// Exploratory deep dives are exempt from the non-empty payload requirement.
    pub fn is_exploratory(&self) -> bool {
        matches!(self, TriggerKind::Think | TriggerKind::PonderMore)
    }
}

/// Collaboration mode requested for a collaborative escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    CrossAgent,
    ExpertPanel,
    FullCrew,
}

impl CollaborationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cross_agent" => Some(CollaborationMode::CrossAgent),
            "expert_panel" => Some(CollaborationMode::ExpertPanel),
            "full_crew" => Some(CollaborationMode::FullCrew),
            _ => None,
        }
    }
}

/// Topology used to combine multiple workers in a collaborative escalation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationPattern {
    /// Fan-out to all additional workers at once, join before proceeding.
    Parallel,
    /// One worker at a time, in strategy order, with a courtesy pause between.
    Sequential,
    /// Two specialists in parallel, then a senior review by the primary,
    /// then an optional executive synthesis by a third additional worker.
    Hierarchical,
}

impl DelegationPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationPattern::Parallel => "parallel",
            DelegationPattern::Sequential => "sequential",
            DelegationPattern::Hierarchical => "hierarchical",
        }
    }
}

/// Caller-supplied context for an escalation. Read-only after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationContext {
    /// Domain page the request originated from (e.g. "asset_inventory").
    pub page: String,
    /// Originating agent identifier (e.g. "network_architecture_specialist").
    pub agent_id: String,
    /// The trigger kind that initiated the escalation.
    pub trigger: TriggerKind,
    /// Workflow/session grouping key for list-by-flow queries.
    pub flow_id: Option<String>,
    /// Opaque domain payload. The orchestrator only inspects it for priority
    /// heuristics; crews receive it verbatim.
    pub page_data: Option<Value>,
}

/// Coarse capacity tier for a strategy's resource estimate. `Elevated` marks
/// strategies whose worker count exceeds the configured ceiling (allowed, but
/// surfaced as a warning).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTier {
    Standard,
    Elevated,
}

/// Linear-in-worker-count resource estimate for a delegation strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub cpu_units: u32,
    pub memory_mb: u32,
    pub tier: ResourceTier,
}

/// How a collaborative escalation will delegate work. Constructed once by the
/// policy manager, never mutated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DelegationStrategy {
    pub primary_worker: WorkerId,
    /// Ordered; order matters for `sequential` and `hierarchical` patterns.
    pub additional_workers: Vec<WorkerId>,
    pub pattern: DelegationPattern,
    pub expected_outcomes: Vec<String>,
    pub resource_estimate: ResourceEstimate,
    /// Advisory wall-clock estimate in minutes. Not an enforced deadline.
    pub duration_minutes: u32,
}

/// A structured, typed finding extracted from one crew's raw output or
/// synthesized across several crews' outputs. Immutable once produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Insight {
    /// Insight type tag (e.g. "crew_summary", "cross_worker_analysis").
    pub kind: String,
    /// Worker id or domain entity the insight is about.
    pub subject: String,
    pub description: String,
    /// 0.0-1.0.
    pub confidence: f64,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

/// Structured result returned by a crew's `analyze` call.
///
/// The metrics component introspects `findings` and `metadata` by convention
/// (per-crew heuristics); everything else treats the result as opaque.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub summary: String,
    pub findings: Vec<Value>,
    pub recommendations: Vec<String>,
    /// Crew's own confidence in its analysis, 0.0-1.0.
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Value,
}

/// One append-only activity-log entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub activity: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// Condensed per-worker outcome included in the final results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerReport {
    pub success: bool,
    pub summary: String,
    pub confidence: f64,
    pub finding_count: usize,
    pub recommendations: Vec<String>,
}

impl WorkerReport {
    pub fn from_result(result: &AnalysisResult) -> Self {
        WorkerReport {
            success: result.success,
            summary: result.summary.clone(),
            confidence: result.confidence,
            finding_count: result.findings.len(),
            recommendations: result.recommendations.clone(),
        }
    }
}

/// One entry per dispatched worker. `report` is `None` when the worker's
/// invocation failed or was never dispatched; the entry itself is always
/// present so joins are complete.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerReportEntry {
    pub worker: WorkerId,
    pub report: Option<WorkerReport>,
}

/// Multi-worker breakdown attached to collaborative results.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollaborationBreakdown {
    pub primary: WorkerId,
    pub additional: Vec<WorkerId>,
    pub pattern: DelegationPattern,
    /// How many of the dispatched additional workers returned a non-failure result.
    pub worker_success_count: usize,
}

/// Final structured output of an escalation. Written exactly once at
/// completion; mutually exclusive with the escalation's `error` field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationResults {
    pub summary: String,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    pub worker_reports: Vec<WorkerReportEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaboration: Option<CollaborationBreakdown>,
}

/// The central mutable record of one escalation run.
///
/// Exclusively mutated by the execution handler through the progress tracker;
/// everything else sees clones. Becomes immutable on reaching a terminal
/// status.
#[derive(Clone, Debug, Serialize)]
pub struct Escalation {
    pub id: EscalationId,
    pub kind: EscalationKind,
    pub status: EscalationStatus,
    /// 0-100, monotonically non-decreasing while running.
    pub progress: u8,
    pub current_phase: String,
    pub phase_description: String,
    /// Immutable after creation.
    pub priority: Priority,
    pub context: EscalationContext,
    /// Present for collaborative escalations only. Immutable after creation.
    pub delegation_strategy: Option<DelegationStrategy>,
    pub activity_log: Vec<ActivityEntry>,
    pub insights: Vec<Insight>,
    pub results: Option<EscalationResults>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Advisory only; never enforced as a deadline.
    pub estimated_completion: DateTime<Utc>,
}

impl Escalation {
    /// Timestamp of the terminal transition, if any. Used by the retention sweep.
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at.or(self.failed_at).or(self.cancelled_at)
    }
}

/// Read-only view of an escalation, returned by status queries.
///
/// This is a snapshot -- the live record may change after it is returned.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub id: EscalationId,
    pub status: EscalationStatus,
    pub progress: u8,
    pub current_phase: String,
    pub phase_description: String,
    pub priority: Priority,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_completion: DateTime<Utc>,
    pub activity_count: usize,
    pub insights_count: usize,
    pub has_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<EscalationResults>,
}

impl StatusSnapshot {
    pub fn of(escalation: &Escalation) -> Self {
        StatusSnapshot {
            id: escalation.id.clone(),
            status: escalation.status,
            progress: escalation.progress,
            current_phase: escalation.current_phase.clone(),
            phase_description: escalation.phase_description.clone(),
            priority: escalation.priority,
            started_at: escalation.started_at,
            updated_at: escalation.updated_at,
            estimated_completion: escalation.estimated_completion,
            activity_count: escalation.activity_log.len(),
            insights_count: escalation.insights.len(),
            has_error: escalation.error.is_some(),
            error: escalation.error.clone(),
            results: escalation.results.clone(),
        }
    }
}

/// Condensed row for list-by-flow queries, ordered by `started_at` descending.
#[derive(Clone, Debug, Serialize)]
pub struct EscalationSummary {
    pub id: EscalationId,
    pub kind: EscalationKind,
    pub status: EscalationStatus,
    pub progress: u8,
    pub priority: Priority,
    pub page: String,
    pub agent_id: String,
    pub started_at: DateTime<Utc>,
}

impl EscalationSummary {
    pub fn of(escalation: &Escalation) -> Self {
        EscalationSummary {
            id: escalation.id.clone(),
            kind: escalation.kind,
            status: escalation.status,
            progress: escalation.progress,
            priority: escalation.priority,
            page: escalation.context.page.clone(),
            agent_id: escalation.context.agent_id.clone(),
            started_at: escalation.started_at,
        }
    }
}

/// Acknowledgement returned by a successful cancel request.
#[derive(Clone, Debug, Serialize)]
pub struct CancelAck {
    pub id: EscalationId,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_kind_parses_wire_strings() {
        assert_eq!(TriggerKind::parse("think"), Some(TriggerKind::Think));
        assert_eq!(TriggerKind::parse("ponder_more"), Some(TriggerKind::PonderMore));
        assert_eq!(TriggerKind::parse("automatic"), Some(TriggerKind::Automatic));
        assert_eq!(TriggerKind::parse("manual"), Some(TriggerKind::Manual));
        assert_eq!(TriggerKind::parse("shrug"), None);
    }

    #[test]
    fn exploratory_triggers_are_think_and_ponder() {
        assert!(TriggerKind::Think.is_exploratory());
        assert!(TriggerKind::PonderMore.is_exploratory());
        assert!(!TriggerKind::Automatic.is_exploratory());
        assert!(!TriggerKind::Manual.is_exploratory());
    }

    #[test]
    fn terminal_statuses() {
        assert!(EscalationStatus::Completed.is_terminal());
        assert!(EscalationStatus::Failed.is_terminal());
        assert!(EscalationStatus::Cancelled.is_terminal());
        assert!(!EscalationStatus::Initializing.is_terminal());
        assert!(!EscalationStatus::Thinking.is_terminal());
        assert!(!EscalationStatus::Pondering.is_terminal());
    }

    #[test]
    fn priority_orders_low_to_critical() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn status_snapshot_counts_log_and_insights() {
        let now = Utc::now();
        let esc = Escalation {
            id: "e1".into(),
            kind: EscalationKind::SingleWorker,
            status: EscalationStatus::Thinking,
            progress: 30,
            current_phase: "strategic_analysis".into(),
            phase_description: "Primary crew analysis in progress".into(),
            priority: Priority::Medium,
            context: EscalationContext {
                page: "dependencies".into(),
                agent_id: "network_architecture_specialist".into(),
                trigger: TriggerKind::Think,
                flow_id: None,
                page_data: None,
            },
            delegation_strategy: None,
            activity_log: vec![ActivityEntry {
                timestamp: now,
                activity: "started".into(),
                phase: "crew_initialization".into(),
                detail: None,
            }],
            insights: vec![],
            results: None,
            error: None,
            started_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            estimated_completion: now,
        };

        let snap = StatusSnapshot::of(&esc);
        assert_eq!(snap.activity_count, 1);
        assert_eq!(snap.insights_count, 0);
        assert!(!snap.has_error);
        assert!(snap.results.is_none());
    }
}
