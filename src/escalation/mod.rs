//! Escalation orchestration: triggers, delegation policy, execution, and
//! the registry of live escalations.

pub mod executor;
pub mod insights;
pub mod policy;
pub mod progress;
pub mod registry;
pub mod trigger;
pub mod types;
pub mod workflow;

pub use registry::EscalationRegistry;
pub use types::{
    CancelAck, CollaborationMode, DelegationPattern, DelegationStrategy, Escalation,
    EscalationContext, EscalationId, EscalationKind, EscalationResults, EscalationStatus,
    EscalationSummary, Insight, Priority, StatusSnapshot, TriggerKind,
};
pub use workflow::{CollaborativeEscalationRequest, SingleEscalationRequest, WorkflowManager};
