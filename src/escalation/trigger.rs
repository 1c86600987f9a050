//! Trigger manager: maps (page, agent) pairs to crew ids, validates incoming
//! escalation requests, and computes the priority class.
//!
//! All mappings are static tables over the domain vocabulary. Lookups fall
//! back page -> default crew -> generic crew and never fail.

use serde_json::Value;

use super::types::{Priority, TriggerKind};
use crate::error::ValidationError;
use crate::worker::WorkerId;

/// Crew ids known to the orchestrator. `full_crew` collaboration pulls all of
/// these minus the primary.
pub const KNOWN_WORKERS: [&str; 5] = [
    "asset_intelligence_crew",
    "dependency_analysis_crew",
    "risk_assessment_crew",
    "compliance_audit_crew",
    "lifecycle_planning_crew",
];

/// Returned when no page or agent mapping exists.
pub const FALLBACK_WORKER: &str = "general_analysis_crew";

/// Pages the orchestrator accepts requests from.
const KNOWN_PAGES: [&str; 5] = [
    "asset_inventory",
    "dependencies",
    "risk_register",
    "compliance",
    "lifecycle",
];

/// Payloads with more items than this are escalated at critical priority.
const CRITICAL_ITEM_COUNT: usize = 50;

/// Select the crew for a (page, agent) pair.
///
/// Lookup order: page x agent table, then page default, then the generic
/// fallback crew. Never fails.
pub fn select_worker(page: &str, agent_id: &str) -> WorkerId {
    if let Some(worker) = agent_worker(page, agent_id) {
        return worker.to_string();
    }
    if let Some(worker) = page_default_worker(page) {
        tracing::debug!(page, agent_id, worker, "no agent mapping; using page default crew");
        return worker.to_string();
    }
    tracing::debug!(page, agent_id, "no page mapping; using generic fallback crew");
    FALLBACK_WORKER.to_string()
}

/// Validate an incoming escalation request.
///
/// Requires a recognized page and trigger kind. Exploratory triggers
/// (think / ponder_more) are always allowed through, even with sparse
/// context; everything else needs a non-empty payload.
pub fn validate(
    page: &str,
    trigger: TriggerKind,
    page_data: Option<&Value>,
) -> Result<(), ValidationError> {
    if !KNOWN_PAGES.contains(&page) {
        return Err(ValidationError::UnknownPage(page.to_string()));
    }
    if !trigger.is_exploratory() && !payload_has_content(page_data) {
        return Err(ValidationError::EmptyPayload {
            page: page.to_string(),
            trigger: format!("{trigger:?}").to_lowercase(),
        });
    }
    Ok(())
}

/// Compute the priority class for a request.
///
/// An oversized payload is critical regardless of trigger; reported errors or
/// validation failures raise to high; ponder_more is high, think is medium,
/// default medium.
pub fn priority(trigger: TriggerKind, page_data: Option<&Value>) -> Priority {
    if payload_item_count(page_data) > CRITICAL_ITEM_COUNT {
        return Priority::Critical;
    }
    if trigger == TriggerKind::PonderMore {
        return Priority::High;
    }
    if payload_reports_errors(page_data) {
        return Priority::High;
    }
    Priority::Medium
}

fn agent_worker(page: &str, agent_id: &str) -> Option<&'static str> {
    match (page, agent_id) {
        ("asset_inventory", "asset_intelligence_specialist") => Some("asset_intelligence_crew"),
        ("asset_inventory", "network_architecture_specialist") => Some("dependency_analysis_crew"),
        ("asset_inventory", "risk_analyst") => Some("risk_assessment_crew"),
        ("dependencies", "network_architecture_specialist") => Some("dependency_analysis_crew"),
        ("dependencies", "asset_intelligence_specialist") => Some("asset_intelligence_crew"),
        ("risk_register", "risk_analyst") => Some("risk_assessment_crew"),
        ("risk_register", "compliance_officer") => Some("compliance_audit_crew"),
        ("compliance", "compliance_officer") => Some("compliance_audit_crew"),
        ("lifecycle", "lifecycle_planner") => Some("lifecycle_planning_crew"),
        ("lifecycle", "asset_intelligence_specialist") => Some("lifecycle_planning_crew"),
        _ => None,
    }
}

fn page_default_worker(page: &str) -> Option<&'static str> {
    match page {
        "asset_inventory" => Some("asset_intelligence_crew"),
        "dependencies" => Some("dependency_analysis_crew"),
        "risk_register" => Some("risk_assessment_crew"),
        "compliance" => Some("compliance_audit_crew"),
        "lifecycle" => Some("lifecycle_planning_crew"),
        _ => None,
    }
}

fn payload_has_content(page_data: Option<&Value>) -> bool {
    match page_data {
        None | Some(Value::Null) => false,
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(_) => true,
    }
}

/// Item count of the payload: length of a top-level array, or of an object's
/// `items` array.
fn payload_item_count(page_data: Option<&Value>) -> usize {
    match page_data {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map
            .get("items")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        _ => 0,
    }
}

/// True when the payload carries non-empty `errors` or `validation_failures`.
fn payload_reports_errors(page_data: Option<&Value>) -> bool {
    let Some(Value::Object(map)) = page_data else {
        return false;
    };
    ["errors", "validation_failures"].iter().any(|key| {
        map.get(*key)
            .and_then(Value::as_array)
            .is_some_and(|entries| !entries.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_table_wins_over_page_default() {
        assert_eq!(
            select_worker("dependencies", "network_architecture_specialist"),
            "dependency_analysis_crew"
        );
        // Agent mapped on this page to a non-default crew.
        assert_eq!(
            select_worker("asset_inventory", "risk_analyst"),
            "risk_assessment_crew"
        );
    }

    #[test]
    fn unknown_agent_falls_back_to_page_default() {
        assert_eq!(
            select_worker("compliance", "some_new_agent"),
            "compliance_audit_crew"
        );
    }

    #[test]
    fn unknown_page_falls_back_to_generic_crew() {
        assert_eq!(select_worker("dashboard", "risk_analyst"), FALLBACK_WORKER);
    }

    #[test]
    fn validate_rejects_unknown_page() {
        let err = validate("dashboard", TriggerKind::Think, None).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownPage(_)));
    }

    #[test]
    fn exploratory_triggers_allowed_without_payload() {
        assert!(validate("dependencies", TriggerKind::Think, None).is_ok());
        assert!(validate("dependencies", TriggerKind::PonderMore, None).is_ok());
    }

    #[test]
    fn automatic_trigger_requires_payload() {
        let err = validate("dependencies", TriggerKind::Automatic, None).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPayload { .. }));

        let payload = json!({"items": [1, 2]});
        assert!(validate("dependencies", TriggerKind::Automatic, Some(&payload)).is_ok());
    }

    #[test]
    fn empty_object_payload_counts_as_empty() {
        let payload = json!({});
        let err = validate("dependencies", TriggerKind::Manual, Some(&payload)).unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPayload { .. }));
    }

    #[test]
    fn ponder_more_is_high_priority() {
        assert_eq!(priority(TriggerKind::PonderMore, None), Priority::High);
    }

    #[test]
    fn think_defaults_to_medium() {
        assert_eq!(priority(TriggerKind::Think, None), Priority::Medium);
    }

    #[test]
    fn oversized_payload_overrides_to_critical() {
        let items: Vec<i32> = (0..51).collect();
        let payload = json!({"items": items});
        assert_eq!(priority(TriggerKind::Think, Some(&payload)), Priority::Critical);

        let top_level = json!((0..51).collect::<Vec<i32>>());
        assert_eq!(
            priority(TriggerKind::PonderMore, Some(&top_level)),
            Priority::Critical
        );
    }

    #[test]
    fn reported_errors_raise_to_high() {
        let payload = json!({"items": [1], "errors": ["parse failure"]});
        assert_eq!(priority(TriggerKind::Manual, Some(&payload)), Priority::High);

        let clean = json!({"items": [1], "errors": []});
        assert_eq!(priority(TriggerKind::Manual, Some(&clean)), Priority::Medium);
    }
}
