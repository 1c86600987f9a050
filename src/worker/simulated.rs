//! Deterministic crew implementations for the demo binary and tests.
//!
//! [`SimulatedCrew`] produces canned per-worker results whose findings trip
//! the insight-extraction heuristics, after an optional latency sleep.
//! [`FailingCrew`] and [`PanickingCrew`] exercise the failure-degradation
//! paths without real crews.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::{Crew, CrewRequest};
use crate::error::CrewError;
use crate::escalation::types::AnalysisResult;

/// A crew that sleeps for a fixed latency and returns a canned result keyed
/// by the requested worker id.
pub struct SimulatedCrew {
    latency: Duration,
}

impl SimulatedCrew {
    pub fn new(latency: Duration) -> Self {
        SimulatedCrew { latency }
    }

    /// Zero-latency variant for unit tests.
    pub fn instant() -> Self {
        SimulatedCrew {
            latency: Duration::ZERO,
        }
    }
}

impl Crew for SimulatedCrew {
    fn analyze(&self, request: CrewRequest) -> BoxFuture<'static, Result<AnalysisResult, CrewError>> {
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            Ok(canned_result(&request))
        })
    }
}

/// A crew whose invocation always fails at the control-logic level.
pub struct FailingCrew {
    message: String,
}

impl FailingCrew {
    pub fn new(message: impl Into<String>) -> Self {
        FailingCrew {
            message: message.into(),
        }
    }
}

impl Crew for FailingCrew {
    fn analyze(&self, request: CrewRequest) -> BoxFuture<'static, Result<AnalysisResult, CrewError>> {
        let message = self.message.clone();
        Box::pin(async move {
            Err(CrewError::Execution {
                worker: request.worker,
                message,
            })
        })
    }
}

/// A crew whose future panics, simulating an exception inside a worker.
pub struct PanickingCrew;

impl Crew for PanickingCrew {
    fn analyze(&self, _request: CrewRequest) -> BoxFuture<'static, Result<AnalysisResult, CrewError>> {
        Box::pin(async move { panic!("simulated crew panic") })
    }
}

/// Canned per-worker results. Subjects deliberately overlap across crews
/// ("plc-4" appears in several) so cross-worker synthesis has material.
fn canned_result(request: &CrewRequest) -> AnalysisResult {
    let reviewed = request.enrichment.is_some();
    match request.worker.as_str() {
        "asset_intelligence_crew" => AnalysisResult {
            success: true,
            summary: if reviewed {
                "Senior review: asset inventory reconciled against specialist findings".into()
            } else {
                "Asset inventory analyzed: 2 assets profiled, 3 unknown devices".into()
            },
            findings: vec![
                json!({"asset_id": "plc-4", "criticality": "high", "type": "plc"}),
                json!({"asset_id": "hmi-2", "criticality": "low", "type": "hmi"}),
            ],
            recommendations: vec!["Schedule a discovery scan for the unclassified subnet".into()],
            confidence: 0.85,
            metadata: json!({"unknown_devices": 3, "asset_count": 2}),
        },
        "dependency_analysis_crew" => AnalysisResult {
            success: true,
            summary: "Dependency graph analyzed: high complexity, 1 single point of failure".into(),
            findings: vec![
                json!({"subject": "plc-4", "single_point_of_failure": true}),
                json!({"subject": "switch-1", "fan_in": 7}),
            ],
            recommendations: vec!["Add a redundant path for plc-4".into()],
            confidence: 0.8,
            metadata: json!({"complexity": "high"}),
        },
        "risk_assessment_crew" => AnalysisResult {
            success: true,
            summary: "Risk posture assessed: 1 critical exposure".into(),
            findings: vec![
                json!({"subject": "plc-4", "severity": "critical"}),
                json!({"subject": "hmi-2", "severity": "medium"}),
            ],
            recommendations: vec!["Isolate plc-4 behind a dedicated conduit".into()],
            confidence: 0.9,
            metadata: json!({"risk_score": 0.82}),
        },
        "compliance_audit_crew" => AnalysisResult {
            success: true,
            summary: "Compliance audit finished: 1 control violation".into(),
            findings: vec![
                json!({"subject": "hmi-2", "violation": true, "control": "IEC-62443 SR 1.1"}),
            ],
            recommendations: vec!["Enforce unique accounts on hmi-2".into()],
            confidence: 0.75,
            metadata: Value::Null,
        },
        "lifecycle_planning_crew" => AnalysisResult {
            success: true,
            summary: "Lifecycle review finished: 1 end-of-life asset".into(),
            findings: vec![json!({"subject": "switch-1", "end_of_life": true})],
            recommendations: vec!["Budget replacement of switch-1 next quarter".into()],
            confidence: 0.7,
            metadata: Value::Null,
        },
        _ => AnalysisResult {
            success: true,
            summary: format!("General analysis of page `{}` finished", request.page),
            findings: vec![],
            recommendations: vec![],
            confidence: 0.6,
            metadata: Value::Null,
        },
    }
}
