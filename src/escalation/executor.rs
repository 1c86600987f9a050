//! Execution handler: drives one escalation through its phase sequence and
//! performs the actual crew delegation.
//!
//! Each escalation runs as an independent tokio task spawned by the workflow
//! manager. The task checks its [`CancellationToken`] at every phase boundary
//! and races it against every crew dispatch, so a cancel request stops the
//! run at the next checkpoint instead of letting it write results that would
//! be ignored.
//!
//! Failure policy: a crew's own failure (error return, panic, missing
//! registration) degrades to a `None` result for that crew and the run
//! continues; only a failure in this module's control logic transitions the
//! escalation to `failed`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::insights::{self, ExtractorSet};
use super::progress::ProgressTracker;
use super::registry::EscalationRegistry;
use super::types::{
    AnalysisResult, DelegationPattern, DelegationStrategy, EscalationContext, EscalationId,
    Insight,
};
use crate::config::OrchestratorConfig;
use crate::error::{CrewError, DelegationError, ProgressError};
use crate::worker::{CrewRegistry, CrewRequest, WorkerId};

/// What the spawned task should execute, decided at request acceptance.
pub enum ExecutionPlan {
    Single { worker: WorkerId },
    Collaborative { strategy: DelegationStrategy },
}

/// Why a run stopped before completing. Internal control flow only.
enum Interrupt {
    /// The escalation was cancelled; stop without further writes.
    Cancelled,
    /// The handler's own control logic failed; transition to `failed`.
    Failed { phase: &'static str, message: String },
}

#[derive(Clone)]
pub struct ExecutionHandler {
    progress: ProgressTracker,
    crews: Arc<CrewRegistry>,
    extractors: Arc<ExtractorSet>,
    config: OrchestratorConfig,
}

impl ExecutionHandler {
    pub fn new(
        registry: EscalationRegistry,
        crews: Arc<CrewRegistry>,
        extractors: Arc<ExtractorSet>,
        config: OrchestratorConfig,
    ) -> Self {
        ExecutionHandler {
            progress: ProgressTracker::new(registry),
            crews,
            extractors,
            config,
        }
    }

    /// Run one escalation to a terminal state. Consumes a handler clone; the
    /// workflow manager spawns this as the escalation's background task.
    pub async fn run(
        self,
        id: EscalationId,
        context: EscalationContext,
        plan: ExecutionPlan,
        cancel: CancellationToken,
    ) {
        let outcome = match plan {
            ExecutionPlan::Single { worker } => {
                self.run_single(&id, &context, worker, &cancel).await
            }
            ExecutionPlan::Collaborative { strategy } => {
                self.run_collaborative(&id, &context, strategy, &cancel).await
            }
        };

        match outcome {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => {
                tracing::info!(escalation_id = %id, "execution stopped on cancellation");
            }
            Err(Interrupt::Failed { phase, message }) => {
                if let Err(e) = self.progress.fail(&id, phase, &message) {
                    tracing::warn!(escalation_id = %id, error = %e, "could not record failure");
                }
            }
        }
    }

    /// SINGLE_WORKER: crew_initialization(10) -> strategic_analysis(30) ->
    /// pattern_recognition(60) -> results_generation(90) -> completed(100).
    async fn run_single(
        &self,
        id: &str,
        context: &EscalationContext,
        worker: WorkerId,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        self.checkpoint(id, cancel, 10, "crew_initialization", "Preparing analysis crew")?;
        self.log(id, &format!("Crew `{worker}` assigned"), "crew_initialization", None);

        self.checkpoint(id, cancel, 30, "strategic_analysis", "Primary crew analysis in progress")?;
        let result = self
            .invoke(&worker, self.base_request(&worker, context), cancel)
            .await?;
        self.log_worker_outcome(id, &worker, result.as_ref(), "strategic_analysis");

        self.checkpoint(id, cancel, 60, "pattern_recognition", "Extracting insights from analysis")?;
        let insights = self.extractors.extract(&worker, result.as_ref(), context);
        self.log(
            id,
            &format!("{} insights extracted", insights.len()),
            "pattern_recognition",
            None,
        );
        self.record_insights(id, insights.clone())?;

        self.checkpoint(id, cancel, 90, "results_generation", "Synthesizing final results")?;
        let reports = vec![(worker, result)];
        let results = insights::build_results(context, None, &reports, insights);

        self.finish(id, "results_generation", results)
    }

    /// COLLABORATIVE: collaboration_setup(10) -> primary_analysis(30) ->
    /// delegation_phase(50) -> collaborative_synthesis(75) ->
    /// final_synthesis(95) -> completed(100).
    async fn run_collaborative(
        &self,
        id: &str,
        context: &EscalationContext,
        strategy: DelegationStrategy,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupt> {
        self.checkpoint(id, cancel, 10, "collaboration_setup", "Assembling collaboration crews")?;
        self.log(
            id,
            &format!(
                "Delegating via `{}` pattern to {} additional crews",
                strategy.pattern.as_str(),
                strategy.additional_workers.len()
            ),
            "collaboration_setup",
            Some(json!({
                "primary": strategy.primary_worker,
                "additional": strategy.additional_workers,
                "pattern": strategy.pattern.as_str(),
            })),
        );

        self.checkpoint(id, cancel, 30, "primary_analysis", "Primary crew analysis in progress")?;
        let mut primary_result = self
            .invoke(
                &strategy.primary_worker,
                self.base_request(&strategy.primary_worker, context),
                cancel,
            )
            .await?;
        self.log_worker_outcome(
            id,
            &strategy.primary_worker,
            primary_result.as_ref(),
            "primary_analysis",
        );

        self.checkpoint(id, cancel, 50, "delegation_phase", "Delegating to additional crews")?;
        let additional_results = match strategy.pattern {
            DelegationPattern::Parallel => {
                self.delegate_parallel(id, &strategy.additional_workers, context, cancel)
                    .await?
            }
            DelegationPattern::Sequential => {
                self.delegate_sequential(id, &strategy.additional_workers, context, cancel)
                    .await?
            }
            DelegationPattern::Hierarchical => {
                self.delegate_hierarchical(
                    id,
                    &strategy,
                    &mut primary_result,
                    context,
                    cancel,
                )
                .await?
            }
        };

        self.checkpoint(id, cancel, 75, "collaborative_synthesis", "Synthesizing cross-crew insights")?;
        let mut per_worker: Vec<(WorkerId, Vec<Insight>)> = Vec::new();
        per_worker.push((
            strategy.primary_worker.clone(),
            self.extractors
                .extract(&strategy.primary_worker, primary_result.as_ref(), context),
        ));
        for (worker, result) in &additional_results {
            per_worker.push((
                worker.clone(),
                self.extractors.extract(worker, result.as_ref(), context),
            ));
        }

        let dispatched = 1 + additional_results.len();
        let succeeded = primary_result.is_some() as usize
            + additional_results.iter().filter(|(_, r)| r.is_some()).count();
        let synthesized = insights::synthesize(&per_worker, &context.page, dispatched, succeeded);

        let mut all_insights: Vec<Insight> =
            per_worker.into_iter().flat_map(|(_, ins)| ins).collect();
        all_insights.extend(synthesized);
        self.log(
            id,
            &format!("{} insights after cross-crew synthesis", all_insights.len()),
            "collaborative_synthesis",
            None,
        );
        self.record_insights(id, all_insights.clone())?;

        self.checkpoint(id, cancel, 95, "final_synthesis", "Assembling final results")?;
        let mut reports: Vec<(WorkerId, Option<AnalysisResult>)> =
            vec![(strategy.primary_worker.clone(), primary_result)];
        reports.extend(additional_results);
        let results = insights::build_results(context, Some(&strategy), &reports, all_insights);

        self.finish(id, "final_synthesis", results)
    }

    /// Parallel: every additional crew gets the same context concurrently;
    /// the join is complete (one entry per crew) and per-crew failures stay
    /// independent.
    async fn delegate_parallel(
        &self,
        id: &str,
        workers: &[WorkerId],
        context: &EscalationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<(WorkerId, Option<AnalysisResult>)>, Interrupt> {
        let handles = self.spawn_fan_out(workers, context);
        self.join_fan_out(id, handles, cancel).await
    }

    /// Sequential: one crew at a time in strategy order, with a courtesy
    /// pause between steps. Steps stay independent except for ordering.
    async fn delegate_sequential(
        &self,
        id: &str,
        workers: &[WorkerId],
        context: &EscalationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<(WorkerId, Option<AnalysisResult>)>, Interrupt> {
        let pause = Duration::from_millis(self.config.sequential_pause_ms);
        let mut results = Vec::with_capacity(workers.len());

        for (index, worker) in workers.iter().enumerate() {
            if index > 0 && !pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
                }
            }
            let result = self
                .invoke(worker, self.base_request(worker, context), cancel)
                .await?;
            self.log_worker_outcome(id, worker, result.as_ref(), "delegation_phase");
            results.push((worker.clone(), result));
        }
        Ok(results)
    }

    /// Hierarchical: the first two additional crews run in parallel as
    /// specialists; the primary then re-analyzes with their outputs (senior
    /// review); a third additional crew, when present, produces an executive
    /// synthesis over everything. Crews beyond the third are not dispatched
    /// under this pattern and keep `None` entries.
    async fn delegate_hierarchical(
        &self,
        id: &str,
        strategy: &DelegationStrategy,
        primary_result: &mut Option<AnalysisResult>,
        context: &EscalationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<(WorkerId, Option<AnalysisResult>)>, Interrupt> {
        let workers = &strategy.additional_workers;
        let specialists = &workers[..workers.len().min(2)];

        let handles = self.spawn_fan_out(specialists, context);
        let mut results = self.join_fan_out(id, handles, cancel).await?;

        let specialist_outputs = worker_outputs_json(&results, "specialist outputs")?;

        // Senior review: the primary crew re-analyzes with the specialists'
        // outputs in context.
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let mut review_request = self.base_request(&strategy.primary_worker, context);
        review_request.enrichment = Some(json!({ "specialist_outputs": specialist_outputs }));
        let review = self
            .invoke(&strategy.primary_worker, review_request, cancel)
            .await?;
        if let Some(review) = review {
            self.log(
                id,
                &format!("Senior review by `{}` completed", strategy.primary_worker),
                "delegation_phase",
                None,
            );
            *primary_result = Some(review);
        }

        // Executive synthesis by the third additional crew, over specialists
        // plus the senior review.
        if let Some(executive) = workers.get(2) {
            let mut request = self.base_request(executive, context);
            request.enrichment = Some(json!({
                "specialist_outputs": specialist_outputs,
                "senior_review": result_json(primary_result.as_ref(), "senior review")?,
            }));
            let result = self.invoke(executive, request, cancel).await?;
            self.log_worker_outcome(id, executive, result.as_ref(), "delegation_phase");
            results.push((executive.clone(), result));
        }

        for skipped in workers.iter().skip(3) {
            self.log(
                id,
                &format!("Crew `{skipped}` not dispatched under hierarchical pattern"),
                "delegation_phase",
                None,
            );
            results.push((skipped.clone(), None));
        }
        Ok(results)
    }

    /// Spawn one task per crew so the fan-out is genuinely concurrent. A
    /// missing registration yields no task and degrades to `None` at join.
    fn spawn_fan_out(
        &self,
        workers: &[WorkerId],
        context: &EscalationContext,
    ) -> Vec<(WorkerId, Option<JoinHandle<Result<AnalysisResult, CrewError>>>)> {
        workers
            .iter()
            .map(|worker| {
                let handle = match self.crews.lookup(worker) {
                    Ok(crew) => Some(tokio::spawn(
                        crew.analyze(self.base_request(worker, context)),
                    )),
                    Err(e) => {
                        tracing::warn!(worker = %worker, error = %e, "skipping dispatch");
                        None
                    }
                };
                (worker.clone(), handle)
            })
            .collect()
    }

    /// Join the fan-out in dispatch order. One entry per crew, always; a
    /// crew's error or panic becomes `None` without disturbing the others.
    async fn join_fan_out(
        &self,
        id: &str,
        handles: Vec<(WorkerId, Option<JoinHandle<Result<AnalysisResult, CrewError>>>)>,
        cancel: &CancellationToken,
    ) -> Result<Vec<(WorkerId, Option<AnalysisResult>)>, Interrupt> {
        let mut results = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();

        while let Some((worker, handle)) = pending.next() {
            let outcome = match handle {
                None => None,
                Some(mut handle) => {
                    tokio::select! {
                        joined = &mut handle => match joined {
                            Ok(Ok(result)) => Some(result),
                            Ok(Err(e)) => {
                                tracing::warn!(worker = %worker, error = %e, "crew failed; continuing");
                                None
                            }
                            Err(join_err) if join_err.is_panic() => {
                                tracing::warn!(worker = %worker, "crew panicked; continuing");
                                None
                            }
                            Err(join_err) => {
                                abort_remaining(pending);
                                return Err(Interrupt::Failed {
                                    phase: "delegation_phase",
                                    message: DelegationError::Join {
                                        pattern: "parallel".to_string(),
                                        message: join_err.to_string(),
                                    }
                                    .to_string(),
                                });
                            }
                        },
                        _ = cancel.cancelled() => {
                            handle.abort();
                            abort_remaining(pending);
                            return Err(Interrupt::Cancelled);
                        }
                    }
                }
            };
            self.log_worker_outcome(id, &worker, outcome.as_ref(), "delegation_phase");
            results.push((worker, outcome));
        }
        Ok(results)
    }

    /// Invoke one crew, racing the cancellation token. A crew error or panic
    /// degrades to `None`; only join-machinery failures escalate.
    async fn invoke(
        &self,
        worker: &str,
        request: CrewRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<AnalysisResult>, Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let crew = match self.crews.lookup(worker) {
            Ok(crew) => crew,
            Err(e) => {
                tracing::warn!(worker, error = %e, "treating as failed invocation");
                return Ok(None);
            }
        };

        let mut handle = tokio::spawn(crew.analyze(request));
        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Ok(result)) => Ok(Some(result)),
                Ok(Err(e)) => {
                    tracing::warn!(worker, error = %e, "crew failed; continuing");
                    Ok(None)
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::warn!(worker, "crew panicked; continuing");
                    Ok(None)
                }
                Err(join_err) => Err(Interrupt::Failed {
                    phase: "delegation_phase",
                    message: DelegationError::Join {
                        pattern: "single".to_string(),
                        message: join_err.to_string(),
                    }
                    .to_string(),
                }),
            },
            _ = cancel.cancelled() => {
                handle.abort();
                Err(Interrupt::Cancelled)
            }
        }
    }

    fn base_request(&self, worker: &str, context: &EscalationContext) -> CrewRequest {
        CrewRequest {
            worker: worker.to_string(),
            page: context.page.clone(),
            agent_id: context.agent_id.clone(),
            payload: context.page_data.clone(),
            enrichment: None,
        }
    }

    /// Phase checkpoint with cancellation check. A terminal refusal from the
    /// progress tracker means the escalation was cancelled under us.
    fn checkpoint(
        &self,
        id: &str,
        cancel: &CancellationToken,
        progress: u8,
        phase: &'static str,
        description: &str,
    ) -> Result<(), Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.progress.checkpoint(id, progress, phase, description) {
            Ok(()) => Ok(()),
            Err(ProgressError::Terminal { .. }) => Err(Interrupt::Cancelled),
            Err(e @ ProgressError::NotFound(_)) => {
                tracing::warn!(escalation_id = id, error = %e, "progress update lost");
                Err(Interrupt::Cancelled)
            }
        }
    }

    /// Best-effort activity logging; a lost entry is surfaced in the log
    /// stream but never stops the run.
    fn log(&self, id: &str, activity: &str, phase: &str, detail: Option<Value>) {
        if let Err(e) = self.progress.log_activity(id, activity, phase, detail) {
            tracing::warn!(escalation_id = id, error = %e, "activity entry lost");
        }
    }

    fn log_worker_outcome(
        &self,
        id: &str,
        worker: &str,
        result: Option<&AnalysisResult>,
        phase: &str,
    ) {
        let activity = match result {
            Some(r) => format!("Crew `{worker}` completed: {}", r.summary),
            None => format!("Crew `{worker}` produced no result"),
        };
        self.log(
            id,
            &activity,
            phase,
            Some(json!({"worker": worker, "success": result.is_some()})),
        );
    }

    fn record_insights(&self, id: &str, insights: Vec<Insight>) -> Result<(), Interrupt> {
        match self.progress.add_insights(id, insights) {
            Ok(()) => Ok(()),
            Err(ProgressError::Terminal { .. }) => Err(Interrupt::Cancelled),
            Err(e) => {
                tracing::warn!(escalation_id = id, error = %e, "insights lost");
                Ok(())
            }
        }
    }

    fn finish(
        &self,
        id: &str,
        phase: &'static str,
        results: super::types::EscalationResults,
    ) -> Result<(), Interrupt> {
        match self.progress.complete(id, results) {
            Ok(()) => Ok(()),
            Err(ProgressError::Terminal { .. }) => Err(Interrupt::Cancelled),
            Err(e) => Err(Interrupt::Failed {
                phase,
                message: e.to_string(),
            }),
        }
    }
}

fn abort_remaining(
    pending: impl Iterator<Item = (WorkerId, Option<JoinHandle<Result<AnalysisResult, CrewError>>>)>,
) {
    for (_, handle) in pending {
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Serialize per-worker outputs for context enrichment.
fn worker_outputs_json(
    results: &[(WorkerId, Option<AnalysisResult>)],
    what: &str,
) -> Result<Value, Interrupt> {
    let mut map = serde_json::Map::new();
    for (worker, result) in results {
        map.insert(worker.clone(), result_json(result.as_ref(), what)?);
    }
    Ok(Value::Object(map))
}

fn result_json(result: Option<&AnalysisResult>, what: &str) -> Result<Value, Interrupt> {
    match result {
        None => Ok(Value::Null),
        Some(result) => serde_json::to_value(result).map_err(|e| Interrupt::Failed {
            phase: "delegation_phase",
            message: crate::error::CollaborationError::ContextEnrichment(format!(
                "could not serialize {what}: {e}"
            ))
            .to_string(),
        }),
    }
}
