mod cli;
mod config;
mod error;
mod escalation;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use escalation::trigger::{FALLBACK_WORKER, KNOWN_WORKERS};
use escalation::{
    CollaborationMode, CollaborativeEscalationRequest, SingleEscalationRequest, TriggerKind,
    WorkflowManager,
};
use worker::simulated::SimulatedCrew;
use worker::CrewRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = cli::Cli::parse();
    tracing::info!("Crewflow starting");

    match cli.command {
        cli::Commands::Run {
            page,
            agent,
            trigger,
            flow,
            data,
            common,
        } => {
            let config = config::load_config(common.config.as_deref(), common.overrides())?;
            let trigger = TriggerKind::parse(&trigger)
                .ok_or_else(|| error::ValidationError::UnknownTrigger(trigger.clone()))?;
            let page_data = parse_payload(data.as_deref())?;

            let manager = build_manager(&config);
            let id = manager.start_single(SingleEscalationRequest {
                page,
                agent_id: agent,
                trigger,
                flow_id: flow,
                page_data,
            })?;

            poll_to_completion(&manager, &id, config.poll_interval_ms).await?;
        }
        cli::Commands::Collab {
            page,
            agent,
            mode,
            flow,
            data,
            common,
        } => {
            let config = config::load_config(common.config.as_deref(), common.overrides())?;
            let mode = CollaborationMode::parse(&mode)
                .ok_or_else(|| error::ValidationError::UnknownMode(mode.clone()))?;
            let page_data = parse_payload(data.as_deref())?;

            let manager = build_manager(&config);
            let id = manager.start_collaborative(CollaborativeEscalationRequest {
                page,
                agent_id: agent,
                mode,
                flow_id: flow,
                page_data,
            })?;

            poll_to_completion(&manager, &id, config.poll_interval_ms).await?;
        }
    }

    Ok(())
}

/// Stand up a workflow manager backed by simulated crews for every known
/// worker plus the fallback.
fn build_manager(config: &config::OrchestratorConfig) -> WorkflowManager {
    let latency = Duration::from_millis(config.simulated_latency_ms);
    let mut crews = CrewRegistry::new();
    for worker in KNOWN_WORKERS {
        crews.register(worker, Arc::new(SimulatedCrew::new(latency)));
    }
    crews.register(FALLBACK_WORKER, Arc::new(SimulatedCrew::new(latency)));

    WorkflowManager::new(Arc::new(crews), config.clone())
}

fn parse_payload(data: Option<&str>) -> anyhow::Result<Option<Value>> {
    data.map(|raw| serde_json::from_str(raw).context("page payload is not valid JSON"))
        .transpose()
}

/// Poll the escalation until it reaches a terminal status, echoing phase
/// transitions along the way, then print the final snapshot as JSON.
async fn poll_to_completion(
    manager: &WorkflowManager,
    id: &str,
    poll_interval_ms: u64,
) -> anyhow::Result<()> {
    println!("Escalation started: {id}");

    let mut last_phase = String::new();
    loop {
        let status = manager.get_status(id)?;
        if status.current_phase != last_phase {
            println!(
                "[{:>3}%] {} - {}",
                status.progress, status.current_phase, status.phase_description
            );
            last_phase = status.current_phase.clone();
        }
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(poll_interval_ms)).await;
    }

    // Drain the background task before reading the final record.
    manager.join(id).await;

    let escalation = manager.escalation(id)?;
    println!("{}", serde_json::to_string_pretty(&escalation)?);

    manager.shutdown().await;
    Ok(())
}
