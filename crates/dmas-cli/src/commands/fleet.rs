//! Fleet commands - Counts, instances, lifecycle and simulation runs

use anyhow::{anyhow, bail, Context};
use colored::*;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use dmas_control::{CommandHandle, ControlCenter, ControlEvent};
use dmas_types::AgentType;

use crate::display;

/// Fail with a summary when any per-type operation failed
fn check_failures(failures: Vec<String>, total: usize) -> anyhow::Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    for failure in &failures {
        display::warning(failure);
    }
    Err(anyhow!("{} of {} requests failed", failures.len(), total))
}

/// Refresh everything and print a per-type summary
pub async fn status(center: &ControlCenter) -> anyhow::Result<()> {
    let reports = center.refresh_all().await;

    display::section("dMAS Fleet Status");
    for status in center.fleet_status() {
        display::type_status(&status);
    }

    let failures = reports
        .iter()
        .flat_map(|report| {
            report
                .errors()
                .into_iter()
                .map(move |e| format!("{}: {}", report.agent_type, e))
        })
        .collect();
    check_failures(failures, reports.len() * 3)
}

/// Refresh and print running counts
pub async fn count(center: &ControlCenter, types: &[AgentType]) -> anyhow::Result<()> {
    let results = join_all(types.iter().map(|&agent_type| async move {
        (agent_type, center.refresh_population(agent_type).await)
    }))
    .await;

    display::section("Running Agents");
    let mut failures = Vec::new();
    for (agent_type, result) in results {
        if let Err(e) = &result {
            failures.push(format!("{}: {}", agent_type, e));
        }
        display::population(agent_type.as_str(), &center.population(agent_type), result.is_err());
    }
    check_failures(failures, types.len())
}

/// Refresh and list running instances
pub async fn agents(center: &ControlCenter, types: &[AgentType]) -> anyhow::Result<()> {
    let results = join_all(types.iter().map(|&agent_type| async move {
        (agent_type, center.refresh_instances(agent_type).await)
    }))
    .await;

    display::section("Agent Instances");
    let mut failures = Vec::new();
    for (agent_type, result) in results {
        let instances = center.instances(agent_type);
        println!("  {} ({})", agent_type.as_str().bright_white().bold(), instances.len());
        if let Err(e) = result {
            failures.push(format!("{}: {}", agent_type, e));
        }
        for instance in &instances {
            display::instance(instance);
        }
    }
    check_failures(failures, types.len())
}

/// Terminate one instance by key
pub async fn terminate(center: &ControlCenter, key: &str) -> anyhow::Result<()> {
    if let Ok(agent_type) = dmas_types::AgentInstance::type_from_key(key) {
        // Listing failures are not fatal; the backend decides whether the key exists
        let _ = center.refresh_instances(agent_type).await;
    }

    let ack = center
        .terminate_instance(key)
        .await
        .with_context(|| format!("failed to terminate {}", key))?;
    display::success(&format!("Terminated {} ({})", key, ack.message));
    Ok(())
}

async fn report(handle: CommandHandle) -> anyhow::Result<()> {
    let result = handle.outcome().await;
    display::command_result(&result);
    match result.error() {
        None => Ok(()),
        Some(e) => Err(anyhow!(e.clone())),
    }
}

pub async fn start(center: &ControlCenter, agent_type: AgentType) -> anyhow::Result<()> {
    display::info(&format!("Starting {} agents", agent_type));
    report(center.start_agents(agent_type)).await
}

pub async fn stop(center: &ControlCenter, agent_type: AgentType) -> anyhow::Result<()> {
    display::info(&format!("Stopping {} agents", agent_type));
    report(center.stop_agents(agent_type)).await
}

/// Trigger a simulation run over an inclusive date range
pub async fn simulate(center: &ControlCenter, start: &str, end: &str) -> anyhow::Result<()> {
    let handle = center.simulate_range(start, end)?;
    display::info(&format!("Simulating {}", handle.target()));
    report(handle).await
}

/// Poll counts periodically and print every change until Ctrl-C
pub async fn watch(center: &ControlCenter, interval: Duration) -> anyhow::Result<()> {
    let mut events = center.subscribe();
    let poller = center.watch_population(interval);

    display::section("Watching Population");
    display::info(&format!("Refreshing every {}s, Ctrl-C to stop", interval.as_secs()));

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ControlEvent::PopulationUpdated { agent_type, population, .. }) => {
                    display::population(agent_type.as_str(), &population, false);
                }
                Ok(ControlEvent::RefreshFailed { target, error, .. }) => {
                    display::warning(&format!("{}: {}", target, error));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    display::warning(&format!("Skipped {} updates", skipped));
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    Ok(())
}

/// Print the address of the backend's grid view
pub fn grid(center: &ControlCenter) -> anyhow::Result<()> {
    match center.grid_url() {
        Some(url) => {
            display::labeled("Grid", &url);
            Ok(())
        }
        None => bail!("this backend has no grid view"),
    }
}
