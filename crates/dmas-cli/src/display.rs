//! Display utilities for the CLI

use colored::*;

use dmas_control::TypeStatus;
use dmas_types::{AgentInstance, CommandResult, InstanceStatus, PopulationCount};

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

pub fn error(message: &str) {
    eprintln!("  {} {}", "✗".bright_red(), message.bright_red());
}

pub fn info(message: &str) {
    println!("  {} {}", "→".bright_blue(), message);
}

pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("      {}: {}", key, value.bright_cyan());
}

/// Print a labeled value
pub fn labeled(label: &str, value: &str) {
    println!("  {}: {}", label.bright_white(), value.bright_cyan());
}

/// A population count; unknown is never shown as zero
pub fn population(label: &str, count: &PopulationCount, stale: bool) {
    let value = match count {
        PopulationCount::Unknown => "unknown".bright_black().to_string(),
        PopulationCount::Known { count, as_of } => {
            format!("{} (as of {})", count.to_string().bright_cyan(), as_of.format("%H:%M:%S"))
        }
    };
    let marker = if stale { " stale".yellow().to_string() } else { String::new() };
    println!("  {:<6} {}{}", label.bright_white(), value, marker);
}

/// One instance row: key, address and lifecycle state
pub fn instance(instance: &AgentInstance) {
    let address = instance.metadata.get("ip").map(String::as_str).unwrap_or("-");
    let state = match &instance.status {
        InstanceStatus::Running => "running".bright_green().to_string(),
        InstanceStatus::TerminationFailed { reason } => {
            format!("{} ({})", "termination failed".bright_red(), reason)
        }
    };
    println!("    {:<12} {:<18} {}", instance.key.bright_white(), address.bright_cyan(), state);

    for (key, value) in instance.metadata.iter().filter(|(k, _)| k.as_str() != "ip") {
        kv(key, value);
    }
}

pub fn type_status(status: &TypeStatus) {
    population(status.agent_type.as_str(), &status.population, status.last_refresh_failed);
    for item in &status.instances {
        instance(item);
    }
}

pub fn command_result(result: &CommandResult) {
    let summary = format!("{} {} [{}]", result.kind, result.target, result.id);
    match result.error() {
        None => success(&summary),
        Some(e) => error(&format!("{}: {}", summary, e)),
    }
}
