//! dMAS CLI - Terminal control center for the dMAS agent fleet
//!
//! Talks to the control service (default: http://localhost:5010) through
//! `dmas-control`. With `--local`, commands run against an in-process
//! backend seeded with a sample configuration.
//!
//! # Quick Start
//!
//! ```bash
//! dmas status
//! dmas config show PWP
//! dmas config set PWP host=10.0.0.7 --save
//! dmas start DEM
//! dmas agents DEM
//! dmas terminate DEM_40
//! dmas simulate --start 2018-01-01 --end 2018-03-31
//! DMAS__BACKEND__BASE_URL=http://10.0.0.5:5010 dmas watch --interval 5
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod display;

use crate::commands::{config as config_cmd, fleet};
use crate::config::{ControlSettings, LoggingConfig};
use dmas_control::{ControlCenter, InMemoryAgentApi};
use dmas_types::{AgentType, ConfigScope};

/// dMAS CLI - Configure, start, stop and simulate the agent fleet
#[derive(Parser)]
#[command(name = "dmas")]
#[command(author = "dMAS Contributors")]
#[command(version)]
#[command(about = "Control center for the dMAS agent fleet", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Control service URL (overrides backend.base_url)
    #[arg(long, global = true, env = "DMAS_SERVER")]
    server: Option<String>,

    /// Run against an in-process backend instead of a control service
    #[arg(long, global = true)]
    local: bool,

    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, global = true, env = "DMAS_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh every agent type and show counts and instances
    Status,

    /// Inspect or edit configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show running-agent counts
    Count {
        /// Agent type (all configured types when omitted)
        agent_type: Option<AgentType>,
    },

    /// List running agent instances
    Agents {
        /// Agent type (all configured types when omitted)
        agent_type: Option<AgentType>,
    },

    /// Terminate one agent instance
    Terminate {
        /// Instance key, e.g. DEM_40
        key: String,
    },

    /// Start the configured instance range of a type
    Start { agent_type: AgentType },

    /// Terminate every instance of a type
    Stop { agent_type: AgentType },

    /// Trigger a simulation run
    Simulate {
        /// First simulated day (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Last simulated day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },

    /// Poll running-agent counts until interrupted
    Watch {
        /// Seconds between polls
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show the address of the grid visualization
    Grid,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the configuration of a scope (services, PWP, RES, ...)
    Show { scope: ConfigScope },

    /// Set one or more keys of a scope
    Set {
        scope: ConfigScope,

        /// Assignments in KEY=VALUE form
        #[arg(required = true)]
        pairs: Vec<String>,

        /// Push the edited configuration to the backend
        #[arg(long)]
        save: bool,
    },
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            subscriber
                .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        display::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = ControlSettings::load(cli.config.as_deref())?;

    // CLI flags override loaded values
    if let Some(server) = cli.server {
        settings.backend.base_url = server;
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format;
    }

    init_logging(&settings.logging)?;

    let agent_types = settings.agent_types()?;
    let center = if cli.local {
        println!("  {} Running against the in-process backend", "ℹ".bright_cyan());
        ControlCenter::with_agent_types(Arc::new(InMemoryAgentApi::seeded()), agent_types.clone())
    } else {
        let api = dmas_control::HttpAgentApi::new(settings.backend.api_config())?;
        println!("  {} Control service at {}", "●".bright_green(), settings.backend.base_url.bright_cyan());
        ControlCenter::with_agent_types(Arc::new(api), agent_types.clone())
    };

    let selected = |agent_type: Option<AgentType>| match agent_type {
        Some(agent_type) => vec![agent_type],
        None => agent_types.clone(),
    };

    match cli.command {
        Commands::Status => fleet::status(&center).await,

        Commands::Config { action } => match action {
            ConfigCommands::Show { scope } => config_cmd::show(&center, scope).await,
            ConfigCommands::Set { scope, pairs, save } => config_cmd::set(&center, scope, &pairs, save).await,
        },

        Commands::Count { agent_type } => fleet::count(&center, &selected(agent_type)).await,
        Commands::Agents { agent_type } => fleet::agents(&center, &selected(agent_type)).await,
        Commands::Terminate { key } => fleet::terminate(&center, &key).await,
        Commands::Start { agent_type } => fleet::start(&center, agent_type).await,
        Commands::Stop { agent_type } => fleet::stop(&center, agent_type).await,

        Commands::Simulate { start, end } => {
            let start = start.unwrap_or_else(|| settings.simulation.start.clone());
            let end = end.unwrap_or_else(|| settings.simulation.end.clone());
            fleet::simulate(&center, &start, &end).await
        }

        Commands::Watch { interval } => {
            let interval = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| settings.population.refresh_interval());
            fleet::watch(&center, interval).await
        }

        Commands::Grid => fleet::grid(&center),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_scopes_and_types() {
        let cli = Cli::try_parse_from(["dmas", "config", "set", "services", "database=dMAS", "--save"]).unwrap();
        match cli.command {
            Commands::Config { action: ConfigCommands::Set { scope, pairs, save } } => {
                assert_eq!(scope, ConfigScope::Service);
                assert_eq!(pairs, vec!["database=dMAS"]);
                assert!(save);
            }
            _ => panic!("expected config set"),
        }

        let cli = Cli::try_parse_from(["dmas", "--local", "count", "net"]).unwrap();
        assert!(cli.local);
        assert!(matches!(cli.command, Commands::Count { agent_type: Some(AgentType::Net) }));

        assert!(Cli::try_parse_from(["dmas", "start", "WTR"]).is_err());
    }
}
