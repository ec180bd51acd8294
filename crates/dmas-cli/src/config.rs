//! CLI Configuration
//!
//! Settings for the `dmas` binary, layered from an optional file,
//! `config/default`, `config/local` and `DMAS__*` environment variables.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use dmas_control::HttpApiConfig;
use dmas_types::{AgentType, SimulationRequest, ValidationError};

/// Control center settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Control service connection
    #[serde(default)]
    pub backend: BackendSettings,

    /// Pre-filled simulation range
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Population polling
    #[serde(default)]
    pub population: PopulationSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent types managed by aggregate commands
    #[serde(default = "default_agent_types")]
    pub agent_types: Vec<String>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            simulation: SimulationSettings::default(),
            population: PopulationSettings::default(),
            logging: LoggingConfig::default(),
            agent_types: default_agent_types(),
        }
    }
}

/// Control service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout; requests are unbounded when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: None,
        }
    }
}

impl BackendSettings {
    pub fn api_config(&self) -> HttpApiConfig {
        HttpApiConfig {
            base_url: self.base_url.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Default simulation range, `YYYY-MM-DD`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    #[serde(default = "default_simulation_start")]
    pub start: String,

    #[serde(default = "default_simulation_end")]
    pub end: String,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            start: default_simulation_start(),
            end: default_simulation_end(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for PopulationSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl PopulationSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_base_url() -> String {
    "http://localhost:5010".to_string()
}

fn default_simulation_start() -> String {
    "2018-01-01".to_string()
}

fn default_simulation_end() -> String {
    "2018-12-31".to_string()
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_agent_types() -> Vec<String> {
    AgentType::ALL.iter().map(|t| t.to_string()).collect()
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl ControlSettings {
    /// Load settings from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();
        Self::load_with_env(config_path, Self::environment())
    }

    fn environment() -> config::Environment {
        config::Environment::with_prefix("DMAS")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("agent_types")
    }

    fn load_with_env(config_path: Option<&str>, env: config::Environment) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(env);

        let settings: ControlSettings = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.agent_types().context("invalid agent_types")?;
        settings.simulation_request().context("invalid simulation range")?;
        Ok(settings)
    }

    /// Configured agent types, deduplicated, in canonical order
    pub fn agent_types(&self) -> Result<Vec<AgentType>, ValidationError> {
        let mut types = self
            .agent_types
            .iter()
            .map(|tag| tag.parse::<AgentType>())
            .collect::<Result<Vec<_>, _>>()?;
        types.sort();
        types.dedup();
        Ok(types)
    }

    /// Configured default range; may still be reversed
    pub fn simulation_request(&self) -> Result<SimulationRequest, ValidationError> {
        SimulationRequest::parse(&self.simulation.start, &self.simulation.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env() -> config::Environment {
        ControlSettings::environment().source(Some(HashMap::new()))
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = ControlSettings::default();
        assert_eq!(settings.backend.base_url, "http://localhost:5010");
        assert_eq!(settings.backend.timeout_secs, None);
        assert_eq!(settings.population.refresh_interval(), Duration::from_secs(10));
        assert_eq!(settings.agent_types().unwrap(), AgentType::ALL.to_vec());
        assert_eq!(settings.simulation_request().unwrap(), SimulationRequest::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config(
            r#"
agent_types = ["net", "PWP"]

[backend]
base_url = "http://10.0.0.5:5010"
timeout_secs = 3

[simulation]
start = "2019-01-01"
end = "2019-06-30"
"#,
        );

        let settings = ControlSettings::load_with_env(file.path().to_str(), no_env()).unwrap();
        assert_eq!(settings.backend.base_url, "http://10.0.0.5:5010");
        assert_eq!(settings.backend.api_config().timeout, Some(Duration::from_secs(3)));
        assert_eq!(settings.agent_types().unwrap(), vec![AgentType::Pwp, AgentType::Net]);
        assert_eq!(settings.simulation_request().unwrap().days(), 181);
        assert_eq!(settings.logging.format, "pretty");
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[backend]\nbase_url = \"http://from-file:5010\"\n");
        let env = ControlSettings::environment().source(Some(HashMap::from([
            ("DMAS__BACKEND__BASE_URL".to_string(), "http://from-env:5010".to_string()),
            ("DMAS__POPULATION__REFRESH_INTERVAL_SECS".to_string(), "30".to_string()),
            ("DMAS__AGENT_TYPES".to_string(), "DEM,MRK".to_string()),
        ])));

        let settings = ControlSettings::load_with_env(file.path().to_str(), env).unwrap();
        assert_eq!(settings.backend.base_url, "http://from-env:5010");
        assert_eq!(settings.population.refresh_interval_secs, 30);
        assert_eq!(settings.agent_types().unwrap(), vec![AgentType::Dem, AgentType::Mrk]);
    }

    #[test]
    fn test_unknown_agent_type_is_rejected() {
        let file = write_config("agent_types = [\"PWP\", \"WTR\"]\n");
        let err = ControlSettings::load_with_env(file.path().to_str(), no_env()).unwrap_err();
        assert!(format!("{:#}", err).contains("WTR"));
    }

    #[test]
    fn test_malformed_simulation_date_is_rejected() {
        let file = write_config("[simulation]\nstart = \"01/01/2019\"\n");
        assert!(ControlSettings::load_with_env(file.path().to_str(), no_env()).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(ControlSettings::load_with_env(Some("/nonexistent/dmas"), no_env()).is_err());
    }
}
