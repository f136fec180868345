use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Custodian.
///
/// Layering order: built-in defaults, then `custodian.toml` if present,
/// then `CUSTODIAN_*` environment variables (`CUSTODIAN_DATABASE__URL`
/// style for nested keys).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CustodianConfig {
    /// Database settings
    pub database: DatabaseConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Workflow engine settings
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file path or connection string
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations on startup
    pub auto_migrate: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level when RUST_LOG is unset
    pub log_level: String,
    /// Emit JSON-structured logs
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Buffered change events per subscriber before lagging
    pub event_capacity: usize,
}

impl Default for CustodianConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://custodian.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            workflow: WorkflowConfig { event_capacity: 256 },
        }
    }
}

impl CustodianConfig {
    /// Loads configuration from file and environment over the defaults.
    pub fn load() -> Result<Self> {
        let defaults = CustodianConfig::default();
        let config = Config::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections as u64)?
            .set_default("database.auto_migrate", defaults.database.auto_migrate)?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?
            .set_default("observability.json_logs", defaults.observability.json_logs)?
            .set_default("workflow.event_capacity", defaults.workflow.event_capacity as u64)?
            .add_source(File::with_name("custodian").required(false))
            .add_source(Environment::with_prefix("CUSTODIAN").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Writes the starter config file used by `custodian init`.
    pub fn write_default(path: &Path) -> Result<()> {
        let rendered = toml::to_string_pretty(&CustodianConfig::default())?;
        std::fs::write(path, rendered)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CustodianConfig::default();
        assert!(config.database.auto_migrate);
        assert!(config.workflow.event_capacity > 0);
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&CustodianConfig::default()).unwrap();
        assert!(rendered.contains("[database]"));
        assert!(rendered.contains("[observability]"));
    }
}
