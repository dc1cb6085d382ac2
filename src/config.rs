#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::error::{OrchestratorError, Result};
use crate::node::{LaunchContext, NodeTemplate, REQUIRED_PORTS};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = ".orchestrator/config.toml";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub framework_name: String,
    pub framework_role: String,
    pub principal: String,
    pub database_url: Option<String>,
    pub zookeepers: Vec<String>,
    pub scheduler_uri: String,
    pub executor_command: String,
    pub node_cpus: f64,
    pub node_mem: f64,
    pub node_disk: f64,
    pub node_ports: usize,
    pub executor_cpus: f64,
    pub executor_mem: f64,
    pub container_path: String,
    pub compatibility_mode: bool,
    pub reconcile_interval_ms: u64,
    pub join_max_retries: u32,
    pub join_backoff_ms: u64,
    pub refuse_seconds: f64,
    pub store_max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            framework_name: "riak".to_string(),
            framework_role: "riak".to_string(),
            principal: "riak".to_string(),
            database_url: None,
            zookeepers: Vec::new(),
            scheduler_uri: String::new(),
            executor_command: "./executor".to_string(),
            node_cpus: 1.0,
            node_mem: 1024.0,
            node_disk: 10_000.0,
            node_ports: 10,
            executor_cpus: 0.1,
            executor_mem: 32.0,
            container_path: "root".to_string(),
            compatibility_mode: false,
            reconcile_interval_ms: 5_000,
            join_max_retries: 5,
            join_backoff_ms: 5_000,
            refuse_seconds: 5.0,
            store_max_retries: 3,
        }
    }
}

impl Config {
    #[must_use]
    pub fn node_template(&self) -> NodeTemplate {
        NodeTemplate {
            framework_name: self.framework_name.clone(),
            principal: self.principal.clone(),
            role: self.framework_role.clone(),
            cpus: self.node_cpus,
            mem: self.node_mem,
            disk: self.node_disk,
            ports: self.node_ports,
            executor_cpus: self.executor_cpus,
            executor_mem: self.executor_mem,
            container_path: self.container_path.clone(),
        }
    }

    #[must_use]
    pub fn launch_context(&self) -> LaunchContext {
        LaunchContext {
            zookeepers: self.zookeepers.clone(),
            scheduler_uri: self.scheduler_uri.clone(),
            executor_command: self.executor_command.clone(),
            compatibility_mode: self.compatibility_mode,
        }
    }

    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    #[must_use]
    pub const fn join_backoff(&self) -> Duration {
        Duration::from_millis(self.join_backoff_ms)
    }

    /// # Errors
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.framework_name.trim().is_empty() {
            return Err(invalid("framework_name must not be empty"));
        }
        let resources = [
            ("node_cpus", self.node_cpus),
            ("node_mem", self.node_mem),
            ("node_disk", self.node_disk),
            ("executor_cpus", self.executor_cpus),
            ("executor_mem", self.executor_mem),
            ("refuse_seconds", self.refuse_seconds),
        ];
        if let Some((key, value)) = resources
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(invalid(&format!("{key} must be a non-negative number, got {value}")));
        }
        if self.node_ports < REQUIRED_PORTS {
            return Err(invalid(&format!(
                "node_ports must be at least {REQUIRED_PORTS}, got {}",
                self.node_ports
            )));
        }
        if self.reconcile_interval_ms == 0 {
            return Err(invalid("reconcile_interval_ms must be positive"));
        }
        if let Some(database_url) = &self.database_url {
            url::Url::parse(database_url)
                .map_err(|e| invalid(&format!("database_url is not a valid url: {e}")))?;
        }
        Ok(())
    }
}

fn invalid(message: &str) -> OrchestratorError {
    OrchestratorError::ConfigError(message.to_string())
}

/// # Errors
/// Returns an error if the file exists but cannot be read or holds invalid values.
pub async fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config_path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    if !config_path.exists() {
        return Ok(with_env_database_url(Config::default()));
    }

    let content = tokio::fs::read_to_string(&config_path)
        .await
        .map_err(|e| OrchestratorError::ConfigError(format!("Failed to read config: {e}")))?;

    parse_config_content(&content).map(with_env_database_url)
}

fn with_env_database_url(mut config: Config) -> Config {
    if config.database_url.is_none() {
        config.database_url = non_empty_env_var("DATABASE_URL");
    }
    config
}

/// # Errors
/// Returns an error if a known key holds a value of the wrong type.
pub fn parse_config_content(content: &str) -> Result<Config> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .try_fold(Config::default(), |mut config, (key, raw)| {
            let value = expand_env_vars(raw.trim().trim_matches('"'));
            match key.trim() {
                "framework_name" => config.framework_name = value,
                "framework_role" => config.framework_role = value,
                "principal" => config.principal = value,
                "database_url" => {
                    config.database_url = Some(value).filter(|url| !url.trim().is_empty());
                }
                "zookeepers" => {
                    config.zookeepers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|zk| !zk.is_empty())
                        .map(ToString::to_string)
                        .collect();
                }
                "scheduler_uri" => config.scheduler_uri = value,
                "executor_command" => config.executor_command = value,
                "node_cpus" => config.node_cpus = parse_number("node_cpus", &value)?,
                "node_mem" => config.node_mem = parse_number("node_mem", &value)?,
                "node_disk" => config.node_disk = parse_number("node_disk", &value)?,
                "node_ports" => config.node_ports = parse_number("node_ports", &value)?,
                "executor_cpus" => config.executor_cpus = parse_number("executor_cpus", &value)?,
                "executor_mem" => config.executor_mem = parse_number("executor_mem", &value)?,
                "container_path" => config.container_path = value,
                "compatibility_mode" => {
                    config.compatibility_mode = parse_number("compatibility_mode", &value)?;
                }
                "reconcile_interval_ms" => {
                    config.reconcile_interval_ms = parse_number("reconcile_interval_ms", &value)?;
                }
                "join_max_retries" => {
                    config.join_max_retries = parse_number("join_max_retries", &value)?;
                }
                "join_backoff_ms" => {
                    config.join_backoff_ms = parse_number("join_backoff_ms", &value)?;
                }
                "refuse_seconds" => config.refuse_seconds = parse_number("refuse_seconds", &value)?,
                "store_max_retries" => {
                    config.store_max_retries = parse_number("store_max_retries", &value)?;
                }
                _ => {}
            }
            Ok(config)
        })
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| OrchestratorError::ConfigError(format!("Invalid value for {key}: {value} ({e})")))
}

fn expand_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_part = &result[start + 2..start + end];
            let (var_name, default) = var_part.split_once(":-").unwrap_or((var_part, ""));
            let value = std::env::var(var_name).unwrap_or_else(|_| default.to_string());
            result.replace_range(start..=(start + end), &value);
        } else {
            break;
        }
    }
    result
}

fn non_empty_env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Hides the password of a database url before it is logged or printed.
#[must_use]
pub fn mask_database_url(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<invalid database url>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

    use super::{mask_database_url, parse_config_content, Config};
    use crate::error::OrchestratorError;

    #[test]
    fn defaults_match_a_single_small_node() {
        let config = Config::default();

        assert_eq!(config.framework_name, "riak");
        assert_eq!(config.node_ports, 10);
        assert_eq!(config.reconcile_interval_ms, 5_000);
        assert_eq!(config.join_max_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_reads_known_keys_and_ignores_comments() {
        let content = r#"# scheduler
framework_name = "riak-prod"
zookeepers = "zk1:2181, zk2:2181"
node_cpus = 2.5
node_ports = 12
compatibility_mode = true
unknown_key = 7
"#;
        let config = parse_config_content(content).unwrap();

        assert_eq!(config.framework_name, "riak-prod");
        assert_eq!(config.zookeepers, vec!["zk1:2181", "zk2:2181"]);
        assert!((config.node_cpus - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.node_ports, 12);
        assert!(config.compatibility_mode);
        assert_eq!(config.principal, "riak");
    }

    #[test]
    fn env_defaults_are_expanded() {
        let content = "scheduler_uri = \"${ORCHESTRATOR_TEST_UNSET_URI:-http://localhost:9090}\"";
        let config = parse_config_content(content).unwrap();

        assert_eq!(config.scheduler_uri, "http://localhost:9090");
    }

    #[test]
    fn malformed_number_is_a_config_error() {
        let result = parse_config_content("node_mem = lots");

        assert!(matches!(result, Err(OrchestratorError::ConfigError(_))));
    }

    #[test]
    fn validate_rejects_too_few_ports_and_bad_urls() {
        let few_ports = Config {
            node_ports: 2,
            ..Config::default()
        };
        let bad_url = Config {
            database_url: Some("not a url".to_string()),
            ..Config::default()
        };
        let negative = Config {
            node_mem: -1.0,
            ..Config::default()
        };

        assert!(few_ports.validate().is_err());
        assert!(bad_url.validate().is_err());
        assert!(negative.validate().is_err());
    }

    #[test]
    fn database_password_is_masked() {
        let masked = mask_database_url("postgres://riak:secret@db:5432/orchestrator");

        assert!(!masked.contains("secret"));
        assert!(masked.contains("riak"));
        assert_eq!(mask_database_url("::"), "<invalid database url>");
    }
}
