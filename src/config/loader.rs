//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, lowest precedence first:
//!
//! 1. built-in defaults ([`SubstrateConfig::default`])
//! 2. `<config_dir>/substrate.yaml`
//! 3. `<config_dir>/substrate.<environment>.yaml`
//! 4. `SUBSTRATE__<SECTION>__<KEY>` environment variables
//! 5. datastore variables (`DATABASE_URL`, `DB_HOST`, `DB_PORT`, `DB_NAME`,
//!    `DB_USER`, `DB_PASSWORD`, `DB_SSL`)

use super::error::{ConfigResult, ConfigurationError};
use super::{DatabaseConfig, SubstrateConfig};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "SUBSTRATE";
const CONFIG_BASENAME: &str = "substrate";

/// Loaded and validated configuration with its provenance
#[derive(Debug)]
pub struct ConfigManager {
    config: SubstrateConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading substrate configuration"
        );

        let mut config = Self::load_layers(&config_directory, environment)?;
        Self::apply_datastore_environment(&mut config.database, |key| env::var(key).ok())?;
        config.validate()?;

        info!(
            environment = environment,
            database_host = %config.database.host,
            max_connections = config.database.max_connections,
            max_concurrent_tasks = config.scheduler.max_concurrent_tasks,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (embedding and tests)
    pub fn from_config(config: SubstrateConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &SubstrateConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        Self::sanitize_json_recursive(&mut value, &["password", "secret", "token", "url"]);
        value
    }

    fn load_layers(config_directory: &Path, environment: &str) -> ConfigResult<SubstrateConfig> {
        let base_file = config_directory.join(format!("{CONFIG_BASENAME}.yaml"));
        let env_file = config_directory.join(format!("{CONFIG_BASENAME}.{environment}.yaml"));

        let config = Config::builder()
            .add_source(Config::try_from(&SubstrateConfig::default())?)
            .add_source(File::new(&base_file.to_string_lossy(), FileFormat::Yaml).required(false))
            .add_source(File::new(&env_file.to_string_lossy(), FileFormat::Yaml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("database.required_tables")
                    .with_list_parse_key("fault_boundary.known_safe"),
            )
            .build()?;

        Ok(config.try_deserialize::<SubstrateConfig>()?)
    }

    /// Apply the conventional datastore variables on top of the layered config.
    ///
    /// `lookup` abstracts the environment so the mapping can be exercised
    /// without mutating process state.
    pub fn apply_datastore_environment<F>(database: &mut DatabaseConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            database.url = Some(url);
        }
        if let Some(host) = lookup("DB_HOST") {
            database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            database.port = port.parse().map_err(|_| {
                ConfigurationError::EnvironmentOverrideError {
                    key: "DB_PORT".to_string(),
                    reason: format!("'{port}' is not a valid port number"),
                }
            })?;
        }
        if let Some(name) = lookup("DB_NAME") {
            database.database = name;
        }
        if let Some(user) = lookup("DB_USER") {
            database.username = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            database.password = Some(password);
        }
        if let Some(ssl) = lookup("DB_SSL") {
            database.ssl = matches!(ssl.to_lowercase().as_str(), "1" | "true" | "yes" | "require");
        }
        Ok(())
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("SUBSTRATE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        if !val.is_null() {
                            *val = serde_json::Value::String("[MASKED]".to_string());
                        }
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write config file");
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().database.port, 5432);
        assert_eq!(manager.config().scheduler.max_queue_size, 1_000);
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "substrate.yaml",
            "scheduler:\n  max_concurrent_tasks: 8\n  max_queue_size: 50\n",
        );
        write(
            dir.path(),
            "substrate.staging.yaml",
            "scheduler:\n  max_concurrent_tasks: 2\ncircuit_breakers:\n  default_config:\n    failure_threshold: 7\n",
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging")
                .unwrap();
        let config = manager.config();

        assert_eq!(config.scheduler.max_concurrent_tasks, 2);
        assert_eq!(config.scheduler.max_queue_size, 50);
        assert_eq!(config.circuit_breakers.default_config.failure_threshold, 7);
        assert_eq!(config.circuit_breakers.default_config.success_threshold, 2);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "substrate.yaml", "scheduler:\n  max_concurrent_tasks: 0\n");

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_datastore_environment_mapping() {
        let vars: HashMap<&str, &str> = [
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "analytics"),
            ("DB_USER", "svc"),
            ("DB_PASSWORD", "hunter2"),
            ("DB_SSL", "true"),
        ]
        .into_iter()
        .collect();

        let mut database = DatabaseConfig::default();
        ConfigManager::apply_datastore_environment(&mut database, |key| {
            vars.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(database.host, "db.internal");
        assert_eq!(database.port, 6543);
        assert_eq!(database.database, "analytics");
        assert_eq!(database.username, "svc");
        assert_eq!(database.password.as_deref(), Some("hunter2"));
        assert!(database.ssl);
        assert!(database.url.is_none());
    }

    #[test]
    fn test_datastore_environment_rejects_bad_port() {
        let mut database = DatabaseConfig::default();
        let result = ConfigManager::apply_datastore_environment(&mut database, |key| {
            (key == "DB_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigurationError::EnvironmentOverrideError { .. })
        ));
    }

    #[test]
    fn test_debug_config_masks_credentials() {
        let mut config = SubstrateConfig::default();
        config.database.password = Some("s3cret".to_string());
        config.database.url = Some("postgresql://svc:s3cret@db/substrate".to_string());
        let manager = ConfigManager::from_config(config, "test").unwrap();

        let debug = manager.debug_config();
        assert_eq!(debug["database"]["password"], "[MASKED]");
        assert_eq!(debug["database"]["url"], "[MASKED]");
        assert_eq!(debug["database"]["host"], "localhost");
    }
}
