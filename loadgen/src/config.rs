use std::{env, fs, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Every knob of a load run in one place, passed explicitly into each
/// operation. Values come from an optional config file, environment
/// overrides and CLI flags; nothing is hardcoded at call sites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Name prefix for generated namespaces, e.g. `load-test` yields
    /// `load-test-001`.
    pub prefix: String,
    /// Total number of identifiers in the range.
    pub count: u32,
    /// First identifier, usually 1. Raising it restarts a run from an
    /// arbitrary offset with identical names.
    pub start: u32,
    /// Zero-pad width for the numeric suffix.
    pub width: usize,
    /// Identifiers per scheduler batch.
    pub batch_size: u32,
    /// Upper bound on in-flight Kubernetes calls.
    pub concurrency: usize,
    /// Hold after a batch is ready, in seconds.
    pub dwell_secs: u64,
    /// Hold after a batch is scaled back down, in seconds.
    pub cooldown_secs: u64,
    /// How long to wait for a scaled-up Deployment to report ready.
    pub ready_timeout_secs: u64,
    /// How long the verifier waits for object counts to converge.
    pub verify_timeout_secs: u64,
    /// Value of the `owner` label the admission policy checks for.
    pub owner: String,
    /// Value of the `purpose` label on every generated object.
    pub purpose: String,
    /// Container image for the workload Deployments.
    pub image: String,
    pub database: DatabaseConfig,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            prefix: "load-test".to_string(),
            count: 200,
            start: 1,
            width: 3,
            batch_size: 10,
            concurrency: 10,
            dwell_secs: 30,
            cooldown_secs: 10,
            ready_timeout_secs: 120,
            verify_timeout_secs: 60,
            owner: "loadgen".to_string(),
            purpose: "policy-report-load".to_string(),
            image: "nginx:1.21".to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

impl LoadConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            bail!("count must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.width == 0 {
            bail!("pad width must be at least 1");
        }
        Ok(())
    }
}

/// Connection settings for the Reports Server database. The password is
/// resolved at connect time from the environment or a file and is never a
/// plaintext field of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    /// Name of the environment variable holding the password.
    pub password_env: String,
    /// Fallback file to read the password from.
    pub password_file: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "reportsdb".to_string(),
            user: "reportsuser".to_string(),
            password_env: "LOADGEN_DB_PASSWORD".to_string(),
            password_file: None,
        }
    }
}

impl DatabaseConfig {
    fn password(&self) -> Result<String> {
        if let Ok(password) = env::var(&self.password_env) {
            return Ok(password);
        }
        if let Some(path) = &self.password_file {
            let password = fs::read_to_string(path)
                .with_context(|| format!("Failed to read password file {}", path))?;
            return Ok(password.trim().to_string());
        }
        bail!(
            "No database password: set {} or configure a password file",
            self.password_env
        )
    }

    /// Connection URL with the resolved password. Keep the result out of
    /// logs.
    pub fn url(&self) -> Result<String> {
        Ok(format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user,
            self.password()?,
            self.host,
            self.port,
            self.dbname
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_run() {
        let config = LoadConfig::default();
        assert_eq!(config.count, 200);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.dwell(), Duration::from_secs(30));
        assert_eq!(config.cooldown(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_count_is_rejected() {
        let config = LoadConfig {
            count: 0,
            ..LoadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn password_from_env_wins_over_file() {
        let database = DatabaseConfig {
            password_env: "LOADGEN_TEST_DB_PASSWORD".to_string(),
            password_file: Some("/nonexistent".to_string()),
            ..DatabaseConfig::default()
        };
        env::set_var("LOADGEN_TEST_DB_PASSWORD", "s3cret");
        let url = database.url().unwrap();
        assert!(url.contains("s3cret"));
        env::remove_var("LOADGEN_TEST_DB_PASSWORD");
    }

    #[test]
    fn missing_password_is_an_error() {
        let database = DatabaseConfig {
            password_env: "LOADGEN_TEST_DB_PASSWORD_UNSET".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(database.url().is_err());
    }
}
