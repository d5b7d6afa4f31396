//! Configuration loading and validation.

mod types;
pub(crate) mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration for resume validation.
    ///
    /// Only the fields that decide which keys end up where are hashed, so
    /// tuning knobs (workers, retries, timeouts) can change between runs.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.url.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.target.url.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.migration.key_pattern.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl StoreConfig {
    /// Name used in logs.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  url: redis://source:6379/0
target:
  url: redis://target:6379/0
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.migration.key_pattern, "*");
        assert!(config.migration.verify);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.timeouts.large_data_threshold, 10_000);
        assert_eq!(config.verify.score_epsilon, 0.0);
    }

    #[test]
    fn test_from_yaml_overrides() {
        let yaml = r#"
source:
  url: redis://source:6379/0
  name: legacy
target:
  url: redis://target:6379/0
migration:
  workers: 2
  key_pattern: "user:*"
  verify: false
retry:
  max_attempts: 5
  retryable_errors: ["reset"]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.get_workers(), 2);
        assert_eq!(config.migration.key_pattern, "user:*");
        assert!(!config.migration.verify);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retryable_errors, vec!["reset".to_string()]);
        assert_eq!(config.source.display_name("source"), "legacy");
        assert_eq!(config.target.display_name("target"), "target");
    }

    #[test]
    fn test_hash_ignores_tuning() {
        let a = Config::from_yaml(MINIMAL).unwrap();
        let mut b = a.clone();
        b.migration.workers = Some(32);
        b.retry.max_attempts = 9;
        assert_eq!(a.hash(), b.hash());

        b.migration.key_pattern = "session:*".into();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("source: [").is_err());
    }
}
