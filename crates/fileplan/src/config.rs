//! Engine configuration, loadable from JSON or YAML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CacheSettings;
use crate::conflict::{ResolutionSettings, StrategyPolicies};
use crate::error::ConfigError;
use crate::matcher::MatchOptions;
use crate::pattern::is_json;
use crate::query::ParserOptions;

pub const ENGINE_CONFIG_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: String,
    pub parser: ParserOptions,
    pub cache: CacheSettings,
    #[serde(rename = "match")]
    pub matching: MatchOptions,
    pub resolution: ResolutionSettings,
    pub policies: StrategyPolicies,
    /// Threads for `match_many`; 0 lets rayon decide.
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: ENGINE_CONFIG_VERSION.to_string(),
            parser: ParserOptions::default(),
            cache: CacheSettings::default(),
            matching: MatchOptions::default(),
            resolution: ResolutionSettings::default(),
            policies: StrategyPolicies::default(),
            worker_threads: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a `.json` file as JSON and anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config = if is_json(path) {
            Self::from_json_str(&text)?
        } else {
            Self::from_yaml_str(&text)?
        };
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parser.max_query_nodes == 0 {
            return Err(ConfigError::Invalid(
                "parser.max_query_nodes must be at least 1".to_string(),
            ));
        }
        if !(1..=10).contains(&self.parser.performance_warning_score) {
            return Err(ConfigError::Invalid(format!(
                "parser.performance_warning_score must be within 1..=10, got {}",
                self.parser.performance_warning_score
            )));
        }
        if self.cache.compiled_capacity == 0 || self.cache.result_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache capacities must be at least 1".to_string(),
            ));
        }
        if self.cache.result_ttl_seconds == 0 {
            return Err(ConfigError::Invalid(
                "cache.result_ttl_seconds must be at least 1".to_string(),
            ));
        }
        if self.matching.cancel_check_interval == 0 {
            return Err(ConfigError::Invalid(
                "match.cancel_check_interval must be at least 1".to_string(),
            ));
        }
        if self.resolution.max_rename_attempts == 0 {
            return Err(ConfigError::Invalid(
                "resolution.max_rename_attempts must be at least 1".to_string(),
            ));
        }
        if self.resolution.backup_suffix.is_empty()
            || self.resolution.backup_suffix.contains(['/', '\\'])
        {
            return Err(ConfigError::Invalid(format!(
                "resolution.backup_suffix {:?} is not a valid file name suffix",
                self.resolution.backup_suffix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ConflictType, PolicyScope, ProposedOperation, ResolutionStrategy};

    #[test]
    fn empty_documents_yield_defaults() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_yaml_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn yaml_overrides_nested_sections() {
        let yaml = r#"
parser:
  case_sensitive: true
match:
  include_misses: true
  target_dir: /sorted
resolution:
  allow_overwrite: true
  backup_suffix: .orig
policies:
  - scope:
      rule: r1
    strategy: backup
worker_threads: 2
"#;
        let config = EngineConfig::from_yaml_str(yaml).unwrap();
        assert!(config.parser.case_sensitive);
        assert_eq!(config.parser.max_query_nodes, 256);
        assert!(config.matching.include_misses);
        assert!(config.resolution.allow_overwrite);
        assert_eq!(config.resolution.backup_suffix, ".orig");
        assert_eq!(config.resolution.max_rename_attempts, 100);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.policies.policies()[0].scope, PolicyScope::Rule("r1".into()));

        let operation = ProposedOperation::new("/a", "/b").with_rule("r1");
        assert_eq!(
            config
                .policies
                .suggest(ConflictType::PathCollision, &operation),
            Some(ResolutionStrategy::Backup)
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let error = EngineConfig::from_json_str(r#"{"resolution": {"backup_suffix": "a/b"}}"#)
            .unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));

        let error =
            EngineConfig::from_json_str(r#"{"match": {"cancel_check_interval": 0}}"#).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));

        let error = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(error, ConfigError::Json(_)));
    }

    #[test]
    fn load_reads_files_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        fs::write(&path, "worker_threads: 3\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().worker_threads, 3);

        let missing = EngineConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
