use serde::Deserialize;

/// Root application configuration. Loaded from an optional
/// `behavior-coach.toml` and environment variables with the prefix
/// `BEHAVIOR_COACH__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What the rule builder does when a group with several children is
/// switched to NOT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotSwitchPolicy {
    /// Refuse the switch and leave the tree unchanged.
    #[default]
    Reject,
    /// Keep the first child and drop the rest.
    Truncate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default)]
    pub not_switch_policy: NotSwitchPolicy,
    #[serde(default = "default_max_rule_depth")]
    pub max_rule_depth: usize,
    /// Worker count above which batch membership runs on the rayon pool.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

// Default functions
fn default_max_rule_depth() -> usize {
    8
}
fn default_parallel_threshold() -> usize {
    256
}
fn default_store_dir() -> String {
    "./segments".to_string()
}
fn default_log_filter() -> String {
    "segment_admin=info,coach_segmentation=info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segmentation: SegmentationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            not_switch_policy: NotSwitchPolicy::default(),
            max_rule_depth: default_max_rule_depth(),
            parallel_threshold: default_parallel_threshold(),
            store_dir: default_store_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("behavior-coach")
    }

    /// Same as [`AppConfig::load`] with an explicit config file stem.
    pub fn load_from(file_stem: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            .add_source(
                config::Environment::with_prefix("BEHAVIOR_COACH")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.segmentation.not_switch_policy, NotSwitchPolicy::Reject);
        assert_eq!(config.segmentation.max_rule_depth, 8);
        assert_eq!(config.segmentation.parallel_threshold, 256);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"segmentation": {"not_switch_policy": "truncate"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.segmentation.not_switch_policy,
            NotSwitchPolicy::Truncate
        );
        assert_eq!(config.segmentation.store_dir, "./segments");
        assert_eq!(config.logging.filter, default_log_filter());
    }
}
