use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::errors::{BootError, Result};

/// What a second `finish` call does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateFinish {
    /// Return `BootError::AlreadyFinished` and drop the new callback
    #[default]
    Reject,
    /// Drop the new callback and return `Ok(())`
    Ignore,
}

/// Boot coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Label attached to tracing output
    pub name: String,
    /// Policy for repeated `finish` calls
    pub on_duplicate_finish: DuplicateFinish,
    /// Turn step panics into `BootError::Panicked`
    pub catch_panics: bool,
    /// Install the logging hook on construction
    pub trace_events: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            name: "boot".to_string(),
            on_duplicate_finish: DuplicateFinish::Reject,
            catch_panics: true,
            trace_events: true,
        }
    }
}

impl BootConfig {
    /// Create a config builder
    pub fn builder() -> BootConfigBuilder {
        BootConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BootError::configuration_field(
                "name must not be empty",
                "name",
            ));
        }
        Ok(())
    }

    /// Parse and validate a YAML document. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        debug!("Loaded boot config '{}'", config.name);
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Builder for `BootConfig`
pub struct BootConfigBuilder {
    config: BootConfig,
}

impl BootConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BootConfig::default(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn on_duplicate_finish(mut self, policy: DuplicateFinish) -> Self {
        self.config.on_duplicate_finish = policy;
        self
    }

    pub fn catch_panics(mut self, enabled: bool) -> Self {
        self.config.catch_panics = enabled;
        self
    }

    pub fn trace_events(mut self, enabled: bool) -> Self {
        self.config.trace_events = enabled;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<BootConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for BootConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
