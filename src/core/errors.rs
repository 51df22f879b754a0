use thiserror::Error;

/// Unified error type for the boot coordinator
#[derive(Debug, Error)]
pub enum BootError {
    /// A step reported failure (done signal, sync `Err` or future `Err`)
    #[error("Step failed: {step} - {source}")]
    Step {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// A step panicked while running
    #[error("Step panicked: {step} - {message}")]
    Panicked { step: String, message: String },

    /// Every completion handle of a callback step was dropped without a signal
    #[error("Step abandoned without signaling completion: {step}")]
    Abandoned { step: String },

    /// A future step was registered outside of a tokio runtime
    #[error("No tokio runtime available to drive step: {step}")]
    NoRuntime { step: String },

    /// The completion callback was dropped without firing
    #[error("Boot sequence dropped before settling")]
    Dropped,

    /// `finish` was called more than once under the reject policy
    #[error("Completion callback already installed")]
    AlreadyFinished,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BootError {
    /// Create a step failure from any error value
    pub fn step<S: Into<String>, E: Into<anyhow::Error>>(step: S, source: E) -> Self {
        Self::Step {
            step: step.into(),
            source: source.into(),
        }
    }

    pub fn panicked<S: Into<String>, M: Into<String>>(step: S, message: M) -> Self {
        Self::Panicked {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn abandoned<S: Into<String>>(step: S) -> Self {
        Self::Abandoned { step: step.into() }
    }

    pub fn no_runtime<S: Into<String>>(step: S) -> Self {
        Self::NoRuntime { step: step.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Name of the step that produced this error, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. }
            | Self::Panicked { step, .. }
            | Self::Abandoned { step }
            | Self::NoRuntime { step } => Some(step),
            _ => None,
        }
    }

    /// The opaque error a step reported, for downcasting
    pub fn step_source(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Step { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::Panicked { .. } => "panic",
            Self::Abandoned { .. } => "abandoned",
            Self::NoRuntime { .. } => "runtime",
            Self::Dropped => "dropped",
            Self::AlreadyFinished => "finish",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BootError>;

impl From<serde_yaml::Error> for BootError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<serde_json::Error> for BootError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_step_error_keeps_source() {
        let err = BootError::step("database", DiskFull);
        assert_eq!(err.category(), "step");
        assert_eq!(err.step_name(), Some("database"));
        assert_eq!(err.to_string(), "Step failed: database - disk full");

        let source = err.step_source().expect("step errors carry a source");
        assert!(source.downcast_ref::<DiskFull>().is_some());
    }

    #[test]
    fn test_step_name_only_for_step_errors() {
        assert_eq!(BootError::abandoned("cache").step_name(), Some("cache"));
        assert_eq!(BootError::no_runtime("http").step_name(), Some("http"));
        assert!(BootError::AlreadyFinished.step_name().is_none());
        assert!(BootError::configuration("bad").step_source().is_none());
    }

    #[test]
    fn test_configuration_field() {
        let err = BootError::configuration_field("must not be empty", "name");
        if let BootError::Configuration { field, .. } = err {
            assert_eq!(field.as_deref(), Some("name"));
        } else {
            panic!("Expected configuration error");
        }
    }
}
