//! Failures raised while producing a controller configuration.

use std::path::PathBuf;

use thiserror::Error;
use validator::ValidationErrors;

/// Why a configuration document could not be produced.
///
/// Loading only ever fails in three ways here: an explicitly requested file
/// is missing, the merged document cannot be parsed, or a declared
/// constraint is violated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The merged document violates a declared constraint.
    #[error("invalid configuration: {}", describe(.0))]
    Validation(#[source] ValidationErrors),

    /// The file or environment overlay could not be parsed.
    #[error("configuration parsing error: {0}")]
    Parsing(#[from] figment::Error),
}

impl From<ValidationErrors> for ConfigError {
    fn from(errors: ValidationErrors) -> Self {
        ConfigError::Validation(errors)
    }
}

/// One line per violated constraint, `field: reason`.
fn describe(errors: &ValidationErrors) -> String {
    let mut parts = Vec::new();
    for (field, errors) in errors.field_errors() {
        for error in errors {
            let reason = error
                .message
                .as_ref()
                .map(|message| message.to_string())
                .unwrap_or_else(|| error.code.to_string());
            parts.push(format!("{field}: {reason}"));
        }
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Demo {
        #[validate(range(min = 5, max = 10))]
        value: u64,
    }

    #[test]
    fn validation_failures_name_the_offending_field() {
        let err = ConfigError::from(Demo { value: 1 }.validate().unwrap_err());
        assert!(err.to_string().contains("value"));
    }
}
