//! Custom validation functions for configuration.

use validator::ValidationError;

/// Validate that a chain name is acceptable to the packet-filter tool.
pub fn validate_chain_name(name: &str) -> Result<(), ValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 28
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_chain_name"))
    }
}
