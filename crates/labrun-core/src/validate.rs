//! Input validation for launch requests.

use crate::CoreError;

/// Maximum length of names passed to the external process.
pub const MAX_NAME_LEN: usize = 128;

/// Validate that an experiment name is usable as a single path segment.
///
/// Allowed: ASCII alphanumerics, hyphens, underscores and dots, not starting
/// with a dot.
pub fn validate_experiment_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::InvalidInput(
            "experiment name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "experiment name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }

    if name.starts_with('.') {
        return Err(CoreError::InvalidInput(
            "experiment name cannot start with '.'".to_string(),
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::InvalidInput(
            "experiment name must contain only alphanumeric characters, hyphens, underscores, and dots"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate a model name. It is passed as a single argument, never through a shell.
pub fn validate_model_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::InvalidInput("model name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::InvalidInput(format!(
            "model name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(CoreError::InvalidInput(
            "model name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate the idea count.
pub fn validate_num_ideas(num_ideas: i64) -> Result<u32, CoreError> {
    if num_ideas < 1 {
        return Err(CoreError::InvalidInput(format!(
            "num_ideas must be a positive integer, got {}",
            num_ideas
        )));
    }

    u32::try_from(num_ideas)
        .map_err(|_| CoreError::InvalidInput(format!("num_ideas {} is too large", num_ideas)))
}
