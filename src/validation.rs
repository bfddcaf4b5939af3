//! Input validation for forksync
//!
//! Owner and repository names come from remote URLs and API payloads and end
//! up in request URLs and git ref names; remote names end up in git config.
//! Both are checked before use.

use thiserror::Error;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid identifier '{0}': {1}")]
    InvalidIdentifier(String, &'static str),

    #[error("Identifier '{0}' is too long (max {1} characters)")]
    TooLong(String, usize),

    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Reserved name: '{0}'")]
    Reserved(String),
}

/// Maximum length for identifiers
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Path segments that can never name an owner or repository
const RESERVED_SEGMENTS: &[&str] = &[".", ".."];

/// Validate an owner or repository name taken from a URL or API payload
///
/// Rules:
/// - Must be 1-255 characters
/// - Alphanumeric, underscore, hyphen and dot allowed
/// - Cannot be `.` or `..`
pub fn validate_path_segment(name: &str) -> Result<(), ValidationError> {
    check_length(name)?;

    if RESERVED_SEGMENTS.contains(&name) {
        return Err(ValidationError::Reserved(name.to_string()));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '-' && c != '.' {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "contains invalid characters (only alphanumeric, underscore, hyphen, and dot allowed)",
            ));
        }
    }

    Ok(())
}

/// Validate a git remote name
///
/// Remote names become part of ref names (`refs/remotes/<name>/...`), so the
/// git ref-format rules that matter for a single component apply.
pub fn validate_remote_name(name: &str) -> Result<(), ValidationError> {
    check_length(name)?;

    if name.starts_with('-') || name.starts_with('.') {
        return Err(ValidationError::InvalidIdentifier(
            name.to_string(),
            "cannot start with a hyphen or dot",
        ));
    }
    if name.ends_with(".lock") || name.ends_with('.') {
        return Err(ValidationError::InvalidIdentifier(
            name.to_string(),
            "cannot end with '.lock' or a dot",
        ));
    }
    if name.contains("..") || name.contains("@{") {
        return Err(ValidationError::InvalidIdentifier(
            name.to_string(),
            "contains a forbidden sequence",
        ));
    }
    for c in name.chars() {
        if c.is_ascii_control() || c.is_whitespace() || "~^:?*[\\/".contains(c) {
            return Err(ValidationError::InvalidIdentifier(
                name.to_string(),
                "contains characters git does not allow in ref names",
            ));
        }
    }

    Ok(())
}

fn check_length(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong(name.to_string(), MAX_IDENTIFIER_LENGTH));
    }
    Ok(())
}
