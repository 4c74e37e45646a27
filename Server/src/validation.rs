// Server-side name validation rules
// Usernames:
// - non empty, max 32 chars
// - no whitespace, no control characters
// Group names:
// - non empty after trimming, max 64 chars
// - no control characters

use crate::error::PolicyViolation;

pub const MAX_USERNAME_CHARS: usize = 32;
pub const MAX_GROUP_NAME_CHARS: usize = 64;

pub fn validate_username(s: &str) -> Result<(), PolicyViolation> {
    if s.is_empty() {
        return Err(PolicyViolation::InvalidName("username must not be empty".into()));
    }
    if s.chars().count() > MAX_USERNAME_CHARS {
        return Err(PolicyViolation::InvalidName(format!(
            "username too long (max {MAX_USERNAME_CHARS})"
        )));
    }
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PolicyViolation::InvalidName(
            "username must not contain whitespace or control characters".into(),
        ));
    }
    Ok(())
}

/// Returns the trimmed group name if it is acceptable.
pub fn validate_group_name(s: &str) -> Result<&str, PolicyViolation> {
    let name = s.trim();
    if name.is_empty() {
        return Err(PolicyViolation::InvalidName("group name must not be empty".into()));
    }
    if name.chars().count() > MAX_GROUP_NAME_CHARS {
        return Err(PolicyViolation::InvalidName(format!(
            "group name too long (max {MAX_GROUP_NAME_CHARS})"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(PolicyViolation::InvalidName(
            "group name must not contain control characters".into(),
        ));
    }
    Ok(name)
}

pub fn validate_text(s: &str) -> Result<(), PolicyViolation> {
    if s.trim().is_empty() {
        return Err(PolicyViolation::EmptyMessage);
    }
    Ok(())
}
