//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted user, host or quiz identifier.
pub const MAX_IDENTIFIER_LEN: usize = 64;
/// Longest accepted display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 32;

/// Validates an opaque identifier: non-blank, bounded, no control characters.
///
/// # Examples
///
/// ```ignore
/// validate_identifier("user-42") // Ok
/// validate_identifier("   ")     // Err - blank
/// ```
pub fn validate_identifier(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        let mut err = ValidationError::new("identifier_blank");
        err.message = Some("Identifier must not be blank".into());
        return Err(err);
    }

    if id.chars().count() > MAX_IDENTIFIER_LEN {
        let mut err = ValidationError::new("identifier_length");
        err.message = Some(
            format!("Identifier must be at most {MAX_IDENTIFIER_LEN} characters").into(),
        );
        return Err(err);
    }

    if id.chars().any(char::is_control) {
        let mut err = ValidationError::new("identifier_format");
        err.message = Some("Identifier must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a name shown to other participants.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("display_name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_DISPLAY_NAME_LEN {
        let mut err = ValidationError::new("display_name_length");
        err.message =
            Some(format!("Name must be at most {MAX_DISPLAY_NAME_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Join codes are strictly positive.
pub fn validate_join_code(code: u32) -> Result<(), ValidationError> {
    if code == 0 {
        let mut err = ValidationError::new("join_code");
        err.message = Some("Room code must be a positive number".into());
        return Err(err);
    }
    Ok(())
}
