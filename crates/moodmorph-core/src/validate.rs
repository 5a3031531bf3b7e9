//! Input validation for outgoing user messages.

use thiserror::Error;

/// Character count above which the input meter warns.
const WARNING_CHARS: usize = 400;
/// Character count above which the input meter turns to danger.
const DANGER_CHARS: usize = 450;

/// Why a submission was rejected. Rejections never touch the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a message")]
    Empty,
    #[error("Please keep your message under {max} characters ({len} given)")]
    TooLong { len: usize, max: usize },
    #[error("Still waiting for the previous reply")]
    Busy,
}

/// Check raw input and return its trimmed form.
///
/// # Errors
/// Returns [`ValidationError::Empty`] for blank input and
/// [`ValidationError::TooLong`] when the trimmed text exceeds `max_chars`
/// characters.
pub fn validate_input(raw: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::TooLong { len, max: max_chars });
    }
    Ok(trimmed)
}

/// State of the character counter next to the input box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMeter {
    Normal,
    Warning,
    Danger,
    OverLimit,
}

impl InputMeter {
    /// Meter state for an input of `len` characters.
    #[must_use]
    pub const fn for_len(len: usize, max_chars: usize) -> Self {
        if len > max_chars {
            Self::OverLimit
        } else if len > DANGER_CHARS {
            Self::Danger
        } else if len > WARNING_CHARS {
            Self::Warning
        } else {
            Self::Normal
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_validate_trims() {
        let text = assert_ok!(validate_input("  I feel terrible today \n", 500));
        assert_eq!(text, "I feel terrible today");
    }

    #[test]
    fn test_validate_rejects_blank() {
        assert_eq!(validate_input("", 500), Err(ValidationError::Empty));
        assert_eq!(validate_input(" \t\n", 500), Err(ValidationError::Empty));
    }

    #[test]
    fn test_validate_counts_characters_not_bytes() {
        let exactly = "é".repeat(500);
        assert_ok!(validate_input(&exactly, 500));

        let over = "a".repeat(501);
        let err = assert_err!(validate_input(&over, 500));
        assert_eq!(err, ValidationError::TooLong { len: 501, max: 500 });
    }

    #[test]
    fn test_validate_limit_ignores_surrounding_whitespace() {
        let padded = format!("   {}\n\n", "a".repeat(500));
        let text = assert_ok!(validate_input(&padded, 500));
        assert_eq!(text.chars().count(), 500);

        let over = format!("  {}  ", "a".repeat(501));
        let err = assert_err!(validate_input(&over, 500));
        assert_eq!(err, ValidationError::TooLong { len: 501, max: 500 });
    }

    #[test]
    fn test_meter_thresholds() {
        assert_eq!(InputMeter::for_len(0, 500), InputMeter::Normal);
        assert_eq!(InputMeter::for_len(400, 500), InputMeter::Normal);
        assert_eq!(InputMeter::for_len(401, 500), InputMeter::Warning);
        assert_eq!(InputMeter::for_len(451, 500), InputMeter::Danger);
        assert_eq!(InputMeter::for_len(501, 500), InputMeter::OverLimit);
    }
}
