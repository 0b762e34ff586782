//! String value validation
//!
//! A `string` node can check a JSON value against its declared format and
//! constraints. Format syntax is delegated to a [`FormatValidator`], so callers
//! with stricter checkers (full DID resolution, CID decoding, BCP 47 tables)
//! can plug them in; [`BasicFormatValidator`] covers the common cases.
//!
//! # Example
//!
//! ```rust
//! use atproto_lexicon::lexicon::{LexString, StringConstraints, StringFormat};
//! use serde_json::json;
//!
//! let def = LexString {
//!     description: None,
//!     format: Some(StringFormat::Handle),
//!     constraints: StringConstraints {
//!         max_length: Some(253),
//!         ..Default::default()
//!     },
//! };
//!
//! assert!(def.validate(&json!("user.bsky.social"), "$.handle").is_ok());
//! assert!(def.validate(&json!("invalid handle!"), "$.handle").is_err());
//! ```

use super::constraints::StringConstraints;
use super::formats::StringFormat;
use super::types::LexString;
use crate::nsid;
use serde_json::Value;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

/// Errors that can occur during validation
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Value is not a JSON string
    #[error("{path}: expected a string, got {value}")]
    NotAString {
        /// Location of the value
        path: String,
        /// The value that was provided
        value: String,
    },

    /// Invalid string format
    #[error("{path}: invalid {format} '{value}': {reason}")]
    InvalidFormat {
        /// Location of the value
        path: String,
        /// The format that was expected
        format: StringFormat,
        /// The value that failed validation
        value: String,
        /// Checker message
        reason: String,
    },

    /// String is too long
    #[error("{path}: string exceeds maximum length: {actual} > {max}")]
    StringTooLong {
        /// Location of the value
        path: String,
        /// Actual length
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// String is too short
    #[error("{path}: string is shorter than minimum length: {actual} < {min}")]
    StringTooShort {
        /// Location of the value
        path: String,
        /// Actual length
        actual: usize,
        /// Minimum required length
        min: usize,
    },

    /// String has too many graphemes
    #[error("{path}: string exceeds maximum graphemes: {actual} > {max}")]
    TooManyGraphemes {
        /// Location of the value
        path: String,
        /// Actual grapheme count
        actual: usize,
        /// Maximum allowed graphemes
        max: usize,
    },

    /// String has too few graphemes
    #[error("{path}: string has fewer than minimum graphemes: {actual} < {min}")]
    TooFewGraphemes {
        /// Location of the value
        path: String,
        /// Actual grapheme count
        actual: usize,
        /// Minimum required graphemes
        min: usize,
    },

    /// Value not in enum
    #[error("{path}: value '{value}' not in allowed enum values")]
    NotInEnum {
        /// Location of the value
        path: String,
        /// The value that was provided
        value: String,
    },

    /// Value does not match constant
    #[error("{path}: value '{actual}' does not match required constant '{expected}'")]
    ConstMismatch {
        /// Location of the value
        path: String,
        /// The value that was provided
        actual: String,
        /// The expected constant value
        expected: String,
    },
}

/// Result type for validation operations
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Syntax checker for string formats
///
/// Returns a short reason on failure; the caller wraps it with the value's
/// location.
#[cfg_attr(test, mockall::automock)]
pub trait FormatValidator {
    /// Check `value` against `format`
    fn check(&self, format: StringFormat, value: &str) -> std::result::Result<(), String>;
}

/// Built-in format checks
///
/// Structural only: DIDs are not resolved, CIDs are not decoded, and
/// language tags are not checked against the registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormatValidator;

impl FormatValidator for BasicFormatValidator {
    fn check(&self, format: StringFormat, value: &str) -> std::result::Result<(), String> {
        match format {
            StringFormat::AtIdentifier => check_at_identifier(value),
            StringFormat::AtUri => check_at_uri(value),
            StringFormat::Cid => check_cid(value),
            StringFormat::Datetime => check_datetime(value),
            StringFormat::Did => check_did(value),
            StringFormat::Handle => check_handle(value),
            StringFormat::Nsid => nsid::validate_nsid(value).map_err(|e| e.to_string()),
            StringFormat::Tid => check_tid(value),
            StringFormat::RecordKey => check_record_key(value),
            StringFormat::Uri => check_uri(value),
            StringFormat::Language => check_language(value),
        }
    }
}

fn check_at_identifier(value: &str) -> std::result::Result<(), String> {
    if value.starts_with("did:") {
        check_did(value)
    } else {
        check_handle(value)
    }
}

fn check_at_uri(value: &str) -> std::result::Result<(), String> {
    let rest = value
        .strip_prefix("at://")
        .ok_or_else(|| "must start with 'at://'".to_string())?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err("missing authority".to_string());
    }
    check_at_identifier(authority).map_err(|reason| format!("authority: {}", reason))
}

fn check_cid(value: &str) -> std::result::Result<(), String> {
    if value.len() < 8 || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("not a multibase-encoded CID".to_string());
    }
    Ok(())
}

fn check_datetime(value: &str) -> std::result::Result<(), String> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|e| format!("not an RFC 3339 datetime: {}", e))
}

fn check_did(value: &str) -> std::result::Result<(), String> {
    let mut parts = value.splitn(3, ':');
    if parts.next() != Some("did") {
        return Err("must start with 'did:'".to_string());
    }

    let method = parts.next().unwrap_or_default();
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(format!("invalid method '{}'", method));
    }

    let identifier = parts.next().unwrap_or_default();
    if identifier.is_empty() || identifier.ends_with(':') {
        return Err("missing method-specific identifier".to_string());
    }
    if !identifier
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '%' | '-'))
    {
        return Err("invalid character in identifier".to_string());
    }

    Ok(())
}

fn check_handle(value: &str) -> std::result::Result<(), String> {
    if value.len() > 253 {
        return Err("longer than 253 characters".to_string());
    }
    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return Err("needs at least two labels".to_string());
    }

    for label in &labels {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("invalid label '{}'", label));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("invalid character in '{}'", label));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' starts or ends with a hyphen", label));
        }
    }

    let tld = labels[labels.len() - 1];
    if !tld.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err("top-level label must start with a letter".to_string());
    }
    Ok(())
}

fn check_tid(value: &str) -> std::result::Result<(), String> {
    if value.len() != 13 {
        return Err("must be 13 characters".to_string());
    }
    // base32-sortable alphabet
    if !value.chars().all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c)) {
        return Err("invalid base32-sortable character".to_string());
    }
    Ok(())
}

fn check_record_key(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() || value.len() > 512 {
        return Err("must be 1-512 characters".to_string());
    }
    if value == "." || value == ".." {
        return Err("reserved record key".to_string());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | ':'))
    {
        return Err("invalid character".to_string());
    }
    Ok(())
}

fn check_uri(value: &str) -> std::result::Result<(), String> {
    let (scheme, rest) = value
        .split_once(':')
        .ok_or_else(|| "missing scheme".to_string())?;
    if !scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return Err(format!("invalid scheme '{}'", scheme));
    }
    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err("invalid hierarchical part".to_string());
    }
    Ok(())
}

fn check_language(value: &str) -> std::result::Result<(), String> {
    let mut subtags = value.split('-');
    let primary = subtags.next().unwrap_or_default();
    let well_sized = (2..=3).contains(&primary.len()) || primary == "i" || primary == "x";
    if !well_sized || !primary.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("invalid primary subtag '{}'", primary));
    }
    let malformed = |s: &str| {
        s.is_empty() || s.len() > 8 || !s.chars().all(|c| c.is_ascii_alphanumeric())
    };
    if subtags.any(malformed) {
        return Err("invalid subtag".to_string());
    }
    Ok(())
}

fn check_constraints(value: &str, constraints: &StringConstraints, path: &str) -> Result<()> {
    let byte_len = value.len();
    if let Some(max) = constraints.max_length {
        if byte_len > max {
            return Err(ValidationError::StringTooLong {
                path: path.to_string(),
                actual: byte_len,
                max,
            });
        }
    }
    if let Some(min) = constraints.min_length {
        if byte_len < min {
            return Err(ValidationError::StringTooShort {
                path: path.to_string(),
                actual: byte_len,
                min,
            });
        }
    }

    if constraints.max_graphemes.is_some() || constraints.min_graphemes.is_some() {
        let grapheme_count = value.graphemes(true).count();
        if let Some(max) = constraints.max_graphemes {
            if grapheme_count > max {
                return Err(ValidationError::TooManyGraphemes {
                    path: path.to_string(),
                    actual: grapheme_count,
                    max,
                });
            }
        }
        if let Some(min) = constraints.min_graphemes {
            if grapheme_count < min {
                return Err(ValidationError::TooFewGraphemes {
                    path: path.to_string(),
                    actual: grapheme_count,
                    min,
                });
            }
        }
    }

    if let Some(allowed) = &constraints.r#enum {
        if !allowed.iter().any(|a| a == value) {
            return Err(ValidationError::NotInEnum {
                path: path.to_string(),
                value: value.to_string(),
            });
        }
    }

    if let Some(constant) = &constraints.r#const {
        if value != constant {
            return Err(ValidationError::ConstMismatch {
                path: path.to_string(),
                actual: value.to_string(),
                expected: constant.clone(),
            });
        }
    }

    Ok(())
}

impl LexString {
    /// Validate a value with the built-in format checks
    ///
    /// Returns the value unchanged on success.
    pub fn validate(&self, value: &Value, path: &str) -> Result<Value> {
        self.validate_with(&BasicFormatValidator, value, path)
    }

    /// Validate a value, delegating format checks to `validator`
    pub fn validate_with(
        &self,
        validator: &dyn FormatValidator,
        value: &Value,
        path: &str,
    ) -> Result<Value> {
        let Some(text) = value.as_str() else {
            return Err(ValidationError::NotAString {
                path: path.to_string(),
                value: value.to_string(),
            });
        };

        if let Some(format) = self.format {
            validator.check(format, text).map_err(|reason| ValidationError::InvalidFormat {
                path: path.to_string(),
                format,
                value: text.to_string(),
                reason,
            })?;
        }

        check_constraints(text, &self.constraints, path)?;
        Ok(value.clone())
    }
}
