//! Field and tag validation.
//!
//! Everything here runs before a transaction is opened, so a rejected
//! input never touches the database.

use std::collections::HashSet;

use crate::error::{Result, StoreError};

/// Maximum bytes per tag.
pub const MAX_TAG_BYTES: usize = 128;

/// Maximum tags per record.
pub const MAX_TAGS_PER_RECORD: usize = 100;

/// Maximum note content size in bytes.
pub const MAX_CONTENT_BYTES: usize = 1024 * 1024;

/// Maximum title length for notes and tasks.
pub const MAX_TITLE_CHARS: usize = 200;

/// Maximum description length for projects and tasks.
pub const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Maximum project name length.
pub const MAX_PROJECT_NAME_CHARS: usize = 100;

/// Maximum note file path length.
pub const MAX_FILE_PATH_CHARS: usize = 255;

/// Username length bounds.
pub const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=50;

/// Maximum email length.
pub const MAX_EMAIL_CHARS: usize = 255;

/// Normalize and validate tags.
///
/// - Trims whitespace and converts to lowercase
/// - Removes duplicates, preserving first-occurrence order
/// - Validates character set (alphanumeric, dash, underscore, colon)
/// - Enforces length limits
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    if tags.len() > MAX_TAGS_PER_RECORD {
        return Err(StoreError::InvalidInput(format!(
            "Too many tags (max {})",
            MAX_TAGS_PER_RECORD
        )));
    }

    let mut seen = HashSet::with_capacity(tags.len());
    let mut normalized = Vec::with_capacity(tags.len());

    for tag in tags {
        let trimmed = tag.trim().to_ascii_lowercase();
        if trimmed.is_empty() {
            return Err(StoreError::InvalidInput(
                "Empty tag is not allowed".to_string(),
            ));
        }
        if trimmed.len() > MAX_TAG_BYTES {
            return Err(StoreError::InvalidInput(format!(
                "Tag too long (max {} bytes)",
                MAX_TAG_BYTES
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
        {
            return Err(StoreError::InvalidInput(
                "Tag contains invalid characters".to_string(),
            ));
        }
        if seen.insert(trimmed.clone()) {
            normalized.push(trimmed);
        }
    }

    Ok(normalized)
}

/// Validate a required non-empty text field with a length ceiling.
pub fn validate_text(field: &str, value: &str, max_chars: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "{} must not be empty",
            field
        )));
    }
    if value.chars().count() > max_chars {
        return Err(StoreError::InvalidInput(format!(
            "{} too long (max {} characters)",
            field, max_chars
        )));
    }
    Ok(())
}

/// Validate an optional text field with a length ceiling.
pub fn validate_opt_text(field: &str, value: Option<&str>, max_chars: usize) -> Result<()> {
    if let Some(value) = value {
        if value.chars().count() > max_chars {
            return Err(StoreError::InvalidInput(format!(
                "{} too long (max {} characters)",
                field, max_chars
            )));
        }
    }
    Ok(())
}

/// Validate note content size.
pub fn validate_content(content: &str) -> Result<()> {
    if content.len() > MAX_CONTENT_BYTES {
        return Err(StoreError::InvalidInput(format!(
            "Note content too large (max {} bytes)",
            MAX_CONTENT_BYTES
        )));
    }
    Ok(())
}

/// Validate a username: lowercase alphanumeric plus underscore.
pub fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_CHARS.contains(&username.chars().count()) {
        return Err(StoreError::InvalidInput(format!(
            "Username must be {}-{} characters",
            USERNAME_CHARS.start(),
            USERNAME_CHARS.end()
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(StoreError::InvalidInput(
            "Username may only contain lowercase letters, digits, and underscore".to_string(),
        ));
    }
    Ok(())
}

/// Validate an email address. Deliberately shallow: presence of `@` with
/// text on both sides, plus a length ceiling.
pub fn validate_email(email: &str) -> Result<()> {
    if email.len() > MAX_EMAIL_CHARS {
        return Err(StoreError::InvalidInput(format!(
            "Email too long (max {} characters)",
            MAX_EMAIL_CHARS
        )));
    }
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.is_empty() {
        return Err(StoreError::InvalidInput(
            "Email must be of the form local@domain".to_string(),
        ));
    }
    Ok(())
}

/// Validate a `#RRGGBB` hex color string.
pub fn validate_color(color: &str) -> Result<()> {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(StoreError::InvalidInput(
            "Color must be a #RRGGBB hex string".to_string(),
        ));
    }
    Ok(())
}

/// Validate an hours field (estimated or actual).
pub fn validate_hours(field: &str, hours: Option<f64>) -> Result<()> {
    if let Some(hours) = hours {
        if !hours.is_finite() || hours < 0.0 {
            return Err(StoreError::InvalidInput(format!(
                "{} must be a non-negative number",
                field
            )));
        }
    }
    Ok(())
}

/// Validate a completion percentage.
pub fn validate_completion(completion: u8) -> Result<()> {
    if completion > 100 {
        return Err(StoreError::InvalidInput(
            "Completion must be between 0 and 100".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_normalize_and_dedupe() {
        let tags = vec![
            "  Rust ".to_string(),
            "rust".to_string(),
            "db:sqlite".to_string(),
        ];
        let normalized = normalize_tags(&tags).unwrap();
        assert_eq!(normalized, vec!["rust", "db:sqlite"]);
    }

    #[test]
    fn tags_reject_invalid_characters() {
        assert!(normalize_tags(&["has space".to_string()]).is_err());
        assert!(normalize_tags(&["".to_string()]).is_err());
        assert!(normalize_tags(&["a".repeat(MAX_TAG_BYTES + 1)]).is_err());
    }

    #[test]
    fn username_bounds() {
        assert!(validate_username("jo").is_err());
        assert!(validate_username("Jo_hn").is_err());
        assert!(validate_username("john_doe42").is_ok());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@b.example").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@domain").is_err());
        assert!(validate_email("local@").is_err());
    }

    #[test]
    fn color_shape() {
        assert!(validate_color("#A1b2C3").is_ok());
        assert!(validate_color("A1b2C3").is_err());
        assert!(validate_color("#12345").is_err());
        assert!(validate_color("#12345G").is_err());
    }

    #[test]
    fn hours_and_completion() {
        assert!(validate_hours("estimated_hours", Some(-1.0)).is_err());
        assert!(validate_hours("estimated_hours", Some(f64::NAN)).is_err());
        assert!(validate_hours("estimated_hours", None).is_ok());
        assert!(validate_completion(100).is_ok());
        assert!(validate_completion(101).is_err());
    }
}
