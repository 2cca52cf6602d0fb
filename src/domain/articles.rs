//! Article entity.

use std::ops::RangeInclusive;

use serde::Serialize;
use time::OffsetDateTime;

use super::error::DomainError;

pub const TITLE_LENGTH: RangeInclusive<usize> = 3..=50;
pub const DESCRIPTION_LENGTH: RangeInclusive<usize> = 3..=500;

pub type ArticleId = u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleRecord {
    pub id: ArticleId,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ArticleRecord {
    /// Whether `needle` occurs in the title or description, ignoring case.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.title.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
    }
}

pub fn validate_title(title: &str) -> Result<(), DomainError> {
    validate_length("title", title, TITLE_LENGTH)
}

pub fn validate_description(description: &str) -> Result<(), DomainError> {
    validate_length("description", description, DESCRIPTION_LENGTH)
}

fn validate_length(
    field: &'static str,
    value: &str,
    bounds: RangeInclusive<usize>,
) -> Result<(), DomainError> {
    let length = value.chars().count();
    if bounds.contains(&length) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "{field} must be between {} and {} characters, got {length}",
            bounds.start(),
            bounds.end()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, description: &str) -> ArticleRecord {
        ArticleRecord {
            id: 1,
            title: title.to_string(),
            description: description.to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn length_bounds_are_inclusive() {
        assert!(validate_title("abc").is_ok());
        assert!(validate_title(&"a".repeat(50)).is_ok());
        assert!(validate_title("ab").is_err());
        assert!(validate_title(&"a".repeat(51)).is_err());
        assert!(validate_description(&"d".repeat(500)).is_ok());
        assert!(validate_description(&"d".repeat(501)).is_err());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        assert!(validate_title("日本語").is_ok());
    }

    #[test]
    fn search_matches_title_or_description() {
        let record = article("Caching in Rust", "Redis backed responses");
        assert!(record.matches("rust"));
        assert!(record.matches("REDIS"));
        assert!(!record.matches("postgres"));
    }

    #[test]
    fn serializes_timestamp_as_rfc3339() {
        let value = serde_json::to_value(article("Title", "Body")).expect("serialize");
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(value["id"], 1);
    }
}
