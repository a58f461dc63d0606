//! Domain entities mirrored from the content store.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::{error::DomainError, portable_text::ContentBlock, types::Category};

/// Durable profile attached to an OAuth identity, keyed by email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Avatar URL; empty when the provider never supplied one.
    pub image: String,
    pub github_id: Option<String>,
    pub trusted: bool,
    pub joined_at: OffsetDateTime,
}

impl AuthorRecord {
    pub fn avatar(&self) -> Option<&str> {
        (!self.image.is_empty()).then_some(self.image.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MainImage {
    pub asset_id: String,
    pub url: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: Vec<ContentBlock>,
    pub published_at: Option<OffsetDateTime>,
    /// Free-text author name. Post counts join on this, not on the author id.
    pub author: Option<String>,
    pub category: Option<Category>,
    pub views: u64,
    pub comments_enabled: bool,
    pub main_image: Option<MainImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRecord {
    pub id: String,
    pub post_id: String,
    pub name: String,
    pub email: String,
    pub comment: String,
    pub rating: Rating,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageAsset {
    pub id: String,
    pub url: String,
    pub content_type: String,
    pub filename: String,
}

/// Star rating attached to a comment, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

impl TryFrom<i64> for Rating {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            // Range checked above.
            Ok(Self(value as u8))
        } else {
            Err(DomainError::validation("Rating must be between 1 and 5"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_rejects_out_of_range_values() {
        assert_eq!(Rating::try_from(1).map(Rating::get), Ok(1));
        assert_eq!(Rating::try_from(5).map(Rating::get), Ok(5));
        assert!(Rating::try_from(0).is_err());
        assert!(Rating::try_from(6).is_err());
        assert!(Rating::try_from(-3).is_err());
    }
}
