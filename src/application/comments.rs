use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::application::repos::{CommentsRepo, CreateCommentParams, RepoError};
use crate::domain::entities::{CommentRecord, Rating};

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("{0}")]
    Validation(&'static str),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct SubmitCommentCommand {
    pub post_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub comment: Option<String>,
    /// Missing ratings default to five stars, the form's initial value.
    pub rating: Option<i64>,
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentsRepo>) -> Self {
        Self { comments }
    }

    pub async fn list(&self, post_id: &str) -> Result<Vec<CommentRecord>, CommentError> {
        if post_id.trim().is_empty() {
            return Err(CommentError::Validation("Invalid blog ID"));
        }
        self.comments
            .list_for_post(post_id)
            .await
            .map_err(CommentError::from)
    }

    pub async fn submit(&self, command: SubmitCommentCommand) -> Result<CommentRecord, CommentError> {
        let params = validate(command, OffsetDateTime::now_utc())?;
        self.comments
            .create_comment(params)
            .await
            .map_err(CommentError::from)
    }
}

fn validate(
    command: SubmitCommentCommand,
    now: OffsetDateTime,
) -> Result<CreateCommentParams, CommentError> {
    let (Some(post_id), Some(name), Some(email), Some(comment)) = (
        present(command.post_id),
        present(command.name),
        present(command.email),
        present(command.comment),
    ) else {
        return Err(CommentError::Validation("Missing required fields"));
    };

    let rating = match command.rating {
        Some(value) => Rating::try_from(value)
            .map_err(|_| CommentError::Validation("Rating must be between 1 and 5"))?,
        None => Rating::default(),
    };

    Ok(CreateCommentParams {
        post_id,
        name,
        email,
        comment,
        rating,
        created_at: now,
    })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn command() -> SubmitCommentCommand {
        SubmitCommentCommand {
            post_id: Some("post-1".into()),
            name: Some("Reader".into()),
            email: Some("reader@x.com".into()),
            comment: Some("Nice post".into()),
            rating: Some(4),
        }
    }

    #[test]
    fn valid_comment_keeps_fields() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let params = validate(command(), now).expect("valid");
        assert_eq!(params.post_id, "post-1");
        assert_eq!(params.rating.get(), 4);
        assert_eq!(params.created_at, now);
    }

    #[test]
    fn missing_fields_are_rejected() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut missing = command();
        missing.email = Some("  ".into());
        assert!(matches!(
            validate(missing, now),
            Err(CommentError::Validation("Missing required fields"))
        ));
    }

    #[test]
    fn rating_bounds_are_enforced() {
        let now = datetime!(2024-06-01 12:00 UTC);
        for rating in [0, 6, -1] {
            let mut bad = command();
            bad.rating = Some(rating);
            assert!(matches!(
                validate(bad, now),
                Err(CommentError::Validation("Rating must be between 1 and 5"))
            ));
        }

        let mut defaulted = command();
        defaulted.rating = None;
        assert_eq!(validate(defaulted, now).expect("valid").rating.get(), 5);
    }
}
