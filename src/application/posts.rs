use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;

use crate::application::repos::{
    CreatePostParams, MainImageParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::domain::portable_text::{self, ContentBlock};
use crate::domain::slug::{self, SlugError, SlugLookupError};
use crate::domain::types::Category;

pub const DEFAULT_CONTENT: &str = "Start writing your blog content here...";
pub const FORM_PLACEHOLDER_CONTENT: &str = "Blog content goes here...";

#[derive(Debug, Error)]
pub enum PostWriteError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("post not found")]
    NotFound,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugLookupError<RepoError>> for PostWriteError {
    fn from(error: SlugLookupError<RepoError>) -> Self {
        match error {
            SlugLookupError::Slug(err) => PostWriteError::Slug(err),
            SlugLookupError::Lookup(err) => PostWriteError::Repo(err),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreatePostCommand {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    /// `None` falls back to a placeholder paragraph.
    pub content: Option<Vec<ContentBlock>>,
    pub main_image: Option<MainImageParams>,
    /// Derive the slug from the title when it is missing and suffix it until
    /// it is unused. The JSON API requires an explicit slug instead.
    pub derive_slug: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostCommand {
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub comments_enabled: Option<bool>,
}

/// Create, update and delete posts.
#[derive(Clone)]
pub struct PostWriteService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
}

impl PostWriteService {
    pub fn new(reader: Arc<dyn PostsRepo>, writer: Arc<dyn PostsWriteRepo>) -> Self {
        Self { reader, writer }
    }

    pub async fn create(&self, command: CreatePostCommand) -> Result<PostRecord, PostWriteError> {
        let title = non_empty(command.title).ok_or(PostWriteError::Validation(
            "Title and slug are required",
        ))?;

        let slug = if command.derive_slug {
            let base = slug::normalize_or_derive(command.slug.as_deref(), &title)?;
            let reader = Arc::clone(&self.reader);
            slug::unique_slug(base, move |candidate| {
                let reader = Arc::clone(&reader);
                async move { reader.find_by_slug(&candidate).await.map(|found| found.is_some()) }
            })
            .await?
        } else {
            non_empty(command.slug).ok_or(PostWriteError::Validation(
                "Title and slug are required",
            ))?
        };

        let content = command
            .content
            .unwrap_or_else(|| vec![ContentBlock::paragraph(DEFAULT_CONTENT)]);

        let params = CreatePostParams {
            title,
            slug,
            excerpt: non_empty(command.excerpt),
            author: non_empty(command.author),
            category: command.category.as_deref().and_then(Category::parse),
            content,
            published_at: OffsetDateTime::now_utc(),
            main_image: command.main_image,
        };

        let record = self.writer.create_post(params).await?;
        info!(post_id = %record.id, slug = %record.slug, "post created");
        Ok(record)
    }

    pub async fn update(
        &self,
        id: &str,
        command: UpdatePostCommand,
    ) -> Result<PostRecord, PostWriteError> {
        let title = non_empty(command.title).ok_or(PostWriteError::Validation("Title is required"))?;

        let params = UpdatePostParams {
            id: id.to_string(),
            title,
            excerpt: non_empty(command.excerpt),
            author: non_empty(command.author),
            comments_enabled: command.comments_enabled.unwrap_or(true),
        };

        match self.writer.update_post(params).await {
            Ok(record) => Ok(record),
            Err(RepoError::NotFound) => Err(PostWriteError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), PostWriteError> {
        match self.writer.delete_post(id).await {
            Ok(()) => {
                info!(post_id = %id, "post deleted");
                Ok(())
            }
            Err(RepoError::NotFound) => Err(PostWriteError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}

/// Build portable-text content from the plain-text form field: one paragraph
/// per blank-line separated chunk, or a placeholder when nothing was typed.
pub fn content_from_form(text: &str) -> Vec<ContentBlock> {
    let blocks = portable_text::from_plain_text(text);
    if blocks.is_empty() {
        vec![ContentBlock::paragraph(FORM_PLACEHOLDER_CONTENT)]
    } else {
        blocks
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_form_content_gets_placeholder() {
        let blocks = content_from_form("  \n\n ");
        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            ContentBlock::Text(block) => assert_eq!(block.plain_text(), FORM_PLACEHOLDER_CONTENT),
            other => panic!("unexpected block: {other:?}"),
        }
        assert_eq!(content_from_form("one\n\ntwo").len(), 2);
    }

    #[test]
    fn non_empty_trims_and_drops_blank() {
        assert_eq!(non_empty(Some("  hi ".into())).as_deref(), Some("hi"));
        assert_eq!(non_empty(Some("   ".into())), None);
        assert_eq!(non_empty(None), None);
    }
}
