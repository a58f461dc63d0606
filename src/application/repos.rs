//! Repository traits describing content-store adapters.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{AuthorRecord, CommentRecord, ImageAsset, PostRecord, Rating};
use crate::domain::portable_text::ContentBlock;
use crate::domain::types::Category;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("content store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateAuthorParams {
    pub name: String,
    pub email: String,
    pub image: String,
    pub github_id: Option<String>,
    pub joined_at: OffsetDateTime,
}

/// Result of an atomic create-if-absent keyed on the author email.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthorInsert {
    Created(AuthorRecord),
    /// Another writer got there first; carries the stored record.
    Existing(AuthorRecord),
}

impl AuthorInsert {
    pub fn record(&self) -> &AuthorRecord {
        match self {
            AuthorInsert::Created(record) | AuthorInsert::Existing(record) => record,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MainImageParams {
    pub asset_id: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub category: Option<Category>,
    pub content: Vec<ContentBlock>,
    pub published_at: OffsetDateTime,
    pub main_image: Option<MainImageParams>,
}

/// Partial post update. `None` leaves the stored field untouched.
#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub author: Option<String>,
    pub comments_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: String,
    pub name: String,
    pub email: String,
    pub comment: String,
    pub rating: Rating,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UploadImageParams {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait AuthorsRepo: Send + Sync {
    /// Exact email match. When several records share an email the first one
    /// the store returns wins.
    async fn find_author_by_email(&self, email: &str) -> Result<Option<AuthorRecord>, RepoError>;

    async fn find_author_by_id(&self, id: &str) -> Result<Option<AuthorRecord>, RepoError>;

    /// Create the author unless one with the same email already exists. Must
    /// be atomic with respect to concurrent calls for the same email.
    async fn create_author_if_absent(
        &self,
        params: CreateAuthorParams,
    ) -> Result<AuthorInsert, RepoError>;

    /// Create an author under a fresh id without any email uniqueness check.
    /// Used for identities that carry no email to key on.
    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError>;

    async fn update_author_image(&self, id: &str, image: &str) -> Result<(), RepoError>;

    /// Returns [`RepoError::NotFound`] when no author has this email.
    async fn set_trusted(&self, email: &str, trusted: bool) -> Result<AuthorRecord, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// All posts, newest `published_at` first.
    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError>;

    /// Posts whose free-text author equals `author_name`, newest first.
    async fn list_by_author(&self, author_name: &str) -> Result<Vec<PostRecord>, RepoError>;

    async fn count_by_author(&self, author_name: &str) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments on a post, newest first.
    async fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, RepoError>;

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait AssetsRepo: Send + Sync {
    async fn upload_image(&self, params: UploadImageParams) -> Result<ImageAsset, RepoError>;

    /// Image bytes served by this process. Stores that host assets elsewhere
    /// return `Ok(None)`.
    async fn load_image(&self, id: &str) -> Result<Option<(ImageAsset, Bytes)>, RepoError>;

    /// URL for an image asset reference found in post content.
    fn image_url(&self, asset_ref: &str) -> Option<String>;

    /// URL handed back to the uploader for display.
    fn display_url(&self, asset: &ImageAsset) -> String {
        asset.url.clone()
    }
}

/// The store adapters a running server needs, behind their traits.
#[derive(Clone)]
pub struct Repositories {
    pub authors: Arc<dyn AuthorsRepo>,
    pub posts: Arc<dyn PostsRepo>,
    pub posts_write: Arc<dyn PostsWriteRepo>,
    pub comments: Arc<dyn CommentsRepo>,
    pub assets: Arc<dyn AssetsRepo>,
}

impl Repositories {
    /// Use one store for every repository role.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AuthorsRepo + PostsRepo + PostsWriteRepo + CommentsRepo + AssetsRepo + 'static,
    {
        Self {
            authors: store.clone(),
            posts: store.clone(),
            posts_write: store.clone(),
            comments: store.clone(),
            assets: store,
        }
    }
}
