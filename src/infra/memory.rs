//! In-process content store.
//!
//! Backs local development (`store.backend = "memory"`) and the test suite.
//! Every repository trait is implemented over concurrent maps; the author
//! email index enforces one author per email through the map's entry API.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, mapref::entry::Entry};
use uuid::Uuid;

use crate::application::repos::{
    AssetsRepo, AuthorInsert, AuthorsRepo, CommentsRepo, CreateAuthorParams, CreateCommentParams,
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UploadImageParams,
};
use crate::domain::entities::{AuthorRecord, CommentRecord, ImageAsset, MainImage, PostRecord};

pub const IMAGE_ROUTE_PREFIX: &str = "/assets/images/";

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    sequence: AtomicU64,
    authors: DashMap<String, AuthorRecord>,
    author_emails: DashMap<String, String>,
    posts: DashMap<String, (u64, PostRecord)>,
    comments: DashMap<String, (u64, CommentRecord)>,
    images: DashMap<String, (ImageAsset, Bytes)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert a post exactly as given, for seeding fixtures.
    pub fn insert_post(&self, record: PostRecord) {
        let sequence = self.next_sequence();
        self.inner
            .posts
            .insert(record.id.clone(), (sequence, record));
    }

    pub fn author_count(&self) -> usize {
        self.inner.authors.len()
    }

    pub fn authors_with_email(&self, email: &str) -> Vec<AuthorRecord> {
        self.inner
            .authors
            .iter()
            .filter(|entry| entry.value().email == email)
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn sorted_posts<F>(&self, keep: F) -> Vec<PostRecord>
    where
        F: Fn(&PostRecord) -> bool,
    {
        let mut posts: Vec<(u64, PostRecord)> = self
            .inner
            .posts
            .iter()
            .filter(|entry| keep(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        posts.sort_by(|(seq_a, a), (seq_b, b)| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| seq_a.cmp(seq_b))
        });
        posts.into_iter().map(|(_, post)| post).collect()
    }

    fn insert_author(&self, params: CreateAuthorParams) -> AuthorRecord {
        let record = AuthorRecord {
            id: new_id("author"),
            name: params.name,
            email: params.email,
            image: params.image,
            github_id: params.github_id,
            trusted: false,
            joined_at: params.joined_at,
        };
        self.inner
            .authors
            .insert(record.id.clone(), record.clone());
        record
    }

    fn image_url_for(id: &str) -> String {
        format!("{IMAGE_ROUTE_PREFIX}{id}")
    }
}

fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

#[async_trait]
impl AuthorsRepo for MemoryStore {
    async fn find_author_by_email(&self, email: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let Some(id) = self
            .inner
            .author_emails
            .get(email)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        Ok(self
            .inner
            .authors
            .get(&id)
            .map(|entry| entry.value().clone()))
    }

    async fn find_author_by_id(&self, id: &str) -> Result<Option<AuthorRecord>, RepoError> {
        Ok(self.inner.authors.get(id).map(|entry| entry.value().clone()))
    }

    async fn create_author_if_absent(
        &self,
        params: CreateAuthorParams,
    ) -> Result<AuthorInsert, RepoError> {
        match self.inner.author_emails.entry(params.email.clone()) {
            Entry::Occupied(existing) => {
                let record = self
                    .inner
                    .authors
                    .get(existing.get())
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| RepoError::integrity("author email index is dangling"))?;
                Ok(AuthorInsert::Existing(record))
            }
            Entry::Vacant(slot) => {
                let record = self.insert_author(params);
                slot.insert(record.id.clone());
                Ok(AuthorInsert::Created(record))
            }
        }
    }

    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        Ok(self.insert_author(params))
    }

    async fn update_author_image(&self, id: &str, image: &str) -> Result<(), RepoError> {
        let mut entry = self.inner.authors.get_mut(id).ok_or(RepoError::NotFound)?;
        entry.image = image.to_string();
        Ok(())
    }

    async fn set_trusted(&self, email: &str, trusted: bool) -> Result<AuthorRecord, RepoError> {
        let id = self
            .inner
            .author_emails
            .get(email)
            .map(|entry| entry.value().clone())
            .ok_or(RepoError::NotFound)?;
        let mut entry = self.inner.authors.get_mut(&id).ok_or(RepoError::NotFound)?;
        entry.trusted = trusted;
        Ok(entry.clone())
    }
}

#[async_trait]
impl PostsRepo for MemoryStore {
    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.sorted_posts(|_| true))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.sorted_posts(|post| post.slug == slug).into_iter().next())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.inner.posts.get(id).map(|entry| entry.value().1.clone()))
    }

    async fn list_by_author(&self, author_name: &str) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.sorted_posts(|post| post.author.as_deref() == Some(author_name)))
    }

    async fn count_by_author(&self, author_name: &str) -> Result<u64, RepoError> {
        let count = self
            .inner
            .posts
            .iter()
            .filter(|entry| entry.value().1.author.as_deref() == Some(author_name))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let main_image = params.main_image.map(|image| MainImage {
            url: self.image_url(&image.asset_id),
            asset_id: image.asset_id,
            alt: image.alt,
        });
        let record = PostRecord {
            id: new_id("blog"),
            title: params.title,
            slug: params.slug,
            excerpt: params.excerpt,
            content: params.content,
            published_at: Some(params.published_at),
            author: params.author,
            category: params.category,
            views: 0,
            comments_enabled: true,
            main_image,
        };
        self.insert_post(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut entry = self
            .inner
            .posts
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        let post = &mut entry.1;
        post.title = params.title;
        if let Some(excerpt) = params.excerpt {
            post.excerpt = Some(excerpt);
        }
        if let Some(author) = params.author {
            post.author = Some(author);
        }
        post.comments_enabled = params.comments_enabled;
        Ok(post.clone())
    }

    async fn delete_post(&self, id: &str) -> Result<(), RepoError> {
        self.inner.posts.remove(id).ok_or(RepoError::NotFound)?;
        self.inner
            .comments
            .retain(|_, (_, comment)| comment.post_id != id);
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryStore {
    async fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, RepoError> {
        let mut comments: Vec<(u64, CommentRecord)> = self
            .inner
            .comments
            .iter()
            .filter(|entry| entry.value().1.post_id == post_id)
            .map(|entry| entry.value().clone())
            .collect();
        comments.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| seq_b.cmp(seq_a))
        });
        Ok(comments.into_iter().map(|(_, comment)| comment).collect())
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentRecord, RepoError> {
        if !self.inner.posts.contains_key(&params.post_id) {
            return Err(RepoError::invalid_input(format!(
                "comment references unknown post `{}`",
                params.post_id
            )));
        }
        let record = CommentRecord {
            id: new_id("comment"),
            post_id: params.post_id,
            name: params.name,
            email: params.email,
            comment: params.comment,
            rating: params.rating,
            created_at: params.created_at,
        };
        let sequence = self.next_sequence();
        self.inner
            .comments
            .insert(record.id.clone(), (sequence, record.clone()));
        Ok(record)
    }
}

#[async_trait]
impl AssetsRepo for MemoryStore {
    async fn upload_image(&self, params: UploadImageParams) -> Result<ImageAsset, RepoError> {
        let id = new_id("image");
        let asset = ImageAsset {
            url: Self::image_url_for(&id),
            id: id.clone(),
            content_type: params.content_type,
            filename: params.filename,
        };
        self.inner
            .images
            .insert(id, (asset.clone(), params.bytes));
        Ok(asset)
    }

    async fn load_image(&self, id: &str) -> Result<Option<(ImageAsset, Bytes)>, RepoError> {
        Ok(self.inner.images.get(id).map(|entry| entry.value().clone()))
    }

    fn image_url(&self, asset_ref: &str) -> Option<String> {
        self.inner
            .images
            .contains_key(asset_ref)
            .then(|| Self::image_url_for(asset_ref))
    }
}
