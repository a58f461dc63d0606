use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::client::{CmsClient, MutationResponse};
use super::documents::{
    AssetDocument, AuthorDocument, CommentDocument, PostDocument, author_document,
    comment_document, post_document,
};
use super::queries;
use crate::application::repos::{
    AssetsRepo, AuthorInsert, AuthorsRepo, CommentsRepo, CreateAuthorParams, CreateCommentParams,
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams, UploadImageParams,
};
use crate::domain::entities::{AuthorRecord, CommentRecord, ImageAsset, PostRecord};

/// Width requested for the preview URL handed back after an upload.
const DISPLAY_WIDTH: u32 = 800;

/// Repository implementations over the hosted content store.
#[derive(Clone, Debug)]
pub struct CmsStore {
    client: CmsClient,
}

impl CmsStore {
    pub fn new(client: CmsClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CmsClient {
        &self.client
    }

    fn post_record(&self, doc: PostDocument) -> PostRecord {
        doc.into_record(|asset| self.client.image_url(asset))
    }

    async fn fetch_author(
        &self,
        query: &str,
        params: &[(&str, Value)],
    ) -> Result<Option<AuthorRecord>, RepoError> {
        let doc: Option<AuthorDocument> = self.client.query_fresh(query, params).await?;
        Ok(doc.map(AuthorRecord::from))
    }

    async fn fetch_post_fresh(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        let doc: Option<PostDocument> = self
            .client
            .query_fresh(queries::POST_BY_ID, &[("id", json!(id))])
            .await?;
        Ok(doc.map(|doc| self.post_record(doc)))
    }
}

/// Deterministic author document id so that concurrent first sign-ins for
/// one email converge on a single document.
pub fn author_document_id(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    format!("author-{}", hex::encode(hasher.finalize()))
}

fn first_document<T: DeserializeOwned>(response: &MutationResponse) -> Result<Option<T>, RepoError> {
    response
        .results
        .first()
        .and_then(|result| result.document.clone())
        .map(|doc| serde_json::from_value(doc).map_err(RepoError::from_persistence))
        .transpose()
}

#[async_trait]
impl AuthorsRepo for CmsStore {
    async fn find_author_by_email(&self, email: &str) -> Result<Option<AuthorRecord>, RepoError> {
        self.fetch_author(queries::AUTHOR_BY_EMAIL, &[("email", json!(email))])
            .await
    }

    async fn find_author_by_id(&self, id: &str) -> Result<Option<AuthorRecord>, RepoError> {
        self.fetch_author(queries::AUTHOR_BY_ID, &[("id", json!(id))])
            .await
    }

    async fn create_author_if_absent(
        &self,
        params: CreateAuthorParams,
    ) -> Result<AuthorInsert, RepoError> {
        let id = author_document_id(&params.email);
        let doc = author_document(&id, &params)?;
        let response = self
            .client
            .mutate(vec![json!({ "createIfNotExists": doc })])
            .await?;

        let created = response.results.first().is_some_and(|result| result.created());
        let stored: Option<AuthorDocument> = if created {
            first_document(&response)?
        } else {
            None
        };
        if let Some(doc) = stored {
            return Ok(AuthorInsert::Created(doc.into()));
        }

        let record = self
            .find_author_by_id(&id)
            .await?
            .ok_or_else(|| RepoError::integrity(format!("author `{id}` missing after create")))?;
        debug!(author_id = %id, created, "author create-if-absent resolved");
        if created {
            Ok(AuthorInsert::Created(record))
        } else {
            Ok(AuthorInsert::Existing(record))
        }
    }

    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        let id = format!("author-{}", Uuid::new_v4().simple());
        let doc = author_document(&id, &params)?;
        let response = self.client.mutate(vec![json!({ "create": doc })]).await?;
        let doc: AuthorDocument = first_document(&response)?
            .ok_or_else(|| RepoError::integrity("create returned no document"))?;
        Ok(doc.into())
    }

    async fn update_author_image(&self, id: &str, image: &str) -> Result<(), RepoError> {
        self.client
            .mutate(vec![json!({ "patch": { "id": id, "set": { "image": image } } })])
            .await?;
        Ok(())
    }

    async fn set_trusted(&self, email: &str, trusted: bool) -> Result<AuthorRecord, RepoError> {
        let author = self
            .find_author_by_email(email)
            .await?
            .ok_or(RepoError::NotFound)?;
        let response = self
            .client
            .mutate(vec![
                json!({ "patch": { "id": author.id, "set": { "trusted": trusted } } }),
            ])
            .await?;

        match first_document::<AuthorDocument>(&response)? {
            Some(doc) => Ok(doc.into()),
            None => Ok(AuthorRecord { trusted, ..author }),
        }
    }
}

#[async_trait]
impl PostsRepo for CmsStore {
    async fn list_posts(&self) -> Result<Vec<PostRecord>, RepoError> {
        let docs: Vec<PostDocument> = self.client.query(queries::ALL_POSTS, &[]).await?;
        Ok(docs.into_iter().map(|doc| self.post_record(doc)).collect())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let doc: Option<PostDocument> = self
            .client
            .query(queries::POST_BY_SLUG, &[("slug", json!(slug))])
            .await?;
        Ok(doc.map(|doc| self.post_record(doc)))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        let doc: Option<PostDocument> = self
            .client
            .query(queries::POST_BY_ID, &[("id", json!(id))])
            .await?;
        Ok(doc.map(|doc| self.post_record(doc)))
    }

    async fn list_by_author(&self, author_name: &str) -> Result<Vec<PostRecord>, RepoError> {
        let docs: Vec<PostDocument> = self
            .client
            .query(queries::POSTS_BY_AUTHOR, &[("authorName", json!(author_name))])
            .await?;
        Ok(docs.into_iter().map(|doc| self.post_record(doc)).collect())
    }

    async fn count_by_author(&self, author_name: &str) -> Result<u64, RepoError> {
        let count: u64 = self
            .client
            .query_fresh(
                queries::COUNT_POSTS_BY_AUTHOR,
                &[("authorName", json!(author_name))],
            )
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PostsWriteRepo for CmsStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let doc = post_document(&params)?;
        let response = self.client.mutate(vec![json!({ "create": doc })]).await?;
        let doc: PostDocument = first_document(&response)?
            .ok_or_else(|| RepoError::integrity("create returned no document"))?;
        Ok(self.post_record(doc))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        if self.fetch_post_fresh(&params.id).await?.is_none() {
            return Err(RepoError::NotFound);
        }

        let mut set = serde_json::Map::new();
        set.insert("title".into(), json!(params.title));
        set.insert("commentsEnabled".into(), json!(params.comments_enabled));
        if let Some(excerpt) = &params.excerpt {
            set.insert("excerpt".into(), json!(excerpt));
        }
        if let Some(author) = &params.author {
            set.insert("author".into(), json!(author));
        }

        let response = self
            .client
            .mutate(vec![json!({ "patch": { "id": params.id, "set": set } })])
            .await?;
        match first_document::<PostDocument>(&response)? {
            Some(doc) => Ok(self.post_record(doc)),
            None => self
                .fetch_post_fresh(&params.id)
                .await?
                .ok_or(RepoError::NotFound),
        }
    }

    async fn delete_post(&self, id: &str) -> Result<(), RepoError> {
        if self.fetch_post_fresh(id).await?.is_none() {
            return Err(RepoError::NotFound);
        }
        self.client
            .mutate(vec![
                json!({ "delete": { "query": queries::COMMENTS_OF_POST_FILTER, "params": { "blogId": id } } }),
                json!({ "delete": { "id": id } }),
            ])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for CmsStore {
    async fn list_for_post(&self, post_id: &str) -> Result<Vec<CommentRecord>, RepoError> {
        let docs: Vec<CommentDocument> = self
            .client
            .query_fresh(queries::COMMENTS_FOR_POST, &[("blogId", json!(post_id))])
            .await?;
        Ok(docs.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(&self, params: CreateCommentParams) -> Result<CommentRecord, RepoError> {
        let doc = comment_document(&params)?;
        let response = self.client.mutate(vec![json!({ "create": doc })]).await?;
        let doc: CommentDocument = first_document(&response)?
            .ok_or_else(|| RepoError::integrity("create returned no document"))?;
        Ok(doc.into())
    }
}

#[async_trait]
impl AssetsRepo for CmsStore {
    async fn upload_image(&self, params: UploadImageParams) -> Result<ImageAsset, RepoError> {
        let doc: AssetDocument = self
            .client
            .upload_image(params.bytes, &params.filename, &params.content_type)
            .await?;
        Ok(doc.into_asset(&params.content_type, &params.filename))
    }

    async fn load_image(&self, _id: &str) -> Result<Option<(ImageAsset, Bytes)>, RepoError> {
        Ok(None)
    }

    fn image_url(&self, asset_ref: &str) -> Option<String> {
        self.client.image_url(asset_ref)
    }

    fn display_url(&self, asset: &ImageAsset) -> String {
        format!("{}?w={DISPLAY_WIDTH}", asset.url)
    }
}
