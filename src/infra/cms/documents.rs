//! Document shapes exchanged with the content store, and their mapping onto
//! domain records.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::application::repos::{CreateAuthorParams, CreateCommentParams, CreatePostParams, RepoError};
use crate::domain::entities::{AuthorRecord, CommentRecord, ImageAsset, MainImage, PostRecord, Rating};
use crate::domain::portable_text::ContentBlock;
use crate::domain::types::Category;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Older documents store an image object here instead of a URL.
    pub image: Option<Value>,
    #[serde(rename = "githubId")]
    pub github_id: Option<Value>,
    pub trusted: Option<bool>,
    #[serde(rename = "joinedAt")]
    pub joined_at: Option<String>,
}

impl From<AuthorDocument> for AuthorRecord {
    fn from(doc: AuthorDocument) -> Self {
        let image = match doc.image {
            Some(Value::String(url)) => url,
            _ => String::new(),
        };
        let github_id = match doc.github_id {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        AuthorRecord {
            id: doc.id,
            name: doc.name.unwrap_or_default(),
            email: doc.email.unwrap_or_default(),
            image,
            github_id,
            trusted: doc.trusted.unwrap_or(false),
            joined_at: parse_timestamp(doc.joined_at.as_deref()).unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlugField {
    pub current: Option<String>,
}

/// Either a dereferenced asset (`asset->{_id, url}`) or a raw reference.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetField {
    #[serde(rename = "_id")]
    pub id: Option<String>,
    #[serde(rename = "_ref")]
    pub reference: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainImageDocument {
    pub asset: Option<AssetField>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: Option<String>,
    pub slug: Option<SlugField>,
    pub excerpt: Option<String>,
    pub content: Option<Vec<ContentBlock>>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub views: Option<f64>,
    #[serde(rename = "commentsEnabled")]
    pub comments_enabled: Option<bool>,
    #[serde(rename = "mainImage")]
    pub main_image: Option<MainImageDocument>,
}

impl PostDocument {
    pub fn into_record<F>(self, resolve_image: F) -> PostRecord
    where
        F: Fn(&str) -> Option<String>,
    {
        let main_image = self.main_image.and_then(|image| {
            let asset = image.asset?;
            let asset_id = asset.id.or(asset.reference)?;
            let url = asset.url.or_else(|| resolve_image(&asset_id));
            Some(MainImage {
                asset_id,
                url,
                alt: image.alt,
            })
        });

        PostRecord {
            id: self.id,
            title: self.title.unwrap_or_default(),
            slug: self.slug.and_then(|slug| slug.current).unwrap_or_default(),
            excerpt: self.excerpt.filter(|excerpt| !excerpt.is_empty()),
            content: self.content.unwrap_or_default(),
            published_at: parse_timestamp(self.published_at.as_deref()),
            author: self.author.filter(|author| !author.is_empty()),
            category: self.category.as_deref().and_then(Category::parse),
            views: self
                .views
                .filter(|views| views.is_finite() && *views > 0.0)
                .map_or(0, |views| views.round() as u64),
            comments_enabled: self.comments_enabled.unwrap_or(true),
            main_image,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceField {
    #[serde(rename = "_ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub blog: Option<ReferenceField>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub comment: Option<String>,
    pub rating: Option<f64>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<String>,
}

impl From<CommentDocument> for CommentRecord {
    fn from(doc: CommentDocument) -> Self {
        let rating = doc
            .rating
            .and_then(|rating| Rating::try_from(rating.round() as i64).ok())
            .unwrap_or_default();
        CommentRecord {
            id: doc.id,
            post_id: doc.blog.map(|blog| blog.reference).unwrap_or_default(),
            name: doc.name.unwrap_or_default(),
            email: doc.email.unwrap_or_default(),
            comment: doc.comment.unwrap_or_default(),
            rating,
            created_at: parse_timestamp(doc.created_at.as_deref())
                .unwrap_or(OffsetDateTime::UNIX_EPOCH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub url: String,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
    #[serde(rename = "originalFilename")]
    pub original_filename: Option<String>,
}

impl AssetDocument {
    pub fn into_asset(self, content_type: &str, filename: &str) -> ImageAsset {
        ImageAsset {
            id: self.id,
            url: self.url,
            content_type: self.mime_type.unwrap_or_else(|| content_type.to_string()),
            filename: self
                .original_filename
                .unwrap_or_else(|| filename.to_string()),
        }
    }
}

pub fn author_document(id: &str, params: &CreateAuthorParams) -> Result<Value, RepoError> {
    Ok(json!({
        "_id": id,
        "_type": "author",
        "name": params.name,
        "email": params.email,
        "image": params.image,
        "githubId": params.github_id,
        "trusted": false,
        "joinedAt": format_timestamp(params.joined_at)?,
    }))
}

pub fn post_document(params: &CreatePostParams) -> Result<Value, RepoError> {
    let mut doc = Map::new();
    doc.insert("_type".into(), json!("blog"));
    doc.insert("title".into(), json!(params.title));
    doc.insert(
        "slug".into(),
        json!({ "_type": "slug", "current": params.slug }),
    );
    doc.insert(
        "content".into(),
        serde_json::to_value(&params.content).map_err(RepoError::from_persistence)?,
    );
    doc.insert(
        "publishedAt".into(),
        json!(format_timestamp(params.published_at)?),
    );
    doc.insert("views".into(), json!(0));
    doc.insert("commentsEnabled".into(), json!(true));
    if let Some(excerpt) = &params.excerpt {
        doc.insert("excerpt".into(), json!(excerpt));
    }
    if let Some(author) = &params.author {
        doc.insert("author".into(), json!(author));
    }
    if let Some(category) = params.category {
        doc.insert("category".into(), json!(category.as_str()));
    }
    if let Some(image) = &params.main_image {
        let mut main_image = json!({
            "_type": "image",
            "asset": { "_type": "reference", "_ref": image.asset_id },
        });
        if let (Some(alt), Some(object)) = (&image.alt, main_image.as_object_mut()) {
            object.insert("alt".into(), json!(alt));
        }
        doc.insert("mainImage".into(), main_image);
    }
    Ok(Value::Object(doc))
}

pub fn comment_document(params: &CreateCommentParams) -> Result<Value, RepoError> {
    Ok(json!({
        "_type": "comment",
        "blog": { "_type": "reference", "_ref": params.post_id },
        "name": params.name,
        "email": params.email,
        "comment": params.comment,
        "rating": params.rating.get(),
        "createdAt": format_timestamp(params.created_at)?,
    }))
}

pub fn format_timestamp(value: OffsetDateTime) -> Result<String, RepoError> {
    value.format(&Rfc3339).map_err(RepoError::from_persistence)
}

fn parse_timestamp(value: Option<&str>) -> Option<OffsetDateTime> {
    let value = value?;
    match OffsetDateTime::parse(value, &Rfc3339) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            debug!(value, error = %err, "ignoring unparseable timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::MainImageParams;
    use time::macros::datetime;

    #[test]
    fn projected_post_maps_onto_record() {
        let doc: PostDocument = serde_json::from_value(json!({
            "_id": "blog-1",
            "title": "Hello",
            "slug": { "current": "hello" },
            "publishedAt": "2024-03-01T10:00:00.000Z",
            "author": "A",
            "category": "food",
            "views": 12,
            "mainImage": { "asset": { "_id": "image-x-1x1-png", "url": "https://img/x.png" } }
        }))
        .expect("decode");

        let record = doc.into_record(|_| None);
        assert_eq!(record.slug, "hello");
        assert_eq!(record.category, Some(Category::Food));
        assert_eq!(record.views, 12);
        assert!(record.comments_enabled);
        assert_eq!(record.published_at, Some(datetime!(2024-03-01 10:00 UTC)));
        let image = record.main_image.expect("image");
        assert_eq!(image.url.as_deref(), Some("https://img/x.png"));
    }

    #[test]
    fn raw_image_reference_is_resolved() {
        let doc: PostDocument = serde_json::from_value(json!({
            "_id": "blog-2",
            "mainImage": { "asset": { "_type": "reference", "_ref": "image-y-2x2-jpg" } },
            "category": "unknown"
        }))
        .expect("decode");

        let record = doc.into_record(|id| Some(format!("resolved:{id}")));
        assert_eq!(record.category, None);
        assert_eq!(
            record.main_image.and_then(|image| image.url).as_deref(),
            Some("resolved:image-y-2x2-jpg")
        );
    }

    #[test]
    fn author_with_image_object_has_empty_avatar() {
        let doc: AuthorDocument = serde_json::from_value(json!({
            "_id": "author-1",
            "name": "A",
            "email": "a@x.com",
            "image": { "_type": "image" },
            "githubId": 42
        }))
        .expect("decode");

        let record = AuthorRecord::from(doc);
        assert_eq!(record.image, "");
        assert_eq!(record.github_id.as_deref(), Some("42"));
        assert!(!record.trusted);
    }

    #[test]
    fn post_document_omits_absent_optionals() {
        let params = CreatePostParams {
            title: "T".into(),
            slug: "t".into(),
            excerpt: None,
            author: Some("A".into()),
            category: None,
            content: vec![],
            published_at: datetime!(2024-01-01 0:00 UTC),
            main_image: Some(MainImageParams {
                asset_id: "image-a-1x1-png".into(),
                alt: None,
            }),
        };
        let doc = post_document(&params).expect("doc");
        assert_eq!(doc["slug"]["current"], "t");
        assert_eq!(doc["publishedAt"], "2024-01-01T00:00:00Z");
        assert!(doc.get("excerpt").is_none());
        assert_eq!(doc["mainImage"]["asset"]["_ref"], "image-a-1x1-png");
    }
}
