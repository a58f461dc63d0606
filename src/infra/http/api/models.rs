//! Conversions between store records and JSON API payloads.

use blogers_api_types::{
    AssetView, CommentView, MainImageView, PostView, SessionUserView, SessionView, SlugView,
};
use serde_json::Value;

use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::identity::Session;
use crate::domain::portable_text::ContentBlock;

pub fn post_to_api(record: PostRecord) -> PostView {
    PostView {
        id: record.id,
        title: record.title,
        slug: SlugView {
            current: record.slug,
        },
        excerpt: record.excerpt,
        author: record.author,
        category: record.category.map(|category| category.as_str().to_string()),
        content: record
            .content
            .iter()
            .filter(|block| !matches!(block, ContentBlock::Unknown))
            .filter_map(|block| serde_json::to_value(block).ok())
            .collect(),
        published_at: record.published_at,
        views: record.views,
        comments_enabled: record.comments_enabled,
        main_image: record.main_image.map(|image| MainImageView {
            asset: AssetView {
                id: image.asset_id,
                url: image.url,
            },
            alt: image.alt,
        }),
    }
}

pub fn comment_to_api(record: CommentRecord) -> CommentView {
    CommentView {
        id: record.id,
        name: record.name,
        email: record.email,
        comment: record.comment,
        rating: record.rating.get(),
        created_at: record.created_at,
    }
}

pub fn session_to_api(session: Session) -> SessionView {
    let user = session.user;
    SessionView {
        user: SessionUserView {
            id: user.id,
            name: user.name,
            email: user.email,
            image: user.image,
            trusted: user.trusted,
            joined_at: user.joined_at,
            post_count: user.post_count,
        },
        expires: session.expires,
    }
}

/// Decode portable-text blocks from a request body. Unknown block types are
/// kept as placeholders and skipped when rendering.
pub fn content_from_api(blocks: Vec<Value>) -> Result<Vec<ContentBlock>, serde_json::Error> {
    blocks.into_iter().map(serde_json::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MainImage;
    use crate::domain::identity::SessionUser;
    use crate::domain::types::Category;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn post_view_uses_store_field_names() {
        let record = PostRecord {
            id: "post-1".into(),
            title: "Hello".into(),
            slug: "hello".into(),
            excerpt: None,
            content: vec![ContentBlock::paragraph("Body"), ContentBlock::Unknown],
            published_at: Some(datetime!(2024-05-01 10:00 UTC)),
            author: Some("Ada".into()),
            category: Some(Category::Tech),
            views: 3,
            comments_enabled: true,
            main_image: Some(MainImage {
                asset_id: "image-1".into(),
                url: Some("/assets/images/image-1".into()),
                alt: None,
            }),
        };

        let value = serde_json::to_value(post_to_api(record)).expect("json");
        assert_eq!(value["_id"], "post-1");
        assert_eq!(value["slug"]["current"], "hello");
        assert_eq!(value["category"], "tech");
        assert_eq!(value["commentsEnabled"], true);
        assert_eq!(value["mainImage"]["asset"]["_id"], "image-1");
        assert_eq!(value["content"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn anonymous_fields_are_omitted_from_session_json() {
        let session = Session {
            user: SessionUser {
                name: Some("Ada".into()),
                email: Some("a@x.com".into()),
                ..SessionUser::default()
            },
            expires: datetime!(2024-06-01 00:00 UTC),
        };
        let value = serde_json::to_value(session_to_api(session)).expect("json");
        assert_eq!(
            value,
            json!({
                "user": {"name": "Ada", "email": "a@x.com"},
                "expires": "2024-06-01T00:00:00Z"
            })
        );
    }

    #[test]
    fn hydrated_session_json() {
        let session = Session {
            user: SessionUser {
                name: Some("Ada".into()),
                email: Some("a@x.com".into()),
                image: None,
                id: Some("author-1".into()),
                trusted: Some(true),
                joined_at: Some(datetime!(2024-01-01 00:00 UTC)),
                post_count: Some(2),
            },
            expires: datetime!(2024-06-01 00:00 UTC),
        };
        let pretty = serde_json::to_string_pretty(&session_to_api(session)).expect("json");
        insta::assert_snapshot!(pretty, @r#"
        {
          "user": {
            "id": "author-1",
            "name": "Ada",
            "email": "a@x.com",
            "trusted": true,
            "joinedAt": "2024-01-01T00:00:00Z",
            "postCount": 2
          },
          "expires": "2024-06-01T00:00:00Z"
        }
        "#);
    }

    #[test]
    fn content_blocks_decode_from_json() {
        let blocks = content_from_api(vec![
            json!({"_type": "block", "children": [{"_type": "span", "text": "Hi"}]}),
            json!({"_type": "youtube", "url": "https://example.com"}),
        ])
        .expect("blocks");
        assert_eq!(blocks.len(), 2);
        let ContentBlock::Text(text) = &blocks[0] else {
            panic!("expected a text block");
        };
        assert_eq!(text.plain_text(), "Hi");
        assert!(matches!(blocks[1], ContentBlock::Unknown));
    }
}
