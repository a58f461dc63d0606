use std::sync::Arc;

use crate::application::feed::{FeedError, record_to_card};
use crate::application::repos::{AuthorsRepo, PostsRepo};
use crate::domain::posts;
use crate::presentation::views::{PostCard, ProfileView, initial_of};

/// Author profile pages.
#[derive(Clone)]
pub struct ProfileService {
    authors: Arc<dyn AuthorsRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl ProfileService {
    pub fn new(authors: Arc<dyn AuthorsRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { authors, posts }
    }

    pub async fn profile(&self, author_id: &str) -> Result<Option<ProfileView>, FeedError> {
        let Some(author) = self.authors.find_author_by_id(author_id).await? else {
            return Ok(None);
        };

        // Posts only reference their author by display name.
        let records = self.posts.list_by_author(&author.name).await?;
        let cards: Vec<PostCard> = records.iter().map(record_to_card).collect();

        Ok(Some(ProfileView {
            initial: initial_of(&author.name),
            image: author.avatar().map(str::to_string),
            joined: posts::format_human_date(author.joined_at),
            post_count: cards.len(),
            posts: cards,
            trusted: author.trusted,
            name: author.name,
            email: author.email,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::CreateAuthorParams;
    use crate::domain::entities::PostRecord;
    use crate::domain::portable_text::ContentBlock;
    use crate::infra::memory::MemoryStore;
    use time::macros::datetime;

    fn post(id: &str, author: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            title: format!("Post {id}"),
            slug: id.to_string(),
            excerpt: None,
            content: vec![ContentBlock::paragraph("Body")],
            published_at: Some(datetime!(2024-05-01 9:00 UTC)),
            author: Some(author.to_string()),
            category: None,
            views: 0,
            comments_enabled: true,
            main_image: None,
        }
    }

    #[tokio::test]
    async fn profile_lists_posts_by_author_name() {
        let store = Arc::new(MemoryStore::new());
        let author = store
            .create_author_if_absent(CreateAuthorParams {
                name: "Ada".into(),
                email: "ada@x.com".into(),
                image: String::new(),
                github_id: None,
                joined_at: datetime!(2024-01-01 0:00 UTC),
            })
            .await
            .expect("author")
            .record()
            .clone();
        store.insert_post(post("p1", "Ada"));
        store.insert_post(post("p2", "Grace"));

        let service = ProfileService::new(store.clone(), store);
        let view = service
            .profile(&author.id)
            .await
            .expect("profile")
            .expect("author exists");

        assert_eq!(view.name, "Ada");
        assert_eq!(view.initial, "A");
        assert_eq!(view.post_count, 1);
        assert!(!view.trusted);
        assert!(view.image.is_none());
    }

    #[tokio::test]
    async fn unknown_author_has_no_profile() {
        let store = Arc::new(MemoryStore::new());
        let service = ProfileService::new(store.clone(), store);
        assert!(service.profile("missing").await.expect("lookup").is_none());
    }
}
