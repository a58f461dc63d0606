use std::sync::Arc;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;

use crate::application::repos::{AssetsRepo, CommentsRepo, PostsRepo, RepoError};
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::portable_text::{self, ContentBlock};
use crate::domain::posts::{self, EXCERPT_FALLBACK};
use crate::domain::types::{Category, CategoryFilter, SortOrder};
use crate::presentation::views::{
    AuthorCardView, CommentItemView, FeedContext, FilterLink, PostCard, PostDetailContext,
    TocEntry, initial_of, rating_stars,
};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Read side of the public site: post list and post detail.
#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
    assets: Arc<dyn AssetsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        comments: Arc<dyn CommentsRepo>,
        assets: Arc<dyn AssetsRepo>,
    ) -> Self {
        Self {
            posts,
            comments,
            assets,
        }
    }

    pub async fn feed_context(
        &self,
        filter: CategoryFilter,
        order: SortOrder,
    ) -> Result<FeedContext, FeedError> {
        let records = self.posts.list_posts().await?;
        let visible = posts::filter_and_sort(records, filter, order);
        let cards: Vec<PostCard> = visible.iter().map(record_to_card).collect();

        let post_count = cards.len();
        Ok(FeedContext {
            posts: cards,
            post_count,
            has_results: post_count > 0,
            categories: category_links(filter, order),
            sorts: sort_links(filter, order),
        })
    }

    pub async fn post_detail(&self, slug: &str) -> Result<Option<PostDetailContext>, FeedError> {
        let Some(post) = self.posts.find_by_slug(slug).await? else {
            return Ok(None);
        };

        let comments = if post.comments_enabled {
            self.comments.list_for_post(&post.id).await?
        } else {
            Vec::new()
        };

        Ok(Some(self.build_post_context(post, &comments)))
    }

    pub async fn find_post(&self, slug: &str) -> Result<Option<PostRecord>, FeedError> {
        self.posts.find_by_slug(slug).await.map_err(FeedError::from)
    }

    fn build_post_context(&self, post: PostRecord, comments: &[CommentRecord]) -> PostDetailContext {
        let assets = Arc::clone(&self.assets);
        let resolver = move |asset_ref: &str| assets.image_url(asset_ref);
        let body_html = portable_text::render_html(&post.content, &resolver);
        let toc = build_toc(&post.content);

        let comments: Vec<CommentItemView> = comments.iter().map(comment_view).collect();
        let author = post.author.as_deref().filter(|name| !name.is_empty()).map(|name| AuthorCardView {
            name: name.to_string(),
            handle: posts::author_handle(name),
            initial: initial_of(name),
        });
        let (published, iso_date) = published_labels(&post);

        PostDetailContext {
            image_url: post.main_image.as_ref().and_then(|image| image.url.clone()),
            category: post.category.map(|category| category.label().to_string()),
            comment_count: comments.len(),
            id: post.id,
            slug: post.slug,
            title: post.title,
            excerpt: post.excerpt.filter(|excerpt| !excerpt.is_empty()),
            published,
            iso_date,
            views: post.views,
            body_html,
            author,
            toc,
            comments_enabled: post.comments_enabled,
            comments,
        }
    }
}

pub(crate) fn record_to_card(record: &PostRecord) -> PostCard {
    let (published, iso_date) = published_labels(record);
    PostCard {
        slug: record.slug.clone(),
        title: record.title.clone(),
        excerpt: record
            .excerpt
            .clone()
            .filter(|excerpt| !excerpt.is_empty())
            .unwrap_or_else(|| EXCERPT_FALLBACK.to_string()),
        author: record.author.clone().filter(|author| !author.is_empty()),
        category: record.category.map(|category| category.label().to_string()),
        published,
        iso_date,
        image_url: record.main_image.as_ref().and_then(|image| image.url.clone()),
        views: record.views,
    }
}

fn published_labels(record: &PostRecord) -> (String, String) {
    match record.published_at {
        Some(at) => (
            posts::format_human_date(at),
            at.format(&Rfc3339).unwrap_or_default(),
        ),
        None => (String::new(), String::new()),
    }
}

fn comment_view(record: &CommentRecord) -> CommentItemView {
    CommentItemView {
        name: record.name.clone(),
        comment: record.comment.clone(),
        stars: rating_stars(record.rating.get()),
        rating: record.rating.get(),
        created: posts::format_human_date(record.created_at),
        iso_date: record.created_at.format(&Rfc3339).unwrap_or_default(),
    }
}

fn build_toc(blocks: &[ContentBlock]) -> Vec<TocEntry> {
    portable_text::table_of_contents(blocks)
        .into_iter()
        .enumerate()
        .map(|(index, title)| TocEntry {
            anchor: format!("heading-{index}"),
            title,
        })
        .collect()
}

fn feed_href(filter: CategoryFilter, order: SortOrder) -> String {
    match (filter, order) {
        (CategoryFilter::All, SortOrder::Latest) => "/".to_string(),
        (CategoryFilter::All, order) => format!("/?sort={}", order.as_str()),
        (filter, SortOrder::Latest) => format!("/?category={}", filter.as_str()),
        (filter, order) => format!("/?category={}&sort={}", filter.as_str(), order.as_str()),
    }
}

fn category_links(active: CategoryFilter, order: SortOrder) -> Vec<FilterLink> {
    let mut links = vec![FilterLink {
        label: "All".to_string(),
        href: feed_href(CategoryFilter::All, order),
        is_active: active == CategoryFilter::All,
    }];
    links.extend(Category::ALL.into_iter().map(|category| {
        let filter = CategoryFilter::Only(category);
        FilterLink {
            label: category.label().to_string(),
            href: feed_href(filter, order),
            is_active: active == filter,
        }
    }));
    links
}

fn sort_links(filter: CategoryFilter, active: SortOrder) -> Vec<FilterLink> {
    SortOrder::ALL
        .into_iter()
        .map(|order| FilterLink {
            label: match order {
                SortOrder::Latest => "Latest",
                SortOrder::Popular => "Popular",
                SortOrder::Oldest => "Oldest",
            }
            .to_string(),
            href: feed_href(filter, order),
            is_active: order == active,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_links_omit_defaults() {
        assert_eq!(feed_href(CategoryFilter::All, SortOrder::Latest), "/");
        assert_eq!(
            feed_href(CategoryFilter::Only(Category::Food), SortOrder::Popular),
            "/?category=food&sort=popular"
        );

        let links = category_links(CategoryFilter::Only(Category::Tech), SortOrder::Oldest);
        assert_eq!(links.len(), 6);
        let active: Vec<&str> = links
            .iter()
            .filter(|link| link.is_active)
            .map(|link| link.label.as_str())
            .collect();
        assert_eq!(active, vec!["Tech"]);
        assert_eq!(links[0].href, "/?sort=oldest");
    }
}
