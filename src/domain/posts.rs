//! Post list filtering and ordering.

use std::cmp::Ordering;

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::domain::{
    entities::PostRecord,
    types::{CategoryFilter, SortOrder},
};

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

pub const EXCERPT_FALLBACK: &str = "No description available.";

pub fn format_human_date(value: OffsetDateTime) -> String {
    value
        .format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| value.date().to_string())
}

/// Handle shown under an author name: lowercase with whitespace removed.
pub fn author_handle(name: &str) -> String {
    let compact: String = name
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    format!("@{compact}")
}

/// Apply the category filter and sort order to a post list.
///
/// The sort is stable, so posts that compare equal keep the order the store
/// returned them in. Posts without a publish date sort as the oldest.
pub fn filter_and_sort(
    posts: Vec<PostRecord>,
    filter: CategoryFilter,
    order: SortOrder,
) -> Vec<PostRecord> {
    let mut posts: Vec<PostRecord> = posts
        .into_iter()
        .filter(|post| filter.matches(post.category))
        .collect();

    posts.sort_by(|a, b| compare(a, b, order));
    posts
}

fn compare(a: &PostRecord, b: &PostRecord, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Latest => published_key(b).cmp(&published_key(a)),
        SortOrder::Oldest => published_key(a).cmp(&published_key(b)),
        SortOrder::Popular => b.views.cmp(&a.views),
    }
}

fn published_key(post: &PostRecord) -> OffsetDateTime {
    post.published_at.unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Category;
    use time::macros::datetime;

    fn post(id: &str, published: Option<OffsetDateTime>, views: u64, category: Option<Category>) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            title: id.to_string(),
            slug: id.to_string(),
            excerpt: None,
            content: Vec::new(),
            published_at: published,
            author: None,
            category,
            views,
            comments_enabled: true,
            main_image: None,
        }
    }

    fn ids(posts: &[PostRecord]) -> Vec<&str> {
        posts.iter().map(|post| post.id.as_str()).collect()
    }

    fn sample() -> Vec<PostRecord> {
        vec![
            post("a", Some(datetime!(2024-03-01 0:00 UTC)), 5, Some(Category::Tech)),
            post("b", None, 0, Some(Category::Food)),
            post("c", Some(datetime!(2024-05-01 0:00 UTC)), 5, Some(Category::Tech)),
            post("d", Some(datetime!(2023-01-01 0:00 UTC)), 9, None),
        ]
    }

    #[test]
    fn latest_and_oldest_treat_missing_date_as_oldest() {
        let latest = filter_and_sort(sample(), CategoryFilter::All, SortOrder::Latest);
        assert_eq!(ids(&latest), vec!["c", "a", "d", "b"]);

        let oldest = filter_and_sort(sample(), CategoryFilter::All, SortOrder::Oldest);
        assert_eq!(ids(&oldest), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn popular_is_stable_for_equal_views() {
        let popular = filter_and_sort(sample(), CategoryFilter::All, SortOrder::Popular);
        assert_eq!(ids(&popular), vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn category_filter_excludes_uncategorised() {
        let tech = filter_and_sort(
            sample(),
            CategoryFilter::Only(Category::Tech),
            SortOrder::Latest,
        );
        assert_eq!(ids(&tech), vec!["c", "a"]);
    }

    #[test]
    fn handle_and_date_formatting() {
        assert_eq!(author_handle("Ada  Lovelace"), "@adalovelace");
        assert_eq!(
            format_human_date(datetime!(2024-03-05 10:00 UTC)),
            "March 5, 2024"
        );
    }
}
