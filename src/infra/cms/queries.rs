//! GROQ queries issued by the content-store repositories.

/// Projection shared by every author lookup.
macro_rules! author_fields {
    () => {
        "{_id, name, email, image, githubId, trusted, joinedAt}"
    };
}

pub const AUTHOR_BY_EMAIL: &str = concat!(
    r#"*[_type == "author" && email == $email][0]"#,
    author_fields!()
);

pub const AUTHOR_BY_ID: &str = concat!(r#"*[_type == "author" && _id == $id][0]"#, author_fields!());

pub const ALL_POSTS: &str = r#"*[_type == "blog"] | order(publishedAt desc) {_id, title, slug, excerpt, publishedAt, author, category, views, commentsEnabled, mainImage{alt, asset->{_id, url}}}"#;

pub const POST_BY_SLUG: &str = r#"*[_type == "blog" && slug.current == $slug][0]{_id, title, slug, excerpt, content, publishedAt, author, category, views, commentsEnabled, mainImage{alt, asset->{_id, url}}}"#;

pub const POST_BY_ID: &str = r#"*[_type == "blog" && _id == $id][0]{_id, title, slug, excerpt, content, publishedAt, author, category, views, commentsEnabled, mainImage{alt, asset->{_id, url}}}"#;

pub const POSTS_BY_AUTHOR: &str = r#"*[_type == "blog" && author == $authorName] | order(publishedAt desc) {_id, title, slug, excerpt, publishedAt, author, category, views, commentsEnabled, mainImage{alt, asset->{_id, url}}}"#;

pub const COUNT_POSTS_BY_AUTHOR: &str = r#"count(*[_type == "blog" && author == $authorName])"#;

pub const COMMENTS_FOR_POST: &str = r#"*[_type == "comment" && blog._ref == $blogId] | order(createdAt desc) {_id, blog, name, email, comment, rating, createdAt}"#;

pub const COMMENTS_OF_POST_FILTER: &str = r#"*[_type == "comment" && blog._ref == $blogId]"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_lookups_share_one_projection() {
        for query in [AUTHOR_BY_EMAIL, AUTHOR_BY_ID] {
            assert!(query.ends_with(author_fields!()), "{query}");
        }
    }
}
