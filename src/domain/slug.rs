//! Post slug derivation.
//!
//! Slugs come from post titles when the author leaves the field empty. The
//! `slug` crate folds Unicode to ASCII; the helpers here add the length cap and
//! a collision check against the store.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

pub const MAX_SLUG_LEN: usize = 96;
const MAX_SUFFIX_ATTEMPTS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

#[derive(Debug, Error)]
pub enum SlugLookupError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Lookup(E),
}

/// Derive a URL slug from human-readable text, capped at [`MAX_SLUG_LEN`].
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.len() > MAX_SLUG_LEN {
        // slugify output is ASCII, so byte truncation is char-safe.
        candidate.truncate(MAX_SLUG_LEN);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Normalise a slug the user typed; falls back to the title when blank.
pub fn normalize_or_derive(explicit: Option<&str>, title: &str) -> Result<String, SlugError> {
    match explicit.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => derive_slug(value),
        None => derive_slug(title),
    }
}

/// Find a slug that is not yet taken, suffixing `-2`, `-3`, ... on collision.
///
/// `is_taken` is awaited for each candidate and should consult the post store.
pub async fn unique_slug<F, Fut, E>(base: String, mut is_taken: F) -> Result<String, SlugLookupError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    if !is_taken(base.clone()).await.map_err(SlugLookupError::Lookup)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if !is_taken(candidate.clone())
            .await
            .map_err(SlugLookupError::Lookup)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugLookupError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn derive_slug_folds_punctuation_and_case() {
        assert_eq!(derive_slug("Hello, World!").expect("slug"), "hello-world");
        assert_eq!(derive_slug("  Café au lait ").expect("slug"), "cafe-au-lait");
    }

    #[test]
    fn derive_slug_rejects_blank_and_symbol_only_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn derive_slug_caps_length_without_trailing_dash() {
        let title = "word ".repeat(40);
        let slug = derive_slug(&title).expect("slug");
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn explicit_slug_wins_over_title() {
        assert_eq!(
            normalize_or_derive(Some("My Custom Slug"), "Title").expect("slug"),
            "my-custom-slug"
        );
        assert_eq!(
            normalize_or_derive(Some("  "), "From Title").expect("slug"),
            "from-title"
        );
        assert_eq!(
            normalize_or_derive(None, "From Title").expect("slug"),
            "from-title"
        );
    }

    #[tokio::test]
    async fn unique_slug_appends_counter() {
        let taken = ["rust-tips".to_string(), "rust-tips-2".to_string()];
        let slug = unique_slug("rust-tips".to_string(), |candidate| {
            let hit = taken.contains(&candidate);
            async move { Ok::<bool, Infallible>(hit) }
        })
        .await
        .expect("unique slug");
        assert_eq!(slug, "rust-tips-3");
    }

    #[tokio::test]
    async fn unique_slug_gives_up_eventually() {
        let result = unique_slug("busy".to_string(), |_| async { Ok::<bool, Infallible>(true) }).await;
        assert!(matches!(
            result,
            Err(SlugLookupError::Slug(SlugError::Exhausted { .. }))
        ));
    }
}
