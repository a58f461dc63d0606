//! Rendered page storage with a revalidation window.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;

use super::config::PageCacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Path plus raw query string of a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub path: String,
    pub query: String,
}

impl PageKey {
    pub fn new(path: impl Into<String>, query: Option<&str>) -> Self {
        Self {
            path: path.into(),
            query: query.unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub rendered_at: Instant,
}

pub struct PageCache {
    pages: RwLock<LruCache<PageKey, CachedPage>>,
    revalidate: Duration,
}

impl PageCache {
    pub fn new(config: &PageCacheConfig) -> Self {
        Self {
            pages: RwLock::new(LruCache::new(config.capacity)),
            revalidate: config.revalidate,
        }
    }

    /// Fresh copy of the page, if any. A copy older than the revalidation
    /// window is dropped so the caller renders a new one.
    pub fn get(&self, key: &PageKey, now: Instant) -> Option<CachedPage> {
        let mut pages = rw_write(&self.pages, SOURCE, "get");
        let fresh = pages
            .peek(key)
            .map(|page| now.saturating_duration_since(page.rendered_at) < self.revalidate)?;
        if fresh {
            pages.get(key).cloned()
        } else {
            pages.pop(key);
            None
        }
    }

    /// Store a page; returns the key evicted to make room, if any.
    pub fn put(&self, key: PageKey, page: CachedPage) -> Option<PageKey> {
        rw_write(&self.pages, SOURCE, "put")
            .push(key.clone(), page)
            .map(|(evicted, _)| evicted)
            .filter(|evicted| *evicted != key)
    }

    pub fn invalidate_all(&self) {
        rw_write(&self.pages, SOURCE, "invalidate_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;

    fn page(rendered_at: Instant) -> CachedPage {
        CachedPage {
            status: 200,
            headers: vec![("content-type".into(), "text/html".into())],
            body: Bytes::from_static(b"<p>hi</p>"),
            rendered_at,
        }
    }

    fn cache(capacity: usize) -> PageCache {
        PageCache::new(&PageCacheConfig {
            enabled: true,
            revalidate: Duration::from_secs(60),
            capacity: NonZeroUsize::new(capacity).expect("capacity"),
        })
    }

    #[test]
    fn pages_expire_after_the_revalidation_window() {
        let cache = cache(4);
        let start = Instant::now();
        let key = PageKey::new("/", None);
        cache.put(key.clone(), page(start));

        assert!(cache.get(&key, start + Duration::from_secs(59)).is_some());
        assert!(cache.get(&key, start + Duration::from_secs(60)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn query_strings_are_distinct_pages() {
        let cache = cache(4);
        let now = Instant::now();
        cache.put(PageKey::new("/", Some("category=food")), page(now));

        assert!(cache.get(&PageKey::new("/", None), now).is_none());
        assert!(
            cache
                .get(&PageKey::new("/", Some("category=food")), now)
                .is_some()
        );
    }

    #[test]
    fn capacity_evicts_least_recent() {
        let cache = cache(1);
        let now = Instant::now();
        assert_eq!(cache.put(PageKey::new("/a", None), page(now)), None);
        assert_eq!(
            cache.put(PageKey::new("/b", None), page(now)),
            Some(PageKey::new("/a", None))
        );
        cache.invalidate_all();
        assert_eq!(cache.len(), 0);
    }
}
