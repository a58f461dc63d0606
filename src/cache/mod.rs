//! Incremental regeneration of public pages.
//!
//! Rendered pages are kept for a revalidation window (`[pages]
//! revalidate_seconds`) and rebuilt on the first request after it lapses.
//! Content writes flush the whole cache.

mod config;
mod lock;
mod middleware;
mod store;

pub use config::PageCacheConfig;
pub use middleware::{CACHE_STATUS_HEADER, PageCacheState, page_cache_layer};
pub use store::{CachedPage, PageCache, PageKey};
