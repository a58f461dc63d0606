//! Page regeneration middleware.
//!
//! Serves anonymous GET requests for public pages from [`PageCache`] while
//! the cached copy is fresh, and renders plus stores a new copy otherwise.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge};
use tracing::{debug, instrument};

use super::{
    PageCacheConfig,
    store::{CachedPage, PageCache, PageKey},
};
use crate::infra::session::SESSION_COOKIE;

pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-page-cache");

const MAX_CACHED_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone)]
pub struct PageCacheState {
    pub config: PageCacheConfig,
    pub pages: Arc<PageCache>,
}

impl PageCacheState {
    pub fn new(config: PageCacheConfig) -> Self {
        Self {
            pages: Arc::new(PageCache::new(&config)),
            config,
        }
    }

    /// Drop every cached page after a content write.
    pub fn invalidate_all(&self, reason: &'static str) {
        self.pages.invalidate_all();
        counter!("blogers_page_cache_invalidation_total", "reason" => reason).increment(1);
        gauge!("blogers_page_cache_entries").set(0.0);
        debug!(reason, "page cache invalidated");
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(cache): State<PageCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enabled || !is_cacheable_request(&request) {
        return next.run(request).await;
    }

    let key = PageKey::new(request.uri().path(), request.uri().query());
    if let Some(page) = cache.pages.get(&key, Instant::now()) {
        counter!("blogers_page_cache_hit_total").increment(1);
        debug!(outcome = "hit", "serving cached page");
        return build_response(page, "hit");
    }

    counter!("blogers_page_cache_miss_total").increment(1);
    let rendered_at = Instant::now();
    let response = next.run(request).await;
    if response.status() != StatusCode::OK || response.headers().contains_key(SET_COOKIE) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = axum::body::to_bytes(body, MAX_CACHED_BODY).await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let page = CachedPage {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
        rendered_at,
    };
    if let Some(evicted) = cache.pages.put(key, page) {
        debug!(evicted = %evicted.path, "page cache at capacity");
    }
    gauge!("blogers_page_cache_entries").set(cache.pages.len() as f64);

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Anonymous GETs only; signed-in pages carry per-user chrome.
fn is_cacheable_request(request: &Request<Body>) -> bool {
    if request.method() != Method::GET {
        return false;
    }
    !request
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .any(|pair| {
            pair.trim()
                .split_once('=')
                .is_some_and(|(name, _)| name == SESSION_COOKIE)
        })
}

fn build_response(page: CachedPage, outcome: &'static str) -> Response {
    let mut builder = Response::builder().status(page.status);
    for (name, value) in page.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .header(CACHE_STATUS_HEADER, outcome)
        .body(Body::from(page.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: Method, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[test]
    fn only_anonymous_gets_are_cacheable() {
        assert!(is_cacheable_request(&request(Method::GET, None)));
        assert!(is_cacheable_request(&request(
            Method::GET,
            Some("theme=dark")
        )));
        assert!(!is_cacheable_request(&request(Method::POST, None)));
        assert!(!is_cacheable_request(&request(
            Method::GET,
            Some("theme=dark; blogers_session=abc")
        )));
    }
}
