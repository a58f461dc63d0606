pub mod api;
mod auth;
mod extract;
mod middleware;
mod public;

pub use api::ApiState;
pub use auth::AuthState;
pub use extract::{CurrentSession, RequireSession, SessionState};
pub use middleware::{REQUEST_ID_HEADER, RequestContext};
pub use public::HttpState;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::middleware as axum_middleware;

use crate::application::{
    comments::CommentService, feed::FeedService, identity::IdentityService,
    posts::PostWriteService, profile::ProfileService, repos::Repositories,
    uploads::UploadService,
};
use crate::cache::{PageCacheConfig, PageCacheState};
use crate::domain::types::UnknownProviderPolicy;
use crate::infra::oauth::GithubOAuth;
use crate::infra::session::SessionCodec;

use self::middleware::{log_responses, set_request_context};

/// Runtime knobs for the HTTP surface.
pub struct HttpOptions {
    pub sessions: SessionCodec,
    pub github: Option<GithubOAuth>,
    pub unknown_provider: UnknownProviderPolicy,
    pub pages: PageCacheConfig,
    pub upload_limit: usize,
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub api: ApiState,
    pub auth: AuthState,
    upload_limit: usize,
}

impl RouterState {
    pub fn new(repos: &Repositories, options: HttpOptions) -> Self {
        let identity = Arc::new(IdentityService::new(
            repos.authors.clone(),
            repos.posts.clone(),
            options.unknown_provider,
        ));
        let sessions = SessionState::new(options.sessions, identity);
        let cache = PageCacheState::new(options.pages);

        let posts = Arc::new(PostWriteService::new(
            repos.posts.clone(),
            repos.posts_write.clone(),
        ));
        let comments = Arc::new(CommentService::new(repos.comments.clone()));
        let uploads = Arc::new(UploadService::new(repos.assets.clone()));

        Self {
            http: HttpState {
                feed: Arc::new(FeedService::new(
                    repos.posts.clone(),
                    repos.comments.clone(),
                    repos.assets.clone(),
                )),
                profiles: Arc::new(ProfileService::new(
                    repos.authors.clone(),
                    repos.posts.clone(),
                )),
                posts: posts.clone(),
                comments: comments.clone(),
                uploads: uploads.clone(),
                assets: repos.assets.clone(),
                cache: cache.clone(),
            },
            api: ApiState {
                posts,
                comments,
                uploads,
                cache,
            },
            auth: AuthState {
                sessions,
                github: options.github.map(Arc::new),
            },
            upload_limit: options.upload_limit,
        }
    }

    pub fn page_cache(&self) -> &PageCacheState {
        &self.http.cache
    }
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

impl FromRef<RouterState> for ApiState {
    fn from_ref(state: &RouterState) -> Self {
        state.api.clone()
    }
}

impl FromRef<RouterState> for AuthState {
    fn from_ref(state: &RouterState) -> Self {
        state.auth.clone()
    }
}

impl FromRef<RouterState> for SessionState {
    fn from_ref(state: &RouterState) -> Self {
        state.auth.sessions.clone()
    }
}

pub fn build_router(state: RouterState) -> Router {
    public::build_public_router(state.http.cache.clone(), state.upload_limit)
        .merge(auth::build_auth_router())
        .merge(api::build_api_router(state.upload_limit))
        .fallback(public::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
