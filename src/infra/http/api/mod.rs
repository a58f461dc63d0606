pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

use super::RouterState;

pub fn build_api_router(upload_limit: usize) -> Router<RouterState> {
    Router::new()
        .route(
            "/api/blog/create",
            post(handlers::create_post).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/blog/{id}",
            put(handlers::update_post)
                .delete(handlers::delete_post)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/comments",
            post(handlers::create_comment).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/comments/{blog_id}",
            get(handlers::list_comments).fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/upload-image",
            post(handlers::upload_image)
                .fallback(handlers::method_not_allowed)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
}
