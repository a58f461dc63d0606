//! JSON endpoints used by the editor and comment widgets.

use axum::Json;
use axum::extract::{Path, State, rejection::JsonRejection};
use axum::response::IntoResponse;
use blogers_api_types::{
    CommentEnvelope, CommentsResponse, CreateCommentRequest, CreatePostRequest, PostEnvelope,
    SuccessResponse, UpdatePostRequest, UploadImageRequest, UploadImageResponse,
};
use tracing::{info, warn};

use crate::application::comments::{CommentError, SubmitCommentCommand};
use crate::application::posts::{CreatePostCommand, PostWriteError, UpdatePostCommand};
use crate::application::repos::MainImageParams;
use crate::application::uploads::UploadError;
use crate::infra::http::extract::RequireSession;

use super::error::ApiError;
use super::models::{comment_to_api, content_from_api, post_to_api};
use super::state::ApiState;

pub async fn create_post(
    State(state): State<ApiState>,
    RequireSession(session): RequireSession,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;

    let content = match request.content {
        Some(blocks) => Some(
            content_from_api(blocks).map_err(|_| ApiError::bad_request("Invalid blog content"))?,
        ),
        None => None,
    };

    let command = CreatePostCommand {
        title: request.title,
        slug: request.slug,
        excerpt: request.excerpt,
        author: request.author,
        category: request.category,
        content,
        main_image: request.main_image.map(|image| MainImageParams {
            asset_id: image.asset.reference,
            alt: image.alt,
        }),
        derive_slug: false,
    };

    let record = state
        .posts
        .create(command)
        .await
        .map_err(|err| post_write_error(err, "Failed to create blog"))?;
    state.cache.invalidate_all("post_created");

    info!(
        post_id = %record.id,
        by = session.user.display_name(),
        "post created through api"
    );
    Ok(Json(PostEnvelope {
        success: true,
        blog: post_to_api(record),
    }))
}

pub async fn update_post(
    State(state): State<ApiState>,
    RequireSession(_session): RequireSession,
    Path(id): Path<String>,
    body: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = valid_id(&id)?;
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;

    let command = UpdatePostCommand {
        title: request.title,
        excerpt: request.excerpt,
        author: request.author,
        comments_enabled: request.comments_enabled,
    };

    let record = state
        .posts
        .update(id, command)
        .await
        .map_err(|err| post_write_error(err, "Failed to update blog"))?;
    state.cache.invalidate_all("post_updated");

    Ok(Json(PostEnvelope {
        success: true,
        blog: post_to_api(record),
    }))
}

pub async fn delete_post(
    State(state): State<ApiState>,
    RequireSession(_session): RequireSession,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = valid_id(&id)?;
    state
        .posts
        .delete(id)
        .await
        .map_err(|err| post_write_error(err, "Failed to delete blog"))?;
    state.cache.invalidate_all("post_deleted");

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn list_comments(
    State(state): State<ApiState>,
    Path(blog_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let comments = state
        .comments
        .list(&blog_id)
        .await
        .map_err(|err| comment_error(err, "Failed to fetch comments"))?;

    Ok(Json(CommentsResponse {
        comments: comments.into_iter().map(comment_to_api).collect(),
    }))
}

pub async fn create_comment(
    State(state): State<ApiState>,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;

    let command = SubmitCommentCommand {
        post_id: request.blog_id,
        name: request.name,
        email: request.email,
        comment: request.comment,
        rating: request.rating,
    };

    let record = state
        .comments
        .submit(command)
        .await
        .map_err(|err| comment_error(err, "Failed to create comment"))?;
    state.cache.invalidate_all("comment_created");

    Ok(Json(CommentEnvelope {
        success: true,
        comment: comment_to_api(record),
    }))
}

pub async fn upload_image(
    State(state): State<ApiState>,
    RequireSession(_session): RequireSession,
    body: Result<Json<UploadImageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|_| ApiError::bad_request("Invalid request body"))?;

    let uploaded = state
        .uploads
        .upload_base64(
            request.image_data.as_deref(),
            request.filename.as_deref(),
            request.mimetype.as_deref(),
        )
        .await
        .map_err(|err| match err {
            UploadError::Empty => ApiError::bad_request("No image data provided"),
            UploadError::Decode(_) | UploadError::NotAnImage(_) => {
                ApiError::bad_request("Invalid image data")
            }
            UploadError::Repo(err) => {
                warn!(error = %err, "image upload failed");
                ApiError::internal("Failed to upload image", &err)
            }
        })?;

    Ok(Json(UploadImageResponse {
        success: true,
        image_url: uploaded.display_url,
        asset_id: uploaded.asset.id,
    }))
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

fn valid_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::bad_request("Invalid blog ID"));
    }
    Ok(id)
}

fn post_write_error(err: PostWriteError, failure: &'static str) -> ApiError {
    match err {
        PostWriteError::Validation(message) => ApiError::bad_request(message),
        PostWriteError::Slug(_) => ApiError::bad_request("Title and slug are required"),
        PostWriteError::NotFound => ApiError::not_found("Blog not found"),
        PostWriteError::Repo(err) => {
            warn!(error = %err, failure, "post write failed");
            ApiError::internal(failure, &err)
        }
    }
}

fn comment_error(err: CommentError, failure: &'static str) -> ApiError {
    match err {
        CommentError::Validation(message) => ApiError::bad_request(message),
        CommentError::Repo(err) => {
            warn!(error = %err, failure, "comment store call failed");
            ApiError::internal(failure, &err)
        }
    }
}
