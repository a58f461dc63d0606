use std::sync::Arc;

use axum::{
    Form, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, State,
        multipart::{Field, MultipartError},
    },
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    application::{
        comments::{CommentError, CommentService, SubmitCommentCommand},
        error::{ErrorReport, HttpError},
        feed::FeedService,
        posts::{
            CreatePostCommand, PostWriteError, PostWriteService, UpdatePostCommand,
            content_from_form,
        },
        profile::ProfileService,
        repos::{AssetsRepo, MainImageParams},
        uploads::{UploadError, UploadService},
    },
    cache::{PageCacheState, page_cache_layer},
    domain::{
        entities::PostRecord,
        identity::Session,
        types::{Category, CategoryFilter, SortOrder},
    },
    presentation::views::{
        CategoryOption, CreatePostForm, CreatePostTemplate, CreatePostView, EditPostTemplate,
        EditPostView, ErrorPageView, ErrorTemplate, IndexTemplate, LayoutChrome, LayoutContext,
        PostPageView, PostTemplate, ProfileTemplate, SignInTemplate, SignInView,
        render_not_found_response, render_template_response,
    },
};

use super::RouterState;
use super::auth::{ERROR_ACCESS_DENIED, ERROR_CALLBACK, ERROR_CONFIGURATION};
use super::extract::CurrentSession;

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub profiles: Arc<ProfileService>,
    pub posts: Arc<PostWriteService>,
    pub comments: Arc<CommentService>,
    pub uploads: Arc<UploadService>,
    pub assets: Arc<dyn AssetsRepo>,
    pub cache: PageCacheState,
}

pub fn build_public_router(cache: PageCacheState, upload_limit: usize) -> Router<RouterState> {
    // Anonymous GETs on these routes are served from the page cache.
    let cached_routes = Router::new()
        .route("/", get(index))
        .route("/blog/{slug}", get(post_detail))
        .route("/profile/{id}", get(profile))
        .layer(middleware::from_fn_with_state(cache, page_cache_layer));

    let dynamic_routes = Router::new()
        .route(
            "/blog/create",
            get(create_form)
                .post(create_post)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/blog/{slug}/edit", get(edit_form).post(update_post))
        .route("/blog/{slug}/delete", post(delete_post))
        .route("/blog/{slug}/comments", post(submit_comment))
        .route("/auth/signin", get(sign_in_page))
        .route("/assets/images/{id}", get(serve_image))
        .route("/static/{*path}", get(crate::infra::assets::serve_static));

    cached_routes.merge(dynamic_routes)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FeedQuery {
    category: Option<String>,
    sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignInQuery {
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EditPostForm {
    title: Option<String>,
    excerpt: Option<String>,
    author: Option<String>,
    /// Checkbox; present only when ticked.
    comments_enabled: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommentForm {
    name: Option<String>,
    email: Option<String>,
    comment: Option<String>,
    rating: Option<String>,
}

fn chrome_for(session: &Option<Session>) -> LayoutChrome {
    LayoutChrome::new(session.as_ref().map(|session| &session.user))
}

async fn index(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Query(query): Query<FeedQuery>,
) -> Response {
    let chrome = chrome_for(&session);
    let filter = CategoryFilter::parse(query.category.as_deref());
    let order = SortOrder::parse(query.sort.as_deref());

    match state.feed.feed_context(filter, order).await {
        Ok(content) => {
            let view = LayoutContext::new(chrome, content);
            render_template_response(IndexTemplate { view }, StatusCode::OK)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(slug): Path<String>,
) -> Response {
    render_post_page(&state, session, &slug, None, StatusCode::OK).await
}

async fn render_post_page(
    state: &HttpState,
    session: Option<Session>,
    slug: &str,
    comment_error: Option<String>,
    status: StatusCode,
) -> Response {
    let chrome = chrome_for(&session);
    match state.feed.post_detail(slug).await {
        Ok(Some(post)) => {
            let mut chrome = chrome.with_title(&post.title);
            if let Some(excerpt) = post.excerpt.as_deref() {
                chrome = chrome.with_description(excerpt);
            }
            let content = PostPageView {
                post,
                can_edit: session.is_some(),
                comment_error,
            };
            let view = LayoutContext::new(chrome, content);
            render_template_response(PostTemplate { view }, status)
        }
        Ok(None) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn submit_comment(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(slug): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let post = match find_post(&state, &slug).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(chrome_for(&session)),
        Err(err) => return err.into_response(),
    };
    if !post.comments_enabled {
        let message = "Comments are disabled for this post.".to_string();
        return render_post_page(&state, session, &slug, Some(message), StatusCode::FORBIDDEN)
            .await;
    }

    let command = SubmitCommentCommand {
        post_id: Some(post.id),
        name: form.name,
        email: form.email,
        comment: form.comment,
        rating: parse_rating(form.rating.as_deref()),
    };

    match state.comments.submit(command).await {
        Ok(_) => {
            state.cache.invalidate_all("comment_created");
            Redirect::to(&format!("/blog/{slug}#comments")).into_response()
        }
        Err(CommentError::Validation(message)) => {
            render_post_page(
                &state,
                session,
                &slug,
                Some(message.to_string()),
                StatusCode::BAD_REQUEST,
            )
            .await
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Blank means the default rating; anything unparsable is rejected as out of
/// range.
fn parse_rating(value: Option<&str>) -> Option<i64> {
    let value = value.map(str::trim).filter(|value| !value.is_empty())?;
    Some(value.parse().unwrap_or(0))
}

async fn create_form(CurrentSession(session): CurrentSession) -> Response {
    let Some(session) = session else {
        return sign_in_required();
    };
    render_create_form(&session, CreatePostForm::default(), None, StatusCode::OK)
}

fn render_create_form(
    session: &Session,
    form: CreatePostForm,
    error: Option<String>,
    status: StatusCode,
) -> Response {
    let chrome = LayoutChrome::new(Some(&session.user)).with_title("Create a new post");
    let categories = category_options(&form.category);
    let view = LayoutContext::new(
        chrome,
        CreatePostView {
            form,
            categories,
            error,
        },
    );
    render_template_response(CreatePostTemplate { view }, status)
}

fn category_options(selected: &str) -> Vec<CategoryOption> {
    Category::ALL
        .into_iter()
        .map(|category| CategoryOption {
            value: category.as_str().to_string(),
            label: category.label().to_string(),
            selected: category.as_str() == selected,
        })
        .collect()
}

#[derive(Default)]
struct ImagePart {
    bytes: Bytes,
    filename: Option<String>,
    content_type: Option<String>,
}

async fn create_post(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    mut multipart: Multipart,
) -> Response {
    let Some(session) = session else {
        return sign_in_required();
    };

    let mut form = CreatePostForm::default();
    let mut image_alt = String::new();
    let mut image = ImagePart::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "rejecting malformed post form");
                return render_create_form(
                    &session,
                    form,
                    Some("The form could not be read. Please try again.".to_string()),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        let outcome = match name.as_str() {
            "image" => read_image(field).await.map(|part| image = part),
            "title" => field.text().await.map(|value| form.title = value),
            "slug" => field.text().await.map(|value| form.slug = value),
            "excerpt" => field.text().await.map(|value| form.excerpt = value),
            "author" => field.text().await.map(|value| form.author = value),
            "category" => field.text().await.map(|value| form.category = value),
            "content" => field.text().await.map(|value| form.content = value),
            "image_alt" => field.text().await.map(|value| image_alt = value),
            _ => Ok(()),
        };
        if let Err(err) = outcome {
            warn!(error = %err, field = %name, "failed to read form field");
            return render_create_form(
                &session,
                form,
                Some("The form could not be read. Please try again.".to_string()),
                StatusCode::BAD_REQUEST,
            );
        }
    }

    let main_image = if image.bytes.is_empty() {
        None
    } else {
        match state
            .uploads
            .upload_bytes(
                image.bytes,
                image.filename.as_deref(),
                image.content_type.as_deref(),
            )
            .await
        {
            Ok(uploaded) => Some(MainImageParams {
                asset_id: uploaded.asset.id,
                alt: Some(image_alt.trim().to_string()).filter(|alt| !alt.is_empty()),
            }),
            Err(err) => {
                let (status, message) = upload_failure(&err);
                return render_create_form(&session, form, Some(message), status);
            }
        }
    };

    let command = CreatePostCommand {
        title: Some(form.title.clone()),
        slug: Some(form.slug.clone()),
        excerpt: Some(form.excerpt.clone()),
        author: Some(form.author.clone()),
        category: Some(form.category.clone()),
        content: Some(content_from_form(&form.content)),
        main_image,
        derive_slug: true,
    };

    match state.posts.create(command).await {
        Ok(record) => {
            state.cache.invalidate_all("post_created");
            Redirect::to(&format!("/blog/{}", record.slug)).into_response()
        }
        Err(err) => {
            let (status, message) = post_write_failure(&err, "Failed to create blog");
            render_create_form(&session, form, Some(message), status)
        }
    }
}

async fn read_image(field: Field<'_>) -> Result<ImagePart, MultipartError> {
    let filename = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await?;
    Ok(ImagePart {
        bytes,
        filename,
        content_type,
    })
}

fn upload_failure(err: &UploadError) -> (StatusCode, String) {
    match err {
        UploadError::Repo(repo) => {
            error!(error = %repo, "image upload failed");
            (StatusCode::BAD_GATEWAY, "Failed to upload image".to_string())
        }
        other => (StatusCode::BAD_REQUEST, other.to_string()),
    }
}

fn post_write_failure(err: &PostWriteError, failure: &str) -> (StatusCode, String) {
    match err {
        PostWriteError::Validation(message) => (StatusCode::BAD_REQUEST, message.to_string()),
        PostWriteError::Slug(err) => (StatusCode::BAD_REQUEST, err.to_string()),
        PostWriteError::NotFound => (StatusCode::NOT_FOUND, "Post not found".to_string()),
        PostWriteError::Repo(repo) => {
            error!(error = %repo, failure, "post write failed");
            (StatusCode::BAD_GATEWAY, failure.to_string())
        }
    }
}

async fn find_post(state: &HttpState, slug: &str) -> Result<Option<PostRecord>, HttpError> {
    state.feed.find_post(slug).await.map_err(HttpError::from)
}

async fn edit_form(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(slug): Path<String>,
) -> Response {
    let Some(session) = session else {
        return sign_in_required();
    };
    match find_post(&state, &slug).await {
        Ok(Some(post)) => render_edit_form(&session, edit_view(post, None), StatusCode::OK),
        Ok(None) => render_not_found_response(LayoutChrome::new(Some(&session.user))),
        Err(err) => err.into_response(),
    }
}

fn edit_view(post: PostRecord, error: Option<String>) -> EditPostView {
    EditPostView {
        id: post.id,
        slug: post.slug,
        title: post.title,
        excerpt: post.excerpt.unwrap_or_default(),
        author: post.author.unwrap_or_default(),
        comments_enabled: post.comments_enabled,
        error,
    }
}

fn render_edit_form(session: &Session, content: EditPostView, status: StatusCode) -> Response {
    let chrome =
        LayoutChrome::new(Some(&session.user)).with_title(&format!("Edit {}", content.title));
    let view = LayoutContext::new(chrome, content);
    render_template_response(EditPostTemplate { view }, status)
}

async fn update_post(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(slug): Path<String>,
    Form(form): Form<EditPostForm>,
) -> Response {
    let Some(session) = session else {
        return sign_in_required();
    };
    let post = match find_post(&state, &slug).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(LayoutChrome::new(Some(&session.user))),
        Err(err) => return err.into_response(),
    };

    let comments_enabled = form.comments_enabled.is_some();
    let command = UpdatePostCommand {
        title: form.title.clone(),
        excerpt: form.excerpt.clone(),
        author: form.author.clone(),
        comments_enabled: Some(comments_enabled),
    };

    match state.posts.update(&post.id, command).await {
        Ok(record) => {
            state.cache.invalidate_all("post_updated");
            Redirect::to(&format!("/blog/{}", record.slug)).into_response()
        }
        Err(err) => {
            let (status, message) = post_write_failure(&err, "Failed to update blog");
            let mut view = edit_view(post, Some(message));
            view.title = form.title.unwrap_or_default();
            view.excerpt = form.excerpt.unwrap_or_default();
            view.author = form.author.unwrap_or_default();
            view.comments_enabled = comments_enabled;
            render_edit_form(&session, view, status)
        }
    }
}

async fn delete_post(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(slug): Path<String>,
) -> Response {
    let Some(session) = session else {
        return sign_in_required();
    };
    let post = match find_post(&state, &slug).await {
        Ok(Some(post)) => post,
        Ok(None) => return render_not_found_response(LayoutChrome::new(Some(&session.user))),
        Err(err) => return err.into_response(),
    };

    match state.posts.delete(&post.id).await {
        Ok(()) => {
            state.cache.invalidate_all("post_deleted");
            Redirect::to("/").into_response()
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn profile(
    State(state): State<HttpState>,
    CurrentSession(session): CurrentSession,
    Path(id): Path<String>,
) -> Response {
    let chrome = chrome_for(&session);
    match state.profiles.profile(&id).await {
        Ok(Some(content)) => {
            let chrome = chrome.with_title(&content.name);
            let view = LayoutContext::new(chrome, content);
            render_template_response(ProfileTemplate { view }, StatusCode::OK)
        }
        Ok(None) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn sign_in_page(
    CurrentSession(session): CurrentSession,
    Query(query): Query<SignInQuery>,
) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }
    let error = query.error.as_deref().map(sign_in_error_message);
    let chrome = LayoutChrome::new(None).with_title("Sign in");
    let view = LayoutContext::new(chrome, SignInView { error });
    render_template_response(SignInTemplate { view }, StatusCode::OK)
}

fn sign_in_error_message(code: &str) -> String {
    match code {
        ERROR_ACCESS_DENIED => "Access denied. Your account could not be signed in.",
        ERROR_CALLBACK => "Sign-in with GitHub did not complete. Please try again.",
        ERROR_CONFIGURATION => "GitHub sign-in is not configured on this server.",
        _ => "Sign-in failed. Please try again.",
    }
    .to_string()
}

fn sign_in_required() -> Response {
    let chrome = LayoutChrome::new(None);
    let view = LayoutContext::new(chrome, ErrorPageView::sign_in_required());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::UNAUTHORIZED);
    ErrorReport::from_message(
        "infra::http::public::sign_in_required",
        StatusCode::UNAUTHORIZED,
        "Sign-in required",
    )
    .attach(&mut response);
    response
}

async fn serve_image(State(state): State<HttpState>, Path(id): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_image";

    match state.assets.load_image(&id).await {
        Ok(Some((asset, bytes))) => build_image_response(&asset.content_type, bytes),
        Ok(None) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Image not found",
            "The requested image is not available",
        )
        .into_response(),
        Err(err) => {
            error!(target = SOURCE, id = %id, error = %err, "failed to load stored image");
            HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read image",
                &err,
            )
            .into_response()
        }
    }
}

fn build_image_response(content_type: &str, bytes: Bytes) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(content_type) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}

/// Fallback for unmatched paths.
pub async fn not_found(CurrentSession(session): CurrentSession) -> Response {
    render_not_found_response(chrome_for(&session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_rating_uses_default_and_garbage_is_rejected() {
        assert_eq!(parse_rating(None), None);
        assert_eq!(parse_rating(Some("  ")), None);
        assert_eq!(parse_rating(Some("4")), Some(4));
        assert_eq!(parse_rating(Some("five")), Some(0));
    }

    #[test]
    fn category_options_mark_selection() {
        let options = category_options("food");
        assert_eq!(options.len(), Category::ALL.len());
        assert!(options.iter().any(|option| option.value == "food" && option.selected));
        assert_eq!(options.iter().filter(|option| option.selected).count(), 1);
    }

    #[test]
    fn unknown_sign_in_errors_get_a_generic_message() {
        assert!(sign_in_error_message(ERROR_ACCESS_DENIED).starts_with("Access denied"));
        assert_eq!(
            sign_in_error_message("Weird"),
            "Sign-in failed. Please try again."
        );
    }
}
