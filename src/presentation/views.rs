use crate::application::error::{ErrorReport, HttpError};
use crate::domain::identity::SessionUser;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

pub const SITE_TITLE: &str = "Blogers";
pub const SITE_DESCRIPTION: &str = "Stories and ideas from the Blogers community.";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let view = LayoutContext::new(chrome, ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

#[derive(Clone)]
pub struct BrandView {
    pub title: String,
    pub href: String,
}

#[derive(Clone)]
pub struct PageMetaView {
    pub title: String,
    pub description: String,
}

/// Signed-in user shown in the page header.
#[derive(Clone)]
pub struct HeaderUserView {
    pub name: String,
    pub initial: String,
    pub image: Option<String>,
    pub profile_href: Option<String>,
    pub trusted: bool,
}

impl HeaderUserView {
    pub fn from_session(user: &SessionUser) -> Self {
        let name = user.display_name().to_string();
        Self {
            initial: initial_of(&name),
            image: user.image.clone().filter(|image| !image.is_empty()),
            profile_href: user.id.as_ref().map(|id| format!("/profile/{id}")),
            trusted: user.trusted.unwrap_or(false),
            name,
        }
    }
}

#[derive(Clone)]
pub struct LayoutChrome {
    pub brand: BrandView,
    pub meta: PageMetaView,
    pub user: Option<HeaderUserView>,
}

impl LayoutChrome {
    pub fn new(user: Option<&SessionUser>) -> Self {
        Self {
            brand: BrandView {
                title: SITE_TITLE.to_string(),
                href: "/".to_string(),
            },
            meta: PageMetaView {
                title: SITE_TITLE.to_string(),
                description: SITE_DESCRIPTION.to_string(),
            },
            user: user.map(HeaderUserView::from_session),
        }
    }

    pub fn with_title(self, title: &str) -> Self {
        Self {
            meta: PageMetaView {
                title: format!("{title} | {SITE_TITLE}"),
                ..self.meta
            },
            ..self
        }
    }

    pub fn with_description(self, description: &str) -> Self {
        Self {
            meta: PageMetaView {
                description: description.to_string(),
                ..self.meta
            },
            ..self
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub brand: BrandView,
    pub meta: PageMetaView,
    pub user: Option<HeaderUserView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            brand: chrome.brand,
            meta: chrome.meta,
            user: chrome.user,
            content,
        }
    }
}

#[derive(Clone)]
pub struct PostCard {
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub published: String,
    pub iso_date: String,
    pub image_url: Option<String>,
    pub views: u64,
}

#[derive(Clone)]
pub struct FilterLink {
    pub label: String,
    pub href: String,
    pub is_active: bool,
}

pub struct FeedContext {
    pub posts: Vec<PostCard>,
    pub post_count: usize,
    pub has_results: bool,
    pub categories: Vec<FilterLink>,
    pub sorts: Vec<FilterLink>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Clone)]
pub struct TocEntry {
    pub anchor: String,
    pub title: String,
}

#[derive(Clone)]
pub struct AuthorCardView {
    pub name: String,
    pub handle: String,
    pub initial: String,
}

#[derive(Clone)]
pub struct CommentItemView {
    pub name: String,
    pub comment: String,
    pub stars: String,
    pub rating: u8,
    pub created: String,
    pub iso_date: String,
}

pub struct PostDetailContext {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub published: String,
    pub iso_date: String,
    pub category: Option<String>,
    pub views: u64,
    pub body_html: String,
    pub image_url: Option<String>,
    pub author: Option<AuthorCardView>,
    pub toc: Vec<TocEntry>,
    pub comments_enabled: bool,
    pub comments: Vec<CommentItemView>,
    pub comment_count: usize,
}

pub struct PostPageView {
    pub post: PostDetailContext,
    pub can_edit: bool,
    pub comment_error: Option<String>,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub view: LayoutContext<PostPageView>,
}

#[derive(Clone)]
pub struct CategoryOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Clone, Default)]
pub struct CreatePostForm {
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    pub author: String,
    pub category: String,
    pub content: String,
}

pub struct CreatePostView {
    pub form: CreatePostForm,
    pub categories: Vec<CategoryOption>,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "create.html")]
pub struct CreatePostTemplate {
    pub view: LayoutContext<CreatePostView>,
}

pub struct EditPostView {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub author: String,
    pub comments_enabled: bool,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "edit.html")]
pub struct EditPostTemplate {
    pub view: LayoutContext<EditPostView>,
}

pub struct ProfileView {
    pub name: String,
    pub email: String,
    pub initial: String,
    pub image: Option<String>,
    pub trusted: bool,
    pub joined: String,
    pub posts: Vec<PostCard>,
    pub post_count: usize,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileView>,
}

pub struct SignInView {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "signin.html")]
pub struct SignInTemplate {
    pub view: LayoutContext<SignInView>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
    pub primary_action: Option<ErrorAction>,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist. Try returning to the homepage to keep reading.".to_string(),
            primary_action: Some(ErrorAction::home()),
        }
    }

    pub fn sign_in_required() -> Self {
        Self {
            title: "Sign in required".to_string(),
            message: "You need to sign in with GitHub before writing or editing posts.".to_string(),
            primary_action: Some(ErrorAction {
                href: "/auth/signin".to_string(),
                label: "Sign in".to_string(),
            }),
        }
    }
}

pub struct ErrorAction {
    pub href: String,
    pub label: String,
}

impl ErrorAction {
    pub fn home() -> Self {
        Self {
            href: "/".to_string(),
            label: "Back to home".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

/// First character of a name, upper-cased, for avatar placeholders.
pub fn initial_of(name: &str) -> String {
    name.chars()
        .next()
        .map(|ch| ch.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

/// Filled and empty stars for a 1..=5 rating.
pub fn rating_stars(rating: u8) -> String {
    let filled = usize::from(rating.min(5));
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_and_initials() {
        assert_eq!(rating_stars(3), "★★★☆☆");
        assert_eq!(rating_stars(9), "★★★★★");
        assert_eq!(initial_of("ada"), "A");
        assert_eq!(initial_of(""), "?");
    }

    #[test]
    fn header_links_profile_only_when_hydrated() {
        let mut user = SessionUser {
            name: Some("Ada".into()),
            email: Some("ada@x.com".into()),
            ..SessionUser::default()
        };
        assert!(HeaderUserView::from_session(&user).profile_href.is_none());

        user.id = Some("author-1".into());
        assert_eq!(
            HeaderUserView::from_session(&user).profile_href.as_deref(),
            Some("/profile/author-1")
        );
    }
}
