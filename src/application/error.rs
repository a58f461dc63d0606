use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{
        comments::CommentError, feed::FeedError, posts::PostWriteError, repos::RepoError,
        uploads::UploadError,
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Error returned by HTML handlers: a short public message plus a report for
/// the response logger.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Maps a repository failure to the status a caller should see.
pub fn repo_status(error: &RepoError) -> StatusCode {
    match error {
        RepoError::NotFound => StatusCode::NOT_FOUND,
        RepoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        RepoError::Duplicate { .. } => StatusCode::CONFLICT,
        RepoError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        RepoError::Persistence(_) | RepoError::Integrity { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl From<FeedError> for HttpError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::Repo(err) => HttpError::from_error(
                "application::feed",
                repo_status(&err),
                "Content store unavailable",
                &err,
            ),
        }
    }
}

impl From<PostWriteError> for HttpError {
    fn from(error: PostWriteError) -> Self {
        let (status, message) = match &error {
            PostWriteError::Validation(_) | PostWriteError::Slug(_) => {
                (StatusCode::BAD_REQUEST, "Post could not be saved")
            }
            PostWriteError::NotFound => (StatusCode::NOT_FOUND, "Post not found"),
            PostWriteError::Repo(err) => (repo_status(err), "Content store unavailable"),
        };
        HttpError::from_error("application::posts", status, message, &error)
    }
}

impl From<CommentError> for HttpError {
    fn from(error: CommentError) -> Self {
        let (status, message) = match &error {
            CommentError::Validation(_) => (StatusCode::BAD_REQUEST, "Comment could not be saved"),
            CommentError::Repo(err) => (repo_status(err), "Content store unavailable"),
        };
        HttpError::from_error("application::comments", status, message, &error)
    }
}

impl From<UploadError> for HttpError {
    fn from(error: UploadError) -> Self {
        let (status, message) = match &error {
            UploadError::Repo(err) => (repo_status(err), "Image upload failed"),
            _ => (StatusCode::BAD_REQUEST, "Image could not be uploaded"),
        };
        HttpError::from_error("application::uploads", status, message, &error)
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Repo(err) => repo_status(err),
            AppError::Infra(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::NotFound => "Resource not found",
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => {
                "Request could not be processed"
            }
            AppError::Repo(_) => "Content store unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let error = AppError::from(RepoError::Timeout);
        let report = ErrorReport::from_error("test", StatusCode::GATEWAY_TIMEOUT, &error);
        assert_eq!(report.messages, vec!["content store timeout".to_string()]);
    }

    #[test]
    fn app_error_response_carries_report() {
        let response = AppError::validation("bad email").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["validation failed: bad email".to_string()]);
    }
}
