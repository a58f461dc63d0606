//! GitHub OAuth handshake and session endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::error::ErrorReport;
use crate::application::identity::SignInDecision;
use crate::infra::oauth::GithubOAuth;

use super::RouterState;
use super::api::models::session_to_api;
use super::extract::{CurrentSession, SessionState};

/// Error codes understood by the sign-in page.
pub const ERROR_ACCESS_DENIED: &str = "AccessDenied";
pub const ERROR_CALLBACK: &str = "OAuthCallback";
pub const ERROR_CONFIGURATION: &str = "Configuration";

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionState,
    pub github: Option<Arc<GithubOAuth>>,
}

pub fn build_auth_router() -> Router<RouterState> {
    Router::new()
        .route("/api/auth/signin/github", get(github_sign_in))
        .route("/api/auth/callback/github", get(github_callback))
        .route("/api/auth/signout", post(sign_out))
        .route("/api/auth/session", get(current_session))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn github_sign_in(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let Some(github) = state.github.as_ref() else {
        return sign_in_failure(ERROR_CONFIGURATION, "github sign-in is not configured");
    };

    let jar = state.sessions.codec.jar(&headers);
    let (jar, oauth_state) = state.sessions.codec.begin_oauth(jar);
    match github.authorize_url(&oauth_state) {
        Ok(url) => (jar, Redirect::to(url.as_str())).into_response(),
        Err(err) => sign_in_failure(ERROR_CONFIGURATION, &err.to_string()),
    }
}

async fn github_callback(
    State(state): State<AuthState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(github) = state.github.as_ref() else {
        return sign_in_failure(ERROR_CONFIGURATION, "github sign-in is not configured");
    };

    let codec = &state.sessions.codec;
    let (jar, state_matches) = codec.finish_oauth(codec.jar(&headers), query.state.as_deref());
    if let Some(error) = query.error {
        let response = sign_in_failure(ERROR_ACCESS_DENIED, &format!("provider error: {error}"));
        return (jar, response).into_response();
    }
    if !state_matches {
        let response = sign_in_failure(ERROR_CALLBACK, "oauth state mismatch");
        return (jar, response).into_response();
    }
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        let response = sign_in_failure(ERROR_CALLBACK, "missing authorization code");
        return (jar, response).into_response();
    };

    let (identity, account) = match github.authenticate(&code).await {
        Ok(pair) => pair,
        Err(err) => {
            warn!(error = %err, "github token exchange failed");
            let response = sign_in_failure(ERROR_CALLBACK, &err.to_string());
            return (jar, response).into_response();
        }
    };

    match state
        .sessions
        .identity
        .sign_in(Some(&identity), Some(&account))
        .await
    {
        SignInDecision::Allowed => {}
        SignInDecision::Denied => {
            let response = sign_in_failure(ERROR_ACCESS_DENIED, "sign-in denied");
            return (jar, response).into_response();
        }
    }

    let session = codec.issue(&identity, OffsetDateTime::now_utc());
    match codec.store(jar, &session) {
        Ok(jar) => {
            info!(provider = %account.provider, "signed in");
            (jar, Redirect::to("/")).into_response()
        }
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(
                "infra::http::auth::github_callback",
                StatusCode::INTERNAL_SERVER_ERROR,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn sign_out(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let codec = &state.sessions.codec;
    let jar = codec.clear(codec.jar(&headers));
    (jar, Redirect::to("/")).into_response()
}

async fn current_session(CurrentSession(session): CurrentSession) -> Response {
    match session {
        Some(session) => Json(session_to_api(session)).into_response(),
        None => Json(json!({})).into_response(),
    }
}

fn sign_in_failure(code: &'static str, detail: &str) -> Response {
    let mut response = Redirect::to(&format!("/auth/signin?error={code}")).into_response();
    ErrorReport::from_message(
        "infra::http::auth",
        StatusCode::SEE_OTHER,
        format!("{code}: {detail}"),
    )
    .attach(&mut response);
    response
}
