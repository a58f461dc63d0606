//! Identity reconciliation between OAuth sign-ins and author records.
//!
//! [`reconcile_sign_in`] keeps one author per email in step with the provider
//! identity; [`hydrate_session`] copies durable author attributes onto every
//! session read. Both take their repositories explicitly so they can run
//! against any store.

use std::sync::Arc;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::repos::{AuthorInsert, AuthorsRepo, CreateAuthorParams, PostsRepo, RepoError};
use crate::domain::entities::AuthorRecord;
use crate::domain::identity::{AuthenticatedIdentity, ProviderAccount, Session};
use crate::domain::types::UnknownProviderPolicy;

pub const UNKNOWN_AUTHOR_NAME: &str = "Unknown";

/// Store side effects of a sign-in that reached the reconciliation step.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// Provider is not one we reconcile; nothing was read or written.
    Skipped,
    Created(AuthorRecord),
    AvatarUpdated(AuthorRecord),
    Unchanged(AuthorRecord),
}

impl SignInOutcome {
    fn label(&self) -> &'static str {
        match self {
            SignInOutcome::Skipped => "skipped",
            SignInOutcome::Created(_) => "created",
            SignInOutcome::AvatarUpdated(_) => "avatar_updated",
            SignInOutcome::Unchanged(_) => "unchanged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInDecision {
    Allowed,
    Denied,
}

/// Create or refresh the author record behind a completed sign-in.
///
/// Unsupported providers and missing identities are skipped without touching
/// the store. Any store failure is returned so the caller can deny the sign-in.
pub async fn reconcile_sign_in(
    authors: &dyn AuthorsRepo,
    identity: Option<&AuthenticatedIdentity>,
    account: Option<&ProviderAccount>,
    now: OffsetDateTime,
) -> Result<SignInOutcome, RepoError> {
    let (Some(identity), Some(account)) = (identity, account) else {
        return Ok(SignInOutcome::Skipped);
    };
    if account.supported_provider().is_none() {
        return Ok(SignInOutcome::Skipped);
    }

    let email = identity.email.as_deref().unwrap_or("");
    if !email.is_empty()
        && let Some(existing) = authors.find_author_by_email(email).await?
    {
        return refresh_avatar(authors, existing, identity).await;
    }

    let params = CreateAuthorParams {
        name: identity
            .name
            .clone()
            .unwrap_or_else(|| UNKNOWN_AUTHOR_NAME.to_string()),
        email: email.to_string(),
        image: identity.image.clone().unwrap_or_default(),
        github_id: Some(account.provider_account_id.clone()),
        joined_at: now,
    };

    // Without an email there is nothing to match later sign-ins against.
    if email.is_empty() {
        return Ok(SignInOutcome::Created(authors.create_author(params).await?));
    }

    match authors.create_author_if_absent(params).await? {
        AuthorInsert::Created(record) => Ok(SignInOutcome::Created(record)),
        AuthorInsert::Existing(record) => {
            debug!(author_id = %record.id, "author created concurrently; treating as existing");
            refresh_avatar(authors, record, identity).await
        }
    }
}

async fn refresh_avatar(
    authors: &dyn AuthorsRepo,
    mut record: AuthorRecord,
    identity: &AuthenticatedIdentity,
) -> Result<SignInOutcome, RepoError> {
    match identity.image.as_deref() {
        Some(image) if !image.is_empty() && image != record.image => {
            authors.update_author_image(&record.id, image).await?;
            record.image = image.to_string();
            Ok(SignInOutcome::AvatarUpdated(record))
        }
        _ => Ok(SignInOutcome::Unchanged(record)),
    }
}

/// Copy author id, trust flag, join date and post count onto the session.
///
/// Lookup failures are logged and leave the session as it was; this never
/// fails. Fields are only assigned once every lookup has succeeded.
pub async fn hydrate_session(
    authors: &dyn AuthorsRepo,
    posts: &dyn PostsRepo,
    mut session: Session,
) -> Session {
    let Some(email) = session.user.email.clone().filter(|email| !email.is_empty()) else {
        return session;
    };

    match lookup_enrichment(authors, posts, &email).await {
        Ok(Some((author, post_count))) => {
            session.user.id = Some(author.id);
            session.user.trusted = Some(author.trusted);
            session.user.joined_at = Some(author.joined_at);
            session.user.post_count = Some(post_count);
        }
        Ok(None) => {}
        Err(err) => {
            counter!("blogers_session_hydration_failures_total").increment(1);
            warn!(error = %err, "session hydration failed; serving unenriched session");
        }
    }

    session
}

async fn lookup_enrichment(
    authors: &dyn AuthorsRepo,
    posts: &dyn PostsRepo,
    email: &str,
) -> Result<Option<(AuthorRecord, u64)>, RepoError> {
    let Some(author) = authors.find_author_by_email(email).await? else {
        return Ok(None);
    };
    let post_count = posts.count_by_author(&author.name).await?;
    Ok(Some((author, post_count)))
}

/// Applies the provider policy and records the outcome of each sign-in.
#[derive(Clone)]
pub struct IdentityService {
    authors: Arc<dyn AuthorsRepo>,
    posts: Arc<dyn PostsRepo>,
    unknown_provider: UnknownProviderPolicy,
}

impl IdentityService {
    pub fn new(
        authors: Arc<dyn AuthorsRepo>,
        posts: Arc<dyn PostsRepo>,
        unknown_provider: UnknownProviderPolicy,
    ) -> Self {
        Self {
            authors,
            posts,
            unknown_provider,
        }
    }

    pub async fn sign_in(
        &self,
        identity: Option<&AuthenticatedIdentity>,
        account: Option<&ProviderAccount>,
    ) -> SignInDecision {
        let unsupported = account.is_some_and(|account| account.supported_provider().is_none());
        if unsupported && self.unknown_provider == UnknownProviderPolicy::Deny {
            let provider = account.map(|account| account.provider.as_str()).unwrap_or("");
            info!(provider, "sign-in denied for unsupported provider");
            counter!("blogers_sign_in_total", "outcome" => "denied_provider").increment(1);
            return SignInDecision::Denied;
        }

        match reconcile_sign_in(
            self.authors.as_ref(),
            identity,
            account,
            OffsetDateTime::now_utc(),
        )
        .await
        {
            Ok(outcome) => {
                counter!("blogers_sign_in_total", "outcome" => outcome.label()).increment(1);
                if let SignInOutcome::Created(record) = &outcome {
                    info!(author_id = %record.id, "created author on first sign-in");
                }
                SignInDecision::Allowed
            }
            Err(err) => {
                counter!("blogers_sign_in_total", "outcome" => "store_error").increment(1);
                warn!(error = %err, "sign-in denied: author reconciliation failed");
                SignInDecision::Denied
            }
        }
    }

    pub async fn hydrate(&self, session: Session) -> Session {
        hydrate_session(self.authors.as_ref(), self.posts.as_ref(), session).await
    }
}
