//! Identity and session values exchanged between the OAuth flow and the
//! reconciliation logic.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::IdentityProvider;

/// User identity returned by a completed OAuth handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// Provider account that vouched for an [`AuthenticatedIdentity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAccount {
    /// Provider name as issued by the sign-in callback, e.g. `github`.
    pub provider: String,
    pub provider_account_id: String,
}

impl ProviderAccount {
    pub fn github(account_id: impl Into<String>) -> Self {
        Self {
            provider: IdentityProvider::Github.as_str().to_string(),
            provider_account_id: account_id.into(),
        }
    }

    pub fn supported_provider(&self) -> Option<IdentityProvider> {
        IdentityProvider::from_name(&self.provider)
    }
}

/// The `user` half of a session.
///
/// `name`, `email` and `image` come from the identity at sign-in. The remaining
/// fields are filled by hydration and stay `None` when it finds no author or
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(default, skip_serializing)]
    pub trusted: Option<bool>,
    #[serde(default, skip_serializing)]
    pub joined_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing)]
    pub post_count: Option<u64>,
}

impl SessionUser {
    pub fn from_identity(identity: &AuthenticatedIdentity) -> Self {
        Self {
            name: identity.name.clone(),
            email: identity.email.clone(),
            image: identity.image.clone(),
            ..Self::default()
        }
    }

    /// Name shown in the page header, falling back to the email.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Signed in")
    }

    pub fn is_hydrated(&self) -> bool {
        self.id.is_some()
    }
}

/// Per-browser authenticated context. Only the identity half is persisted in
/// the cookie; hydration fields are recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    #[serde(with = "time::serde::rfc3339")]
    pub expires: OffsetDateTime,
}

impl Session {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn hydration_fields_are_not_persisted() {
        let session = Session {
            user: SessionUser {
                name: Some("A".into()),
                email: Some("a@x.com".into()),
                image: None,
                id: Some("author-1".into()),
                trusted: Some(true),
                joined_at: Some(datetime!(2024-01-01 0:00 UTC)),
                post_count: Some(3),
            },
            expires: datetime!(2024-02-01 0:00 UTC),
        };

        let encoded = serde_json::to_string(&session).expect("encode");
        let decoded: Session = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.user.email.as_deref(), Some("a@x.com"));
        assert!(!decoded.user.is_hydrated());
        assert_eq!(decoded.user.post_count, None);
    }

    #[test]
    fn github_accounts_are_supported() {
        assert_eq!(
            ProviderAccount::github("42").supported_provider(),
            Some(IdentityProvider::Github)
        );
        let other = ProviderAccount {
            provider: "google".into(),
            provider_account_id: "1".into(),
        };
        assert_eq!(other.supported_provider(), None);
    }
}
