//! Encrypted cookie sessions and OAuth state cookies.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::domain::identity::{AuthenticatedIdentity, Session, SessionUser};

pub const SESSION_COOKIE: &str = "blogers_session";
pub const STATE_COOKIE: &str = "blogers_oauth_state";

/// Minimum master secret length accepted by [`Key::derive_from`].
pub const MIN_SECRET_LEN: usize = 32;

const STATE_MAX_AGE: Duration = Duration::minutes(10);

/// Build the cookie key from a configured secret, or a random one when none
/// is configured (sessions then do not survive a restart).
pub fn cookie_key(secret: Option<&str>) -> Option<Key> {
    match secret {
        Some(secret) if secret.len() >= MIN_SECRET_LEN => Some(Key::derive_from(secret.as_bytes())),
        Some(_) => None,
        None => Some(Key::generate()),
    }
}

#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
    max_age: Duration,
    secure: bool,
}

impl SessionCodec {
    pub fn new(key: Key, max_age: Duration, secure: bool) -> Self {
        Self {
            key,
            max_age,
            secure,
        }
    }

    pub fn jar(&self, headers: &HeaderMap) -> PrivateCookieJar {
        PrivateCookieJar::from_headers(headers, self.key.clone())
    }

    pub fn issue(&self, identity: &AuthenticatedIdentity, now: OffsetDateTime) -> Session {
        Session {
            user: SessionUser::from_identity(identity),
            expires: now + self.max_age,
        }
    }

    /// Decode the session cookie. Tampered, malformed and expired cookies
    /// all read as anonymous.
    pub fn load(&self, jar: &PrivateCookieJar, now: OffsetDateTime) -> Option<Session> {
        let cookie = jar.get(SESSION_COOKIE)?;
        let session: Session = match serde_json::from_str(cookie.value()) {
            Ok(session) => session,
            Err(err) => {
                debug!(error = %err, "discarding undecodable session cookie");
                return None;
            }
        };
        (!session.is_expired(now)).then_some(session)
    }

    pub fn store(
        &self,
        jar: PrivateCookieJar,
        session: &Session,
    ) -> Result<PrivateCookieJar, serde_json::Error> {
        let value = serde_json::to_string(session)?;
        let cookie = Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(self.max_age);
        Ok(jar.add(cookie))
    }

    pub fn clear(&self, jar: PrivateCookieJar) -> PrivateCookieJar {
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }

    /// Issue a fresh OAuth state value and remember it in a short-lived cookie.
    pub fn begin_oauth(&self, jar: PrivateCookieJar) -> (PrivateCookieJar, String) {
        let state = Uuid::new_v4().simple().to_string();
        let cookie = Cookie::build((STATE_COOKIE, state.clone()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(STATE_MAX_AGE);
        (jar.add(cookie), state)
    }

    /// Consume the OAuth state cookie and compare it with the callback value.
    pub fn finish_oauth(
        &self,
        jar: PrivateCookieJar,
        returned: Option<&str>,
    ) -> (PrivateCookieJar, bool) {
        let expected = jar.get(STATE_COOKIE).map(|cookie| cookie.value().to_string());
        let jar = jar.remove(Cookie::build(STATE_COOKIE).path("/"));
        let matches = match (expected, returned) {
            (Some(expected), Some(returned)) if !expected.is_empty() => {
                bool::from(expected.as_bytes().ct_eq(returned.as_bytes()))
            }
            _ => false,
        };
        (jar, matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::response::IntoResponse;
    use time::macros::datetime;

    fn codec() -> SessionCodec {
        let key = cookie_key(Some("0123456789abcdef0123456789abcdef")).expect("key");
        SessionCodec::new(key, Duration::days(30), false)
    }

    /// Replay the `Set-Cookie` headers of `jar` as a request `Cookie` header.
    fn replay(jar: PrivateCookieJar) -> HeaderMap {
        let response = jar.into_response();
        let pairs: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .map(str::to_string)
            .collect();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, pairs.join("; ").parse().expect("header"));
        headers
    }

    #[test]
    fn session_survives_a_cookie_round_trip() {
        let codec = codec();
        let now = datetime!(2024-01-01 0:00 UTC);
        let identity = AuthenticatedIdentity {
            name: Some("A".into()),
            email: Some("a@x.com".into()),
            image: None,
        };
        let session = codec.issue(&identity, now);
        assert_eq!(session.expires, datetime!(2024-01-31 0:00 UTC));

        let jar = codec
            .store(codec.jar(&HeaderMap::new()), &session)
            .expect("store");
        let jar = codec.jar(&replay(jar));

        assert_eq!(codec.load(&jar, now), Some(session.clone()));
        assert_eq!(codec.load(&jar, datetime!(2024-02-01 0:00 UTC)), None);
    }

    #[test]
    fn cookies_from_another_key_are_ignored() {
        let codec = codec();
        let other = SessionCodec::new(Key::generate(), Duration::days(30), false);
        let now = datetime!(2024-01-01 0:00 UTC);
        let session = other.issue(&AuthenticatedIdentity::default(), now);
        let jar = other
            .store(other.jar(&HeaderMap::new()), &session)
            .expect("store");
        let headers = replay(jar);

        assert!(other.load(&other.jar(&headers), now).is_some());
        assert_eq!(codec.load(&codec.jar(&headers), now), None);
    }

    #[test]
    fn oauth_state_must_match() {
        let codec = codec();
        let (jar, state) = codec.begin_oauth(codec.jar(&HeaderMap::new()));
        let jar = codec.jar(&replay(jar));

        let (_, ok) = codec.finish_oauth(jar.clone(), Some(&state));
        assert!(ok);
        let (_, forged) = codec.finish_oauth(jar, Some("forged"));
        assert!(!forged);
    }

    #[test]
    fn short_secrets_are_rejected() {
        assert!(cookie_key(Some("short")).is_none());
        assert!(cookie_key(None).is_some());
    }
}
