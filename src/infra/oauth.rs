//! GitHub OAuth web flow.

use std::time::Duration;

use reqwest::{Client, Response, Url, header::ACCEPT};
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;

use crate::domain::identity::{AuthenticatedIdentity, ProviderAccount};

pub const SCOPES: &str = "read:user user:email";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider rejected the authorization code: {0}")]
    Rejected(String),
    #[error("failed to parse provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone)]
pub struct GithubOptions {
    pub client_id: String,
    pub client_secret: String,
    /// Absolute callback URL registered with the OAuth app.
    pub redirect_uri: Url,
    pub web_base: Option<Url>,
    pub api_base: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Clone, Debug)]
pub struct GithubOAuth {
    client: Client,
    web_base: Url,
    api_base: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: Url,
}

impl GithubOAuth {
    pub fn new(options: GithubOptions) -> Result<Self, OAuthError> {
        let web_base = match options.web_base {
            Some(base) => base.join("/")?,
            None => Url::parse("https://github.com/")?,
        };
        let api_base = match options.api_base {
            Some(base) => base.join("/")?,
            None => Url::parse("https://api.github.com/")?,
        };
        let client = Client::builder()
            .user_agent(concat!("blogers/", env!("CARGO_PKG_VERSION")))
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            client,
            web_base,
            api_base,
            client_id: options.client_id,
            client_secret: options.client_secret,
            redirect_uri: options.redirect_uri,
        })
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        let mut url = self.web_base.join("login/oauth/authorize")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("scope", SCOPES)
            .append_pair("state", state);
        Ok(url)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let url = self.web_base.join("login/oauth/access_token")?;
        let resp = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
                "redirect_uri": self.redirect_uri.as_str(),
            }))
            .send()
            .await?;
        let body: TokenResponse = Self::handle(resp).await?;

        match (body.access_token, body.error) {
            (Some(token), None) if !token.is_empty() => Ok(token),
            (_, error) => Err(OAuthError::Rejected(
                body.error_description
                    .or(error)
                    .unwrap_or_else(|| "missing access token".to_string()),
            )),
        }
    }

    pub async fn fetch_user(&self, token: &str) -> Result<GithubUser, OAuthError> {
        self.get_json("user", token).await
    }

    pub async fn fetch_emails(&self, token: &str) -> Result<Vec<GithubEmail>, OAuthError> {
        self.get_json("user/emails", token).await
    }

    /// Complete the handshake for `code` and return the signed-in identity.
    pub async fn authenticate(
        &self,
        code: &str,
    ) -> Result<(AuthenticatedIdentity, ProviderAccount), OAuthError> {
        let token = self.exchange_code(code).await?;
        let user = self.fetch_user(&token).await?;
        let email = match user.email.clone().filter(|email| !email.is_empty()) {
            Some(email) => Some(email),
            None => primary_email(&self.fetch_emails(&token).await?),
        };
        Ok(identity_from_user(user, email))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T, OAuthError> {
        let url = self.api_base.join(path)?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        Self::handle(resp).await
    }

    async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, OAuthError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(OAuthError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| OAuthError::Decode(e.to_string()))
    }
}

fn primary_email(emails: &[GithubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|entry| entry.primary && entry.verified)
        .or_else(|| emails.iter().find(|entry| entry.verified))
        .map(|entry| entry.email.clone())
}

pub fn identity_from_user(
    user: GithubUser,
    email: Option<String>,
) -> (AuthenticatedIdentity, ProviderAccount) {
    let name = user
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(user.login);
    let identity = AuthenticatedIdentity {
        name: Some(name),
        email,
        image: user.avatar_url.filter(|url| !url.is_empty()),
    };
    (identity, ProviderAccount::github(user.id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> GithubUser {
        GithubUser {
            id: 7,
            login: "octo".into(),
            name: None,
            email: None,
            avatar_url: Some("https://avatars/7".into()),
        }
    }

    #[test]
    fn login_stands_in_for_missing_name() {
        let (identity, account) = identity_from_user(user(), Some("o@x.com".into()));
        assert_eq!(identity.name.as_deref(), Some("octo"));
        assert_eq!(identity.image.as_deref(), Some("https://avatars/7"));
        assert_eq!(account, ProviderAccount::github("7"));
    }

    #[test]
    fn primary_verified_email_wins() {
        let emails = vec![
            GithubEmail {
                email: "old@x.com".into(),
                primary: false,
                verified: true,
            },
            GithubEmail {
                email: "main@x.com".into(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(primary_email(&emails).as_deref(), Some("main@x.com"));
        assert_eq!(primary_email(&[]), None);
    }

    #[test]
    fn authorize_url_carries_state_and_scopes() {
        let oauth = GithubOAuth::new(GithubOptions {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: Url::parse("http://localhost:3000/api/auth/callback/github")
                .expect("url"),
            web_base: None,
            api_base: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client");

        let url = oauth.authorize_url("abc").expect("url");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(url.as_str().starts_with("https://github.com/login/oauth/authorize?"));
        assert!(pairs.contains(&("state".into(), "abc".into())));
        assert!(pairs.contains(&("scope".into(), SCOPES.into())));
    }
}
