use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header::CONTENT_TYPE};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;

use crate::application::repos::RepoError;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("content store responded with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse content store response: {0}")]
    Decode(String),
    #[error("a write token is required for content store mutations")]
    MissingToken,
}

impl From<CmsError> for RepoError {
    fn from(err: CmsError) -> Self {
        match err {
            CmsError::Http(ref source) if source.is_timeout() => RepoError::Timeout,
            CmsError::Status { status, body } => match status {
                StatusCode::NOT_FOUND => RepoError::NotFound,
                StatusCode::CONFLICT => RepoError::Duplicate {
                    constraint: "document_id".to_string(),
                },
                StatusCode::BAD_REQUEST => RepoError::invalid_input(body),
                StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => RepoError::Timeout,
                other => RepoError::Persistence(format!("status {other} body {body}")),
            },
            other => RepoError::from_persistence(other),
        }
    }
}

/// Connection settings for the hosted content store.
#[derive(Debug, Clone)]
pub struct CmsOptions {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: Option<String>,
    pub use_cdn: bool,
    pub api_host: Option<Url>,
    pub cdn_host: Option<Url>,
    pub image_host: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationResponse {
    #[serde(rename = "transactionId", default)]
    pub transaction_id: String,
    #[serde(default)]
    pub results: Vec<MutationResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationResult {
    pub id: String,
    #[serde(default)]
    pub operation: String,
    pub document: Option<Value>,
}

impl MutationResult {
    pub fn created(&self) -> bool {
        self.operation == "create"
    }
}

#[derive(Debug, Deserialize)]
struct AssetResponse<T> {
    document: T,
}

/// HTTP client for the content store's query, mutation and asset endpoints.
#[derive(Clone, Debug)]
pub struct CmsClient {
    client: Client,
    api_base: Url,
    cdn_base: Url,
    image_base: Url,
    project_id: String,
    dataset: String,
    api_version: String,
    token: Option<String>,
    use_cdn: bool,
}

impl CmsClient {
    pub fn new(options: CmsOptions) -> Result<Self, CmsError> {
        let api_base = match options.api_host {
            Some(host) => host.join("/")?,
            None => Url::parse(&format!("https://{}.api.sanity.io/", options.project_id))?,
        };
        let cdn_base = match options.cdn_host {
            Some(host) => host.join("/")?,
            None => Url::parse(&format!("https://{}.apicdn.sanity.io/", options.project_id))?,
        };
        let image_base = match options.image_host {
            Some(host) => host.join("/")?,
            None => Url::parse("https://cdn.sanity.io/")?,
        };
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(options.timeout)
            .build()?;
        let api_version = options
            .api_version
            .trim_start_matches('v')
            .to_string();

        Ok(Self {
            client,
            api_base,
            cdn_base,
            image_base,
            project_id: options.project_id,
            dataset: options.dataset,
            api_version,
            token: options.token.filter(|token| !token.is_empty()),
            use_cdn: options.use_cdn,
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("blogers/", env!("CARGO_PKG_VERSION"))
    }

    fn endpoint(&self, base: &Url, section: &str) -> Result<Url, CmsError> {
        base.join(&format!(
            "v{}/{section}/{}",
            self.api_version, self.dataset
        ))
        .map_err(CmsError::Url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Run a query against the read host (the CDN when enabled).
    pub async fn query<T: DeserializeOwned>(
        &self,
        groq: &str,
        params: &[(&str, Value)],
    ) -> Result<T, CmsError> {
        let base = if self.use_cdn {
            &self.cdn_base
        } else {
            &self.api_base
        };
        self.query_at(base, groq, params).await
    }

    /// Run a query against the API host, bypassing the CDN. Used where a read
    /// must observe a write made moments earlier.
    pub async fn query_fresh<T: DeserializeOwned>(
        &self,
        groq: &str,
        params: &[(&str, Value)],
    ) -> Result<T, CmsError> {
        self.query_at(&self.api_base, groq, params).await
    }

    async fn query_at<T: DeserializeOwned>(
        &self,
        base: &Url,
        groq: &str,
        params: &[(&str, Value)],
    ) -> Result<T, CmsError> {
        let mut url = self.endpoint(base, "data/query")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", groq);
            for (name, value) in params {
                pairs.append_pair(&format!("${name}"), &value.to_string());
            }
        }

        let resp = self.authorize(self.client.get(url)).send().await?;
        let body: QueryResponse<T> = Self::handle(resp).await?;
        Ok(body.result)
    }

    /// Apply mutations as a single transaction.
    pub async fn mutate(&self, mutations: Vec<Value>) -> Result<MutationResponse, CmsError> {
        let token = self.token.as_deref().ok_or(CmsError::MissingToken)?;
        let mut url = self.endpoint(&self.api_base, "data/mutate")?;
        url.query_pairs_mut()
            .append_pair("returnIds", "true")
            .append_pair("returnDocuments", "true");

        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "mutations": mutations }))
            .send()
            .await?;
        Self::handle(resp).await
    }

    pub async fn upload_image<T: DeserializeOwned>(
        &self,
        bytes: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<T, CmsError> {
        let token = self.token.as_deref().ok_or(CmsError::MissingToken)?;
        let mut url = self.endpoint(&self.api_base, "assets/images")?;
        url.query_pairs_mut().append_pair("filename", filename);

        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let body: AssetResponse<T> = Self::handle(resp).await?;
        Ok(body.document)
    }

    /// Public URL for an image asset id such as `image-<hash>-<w>x<h>-<ext>`.
    pub fn image_url(&self, asset_ref: &str) -> Option<String> {
        let rest = asset_ref.strip_prefix("image-")?;
        let (stem, extension) = rest.rsplit_once('-')?;
        let (hash, dimensions) = stem.rsplit_once('-')?;
        let (width, height) = dimensions.split_once('x')?;
        let numeric = |value: &str| !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
        if hash.is_empty() || extension.is_empty() || !numeric(width) || !numeric(height) {
            return None;
        }

        let path = format!(
            "images/{}/{}/{hash}-{width}x{height}.{extension}",
            self.project_id, self.dataset
        );
        self.image_base.join(&path).ok().map(String::from)
    }

    async fn handle<T: DeserializeOwned>(resp: Response) -> Result<T, CmsError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            return Err(CmsError::Status { status, body });
        }
        serde_json::from_slice(&bytes).map_err(|e| CmsError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CmsClient {
        CmsClient::new(CmsOptions {
            project_id: "proj".into(),
            dataset: "production".into(),
            api_version: "v2024-01-01".into(),
            token: Some("secret".into()),
            use_cdn: true,
            api_host: None,
            cdn_host: None,
            image_host: None,
            timeout: Duration::from_secs(5),
        })
        .expect("client")
    }

    #[test]
    fn endpoints_include_version_and_dataset() {
        let client = client();
        let url = client
            .endpoint(&client.api_base, "data/query")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://proj.api.sanity.io/v2024-01-01/data/query/production"
        );
    }

    #[test]
    fn image_refs_resolve_to_cdn_urls() {
        let client = client();
        assert_eq!(
            client.image_url("image-abc123-800x600-png").as_deref(),
            Some("https://cdn.sanity.io/images/proj/production/abc123-800x600.png")
        );
        assert_eq!(client.image_url("file-abc-pdf"), None);
        assert_eq!(client.image_url("image-abc-wide-png"), None);
    }

    #[test]
    fn status_errors_map_onto_repo_errors() {
        let missing: RepoError = CmsError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        }
        .into();
        assert!(matches!(missing, RepoError::NotFound));

        let unavailable: RepoError = CmsError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "down".into(),
        }
        .into();
        assert!(matches!(unavailable, RepoError::Persistence(_)));
    }
}
