//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::PageCacheConfig;
use crate::domain::types::UnknownProviderPolicy;
use crate::infra::session::MIN_SECRET_LEN;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides, StoreOverrides, TrustAuthorArgs};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "blogers";
const ENV_PREFIX: &str = "BLOGERS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CMS_DATASET: &str = "production";
const DEFAULT_CMS_API_VERSION: &str = "2024-01-01";
const DEFAULT_CMS_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SESSION_MAX_AGE_DAYS: u64 = 30;
const DEFAULT_REVALIDATE_SECS: u64 = 60;
const DEFAULT_PAGE_CACHE_CAPACITY: usize = 256;
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub store: StoreSettings,
    pub auth: AuthSettings,
    pub pages: PageCacheConfig,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub public_url: Url,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub enum StoreSettings {
    Memory,
    Cms(CmsSettings),
}

#[derive(Debug, Clone)]
pub struct CmsSettings {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: Option<String>,
    pub use_cdn: bool,
    pub api_host: Option<Url>,
    pub cdn_host: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub github: Option<GithubSettings>,
    pub session_secret: Option<String>,
    pub session_max_age: time::Duration,
    pub secure_cookies: bool,
    pub unknown_provider: UnknownProviderPolicy,
}

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::TrustAuthor(args)) => raw.apply_store_overrides(&args.store),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    store: RawStoreSettings,
    cms: RawCmsSettings,
    auth: RawAuthSettings,
    pages: RawPageSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_store_overrides(&overrides.store);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(url) = overrides.server_public_url.as_ref() {
            self.server.public_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(policy) = overrides.auth_unknown_provider.as_ref() {
            self.auth.unknown_provider = Some(policy.clone());
        }
        if let Some(seconds) = overrides.pages_revalidate_seconds {
            self.pages.revalidate_seconds = Some(seconds);
        }
        if let Some(capacity) = overrides.pages_cache_capacity {
            self.pages.cache_capacity = Some(capacity);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
    }

    fn apply_store_overrides(&mut self, overrides: &StoreOverrides) {
        if let Some(backend) = overrides.store_backend.as_ref() {
            self.store.backend = Some(backend.clone());
        }
        if let Some(project) = overrides.cms_project_id.as_ref() {
            self.cms.project_id = Some(project.clone());
        }
        if let Some(dataset) = overrides.cms_dataset.as_ref() {
            self.cms.dataset = Some(dataset.clone());
        }
        if let Some(token) = overrides.cms_token.as_ref() {
            self.cms.token = Some(token.clone());
        }
        if let Some(use_cdn) = overrides.cms_use_cdn {
            self.cms.use_cdn = Some(use_cdn);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            store,
            cms,
            auth,
            pages,
            uploads,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let store = build_store_settings(store, cms)?;
        let auth = build_auth_settings(auth, &server.public_url)?;
        let pages = build_page_settings(pages)?;
        let uploads = build_upload_settings(uploads)?;

        Ok(Self {
            server,
            logging,
            store,
            auth,
            pages,
            uploads,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let public_url = match non_blank(server.public_url) {
        Some(value) => Url::parse(&value)
            .map_err(|err| LoadError::invalid("server.public_url", err.to_string()))?,
        None => Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|err| LoadError::invalid("server.public_url", err.to_string()))?,
    };
    if !matches!(public_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "server.public_url",
            "scheme must be http or https",
        ));
    }

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        public_url,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_store_settings(
    store: RawStoreSettings,
    cms: RawCmsSettings,
) -> Result<StoreSettings, LoadError> {
    let backend = non_blank(store.backend).unwrap_or_else(|| "cms".to_string());
    match backend.as_str() {
        "memory" => Ok(StoreSettings::Memory),
        "cms" => build_cms_settings(cms).map(StoreSettings::Cms),
        other => Err(LoadError::invalid(
            "store.backend",
            format!("unknown backend `{other}` (expected cms or memory)"),
        )),
    }
}

fn build_cms_settings(cms: RawCmsSettings) -> Result<CmsSettings, LoadError> {
    let project_id = non_blank(cms.project_id)
        .ok_or_else(|| LoadError::invalid("cms.project_id", "required for the cms backend"))?;
    if !project_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
    {
        return Err(LoadError::invalid(
            "cms.project_id",
            "must contain only letters, digits and dashes",
        ));
    }

    let dataset = non_blank(cms.dataset).unwrap_or_else(|| DEFAULT_CMS_DATASET.to_string());
    let api_version =
        non_blank(cms.api_version).unwrap_or_else(|| DEFAULT_CMS_API_VERSION.to_string());
    let timeout_secs = cms.timeout_seconds.unwrap_or(DEFAULT_CMS_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "cms.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CmsSettings {
        project_id,
        dataset,
        api_version,
        token: non_blank(cms.token),
        use_cdn: cms.use_cdn.unwrap_or(true),
        api_host: parse_optional_url(cms.api_host, "cms.api_host")?,
        cdn_host: parse_optional_url(cms.cdn_host, "cms.cdn_host")?,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_auth_settings(auth: RawAuthSettings, public_url: &Url) -> Result<AuthSettings, LoadError> {
    let github = match (
        non_blank(auth.github_client_id),
        non_blank(auth.github_client_secret),
    ) {
        (Some(client_id), Some(client_secret)) => Some(GithubSettings {
            client_id,
            client_secret,
            timeout: Duration::from_secs(DEFAULT_OAUTH_TIMEOUT_SECS),
        }),
        (None, None) => None,
        _ => {
            return Err(LoadError::invalid(
                "auth.github_client_id",
                "client id and client secret must be set together",
            ));
        }
    };

    let session_secret = non_blank(auth.session_secret);
    if session_secret
        .as_ref()
        .is_some_and(|secret| secret.len() < MIN_SECRET_LEN)
    {
        return Err(LoadError::invalid(
            "auth.session_secret",
            format!("must be at least {MIN_SECRET_LEN} bytes"),
        ));
    }

    let max_age_days = auth
        .session_max_age_days
        .unwrap_or(DEFAULT_SESSION_MAX_AGE_DAYS);
    if max_age_days == 0 {
        return Err(LoadError::invalid(
            "auth.session_max_age_days",
            "must be greater than zero",
        ));
    }
    let max_age_days = i64::try_from(max_age_days).map_err(|_| {
        LoadError::invalid("auth.session_max_age_days", "value exceeds supported range")
    })?;

    let unknown_provider = match non_blank(auth.unknown_provider).as_deref() {
        None | Some("allow") => UnknownProviderPolicy::Allow,
        Some("deny") => UnknownProviderPolicy::Deny,
        Some(other) => {
            return Err(LoadError::invalid(
                "auth.unknown_provider",
                format!("unknown policy `{other}` (expected allow or deny)"),
            ));
        }
    };

    Ok(AuthSettings {
        github,
        session_secret,
        session_max_age: time::Duration::days(max_age_days),
        secure_cookies: auth
            .secure_cookies
            .unwrap_or(public_url.scheme() == "https"),
        unknown_provider,
    })
}

fn build_page_settings(pages: RawPageSettings) -> Result<PageCacheConfig, LoadError> {
    let revalidate_secs = pages.revalidate_seconds.unwrap_or(DEFAULT_REVALIDATE_SECS);
    let capacity = pages.cache_capacity.unwrap_or(DEFAULT_PAGE_CACHE_CAPACITY);
    let capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("pages.cache_capacity", "must be greater than zero"))?;

    Ok(PageCacheConfig {
        enabled: revalidate_secs > 0,
        revalidate: Duration::from_secs(revalidate_secs),
        capacity,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings { max_request_bytes })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    backend: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCmsSettings {
    project_id: Option<String>,
    dataset: Option<String>,
    api_version: Option<String>,
    token: Option<String>,
    use_cdn: Option<bool>,
    api_host: Option<String>,
    cdn_host: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    github_client_id: Option<String>,
    github_client_secret: Option<String>,
    session_secret: Option<String>,
    session_max_age_days: Option<u64>,
    secure_cookies: Option<bool>,
    unknown_provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPageSettings {
    revalidate_seconds: Option<u64>,
    cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_optional_url(value: Option<String>, key: &'static str) -> Result<Option<Url>, LoadError> {
    non_blank(value)
        .map(|value| Url::parse(&value).map_err(|err| LoadError::invalid(key, err.to_string())))
        .transpose()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
