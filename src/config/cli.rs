use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Blogers binary.
#[derive(Debug, Parser)]
#[command(name = "blogers", version, about = "Blogers community blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BLOGERS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Mark an author as trusted, or revoke trust with --revoke.
    #[command(name = "trust-author")]
    TrustAuthor(TrustAuthorArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct TrustAuthorArgs {
    #[command(flatten)]
    pub store: StoreOverrides,

    /// Email address of the author.
    #[arg(value_name = "EMAIL")]
    pub email: String,

    /// Clear the trusted flag instead of setting it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub revoke: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StoreOverrides {
    /// Override the content store backend (cms|memory).
    #[arg(long = "store-backend", value_name = "BACKEND")]
    pub store_backend: Option<String>,

    /// Override the CMS project id.
    #[arg(long = "cms-project-id", value_name = "ID")]
    pub cms_project_id: Option<String>,

    /// Override the CMS dataset.
    #[arg(long = "cms-dataset", value_name = "NAME")]
    pub cms_dataset: Option<String>,

    /// Override the CMS write token.
    #[arg(long = "cms-token", value_name = "TOKEN")]
    pub cms_token: Option<String>,

    /// Toggle CDN reads.
    #[arg(
        long = "cms-use-cdn",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cms_use_cdn: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub store: StoreOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the externally visible base URL.
    #[arg(long = "server-public-url", value_name = "URL")]
    pub server_public_url: Option<String>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Policy for sign-ins from providers without author reconciliation (allow|deny).
    #[arg(long = "auth-unknown-provider", value_name = "POLICY")]
    pub auth_unknown_provider: Option<String>,

    /// Override the page revalidation window; zero disables the page cache.
    #[arg(long = "pages-revalidate-seconds", value_name = "SECONDS")]
    pub pages_revalidate_seconds: Option<u64>,

    /// Override the number of cached pages.
    #[arg(long = "pages-cache-capacity", value_name = "COUNT")]
    pub pages_cache_capacity: Option<usize>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,
}
