use std::{process, sync::Arc, time::Duration};

use blogers::{
    application::{
        error::AppError,
        repos::{RepoError, Repositories},
    },
    config::{self, StoreSettings},
    infra::{
        cms::{CmsClient, CmsOptions, CmsStore},
        error::InfraError,
        http::{self, HttpOptions, RouterState},
        memory::MemoryStore,
        oauth::{GithubOAuth, GithubOptions},
        session::{SessionCodec, cookie_key},
        telemetry,
    },
};
use tokio::{net::TcpListener, sync::Notify};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::TrustAuthor(args) => run_trust_author(settings, args).await,
    }
}

fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    match &settings.store {
        StoreSettings::Memory => {
            warn!("using the in-memory content store; content is lost on restart");
            Ok(Repositories::from_store(Arc::new(MemoryStore::new())))
        }
        StoreSettings::Cms(cms) => {
            let client = CmsClient::new(CmsOptions {
                project_id: cms.project_id.clone(),
                dataset: cms.dataset.clone(),
                api_version: cms.api_version.clone(),
                token: cms.token.clone(),
                use_cdn: cms.use_cdn,
                api_host: cms.api_host.clone(),
                cdn_host: cms.cdn_host.clone(),
                image_host: None,
                timeout: cms.timeout,
            })
            .map_err(|err| InfraError::configuration(format!("invalid cms settings: {err}")))?;
            if cms.token.is_none() {
                warn!("no cms token configured; sign-ins and content writes will fail");
            }
            info!(
                project_id = %cms.project_id,
                dataset = %cms.dataset,
                use_cdn = cms.use_cdn,
                "using the cms content store"
            );
            Ok(Repositories::from_store(Arc::new(CmsStore::new(client))))
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repos = init_repositories(&settings)?;

    let key = cookie_key(settings.auth.session_secret.as_deref())
        .ok_or_else(|| InfraError::configuration("auth.session_secret is too short"))?;
    if settings.auth.session_secret.is_none() {
        warn!("no auth.session_secret configured; sessions end when the server restarts");
    }
    let sessions = SessionCodec::new(
        key,
        settings.auth.session_max_age,
        settings.auth.secure_cookies,
    );

    let github = match &settings.auth.github {
        Some(github) => {
            let redirect_uri = settings
                .server
                .public_url
                .join("api/auth/callback/github")
                .map_err(|err| InfraError::configuration(format!("invalid public url: {err}")))?;
            let client = GithubOAuth::new(GithubOptions {
                client_id: github.client_id.clone(),
                client_secret: github.client_secret.clone(),
                redirect_uri,
                web_base: None,
                api_base: None,
                timeout: github.timeout,
            })
            .map_err(|err| InfraError::configuration(format!("invalid github settings: {err}")))?;
            Some(client)
        }
        None => {
            warn!("github sign-in disabled: no client credentials configured");
            None
        }
    };

    let state = RouterState::new(
        &repos,
        HttpOptions {
            sessions,
            github,
            unknown_provider: settings.auth.unknown_provider,
            pages: settings.pages,
            upload_limit: usize::try_from(settings.uploads.max_request_bytes.get())
                .unwrap_or(usize::MAX),
        },
    );
    let router = http::build_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        addr = %settings.server.addr,
        public_url = %settings.server.public_url,
        page_cache = settings.pages.enabled,
        "listening"
    );

    serve_until_shutdown(listener, router, settings.server.graceful_shutdown).await
}

async fn serve_until_shutdown(
    listener: TcpListener,
    router: axum::Router,
    grace: Duration,
) -> Result<(), AppError> {
    let stop = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let stop = Arc::clone(&stop);
        async move { stop.notified().await }
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server => return server_result(joined),
        () = shutdown_signal() => {
            info!(grace_secs = grace.as_secs(), "shutdown requested; draining connections");
            stop.notify_one();
        }
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!("graceful shutdown timed out; dropping open connections");
            server.abort();
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

async fn run_trust_author(
    settings: config::Settings,
    args: config::TrustAuthorArgs,
) -> Result<(), AppError> {
    if matches!(settings.store, StoreSettings::Memory) {
        return Err(AppError::validation(
            "trust-author needs the cms store; the in-memory store starts empty",
        ));
    }

    let repos = init_repositories(&settings)?;
    let trusted = !args.revoke;
    match repos.authors.set_trusted(args.email.trim(), trusted).await {
        Ok(author) => {
            info!(
                author_id = %author.id,
                email = %author.email,
                trusted = author.trusted,
                "author trust updated"
            );
            Ok(())
        }
        Err(RepoError::NotFound) => Err(AppError::validation(format!(
            "no author with email {}",
            args.email.trim()
        ))),
        Err(err) => Err(AppError::from(err)),
    }
}
