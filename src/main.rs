use std::{path::Path, process, sync::Arc};

use icelog::{
    application::{
        auth::TokenAuthority,
        error::AppError,
        readings::{ReadingService, import_rows},
    },
    cache::{CacheAside, CacheConfig},
    config,
    infra::{
        db::SqliteRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use secrecy::ExposeSecret;
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Import(args) => run_import(settings, &args.file).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    let cache = CacheAside::connect(
        settings.cache.url.as_ref().map(|url| url.expose_secret()),
        CacheConfig::from(&settings.cache),
    )
    .await;
    if cache.is_enabled() {
        match cache.ping().await {
            Ok(()) => info!(target = "icelog::serve", "cache backend reachable"),
            Err(err) => warn!(
                target = "icelog::serve",
                error = %err,
                "cache ping failed; reads fall through to the database"
            ),
        }
    }
    let auth = settings.auth.secret.as_ref().filter(|_| settings.auth.enabled).map(|secret| {
        Arc::new(TokenAuthority::new(
            secret.expose_secret().as_bytes(),
            token_ttl(&settings.auth),
        ))
    });

    let cache_enabled = cache.is_enabled();
    let state = HttpState {
        readings: ReadingService::new(Arc::new(repositories.clone())),
        cache,
        auth,
        db: repositories.clone(),
    };
    let router = http::build_router(state, settings.server.cors_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|source| InfraError::Bind {
            addr: settings.server.addr,
            source,
        })?;

    info!(
        target = "icelog::serve",
        addr = %settings.server.addr,
        cache_enabled,
        auth_enabled = settings.auth.enabled,
        "listening"
    );

    let result = http::serve(listener, router, settings.server.graceful_shutdown).await;

    repositories.close().await;
    info!(target = "icelog::serve", "database pool closed");

    result.map_err(AppError::from)
}

async fn run_import(settings: config::Settings, path: &Path) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;

    info!(
        target = "icelog::import",
        path = %path.display(),
        "Starting import"
    );

    let raw = tokio::fs::read(path).await.map_err(InfraError::from)?;
    let document: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|err| InfraError::import(format!("{}: {err}", path.display())))?;

    let service = ReadingService::new(Arc::new(repositories.clone()));
    let result = service.import(import_rows(document)).await;
    repositories.close().await;

    let inserted = result?;
    info!(
        target = "icelog::import",
        rows = inserted.len(),
        "Import completed"
    );
    Ok(())
}

async fn init_repositories(settings: &config::Settings) -> Result<SqliteRepositories, AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::unexpected("database.url is not configured"))?;

    let pool = SqliteRepositories::connect(
        url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| InfraError::open_database(redact_url(url), err))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::Migration)?;

    Ok(SqliteRepositories::new(pool))
}

fn token_ttl(auth: &config::AuthSettings) -> time::Duration {
    time::Duration::try_from(auth.token_ttl).unwrap_or(time::Duration::HOUR)
}

/// Drop any query string so connection options never reach the logs.
fn redact_url(url: &str) -> String {
    url.split_once('?')
        .map_or(url, |(base, _)| base)
        .to_string()
}
