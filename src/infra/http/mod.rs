//! HTTP surface: router assembly, shared state and the server loop.

mod auth;
pub mod error;
mod middleware;
mod readings;

pub use middleware::REQUEST_ID_HEADER;
pub use readings::COLLECTION_PATH;

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use icelog_api_types::HealthBody;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::application::{
    auth::TokenAuthority, error::ErrorReport, readings::ReadingService,
};
use crate::cache::CacheAside;
use crate::infra::{db::SqliteRepositories, error::InfraError};

/// Batch imports may carry up to 1000 rows; other routes keep axum's default.
pub const BATCH_BODY_LIMIT: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpState {
    pub readings: ReadingService,
    pub cache: CacheAside,
    /// `None` leaves every route open.
    pub auth: Option<Arc<TokenAuthority>>,
    pub db: SqliteRepositories,
}

pub fn build_router(state: HttpState, cors_origin: Option<&str>) -> Router {
    let mut api = Router::new()
        .route(
            COLLECTION_PATH,
            get(readings::list_readings).post(readings::create_reading),
        )
        .route(
            "/api/ice-data/batch",
            post(readings::import_readings).layer(DefaultBodyLimit::max(BATCH_BODY_LIMIT)),
        )
        .route("/api/ice-data/stats", get(readings::reading_stats))
        .route(
            "/api/ice-data/{id}",
            get(readings::get_reading)
                .put(readings::update_reading)
                .delete(readings::delete_reading),
        );
    if state.auth.is_some() {
        api = api.route("/api/refresh-token", post(auth::refresh_token));
    }
    let api = api.route_layer(axum_middleware::from_fn_with_state(
        state.clone(),
        middleware::authenticate,
    ));

    let router = Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context));

    match cors_origin.and_then(cors_layer) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin) {
        Ok(origin) => origin,
        Err(err) => {
            warn!(
                target = "icelog::http",
                origin,
                error = %err,
                "ignoring invalid CORS origin"
            );
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .allow_credentials(true),
    )
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.db.health_check().await {
        Ok(()) => Json(HealthBody {
            status: "ok".to_string(),
        })
        .into_response(),
        Err(err) => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthBody {
                    status: "unavailable".to_string(),
                }),
            )
                .into_response();
            ErrorReport::from_error("infra::http::health", StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}

/// Serve until SIGINT/SIGTERM, then let in-flight requests drain for at
/// most `grace`.
pub async fn serve(listener: TcpListener, router: Router, grace: Duration) -> Result<(), InfraError> {
    let (notify_tx, notify_rx) = tokio::sync::oneshot::channel::<()>();

    let server = async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = notify_tx.send(());
            })
            .await
    };

    let drain_deadline = async move {
        if notify_rx.await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => result.map_err(InfraError::from),
        () = drain_deadline => {
            warn!(
                target = "icelog::http",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "icelog::http", error = %err, "failed to listen for ctrl-c");
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
                warn!(target = "icelog::http", error = %err, "failed to listen for SIGTERM");
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

    info!(target = "icelog::http", "shutdown signal received");
}
