//! Studio Backend - library for app logic and testing

pub mod cdn;
pub mod config;
pub mod contact;
pub mod crud;
pub mod db;
pub mod error;
pub mod errorlog;
pub mod fetcher;
pub mod gate;
pub mod gateway;
pub mod intake;
pub mod logging;
pub mod panel;
pub mod portfolio;
pub mod routes;
pub mod session;
pub mod state;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::db::models::{BlogPost, Lead, PlanningSession, PortfolioImage, Project};
use crate::error::StartupError;
use crate::routes::admin;
use crate::state::AppState;

const PLANNER_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// CORS for the configured front-end origins. Origins that are not valid
/// header values are skipped.
pub fn configure_cors(config: &AppConfig) -> CorsLayer {
    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config);
    tracing::info!(origins = ?state.config.allowed_origins, "CORS configured");

    Router::new()
        .route("/api/logs", post(routes::logs::receive_client_logs))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/verify", post(routes::auth::verify_token))
        .route("/api/auth/refresh", post(routes::auth::refresh_token))
        .route("/api/auth/logout", post(routes::auth::logout))
        // Public site
        .route("/api/contact", post(routes::contact::submit))
        .route("/api/gallery/unlock", post(routes::gallery::unlock))
        .route("/api/portfolio", get(routes::portfolio::list_public))
        .route("/api/blog", get(routes::blog::list_posts))
        .route("/api/blog/{slug}", get(routes::blog::get_post))
        .route("/rss.xml", get(routes::rss::rss_feed))
        .route("/api/planner", post(routes::planner::start))
        .route("/api/planner/{id}", get(routes::planner::get_session))
        .route("/api/planner/{id}/answers", post(routes::planner::answer))
        // Admin console
        .route(
            "/api/admin/leads",
            get(admin::list::<Lead>).post(admin::create::<Lead>),
        )
        .route("/api/admin/leads/{id}", patch(admin::update::<Lead>))
        .route(
            "/api/admin/leads/{id}/notes",
            get(routes::leads::list_notes).post(routes::leads::create_note),
        )
        .route(
            "/api/admin/images",
            get(admin::list::<PortfolioImage>).post(admin::create::<PortfolioImage>),
        )
        .route("/api/admin/images/reorder", post(routes::portfolio::reorder))
        .route(
            "/api/admin/images/{id}",
            patch(admin::update::<PortfolioImage>).delete(admin::delete::<PortfolioImage>),
        )
        .route(
            "/api/admin/posts",
            get(admin::list::<BlogPost>).post(admin::create::<BlogPost>),
        )
        .route(
            "/api/admin/posts/{id}",
            patch(admin::update::<BlogPost>).delete(admin::delete::<BlogPost>),
        )
        .route(
            "/api/admin/projects",
            get(admin::list::<Project>).post(admin::create::<Project>),
        )
        .route(
            "/api/admin/projects/{id}",
            patch(admin::update::<Project>).delete(admin::delete::<Project>),
        )
        .route(
            "/api/admin/planning-sessions",
            get(admin::list::<PlanningSession>),
        )
        .route("/api/admin/analytics", get(routes::analytics::summary))
        .route(
            "/api/admin/errors",
            get(routes::errors::list_errors).delete(routes::errors::clear_errors),
        )
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            logging::middleware::log_request,
        ))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        // 2 MB body cap
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Drops idle planner conversations until `shutdown` fires.
fn spawn_planner_pruning(state: &AppState, shutdown: CancellationToken) {
    let planner = state.planner.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PLANNER_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let dropped = planner.prune().await;
                    if dropped > 0 {
                        tracing::debug!(dropped, "pruned idle planner sessions");
                    }
                }
            }
        }
    });
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for shutdown signal");
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}

/// Run the server (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    // The subscriber needs the environment before the rest of the config
    // is validated, so failures below are logged too.
    let environment =
        std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let _log_guards = logging::init(&environment);

    let (config, warnings) = AppConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
    })?;
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    let gateway = gateway::connect(&config.backend).await?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| StartupError::Address(format!("{}:{}", config.host, config.port)))?;

    let state = AppState::new(config, gateway);
    let shutdown = CancellationToken::new();
    spawn_planner_pruning(&state, shutdown.clone());

    let app = create_app(state);
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app, send, test_state};
    use axum::http::StatusCode;

    async fn allow_origin_for(app: Router, origin: &str) -> Option<String> {
        use axum::body::Body;
        use axum::http::{header, Request};
        use tower::ServiceExt;

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_allows_only_configured_origins() {
        let (state, gw) = test_state();
        let mut config = (*state.config).clone();
        config.allowed_origins = vec!["https://studio.test".into(), "bad\norigin".into()];
        let state = AppState::new(config, gw);

        assert_eq!(
            allow_origin_for(app(state.clone()), "https://studio.test").await.as_deref(),
            Some("https://studio.test")
        );
        assert_eq!(allow_origin_for(app(state), "https://elsewhere.test").await, None);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (state, _) = test_state();
        let (status, _) = send(app(state), Method::GET, "/api/nope", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_routes_require_a_token() {
        let (state, _) = test_state();
        for uri in [
            "/api/admin/leads",
            "/api/admin/images",
            "/api/admin/posts",
            "/api/admin/projects",
            "/api/admin/planning-sessions",
            "/api/admin/analytics",
            "/api/admin/errors",
        ] {
            let (status, _) = send(app(state.clone()), Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_rss_is_served() {
        let (state, _) = test_state();
        let (status, body) = send(app(state), Method::GET, "/rss.xml", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&body).contains("<rss version=\"2.0\""));
    }
}
