//! YouBook API Gateway
//!
//! The HTTP entry point of the autobiography backend.
//! Handles:
//! - Session identity
//! - Request routing to the drafting flows
//! - Image uploads and their static serving
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;
mod uploads;

#[cfg(test)]
mod test_support;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use axum::http::StatusCode;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{signal, sync::oneshot};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uploads::UploadStore;
use youbook_common::{
    auth::SessionKeys,
    config::{AppConfig, ObservabilityConfig},
    db::{schema, DbPool, Repository},
    drafting::Drafting,
    metrics,
    transformer::{create_transformer, ContentTransformer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub drafting: Drafting,
    pub sessions: Arc<SessionKeys>,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: DbPool,
        transformer: Arc<dyn ContentTransformer>,
    ) -> youbook_common::Result<Self> {
        Ok(Self {
            drafting: Drafting::new(Repository::new(db.clone()), transformer),
            sessions: Arc::new(SessionKeys::from_config(&config.auth)?),
            uploads: UploadStore::new(&config.uploads),
            config,
            db,
        })
    }
}

impl FromRef<AppState> for Arc<SessionKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting YouBook API Gateway v{}",
        youbook_common::VERSION
    );

    init_metrics(&config.observability)?;

    let db = DbPool::new(&config.database).await?;
    if config.database.bootstrap_schema {
        schema::create_tables(db.conn()).await?;
    }

    let transformer = create_transformer(&config.transformer)?;
    info!(model = transformer.model_name(), "Content transformer ready");

    let state = AppState::new(config.clone(), db, transformer)?;
    state.uploads.ensure_dir().await?;

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();

    let drain_deadline = config.shutdown_timeout();
    let deadline = async move {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(drain_deadline).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => warn!(
            timeout_secs = drain_deadline.as_secs(),
            "Shutdown deadline reached with requests still in flight"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], config.metrics_port)))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("transaction_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("transform_duration_seconds".to_string()),
            metrics::TRANSFORM_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(port = config.metrics_port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = DefaultBodyLimit::max(state.config.uploads.max_bytes);
    let uploads = ServeDir::new(state.uploads.dir());
    let uploads_prefix = state.uploads.public_prefix().to_string();

    let routes = Router::new()
        // Health endpoints (no session)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Drafting
        .route("/write_process/chatbot", post(handlers::write_process::chatbot))
        .route("/write_process/chatbot2", post(handlers::write_process::chatbot2))
        .route("/write_process/book_reading", post(handlers::write_process::book_reading))
        .route("/write_process/book_reading2", post(handlers::write_process::book_reading2))

        // Interview summaries
        .route("/chatbot/summary", post(handlers::chatbot::summary))
        .route("/chatbot/summary2", post(handlers::chatbot::summary2))

        // Finalization
        .route("/store", post(handlers::store::store))
        .route(
            "/update_image",
            post(handlers::images::update_image).layer(upload_limit),
        )

        // Library
        .route("/books", get(handlers::books::list_books))
        .route("/books/{book_id}", get(handlers::books::get_book))
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests));

    Router::new()
        .merge(routes)
        .nest_service(&uploads_prefix, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors)
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    state.config.request_timeout(),
                )),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
