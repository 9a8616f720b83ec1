use crate::cli::ServeArgs;
use crate::infra::{load_users, AppState, LocalMediaStore, StaticSessionVerifier, SurveyBackend};
use crate::routes::with_survey_routes;
use axum::extract::DefaultBodyLimit;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use field_survey::config::AppConfig;
use field_survey::error::AppError;
use field_survey::surveys::SessionHandle;
use field_survey::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let backend = SurveyBackend::new(LocalMediaStore::new(&config.media));
    if let Some(path) = args.seed.take() {
        let users = load_users(&path)?;
        info!(count = users.len(), path = %path.display(), "loaded field users");
        backend.store.add_users(users)?;
    }

    let verifier = StaticSessionVerifier::from_config(&config.auth);
    if verifier.is_empty() {
        warn!("no session tokens configured; authenticated routes will answer 401");
    }
    let sessions: SessionHandle = Arc::new(verifier);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        media: backend.media.clone(),
    };

    let app = with_survey_routes(&backend)
        .layer(DefaultBodyLimit::max(config.media.max_upload_bytes))
        .layer(Extension(sessions))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        media_root = %config.media.root.display(),
        "field survey service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
