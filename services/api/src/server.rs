use crate::cli::ServeArgs;
use crate::infra::{
    seed_entities, AppState, InMemoryEntityRepository, InMemoryNotificationPublisher,
};
use crate::routes::with_console_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Utc;
use entity_lifecycle::config::AppConfig;
use entity_lifecycle::console::ConsoleService;
use entity_lifecycle::error::AppError;
use entity_lifecycle::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let repository = Arc::new(InMemoryEntityRepository::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let console = Arc::new(ConsoleService::with_tier_policy(
        repository,
        notifier,
        config.tiers.clone(),
    ));

    if args.seed {
        for entity in seed_entities(Utc::now()) {
            console.register(entity)?;
        }
    }

    let app = with_console_routes(console)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, seeded = args.seed, "entity lifecycle console ready");

    axum::serve(listener, app).await?;
    Ok(())
}
