use anyhow::Context;
use bazaar_api::{app, AppState, AuthConfig};
use bazaar_carrier::GhnClient;
use bazaar_core::{CarrierGateway, LogSink, NotificationSink};
use bazaar_order::{MockCarrierGateway, ReturnWorkflow, ShipmentSynchronizer};
use bazaar_store::{
    Config, DbClient, PgReturnRepository, PgShipmentRepository, PgVendorOrderRepository,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_api=debug,bazaar_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Bazaar API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(config.database.url.expose(), config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let orders = Arc::new(PgVendorOrderRepository::new(db.pool.clone()));
    let shipments = Arc::new(PgShipmentRepository::new(db.pool.clone()));
    let returns = Arc::new(PgReturnRepository::new(db.pool.clone()));

    // Carrier
    let carrier: Arc<dyn CarrierGateway> = if config.carrier.mock {
        tracing::warn!("carrier.mock is set; shipments will not reach GHN");
        Arc::new(MockCarrierGateway::new())
    } else {
        Arc::new(GhnClient::new(config.carrier.ghn_settings()).context("Failed to build GHN client")?)
    };

    let notifier = notification_sink(&config)?;

    let app_state = AppState {
        synchronizer: Arc::new(ShipmentSynchronizer::new(
            carrier,
            orders.clone(),
            shipments,
            notifier.clone(),
        )),
        returns: Arc::new(ReturnWorkflow::new(orders, returns, notifier)),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        webhook_token: config.carrier.webhook_token.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn notification_sink(config: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = bazaar_store::EventProducer::new(&kafka.brokers, &kafka.topic_prefix)
                .context("Failed to create Kafka producer")?;
            Ok(Arc::new(producer))
        }
        None => Ok(Arc::new(LogSink)),
    }
}

#[cfg(not(feature = "kafka"))]
fn notification_sink(config: &Config) -> anyhow::Result<Arc<dyn NotificationSink>> {
    if config.kafka.is_some() {
        tracing::warn!("[kafka] is configured but this build has no kafka feature; notifications are logged only");
    }
    Ok(Arc::new(LogSink))
}
