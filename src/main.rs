use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::{
    signal,
    sync::{mpsc, watch},
};
use tracing::{error, info, warn};

use pharmacy_order_api as api;
use api::message_queue::{AmqpBroker, DelayedBroker, InMemoryBroker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    api::handlers::health::init_start_time();

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    let cache = api::cache::CacheFactory::create_cache(&cfg)
        .await
        .context("failed to initialize cache")?;

    let broker: Arc<dyn DelayedBroker> = if cfg.uses_amqp() {
        info!("Using AMQP broker");
        Arc::new(
            AmqpBroker::connect(&cfg.amqp_url)
                .await
                .context("failed to connect to AMQP broker")?,
        )
    } else {
        warn!("Using in-memory broker; delayed transitions do not survive a restart");
        Arc::new(InMemoryBroker::new())
    };

    // Init events
    let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    let services = api::handlers::AppServices::new(
        db_arc.clone(),
        &cfg,
        cache.clone(),
        broker.clone(),
        event_sender,
    );
    services
        .scheduler
        .init()
        .await
        .context("failed to declare delayed topics")?;

    // Background consumers for the delayed status transitions
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumers: Vec<_> =
        api::workers::status_consumers(&services.order_status, broker, &cfg)
            .into_iter()
            .map(|consumer| consumer.spawn(shutdown_rx.clone()))
            .collect();

    let app_state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        services,
        cache,
    };
    let app = api::app_router(app_state);

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address '{}'", cfg.host))?;
    let addr = SocketAddr::from((host, cfg.port));
    info!("pharmacy-order-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, draining consumers");
    let _ = shutdown_tx.send(true);
    for handle in consumers {
        if let Err(e) = handle.await {
            error!("Status consumer task failed: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
