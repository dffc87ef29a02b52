use queuedeck::api;
use queuedeck::config;
use queuedeck::db;
use queuedeck::telemetry;

use queuedeck::engine::{BullConnector, ConnectionRegistry};
use queuedeck::repo::PgDescriptorRepo;
use queuedeck::ControlPlane;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env()?;
    telemetry::init_tracing(cfg.log_json);

    info!(
        admin = cfg.admin_addr.as_deref().unwrap_or("disabled"),
        key_prefix = %cfg.key_prefix,
        dashboard_concurrency = cfg.dashboard_concurrency,
        migrate_on_startup = cfg.migrate_on_startup,
        redis_connect_timeout_ms = cfg.redis_connect_timeout.as_millis() as u64,
        "queuedeck starting"
    );

    let pool = db::make_pool(&cfg).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let registry = ConnectionRegistry::startup();
    let connector = BullConnector::new(
        registry.clone(),
        cfg.key_prefix.clone(),
        cfg.redis_connect_timeout,
    );
    let control = ControlPlane::new(
        Arc::new(PgDescriptorRepo::new(pool.clone())),
        Arc::new(connector),
        cfg.dashboard_concurrency,
    );

    let shutdown = CancellationToken::new();

    // ---- API task ----
    let app = api::router(api::ApiState {
        control,
        shutdown: shutdown.clone(),
    });
    let mut api_handle = {
        let addr = cfg.admin_addr.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Some(addr) = addr {
                let listener = tokio::net::TcpListener::bind(&addr).await?;
                info!(%addr, "admin api listening");
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await?;
            } else {
                shutdown.cancelled().await;
            }
            Ok::<(), anyhow::Error>(())
        })
    };

    tokio::select! {
        res = &mut api_handle => res??,
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("shutdown requested");
            shutdown.cancel();
            api_handle.await??;
        }
    }

    let dropped = registry.shutdown();
    pool.close().await;
    info!(connections_dropped = dropped, "queuedeck stopped");

    Ok(())
}
