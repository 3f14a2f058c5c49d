//! Component wiring and the serve loop.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;

use clawguard_core::approval::{ApprovalCoordinator, PendingRegistry};
use clawguard_core::audit::AuditStore;
use clawguard_core::guard;
use clawguard_core::notify::{ChatTransport, Notifier};
use clawguard_core::services::{self, ServiceTable};
use clawguard_server::{build_router, AppState, GatewaySettings};
use clawguard_telegram::{run_update_loop, TelegramClient, TelegramTransport};

use crate::config_file;

/// Bring the gateway up and serve until SIGINT/SIGTERM.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = config_file::load(config_path)?;

    let store = Arc::new(AuditStore::new(&config.audit.db_path)?);

    // Bootstrap services were validated at load; persisted overrides
    // are re-checked here and skipped (with a warning) when the
    // current security policy no longer admits them.
    let table = Arc::new(ServiceTable::new(config.services.clone()));
    let applied = services::load_overrides(&table, &store, &config.security)?;
    if applied > 0 {
        tracing::info!(applied, "applied persisted service overrides");
    }

    if config.security.dns_check {
        for service in &config.services {
            guard::advisory_dns_check(service.upstream_host()).await;
        }
    }

    let pending = Arc::new(PendingRegistry::new());
    let telegram = Arc::new(TelegramClient::new(config.telegram.bot_token.clone()));
    let transport: Arc<dyn ChatTransport> =
        Arc::new(TelegramTransport::new(Arc::clone(&telegram)));
    let notifier = Arc::new(Notifier::new(
        transport,
        Arc::clone(&store),
        Arc::clone(&pending),
        config.telegram.pairing.clone(),
        config.telegram.chat_id,
    ));
    let coordinator = Arc::new(ApprovalCoordinator::new(
        Arc::clone(&notifier),
        Arc::clone(&store),
        pending,
        Duration::from_secs(config.approvals.pipeline_timeout_secs),
    ));
    let hydrated = coordinator.hydrate()?;
    if hydrated > 0 {
        tracing::info!(hydrated, "restored live grants from the audit store");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = if config.telegram.bot_token.is_empty() {
        tracing::warn!("no telegram bot token configured; approval prompts will fail closed");
        None
    } else {
        Some(tokio::spawn(run_update_loop(
            telegram,
            Arc::clone(&notifier),
            shutdown_rx,
            config.telegram.poll_timeout_secs,
        )))
    };

    let settings = GatewaySettings::from_config(&config);
    let state = AppState::new(table, coordinator, store, settings)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.listen.host, config.listen.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        version = env!("CARGO_PKG_VERSION"),
        "clawguard listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the notifier's polling; the audit store closes when the
    // last reference drops.
    let _ = shutdown_tx.send(true);
    if let Some(poller) = poller {
        let _ = tokio::time::timeout(Duration::from_secs(5), poller).await;
    }
    tracing::info!("clawguard stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    #[cfg(not(unix))]
    ctrl_c.await;

    tracing::info!("shutdown signal received");
}
