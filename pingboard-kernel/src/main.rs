/**
 * PINGBOARD KERNEL - Point d'entrée du serveur de statut LAN
 *
 * RÔLE : Orchestration de tous les modules : config, inventaire YAML, moteur de ping,
 * broadcaster, API HTTP + WebSocket. Bootstrap complet avec gestion d'erreurs et logging.
 *
 * ARCHITECTURE : Inventory Store → Probe Engine → Broadcaster → Hub → clients live.
 * Les écritures API et les modifications externes du YAML relancent un cycle.
 */

mod broadcaster;
mod config;
mod health;
mod http;
mod hub;
mod inventory;
mod models;
mod probe;
mod state;

use crate::broadcaster::Broadcaster;
use crate::config::ServerConfig;
use crate::health::HealthTracker;
use crate::http::AppState;
use crate::hub::StatusHub;
use crate::inventory::InventoryStore;
use crate::probe::{ProbeEngine, SystemPing};

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

// un abonné qui a plus de 16 snapshots de retard saute directement au plus récent
const HUB_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pingboard_kernel=info")),
        )
        .init();

    let cfg = ServerConfig::from_env().context("invalid configuration")?;
    info!(
        environment = %cfg.environment,
        yaml = %cfg.yaml_path.display(),
        port = cfg.port,
        interval_ms = cfg.broadcast_interval.as_millis() as u64,
        batch_size = cfg.batch_size,
        probe_timeout_s = cfg.probe_timeout.as_secs(),
        "pingboard kernel starting"
    );

    // inventaire : chargé tout de suite, vide si absent/invalide
    let store = InventoryStore::open(&cfg.yaml_path).await;
    info!(path = %store.path().display(), machines = store.current().len(), "inventory ready");

    // moteur de ping + broadcaster (premier cycle immédiat)
    let engine = ProbeEngine::new(Arc::new(SystemPing), cfg.batch_size, cfg.probe_timeout);
    let broadcaster = Broadcaster::new(store.clone(), engine, StatusHub::new(HUB_CAPACITY));
    broadcaster.spawn(cfg.broadcast_interval);

    // modifications externes du YAML → rechargement + cycle
    let on_change = broadcaster.clone();
    store.spawn_change_watcher(cfg.watch_interval, move || on_change.trigger());

    let app_state = AppState {
        store,
        broadcaster,
        health_tracker: HealthTracker::new(),
    };
    let app = http::build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on http://{addr}");

    axum::serve(listener, app).await.context("HTTP server error")?;
    Ok(())
}
