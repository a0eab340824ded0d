/**
 * API HTTP PINGBOARD - Inventaire REST + canal live WebSocket
 *
 * RÔLE :
 * Surface publique du kernel pour le dashboard et l'éditeur d'inventaire.
 *
 * ROUTES :
 * - GET  /health              : liveness ("ok")
 * - GET  /system/health       : uptime, machines, abonnés, cycles
 * - GET  /api/machines        : inventaire brut {success, data: {machines}}
 * - PUT|POST /api/machines    : remplacement complet de l'inventaire → save + broadcast immédiat
 * - GET  /api/status          : dernier snapshot (null avant le premier cycle)
 * - GET  /ws                  : push des snapshots {machines, ts}
 *
 * Pas d'authentification : outil LAN. CORS ouvert à toutes les origines.
 */

use crate::broadcaster::Broadcaster;
use crate::health::{HealthTracker, KernelHealth};
use crate::inventory::InventoryStore;
use crate::models::{Inventory, MachineRecord, StatusSnapshot};
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

const INVALID_FORMAT: &str = "Invalid data format";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InventoryStore>,
    pub broadcaster: Arc<Broadcaster>,
    pub health_tracker: HealthTracker,
}

/// Enveloppe commune des réponses de l'API inventaire
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Self {
        Self { success: true, data: Some(data), message: None }
    }
}

impl ApiResponse<()> {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, data: None, message: Some(message.into()) }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { success: false, data: None, message: Some(message.into()) }
    }
}

/// Corps attendu pour l'écriture : seule la présence d'une liste `machines` est exigée
#[derive(Debug, Deserialize)]
pub struct InventoryPayload {
    #[serde(default)]
    pub machines: Option<Vec<MachineRecord>>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/machines", get(get_machines).put(put_machines).post(put_machines))
        .route("/api/status", get(get_status))
        .route("/ws", get(live_status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

// GET /api/machines
async fn get_machines(State(app): State<AppState>) -> Json<ApiResponse<Arc<Inventory>>> {
    Json(ApiResponse::data(app.store.current()))
}

// PUT|POST /api/machines
async fn put_machines(
    State(app): State<AppState>,
    payload: Result<Json<InventoryPayload>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse<()>>) {
    let machines = match payload {
        Ok(Json(InventoryPayload { machines: Some(machines) })) => machines,
        Ok(_) => {
            warn!("inventory write rejected: missing machines list");
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::failed(INVALID_FORMAT)));
        }
        Err(rejection) => {
            warn!("inventory write rejected: {rejection}");
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::failed(INVALID_FORMAT)));
        }
    };

    match app.store.save(&Inventory::new(machines)).await {
        Ok(saved) => {
            app.broadcaster.trigger();
            info!(machines = saved.len(), "inventory replaced via API");
            (
                StatusCode::OK,
                Json(ApiResponse::ok("Inventory saved and broadcast triggered")),
            )
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failed(format!("Failed to save inventory: {e}"))),
        ),
    }
}

// GET /api/status
async fn get_status(State(app): State<AppState>) -> Json<Option<Arc<StatusSnapshot>>> {
    Json(app.broadcaster.latest())
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.store, &app.broadcaster))
}

// GET /ws
async fn live_status(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| serve_subscriber(socket, app))
}

async fn serve_subscriber(socket: WebSocket, app: AppState) {
    let session = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = app.broadcaster.hub().subscribe();
    info!(%session, "live client connected");

    // dernier état connu tout de suite, puis un cycle frais
    if let Some(snapshot) = subscription.initial.take() {
        if send_snapshot(&mut sender, &snapshot).await.is_err() {
            info!(%session, "live client disconnected");
            return;
        }
    }
    app.broadcaster.trigger();

    let mut send_task = tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            if send_snapshot(&mut sender, &snapshot).await.is_err() {
                break;
            }
        }
    });

    // le client ne parle pas ; on lit seulement pour voir la fermeture
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut recv_task => {},
    }
    send_task.abort();
    recv_task.abort();
    info!(%session, "live client disconnected");
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &StatusSnapshot,
) -> Result<(), axum::Error> {
    // snapshot illisible : on le saute sans couper le client
    let Some(text) = encode_snapshot(snapshot) else {
        return Ok(());
    };
    sender.send(Message::Text(text.into())).await
}

fn encode_snapshot(snapshot: &StatusSnapshot) -> Option<String> {
    match serde_json::to_string(snapshot) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(ts = snapshot.ts, machines = snapshot.machines.len(), "failed to encode snapshot, not sent: {e}");
            None
        }
    }
}
