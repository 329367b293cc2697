//! Txanda Coordinator Server - queue interface and admin control surface

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use txanda_adapters::{InMemoryHistoryStore, InMemoryQueueStore, SystemClock};
use txanda_core::{CoordinatorError, SessionId};
use txanda_modules::{AdminSurface, LivenessMonitor, SchedulerError, TurnScheduler};

mod config;
use config::ServerConfig;

type AppScheduler = TurnScheduler<InMemoryQueueStore, InMemoryHistoryStore, SystemClock>;
type AppAdmin = AdminSurface<InMemoryQueueStore, InMemoryHistoryStore, SystemClock>;

#[derive(Clone)]
struct AppState {
    scheduler: AppScheduler,
    admin: Arc<AppAdmin>,
    admin_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;
    info!("Starting txanda coordinator server");

    // Wire the in-memory adapters; the coordinator instance here runs in
    // monitor mode and never collects telemetry itself.
    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemoryQueueStore::new(clock.clone()));
    let history = Arc::new(InMemoryHistoryStore::new());

    let scheduler = TurnScheduler::new(
        store.clone(),
        history.clone(),
        clock,
        None,
        config.scheduler_config(),
    );
    scheduler.start().await?;

    let monitor = LivenessMonitor::new(scheduler.clone(), config.monitor_config());
    monitor.start().await;

    let admin = Arc::new(AdminSurface::new(
        scheduler.clone(),
        store.clone(),
        history.clone(),
    ));

    let app_state = AppState {
        scheduler,
        admin,
        admin_token: config.admin_token.clone(),
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/queue", get(queue_status))
        .route("/api/v1/queue/join", post(join_queue))
        .route("/api/v1/queue/{session_id}", delete(leave_queue))
        .route("/api/v1/admin/skip", post(admin_skip))
        .route("/api/v1/admin/remove/{session_id}", post(admin_remove))
        .route("/api/v1/admin/reset", post(admin_reset))
        .route("/api/v1/history", get(admin_history))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Coordinator listening on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    monitor.stop().await;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "txanda-server",
    }))
}

async fn queue_status(
    State(state): State<AppState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let snapshot = state.scheduler.queue_snapshot().await.map_err(api_error)?;
    let now = Utc::now();

    let active = snapshot.active.as_ref().map(|slot| {
        json!({
            "session_id": slot.session_id,
            "start_time": slot.start_time,
            "end_time": slot.end_time,
            "remaining_ms": slot.remaining_time(now).as_millis() as u64,
        })
    });

    Ok(Json(json!({
        "active": active,
        "waiting": snapshot.waiting,
        "queue_length": snapshot.queue_length,
    })))
}

#[derive(Deserialize)]
struct JoinRequest {
    session_id: Option<String>,
}

async fn join_queue(
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let session_id = request
        .session_id
        .map(SessionId::new)
        .unwrap_or_else(SessionId::generate);

    let entry = state
        .scheduler
        .join(&session_id)
        .await
        .map_err(api_error)?;

    Ok(Json(json!({
        "session_id": entry.session_id,
        "joined_at": entry.joined_at,
        "position": entry.position,
    })))
}

async fn leave_queue(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let removed = state
        .scheduler
        .leave(&SessionId::new(session_id))
        .await
        .map_err(api_error)?;

    if removed {
        Ok(Json(json!({"removed": true})))
    } else {
        Err((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "session not waiting"})),
        ))
    }
}

async fn admin_skip(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    let skipped = state.admin.skip().await.map_err(api_error)?;
    Ok(Json(json!({"skipped": skipped})))
}

async fn admin_remove(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    let removed = state
        .admin
        .remove(&SessionId::new(session_id))
        .await
        .map_err(api_error)?;
    Ok(Json(json!({"removed": removed})))
}

#[derive(Deserialize)]
struct ResetParams {
    #[serde(default)]
    history: bool,
}

async fn admin_reset(
    State(state): State<AppState>,
    Query(params): Query<ResetParams>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    if params.history {
        state.admin.reset_queue_and_history().await.map_err(api_error)?;
    } else {
        state.admin.reset_queue_only().await.map_err(api_error)?;
    }
    Ok(Json(json!({"reset": true, "history": params.history})))
}

async fn admin_history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorize(&state, &headers)?;
    let summaries = state.admin.history().await.map_err(api_error)?;

    let entries: Vec<Value> = summaries
        .into_iter()
        .map(|(id, summary)| json!({"id": id, "summary": summary}))
        .collect();
    Ok(Json(json!({"summaries": entries})))
}

/// Static-token gate for administrative routes; unset token disables the
/// gate. Core queue paths never require authorization.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({"error": "permission denied"})),
        ))
    }
}

/// Map scheduler failures onto the shared error taxonomy and HTTP codes.
fn api_error(err: SchedulerError) -> (StatusCode, Json<Value>) {
    let err = CoordinatorError::from(err);
    let status = match &err {
        CoordinatorError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoordinatorError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        CoordinatorError::NotFound(_) => StatusCode::NOT_FOUND,
        CoordinatorError::Conflict(_) => StatusCode::CONFLICT,
        CoordinatorError::InvalidRecord { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(json!({"error": err.to_string()})))
}
