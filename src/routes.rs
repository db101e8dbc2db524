//! HTTP endpoints: the inbound-email hook and a read-only code listing.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::pipeline::{EmailIntake, InboundEmail, IntakeOutcome};
use crate::store::Database;

const DEFAULT_CODE_LIMIT: usize = 50;
const MAX_CODE_LIMIT: usize = 500;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<EmailIntake>,
    pub db: Arc<dyn Database>,
}

/// Build the Axum router.
pub fn app_routes(intake: Arc<EmailIntake>, db: Arc<dyn Database>) -> Router {
    let state = AppState { intake, db };

    Router::new()
        .route("/health", get(health))
        .route("/api/inbound", post(inbound))
        .route("/api/codes", get(list_codes))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "code-inbox"
    }))
}

// ── Inbound ─────────────────────────────────────────────────────────────

async fn inbound(
    State(state): State<AppState>,
    Json(email): Json<InboundEmail>,
) -> impl IntoResponse {
    if email.message_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "message_id is required"})),
        );
    }

    info!(id = %email.message_id, "inbound email received");
    let outcome = state.intake.process(&email).await;

    let status = if outcome.is_rejected() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(outcome_body(&email.message_id, outcome)))
}

fn outcome_body(message_id: &str, outcome: IntakeOutcome) -> serde_json::Value {
    let mut body = serde_json::json!({
        "message_id": message_id,
        "outcome": outcome.label(),
    });
    if let IntakeOutcome::Stored { notified } = outcome {
        body["notified"] = serde_json::json!(notified);
    }
    body
}

// ── Codes ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CodesQuery {
    limit: Option<usize>,
}

async fn list_codes(
    State(state): State<AppState>,
    Query(query): Query<CodesQuery>,
) -> impl IntoResponse {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_CODE_LIMIT)
        .clamp(1, MAX_CODE_LIMIT);

    match state.db.recent_codes(limit).await {
        Ok(codes) => (StatusCode::OK, Json(serde_json::json!(codes))),
        Err(e) => {
            error!(error = %e, "failed to list codes");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "storage unavailable"})),
            )
        }
    }
}
