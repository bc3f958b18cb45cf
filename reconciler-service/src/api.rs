use crate::ach_callback::{AchCallbackHandler, CallbackOutcome};
use crate::card_webhook::CardWebhookHandler;
use crate::intake::{IntakeOutcome, OrderIntake};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use shared::*;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<OrderIntake>,
    pub ach_callback: Arc<AchCallbackHandler>,
    pub card_webhook: Arc<CardWebhookHandler>,
}

#[derive(Debug, Deserialize)]
pub struct AchCallbackQuery {
    #[serde(alias = "ChkID", default)]
    pub check_id: Option<String>,
    #[serde(alias = "TransID", default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/orders/create", post(order_created))
        .route("/webhooks/ach/callback", get(ach_callback).post(ach_callback))
        .route("/webhooks/card", post(card_webhook))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn order_created(
    State(state): State<AppState>,
    payload: Result<Json<CommerceOrder>, JsonRejection>,
) -> Result<Json<IntakeOutcome>, ApiError> {
    let Json(order) = payload.map_err(|e| {
        tracing::warn!("Rejecting order webhook: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.body_text())
    })?;
    if let Err(e) = order.validate() {
        tracing::warn!(order_id = order.id, "Rejecting invalid order: {e:#}");
        return Err(api_error(StatusCode::BAD_REQUEST, format!("{e:#}")));
    }

    match state.intake.receive(&order).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            tracing::error!(order_id = order.id, "Order intake failed: {e:#}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to process order {}: {e}", order.id),
            ))
        }
    }
}

pub async fn ach_callback(
    State(state): State<AppState>,
    Query(query): Query<AchCallbackQuery>,
) -> Result<Json<AckResponse>, ApiError> {
    let check_id = query
        .check_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "check_id is required"))?;
    let transaction_id = query.transaction_id.as_deref().map(str::trim);

    let outcome = state
        .ach_callback
        .handle(check_id, transaction_id)
        .await
        .map_err(|e| {
            tracing::error!(check_id, "ACH callback failed: {e:#}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process callback")
        })?;

    let status = match outcome {
        CallbackOutcome::Cleared => "ok",
        CallbackOutcome::AlreadyCleared => "already_cleared",
        CallbackOutcome::Holding => "processed",
        CallbackOutcome::Rejected => "rejected",
        CallbackOutcome::NotProcessed => "not_processed",
        CallbackOutcome::NotFound => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("No ACH payment for check id {check_id}"),
            ))
        }
        CallbackOutcome::Conflict(current) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                format!("ACH payment for check id {check_id} is {current}"),
            ))
        }
        CallbackOutcome::PlatformFailed(reason) => {
            return Err(api_error(
                StatusCode::BAD_GATEWAY,
                format!("Failed to mark order paid: {reason}"),
            ))
        }
    };
    Ok(Json(AckResponse { status }))
}

pub async fn card_webhook(State(state): State<AppState>, body: Bytes) -> &'static str {
    let outcome = state.card_webhook.handle(&body).await;
    tracing::debug!(?outcome, "Card webhook handled");
    "ok"
}

pub async fn health_check() -> &'static str {
    "OK"
}
