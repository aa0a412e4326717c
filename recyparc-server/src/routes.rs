//! HTTP routes consumed by the scenario harness.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use recyparc_core::model::DomainError;
use recyparc_core::service::{CalculatePriceRequest, PriceCalculator, PriceResponse};

/// Shared handler state. Requests are serialised on the calculator lock.
#[derive(Clone)]
pub(crate) struct AppState {
    calculator: Arc<Mutex<PriceCalculator>>,
    preload_visitors: bool,
}

impl AppState {
    pub(crate) fn new(calculator: PriceCalculator, preload_visitors: bool) -> Self {
        Self {
            calculator: Arc::new(Mutex::new(calculator)),
            preload_visitors,
        }
    }
}

/// Error body `{"error": message}` with a matching status.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        if err.is_validation() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => {
                warn!(%message, "rejected request");
                (StatusCode::BAD_REQUEST, message)
            }
            Self::Internal(message) => {
                error!(%message, "pricing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/startScenario", post(start_scenario))
        .route("/calculatePrice", post(calculate_price))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "OK" }))
}

async fn start_scenario(State(state): State<AppState>) -> Json<Value> {
    let mut calculator = state.calculator.lock().await;
    calculator.start_scenario();
    if state.preload_visitors
        && let Err(err) = calculator.preload_visitors().await
    {
        warn!(error = %err, "visitor preload failed");
    }
    Json(json!({}))
}

async fn calculate_price(
    State(state): State<AppState>,
    payload: Result<Json<CalculatePriceRequest>, JsonRejection>,
) -> Result<Json<PriceResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state
        .calculator
        .lock()
        .await
        .calculate_price(&request)
        .await?;
    Ok(Json(response))
}
