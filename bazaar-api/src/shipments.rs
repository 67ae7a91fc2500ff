use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use bazaar_core::carrier::{CreateShipmentSpec, FeeQuote, FeeRequest};
use bazaar_order::{Shipment, SyncOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{Json, Path},
    state::AppState,
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub vendor_order_id: Uuid,
    pub shipment: CreateShipmentSpec,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelShipmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LabelResponse {
    pub tracking_code: String,
    pub label_url: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/shipments", post(create_shipment))
        .route("/v1/admin/shipments/fee", post(calculate_fee))
        .route("/v1/admin/shipments/{code}", get(get_shipment))
        .route("/v1/admin/shipments/{code}/sync", post(sync_shipment))
        .route("/v1/admin/shipments/{code}/cancel", post(cancel_shipment))
        .route("/v1/admin/shipments/{code}/label", post(fetch_label))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/admin/shipments
async fn create_shipment(
    State(state): State<AppState>,
    Json(req): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let shipment = state
        .synchronizer
        .create_shipment(req.vendor_order_id, req.shipment)
        .await?;
    Ok((StatusCode::CREATED, Json(shipment)))
}

/// GET /v1/admin/shipments/{code}
async fn get_shipment(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Shipment>, AppError> {
    Ok(Json(state.synchronizer.get_shipment(&code).await?))
}

/// POST /v1/admin/shipments/{code}/sync
/// Pull the carrier's current detail and reconcile.
async fn sync_shipment(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<SyncOutcome>, AppError> {
    Ok(Json(state.synchronizer.poll(&code).await?))
}

/// POST /v1/admin/shipments/{code}/cancel
async fn cancel_shipment(
    State(state): State<AppState>,
    Path(code): Path<String>,
    body: Option<Json<CancelShipmentRequest>>,
) -> Result<Json<SyncOutcome>, AppError> {
    let reason = body.and_then(|Json(req)| req.reason);
    Ok(Json(state.synchronizer.cancel_shipment(&code, reason).await?))
}

/// POST /v1/admin/shipments/{code}/label
async fn fetch_label(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LabelResponse>, AppError> {
    let label_url = state.synchronizer.fetch_label(&code).await?;
    Ok(Json(LabelResponse {
        tracking_code: code,
        label_url,
    }))
}

/// POST /v1/admin/shipments/fee
async fn calculate_fee(
    State(state): State<AppState>,
    Json(req): Json<FeeRequest>,
) -> Result<Json<FeeQuote>, AppError> {
    Ok(Json(state.synchronizer.calculate_fee(&req).await?))
}
