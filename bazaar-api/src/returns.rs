use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Router,
};
use bazaar_order::analytics::ReturnAnalytics;
use bazaar_order::repository::ReturnFilter;
use bazaar_order::returns::{AnalyticsQuery, ApprovedReturn, NewReturn};
use bazaar_order::ReturnRequest;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    extract::{Json, Path, Query},
    middleware::{AdminClaims, VendorClaims},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RejectReturnRequest {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ReturnListResponse {
    pub returns: Vec<ReturnRequest>,
    pub limit: u32,
    pub offset: u32,
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/returns", get(list_returns).post(create_return))
        .route("/v1/admin/returns/analytics", get(return_analytics))
        .route("/v1/admin/returns/{id}", get(get_return))
        .route("/v1/admin/returns/{id}/approve", post(approve_return))
        .route("/v1/admin/returns/{id}/reject", post(reject_return))
}

pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/vendor/returns", get(list_vendor_returns).post(create_vendor_return))
        .route("/v1/vendor/returns/analytics", get(vendor_return_analytics))
}

/// GET /v1/admin/returns?vendor_id=&status=&from=&to=&limit=&offset=
async fn list_returns(
    State(state): State<AppState>,
    Query(filter): Query<ReturnFilter>,
) -> Result<Json<ReturnListResponse>, AppError> {
    let returns = state.returns.list(&filter).await?;
    Ok(Json(ReturnListResponse {
        returns,
        limit: filter.effective_limit(),
        offset: filter.effective_offset(),
    }))
}

/// POST /v1/admin/returns
async fn create_return(
    State(state): State<AppState>,
    Json(req): Json<NewReturn>,
) -> Result<(StatusCode, Json<ReturnRequest>), AppError> {
    let ret = state.returns.create(req, None).await?;
    Ok((StatusCode::CREATED, Json(ret)))
}

/// POST /v1/vendor/returns
/// Same as the admin path, restricted to the caller's own orders.
async fn create_vendor_return(
    State(state): State<AppState>,
    Extension(claims): Extension<VendorClaims>,
    Json(req): Json<NewReturn>,
) -> Result<(StatusCode, Json<ReturnRequest>), AppError> {
    let ret = state.returns.create(req, Some(claims.vendor_id)).await?;
    Ok((StatusCode::CREATED, Json(ret)))
}

/// GET /v1/vendor/returns?status=&from=&to=&limit=&offset=
/// Any `vendor_id` in the query is replaced by the caller's own.
async fn list_vendor_returns(
    State(state): State<AppState>,
    Extension(claims): Extension<VendorClaims>,
    Query(mut filter): Query<ReturnFilter>,
) -> Result<Json<ReturnListResponse>, AppError> {
    filter.vendor_id = Some(claims.vendor_id);
    list_returns(State(state), Query(filter)).await
}

/// GET /v1/vendor/returns/analytics?from=&to=
async fn vendor_return_analytics(
    State(state): State<AppState>,
    Extension(claims): Extension<VendorClaims>,
    Query(mut query): Query<AnalyticsQuery>,
) -> Result<Json<ReturnAnalytics>, AppError> {
    query.vendor_id = Some(claims.vendor_id);
    Ok(Json(state.returns.analytics(&query).await?))
}

async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(state.returns.get(id).await?))
}

/// POST /v1/admin/returns/{id}/approve
/// Settles the refund against the vendor's ledger in the same unit of work.
async fn approve_return(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovedReturn>, AppError> {
    Ok(Json(state.returns.approve(id, &claims.sub).await?))
}

/// POST /v1/admin/returns/{id}/reject
async fn reject_return(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectReturnRequest>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(state.returns.reject(id, &claims.sub, &req.reason).await?))
}

/// GET /v1/admin/returns/analytics?vendor_id=&from=&to=
async fn return_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ReturnAnalytics>, AppError> {
    Ok(Json(state.returns.analytics(&query).await?))
}
