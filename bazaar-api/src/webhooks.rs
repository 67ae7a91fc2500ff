use axum::{extract::State, http::HeaderMap, routing::post, Router};
use bazaar_order::{GhnWebhookPayload, SyncOutcome};

use crate::{error::AppError, extract::Json, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/carrier", post(handle_carrier_webhook))
}

/// POST /v1/webhooks/carrier
/// GHN status push. Goes through the same mapping as poll and creation.
async fn handle_carrier_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<GhnWebhookPayload>,
) -> Result<Json<SyncOutcome>, AppError> {
    if let Some(expected) = &state.webhook_token {
        let presented = headers.get("Token").and_then(|h| h.to_str().ok());
        if presented != Some(expected.expose().as_str()) {
            tracing::warn!("Rejected carrier webhook with missing or wrong token");
            return Err(AppError::AuthenticationError("invalid webhook token".to_string()));
        }
    }

    tracing::info!(
        "Received carrier webhook: {:?} -> {:?}",
        payload.order_code,
        payload.status
    );

    let outcome = state.synchronizer.handle_webhook(payload).await?;
    Ok(Json(outcome))
}
