use bazaar_order::{ReturnWorkflow, ShipmentSynchronizer};
use bazaar_shared::Masked;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub synchronizer: Arc<ShipmentSynchronizer>,
    pub returns: Arc<ReturnWorkflow>,
    pub auth: AuthConfig,
    /// Expected `Token` header on carrier webhooks; unchecked when `None`.
    pub webhook_token: Option<Masked<String>>,
}
