use crate::lifecycle::{apply_event, CarrierStatusEvent, Disposition, SyncOutcome};
use crate::models::{EventSource, Shipment, ShipmentStatus};
use crate::repository::{ShipmentRepository, VendorOrderRepository};
use crate::status_map::{map_carrier_status, CANCELLATION_STATUS, CREATION_STATUS};
use bazaar_core::carrier::{CreateShipmentSpec, FeeQuote, FeeRequest};
use bazaar_core::{dispatch_best_effort, CarrierError, CarrierGateway, CoreError, CoreResult, NotificationSink};
use bazaar_shared::models::events::ShipmentStatusChangedEvent;
use bazaar_shared::NotificationEvent;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_CANCEL_REASON: &str = "Cancelled by request";

/// Push notification body sent by GHN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GhnWebhookPayload {
    pub order_code: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "COD")]
    pub cod: Option<Decimal>,
    pub time: Option<String>,
    pub warehouse: Option<String>,
    pub reason: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "ShopID")]
    pub shop_id: Option<i64>,
    pub client_order_code: Option<String>,
}

impl GhnWebhookPayload {
    fn into_event(self) -> CoreResult<CarrierStatusEvent> {
        let tracking_code = self
            .order_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CoreError::ValidationError("OrderCode is required".to_string()))?;
        let status = self
            .status
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::ValidationError("Status is required".to_string()))?;

        let occurred_at = self.time.as_deref().and_then(|t| {
            DateTime::parse_from_rfc3339(t)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| tracing::warn!(tracking_code = %tracking_code, "Unparseable webhook time '{}': {}", t, e))
                .ok()
        });

        let mut event = CarrierStatusEvent::new(&tracking_code, &status, EventSource::Webhook)
            .at(occurred_at)
            .with_note(self.reason.or(self.description));
        event.location = self.warehouse;
        Ok(event)
    }
}

/// Keeps one authoritative status per shipment across the creation, poll and
/// webhook paths. Every path funnels through [`apply_event`].
pub struct ShipmentSynchronizer {
    carrier: Arc<dyn CarrierGateway>,
    orders: Arc<dyn VendorOrderRepository>,
    shipments: Arc<dyn ShipmentRepository>,
    notifier: Arc<dyn NotificationSink>,
}

impl ShipmentSynchronizer {
    pub fn new(
        carrier: Arc<dyn CarrierGateway>,
        orders: Arc<dyn VendorOrderRepository>,
        shipments: Arc<dyn ShipmentRepository>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            carrier,
            orders,
            shipments,
            notifier,
        }
    }

    /// Book the vendor order with the carrier and persist the resulting shipment.
    pub async fn create_shipment(
        &self,
        vendor_order_id: Uuid,
        mut spec: CreateShipmentSpec,
    ) -> CoreResult<Shipment> {
        let mut order = self
            .orders
            .get_vendor_order(vendor_order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vendor order {}", vendor_order_id)))?;

        if let Some(existing) = self.shipments.find_by_vendor_order(vendor_order_id).await? {
            return Err(CoreError::Conflict(format!(
                "vendor order {} already has shipment {}",
                vendor_order_id, existing.tracking_code
            )));
        }

        let now = Utc::now();
        order.start_processing(now)?;

        spec.client_order_code
            .get_or_insert_with(|| vendor_order_id.to_string());
        let created = self.carrier.create_order(&spec).await.map_err(|e| {
            tracing::error!(vendor_order_id = %vendor_order_id, "Carrier create failed: {}", e);
            CoreError::from(e)
        })?;
        tracing::info!(
            vendor_order_id = %vendor_order_id,
            tracking_code = %created.tracking_code,
            total_fee = %created.total_fee,
            "Shipment booked"
        );

        let mut shipment = Shipment::new(
            vendor_order_id,
            self.carrier.name(),
            created.tracking_code.clone(),
            created.total_fee,
            created.expected_delivery_time,
            created.raw,
        );
        let event = CarrierStatusEvent::new(&created.tracking_code, CREATION_STATUS, EventSource::Creation)
            .at(Some(now));
        apply_event(&mut shipment, &mut order, &event, now);

        if let Err(e) = self.shipments.insert_shipment(&shipment, &order).await {
            // The carrier already holds the booking; it has to be reconciled by hand.
            tracing::error!(
                tracking_code = %shipment.tracking_code,
                vendor_order_id = %vendor_order_id,
                "Shipment booked with carrier but not persisted: {}",
                e
            );
            return Err(e);
        }
        Ok(shipment)
    }

    /// Pull the carrier's view of a shipment and reconcile it.
    pub async fn poll(&self, tracking_code: &str) -> CoreResult<SyncOutcome> {
        self.get_shipment(tracking_code).await?;

        let detail = self.carrier.get_order_detail(tracking_code).await.map_err(|e| {
            tracing::warn!(tracking_code = %tracking_code, "Carrier detail lookup failed: {}", e);
            CoreError::from(e)
        })?;

        let mut log = detail.log;
        log.sort_by_key(|entry| (entry.timestamp.is_none(), entry.timestamp));

        let latest_logged = log.last().map(|e| e.status.trim().to_ascii_lowercase());
        let latest_time = log.iter().filter_map(|e| e.timestamp).max();

        let mut events: Vec<CarrierStatusEvent> = log
            .into_iter()
            .map(|entry| {
                let mut event = CarrierStatusEvent::new(tracking_code, &entry.status, EventSource::Poll)
                    .at(entry.timestamp)
                    .with_note(entry.message);
                event.location = entry.location;
                event
            })
            .collect();

        let current = detail.status.trim().to_ascii_lowercase();
        if !current.is_empty() && latest_logged.as_deref() != Some(current.as_str()) {
            events.push(CarrierStatusEvent::new(tracking_code, &current, EventSource::Poll).at(latest_time));
        }
        if let Some(last) = events.last_mut() {
            last.expected_delivery = detail.expected_delivery_time;
        }

        self.sync(tracking_code, events).await
    }

    /// Apply one carrier push. Unknown tracking codes fail with `NotFound`.
    pub async fn handle_webhook(&self, payload: GhnWebhookPayload) -> CoreResult<SyncOutcome> {
        let event = payload.into_event()?;
        let tracking_code = event.tracking_code.clone();
        self.sync(&tracking_code, vec![event]).await
    }

    pub async fn cancel_shipment(&self, tracking_code: &str, reason: Option<String>) -> CoreResult<SyncOutcome> {
        let shipment = self.get_shipment(tracking_code).await?;
        if shipment.status.is_terminal() {
            return Err(CoreError::InvalidOperation(format!(
                "shipment {} is already {}",
                tracking_code, shipment.status
            )));
        }

        let result = self
            .carrier
            .cancel_order(&[tracking_code.to_string()])
            .await?;
        if !result.result {
            tracing::warn!(tracking_code = %tracking_code, "Carrier refused cancellation: {}", result.message);
            return Err(CarrierError::Rejected {
                code: None,
                message: result.message,
            }
            .into());
        }

        let note = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
        let event = CarrierStatusEvent::new(tracking_code, CANCELLATION_STATUS, EventSource::Cancellation)
            .at(Some(Utc::now()))
            .with_note(Some(note));
        self.sync(tracking_code, vec![event]).await
    }

    pub async fn calculate_fee(&self, request: &FeeRequest) -> CoreResult<FeeQuote> {
        Ok(self.carrier.calculate_fee(request).await?)
    }

    /// Request a print token and store the resulting label URL on the shipment.
    pub async fn fetch_label(&self, tracking_code: &str) -> CoreResult<String> {
        self.get_shipment(tracking_code).await?;
        let token = self.carrier.get_label(tracking_code).await?;
        let url = self.carrier.label_url(&token);
        self.shipments.set_label_url(tracking_code, &url).await?;
        Ok(url)
    }

    pub async fn get_shipment(&self, tracking_code: &str) -> CoreResult<Shipment> {
        self.shipments
            .find_by_tracking_code(tracking_code)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("shipment {}", tracking_code)))
    }

    async fn sync(&self, tracking_code: &str, events: Vec<CarrierStatusEvent>) -> CoreResult<SyncOutcome> {
        for event in &events {
            if map_carrier_status(&event.carrier_status) == ShipmentStatus::Unknown {
                tracing::warn!(
                    tracking_code = %tracking_code,
                    carrier_status = %event.carrier_status,
                    source = %event.source,
                    "Unrecognised carrier status recorded without transition"
                );
            }
        }

        let now = Utc::now();
        let (shipment, outcome) = self
            .shipments
            .update_shipment_with(tracking_code, &|shipment, order| {
                let mut merged: Option<SyncOutcome> = None;
                for event in &events {
                    let outcome = apply_event(shipment, order, event, now);
                    match merged.as_mut() {
                        Some(acc) => acc.merge(outcome),
                        None => merged = Some(outcome),
                    }
                }
                merged.ok_or_else(|| {
                    CoreError::ValidationError(format!("no status events for shipment {}", shipment.tracking_code))
                })
            })
            .await?;

        match outcome.disposition {
            Disposition::Duplicate => {
                tracing::debug!(tracking_code = %tracking_code, "Duplicate carrier event ignored");
            }
            Disposition::Recorded => {
                tracing::debug!(tracking_code = %tracking_code, status = %shipment.status, "Carrier event recorded");
            }
            Disposition::Transitioned { from, to } => {
                tracing::info!(
                    tracking_code = %tracking_code,
                    from = %from,
                    to = %to,
                    order_effect = ?outcome.order_effect,
                    "Shipment status changed"
                );
                let (carrier_status, source, occurred_at) = outcome
                    .entry
                    .as_ref()
                    .map(|e| (e.carrier_status.clone(), e.source.to_string(), e.occurred_at))
                    .unwrap_or_else(|| (String::new(), String::new(), now));
                dispatch_best_effort(
                    self.notifier.clone(),
                    NotificationEvent::ShipmentStatusChanged(ShipmentStatusChangedEvent {
                        shipment_id: shipment.id,
                        vendor_order_id: shipment.vendor_order_id,
                        tracking_code: shipment.tracking_code.clone(),
                        from_status: from.to_string(),
                        to_status: to.to_string(),
                        carrier_status,
                        source,
                        occurred_at: occurred_at.timestamp(),
                    }),
                );
            }
        }
        Ok(outcome)
    }
}
