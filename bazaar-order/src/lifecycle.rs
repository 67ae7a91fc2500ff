//! Pure state machine shared by the creation, poll, webhook and cancellation paths.
//!
//! Everything here operates on in-memory records; persistence and locking are the
//! repository's job.

use crate::models::{
    EventSource, Shipment, ShipmentStatus, StatusHistoryEntry, VendorOrder, VendorOrderStatus,
};
use crate::status_map::map_carrier_status;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One status observation, whichever path it arrived on.
#[derive(Debug, Clone)]
pub struct CarrierStatusEvent {
    pub tracking_code: String,
    pub carrier_status: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub source: EventSource,
    pub expected_delivery: Option<DateTime<Utc>>,
}

impl CarrierStatusEvent {
    pub fn new(tracking_code: &str, carrier_status: &str, source: EventSource) -> Self {
        Self {
            tracking_code: tracking_code.to_string(),
            carrier_status: carrier_status.to_string(),
            occurred_at: None,
            location: None,
            note: None,
            source,
            expected_delivery: None,
        }
    }

    pub fn at(mut self, occurred_at: Option<DateTime<Utc>>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Disposition {
    /// Redelivery of an event already in history. Nothing changed.
    Duplicate,
    /// Appended to history without moving the shipment status.
    Recorded,
    Transitioned {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
}

/// Order side effect of a shipment transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEffect {
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub tracking_code: String,
    pub disposition: Disposition,
    pub entry: Option<StatusHistoryEntry>,
    pub order_effect: Option<OrderEffect>,
    pub shipment_status: ShipmentStatus,
    pub order_status: VendorOrderStatus,
}

impl SyncOutcome {
    pub fn transitioned(&self) -> bool {
        matches!(self.disposition, Disposition::Transitioned { .. })
    }

    /// Fold a later outcome for the same shipment into this one. Used when a poll
    /// ingests several log entries in one unit of work.
    pub fn merge(&mut self, later: SyncOutcome) {
        let from = match self.disposition {
            Disposition::Transitioned { from, .. } => Some(from),
            _ => None,
        };
        self.disposition = match (from, later.disposition) {
            (Some(from), Disposition::Transitioned { to, .. }) => {
                Disposition::Transitioned { from, to }
            }
            (Some(_), _) => self.disposition,
            (None, d @ Disposition::Transitioned { .. }) => d,
            (None, Disposition::Recorded) => Disposition::Recorded,
            (None, Disposition::Duplicate) => self.disposition,
        };
        if later.entry.is_some() {
            self.entry = later.entry;
        }
        if later.order_effect.is_some() {
            self.order_effect = later.order_effect;
        }
        self.shipment_status = later.shipment_status;
        self.order_status = later.order_status;
    }
}

impl Shipment {
    /// Record `event` in history and apply the monotonic transition rule.
    ///
    /// Redeliveries are recognised by (carrier status, carrier timestamp). An event
    /// carrying no timestamp is a duplicate when its carrier status is already anywhere
    /// in history, so re-reading an untimed carrier log never grows it.
    /// Late events are slotted into history at their chronological position and can
    /// never pull the status backwards.
    pub fn ingest(&mut self, event: &CarrierStatusEvent, now: DateTime<Utc>) -> Disposition {
        let carrier_status = event.carrier_status.trim().to_ascii_lowercase();

        let duplicate = match event.occurred_at {
            Some(at) => self
                .status_history
                .iter()
                .any(|e| e.carrier_status == carrier_status && e.occurred_at == at),
            None => self
                .status_history
                .iter()
                .any(|e| e.carrier_status == carrier_status),
        };
        if duplicate {
            return Disposition::Duplicate;
        }

        let mapped = map_carrier_status(&carrier_status);
        let occurred_at = event.occurred_at.unwrap_or(now);
        let entry = StatusHistoryEntry {
            status: mapped,
            carrier_status,
            occurred_at,
            location: event.location.clone(),
            note: event.note.clone(),
            source: event.source,
            recorded_at: now,
        };

        let idx = self
            .status_history
            .partition_point(|e| e.occurred_at <= occurred_at);
        self.status_history.insert(idx, entry);

        if let Some(eta) = event.expected_delivery {
            self.estimated_delivery_date = Some(eta);
        }
        self.updated_at = now;

        let from = self.status;
        if from.can_transition_to(mapped) {
            self.status = mapped;
            Disposition::Transitioned { from, to: mapped }
        } else {
            Disposition::Recorded
        }
    }
}

impl VendorOrder {
    /// Propagate a shipment status onto the order. Timestamps use the carrier's time.
    pub fn apply_shipment_status(
        &mut self,
        status: ShipmentStatus,
        at: DateTime<Utc>,
    ) -> Option<OrderEffect> {
        if self.status.is_terminal() {
            return None;
        }
        match status {
            // A carrier may skip straight to in_transit; both count as the hand-over.
            ShipmentStatus::PickedUp | ShipmentStatus::InTransit
                if self.status == VendorOrderStatus::Processing =>
            {
                self.update_status(VendorOrderStatus::Shipped);
                self.shipped_at = Some(at);
                Some(OrderEffect::Shipped)
            }
            ShipmentStatus::Delivered if self.status != VendorOrderStatus::Delivered => {
                self.update_status(VendorOrderStatus::Delivered);
                self.delivered_at = Some(at);
                self.shipped_at.get_or_insert(at);
                Some(OrderEffect::Delivered)
            }
            ShipmentStatus::Cancelled => {
                self.update_status(VendorOrderStatus::Cancelled);
                self.cancelled_at = Some(at);
                Some(OrderEffect::Cancelled)
            }
            ShipmentStatus::Returned => {
                self.update_status(VendorOrderStatus::Returned);
                self.returned_at = Some(at);
                Some(OrderEffect::Returned)
            }
            _ => None,
        }
    }
}

/// Run one event through the shipment and, when the status moved, the owning order.
pub fn apply_event(
    shipment: &mut Shipment,
    order: &mut VendorOrder,
    event: &CarrierStatusEvent,
    now: DateTime<Utc>,
) -> SyncOutcome {
    let disposition = shipment.ingest(event, now);

    let (entry, order_effect) = match disposition {
        Disposition::Duplicate => (None, None),
        Disposition::Recorded => (recorded_entry(shipment, event, now), None),
        Disposition::Transitioned { to, .. } => {
            let at = event.occurred_at.unwrap_or(now);
            (
                recorded_entry(shipment, event, now),
                order.apply_shipment_status(to, at),
            )
        }
    };

    SyncOutcome {
        tracking_code: shipment.tracking_code.clone(),
        disposition,
        entry,
        order_effect,
        shipment_status: shipment.status,
        order_status: order.status,
    }
}

fn recorded_entry(
    shipment: &Shipment,
    event: &CarrierStatusEvent,
    now: DateTime<Utc>,
) -> Option<StatusHistoryEntry> {
    let occurred_at = event.occurred_at.unwrap_or(now);
    let carrier_status = event.carrier_status.trim().to_ascii_lowercase();
    shipment
        .status_history
        .iter()
        .rev()
        .find(|e| e.occurred_at == occurred_at && e.carrier_status == carrier_status)
        .cloned()
}
