use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ShipmentStatusChangedEvent {
    pub shipment_id: Uuid,
    pub vendor_order_id: Uuid,
    pub tracking_code: String,
    pub from_status: String,
    pub to_status: String,
    pub carrier_status: String,
    pub source: String,
    pub occurred_at: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReturnRequestedEvent {
    pub return_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_order_id: Uuid,
    pub refund_amount: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReturnApprovedEvent {
    pub return_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_order_id: Uuid,
    pub refund_amount: Decimal,
    pub deposit_balance_after: Decimal,
    pub monthly_debt_after: Decimal,
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct ReturnRejectedEvent {
    pub return_id: Uuid,
    pub vendor_id: Uuid,
    pub reason: String,
    pub timestamp: i64,
}

/// Everything the notification path can be asked to deliver.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    ShipmentStatusChanged(ShipmentStatusChangedEvent),
    ReturnRequested(ReturnRequestedEvent),
    ReturnApproved(ReturnApprovedEvent),
    ReturnRejected(ReturnRejectedEvent),
}

impl NotificationEvent {
    /// Topic suffix, e.g. `shipment.status_changed`.
    pub fn topic(&self) -> &'static str {
        match self {
            NotificationEvent::ShipmentStatusChanged(_) => "shipment.status_changed",
            NotificationEvent::ReturnRequested(_) => "return.requested",
            NotificationEvent::ReturnApproved(_) => "return.approved",
            NotificationEvent::ReturnRejected(_) => "return.rejected",
        }
    }

    /// Partition key; events about the same vendor/shipment stay ordered.
    pub fn key(&self) -> String {
        match self {
            NotificationEvent::ShipmentStatusChanged(e) => e.tracking_code.clone(),
            NotificationEvent::ReturnRequested(e) => e.vendor_id.to_string(),
            NotificationEvent::ReturnApproved(e) => e.vendor_id.to_string(),
            NotificationEvent::ReturnRejected(e) => e.vendor_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let event = NotificationEvent::ReturnRejected(ReturnRejectedEvent {
            return_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            reason: "Item was used".to_string(),
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "return_rejected");
        assert_eq!(json["reason"], "Item was used");
        assert_eq!(event.topic(), "return.rejected");
    }
}
