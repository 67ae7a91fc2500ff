use bazaar_core::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

// ============================================================================
// Vendor orders
// ============================================================================

/// Vendor order status. Owned by the order subsystem; this crate only moves it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VendorOrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

string_enum!(VendorOrderStatus {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Returned => "returned",
});

impl VendorOrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VendorOrderStatus::Cancelled | VendorOrderStatus::Returned)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorOrder {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub cost: Decimal,
    pub status: VendorOrderStatus,
    pub processing_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VendorOrder {
    pub fn new(vendor_id: Uuid, cost: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_id,
            cost,
            status: VendorOrderStatus::Pending,
            processing_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
            returned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update_status(&mut self, new_status: VendorOrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Pending → Processing when a shipment is booked. Already processing is fine.
    pub fn start_processing(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        match self.status {
            VendorOrderStatus::Pending => {
                self.update_status(VendorOrderStatus::Processing);
                self.processing_at = Some(at);
                Ok(())
            }
            VendorOrderStatus::Processing => {
                self.processing_at.get_or_insert(at);
                Ok(())
            }
            other => Err(CoreError::InvalidOperation(format!(
                "cannot ship vendor order {} in status {}",
                self.id, other
            ))),
        }
    }

    /// Final transition after an approved return.
    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if self.status.is_terminal() {
            return Err(CoreError::Conflict(format!(
                "vendor order {} is already {}",
                self.id, self.status
            )));
        }
        self.update_status(VendorOrderStatus::Returned);
        self.returned_at = Some(at);
        Ok(())
    }
}

// ============================================================================
// Shipments
// ============================================================================

/// Internal shipment status. `Unknown` only ever appears in history: it is what an
/// unrecognised carrier code maps to and it never becomes `Shipment::status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
    Returned,
    Unknown,
}

string_enum!(ShipmentStatus {
    Pending => "pending",
    PickedUp => "picked_up",
    InTransit => "in_transit",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Returned => "returned",
    Unknown => "unknown",
});

impl ShipmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ShipmentStatus::Delivered | ShipmentStatus::Cancelled | ShipmentStatus::Returned
        )
    }

    /// Position on the forward path pending → picked_up → in_transit → delivered.
    fn rank(&self) -> Option<u8> {
        match self {
            ShipmentStatus::Pending => Some(0),
            ShipmentStatus::PickedUp => Some(1),
            ShipmentStatus::InTransit => Some(2),
            ShipmentStatus::Delivered => Some(3),
            _ => None,
        }
    }

    /// Monotonic transition rule. Cancelled and returned are reachable from any
    /// non-terminal status; nothing leaves a terminal status.
    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        if self.is_terminal() || next == ShipmentStatus::Unknown || next == *self {
            return false;
        }
        match next {
            ShipmentStatus::Cancelled | ShipmentStatus::Returned => true,
            _ => match (self.rank(), next.rank()) {
                (Some(current), Some(target)) => target > current,
                _ => false,
            },
        }
    }
}

/// Which of the update paths produced a status event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Creation,
    Poll,
    Webhook,
    Cancellation,
}

string_enum!(EventSource {
    Creation => "creation",
    Poll => "poll",
    Webhook => "webhook",
    Cancellation => "cancellation",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub status: ShipmentStatus,
    /// Raw carrier code the entry was mapped from.
    pub carrier_status: String,
    /// Carrier-supplied time, or ingestion time when the carrier sent none.
    pub occurred_at: DateTime<Utc>,
    pub location: Option<String>,
    pub note: Option<String>,
    pub source: EventSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub id: Uuid,
    pub vendor_order_id: Uuid,
    pub carrier: String,
    pub tracking_code: String,
    pub status: ShipmentStatus,
    /// Append-only, ordered by `occurred_at`.
    pub status_history: Vec<StatusHistoryEntry>,
    pub total_fee: Decimal,
    pub estimated_delivery_date: Option<DateTime<Utc>>,
    pub label_url: Option<String>,
    pub metadata: serde_json::Value,
    /// Optimistic concurrency token, bumped on every persisted change.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        vendor_order_id: Uuid,
        carrier: &str,
        tracking_code: String,
        total_fee: Decimal,
        estimated_delivery_date: Option<DateTime<Utc>>,
        metadata: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            vendor_order_id,
            carrier: carrier.to_string(),
            tracking_code,
            status: ShipmentStatus::Pending,
            status_history: Vec::new(),
            total_fee,
            estimated_delivery_date,
            label_url: None,
            metadata,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Vendors
// ============================================================================

/// Contract governing how a vendor is paid and how refunds hit their ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentModel {
    Deposit,
    Monthly,
    Upfront,
    RevenueShare,
}

string_enum!(PaymentModel {
    Deposit => "deposit",
    Monthly => "monthly",
    Upfront => "upfront",
    RevenueShare => "revenue_share",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub payment_model: PaymentModel,
    pub deposit_balance: Decimal,
    pub monthly_debt: Decimal,
    /// Percentage, e.g. `15` for 15%.
    pub commission_rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Vendor {
    pub fn new(name: &str, payment_model: PaymentModel) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            payment_model,
            deposit_balance: Decimal::ZERO,
            monthly_debt: Decimal::ZERO,
            commission_rate: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }

    pub fn balances(&self) -> Balances {
        Balances {
            deposit_balance: self.deposit_balance,
            monthly_debt: self.monthly_debt,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Balances {
    pub deposit_balance: Decimal,
    pub monthly_debt: Decimal,
}

// ============================================================================
// Returns
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    Rejected,
}

string_enum!(ReturnStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Defective,
    WrongItem,
    CustomerRequest,
    Damaged,
    Other,
}

string_enum!(ReturnType {
    Defective => "defective",
    WrongItem => "wrong_item",
    CustomerRequest => "customer_request",
    Damaged => "damaged",
    Other => "other",
});

pub const REFUND_METHOD_DEPOSIT_CREDIT: &str = "deposit_credit";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub vendor_order_id: Uuid,
    pub vendor_id: Uuid,
    pub return_reason: String,
    pub return_type: ReturnType,
    pub quantity_returned: u32,
    pub refund_amount: Decimal,
    pub refund_method: String,
    pub status: ReturnStatus,
    pub images: Vec<String>,
    pub admin_notes: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    /// Only a pending return can be decided, and only once.
    pub fn ensure_pending(&self) -> CoreResult<()> {
        if self.status != ReturnStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "return {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn approve(&mut self, actor: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_pending()?;
        self.status = ReturnStatus::Approved;
        self.processed_by = Some(actor.to_string());
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(&mut self, actor: &str, reason: &str, at: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_pending()?;
        self.status = ReturnStatus::Rejected;
        self.admin_notes = Some(reason.to_string());
        self.processed_by = Some(actor.to_string());
        self.processed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }
}

/// Audit record written in the same unit of work as the balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundLedgerEntry {
    pub id: Uuid,
    pub return_id: Uuid,
    pub vendor_id: Uuid,
    pub vendor_order_id: Uuid,
    pub payment_model: PaymentModel,
    pub refund_amount: Decimal,
    pub deposit_delta: Decimal,
    pub monthly_debt_delta: Decimal,
    pub deposit_balance_after: Decimal,
    pub monthly_debt_after: Decimal,
    pub message: String,
    pub processed_by: String,
    pub created_at: DateTime<Utc>,
}
