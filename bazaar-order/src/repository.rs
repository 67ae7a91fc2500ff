use crate::lifecycle::SyncOutcome;
use crate::models::{
    RefundLedgerEntry, ReturnRequest, ReturnStatus, Shipment, Vendor, VendorOrder,
};
use async_trait::async_trait;
use bazaar_core::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mutation applied to a shipment and its order while both are held exclusively.
/// Nothing is written when it returns `Err`.
pub type ShipmentMutation<'a> =
    &'a (dyn Fn(&mut Shipment, &mut VendorOrder) -> CoreResult<SyncOutcome> + Send + Sync);

/// Decision applied to a return, its order and its vendor inside one unit of work.
/// A returned ledger entry is persisted alongside the records.
pub type ReturnMutation<'a> = &'a (dyn Fn(
    &mut ReturnRequest,
    &mut VendorOrder,
    &mut Vendor,
) -> CoreResult<Option<RefundLedgerEntry>>
             + Send
             + Sync);

#[async_trait]
pub trait VendorOrderRepository: Send + Sync {
    async fn get_vendor_order(&self, id: Uuid) -> CoreResult<Option<VendorOrder>>;

    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<Vendor>>;

    /// Orders created in `[from, to]`, optionally for one vendor. Feeds the return rate.
    async fn count_vendor_orders(
        &self,
        vendor_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> CoreResult<u64>;
}

#[async_trait]
pub trait ShipmentRepository: Send + Sync {
    async fn find_by_tracking_code(&self, tracking_code: &str) -> CoreResult<Option<Shipment>>;

    async fn find_by_vendor_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<Shipment>>;

    /// Persist a new shipment together with its order's state. Fails with
    /// `Conflict` when the order already has a shipment or the code is taken.
    async fn insert_shipment(&self, shipment: &Shipment, order: &VendorOrder) -> CoreResult<()>;

    /// Serialised read-modify-write of one shipment and its vendor order.
    async fn update_shipment_with(
        &self,
        tracking_code: &str,
        mutation: ShipmentMutation<'_>,
    ) -> CoreResult<(Shipment, SyncOutcome)>;

    async fn set_label_url(&self, tracking_code: &str, label_url: &str) -> CoreResult<()>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnFilter {
    pub vendor_id: Option<Uuid>,
    pub status: Option<ReturnStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ReturnFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 200;

    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, ret: &ReturnRequest) -> bool {
        self.vendor_id.map_or(true, |v| ret.vendor_id == v)
            && self.status.map_or(true, |s| ret.status == s)
            && self.from.map_or(true, |f| ret.created_at >= f)
            && self.to.map_or(true, |t| ret.created_at <= t)
    }
}

#[derive(Debug, Clone)]
pub struct ReturnDecision {
    pub return_request: ReturnRequest,
    pub vendor_order: VendorOrder,
    pub vendor: Vendor,
    pub ledger_entry: Option<RefundLedgerEntry>,
}

#[async_trait]
pub trait ReturnRepository: Send + Sync {
    /// Fails with `Conflict` when the order already has a pending or approved return.
    async fn insert_return(&self, ret: &ReturnRequest) -> CoreResult<()>;

    async fn get_return(&self, id: Uuid) -> CoreResult<Option<ReturnRequest>>;

    /// A pending or approved return for the order, if any.
    async fn find_active_for_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<ReturnRequest>>;

    /// Newest first.
    async fn list_returns(&self, filter: &ReturnFilter) -> CoreResult<Vec<ReturnRequest>>;

    /// Lock return, order and vendor (in that order), apply `mutation`, then
    /// persist everything or nothing.
    async fn process_return_with(
        &self,
        return_id: Uuid,
        mutation: ReturnMutation<'_>,
    ) -> CoreResult<ReturnDecision>;

    async fn get_ledger_entry(&self, return_id: Uuid) -> CoreResult<Option<RefundLedgerEntry>>;
}
