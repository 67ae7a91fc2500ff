use crate::lifecycle::{Disposition, SyncOutcome};
use crate::models::{RefundLedgerEntry, ReturnRequest, ReturnStatus, Shipment, Vendor, VendorOrder};
use crate::repository::{
    ReturnDecision, ReturnFilter, ReturnMutation, ReturnRepository, ShipmentMutation,
    ShipmentRepository, VendorOrderRepository,
};
use async_trait::async_trait;
use bazaar_core::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    vendors: HashMap<Uuid, Vendor>,
    orders: HashMap<Uuid, VendorOrder>,
    shipments: HashMap<String, Shipment>,
    returns: HashMap<Uuid, ReturnRequest>,
    ledger: Vec<RefundLedgerEntry>,
}

/// In-process store backing all three repositories.
///
/// A single mutex serialises every unit of work, which gives the same
/// all-or-nothing guarantees the Postgres store gets from row locks.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_vendor(&self, vendor: Vendor) {
        self.state.lock().await.vendors.insert(vendor.id, vendor);
    }

    pub async fn insert_vendor_order(&self, order: VendorOrder) {
        self.state.lock().await.orders.insert(order.id, order);
    }

    pub async fn vendor(&self, id: Uuid) -> Option<Vendor> {
        self.state.lock().await.vendors.get(&id).cloned()
    }

    pub async fn ledger(&self) -> Vec<RefundLedgerEntry> {
        self.state.lock().await.ledger.clone()
    }
}

#[async_trait]
impl VendorOrderRepository for MemoryStore {
    async fn get_vendor_order(&self, id: Uuid) -> CoreResult<Option<VendorOrder>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<Vendor>> {
        Ok(self.state.lock().await.vendors.get(&id).cloned())
    }

    async fn count_vendor_orders(
        &self,
        vendor_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> CoreResult<u64> {
        let state = self.state.lock().await;
        let count = state
            .orders
            .values()
            .filter(|o| vendor_id.map_or(true, |v| o.vendor_id == v))
            .filter(|o| from.map_or(true, |f| o.created_at >= f))
            .filter(|o| to.map_or(true, |t| o.created_at <= t))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl ShipmentRepository for MemoryStore {
    async fn find_by_tracking_code(&self, tracking_code: &str) -> CoreResult<Option<Shipment>> {
        Ok(self.state.lock().await.shipments.get(tracking_code).cloned())
    }

    async fn find_by_vendor_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<Shipment>> {
        let state = self.state.lock().await;
        Ok(state
            .shipments
            .values()
            .find(|s| s.vendor_order_id == vendor_order_id)
            .cloned())
    }

    async fn insert_shipment(&self, shipment: &Shipment, order: &VendorOrder) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state.shipments.contains_key(&shipment.tracking_code) {
            return Err(CoreError::Conflict(format!(
                "tracking code {} already exists",
                shipment.tracking_code
            )));
        }
        if state
            .shipments
            .values()
            .any(|s| s.vendor_order_id == shipment.vendor_order_id)
        {
            return Err(CoreError::Conflict(format!(
                "vendor order {} already has a shipment",
                shipment.vendor_order_id
            )));
        }
        state
            .shipments
            .insert(shipment.tracking_code.clone(), shipment.clone());
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_shipment_with(
        &self,
        tracking_code: &str,
        mutation: ShipmentMutation<'_>,
    ) -> CoreResult<(Shipment, SyncOutcome)> {
        let mut state = self.state.lock().await;
        let mut shipment = state
            .shipments
            .get(tracking_code)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("shipment {}", tracking_code)))?;
        let mut order = state
            .orders
            .get(&shipment.vendor_order_id)
            .cloned()
            .ok_or_else(|| {
                CoreError::InternalError(format!(
                    "shipment {} references missing vendor order {}",
                    tracking_code, shipment.vendor_order_id
                ))
            })?;

        let outcome = mutation(&mut shipment, &mut order)?;
        if outcome.disposition == Disposition::Duplicate {
            return Ok((shipment, outcome));
        }

        shipment.version += 1;
        state.orders.insert(order.id, order);
        state
            .shipments
            .insert(tracking_code.to_string(), shipment.clone());
        Ok((shipment, outcome))
    }

    async fn set_label_url(&self, tracking_code: &str, label_url: &str) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        let shipment = state
            .shipments
            .get_mut(tracking_code)
            .ok_or_else(|| CoreError::NotFound(format!("shipment {}", tracking_code)))?;
        shipment.label_url = Some(label_url.to_string());
        shipment.version += 1;
        Ok(())
    }
}

fn is_active(ret: &ReturnRequest) -> bool {
    matches!(ret.status, ReturnStatus::Pending | ReturnStatus::Approved)
}

#[async_trait]
impl ReturnRepository for MemoryStore {
    async fn insert_return(&self, ret: &ReturnRequest) -> CoreResult<()> {
        let mut state = self.state.lock().await;
        if state
            .returns
            .values()
            .any(|r| r.vendor_order_id == ret.vendor_order_id && is_active(r))
        {
            return Err(CoreError::Conflict(format!(
                "vendor order {} already has an open return",
                ret.vendor_order_id
            )));
        }
        state.returns.insert(ret.id, ret.clone());
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> CoreResult<Option<ReturnRequest>> {
        Ok(self.state.lock().await.returns.get(&id).cloned())
    }

    async fn find_active_for_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<ReturnRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .returns
            .values()
            .find(|r| r.vendor_order_id == vendor_order_id && is_active(r))
            .cloned())
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> CoreResult<Vec<ReturnRequest>> {
        let state = self.state.lock().await;
        let mut matching: Vec<ReturnRequest> = state
            .returns
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .collect())
    }

    async fn process_return_with(
        &self,
        return_id: Uuid,
        mutation: ReturnMutation<'_>,
    ) -> CoreResult<ReturnDecision> {
        let mut state = self.state.lock().await;
        let mut ret = state
            .returns
            .get(&return_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("return {}", return_id)))?;
        let mut order = state
            .orders
            .get(&ret.vendor_order_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("vendor order {}", ret.vendor_order_id)))?;
        let mut vendor = state
            .vendors
            .get(&ret.vendor_id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("vendor {}", ret.vendor_id)))?;

        let ledger_entry = mutation(&mut ret, &mut order, &mut vendor)?;

        if let Some(entry) = &ledger_entry {
            if state.ledger.iter().any(|e| e.return_id == entry.return_id) {
                return Err(CoreError::Conflict(format!(
                    "return {} was already settled",
                    entry.return_id
                )));
            }
            state.ledger.push(entry.clone());
        }
        state.returns.insert(ret.id, ret.clone());
        state.orders.insert(order.id, order.clone());
        state.vendors.insert(vendor.id, vendor.clone());

        Ok(ReturnDecision {
            return_request: ret,
            vendor_order: order,
            vendor,
            ledger_entry,
        })
    }

    async fn get_ledger_entry(&self, return_id: Uuid) -> CoreResult<Option<RefundLedgerEntry>> {
        let state = self.state.lock().await;
        Ok(state.ledger.iter().find(|e| e.return_id == return_id).cloned())
    }
}
