use crate::analytics::{summarize, ReturnAnalytics};
use crate::models::{
    ReturnRequest, ReturnStatus, ReturnType, VendorOrderStatus, REFUND_METHOD_DEPOSIT_CREDIT,
};
use crate::repository::{ReturnFilter, ReturnRepository, VendorOrderRepository};
use crate::settlement::{SettlementEngine, SettlementReceipt, SettlementRequest};
use bazaar_core::{dispatch_best_effort, CoreError, CoreResult, NotificationSink};
use bazaar_shared::models::events::{ReturnApprovedEvent, ReturnRejectedEvent, ReturnRequestedEvent};
use bazaar_shared::NotificationEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReturn {
    pub vendor_order_id: Uuid,
    pub return_reason: String,
    pub return_type: ReturnType,
    pub quantity_returned: u32,
    #[serde(default)]
    pub images: Vec<String>,
    pub refund_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovedReturn {
    pub return_request: ReturnRequest,
    pub settlement: SettlementReceipt,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub vendor_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// State machine for return requests: `pending -> approved | rejected`, decided once.
pub struct ReturnWorkflow {
    orders: Arc<dyn VendorOrderRepository>,
    returns: Arc<dyn ReturnRepository>,
    settlement: SettlementEngine,
    notifier: Arc<dyn NotificationSink>,
}

impl ReturnWorkflow {
    pub fn new(
        orders: Arc<dyn VendorOrderRepository>,
        returns: Arc<dyn ReturnRepository>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            settlement: SettlementEngine::new(returns.clone()),
            orders,
            returns,
            notifier,
        }
    }

    /// Open a return. `requesting_vendor` is set when a vendor (not an admin) is
    /// acting, and restricts them to their own orders.
    pub async fn create(
        &self,
        new: NewReturn,
        requesting_vendor: Option<Uuid>,
    ) -> CoreResult<ReturnRequest> {
        let reason = new.return_reason.trim();
        if reason.is_empty() {
            return Err(CoreError::ValidationError("return_reason is required".to_string()));
        }
        if new.quantity_returned == 0 {
            return Err(CoreError::ValidationError(
                "quantity_returned must be greater than zero".to_string(),
            ));
        }
        let refund_method = new
            .refund_method
            .as_deref()
            .unwrap_or(REFUND_METHOD_DEPOSIT_CREDIT);
        if refund_method != REFUND_METHOD_DEPOSIT_CREDIT {
            return Err(CoreError::ValidationError(format!(
                "unsupported refund_method '{}'",
                refund_method
            )));
        }

        let order = self
            .orders
            .get_vendor_order(new.vendor_order_id)
            .await?
            .filter(|o| requesting_vendor.map_or(true, |v| o.vendor_id == v))
            .ok_or_else(|| CoreError::NotFound(format!("vendor order {}", new.vendor_order_id)))?;

        if !matches!(order.status, VendorOrderStatus::Shipped | VendorOrderStatus::Delivered) {
            return Err(CoreError::InvalidOperation(format!(
                "vendor order {} is {}; only shipped or delivered orders can be returned",
                order.id, order.status
            )));
        }
        if let Some(existing) = self.returns.find_active_for_order(order.id).await? {
            return Err(CoreError::Conflict(format!(
                "vendor order {} already has return {} ({})",
                order.id, existing.id, existing.status
            )));
        }

        let now = Utc::now();
        let ret = ReturnRequest {
            id: Uuid::new_v4(),
            vendor_order_id: order.id,
            vendor_id: order.vendor_id,
            return_reason: reason.to_string(),
            return_type: new.return_type,
            quantity_returned: new.quantity_returned,
            // Full-order refunds only.
            refund_amount: order.cost,
            refund_method: refund_method.to_string(),
            status: ReturnStatus::Pending,
            images: new.images,
            admin_notes: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.returns.insert_return(&ret).await?;
        tracing::info!(return_id = %ret.id, vendor_order_id = %ret.vendor_order_id, "Return requested");

        dispatch_best_effort(
            self.notifier.clone(),
            NotificationEvent::ReturnRequested(ReturnRequestedEvent {
                return_id: ret.id,
                vendor_id: ret.vendor_id,
                vendor_order_id: ret.vendor_order_id,
                refund_amount: ret.refund_amount,
                timestamp: now.timestamp(),
            }),
        );
        Ok(ret)
    }

    pub async fn approve(&self, return_id: Uuid, actor: &str) -> CoreResult<ApprovedReturn> {
        let ret = self.get(return_id).await?;
        let (receipt, decision) = self
            .settlement
            .settle(SettlementRequest {
                vendor_id: ret.vendor_id,
                return_id: ret.id,
                refund_amount: ret.refund_amount,
                vendor_order_id: ret.vendor_order_id,
                processed_by: actor.to_string(),
            })
            .await?;

        let approved = decision.return_request;
        dispatch_best_effort(
            self.notifier.clone(),
            NotificationEvent::ReturnApproved(ReturnApprovedEvent {
                return_id: approved.id,
                vendor_id: approved.vendor_id,
                vendor_order_id: approved.vendor_order_id,
                refund_amount: approved.refund_amount,
                deposit_balance_after: receipt.balance_after.deposit_balance,
                monthly_debt_after: receipt.balance_after.monthly_debt,
                message: receipt.message.clone(),
                timestamp: Utc::now().timestamp(),
            }),
        );
        Ok(ApprovedReturn {
            return_request: approved,
            settlement: receipt,
        })
    }

    pub async fn reject(&self, return_id: Uuid, actor: &str, reason: &str) -> CoreResult<ReturnRequest> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::ValidationError("a rejection reason is required".to_string()));
        }

        let now = Utc::now();
        let decision = self
            .returns
            .process_return_with(return_id, &|ret, _order, _vendor| {
                ret.reject(actor, reason, now).map(|_| None)
            })
            .await?;
        let rejected = decision.return_request;
        tracing::info!(return_id = %rejected.id, actor = actor, "Return rejected");

        dispatch_best_effort(
            self.notifier.clone(),
            NotificationEvent::ReturnRejected(ReturnRejectedEvent {
                return_id: rejected.id,
                vendor_id: rejected.vendor_id,
                reason: reason.to_string(),
                timestamp: now.timestamp(),
            }),
        );
        Ok(rejected)
    }

    pub async fn get(&self, return_id: Uuid) -> CoreResult<ReturnRequest> {
        self.returns
            .get_return(return_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("return {}", return_id)))
    }

    pub async fn list(&self, filter: &ReturnFilter) -> CoreResult<Vec<ReturnRequest>> {
        self.returns.list_returns(filter).await
    }

    pub async fn analytics(&self, query: &AnalyticsQuery) -> CoreResult<ReturnAnalytics> {
        let mut filter = ReturnFilter {
            vendor_id: query.vendor_id,
            from: query.from,
            to: query.to,
            limit: Some(ReturnFilter::MAX_LIMIT),
            offset: Some(0),
            ..Default::default()
        };

        let mut returns = Vec::new();
        loop {
            let page = self.returns.list_returns(&filter).await?;
            let fetched = page.len() as u32;
            returns.extend(page);
            if fetched < ReturnFilter::MAX_LIMIT {
                break;
            }
            filter.offset = Some(filter.effective_offset() + fetched);
        }

        let total_orders = self
            .orders
            .count_vendor_orders(query.vendor_id, query.from, query.to)
            .await?;
        Ok(summarize(&returns, total_orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{PaymentModel, Vendor, VendorOrder};
    use bazaar_core::LogSink;
    use rust_decimal::Decimal;

    async fn setup(model: PaymentModel, status: VendorOrderStatus) -> (Arc<MemoryStore>, ReturnWorkflow, Vendor, VendorOrder) {
        let store = Arc::new(MemoryStore::new());
        let mut vendor = Vendor::new("Lua Viet", model);
        vendor.deposit_balance = Decimal::from(200_000);
        let mut order = VendorOrder::new(vendor.id, Decimal::from(50_000));
        order.update_status(status);
        store.insert_vendor(vendor.clone()).await;
        store.insert_vendor_order(order.clone()).await;
        let workflow = ReturnWorkflow::new(store.clone(), store.clone(), Arc::new(LogSink));
        (store, workflow, vendor, order)
    }

    fn new_return(order: &VendorOrder) -> NewReturn {
        NewReturn {
            vendor_order_id: order.id,
            return_reason: "Wrong colour".to_string(),
            return_type: ReturnType::WrongItem,
            quantity_returned: 1,
            images: vec!["https://cdn.example.com/r/1.jpg".to_string()],
            refund_method: None,
        }
    }

    #[tokio::test]
    async fn test_create_defaults_refund_to_order_cost() {
        let (_, workflow, vendor, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Delivered).await;

        let ret = workflow.create(new_return(&order), Some(vendor.id)).await.unwrap();

        assert_eq!(ret.refund_amount, Decimal::from(50_000));
        assert_eq!(ret.status, ReturnStatus::Pending);
        assert_eq!(ret.refund_method, "deposit_credit");
    }

    #[tokio::test]
    async fn test_create_rejects_other_vendors_order() {
        let (_, workflow, _, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Delivered).await;

        let err = workflow.create(new_return(&order), Some(Uuid::new_v4())).await.unwrap_err();

        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_requires_shipped_order() {
        let (_, workflow, _, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Processing).await;

        let err = workflow.create(new_return(&order), None).await.unwrap_err();

        assert!(matches!(err, CoreError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_one_open_return_per_order() {
        let (_, workflow, _, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Shipped).await;
        workflow.create(new_return(&order), None).await.unwrap();

        let err = workflow.create(new_return(&order), None).await.unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_approve_settles_and_returns_order() {
        let (store, workflow, vendor, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
        let ret = workflow.create(new_return(&order), None).await.unwrap();

        let approved = workflow.approve(ret.id, "admin-7").await.unwrap();

        assert_eq!(approved.return_request.status, ReturnStatus::Approved);
        assert_eq!(approved.return_request.processed_by.as_deref(), Some("admin-7"));
        assert_eq!(approved.settlement.balance_after.deposit_balance, Decimal::from(250_000));
        let stored_order = store.get_vendor_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, VendorOrderStatus::Returned);
        assert_eq!(store.vendor(vendor.id).await.unwrap().deposit_balance, Decimal::from(250_000));

        let again = workflow.approve(ret.id, "admin-7").await.unwrap_err();
        assert!(matches!(again, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_reject_requires_reason_and_decides_once() {
        let (_, workflow, _, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
        let ret = workflow.create(new_return(&order), None).await.unwrap();

        let err = workflow.reject(ret.id, "admin-1", "   ").await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let rejected = workflow.reject(ret.id, "admin-1", "Item shows no defect").await.unwrap();
        assert_eq!(rejected.status, ReturnStatus::Rejected);
        assert_eq!(rejected.admin_notes.as_deref(), Some("Item shows no defect"));

        let err = workflow.approve(ret.id, "admin-2").await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upfront_approval_keeps_return_pending() {
        let (store, workflow, vendor, order) = setup(PaymentModel::Upfront, VendorOrderStatus::Delivered).await;
        let ret = workflow.create(new_return(&order), None).await.unwrap();

        let err = workflow.approve(ret.id, "admin-1").await.unwrap_err();

        assert!(matches!(err, CoreError::InvalidOperation(_)));
        assert_eq!(workflow.get(ret.id).await.unwrap().status, ReturnStatus::Pending);
        assert_eq!(store.vendor(vendor.id).await.unwrap().deposit_balance, Decimal::from(200_000));
        let stored_order = store.get_vendor_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored_order.status, VendorOrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_analytics_counts_orders_in_scope() {
        let (store, workflow, vendor, order) = setup(PaymentModel::Deposit, VendorOrderStatus::Delivered).await;
        store
            .insert_vendor_order(VendorOrder::new(vendor.id, Decimal::from(10_000)))
            .await;
        workflow.create(new_return(&order), None).await.unwrap();

        let summary = workflow
            .analytics(&AnalyticsQuery {
                vendor_id: Some(vendor.id),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.total_returns, 1);
        assert_eq!(summary.total_orders, 2);
        assert_eq!(summary.return_rate_percentage, Decimal::from(50));
    }
}
