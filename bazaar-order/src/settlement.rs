use crate::models::{
    Balances, PaymentModel, RefundLedgerEntry, ReturnRequest, Vendor, VendorOrder,
};
use crate::repository::{ReturnDecision, ReturnRepository};
use bazaar_core::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Signed change to a vendor's two balances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub deposit: Decimal,
    pub monthly_debt: Decimal,
}

impl PaymentModel {
    /// Balance change a refund of `refund` causes under this contract.
    pub fn refund_delta(&self, vendor: &Vendor, refund: Decimal) -> CoreResult<BalanceDelta> {
        match self {
            PaymentModel::Deposit => Ok(deposit_delta(refund)),
            PaymentModel::Monthly => Ok(monthly_delta(vendor.monthly_debt, refund)),
            PaymentModel::Upfront => Err(CoreError::InvalidOperation(
                "returns not allowed for upfront model".to_string(),
            )),
            PaymentModel::RevenueShare => Ok(revenue_share_delta(vendor.commission_rate, refund)),
        }
    }
}

fn deposit_delta(refund: Decimal) -> BalanceDelta {
    BalanceDelta {
        deposit: refund,
        monthly_debt: Decimal::ZERO,
    }
}

/// The refund first cancels outstanding debt; only the remainder becomes credit.
fn monthly_delta(debt: Decimal, refund: Decimal) -> BalanceDelta {
    if refund <= debt {
        BalanceDelta {
            deposit: Decimal::ZERO,
            monthly_debt: -refund,
        }
    } else {
        BalanceDelta {
            deposit: refund - debt,
            monthly_debt: -debt,
        }
    }
}

/// Decimal places of the stored balance and ledger columns.
const LEDGER_SCALE: u32 = 2;

/// Only the vendor's commission share of the refund is clawed back, rounded to the
/// ledger scale so the message and the stored balance agree.
fn revenue_share_delta(commission_rate: Decimal, refund: Decimal) -> BalanceDelta {
    let share = (refund * commission_rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(LEDGER_SCALE, RoundingStrategy::MidpointAwayFromZero);
    BalanceDelta {
        deposit: -share,
        monthly_debt: Decimal::ZERO,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub vendor_id: Uuid,
    pub return_id: Uuid,
    pub refund_amount: Decimal,
    pub vendor_order_id: Uuid,
    pub processed_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub success: bool,
    pub balance_after: Balances,
    pub message: String,
    pub ledger_entry_id: Uuid,
}

/// Applies approved refunds to vendor ledgers.
pub struct SettlementEngine {
    returns: Arc<dyn ReturnRepository>,
}

impl SettlementEngine {
    pub fn new(returns: Arc<dyn ReturnRepository>) -> Self {
        Self { returns }
    }

    /// Approve the return and settle it in one unit of work: vendor balances, return
    /// status, order status and the ledger entry commit together or not at all.
    pub async fn settle(&self, request: SettlementRequest) -> CoreResult<(SettlementReceipt, ReturnDecision)> {
        let now = Utc::now();
        let decision = self
            .returns
            .process_return_with(request.return_id, &|ret, order, vendor| {
                Self::apply(&request, ret, order, vendor, now).map(Some)
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(return_id = %request.return_id, vendor_id = %request.vendor_id, "Settlement rejected: {}", e);
            })?;

        let entry = decision.ledger_entry.clone().ok_or_else(|| {
            CoreError::InternalError(format!("settlement of return {} produced no ledger entry", request.return_id))
        })?;

        tracing::info!(
            return_id = %request.return_id,
            vendor_id = %request.vendor_id,
            model = %entry.payment_model,
            "Settlement applied: {}",
            entry.message
        );

        let receipt = SettlementReceipt {
            success: true,
            balance_after: decision.vendor.balances(),
            message: entry.message.clone(),
            ledger_entry_id: entry.id,
        };
        Ok((receipt, decision))
    }

    /// Pure settlement step over locked records. On `Err` the caller discards every
    /// change, so the records are only touched once all checks pass.
    pub fn apply(
        request: &SettlementRequest,
        ret: &mut ReturnRequest,
        order: &mut VendorOrder,
        vendor: &mut Vendor,
        now: DateTime<Utc>,
    ) -> CoreResult<RefundLedgerEntry> {
        ret.ensure_pending()?;

        if ret.vendor_id != request.vendor_id
            || order.id != request.vendor_order_id
            || ret.vendor_order_id != order.id
            || order.vendor_id != vendor.id
            || vendor.id != request.vendor_id
        {
            return Err(CoreError::ValidationError(format!(
                "return {} does not belong to vendor {} and order {}",
                ret.id, request.vendor_id, request.vendor_order_id
            )));
        }

        let refund = request.refund_amount;
        if refund <= Decimal::ZERO {
            return Err(CoreError::ValidationError(
                "refund amount must be positive".to_string(),
            ));
        }
        if refund > order.cost {
            return Err(CoreError::ValidationError(format!(
                "refund amount {} exceeds order cost {}",
                refund, order.cost
            )));
        }

        let before = vendor.balances();
        let delta = vendor.payment_model.refund_delta(vendor, refund)?;

        let mut approved = ret.clone();
        approved.approve(&request.processed_by, now)?;
        let mut returned = order.clone();
        returned.mark_returned(now)?;

        vendor.deposit_balance += delta.deposit;
        vendor.monthly_debt += delta.monthly_debt;
        vendor.updated_at = now;
        *ret = approved;
        *order = returned;

        let after = vendor.balances();
        let message = describe(vendor.payment_model, refund, &delta, &before, &after);

        Ok(RefundLedgerEntry {
            id: Uuid::new_v4(),
            return_id: ret.id,
            vendor_id: vendor.id,
            vendor_order_id: order.id,
            payment_model: vendor.payment_model,
            refund_amount: refund,
            deposit_delta: delta.deposit,
            monthly_debt_delta: delta.monthly_debt,
            deposit_balance_after: after.deposit_balance,
            monthly_debt_after: after.monthly_debt,
            message,
            processed_by: request.processed_by.clone(),
            created_at: now,
        })
    }
}

fn describe(
    model: PaymentModel,
    refund: Decimal,
    delta: &BalanceDelta,
    before: &Balances,
    after: &Balances,
) -> String {
    let mut moves = Vec::new();
    if !delta.monthly_debt.is_zero() {
        moves.push(format!(
            "monthly debt {} by {} ({} -> {})",
            direction(delta.monthly_debt),
            delta.monthly_debt.abs(),
            before.monthly_debt,
            after.monthly_debt
        ));
    }
    if !delta.deposit.is_zero() {
        moves.push(format!(
            "deposit balance {} by {} ({} -> {})",
            direction(delta.deposit),
            delta.deposit.abs(),
            before.deposit_balance,
            after.deposit_balance
        ));
    }
    if moves.is_empty() {
        moves.push("no balance changed".to_string());
    }
    format!("Refund {} under {} model: {}", refund, model, moves.join("; "))
}

fn direction(amount: Decimal) -> &'static str {
    if amount.is_sign_negative() {
        "decreased"
    } else {
        "increased"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{
        ReturnStatus, ReturnType, VendorOrderStatus, REFUND_METHOD_DEPOSIT_CREDIT,
    };
    use crate::repository::ReturnRepository;

    fn vendor(model: PaymentModel, deposit: i64, debt: i64, commission: i64) -> Vendor {
        let mut v = Vendor::new("Gom Su Bat Trang", model);
        v.deposit_balance = Decimal::from(deposit);
        v.monthly_debt = Decimal::from(debt);
        v.commission_rate = Decimal::from(commission);
        v
    }

    fn pending_return(order: &VendorOrder, refund: i64) -> ReturnRequest {
        let now = Utc::now();
        ReturnRequest {
            id: Uuid::new_v4(),
            vendor_order_id: order.id,
            vendor_id: order.vendor_id,
            return_reason: "Chipped rim".to_string(),
            return_type: ReturnType::Damaged,
            quantity_returned: 1,
            refund_amount: Decimal::from(refund),
            refund_method: REFUND_METHOD_DEPOSIT_CREDIT.to_string(),
            status: ReturnStatus::Pending,
            images: vec![],
            admin_notes: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded(v: Vendor, cost: i64, refund: i64) -> (Arc<MemoryStore>, SettlementRequest) {
        let store = Arc::new(MemoryStore::new());
        let mut order = VendorOrder::new(v.id, Decimal::from(cost));
        order.update_status(VendorOrderStatus::Delivered);
        let ret = pending_return(&order, refund);
        let request = SettlementRequest {
            vendor_id: v.id,
            return_id: ret.id,
            refund_amount: ret.refund_amount,
            vendor_order_id: order.id,
            processed_by: "admin-1".to_string(),
        };
        store.insert_vendor(v).await;
        store.insert_vendor_order(order).await;
        store.insert_return(&ret).await.unwrap();
        (store, request)
    }

    #[test]
    fn test_monthly_refund_within_debt() {
        let v = vendor(PaymentModel::Monthly, 10_000, 70_000, 0);
        let delta = PaymentModel::Monthly
            .refund_delta(&v, Decimal::from(30_000))
            .unwrap();
        assert_eq!(delta.monthly_debt, Decimal::from(-30_000));
        assert_eq!(delta.deposit, Decimal::ZERO);
    }

    #[test]
    fn test_monthly_refund_beyond_debt() {
        let v = vendor(PaymentModel::Monthly, 10_000, 20_000, 0);
        let delta = PaymentModel::Monthly
            .refund_delta(&v, Decimal::from(50_000))
            .unwrap();
        assert_eq!(delta.monthly_debt, Decimal::from(-20_000));
        assert_eq!(delta.deposit, Decimal::from(30_000));
    }

    #[test]
    fn test_revenue_share_deducts_commission_share() {
        let mut v = vendor(PaymentModel::RevenueShare, 500_000, 0, 0);
        v.commission_rate = Decimal::new(125, 1); // 12.5%
        let delta = PaymentModel::RevenueShare
            .refund_delta(&v, Decimal::from(80_000))
            .unwrap();
        assert_eq!(delta.deposit, Decimal::from(-10_000));
    }

    #[test]
    fn test_revenue_share_rounds_to_ledger_scale() {
        let mut v = vendor(PaymentModel::RevenueShare, 500_000, 0, 0);
        v.commission_rate = Decimal::new(125, 1);
        let delta = PaymentModel::RevenueShare
            .refund_delta(&v, Decimal::from(33_333))
            .unwrap();
        assert_eq!(delta.deposit, Decimal::new(-416_663, 2));
    }

    #[tokio::test]
    async fn test_revenue_share_settlement_message_matches_stored_balance() {
        let mut v = vendor(PaymentModel::RevenueShare, 500_000, 0, 0);
        v.commission_rate = Decimal::new(125, 1);
        let (store, request) = seeded(v, 100_000, 33_333).await;
        let engine = SettlementEngine::new(store.clone());

        let (receipt, _) = engine.settle(request).await.unwrap();

        assert_eq!(receipt.balance_after.deposit_balance, Decimal::new(49_583_337, 2));
        assert_eq!(
            receipt.message,
            "Refund 33333 under revenue_share model: deposit balance decreased by 4166.63 (500000 -> 495833.37)"
        );
        let ledger = store.ledger().await;
        assert_eq!(ledger[0].deposit_delta, Decimal::new(-416_663, 2));
        assert_eq!(ledger[0].deposit_balance_after, receipt.balance_after.deposit_balance);
    }

    #[test]
    fn test_upfront_is_rejected() {
        let v = vendor(PaymentModel::Upfront, 0, 0, 0);
        let err = PaymentModel::Upfront
            .refund_delta(&v, Decimal::from(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid operation: returns not allowed for upfront model");
    }

    #[tokio::test]
    async fn test_deposit_settlement_commits_everything() {
        let (store, request) = seeded(vendor(PaymentModel::Deposit, 200_000, 0, 0), 100_000, 50_000).await;
        let engine = SettlementEngine::new(store.clone());

        let (receipt, decision) = engine.settle(request.clone()).await.unwrap();

        assert!(receipt.success);
        assert_eq!(receipt.balance_after.deposit_balance, Decimal::from(250_000));
        assert_eq!(decision.return_request.status, ReturnStatus::Approved);
        assert_eq!(decision.vendor_order.status, VendorOrderStatus::Returned);
        assert_eq!(
            receipt.message,
            "Refund 50000 under deposit model: deposit balance increased by 50000 (200000 -> 250000)"
        );

        let ledger = store.ledger().await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].id, receipt.ledger_entry_id);
        assert_eq!(ledger[0].deposit_balance_after, Decimal::from(250_000));
    }

    #[tokio::test]
    async fn test_second_settlement_does_not_double_credit() {
        let (store, request) = seeded(vendor(PaymentModel::Monthly, 0, 20_000, 0), 100_000, 50_000).await;
        let engine = SettlementEngine::new(store.clone());
        let vendor_id = request.vendor_id;

        engine.settle(request.clone()).await.unwrap();
        let err = engine.settle(request).await.unwrap_err();

        assert!(matches!(err, CoreError::Conflict(_)));
        let v = store.vendor(vendor_id).await.unwrap();
        assert_eq!(v.monthly_debt, Decimal::ZERO);
        assert_eq!(v.deposit_balance, Decimal::from(30_000));
        assert_eq!(store.ledger().await.len(), 1);
    }

    #[tokio::test]
    async fn test_upfront_settlement_leaves_state_untouched() {
        let (store, request) = seeded(vendor(PaymentModel::Upfront, 300_000, 0, 0), 100_000, 80_000).await;
        let engine = SettlementEngine::new(store.clone());

        let err = engine.settle(request.clone()).await.unwrap_err();

        assert!(matches!(err, CoreError::InvalidOperation(_)));
        let v = store.vendor(request.vendor_id).await.unwrap();
        assert_eq!(v.deposit_balance, Decimal::from(300_000));
        let ret = store.get_return(request.return_id).await.unwrap().unwrap();
        assert_eq!(ret.status, ReturnStatus::Pending);
        assert!(store.ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_refund_above_cost_is_rejected() {
        let (store, mut request) = seeded(vendor(PaymentModel::Deposit, 0, 0, 0), 100_000, 100_000).await;
        request.refund_amount = Decimal::from(100_001);
        let engine = SettlementEngine::new(store.clone());

        let err = engine.settle(request).await.unwrap_err();

        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(store.ledger().await.is_empty());
    }
}
