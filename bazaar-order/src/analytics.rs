use crate::models::ReturnRequest;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReturnAnalytics {
    pub total_returns: u64,
    pub by_status: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
    pub total_refund_amount: Decimal,
    pub average_refund_amount: Decimal,
    pub total_orders: u64,
    pub return_rate_percentage: Decimal,
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Aggregate a period's returns against the number of orders in the same period.
pub fn summarize(returns: &[ReturnRequest], total_orders: u64) -> ReturnAnalytics {
    let mut by_status = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    let mut total_refund = Decimal::ZERO;

    for ret in returns {
        *by_status.entry(ret.status.to_string()).or_insert(0) += 1;
        *by_type.entry(ret.return_type.to_string()).or_insert(0) += 1;
        total_refund += ret.refund_amount;
    }

    let total_returns = returns.len() as u64;
    let average = if total_returns == 0 {
        Decimal::ZERO
    } else {
        total_refund / Decimal::from(total_returns)
    };
    let rate = if total_orders == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(total_returns) * Decimal::ONE_HUNDRED / Decimal::from(total_orders)
    };

    ReturnAnalytics {
        total_returns,
        by_status,
        by_type,
        total_refund_amount: round2(total_refund),
        average_refund_amount: round2(average),
        total_orders,
        return_rate_percentage: round2(rate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReturnStatus, ReturnType, REFUND_METHOD_DEPOSIT_CREDIT};
    use chrono::Utc;
    use uuid::Uuid;

    fn ret(status: ReturnStatus, return_type: ReturnType, refund: i64) -> ReturnRequest {
        let now = Utc::now();
        ReturnRequest {
            id: Uuid::new_v4(),
            vendor_order_id: Uuid::new_v4(),
            vendor_id: Uuid::new_v4(),
            return_reason: "n/a".to_string(),
            return_type,
            quantity_returned: 1,
            refund_amount: Decimal::from(refund),
            refund_method: REFUND_METHOD_DEPOSIT_CREDIT.to_string(),
            status,
            images: vec![],
            admin_notes: None,
            processed_by: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_summary_counts_and_rate() {
        let returns = vec![
            ret(ReturnStatus::Approved, ReturnType::Damaged, 100_000),
            ret(ReturnStatus::Pending, ReturnType::Damaged, 50_000),
            ret(ReturnStatus::Rejected, ReturnType::WrongItem, 10_000),
        ];

        let summary = summarize(&returns, 7);

        assert_eq!(summary.total_returns, 3);
        assert_eq!(summary.by_status.get("approved"), Some(&1));
        assert_eq!(summary.by_type.get("damaged"), Some(&2));
        assert_eq!(summary.total_refund_amount, Decimal::from(160_000));
        assert_eq!(summary.average_refund_amount, Decimal::new(5_333_333, 2));
        assert_eq!(summary.return_rate_percentage, Decimal::new(4_286, 2));
    }

    #[test]
    fn test_empty_period() {
        let summary = summarize(&[], 0);
        assert_eq!(summary.total_returns, 0);
        assert_eq!(summary.average_refund_amount, Decimal::ZERO);
        assert_eq!(summary.return_rate_percentage, Decimal::ZERO);
    }
}
