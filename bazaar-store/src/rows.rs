//! Row types and conversions shared by the Postgres repositories.

use bazaar_core::{CoreError, CoreResult};
use bazaar_order::models::{
    RefundLedgerEntry, ReturnRequest, Shipment, StatusHistoryEntry, Vendor, VendorOrder,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const VENDOR_ORDER_COLUMNS: &str = "id, vendor_id, cost, status, processing_at, shipped_at, delivered_at, cancelled_at, returned_at, created_at, updated_at";
pub(crate) const VENDOR_COLUMNS: &str =
    "id, name, payment_model, deposit_balance, monthly_debt, commission_rate, updated_at";
pub(crate) const SHIPMENT_COLUMNS: &str = "id, vendor_order_id, carrier, tracking_code, status, total_fee, estimated_delivery_date, label_url, metadata, version, created_at, updated_at";
pub(crate) const RETURN_COLUMNS: &str = "id, vendor_order_id, vendor_id, return_reason, return_type, quantity_returned, refund_amount, refund_method, status, images, admin_notes, processed_by, processed_at, created_at, updated_at";
pub(crate) const LEDGER_COLUMNS: &str = "id, return_id, vendor_id, vendor_order_id, payment_model, refund_amount, deposit_delta, monthly_debt_delta, deposit_balance_after, monthly_debt_after, message, processed_by, created_at";

/// Unique violations become `Conflict`; everything else is internal.
pub(crate) fn db_err(e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return CoreError::Conflict(db.message().to_string());
        }
    }
    tracing::error!("Database error: {}", e);
    CoreError::InternalError(format!("database error: {}", e))
}

fn parse<T: FromStr<Err = String>>(raw: &str) -> CoreResult<T> {
    raw.parse::<T>().map_err(CoreError::InternalError)
}

#[derive(sqlx::FromRow)]
pub(crate) struct VendorRow {
    id: Uuid,
    name: String,
    payment_model: String,
    deposit_balance: Decimal,
    monthly_debt: Decimal,
    commission_rate: Decimal,
    updated_at: DateTime<Utc>,
}

impl VendorRow {
    /// An unknown payment model is a configuration fault, never a silent default.
    pub(crate) fn into_vendor(self) -> CoreResult<Vendor> {
        Ok(Vendor {
            payment_model: parse(&self.payment_model).map_err(|_| {
                CoreError::InternalError(format!(
                    "vendor {} has unknown payment model '{}'",
                    self.id, self.payment_model
                ))
            })?,
            id: self.id,
            name: self.name,
            deposit_balance: self.deposit_balance,
            monthly_debt: self.monthly_debt,
            commission_rate: self.commission_rate,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct VendorOrderRow {
    id: Uuid,
    vendor_id: Uuid,
    cost: Decimal,
    status: String,
    processing_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    returned_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VendorOrderRow {
    pub(crate) fn into_order(self) -> CoreResult<VendorOrder> {
        Ok(VendorOrder {
            id: self.id,
            vendor_id: self.vendor_id,
            cost: self.cost,
            status: parse(&self.status)?,
            processing_at: self.processing_at,
            shipped_at: self.shipped_at,
            delivered_at: self.delivered_at,
            cancelled_at: self.cancelled_at,
            returned_at: self.returned_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ShipmentRow {
    id: Uuid,
    vendor_order_id: Uuid,
    carrier: String,
    tracking_code: String,
    status: String,
    total_fee: Decimal,
    estimated_delivery_date: Option<DateTime<Utc>>,
    label_url: Option<String>,
    metadata: Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    status: String,
    carrier_status: String,
    occurred_at: DateTime<Utc>,
    location: Option<String>,
    note: Option<String>,
    source: String,
    recorded_at: DateTime<Utc>,
}

impl HistoryRow {
    fn into_entry(self) -> CoreResult<StatusHistoryEntry> {
        Ok(StatusHistoryEntry {
            status: parse(&self.status)?,
            carrier_status: self.carrier_status,
            occurred_at: self.occurred_at,
            location: self.location,
            note: self.note,
            source: parse(&self.source)?,
            recorded_at: self.recorded_at,
        })
    }
}

impl ShipmentRow {
    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn into_shipment(self, history: Vec<HistoryRow>) -> CoreResult<Shipment> {
        Ok(Shipment {
            id: self.id,
            vendor_order_id: self.vendor_order_id,
            carrier: self.carrier,
            tracking_code: self.tracking_code,
            status: parse(&self.status)?,
            status_history: history
                .into_iter()
                .map(HistoryRow::into_entry)
                .collect::<CoreResult<Vec<_>>>()?,
            total_fee: self.total_fee,
            estimated_delivery_date: self.estimated_delivery_date,
            label_url: self.label_url,
            metadata: self.metadata,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReturnRow {
    id: Uuid,
    vendor_order_id: Uuid,
    vendor_id: Uuid,
    return_reason: String,
    return_type: String,
    quantity_returned: i32,
    refund_amount: Decimal,
    refund_method: String,
    status: String,
    images: Value,
    admin_notes: Option<String>,
    processed_by: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReturnRow {
    pub(crate) fn into_return(self) -> CoreResult<ReturnRequest> {
        Ok(ReturnRequest {
            id: self.id,
            vendor_order_id: self.vendor_order_id,
            vendor_id: self.vendor_id,
            return_reason: self.return_reason,
            return_type: parse(&self.return_type)?,
            quantity_returned: u32::try_from(self.quantity_returned).map_err(|_| {
                CoreError::InternalError(format!("return {} has negative quantity", self.id))
            })?,
            refund_amount: self.refund_amount,
            refund_method: self.refund_method,
            status: parse(&self.status)?,
            images: serde_json::from_value(self.images)
                .map_err(|e| CoreError::InternalError(format!("return {} images: {}", self.id, e)))?,
            admin_notes: self.admin_notes,
            processed_by: self.processed_by,
            processed_at: self.processed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct LedgerRow {
    id: Uuid,
    return_id: Uuid,
    vendor_id: Uuid,
    vendor_order_id: Uuid,
    payment_model: String,
    refund_amount: Decimal,
    deposit_delta: Decimal,
    monthly_debt_delta: Decimal,
    deposit_balance_after: Decimal,
    monthly_debt_after: Decimal,
    message: String,
    processed_by: String,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    pub(crate) fn into_entry(self) -> CoreResult<RefundLedgerEntry> {
        Ok(RefundLedgerEntry {
            id: self.id,
            return_id: self.return_id,
            vendor_id: self.vendor_id,
            vendor_order_id: self.vendor_order_id,
            payment_model: parse(&self.payment_model)?,
            refund_amount: self.refund_amount,
            deposit_delta: self.deposit_delta,
            monthly_debt_delta: self.monthly_debt_delta,
            deposit_balance_after: self.deposit_balance_after,
            monthly_debt_after: self.monthly_debt_after,
            message: self.message,
            processed_by: self.processed_by,
            created_at: self.created_at,
        })
    }
}

/// Persist every mutable column of a vendor order.
pub(crate) async fn write_vendor_order(
    tx: &mut Transaction<'_, Postgres>,
    order: &VendorOrder,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE vendor_orders
        SET status = $2, processing_at = $3, shipped_at = $4, delivered_at = $5,
            cancelled_at = $6, returned_at = $7, updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.processing_at)
    .bind(order.shipped_at)
    .bind(order.delivered_at)
    .bind(order.cancelled_at)
    .bind(order.returned_at)
    .bind(order.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

pub(crate) async fn lock_vendor_order(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> CoreResult<Option<VendorOrder>> {
    let sql = format!("SELECT {} FROM vendor_orders WHERE id = $1 FOR UPDATE", VENDOR_ORDER_COLUMNS);
    sqlx::query_as::<_, VendorOrderRow>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err)?
        .map(VendorOrderRow::into_order)
        .transpose()
}
