use crate::rows::{
    db_err, lock_vendor_order, write_vendor_order, LedgerRow, ReturnRow, VendorRow,
    LEDGER_COLUMNS, RETURN_COLUMNS, VENDOR_COLUMNS,
};
use async_trait::async_trait;
use bazaar_core::{CoreError, CoreResult};
use bazaar_order::models::{RefundLedgerEntry, ReturnRequest};
use bazaar_order::repository::{ReturnDecision, ReturnFilter, ReturnMutation, ReturnRepository};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgReturnRepository {
    pool: PgPool,
}

impl PgReturnRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReturnRepository for PgReturnRepository {
    async fn insert_return(&self, ret: &ReturnRequest) -> CoreResult<()> {
        let images = serde_json::to_value(&ret.images)
            .map_err(|e| CoreError::InternalError(format!("encode images: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO vendor_returns
                (id, vendor_order_id, vendor_id, return_reason, return_type, quantity_returned,
                 refund_amount, refund_method, status, images, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(ret.id)
        .bind(ret.vendor_order_id)
        .bind(ret.vendor_id)
        .bind(&ret.return_reason)
        .bind(ret.return_type.as_str())
        .bind(ret.quantity_returned as i32)
        .bind(ret.refund_amount)
        .bind(&ret.refund_method)
        .bind(ret.status.as_str())
        .bind(images)
        .bind(ret.created_at)
        .bind(ret.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match db_err(e) {
            CoreError::Conflict(_) => CoreError::Conflict(format!(
                "vendor order {} already has an open return",
                ret.vendor_order_id
            )),
            other => other,
        })?;
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> CoreResult<Option<ReturnRequest>> {
        let sql = format!("SELECT {} FROM vendor_returns WHERE id = $1", RETURN_COLUMNS);
        sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(ReturnRow::into_return)
            .transpose()
    }

    async fn find_active_for_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<ReturnRequest>> {
        let sql = format!(
            "SELECT {} FROM vendor_returns WHERE vendor_order_id = $1 AND status IN ('pending', 'approved') LIMIT 1",
            RETURN_COLUMNS
        );
        sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(vendor_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(ReturnRow::into_return)
            .transpose()
    }

    async fn list_returns(&self, filter: &ReturnFilter) -> CoreResult<Vec<ReturnRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM vendor_returns
            WHERE ($1::uuid IS NULL OR vendor_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
            RETURN_COLUMNS
        );
        let rows = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(filter.vendor_id)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.from)
            .bind(filter.to)
            .bind(i64::from(filter.effective_limit()))
            .bind(i64::from(filter.effective_offset()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(ReturnRow::into_return).collect()
    }

    async fn process_return_with(
        &self,
        return_id: Uuid,
        mutation: ReturnMutation<'_>,
    ) -> CoreResult<ReturnDecision> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Lock order: return, vendor order, vendor.
        let sql = format!("SELECT {} FROM vendor_returns WHERE id = $1 FOR UPDATE", RETURN_COLUMNS);
        let mut ret = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(return_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("return {}", return_id)))?
            .into_return()?;

        let mut order = lock_vendor_order(&mut tx, ret.vendor_order_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("vendor order {}", ret.vendor_order_id)))?;

        let sql = format!("SELECT {} FROM vendors WHERE id = $1 FOR UPDATE", VENDOR_COLUMNS);
        let mut vendor = sqlx::query_as::<_, VendorRow>(&sql)
            .bind(ret.vendor_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("vendor {}", ret.vendor_id)))?
            .into_vendor()?;

        // Dropping `tx` on any error below rolls everything back.
        let ledger_entry = mutation(&mut ret, &mut order, &mut vendor)?;

        sqlx::query(
            r#"
            UPDATE vendor_returns
            SET status = $2, admin_notes = $3, processed_by = $4, processed_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(ret.id)
        .bind(ret.status.as_str())
        .bind(&ret.admin_notes)
        .bind(&ret.processed_by)
        .bind(ret.processed_at)
        .bind(ret.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        write_vendor_order(&mut tx, &order).await?;

        sqlx::query(
            "UPDATE vendors SET deposit_balance = $2, monthly_debt = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(vendor.id)
        .bind(vendor.deposit_balance)
        .bind(vendor.monthly_debt)
        .bind(vendor.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(entry) = &ledger_entry {
            sqlx::query(
                r#"
                INSERT INTO refund_ledger
                    (id, return_id, vendor_id, vendor_order_id, payment_model, refund_amount,
                     deposit_delta, monthly_debt_delta, deposit_balance_after, monthly_debt_after,
                     message, processed_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(entry.id)
            .bind(entry.return_id)
            .bind(entry.vendor_id)
            .bind(entry.vendor_order_id)
            .bind(entry.payment_model.as_str())
            .bind(entry.refund_amount)
            .bind(entry.deposit_delta)
            .bind(entry.monthly_debt_delta)
            .bind(entry.deposit_balance_after)
            .bind(entry.monthly_debt_after)
            .bind(&entry.message)
            .bind(&entry.processed_by)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;

        Ok(ReturnDecision {
            return_request: ret,
            vendor_order: order,
            vendor,
            ledger_entry,
        })
    }

    async fn get_ledger_entry(&self, return_id: Uuid) -> CoreResult<Option<RefundLedgerEntry>> {
        let sql = format!("SELECT {} FROM refund_ledger WHERE return_id = $1", LEDGER_COLUMNS);
        sqlx::query_as::<_, LedgerRow>(&sql)
            .bind(return_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(LedgerRow::into_entry)
            .transpose()
    }
}
