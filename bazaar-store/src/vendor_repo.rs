use crate::rows::{db_err, VendorOrderRow, VendorRow, VENDOR_COLUMNS, VENDOR_ORDER_COLUMNS};
use async_trait::async_trait;
use bazaar_core::CoreResult;
use bazaar_order::models::{Vendor, VendorOrder};
use bazaar_order::repository::VendorOrderRepository;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgVendorOrderRepository {
    pool: PgPool,
}

impl PgVendorOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VendorOrderRepository for PgVendorOrderRepository {
    async fn get_vendor_order(&self, id: Uuid) -> CoreResult<Option<VendorOrder>> {
        let sql = format!("SELECT {} FROM vendor_orders WHERE id = $1", VENDOR_ORDER_COLUMNS);
        sqlx::query_as::<_, VendorOrderRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(VendorOrderRow::into_order)
            .transpose()
    }

    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<Vendor>> {
        let sql = format!("SELECT {} FROM vendors WHERE id = $1", VENDOR_COLUMNS);
        sqlx::query_as::<_, VendorRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .map(VendorRow::into_vendor)
            .transpose()
    }

    async fn count_vendor_orders(
        &self,
        vendor_id: Option<Uuid>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> CoreResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM vendor_orders
            WHERE ($1::uuid IS NULL OR vendor_id = $1)
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            "#,
        )
        .bind(vendor_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count.max(0) as u64)
    }
}
