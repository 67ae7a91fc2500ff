use crate::rows::{
    db_err, lock_vendor_order, write_vendor_order, HistoryRow, ShipmentRow, SHIPMENT_COLUMNS,
};
use async_trait::async_trait;
use bazaar_core::{CoreError, CoreResult};
use bazaar_order::lifecycle::{Disposition, SyncOutcome};
use bazaar_order::models::{Shipment, StatusHistoryEntry, VendorOrder};
use bazaar_order::repository::{ShipmentMutation, ShipmentRepository};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

const HISTORY_SQL: &str = r#"
    SELECT status, carrier_status, occurred_at, location, note, source, recorded_at
    FROM shipment_status_history
    WHERE shipment_id = $1
    ORDER BY occurred_at, id
"#;

pub struct PgShipmentRepository {
    pool: PgPool,
}

impl PgShipmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_history(&self, row: Option<ShipmentRow>) -> CoreResult<Option<Shipment>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let history = sqlx::query_as::<_, HistoryRow>(HISTORY_SQL)
            .bind(row.id())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        row.into_shipment(history).map(Some)
    }
}

async fn insert_history(
    tx: &mut Transaction<'_, Postgres>,
    shipment_id: Uuid,
    entries: &[&StatusHistoryEntry],
) -> CoreResult<()> {
    for entry in entries {
        sqlx::query(
            r#"
            INSERT INTO shipment_status_history
                (shipment_id, status, carrier_status, occurred_at, location, note, source, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(shipment_id)
        .bind(entry.status.as_str())
        .bind(&entry.carrier_status)
        .bind(entry.occurred_at)
        .bind(&entry.location)
        .bind(&entry.note)
        .bind(entry.source.as_str())
        .bind(entry.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}

#[async_trait]
impl ShipmentRepository for PgShipmentRepository {
    async fn find_by_tracking_code(&self, tracking_code: &str) -> CoreResult<Option<Shipment>> {
        let sql = format!("SELECT {} FROM shipments WHERE tracking_code = $1", SHIPMENT_COLUMNS);
        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(tracking_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        self.with_history(row).await
    }

    async fn find_by_vendor_order(&self, vendor_order_id: Uuid) -> CoreResult<Option<Shipment>> {
        let sql = format!("SELECT {} FROM shipments WHERE vendor_order_id = $1", SHIPMENT_COLUMNS);
        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(vendor_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        self.with_history(row).await
    }

    async fn insert_shipment(&self, shipment: &Shipment, order: &VendorOrder) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO shipments
                (id, vendor_order_id, carrier, tracking_code, status, total_fee,
                 estimated_delivery_date, label_url, metadata, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.vendor_order_id)
        .bind(&shipment.carrier)
        .bind(&shipment.tracking_code)
        .bind(shipment.status.as_str())
        .bind(shipment.total_fee)
        .bind(shipment.estimated_delivery_date)
        .bind(&shipment.label_url)
        .bind(&shipment.metadata)
        .bind(shipment.version)
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let entries: Vec<&StatusHistoryEntry> = shipment.status_history.iter().collect();
        insert_history(&mut tx, shipment.id, &entries).await?;
        write_vendor_order(&mut tx, order).await?;

        tx.commit().await.map_err(db_err)
    }

    async fn update_shipment_with(
        &self,
        tracking_code: &str,
        mutation: ShipmentMutation<'_>,
    ) -> CoreResult<(Shipment, SyncOutcome)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let sql = format!(
            "SELECT {} FROM shipments WHERE tracking_code = $1 FOR UPDATE",
            SHIPMENT_COLUMNS
        );
        let row = sqlx::query_as::<_, ShipmentRow>(&sql)
            .bind(tracking_code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| CoreError::NotFound(format!("shipment {}", tracking_code)))?;
        let history = sqlx::query_as::<_, HistoryRow>(HISTORY_SQL)
            .bind(row.id())
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err)?;
        let mut shipment = row.into_shipment(history)?;

        let mut order = lock_vendor_order(&mut tx, shipment.vendor_order_id)
            .await?
            .ok_or_else(|| {
                CoreError::InternalError(format!(
                    "shipment {} references missing vendor order {}",
                    tracking_code, shipment.vendor_order_id
                ))
            })?;

        let seen: HashSet<(String, DateTime<Utc>)> = shipment
            .status_history
            .iter()
            .map(|e| (e.carrier_status.clone(), e.occurred_at))
            .collect();
        let expected_version = shipment.version;

        let outcome = mutation(&mut shipment, &mut order)?;
        if outcome.disposition == Disposition::Duplicate {
            return Ok((shipment, outcome));
        }

        let updated = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $2, estimated_delivery_date = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(shipment.id)
        .bind(shipment.status.as_str())
        .bind(shipment.estimated_delivery_date)
        .bind(shipment.updated_at)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if updated.rows_affected() == 0 {
            return Err(CoreError::Conflict(format!(
                "shipment {} was modified concurrently",
                tracking_code
            )));
        }

        let fresh: Vec<&StatusHistoryEntry> = shipment
            .status_history
            .iter()
            .filter(|e| !seen.contains(&(e.carrier_status.clone(), e.occurred_at)))
            .collect();
        insert_history(&mut tx, shipment.id, &fresh).await?;
        write_vendor_order(&mut tx, &order).await?;

        tx.commit().await.map_err(db_err)?;
        shipment.version = expected_version + 1;
        Ok((shipment, outcome))
    }

    async fn set_label_url(&self, tracking_code: &str, label_url: &str) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE shipments SET label_url = $2, version = version + 1, updated_at = NOW() WHERE tracking_code = $1",
        )
        .bind(tracking_code)
        .bind(label_url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("shipment {}", tracking_code)));
        }
        Ok(())
    }
}
