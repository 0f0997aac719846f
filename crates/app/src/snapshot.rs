use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::histogram;
use thiserror::Error;

use inventory_core::{MetricsSnapshot, SnapshotInputs, StockCounts, LOW_STOCK_LIMIT};
use inventory_storage::{Database, MetricsError};

/// Computes the KPI snapshot for one warehouse from current store contents.
///
/// The six reads are independent statements with no surrounding transaction,
/// so a concurrent write may land between two of them. Unknown warehouses
/// produce a zeroed snapshot.
pub async fn build_metrics_snapshot(
    database: &Database,
    warehouse_id: i64,
    now: DateTime<Utc>,
) -> Result<MetricsSnapshot, SnapshotError> {
    let started = Instant::now();
    let repo = database.stock_metrics();

    let products_total = repo.count_products(warehouse_id).await?;
    let categories_total = repo.count_categories(warehouse_id).await?;
    let items_total = repo.total_items(warehouse_id).await?;
    let capacity = repo.capacity_totals(warehouse_id).await?;
    let category_counts = repo.category_counts(warehouse_id).await?;
    let low_stock = repo.low_stock(warehouse_id, LOW_STOCK_LIMIT).await?;

    histogram!("snapshot_build_seconds").record(started.elapsed().as_secs_f64());

    Ok(MetricsSnapshot::assemble(
        warehouse_id,
        now,
        SnapshotInputs {
            counts: StockCounts {
                products_total,
                categories_total,
                items_total,
            },
            capacity_used: capacity.used,
            capacity_max: capacity.max,
            category_counts,
            low_stock,
        },
    ))
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("backing store unavailable: {0}")]
    Store(#[from] MetricsError),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use inventory_storage::Database;
    use tempfile::TempDir;

    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("app.db").display());
        let db = Database::connect(&url).await.expect("connect");
        db.run_migrations().await.expect("migrations");
        (db, dir)
    }

    pub async fn exec(db: &Database, sql: &str) {
        sqlx::query(sql)
            .execute(db.pool())
            .await
            .unwrap_or_else(|err| panic!("failed to execute `{sql}`: {err}"));
    }

    /// Warehouse 1 holding A (5 on hand, min 10, max 100) and B (50 on hand,
    /// min 5, no max). C exists without stock.
    pub async fn seed_reference_warehouse(db: &Database) {
        exec(db, "INSERT INTO warehouses (id, name, address) VALUES (1, 'W', 'Main St')").await;
        exec(db, "INSERT INTO categories (id, name) VALUES (1, 'dairy'), (2, 'bakery')").await;
        exec(
            db,
            "INSERT INTO products (id, name, category_id, min_stock, max_stock) VALUES \
             (1, 'A', 1, 10, 100), \
             (2, 'B', NULL, 5, NULL), \
             (3, 'C', 2, 1, 10)",
        )
        .await;
        exec(
            db,
            "INSERT INTO stocks (warehouse_id, product_id, quantity) VALUES (1, 1, 5), (1, 2, 50)",
        )
        .await;
    }
}
