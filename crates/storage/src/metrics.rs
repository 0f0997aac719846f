use sqlx::SqlitePool;
use thiserror::Error;

use inventory_core::{CategoryCount, LowStockItem};

/// Read-only queries feeding the warehouse KPI snapshot.
///
/// Every method is a single statement against the shared pool. Nothing checks
/// that the warehouse exists, so an unknown identifier reads as an empty
/// warehouse.
#[derive(Clone)]
pub struct StockMetricsRepository {
    pool: SqlitePool,
}

/// Quantity on hand versus configured maximum, restricted to products that
/// have a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, sqlx::FromRow)]
pub struct CapacityTotals {
    pub used: i64,
    #[sqlx(rename = "max_capacity")]
    pub max: i64,
}

impl StockMetricsRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of distinct products with a stock row in the warehouse.
    pub async fn count_products(&self, warehouse_id: i64) -> Result<i64, MetricsError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT s.product_id) FROM stocks AS s WHERE s.warehouse_id = ?",
        )
        .bind(warehouse_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Number of distinct categories among the stocked products. Products
    /// without a category do not contribute.
    pub async fn count_categories(&self, warehouse_id: i64) -> Result<i64, MetricsError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT p.category_id) \
               FROM stocks AS s \
               JOIN products AS p ON p.id = s.product_id \
              WHERE s.warehouse_id = ?",
        )
        .bind(warehouse_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Total quantity on hand.
    pub async fn total_items(&self, warehouse_id: i64) -> Result<i64, MetricsError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(s.quantity), 0) FROM stocks AS s WHERE s.warehouse_id = ?",
        )
        .bind(warehouse_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    pub async fn capacity_totals(&self, warehouse_id: i64) -> Result<CapacityTotals, MetricsError> {
        let totals = sqlx::query_as::<_, CapacityTotals>(
            "SELECT COALESCE(SUM(s.quantity), 0) AS used, \
                    COALESCE(SUM(p.max_stock), 0) AS max_capacity \
               FROM stocks AS s \
               JOIN products AS p ON p.id = s.product_id \
              WHERE s.warehouse_id = ? \
                AND p.max_stock IS NOT NULL",
        )
        .bind(warehouse_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(totals)
    }

    /// Stock rows grouped by category. The uncategorised group comes back
    /// with a `None` name.
    pub async fn category_counts(&self, warehouse_id: i64) -> Result<Vec<CategoryCount>, MetricsError> {
        let rows = sqlx::query_as::<_, CategoryCountRow>(
            r#"
SELECT c.name   AS name,
       COUNT(*) AS item_count
  FROM stocks AS s
  JOIN products AS p ON p.id = s.product_id
  LEFT JOIN categories AS c ON c.id = p.category_id
 WHERE s.warehouse_id = ?
 GROUP BY c.id
 ORDER BY item_count DESC
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryCount {
                name: row.name,
                count: row.item_count,
            })
            .collect())
    }

    /// Products below their configured minimum, most urgent first.
    pub async fn low_stock(
        &self,
        warehouse_id: i64,
        limit: usize,
    ) -> Result<Vec<LowStockItem>, MetricsError> {
        let rows = sqlx::query_as::<_, LowStockRow>(
            r#"
SELECT p.id        AS product_id,
       p.name      AS name,
       s.quantity  AS quantity,
       p.min_stock AS min_stock
  FROM stocks AS s
  JOIN products AS p ON p.id = s.product_id
 WHERE s.warehouse_id = ?
   AND p.min_stock IS NOT NULL
   AND s.quantity < p.min_stock
 ORDER BY (p.min_stock - s.quantity) DESC, p.id ASC
 LIMIT ?
            "#,
        )
        .bind(warehouse_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LowStockItem::new(row.product_id, row.name, row.quantity, row.min_stock))
            .collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryCountRow {
    name: Option<String>,
    item_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LowStockRow {
    product_id: i64,
    name: String,
    quantity: i64,
    min_stock: i64,
}

/// Errors surfaced by the KPI queries.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{exec, setup_db};
    use crate::Database;

    async fn seed_scenario(db: &Database) {
        exec(db, "INSERT INTO warehouses (id, name) VALUES (1, 'W')").await;
        exec(db, "INSERT INTO categories (id, name) VALUES (1, 'dairy')").await;
        exec(
            db,
            "INSERT INTO products (id, name, category_id, min_stock, max_stock) VALUES \
             (1, 'A', 1, 10, 100), \
             (2, 'B', NULL, 5, NULL), \
             (3, 'C', 1, 1, 10)",
        )
        .await;
        exec(
            db,
            "INSERT INTO stocks (warehouse_id, product_id, quantity) VALUES (1, 1, 5), (1, 2, 50)",
        )
        .await;
    }

    #[tokio::test]
    async fn counts_and_capacity_follow_scenario() {
        let (db, _dir) = setup_db().await;
        seed_scenario(&db).await;
        let repo = db.stock_metrics();

        assert_eq!(repo.count_products(1).await.unwrap(), 2);
        assert_eq!(repo.count_categories(1).await.unwrap(), 1);
        assert_eq!(repo.total_items(1).await.unwrap(), 55);
        assert_eq!(
            repo.capacity_totals(1).await.unwrap(),
            CapacityTotals { used: 5, max: 100 }
        );
    }

    #[tokio::test]
    async fn category_counts_include_uncategorized_group() {
        let (db, _dir) = setup_db().await;
        seed_scenario(&db).await;

        let mut groups = db.stock_metrics().category_counts(1).await.unwrap();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            groups,
            vec![
                CategoryCount {
                    name: None,
                    count: 1
                },
                CategoryCount {
                    name: Some("dairy".into()),
                    count: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn low_stock_only_lists_products_below_minimum() {
        let (db, _dir) = setup_db().await;
        seed_scenario(&db).await;

        let items = db.stock_metrics().low_stock(1, 10).await.unwrap();
        assert_eq!(items, vec![LowStockItem::new(1, "A".into(), 5, 10)]);
        assert_eq!(items[0].deficit, 5);
    }

    #[tokio::test]
    async fn low_stock_orders_by_deficit_and_respects_limit() {
        let (db, _dir) = setup_db().await;
        exec(&db, "INSERT INTO warehouses (id, name) VALUES (1, 'W')").await;
        for id in 1..=12 {
            exec(
                &db,
                &format!(
                    "INSERT INTO products (id, name, min_stock) VALUES ({id}, 'p{id}', {})",
                    id * 2
                ),
            )
            .await;
            exec(
                &db,
                &format!(
                    "INSERT INTO stocks (warehouse_id, product_id, quantity) VALUES (1, {id}, 1)"
                ),
            )
            .await;
        }
        // Equal to its minimum: not low.
        exec(&db, "INSERT INTO products (id, name, min_stock) VALUES (13, 'edge', 3)").await;
        exec(
            &db,
            "INSERT INTO stocks (warehouse_id, product_id, quantity) VALUES (1, 13, 3)",
        )
        .await;

        let items = db.stock_metrics().low_stock(1, 10).await.unwrap();
        assert_eq!(items.len(), 10);
        assert_eq!(items[0].product_id, 12);
        assert!(items.windows(2).all(|pair| pair[0].deficit >= pair[1].deficit));
        assert!(items.iter().all(|item| item.quantity < item.min_stock));
        assert!(items.iter().all(|item| item.product_id != 13));
    }

    #[tokio::test]
    async fn unknown_warehouse_reads_as_empty() {
        let (db, _dir) = setup_db().await;
        seed_scenario(&db).await;
        let repo = db.stock_metrics();

        assert_eq!(repo.count_products(999).await.unwrap(), 0);
        assert_eq!(repo.count_categories(999).await.unwrap(), 0);
        assert_eq!(repo.total_items(999).await.unwrap(), 0);
        assert_eq!(repo.capacity_totals(999).await.unwrap(), CapacityTotals::default());
        assert!(repo.category_counts(999).await.unwrap().is_empty());
        assert!(repo.low_stock(999, 10).await.unwrap().is_empty());
    }
}
