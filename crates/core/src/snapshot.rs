use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used for stock whose product has no category assigned.
pub const UNCATEGORIZED_LABEL: &str = "uncategorized";

/// Maximum number of entries reported in the low-stock list.
pub const LOW_STOCK_LIMIT: usize = 10;

/// Point-in-time KPIs for a single warehouse.
///
/// Snapshots are derived on demand from stock, product and category rows and
/// are never persisted. Two snapshots of the same warehouse may differ even
/// without a local mutation because other writers share the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub warehouse_id: i64,
    pub generated_at: DateTime<Utc>,
    pub counts: StockCounts,
    pub capacity: Capacity,
    pub categories: Vec<CategoryShare>,
    pub low_stock: Vec<LowStockItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCounts {
    pub products_total: i64,
    pub categories_total: i64,
    pub items_total: i64,
}

/// Capacity utilisation computed from products that carry a maximum stock.
///
/// `used_pct` and `free_pct` are `None` when no stocked product has a
/// configured maximum, which keeps "unknown" distinct from "empty".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    pub used: i64,
    pub max: i64,
    pub used_pct: Option<f64>,
    pub free_pct: Option<f64>,
}

impl Capacity {
    pub fn from_totals(used: i64, max: i64) -> Self {
        let used_pct = if max > 0 {
            Some(used as f64 / max as f64)
        } else {
            None
        };
        Self {
            used,
            max,
            used_pct,
            free_pct: used_pct.map(|pct| 1.0 - pct),
        }
    }
}

/// Raw per-category row count as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: Option<String>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub name: String,
    pub count: i64,
    pub pct: f64,
}

/// Turns grouped row counts into shares of the warehouse total.
///
/// Output is ordered by count descending, then by name. An empty input yields
/// an empty distribution.
///
/// Groups are keyed by category, not by label: a category actually named
/// `uncategorized` stays a separate entry from the null-category group even
/// though both carry the same name.
pub fn category_distribution(groups: Vec<CategoryCount>) -> Vec<CategoryShare> {
    let total: i64 = groups.iter().map(|group| group.count).sum();
    let denominator = if total > 0 { total as f64 } else { 1.0 };

    let mut shares: Vec<CategoryShare> = groups
        .into_iter()
        .map(|group| CategoryShare {
            name: group
                .name
                .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string()),
            count: group.count,
            pct: group.count as f64 / denominator,
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    shares
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub min_stock: i64,
    pub deficit: i64,
}

impl LowStockItem {
    pub fn new(product_id: i64, name: String, quantity: i64, min_stock: i64) -> Self {
        Self {
            product_id,
            name,
            quantity,
            min_stock,
            deficit: min_stock - quantity,
        }
    }
}

/// Everything the aggregator reads from storage for one snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotInputs {
    pub counts: StockCounts,
    pub capacity_used: i64,
    pub capacity_max: i64,
    pub category_counts: Vec<CategoryCount>,
    pub low_stock: Vec<LowStockItem>,
}

impl MetricsSnapshot {
    pub fn assemble(warehouse_id: i64, generated_at: DateTime<Utc>, inputs: SnapshotInputs) -> Self {
        let mut low_stock = inputs.low_stock;
        low_stock.truncate(LOW_STOCK_LIMIT);

        Self {
            warehouse_id,
            generated_at,
            counts: inputs.counts,
            capacity: Capacity::from_totals(inputs.capacity_used, inputs.capacity_max),
            categories: category_distribution(inputs.category_counts),
            low_stock,
        }
    }
}
