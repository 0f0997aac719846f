//! Domain types shared by the HTTP layer and storage.

pub mod role;
pub mod snapshot;
pub mod warehouse;

pub use role::Role;
pub use snapshot::{
    category_distribution, Capacity, CategoryCount, CategoryShare, LowStockItem, MetricsSnapshot,
    SnapshotInputs, StockCounts, LOW_STOCK_LIMIT, UNCATEGORIZED_LABEL,
};
pub use warehouse::{Warehouse, WarehouseDraft, WarehouseValidationError};
