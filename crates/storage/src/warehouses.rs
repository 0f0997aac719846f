use sqlx::SqlitePool;
use thiserror::Error;

use inventory_core::{Warehouse, WarehouseDraft};

const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Repository used to administer warehouses.
#[derive(Clone)]
pub struct WarehouseRepository {
    pool: SqlitePool,
}

impl WarehouseRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists every warehouse ordered by name.
    pub async fn list(&self) -> Result<Vec<Warehouse>, WarehouseError> {
        let rows = sqlx::query_as::<_, WarehouseRow>(
            "SELECT id, name, address FROM warehouses ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WarehouseRow::into_domain).collect())
    }

    /// Inserts a new warehouse and returns it with its assigned identifier.
    pub async fn insert(&self, draft: &WarehouseDraft) -> Result<Warehouse, WarehouseError> {
        let row = sqlx::query_as::<_, WarehouseRow>(
            "INSERT INTO warehouses (name, address) VALUES (?, ?) RETURNING id, name, address",
        )
        .bind(&draft.name)
        .bind(&draft.address)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(row.into_domain())
    }

    /// Replaces the name and address of an existing warehouse.
    pub async fn update(&self, id: i64, draft: &WarehouseDraft) -> Result<Warehouse, WarehouseError> {
        sqlx::query_as::<_, WarehouseRow>(
            "UPDATE warehouses SET name = ?, address = ? WHERE id = ? RETURNING id, name, address",
        )
        .bind(&draft.name)
        .bind(&draft.address)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?
        .map(WarehouseRow::into_domain)
        .ok_or(WarehouseError::NotFound)
    }

    /// Hard-deletes a warehouse. Its stock rows go with it.
    pub async fn delete(&self, id: i64) -> Result<(), WarehouseError> {
        let result = sqlx::query("DELETE FROM warehouses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(WarehouseError::NotFound);
        }
        Ok(())
    }
}

fn map_write_error(err: sqlx::Error) -> WarehouseError {
    match err {
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE) =>
        {
            WarehouseError::DuplicateName
        }
        other => WarehouseError::Database(other),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WarehouseRow {
    id: i64,
    name: String,
    address: Option<String>,
}

impl WarehouseRow {
    fn into_domain(self) -> Warehouse {
        Warehouse {
            id: self.id,
            name: self.name,
            address: self.address,
        }
    }
}

/// Errors that can occur while administering warehouses.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse not found")]
    NotFound,
    #[error("a warehouse with the same name already exists")]
    DuplicateName,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    fn draft(name: &str, address: Option<&str>) -> WarehouseDraft {
        WarehouseDraft::parse(Some(name), address).expect("valid draft")
    }

    #[tokio::test]
    async fn insert_then_list_orders_by_name() {
        let (db, _dir) = setup_db().await;
        let repo = db.warehouses();

        let south = repo.insert(&draft("South", Some("Calle 2"))).await.expect("insert");
        repo.insert(&draft("North", None)).await.expect("insert");

        assert_eq!(south.name, "South");
        assert_eq!(south.address.as_deref(), Some("Calle 2"));

        let names: Vec<String> = repo
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|w| w.name)
            .collect();
        assert_eq!(names, vec!["North".to_string(), "South".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_name_is_reported() {
        let (db, _dir) = setup_db().await;
        let repo = db.warehouses();
        repo.insert(&draft("Central", None)).await.expect("insert");

        let err = repo.insert(&draft("Central", None)).await.unwrap_err();
        assert!(matches!(err, WarehouseError::DuplicateName));
    }

    #[tokio::test]
    async fn update_changes_fields_and_reports_missing() {
        let (db, _dir) = setup_db().await;
        let repo = db.warehouses();
        let created = repo.insert(&draft("Central", None)).await.expect("insert");

        let updated = repo
            .update(created.id, &draft("Central Hub", Some("Ruta 5")))
            .await
            .expect("update");
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Central Hub");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed, vec![updated]);

        let err = repo.update(4242, &draft("Ghost", None)).await.unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound));
    }

    #[tokio::test]
    async fn update_to_existing_name_is_duplicate() {
        let (db, _dir) = setup_db().await;
        let repo = db.warehouses();
        repo.insert(&draft("North", None)).await.expect("insert");
        let south = repo.insert(&draft("South", None)).await.expect("insert");

        let err = repo.update(south.id, &draft("North", None)).await.unwrap_err();
        assert!(matches!(err, WarehouseError::DuplicateName));
    }

    #[tokio::test]
    async fn delete_missing_warehouse_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = db.warehouses().delete(77).await.unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound));
    }
}
