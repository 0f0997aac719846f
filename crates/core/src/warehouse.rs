use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_NAME_CHARS: usize = 2;

/// Physical storage location holding stock of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
}

/// Validated input for creating or updating a warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseDraft {
    pub name: String,
    pub address: Option<String>,
}

impl WarehouseDraft {
    /// Trims the inputs and enforces the minimum name length. Blank addresses
    /// are stored as `NULL`.
    pub fn parse(name: Option<&str>, address: Option<&str>) -> Result<Self, WarehouseValidationError> {
        let name = name.map(str::trim).unwrap_or_default();
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(WarehouseValidationError::NameTooShort);
        }

        let address = address
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self {
            name: name.to_string(),
            address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarehouseValidationError {
    #[error("name is required (minimum 2 characters)")]
    NameTooShort,
}
