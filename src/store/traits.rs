use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{Match, Table};
use crate::error::StoreError;

/// Query surface of the hosted relational store.
///
/// Rows cross this seam as JSON so the same trait serves the nested estate
/// select and the flat tables; typed decoding happens in [`select_as`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Select `columns` (PostgREST syntax, nested relations allowed) from `table`
    async fn select(&self, table: Table, columns: &str) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError>;

    async fn update(&self, table: Table, patch: Value, filter: &Match) -> Result<(), StoreError>;

    async fn delete(&self, table: Table, filter: &Match) -> Result<(), StoreError>;

    /// Get the name of the backend
    fn backend_name(&self) -> &'static str;
}

/// Select and decode every row; one malformed row fails the whole call.
pub async fn select_as<T: DeserializeOwned>(
    store: &dyn RemoteStore,
    table: Table,
    columns: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .select(table, columns)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}
