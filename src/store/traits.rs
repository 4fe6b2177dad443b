use anyhow::Result;
use serde_json::Value;

use crate::logic::{OrderBy, UpsertPlan};
use crate::model::{Record, TableRegistry};

/// Row access over auto-discovered tables.
///
/// Table, column and ordering names are validated against the registry by
/// the caller; implementations re-check before interpolating identifiers.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// The immutable registry built at startup.
    fn registry(&self) -> &TableRegistry;

    async fn count(&self, table: &str) -> Result<u64>;

    /// One ordered slice of a table.
    async fn fetch_page(
        &self,
        table: &str,
        order: &OrderBy,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>>;

    /// First record whose `column` equals `value`, JSON-compared.
    async fn get_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>>;

    /// Execute a planned upsert atomically and return the primary-key
    /// values of the affected row.
    async fn upsert(&self, plan: &UpsertPlan) -> Result<Vec<Value>>;
}

pub trait Store: RecordStore {}
