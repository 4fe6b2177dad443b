use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JsonMap = serde_json::Map<String, Value>;

/// One row of an auto-discovered table. Column values are carried as JSON
/// from the moment they leave the database, so a record is always
/// serializable as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub table: String,
    pub columns: JsonMap,
}

impl Record {
    pub fn new(table: impl Into<String>, columns: JsonMap) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    /// Build a record from a `to_jsonb(..)` row value.
    pub fn from_row_json(table: &str, value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Object(columns) => Ok(Self::new(table, columns)),
            other => anyhow::bail!("expected a JSON object row for {}, got {}", table, other),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
}
