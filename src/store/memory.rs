use std::cmp::Ordering;
use std::collections::HashMap;

use anyhow::Result;
use parking_lot::RwLock;
use serde_json::Value;

use crate::logic::{OrderBy, UpsertPlan};
use crate::model::{JsonMap, Record, TableDescriptor, TableRegistry};
use crate::store::traits::{RecordStore, Store};

/// In-memory store over the same registry and upsert plans the Postgres
/// store uses. Backs the test suite; rows live in a table-name -> rows map
/// behind one lock.
#[derive(Debug)]
pub struct MemoryStore {
    registry: TableRegistry,
    rows: RwLock<HashMap<String, Vec<JsonMap>>>,
}

impl MemoryStore {
    pub fn new(registry: TableRegistry) -> Self {
        Self {
            registry,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a row, filling the column defaults the database would:
    /// next `id`, a fresh `uuid`, `created` now, null for the rest.
    pub fn insert(&self, table: &str, row: JsonMap) -> JsonMap {
        let mut rows = self.rows.write();
        let bucket = rows.entry(table.to_string()).or_default();
        let row = materialize(self.registry.table(table), bucket, row);
        bucket.push(row.clone());
        row
    }
}

fn materialize(desc: Option<&TableDescriptor>, existing: &[JsonMap], mut row: JsonMap) -> JsonMap {
    let Some(desc) = desc else {
        return row;
    };

    if let Some(pk) = desc.integer_pk() {
        if !row.contains_key(pk) {
            let next = existing
                .iter()
                .filter_map(|r| r.get(pk))
                .filter_map(Value::as_u64)
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(pk.to_string(), next.into());
        }
    }
    if desc.has_column("uuid") && !row.contains_key("uuid") {
        row.insert(
            "uuid".to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    if desc.has_column("created") && !row.contains_key("created") {
        row.insert(
            "created".to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
    }
    for column in &desc.columns {
        row.entry(column.name.clone()).or_insert(Value::Null);
    }
    row
}

/// JSON equality with numbers compared numerically, the way jsonb does.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn count(&self, table: &str) -> Result<u64> {
        Ok(self.rows.read().get(table).map_or(0, Vec::len) as u64)
    }

    async fn fetch_page(
        &self,
        table: &str,
        order: &OrderBy,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>> {
        let rows = self.rows.read();
        let mut rows: Vec<JsonMap> = rows.get(table).cloned().unwrap_or_default();

        rows.sort_by(|a, b| {
            let av = a.get(&order.column).unwrap_or(&Value::Null);
            let bv = b.get(&order.column).unwrap_or(&Value::Null);
            let ordering = compare_values(av, bv);
            if order.reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|columns| Record::new(table, columns))
            .collect())
    }

    async fn get_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>> {
        let rows = self.rows.read();
        Ok(rows
            .get(table)
            .and_then(|rows| {
                rows.iter()
                    .find(|row| values_equal(row.get(column), Some(value)))
            })
            .map(|columns| Record::new(table, columns.clone())))
    }

    async fn upsert(&self, plan: &UpsertPlan) -> Result<Vec<Value>> {
        let mut rows = self.rows.write();
        let bucket = rows.entry(plan.table.clone()).or_default();

        let pks = |row: &JsonMap| -> Vec<Value> {
            plan.returning
                .iter()
                .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
                .collect()
        };

        if let Some(row) = bucket.iter_mut().find(|row| {
            plan.conflict_columns
                .iter()
                .all(|c| values_equal(row.get(c), plan.values.get(c)))
        }) {
            for column in &plan.update_columns {
                row.insert(column.clone(), plan.values[column].clone());
            }
            return Ok(pks(row));
        }

        let row = materialize(
            self.registry.table(&plan.table),
            bucket,
            plan.values.clone(),
        );
        bucket.push(row.clone());
        Ok(pks(&row))
    }
}

impl Store for MemoryStore {}


#[cfg(test)]
mod tests {
    use super::test_fixtures::{row, seeded_store, test_registry};
    use super::*;
    use crate::logic::plan_upsert;
    use serde_json::json;

    #[tokio::test]
    async fn insert_fills_database_defaults() {
        let store = MemoryStore::new(test_registry());
        let inserted = store.insert("users", row(json!({"name": "ada"})));

        assert_eq!(inserted["id"], json!(1));
        assert!(inserted["uuid"].is_string());
        assert!(inserted["created"].is_string());
        assert_eq!(inserted["manager_id"], Value::Null);

        let next = store.insert("users", row(json!({"name": "grace"})));
        assert_eq!(next["id"], json!(2));
    }

    #[tokio::test]
    async fn fetch_page_orders_and_slices() {
        let store = seeded_store();
        let order = OrderBy::from_params(Some("name"), false);

        let page = store.fetch_page("users", &order, 0, 10).await.unwrap();
        let names: Vec<_> = page.iter().map(|r| r.get("name").unwrap().clone()).collect();
        assert_eq!(names, vec![json!("ada"), json!("grace")]);

        let reversed = OrderBy::from_params(Some("name"), true);
        let page = store.fetch_page("users", &reversed, 0, 1).await.unwrap();
        assert_eq!(page[0].get("name"), Some(&json!("grace")));

        let empty = store.fetch_page("users", &order, 10, 10).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_the_natural_key() {
        let store = seeded_store();
        let desc = store.registry().table("users").unwrap().clone();

        let lookup = row(json!({"uuid": "x"}));
        let first = plan_upsert(&desc, &lookup, &row(json!({"name": "a"}))).unwrap();
        let second = plan_upsert(&desc, &lookup, &row(json!({"name": "b"}))).unwrap();

        let pk_first = store.upsert(&first).await.unwrap();
        let pk_second = store.upsert(&second).await.unwrap();
        assert_eq!(pk_first, pk_second);

        let record = store
            .get_by_column("users", "uuid", &json!("x"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.get("name"), Some(&json!("b")));
        assert_eq!(store.count("users").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn get_by_column_compares_numbers_numerically() {
        let store = seeded_store();
        let record = store
            .get_by_column("users", "id", &json!(2.0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.get("name"), Some(&json!("grace")));
    }
}
