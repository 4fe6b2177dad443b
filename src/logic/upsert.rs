use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::{JsonMap, TableDescriptor};

#[derive(Debug, Error)]
pub enum UpsertError {
    #[error("lookup cannot be empty")]
    EmptyLookup,
    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: String, column: String },
    #[error("'{0}' cannot be updated")]
    Immutable(String),
    #[error("'{0}' appears in both lookup and updates")]
    Overlap(String),
    #[error("lookup keys {keys:?} do not match a unique constraint on {table}")]
    NoUniqueConstraint { table: String, keys: Vec<String> },
}

/// A validated insert-or-update, ready for a store to execute as one
/// conditional statement. Column order follows the table definition so the
/// rendered SQL is deterministic.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub table: String,
    /// All columns being written, lookup and updates merged.
    pub columns: Vec<String>,
    /// The conflict target; exactly the lookup keys.
    pub conflict_columns: Vec<String>,
    /// Columns re-assigned when the row already exists.
    pub update_columns: Vec<String>,
    /// Merged values keyed by column name.
    pub values: JsonMap,
    /// Primary-key columns returned whether inserted or updated.
    pub returning: Vec<String>,
}

/// Validate a `lookup` / `updates` pair against the table descriptor.
///
/// The lookup must match the primary key or exactly one declared unique
/// constraint; without that the statement could silently insert
/// duplicates, so it is rejected up front. Updates may not touch the
/// surrogate key or the `uuid` correlation column.
pub fn plan_upsert(
    desc: &TableDescriptor,
    lookup: &JsonMap,
    updates: &JsonMap,
) -> Result<UpsertPlan, UpsertError> {
    if lookup.is_empty() {
        return Err(UpsertError::EmptyLookup);
    }

    for column in lookup.keys().chain(updates.keys()) {
        if !desc.has_column(column) {
            return Err(UpsertError::UnknownColumn {
                table: desc.name.clone(),
                column: column.clone(),
            });
        }
    }

    if let Some(column) = updates.keys().find(|c| lookup.contains_key(*c)) {
        return Err(UpsertError::Overlap(column.clone()));
    }

    if let Some(column) = updates.keys().find(|c| desc.is_immutable(c)) {
        return Err(UpsertError::Immutable(column.clone()));
    }

    let keys: BTreeSet<String> = lookup.keys().cloned().collect();
    if !desc.covers_unique(&keys) {
        return Err(UpsertError::NoUniqueConstraint {
            table: desc.name.clone(),
            keys: keys.into_iter().collect(),
        });
    }

    let mut values = lookup.clone();
    for (column, value) in updates {
        values.insert(column.clone(), value.clone());
    }

    let in_table_order = |source: &JsonMap| -> Vec<String> {
        desc.columns
            .iter()
            .filter(|c| source.contains_key(&c.name))
            .map(|c| c.name.clone())
            .collect()
    };

    Ok(UpsertPlan {
        table: desc.name.clone(),
        columns: in_table_order(&values),
        conflict_columns: in_table_order(lookup),
        update_columns: in_table_order(updates),
        values,
        returning: desc.primary_key.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnDef, ColumnType, ReflectedTable, TableRegistry, UniqueConstraint};
    use serde_json::json;

    fn descriptor() -> TableDescriptor {
        let registry = TableRegistry::from_reflection(vec![ReflectedTable {
            name: "assets".to_string(),
            columns: ["id", "uuid", "name", "description"]
                .into_iter()
                .map(|name| ColumnDef {
                    name: name.to_string(),
                    data_type: if name == "id" {
                        ColumnType::Integer
                    } else {
                        ColumnType::Text
                    },
                    nullable: name != "id",
                })
                .collect(),
            primary_key: vec!["id".to_string()],
            unique: vec![UniqueConstraint {
                name: "assets_uuid_key".to_string(),
                columns: ["uuid".to_string()].into_iter().collect(),
            }],
            foreign_keys: vec![],
        }]);
        registry.table("assets").unwrap().clone()
    }

    fn map(value: serde_json::Value) -> JsonMap {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn plans_follow_table_column_order() {
        let plan = plan_upsert(
            &descriptor(),
            &map(json!({"uuid": "x"})),
            &map(json!({"description": "d", "name": "n"})),
        )
        .unwrap();

        assert_eq!(plan.columns, ["uuid", "name", "description"]);
        assert_eq!(plan.conflict_columns, ["uuid"]);
        assert_eq!(plan.update_columns, ["name", "description"]);
        assert_eq!(plan.returning, ["id"]);
        assert_eq!(plan.values["name"], json!("n"));
    }

    #[test]
    fn lookup_must_match_a_unique_constraint() {
        let err = plan_upsert(
            &descriptor(),
            &map(json!({"name": "n"})),
            &map(json!({"description": "d"})),
        )
        .unwrap_err();
        assert!(matches!(err, UpsertError::NoUniqueConstraint { .. }));

        // the primary key itself is an acceptable lookup
        assert!(plan_upsert(
            &descriptor(),
            &map(json!({"id": 7})),
            &map(json!({"name": "n"})),
        )
        .is_ok());
    }

    #[test]
    fn immutable_columns_cannot_be_updated() {
        let err = plan_upsert(
            &descriptor(),
            &map(json!({"uuid": "x"})),
            &map(json!({"id": 9})),
        )
        .unwrap_err();
        assert!(matches!(err, UpsertError::Immutable(c) if c == "id"));

        let err = plan_upsert(
            &descriptor(),
            &map(json!({"id": 1})),
            &map(json!({"uuid": "y"})),
        )
        .unwrap_err();
        assert!(matches!(err, UpsertError::Immutable(c) if c == "uuid"));
    }

    #[test]
    fn rejects_empty_overlapping_and_unknown() {
        let desc = descriptor();
        assert!(matches!(
            plan_upsert(&desc, &map(json!({})), &map(json!({"name": "n"}))),
            Err(UpsertError::EmptyLookup)
        ));
        assert!(matches!(
            plan_upsert(&desc, &map(json!({"uuid": "x"})), &map(json!({"uuid": "y"}))),
            Err(UpsertError::Overlap(_))
        ));
        assert!(matches!(
            plan_upsert(&desc, &map(json!({"uuid": "x"})), &map(json!({"nope": 1}))),
            Err(UpsertError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn empty_updates_still_plan() {
        let plan = plan_upsert(&descriptor(), &map(json!({"uuid": "x"})), &map(json!({}))).unwrap();
        assert!(plan.update_columns.is_empty());
        assert_eq!(plan.conflict_columns, ["uuid"]);
    }
}
