use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::logic::shortcode;
use crate::model::Record;

/// A computed property: a typed accessor resolved against a record.
///
/// Registered per table at startup so that `add_props` lookups never go
/// through runtime reflection.
pub type PropertyFn = fn(&Record) -> anyhow::Result<Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    Uuid,
    Timestamp,
    Date,
    Json,
    Other(String),
}

impl ColumnType {
    /// Map an `information_schema.columns.data_type` string.
    pub fn from_sql(data_type: &str) -> Self {
        match data_type {
            "smallint" | "integer" | "bigint" => ColumnType::Integer,
            "real" | "double precision" | "numeric" => ColumnType::Float,
            "boolean" => ColumnType::Boolean,
            "text" | "character varying" | "character" => ColumnType::Text,
            "uuid" => ColumnType::Uuid,
            "timestamp with time zone" | "timestamp without time zone" => ColumnType::Timestamp,
            "date" => ColumnType::Date,
            "json" | "jsonb" => ColumnType::Json,
            other => ColumnType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: BTreeSet<String>,
}

/// Raw reflection output for one table, before registry validation.
#[derive(Debug, Clone)]
pub struct ReflectedTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique: Vec<UniqueConstraint>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// One auto-discovered table: columns, keys, and the expansion/property
/// capability tables derived from them.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    pub unique: Vec<UniqueConstraint>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Expandable name -> foreign-key column, e.g. "owner" -> "owner_id".
    pub expandables: HashMap<String, String>,
    /// Computed property name -> accessor.
    pub properties: HashMap<String, PropertyFn>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Immutable once assigned: the surrogate key and the external
    /// correlation identifier.
    pub fn is_immutable(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column) || column == "uuid"
    }

    /// Whether `keys` exactly matches the primary key or one declared
    /// unique constraint.
    pub fn covers_unique(&self, keys: &BTreeSet<String>) -> bool {
        let pk: BTreeSet<String> = self.primary_key.iter().cloned().collect();
        if !pk.is_empty() && *keys == pk {
            return true;
        }
        self.unique.iter().any(|u| u.columns == *keys)
    }

    /// Single integer surrogate primary key, when the table has one.
    pub fn integer_pk(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [pk] => match self.column(pk).map(|c| &c.data_type) {
                Some(ColumnType::Integer) => Some(pk.as_str()),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Immutable map from table name to descriptor, built once at startup and
/// shared by reference with request handlers.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableDescriptor>,
}

impl TableRegistry {
    pub fn from_reflection(reflected: Vec<ReflectedTable>) -> Self {
        let known: BTreeSet<String> = reflected.iter().map(|t| t.name.clone()).collect();
        let mut tables = HashMap::new();

        for raw in reflected {
            if !is_safe_ident(&raw.name) {
                log::warn!("skipping table with unusable name: {:?}", raw.name);
                continue;
            }
            if raw.columns.iter().any(|c| !is_safe_ident(&c.name)) {
                log::warn!("skipping table {} with unusable column names", raw.name);
                continue;
            }

            let mut foreign_keys: Vec<ForeignKey> = raw
                .foreign_keys
                .into_iter()
                .filter(|fk| {
                    let ok = known.contains(&fk.foreign_table);
                    if !ok {
                        log::warn!(
                            "{}.{}: dropping foreign key to unknown table {}",
                            raw.name,
                            fk.column,
                            fk.foreign_table
                        );
                    }
                    ok
                })
                .collect();
            foreign_keys.sort_by(|a, b| a.column.cmp(&b.column));

            let expandables = derive_expandables(&foreign_keys);

            let mut properties: HashMap<String, PropertyFn> = HashMap::new();
            let has_integer_id = raw.primary_key == ["id"]
                && matches!(
                    raw.columns
                        .iter()
                        .find(|c| c.name == "id")
                        .map(|c| &c.data_type),
                    Some(ColumnType::Integer)
                );
            if has_integer_id {
                properties.insert("short_code".to_string(), short_code);
            }

            tables.insert(
                raw.name.clone(),
                TableDescriptor {
                    name: raw.name,
                    columns: raw.columns,
                    primary_key: raw.primary_key,
                    unique: raw.unique,
                    foreign_keys,
                    expandables,
                    properties,
                },
            );
        }

        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Expandables follow the `<relation>_<keycolumn>` naming convention:
/// a foreign-key column `owner_id` yields the expandable `owner`.
fn derive_expandables(foreign_keys: &[ForeignKey]) -> HashMap<String, String> {
    let mut expandables = HashMap::new();
    for fk in foreign_keys {
        let Some((relation, _key)) = fk.column.rsplit_once('_') else {
            continue;
        };
        if relation.is_empty() {
            continue;
        }
        expandables
            .entry(relation.to_string())
            .or_insert_with(|| fk.column.clone());
    }
    expandables
}

fn short_code(record: &Record) -> anyhow::Result<Value> {
    let id = record
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow::anyhow!("{} record has no integer id", record.table))?;
    Ok(Value::String(shortcode::encode(
        id,
        shortcode::SHORT_CODE_PADDING,
    )))
}

/// Only plain lowercase identifiers are ever interpolated into SQL; every
/// name is checked here before it reaches a statement.
pub fn is_safe_ident(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: ColumnType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            data_type,
            nullable: true,
        }
    }

    fn fk(column: &str, table: &str) -> ForeignKey {
        ForeignKey {
            column: column.to_string(),
            foreign_table: table.to_string(),
            foreign_column: "id".to_string(),
        }
    }

    fn users_and_assets() -> Vec<ReflectedTable> {
        vec![
            ReflectedTable {
                name: "users".to_string(),
                columns: vec![
                    column("id", ColumnType::Integer),
                    column("uuid", ColumnType::Uuid),
                    column("name", ColumnType::Text),
                ],
                primary_key: vec!["id".to_string()],
                unique: vec![UniqueConstraint {
                    name: "users_uuid_key".to_string(),
                    columns: ["uuid".to_string()].into_iter().collect(),
                }],
                foreign_keys: vec![],
            },
            ReflectedTable {
                name: "assets".to_string(),
                columns: vec![
                    column("id", ColumnType::Integer),
                    column("owner_id", ColumnType::Integer),
                    column("payload", ColumnType::Json),
                ],
                primary_key: vec!["id".to_string()],
                unique: vec![],
                foreign_keys: vec![fk("owner_id", "users"), fk("missing_id", "nowhere")],
            },
        ]
    }

    #[test]
    fn expandables_follow_naming_convention() {
        let registry = TableRegistry::from_reflection(users_and_assets());
        let assets = registry.table("assets").unwrap();
        assert_eq!(
            assets.expandables.get("owner"),
            Some(&"owner_id".to_string())
        );
        // foreign key to an unknown table was dropped at startup
        assert!(assets.foreign_key("missing_id").is_none());
        assert!(!assets.expandables.contains_key("missing"));
    }

    #[test]
    fn column_without_underscore_is_not_expandable() {
        let fks = vec![fk("owner", "users")];
        assert!(derive_expandables(&fks).is_empty());
    }

    #[test]
    fn integer_id_tables_get_short_code() {
        let registry = TableRegistry::from_reflection(users_and_assets());
        let users = registry.table("users").unwrap();
        assert!(users.properties.contains_key("short_code"));

        let record = Record::new("users", serde_json::from_str(r#"{"id": 42}"#).unwrap());
        let code = (users.properties["short_code"])(&record).unwrap();
        assert_eq!(code, Value::String("00016".to_string()));
    }

    #[test]
    fn covers_unique_matches_pk_and_declared_constraints() {
        let registry = TableRegistry::from_reflection(users_and_assets());
        let users = registry.table("users").unwrap();

        let pk: BTreeSet<String> = ["id".to_string()].into_iter().collect();
        let uuid: BTreeSet<String> = ["uuid".to_string()].into_iter().collect();
        let name: BTreeSet<String> = ["name".to_string()].into_iter().collect();

        assert!(users.covers_unique(&pk));
        assert!(users.covers_unique(&uuid));
        assert!(!users.covers_unique(&name));
    }

    #[test]
    fn unsafe_identifiers_are_rejected() {
        assert!(is_safe_ident("users"));
        assert!(is_safe_ident("user_assets"));
        assert!(!is_safe_ident("Users"));
        assert!(!is_safe_ident("1users"));
        assert!(!is_safe_ident("users; drop table"));
        assert!(!is_safe_ident(""));
    }
}
