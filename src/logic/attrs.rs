use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

use crate::model::{JsonMap, Record, TableDescriptor};
use crate::store::RecordStore;

/// Expansion paths are chains of foreign-key hops; four is the most the
/// API will follow.
pub const MAX_EXPAND_DEPTH: usize = 4;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("'{name}' is not a valid expandable for {table}")]
    InvalidExpandable { name: String, table: String },
    #[error("expansions have a max depth of {MAX_EXPAND_DEPTH} levels: '{0}'")]
    ExpansionTooDeep(String),
    #[error("nested add_props have a max depth of 2 levels: '{0}'")]
    NestedPropertyTooDeep(String),
    #[error("{table} has no attribute '{name}'")]
    PropertyNotFound { name: String, table: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Serializes records as flat JSON objects, inlining requested foreign-key
/// expansions and computed properties.
pub struct Extractor<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> Extractor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Flat column mapping of `record`, with each `expand` path replaced
    /// by the nested extraction of the referenced record and each
    /// `add_props` name resolved through the table's capability table.
    ///
    /// With no arguments this returns exactly the native column mapping.
    pub async fn extract(
        &self,
        record: &Record,
        expand: &[String],
        adhoc_expandables: &HashMap<String, String>,
        add_props: &[String],
    ) -> Result<JsonMap, ExtractError> {
        self.extract_inner(
            record.clone(),
            expand.to_vec(),
            adhoc_expandables.clone(),
            add_props.to_vec(),
        )
        .await
    }

    // Boxed for the recursive nested-extraction call.
    fn extract_inner(
        &self,
        record: Record,
        expand: Vec<String>,
        adhoc_expandables: HashMap<String, String>,
        add_props: Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<JsonMap, ExtractError>> + Send + '_>> {
        Box::pin(async move {
            let desc = self
                .store
                .registry()
                .table(&record.table)
                .ok_or_else(|| ExtractError::UnknownTable(record.table.clone()))?;

            let mut attrs = record.columns.clone();

            // ad-hoc expandables take precedence on key collision
            let mut expandables = desc.expandables.clone();
            expandables.extend(adhoc_expandables);

            for path in expand.iter().filter(|p| !p.is_empty()) {
                let mut segments: Vec<&str> = path.split('.').collect();
                if segments.len() > MAX_EXPAND_DEPTH {
                    return Err(ExtractError::ExpansionTooDeep(path.clone()));
                }

                let head = segments.remove(0);
                let expanded = self
                    .expand_one(desc, &record, &expandables, head, &segments, &mut attrs)
                    .await?;
                attrs.insert(head.to_string(), expanded);
            }

            for prop in add_props.iter().filter(|p| !p.is_empty()) {
                self.add_prop(desc, &record, &expandables, prop, &mut attrs)
                    .await?;
            }

            Ok(attrs)
        })
    }

    /// Resolve one expansion: drop the foreign-key column from `attrs` and
    /// return the nested extraction of the referenced record, or null when
    /// the reference is null or dangling.
    async fn expand_one(
        &self,
        desc: &TableDescriptor,
        record: &Record,
        expandables: &HashMap<String, String>,
        name: &str,
        rest: &[&str],
        attrs: &mut JsonMap,
    ) -> Result<Value, ExtractError> {
        let related = match self
            .related_record(desc, record, expandables, name, Some(attrs))
            .await?
        {
            Some(related) => related,
            None => return Ok(Value::Null),
        };

        let tail = if rest.is_empty() {
            Vec::new()
        } else {
            vec![rest.join(".")]
        };
        let nested = self
            .extract_inner(related, tail, HashMap::new(), Vec::new())
            .await?;
        Ok(Value::Object(nested))
    }

    /// Follow the expandable `name` to the record it references. When
    /// `attrs` is given, the foreign-key column is removed from it.
    async fn related_record(
        &self,
        desc: &TableDescriptor,
        record: &Record,
        expandables: &HashMap<String, String>,
        name: &str,
        attrs: Option<&mut JsonMap>,
    ) -> Result<Option<Record>, ExtractError> {
        let invalid = || ExtractError::InvalidExpandable {
            name: name.to_string(),
            table: desc.name.clone(),
        };

        let fk_column = expandables.get(name).ok_or_else(invalid)?;
        // an ad-hoc expandable must still name a real foreign-key column
        let fk = desc.foreign_key(fk_column).ok_or_else(invalid)?;

        if let Some(attrs) = attrs {
            attrs.remove(fk_column);
        }

        let value = record.get(fk_column).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            return Ok(None);
        }

        Ok(self
            .store
            .get_by_column(&fk.foreign_table, &fk.foreign_column, &value)
            .await?)
    }

    async fn add_prop(
        &self,
        desc: &TableDescriptor,
        record: &Record,
        expandables: &HashMap<String, String>,
        prop: &str,
        attrs: &mut JsonMap,
    ) -> Result<(), ExtractError> {
        if let Some(value) = resolve_property(desc, record, prop)? {
            attrs.insert(prop.to_string(), value);
            return Ok(());
        }

        let not_found = || ExtractError::PropertyNotFound {
            name: prop.to_string(),
            table: desc.name.clone(),
        };

        if !prop.contains('.') {
            return Err(not_found());
        }

        // a nested add_prop like "owner.short_code"
        let parts: Vec<&str> = prop.split('.').collect();
        let [a, b] = parts.as_slice() else {
            return Err(ExtractError::NestedPropertyTooDeep(prop.to_string()));
        };

        if !attrs.get(*a).is_some_and(Value::is_object) {
            return Err(not_found());
        }

        let related = self
            .related_record(desc, record, expandables, a, None)
            .await?
            .ok_or_else(not_found)?;
        let related_desc = self
            .store
            .registry()
            .table(&related.table)
            .ok_or_else(|| ExtractError::UnknownTable(related.table.clone()))?;
        let value = resolve_property(related_desc, &related, b)?.ok_or_else(not_found)?;

        if let Some(Value::Object(nested)) = attrs.get_mut(*a) {
            nested.insert((*b).to_string(), value);
        }
        Ok(())
    }
}

/// A property resolves through the table's capability table first, then
/// falls back to a native column.
fn resolve_property(
    desc: &TableDescriptor,
    record: &Record,
    name: &str,
) -> Result<Option<Value>, ExtractError> {
    if let Some(accessor) = desc.properties.get(name) {
        return Ok(Some(accessor(record)?));
    }
    Ok(record.get(name).cloned())
}
