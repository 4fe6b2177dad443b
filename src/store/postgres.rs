use anyhow::{Context, Result};
use itertools::Itertools;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::logic::{OrderBy, UpsertPlan};
use crate::model::{
    is_safe_ident, ColumnDef, ColumnType, ForeignKey, Record, ReflectedTable, TableRegistry,
    UniqueConstraint,
};
use crate::store::traits::{RecordStore, Store};

/// PostgreSQL store over auto-discovered tables.
///
/// Rows travel as `to_jsonb(t.*)` so every table decodes through the same
/// JSON path regardless of its column types. Identifiers are interpolated
/// only after validation against the registry; values are always bound.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    registry: TableRegistry,
}

impl PostgresStore {
    /// Connect and reflect the live schema into the table registry.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        let registry = reflect(&pool).await?;

        Ok(Self { pool, registry })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn validate(&self, table: &str, column: Option<&str>) -> Result<()> {
        let desc = self
            .registry
            .table(table)
            .with_context(|| format!("unknown table: {table}"))?;
        if let Some(column) = column {
            anyhow::ensure!(
                desc.has_column(column),
                "unknown column {column} on {table}"
            );
        }
        Ok(())
    }
}

/// Reflect `information_schema` for the public schema into raw table
/// definitions. Migration bookkeeping tables are skipped.
async fn reflect(pool: &PgPool) -> Result<TableRegistry> {
    let table_names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public'
          AND table_type = 'BASE TABLE'
          AND table_name NOT IN ('alembic_version', '_sqlx_migrations')
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tables")?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        tables.push(reflect_table(pool, &name).await?);
    }

    let registry = TableRegistry::from_reflection(tables);
    log::info!("reflected {} tables from the live schema", registry.len());
    Ok(registry)
}

async fn reflect_table(pool: &PgPool, table: &str) -> Result<ReflectedTable> {
    let columns = sqlx::query(
        r#"
        SELECT column_name, data_type, is_nullable
        FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to reflect columns of {table}"))?
    .into_iter()
    .map(|row| ColumnDef {
        name: row.get("column_name"),
        data_type: ColumnType::from_sql(row.get("data_type")),
        nullable: row.get::<String, _>("is_nullable") == "YES",
    })
    .collect();

    let primary_key = sqlx::query_scalar(
        r#"
        SELECT kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
        WHERE tc.table_schema = 'public'
          AND tc.table_name = $1
          AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to reflect primary key of {table}"))?;

    let unique = sqlx::query(
        r#"
        SELECT tc.constraint_name, kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
        WHERE tc.table_schema = 'public'
          AND tc.table_name = $1
          AND tc.constraint_type = 'UNIQUE'
        ORDER BY tc.constraint_name, kcu.ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to reflect unique constraints of {table}"))?
    .into_iter()
    .map(|row| {
        (
            row.get::<String, _>("constraint_name"),
            row.get::<String, _>("column_name"),
        )
    })
    .into_group_map()
    .into_iter()
    .map(|(name, columns)| UniqueConstraint {
        name,
        columns: columns.into_iter().collect(),
    })
    .collect();

    let foreign_keys = sqlx::query(
        r#"
        SELECT kcu.column_name,
               ccu.table_name AS foreign_table,
               ccu.column_name AS foreign_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON kcu.constraint_name = tc.constraint_name
         AND kcu.table_schema = tc.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON ccu.constraint_name = tc.constraint_name
         AND ccu.table_schema = tc.table_schema
        WHERE tc.table_schema = 'public'
          AND tc.table_name = $1
          AND tc.constraint_type = 'FOREIGN KEY'
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to reflect foreign keys of {table}"))?
    .into_iter()
    .map(|row| ForeignKey {
        column: row.get("column_name"),
        foreign_table: row.get("foreign_table"),
        foreign_column: row.get("foreign_column"),
    })
    .collect();

    Ok(ReflectedTable {
        name: table.to_string(),
        columns,
        primary_key,
        unique,
        foreign_keys,
    })
}

fn quote(ident: &str) -> String {
    debug_assert!(is_safe_ident(ident));
    format!("\"{ident}\"")
}

fn render_page(table: &str, order: &OrderBy) -> String {
    let direction = if order.reverse { "DESC" } else { "ASC" };
    format!(
        "SELECT to_jsonb(t.*) FROM {} AS t ORDER BY t.{} {} LIMIT $1 OFFSET $2",
        quote(table),
        quote(&order.column),
        direction
    )
}

fn render_get_by_column(table: &str) -> String {
    format!(
        "SELECT to_jsonb(t.*) FROM {} AS t WHERE to_jsonb(t.*) -> $1::text = $2 LIMIT 1",
        quote(table)
    )
}

/// One conditional insert-or-update; atomicity is the engine's.
fn render_upsert(plan: &UpsertPlan) -> String {
    let table = quote(&plan.table);
    let columns = plan.columns.iter().map(|c| quote(c)).join(", ");
    let selected = plan
        .columns
        .iter()
        .map(|c| format!("r.{}", quote(c)))
        .join(", ");
    let conflict = plan.conflict_columns.iter().map(|c| quote(c)).join(", ");

    // with nothing to update, touch a conflict column so the statement
    // still returns the existing row's keys
    let assignments = if plan.update_columns.is_empty() {
        let first = quote(&plan.conflict_columns[0]);
        format!("{first} = EXCLUDED.{first}")
    } else {
        plan.update_columns
            .iter()
            .map(|c| {
                let c = quote(c);
                format!("{c} = EXCLUDED.{c}")
            })
            .join(", ")
    };

    let returning = plan.returning.iter().map(|c| quote(c)).join(", ");

    format!(
        "INSERT INTO {table} ({columns}) \
         SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1) AS r \
         ON CONFLICT ({conflict}) DO UPDATE SET {assignments} \
         RETURNING jsonb_build_array({returning})"
    )
}

#[async_trait::async_trait]
impl RecordStore for PostgresStore {
    fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    async fn count(&self, table: &str) -> Result<u64> {
        self.validate(table, None)?;
        let count: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM {}", quote(table)))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {table}"))?;
        Ok(count as u64)
    }

    async fn fetch_page(
        &self,
        table: &str,
        order: &OrderBy,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Record>> {
        self.validate(table, Some(&order.column))?;
        let rows: Vec<Value> = sqlx::query_scalar(&render_page(table, order))
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch a page of {table}"))?;

        rows.into_iter()
            .map(|row| Record::from_row_json(table, row))
            .collect()
    }

    async fn get_by_column(
        &self,
        table: &str,
        column: &str,
        value: &Value,
    ) -> Result<Option<Record>> {
        self.validate(table, Some(column))?;
        let row: Option<Value> = sqlx::query_scalar(&render_get_by_column(table))
            .bind(column)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch {table} by {column}"))?;

        row.map(|row| Record::from_row_json(table, row)).transpose()
    }

    async fn upsert(&self, plan: &UpsertPlan) -> Result<Vec<Value>> {
        self.validate(&plan.table, None)?;
        let keys: Value = sqlx::query_scalar(&render_upsert(plan))
            .bind(Value::Object(plan.values.clone()))
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to upsert into {}", plan.table))?;

        match keys {
            Value::Array(keys) => Ok(keys),
            other => anyhow::bail!("expected a primary-key array, got {other}"),
        }
    }
}

impl Store for PostgresStore {}
