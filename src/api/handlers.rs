use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::error::ApiError;
use crate::api::params::{client_ip, ListParams};
use crate::config::PaginationConfig;
use crate::logic::{clamp_per_page, paginate, plan_upsert, Extractor};
use crate::model::{ColumnType, JsonMap, Record, TableDescriptor};
use crate::store::Store;

/// Shared request state: the store (which owns the table registry) and the
/// pagination limits.
#[derive(Debug)]
pub struct AppState<S> {
    pub store: Arc<S>,
    pub pagination: PaginationConfig,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pagination: self.pagination.clone(),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, pagination: PaginationConfig) -> Self {
        Self { store, pagination }
    }

    fn descriptor(&self, table: &str) -> Result<TableDescriptor, ApiError> {
        self.store
            .registry()
            .table(table)
            .cloned()
            .ok_or_else(|| ApiError::UnknownTable(table.to_string()))
    }
}

/// Liveness probe.
pub async fn ping(headers: HeaderMap) -> Json<Value> {
    if let Some(ip) = client_ip(&headers) {
        log::info!("client IPs: {ip}");
    }
    Json(json!({"ping": "pong"}))
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
    pub expandables: Vec<String>,
}

/// Every auto-discovered table, sorted by name.
pub async fn list_tables<S: Store>(State(state): State<AppState<S>>) -> Json<Vec<TableSummary>> {
    let mut tables: Vec<TableSummary> = state
        .store
        .registry()
        .tables()
        .map(|desc| {
            let mut expandables: Vec<String> = desc.expandables.keys().cloned().collect();
            expandables.sort();
            TableSummary {
                name: desc.name.clone(),
                columns: desc.columns.iter().map(|c| c.name.clone()).collect(),
                primary_key: desc.primary_key.clone(),
                expandables,
            }
        })
        .collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Json(tables)
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub items: Vec<Value>,
}

/// List a table's records, paginated and ordered by request parameters,
/// with optional expansions and computed properties applied per item.
pub async fn list_records<S: Store>(
    State(state): State<AppState<S>>,
    Path(table): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<PageResponse>, ApiError> {
    let desc = state.descriptor(&table)?;
    let order = params.order();
    order.validate(&desc)?;

    let per_page = clamp_per_page(params.per_page, &state.pagination);
    let page = paginate(&*state.store, &table, &order, params.page, per_page).await?;

    let expand = params.expand_list();
    let adhoc = params.adhoc_expandables();
    let add_props = params.add_props_list();

    let extractor = Extractor::new(&*state.store);
    let mut items = Vec::with_capacity(page.items.len());
    for record in &page.items {
        let attrs = extractor
            .extract(record, &expand, &adhoc, &add_props)
            .await?;
        items.push(Value::Object(attrs));
    }

    Ok(Json(PageResponse {
        page: page.page,
        per_page: page.per_page,
        total: page.total,
        items,
    }))
}

/// Fetch one record by its integer primary key, or by `uuid` when the path
/// segment is not an integer and the table has a uuid column.
pub async fn get_record<S: Store>(
    State(state): State<AppState<S>>,
    Path((table, id)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let desc = state.descriptor(&table)?;

    let (column, value) = match (id.parse::<u64>(), desc.integer_pk()) {
        (Ok(id), Some(pk)) => (pk.to_string(), json!(id)),
        _ if desc
            .column("uuid")
            .is_some_and(|c| matches!(c.data_type, ColumnType::Uuid | ColumnType::Text)) =>
        {
            ("uuid".to_string(), json!(id))
        }
        _ => {
            return Err(ApiError::Validation(format!(
                "'{id}' is not a valid identifier for {table}"
            )))
        }
    };

    let record: Record = state
        .store
        .get_by_column(&table, &column, &value)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound(format!("no {table} record with {column} = {id}")))?;

    let attrs: JsonMap = Extractor::new(&*state.store)
        .extract(
            &record,
            &params.expand_list(),
            &params.adhoc_expandables(),
            &params.add_props_list(),
        )
        .await?;
    Ok(Json(Value::Object(attrs)))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub lookup: JsonMap,
    #[serde(default)]
    pub updates: JsonMap,
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub primary_key: Vec<Value>,
}

/// Insert-or-update by natural key. The lookup must exactly match the
/// primary key or one declared unique constraint; the response carries the
/// primary key of the affected row either way.
pub async fn upsert_record<S: Store>(
    State(state): State<AppState<S>>,
    Path(table): Path<String>,
    Json(request): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let desc = state.descriptor(&table)?;
    let plan = plan_upsert(&desc, &request.lookup, &request.updates)?;
    let primary_key = state
        .store
        .upsert(&plan)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(UpsertResponse { primary_key }))
}
