use serde::Serialize;
use thiserror::Error;

use crate::config::PaginationConfig;
use crate::model::{Record, TableDescriptor};
use crate::store::RecordStore;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("cannot order by '{column}': no such column on {table}")]
    UnknownColumn { table: String, column: String },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Ordering derived from the `order_by` / `reverse` request parameters.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub reverse: bool,
}

impl OrderBy {
    pub const DEFAULT_COLUMN: &'static str = "created";

    pub fn from_params(order_by: Option<&str>, reverse: bool) -> Self {
        Self {
            column: order_by.unwrap_or(Self::DEFAULT_COLUMN).to_string(),
            reverse,
        }
    }

    pub fn validate(&self, desc: &TableDescriptor) -> Result<(), QueryError> {
        if desc.has_column(&self.column) {
            Ok(())
        } else {
            Err(QueryError::UnknownColumn {
                table: desc.name.clone(),
                column: self.column.clone(),
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub items: Vec<Record>,
}

pub fn clamp_per_page(requested: Option<u32>, config: &PaginationConfig) -> u32 {
    requested
        .unwrap_or(config.per_page)
        .clamp(1, config.max_per_page)
}

/// Total number of pages, never less than 1 (an empty result set still has
/// one empty page, matching the `pages or 1` behavior callers rely on).
pub fn page_count(total: u64, per_page: u32) -> u32 {
    let pages = total.div_ceil(per_page as u64);
    pages.max(1) as u32
}

/// An unspecified page resolves to the last page, so the most recent items
/// under the default ordering are what callers see first.
pub fn resolve_page(requested: Option<u32>, pages: u32) -> u32 {
    requested.unwrap_or(pages).max(1)
}

pub fn offset(page: u32, per_page: u32) -> u64 {
    u64::from(page - 1) * u64::from(per_page)
}

/// Count, resolve the page number, and fetch the slice. A page past the
/// end returns an empty item list rather than an error.
pub async fn paginate<S: RecordStore + ?Sized>(
    store: &S,
    table: &str,
    order: &OrderBy,
    page: Option<u32>,
    per_page: u32,
) -> Result<Page, QueryError> {
    let total = store.count(table).await?;
    let pages = page_count(total, per_page);
    let page = resolve_page(page, pages);
    let items = store
        .fetch_page(table, order, offset(page, per_page), u64::from(per_page))
        .await?;

    Ok(Page {
        page,
        per_page,
        total,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PaginationConfig {
        PaginationConfig {
            per_page: 20,
            max_per_page: 100,
        }
    }

    #[test]
    fn per_page_is_clamped_to_the_configured_maximum() {
        assert_eq!(clamp_per_page(None, &config()), 20);
        assert_eq!(clamp_per_page(Some(10), &config()), 10);
        assert_eq!(clamp_per_page(Some(500), &config()), 100);
        assert_eq!(clamp_per_page(Some(0), &config()), 1);
    }

    #[test]
    fn page_count_rounds_up_and_never_hits_zero() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(1, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(25, 10), 3);
    }

    #[test]
    fn unspecified_page_defaults_to_the_last_page() {
        assert_eq!(resolve_page(None, 3), 3);
        assert_eq!(resolve_page(Some(1), 3), 1);
        assert_eq!(resolve_page(Some(99), 3), 99);
        assert_eq!(resolve_page(Some(0), 3), 1);
    }

    #[test]
    fn offsets_are_zero_based() {
        assert_eq!(offset(1, 10), 0);
        assert_eq!(offset(3, 10), 20);
    }
}
