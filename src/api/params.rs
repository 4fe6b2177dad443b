use std::collections::HashMap;

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::logic::OrderBy;

/// Query parameters for record listings. `expand` and `add_props` are
/// comma-separated; flags accept the usual truthy spellings.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub order_by: Option<String>,
    pub reverse: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub expand: Option<String>,
    pub add_props: Option<String>,
}

impl ListParams {
    pub fn order(&self) -> OrderBy {
        OrderBy::from_params(
            self.order_by.as_deref(),
            self.reverse.as_deref().map_or(false, string_to_bool),
        )
    }

    pub fn expand_list(&self) -> Vec<String> {
        split_csv(self.expand.as_deref())
    }

    pub fn add_props_list(&self) -> Vec<String> {
        split_csv(self.add_props.as_deref())
    }

    /// No per-request adhoc expandables on the list endpoints yet.
    pub fn adhoc_expandables(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn string_to_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "y" | "on"
    )
}

/// Client address as reported by the proxy, first `X-Forwarded-For` entry.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn truthy_spellings() {
        for value in ["1", "true", "T", "YES", "y", "On"] {
            assert!(string_to_bool(value), "{value} should be true");
        }
        for value in ["0", "false", "no", "off", ""] {
            assert!(!string_to_bool(value), "{value} should be false");
        }
    }

    #[test]
    fn csv_params_skip_empty_entries() {
        let params = ListParams {
            expand: Some("owner, manager,,".to_string()),
            ..ListParams::default()
        };
        assert_eq!(params.expand_list(), vec!["owner", "manager"]);
        assert!(params.add_props_list().is_empty());
    }

    #[test]
    fn order_defaults_to_created_ascending() {
        let params = ListParams::default();
        let order = params.order();
        assert_eq!(order.column, "created");
        assert!(!order.reverse);
    }

    #[test]
    fn forwarded_for_takes_the_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.0.0.1, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers), Some("10.0.0.1".to_string()));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
