//! Filter, order and limit parameters for collection queries.

use serde_json::Value as JsonValue;

const DEFAULT_LIMIT: usize = 100;

/// Records match when every `key == value` filter holds. They are ordered by
/// the `order_by` keys in turn, `true` meaning descending.
#[derive(Debug, Clone)]
pub struct Query {
    filters: Vec<(String, JsonValue)>,
    order_by: Vec<(String, bool)>,
    limit: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Match records whose `key` equals `value`.
    pub fn push(
        mut self,
        key: &str,
        value: impl Into<JsonValue>,
    ) -> Self {
        self.filters.push((key.to_string(), value.into()));
        self
    }

    pub fn set_order(
        mut self,
        key: &str,
        rev: bool,
    ) -> Self {
        self.order_by.push((key.to_string(), rev));
        self
    }

    pub fn set_limit(
        mut self,
        limit: usize,
    ) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn filters(&self) -> &[(String, JsonValue)] {
        &self.filters
    }

    /// Value the query requires for `key`, if it filters on it.
    pub fn filter_value(
        &self,
        key: &str,
    ) -> Option<&JsonValue> {
        self.filters.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn order_by(&self) -> &[(String, bool)] {
        &self.order_by
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
