//! Query types shared by the pagination coordinator and the client.

use serde::{Deserialize, Serialize};

/// Opaque server-side query, e.g. a search expression or album selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query(pub String);

impl Query {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One ordering clause passed through to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }
}

/// Options for a paginated query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Page the query starts from (and resets to for a new query)
    pub page_num: u32,
    pub results_per_page: u32,
    pub orderings: Vec<SortKey>,
}

impl QueryOptions {
    /// First page number used by the backend.
    pub const START_PAGE: u32 = 1;

    pub fn new(results_per_page: u32) -> Self {
        Self { page_num: Self::START_PAGE, results_per_page, orderings: Vec::new() }
    }

    pub fn with_ordering(mut self, key: SortKey) -> Self {
        self.orderings.push(key);
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new(100)
    }
}

/// One page of identifiers returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    pub identifiers: Vec<String>,
    pub page_num: u32,
    pub is_last_page: bool,
}

/// Request lifecycle of the current query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestState {
    #[default]
    Idle,
    Loading,
    Succeeded,
    Failed,
}
