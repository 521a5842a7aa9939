//! Request-facing query plans.
//!
//! A [`QueryRequest`] is the wire shape a caller sends: filters, sort keys
//! and paging. [`QueryPlan::from_request`] resolves it against an entity type
//! once, reporting every client mistake as a [`QueryError`] before any rows
//! are touched, and [`QueryPlan::apply`] runs it against a [`QuerySource`].
//!
//! ```json
//! {
//!   "filters": [
//!     { "propertyName": "Level", "declaredType": "Integer", "operator": "GreaterThan", "value": "2" }
//!   ],
//!   "sort": [{ "propertyName": "Name" }],
//!   "skip": 0,
//!   "take": 20
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::entity::Entity;
use crate::error::{QueryError, QueryResult};
use crate::order::{CompositeOrder, OrderBuilder, SortSpec};
use crate::source::QuerySource;
use crate::specification::Specification;
use crate::translate::{FilterSpec, FilterTranslator};

/// A query as sent by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    /// Filters, combined with AND.
    pub filters: Vec<FilterSpec>,
    /// Sort keys, primary first.
    pub sort: SortSpec,
    /// Rows to skip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    /// Rows to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<usize>,
}

impl QueryRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a request from JSON.
    pub fn from_json(json: &str) -> QueryResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| QueryError::invalid_request(format!("Malformed query request: {}", e)).with_source(e))
    }

    /// Add a filter.
    pub fn filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the sort keys.
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    /// Set the number of rows to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Set the number of rows to return.
    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }
}

/// Resolved skip/take.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Rows to skip.
    pub skip: usize,
    /// Maximum rows to return.
    pub take: Option<usize>,
}

impl Pagination {
    /// Page-based pagination (1-indexed). Skip saturates at `usize::MAX`.
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            skip: page.saturating_sub(1).saturating_mul(page_size),
            take: Some(page_size),
        }
    }
}

/// A request resolved against one entity type.
pub struct QueryPlan<T> {
    filter: Specification<T>,
    order: CompositeOrder<T>,
    pagination: Pagination,
}

impl<T: Entity> QueryPlan<T> {
    /// Resolve a request.
    ///
    /// `take` defaults to `paging.default_page_size` and is clamped to
    /// `paging.max_page_size`.
    pub fn from_request(request: &QueryRequest, config: &EngineConfig) -> QueryResult<Self> {
        let filter = FilterTranslator::from_config(config).translate_all::<T>(&request.filters)?;
        let order = OrderBuilder::from_config(config).resolve::<T>(&request.sort)?;

        let take = request
            .take
            .unwrap_or(config.paging.default_page_size)
            .min(config.paging.max_page_size);
        let pagination = Pagination {
            skip: request.skip.unwrap_or(0),
            take: Some(take),
        };

        debug!(
            entity = T::metadata().name(),
            filters = request.filters.len(),
            sort_keys = request.sort.len(),
            skip = pagination.skip,
            take,
            "QueryPlan resolved"
        );

        Ok(Self {
            filter,
            order,
            pagination,
        })
    }

    /// The combined filter.
    pub fn filter(&self) -> &Specification<T> {
        &self.filter
    }

    /// The resolved ordering.
    pub fn order(&self) -> &CompositeOrder<T> {
        &self.order
    }

    /// The resolved paging.
    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Run the plan: filter, then order, then page.
    pub fn apply<S: QuerySource<Item = T>>(&self, source: S) -> QueryResult<S> {
        let source = source.filter(&self.filter)?;

        let mut keys = self.order.keys().iter().cloned();
        let source = match keys.next() {
            Some(primary) => keys.fold(source.order_by(primary), |source, key| source.then_by(key)),
            None => source,
        };

        Ok(source.slice(self.pagination.skip, self.pagination.take))
    }
}

impl<T> Clone for QueryPlan<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            order: self.order.clone(),
            pagination: self.pagination,
        }
    }
}

impl<T> fmt::Debug for QueryPlan<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("filter", &self.filter.to_string())
            .field("order", &self.order.to_string())
            .field("pagination", &self.pagination)
            .finish()
    }
}
