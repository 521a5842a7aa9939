//! Queryable sequences.
//!
//! The engine never executes anything against storage itself. It builds
//! specifications and order keys and hands them to a [`QuerySource`], which
//! decides how to run them. [`MemorySource`] is the in-process
//! implementation over a `Vec`.

use std::fmt;

use tracing::trace;

use crate::entity::Entity;
use crate::error::QueryResult;
use crate::order::{CompositeOrder, OrderKey};
use crate::specification::Specification;

/// A sequence that can be filtered, ordered and paged.
///
/// `order_by` starts a new ordering, `then_by` adds a tie-breaker to the
/// current one. Implementations must keep the relative order of rows tied on
/// every key.
pub trait QuerySource: Sized {
    /// The entity type of the rows.
    type Item: Entity;

    /// Keep rows satisfying `spec`.
    fn filter(self, spec: &Specification<Self::Item>) -> QueryResult<Self>;

    /// Order by `key`, replacing any pending ordering.
    fn order_by(self, key: OrderKey<Self::Item>) -> Self;

    /// Break ties of the current ordering by `key`.
    fn then_by(self, key: OrderKey<Self::Item>) -> Self;

    /// Skip `skip` rows, then keep at most `take`.
    fn slice(self, skip: usize, take: Option<usize>) -> Self;
}

/// In-memory rows.
///
/// Order keys accumulate until the rows are observed (`slice`, `into_vec`,
/// `rows`), then a single stable sort is applied.
pub struct MemorySource<T> {
    rows: Vec<T>,
    pending: CompositeOrder<T>,
}

impl<T: Entity> MemorySource<T> {
    /// Wrap rows in their current order.
    pub fn new(rows: impl IntoIterator<Item = T>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
            pending: CompositeOrder::default(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows after applying pending ordering.
    pub fn rows(&mut self) -> &[T] {
        self.flush();
        &self.rows
    }

    /// Take the rows after applying pending ordering.
    pub fn into_vec(mut self) -> Vec<T> {
        self.flush();
        self.rows
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        trace!(rows = self.rows.len(), order = %self.pending, "sorting rows");
        let rows = std::mem::take(&mut self.rows);
        self.rows = self.pending.sort(rows);
        self.pending.clear();
    }
}

impl<T: Entity> QuerySource for MemorySource<T> {
    type Item = T;

    fn filter(mut self, spec: &Specification<T>) -> QueryResult<Self> {
        let predicate = spec.compiled()?;
        // Filtering keeps relative order, so pending keys stay valid.
        self.rows.retain(|row| predicate.call(row));
        Ok(self)
    }

    fn order_by(mut self, key: OrderKey<T>) -> Self {
        self.pending = CompositeOrder::new(vec![key]);
        self
    }

    fn then_by(mut self, key: OrderKey<T>) -> Self {
        self.pending.push(key);
        self
    }

    fn slice(mut self, skip: usize, take: Option<usize>) -> Self {
        self.flush();
        let skip = skip.min(self.rows.len());
        self.rows.drain(..skip);
        if let Some(take) = take {
            self.rows.truncate(take);
        }
        self
    }
}

impl<T: Entity> From<Vec<T>> for MemorySource<T> {
    fn from(rows: Vec<T>) -> Self {
        Self::new(rows)
    }
}

impl<T: Entity> FromIterator<T> for MemorySource<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<T: fmt::Debug> fmt::Debug for MemorySource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("rows", &self.rows)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::fixtures::{Permission, permissions};
    use crate::order::SortKey;
    use pretty_assertions::assert_eq;

    fn key(sort: SortKey) -> OrderKey<Permission> {
        OrderKey::resolve(&sort).unwrap()
    }

    fn ids(source: MemorySource<Permission>) -> Vec<i64> {
        source.into_vec().into_iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_then_by_breaks_ties() {
        let source = MemorySource::new(permissions())
            .order_by(key(SortKey::asc("Level")))
            .then_by(key(SortKey::desc("Id")));
        assert_eq!(ids(source), vec![4, 5, 2, 8, 6, 1, 7, 9, 3]);
    }

    #[test]
    fn test_order_by_replaces_pending_order() {
        let source = MemorySource::new(permissions())
            .order_by(key(SortKey::desc("Id")))
            .order_by(key(SortKey::asc("Id")));
        assert_eq!(ids(source), (1..=9).collect::<Vec<_>>());
    }

    #[test]
    fn test_filter_then_slice() {
        let spec = Specification::<Permission>::build(|x| Ok(x.property("Id")?.gt(2))).unwrap();
        let source = MemorySource::new(permissions())
            .filter(&spec)
            .unwrap()
            .order_by(key(SortKey::desc("Id")))
            .slice(1, Some(3));
        assert_eq!(ids(source), vec![8, 7, 6]);
    }

    #[test]
    fn test_slice_bounds() {
        assert!(MemorySource::new(permissions()).slice(20, None).is_empty());
        assert_eq!(MemorySource::new(permissions()).slice(7, Some(10)).len(), 2);
        assert_eq!(MemorySource::new(permissions()).slice(0, Some(0)).len(), 0);
    }

    #[test]
    fn test_rows_flushes_pending_order() {
        let mut source = MemorySource::new(permissions()).order_by(key(SortKey::desc("Id")));
        assert_eq!(source.rows()[0].id, 9);
    }
}
