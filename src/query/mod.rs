//! # Queries
//!
//! Filter trees compile into set-operator pipelines rooted at the
//! primary-key stream of the target type: `Equals` becomes an ordered id
//! stream read from its index bucket, `And` an intersection, `Or` a
//! union, and an exclusion filter wraps the plan in a difference. The
//! primary stream carries the serialized records, so matches
//! deserialize straight out of the pipeline.
//!
//! The same filter tree doubles as a storage-free predicate used by
//! query-scoped subscriptions.

use std::marker::PhantomData;
use std::sync::Arc;

use redb::ReadableTable;

use crate::database::Database;
use crate::errors::Result;
use crate::events::{wrap_subscriber, Matcher, Operation, Ops, Subscription};
use crate::schema::{indexed_value, IndexValue, Record};
use crate::setop::{self, EmptySkipper, SetOp, SetOpKind, Skipper};
use crate::store::skipper::BucketSkipper;
use crate::store::{bucket, PRIMARY_KEY, SECONDARY_INDEX};
use crate::tx::Tx;

/// A predicate over records, usable both as an index scan plan and as
/// an in-memory match.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All children match.
    And(Vec<Filter>),
    /// At least one child matches.
    Or(Vec<Filter>),
    /// The named indexed field's encoding equals the value's encoding.
    Equals { field: String, value: IndexValue },
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn equals(field: impl Into<String>, value: impl Into<IndexValue>) -> Self {
        Filter::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Evaluate against an in-memory record, without touching storage.
    pub fn matches<T: Record>(&self, record: &T) -> Result<bool> {
        match self {
            Filter::And(filters) => {
                for filter in filters {
                    if !filter.matches(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(filters) => {
                for filter in filters {
                    if filter.matches(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Equals { field, value } => {
                let actual = indexed_value(record, field)?;
                Ok(actual.encode() == value.encode())
            }
        }
    }

    /// Compile into a skipper over the matching id stream.
    fn build_skipper<'t, R>(&self, table: &'t R, type_name: &str) -> Result<Box<dyn Skipper + 't>>
    where
        R: ReadableTable<&'static [u8], &'static [u8]>,
    {
        match self {
            Filter::Equals { field, value } => {
                let encoded = value.encode();
                let path: [&[u8]; 4] = [
                    SECONDARY_INDEX,
                    type_name.as_bytes(),
                    field.as_bytes(),
                    &encoded,
                ];
                if bucket::exists(table, &path)? {
                    Ok(Box::new(BucketSkipper::new(table, &path)))
                } else {
                    Ok(Box::new(EmptySkipper))
                }
            }
            Filter::And(filters) => {
                let sources = filters
                    .iter()
                    .map(|filter| filter.build_skipper(table, type_name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(SetOp::new(SetOpKind::Intersection, sources)))
            }
            Filter::Or(filters) => {
                let sources = filters
                    .iter()
                    .map(|filter| filter.build_skipper(table, type_name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(SetOp::new(SetOpKind::Union, sources)))
            }
        }
    }
}

/// Borrowed view of a query's plan inputs.
pub(crate) struct QuerySpec<'q> {
    pub filter: Option<&'q Filter>,
    pub exclude: Option<&'q Filter>,
    pub limit: usize,
}

/// Execute a query plan against the substrate table, feeding each
/// deserialized match to `f`. `f` returning `true` keeps iterating.
pub(crate) fn execute<T, R, F>(table: &R, spec: &QuerySpec<'_>, mut f: F) -> Result<()>
where
    T: Record,
    R: ReadableTable<&'static [u8], &'static [u8]>,
    F: FnMut(T) -> Result<bool>,
{
    let type_name = T::TYPE_NAME;
    let pk_path: [&[u8]; 2] = [PRIMARY_KEY, type_name.as_bytes()];
    let mut sources: Vec<Box<dyn Skipper + '_>> = Vec::new();
    if bucket::exists(table, &pk_path)? {
        sources.push(Box::new(BucketSkipper::new(table, &pk_path)));
    } else {
        sources.push(Box::new(EmptySkipper));
    }
    if let Some(filter) = spec.filter {
        sources.push(filter.build_skipper(table, type_name)?);
    }
    let mut root: Box<dyn Skipper + '_> = Box::new(SetOp::new(SetOpKind::Intersection, sources));
    if let Some(exclude) = spec.exclude {
        let excluded = exclude.build_skipper(table, type_name)?;
        root = Box::new(SetOp::new(SetOpKind::Difference, vec![root, excluded]));
    }

    let mut remaining = spec.limit;
    setop::for_each(root.as_mut(), |entry| {
        let record: T = serde_json::from_slice(&entry.value)?;
        if !f(record)? {
            return Ok(false);
        }
        if spec.limit > 0 {
            remaining -= 1;
            if remaining == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    })
}

#[derive(Clone, Copy)]
enum QueryRunner<'a> {
    Database(&'a Database),
    Tx(&'a Tx<'a>),
}

/// A search over records of one type.
///
/// Created from a transaction ([`Tx::query`], runs inside it) or from
/// the database handle ([`Database::query`], opens its own read
/// transaction per execution). Results come back in index-sorted byte
/// order of the ids; callers must not depend on more than "a total
/// order exists".
pub struct Query<'a, T: Record> {
    runner: QueryRunner<'a>,
    filter: Option<Filter>,
    exclude: Option<Filter>,
    limit: usize,
    _record: PhantomData<fn() -> T>,
}

impl<'a, T: Record> Query<'a, T> {
    pub(crate) fn in_tx(tx: &'a Tx<'a>) -> Self {
        Query {
            runner: QueryRunner::Tx(tx),
            filter: None,
            exclude: None,
            limit: 0,
            _record: PhantomData,
        }
    }

    pub(crate) fn in_database(db: &'a Database) -> Self {
        Query {
            runner: QueryRunner::Database(db),
            filter: None,
            exclude: None,
            limit: 0,
            _record: PhantomData,
        }
    }

    /// Limit the results to records matching `filter`.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Exclude records matching `filter` from the results.
    pub fn except(mut self, filter: Filter) -> Self {
        self.exclude = Some(filter);
        self
    }

    /// Cap the number of returned records. Zero means no cap.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    fn spec(&self) -> QuerySpec<'_> {
        QuerySpec {
            filter: self.filter.as_ref(),
            exclude: self.exclude.as_ref(),
            limit: self.limit,
        }
    }

    fn each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(T) -> Result<bool>,
    {
        match self.runner {
            QueryRunner::Tx(tx) => tx.run_query::<T, _>(&self.spec(), &mut f),
            QueryRunner::Database(db) => db.view(|tx| tx.run_query::<T, _>(&self.spec(), &mut f)),
        }
    }

    /// Collect every match.
    pub fn all(&self) -> Result<Vec<T>> {
        let mut results = Vec::new();
        self.each(|record| {
            results.push(record);
            Ok(true)
        })?;
        Ok(results)
    }

    /// The first match, if any.
    pub fn first(&self) -> Result<Option<T>> {
        let mut result = None;
        self.each(|record| {
            result = Some(record);
            Ok(false)
        })?;
        Ok(result)
    }

    /// Whether `record` satisfies this query's predicate: the filter
    /// matches and the exclusion does not. Never touches storage.
    pub fn matches(&self, record: &T) -> Result<bool> {
        if let Some(filter) = &self.filter {
            if !filter.matches(record)? {
                return Ok(false);
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.matches(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A subscription delivering events for records matching this query.
    ///
    /// Captures the current filter and exclusion; later changes to the
    /// query do not affect the subscription.
    pub fn subscription<F>(
        &self,
        name: impl Into<String>,
        ops: Ops,
        subscriber: F,
    ) -> Subscription
    where
        F: Fn(T, Operation) -> Result<()> + Send + 'static,
    {
        let filter = self.filter.clone();
        let exclude = self.exclude.clone();
        let matcher: Matcher = Arc::new(move |value| {
            let record: T = serde_json::from_value(value.clone())?;
            if let Some(filter) = &filter {
                if !filter.matches(&record)? {
                    return Ok(false);
                }
            }
            if let Some(exclude) = &exclude {
                if exclude.matches(&record)? {
                    return Ok(false);
                }
            }
            Ok(true)
        });
        let db = match self.runner {
            QueryRunner::Database(db) => db,
            QueryRunner::Tx(tx) => tx.database(),
        };
        Subscription::new(
            db.registry(),
            name.into(),
            T::TYPE_NAME,
            ops,
            matcher,
            wrap_subscriber(subscriber),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Id, IndexedField};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Toy {
        id: Id,
        name: String,
        age: i64,
    }

    impl Record for Toy {
        const TYPE_NAME: &'static str = "toy";

        fn id(&self) -> &Id {
            &self.id
        }

        fn id_mut(&mut self) -> &mut Id {
            &mut self.id
        }

        fn indexed_fields(&self) -> Vec<IndexedField> {
            vec![
                ("name", IndexValue::from(self.name.as_str())),
                ("age", IndexValue::from(self.age)),
            ]
        }
    }

    fn toy(name: &str, age: i64) -> Toy {
        Toy {
            id: Id::random(),
            name: name.to_string(),
            age,
        }
    }

    #[test]
    fn test_equals_matches() {
        let record = toy("hehu", 12);
        assert!(Filter::equals("name", "hehu").matches(&record).unwrap());
        assert!(!Filter::equals("name", "blapp").matches(&record).unwrap());
        assert!(Filter::equals("age", 12i64).matches(&record).unwrap());
        assert!(!Filter::equals("age", 13i64).matches(&record).unwrap());
    }

    #[test]
    fn test_and_or_matches() {
        let record = toy("hehu", 12);
        let filter = Filter::and([
            Filter::equals("name", "hehu"),
            Filter::or([Filter::equals("age", 12i64), Filter::equals("age", 11i64)]),
        ]);
        assert!(filter.matches(&record).unwrap());

        let filter = Filter::and([
            Filter::equals("name", "hehu"),
            Filter::equals("age", 11i64),
        ]);
        assert!(!filter.matches(&record).unwrap());
    }

    #[test]
    fn test_empty_and_or() {
        let record = toy("hehu", 12);
        assert!(Filter::and([]).matches(&record).unwrap());
        assert!(!Filter::or([]).matches(&record).unwrap());
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let record = toy("hehu", 12);
        let err = Filter::equals("email", "x").matches(&record).unwrap_err();
        assert!(matches!(err, crate::errors::Error::Schema(_)));
    }
}
