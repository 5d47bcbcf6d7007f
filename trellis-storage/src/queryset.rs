//! Blocking query set.

use std::marker::PhantomData;

use trellis_core::{Document, Predicate, TrellisResult, Value};
use trellis_cql::{parse_keyword_in, parse_keywords_in, QuerySpec, Statement};

use crate::backend::Backend;
use crate::plan;
use crate::session::Session;

/// Immutable, chainable query over `D`.
///
/// Chain methods return a new query set; terminal methods compile the
/// accumulated [`QuerySpec`] and execute it on the session's backend.
pub struct QuerySet<'s, D, B> {
    session: &'s Session<B>,
    spec: QuerySpec,
    _document: PhantomData<fn() -> D>,
}

impl<D, B> Clone for QuerySet<'_, D, B> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            spec: self.spec.clone(),
            _document: PhantomData,
        }
    }
}

impl<'s, D: Document, B: Backend> QuerySet<'s, D, B> {
    pub(crate) fn new(session: &'s Session<B>) -> Self {
        Self {
            session,
            spec: QuerySpec::new(),
            _document: PhantomData,
        }
    }

    fn with_spec(&self, spec: QuerySpec) -> Self {
        Self {
            session: self.session,
            spec,
            _document: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    // === Chain ===

    pub fn filter(&self, predicate: Predicate) -> Self {
        self.with_spec(self.spec.filter(predicate))
    }

    /// Filter with a suffix keyword such as `rating__gte`.
    pub fn filter_by(&self, keyword: &str, value: impl Into<Value>) -> TrellisResult<Self> {
        let schema = D::schema()?;
        Ok(self.filter(parse_keyword_in(&schema, keyword, value)?))
    }

    pub fn filter_keywords<I, K, V>(&self, keywords: I) -> TrellisResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let schema = D::schema()?;
        let spec = parse_keywords_in(&schema, keywords)?
            .into_iter()
            .fold(self.spec.clone(), |spec, p| spec.filter(p));
        Ok(self.with_spec(spec))
    }

    pub fn limit(&self, limit: u32) -> Self {
        self.with_spec(self.spec.limit(limit))
    }

    pub fn order_by(&self, field: &str) -> Self {
        self.with_spec(self.spec.order_by(field))
    }

    pub fn allow_filtering(&self) -> Self {
        self.with_spec(self.spec.allow_filtering())
    }

    pub fn ann_of(&self, column: &str, vector: Vec<f32>) -> Self {
        self.with_spec(self.spec.ann_of(column, vector))
    }

    /// The SELECT this query set would execute.
    pub fn compile(&self) -> TrellisResult<Statement> {
        plan::plan_select::<D>(&self.spec, self.session.default_keyspace())
    }

    // === Terminal ===

    pub fn all(&self) -> TrellisResult<Vec<D>> {
        let rows = self.session.execute(&self.compile()?)?;
        plan::map_rows(&rows)
    }

    pub fn first(&self) -> TrellisResult<Option<D>> {
        Ok(self.limit(1).all()?.into_iter().next())
    }

    /// Exactly one match, else `NotFound` / `MultipleFound`.
    pub fn get(&self) -> TrellisResult<D> {
        plan::expect_one(self.all()?)
    }

    pub fn count(&self) -> TrellisResult<u64> {
        let statement = plan::plan_count::<D>(&self.spec, self.session.default_keyspace())?;
        plan::count_from_rows(&self.session.execute(&statement)?)
    }

    /// DELETE using the accumulated filters.
    pub fn delete(&self) -> TrellisResult<()> {
        let statement = plan::plan_query_delete::<D>(&self.spec, self.session.default_keyspace())?;
        self.session.execute(&statement).map(|_| ())
    }

    pub fn iter(&self) -> TrellisResult<std::vec::IntoIter<D>> {
        Ok(self.all()?.into_iter())
    }

    /// Number of matching rows, via COUNT.
    pub fn len(&self) -> TrellisResult<usize> {
        Ok(self.count()? as usize)
    }

    pub fn is_empty(&self) -> TrellisResult<bool> {
        Ok(self.count()? == 0)
    }
}
