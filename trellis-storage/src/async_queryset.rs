//! Suspending query set, with the same operations as
//! [`QuerySet`](crate::QuerySet).

use std::marker::PhantomData;

use trellis_core::{Document, Predicate, TrellisResult, Value};
use trellis_cql::{parse_keyword_in, parse_keywords_in, QuerySpec, Statement};

use crate::async_backend::AsyncBackend;
use crate::async_session::AsyncSession;
use crate::plan;

pub struct AsyncQuerySet<'s, D, B> {
    session: &'s AsyncSession<B>,
    spec: QuerySpec,
    _document: PhantomData<fn() -> D>,
}

impl<D, B> Clone for AsyncQuerySet<'_, D, B> {
    fn clone(&self) -> Self {
        Self {
            session: self.session,
            spec: self.spec.clone(),
            _document: PhantomData,
        }
    }
}

impl<'s, D: Document, B: AsyncBackend> AsyncQuerySet<'s, D, B> {
    pub(crate) fn new(session: &'s AsyncSession<B>) -> Self {
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

    pub fn compile(&self) -> TrellisResult<Statement> {
        plan::plan_select::<D>(&self.spec, self.session.default_keyspace())
    }

    // === Terminal ===

    pub async fn all(&self) -> TrellisResult<Vec<D>> {
        let rows = self.session.execute(&self.compile()?).await?;
        plan::map_rows(&rows)
    }

    pub async fn first(&self) -> TrellisResult<Option<D>> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    pub async fn get(&self) -> TrellisResult<D> {
        plan::expect_one(self.all().await?)
    }

    pub async fn count(&self) -> TrellisResult<u64> {
        let statement = plan::plan_count::<D>(&self.spec, self.session.default_keyspace())?;
        plan::count_from_rows(&self.session.execute(&statement).await?)
    }

    pub async fn delete(&self) -> TrellisResult<()> {
        let statement = plan::plan_query_delete::<D>(&self.spec, self.session.default_keyspace())?;
        self.session.execute(&statement).await.map(|_| ())
    }

    pub async fn iter(&self) -> TrellisResult<std::vec::IntoIter<D>> {
        Ok(self.all().await?.into_iter())
    }

    pub async fn len(&self) -> TrellisResult<usize> {
        Ok(self.count().await? as usize)
    }

    pub async fn is_empty(&self) -> TrellisResult<bool> {
        Ok(self.count().await? == 0)
    }
}
