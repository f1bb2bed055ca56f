//! Mapped statements and paging bounds

use crate::cache::Cache;
use crate::error::BatisResult;
use crate::scripting::{BoundSql, SqlSource};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_select(self) -> bool {
        matches!(self, StatementKind::Select)
    }
}

/// One statement: its id, SQL source and cache policy.
///
/// Selects use the statement cache and leave it alone by default; writes
/// flush it.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    kind: StatementKind,
    sql_source: Arc<dyn SqlSource>,
    cache: Option<Arc<dyn Cache>>,
    use_cache: bool,
    flush_cache: bool,
}

impl MappedStatement {
    pub fn new(id: impl Into<String>, kind: StatementKind, sql_source: Arc<dyn SqlSource>) -> Self {
        let select = kind.is_select();
        Self {
            id: id.into(),
            kind,
            sql_source,
            cache: None,
            use_cache: select,
            flush_cache: !select,
        }
    }

    pub fn select(id: impl Into<String>, sql_source: Arc<dyn SqlSource>) -> Self {
        Self::new(id, StatementKind::Select, sql_source)
    }

    /// Namespace cache shared by the statements of one mapper.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn flush_cache(mut self, flush_cache: bool) -> Self {
        self.flush_cache = flush_cache;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    pub fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn is_flush_cache_required(&self) -> bool {
        self.flush_cache
    }

    pub fn bound_sql(&self, parameter: &Value) -> BatisResult<BoundSql> {
        self.sql_source.bound_sql(parameter)
    }
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .field("use_cache", &self.use_cache)
            .field("flush_cache", &self.flush_cache)
            .finish()
    }
}

/// In-memory paging over a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    offset: usize,
    limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;
    pub const DEFAULT: RowBounds = RowBounds {
        offset: Self::NO_ROW_OFFSET,
        limit: Self::NO_ROW_LIMIT,
    };

    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.is_default() {
            return items;
        }
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}
