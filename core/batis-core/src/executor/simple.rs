//! Executor that runs every statement on a fresh connection.

use super::{Executor, MappedStatement, RowBounds, SimpleStatementHandler, StatementHandler};
use crate::cache::CacheKey;
use crate::datasource::{Connection, DataSource};
use crate::error::BatisResult;
use crate::plugin::InterceptorChain;
use crate::scripting::BoundSql;
use crate::value::{Row, Value};
use std::sync::Arc;

pub struct SimpleExecutor {
    data_source: Arc<dyn DataSource>,
    handler: Arc<dyn StatementHandler>,
    environment_id: Option<String>,
}

impl SimpleExecutor {
    pub fn new(data_source: Arc<dyn DataSource>) -> Self {
        Self {
            data_source,
            handler: Arc::new(SimpleStatementHandler),
            environment_id: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn StatementHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Wraps the statement handler with every registered plugin.
    pub fn with_plugins(mut self, chain: &InterceptorChain<dyn StatementHandler>) -> Self {
        self.handler = chain.plugin_all(self.handler);
        self
    }

    /// Environment id mixed into cache keys.
    pub fn with_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> BatisResult<R>,
    ) -> BatisResult<R> {
        let mut conn = self.data_source.get_connection()?;
        let result = f(conn.as_mut());
        let closed = conn.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl Executor for SimpleExecutor {
    fn query_bound(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>> {
        self.with_connection(|conn| self.handler.query(conn, ms, bound, bounds))
    }

    fn update(&self, ms: &MappedStatement, parameter: &Value) -> BatisResult<u64> {
        let bound = ms.bound_sql(parameter)?;
        self.with_connection(|conn| self.handler.update(conn, ms, &bound))
    }

    /// Statement id, paging bounds, SQL text, every bound value and the
    /// environment id, in that order.
    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(ms.id());
        key.update(bounds.offset());
        key.update(bounds.limit());
        key.update(bound.sql());
        key.update_all(bound.parameter_values());
        if let Some(environment_id) = &self.environment_id {
            key.update(environment_id.as_str());
        }
        key
    }
}
