//! Statement execution
//!
//! ```text
//! CachingExecutor ──miss──▶ SimpleExecutor ──▶ DataSource ──▶ StatementHandler
//!       │                                                        (plugins)
//!       └── statement cache (per MappedStatement)
//! ```

pub mod caching;
pub mod mapped;
pub mod simple;
pub mod statement;

pub use caching::CachingExecutor;
pub use mapped::{MappedStatement, RowBounds, StatementKind};
pub use simple::SimpleExecutor;
pub use statement::{SimpleStatementHandler, StatementHandler};

use crate::cache::CacheKey;
use crate::error::BatisResult;
use crate::scripting::BoundSql;
use crate::value::{Row, Value};

/// Runs mapped statements. Implementations may wrap one another and can be
/// wrapped by plugins through `InterceptorChain<dyn Executor>`.
pub trait Executor: Send + Sync {
    /// Renders the statement for `parameter` and runs it as a query.
    fn query(
        &self,
        ms: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>> {
        let bound = ms.bound_sql(parameter)?;
        self.query_bound(ms, &bound, bounds)
    }

    /// Runs already rendered SQL as a query.
    fn query_bound(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>>;

    /// Runs an insert/update/delete and returns the affected row count.
    fn update(&self, ms: &MappedStatement, parameter: &Value) -> BatisResult<u64>;

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> CacheKey;
}
