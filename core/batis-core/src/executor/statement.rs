//! Statement handlers: bind parameters and talk to the connection.

use super::{MappedStatement, RowBounds};
use crate::datasource::Connection;
use crate::error::{BatisError, BatisResult};
use crate::scripting::BoundSql;
use crate::value::Row;

/// Executes bound SQL on a connection.
pub trait StatementHandler: Send + Sync {
    fn query(
        &self,
        conn: &mut dyn Connection,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>>;

    fn update(
        &self,
        conn: &mut dyn Connection,
        ms: &MappedStatement,
        bound: &BoundSql,
    ) -> BatisResult<u64>;
}

/// Binds placeholder values positionally and pages rows in memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleStatementHandler;

fn execution_error(ms: &MappedStatement, err: BatisError) -> BatisError {
    match err {
        // already tagged, or a wrapper that is gone
        e @ (BatisError::Execution { .. } | BatisError::ConnectionClosed) => e,
        e => BatisError::Execution {
            statement: ms.id().to_string(),
            message: e.to_string(),
        },
    }
}

impl StatementHandler for SimpleStatementHandler {
    fn query(
        &self,
        conn: &mut dyn Connection,
        ms: &MappedStatement,
        bound: &BoundSql,
        bounds: RowBounds,
    ) -> BatisResult<Vec<Row>> {
        let params = bound.parameter_values();
        tracing::debug!(target: "executor", statement = ms.id(), sql = bound.sql(), params = params.len(), "query");
        let rows = conn
            .query(bound.sql(), &params)
            .map_err(|e| execution_error(ms, e))?;
        Ok(bounds.apply(rows))
    }

    fn update(
        &self,
        conn: &mut dyn Connection,
        ms: &MappedStatement,
        bound: &BoundSql,
    ) -> BatisResult<u64> {
        let params = bound.parameter_values();
        tracing::debug!(target: "executor", statement = ms.id(), sql = bound.sql(), params = params.len(), "update");
        conn.update(bound.sql(), &params)
            .map_err(|e| execution_error(ms, e))
    }
}
