//! Data source module: physical connections and the pool built over them.
//!
//! The executor depends only on the [`DataSource`] and [`Connection`]
//! traits; drivers plug in through [`Driver`].
//!
//! ```text
//! PooledDataSource ──new_connection──▶ UnpooledDataSource ──connect──▶ Driver
//!        │                                                          │
//!        └──────────── PooledConnection (wraps) ◀── Box<dyn Connection>
//! ```

pub mod memory;
pub mod pooled;
pub mod unpooled;

pub use memory::{MemoryConnection, MemoryDriver};
pub use pooled::{
    PoolConfig, PoolStatus, PooledConnection, PooledDataSource, PooledDataSourceFactory,
};
pub use unpooled::{DriverSettings, UnpooledDataSource, UnpooledDataSourceFactory};

use crate::error::BatisResult;
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Transaction isolation levels understood by drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// JDBC-style numeric code.
    pub fn code(self) -> i32 {
        match self {
            IsolationLevel::None => 0,
            IsolationLevel::ReadUncommitted => 1,
            IsolationLevel::ReadCommitted => 2,
            IsolationLevel::RepeatableRead => 4,
            IsolationLevel::Serializable => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(IsolationLevel::None),
            1 => Some(IsolationLevel::ReadUncommitted),
            2 => Some(IsolationLevel::ReadCommitted),
            4 => Some(IsolationLevel::RepeatableRead),
            8 => Some(IsolationLevel::Serializable),
            _ => None,
        }
    }
}

impl FromStr for IsolationLevel {
    type Err = crate::error::BatisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Self::from_code(code).ok_or_else(|| {
                crate::error::BatisError::Config(format!("unknown isolation level code {code}"))
            });
        }
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(IsolationLevel::None),
            "READ_UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ_COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE_READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            other => Err(crate::error::BatisError::Config(format!(
                "unknown isolation level '{other}'"
            ))),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::None => "NONE",
            IsolationLevel::ReadUncommitted => "READ_UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ_COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE_READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// 물리 커넥션 인터페이스
///
/// # Contract
///
/// - `close`: idempotent; later calls on a closed physical connection fail.
/// - `execute`: runs a statement and discards any result (used for pings).
/// - `query` / `update`: positional parameters bind to `?` placeholders.
pub trait Connection: Send {
    fn close(&mut self) -> BatisResult<()>;

    fn is_closed(&self) -> BatisResult<bool>;

    fn auto_commit(&self) -> BatisResult<bool>;

    fn set_auto_commit(&mut self, auto_commit: bool) -> BatisResult<()>;

    fn commit(&mut self) -> BatisResult<()>;

    fn rollback(&mut self) -> BatisResult<()>;

    fn execute(&mut self, sql: &str) -> BatisResult<()>;

    fn query(&mut self, sql: &str, params: &[Value]) -> BatisResult<Vec<Row>>;

    fn update(&mut self, sql: &str, params: &[Value]) -> BatisResult<u64>;

    fn set_transaction_isolation(&mut self, _level: IsolationLevel) -> BatisResult<()> {
        Ok(())
    }

    fn set_network_timeout(&mut self, _timeout: Duration) -> BatisResult<()> {
        Ok(())
    }
}

/// Opens physical connections for a url.
///
/// `properties` carries the driver properties plus `user`/`password` when
/// credentials are configured.
pub trait Driver: Send + Sync {
    fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> BatisResult<Box<dyn Connection>>;
}

/// Source of connections used by the executor.
pub trait DataSource: Send + Sync {
    /// Connection with the configured credentials.
    fn get_connection(&self) -> BatisResult<Box<dyn Connection>>;

    /// Connection with explicit credentials.
    fn get_connection_as(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> BatisResult<Box<dyn Connection>>;
}

/// 설정 프로퍼티로부터 DataSource를 만드는 팩토리
pub trait DataSourceFactory {
    /// Applies string properties, usually right after construction.
    fn set_properties(&mut self, properties: &HashMap<String, String>) -> BatisResult<()>;

    fn data_source(&self) -> Arc<dyn DataSource>;
}

/// Property prefix routed to driver properties by the factories.
pub const DRIVER_PROPERTY_PREFIX: &str = "driver.";

pub(crate) fn parse_property<T: FromStr>(key: &str, value: &str) -> BatisResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        crate::error::BatisError::Config(format!("invalid value '{value}' for property '{key}'"))
    })
}
