//! # batis-core: Persistence Mapping Runtime Core
//!
//! 선언적 SQL 템플릿을 실행 가능한 SQL로 조립하고, 커넥션 풀을 통해 실행하며,
//! 결과를 데코레이터 캐시에 보관하는 런타임 코어입니다.
//!
//! ## 주요 특징
//!
//! - **Dynamic SQL**: if / choose / where / set / trim / foreach 조각 트리
//! - **Cache Decorators**: single-flight(BlockingCache) + LRU + hit ratio 로깅
//! - **Connection Pool**: 동기식 풀, 대기 타임아웃, overdue 회수, ping 검증
//! - **Plugins**: `InterceptorChain`으로 경계 객체 래핑
//!
//! ## 빠른 시작
//!
//! ```rust
//! use batis_core::cache::CacheBuilder;
//! use batis_core::datasource::{DriverSettings, MemoryDriver, PooledDataSource};
//! use batis_core::executor::{CachingExecutor, Executor, MappedStatement, RowBounds, SimpleExecutor};
//! use batis_core::scripting::{DynamicSqlSource, IfNode, MixedNode, TextNode, TrimNode};
//! use batis_core::Value;
//! use std::sync::Arc;
//!
//! # fn main() -> batis_core::BatisResult<()> {
//! // 풀과 실행기
//! let pool = Arc::new(PooledDataSource::new(
//!     Arc::new(MemoryDriver::new()),
//!     DriverSettings::new("mem://demo"),
//! ));
//! let executor = CachingExecutor::new(Arc::new(SimpleExecutor::new(pool)));
//!
//! // SELECT * FROM users WHERE name = ?
//! let root = MixedNode::default()
//!     .with(TextNode::new("SELECT * FROM users"))
//!     .with(TrimNode::where_clause(IfNode::new(
//!         "name != null",
//!         TextNode::new("AND name = #{name}"),
//!     )?));
//! let cache = CacheBuilder::new("users").blocking(true).build()?;
//! let find = MappedStatement::select("users.find", Arc::new(DynamicSqlSource::new(root)))
//!     .with_cache(cache);
//!
//! let rows = executor.query(&find, &Value::map([("name", "kim")]), RowBounds::default())?;
//! assert!(rows.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## 실행 파이프라인
//!
//! ```text
//! fragment tree → DynamicContext → BoundSql ("... ? ...", params)
//!     → CacheKey → cache hit? ── yes → rows
//!                       │ no
//!                       ▼
//!     PooledDataSource → StatementHandler → rows → cache put
//! ```
//!
//! ## 모듈 구조
//!
//! - [`scripting`]: dynamic SQL nodes, context, expressions, SQL sources
//! - [`cache`]: cache trait, backing cache, decorators, builder, keys
//! - [`datasource`]: connection traits, unpooled and pooled data sources
//! - [`executor`]: mapped statements, statement handlers, executors
//! - [`plugin`]: interceptor chain
//! - [`value`]: dynamic parameter/result values

pub mod cache;
pub mod datasource;
pub mod error;
pub mod executor;
pub mod plugin;
pub mod scripting;
pub mod value;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use error::{BatisError, BatisResult};
pub use value::{Row, Value};
