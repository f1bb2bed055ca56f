//! Dynamic SQL assembly
//!
//! ```text
//! fragment tree ──apply──▶ DynamicContext ──sql()──▶ "... #{p} ..."
//!                                          ──parse──▶ BoundSql ("... ? ...", [p])
//! ```
//!
//! - [`node`]: fragment nodes (text, if, choose, trim/where/set, foreach, bind)
//! - [`context`]: per-render buffer, bindings and unique counter
//! - [`expression`]: test expressions for conditional nodes
//! - [`sql_source`]: static/dynamic sources producing [`BoundSql`]

pub mod context;
pub mod expression;
pub mod node;
pub mod sql_source;
mod token;

pub use context::DynamicContext;
pub use expression::Expression;
pub use node::{
    BindNode, ChooseNode, ForEachNode, IfNode, MixedNode, SqlNode, TextNode, TrimNode,
};
pub use sql_source::{BoundSql, DynamicSqlSource, ParameterMapping, SqlSource, StaticSqlSource};
