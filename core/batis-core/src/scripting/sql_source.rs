//! Statement sources and bound SQL
//!
//! A [`SqlSource`] turns a parameter object into a [`BoundSql`]: the final
//! statement text with `?` placeholders plus the ordered list of properties
//! those placeholders bind to.

use crate::error::BatisResult;
use crate::scripting::context::{DynamicContext, resolve_path};
use crate::scripting::node::SqlNode;
use crate::scripting::token::{property_name, replace_tokens};
use crate::value::Value;
use ahash::AHashMap;
use std::fmt;

/// One `?` placeholder and the property it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
}

/// Executable statement text plus everything needed to bind it.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter: Value,
    additional_parameters: AHashMap<String, Value>,
}

impl BoundSql {
    pub fn new(sql: String, parameter_mappings: Vec<ParameterMapping>, parameter: Value) -> Self {
        Self {
            sql,
            parameter_mappings,
            parameter,
            additional_parameters: AHashMap::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn parameter_object(&self) -> &Value {
        &self.parameter
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional_parameters.insert(name.into(), value);
    }

    pub fn has_additional_parameter(&self, name: &str) -> bool {
        let head = name.split('.').next().unwrap_or(name);
        self.additional_parameters.contains_key(head)
    }

    pub fn additional_parameter(&self, name: &str) -> Option<&Value> {
        self.additional_parameters.get(name)
    }

    /// Resolves every placeholder to its value, in placeholder order.
    ///
    /// Additional parameters (render-time bindings such as foreach items)
    /// win over properties of the parameter object.
    pub fn parameter_values(&self) -> Vec<Value> {
        self.parameter_mappings
            .iter()
            .map(|m| resolve_path(&self.additional_parameters, &self.parameter, &m.property))
            .collect()
    }
}

/// Produces bound SQL for a parameter object.
pub trait SqlSource: Send + Sync + fmt::Debug {
    fn bound_sql(&self, parameter: &Value) -> BatisResult<BoundSql>;
}

/// Replaces `#{prop}` tokens with `?` and records the mappings.
pub fn parse_placeholders(sql: &str) -> BatisResult<(String, Vec<ParameterMapping>)> {
    let mut mappings = Vec::new();
    let text = replace_tokens(sql, "#{", "}", |content| {
        mappings.push(ParameterMapping {
            property: property_name(content).to_string(),
        });
        Ok("?".to_string())
    })?;
    Ok((text, mappings))
}

/// Statement whose text does not depend on the parameter object.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    /// Parses placeholders once, up front.
    pub fn new(sql: &str) -> BatisResult<Self> {
        let (sql, parameter_mappings) = parse_placeholders(sql.trim())?;
        Ok(Self {
            sql,
            parameter_mappings,
        })
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, parameter: &Value) -> BatisResult<BoundSql> {
        Ok(BoundSql::new(
            self.sql.clone(),
            self.parameter_mappings.clone(),
            parameter.clone(),
        ))
    }
}

/// Statement rendered from a fragment tree on every call.
#[derive(Debug)]
pub struct DynamicSqlSource {
    root: Box<dyn SqlNode>,
    database_id: Option<String>,
}

impl DynamicSqlSource {
    pub fn new(root: impl SqlNode + 'static) -> Self {
        Self {
            root: Box::new(root),
            database_id: None,
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, parameter: &Value) -> BatisResult<BoundSql> {
        let mut ctx = DynamicContext::new(parameter.clone())
            .with_database_id(self.database_id.as_deref());
        self.root.apply(&mut ctx)?;
        let (text, bindings) = ctx.into_parts();
        let (sql, mappings) = parse_placeholders(&text)?;

        tracing::debug!(target: "scripting", sql = %sql, params = mappings.len(), "rendered dynamic statement");

        let mut bound = BoundSql::new(sql, mappings, parameter.clone());
        for (name, value) in bindings {
            bound.set_additional_parameter(name, value);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::node::{ForEachNode, IfNode, MixedNode, TextNode, TrimNode};

    #[test]
    fn static_source_maps_placeholders() {
        let source = StaticSqlSource::new("SELECT * FROM users WHERE id = #{id}").unwrap();
        let bound = source.bound_sql(&Value::Int(7)).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE id = ?");
        assert_eq!(bound.parameter_mappings().len(), 1);
        assert_eq!(bound.parameter_values(), vec![Value::Int(7)]);
    }

    #[test]
    fn dynamic_source_binds_foreach_items() {
        let root = MixedNode::default()
            .with(TextNode::new("SELECT * FROM users"))
            .with(TrimNode::where_clause(
                MixedNode::default()
                    .with(IfNode::new("name != null", TextNode::new("AND name = #{name}")).unwrap())
                    .with(
                        IfNode::new(
                            "ids != null",
                            ForEachNode::new("ids", TextNode::new("#{id}"))
                                .item("id")
                                .open("AND id IN (")
                                .separator(",")
                                .close(")"),
                        )
                        .unwrap(),
                    ),
            ));
        let source = DynamicSqlSource::new(root);
        let param = Value::map([
            ("name", Value::from("kim")),
            ("ids", Value::List(vec![Value::Int(1), Value::Int(2)])),
        ]);

        let bound = source.bound_sql(&param).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE name = ? AND id IN (?,?)");
        assert_eq!(
            bound.parameter_values(),
            vec![Value::from("kim"), Value::Int(1), Value::Int(2)]
        );
        assert!(bound.has_additional_parameter("__frch_id_0"));
    }

    #[test]
    fn missing_property_binds_null() {
        let source = StaticSqlSource::new("UPDATE t SET a = #{a}, b = #{b}").unwrap();
        let bound = source.bound_sql(&Value::map([("a", 1)])).unwrap();
        assert_eq!(bound.parameter_values(), vec![Value::Int(1), Value::Null]);
    }
}
