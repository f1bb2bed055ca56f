//! SQL fragment tree
//!
//! Fragment nodes render themselves into a [`DynamicContext`] and report
//! whether they contributed any content. Trees are immutable once built and
//! may be shared between threads; all per-render state lives in the context.

use crate::error::{BatisError, BatisResult};
use crate::scripting::context::DynamicContext;
use crate::scripting::expression::Expression;
use crate::scripting::token::{property_name, replace_tokens};
use crate::value::Value;
use std::fmt;

/// A node of the dynamic SQL fragment tree.
pub trait SqlNode: Send + Sync + fmt::Debug {
    /// Renders this node into `ctx`.
    ///
    /// Returns `true` when the node contributed content.
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool>;
}

/// Literal SQL text.
#[derive(Debug, Clone)]
pub struct TextNode {
    text: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl SqlNode for TextNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        ctx.append_sql(&self.text);
        Ok(!self.text.trim().is_empty())
    }
}

/// Ordered sequence of child nodes.
#[derive(Debug, Default)]
pub struct MixedNode {
    children: Vec<Box<dyn SqlNode>>,
}

impl MixedNode {
    pub fn new(children: Vec<Box<dyn SqlNode>>) -> Self {
        Self { children }
    }

    /// Builder-style append.
    pub fn with(mut self, child: impl SqlNode + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl SqlNode for MixedNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        let mut contributed = false;
        for child in &self.children {
            contributed |= child.apply(ctx)?;
        }
        Ok(contributed)
    }
}

/// Renders its child only when the test expression holds.
#[derive(Debug)]
pub struct IfNode {
    test: Expression,
    contents: Box<dyn SqlNode>,
}

impl IfNode {
    pub fn new(test: &str, contents: impl SqlNode + 'static) -> BatisResult<Self> {
        Ok(Self {
            test: Expression::parse(test)?,
            contents: Box::new(contents),
        })
    }

    pub fn test(&self) -> &str {
        self.test.source()
    }

    fn holds(&self, ctx: &DynamicContext) -> BatisResult<bool> {
        self.test.evaluate_bool(ctx)
    }
}

impl SqlNode for IfNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        if self.holds(ctx)? {
            self.contents.apply(ctx)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// First matching `when`, else `otherwise`.
#[derive(Debug, Default)]
pub struct ChooseNode {
    whens: Vec<IfNode>,
    otherwise: Option<Box<dyn SqlNode>>,
}

impl ChooseNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, test: &str, contents: impl SqlNode + 'static) -> BatisResult<Self> {
        self.whens.push(IfNode::new(test, contents)?);
        Ok(self)
    }

    pub fn otherwise(mut self, contents: impl SqlNode + 'static) -> Self {
        self.otherwise = Some(Box::new(contents));
        self
    }
}

impl SqlNode for ChooseNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        for when in &self.whens {
            if when.holds(ctx)? {
                when.contents.apply(ctx)?;
                return Ok(true);
            }
        }
        if let Some(otherwise) = &self.otherwise {
            otherwise.apply(ctx)?;
            return Ok(true);
        }
        Ok(false)
    }
}

const WHERE_PREFIX_OVERRIDES: [&str; 8] = [
    "AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t",
];

/// Adds or removes a prefix/suffix around its child's rendered text.
///
/// The child renders into an isolated buffer so only this fragment's own
/// output is inspected. Override tokens are matched case-insensitively,
/// longest first. An empty body renders nothing, not a lone keyword.
#[derive(Debug)]
pub struct TrimNode {
    contents: Box<dyn SqlNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
}

impl TrimNode {
    /// `prefix_overrides`/`suffix_overrides` are `|`-separated token lists,
    /// e.g. `"AND |OR "`.
    pub fn new(
        contents: impl SqlNode + 'static,
        prefix: Option<&str>,
        prefix_overrides: Option<&str>,
        suffix: Option<&str>,
        suffix_overrides: Option<&str>,
    ) -> Self {
        Self::with_tokens(
            Box::new(contents),
            prefix,
            parse_overrides(prefix_overrides),
            suffix,
            parse_overrides(suffix_overrides),
        )
    }

    /// `WHERE` wrapper: strips a leading `AND`/`OR`.
    pub fn where_clause(contents: impl SqlNode + 'static) -> Self {
        Self::with_tokens(
            Box::new(contents),
            Some("WHERE"),
            WHERE_PREFIX_OVERRIDES.iter().map(|s| s.to_string()).collect(),
            None,
            Vec::new(),
        )
    }

    /// `SET` wrapper: strips a trailing comma.
    pub fn set_clause(contents: impl SqlNode + 'static) -> Self {
        Self::with_tokens(
            Box::new(contents),
            Some("SET"),
            Vec::new(),
            None,
            vec![",".to_string()],
        )
    }

    fn with_tokens(
        contents: Box<dyn SqlNode>,
        prefix: Option<&str>,
        mut prefix_overrides: Vec<String>,
        suffix: Option<&str>,
        mut suffix_overrides: Vec<String>,
    ) -> Self {
        for tokens in [&mut prefix_overrides, &mut suffix_overrides] {
            for token in tokens.iter_mut() {
                *token = token.to_ascii_uppercase();
            }
            // stable sort keeps declaration order among equal lengths
            tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));
        }
        Self {
            contents,
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            prefix_overrides,
            suffix_overrides,
        }
    }

    /// Prefix and suffix handling for one rendered body.
    fn apply_all(&self, body: &str) -> String {
        let mut sql = body.trim().to_string();
        if sql.is_empty() {
            return sql;
        }

        let upper = sql.to_ascii_uppercase();
        if let Some(token) = self
            .prefix_overrides
            .iter()
            .find(|t| upper.starts_with(t.as_str()))
        {
            sql = sql[token.len()..].trim_start().to_string();
        }
        if let Some(prefix) = &self.prefix {
            sql = format!("{prefix} {sql}");
        }

        let upper = sql.to_ascii_uppercase();
        let matched = self.suffix_overrides.iter().find_map(|t| {
            if upper.ends_with(t.as_str()) {
                Some(t.len())
            } else if upper.ends_with(t.trim()) && !t.trim().is_empty() {
                Some(t.trim().len())
            } else {
                None
            }
        });
        if let Some(len) = matched {
            sql.truncate(sql.len() - len);
            sql = sql.trim_end().to_string();
        }
        if let Some(suffix) = &self.suffix {
            sql = format!("{sql} {suffix}");
        }
        sql
    }
}

fn parse_overrides(overrides: Option<&str>) -> Vec<String> {
    overrides
        .map(|s| {
            s.split('|')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl SqlNode for TrimNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        ctx.push_fragment();
        let result = self.contents.apply(ctx);
        // always close the isolated buffer, even on error
        let body = ctx.pop_fragment();
        let contributed = result?;
        let rendered = self.apply_all(&body);
        tracing::trace!(target: "scripting", body = %body, rendered = %rendered, "trim applied");
        ctx.append_sql(&rendered);
        Ok(contributed)
    }
}

/// Binds a name to the value of an expression for the rest of the render.
#[derive(Debug)]
pub struct BindNode {
    name: String,
    expression: Expression,
}

impl BindNode {
    pub fn new(name: impl Into<String>, expression: &str) -> BatisResult<Self> {
        Ok(Self {
            name: name.into(),
            expression: Expression::parse(expression)?,
        })
    }
}

impl SqlNode for BindNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        let value = self.expression.evaluate(ctx)?;
        ctx.bind(self.name.clone(), value);
        Ok(false)
    }
}

const ITEM_PREFIX: &str = "__frch_";

/// Iterates over a list or map binding, rendering the child once per element.
///
/// Each element is bound under a collision-free name (`__frch_<item>_<n>`)
/// and `#{item...}` placeholders inside the child are rewritten to it.
#[derive(Debug)]
pub struct ForEachNode {
    collection: String,
    contents: Box<dyn SqlNode>,
    item: Option<String>,
    index: Option<String>,
    open: String,
    close: String,
    separator: String,
    nullable: bool,
}

impl ForEachNode {
    pub fn new(collection: impl Into<String>, contents: impl SqlNode + 'static) -> Self {
        Self {
            collection: collection.into(),
            contents: Box::new(contents),
            item: None,
            index: None,
            open: String::new(),
            close: String::new(),
            separator: String::new(),
            nullable: false,
        }
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = open.into();
        self
    }

    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = close.into();
        self
    }

    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// A null collection renders nothing instead of failing.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    fn entries(&self, ctx: &DynamicContext) -> BatisResult<Vec<(Value, Value)>> {
        match ctx.resolve(&self.collection) {
            Value::List(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect()),
            Value::Map(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (Value::Text(k), v))
                .collect()),
            Value::Null if self.nullable => Ok(Vec::new()),
            Value::Null => Err(BatisError::Binding(format!(
                "collection '{}' evaluated to null",
                self.collection
            ))),
            other => Err(BatisError::Binding(format!(
                "collection '{}' is not iterable: {other}",
                self.collection
            ))),
        }
    }

    fn rewrite(&self, body: &str, n: usize) -> BatisResult<String> {
        replace_tokens(body, "#{", "}", |content| {
            let name = property_name(content);
            for var in [&self.item, &self.index].into_iter().flatten() {
                let Some(rest) = name.strip_prefix(var.as_str()) else {
                    continue;
                };
                if rest.is_empty() || rest.starts_with('.') {
                    let options = &content[content.find(name).unwrap_or(0) + name.len()..];
                    return Ok(format!("#{{{}{rest}{options}}}", itemize(var, n)));
                }
            }
            Ok(format!("#{{{content}}}"))
        })
    }
}

fn itemize(var: &str, n: usize) -> String {
    format!("{ITEM_PREFIX}{var}_{n}")
}

impl SqlNode for ForEachNode {
    fn apply(&self, ctx: &mut DynamicContext) -> BatisResult<bool> {
        let entries = self.entries(ctx)?;
        // a loop counts as applied even when it renders nothing
        if entries.is_empty() {
            return Ok(true);
        }

        let mut parts = Vec::with_capacity(entries.len());
        for (index, item) in entries {
            let n = ctx.next_unique_number();
            if let Some(name) = &self.index {
                ctx.bind(name.clone(), index.clone());
                ctx.bind(itemize(name, n), index);
            }
            if let Some(name) = &self.item {
                ctx.bind(name.clone(), item.clone());
                ctx.bind(itemize(name, n), item);
            }

            ctx.push_fragment();
            let result = self.contents.apply(ctx);
            let body = ctx.pop_fragment();
            result?;

            let body = self.rewrite(&body, n)?;
            if !body.trim().is_empty() {
                parts.push(body);
            }
        }

        for name in [&self.item, &self.index].into_iter().flatten() {
            ctx.unbind(name);
        }

        let rendered = format!("{}{}{}", self.open, parts.join(&self.separator), self.close);
        ctx.append_sql(&rendered);
        Ok(true)
    }
}
