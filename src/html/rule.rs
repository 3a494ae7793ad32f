//! Field rules and their compiled form.
//!
//! # Overview
//!
//! A [`FieldRule`] describes how one output field is extracted: where to
//! look (`select`), what to read (`attr`), how to clean it up (`find`,
//! `repl`, `split`) and what to turn it into (`type`, `format`). Rules nest
//! through `fields` and can be loaded from JSON or YAML.
//!
//! Rules are compiled once into a [`Schema`]: selectors and patterns are
//! parsed up front, so binding never fails on a malformed rule.
//!
//! # Example
//!
//! ```
//! use fetchbind::html::{FieldRule, Schema};
//!
//! let schema = Schema::record([
//!     FieldRule::new("title").select("h1"),
//!     FieldRule::new("tags").select("li.tag").list(),
//! ])
//! .unwrap();
//! # let _ = schema;
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use super::error::BindError;

/// `split` value meaning "split on runs of whitespace".
pub const SPLIT_WHITESPACE: &str = "true";

/// Attribute name that reads an element's text; same as leaving `attr` empty.
pub const ATTR_TEXT: &str = "text";

/// Attribute name that reads an element's inner HTML instead of its text.
pub const ATTR_HTML: &str = "html";

#[allow(clippy::expect_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Target type of a scalar field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    #[default]
    String,
    Int,
    Uint,
    Float,
    Bool,
    Time,
    Duration,
    Bytes,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Time => "time",
            Self::Duration => "duration",
            Self::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// Declarative extraction rule for one field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRule {
    /// Output key.
    pub name: String,
    /// Literal template; when set the document is not consulted.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// CSS selector relative to the current node; empty means the node itself.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub select: String,
    /// Attribute to read; empty or `"text"` reads text, `"html"` reads inner HTML.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attr: String,
    /// chrono format for `time` fields; empty means RFC 3339.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub format: String,
    /// Regex; the first match replaces the extracted text.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub find: String,
    /// Replacement expanded against the `find` match (`$1`, `${name}`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub repl: String,
    /// Scalar target type.
    #[serde(rename = "type")]
    pub kind: Kind,
    /// Collect every match instead of the first.
    pub list: bool,
    /// Split pattern for scalar lists; `"true"` means whitespace.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub split: String,
    /// Merge the child fields into the parent record.
    pub embed: bool,
    /// Child rules; a rule with children produces a record.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRule>,
}

impl FieldRule {
    /// Creates a text rule for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn select(mut self, selector: impl Into<String>) -> Self {
        self.select = selector.into();
        self
    }

    #[must_use]
    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = attr.into();
        self
    }

    #[must_use]
    pub fn value(mut self, template: impl Into<String>) -> Self {
        self.value = template.into();
        self
    }

    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Sets the `find` pattern and its replacement.
    #[must_use]
    pub fn find(mut self, pattern: impl Into<String>, repl: impl Into<String>) -> Self {
        self.find = pattern.into();
        self.repl = repl.into();
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    #[must_use]
    pub fn split(mut self, pattern: impl Into<String>) -> Self {
        self.split = pattern.into();
        self
    }

    #[must_use]
    pub fn embed(mut self) -> Self {
        self.embed = true;
        self
    }

    #[must_use]
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldRule>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }
}

/// What a compiled field reads from its node.
#[derive(Debug)]
pub(crate) enum Source {
    Template(String),
    Text,
    InnerHtml,
    Attr(String),
}

/// Shape of a compiled field's output.
#[derive(Debug)]
pub(crate) enum Shape {
    Scalar(Kind),
    List(Box<Shape>),
    Record(Vec<CompiledField>),
    Embedded(Vec<CompiledField>),
}

#[derive(Debug)]
pub(crate) struct CompiledField {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) selector: Option<Selector>,
    pub(crate) source: Source,
    pub(crate) find: Option<Regex>,
    pub(crate) repl: Option<String>,
    pub(crate) split: Option<Regex>,
    pub(crate) format: String,
    pub(crate) shape: Shape,
}

impl CompiledField {
    pub(crate) fn is_embedded(&self) -> bool {
        matches!(self.shape, Shape::Embedded(_))
    }

    fn compile(rule: &FieldRule, parent: &str) -> Result<Self, BindError> {
        let path = if parent.is_empty() {
            rule.name.clone()
        } else {
            format!("{parent}.{}", rule.name)
        };

        let selector = match rule.select.trim() {
            "" => None,
            css => Some(Selector::parse(css).map_err(|e| BindError::Selector {
                field: path.clone(),
                selector: css.to_string(),
                reason: e.to_string(),
            })?),
        };

        let source = if !rule.value.is_empty() {
            Source::Template(rule.value.clone())
        } else {
            match rule.attr.as_str() {
                "" | ATTR_TEXT => Source::Text,
                ATTR_HTML => Source::InnerHtml,
                attr => Source::Attr(attr.to_string()),
            }
        };

        let find = compile_pattern(&rule.find, &path)?;
        let repl = (find.is_some() && !rule.repl.is_empty()).then(|| rule.repl.clone());
        let split = match rule.split.as_str() {
            "" | "false" => None,
            SPLIT_WHITESPACE => Some(WHITESPACE.clone()),
            pattern => compile_pattern(pattern, &path)?,
        };

        let shape = if rule.embed {
            if rule.fields.is_empty() {
                return Err(BindError::EmptyEmbed { field: path });
            }
            Shape::Embedded(compile_all(&rule.fields, &path)?)
        } else if !rule.fields.is_empty() {
            let record = Shape::Record(compile_all(&rule.fields, &path)?);
            if rule.list {
                Shape::List(Box::new(record))
            } else {
                record
            }
        } else if rule.list {
            Shape::List(Box::new(Shape::Scalar(rule.kind)))
        } else {
            Shape::Scalar(rule.kind)
        };

        Ok(Self {
            name: rule.name.clone(),
            path,
            selector,
            source,
            find,
            repl,
            split,
            format: rule.format.clone(),
            shape,
        })
    }
}

fn compile_pattern(pattern: &str, path: &str) -> Result<Option<Regex>, BindError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|source| BindError::Pattern {
            field: path.to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

fn compile_all(rules: &[FieldRule], parent: &str) -> Result<Vec<CompiledField>, BindError> {
    rules
        .iter()
        .map(|rule| CompiledField::compile(rule, parent))
        .collect()
}

/// A compiled rule tree, ready to bind against documents.
#[derive(Debug)]
pub struct Schema {
    pub(crate) root: CompiledField,
}

impl Schema {
    /// Compiles a single rule. Binding yields that rule's value: a record
    /// for rules with children, a list for list rules, otherwise a scalar.
    ///
    /// # Errors
    ///
    /// Returns [`BindError`] for invalid selectors or patterns, or an
    /// embedded rule without children.
    pub fn compile(rule: &FieldRule) -> Result<Self, BindError> {
        Ok(Self {
            root: CompiledField::compile(rule, "")?,
        })
    }

    /// Compiles a record of top-level fields bound against the root node.
    ///
    /// # Errors
    ///
    /// Same as [`Schema::compile`].
    pub fn record(fields: impl IntoIterator<Item = FieldRule>) -> Result<Self, BindError> {
        Self::compile(&FieldRule::default().fields(fields))
    }
}
