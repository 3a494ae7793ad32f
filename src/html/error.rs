//! Errors raised while compiling rules or binding a document.

use thiserror::Error;

use super::rule::Kind;

/// Errors from schema compilation and document binding.
#[derive(Debug, Error)]
pub enum BindError {
    /// A field selector is not valid CSS.
    #[error("field {field}: invalid selector {selector:?}: {reason}")]
    Selector {
        /// Field path.
        field: String,
        /// The rejected selector.
        selector: String,
        /// Parser message.
        reason: String,
    },

    /// A `find` or `split` pattern is not a valid regex.
    #[error("field {field}: invalid pattern {pattern:?}: {source}")]
    Pattern {
        /// Field path.
        field: String,
        /// The rejected pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// An embedded field has no child fields to merge.
    #[error("field {field}: embedded rule has no child fields")]
    EmptyEmbed {
        /// Field path.
        field: String,
    },

    /// Extracted text could not be converted to the field's kind.
    #[error("field {field}: cannot convert {value:?} to {kind}: {reason}")]
    Coerce {
        /// Field path.
        field: String,
        /// Target kind.
        kind: Kind,
        /// The extracted text.
        value: String,
        /// Why the conversion failed.
        reason: String,
    },

    /// The bound value does not fit the requested Rust type.
    #[error("bound value does not match {type_name}: {source}")]
    Typed {
        /// Target type name.
        type_name: &'static str,
        /// The underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}
