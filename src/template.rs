//! `{key}` placeholder substitution for literal field values.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Parameters available to templates.
pub type Params = HashMap<String, String>;

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid regex"));

/// Replaces every `{key}` with `params[key]`, or with nothing when the key
/// is missing. Text outside placeholders, including a `{` that is never
/// closed, is copied verbatim.
///
/// ```
/// use fetchbind::template::{render, Params};
///
/// let params = Params::from([("id".to_string(), "42".to_string())]);
/// assert_eq!(render("item-{id}-{missing}", &params), "item-42-");
/// ```
#[must_use]
pub fn render(template: &str, params: &Params) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            params.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_keys() {
        let p = params(&[("a", "1"), ("b", "two")]);
        assert_eq!(render("{a}-{b}", &p), "1-two");
    }

    #[test]
    fn test_render_missing_key_is_empty() {
        assert_eq!(render("x{nope}y", &Params::new()), "xy");
    }

    #[test]
    fn test_render_unmatched_brace_is_literal() {
        let p = params(&[("a", "1")]);
        assert_eq!(render("{a} and {oops", &p), "1 and {oops");
        assert_eq!(render("plain", &p), "plain");
    }

    #[test]
    fn test_render_empty_placeholder() {
        let p = params(&[("", "blank")]);
        assert_eq!(render("<{}>", &p), "<blank>");
    }
}
