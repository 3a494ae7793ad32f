//! Recursive binder: walks a compiled schema over a selection.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use super::coerce::coerce;
use super::error::BindError;
use super::rule::{CompiledField, Kind, Schema, Shape, Source};
use super::selection::Selection;
use super::value::Value;
use crate::template::{Params, render};

/// Binds `schema` against `selection`.
///
/// The result is `Value::Record` for record schemas, `Value::List` for
/// list rules and a scalar otherwise. A scalar that is empty after
/// clean-up is absent; at the top level that yields an empty record.
///
/// # Errors
///
/// Returns [`BindError::Coerce`] when non-empty text cannot be converted
/// to the field's kind.
pub fn bind(
    selection: &Selection<'_>,
    schema: &Schema,
    params: &Params,
) -> Result<Value, BindError> {
    Ok(bind_field(selection, &schema.root, params)?
        .unwrap_or_else(|| Value::Record(BTreeMap::new())))
}

/// Binds and converts the result into `T` through serde.
///
/// Absent fields are missing keys, so optional data should be `Option<_>`
/// or `#[serde(default)]` in `T`.
///
/// # Errors
///
/// Returns [`BindError::Coerce`] as [`bind`] does, or [`BindError::Typed`]
/// when the bound shape does not fit `T`.
pub fn bind_into<T: DeserializeOwned>(
    selection: &Selection<'_>,
    schema: &Schema,
    params: &Params,
) -> Result<T, BindError> {
    bind(selection, schema, params)?.into_typed()
}

fn bind_field(
    scope: &Selection<'_>,
    field: &CompiledField,
    params: &Params,
) -> Result<Option<Value>, BindError> {
    match &field.shape {
        Shape::Embedded(children) => bind_record(scope, children, params).map(Some),
        Shape::Record(children) => {
            let target = descend(scope, field).first();
            if target.is_empty() {
                return Ok(None);
            }
            bind_record(&target, children, params).map(Some)
        }
        Shape::List(item) => bind_list(scope, field, item, params).map(Some),
        Shape::Scalar(kind) => {
            let raw = match &field.source {
                Source::Template(template) => render(template, params),
                source => read(&descend(scope, field).first(), source),
            };
            match clean(field, &raw) {
                Some(text) => convert(field, *kind, text).map(Some),
                None => Ok(None),
            }
        }
    }
}

fn bind_record(
    scope: &Selection<'_>,
    children: &[CompiledField],
    params: &Params,
) -> Result<Value, BindError> {
    let mut record = BTreeMap::new();

    for child in children.iter().filter(|c| c.is_embedded()) {
        if let Some(Value::Record(merged)) = bind_field(scope, child, params)? {
            record.extend(merged);
        }
    }

    for child in children.iter().filter(|c| !c.is_embedded()) {
        let Some(value) = bind_field(scope, child, params)? else {
            continue;
        };
        match (record.get_mut(&child.name), value) {
            (Some(Value::List(existing)), Value::List(more)) => existing.extend(more),
            (_, value) => {
                record.insert(child.name.clone(), value);
            }
        }
    }

    Ok(Value::Record(record))
}

fn bind_list(
    scope: &Selection<'_>,
    field: &CompiledField,
    item: &Shape,
    params: &Params,
) -> Result<Value, BindError> {
    let mut items = Vec::new();
    match item {
        Shape::Record(children) => {
            for node in descend(scope, field).iter() {
                items.push(bind_record(&node, children, params)?);
            }
        }
        Shape::Scalar(kind) => {
            if let Source::Template(template) = &field.source {
                push_pieces(&mut items, field, *kind, &render(template, params))?;
            } else {
                for node in descend(scope, field).iter() {
                    push_pieces(&mut items, field, *kind, &read(&node, &field.source))?;
                }
            }
        }
        Shape::List(_) | Shape::Embedded(_) => {}
    }
    Ok(Value::List(items))
}

fn push_pieces(
    items: &mut Vec<Value>,
    field: &CompiledField,
    kind: Kind,
    raw: &str,
) -> Result<(), BindError> {
    let Some(text) = clean(field, raw) else {
        return Ok(());
    };
    match &field.split {
        Some(pattern) => {
            for piece in pattern.split(&text).map(str::trim).filter(|p| !p.is_empty()) {
                items.push(convert(field, kind, piece.to_string())?);
            }
        }
        None => items.push(convert(field, kind, text)?),
    }
    Ok(())
}

fn descend<'a>(scope: &Selection<'a>, field: &CompiledField) -> Selection<'a> {
    match &field.selector {
        Some(selector) => scope.find(selector),
        None => scope.clone(),
    }
}

fn read(node: &Selection<'_>, source: &Source) -> String {
    match source {
        Source::Text => node.text(),
        Source::InnerHtml => node.inner_html(),
        Source::Attr(name) => node.attr(name).unwrap_or_default().to_string(),
        Source::Template(template) => template.clone(),
    }
}

/// Trim, apply `find`/`repl`, trim again. `None` means absent.
fn clean(field: &CompiledField, raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let text = match &field.find {
        Some(pattern) => {
            let found = pattern.find(text)?.as_str();
            match &field.repl {
                Some(repl) => pattern.replace_all(found, repl.as_str()).into_owned(),
                None => found.to_string(),
            }
        }
        None => text.to_string(),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn convert(field: &CompiledField, kind: Kind, text: String) -> Result<Value, BindError> {
    coerce(kind, &text, &field.format).map_err(|reason| BindError::Coerce {
        field: field.path.clone(),
        kind,
        value: text,
        reason,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use scraper::Html;
    use serde::Deserialize;

    use super::*;
    use crate::html::FieldRule;

    const PAGE: &str = r#"<html><body>
        <h1> Hi </h1>
        <ul>
            <li class="tag">a</li>
            <li class="tag">b</li>
        </ul>
        <div class="item" data-id="0x10"><span class="name">first</span><span class="price">$1.50</span></div>
        <div class="item" data-id="17"><span class="name">second</span><span class="price">$2</span></div>
        <p class="words">alpha  beta
            gamma</p>
        <p class="date">Published 2024-03-01</p>
        <p class="empty">   </p>
    </body></html>"#;

    fn bind_page(fields: Vec<FieldRule>, params: &Params) -> Result<Value, BindError> {
        let html = Html::parse_document(PAGE);
        let schema = Schema::record(fields).unwrap();
        bind(&Selection::document(&html), &schema, params)
    }

    #[test]
    fn test_bind_title_and_tags() {
        let value = bind_page(
            vec![
                FieldRule::new("title").select("h1"),
                FieldRule::new("tags").select("li.tag").list(),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value.get("title"), Some(&Value::from("Hi")));
        assert_eq!(value.get("tags"), Some(&Value::from(vec!["a", "b"])));
    }

    #[test]
    fn test_zero_matches_list_is_empty() {
        let value = bind_page(
            vec![FieldRule::new("rows").select("table tr").list()],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value.get("rows"), Some(&Value::List(vec![])));
    }

    #[test]
    fn test_empty_text_is_absent() {
        let value = bind_page(
            vec![
                FieldRule::new("blank").select("p.empty").kind(Kind::Int),
                FieldRule::new("missing").select("article"),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value, Value::Record(BTreeMap::new()));
    }

    #[test]
    fn test_list_of_records_with_attrs() {
        let value = bind_page(
            vec![FieldRule::new("items").select("div.item").list().fields([
                FieldRule::new("id").attr("data-id").kind(Kind::Int),
                FieldRule::new("name").select(".name"),
                FieldRule::new("price")
                    .select(".price")
                    .find(r"[\d.]+", "")
                    .kind(Kind::Float),
            ])],
            &Params::new(),
        )
        .unwrap();
        let items = value.get("items").unwrap().as_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("id"), Some(&Value::Int(16)));
        assert_eq!(items[0].get("price"), Some(&Value::Float(1.5)));
        assert_eq!(items[1].get("name"), Some(&Value::from("second")));
        assert_eq!(items[1].get("id"), Some(&Value::Int(17)));
    }

    #[test]
    fn test_find_with_repl_and_time() {
        let value = bind_page(
            vec![
                FieldRule::new("day")
                    .select("p.date")
                    .find(r"(\d{4})-(\d{2})-(\d{2})", "$3/$2/$1"),
                FieldRule::new("published")
                    .select("p.date")
                    .find(r"\d{4}-\d{2}-\d{2}", "")
                    .kind(Kind::Time)
                    .format("%Y-%m-%d"),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value.get("day"), Some(&Value::from("01/03/2024")));
        let Some(Value::Time(t)) = value.get("published") else {
            panic!("expected time");
        };
        assert_eq!(t.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_find_without_match_is_absent() {
        let value = bind_page(
            vec![FieldRule::new("n").select("h1").find(r"\d+", "")],
            &Params::new(),
        )
        .unwrap();
        assert!(value.get("n").is_none());
    }

    #[test]
    fn test_split_whitespace() {
        let value = bind_page(
            vec![FieldRule::new("words").select("p.words").list().split("true")],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(
            value.get("words"),
            Some(&Value::from(vec!["alpha", "beta", "gamma"]))
        );
    }

    #[test]
    fn test_split_custom_drops_empty_pieces() {
        let html = Html::parse_document("<p>1, 2,, 3 ,</p>");
        let schema = Schema::record([FieldRule::new("n")
            .select("p")
            .list()
            .split(",")
            .kind(Kind::Int)])
        .unwrap();
        let value = bind(&Selection::document(&html), &schema, &Params::new()).unwrap();
        assert_eq!(
            value.get("n"),
            Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
        );
    }

    #[test]
    fn test_coerce_failure_names_field() {
        let err = bind_page(
            vec![FieldRule::new("outer").select("div.item").fields([
                FieldRule::new("name").select(".name").kind(Kind::Int),
            ])],
            &Params::new(),
        )
        .unwrap_err();
        match err {
            BindError::Coerce {
                field, kind, value, ..
            } => {
                assert_eq!(field, "outer.name");
                assert_eq!(kind, Kind::Int);
                assert_eq!(value, "first");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_template_value_skips_document() {
        let params = Params::from([("id".to_string(), "42".to_string())]);
        let value = bind_page(
            vec![
                FieldRule::new("url").value("https://example.com/{id}"),
                FieldRule::new("n").value("{id}").kind(Kind::Uint),
                FieldRule::new("none").value("{missing}"),
            ],
            &params,
        )
        .unwrap();
        assert_eq!(value.get("url"), Some(&Value::from("https://example.com/42")));
        assert_eq!(value.get("n"), Some(&Value::Uint(42)));
        assert!(value.get("none").is_none());
    }

    #[test]
    fn test_embedded_fields_merge_into_parent() {
        let value = bind_page(
            vec![
                FieldRule::new("meta")
                    .embed()
                    .fields([FieldRule::new("title").select("h1")]),
                FieldRule::new("first").select(".name"),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value.get("title"), Some(&Value::from("Hi")));
        assert_eq!(value.get("first"), Some(&Value::from("first")));
        assert!(value.get("meta").is_none());
    }

    #[test]
    fn test_same_name_lists_concatenate() {
        let value = bind_page(
            vec![
                FieldRule::new("all").select("li.tag").list(),
                FieldRule::new("all").select("span.name").list(),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(
            value.get("all"),
            Some(&Value::from(vec!["a", "b", "first", "second"]))
        );
    }

    #[test]
    fn test_text_attr_reads_text_content() {
        let value = bind_page(
            vec![
                FieldRule::new("title").select("h1").attr("text"),
                FieldRule::new("tags").select("li.tag").attr("text").list(),
            ],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(value.get("title"), Some(&Value::from("Hi")));
        assert_eq!(value.get("tags"), Some(&Value::from(vec!["a", "b"])));
    }

    #[test]
    fn test_inner_html_source() {
        let value = bind_page(
            vec![FieldRule::new("markup").select("div.item").attr("html")],
            &Params::new(),
        )
        .unwrap();
        assert_eq!(
            value.get("markup"),
            Some(&Value::from(
                r#"<span class="name">first</span><span class="price">$1.50</span>"#
            ))
        );
    }

    #[test]
    fn test_single_rule_schema_binds_list() {
        let html = Html::parse_document(PAGE);
        let schema = Schema::compile(&FieldRule::new("tags").select("li").list()).unwrap();
        let value = bind(&Selection::document(&html), &schema, &Params::new()).unwrap();
        assert_eq!(value, Value::from(vec!["a", "b"]));
    }

    #[test]
    fn test_bind_into_struct() {
        #[derive(Debug, Deserialize)]
        struct Page {
            title: String,
            tags: Vec<String>,
            subtitle: Option<String>,
        }

        let html = Html::parse_document(PAGE);
        let schema = Schema::record([
            FieldRule::new("title").select("h1"),
            FieldRule::new("tags").select("li.tag").list(),
            FieldRule::new("subtitle").select("h2"),
        ])
        .unwrap();
        let page: Page = bind_into(&Selection::document(&html), &schema, &Params::new()).unwrap();
        assert_eq!(page.title, "Hi");
        assert_eq!(page.tags, vec!["a", "b"]);
        assert_eq!(page.subtitle, None);
    }
}
