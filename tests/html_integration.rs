//! Integration tests for HTML binding and downloads through the full
//! request pipeline.

use std::sync::{Arc, Mutex};

use fetchbind::response::{Charset, ErrorForStatus, Progress};
use fetchbind::{Context, Error, FieldRule, Kind, Params, Request, Schema, Value};
use scraper::Selector;
use serde::Deserialize;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG: &str = r#"<html><head><title>Catalog</title></head><body>
<div class="product" data-sku="A-1">
  <h2>Kettle</h2>
  <span class="price">$ 24.50</span>
  <ul><li>steel</li><li>1.7L</li></ul>
</div>
<div class="product" data-sku="B-2">
  <h2>Toaster</h2>
  <span class="price">$ 31.00</span>
  <ul></ul>
</div>
</body></html>"#;

async fn catalog_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(CATALOG, "text/html; charset=utf-8"))
        .mount(&mock_server)
        .await;
    mock_server
}

fn request(server: &MockServer) -> Request {
    Request::new(Context::background())
        .url(format!("{}/catalog", server.uri()))
        .process_with(ErrorForStatus)
        .process_with(Charset::auto())
}

#[derive(Debug, Deserialize, PartialEq)]
struct Product {
    sku: String,
    name: String,
    price: f64,
    #[serde(default)]
    features: Vec<String>,
    source: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    products: Vec<Product>,
}

// ==================== Binding Tests ====================

#[tokio::test]
async fn test_html_bind_into_struct() {
    let mock_server = catalog_server().await;
    let schema = Schema::record([FieldRule::new("products")
        .select("div.product")
        .list()
        .fields([
            FieldRule::new("sku").attr("data-sku"),
            FieldRule::new("name").select("h2"),
            FieldRule::new("price")
                .select(".price")
                .find(r"\$\s*([\d.]+)", "$1")
                .kind(Kind::Float),
            FieldRule::new("features").select("li").list(),
            FieldRule::new("source").value("{site}"),
        ])])
    .unwrap();
    let params = Params::from([("site".to_string(), "shop".to_string())]);

    let page: Page = request(&mock_server)
        .html_bind("body", &schema, &params)
        .await
        .unwrap();

    assert_eq!(
        page.products,
        vec![
            Product {
                sku: "A-1".into(),
                name: "Kettle".into(),
                price: 24.5,
                features: vec!["steel".into(), "1.7L".into()],
                source: "shop".into(),
            },
            Product {
                sku: "B-2".into(),
                name: "Toaster".into(),
                price: 31.0,
                features: vec![],
                source: "shop".into(),
            },
        ]
    );
}

#[tokio::test]
async fn test_html_bind_rules_from_yaml() {
    let mock_server = catalog_server().await;
    let rule: FieldRule = serde_yaml::from_str(
        r"
fields:
  - name: title
    select: title
  - name: skus
    select: div.product
    attr: data-sku
    list: true
",
    )
    .unwrap();

    let value = request(&mock_server)
        .html_bind_rules("", &rule, &Params::new())
        .await
        .unwrap();

    assert_eq!(value.get("title"), Some(&Value::from("Catalog")));
    assert_eq!(
        value.get("skus"),
        Some(&Value::from(vec!["A-1", "B-2"]))
    );
}

#[tokio::test]
async fn test_coerce_failure_is_bind_error() {
    let mock_server = catalog_server().await;
    let rule = FieldRule::default().fields([FieldRule::new("count").select("h2").kind(Kind::Int)]);
    let err = request(&mock_server)
        .html_bind_rules("", &rule, &Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Bind(_)), "got {err:?}");
}

#[tokio::test]
async fn test_html_query_sees_document() {
    let mock_server = catalog_server().await;
    let selector = Selector::parse("h2").unwrap();
    let mut names = Vec::new();
    request(&mock_server)
        .html_query(|doc| {
            names.extend(doc.find(&selector).iter().map(|node| node.text()));
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(names, vec!["Kettle", "Toaster"]);
}

// ==================== Download Tests ====================

#[tokio::test]
async fn test_download_writes_file_and_refuses_overwrite() {
    let mock_server = catalog_server().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("pages/catalog.html");

    let saved = request(&mock_server)
        .download(&target, false)
        .await
        .unwrap();
    assert_eq!(saved, target);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), CATALOG);

    let err = request(&mock_server)
        .download(&target, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Exists { .. }));

    request(&mock_server).download(&target, true).await.unwrap();
    assert!(!temp_dir.path().join("pages/catalog.html.uxdt").exists());
}

#[tokio::test]
async fn test_download_http_error_leaves_no_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let target = temp_dir.path().join("missing.bin");

    let err = Request::new(Context::background())
        .url(mock_server.uri())
        .process_with(ErrorForStatus)
        .download(&target, false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 404, .. }));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_download_reports_final_progress() {
    let mock_server = catalog_server().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);

    request(&mock_server)
        .process_with(Progress::new(move |update| sink.lock().unwrap().push(update)))
        .download(temp_dir.path().join("catalog.html"), false)
        .await
        .unwrap();

    let updates = updates.lock().unwrap();
    let last = updates.last().expect("at least the final report");
    assert_eq!(last.read, CATALOG.len() as u64);
    assert_eq!(last.total, Some(CATALOG.len() as u64));
}
