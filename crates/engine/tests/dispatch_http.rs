use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pivotfeed_api::DataSourceClient;
use pivotfeed_engine::{RemoteSourceClient, SourceCatalog, dispatch};
use pivotfeed_types::{FetchOptions, RequestDescriptor, SourceDefinition};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn post_request(body: Option<Value>) -> RequestDescriptor {
    RequestDescriptor {
        url: "/dtj/api/plan".to_string(),
        method: "POST".to_string(),
        headers: Default::default(),
        body,
    }
}

fn plan_source(id: &str, raw_body: &str) -> SourceDefinition {
    serde_json::from_value(json!({
        "id": id,
        "name": id,
        "url": "/dtj/api/plan",
        "httpMethod": "POST",
        "rawBody": raw_body
    }))
    .unwrap()
}

struct StubCatalog {
    sources: Vec<SourceDefinition>,
}

#[async_trait]
impl SourceCatalog for StubCatalog {
    async fn load_sources(&self) -> anyhow::Result<Vec<SourceDefinition>> {
        Ok(self.sources.clone())
    }
}

#[tokio::test]
async fn fan_out_merges_in_definition_order_despite_latency() {
    let server = MockServer::start().await;

    // The first sub-request answers last; merge order must not care.
    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "method": "x", "params": [{ "k": "p" }] })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{ "id": 1 }]))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "method": "x", "params": [{ "k": "q" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 2 }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(json!({ "method": "x", "params": [{ "k": "p" }, { "k": "q" }] })));

    let merged = dispatch(&client, &base).await.unwrap();

    assert_eq!(
        merged,
        vec![
            json!({ "id": 1, "requestK": "p" }),
            json!({ "id": 2, "requestK": "q" }),
        ]
    );
}

#[tokio::test]
async fn single_body_issues_exactly_one_untouched_request() {
    let server = MockServer::start().await;
    let raw = r#"{"method":"m","params":{"a":1}}"#;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_string(raw))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [{ "id": 7 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(Value::String(raw.to_string())));

    let merged = dispatch(&client, &base).await.unwrap();

    assert_eq!(merged, vec![json!({ "id": 7, "requestA": 1 })]);
}

#[tokio::test]
async fn unparsable_string_body_is_sent_verbatim_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_string("{not json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(Value::String("{not json".to_string())));

    let merged = dispatch(&client, &base).await.unwrap();

    assert_eq!(merged, vec![json!({ "id": 1 })]);
}

#[tokio::test]
async fn fan_out_with_no_usable_entries_falls_back_to_original_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "method": "m", "requests": [null] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(json!({ "method": "m", "requests": [null] })));

    let merged = dispatch(&client, &base).await.unwrap();

    assert_eq!(merged, vec![json!({ "id": 1 })]);
}

#[tokio::test]
async fn one_failing_sub_request_fails_the_whole_dispatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "method": "x", "params": [{ "k": "p" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "method": "x", "params": [{ "k": "q" }] })))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(json!({ "method": "x", "params": [{ "k": "p" }, { "k": "q" }] })));

    assert!(dispatch(&client, &base).await.is_err());
}

#[tokio::test]
async fn tags_never_overwrite_fields_already_on_a_record() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "params": [{ "k": "p" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "k": "real", "requestK": "real-too" }])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .and(body_json(json!({ "params": [{ "k": "q" }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 2 }])))
        .mount(&server)
        .await;

    let client = DataSourceClient::new(server.uri()).unwrap();
    let base = post_request(Some(json!({ "params": [{ "k": "p" }, { "k": "q" }] })));

    let merged = dispatch(&client, &base).await.unwrap();

    assert_eq!(
        merged,
        vec![
            json!({ "k": "real", "requestK": "real-too" }),
            json!({ "id": 2, "requestK": "q" }),
        ]
    );
}

#[tokio::test]
async fn fetch_remote_records_short_circuits_to_the_cache() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;

    let source = plan_source("source-plans", r#"{"method":"data/loadPlan"}"#);
    let client = RemoteSourceClient::new(
        DataSourceClient::new(server.uri()).unwrap(),
        Arc::new(StubCatalog { sources: vec![] }),
    );

    let first = client.fetch_remote_records(&source, &FetchOptions::default()).await.unwrap();
    let second = client.fetch_remote_records(&source, &FetchOptions::default()).await.unwrap();

    assert_eq!(*first, vec![json!({ "id": 1 })]);
    assert!(Arc::ptr_eq(&first, &second), "second fetch should be served from cache");
}

#[tokio::test]
async fn force_refresh_and_clear_cache_re_dispatch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [] })))
        .expect(3)
        .mount(&server)
        .await;

    let source = plan_source("source-plans", r#"{"method":"data/loadPlan"}"#);
    let client = RemoteSourceClient::new(
        DataSourceClient::new(server.uri()).unwrap(),
        Arc::new(StubCatalog { sources: vec![] }),
    );

    client.fetch_remote_records(&source, &FetchOptions::default()).await.unwrap();
    client
        .fetch_remote_records(&source, &FetchOptions { force_refresh: true })
        .await
        .unwrap();
    client.clear_cache();
    client.fetch_remote_records(&source, &FetchOptions::default()).await.unwrap();
}

#[tokio::test]
async fn preload_warms_every_reachable_source_and_skips_failures() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/dtj/api/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [{ "id": 1 }] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/dtj/api/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut broken = plan_source("source-broken", "");
    broken.url = "/dtj/api/broken".to_string();
    let healthy = plan_source("source-plans", r#"{"method":"data/loadPlan"}"#);

    let client = RemoteSourceClient::new(
        DataSourceClient::new(server.uri()).unwrap(),
        Arc::new(StubCatalog {
            sources: vec![healthy.clone(), broken],
        }),
    );

    let warmed = client.preload_remote_sources().await.unwrap();
    assert_eq!(warmed, 1);

    // The healthy source is now served from the warmed cache (expect(1)
    // above would trip on a second hit).
    let records = client.fetch_remote_records(&healthy, &FetchOptions::default()).await.unwrap();
    assert_eq!(*records, vec![json!({ "id": 1 })]);
}
