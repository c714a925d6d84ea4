//! Integration tests for the transport layer and the one-shot endpoints.

use std::sync::{Arc, Mutex};

use serde_json::json;
use testops::{
    Client, Config, Error, HeaderEntry, HeaderList, HttpRequestMetrics, MetricsCallbacks, ModelId,
    OutputFormat, RunId, CLIENT_HEADER,
};
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for_server(server: &MockServer) -> Client {
    Client::new(Config {
        base_url: Some(format!("{}/api", server.uri())),
        ..Default::default()
    })
    .expect("client creation should succeed")
}

#[tokio::test]
async fn models_list_in_backend_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/models"))
        .and(header("accept", "application/json"))
        .and(header_exists(CLIENT_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "gpt-x" }, { "id": " " }, { "id": "llama-3" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let models = client.models().list().await.unwrap();
    assert_eq!(models, vec![ModelId::new("gpt-x"), ModelId::new("llama-3")]);
}

#[tokio::test]
async fn health_reports_ok() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    assert!(client.health().await.unwrap());
}

#[tokio::test]
async fn generate_manual_ui_returns_markdown() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate/manual/ui"))
        .and(body_json(json!({ "requirements": "Cart checkout" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "markdown": "## TC-1 Checkout succeeds",
            "run_id": "g1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let out = client.generate().manual_ui("Cart checkout").await.unwrap();
    assert_eq!(out.format, OutputFormat::Markdown);
    assert_eq!(out.text, "## TC-1 Checkout succeeds");
    assert_eq!(out.run_id, Some(RunId::new("g1")));
}

#[tokio::test]
async fn generate_autotests_api_returns_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate/autotests/api"))
        .and(body_json(json!({ "openapi": "openapi: 3.0.0" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": "def test_ping(): ..." })),
        )
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let out = client
        .generate()
        .autotests_api("openapi: 3.0.0")
        .await
        .unwrap();
    assert_eq!(out.format, OutputFormat::Code);
    assert_eq!(out.run_id, None);
}

#[tokio::test]
async fn validate_falls_back_to_raw_json() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/validate"))
        .and(body_json(json!({ "code": "assert True" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issues": ["no allure title"] })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let out = client.generate().validate("assert True").await.unwrap();
    assert_eq!(out.format, OutputFormat::Raw);
    assert!(out.text.contains("no allure title"));
}

#[tokio::test]
async fn empty_generation_input_never_hits_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client.generate().manual_api("   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn custom_client_header_and_default_headers_are_sent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/models"))
        .and(header(CLIENT_HEADER, "dashboard/1.0"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut defaults = HeaderList::default();
    defaults.push(HeaderEntry::new("X-Trace".into(), "abc".into()));
    let client = Client::new(Config {
        base_url: Some(format!("{}/api", server.uri())),
        client_header: Some("dashboard/1.0".into()),
        default_headers: Some(defaults),
        ..Default::default()
    })
    .unwrap();

    assert!(client.models().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn metrics_callback_sees_every_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let seen: Arc<Mutex<Vec<HttpRequestMetrics>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let client = Client::new(Config {
        base_url: Some(format!("{}/api", server.uri())),
        metrics: Some(MetricsCallbacks {
            http_request: Some(Arc::new(move |m: HttpRequestMetrics| {
                sink.lock().unwrap().push(m)
            })),
        }),
        ..Default::default()
    })
    .unwrap();

    let err = client.health().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.to_string(), "503: maintenance");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, Some(503));
    assert_eq!(seen[0].context.method, "GET");
    assert_eq!(seen[0].context.path, "/api/health");
    assert!(seen[0].error.is_some());
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let client = Client::with_base_url(format!("http://127.0.0.1:{port}/api")).unwrap();
    let err = client.models().list().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[test]
fn invalid_base_url_is_a_config_error() {
    let err = Client::with_base_url("not a url").err().unwrap();
    assert!(matches!(err, Error::Config(_)));
}
