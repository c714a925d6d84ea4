use serde_json::json;
use testops::{Client, Config, Error, RunId, RunRef, RunRequest, StepName, StepStatus};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for_server(server: &MockServer) -> Client {
    Client::new(Config {
        base_url: Some(format!("{}/api", server.uri())),
        ..Default::default()
    })
    .expect("client creation should succeed")
}

fn run_json(id: &str, analyst: &str) -> String {
    json!({
        "id": id,
        "steps": {
            "analyst": { "status": analyst, "summary": "parsed requirements" },
            "manual": { "status": "queued" }
        },
        "created_at": "2025-05-01T10:00:00Z",
        "updated_at": "2025-05-01T10:00:02"
    })
    .to_string()
}

#[tokio::test]
async fn create_posts_request_and_returns_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/runs"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "requirements": "Users can reset passwords",
            "openapi": "",
            "model": "gpt-x"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "run_id": "r1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let req = RunRequest::new("Users can reset passwords", "").with_model("gpt-x");
    let id = client.runs().create(&req).await.unwrap();
    assert_eq!(id, RunId::new("r1"));
}

#[tokio::test]
async fn create_failure_carries_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/runs"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "model gpt-z is not configured" })),
        )
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .runs()
        .create(&RunRequest::new("r", "o"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.detail(), Some("model gpt-z is not configured"));
}

#[tokio::test]
async fn create_failure_flattens_validation_list() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/runs"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "detail": [
                { "loc": ["body", "requirements"], "msg": "field required", "type": "missing" },
                { "loc": ["body", "openapi"], "msg": "field required", "type": "missing" }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .runs()
        .create(&RunRequest::default())
        .await
        .unwrap_err();
    assert_eq!(
        err.detail(),
        Some("body.requirements: field required; body.openapi: field required")
    );
}

#[tokio::test]
async fn create_without_run_id_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "accepted" })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client
        .runs()
        .create(&RunRequest::new("r", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn list_normalizes_every_entry_shape() {
    let server = MockServer::start().await;
    let embedded = run_json("r2", "success");

    Mock::given(method("GET"))
        .and(path("/api/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": [
                "r3",
                embedded,
                { "id": "r1", "files": { "run.json": run_json("r1", "running"), "manual.md": "# Cases" } }
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let runs = client.runs().list().await.unwrap();
    let ids: Vec<&str> = runs.iter().map(|r| r.id().as_str()).collect();
    assert_eq!(ids, vec!["r3", "r2", "r1"]);

    assert!(matches!(runs[0], RunRef::Bare(_)));
    let r2 = runs[1].snapshot().unwrap().unwrap();
    assert_eq!(r2.status_of(StepName::Analyst), &StepStatus::Success);
    assert_eq!(runs[2].files().unwrap().len(), 2);
}

#[tokio::test]
async fn list_skips_unrecognized_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "runs": ["r1", null, 7, {}, { "files": {} }, "r2"]
        })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let runs = client.runs().list().await.unwrap();
    let ids: Vec<&str> = runs.iter().map(|r| r.id().as_str()).collect();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[tokio::test]
async fn create_sends_blank_model_when_none_selected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/runs"))
        .and(body_json(json!({ "requirements": "", "openapi": "openapi: 3.0.0", "model": "" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "run_id": "r5" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let id = client
        .runs()
        .create(&RunRequest::new("", "openapi: 3.0.0"))
        .await
        .unwrap();
    assert_eq!(id, RunId::new("r5"));
}

#[tokio::test]
async fn list_without_runs_key_is_empty() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    assert!(client.runs().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn fetch_parses_bundled_run_json() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": "r1",
            "files": { "run.json": run_json("r1", "running") }
        })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let run = client.runs().fetch(&RunId::new("r1")).await.unwrap().unwrap();
    assert_eq!(run.id, RunId::new("r1"));
    assert_eq!(run.status_of(StepName::Analyst), &StepStatus::Running);
    assert_eq!(run.status_of(StepName::Optimize), &StepStatus::Queued);
    assert!(run.created_at.is_some());
    assert!(run.updated_at.is_some());
    assert!(!run.is_terminal());
}

#[tokio::test]
async fn fetch_without_run_json_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": "r1",
            "files": { "error.txt": "Traceback: pipeline crashed\n" }
        })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let id = RunId::new("r1");
    assert!(client.runs().fetch(&id).await.unwrap().is_none());

    let artifacts = client.runs().files(&id).await.unwrap();
    assert_eq!(artifacts.background_error(), Some("Traceback: pipeline crashed"));
}

#[tokio::test]
async fn fetch_with_garbled_run_json_is_a_serialization_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs/r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "files": { "run.json": "{\"id\": " } })),
        )
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    let err = client.runs().fetch(&RunId::new("r1")).await.unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[tokio::test]
async fn fetch_unknown_run_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/runs/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Run not found" })))
        .mount(&server)
        .await;

    let client = client_for_server(&server);
    match client.runs().fetch(&RunId::new("nope")).await.unwrap_err() {
        Error::Api(api) => {
            assert!(api.is_not_found());
            assert_eq!(api.detail.as_deref(), Some("Run not found"));
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn download_url_encodes_the_id() {
    let client = Client::with_base_url("http://localhost:8000/api/").unwrap();
    let url = client.runs().download_url(&RunId::new("a b/c")).unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/runs/a%20b%2Fc/download");
}
