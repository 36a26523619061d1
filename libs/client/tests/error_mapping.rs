//! Error mapping tests against a mocked control plane.

use serde_json::json;
use sortie_client::{Client, ClientError, ClusterConfig, Namespace};
use sortie_crd::{CustomResourceDefinition, DefinitionVersion, Names, Scope};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn problem(status: u16, code: &str, detail: &str) -> serde_json::Value {
    json!({
        "type": format!("https://sortie.dev/problems/{code}"),
        "title": "error",
        "status": status,
        "detail": detail,
        "code": code,
    })
}

fn client_for(server: &MockServer) -> Client {
    Client::new(&ClusterConfig::new(server.uri())).unwrap()
}

fn widget_definition() -> CustomResourceDefinition {
    CustomResourceDefinition {
        name: "widgets.example.sortie.dev".to_string(),
        group: "example.sortie.dev".to_string(),
        scope: Scope::Namespaced,
        names: Names {
            plural: "widgets".to_string(),
            singular: "widget".to_string(),
            kind: "Widget".to_string(),
            list_kind: "WidgetList".to_string(),
            short_names: vec![],
        },
        versions: vec![DefinitionVersion {
            name: "v1".to_string(),
            served: true,
            storage: true,
            schema: None,
        }],
    }
}

#[tokio::test]
async fn test_not_found_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/core/v1/namespaces/missing"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(problem(404, "not_found", "namespaces missing not found")),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client.get::<Namespace>(None, "missing").await.unwrap_err();
    assert!(err.is_not_found());

    let absent = client.try_get::<Namespace>(None, "missing").await.unwrap();
    assert!(absent.is_none());
}

#[tokio::test]
async fn test_unprocessable_carries_causes() {
    let server = MockServer::start().await;
    let mut body = problem(422, "invalid_object", "object failed schema validation");
    body["details"] = json!([
        { "field": "spec.size", "message": "-1 is less than the minimum of 1" }
    ]);

    Mock::given(method("POST"))
        .and(path("/apis/core/v1/namespaces"))
        .respond_with(ResponseTemplate::new(422).set_body_json(body))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create(&Namespace::new("ns"))
        .await
        .unwrap_err();
    match err {
        ClientError::Invalid { causes, .. } => {
            assert_eq!(causes.len(), 1);
            assert_eq!(causes[0].field, "spec.size");
        }
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_body_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .mount(&server)
        .await;

    let err = client_for(&server).health().await.unwrap_err();
    match err {
        ClientError::Api { status, code, .. } => {
            assert_eq!(status, 503);
            assert_eq!(code, "unknown");
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ensure_definition_tolerates_existing_definition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/definitions"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(problem(409, "already_exists", "definition exists")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/definitions/widgets.example.sortie.dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(widget_definition()))
        .expect(1)
        .mount(&server)
        .await;

    let created = client_for(&server)
        .ensure_definition(&widget_definition())
        .await
        .unwrap();
    assert!(!created);
}

#[tokio::test]
async fn test_ensure_definition_reports_kind_clash() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/definitions"))
        .respond_with(ResponseTemplate::new(409).set_body_json(problem(
            409,
            "already_exists",
            "a resource named widgets or kind Widget in group example.sortie.dev",
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/definitions/widgets.example.sortie.dev"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(problem(404, "not_found", "resource definition not found")),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .ensure_definition(&widget_definition())
        .await
        .unwrap_err();
    assert!(err.is_conflict(), "unexpected: {err:?}");
}

#[tokio::test]
async fn test_namespace_is_sent_as_query_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/apis/core/v1/namespaces"))
        .and(query_param("namespace", "team-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "metadata": { "name": "one" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client_for(&server)
        .list::<Namespace>(Some("team-a"))
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].metadata.name, "one");
}
