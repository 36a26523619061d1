//! Control plane API integration tests.
//!
//! Each test starts the server on an ephemeral port and talks to it through
//! both raw HTTP and the typed client.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sortie_client::{define_resource, Client, ClusterConfig, Namespace};
use sortie_control_plane::{server, AppState, ServerHandle, Store};

fn unique_suffix() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos()
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetSpec {
    pub size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetStatus {
    pub phase: String,
}

define_resource!(Gadget {
    group: "example.sortie.dev",
    version: "v1",
    plural: "gadgets",
    scope: Namespaced,
    spec: GadgetSpec,
    status: GadgetStatus,
});

const GADGET_CRD: &str = r#"
apiVersion: apiextensions.sortie.dev/v1
kind: CustomResourceDefinition
metadata:
  name: gadgets.example.sortie.dev
spec:
  group: example.sortie.dev
  scope: Namespaced
  names:
    kind: Gadget
    plural: gadgets
  versions:
    - name: v1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          properties:
            spec:
              type: object
              required: [size]
              properties:
                size:
                  type: integer
                  minimum: 1
"#;

struct ApiTestHarness {
    base_url: String,
    http: reqwest::Client,
    client: Client,
    server: ServerHandle,
}

impl ApiTestHarness {
    async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,sortie_control_plane=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let server = server::start("127.0.0.1:0".parse().unwrap(), AppState::new(Store::new()))
            .await
            .unwrap();
        let base_url = server.endpoint();
        let client = Client::new(&ClusterConfig::new(&base_url)).unwrap();

        Self {
            base_url,
            http: reqwest::Client::new(),
            client,
            server,
        }
    }

    async fn with_gadgets() -> Self {
        let harness = Self::new().await;
        let crd = sortie_crd::load(GADGET_CRD.as_bytes()).unwrap();
        harness.client.create_definition(&crd).await.unwrap();
        harness
            .client
            .create(&Namespace::new("default"))
            .await
            .unwrap();
        harness
    }
}

#[tokio::test]
async fn test_health_endpoints() {
    let harness = ApiTestHarness::new().await;

    for path in ["/healthz", "/readyz", "/livez"] {
        let resp = harness
            .http
            .get(format!("{}{}", harness.base_url, path))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success(), "{path} returned {}", resp.status());
    }
    harness.client.health().await.unwrap();

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_discovery_lists_builtins_and_definitions() {
    let harness = ApiTestHarness::with_gadgets().await;

    let served = harness.client.served_resources().await.unwrap();
    assert!(served.iter().any(|rt| rt.kind == "Namespace"));
    assert!(served.iter().any(|rt| rt.kind == "Gadget" && rt.version == "v1"));

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_typed_crud_roundtrip() {
    let harness = ApiTestHarness::with_gadgets().await;
    let name = format!("g-{}", unique_suffix());

    let created = harness
        .client
        .create(&Gadget::namespaced("default", &name, GadgetSpec { size: 2 }))
        .await
        .unwrap();
    assert_eq!(created.metadata.generation, 1);
    assert!(created.metadata.uid.is_some());

    let mut fetched: Gadget = harness.client.get(Some("default"), &name).await.unwrap();
    fetched.spec.size = 5;
    let updated = harness.client.update(&fetched).await.unwrap();
    assert_eq!(updated.metadata.generation, 2);

    let mut with_status = updated.clone();
    with_status.status = Some(GadgetStatus {
        phase: "Ready".to_string(),
    });
    let status_updated = harness.client.update_status(&with_status).await.unwrap();
    assert_eq!(status_updated.status.unwrap().phase, "Ready");

    let listed: Vec<Gadget> = harness.client.list(Some("default")).await.unwrap();
    assert_eq!(listed.len(), 1);

    harness
        .client
        .delete::<Gadget>(Some("default"), &name)
        .await
        .unwrap();
    assert!(harness
        .client
        .try_get::<Gadget>(Some("default"), &name)
        .await
        .unwrap()
        .is_none());

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stale_update_conflicts() {
    let harness = ApiTestHarness::with_gadgets().await;

    let created = harness
        .client
        .create(&Gadget::namespaced("default", "g1", GadgetSpec { size: 1 }))
        .await
        .unwrap();

    let mut first = created.clone();
    first.spec.size = 2;
    harness.client.update(&first).await.unwrap();

    let mut second = created;
    second.spec.size = 3;
    let err = harness.client.update(&second).await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {err}");

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_schema_violation_is_unprocessable() {
    let harness = ApiTestHarness::with_gadgets().await;

    let resp = harness
        .http
        .post(format!(
            "{}/apis/example.sortie.dev/v1/gadgets?namespace=default",
            harness.base_url
        ))
        .json(&json!({ "metadata": { "name": "g1" }, "spec": { "size": 0 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        resp.headers()["content-type"],
        "application/problem+json"
    );
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "invalid");
    assert!(!body["details"].as_array().unwrap().is_empty());

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_definition_is_rejected_with_causes() {
    let harness = ApiTestHarness::new().await;

    let mut crd = sortie_crd::load(GADGET_CRD.as_bytes()).unwrap();
    crd.names.kind = "gadget".to_string();
    crd.versions[0].storage = false;

    let err = harness.client.create_definition(&crd).await.unwrap_err();
    match err {
        sortie_client::ClientError::Invalid { causes, .. } => assert_eq!(causes.len(), 2),
        other => panic!("unexpected error: {other}"),
    }

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_events_are_ordered_and_paged() {
    let harness = ApiTestHarness::with_gadgets().await;

    for i in 0..3 {
        harness
            .client
            .create(&Gadget::namespaced(
                "default",
                format!("g{i}"),
                GadgetSpec { size: 1 },
            ))
            .await
            .unwrap();
    }

    let first = harness.client.events(0, 2).await.unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].name, "default");

    let rest = harness.client.events(first.next_after, 100).await.unwrap();
    let names: Vec<_> = rest.items.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["g1", "g2"]);

    harness.server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_refuses_further_requests() {
    let harness = ApiTestHarness::new().await;
    assert!(!harness.server.is_finished());
    harness.server.stop().await.unwrap();

    assert!(harness.client.health().await.is_err());
}
