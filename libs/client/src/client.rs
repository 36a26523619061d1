//! HTTP client for the control plane API.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use sortie_crd::CustomResourceDefinition;
use tracing::debug;

use crate::config::ClusterConfig;
use crate::error::ClientError;
use crate::meta::{ApiResourceList, EventList, ObjectList, Problem};
use crate::resource::{Resource, ResourceType};

/// Typed client for reading and writing resources.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Create a client from a connection descriptor.
    pub fn new(config: &ClusterConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
        })
    }

    /// Base URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Liveness check against `/healthz`.
    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self.http.get(self.url("/healthz")).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            handle_error(response).await
        }
    }

    /// Resource types currently served, built-ins included.
    pub async fn served_resources(&self) -> Result<Vec<ResourceType>, ClientError> {
        let list: ApiResourceList = self.get_json("/apis").await?;
        Ok(list.resources)
    }

    // Resource definitions

    pub async fn create_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<CustomResourceDefinition, ClientError> {
        self.send_json(self.http.post(self.url("/definitions")), crd)
            .await
    }

    pub async fn get_definition(
        &self,
        name: &str,
    ) -> Result<CustomResourceDefinition, ClientError> {
        self.get_json(&format!("/definitions/{name}")).await
    }

    pub async fn list_definitions(&self) -> Result<Vec<CustomResourceDefinition>, ClientError> {
        let list: ObjectList<CustomResourceDefinition> = self.get_json("/definitions").await?;
        Ok(list.items)
    }

    pub async fn delete_definition(&self, name: &str) -> Result<(), ClientError> {
        self.delete_path(&format!("/definitions/{name}")).await
    }

    /// Install a definition unless one with the same name exists.
    ///
    /// Returns true if the definition was created. A conflict with a
    /// differently named definition for the same group and kind is an error.
    pub async fn ensure_definition(
        &self,
        crd: &CustomResourceDefinition,
    ) -> Result<bool, ClientError> {
        let conflict = match self.create_definition(crd).await {
            Ok(_) => return Ok(true),
            Err(e) if e.is_conflict() => e,
            Err(e) => return Err(e),
        };
        match self.get_definition(&crd.name).await {
            Ok(_) => {
                debug!(name = %crd.name, "Resource definition already installed");
                Ok(false)
            }
            Err(e) if e.is_not_found() => Err(conflict),
            Err(e) => Err(e),
        }
    }

    // Typed objects

    /// Create an object. The namespace comes from its metadata.
    pub async fn create<K: Resource>(&self, object: &K) -> Result<K, ClientError> {
        let rt = K::resource_type();
        let body = with_type_meta(object, &rt)?;
        let path = with_namespace(rt.collection_path(), object.meta().namespace.as_deref());
        self.send_json(self.http.post(self.url(&path)), &body).await
    }

    /// Fetch an object. Fails with [`ClientError::NotFound`] if absent.
    pub async fn get<K: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<K, ClientError> {
        self.get_json(&item_path::<K>(namespace, name)).await
    }

    /// Fetch an object, mapping absence to `None`.
    pub async fn try_get<K: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, ClientError> {
        match self.get::<K>(namespace, name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List objects, optionally restricted to one namespace.
    pub async fn list<K: Resource>(&self, namespace: Option<&str>) -> Result<Vec<K>, ClientError> {
        let path = with_namespace(K::resource_type().collection_path(), namespace);
        let list: ObjectList<K> = self.get_json(&path).await?;
        Ok(list.items)
    }

    /// Replace an object's spec and metadata.
    ///
    /// If `metadata.resourceVersion` is set it must match the stored one.
    pub async fn update<K: Resource>(&self, object: &K) -> Result<K, ClientError> {
        let rt = K::resource_type();
        let body = with_type_meta(object, &rt)?;
        let meta = object.meta();
        let path = item_path::<K>(meta.namespace.as_deref(), &meta.name);
        self.send_json(self.http.put(self.url(&path)), &body).await
    }

    /// Replace only the status subresource.
    pub async fn update_status<K: Resource>(&self, object: &K) -> Result<K, ClientError> {
        let rt = K::resource_type();
        let body = with_type_meta(object, &rt)?;
        let meta = object.meta();
        let path = status_path::<K>(meta.namespace.as_deref(), &meta.name);
        self.send_json(self.http.put(self.url(&path)), &body).await
    }

    pub async fn delete<K: Resource>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClientError> {
        self.delete_path(&item_path::<K>(namespace, name)).await
    }

    /// Read the change log after sequence number `after`.
    pub async fn events(&self, after: u64, limit: usize) -> Result<EventList, ClientError> {
        self.get_json(&format!("/events?after={after}&limit={limit}"))
            .await
    }

    /// Sequence number of the newest event; a cursor for changes made after now.
    pub async fn event_head(&self) -> Result<u64, ClientError> {
        Ok(self.events(u64::MAX, 1).await?.next_after)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        handle_response(response).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        request: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = request.json(body).send().await?;
        handle_response(response).await
    }

    async fn delete_path(&self, path: &str) -> Result<(), ClientError> {
        let response = self.http.delete(self.url(path)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            handle_error(response).await
        }
    }
}

fn with_type_meta<K: Resource>(
    object: &K,
    rt: &ResourceType,
) -> Result<serde_json::Value, ClientError> {
    let mut value = serde_json::to_value(object)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("apiVersion".to_string(), rt.api_version().into());
        map.insert("kind".to_string(), rt.kind.clone().into());
    }
    Ok(value)
}

fn with_namespace(path: String, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{path}?namespace={ns}"),
        None => path,
    }
}

fn item_path<K: Resource>(namespace: Option<&str>, name: &str) -> String {
    let path = format!("{}/{}", K::resource_type().collection_path(), name);
    with_namespace(path, namespace)
}

fn status_path<K: Resource>(namespace: Option<&str>, name: &str) -> String {
    let path = format!("{}/{}/status", K::resource_type().collection_path(), name);
    with_namespace(path, namespace)
}

async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        handle_error(response).await
    }
}

async fn handle_error<T>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let problem: Problem = response.json().await.unwrap_or_else(|_| Problem {
        code: "unknown".to_string(),
        detail: status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string(),
        details: None,
    });

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(problem.detail),
        StatusCode::CONFLICT => ClientError::Conflict(problem.detail),
        StatusCode::GONE => ClientError::Gone(problem.detail),
        StatusCode::UNPROCESSABLE_ENTITY => ClientError::Invalid {
            message: problem.detail,
            causes: problem.details.unwrap_or_default(),
        },
        _ => ClientError::Api {
            status: status.as_u16(),
            code: problem.code,
            message: problem.detail,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Namespace;

    #[test]
    fn test_item_paths() {
        assert_eq!(
            item_path::<Namespace>(None, "default"),
            "/apis/core/v1/namespaces/default"
        );
        assert_eq!(
            status_path::<Namespace>(Some("ns"), "x"),
            "/apis/core/v1/namespaces/x/status?namespace=ns"
        );
    }

    #[test]
    fn test_type_meta_is_injected() {
        let ns = Namespace::new("default");
        let value = with_type_meta(&ns, &Namespace::resource_type()).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["kind"], "Namespace");
        assert_eq!(value["metadata"]["name"], "default");
    }

    #[test]
    fn test_client_rejects_bad_endpoint() {
        assert!(Client::new(&ClusterConfig::new("localhost:80")).is_err());
    }
}
