//! In-memory object store.
//!
//! A single `RwLock` serialises every write. Objects are kept as JSON values
//! keyed by resource type and `(namespace, name)`; cluster-scoped objects use
//! an empty namespace. Every change is appended to the [`EventLog`].

mod error;
mod event_log;

pub use error::{StoreError, StoreResult};
pub use event_log::{EventLog, DEFAULT_RETAINED_EVENTS};

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use sortie_client::resource::CORE_GROUP_SEGMENT;
use sortie_client::{
    CustomResourceDefinition, EventList, EventType, Namespace, Resource, ResourceType,
    StatusCause, WatchEvent,
};
use sortie_crd::validation::{self, is_dns_label, is_dns_subdomain};
use sortie_crd::{compile_schema, SchemaValidator};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Resource type as addressed by a request path.
#[derive(Debug, Clone, Deserialize)]
pub struct TypePath {
    pub group: String,
    pub version: String,
    pub plural: String,
}

impl TypePath {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        plural: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
        }
    }

    /// The API group, with the core path segment mapped to the empty group.
    pub fn api_group(&self) -> &str {
        if self.group == CORE_GROUP_SEGMENT {
            ""
        } else {
            &self.group
        }
    }
}

impl std::fmt::Display for TypePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.plural)
    }
}

#[derive(Debug)]
struct InstalledDefinition {
    crd: CustomResourceDefinition,
    validators: BTreeMap<String, SchemaValidator>,
}

struct Served<'a> {
    resource_type: ResourceType,
    validator: Option<&'a SchemaValidator>,
}

type TypeKey = (String, String);
type ObjectKey = (String, String);

#[derive(Debug, Default)]
struct StoreInner {
    definitions: BTreeMap<String, InstalledDefinition>,
    objects: BTreeMap<TypeKey, BTreeMap<ObjectKey, Value>>,
    resource_version: u64,
    events: EventLog,
}

/// The control plane's state.
#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

fn builtin_types() -> Vec<ResourceType> {
    vec![Namespace::resource_type()]
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with a custom change-log capacity.
    pub fn with_retained_events(retained: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                events: EventLog::new(retained),
                ..Default::default()
            }),
        }
    }

    /// Every served resource type, built-ins first.
    pub async fn served_resources(&self) -> Vec<ResourceType> {
        let inner = self.inner.read().await;
        let mut resources = builtin_types();
        for def in inner.definitions.values() {
            for version in def.crd.versions.iter().filter(|v| v.served) {
                resources.push(ResourceType {
                    group: def.crd.group.clone(),
                    version: version.name.clone(),
                    kind: def.crd.names.kind.clone(),
                    plural: def.crd.names.plural.clone(),
                    scope: def.crd.scope,
                });
            }
        }
        resources
    }

    // Resource definitions

    /// Validate and install a definition.
    pub async fn install_definition(
        &self,
        crd: CustomResourceDefinition,
    ) -> StoreResult<CustomResourceDefinition> {
        let errors = validation::validate(&crd);
        if !errors.is_empty() {
            return Err(StoreError::Invalid {
                message: format!("resource definition {:?} is invalid", crd.name),
                causes: errors
                    .into_iter()
                    .map(|e| StatusCause {
                        field: e.field,
                        message: e.message,
                    })
                    .collect(),
            });
        }

        let mut validators = BTreeMap::new();
        for version in &crd.versions {
            if let Some(validator) =
                compile_schema(version).map_err(|e| StoreError::BadRequest(e.to_string()))?
            {
                validators.insert(version.name.clone(), validator);
            }
        }

        let mut inner = self.inner.write().await;
        if inner.definitions.contains_key(&crd.name) {
            return Err(StoreError::AlreadyExists(format!(
                "resource definition {}",
                crd.name
            )));
        }
        let clash = inner.definitions.values().any(|d| {
            d.crd.group == crd.group
                && (d.crd.names.plural == crd.names.plural || d.crd.names.kind == crd.names.kind)
        }) || (crd.group.is_empty() && crd.names.plural == Namespace::PLURAL);
        if clash {
            return Err(StoreError::AlreadyExists(format!(
                "a resource named {} or kind {} in group {}",
                crd.names.plural, crd.names.kind, crd.group
            )));
        }

        info!(
            name = %crd.name,
            group = %crd.group,
            kind = %crd.names.kind,
            "Installed resource definition"
        );
        inner.definitions.insert(
            crd.name.clone(),
            InstalledDefinition {
                crd: crd.clone(),
                validators,
            },
        );
        Ok(crd)
    }

    pub async fn get_definition(&self, name: &str) -> StoreResult<CustomResourceDefinition> {
        let inner = self.inner.read().await;
        inner
            .definitions
            .get(name)
            .map(|d| d.crd.clone())
            .ok_or_else(|| StoreError::NotFound(format!("resource definition {name}")))
    }

    pub async fn list_definitions(&self) -> Vec<CustomResourceDefinition> {
        let inner = self.inner.read().await;
        inner.definitions.values().map(|d| d.crd.clone()).collect()
    }

    /// Remove a definition and every object of its type.
    pub async fn delete_definition(&self, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let def = inner
            .definitions
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(format!("resource definition {name}")))?;

        let key = (def.crd.group.clone(), def.crd.names.plural.clone());
        let objects = inner.objects.remove(&key).unwrap_or_default();
        for ((namespace, object_name), _) in objects {
            let rv = inner.next_version();
            inner.record(EventType::Deleted, &key, &namespace, &object_name, rv);
        }

        info!(name = %name, "Deleted resource definition");
        Ok(())
    }

    // Objects

    /// Create an object.
    ///
    /// `namespace` comes from the query string and may be omitted when the
    /// object's metadata names one.
    pub async fn create(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        mut object: Value,
    ) -> StoreResult<Value> {
        let mut inner = self.inner.write().await;
        let served = inner.resolve(path)?;
        let rt = served.resource_type.clone();

        check_type_meta(&object, &rt)?;
        let name = meta_str(&object, "name").unwrap_or_default().to_string();
        let namespace = scoped_namespace(&rt, namespace, meta_str(&object, "namespace"))?;

        let mut causes = Vec::new();
        if name.is_empty() {
            causes.push(cause("metadata.name", "name is required"));
        } else if !is_dns_subdomain(&name) {
            causes.push(cause(
                "metadata.name",
                format!("{name:?} must be a lower-case RFC 1123 subdomain"),
            ));
        }
        if !causes.is_empty() {
            return Err(invalid(&rt, &name, causes));
        }

        {
            let map = object_map(&mut object)?;
            map.insert("apiVersion".to_string(), rt.api_version().into());
            map.insert("kind".to_string(), rt.kind.clone().into());
            map.remove("status");

            let metadata = metadata_map(map)?;
            if namespace.is_empty() {
                metadata.remove("namespace");
            } else {
                metadata.insert("namespace".to_string(), namespace.clone().into());
            }
            metadata.insert("uid".to_string(), Uuid::new_v4().to_string().into());
            metadata.insert("generation".to_string(), 1.into());
            metadata.insert(
                "creationTimestamp".to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true).into(),
            );
        }

        let schema_errors = served.validate(&object);
        if !schema_errors.is_empty() {
            return Err(invalid(&rt, &name, schema_errors));
        }

        if !namespace.is_empty() && !inner.namespace_exists(&namespace) {
            return Err(StoreError::NotFound(format!("namespace {namespace}")));
        }

        let type_key = (rt.group.clone(), rt.plural.clone());
        let object_key = (namespace.clone(), name.clone());
        if inner
            .objects
            .get(&type_key)
            .is_some_and(|objects| objects.contains_key(&object_key))
        {
            return Err(StoreError::AlreadyExists(describe(&rt, &namespace, &name)));
        }

        let rv = inner.next_version();
        metadata_map(object_map(&mut object)?)?
            .insert("resourceVersion".to_string(), rv.clone().into());
        inner
            .objects
            .entry(type_key.clone())
            .or_default()
            .insert(object_key, object.clone());
        inner.record(EventType::Added, &type_key, &namespace, &name, rv);

        debug!(resource = %rt, namespace = %namespace, name = %name, "Created object");
        Ok(object)
    }

    pub async fn get(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        name: &str,
    ) -> StoreResult<Value> {
        let inner = self.inner.read().await;
        let rt = inner.resolve(path)?.resource_type;
        let namespace = scoped_namespace(&rt, namespace, None)?;
        inner
            .object(&rt, &namespace, name)
            .map(|object| served_as(object.clone(), &rt))
            .ok_or_else(|| StoreError::NotFound(describe(&rt, &namespace, name)))
    }

    /// List objects of a type. Namespaced types list across all namespaces
    /// when `namespace` is `None`.
    pub async fn list(&self, path: &TypePath, namespace: Option<&str>) -> StoreResult<Vec<Value>> {
        let inner = self.inner.read().await;
        let rt = inner.resolve(path)?.resource_type;
        if namespace.is_some() && !rt.scope.is_namespaced() {
            return Err(StoreError::BadRequest(format!("{rt} is cluster scoped")));
        }

        let items = inner
            .objects
            .get(&(rt.group.clone(), rt.plural.clone()))
            .map(|objects| {
                objects
                    .iter()
                    .filter(|((ns, _), _)| namespace.is_none_or(|want| ns == want))
                    .map(|(_, object)| served_as(object.clone(), &rt))
                    .collect()
            })
            .unwrap_or_default();
        Ok(items)
    }

    /// Replace an object's metadata labels and spec.
    ///
    /// The status is preserved. If the body carries a resourceVersion it
    /// must match the stored one.
    pub async fn update(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) -> StoreResult<Value> {
        self.replace(path, namespace, name, object, Subresource::Main)
            .await
    }

    /// Replace an object's status, leaving everything else untouched.
    pub async fn update_status(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        name: &str,
        object: Value,
    ) -> StoreResult<Value> {
        self.replace(path, namespace, name, object, Subresource::Status)
            .await
    }

    async fn replace(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        name: &str,
        mut object: Value,
        subresource: Subresource,
    ) -> StoreResult<Value> {
        let mut inner = self.inner.write().await;
        let served = inner.resolve(path)?;
        let rt = served.resource_type.clone();

        check_type_meta(&object, &rt)?;
        let namespace = scoped_namespace(&rt, namespace, meta_str(&object, "namespace"))?;
        if let Some(body_name) = meta_str(&object, "name").filter(|n| !n.is_empty()) {
            if body_name != name {
                return Err(StoreError::BadRequest(format!(
                    "metadata.name {body_name:?} does not match {name:?}"
                )));
            }
        }

        let current = inner
            .object(&rt, &namespace, name)
            .ok_or_else(|| StoreError::NotFound(describe(&rt, &namespace, name)))?;
        let current_rv = meta_str(current, "resourceVersion").unwrap_or_default();
        if let Some(rv) = meta_str(&object, "resourceVersion").filter(|rv| !rv.is_empty()) {
            if rv != current_rv {
                return Err(StoreError::Conflict(format!(
                    "{} has been modified (resourceVersion {current_rv}, got {rv})",
                    describe(&rt, &namespace, name)
                )));
            }
        }

        let mut updated = current.clone();
        let changed = match subresource {
            Subresource::Main => {
                let spec = object.get_mut("spec").map(Value::take).unwrap_or(Value::Null);
                let labels = object
                    .get_mut("metadata")
                    .and_then(|m| m.get_mut("labels"))
                    .map(Value::take)
                    .unwrap_or(Value::Null);

                let map = object_map(&mut updated)?;
                let spec_changed = map.get("spec").unwrap_or(&Value::Null) != &spec;
                set_or_remove(map, "spec", spec);
                let metadata = metadata_map(map)?;
                let labels_changed = metadata.get("labels").unwrap_or(&Value::Null) != &labels;
                set_or_remove(metadata, "labels", labels);

                if spec_changed {
                    let generation = metadata
                        .get("generation")
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    metadata.insert("generation".to_string(), (generation + 1).into());
                }
                spec_changed || labels_changed
            }
            Subresource::Status => {
                let status = object.get_mut("status").map(Value::take).unwrap_or(Value::Null);
                let map = object_map(&mut updated)?;
                let changed = map.get("status").unwrap_or(&Value::Null) != &status;
                set_or_remove(map, "status", status);
                changed
            }
        };

        if !changed {
            return Ok(served_as(updated, &rt));
        }

        if matches!(subresource, Subresource::Main) {
            let schema_errors = served.validate(&updated);
            if !schema_errors.is_empty() {
                return Err(invalid(&rt, name, schema_errors));
            }
        }

        let rv = inner.next_version();
        metadata_map(object_map(&mut updated)?)?
            .insert("resourceVersion".to_string(), rv.clone().into());

        let type_key = (rt.group.clone(), rt.plural.clone());
        inner
            .objects
            .entry(type_key.clone())
            .or_default()
            .insert((namespace.clone(), name.to_string()), updated.clone());
        inner.record(EventType::Modified, &type_key, &namespace, name, rv);

        debug!(
            resource = %rt,
            namespace = %namespace,
            name = %name,
            ?subresource,
            "Updated object"
        );
        Ok(served_as(updated, &rt))
    }

    /// Delete an object. Deleting a namespace deletes everything in it.
    pub async fn delete(
        &self,
        path: &TypePath,
        namespace: Option<&str>,
        name: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let rt = inner.resolve(path)?.resource_type;
        let namespace = scoped_namespace(&rt, namespace, None)?;

        let type_key = (rt.group.clone(), rt.plural.clone());
        let removed = inner
            .objects
            .get_mut(&type_key)
            .and_then(|objects| objects.remove(&(namespace.clone(), name.to_string())));
        if removed.is_none() {
            return Err(StoreError::NotFound(describe(&rt, &namespace, name)));
        }
        let rv = inner.next_version();
        inner.record(EventType::Deleted, &type_key, &namespace, name, rv);

        if rt.group.is_empty() && rt.plural == Namespace::PLURAL {
            inner.delete_namespace_contents(name);
        }

        debug!(resource = %rt, namespace = %namespace, name = %name, "Deleted object");
        Ok(())
    }

    /// Read the change log.
    pub async fn events(&self, after: u64, limit: usize) -> StoreResult<EventList> {
        let inner = self.inner.read().await;
        inner.events.read_after(after, limit)
    }
}

#[derive(Debug, Clone, Copy)]
enum Subresource {
    Main,
    Status,
}

impl StoreInner {
    fn resolve(&self, path: &TypePath) -> StoreResult<Served<'_>> {
        let group = path.api_group();
        if let Some(resource_type) = builtin_types()
            .into_iter()
            .find(|rt| rt.group == group && rt.plural == path.plural && rt.version == path.version)
        {
            return Ok(Served {
                resource_type,
                validator: None,
            });
        }

        let def = self
            .definitions
            .values()
            .find(|d| d.crd.group == group && d.crd.names.plural == path.plural)
            .filter(|d| d.crd.serves(&path.version))
            .ok_or_else(|| StoreError::NotFound(format!("resource type {path}")))?;

        Ok(Served {
            resource_type: ResourceType {
                group: def.crd.group.clone(),
                version: path.version.clone(),
                kind: def.crd.names.kind.clone(),
                plural: def.crd.names.plural.clone(),
                scope: def.crd.scope,
            },
            validator: def.validators.get(&path.version),
        })
    }

    fn object(&self, rt: &ResourceType, namespace: &str, name: &str) -> Option<&Value> {
        self.objects
            .get(&(rt.group.clone(), rt.plural.clone()))?
            .get(&(namespace.to_string(), name.to_string()))
    }

    fn namespace_exists(&self, namespace: &str) -> bool {
        self.objects
            .get(&(String::new(), Namespace::PLURAL.to_string()))
            .is_some_and(|objects| objects.contains_key(&(String::new(), namespace.to_string())))
    }

    fn next_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn record(
        &mut self,
        event_type: EventType,
        type_key: &TypeKey,
        namespace: &str,
        name: &str,
        rv: String,
    ) {
        self.events.append(WatchEvent {
            seq: 0,
            event_type,
            group: type_key.0.clone(),
            plural: type_key.1.clone(),
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            name: name.to_string(),
            resource_version: rv,
        });
    }

    fn delete_namespace_contents(&mut self, namespace: &str) {
        let mut removed = Vec::new();
        for (type_key, objects) in self.objects.iter_mut() {
            objects.retain(|(ns, name), _| {
                if ns == namespace {
                    removed.push((type_key.clone(), name.clone()));
                    false
                } else {
                    true
                }
            });
        }
        for (type_key, name) in removed {
            let rv = self.next_version();
            self.record(EventType::Deleted, &type_key, namespace, &name, rv);
        }
    }
}

impl Served<'_> {
    fn validate(&self, object: &Value) -> Vec<StatusCause> {
        self.validator
            .map(|v| {
                v.validate(object)
                    .into_iter()
                    .map(|message| cause("body", message))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn cause(field: &str, message: impl Into<String>) -> StatusCause {
    StatusCause {
        field: field.to_string(),
        message: message.into(),
    }
}

fn invalid(rt: &ResourceType, name: &str, causes: Vec<StatusCause>) -> StoreError {
    StoreError::Invalid {
        message: format!("{} {name:?} is invalid", rt.kind),
        causes,
    }
}

fn describe(rt: &ResourceType, namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        format!("{rt} {name}")
    } else {
        format!("{rt} {namespace}/{name}")
    }
}

fn meta_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object.get("metadata")?.get(field)?.as_str()
}

fn object_map(object: &mut Value) -> StoreResult<&mut Map<String, Value>> {
    object
        .as_object_mut()
        .ok_or_else(|| StoreError::BadRequest("request body must be a JSON object".to_string()))
}

fn metadata_map(map: &mut Map<String, Value>) -> StoreResult<&mut Map<String, Value>> {
    map.entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| StoreError::BadRequest("metadata must be a JSON object".to_string()))
}

fn set_or_remove(map: &mut Map<String, Value>, key: &str, value: Value) {
    if value.is_null() {
        map.remove(key);
    } else {
        map.insert(key.to_string(), value);
    }
}

fn check_type_meta(object: &Value, rt: &ResourceType) -> StoreResult<()> {
    if !object.is_object() {
        return Err(StoreError::BadRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    if let Some(api_version) = object.get("apiVersion").and_then(Value::as_str) {
        if api_version != rt.api_version() {
            return Err(StoreError::BadRequest(format!(
                "apiVersion {api_version:?} does not match {:?}",
                rt.api_version()
            )));
        }
    }
    if let Some(kind) = object.get("kind").and_then(Value::as_str) {
        if kind != rt.kind {
            return Err(StoreError::BadRequest(format!(
                "kind {kind:?} does not match {:?}",
                rt.kind
            )));
        }
    }
    Ok(())
}

/// The storage namespace key for an object: empty for cluster-scoped types.
fn scoped_namespace(
    rt: &ResourceType,
    query: Option<&str>,
    body: Option<&str>,
) -> StoreResult<String> {
    let query = query.filter(|ns| !ns.is_empty());
    let body = body.filter(|ns| !ns.is_empty());

    if !rt.scope.is_namespaced() {
        return match query.or(body) {
            Some(_) => Err(StoreError::BadRequest(format!("{rt} is cluster scoped"))),
            None => Ok(String::new()),
        };
    }

    let namespace = match (query, body) {
        (Some(q), Some(b)) if q != b => {
            return Err(StoreError::BadRequest(format!(
                "namespace {b:?} in metadata does not match {q:?}"
            )))
        }
        (Some(ns), _) | (None, Some(ns)) => ns,
        (None, None) => {
            return Err(StoreError::BadRequest(format!(
                "{rt} is namespaced and no namespace was given"
            )))
        }
    };
    if !is_dns_label(namespace) {
        return Err(StoreError::BadRequest(format!(
            "namespace {namespace:?} is not a valid DNS label"
        )));
    }
    Ok(namespace.to_string())
}

/// Report the object under the version it was requested as.
fn served_as(mut object: Value, rt: &ResourceType) -> Value {
    if let Some(map) = object.as_object_mut() {
        map.insert("apiVersion".to_string(), rt.api_version().into());
    }
    object
}
