//! Controllers: a reconciler bound to the kind it watches.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sortie_client::{Client, ClientError, Resource, ResourceType};

use crate::hash::Fingerprint;

/// What to do with an object after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Converged; wait for the next change or resync.
    Done,
    /// Reconcile again after the given delay.
    Requeue(Duration),
}

/// Namespace and name of an object. Cluster-scoped objects have no namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(object: &K) -> Self {
        let meta = object.meta();
        Self::new(meta.namespace.clone(), meta.name.clone())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Handed to every reconcile call.
#[derive(Debug, Clone)]
pub struct Context {
    client: Client,
    controller: String,
}

impl Context {
    pub(crate) fn new(client: Client, controller: impl Into<String>) -> Self {
        Self {
            client,
            controller: controller.into(),
        }
    }

    /// The manager's client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Name of the controller being run.
    pub fn controller(&self) -> &str {
        &self.controller
    }
}

/// Drives objects of kind `K` toward their desired state.
///
/// Reconcile must be idempotent: the manager calls it on every observed
/// change, on every resync, and again after failures.
#[async_trait]
pub trait Reconciler<K: Resource>: Send + Sync + 'static {
    async fn reconcile(&self, object: K, ctx: &Context) -> anyhow::Result<Action>;

    /// Called once when an object is observed deleted.
    async fn deleted(&self, _key: &ObjectKey, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<K: Resource, R: Reconciler<K>> Reconciler<K> for Arc<R> {
    async fn reconcile(&self, object: K, ctx: &Context) -> anyhow::Result<Action> {
        (**self).reconcile(object, ctx).await
    }

    async fn deleted(&self, key: &ObjectKey, ctx: &Context) -> anyhow::Result<()> {
        (**self).deleted(key, ctx).await
    }
}

/// Result of reconciling one object.
#[derive(Debug)]
pub(crate) struct Reconciled {
    pub key: ObjectKey,
    pub fingerprint: Fingerprint,
    pub result: anyhow::Result<Action>,
}

/// Result of looking at one object by key.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The object no longer exists.
    Gone,
    /// Its spec hash matches the last successful reconcile.
    Unchanged(Fingerprint),
    Reconciled(Reconciled),
}

/// Type-erased controller the manager drives.
#[async_trait]
pub(crate) trait Controller: Send + Sync {
    fn name(&self) -> &str;

    fn resource_type(&self) -> &ResourceType;

    /// List every object and reconcile each one.
    async fn sync_all(&self, ctx: &Context) -> Result<Vec<Reconciled>, ClientError>;

    /// Fetch one object and reconcile it unless its spec hash equals `skip_if`.
    async fn sync_one(
        &self,
        key: &ObjectKey,
        skip_if: Option<&crate::hash::SpecHash>,
        ctx: &Context,
    ) -> Result<Outcome, ClientError>;

    async fn deleted(&self, key: &ObjectKey, ctx: &Context) -> anyhow::Result<()>;
}

pub(crate) struct TypedController<K, R> {
    name: String,
    resource_type: ResourceType,
    reconciler: R,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Resource, R: Reconciler<K>> TypedController<K, R> {
    pub fn new(name: String, reconciler: R) -> Self {
        Self {
            name,
            resource_type: K::resource_type(),
            reconciler,
            _kind: PhantomData,
        }
    }

    async fn run(&self, object: K, ctx: &Context) -> Result<Reconciled, ClientError> {
        let fingerprint = Fingerprint::of_object(&serde_json::to_value(&object)?);
        let key = ObjectKey::of(&object);
        let result = self.reconciler.reconcile(object, ctx).await;
        Ok(Reconciled {
            key,
            fingerprint,
            result,
        })
    }
}

#[async_trait]
impl<K: Resource, R: Reconciler<K>> Controller for TypedController<K, R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    async fn sync_all(&self, ctx: &Context) -> Result<Vec<Reconciled>, ClientError> {
        let objects: Vec<K> = ctx.client().list(None).await?;
        let mut results = Vec::with_capacity(objects.len());
        for object in objects {
            results.push(self.run(object, ctx).await?);
        }
        Ok(results)
    }

    async fn sync_one(
        &self,
        key: &ObjectKey,
        skip_if: Option<&crate::hash::SpecHash>,
        ctx: &Context,
    ) -> Result<Outcome, ClientError> {
        let Some(object) = ctx
            .client()
            .try_get::<K>(key.namespace.as_deref(), &key.name)
            .await?
        else {
            return Ok(Outcome::Gone);
        };

        let fingerprint = Fingerprint::of_object(&serde_json::to_value(&object)?);
        if skip_if == Some(&fingerprint.spec_hash) {
            return Ok(Outcome::Unchanged(fingerprint));
        }
        Ok(Outcome::Reconciled(self.run(object, ctx).await?))
    }

    async fn deleted(&self, key: &ObjectKey, ctx: &Context) -> anyhow::Result<()> {
        self.reconciler.deleted(key, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        assert_eq!(
            ObjectKey::new(Some("default".to_string()), "w1").to_string(),
            "default/w1"
        );
        assert_eq!(ObjectKey::new(Some(String::new()), "ns").to_string(), "ns");
        assert_eq!(ObjectKey::new(None, "ns").namespace, None);
    }
}
