//! Waiting for the control plane to converge.
//!
//! The orchestrator never times out a test unit. Executors that wait on
//! reconciliation use these helpers to bound the wait themselves.

use std::future::Future;
use std::time::Duration;

use sortie_client::{Client, Resource};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Default delay between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("probe failed: {0:#}")]
    Probe(#[source] anyhow::Error),
}

/// Run `probe` every `interval` until it yields a value or `timeout` passes.
///
/// A probe error ends the wait immediately.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut probe: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await.map_err(WaitError::Probe)? {
            return Ok(value);
        }
        if Instant::now() + interval > deadline {
            return Err(WaitError::Timeout(timeout));
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait until the object exists and satisfies `predicate`.
///
/// A missing object counts as not yet converged.
pub async fn wait_for_object<K, P>(
    client: &Client,
    namespace: Option<&str>,
    name: &str,
    timeout: Duration,
    predicate: P,
) -> Result<K, WaitError>
where
    K: Resource,
    P: Fn(&K) -> bool,
{
    let predicate = &predicate;
    poll_until(DEFAULT_POLL_INTERVAL, timeout, || async move {
        let object = client.try_get::<K>(namespace, name).await?;
        debug!(name, found = object.is_some(), "Polled object");
        Ok(object.filter(|o| predicate(o)))
    })
    .await
}

/// Wait until the object is gone.
pub async fn wait_for_deletion<K: Resource>(
    client: &Client,
    namespace: Option<&str>,
    name: &str,
    timeout: Duration,
) -> Result<(), WaitError> {
    poll_until(DEFAULT_POLL_INTERVAL, timeout, || async move {
        let object = client.try_get::<K>(namespace, name).await?;
        Ok(object.is_none().then_some(()))
    })
    .await
}
