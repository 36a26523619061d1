//! The reconciliation manager.
//!
//! A [`Manager`] owns a client, a [`Scheme`] and a set of controllers. Once
//! started it:
//!
//! 1. Checks that the control plane answers and serves every watched kind.
//! 2. Reconciles every existing object (initial full sync).
//! 3. Polls the change log, reconciling objects whose spec changed.
//! 4. Resyncs everything each resync interval.
//! 5. Runs requeues and retries as they come due.
//!
//! until the shutdown channel flips to `true`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sortie_client::{Client, ClusterConfig, EventType, Resource, WatchEvent};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::{
    Action, Context, Controller, ObjectKey, Outcome, Reconciled, Reconciler, TypedController,
};
use crate::error::ReconcileError;
use crate::hash::SpecHash;
use crate::retry::RetryTracker;
use crate::scheme::Scheme;
use crate::{
    DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL, DEFAULT_RESYNC_INTERVAL, DEFAULT_RETRY_WINDOW,
};

/// Events fetched per change-log request.
const EVENT_PAGE_SIZE: usize = 500;

/// Tuning for a [`Manager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Every object is reconciled at least this often.
    pub resync_interval: Duration,
    /// How often the change log is polled.
    pub poll_interval: Duration,
    /// Failures allowed per object within `retry_window`.
    pub max_retries: u32,
    pub retry_window: Duration,
    /// First retry delay; doubles per consecutive failure.
    pub retry_backoff: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_window: DEFAULT_RETRY_WINDOW,
            retry_backoff: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ManagerOptions {
    pub fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn validate(&self) -> Result<(), ReconcileError> {
        if self.resync_interval.is_zero() {
            return Err(ReconcileError::InvalidOptions(
                "resync interval must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ReconcileError::InvalidOptions(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Last state seen for one object of one controller.
#[derive(Debug, Clone)]
struct Tracked {
    resource_version: String,
    /// Set after a successful reconcile; cleared on failure.
    reconciled: Option<SpecHash>,
}

/// Runs controllers against a control plane.
pub struct Manager {
    client: Client,
    options: ManagerOptions,
    scheme: Scheme,
    controllers: Vec<Arc<dyn Controller>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("endpoint", &self.client.base_url())
            .field("options", &self.options)
            .field(
                "controllers",
                &self.controllers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Manager {
    /// Create a manager for the cluster at `config`. Nothing is contacted yet.
    pub fn new(config: &ClusterConfig, options: ManagerOptions) -> Result<Self, ReconcileError> {
        options.validate()?;
        Ok(Self {
            client: Client::new(config)?,
            options,
            scheme: Scheme::new(),
            controllers: Vec::new(),
        })
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// The schema registry. Kinds must be registered before controllers
    /// for them are added.
    pub fn scheme_mut(&mut self) -> &mut Scheme {
        &mut self.scheme
    }

    /// The manager's own client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Names of the registered controllers, in registration order.
    pub fn controller_names(&self) -> Vec<&str> {
        self.controllers.iter().map(|c| c.name()).collect()
    }

    /// Register a reconciler for kind `K`.
    pub fn add_controller<K, R>(
        &mut self,
        name: impl Into<String>,
        reconciler: R,
    ) -> Result<(), ReconcileError>
    where
        K: Resource,
        R: Reconciler<K>,
    {
        let name = name.into();
        if !self.scheme.is_registered::<K>() {
            return Err(ReconcileError::NotRegistered(K::resource_type().to_string()));
        }
        if self.controllers.iter().any(|c| c.name() == name) {
            return Err(ReconcileError::DuplicateController(name));
        }

        info!(controller = %name, resource = %K::resource_type(), "Registered controller");
        self.controllers
            .push(Arc::new(TypedController::<K, R>::new(name, reconciler)));
        Ok(())
    }

    /// Run until `shutdown` becomes `true`.
    ///
    /// Returns early with an error if the startup check fails.
    pub async fn start(self, shutdown: watch::Receiver<bool>) -> Result<(), ReconcileError> {
        self.startup_check().await?;
        Runner::new(self).run(shutdown).await;
        Ok(())
    }

    /// Run on a background task.
    ///
    /// Use [`ManagerHandle::wait_ready`] to learn whether startup succeeded
    /// and [`ManagerHandle::stop`] to cancel and join.
    pub fn spawn(self) -> ManagerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            if let Err(e) = self.startup_check().await {
                error!(error = %e, "Manager failed to start");
                // Report through wait_ready when someone listens, else through stop.
                return match ready_tx.send(Err(e)) {
                    Ok(()) => Ok(()),
                    Err(Err(e)) => Err(e),
                    Err(Ok(())) => Ok(()),
                };
            }
            let _ = ready_tx.send(Ok(()));
            Runner::new(self).run(shutdown_rx).await;
            Ok(())
        });

        ManagerHandle {
            shutdown_tx,
            ready_rx: Some(ready_rx),
            task,
        }
    }

    #[instrument(skip(self), fields(endpoint = %self.client.base_url()))]
    async fn startup_check(&self) -> Result<(), ReconcileError> {
        self.client.health().await?;

        let served = self.client.served_resources().await?;
        for controller in &self.controllers {
            let rt = controller.resource_type();
            if !served.iter().any(|s| s == rt) {
                return Err(ReconcileError::NotServed(rt.to_string()));
            }
        }

        info!(controllers = self.controllers.len(), "Manager started");
        Ok(())
    }
}

/// A manager running on a background task.
#[derive(Debug)]
pub struct ManagerHandle {
    shutdown_tx: watch::Sender<bool>,
    ready_rx: Option<oneshot::Receiver<Result<(), ReconcileError>>>,
    task: JoinHandle<Result<(), ReconcileError>>,
}

impl ManagerHandle {
    /// Wait for the startup check. Returns its error if it failed.
    ///
    /// Later calls return `Ok(())` immediately.
    pub async fn wait_ready(&mut self) -> Result<(), ReconcileError> {
        let Some(ready_rx) = self.ready_rx.take() else {
            return Ok(());
        };
        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::ExitedBeforeReady),
        }
    }

    /// True once the manager task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the manager task to exit.
    pub async fn stop(self) -> Result<(), ReconcileError> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ReconcileError::Panicked(e.to_string())),
        }
    }
}

/// Loop state of a started manager.
struct Runner {
    client: Client,
    options: ManagerOptions,
    controllers: Vec<Arc<dyn Controller>>,
    cursor: u64,
    tracked: Vec<BTreeMap<ObjectKey, Tracked>>,
    requeues: BTreeMap<(usize, ObjectKey), Instant>,
    retries: RetryTracker,
}

impl Runner {
    fn new(manager: Manager) -> Self {
        let tracked = vec![BTreeMap::new(); manager.controllers.len()];
        Self {
            client: manager.client,
            retries: RetryTracker::new(manager.options.max_retries, manager.options.retry_window),
            options: manager.options,
            controllers: manager.controllers,
            cursor: 0,
            tracked,
            requeues: BTreeMap::new(),
        }
    }

    #[instrument(skip_all)]
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            resync_secs = self.options.resync_interval.as_secs_f64(),
            poll_ms = self.options.poll_interval.as_millis() as u64,
            "Starting reconciliation loop"
        );

        let mut resync = tokio::time::interval(self.options.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(self.options.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                // First tick is immediate: the initial full sync
                _ = resync.tick() => self.full_sync().await,
                _ = poll.tick() => {
                    self.poll_events().await;
                    self.run_due().await;
                }
            }
        }

        info!("Reconciliation loop shutting down");
    }

    fn context(&self, idx: usize) -> Context {
        Context::new(self.client.clone(), self.controllers[idx].name())
    }

    fn retry_key(&self, idx: usize, key: &ObjectKey) -> String {
        format!("{}/{}", self.controllers[idx].name(), key)
    }

    /// Reconcile every object of every controller.
    async fn full_sync(&mut self) {
        let head = match self.client.event_head().await {
            Ok(head) => head,
            Err(e) => {
                warn!(error = %e, "Resync skipped: change log unavailable");
                return;
            }
        };
        self.retries.prune();

        for idx in 0..self.controllers.len() {
            let controller = self.controllers[idx].clone();
            let ctx = self.context(idx);
            match controller.sync_all(&ctx).await {
                Ok(results) => {
                    let seen: Vec<ObjectKey> = results.iter().map(|r| r.key.clone()).collect();
                    self.tracked[idx].retain(|key, _| seen.contains(key));
                    for reconciled in results {
                        self.apply(idx, reconciled);
                    }
                    debug!(
                        controller = %controller.name(),
                        objects = seen.len(),
                        "Resync complete"
                    );
                }
                Err(e) => {
                    warn!(controller = %controller.name(), error = %e, "Resync failed");
                }
            }
        }

        self.cursor = self.cursor.max(head);
    }

    async fn poll_events(&mut self) {
        loop {
            let page = match self.client.events(self.cursor, EVENT_PAGE_SIZE).await {
                Ok(page) => page,
                Err(e) if e.is_gone() => {
                    warn!(cursor = self.cursor, "Change log cursor expired, resyncing");
                    self.cursor = 0;
                    self.full_sync().await;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to poll change log");
                    return;
                }
            };

            let count = page.items.len();
            for event in page.items {
                self.handle_event(event).await;
            }
            self.cursor = page.next_after;

            if count < EVENT_PAGE_SIZE {
                return;
            }
        }
    }

    async fn handle_event(&mut self, event: WatchEvent) {
        let key = ObjectKey::new(event.namespace.clone(), event.name.clone());

        for idx in 0..self.controllers.len() {
            if !self.controllers[idx]
                .resource_type()
                .same_resource(&event.group, &event.plural)
            {
                continue;
            }

            if event.event_type == EventType::Deleted {
                self.forget(idx, &key).await;
                continue;
            }

            let tracked = self.tracked[idx].get(&key);
            if tracked.is_some_and(|t| t.resource_version == event.resource_version) {
                continue;
            }
            let skip_if = tracked.and_then(|t| t.reconciled.clone());
            if skip_if.is_none() && self.retries.is_exhausted(&self.retry_key(idx, &key)) {
                debug!(object = %key, "Retries exhausted, waiting for resync");
                continue;
            }
            self.sync_one(idx, &key, skip_if).await;
        }
    }

    /// Run requeues whose time has come.
    async fn run_due(&mut self) {
        let now = Instant::now();
        let due: Vec<(usize, ObjectKey)> = self
            .requeues
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        for (idx, key) in due {
            self.requeues.remove(&(idx, key.clone()));
            self.sync_one(idx, &key, None).await;
        }
    }

    async fn sync_one(&mut self, idx: usize, key: &ObjectKey, skip_if: Option<SpecHash>) {
        let controller = self.controllers[idx].clone();
        let ctx = self.context(idx);

        match controller.sync_one(key, skip_if.as_ref(), &ctx).await {
            Ok(Outcome::Gone) => self.forget(idx, key).await,
            Ok(Outcome::Unchanged(fingerprint)) => {
                if let Some(tracked) = self.tracked[idx].get_mut(key) {
                    tracked.resource_version = fingerprint.resource_version;
                }
            }
            Ok(Outcome::Reconciled(reconciled)) => self.apply(idx, reconciled),
            Err(e) => {
                warn!(
                    controller = %controller.name(),
                    object = %key,
                    error = %e,
                    "Failed to fetch object"
                );
                self.schedule_retry(idx, key);
            }
        }
    }

    /// Record the result of a reconcile and schedule follow-ups.
    fn apply(&mut self, idx: usize, reconciled: Reconciled) {
        let Reconciled {
            key,
            fingerprint,
            result,
        } = reconciled;
        let name = self.controllers[idx].name().to_string();

        match result {
            Ok(action) => {
                self.retries.clear(&self.retry_key(idx, &key));
                self.tracked[idx].insert(
                    key.clone(),
                    Tracked {
                        resource_version: fingerprint.resource_version,
                        reconciled: Some(fingerprint.spec_hash),
                    },
                );
                match action {
                    Action::Done => {
                        self.requeues.remove(&(idx, key.clone()));
                        debug!(controller = %name, object = %key, "Reconciled");
                    }
                    Action::Requeue(after) => {
                        debug!(
                            controller = %name,
                            object = %key,
                            after_ms = after.as_millis() as u64,
                            "Reconciled, requeued"
                        );
                        self.requeues.insert((idx, key), Instant::now() + after);
                    }
                }
            }
            Err(e) => {
                warn!(controller = %name, object = %key, error = %e, "Reconcile failed");
                self.tracked[idx].insert(
                    key.clone(),
                    Tracked {
                        resource_version: fingerprint.resource_version,
                        reconciled: None,
                    },
                );
                self.schedule_retry(idx, &key);
            }
        }
    }

    fn schedule_retry(&mut self, idx: usize, key: &ObjectKey) {
        let retry_key = self.retry_key(idx, key);
        if self.retries.record_failure(&retry_key) {
            warn!(
                controller = %self.controllers[idx].name(),
                object = %key,
                failures = self.retries.failures(&retry_key),
                "Retries exhausted, waiting for resync"
            );
            self.requeues.remove(&(idx, key.clone()));
            return;
        }
        let delay = self.retries.backoff(&retry_key, self.options.retry_backoff);
        self.requeues
            .insert((idx, key.clone()), Instant::now() + delay);
    }

    async fn forget(&mut self, idx: usize, key: &ObjectKey) {
        let was_tracked = self.tracked[idx].remove(key).is_some();
        self.requeues.remove(&(idx, key.clone()));
        self.retries.clear(&self.retry_key(idx, key));

        if was_tracked {
            let controller = self.controllers[idx].clone();
            if let Err(e) = controller.deleted(key, &self.context(idx)).await {
                warn!(
                    controller = %controller.name(),
                    object = %key,
                    error = %e,
                    "Delete handler failed"
                );
            }
        }
    }
}
