//! Job configuration.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use sortie_client::{Client, ClientError, ClusterConfig};
use sortie_reconcile::{Manager, Scheme};

/// Default resync interval of the reconciliation manager.
pub const DEFAULT_RESYNC_INTERVAL: &str = "30s";

/// Environment variable overriding the resync interval.
pub const ENV_RESYNC_INTERVAL: &str = "SORTIE_RESYNC_INTERVAL";

/// Environment variable listing definition paths, separated by `:`.
pub const ENV_CRD_PATHS: &str = "SORTIE_CRD_PATHS";

pub type SchemaHook = Box<dyn FnOnce(&mut Scheme) -> anyhow::Result<()> + Send>;
pub type ControllerHook = Box<dyn FnOnce(&mut Manager) -> anyhow::Result<()> + Send>;
pub type ClientHook = Box<dyn FnOnce(Client) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// How a job reaches its control plane and what it installs there.
///
/// Every hook defaults to a no-op.
pub struct JobConfig {
    /// Files or directories holding resource definitions to install.
    pub resource_definition_paths: Vec<PathBuf>,
    /// Attach to this cluster instead of starting one.
    pub cluster: Option<ClusterConfig>,
    /// Resync interval of the manager, e.g. `"30s"` or `"1m30s"`.
    pub resync_interval: String,
    /// Registers kinds with the manager's scheme.
    pub schema_registration: SchemaHook,
    /// Adds controllers to the manager.
    pub controller_registration: ControllerHook,
    /// Runs once before the first unit.
    pub builder: ClientHook,
    /// Runs once after the last unit.
    pub cleaner: ClientHook,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            resource_definition_paths: Vec::new(),
            cluster: None,
            resync_interval: DEFAULT_RESYNC_INTERVAL.to_string(),
            schema_registration: Box::new(|_| Ok(())),
            controller_registration: Box::new(|_| Ok(())),
            builder: noop_client_hook(),
            cleaner: noop_client_hook(),
        }
    }
}

fn noop_client_hook() -> ClientHook {
    Box::new(|_| async { Ok(()) }.boxed())
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("resource_definition_paths", &self.resource_definition_paths)
            .field("cluster", &self.cluster)
            .field("resync_interval", &self.resync_interval)
            .finish_non_exhaustive()
    }
}

impl JobConfig {
    pub fn builder() -> JobConfigBuilder {
        JobConfigBuilder::default()
    }

    /// Defaults overridden from the environment.
    ///
    /// Reads `SORTIE_CLUSTER_ENDPOINT`, `SORTIE_CLUSTER_TIMEOUT_SECS`,
    /// `SORTIE_RESYNC_INTERVAL` and `SORTIE_CRD_PATHS`. Hooks stay no-ops.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self {
            cluster: ClusterConfig::from_env()?,
            ..Self::default()
        };

        if let Ok(interval) = std::env::var(ENV_RESYNC_INTERVAL) {
            if !interval.trim().is_empty() {
                config.resync_interval = interval.trim().to_string();
            }
        }

        if let Ok(paths) = std::env::var(ENV_CRD_PATHS) {
            config.resource_definition_paths = paths
                .split(':')
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .collect();
        }

        Ok(config)
    }
}

/// Builder for [`JobConfig`].
#[derive(Debug, Default)]
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl JobConfigBuilder {
    pub fn cluster(mut self, cluster: ClusterConfig) -> Self {
        self.config.cluster = Some(cluster);
        self
    }

    pub fn resource_definition_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.resource_definition_paths.push(path.into());
        self
    }

    pub fn resource_definition_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config
            .resource_definition_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn resync_interval(mut self, interval: impl Into<String>) -> Self {
        self.config.resync_interval = interval.into();
        self
    }

    pub fn schema_registration<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Scheme) -> anyhow::Result<()> + Send + 'static,
    {
        self.config.schema_registration = Box::new(hook);
        self
    }

    pub fn controller_registration<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut Manager) -> anyhow::Result<()> + Send + 'static,
    {
        self.config.controller_registration = Box::new(hook);
        self
    }

    pub fn builder<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Client) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.config.builder = Box::new(move |client| hook(client).boxed());
        self
    }

    pub fn cleaner<F, Fut>(mut self, hook: F) -> Self
    where
        F: FnOnce(Client) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.config.cleaner = Box::new(move |client| hook(client).boxed());
        self
    }

    pub fn build(self) -> JobConfig {
        self.config
    }
}
