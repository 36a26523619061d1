//! Control-plane handle for a job.
//!
//! Without a cluster override a [`TestEnvironment`] runs an in-process
//! control plane on a loopback port. With one it attaches to that cluster
//! and leaves it running on [`TestEnvironment::stop`].

use std::path::PathBuf;

use sortie_client::{Client, ClientError, ClusterConfig, CustomResourceDefinition, Namespace};
use sortie_control_plane::{server, AppState, ServerHandle, Store};
use sortie_crd::CrdError;
use thiserror::Error;
use tracing::{info, instrument};

/// Namespace created in every ephemeral control plane.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to load resource definitions: {0}")]
    Definitions(#[from] CrdError),

    #[error("failed to start control plane: {0}")]
    Start(#[source] std::io::Error),

    #[error("control plane at {endpoint} is not reachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("failed to install resource definition {name:?}: {source}")]
    Install {
        name: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to stop control plane: {0}")]
    Stop(#[source] std::io::Error),
}

/// A control plane with the job's resource definitions installed.
#[derive(Debug)]
pub struct TestEnvironment {
    definition_paths: Vec<PathBuf>,
    cluster: Option<ClusterConfig>,
    server: Option<ServerHandle>,
}

impl TestEnvironment {
    pub fn new(definition_paths: Vec<PathBuf>, cluster: Option<ClusterConfig>) -> Self {
        Self {
            definition_paths,
            cluster,
            server: None,
        }
    }

    /// True when attached to an existing cluster.
    pub fn is_attached(&self) -> bool {
        self.cluster.is_some()
    }

    /// Start (or attach to) the control plane and install definitions.
    ///
    /// Every definition is loaded and validated before anything starts.
    /// If installation fails after the server started, the server keeps
    /// running until [`TestEnvironment::stop`].
    #[instrument(skip(self), fields(attached = self.is_attached()))]
    pub async fn start(&mut self) -> Result<ClusterConfig, EnvironmentError> {
        let definitions = sortie_crd::load_paths(self.definition_paths.as_slice())?;
        info!(count = definitions.len(), "Loaded resource definitions");

        match self.cluster.clone() {
            Some(config) => {
                let client = Client::new(&config)?;
                client
                    .health()
                    .await
                    .map_err(|source| EnvironmentError::Unreachable {
                        endpoint: config.endpoint.clone(),
                        source,
                    })?;

                for crd in &definitions {
                    let created = client
                        .ensure_definition(crd)
                        .await
                        .map_err(|source| install_error(crd, source))?;
                    info!(name = %crd.name, created, "Resource definition present");
                }
                Ok(config)
            }
            None => {
                let handle = server::start(
                    ([127, 0, 0, 1], 0).into(),
                    AppState::new(Store::new()),
                )
                .await
                .map_err(EnvironmentError::Start)?;
                let config = ClusterConfig::new(handle.endpoint());
                self.server = Some(handle);
                info!(endpoint = %config.endpoint, "Started control plane");

                let client = Client::new(&config)?;
                client.create(&Namespace::new(DEFAULT_NAMESPACE)).await?;
                for crd in &definitions {
                    client
                        .create_definition(crd)
                        .await
                        .map_err(|source| install_error(crd, source))?;
                    info!(name = %crd.name, "Installed resource definition");
                }
                Ok(config)
            }
        }
    }

    /// Stop the in-process control plane, if one is running.
    ///
    /// Calling it again, or before `start`, does nothing.
    pub async fn stop(&mut self) -> Result<(), EnvironmentError> {
        let Some(server) = self.server.take() else {
            return Ok(());
        };
        let addr = server.addr();
        server.stop().await.map_err(EnvironmentError::Stop)?;
        info!(addr = %addr, "Stopped control plane");
        Ok(())
    }
}

fn install_error(crd: &CustomResourceDefinition, source: ClientError) -> EnvironmentError {
    EnvironmentError::Install {
        name: crd.name.clone(),
        source,
    }
}
