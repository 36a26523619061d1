//! Fixtures for the end-to-end scenarios.
//!
//! [`Widget`] is a namespaced sample resource and [`WidgetController`] the
//! controller that converges it: every widget it sees is marked `Ready` with
//! the generation it observed. Scenario tests install `crds/` and register
//! both through [`widget_config`].

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sortie_client::define_resource;
use sortie_reconcile::{Action, Context, ObjectKey, Reconciler};
use sortie_testing::{JobConfig, JobConfigBuilder};
use tracing::info;

pub const WIDGET_PHASE_READY: &str = "Ready";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    pub phase: String,
    pub observed_generation: i64,
}

define_resource!(Widget {
    group: "example.sortie.dev",
    version: "v1",
    plural: "widgets",
    scope: Namespaced,
    spec: WidgetSpec,
    status: WidgetStatus,
});

impl Widget {
    /// True once the controller has caught up with the current spec.
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| {
            s.phase == WIDGET_PHASE_READY && s.observed_generation == self.metadata.generation
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetSpec {
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GadgetStatus {}

define_resource!(Gadget {
    group: "example.sortie.dev",
    version: "v1",
    plural: "gadgets",
    scope: Namespaced,
    spec: GadgetSpec,
    status: GadgetStatus,
});

/// Marks widgets ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct WidgetController;

#[async_trait]
impl Reconciler<Widget> for WidgetController {
    async fn reconcile(&self, mut widget: Widget, ctx: &Context) -> anyhow::Result<Action> {
        if widget.is_ready() {
            return Ok(Action::Done);
        }

        widget.status = Some(WidgetStatus {
            phase: WIDGET_PHASE_READY.to_string(),
            observed_generation: widget.metadata.generation,
        });
        let updated = ctx.client().update_status(&widget).await?;
        info!(
            widget = %ObjectKey::of(&updated),
            generation = updated.metadata.generation,
            "Widget ready"
        );
        Ok(Action::Done)
    }
}

/// Directory holding the sample resource definitions.
pub fn crd_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("crds")
}

/// Config that installs `crds/`, registers the sample kinds and runs
/// [`WidgetController`]. Hooks for builder and cleaner are left to the caller.
pub fn widget_config() -> JobConfigBuilder {
    JobConfig::builder()
        .resource_definition_path(crd_dir())
        .resync_interval("2s")
        .schema_registration(|scheme| {
            scheme.register::<Widget>()?;
            scheme.register::<Gadget>()?;
            Ok(())
        })
        .controller_registration(|manager| {
            manager.add_controller::<Widget, _>("widget-controller", WidgetController)?;
            Ok(())
        })
}

pub fn unique_suffix() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos()
        .to_string()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sortie_testing=debug,sortie_reconcile=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
