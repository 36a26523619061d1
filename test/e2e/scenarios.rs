//! End-to-end job scenarios.
//!
//! Each test runs a full job: an ephemeral control plane with `crds/`
//! installed, the widget controller in the background and three test units.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p sortie-e2e --test scenarios
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sortie_client::{Client, ClusterConfig};
use sortie_e2e::{
    init_tracing, unique_suffix, widget_config, Gadget, GadgetSpec, Widget, WidgetSpec,
};
use sortie_testing::{
    wait_for_deletion, wait_for_object, JanitorStatus, Job, JobConfigBuilder, JobEvent,
    RecordingReporter, Stage, TestUnit, UnitStatus,
};

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(15);

fn widget(name: impl Into<String>, size: i64) -> Widget {
    Widget::namespaced("default", name, WidgetSpec { size, color: None })
}

async fn wait_ready(client: &Client, name: &str) -> anyhow::Result<Widget> {
    let widget = wait_for_object::<Widget, _>(
        client,
        Some("default"),
        name,
        CONVERGE_TIMEOUT,
        Widget::is_ready,
    )
    .await?;
    Ok(widget)
}

/// What ran, in order, across units and hooks.
#[derive(Clone, Default)]
struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Creates a widget, waits for the controller, then deletes it.
fn widget_unit(trace: &Trace, name: &str, fails: bool, persist: bool) -> TestUnit {
    let run_trace = trace.clone();
    let janitor_trace = trace.clone();
    let unit_name = name.to_string();
    let janitor_name = name.to_string();

    TestUnit::new(name, move |client: Client| {
        let trace = run_trace.clone();
        let name = unit_name.clone();
        async move {
            trace.push(format!("run:{name}"));
            let widget_name = format!("{name}-{}", unique_suffix());
            client.create(&widget(&widget_name, 1)).await?;
            wait_ready(&client, &widget_name).await?;
            if fails {
                anyhow::bail!("{name}: widget converged but the check is set to fail");
            }
            client.delete::<Widget>(Some("default"), &widget_name).await?;
            Ok(())
        }
    })
    .with_description(format!("widget lifecycle ({name})"))
    .janitor(move |client: Client| {
        let trace = janitor_trace.clone();
        let name = janitor_name.clone();
        async move {
            trace.push(format!("janitor:{name}"));
            for widget in client.list::<Widget>(Some("default")).await? {
                client.delete::<Widget>(Some("default"), &widget.metadata.name).await?;
            }
            Ok(())
        }
    })
    .persist(persist)
}

fn traced(
    config: JobConfigBuilder,
    trace: &Trace,
    endpoint: &Arc<Mutex<Option<String>>>,
) -> JobConfigBuilder {
    let builder_trace = trace.clone();
    let cleaner_trace = trace.clone();
    let endpoint = endpoint.clone();

    config
        .builder(move |client: Client| async move {
            builder_trace.push("builder");
            *endpoint.lock().unwrap() = Some(client.base_url().to_string());
            let fixture = GadgetSpec {
                owner: "e2e".into(),
            };
            client
                .create(&Gadget::namespaced("default", "fixture", fixture))
                .await?;
            Ok(())
        })
        .cleaner(move |client: Client| async move {
            cleaner_trace.push("cleaner");
            client.delete::<Gadget>(Some("default"), "fixture").await?;
            Ok(())
        })
}

fn count(events: &[JobEvent], pred: impl Fn(&JobEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

/// Cleaner once, after the last unit event; manager and control plane
/// stopped once each, in that order, after the cleaner.
fn assert_teardown(events: &[JobEvent]) {
    let position = |pred: &dyn Fn(&JobEvent) -> bool| events.iter().position(pred);
    let last_unit = events
        .iter()
        .rposition(|e| {
            matches!(
                e,
                JobEvent::UnitPassed { .. }
                    | JobEvent::UnitFailed { .. }
                    | JobEvent::JanitorRan { .. }
                    | JobEvent::UnitSkipped { .. }
            )
        })
        .unwrap_or(0);
    let cleaner = position(&|e| matches!(e, JobEvent::CleanerRan { error: None }))
        .expect("cleaner ran");
    let manager = position(&|e| matches!(e, JobEvent::ManagerStopped { error: None }))
        .expect("manager stopped");
    let control_plane = position(&|e| matches!(e, JobEvent::ControlPlaneStopped { error: None }))
        .expect("control plane stopped");

    assert!(last_unit < cleaner && cleaner < manager && manager < control_plane);
    assert_eq!(count(events, |e| matches!(e, JobEvent::CleanerRan { .. })), 1);
    assert_eq!(count(events, |e| matches!(e, JobEvent::ManagerStopped { .. })), 1);
    assert_eq!(count(events, |e| matches!(e, JobEvent::ControlPlaneStopped { .. })), 1);
}

async fn assert_stopped(endpoint: &Arc<Mutex<Option<String>>>) {
    let endpoint = endpoint.lock().unwrap().clone().expect("builder recorded the endpoint");
    let client = Client::new(&ClusterConfig::new(endpoint)).unwrap();
    assert!(client.health().await.is_err());
}

#[tokio::test]
async fn scenario_a_all_units_pass() {
    init_tracing();
    let trace = Trace::default();
    let endpoint = Arc::new(Mutex::new(None));
    let reporter = Arc::new(RecordingReporter::new());

    let units = vec![
        widget_unit(&trace, "first", false, false),
        widget_unit(&trace, "second", false, false),
        widget_unit(&trace, "third", false, false),
    ];
    let config = traced(widget_config(), &trace, &endpoint).build();

    let report = Job::new("scenario-a", "all units pass", units, config)
        .unwrap()
        .with_reporter(reporter.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.passed(), 3);
    report.ensure_success().unwrap();
    assert_eq!(
        trace.entries(),
        vec!["builder", "run:first", "run:second", "run:third", "cleaner"]
    );

    let events = reporter.events();
    let passed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::UnitPassed { unit, .. } => Some(unit.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(passed, vec!["first", "second", "third"]);
    assert_eq!(count(&events, |e| matches!(e, JobEvent::JanitorRan { .. })), 0);
    assert_teardown(&events);
    assert_stopped(&endpoint).await;
}

#[tokio::test]
async fn scenario_b_failure_aborts_remaining_units() {
    init_tracing();
    let trace = Trace::default();
    let endpoint = Arc::new(Mutex::new(None));
    let reporter = Arc::new(RecordingReporter::new());

    let units = vec![
        widget_unit(&trace, "first", false, false),
        widget_unit(&trace, "second", true, false),
        widget_unit(&trace, "third", false, false),
    ];
    let config = traced(widget_config(), &trace, &endpoint).build();

    let report = Job::new("scenario-b", "second unit aborts", units, config)
        .unwrap()
        .with_reporter(reporter.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        trace.entries(),
        vec!["builder", "run:first", "run:second", "janitor:second", "cleaner"]
    );
    assert_eq!(report.unit("first").unwrap().status, UnitStatus::Passed);
    assert!(matches!(report.unit("second").unwrap().status, UnitStatus::Failed { .. }));
    assert_eq!(report.unit("second").unwrap().janitor, JanitorStatus::Succeeded);
    assert_eq!(report.unit("third").unwrap().status, UnitStatus::Skipped);

    let events = reporter.events();
    assert_eq!(count(&events, |e| matches!(e, JobEvent::JanitorRan { error: None, .. })), 1);
    assert!(!events.contains(&JobEvent::UnitStarted {
        unit: "third".to_string()
    }));
    assert_teardown(&events);
    assert_stopped(&endpoint).await;
}

#[tokio::test]
async fn scenario_c_persisted_failure_continues() {
    init_tracing();
    let trace = Trace::default();
    let endpoint = Arc::new(Mutex::new(None));
    let reporter = Arc::new(RecordingReporter::new());

    let units = vec![
        widget_unit(&trace, "first", false, false),
        widget_unit(&trace, "second", true, true),
        widget_unit(&trace, "third", false, false),
    ];
    let config = traced(widget_config(), &trace, &endpoint).build();

    let report = Job::new("scenario-c", "second unit persists", units, config)
        .unwrap()
        .with_reporter(reporter.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(
        trace.entries(),
        vec!["builder", "run:first", "run:second", "run:third", "cleaner"]
    );
    assert_eq!((report.passed(), report.failed(), report.skipped()), (2, 1, 0));
    assert_eq!(report.unit("second").unwrap().janitor, JanitorStatus::NotRun);
    assert!(report.ensure_success().is_err());

    let events = reporter.events();
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::UnitFailed { unit, persist: true, .. } if unit == "second"
    )));
    assert_teardown(&events);
    assert_stopped(&endpoint).await;
}

#[tokio::test]
async fn scenario_d_invalid_definition_is_fatal() {
    init_tracing();
    let trace = Trace::default();
    let endpoint = Arc::new(Mutex::new(None));
    let reporter = Arc::new(RecordingReporter::new());

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("broken.yaml"),
        "apiVersion: apiextensions.sortie.dev/v1\n\
         kind: CustomResourceDefinition\n\
         metadata:\n  name: broken.example.sortie.dev\n\
         spec:\n  group: example\n  names:\n    kind: broken\n    plural: Broken\n  versions: []\n",
    )
    .unwrap();

    let units = vec![
        widget_unit(&trace, "first", false, false),
        widget_unit(&trace, "second", false, false),
        widget_unit(&trace, "third", false, false),
    ];
    let config = traced(widget_config(), &trace, &endpoint)
        .resource_definition_path(dir.path())
        .build();

    let err = Job::new("scenario-d", "definition fails validation", units, config)
        .unwrap()
        .with_reporter(reporter.clone())
        .run()
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Stage::Bootstrap);
    let message = err.to_string();
    // Every problem in the document is reported at once.
    let fields = [
        "spec.scope",
        "spec.group",
        "spec.names.kind",
        "spec.names.plural",
        "spec.versions",
    ];
    for field in fields {
        assert!(message.contains(field), "{field} missing from: {message}");
    }

    assert!(trace.entries().is_empty());
    let events = reporter.events();
    assert!(!events.contains(&JobEvent::ManagerStarted));
    assert_eq!(count(&events, |e| matches!(e, JobEvent::UnitStarted { .. })), 0);
}

#[tokio::test]
async fn test_units_and_controller_write_concurrently() {
    init_tracing();

    let units = vec![
        TestUnit::new("parallel-writers", |client: Client| async move {
            let names: Vec<String> = (0..8).map(|i| format!("parallel-{i}")).collect();
            let mut tasks = Vec::new();
            for name in names.clone() {
                let client = client.clone();
                tasks.push(tokio::spawn(async move {
                    client.create(&widget(name, 2)).await
                }));
            }
            for task in tasks {
                task.await??;
            }
            for name in &names {
                wait_ready(&client, name).await?;
            }
            Ok(())
        }),
        TestUnit::new("stale-write-conflicts", |client: Client| async move {
            let created = client.create(&widget("contested", 1)).await?;
            let ready = wait_ready(&client, "contested").await?;
            anyhow::ensure!(ready.metadata.resource_version != created.metadata.resource_version);

            // The controller's status write bumped the version; the stale copy loses.
            let mut stale = created;
            stale.spec.size = 5;
            let err = client.update(&stale).await.unwrap_err();
            anyhow::ensure!(err.is_conflict(), "expected a conflict, got {err}");

            let mut fresh = ready;
            fresh.spec.color = Some("blue".to_string());
            let updated = client.update(&fresh).await?;
            anyhow::ensure!(updated.metadata.generation == 2);
            let observed = |w: &Widget| {
                w.is_ready() && w.status.as_ref().is_some_and(|s| s.observed_generation == 2)
            };
            wait_for_object::<Widget, _>(
                &client,
                Some("default"),
                "contested",
                CONVERGE_TIMEOUT,
                observed,
            )
            .await?;

            client.delete::<Widget>(Some("default"), "contested").await?;
            wait_for_deletion::<Widget>(&client, Some("default"), "contested", CONVERGE_TIMEOUT)
                .await?;
            Ok(())
        }),
        TestUnit::new("schema-rejects-bad-widget", |client: Client| async move {
            let err = client
                .create(&Widget::namespaced(
                    "default",
                    "purple",
                    WidgetSpec {
                        size: 1,
                        color: Some("purple".to_string()),
                    },
                ))
                .await
                .unwrap_err();
            anyhow::ensure!(err.is_invalid(), "expected a validation error, got {err}");
            Ok(())
        }),
    ];

    Job::new("concurrency", "", units, widget_config().build())
        .unwrap()
        .run()
        .await
        .unwrap()
        .ensure_success()
        .unwrap();
}
