//! Jobs attached to a control plane that outlives them.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p sortie-e2e --test attach
//! ```

use std::time::Duration;

use sortie_client::{Client, ClusterConfig};
use sortie_control_plane::{server, AppState, Store};
use sortie_e2e::{init_tracing, widget_config, Widget, WidgetSpec};
use sortie_testing::{wait_for_object, Job, JobConfig, Stage, TestUnit};

async fn standalone() -> (server::ServerHandle, ClusterConfig) {
    let handle = server::start("127.0.0.1:0".parse().unwrap(), AppState::new(Store::new()))
        .await
        .unwrap();
    let config = ClusterConfig::new(handle.endpoint()).with_request_timeout(Duration::from_secs(5));
    let client = Client::new(&config).unwrap();
    client
        .create(&sortie_client::Namespace::new("default"))
        .await
        .unwrap();
    (handle, config)
}

fn create_and_wait(name: &'static str) -> TestUnit {
    TestUnit::new(format!("create-{name}"), move |client: Client| async move {
        client
            .create(&Widget::namespaced("default", name, WidgetSpec { size: 4, color: None }))
            .await?;
        let timeout = Duration::from_secs(15);
        wait_for_object::<Widget, _>(&client, Some("default"), name, timeout, Widget::is_ready)
            .await?;
        Ok(())
    })
}

#[tokio::test]
async fn test_jobs_share_an_attached_cluster() {
    init_tracing();
    let (server, cluster) = standalone().await;

    // The first job installs the definitions; the second finds them present.
    for name in ["alpha", "beta"] {
        let config = widget_config().cluster(cluster.clone()).build();
        Job::new(format!("attach-{name}"), "", vec![create_and_wait(name)], config)
            .unwrap()
            .run()
            .await
            .unwrap()
            .ensure_success()
            .unwrap();
    }

    // Both jobs left the cluster and its objects in place.
    let client = Client::new(&cluster).unwrap();
    client.health().await.unwrap();
    let widgets = client.list::<Widget>(Some("default")).await.unwrap();
    assert_eq!(widgets.len(), 2);
    assert!(widgets.iter().all(Widget::is_ready));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_cluster_fails_bootstrap() {
    init_tracing();
    let (server, cluster) = standalone().await;
    server.stop().await.unwrap();

    let config = widget_config().cluster(cluster).build();
    let err = Job::new("unreachable", "", vec![create_and_wait("never")], config)
        .unwrap()
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.stage(), Stage::Bootstrap);
}

#[tokio::test]
async fn test_config_from_env_attaches() {
    init_tracing();
    let (server, cluster) = standalone().await;

    std::env::set_var("SORTIE_CLUSTER_ENDPOINT", &cluster.endpoint);
    std::env::set_var("SORTIE_RESYNC_INTERVAL", "1m30s");
    let config = JobConfig::from_env();
    std::env::remove_var("SORTIE_CLUSTER_ENDPOINT");
    std::env::remove_var("SORTIE_RESYNC_INTERVAL");

    let config = config.unwrap();
    assert_eq!(
        config.cluster.as_ref().map(|c| c.endpoint.as_str()),
        Some(cluster.endpoint.as_str())
    );

    let units = vec![TestUnit::new("health", |client: Client| async move {
        client.health().await?;
        Ok(())
    })];
    let job = Job::new("from-env", "", units, config).unwrap();
    assert_eq!(job.resync_interval(), Duration::from_secs(90));
    job.run().await.unwrap().ensure_success().unwrap();

    server.stop().await.unwrap();
}
