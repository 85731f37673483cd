//! Tests for concurrent launch of layouts.

#![allow(clippy::expect_used)]

use std::time::Duration;

use skyforge_cli::application::services::launch::{LaunchContext, launch_all};
use skyforge_cli::application::services::session::ConnectOptions;
use skyforge_cli::domain::{EnvBindings, LayoutError, ProvisionError, RetryPolicy};

use crate::mocks::{
    MemoryStore, MockConnector, MockFactory, MockProvider, RecordingReporter, aws_env, layout,
};

struct Fixture {
    factory: MockFactory,
    store: MemoryStore,
    connector: MockConnector,
    reporter: RecordingReporter,
    env: EnvBindings,
}

impl Fixture {
    fn new(connector: MockConnector) -> Self {
        Self {
            factory: MockFactory::default(),
            store: MemoryStore::default(),
            connector,
            reporter: RecordingReporter::default(),
            env: aws_env(),
        }
    }

    fn ctx(
        &self,
        deploy: bool,
    ) -> LaunchContext<'_, MockFactory, MemoryStore, MockConnector, RecordingReporter> {
        LaunchContext {
            factory: &self.factory,
            store: &self.store,
            connector: &self.connector,
            connect: ConnectOptions {
                retry: RetryPolicy::fixed(15, Duration::from_secs(5)),
                timeout: Duration::from_secs(30),
            },
            env: &self.env,
            reporter: &self.reporter,
            deploy,
        }
    }

    fn provider_nodes(&self) -> usize {
        self.factory.provider.node_ids().len()
    }
}

#[tokio::test]
async fn scaled_layout_launches_one_session_per_replica() {
    let fx = Fixture::new(MockConnector::default());
    let mut web = layout("web");
    web.scale = 3;

    let results = launch_all(&[web], &fx.ctx(true)).await;

    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["web-1", "web-2", "web-3"]);
    assert!(results.iter().all(|(_, r)| r.as_ref().is_ok_and(|rep| rep.succeeded())));
    assert_eq!(fx.store.keys(), vec!["web-1", "web-2", "web-3"]);
    assert_eq!(fx.factory.connects(), 3, "one adapter per replica");
    assert_eq!(fx.provider_nodes(), 3);
    assert_eq!(fx.connector.executed().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn replica_creations_overlap() {
    let mut fx = Fixture::new(MockConnector::default());
    fx.factory = MockFactory::with_provider(MockProvider {
        create_delay: Duration::from_secs(300),
        ..MockProvider::default()
    });
    let mut web = layout("web");
    web.scale = 2;
    let started = tokio::time::Instant::now();

    let results = launch_all(&[web], &fx.ctx(false)).await;

    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(started.elapsed(), Duration::from_secs(300));
    assert_eq!(fx.provider_nodes(), 2);
}

#[tokio::test]
async fn failing_layout_does_not_abort_siblings() {
    let fx = Fixture::new(MockConnector::default());
    let mut broken = layout("broken");
    broken.runs_on = "plan9".into();

    let results = launch_all(&[layout("web1"), broken, layout("web2")], &fx.ctx(true)).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    let err = results[1].1.as_ref().expect_err("expected Err");
    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::ImageNotFound { .. })
    ));
    assert!(results[2].1.is_ok());
    assert_eq!(fx.store.keys(), vec!["web1", "web2"]);
}

#[tokio::test]
async fn no_deploy_skips_shell_connection() {
    let fx = Fixture::new(MockConnector::default());

    let results = launch_all(&[layout("web1")], &fx.ctx(false)).await;

    let report = results[0].1.as_ref().expect("launch");
    assert!(report.deployment.is_none());
    assert!(report.succeeded());
    assert_eq!(fx.connector.attempts(), 0);
    assert_eq!(fx.store.keys(), vec!["web1"]);
}

#[tokio::test]
async fn failing_step_marks_replica_unsuccessful() {
    let fx = Fixture::new(MockConnector::with_exit_codes(&[3]));

    let results = launch_all(&[layout("web1")], &fx.ctx(true)).await;

    let report = results[0].1.as_ref().expect("launch");
    let deployment = report.deployment.as_ref().expect("deployment");
    assert_eq!(deployment.outcomes[0].exit_status, 3);
    assert!(!report.succeeded());
}

#[tokio::test]
async fn layout_without_credential_is_rejected_before_provider_call() {
    let fx = Fixture::new(MockConnector::default());
    let mut l = layout("web1");
    l.ssh = None;

    let results = launch_all(&[l], &fx.ctx(true)).await;

    let err = results[0].1.as_ref().expect_err("expected Err");
    assert!(matches!(
        err.downcast_ref::<LayoutError>(),
        Some(LayoutError::MissingCredential(name)) if name == "web1"
    ));
    assert_eq!(fx.factory.connects(), 0);
}
