//! Tests for `NodeLifecycleManager::create` and the create → deploy path.

#![allow(clippy::expect_used)]

use std::time::Duration;

use skyforge_cli::application::ports::{ProviderFactory, SessionStore};
use skyforge_cli::application::services::provision::{NodeLifecycleManager, node_name};
use skyforge_cli::application::services::session::{ConnectOptions, DeploymentSession};
use skyforge_cli::domain::{ProviderKind, ProvisionError, RetryPolicy, SizeConstraints};

use crate::mocks::{
    MemoryStore, MockConnector, MockFactory, MockProvider, RecordingReporter, aws_env,
    credential, layout,
};

fn opts() -> ConnectOptions {
    ConnectOptions {
        retry: RetryPolicy::fixed(15, Duration::from_secs(5)),
        timeout: Duration::from_secs(30),
    }
}

#[tokio::test]
async fn create_then_load_matches_created_node() {
    let provider = MockProvider::default();
    let store = MemoryStore::default();
    let reporter = RecordingReporter::default();

    let handle = NodeLifecycleManager::new(&provider, &store)
        .create(&layout("web1"), &credential(), &aws_env(), &reporter)
        .await
        .expect("create");

    let record = store.load("web1").await.expect("load");
    assert_eq!(record.host, handle.node.public_ips[0]);
    assert_eq!(record.username, "ubuntu");
    assert_eq!(record.node_id, handle.node.id);
    assert_eq!(record.key_pair, record.session_id);
    assert_eq!(record.env, aws_env());
    assert_eq!(record, handle.metadata);
    assert!(
        reporter
            .lines()
            .contains(&"success: web1 ready at 203.0.113.10".to_string())
    );
}

#[tokio::test]
async fn create_imports_key_pair_before_node() {
    let provider = MockProvider::default();
    let store = MemoryStore::default();

    let handle = NodeLifecycleManager::new(&provider, &store)
        .create(&layout("web1"), &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect("create");

    let calls = provider.calls();
    let import = calls
        .iter()
        .position(|c| c.starts_with("import_key_pair"))
        .expect("import");
    let create = calls
        .iter()
        .position(|c| c.starts_with("create_node"))
        .expect("create");
    assert!(import < create);
    assert_eq!(
        calls[import],
        format!(
            "import_key_pair {} /keys/id_ed25519.pub",
            handle.metadata.session_id
        )
    );
    assert_eq!(
        handle.node.name,
        node_name("web1", &handle.metadata.session_id)
    );
}

#[tokio::test]
async fn create_overwrites_previous_record() {
    let provider = MockProvider::default();
    let store = MemoryStore::default();
    let manager = NodeLifecycleManager::new(&provider, &store);
    let reporter = RecordingReporter::default();

    let first = manager
        .create(&layout("web1"), &credential(), &aws_env(), &reporter)
        .await
        .expect("create");
    let second = manager
        .create(&layout("web1"), &credential(), &aws_env(), &reporter)
        .await
        .expect("create");

    assert_ne!(first.node.id, second.node.id);
    assert_eq!(
        store.load("web1").await.expect("load").node_id,
        second.node.id
    );
}

#[tokio::test]
async fn explicit_size_fails_before_any_mutation() {
    let provider = MockProvider::default();
    let store = MemoryStore::default();
    let mut l = layout("web1");
    l.constraints = SizeConstraints::Explicit {
        cores: Some(4),
        disk: Some(100),
        mem: Some(8192),
    };

    let err = NodeLifecycleManager::new(&provider, &store)
        .create(&l, &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect_err("expected Err");

    match err.downcast_ref::<ProvisionError>() {
        Some(ProvisionError::SizeNotFound { requested, .. }) => {
            assert!(requested.contains('4'));
            assert!(requested.contains("100"));
            assert!(requested.contains("8192"));
        }
        other => panic!("expected SizeNotFound, got {other:?}"),
    }
    assert_eq!(provider.calls_to("import_key_pair"), 0);
    assert_eq!(provider.calls_to("create_node"), 0);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn unknown_image_fails_before_size_resolution() {
    let provider = MockProvider::default();
    let store = MemoryStore::default();
    let mut l = layout("web1");
    l.runs_on = "plan9".into();

    let err = NodeLifecycleManager::new(&provider, &store)
        .create(&l, &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect_err("expected Err");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::ImageNotFound { reference, .. }) if reference == "plan9"
    ));
    assert_eq!(provider.calls_to("resolve_size"), 0);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn node_without_address_is_not_recorded() {
    let provider = MockProvider {
        public_ip: None,
        ..MockProvider::default()
    };
    let store = MemoryStore::default();

    let err = NodeLifecycleManager::new(&provider, &store)
        .create(&layout("web1"), &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect_err("expected Err");

    assert!(err.to_string().contains("i-0001"));
    assert!(err.to_string().contains("no public address"));
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn failed_creation_names_the_imported_key_pair() {
    let provider = MockProvider {
        create_times_out: true,
        ..MockProvider::default()
    };
    let store = MemoryStore::default();

    let err = NodeLifecycleManager::new(&provider, &store)
        .create(&layout("web1"), &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect_err("expected Err");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::ProvisionTimeout { node_id, .. }) if node_id == "i-0001"
    ));
    let key = provider.key_pair_names().pop().expect("imported key pair");
    let msg = format!("{err:#}");
    assert!(msg.contains(&format!("key pair {key} on aws is still registered")), "{msg}");
    assert!(msg.contains("skyforge key-pairs rm"), "{msg}");
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn failed_save_names_the_orphaned_node() {
    let provider = MockProvider::default();
    let store = MemoryStore {
        fail_saves: true,
        ..MemoryStore::default()
    };

    let err = NodeLifecycleManager::new(&provider, &store)
        .create(&layout("web1"), &credential(), &aws_env(), &RecordingReporter::default())
        .await
        .expect_err("expected Err");

    let msg = format!("{err:#}");
    assert!(msg.contains("i-0001"), "{msg}");
    assert!(msg.contains("destroy it manually"), "{msg}");
    assert!(msg.contains("disk full"), "{msg}");
    assert_eq!(provider.node_ids(), vec!["i-0001"]);
}

/// web1 on aws, ubuntu-20.04, small, one echo step: create, then deploy
/// through the pre-bound session and through a fresh reconnect.
#[tokio::test]
async fn web1_echo_scenario() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    let connector = MockConnector::default();
    let reporter = RecordingReporter::default();

    let handle = {
        let provider = factory
            .connect(ProviderKind::Aws, &aws_env())
            .await
            .expect("connect");
        NodeLifecycleManager::new(&provider, &store)
            .create(&layout("web1"), &credential(), &aws_env(), &reporter)
            .await
            .expect("create")
    };

    let session = handle
        .into_session(&connector, &opts())
        .await
        .expect("session");
    let result = session
        .deploy(&reporter)
        .await
        .expect("deploy")
        .expect("result");
    assert_eq!(result.outcomes.len(), 1);
    assert!(result.outcomes[0].succeeded());
    assert_eq!(result.outcomes[0].label, "echo hello");

    let again = DeploymentSession::reconnect("web1", &factory, &store, &connector, &opts())
        .await
        .expect("reconnect")
        .deploy(&reporter)
        .await
        .expect("deploy")
        .expect("result");
    assert_eq!(again.outcomes.len(), 1);
    assert!(again.succeeded());
    assert_eq!(connector.executed().len(), 2);
}
