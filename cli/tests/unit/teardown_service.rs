//! Tests for session teardown and key-pair deletion with backoff.

#![allow(clippy::expect_used)]

use std::time::Duration;

use chrono::Utc;
use skyforge_cli::application::services::keys::{delete_key_pair, remove_key_pairs};
use skyforge_cli::application::services::teardown::{destroy_all, destroy_session};
use skyforge_cli::domain::{
    KeyPair, Node, NodeState, ProvisionError, RetryPolicy, SessionMetadata, Settings,
};

use crate::mocks::{MemoryStore, MockFactory, MockProvider, RecordingReporter, aws_env, layout};

fn key_policy() -> RetryPolicy {
    Settings::default().key_pair_delete_policy()
}

fn record(name: &str, node_id: &str) -> SessionMetadata {
    SessionMetadata {
        host: "203.0.113.10".into(),
        username: "ubuntu".into(),
        layout: layout(name),
        ssh_public_key: "/keys/id_ed25519.pub".into(),
        ssh_private_key: "/keys/id_ed25519".into(),
        node_id: node_id.into(),
        node_name: format!("skyforge-{name}"),
        session_id: format!("sf-{name}"),
        key_pair: format!("sf-{name}"),
        env: aws_env(),
        created_at: Utc::now(),
    }
}

/// Provider holding one running node and key pair per name.
fn provider_with(names: &[(&str, &str)]) -> MockProvider {
    let provider = MockProvider::default();
    for (name, id) in names {
        provider.nodes.lock().expect("lock").push(Node {
            id: (*id).to_string(),
            name: format!("skyforge-{name}"),
            public_ips: vec!["203.0.113.10".into()],
            state: NodeState::Running,
        });
        provider.add_key_pair(&format!("sf-{name}"));
    }
    provider
}

fn key(name: &str) -> KeyPair {
    KeyPair {
        name: name.into(),
        fingerprint: None,
    }
}

// ── delete_key_pair ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn key_delete_stops_at_first_success() {
    let provider = MockProvider {
        key_delete_failures: 3,
        ..MockProvider::default()
    };
    provider.add_key_pair("sf-1");

    delete_key_pair(&provider, &key("sf-1"), &key_policy())
        .await
        .expect("delete");

    assert_eq!(provider.calls_to("delete_key_pair"), 4);
    assert_eq!(provider.key_delete_gaps(), vec![3, 6, 12]);
    assert!(provider.key_pair_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn key_delete_gives_up_after_fifteen_attempts() {
    let provider = MockProvider {
        key_delete_failures: u32::MAX,
        ..MockProvider::default()
    };
    let start = tokio::time::Instant::now();

    let err = delete_key_pair(&provider, &key("sf-1"), &key_policy())
        .await
        .expect_err("expected Err");

    assert_eq!(provider.calls_to("delete_key_pair"), 15);
    assert_eq!(
        provider.key_delete_gaps(),
        vec![3, 6, 12, 24, 48, 60, 60, 60, 60, 60, 60, 60, 60, 60]
    );
    assert_eq!(start.elapsed(), Duration::from_secs(633));
    let msg = format!("{err:#}");
    assert!(msg.contains("after 15 attempt(s)"), "{msg}");
    assert!(msg.contains("in use"), "{msg}");
}

#[tokio::test]
async fn key_delete_first_try_does_not_retry() {
    let provider = MockProvider::default();
    provider.add_key_pair("sf-1");

    delete_key_pair(&provider, &key("sf-1"), &key_policy())
        .await
        .expect("delete");

    assert_eq!(provider.calls_to("delete_key_pair"), 1);
}

#[tokio::test]
async fn remove_key_pairs_applies_substring_filter() {
    let provider = MockProvider::default();
    for name in ["sf-aaa", "sf-bbb", "manual-key"] {
        provider.add_key_pair(name);
    }

    let removal = remove_key_pairs(
        &provider,
        Some("sf-"),
        &key_policy(),
        &RecordingReporter::default(),
    )
    .await
    .expect("remove");

    assert_eq!(removal.removed, vec!["sf-aaa", "sf-bbb"]);
    assert!(removal.failed.is_empty());
    assert_eq!(provider.key_pair_names(), vec!["manual-key"]);
}

// ── destroy_session ───────────────────────────────────────────────────────────

#[tokio::test]
async fn destroy_removes_node_key_pair_and_record() {
    let factory = MockFactory::with_provider(provider_with(&[("web1", "i-0001")]));
    let store = MemoryStore::default();
    store.insert("web1", record("web1", "i-0001"));
    let reporter = RecordingReporter::default();

    let outcome = destroy_session("web1", &factory, &store, &key_policy(), false, &reporter)
        .await
        .expect("destroy");

    assert!(outcome.node_destroyed);
    assert!(outcome.key_pair_deleted);
    assert!(factory.provider.node_ids().is_empty());
    assert!(factory.provider.key_pair_names().is_empty());
    assert!(store.keys().is_empty());
    assert!(
        reporter
            .lines()
            .contains(&"success: web1 removed".to_string())
    );
}

#[tokio::test]
async fn destroy_tolerates_node_already_gone() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();
    store.insert("web1", record("web1", "i-0009"));
    let reporter = RecordingReporter::default();

    let outcome = destroy_session("web1", &factory, &store, &key_policy(), false, &reporter)
        .await
        .expect("destroy");

    assert!(!outcome.node_destroyed);
    assert!(!outcome.key_pair_deleted);
    assert!(store.keys().is_empty());
    assert!(reporter.lines().iter().any(|l| l.starts_with("warn: node i-0009")));
}

#[tokio::test]
async fn destroy_only_records_makes_no_provider_call() {
    let factory = MockFactory::with_provider(provider_with(&[("web1", "i-0001")]));
    let store = MemoryStore::default();
    store.insert("web1", record("web1", "i-0001"));

    destroy_session(
        "web1",
        &factory,
        &store,
        &key_policy(),
        true,
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy");

    assert_eq!(factory.connects(), 0);
    assert_eq!(factory.provider.node_ids(), vec!["i-0001"]);
    assert!(store.keys().is_empty());
}

#[tokio::test]
async fn destroy_unknown_session_is_session_not_found() {
    let factory = MockFactory::default();
    let store = MemoryStore::default();

    let err = destroy_session(
        "ghost",
        &factory,
        &store,
        &key_policy(),
        false,
        &RecordingReporter::default(),
    )
    .await
    .expect_err("expected Err");

    assert!(matches!(
        err.downcast_ref::<ProvisionError>(),
        Some(ProvisionError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn failed_teardown_keeps_record_for_retry() {
    let factory = MockFactory {
        reject: true,
        ..MockFactory::default()
    };
    let store = MemoryStore::default();
    store.insert("web1", record("web1", "i-0001"));

    let result = destroy_session(
        "web1",
        &factory,
        &store,
        &key_policy(),
        false,
        &RecordingReporter::default(),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(store.keys(), vec!["web1"]);
}

#[tokio::test]
async fn destroy_all_visits_every_session() {
    let factory = MockFactory::with_provider(provider_with(&[
        ("web1", "i-0001"),
        ("web2", "i-0002"),
    ]));
    let store = MemoryStore::default();
    store.insert("web1", record("web1", "i-0001"));
    store.insert("web2", record("web2", "i-0002"));

    let results = destroy_all(
        &factory,
        &store,
        &key_policy(),
        false,
        &RecordingReporter::default(),
    )
    .await
    .expect("destroy all");

    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["web1", "web2"]);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(factory.provider.node_ids().is_empty());
    assert!(store.keys().is_empty());
}
