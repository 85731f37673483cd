//! Layout loading and name validation, including property-based checks.

#![allow(clippy::expect_used)]

use proptest::prelude::*;

use skyforge_cli::domain::{LayoutError, validate_layout_name};
use skyforge_cli::infra::layout::parse_layouts;

const HEADER: &str = "ssh: {public: /k/id.pub, private: /k/id}\nlayouts:\n";

fn doc(entries: &[&str]) -> String {
    let mut out = HEADER.to_string();
    for e in entries {
        out.push_str("  - ");
        out.push_str(e);
        out.push('\n');
    }
    out
}

#[test]
fn duplicate_replica_names_are_rejected() {
    let yaml = doc(&[
        "{name: web, provider: aws, runs_on: ubuntu-20.04, constraints: small, username: u, scale: 2}",
        "{name: web-2, provider: aws, runs_on: ubuntu-20.04, constraints: small, username: u}",
    ]);
    let err = parse_layouts(&yaml).expect_err("expected Err");
    assert!(matches!(
        err.downcast_ref::<LayoutError>(),
        Some(LayoutError::DuplicateName(n)) if n == "web-2"
    ));
}

#[test]
fn zero_scale_is_rejected() {
    let yaml = doc(&[
        "{name: web, provider: aws, runs_on: ubuntu-20.04, constraints: small, username: u, scale: 0}",
    ]);
    let err = parse_layouts(&yaml).expect_err("expected Err");
    assert!(matches!(
        err.downcast_ref::<LayoutError>(),
        Some(LayoutError::ZeroScale(_))
    ));
}

#[test]
fn mistyped_constraints_map_is_rejected() {
    let yaml = doc(&[
        "{name: web, provider: aws, runs_on: ubuntu-20.04, constraints: {size: small}, username: u}",
    ]);
    let err = parse_layouts(&yaml).expect_err("expected Err");
    assert!(matches!(
        err.downcast_ref::<LayoutError>(),
        Some(LayoutError::EmptyConstraints(n)) if n == "web"
    ));
}

#[test]
fn gce_alias_selects_google_provider() {
    let yaml = doc(&[
        "{name: db, provider: gce, runs_on: ubuntu-22.04, constraints: medium, username: admin}",
    ]);
    let layouts = parse_layouts(&yaml).expect("parse");
    assert_eq!(layouts[0].provider.as_str(), "google");
}

#[test]
fn steps_accept_run_alias_and_sudo() {
    let yaml = format!(
        "{HEADER}  - name: web\n    provider: aws\n    runs_on: ubuntu-20.04\n    constraints: small\n    username: u\n    steps:\n      - run: apt-get update\n        sudo: true\n      - name: greet\n        script: echo hi\n"
    );
    let layouts = parse_layouts(&yaml).expect("parse");
    let steps = &layouts[0].steps;
    assert_eq!(steps.len(), 2);
    assert!(steps[0].sudo);
    assert_eq!(steps[0].label(), "apt-get update");
    assert_eq!(steps[1].label(), "greet");
}

proptest! {
    /// Names made only of the allowed alphabet are accepted.
    #[test]
    fn prop_valid_names_accepted(name in "[A-Za-z0-9][A-Za-z0-9._-]{0,40}") {
        prop_assert!(validate_layout_name(&name).is_ok());
    }

    /// Any name containing a path separator is rejected.
    #[test]
    fn prop_names_with_separators_rejected(
        head in "[a-z]{1,10}",
        sep in "[/\\\\]",
        tail in "[a-z]{0,10}",
    ) {
        let name = format!("{head}{sep}{tail}");
        prop_assert!(validate_layout_name(&name).is_err());
    }

    /// Names that start with a dot or hyphen are rejected.
    #[test]
    fn prop_leading_punctuation_rejected(lead in "[._-]", rest in "[a-z]{0,10}") {
        let name = format!("{lead}{rest}");
        prop_assert!(validate_layout_name(&name).is_err());
    }
}
