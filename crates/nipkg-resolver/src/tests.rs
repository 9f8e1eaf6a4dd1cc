use std::collections::BTreeMap;

use nipkg_core::{Context, ErrorKind, PackageError, PackageManifest, PackageVersion};

use super::*;

fn version(raw: &str) -> PackageVersion {
    PackageVersion::parse(raw).expect("version must parse")
}

fn constraint(raw: &str) -> VersionConstraint {
    VersionConstraint::parse(raw).expect("constraint must parse")
}

fn manifest(id: &str, dependencies: &[(&str, &str)]) -> PackageManifest {
    PackageManifest {
        id: id.to_string(),
        version: "1.0".to_string(),
        title: None,
        description: None,
        authors: Vec::new(),
        entry_point: format!("{id}.EntryPoint, {id}"),
        dependencies: dependencies
            .iter()
            .map(|(id, constraint)| (id.to_string(), constraint.to_string()))
            .collect(),
    }
}

fn acme() -> Context {
    Context::new("Acme", false).expect("context must be valid")
}

#[test]
fn bare_version_means_at_least() {
    let at_least = constraint("1.2");
    assert!(at_least.matches(&version("1.2")));
    assert!(at_least.matches(&version("1.2.0.1")));
    assert!(at_least.matches(&version("3.0")));
    assert!(!at_least.matches(&version("1.1.9")));
}

#[test]
fn interval_notation_respects_inclusivity() {
    let half_open = constraint("[1.0,2.0)");
    assert!(half_open.matches(&version("1.0")));
    assert!(half_open.matches(&version("1.9.9")));
    assert!(!half_open.matches(&version("2.0")));

    let open_min = constraint("(1.0,]");
    assert!(!open_min.matches(&version("1.0")));
    assert!(open_min.matches(&version("7.0")));

    let exact = constraint("[1.5]");
    assert!(exact.matches(&version("1.5.0")));
    assert!(!exact.matches(&version("1.5.1")));

    let upper_only = constraint("(,2.0]");
    assert!(upper_only.matches(&version("0.1")));
    assert!(upper_only.matches(&version("2.0")));
}

#[test]
fn semver_requirements_are_accepted() {
    let caret = constraint("^1.2");
    assert!(caret.matches(&version("1.4")));
    assert!(!caret.matches(&version("2.0")));
    assert_eq!(caret.as_str(), "^1.2");
}

#[test]
fn malformed_constraints_are_manifest_errors() {
    for raw in ["[1.0", "(1.0)", "[,]", "[a,b]", "not a version"] {
        let err = VersionConstraint::parse(raw).expect_err("constraint must be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidManifest, "constraint {raw}");
    }
}

#[test]
fn check_dependencies_ignores_foreign_ids() {
    let foo = manifest(
        "Acme.Package.Foo",
        &[("NetIde.Runtime", "1.0"), ("Unrelated.Thing", "9.9")],
    );
    let resolved = check_dependencies(&acme(), &foo, |_| {
        panic!("foreign ids must not be looked up")
    })
    .expect("foreign ids are ignored");
    assert!(resolved.is_empty());
}

#[test]
fn check_dependencies_resolves_installed_versions() {
    let foo = manifest(
        "Acme.Package.Foo",
        &[("Acme.Package.Bar", "[1.0,2.0)"), ("NetIde.Package.Text", "1.0")],
    );
    let installed = BTreeMap::from([
        ("Acme.Package.Bar".to_string(), "1.4".to_string()),
        ("NetIde.Package.Text".to_string(), "2.0".to_string()),
    ]);
    let resolved =
        check_dependencies(&acme(), &foo, |id| Ok(installed.get(id).cloned())).expect("resolves");
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].package_id, "Acme.Package.Bar");
    assert_eq!(resolved[0].installed_version, "1.4");
}

#[test]
fn check_dependencies_reports_every_unmet_dependency() {
    let foo = manifest(
        "Acme.Package.Foo",
        &[("Acme.Package.Bar", "2.0"), ("Acme.Package.Baz", "1.0")],
    );
    let installed = BTreeMap::from([("Acme.Package.Bar".to_string(), "1.0".to_string())]);
    let err = check_dependencies(&acme(), &foo, |id| Ok(installed.get(id).cloned()))
        .expect_err("dependencies are not satisfied");

    assert!(!err.is_fatal());
    let PackageError::DependencyUnsatisfied { package_id, unmet } = err else {
        panic!("unexpected error kind");
    };
    assert_eq!(package_id, "Acme.Package.Foo");
    assert_eq!(unmet.len(), 2);
    assert_eq!(unmet[0].installed.as_deref(), Some("1.0"));
    assert_eq!(unmet[1].installed, None);
}

#[test]
fn install_order_puts_dependencies_first() {
    let batch = BTreeMap::from([
        (
            "Acme.Package.App".to_string(),
            manifest("Acme.Package.App", &[("Acme.Package.Lib", "1.0")]),
        ),
        (
            "Acme.Package.Lib".to_string(),
            manifest("Acme.Package.Lib", &[("Acme.Package.Base", "1.0")]),
        ),
        (
            "Acme.Package.Base".to_string(),
            manifest("Acme.Package.Base", &[("NetIde.Package.Elsewhere", "1.0")]),
        ),
    ]);

    let order = install_order(&batch).expect("batch must order");
    assert_eq!(
        order,
        vec!["Acme.Package.Base", "Acme.Package.Lib", "Acme.Package.App"]
    );
}

#[test]
fn install_order_detects_cycles() {
    let batch = BTreeMap::from([
        (
            "Acme.Package.A".to_string(),
            manifest("Acme.Package.A", &[("Acme.Package.B", "1.0")]),
        ),
        (
            "Acme.Package.B".to_string(),
            manifest("Acme.Package.B", &[("Acme.Package.A", "1.0")]),
        ),
        ("Acme.Package.C".to_string(), manifest("Acme.Package.C", &[])),
    ]);

    let err = install_order(&batch).expect_err("cycle must be reported");
    assert_eq!(err.kind(), ErrorKind::DependencyUnsatisfied);
    assert!(err.to_string().contains("Acme.Package.A, Acme.Package.B"));
}
