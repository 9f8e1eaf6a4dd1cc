use super::*;

fn acme() -> Context {
    Context::new("Acme", false).expect("context must be valid")
}

fn installed(version: &str) -> PackageRecord {
    PackageRecord {
        version: Some(version.to_string()),
        ..PackageRecord::default()
    }
}

#[test]
fn context_rejects_path_separators() {
    for name in ["Acme/Tools", "Acme\\Tools", "", "..", "."] {
        let err = Context::new(name, false).expect_err("name must be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidContextName);
        assert_eq!(err.code(), 1);
    }
}

#[test]
fn context_equality_includes_experimental_flag() {
    let stable = Context::new("Acme", false).expect("valid");
    let experimental = Context::new("Acme", true).expect("valid");
    assert_ne!(stable, experimental);
    assert_eq!(stable, Context::new("Acme", false).expect("valid"));
    assert_eq!(stable.storage_key(), "Acme");
    assert_eq!(experimental.storage_key(), "Acme$Exp");
}

#[test]
fn valid_package_ids_follow_host_or_context_namespace() {
    let context = acme();
    assert!(is_valid_package_id(&context, "NetIde.Package.Foo"));
    assert!(is_valid_package_id(
        &Context::new("Other", true).expect("valid"),
        "NetIde.Package.Foo"
    ));
    assert!(is_valid_package_id(&context, "Acme.Package.Foo"));
    assert!(is_valid_package_id(&context, "acme.package.foo"));
    assert!(!is_valid_package_id(&context, "Unrelated.Thing"));
    assert!(!is_valid_package_id(&context, "NetIde.Runtime"));
}

#[test]
fn check_package_id_rejects_path_like_ids() {
    let context = acme();
    check_package_id(&context, "Acme.Package.Foo").expect("plain id is fine");
    for id in ["Acme.Package.../x", "Acme.Package.Foo/../../etc", "Acme.Package..", "Other.Foo"] {
        let err = check_package_id(&context, id).expect_err("id must be rejected");
        assert_eq!(err.kind(), ErrorKind::InvalidPackageId);
    }
}

#[test]
fn core_package_detection() {
    let context = acme();
    assert!(is_core_package("Whatever.Package.Core"));
    assert!(is_context_core_package("ACME.PACKAGE.CORE", &context));
    assert!(!is_context_core_package("NetIde.Package.Core", &context));
    assert!(is_system_package("netide.runtime"));
}

#[test]
fn derive_state_is_pure() {
    let context = acme();
    let record = PackageRecord {
        version: Some("1.0".to_string()),
        pending_version: Some("1.1".to_string()),
        disabled: true,
        ..PackageRecord::default()
    };
    let first = derive_state(&context, "Acme.Package.Foo", Some(&record));
    let second = derive_state(&context, "Acme.Package.Foo", Some(&record));
    assert_eq!(first, second);
    assert_eq!(
        first,
        PackageState::INSTALLED | PackageState::DISABLED | PackageState::UPDATE_PENDING
    );
}

#[test]
fn uninstall_pending_dominates_every_other_field() {
    let context = acme();
    for version in [None, Some("1.0".to_string())] {
        for pending_version in [None, Some("2.0".to_string())] {
            for disabled in [false, true] {
                let record = PackageRecord {
                    version: version.clone(),
                    pending_version: pending_version.clone(),
                    disabled,
                    uninstall_pending: true,
                    ..PackageRecord::default()
                };
                let state = derive_state(&context, "Acme.Package.Foo", Some(&record));
                assert_eq!(state, PackageState::UNINSTALL_PENDING);
            }
        }
    }
}

#[test]
fn record_without_version_is_install_pending() {
    let context = acme();
    let record = PackageRecord::default();
    assert_eq!(
        derive_state(&context, "Acme.Package.Foo", Some(&record)),
        PackageState::UPDATE_PENDING | PackageState::INSTALL_PENDING
    );
    assert_eq!(
        derive_state(&context, "NetIde.Package.Core", Some(&record)),
        PackageState::CORE_PACKAGE
            | PackageState::SYSTEM_PACKAGE
            | PackageState::UPDATE_PENDING
            | PackageState::INSTALL_PENDING
    );
}

#[test]
fn missing_record_keeps_only_static_flags() {
    let context = acme();
    assert_eq!(
        derive_state(&context, "Acme.Package.Foo", None),
        PackageState::empty()
    );
    assert_eq!(
        derive_state(&context, "NetIde.Runtime", None),
        PackageState::CORE_PACKAGE | PackageState::SYSTEM_PACKAGE
    );
    assert_eq!(
        derive_state(&context, "Acme.Package.Core", Some(&installed("3.0"))),
        PackageState::CORE_PACKAGE | PackageState::INSTALLED
    );
}

#[test]
fn package_state_display_lists_flags() {
    assert_eq!(PackageState::empty().to_string(), "none");
    assert_eq!(
        (PackageState::INSTALLED | PackageState::UPDATE_PENDING).to_string(),
        "INSTALLED | UPDATE_PENDING"
    );
}

#[test]
fn entry_point_splits_on_first_comma() {
    let spec = EntryPointSpec::parse("Acme.Foo.FooPackage, Acme.Foo, Version=1.0")
        .expect("entry point must parse");
    assert_eq!(spec.type_name, "Acme.Foo.FooPackage");
    assert_eq!(spec.module_name, "Acme.Foo, Version=1.0");
}

#[test]
fn entry_point_without_comma_has_distinct_code() {
    let err = EntryPointSpec::parse("Acme.Foo.FooPackage").expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidEntryPoint);
    assert_eq!(err.code(), 3);
    assert_ne!(
        err.code(),
        PackageError::invalid_manifest("anything else").code()
    );
}

#[test]
fn parse_manifest() {
    let content = r#"
id = "Acme.Package.Foo"
version = "1.0"
title = "Foo"
description = "Adds foo to the host"
authors = ["Acme"]
entry_point = "Acme.Foo.FooPackage, Acme.Foo"

[dependencies]
"Acme.Package.Bar" = "1.2"
"NetIde.Runtime" = "[1.0,2.0)"
"#;

    let manifest = PackageManifest::from_toml_str(content).expect("manifest should parse");
    assert_eq!(manifest.id, "Acme.Package.Foo");
    assert_eq!(manifest.version, "1.0");
    assert_eq!(
        manifest.parsed_version().expect("version"),
        PackageVersion::parse("1.0.0").expect("version")
    );
    assert_eq!(manifest.display_title(), "Foo");
    assert_eq!(manifest.dependencies.len(), 2);
    assert_eq!(
        manifest.entry_point_spec().expect("entry point").module_name,
        "Acme.Foo"
    );
}

#[test]
fn parse_manifest_rejects_missing_fields() {
    let missing_entry = r#"
id = "Acme.Package.Foo"
version = "1.0"
entry_point = "  "
"#;
    let err = PackageManifest::from_toml_str(missing_entry).expect_err("must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidManifest);

    let bad_version = r#"
id = "Acme.Package.Foo"
version = "one"
entry_point = "A, B"
"#;
    let err = PackageManifest::from_toml_str(bad_version).expect_err("must fail");
    assert!(err.to_string().contains("invalid version 'one'"));

    let err = PackageManifest::from_toml_str("id = ").expect_err("syntax error must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidManifest);
}

#[test]
fn manifest_file_names_match_case_insensitively() {
    assert!(is_manifest_file_name("Acme.Package.Foo.nispec"));
    assert!(is_manifest_file_name("FOO.NISPEC"));
    assert!(!is_manifest_file_name("foo.nispec.bak"));
    assert!(!is_manifest_file_name("nispec"));
}

#[test]
fn versions_normalize_for_comparison() {
    let short = PackageVersion::parse("1.0").expect("valid");
    let long = PackageVersion::parse("1.0.0").expect("valid");
    assert_eq!(short, long);
    assert_eq!(short.as_str(), "1.0");
    assert_eq!(short.semver().to_string(), "1.0.0");

    let revision = PackageVersion::parse("1.0.0.4").expect("valid");
    assert!(revision > long);

    let beta = PackageVersion::parse("1.1-beta").expect("valid");
    assert!(beta < PackageVersion::parse("1.1").expect("valid"));
    assert!(beta > long);

    assert!(PackageVersion::parse("1.2.3.4.5").is_err());
    assert!(PackageVersion::parse("").is_err());
}
