use super::*;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use nipkg_core::{Context, ErrorKind, PackageState};
use tempfile::TempDir;

#[test]
fn missing_context_is_distinct_from_empty_context() {
    let (_root, store) = test_store();
    let context = acme();

    assert!(store.open_context(&context).expect("must open").is_none());
    let err = store
        .list_package_ids(&context)
        .expect_err("missing context must be reported");
    assert_eq!(err.kind(), ErrorKind::ContextDoesNotExist);
    assert_eq!(err.code(), 2);

    init_context(&store, &context);
    assert!(store
        .list_package_ids(&context)
        .expect("must list")
        .is_empty());
}

#[test]
fn experimental_context_has_its_own_root() {
    let (_root, store) = test_store();
    let stable = acme();
    let experimental = Context::new("Acme", true).expect("valid");

    init_context(&store, &stable);
    store
        .write_field(&stable, "Acme.Package.Foo", RecordField::Version, "1.0")
        .expect("must write");

    assert!(store.open_context(&experimental).expect("must open").is_none());
    assert!(store
        .layout()
        .context_root(&experimental)
        .ends_with("Acme$Exp"));
}

#[test]
fn set_value_replaces_previous_value() {
    let (_root, store) = test_store();
    let context = acme();
    let key = init_context(&store, &context)
        .create_subkey("Packages/Foo")
        .expect("must create nested key");

    key.set_value("Color", "red").expect("must write");
    key.set_value("Color", "blue").expect("must overwrite");
    assert_eq!(
        key.get_value("Color").expect("must read").as_deref(),
        Some("blue")
    );
    assert_eq!(key.value_names().expect("must list"), vec!["Color"]);

    let leftovers = fs::read_dir(key.path())
        .expect("must read key dir")
        .count();
    assert_eq!(leftovers, 1, "temp files must not survive a write");

    assert!(key.delete_value("Color").expect("must delete"));
    assert!(!key.delete_value("Color").expect("second delete is a no-op"));
    assert!(key.get_value("Color").expect("must read").is_none());
}

#[test]
fn flags_read_absent_as_false_and_reject_garbage() {
    let (_root, store) = test_store();
    let key = init_context(&store, &acme());

    assert!(!key.get_flag("Disabled").expect("absent flag"));
    key.set_flag("Disabled", true).expect("must write");
    assert!(key.get_flag("Disabled").expect("must read"));
    key.set_value("Disabled", "2").expect("must write");
    assert!(key.get_flag("Disabled").expect("non-zero is true"));
    key.set_flag("Disabled", false).expect("must write");
    assert!(!key.get_flag("Disabled").expect("must read"));

    key.set_value("Disabled", "yes").expect("must write");
    let err = key.get_flag("Disabled").expect_err("garbage flag");
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[test]
fn invalid_key_and_value_names_are_rejected() {
    let (_root, store) = test_store();
    let key = init_context(&store, &acme());

    for name in ["", ".", "..", "a\0b", "Version.value"] {
        let err = key.set_value(name, "x").expect_err("name must be rejected");
        assert_eq!(err.kind(), ErrorKind::Store, "name {name:?}");
    }
    let err = key
        .create_subkey("Packages/../../escape")
        .expect_err("traversal must be rejected");
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[test]
fn record_round_trip_and_delete() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);

    assert!(store
        .read_record(&context, "Acme.Package.Foo")
        .expect("must read")
        .is_none());

    store
        .write_field(&context, "Acme.Package.Foo", RecordField::Version, "1.0")
        .expect("must write");
    store
        .write_field(&context, "Acme.Package.Foo", RecordField::PendingVersion, "1.1")
        .expect("must write");
    store
        .write_flag(&context, "Acme.Package.Foo", RecordField::Disabled, true)
        .expect("must write");

    let record = store
        .read_record(&context, "Acme.Package.Foo")
        .expect("must read")
        .expect("record must exist");
    assert_eq!(record.version.as_deref(), Some("1.0"));
    assert_eq!(record.pending_version.as_deref(), Some("1.1"));
    assert!(record.disabled);
    assert!(!record.uninstall_pending);

    store
        .clear_field(&context, "Acme.Package.Foo", RecordField::PendingVersion)
        .expect("must clear");
    let record = store
        .read_record(&context, "Acme.Package.Foo")
        .expect("must read")
        .expect("record must exist");
    assert!(record.pending_version.is_none());

    store
        .delete_record(&context, "Acme.Package.Foo")
        .expect("must delete");
    assert!(store
        .read_record(&context, "Acme.Package.Foo")
        .expect("must read")
        .is_none());
    store
        .delete_record(&context, "Acme.Package.Foo")
        .expect("deleting a missing record is a no-op");
}

#[test]
fn list_package_ids_is_sorted() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);

    for id in ["Acme.Package.Zeta", "Acme.Package.Alpha", "NetIde.Package.Mid"] {
        store
            .write_field(&context, id, RecordField::Version, "1.0")
            .expect("must write");
    }

    assert_eq!(
        store.list_package_ids(&context).expect("must list"),
        vec!["Acme.Package.Alpha", "Acme.Package.Zeta", "NetIde.Package.Mid"]
    );
}

#[test]
fn dependencies_are_replaced_as_a_set() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);

    let first = BTreeMap::from([
        ("Acme.Package.Bar".to_string(), "1.0".to_string()),
        ("Acme.Package.Baz".to_string(), "[2.0,3.0)".to_string()),
    ]);
    store
        .write_dependencies(&context, "Acme.Package.Foo", &first)
        .expect("must write");
    assert_eq!(
        store
            .read_dependencies(&context, "Acme.Package.Foo")
            .expect("must read"),
        first
    );

    let second = BTreeMap::from([("Acme.Package.Qux".to_string(), "0.5".to_string())]);
    store
        .write_dependencies(&context, "Acme.Package.Foo", &second)
        .expect("must write");
    assert_eq!(
        store
            .read_dependencies(&context, "Acme.Package.Foo")
            .expect("must read"),
        second
    );
}

#[test]
fn installed_version_treats_missing_context_as_absent() {
    let (_root, store) = test_store();
    let context = acme();

    assert!(installed_version(&store, &context, "Acme.Package.Foo")
        .expect("missing context is not an error")
        .is_none());

    init_context(&store, &context);
    assert!(installed_version(&store, &context, "Acme.Package.Foo")
        .expect("missing record is not an error")
        .is_none());

    store
        .write_field(&context, "Acme.Package.Foo", RecordField::Version, "2.1")
        .expect("must write");
    assert_eq!(
        installed_version(&store, &context, "Acme.Package.Foo")
            .expect("must read")
            .as_deref(),
        Some("2.1")
    );
}

#[test]
fn list_installed_merges_manifest_and_record() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);
    let registry = PackageRegistry::new(store);

    install_fixture(&registry, &context, "Acme.Package.Foo", "1.0");
    registry
        .store()
        .write_field(
            &context,
            "Acme.Package.Foo",
            RecordField::GalleryDetailsUrl,
            "https://gallery.test/foo",
        )
        .expect("must write");

    let packages = registry.list_installed(&context).expect("must list");
    assert_eq!(packages.len(), 1);
    let foo = &packages[0];
    assert_eq!(foo.id, "Acme.Package.Foo");
    assert_eq!(foo.title.as_deref(), Some("Foo"));
    assert_eq!(foo.version.as_deref(), Some("1.0"));
    assert!(foo.pending_version.is_none());
    assert_eq!(foo.state, PackageState::INSTALLED);
    assert_eq!(
        foo.gallery_details_url.as_deref(),
        Some("https://gallery.test/foo")
    );

    let json = serde_json::to_value(foo).expect("must serialize");
    assert_eq!(json["id"], "Acme.Package.Foo");
    assert_eq!(json["version"], "1.0");
}

#[test]
fn list_installed_omits_pending_installs_and_uninstalls() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);
    let registry = PackageRegistry::new(store);

    install_fixture(&registry, &context, "Acme.Package.Foo", "1.0");
    install_fixture(&registry, &context, "Acme.Package.Gone", "1.0");
    registry
        .queue_uninstall(&context, "Acme.Package.Gone")
        .expect("must queue");
    registry
        .queue_update(
            &context,
            &QueuedUpdate {
                package_id: "Acme.Package.New".to_string(),
                version: "0.1".to_string(),
                gallery_details_url: None,
                nuget_site: Some("https://feed.test".to_string()),
            },
        )
        .expect("must queue");

    let ids = registry
        .list_installed(&context)
        .expect("must list")
        .into_iter()
        .map(|package| package.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["Acme.Package.Foo"]);

    assert_eq!(
        registry
            .package_state(&context, "Acme.Package.Gone")
            .expect("must derive"),
        PackageState::UNINSTALL_PENDING
    );
    assert_eq!(
        registry
            .package_state(&context, "Acme.Package.New")
            .expect("must derive"),
        PackageState::UPDATE_PENDING | PackageState::INSTALL_PENDING
    );
}

#[test]
fn queue_update_and_enablement_change_derived_state() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);
    let registry = PackageRegistry::new(store);
    install_fixture(&registry, &context, "Acme.Package.Foo", "1.0");

    registry
        .queue_update(
            &context,
            &QueuedUpdate {
                package_id: "Acme.Package.Foo".to_string(),
                version: "1.1".to_string(),
                gallery_details_url: Some("https://gallery.test/foo".to_string()),
                nuget_site: None,
            },
        )
        .expect("must queue");
    registry
        .enable_package(&context, "Acme.Package.Foo", false)
        .expect("must disable");

    let state = registry
        .package_state(&context, "Acme.Package.Foo")
        .expect("must derive");
    assert_eq!(
        state,
        PackageState::INSTALLED | PackageState::UPDATE_PENDING | PackageState::DISABLED
    );

    registry
        .enable_package(&context, "Acme.Package.Foo", true)
        .expect("must enable");
    let record = registry
        .store()
        .read_record(&context, "Acme.Package.Foo")
        .expect("must read")
        .expect("record must exist");
    assert!(!record.disabled);
    assert_eq!(record.pending_version.as_deref(), Some("1.1"));
}

#[test]
fn mutations_reject_foreign_package_ids() {
    let (_root, store) = test_store();
    let context = acme();
    init_context(&store, &context);
    let registry = PackageRegistry::new(store);

    let err = registry
        .queue_uninstall(&context, "Unrelated.Thing")
        .expect_err("foreign id must be rejected");
    assert_eq!(err.kind(), ErrorKind::InvalidPackageId);
    assert!(registry
        .store()
        .list_package_ids(&context)
        .expect("must list")
        .is_empty());
}

#[test]
fn package_state_flags_core_packages_without_a_context() {
    let (_root, store) = test_store();
    let registry = PackageRegistry::new(store);
    let context = acme();

    assert_eq!(
        registry
            .package_state(&context, "Acme.Package.Core")
            .expect("must derive"),
        PackageState::CORE_PACKAGE
    );
    assert_eq!(
        registry
            .package_state(&context, "NetIde.Runtime")
            .expect("must derive"),
        PackageState::CORE_PACKAGE | PackageState::SYSTEM_PACKAGE
    );
}

#[test]
fn load_package_manifest_requires_exactly_one_manifest() {
    let dir = TempDir::new().expect("must create temp dir");

    let err = load_package_manifest(dir.path()).expect_err("no manifest");
    assert_eq!(err.kind(), ErrorKind::InvalidManifest);

    write_manifest(dir.path(), "a.nispec", "Acme.Package.Foo", "1.0");
    load_package_manifest(dir.path()).expect("single manifest must load");

    write_manifest(dir.path(), "b.nispec", "Acme.Package.Foo", "1.0");
    let err = load_package_manifest(dir.path()).expect_err("ambiguous manifest");
    assert_eq!(err.kind(), ErrorKind::InvalidManifest);
}

#[test]
fn record_field_lookup_ignores_case() {
    assert_eq!(RecordField::from_name("version"), Some(RecordField::Version));
    assert_eq!(
        RecordField::from_name("NUGETSITE"),
        Some(RecordField::NuGetSite)
    );
    assert_eq!(RecordField::from_name("Package"), None);
}

fn acme() -> Context {
    Context::new("Acme", false).expect("context must be valid")
}

fn test_store() -> (TempDir, StateStore) {
    let root = TempDir::new().expect("must create temp dir");
    let store = StateStore::open(root.path().join("state"));
    (root, store)
}

fn init_context(store: &StateStore, context: &Context) -> StoreKey {
    let installation_path = store.layout().root().join("install").join(context.storage_key());
    store
        .create_context(context, &installation_path)
        .expect("must create context")
}

fn install_fixture(
    registry: &PackageRegistry,
    context: &Context,
    package_id: &str,
    version: &str,
) {
    let package_dir = registry
        .package_dir(context, package_id)
        .expect("must resolve package dir");
    fs::create_dir_all(&package_dir).expect("must create package dir");
    write_manifest(&package_dir, "package.nispec", package_id, version);
    registry
        .store()
        .write_field(context, package_id, RecordField::Version, version)
        .expect("must write version");
}

fn write_manifest(dir: &Path, file_name: &str, package_id: &str, version: &str) {
    let title = package_id.rsplit('.').next().unwrap_or(package_id);
    let content = format!(
        "id = \"{package_id}\"\nversion = \"{version}\"\ntitle = \"{title}\"\nentry_point = \"{title}Package, {title}\"\n"
    );
    fs::write(dir.join(file_name), content).expect("must write manifest");
}
