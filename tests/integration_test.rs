// tests/integration_test.rs

//! Integration tests for prodlisting
//!
//! These tests drive whole insert and generate passes against temporary
//! SQLite databases, using the listing files under `tests/data`.

use prodlisting::Error;
use prodlisting::apply::ApplyMode;
use prodlisting::db::models::{Override, Product, TreeProductMapping};
use prodlisting::db::{self, ListingStore};
use prodlisting::expand::{OverrideTriple, expand_listing};
use prodlisting::listing::Listing;
use prodlisting::pipeline::{self, InsertReport};
use prodlisting::reconcile::ProductId;
use prodlisting::validate::Schema;
use rusqlite::Connection;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn data(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(name)
}

fn create_test_db() -> (NamedTempFile, Connection) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    db::init(&db_path).unwrap();
    let conn = db::open(&db_path).unwrap();
    (temp_file, conn)
}

fn insert(conn: &mut Connection, file: &str, mode: ApplyMode) -> InsertReport {
    let schema = Schema::builtin().unwrap();
    pipeline::insert_file(conn, &data(file), &schema, mode).unwrap()
}

fn product_id(conn: &Connection, label: &str, version: &str, variant: &str) -> i64 {
    let products = Product::find_by_listing(conn, label, version, variant).unwrap();
    assert_eq!(products.len(), 1, "exactly one product row expected");
    assert!(!products[0].allow_source_only);
    products[0].id.unwrap()
}

fn stored(conn: &Connection, product: i64) -> BTreeSet<OverrideTriple> {
    Override::find_by_product(conn, product)
        .unwrap()
        .iter()
        .map(|ov| {
            assert!(ov.include);
            ov.triple()
        })
        .collect()
}

fn tree_ids(conn: &Connection, product: i64) -> BTreeSet<i64> {
    TreeProductMapping::find_by_product(conn, product)
        .unwrap()
        .into_iter()
        .map(|m| m.tree_id)
        .collect()
}

fn t(name: &str, pkg_arch: &str, product_arch: &str) -> OverrideTriple {
    OverrideTriple::new(name, pkg_arch, product_arch)
}

#[test]
fn test_database_lifecycle() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("nested/path/to/listings.db")
        .to_str()
        .unwrap()
        .to_string();

    assert!(matches!(db::open(&db_path), Err(Error::DatabaseNotFound(_))));

    db::init(&db_path).unwrap();
    assert!(Path::new(&db_path).exists(), "Database should exist in nested path");

    let conn = db::open(&db_path).unwrap();
    let foreign_keys: i32 = conn
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1, "Foreign keys should be enabled");
}

#[test]
fn test_insert_multi_package_listing() {
    let (_temp, mut conn) = create_test_db();

    let report = insert(&mut conn, "listing_ose.yaml", ApplyMode::commit());
    assert_eq!(report.stats.overrides_inserted, 8);
    assert_eq!(report.stats.mappings_inserted, 1);

    let id = product_id(&conn, "RHEL-7-OSE-3.5", "3.5", "Server-RH7-RHOSE-3.5");
    assert_eq!(report.product_id, ProductId::Stored(id));
    assert_eq!(tree_ids(&conn, id), BTreeSet::from([5558]));

    let expected = BTreeSet::from([
        t("ansible", "noarch", "x86_64"),
        t("ansible", "x86_64", "x86_64"),
        t("ansible", "src", "x86_64"),
        t("cockpit", "x86_64", "x86_64"),
        t("cockpit", "src", "x86_64"),
        t("nodejs-chalk", "noarch", "x86_64"),
        t("nodejs-chalk", "x86_64", "x86_64"),
        t("nodejs-chalk", "src", "x86_64"),
    ]);
    assert_eq!(stored(&conn, id), expected);
}

#[test]
fn test_insert_single_noarch_package() {
    let (_temp, mut conn) = create_test_db();
    insert(&mut conn, "listing_noarch.yaml", ApplyMode::commit());

    let id = product_id(&conn, "RHEL-8-CoreOS", "4.2", "BaseOS");
    assert_eq!(
        stored(&conn, id),
        BTreeSet::from([t("console-login-helper-messages", "noarch", "x86_64")])
    );
    assert_eq!(tree_ids(&conn, id), BTreeSet::from([5558]));
}

#[test]
fn test_insert_listing_without_packages() {
    let (_temp, mut conn) = create_test_db();
    let report = insert(&mut conn, "listing_no_packages.yaml", ApplyMode::commit());
    assert_eq!(report.stats.products_inserted, 1);
    assert_eq!(report.stats.mutations(), 1);

    let id = product_id(&conn, "konami", "2.0", "6Server-Konami");
    assert!(stored(&conn, id).is_empty());
    assert!(tree_ids(&conn, id).is_empty());
}

#[test]
fn test_deletions_alongside_insertions() {
    let (_temp, mut conn) = create_test_db();

    insert(&mut conn, "listing_rhel4_part1.yaml", ApplyMode::commit());
    let id = product_id(&conn, "RHEL-4", "6.0", "AS");
    assert_eq!(stored(&conn, id).len(), 16);
    let mapped = BTreeSet::from([46533, 5900, 5899, 51630, 5558]);
    assert_eq!(tree_ids(&conn, id), mapped);

    let report = insert(&mut conn, "listing_rhel4_part2.yaml", ApplyMode::commit());
    assert_eq!(report.stats.products_inserted, 0);
    assert_eq!(report.stats.overrides_inserted, 2);
    assert_eq!(report.stats.overrides_deleted, 6);

    assert_eq!(product_id(&conn, "RHEL-4", "6.0", "AS"), id);
    let rows = stored(&conn, id);
    assert_eq!(rows.len(), 12);
    assert!(rows.contains(&t("xmlstarlet", "ia64", "ia64")));
    assert!(rows.contains(&t("xmlstarlet", "src", "ia64")));
    assert!(!rows.contains(&t("xmlstarlet", "aarch64", "aarch64")));
    assert!(!rows.contains(&t("console-login-helper-messages", "noarch", "ppc64le")));
    assert!(!rows.contains(&t("console-login-helper-messages", "src", "s390x")));
    assert_eq!(tree_ids(&conn, id), mapped);
}

#[test]
fn test_eight_rows_minus_four() {
    let (_temp, mut conn) = create_test_db();

    insert(&mut conn, "listing_ose.yaml", ApplyMode::commit());
    let report = insert(&mut conn, "listing_ose_trimmed.yaml", ApplyMode::commit());
    assert_eq!(report.stats.overrides_inserted, 0);
    assert_eq!(report.stats.overrides_deleted, 4);
    assert_eq!(report.reconciliation.unchanged().count(), 4);

    let id = product_id(&conn, "RHEL-7-OSE-3.5", "3.5", "Server-RH7-RHOSE-3.5");
    assert_eq!(
        stored(&conn, id),
        BTreeSet::from([
            t("ansible", "x86_64", "x86_64"),
            t("ansible", "src", "x86_64"),
            t("cockpit", "src", "x86_64"),
            t("nodejs-chalk", "noarch", "x86_64"),
        ])
    );
}

#[test]
fn test_complete_package_replacement() {
    let (_temp, mut conn) = create_test_db();

    insert(&mut conn, "listing_replacement_part1.yaml", ApplyMode::commit());
    let id = product_id(&conn, "xmlstarlet", "4.5", "Cluster");
    assert_eq!(stored(&conn, id).len(), 3);

    let report = insert(&mut conn, "listing_replacement_part2.yaml", ApplyMode::commit());
    assert_eq!(report.reconciliation.unchanged().count(), 0);
    assert_eq!(report.stats.overrides_deleted, 3);

    assert_eq!(
        stored(&conn, id),
        BTreeSet::from([
            t("libxml2", "ppc64le", "ppc64le"),
            t("libxml2", "src", "ppc64le"),
            t("glibc", "i686", "x86_64"),
        ])
    );
    // Mappings of architectures no longer offered stay behind
    assert_eq!(tree_ids(&conn, id), BTreeSet::from([5558, 5900, 46533]));
}

#[test]
fn test_second_pass_is_noop() {
    let (_temp, mut conn) = create_test_db();

    let first = insert(&mut conn, "listing_rhel4_part1.yaml", ApplyMode::commit());
    assert!(first.stats.mutations() > 0);

    let second = insert(&mut conn, "listing_rhel4_part1.yaml", ApplyMode::commit());
    assert_eq!(second.stats.mutations(), 0);
    assert!(second.reconciliation.is_noop());
    assert_eq!(second.stats.already_present, 1 + 16 + 16);
}

#[test]
fn test_preview_leaves_database_untouched() {
    let (_temp, mut conn) = create_test_db();

    let report = insert(&mut conn, "listing_ose.yaml", ApplyMode::preview());
    assert_eq!(report.product_id, ProductId::Pending);
    assert_eq!(report.stats.products_inserted, 1);
    assert_eq!(report.stats.overrides_inserted, 8);
    assert!(
        Product::find_by_listing(&conn, "RHEL-7-OSE-3.5", "3.5", "Server-RH7-RHOSE-3.5")
            .unwrap()
            .is_empty()
    );

    insert(&mut conn, "listing_ose.yaml", ApplyMode::commit());
    let preview = insert(&mut conn, "listing_ose_trimmed.yaml", ApplyMode::preview().quiet());
    assert_eq!(preview.stats.overrides_deleted, 4);

    let id = product_id(&conn, "RHEL-7-OSE-3.5", "3.5", "Server-RH7-RHOSE-3.5");
    assert_eq!(stored(&conn, id).len(), 8);
}

#[test]
fn test_generate_reproduces_listing() {
    let (_temp, mut conn) = create_test_db();
    insert(&mut conn, "listing_rhel4_part2.yaml", ApplyMode::commit());

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("generated/rhel4.yaml");
    pipeline::generate_file(&conn, &out, "RHEL-4", "6.0", "AS").unwrap();

    let input = Listing::from_yaml_str(
        &std::fs::read_to_string(data("listing_rhel4_part2.yaml")).unwrap(),
        "input",
    )
    .unwrap();
    let output = Listing::from_yaml_str(&std::fs::read_to_string(&out).unwrap(), "output").unwrap();

    assert_eq!(output.product_name, input.product_name);
    assert_eq!(output.version, input.version);
    assert_eq!(output.variant, input.variant);
    let expected: BTreeSet<_> = expand_listing(&input).into_iter().collect();
    let actual: BTreeSet<_> = expand_listing(&output).into_iter().collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_generate_product_without_packages() {
    let (_temp, mut conn) = create_test_db();
    insert(&mut conn, "listing_no_packages.yaml", ApplyMode::commit());

    let listing = pipeline::generate_listing(&conn, "konami", "2.0", "6Server-Konami").unwrap();
    assert!(listing.packages.is_none());
    assert!(!listing.to_yaml().unwrap().contains("packages"));
}

#[test]
fn test_generate_unknown_product() {
    let (_temp, conn) = create_test_db();
    let result = pipeline::generate_listing(&conn, "RHEL-4", "6.0", "AS");
    assert!(matches!(result, Err(Error::ListingNotFound { .. })));
}

#[test]
fn test_stored_source_row_on_src_product_arch() {
    let (_temp, mut conn) = create_test_db();
    let product = Product::new("odd".to_string(), "1.0".to_string(), "Src".to_string(), false);
    let id = conn.insert_product(&product).unwrap();
    conn.insert_override(&Override::new("bash".to_string(), "src".to_string(), "src".to_string(), id))
        .unwrap();

    let listing = pipeline::generate_listing(&conn, "odd", "1.0", "Src").unwrap();
    let packages = listing.packages.unwrap();
    assert_eq!(packages["bash"].src, vec!["src"]);
    assert!(packages["bash"].arch.is_empty());
}

/// Store wrapper counting every call that reaches the database
struct CountingStore {
    inner: Connection,
    calls: Cell<usize>,
}

impl CountingStore {
    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }
}

impl ListingStore for CountingStore {
    fn product_exists(&self, product: &Product) -> prodlisting::Result<bool> {
        self.tick();
        self.inner.product_exists(product)
    }

    fn find_product_id(&self, product: &Product) -> prodlisting::Result<Option<i64>> {
        self.tick();
        self.inner.find_product_id(product)
    }

    fn insert_product(&mut self, product: &Product) -> prodlisting::Result<i64> {
        self.tick();
        self.inner.insert_product(product)
    }

    fn find_products(&self, label: &str, version: &str, variant: &str) -> prodlisting::Result<Vec<Product>> {
        self.tick();
        self.inner.find_products(label, version, variant)
    }

    fn overrides_for_product(&self, product_id: i64) -> prodlisting::Result<Vec<Override>> {
        self.tick();
        self.inner.overrides_for_product(product_id)
    }

    fn override_exists(&self, ov: &Override) -> prodlisting::Result<bool> {
        self.tick();
        self.inner.override_exists(ov)
    }

    fn insert_override(&mut self, ov: &Override) -> prodlisting::Result<()> {
        self.tick();
        self.inner.insert_override(ov)
    }

    fn delete_override(&mut self, ov: &Override) -> prodlisting::Result<usize> {
        self.tick();
        self.inner.delete_override(ov)
    }

    fn tree_mapping_exists(&self, mapping: &TreeProductMapping) -> prodlisting::Result<bool> {
        self.tick();
        self.inner.tree_mapping_exists(mapping)
    }

    fn insert_tree_mapping(&mut self, mapping: &TreeProductMapping) -> prodlisting::Result<()> {
        self.tick();
        self.inner.insert_tree_mapping(mapping)
    }
}

#[test]
fn test_invalid_listing_never_reaches_store() {
    let mut store = CountingStore {
        inner: db::open_memory().unwrap(),
        calls: Cell::new(0),
    };
    let schema = Schema::builtin().unwrap();

    let result = pipeline::insert_file(
        &mut store,
        &data("listing_missing_name.yaml"),
        &schema,
        ApplyMode::commit(),
    );
    match result {
        Err(Error::InvalidListing(errors)) => {
            assert_eq!(errors.get("product_name").unwrap(), ["required field"]);
        }
        other => panic!("expected InvalidListing, got {:?}", other.map(|r| r.stats)),
    }
    assert_eq!(store.calls.get(), 0);

    // A valid listing goes through the same store
    pipeline::insert_file(&mut store, &data("listing_noarch.yaml"), &schema, ApplyMode::commit())
        .unwrap();
    assert!(store.calls.get() > 0);
}

#[test]
fn test_validate_fixture_files() {
    let schema = Schema::builtin().unwrap();
    for name in [
        "listing_ose.yaml",
        "listing_ose_trimmed.yaml",
        "listing_noarch.yaml",
        "listing_no_packages.yaml",
        "listing_rhel4_part1.yaml",
        "listing_rhel4_part2.yaml",
        "listing_replacement_part1.yaml",
        "listing_replacement_part2.yaml",
    ] {
        let errors = pipeline::validate_file(&data(name), &schema).unwrap();
        assert!(errors.is_empty(), "{} should pass:\n{}", name, errors);
    }

    let errors = pipeline::validate_file(&data("listing_missing_name.yaml"), &schema).unwrap();
    assert_eq!(errors.len(), 1);
}
