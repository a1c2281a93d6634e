// src/pipeline.rs

//! Top-level listing operations
//!
//! - insert: validate → expand → reconcile → apply
//! - generate: look up product → export → write YAML
//! - validate: schema check only

use crate::apply::{ApplyMode, ApplyStats, Applier};
use crate::db::ListingStore;
use crate::db::models::{Override, Product};
use crate::error::{Error, Result};
use crate::expand::expand_listing;
use crate::export::export_listing;
use crate::listing::{self, Listing};
use crate::reconcile::{ProductId, Reconciliation, reconcile};
use crate::validate::{Schema, ValidationErrors};
use serde_yml::Value;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of one insert pass
#[derive(Debug, Clone)]
pub struct InsertReport {
    pub product: Product,
    pub product_id: ProductId,
    pub reconciliation: Reconciliation,
    pub stats: ApplyStats,
}

/// Validate a document, returning every field-level error found
pub fn validate_document(document: &Value, schema: &Schema) -> ValidationErrors {
    schema.validate(document)
}

/// Validate the listing file at `path`
pub fn validate_file(path: &Path, schema: &Schema) -> Result<ValidationErrors> {
    let document = listing::read_document(path)?;
    Ok(validate_document(&document, schema))
}

/// Validate a raw document and reconcile the store with it
///
/// Validation happens before the store is touched; an invalid document
/// fails with [`Error::InvalidListing`] and no store call is made.
pub fn insert_listing<S>(
    store: &mut S,
    document: Value,
    schema: &Schema,
    mode: ApplyMode,
    origin: &str,
) -> Result<InsertReport>
where
    S: ListingStore + ?Sized,
{
    schema.check(&document)?;
    let listing = Listing::from_value(document, origin)?;
    sync_listing(store, &listing, mode)
}

/// Read the listing file at `path` and check it against the schema
///
/// Needs no store, so callers can reject a bad file before opening one.
pub fn load_listing(path: &Path, schema: &Schema) -> Result<Listing> {
    let document = listing::read_document(path)?;
    schema.check(&document)?;
    Listing::from_value(document, &path.display().to_string())
}

/// Read, validate and apply the listing file at `path`
pub fn insert_file<S>(store: &mut S, path: &Path, schema: &Schema, mode: ApplyMode) -> Result<InsertReport>
where
    S: ListingStore + ?Sized,
{
    let listing = load_listing(path, schema)?;
    sync_listing(store, &listing, mode)
}

/// Make the stored overrides of the listing's product match the listing
pub fn sync_listing<S>(store: &mut S, listing: &Listing, mode: ApplyMode) -> Result<InsertReport>
where
    S: ListingStore + ?Sized,
{
    let product = listing.product();
    let desired = expand_listing(listing);
    debug!(
        "Listing for {} {} {} expands to {} override(s)",
        product.label,
        product.version,
        product.variant,
        desired.len()
    );

    let mut applier = Applier::new(store, mode);
    applier.ensure_product(&product)?;
    let product_id = applier.product_id(&product)?;

    let stored = applier.stored_overrides(product_id)?;
    let reconciliation = reconcile(stored, &desired);
    debug!(
        "Reconciliation: {} unchanged, {} to insert, {} to delete",
        reconciliation.unchanged().count(),
        reconciliation.to_insert().count(),
        reconciliation.to_delete().count()
    );

    applier.apply(product_id, &reconciliation)?;
    let stats = applier.into_stats();

    if mode.commit {
        info!("Applied: {}", stats);
    } else {
        info!("Preview only, nothing was written: {}", stats);
    }
    if stats.unmapped_arches > 0 {
        warn!(
            "{} override(s) use an architecture without a tree id",
            stats.unmapped_arches
        );
    }

    Ok(InsertReport {
        product,
        product_id,
        reconciliation,
        stats,
    })
}

/// Build the listing of a stored product
///
/// Several products can share label, version and variant when they differ
/// only in `allow_source_only`. Their overrides are exported together; the
/// header fields come from the one with the lowest id.
pub fn generate_listing<S>(store: &S, label: &str, version: &str, variant: &str) -> Result<Listing>
where
    S: ListingStore + ?Sized,
{
    let products = store.find_products(label, version, variant)?;
    let Some(header) = products.first() else {
        return Err(Error::ListingNotFound {
            label: label.to_string(),
            version: version.to_string(),
            variant: variant.to_string(),
        });
    };

    if products.len() > 1 {
        warn!(
            "{} products match {} {} {}; exporting the overrides of all of them",
            products.len(),
            label,
            version,
            variant
        );
    }

    let mut rows = Vec::new();
    for product in &products {
        let id = product
            .id
            .ok_or_else(|| Error::StoreFailure("stored product has no id".to_string()))?;
        let found = store.overrides_for_product(id)?;
        debug!("Product {} has {} override row(s)", id, found.len());
        rows.extend(found);
    }

    // The same triple may be stored under more than one product
    rows.sort_by_key(Override::triple);
    rows.dedup_by(|a, b| a.triple() == b.triple());

    Ok(export_listing(header, &rows))
}

/// Export a stored product and write it to `path`
pub fn generate_file<S>(
    store: &S,
    path: &Path,
    label: &str,
    version: &str,
    variant: &str,
) -> Result<Listing>
where
    S: ListingStore + ?Sized,
{
    let listing = generate_listing(store, label, version, variant)?;
    listing::write_listing(path, &listing)?;
    info!("Wrote {} package(s) to {}", listing.package_count(), path.display());
    Ok(listing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const CLUSTER: &str = "\
product_name: xmlstarlet
version: 4.5
variant: Cluster
allow_source_only: false
packages:
  xmlstarlet:
    arch: [aarch64, x86_64]
    src: [x86_64]
";

    fn document(yaml: &str) -> Value {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_insert_then_generate() {
        let mut conn = db::open_memory().unwrap();
        let schema = Schema::builtin().unwrap();

        let report =
            insert_listing(&mut conn, document(CLUSTER), &schema, ApplyMode::commit(), "test").unwrap();
        assert!(matches!(report.product_id, ProductId::Stored(_)));
        assert_eq!(report.stats.products_inserted, 1);
        assert_eq!(report.stats.overrides_inserted, 3);
        assert_eq!(report.stats.mappings_inserted, 2);

        let listing = generate_listing(&conn, "xmlstarlet", "4.5", "Cluster").unwrap();
        let packages = listing.packages.unwrap();
        assert_eq!(packages["xmlstarlet"].arch, vec!["aarch64", "x86_64"]);
        assert_eq!(packages["xmlstarlet"].src, vec!["x86_64"]);
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        let mut conn = db::open_memory().unwrap();
        let schema = Schema::builtin().unwrap();
        let result = insert_listing(
            &mut conn,
            document("version: 1.0\nvariant: a\nallow_source_only: false\n"),
            &schema,
            ApplyMode::commit(),
            "test",
        );

        match result {
            Err(Error::InvalidListing(errors)) => assert!(errors.get("product_name").is_some()),
            other => panic!("expected InvalidListing, got {:?}", other.map(|r| r.stats)),
        }
    }

    #[test]
    fn test_generate_unknown_product() {
        let conn = db::open_memory().unwrap();
        let result = generate_listing(&conn, "nope", "1.0", "none");
        assert!(matches!(result, Err(Error::ListingNotFound { .. })));
    }

    #[test]
    fn test_generate_merges_products_differing_in_source_flag() {
        let mut conn = db::open_memory().unwrap();
        let binary = Product::new("p".to_string(), "1.0".to_string(), "v".to_string(), false);
        let mut source_only = binary.clone();
        source_only.allow_source_only = true;

        let binary_id = conn.insert_product(&binary).unwrap();
        let source_id = conn.insert_product(&source_only).unwrap();
        for (name, id) in [("bash", binary_id), ("zsh", source_id), ("bash", source_id)] {
            conn.insert_override(&Override::new(
                name.to_string(),
                "x86_64".to_string(),
                "x86_64".to_string(),
                id,
            ))
            .unwrap();
        }

        let listing = generate_listing(&conn, "p", "1.0", "v").unwrap();
        assert!(!listing.allow_source_only);
        let packages = listing.packages.unwrap();
        assert_eq!(packages.keys().collect::<Vec<_>>(), vec!["bash", "zsh"]);
        assert_eq!(packages["bash"].arch, vec!["x86_64"]);
        assert_eq!(packages["zsh"].arch, vec!["x86_64"]);
    }

    #[test]
    fn test_preview_of_new_product() {
        let mut conn = db::open_memory().unwrap();
        let listing = Listing::from_yaml_str(CLUSTER, "test").unwrap();

        let report = sync_listing(&mut conn, &listing, ApplyMode::preview().quiet()).unwrap();
        assert_eq!(report.product_id, ProductId::Pending);
        assert_eq!(report.stats.overrides_inserted, 3);
        assert!(Product::find_by_listing(&conn, "xmlstarlet", "4.5", "Cluster")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_generate_file_writes_yaml() {
        let mut conn = db::open_memory().unwrap();
        let listing = Listing::from_yaml_str(CLUSTER, "test").unwrap();
        sync_listing(&mut conn, &listing, ApplyMode::commit()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/xmlstarlet.yaml");
        generate_file(&conn, &path, "xmlstarlet", "4.5", "Cluster").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("---"));
        let back = Listing::from_yaml_str(&contents, "test").unwrap();
        assert_eq!(back, listing);
    }
}
