// src/apply.rs

//! Mutation application
//!
//! Every statement a reconciliation pass issues goes through an [`Applier`].
//! Reads always run. Writes run only in commit mode; otherwise they are
//! logged as "Would have executed" and counted as if they had succeeded, so
//! a preview reports the same numbers a commit would.
//!
//! Inserts are always preceded by an existence check. An existing row is
//! logged as already present and left alone, which makes a second pass with
//! the same input a no-op.

use crate::arch;
use crate::db::ListingStore;
use crate::db::models::{Override, Product, TreeProductMapping};
use crate::error::{Error, Result};
use crate::expand::OverrideTriple;
use crate::reconcile::{ProductId, Reconciliation};
use std::fmt;
use tracing::{debug, info, warn};

/// How writes are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyMode {
    /// Execute writes instead of only logging them
    pub commit: bool,
    /// Do not log read-only statements
    pub changes_only: bool,
}

impl ApplyMode {
    /// Log writes without executing them
    pub fn preview() -> Self {
        Self::default()
    }

    /// Execute writes
    pub fn commit() -> Self {
        Self {
            commit: true,
            changes_only: false,
        }
    }

    /// Same mode, but only mutations are logged
    pub fn quiet(self) -> Self {
        Self {
            changes_only: true,
            ..self
        }
    }
}

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub products_inserted: usize,
    pub overrides_inserted: usize,
    pub overrides_deleted: usize,
    pub mappings_inserted: usize,
    /// Inserts skipped because the row was already there
    pub already_present: usize,
    /// Desired triples whose product arch has no tree id
    pub unmapped_arches: usize,
}

impl ApplyStats {
    /// Number of writes issued (or that would have been issued)
    pub fn mutations(&self) -> usize {
        self.products_inserted + self.overrides_inserted + self.overrides_deleted + self.mappings_inserted
    }
}

impl fmt::Display for ApplyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} product(s) inserted, {} override(s) inserted, {} override(s) deleted, \
             {} tree mapping(s) inserted, {} row(s) already present",
            self.products_inserted,
            self.overrides_inserted,
            self.overrides_deleted,
            self.mappings_inserted,
            self.already_present
        )
    }
}

/// A statement as it appears in the log
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    ProductExists(&'a Product),
    SelectProductId(&'a Product),
    SelectOverrides(i64),
    OverrideExists(&'a OverrideTriple, i64),
    TreeMappingExists(TreeProductMapping),
    InsertProduct(&'a Product),
    InsertOverride(&'a OverrideTriple, ProductId),
    DeleteOverride(&'a OverrideTriple, i64),
    InsertTreeMapping(i64, ProductId),
}

impl Statement<'_> {
    /// Whether this statement changes the store
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Statement::InsertProduct(_)
                | Statement::InsertOverride(..)
                | Statement::DeleteOverride(..)
                | Statement::InsertTreeMapping(..)
        )
    }
}

impl fmt::Display for Statement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::ProductExists(p) => write!(
                f,
                "SELECT EXISTS(SELECT 1 FROM products WHERE label = '{}' AND version = '{}' AND variant = '{}' AND allow_source_only = {})",
                p.label, p.version, p.variant, p.allow_source_only
            ),
            Statement::SelectProductId(p) => write!(
                f,
                "SELECT id FROM products WHERE label = '{}' AND version = '{}' AND variant = '{}' AND allow_source_only = {} ORDER BY id",
                p.label, p.version, p.variant, p.allow_source_only
            ),
            Statement::SelectOverrides(id) => {
                write!(f, "SELECT * FROM overrides WHERE product = {}", id)
            }
            Statement::OverrideExists(t, id) => write!(
                f,
                "SELECT EXISTS(SELECT 1 FROM overrides WHERE name = '{}' AND pkg_arch = '{}' AND product_arch = '{}' AND product = {})",
                t.name, t.pkg_arch, t.product_arch, id
            ),
            Statement::TreeMappingExists(m) => write!(
                f,
                "SELECT EXISTS(SELECT 1 FROM tree_product_map WHERE tree_id = {} AND product_id = {})",
                m.tree_id, m.product_id
            ),
            Statement::InsertProduct(p) => write!(
                f,
                "INSERT INTO products (label, version, variant, allow_source_only) VALUES ('{}', '{}', '{}', {})",
                p.label, p.version, p.variant, p.allow_source_only
            ),
            Statement::InsertOverride(t, id) => write!(
                f,
                "INSERT INTO overrides (name, pkg_arch, product_arch, product, include) VALUES ('{}', '{}', '{}', {}, true)",
                t.name, t.pkg_arch, t.product_arch, id
            ),
            Statement::DeleteOverride(t, id) => write!(
                f,
                "DELETE FROM overrides WHERE name = '{}' AND pkg_arch = '{}' AND product_arch = '{}' AND product = {}",
                t.name, t.pkg_arch, t.product_arch, id
            ),
            Statement::InsertTreeMapping(tree_id, id) => write!(
                f,
                "INSERT INTO tree_product_map (tree_id, product_id) VALUES ({}, {})",
                tree_id, id
            ),
        }
    }
}

fn require_stored(product: ProductId) -> Result<i64> {
    product
        .stored()
        .ok_or_else(|| Error::StoreFailure("product has no id; it was never inserted".to_string()))
}

/// Issues the reads and writes of a reconciliation pass against a store
pub struct Applier<'s, S: ListingStore + ?Sized> {
    store: &'s mut S,
    mode: ApplyMode,
    stats: ApplyStats,
}

impl<'s, S: ListingStore + ?Sized> Applier<'s, S> {
    pub fn new(store: &'s mut S, mode: ApplyMode) -> Self {
        Self {
            store,
            mode,
            stats: ApplyStats::default(),
        }
    }

    pub fn stats(&self) -> &ApplyStats {
        &self.stats
    }

    pub fn into_stats(self) -> ApplyStats {
        self.stats
    }

    fn log_read(&self, statement: &Statement<'_>) {
        if !self.mode.changes_only {
            info!("Executing: {}", statement);
        }
    }

    /// Run a write in commit mode, log it in preview mode
    fn write<F>(&mut self, statement: Statement<'_>, op: F) -> Result<()>
    where
        F: FnOnce(&mut S) -> Result<()>,
    {
        debug_assert!(statement.is_mutation());
        if self.mode.commit {
            info!("Executing: {}", statement);
            op(&mut *self.store)
        } else {
            info!("Would have executed: {}", statement);
            Ok(())
        }
    }

    /// Insert the product unless a row with the same natural key exists
    pub fn ensure_product(&mut self, product: &Product) -> Result<()> {
        self.log_read(&Statement::ProductExists(product));
        if self.store.product_exists(product)? {
            info!(
                "DB already has an entry in products table where label='{}' and version='{}' and variant='{}' and allow_source_only='{}'. No insert will be executed.",
                product.label, product.version, product.variant, product.allow_source_only
            );
            self.stats.already_present += 1;
            return Ok(());
        }

        self.write(Statement::InsertProduct(product), |store| {
            store.insert_product(product).map(|_| ())
        })?;
        self.stats.products_inserted += 1;
        Ok(())
    }

    /// Resolve the product's id
    ///
    /// In preview mode a product that does not exist yet resolves to
    /// [`ProductId::Pending`]. In commit mode it must exist.
    pub fn product_id(&mut self, product: &Product) -> Result<ProductId> {
        self.log_read(&Statement::SelectProductId(product));
        match self.store.find_product_id(product)? {
            Some(id) => Ok(ProductId::Stored(id)),
            None if self.mode.commit => Err(Error::StoreFailure(format!(
                "product '{}' version {} variant {} not found after insert",
                product.label, product.version, product.variant
            ))),
            None => {
                info!(
                    "No entry exists yet, using a pending product ID. In commit mode all occurrences of product ID would use the real ID."
                );
                Ok(ProductId::Pending)
            }
        }
    }

    /// Triples currently stored for the product
    pub fn stored_overrides(&mut self, product: ProductId) -> Result<Vec<OverrideTriple>> {
        let Some(id) = product.stored() else {
            debug!("Product is not stored yet; no overrides to load");
            return Ok(Vec::new());
        };

        self.log_read(&Statement::SelectOverrides(id));
        let rows = self.store.overrides_for_product(id)?;
        debug!("Query returned {} override row(s)", rows.len());
        Ok(rows.iter().map(Override::triple).collect())
    }

    /// Insert an override unless it already exists
    pub fn ensure_override(&mut self, triple: &OverrideTriple, product: ProductId) -> Result<()> {
        if let Some(id) = product.stored() {
            self.log_read(&Statement::OverrideExists(triple, id));
            if self.store.override_exists(&Override::from_triple(triple, id))? {
                info!(
                    "Package listing already exists in overrides table where name='{}' and pkg_arch='{}' and product_arch='{}' and product={}. No insert will be executed.",
                    triple.name, triple.pkg_arch, triple.product_arch, id
                );
                self.stats.already_present += 1;
                return Ok(());
            }
        }

        self.write(Statement::InsertOverride(triple, product), |store| {
            store.insert_override(&Override::from_triple(triple, require_stored(product)?))
        })?;
        self.stats.overrides_inserted += 1;
        Ok(())
    }

    /// Record that the product offers `product_arch`, unless already recorded
    pub fn ensure_tree_mapping(&mut self, product_arch: &str, product: ProductId) -> Result<()> {
        let Some(tree_id) = arch::tree_id_for(product_arch) else {
            warn!(
                "No tree id known for architecture '{}' (known: {}); skipping tree product mapping",
                product_arch,
                arch::known_arches().collect::<Vec<_>>().join(", ")
            );
            self.stats.unmapped_arches += 1;
            return Ok(());
        };

        if let Some(id) = product.stored() {
            let mapping = TreeProductMapping::new(tree_id, id);
            self.log_read(&Statement::TreeMappingExists(mapping));
            if self.store.tree_mapping_exists(&mapping)? {
                info!(
                    "Tree product mapping already exists where tree_id='{}' and product_id='{}'. No insert will be executed.",
                    tree_id, id
                );
                self.stats.already_present += 1;
                return Ok(());
            }
        }

        self.write(Statement::InsertTreeMapping(tree_id, product), |store| {
            store.insert_tree_mapping(&TreeProductMapping::new(tree_id, require_stored(product)?))
        })?;
        self.stats.mappings_inserted += 1;
        Ok(())
    }

    /// Delete a stored override that is no longer desired
    pub fn delete_override(&mut self, triple: &OverrideTriple, product: ProductId) -> Result<()> {
        let id = require_stored(product)?;
        self.write(Statement::DeleteOverride(triple, id), |store| {
            store
                .delete_override(&Override::from_triple(triple, id))
                .map(|_| ())
        })?;
        self.stats.overrides_deleted += 1;
        Ok(())
    }

    /// Apply a whole reconciliation
    ///
    /// Every desired triple gets an existence-checked insert plus its tree
    /// mapping; every stale triple is deleted afterwards. Tree mappings are
    /// never removed, even when no override uses their architecture anymore.
    pub fn apply(&mut self, product: ProductId, reconciliation: &Reconciliation) -> Result<()> {
        for triple in reconciliation.desired() {
            self.ensure_override(triple, product)?;
            self.ensure_tree_mapping(&triple.product_arch, product)?;
        }

        for triple in reconciliation.to_delete() {
            self.delete_override(triple, product)?;
        }

        Ok(())
    }
}
