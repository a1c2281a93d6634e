// src/db/models.rs

//! Data models for the listings database
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, and deleting records.
//! Rows are never updated in place.

use crate::error::Result;
use crate::expand::OverrideTriple;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A Product is one (label, version, variant, allow_source_only) listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: Option<i64>,
    pub label: String,
    pub version: String,
    pub variant: String,
    pub allow_source_only: bool,
}

impl Product {
    /// Create a new Product
    pub fn new(label: String, version: String, variant: String, allow_source_only: bool) -> Self {
        Self {
            id: None,
            label,
            version,
            variant,
            allow_source_only,
        }
    }

    /// Insert this product into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO products (label, version, variant, allow_source_only)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.label,
                &self.version,
                &self.variant,
                &self.allow_source_only,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Check whether a row with this exact natural key exists
    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM products
                WHERE label = ?1 AND version = ?2 AND variant = ?3 AND allow_source_only = ?4)",
            params![
                &self.label,
                &self.version,
                &self.variant,
                &self.allow_source_only,
            ],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Find the id of the row matching this natural key (lowest id wins)
    pub fn find_id(&self, conn: &Connection) -> Result<Option<i64>> {
        let id = conn
            .query_row(
                "SELECT id FROM products
                 WHERE label = ?1 AND version = ?2 AND variant = ?3 AND allow_source_only = ?4
                 ORDER BY id LIMIT 1",
                params![
                    &self.label,
                    &self.version,
                    &self.variant,
                    &self.allow_source_only,
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Find products by label, version and variant, regardless of allow_source_only
    pub fn find_by_listing(
        conn: &Connection,
        label: &str,
        version: &str,
        variant: &str,
    ) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, label, version, variant, allow_source_only FROM products
             WHERE label = ?1 AND version = ?2 AND variant = ?3
             ORDER BY id",
        )?;

        let products = stmt
            .query_map([label, version, variant], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(products)
    }

    /// Convert a database row to a Product
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            label: row.get(1)?,
            version: row.get(2)?,
            variant: row.get(3)?,
            allow_source_only: row.get(4)?,
        })
    }
}

/// An Override offers a package built for `pkg_arch` on `product_arch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub name: String,
    pub pkg_arch: String,
    pub product_arch: String,
    pub product: i64,
    pub include: bool,
}

impl Override {
    /// Create a new included Override
    pub fn new(name: String, pkg_arch: String, product_arch: String, product: i64) -> Self {
        Self {
            name,
            pkg_arch,
            product_arch,
            product,
            include: true,
        }
    }

    /// Build an included Override for a triple of a stored product
    pub fn from_triple(triple: &OverrideTriple, product: i64) -> Self {
        Self::new(
            triple.name.clone(),
            triple.pkg_arch.clone(),
            triple.product_arch.clone(),
            product,
        )
    }

    /// The (name, pkg_arch, product_arch) part of this row
    pub fn triple(&self) -> OverrideTriple {
        OverrideTriple::new(&self.name, &self.pkg_arch, &self.product_arch)
    }

    /// Insert this override into the database
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO overrides (name, pkg_arch, product_arch, product, include)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &self.name,
                &self.pkg_arch,
                &self.product_arch,
                &self.product,
                &self.include,
            ],
        )?;
        Ok(())
    }

    /// Check whether a row with the same (name, pkg_arch, product_arch, product) exists
    ///
    /// The include flag is not part of the identity.
    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM overrides
                WHERE name = ?1 AND pkg_arch = ?2 AND product_arch = ?3 AND product = ?4)",
            params![&self.name, &self.pkg_arch, &self.product_arch, &self.product],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Find all overrides of a product
    pub fn find_by_product(conn: &Connection, product: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT name, pkg_arch, product_arch, product, include FROM overrides
             WHERE product = ?1
             ORDER BY name, pkg_arch, product_arch",
        )?;

        let overrides = stmt
            .query_map([product], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(overrides)
    }

    /// Delete the rows matching this override's identity, returning how many went
    pub fn delete(&self, conn: &Connection) -> Result<usize> {
        let deleted = conn.execute(
            "DELETE FROM overrides
             WHERE name = ?1 AND pkg_arch = ?2 AND product_arch = ?3 AND product = ?4",
            params![&self.name, &self.pkg_arch, &self.product_arch, &self.product],
        )?;
        Ok(deleted)
    }

    /// Convert a database row to an Override
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            pkg_arch: row.get(1)?,
            product_arch: row.get(2)?,
            product: row.get(3)?,
            include: row.get(4)?,
        })
    }
}

/// Records that a product offers the architecture tree `tree_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeProductMapping {
    pub tree_id: i64,
    pub product_id: i64,
}

impl TreeProductMapping {
    /// Create a new TreeProductMapping
    pub fn new(tree_id: i64, product_id: i64) -> Self {
        Self {
            tree_id,
            product_id,
        }
    }

    /// Insert this mapping into the database
    pub fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO tree_product_map (tree_id, product_id) VALUES (?1, ?2)",
            [self.tree_id, self.product_id],
        )?;
        Ok(())
    }

    /// Check whether this mapping already exists
    pub fn exists(&self, conn: &Connection) -> Result<bool> {
        let exists = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tree_product_map WHERE tree_id = ?1 AND product_id = ?2)",
            [self.tree_id, self.product_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Find all mappings of a product
    pub fn find_by_product(conn: &Connection, product_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT tree_id, product_id FROM tree_product_map WHERE product_id = ?1 ORDER BY tree_id",
        )?;

        let mappings = stmt
            .query_map([product_id], |row| {
                Ok(Self {
                    tree_id: row.get(0)?,
                    product_id: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(mappings)
    }
}
