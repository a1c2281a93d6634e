// src/db/mod.rs

//! Database layer for prodlisting
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema creation
//! - Connection management
//! - The [`ListingStore`] operations the reconciler and exporter need

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use models::{Override, Product, TreeProductMapping};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Initialize a new listings database at the specified path
///
/// Creates the database file and applies all schema migrations.
/// This is idempotent - calling it on an existing database is safe.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Initializing database at: {}", db_path);

    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing listings database
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    Ok(conn)
}

/// Open a fresh in-memory database with the full schema
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Storage operations used by a reconciliation pass and by the exporter
///
/// Every write is preceded by the matching existence check in the caller;
/// implementations must not turn inserts into upserts.
pub trait ListingStore {
    /// Does a product with this exact natural key exist?
    fn product_exists(&self, product: &Product) -> Result<bool>;

    /// Id of the product with this exact natural key
    fn find_product_id(&self, product: &Product) -> Result<Option<i64>>;

    /// Insert a product and return its new id
    fn insert_product(&mut self, product: &Product) -> Result<i64>;

    /// Products matching label, version and variant, lowest id first
    fn find_products(&self, label: &str, version: &str, variant: &str) -> Result<Vec<Product>>;

    /// All override rows of a product
    fn overrides_for_product(&self, product_id: i64) -> Result<Vec<Override>>;

    fn override_exists(&self, ov: &Override) -> Result<bool>;

    fn insert_override(&mut self, ov: &Override) -> Result<()>;

    /// Delete rows sharing the override's identity; returns the number removed
    fn delete_override(&mut self, ov: &Override) -> Result<usize>;

    fn tree_mapping_exists(&self, mapping: &TreeProductMapping) -> Result<bool>;

    fn insert_tree_mapping(&mut self, mapping: &TreeProductMapping) -> Result<()>;
}

impl ListingStore for Connection {
    fn product_exists(&self, product: &Product) -> Result<bool> {
        product.exists(self)
    }

    fn find_product_id(&self, product: &Product) -> Result<Option<i64>> {
        product.find_id(self)
    }

    fn insert_product(&mut self, product: &Product) -> Result<i64> {
        product.clone().insert(self)
    }

    fn find_products(&self, label: &str, version: &str, variant: &str) -> Result<Vec<Product>> {
        Product::find_by_listing(self, label, version, variant)
    }

    fn overrides_for_product(&self, product_id: i64) -> Result<Vec<Override>> {
        Override::find_by_product(self, product_id)
    }

    fn override_exists(&self, ov: &Override) -> Result<bool> {
        ov.exists(self)
    }

    fn insert_override(&mut self, ov: &Override) -> Result<()> {
        ov.insert(self)
    }

    fn delete_override(&mut self, ov: &Override) -> Result<usize> {
        ov.delete(self)
    }

    fn tree_mapping_exists(&self, mapping: &TreeProductMapping) -> Result<bool> {
        mapping.exists(self)
    }

    fn insert_tree_mapping(&mut self, mapping: &TreeProductMapping) -> Result<()> {
        mapping.insert(self)
    }
}
