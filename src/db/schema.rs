// src/db/schema.rs

//! Database schema definitions and migrations for the listings database
//!
//! This module defines the SQLite schema for the products, overrides and
//! tree-product mapping tables and provides a migration system to evolve the
//! schema over time.

use crate::error::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - products: One row per (label, version, variant, allow_source_only)
/// - overrides: Package offerings of a product
/// - tree_product_map: Architectures offered by a product, through tree ids
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- Products: identified by their natural key, never updated in place
        CREATE TABLE products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL,
            version TEXT NOT NULL,
            variant TEXT NOT NULL,
            allow_source_only INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_products_listing ON products(label, version, variant);

        -- Overrides: package X built for pkg_arch is offered on product_arch
        CREATE TABLE overrides (
            name TEXT NOT NULL,
            pkg_arch TEXT NOT NULL,
            product_arch TEXT NOT NULL,
            product INTEGER NOT NULL,
            include INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (product) REFERENCES products(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_overrides_product ON overrides(product);
        CREATE INDEX idx_overrides_name ON overrides(name);

        -- Tree product map: which architecture trees a product offers
        CREATE TABLE tree_product_map (
            tree_id INTEGER NOT NULL,
            product_id INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_tree_product_map_product ON tree_product_map(product_id);
        ",
    )?;

    info!("Schema version 1 created successfully");
    Ok(())
}

/// Schema Version 2: Uniqueness of overrides and tree mappings
///
/// Existence checks already keep these tables free of duplicates. The
/// indexes make a violation fail loudly instead of silently doubling rows.
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE UNIQUE INDEX idx_overrides_unique
            ON overrides(name, pkg_arch, product_arch, product);
        CREATE UNIQUE INDEX idx_tree_product_map_unique
            ON tree_product_map(tree_id, product_id);
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}
