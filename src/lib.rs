// src/lib.rs

//! Declarative product listings
//!
//! A listing is a YAML document naming a product and the packages it offers
//! per architecture. prodlisting keeps the listings database in line with
//! those documents and can write the stored state back out as a listing.
//!
//! # Architecture
//!
//! - Validate first: a document that fails its schema never reaches the database
//! - Expand: compact per-package offerings become (name, pkg_arch, product_arch) triples
//! - Reconcile: triples are compared with the stored rows of the same product
//! - Apply: existence-checked inserts and deletes, previewed unless committing
//! - Export: stored rows are regrouped into the listing form

pub mod apply;
pub mod arch;
pub mod config;
pub mod db;
mod error;
pub mod expand;
pub mod export;
pub mod listing;
pub mod pipeline;
pub mod reconcile;
pub mod validate;

pub use error::{Error, Result};
