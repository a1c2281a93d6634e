// src/export.rs

//! Listing export
//!
//! Rebuilds the compact listing form from stored override rows. This is the
//! inverse of [`crate::expand`]: exporting the rows a listing expands to and
//! expanding the result again yields the same set of triples.

use crate::arch::{NOARCH_ARCH, SRC_ARCH};
use crate::db::models::{Override, Product};
use crate::listing::{Listing, MultilibPair, Offering, PackageOfferings};
use std::collections::BTreeMap;

/// Decide which listing kind a stored (pkg_arch, product_arch) pair belongs to
///
/// The `src` and `noarch` package arches win over the equality check, so a
/// source package stored against a product arch literally named `src` is
/// still exported as a source offering.
pub fn classify(pkg_arch: &str, product_arch: &str) -> Offering {
    match pkg_arch {
        SRC_ARCH => Offering::Src(product_arch.to_string()),
        NOARCH_ARCH => Offering::Noarch(product_arch.to_string()),
        _ if pkg_arch == product_arch => Offering::Arch(pkg_arch.to_string()),
        _ => Offering::Multilib(MultilibPair::new(pkg_arch, product_arch)),
    }
}

/// Group override rows by package name
pub fn group_overrides(rows: &[Override]) -> BTreeMap<String, PackageOfferings> {
    let mut packages: BTreeMap<String, PackageOfferings> = BTreeMap::new();
    for row in rows {
        packages
            .entry(row.name.clone())
            .or_default()
            .push(classify(&row.pkg_arch, &row.product_arch));
    }
    packages
}

/// Build the listing document of a stored product
///
/// A product without rows gets no `packages` key at all.
pub fn export_listing(product: &Product, rows: &[Override]) -> Listing {
    let mut listing = Listing::new(
        product.label.as_str(),
        product.version.as_str(),
        product.variant.as_str(),
        product.allow_source_only,
    );
    if !rows.is_empty() {
        listing.packages = Some(group_overrides(rows));
    }
    listing
}
