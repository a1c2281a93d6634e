// src/expand.rs

//! Listing expansion
//!
//! Turns the compact per-package offerings of a listing into the flat
//! (name, pkg_arch, product_arch) triples stored in the overrides table.

use crate::arch::{NOARCH_ARCH, SRC_ARCH};
use crate::listing::{Listing, PackageOfferings};
use std::fmt;

/// The identity of an override within one product
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverrideTriple {
    pub name: String,
    pub pkg_arch: String,
    pub product_arch: String,
}

impl OverrideTriple {
    pub fn new(
        name: impl Into<String>,
        pkg_arch: impl Into<String>,
        product_arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pkg_arch: pkg_arch.into(),
            product_arch: product_arch.into(),
        }
    }
}

impl fmt::Display for OverrideTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} on {})", self.name, self.pkg_arch, self.product_arch)
    }
}

/// Expand the offerings of one package
///
/// Kinds are not exclusive: a package listed under several kinds yields the
/// union of their triples. Triples come out as noarch, src, arch, multilib.
pub fn expand_package(name: &str, offerings: &PackageOfferings) -> Vec<OverrideTriple> {
    let noarch = offerings
        .noarch
        .iter()
        .map(|prod_arch| OverrideTriple::new(name, NOARCH_ARCH, prod_arch.as_str()));
    let src = offerings
        .src
        .iter()
        .map(|prod_arch| OverrideTriple::new(name, SRC_ARCH, prod_arch.as_str()));
    let arch = offerings
        .arch
        .iter()
        .map(|arch| OverrideTriple::new(name, arch.as_str(), arch.as_str()));
    let multilib = offerings
        .multilib
        .iter()
        .map(|pair| OverrideTriple::new(name, pair.pkg_arch.as_str(), pair.prod_arch.as_str()));

    noarch.chain(src).chain(arch).chain(multilib).collect()
}

/// Expand every package of a listing into the desired set of triples
pub fn expand_listing(listing: &Listing) -> Vec<OverrideTriple> {
    listing
        .packages
        .iter()
        .flatten()
        .flat_map(|(name, offerings)| expand_package(name, offerings))
        .collect()
}
