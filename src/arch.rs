// src/arch.rs

//! Architecture to tree id table
//!
//! Every product architecture a listing offers is recorded in the
//! `tree_product_map` table through a fixed tree id. The table never changes
//! at runtime.

/// Package architecture for source packages
pub const SRC_ARCH: &str = "src";

/// Package architecture for architecture-independent packages
pub const NOARCH_ARCH: &str = "noarch";

/// Known architectures and the tree id each one maps to
pub const TREE_IDS: [(&str, i64); 9] = [
    ("i386", 5559),
    ("ia64", 5899),
    ("aarch64", 51630),
    ("ppc", 5901),
    ("ppc64", 17097),
    ("ppc64le", 46533),
    ("s390", 9867),
    ("s390x", 5900),
    ("x86_64", 5558),
];

/// Look up the tree id for a product architecture
pub fn tree_id_for(arch: &str) -> Option<i64> {
    TREE_IDS
        .iter()
        .find(|(name, _)| *name == arch)
        .map(|(_, id)| *id)
}

/// Iterate over all known architecture names
pub fn known_arches() -> impl Iterator<Item = &'static str> {
    TREE_IDS.iter().map(|(name, _)| *name)
}
