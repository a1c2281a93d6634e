// src/listing.rs

//! Typed form of a product listing document
//!
//! A listing names one product (label, version, variant, allow_source_only)
//! and, optionally, the packages it offers grouped by offering kind:
//!
//! ```yaml
//! ---
//! product_name: RHEL-7-OSE-3.5
//! version: 3.5
//! variant: Server-RH7-RHOSE-3.5
//! allow_source_only: false
//! packages:
//!   ansible:
//!     arch: [x86_64]
//!     src: [x86_64]
//!     noarch: [x86_64]
//!   glibc:
//!     multilib:
//!       - i686: x86_64
//! ```

use crate::db::models::Product;
use crate::error::{Error, Result};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// A complete product listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub product_name: String,
    pub version: ProductVersion,
    pub variant: String,
    pub allow_source_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<BTreeMap<String, PackageOfferings>>,
}

impl Listing {
    /// Create a listing with no `packages` key
    pub fn new(
        product_name: impl Into<String>,
        version: impl Into<ProductVersion>,
        variant: impl Into<String>,
        allow_source_only: bool,
    ) -> Self {
        Self {
            product_name: product_name.into(),
            version: version.into(),
            variant: variant.into(),
            allow_source_only,
            packages: None,
        }
    }

    /// Convert an already validated YAML document into a listing
    pub fn from_value(value: serde_yml::Value, origin: &str) -> Result<Self> {
        serde_yml::from_value(value).map_err(|source| Error::Yaml {
            path: origin.to_string(),
            source,
        })
    }

    /// Parse a listing straight from YAML text
    pub fn from_yaml_str(contents: &str, origin: &str) -> Result<Self> {
        serde_yml::from_str(contents).map_err(|source| Error::Yaml {
            path: origin.to_string(),
            source,
        })
    }

    /// Render the listing as a YAML document with an explicit start marker
    pub fn to_yaml(&self) -> Result<String> {
        let body = serde_yml::to_string(self).map_err(|source| Error::Yaml {
            path: "<listing>".to_string(),
            source,
        })?;
        if body.starts_with("---") {
            Ok(body)
        } else {
            Ok(format!("---\n{}", body))
        }
    }

    /// The product row this listing describes
    pub fn product(&self) -> Product {
        Product::new(
            self.product_name.clone(),
            self.version.as_str().to_string(),
            self.variant.clone(),
            self.allow_source_only,
        )
    }

    /// Number of packages listed (zero when `packages` is absent)
    pub fn package_count(&self) -> usize {
        self.packages.as_ref().map_or(0, BTreeMap::len)
    }
}

/// Product version as stored in the database
///
/// Listing files usually write the version as a bare YAML number (`4.5`),
/// but the database keeps the text. Whole floats keep their `.0` so that
/// `1.0` stays `"1.0"` rather than collapsing to `"1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProductVersion(String);

impl ProductVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_float(value: f64) -> Self {
        Self(format_float(value))
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductVersion {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductVersion {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for ProductVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // Emit a number only when it reads back as the same text
        if let Ok(int) = self.0.parse::<i64>() {
            if int.to_string() == self.0 {
                return serializer.serialize_i64(int);
            }
        }
        if let Ok(float) = self.0.parse::<f64>() {
            if float.is_finite() && format_float(float) == self.0 {
                return serializer.serialize_f64(float);
            }
        }
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProductVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct VersionVisitor;

        impl Visitor<'_> for VersionVisitor {
            type Value = ProductVersion;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a version number or string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(ProductVersion::new(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(ProductVersion(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(ProductVersion(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
                Ok(ProductVersion::from_float(v))
            }
        }

        deserializer.deserialize_any(VersionVisitor)
    }
}

/// Offerings of a single package, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOfferings {
    /// Architectures where the package arch equals the product arch
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arch: Vec<String>,
    /// Product architectures the package is offered to as source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,
    /// Product architectures the noarch package is offered to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub noarch: Vec<String>,
    /// Explicit package arch to product arch pairs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multilib: Vec<MultilibPair>,
}

impl PackageOfferings {
    pub fn is_empty(&self) -> bool {
        self.arch.is_empty() && self.src.is_empty() && self.noarch.is_empty() && self.multilib.is_empty()
    }

    /// Add one offering to the bucket it belongs to
    pub fn push(&mut self, offering: Offering) {
        match offering {
            Offering::Arch(arch) => self.arch.push(arch),
            Offering::Src(prod_arch) => self.src.push(prod_arch),
            Offering::Noarch(prod_arch) => self.noarch.push(prod_arch),
            Offering::Multilib(pair) => self.multilib.push(pair),
        }
    }
}

/// One `{pkg_arch: prod_arch}` entry of a `multilib` list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MultilibPair {
    pub pkg_arch: String,
    pub prod_arch: String,
}

impl MultilibPair {
    pub fn new(pkg_arch: impl Into<String>, prod_arch: impl Into<String>) -> Self {
        Self {
            pkg_arch: pkg_arch.into(),
            prod_arch: prod_arch.into(),
        }
    }
}

impl Serialize for MultilibPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.pkg_arch, &self.prod_arch)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for MultilibPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PairVisitor;

        impl<'de> Visitor<'de> for PairVisitor {
            type Value = MultilibPair;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a single `pkg_arch: prod_arch` entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let (pkg_arch, prod_arch) = map
                    .next_entry::<String, String>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if map.next_key::<String>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(MultilibPair { pkg_arch, prod_arch })
            }
        }

        deserializer.deserialize_map(PairVisitor)
    }
}

/// A single offering of a package, as one of the four listing kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offering {
    Arch(String),
    Src(String),
    Noarch(String),
    Multilib(MultilibPair),
}

/// Read a YAML document from disk without interpreting it
pub fn read_document(path: &Path) -> Result<serde_yml::Value> {
    debug!("Loading yaml data from {}", path.display());
    let contents = fs::read_to_string(path)?;
    serde_yml::from_str(&contents).map_err(|source| Error::Yaml {
        path: path.display().to_string(),
        source,
    })
}

/// Write a listing to disk, creating the parent directory when missing
pub fn write_listing(path: &Path, listing: &Listing) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, listing.to_yaml()?)?;
    Ok(())
}
