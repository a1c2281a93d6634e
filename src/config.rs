// src/config.rs

//! Database profile configuration
//!
//! ```toml
//! [profiles.production]
//! db_path = "/var/lib/prodlisting/listings.db"
//!
//! [profiles.local_test]
//! db_path = "listings.db"
//! ```
//!
//! The active profile comes from the environment: `PROD_DB=true` selects
//! `production`, any `CI` variable selects `ci_test`, anything else
//! `local_test`. Profiles missing from the file fall back to built-in paths.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the profile file
pub const DEFAULT_CONFIG_PATH: &str = "db_connections.toml";

/// A named database profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Profile {
    Production,
    CiTest,
    LocalTest,
}

impl Profile {
    /// Pick the profile from the process environment
    pub fn from_env() -> Self {
        Self::select(std::env::var("PROD_DB").ok().as_deref(), std::env::var_os("CI").is_some())
    }

    /// Pick the profile from the value of `PROD_DB` and whether `CI` is set
    pub fn select(prod_db: Option<&str>, ci: bool) -> Self {
        if prod_db == Some("true") {
            Profile::Production
        } else if ci {
            Profile::CiTest
        } else {
            Profile::LocalTest
        }
    }

    /// Section name used in the config file
    pub fn name(self) -> &'static str {
        match self {
            Profile::Production => "production",
            Profile::CiTest => "ci_test",
            Profile::LocalTest => "local_test",
        }
    }

    fn default_db_path(self) -> &'static str {
        match self {
            Profile::Production => "/var/lib/prodlisting/listings.db",
            Profile::CiTest => "target/ci/listings.db",
            Profile::LocalTest => "listings.db",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings of one profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub db_path: PathBuf,
}

/// Contents of the profile file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Config {
    /// Parse a profile file from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the profile file, using defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {}, using default profiles", path.display());
            return Ok(Self::default());
        }

        debug!("Loading database profiles from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Database path for a profile
    pub fn db_path_for(&self, profile: Profile) -> PathBuf {
        self.profiles
            .get(profile.name())
            .map(|p| p.db_path.clone())
            .unwrap_or_else(|| PathBuf::from(profile.default_db_path()))
    }
}
