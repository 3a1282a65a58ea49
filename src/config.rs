//! Configuration for building collections and harvesting candidates.
//!
//! # Examples
//!
//! ```
//! use bibmerge::Config;
//! use bibmerge::sources::ConfirmPolicy;
//!
//! let config = Config::from_toml_str(r#"
//! [builder]
//! year_sentinel = "8"
//!
//! [harvest]
//! confirm = "accept-all"
//! "#).unwrap();
//!
//! assert_eq!(config.builder.year_sentinel, '8');
//! assert_eq!(config.builder.default_entry_type, "misc");
//! assert_eq!(config.harvest.confirm, ConfirmPolicy::AcceptAll);
//! ```

use crate::keys::YEAR_SENTINEL;
use crate::sources::ConfirmPolicy;
use crate::{BibError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub builder: BuilderConfig,
    pub harvest: HarvestConfig,
}

/// Options for [`CollectionBuilder`](crate::CollectionBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// First digit of the year synthesized for records without one.
    pub year_sentinel: char,
    /// Entry type written for records whose source supplied none.
    pub default_entry_type: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            year_sentinel: YEAR_SENTINEL,
            default_entry_type: "misc".to_string(),
        }
    }
}

/// Options for [`Harvester`](crate::sources::Harvester).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// How low-confidence search results are accepted.
    pub confirm: ConfirmPolicy,
    /// Add a JabRef `file` field to records obtained from a PDF.
    pub tag_documents: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            confirm: ConfirmPolicy::Ask,
            tag_documents: true,
        }
    }
}

impl Config {
    /// Parses and validates a TOML configuration.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Config = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.builder.validate()
    }
}

impl BuilderConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.year_sentinel.is_ascii_digit() {
            return Err(BibError::Config(format!(
                "year_sentinel must be a digit, got '{}'",
                self.year_sentinel
            )));
        }
        if self.default_entry_type.trim().is_empty() {
            return Err(BibError::Config(
                "default_entry_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
