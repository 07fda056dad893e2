//! Advisory lookups
//!
//! Four static tables keyed by disease name: treatment, safety, market
//! (cost option) and sustainability. Every table falls back to its own
//! default for unknown diseases, so a lookup never fails.

pub mod builtin;
pub mod table;

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use table::AdvisoryTable;

#[derive(Debug, thiserror::Error)]
pub enum AdvisoryError {
    #[error("failed to read advisory file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid advisory file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// The four advisories for one disease
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub treatment: String,
    pub safety: String,
    pub cost_option: String,
    pub sustainability: String,
}

/// All advisory tables, loaded once at startup
#[derive(Debug, Clone)]
pub struct AdvisoryBook {
    pub treatment: AdvisoryTable,
    pub safety: AdvisoryTable,
    pub market: AdvisoryTable,
    pub sustainability: AdvisoryTable,
}

impl Default for AdvisoryBook {
    fn default() -> Self {
        Self::builtin()
    }
}

/// One table as written in an override file
#[derive(Debug, Default, Deserialize)]
struct TableOverride {
    default: Option<String>,
    #[serde(default)]
    entries: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BookOverride {
    treatment: Option<TableOverride>,
    safety: Option<TableOverride>,
    market: Option<TableOverride>,
    sustainability: Option<TableOverride>,
}

impl AdvisoryBook {
    pub fn builtin() -> Self {
        Self {
            treatment: builtin::treatment(),
            safety: builtin::safety(),
            market: builtin::market(),
            sustainability: builtin::sustainability(),
        }
    }

    /// Built-in tables, replaced table by table with those present in `path`
    pub fn from_json_file(path: &Path) -> Result<Self, AdvisoryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AdvisoryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw).map_err(|source| AdvisoryError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let overrides: BookOverride = serde_json::from_str(raw)?;
        let book = Self::builtin();

        Ok(Self {
            treatment: merge(book.treatment, overrides.treatment),
            safety: merge(book.safety, overrides.safety),
            market: merge(book.market, overrides.market),
            sustainability: merge(book.sustainability, overrides.sustainability),
        })
    }

    /// Advisories for `disease`. All four tables are keyed by the same string.
    pub fn advise(&self, disease: &str) -> Advice {
        Advice {
            treatment: self.treatment.lookup(disease).to_string(),
            safety: self.safety.lookup(disease).to_string(),
            cost_option: self.market.lookup(disease).to_string(),
            sustainability: self.sustainability.lookup(disease).to_string(),
        }
    }
}

fn merge(base: AdvisoryTable, over: Option<TableOverride>) -> AdvisoryTable {
    match over {
        None => base,
        Some(over) => {
            let default = over
                .default
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| base.default_advice().to_string());
            AdvisoryTable::new(default, over.entries)
        }
    }
}
