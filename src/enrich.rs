// Metadata enrichment boundary: title -> catalog record, consumed by callers

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Catalog record for one movie. Every field beyond the display title is
/// optional; catalogs are frequently sparse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieMetadata {
    pub title: String,
    #[serde(default)]
    pub release_year: Option<u16>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Lookup seam the pipeline's caller uses to enrich ranked titles. The
/// pipeline itself never calls this; absence of metadata is not an error.
pub trait MetadataProvider {
    fn lookup(&self, title: &str) -> Option<&MovieMetadata>;
}

/// Catalog loaded from a JSON object mapping titles to records. Lookups are
/// case-insensitive on the detected title.
pub struct JsonCatalog {
    entries: HashMap<String, MovieMetadata>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading metadata catalog {}", path.display()))?;
        let parsed: HashMap<String, MovieMetadata> =
            serde_json::from_str(&raw).context("parsing metadata catalog")?;

        let entries = parsed
            .into_iter()
            .map(|(key, record)| (key.to_lowercase(), record))
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataProvider for JsonCatalog {
    fn lookup(&self, title: &str) -> Option<&MovieMetadata> {
        self.entries.get(&title.to_lowercase())
    }
}
