//! Read-only paper catalog: metadata plus plain-text bodies.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata for one paper in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Paper {
    /// Stable catalog identifier.
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub venue: Option<String>,
}

/// Errors returned while loading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata parse error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Catalog abstraction so tests can inject fixture papers.
pub trait PaperCatalog: Send + Sync {
    /// Look up paper metadata by id.
    fn paper(&self, paper_id: &str) -> Option<Paper>;

    /// Load the paper's body text, if the paper exists and has one.
    fn body_text(&self, paper_id: &str) -> Option<String>;
}

/// File-backed catalog: a JSON metadata file plus a directory of
/// `{paper_id}.txt` body files.
pub struct FileCatalog {
    papers: HashMap<String, Paper>,
    text_dir: PathBuf,
}

impl FileCatalog {
    /// Load metadata from disk. Body texts are read lazily per request.
    pub fn load(
        metadata_path: impl AsRef<Path>,
        text_dir: impl Into<PathBuf>,
    ) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(metadata_path.as_ref())?;
        let papers: Vec<Paper> = serde_json::from_str(&raw)?;
        info!(
            "loaded paper catalog ({} papers, metadata={})",
            papers.len(),
            metadata_path.as_ref().display()
        );
        Ok(Self {
            papers: papers
                .into_iter()
                .map(|paper| (paper.id.clone(), paper))
                .collect(),
            text_dir: text_dir.into(),
        })
    }
}

impl PaperCatalog for FileCatalog {
    fn paper(&self, paper_id: &str) -> Option<Paper> {
        self.papers.get(paper_id).cloned()
    }

    fn body_text(&self, paper_id: &str) -> Option<String> {
        // Only ids present in the metadata map reach the filesystem, so a
        // crafted id can never address a path outside the text directory.
        if !self.papers.contains_key(paper_id) {
            return None;
        }
        fs::read_to_string(self.text_dir.join(format!("{paper_id}.txt"))).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::{FileCatalog, PaperCatalog};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn file_catalog_loads_metadata_and_bodies() {
        let root = tempdir().expect("tempdir");
        let metadata = root.path().join("papers.json");
        fs::write(
            &metadata,
            r#"[{"id":"paper-42","title":"A Study","authors":["Doe"],"year":2021,"venue":"ICML"}]"#,
        )
        .expect("write metadata");
        let text_dir = root.path().join("text");
        fs::create_dir(&text_dir).expect("mkdir");
        fs::write(text_dir.join("paper-42.txt"), "Full body text.").expect("write body");

        let catalog = FileCatalog::load(&metadata, &text_dir).expect("load");
        let paper = catalog.paper("paper-42").expect("paper");
        assert_eq!(paper.title, "A Study");
        assert_eq!(catalog.body_text("paper-42").as_deref(), Some("Full body text."));
        assert_eq!(catalog.paper("missing"), None);
        assert_eq!(catalog.body_text("../papers"), None);
    }
}
