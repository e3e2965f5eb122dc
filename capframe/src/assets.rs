//! Catalog of the animation assets captions are laid over.
//!
//! Assets are identified by name. A catalog is either built from a list of
//! names or loaded from a directory of `.gif` files (the file stem is the
//! name). Lookups never fail on a bad selector: anything that does not
//! identify exactly one asset falls back to a random one.

use rand::seq::SliceRandom;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::payload::AssetSelector;

/// Most results a search returns.
pub const MAX_SEARCH_RESULTS: usize = 25;

/// File extension of loadable assets.
pub const ASSET_EXTENSION: &str = "gif";

/// Errors raised while building a catalog or resolving from it.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The asset directory could not be listed.
    #[error("Failed to read asset directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The catalog has no assets to choose from.
    #[error("asset catalog is empty")]
    Empty,
}

/// Sorted, de-duplicated list of asset names.
#[derive(Clone, Debug, Default)]
pub struct AssetCatalog {
    names: Vec<String>,
}

impl AssetCatalog {
    /// Builds a catalog from names. Blank names are dropped.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    /// Loads every `*.gif` file in `dir` (not recursive).
    pub fn load_dir(dir: &Path) -> Result<Self, AssetError> {
        let read_err = |source| AssetError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if !path.is_file() {
                continue;
            }
            let is_asset = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ASSET_EXTENSION));
            if !is_asset {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => names.push(stem.to_string()),
                None => debug!(path = %path.display(), "Skipping asset with non-UTF-8 name"),
            }
        }

        let catalog = Self::from_names(names);
        info!(dir = %dir.display(), assets = catalog.len(), "Loaded asset catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// All asset names, sorted.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Case-insensitive substring search, at most [`MAX_SEARCH_RESULTS`].
    ///
    /// A blank query lists the first assets in catalog order.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.trim().to_lowercase();
        self.names
            .iter()
            .filter(|name| query.is_empty() || name.to_lowercase().contains(&query))
            .take(MAX_SEARCH_RESULTS)
            .map(String::as_str)
            .collect()
    }

    /// Picks the asset for a request.
    ///
    /// A query matching exactly one asset selects it. No query, no match or
    /// an ambiguous query selects a random asset.
    pub fn resolve(&self, query: Option<&str>) -> Result<AssetSelector, AssetError> {
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            if let [only] = self.search(query).as_slice() {
                return Ok(AssetSelector::from_catalog(only));
            }
        }
        self.random()
    }

    /// Picks any asset uniformly at random.
    pub fn random(&self) -> Result<AssetSelector, AssetError> {
        let name = self
            .names
            .choose(&mut rand::thread_rng())
            .ok_or(AssetError::Empty)?;
        Ok(AssetSelector::from_catalog(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> AssetCatalog {
        AssetCatalog::from_names(["dancing cat", "Cat Nap", "dog", "parrot", "dog"])
    }

    #[test]
    fn test_from_names_sorts_and_dedups() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.names(), &["Cat Nap", "dancing cat", "dog", "parrot"]);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let catalog = catalog();
        assert_eq!(catalog.search("CAT"), vec!["Cat Nap", "dancing cat"]);
        assert_eq!(catalog.search("parr"), vec!["parrot"]);
        assert!(catalog.search("zebra").is_empty());
    }

    #[test]
    fn test_search_is_capped() {
        let catalog = AssetCatalog::from_names((0..40).map(|i| format!("clip {i:02}")));
        assert_eq!(catalog.search("clip").len(), MAX_SEARCH_RESULTS);
        assert_eq!(catalog.search("").len(), MAX_SEARCH_RESULTS);
    }

    #[test]
    fn test_resolve_unique_match() {
        let catalog = catalog();
        let selector = catalog.resolve(Some("parrot")).unwrap();
        assert_eq!(selector.as_str(), "parrot");
    }

    #[test]
    fn test_resolve_ambiguous_falls_back_to_random() {
        let catalog = catalog();
        for _ in 0..20 {
            let selector = catalog.resolve(Some("cat")).unwrap();
            assert!(catalog.names().iter().any(|n| n == selector.as_str()));
        }
        assert!(catalog.resolve(None).is_ok());
        assert!(catalog.resolve(Some("zebra")).is_ok());
    }

    #[test]
    fn test_resolve_keeps_catalog_names_verbatim() {
        let catalog = AssetCatalog::from_names(["jerma's dance"]);
        assert_eq!(catalog.resolve(Some("jerma")).unwrap().as_str(), "jerma's dance");
        assert_eq!(catalog.resolve(None).unwrap().as_str(), "jerma's dance");
    }

    #[test]
    fn test_random_accepts_names_without_safe_characters() {
        let catalog = AssetCatalog::from_names(["???"]);
        for _ in 0..5 {
            assert_eq!(catalog.random().unwrap().as_str(), "???");
        }
    }

    #[test]
    fn test_resolve_empty_catalog() {
        let catalog = AssetCatalog::default();
        assert!(matches!(catalog.resolve(Some("cat")), Err(AssetError::Empty)));
    }

    #[test]
    fn test_load_dir_filters_gifs() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("wave.gif"), b"GIF89a").unwrap();
        std::fs::write(temp.path().join("Shrug.GIF"), b"GIF89a").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"not an asset").unwrap();
        std::fs::create_dir(temp.path().join("nested.gif")).unwrap();

        let catalog = AssetCatalog::load_dir(temp.path()).unwrap();
        assert_eq!(catalog.names(), &["Shrug", "wave"]);
    }

    #[test]
    fn test_load_missing_dir() {
        let temp = tempfile::tempdir().unwrap();
        let err = AssetCatalog::load_dir(&temp.path().join("missing")).unwrap_err();
        assert!(matches!(err, AssetError::ReadDir { .. }));
    }
}
