//! Best-effort fetching of missing nodesets from outside the cache.

use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::{domain::RequiredModel, storage::xml};

/// A source of nodeset documents for models the cache cannot provide.
///
/// An import calls [`resolve`](Self::resolve) at most once per distinct set
/// of missing models. Errors are reported to the caller of the import, never
/// propagated.
#[async_trait]
pub trait NodeSetResolver: Send + Sync {
    /// Returns documents providing some or all of `missing`.
    ///
    /// # Errors
    ///
    /// Any failure to reach or read the external source.
    async fn resolve(&self, missing: &[RequiredModel]) -> anyhow::Result<Vec<String>>;
}

/// Resolves nodesets from `*.xml` files below a set of directories.
#[derive(Debug, Clone, Default)]
pub struct DirectoryResolver {
    search_paths: Vec<PathBuf>,
}

impl DirectoryResolver {
    /// Creates a resolver searching the given directories.
    #[must_use]
    pub const fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// The directories searched.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn scan(&self, missing: &[RequiredModel]) -> anyhow::Result<Vec<String>> {
        let mut paths = Vec::new();
        for root in &self.search_paths {
            if !root.is_dir() {
                anyhow::bail!("search path {} is not a directory", root.display());
            }
            paths.extend(collect_xml_paths(root));
        }
        paths.sort();
        paths.dedup();

        let mut matches: Vec<(PathBuf, String)> = paths
            .par_iter()
            .filter_map(|path| provides_any(path, missing))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));

        debug!(
            scanned = paths.len(),
            matched = matches.len(),
            "scanned search paths"
        );
        Ok(matches.into_iter().map(|(_, document)| document).collect())
    }
}

#[async_trait]
impl NodeSetResolver for DirectoryResolver {
    #[instrument(level = "debug", skip_all, fields(missing = missing.len()))]
    async fn resolve(&self, missing: &[RequiredModel]) -> anyhow::Result<Vec<String>> {
        let resolver = self.clone();
        let missing = missing.to_vec();
        tokio::task::spawn_blocking(move || resolver.scan(&missing))
            .await
            .context("directory search did not complete")?
            .context("failed to search directories for nodesets")
    }
}

fn collect_xml_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new("xml")))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Reads `path` if its header declares any of the `missing` namespaces.
fn provides_any(path: &Path, missing: &[RequiredModel]) -> Option<(PathBuf, String)> {
    let document = match fs::read_to_string(path) {
        Ok(document) => document,
        Err(e) => {
            debug!("Skipping unreadable file at {}: {e}", path.display());
            return None;
        }
    };
    let models = match xml::read_header(&document) {
        Ok(models) => models,
        Err(e) => {
            debug!("Skipping file that is not a nodeset at {}: {e}", path.display());
            return None;
        }
    };
    models
        .iter()
        .any(|model| missing.iter().any(|m| m.namespace_uri == model.namespace_uri))
        .then(|| (path.to_path_buf(), document))
}
