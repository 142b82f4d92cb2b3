//! A filesystem backed nodeset cache
//!
//! The [`DirectoryCache`] stores one file per model revision:
//!
//! ```text
//! <root>/<tenant | shared>/<namespace key>/<revision>.xml
//! ```
//!
//! The namespace key is the namespace URI with every character that is not
//! safe in a file name replaced by `_`. Since two URIs can share a key, every
//! lookup confirms the namespace from the document header.

use std::{
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::{
    domain::{Catalog, Model, RequiredModel},
    storage::{
        cache::{CacheError, NodeSetCache, merge_document, merge_unstored, stored_covers},
        xml,
    },
};

const SHARED: &str = "shared";

/// A filesystem backed store of nodeset documents.
#[derive(Debug)]
pub struct DirectoryCache {
    /// The root of the directory documents are stored in.
    root: PathBuf,
    /// Files written this session, with the namespace they were stored for.
    written: Vec<(String, PathBuf)>,
}

impl DirectoryCache {
    /// Opens a cache rooted at the given path. The directory is created on
    /// first write.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self {
            root,
            written: Vec::new(),
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, tenant: Option<&str>, namespace_uri: &str) -> PathBuf {
        self.root
            .join(tenant.map_or_else(|| SHARED.to_string(), sanitize))
            .join(sanitize(namespace_uri))
    }

    fn store(
        &mut self,
        tenant: Option<&str>,
        revision: &RequiredModel,
        document: &str,
    ) -> Result<PathBuf, CacheError> {
        let dir = self.namespace_dir(tenant, &revision.namespace_uri);
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;

        let stem = revision_stem(revision);
        let mut path = dir.join(format!("{stem}.xml"));
        let mut suffix = 1;
        while path.exists() {
            path = dir.join(format!("{stem}-{suffix}.xml"));
            suffix += 1;
        }

        fs::write(&path, document).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "stored nodeset");
        self.written
            .push((revision.namespace_uri.clone(), path.clone()));
        Ok(path)
    }

    /// Whether a file in the tenant's directory already covers `model`.
    fn holds(
        &self,
        tenant: Option<&str>,
        model: &Model,
        allow_augment: bool,
    ) -> Result<bool, CacheError> {
        let identity = model.identity();
        for path in collect_xml_paths(&self.namespace_dir(tenant, &model.namespace_uri)) {
            let document = fs::read_to_string(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
            let same_revision = xml::read_header(&document).is_ok_and(|models| {
                models.iter().any(|stored| {
                    stored.namespace_uri == identity.namespace_uri
                        && stored.identity().compare_revision(&identity).is_eq()
                })
            });
            if !same_revision {
                continue;
            }
            match xml::parse(&document) {
                Ok(nodeset)
                    if nodeset
                        .models
                        .iter()
                        .any(|stored| stored_covers(stored, model, allow_augment)) =>
                {
                    debug!(path = %path.display(), "already cached");
                    return Ok(true);
                }
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable cache entry: {e}"),
            }
        }
        Ok(false)
    }

    /// Finds the newest stored revision satisfying `missing`, looking in the
    /// tenant's directory before the shared one.
    fn lookup(
        &self,
        missing: &RequiredModel,
        tenant: Option<&str>,
    ) -> Result<Option<(RequiredModel, String)>, CacheError> {
        let mut dirs = Vec::with_capacity(2);
        if tenant.is_some() {
            dirs.push(self.namespace_dir(tenant, &missing.namespace_uri));
        }
        dirs.push(self.namespace_dir(None, &missing.namespace_uri));

        for dir in dirs {
            let mut best: Option<(RequiredModel, String)> = None;
            for path in collect_xml_paths(&dir) {
                let document = fs::read_to_string(&path).map_err(|source| CacheError::Io {
                    path: path.clone(),
                    source,
                })?;
                let revision = match xml::read_header(&document) {
                    Ok(models) => models
                        .into_iter()
                        .map(|model| model.identity())
                        .find(|identity| identity.satisfies(missing)),
                    Err(e) => {
                        warn!(path = %path.display(), "skipping unreadable cache entry: {e}");
                        None
                    }
                };
                let Some(revision) = revision else {
                    continue;
                };
                let newer = best
                    .as_ref()
                    .is_none_or(|(current, _)| revision.compare_revision(current).is_gt());
                if newer {
                    best = Some((revision, document));
                }
            }
            if best.is_some() {
                return Ok(best);
            }
        }
        Ok(None)
    }
}

impl NodeSetCache for DirectoryCache {
    fn begin_session(&mut self) {
        self.written.clear();
    }

    #[instrument(level = "debug", skip(self, catalog, document), fields(root = %self.root.display()))]
    fn add_node_set(
        &mut self,
        catalog: &mut Catalog,
        document: &str,
        tenant: Option<&str>,
        allow_augment: bool,
    ) -> Result<bool, CacheError> {
        let new = merge_unstored(catalog, document, allow_augment, |model| {
            self.holds(tenant, model, allow_augment)
        })?;
        for revision in &new {
            self.store(tenant, revision, document)?;
        }
        Ok(!new.is_empty())
    }

    #[instrument(level = "debug", skip(self, catalog), fields(missing = %missing))]
    fn get_node_set(
        &mut self,
        catalog: &mut Catalog,
        missing: &RequiredModel,
        tenant: Option<&str>,
    ) -> Result<bool, CacheError> {
        let Some((revision, document)) = self.lookup(missing, tenant)? else {
            debug!("cache miss");
            return Ok(false);
        };
        debug!(%revision, "cache hit");
        Ok(!merge_document(catalog, &document, false)?.is_empty())
    }

    fn delete_newly_added_models(&mut self, catalog: &Catalog) {
        for (namespace_uri, path) in std::mem::take(&mut self.written) {
            if !catalog.is_newly_added(&namespace_uri) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "rolled back cached model"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to roll back cached model: {e}"),
            }
            if let Some(parent) = path.parent() {
                // Only succeeds once the directory is empty.
                let _ = fs::remove_dir(parent);
            }
        }
    }
}

fn collect_xml_paths(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new("xml")))
        .map(walkdir::DirEntry::into_path)
        .collect();
    paths.sort();
    paths
}

fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn revision_stem(revision: &RequiredModel) -> String {
    let date = revision.publication_date.map_or_else(
        || "undated".to_string(),
        |date| date.format("%Y%m%dT%H%M%SZ").to_string(),
    );
    let version = revision
        .version
        .as_deref()
        .map_or_else(|| "unversioned".to_string(), sanitize);
    format!("{date}_{version}")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::nodeset;

    fn setup_temp_cache() -> (TempDir, DirectoryCache) {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let cache = DirectoryCache::new(tmp.path().to_path_buf());
        (tmp, cache)
    }

    #[test]
    fn stores_documents_by_tenant_namespace_and_revision() {
        let (tmp, mut cache) = setup_temp_cache();
        let mut catalog = Catalog::new();
        let document = nodeset("urn:example:a")
            .version("1.0")
            .published("2023-04-01")
            .build();

        assert!(cache.add_node_set(&mut catalog, &document, Some("acme"), true).unwrap());

        let expected = tmp
            .path()
            .join("acme")
            .join("urn_example_a")
            .join("20230401T000000Z_1.0.xml");
        assert_eq!(fs::read_to_string(expected).unwrap(), document);
    }

    #[test]
    fn same_revision_documents_do_not_overwrite_each_other() {
        let (tmp, mut cache) = setup_temp_cache();
        let revision = RequiredModel::new("urn:a");
        cache.store(None, &revision, "first").unwrap();
        cache.store(None, &revision, "second").unwrap();

        let dir = tmp.path().join(SHARED).join("urn_a");
        assert_eq!(collect_xml_paths(&dir).len(), 2);
    }

    #[test]
    fn stored_revisions_are_not_written_again() {
        let (tmp, mut cache) = setup_temp_cache();
        let document = nodeset("urn:a").version("1.0").build();

        assert!(cache.add_node_set(&mut Catalog::new(), &document, None, true).unwrap());
        assert!(!cache.add_node_set(&mut Catalog::new(), &document, None, true).unwrap());

        let mut cache = DirectoryCache::new(tmp.path().to_path_buf());
        assert!(!cache.add_node_set(&mut Catalog::new(), &document, None, false).unwrap());

        let dir = tmp.path().join(SHARED).join("urn_a");
        assert_eq!(collect_xml_paths(&dir).len(), 1);
    }

    #[test]
    fn augmented_revisions_are_stored_alongside() {
        let (tmp, mut cache) = setup_temp_cache();
        let base = nodeset("urn:a")
            .node(r#"<UAObject NodeId="ns=1;i=1" BrowseName="1:One" />"#)
            .build();
        let extended = nodeset("urn:a")
            .node(r#"<UAObject NodeId="ns=1;i=1" BrowseName="1:One" />"#)
            .node(r#"<UAObject NodeId="ns=1;i=2" BrowseName="1:Two" />"#)
            .build();

        assert!(cache.add_node_set(&mut Catalog::new(), &base, None, true).unwrap());
        assert!(!cache.add_node_set(&mut Catalog::new(), &extended, None, false).unwrap());
        assert!(cache.add_node_set(&mut Catalog::new(), &extended, None, true).unwrap());

        let dir = tmp.path().join(SHARED).join("urn_a");
        assert_eq!(collect_xml_paths(&dir).len(), 2);
    }

    #[test]
    fn finds_newest_revision() {
        let (_tmp, mut cache) = setup_temp_cache();
        let mut seed = Catalog::new();
        cache
            .add_node_set(&mut seed, &nodeset("urn:a").published("2020-01-01").version("1").build(), None, true)
            .unwrap();
        cache
            .add_node_set(&mut seed, &nodeset("urn:a").published("2022-01-01").version("2").build(), None, true)
            .unwrap();

        let mut catalog = Catalog::new();
        assert!(cache
            .get_node_set(&mut catalog, &RequiredModel::new("urn:a"), None)
            .unwrap());
        assert_eq!(catalog.model("urn:a").unwrap().version.as_deref(), Some("2"));
    }

    #[test]
    fn confirms_namespace_from_header() {
        let (_tmp, mut cache) = setup_temp_cache();
        let mut seed = Catalog::new();
        cache
            .add_node_set(&mut seed, &nodeset("urn:a:b").build(), None, true)
            .unwrap();

        let mut catalog = Catalog::new();
        // Shares the "urn_a_b" directory but is a different namespace.
        assert!(!cache
            .get_node_set(&mut catalog, &RequiredModel::new("urn:a/b"), None)
            .unwrap());
    }

    #[test]
    fn miss_on_empty_cache() {
        let (_tmp, mut cache) = setup_temp_cache();
        let mut catalog = Catalog::new();
        assert!(!cache
            .get_node_set(&mut catalog, &RequiredModel::new("urn:nothing"), Some("acme"))
            .unwrap());
    }

    #[test]
    fn rollback_deletes_files_written_this_session() {
        let (tmp, mut cache) = setup_temp_cache();
        let mut catalog = Catalog::new();
        cache
            .add_node_set(&mut catalog, &nodeset("urn:kept").build(), None, true)
            .unwrap();

        cache.begin_session();
        catalog.begin_session();
        cache
            .add_node_set(&mut catalog, &nodeset("urn:dropped").build(), None, true)
            .unwrap();
        cache.delete_newly_added_models(&catalog);

        assert!(tmp.path().join(SHARED).join("urn_kept").exists());
        assert!(!tmp.path().join(SHARED).join("urn_dropped").exists());
    }
}
