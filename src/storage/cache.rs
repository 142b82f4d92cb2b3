//! Durable lookup of previously imported nodesets.
//!
//! A [`NodeSetCache`] is the first place an import looks for a missing
//! model. Every document that introduces new content during an import is
//! written back to the cache so later imports can find it.

use std::{collections::BTreeMap, io, path::PathBuf};

use tracing::{debug, instrument};

use crate::{
    domain::{Catalog, Model, RequiredModel},
    storage::xml::{self, ParseError},
};

/// Storage of nodeset documents keyed by tenant, namespace and revision.
pub trait NodeSetCache {
    /// Called once at the start of every import. Rollback only affects
    /// documents stored after this point.
    fn begin_session(&mut self) {}

    /// Parses `document`, merges its models into `catalog` and stores the
    /// document for every model that introduced new content.
    ///
    /// Returns `true` if any model introduced new content.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed, or if it cannot be
    /// stored.
    fn add_node_set(
        &mut self,
        catalog: &mut Catalog,
        document: &str,
        tenant: Option<&str>,
        allow_augment: bool,
    ) -> Result<bool, CacheError>;

    /// Looks up a stored revision satisfying `missing` and merges it into
    /// `catalog`.
    ///
    /// Returns `true` if the catalog gained new content.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored document cannot be read or parsed.
    fn get_node_set(
        &mut self,
        catalog: &mut Catalog,
        missing: &RequiredModel,
        tenant: Option<&str>,
    ) -> Result<bool, CacheError>;

    /// Removes every document stored this session for a model the catalog
    /// reports as newly added.
    fn delete_newly_added_models(&mut self, catalog: &Catalog);
}

impl<T: NodeSetCache + ?Sized> NodeSetCache for Box<T> {
    fn begin_session(&mut self) {
        (**self).begin_session();
    }

    fn add_node_set(
        &mut self,
        catalog: &mut Catalog,
        document: &str,
        tenant: Option<&str>,
        allow_augment: bool,
    ) -> Result<bool, CacheError> {
        (**self).add_node_set(catalog, document, tenant, allow_augment)
    }

    fn get_node_set(
        &mut self,
        catalog: &mut Catalog,
        missing: &RequiredModel,
        tenant: Option<&str>,
    ) -> Result<bool, CacheError> {
        (**self).get_node_set(catalog, missing, tenant)
    }

    fn delete_newly_added_models(&mut self, catalog: &Catalog) {
        (**self).delete_newly_added_models(catalog);
    }
}

/// Parses `document` and merges every model it contains into `catalog`.
///
/// Returns the identities of the models that introduced new content.
///
/// # Errors
///
/// Returns an error if the document cannot be parsed.
pub fn merge_document(
    catalog: &mut Catalog,
    document: &str,
    allow_augment: bool,
) -> Result<Vec<RequiredModel>, ParseError> {
    let nodeset = xml::parse(document)?;
    let mut new = Vec::new();
    for model in nodeset.models {
        let identity = model.identity();
        let outcome = catalog.merge(model, allow_augment);
        debug!(model = %identity, ?outcome, "merged model");
        if outcome.is_new() {
            new.push(identity);
        }
    }
    Ok(new)
}

/// Like [`merge_document`], but a model only counts as new if `is_stored`
/// reports that the store lacks it.
pub(crate) fn merge_unstored(
    catalog: &mut Catalog,
    document: &str,
    allow_augment: bool,
    mut is_stored: impl FnMut(&Model) -> Result<bool, CacheError>,
) -> Result<Vec<RequiredModel>, CacheError> {
    let nodeset = xml::parse(document)?;
    let mut new = Vec::new();
    for model in nodeset.models {
        let identity = model.identity();
        let stored = is_stored(&model)?;
        let outcome = catalog.merge(model, allow_augment);
        debug!(model = %identity, ?outcome, stored, "merged model");
        if outcome.is_new() && !stored {
            new.push(identity);
        }
    }
    Ok(new)
}

/// Whether a stored model already holds everything `incoming` would store.
///
/// Without augmentation any stored copy of the same revision suffices.
pub(crate) fn stored_covers(stored: &Model, incoming: &Model, allow_augment: bool) -> bool {
    stored.namespace_uri == incoming.namespace_uri
        && stored.compare_revision(incoming).is_eq()
        && (!allow_augment || stored.covers(incoming))
}

type Key = (Option<String>, String);

#[derive(Debug, Clone)]
struct Stored {
    serial: u64,
    revision: RequiredModel,
    document: String,
}

/// An in-process cache.
///
/// Nothing survives the process, which makes this the cache of choice for
/// tests and one-shot command-line runs.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: BTreeMap<Key, Vec<Stored>>,
    written: Vec<(Key, u64)>,
    next_serial: u64,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `document` under every model it declares, without touching
    /// any catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the document header cannot be parsed.
    pub fn insert(&mut self, document: &str, tenant: Option<&str>) -> Result<usize, ParseError> {
        let models = xml::read_header(document)?;
        for model in &models {
            self.store(tenant, model.identity(), document);
        }
        Ok(models.len())
    }

    /// Number of stored documents, counting a document once per model.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any revision of `namespace_uri` is stored for `tenant`.
    #[must_use]
    pub fn contains(&self, tenant: Option<&str>, namespace_uri: &str) -> bool {
        self.entries
            .contains_key(&(tenant.map(str::to_string), namespace_uri.to_string()))
    }

    fn store(&mut self, tenant: Option<&str>, revision: RequiredModel, document: &str) {
        let key = (tenant.map(str::to_string), revision.namespace_uri.clone());
        let serial = self.next_serial;
        self.next_serial += 1;

        self.entries.entry(key.clone()).or_default().push(Stored {
            serial,
            revision,
            document: document.to_string(),
        });
        self.written.push((key, serial));
    }

    /// Whether a stored document for `tenant` already covers `model`.
    fn holds(
        &self,
        tenant: Option<&str>,
        model: &Model,
        allow_augment: bool,
    ) -> Result<bool, ParseError> {
        let key = (tenant.map(str::to_string), model.namespace_uri.clone());
        let identity = model.identity();
        for entry in self.entries.get(&key).into_iter().flatten() {
            if entry.revision.compare_revision(&identity).is_ne() {
                continue;
            }
            let nodeset = xml::parse(&entry.document)?;
            if nodeset
                .models
                .iter()
                .any(|stored| stored_covers(stored, model, allow_augment))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lookup(&self, missing: &RequiredModel, tenant: Option<&str>) -> Option<&Stored> {
        let scoped = tenant.map(|tenant| (Some(tenant.to_string()), missing.namespace_uri.clone()));
        let shared = (None, missing.namespace_uri.clone());

        scoped
            .iter()
            .chain(std::iter::once(&shared))
            .filter_map(|key| self.entries.get(key))
            .find_map(|stored| {
                stored
                    .iter()
                    .filter(|entry| entry.revision.satisfies(missing))
                    .max_by(|a, b| {
                        a.revision
                            .compare_revision(&b.revision)
                            .then(a.serial.cmp(&b.serial))
                    })
            })
    }
}

impl NodeSetCache for MemoryCache {
    fn begin_session(&mut self) {
        self.written.clear();
    }

    #[instrument(level = "debug", skip(self, catalog, document))]
    fn add_node_set(
        &mut self,
        catalog: &mut Catalog,
        document: &str,
        tenant: Option<&str>,
        allow_augment: bool,
    ) -> Result<bool, CacheError> {
        let new = merge_unstored(catalog, document, allow_augment, |model| {
            Ok(self.holds(tenant, model, allow_augment)?)
        })?;
        for revision in &new {
            self.store(tenant, revision.clone(), document);
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
        let Some(stored) = self.lookup(missing, tenant) else {
            debug!("cache miss");
            return Ok(false);
        };
        debug!(revision = %stored.revision, "cache hit");
        let new = merge_document(catalog, &stored.document, false)?;
        Ok(!new.is_empty())
    }

    fn delete_newly_added_models(&mut self, catalog: &Catalog) {
        let written = std::mem::take(&mut self.written);
        for ((tenant, uri), serial) in written {
            if !catalog.is_newly_added(&uri) {
                continue;
            }
            let key = (tenant, uri);
            if let Some(stored) = self.entries.get_mut(&key) {
                stored.retain(|entry| entry.serial != serial);
                if stored.is_empty() {
                    self.entries.remove(&key);
                }
            }
            debug!(model = %key.1, "rolled back cached model");
        }
    }
}

/// Errors that can occur while reading or writing a cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A document could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The backing store could not be read or written.
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}
