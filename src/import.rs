//! Dependency-resolving import of nodeset documents.
//!
//! An [`Importer`] parses the caller's documents into a [`Catalog`], then
//! repeatedly consults its [`NodeSetCache`] and, failing that, its
//! [`NodeSetResolver`] until every declared dependency is present or no
//! further progress is possible.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument, warn};

use crate::{
    domain::{Catalog, Model, RequiredModel},
    storage::{CacheError, NodeSetCache, NodeSetResolver},
};

/// The outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    catalog: Catalog,
    error_message: Option<String>,
    fatal: bool,
}

impl ImportResult {
    fn resolved(catalog: Catalog) -> Self {
        Self {
            catalog,
            error_message: None,
            fatal: false,
        }
    }

    fn fatal(catalog: Catalog, error: &ImportError) -> Self {
        warn!("import failed: {error}");
        Self {
            catalog,
            error_message: Some(error.to_string()),
            fatal: true,
        }
    }

    /// Models in dependency order.
    #[must_use]
    pub fn models(&self) -> &[Model] {
        self.catalog.models()
    }

    /// Dependencies that are still not present, derived from [`Self::models`].
    #[must_use]
    pub fn missing_models(&self) -> Vec<RequiredModel> {
        self.catalog.missing_models()
    }

    /// Namespace URIs of [`Self::missing_models`].
    #[must_use]
    pub fn missing_namespaces(&self) -> Vec<String> {
        self.catalog.missing_namespaces()
    }

    /// A human-readable diagnostic, `None` on full success.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Whether every dependency was resolved.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error_message.is_none()
    }

    /// Whether the import was aborted, as opposed to finishing with
    /// unresolved dependencies.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        self.fatal
    }

    /// The catalog of models seen so far.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Consumes the result, returning its catalog.
    #[must_use]
    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }
}

/// Imports nodesets into a catalog, resolving dependencies through a cache
/// and an optional resolver.
pub struct Importer<C> {
    cache: C,
    resolver: Option<Box<dyn NodeSetResolver>>,
    tenant: Option<String>,
    allow_augment: bool,
}

impl<C: NodeSetCache> Importer<C> {
    /// Creates an importer with no resolver, no tenant and augmentation
    /// enabled.
    pub const fn new(cache: C) -> Self {
        Self {
            cache,
            resolver: None,
            tenant: None,
            allow_augment: true,
        }
    }

    /// Sets the resolver consulted when the cache cannot help.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl NodeSetResolver + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Scopes cache reads and writes to `tenant`.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Whether a document with the same revision as a known model may add
    /// nodes to it.
    #[must_use]
    pub fn with_allow_augment(mut self, allow_augment: bool) -> Self {
        self.allow_augment = allow_augment;
        self
    }

    /// The cache.
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Consumes the importer, returning its cache.
    pub fn into_cache(self) -> C {
        self.cache
    }

    /// Imports `documents`, extending `previous` if given.
    ///
    /// `documents` is enumerated exactly once. With `fail_on_existing`, an
    /// import whose documents add nothing new fails immediately, and an
    /// import that ends with missing dependencies removes the models it
    /// cached.
    ///
    /// This never fails outright: problems are reported through
    /// [`ImportResult::error_message`].
    #[instrument(skip_all, fields(fail_on_existing = fail_on_existing, tenant = self.tenant.as_deref()))]
    pub async fn import<I, D>(
        &mut self,
        documents: I,
        fail_on_existing: bool,
        previous: Option<ImportResult>,
    ) -> ImportResult
    where
        I: IntoIterator<Item = D>,
        D: AsRef<str>,
    {
        let mut catalog = previous.map(ImportResult::into_catalog).unwrap_or_default();
        catalog.begin_session();
        self.cache.begin_session();

        let new_content = match self.add_documents(&mut catalog, documents) {
            Ok(new_content) => new_content,
            Err(e) => return ImportResult::fatal(catalog, &e),
        };

        if fail_on_existing && !new_content {
            let known = catalog
                .models()
                .iter()
                .map(|model| model.namespace_uri.clone())
                .collect();
            return ImportResult::fatal(catalog, &ImportError::AlreadyImported(known));
        }

        if catalog.is_empty() {
            return ImportResult::fatal(catalog, &ImportError::NoNodeSets);
        }

        let mut session = Session {
            catalog,
            requested: Vec::new(),
            diagnostics: Vec::new(),
        };

        let mut iteration = 0_usize;
        loop {
            iteration += 1;
            let (next, step) = self.step(session).await;
            session = next;
            session.catalog.reorder();

            match step {
                Step::Resolved => {
                    info!(iteration, models = session.catalog.len(), "all dependencies resolved");
                    return ImportResult::resolved(session.catalog);
                }
                Step::Retry => debug!(iteration, "cache made progress"),
                Step::Fetched(documents) => {
                    debug!(iteration, documents = documents.len(), "resolver returned documents");
                    if let Err(e) = self.add_documents(&mut session.catalog, documents) {
                        return ImportResult::fatal(session.catalog, &e);
                    }
                }
                Step::Stalled(missing) => {
                    return self.stalled(session, &missing, fail_on_existing);
                }
            }
        }
    }

    /// Parses and merges documents through the cache.
    fn add_documents<I, D>(&mut self, catalog: &mut Catalog, documents: I) -> Result<bool, ImportError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<str>,
    {
        let mut new_content = false;
        for (index, document) in documents.into_iter().enumerate() {
            let added = self
                .cache
                .add_node_set(
                    catalog,
                    document.as_ref(),
                    self.tenant.as_deref(),
                    self.allow_augment,
                )
                .map_err(|source| ImportError::Document {
                    position: index + 1,
                    source,
                })?;
            new_content |= added;
        }
        Ok(new_content)
    }

    /// One outer iteration: cache lookups, then at most one resolver call.
    async fn step(&mut self, mut session: Session) -> (Session, Step) {
        let missing = session.catalog.missing_models();
        if missing.is_empty() {
            return (session, Step::Resolved);
        }

        debug!(missing = missing.len(), "looking up missing models in cache");
        let mut progress = false;
        for required in &missing {
            match self
                .cache
                .get_node_set(&mut session.catalog, required, self.tenant.as_deref())
            {
                Ok(found) => progress |= found,
                Err(e) => {
                    warn!(model = %required, "cache lookup failed: {e}");
                    session
                        .diagnostics
                        .push(format!("Cache lookup for {required} failed: {e}"));
                }
            }
        }

        let missing = session.catalog.missing_models();
        if missing.is_empty() {
            return (session, Step::Resolved);
        }
        if progress {
            return (session, Step::Retry);
        }

        let request: BTreeSet<String> = missing.iter().map(|m| m.namespace_uri.clone()).collect();
        if session.requested.contains(&request) {
            debug!("missing models unchanged since the last resolver call");
            return (session, Step::Stalled(missing));
        }
        let Some(resolver) = &self.resolver else {
            return (session, Step::Stalled(missing));
        };
        session.requested.push(request);

        info!(missing = ?namespaces(&missing), "asking resolver for missing models");
        match resolver.resolve(&missing).await {
            Ok(documents) if documents.is_empty() => {
                session.diagnostics.push(format!(
                    "The resolver found no NodeSets for: {}",
                    namespaces(&missing).join(", ")
                ));
                (session, Step::Stalled(missing))
            }
            Ok(documents) => (session, Step::Fetched(documents)),
            Err(e) => {
                warn!("resolver failed: {e:#}");
                session.diagnostics.push(format!("The resolver failed: {e:#}"));
                (session, Step::Stalled(missing))
            }
        }
    }

    fn stalled(
        &mut self,
        session: Session,
        missing: &[RequiredModel],
        fail_on_existing: bool,
    ) -> ImportResult {
        let mut message = ImportError::MissingModels(namespaces(missing)).to_string();
        for diagnostic in &session.diagnostics {
            message.push('\n');
            message.push_str(diagnostic);
        }
        warn!(missing = ?namespaces(missing), "import finished with missing dependencies");

        for cycle in session.catalog.dependency_cycles() {
            warn!(?cycle, "models depend on each other");
        }

        if fail_on_existing {
            info!("rolling back models cached by this import");
            self.cache.delete_newly_added_models(&session.catalog);
        }

        ImportResult {
            catalog: session.catalog,
            error_message: Some(message),
            fatal: false,
        }
    }
}

/// State threaded through the iterations of one import.
struct Session {
    catalog: Catalog,
    /// Every set of missing namespaces handed to the resolver.
    requested: Vec<BTreeSet<String>>,
    /// Non-fatal problems, appended to the final message on failure.
    diagnostics: Vec<String>,
}

enum Step {
    Resolved,
    Retry,
    Fetched(Vec<String>),
    Stalled(Vec<RequiredModel>),
}

fn namespaces(models: &[RequiredModel]) -> Vec<String> {
    models.iter().map(|m| m.namespace_uri.clone()).collect()
}

/// Reasons an import does not succeed.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// A document could not be parsed or cached.
    #[error("failed to import nodeset #{position}: {source}")]
    Document {
        /// 1-based position of the document in its batch.
        position: usize,
        /// The underlying failure.
        source: CacheError,
    },

    /// Strict mode was requested, but nothing new was imported.
    #[error("The NodeSets have already been imported: {}", .0.join(", "))]
    AlreadyImported(Vec<String>),

    /// Nothing was supplied and nothing was known.
    #[error("no nodesets specified")]
    NoNodeSets,

    /// Dependencies remain unresolved.
    #[error("The following NodeSets are required: {}", .0.join(", "))]
    MissingModels(Vec<String>),
}
