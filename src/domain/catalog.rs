//! In-memory registry of models
//!
//! The [`Catalog`] knows nothing about documents, caches or resolvers. It
//! holds the models seen so far, derives the set of missing dependencies on
//! demand and decides how a newly parsed model merges with an existing one.

use std::{cmp::Ordering, collections::BTreeSet};

use petgraph::{algo::tarjan_scc, graphmap::DiGraphMap};
use tracing::{debug, instrument};

use super::{
    model::{Model, RequiredModel},
    order::order_by_dependencies,
};

/// How a model was merged into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The namespace was not known before.
    Added,
    /// A newer revision replaced the known one.
    Superseded,
    /// The same revision gained this many nodes or dependencies.
    Augmented(usize),
    /// Nothing changed: the same revision was already known.
    AlreadyKnown,
    /// Nothing changed: a newer revision was already known.
    Older,
}

impl MergeOutcome {
    /// Whether the merge introduced previously unseen content.
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::Added | Self::Superseded | Self::Augmented(_))
    }
}

/// The set of models known to an import session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// Models, kept in dependency order after every import iteration.
    models: Vec<Model>,

    /// Namespaces added or superseded since the session started.
    added: BTreeSet<String>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Models in their current order.
    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Looks up a model by namespace URI.
    #[must_use]
    pub fn model(&self, namespace_uri: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.namespace_uri == namespace_uri)
    }

    /// Whether a model for `namespace_uri` is present.
    #[must_use]
    pub fn contains(&self, namespace_uri: &str) -> bool {
        self.model(namespace_uri).is_some()
    }

    /// Number of models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether the catalog holds no models.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Dependencies declared by some model whose namespace is not present.
    ///
    /// Always derived from the current models: each namespace appears once,
    /// in order of first declaration, carrying the metadata of that first
    /// declaration.
    #[must_use]
    pub fn missing_models(&self) -> Vec<RequiredModel> {
        let mut seen = BTreeSet::new();
        self.models
            .iter()
            .flat_map(Model::dependencies)
            .filter(|dep| !self.contains(&dep.namespace_uri))
            .filter(|dep| seen.insert(dep.namespace_uri.as_str()))
            .cloned()
            .collect()
    }

    /// Namespace URIs of [`Self::missing_models`].
    #[must_use]
    pub fn missing_namespaces(&self) -> Vec<String> {
        self.missing_models()
            .into_iter()
            .map(|m| m.namespace_uri)
            .collect()
    }

    /// Merges a model into the catalog.
    ///
    /// - an unknown namespace is added
    /// - a strictly newer revision replaces the known model
    /// - the same revision is augmented with unseen nodes and dependencies
    ///   when `allow_augment` is set
    /// - an older revision is ignored
    #[instrument(level = "debug", skip(self, model), fields(model = %model))]
    pub fn merge(&mut self, model: Model, allow_augment: bool) -> MergeOutcome {
        let Some(index) = self
            .models
            .iter()
            .position(|m| m.namespace_uri == model.namespace_uri)
        else {
            self.added.insert(model.namespace_uri.clone());
            self.models.push(model);
            return MergeOutcome::Added;
        };

        let existing = &mut self.models[index];
        let outcome = match model.compare_revision(existing) {
            Ordering::Greater => {
                self.added.insert(model.namespace_uri.clone());
                *existing = model;
                MergeOutcome::Superseded
            }
            Ordering::Equal if allow_augment => match existing.augment(model) {
                0 => MergeOutcome::AlreadyKnown,
                added => {
                    self.added.insert(existing.namespace_uri.clone());
                    MergeOutcome::Augmented(added)
                }
            },
            Ordering::Equal => MergeOutcome::AlreadyKnown,
            Ordering::Less => MergeOutcome::Older,
        };
        debug!(?outcome, "merged into existing model");
        outcome
    }

    /// Starts a new session: forgets which models were newly added.
    pub fn begin_session(&mut self) {
        self.added.clear();
    }

    /// Namespaces added, superseded or augmented during this session.
    pub fn newly_added(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(String::as_str)
    }

    /// Whether `namespace_uri` was added during this session.
    #[must_use]
    pub fn is_newly_added(&self, namespace_uri: &str) -> bool {
        self.added.contains(namespace_uri)
    }

    /// Re-sorts the models by their dependencies.
    pub fn reorder(&mut self) {
        let models = std::mem::take(&mut self.models);
        self.models = order_by_dependencies(models);
    }

    /// Return all dependency cycles among present models, as sorted lists of
    /// namespace URIs.
    #[must_use]
    pub fn dependency_cycles(&self) -> Vec<Vec<String>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::with_capacity(self.models.len(), 0);
        for model in &self.models {
            graph.add_node(model.namespace_uri.as_str());
        }
        for model in &self.models {
            for dep in model.dependencies() {
                if graph.contains_node(dep.namespace_uri.as_str()) {
                    graph.add_edge(model.namespace_uri.as_str(), dep.namespace_uri.as_str(), ());
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut uris: Vec<String> = component.into_iter().map(str::to_string).collect();
                uris.sort();
                uris
            })
            .collect();
        cycles.sort();
        cycles
    }
}

impl FromIterator<Model> for Catalog {
    fn from_iter<T: IntoIterator<Item = Model>>(iter: T) -> Self {
        let mut catalog = Self::new();
        for model in iter {
            catalog.merge(model, true);
        }
        catalog.begin_session();
        catalog
    }
}
