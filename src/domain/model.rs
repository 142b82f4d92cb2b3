//! Namespace-scoped models and their declared dependencies.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    node::Node,
    node_id::{Identifier, natural_total_cmp},
};

/// A reference to a model by namespace, with optional revision metadata.
///
/// Used for declared dependencies, for missing models handed to a resolver,
/// and for the required-model list of an exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredModel {
    /// Namespace URI of the model.
    pub namespace_uri: String,
    /// Version string, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Publication date, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
}

impl RequiredModel {
    /// A requirement on a namespace with no revision metadata.
    #[must_use]
    pub fn new(namespace_uri: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            version: None,
            publication_date: None,
        }
    }

    /// Compares revisions: publication date first, then version. Missing
    /// metadata counts as oldest.
    #[must_use]
    pub fn compare_revision(&self, other: &Self) -> Ordering {
        compare_revisions(
            (self.publication_date.as_ref(), self.version.as_deref()),
            (other.publication_date.as_ref(), other.version.as_deref()),
        )
    }

    /// Whether this revision can stand in for `requested`: same namespace,
    /// published no earlier than requested.
    #[must_use]
    pub fn satisfies(&self, requested: &Self) -> bool {
        self.namespace_uri == requested.namespace_uri
            && match (&self.publication_date, &requested.publication_date) {
                (_, None) => true,
                (Some(have), Some(want)) => have >= want,
                (None, Some(_)) => false,
            }
    }
}

fn compare_revisions(
    (a_date, a_version): (Option<&DateTime<Utc>>, Option<&str>),
    (b_date, b_version): (Option<&DateTime<Utc>>, Option<&str>),
) -> Ordering {
    a_date.cmp(&b_date).then_with(|| match (a_version, b_version) {
        (Some(a), Some(b)) => natural_total_cmp(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    })
}

impl fmt::Display for RequiredModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace_uri)?;
        if let Some(version) = &self.version {
            write!(f, " {version}")?;
        }
        if let Some(date) = &self.publication_date {
            write!(f, " ({})", date.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

/// A namespace-scoped unit of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    /// Namespace URI, the primary identifier.
    pub namespace_uri: String,
    /// Version string.
    pub version: Option<String>,
    /// Publication date.
    pub publication_date: Option<DateTime<Utc>>,
    dependencies: Vec<RequiredModel>,
    nodes: BTreeMap<Identifier, Node>,
    /// Validation notes collected while parsing or merging.
    pub diagnostics: Vec<String>,
}

impl Model {
    /// Creates an empty model.
    #[must_use]
    pub fn new(namespace_uri: impl Into<String>) -> Self {
        Self {
            namespace_uri: namespace_uri.into(),
            version: None,
            publication_date: None,
            dependencies: Vec::new(),
            nodes: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the publication date.
    #[must_use]
    pub const fn with_publication_date(mut self, date: DateTime<Utc>) -> Self {
        self.publication_date = Some(date);
        self
    }

    /// This model's identity as a [`RequiredModel`].
    #[must_use]
    pub fn identity(&self) -> RequiredModel {
        RequiredModel {
            namespace_uri: self.namespace_uri.clone(),
            version: self.version.clone(),
            publication_date: self.publication_date,
        }
    }

    /// Declared dependencies, in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[RequiredModel] {
        &self.dependencies
    }

    /// Returns `true` if this model declares a dependency on `uri`.
    #[must_use]
    pub fn depends_on(&self, uri: &str) -> bool {
        self.dependencies.iter().any(|dep| dep.namespace_uri == uri)
    }

    /// Declares a dependency.
    ///
    /// Returns `Ok(false)` if the namespace was already declared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SelfDependency`] if `dependency` names this model's
    /// own namespace.
    pub fn add_dependency(&mut self, dependency: RequiredModel) -> Result<bool, Error> {
        if dependency.namespace_uri == self.namespace_uri {
            return Err(Error::SelfDependency(self.namespace_uri.clone()));
        }
        if self.depends_on(&dependency.namespace_uri) {
            return Ok(false);
        }
        self.dependencies.push(dependency);
        Ok(true)
    }

    /// Adds a node, replacing any node with the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignNode`] if the node's namespace is not this
    /// model's.
    pub fn insert_node(&mut self, node: Node) -> Result<Option<Node>, Error> {
        if node.node_id.namespace != self.namespace_uri {
            return Err(Error::ForeignNode {
                model: self.namespace_uri.clone(),
                node: node.node_id.to_string(),
            });
        }
        Ok(self.nodes.insert(node.node_id.identifier.clone(), node))
    }

    /// Looks up a node by identifier.
    #[must_use]
    pub fn node(&self, identifier: &Identifier) -> Option<&Node> {
        self.nodes.get(identifier)
    }

    /// Nodes in numeric-aware identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Compares revisions of two models: publication date first, then
    /// version. Missing metadata counts as oldest.
    #[must_use]
    pub fn compare_revision(&self, other: &Self) -> Ordering {
        compare_revisions(
            (self.publication_date.as_ref(), self.version.as_deref()),
            (other.publication_date.as_ref(), other.version.as_deref()),
        )
    }

    /// Folds nodes and dependencies from `other` that this model lacks.
    ///
    /// Returns the number of nodes and dependencies added.
    /// Whether augmenting with `other` would add nothing.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        other
            .dependencies
            .iter()
            .all(|dep| dep.namespace_uri == self.namespace_uri || self.depends_on(&dep.namespace_uri))
            && other.nodes.keys().all(|identifier| self.nodes.contains_key(identifier))
    }

    pub(crate) fn augment(&mut self, other: Self) -> usize {
        let mut added = 0;
        for dependency in other.dependencies {
            if dependency.namespace_uri != self.namespace_uri && !self.depends_on(&dependency.namespace_uri) {
                self.dependencies.push(dependency);
                added += 1;
            }
        }
        for (identifier, node) in other.nodes {
            if let std::collections::btree_map::Entry::Vacant(entry) = self.nodes.entry(identifier) {
                entry.insert(node);
                added += 1;
            }
        }
        added
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.identity(), f)
    }
}

/// Errors raised by model invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A model declared a dependency on its own namespace.
    #[error("model {0} declares a dependency on itself")]
    SelfDependency(String),

    /// A node was added to a model that does not own its namespace.
    #[error("node {node} does not belong to model {model}")]
    ForeignNode {
        /// Namespace URI of the model.
        model: String,
        /// The offending node id.
        node: String,
    },
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::{ExpandedNodeId, NodeKind};

    fn date(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rejects_self_dependency() {
        let mut model = Model::new("urn:a");
        let err = model.add_dependency(RequiredModel::new("urn:a")).unwrap_err();
        assert_eq!(err, Error::SelfDependency("urn:a".into()));
        assert!(model.dependencies().is_empty());
    }

    #[test]
    fn dependencies_are_an_ordered_set() {
        let mut model = Model::new("urn:a");
        assert!(model.add_dependency(RequiredModel::new("urn:c")).unwrap());
        assert!(model.add_dependency(RequiredModel::new("urn:b")).unwrap());
        assert!(!model.add_dependency(RequiredModel::new("urn:c")).unwrap());

        let uris: Vec<_> = model.dependencies().iter().map(|d| d.namespace_uri.as_str()).collect();
        assert_eq!(uris, ["urn:c", "urn:b"]);
    }

    #[test]
    fn newer_revisions_satisfy_older_requirements() {
        let requested = RequiredModel {
            publication_date: Some(date(2021)),
            ..RequiredModel::new("urn:a")
        };
        let newer = Model::new("urn:a").with_publication_date(date(2022)).identity();
        let older = Model::new("urn:a").with_publication_date(date(2020)).identity();

        assert!(newer.satisfies(&requested));
        assert!(!older.satisfies(&requested));
        assert!(!RequiredModel::new("urn:a").satisfies(&requested));
        assert!(older.satisfies(&RequiredModel::new("urn:a")));
        assert!(!newer.satisfies(&RequiredModel::new("urn:b")));
    }

    #[test]
    fn rejects_foreign_nodes() {
        let mut model = Model::new("urn:a");
        let node = Node::new(ExpandedNodeId::numeric("urn:b", 1), NodeKind::Object, "X");
        assert!(matches!(model.insert_node(node), Err(Error::ForeignNode { .. })));
    }

    #[test]
    fn revisions_compare_by_date_then_version() {
        let old = Model::new("urn:a").with_publication_date(date(2020));
        let new = Model::new("urn:a").with_publication_date(date(2021));
        assert_eq!(old.compare_revision(&new), Ordering::Less);

        let v9 = Model::new("urn:a").with_publication_date(date(2021)).with_version("1.0.9");
        let v10 = Model::new("urn:a").with_publication_date(date(2021)).with_version("1.0.10");
        assert_eq!(v9.compare_revision(&v10), Ordering::Less);

        let undated = Model::new("urn:a");
        assert_eq!(undated.compare_revision(&old), Ordering::Less);
        assert_eq!(undated.compare_revision(&Model::new("urn:a")), Ordering::Equal);
    }

    #[test]
    fn augment_only_adds_missing_content() {
        let mut base = Model::new("urn:a");
        base.insert_node(Node::new(ExpandedNodeId::numeric("urn:a", 1), NodeKind::Object, "One"))
            .unwrap();

        let mut other = Model::new("urn:a");
        other
            .insert_node(Node::new(ExpandedNodeId::numeric("urn:a", 1), NodeKind::Object, "Changed"))
            .unwrap();
        other
            .insert_node(Node::new(ExpandedNodeId::numeric("urn:a", 2), NodeKind::Object, "Two"))
            .unwrap();
        other.add_dependency(RequiredModel::new("urn:b")).unwrap();

        assert_eq!(base.augment(other), 2);
        assert_eq!(base.node_count(), 2);
        assert_eq!(base.node(&Identifier::Numeric(1)).unwrap().display_name, "One");
        assert!(base.depends_on("urn:b"));
    }

    #[test]
    fn covers_ignores_node_content() {
        let mut base = Model::new("urn:a");
        base.insert_node(Node::new(ExpandedNodeId::numeric("urn:a", 1), NodeKind::Object, "One"))
            .unwrap();

        let mut renamed = Model::new("urn:a");
        renamed
            .insert_node(Node::new(ExpandedNodeId::numeric("urn:a", 1), NodeKind::Object, "Changed"))
            .unwrap();
        assert!(base.covers(&renamed));
        assert!(base.covers(&Model::new("urn:a")));

        renamed.add_dependency(RequiredModel::new("urn:b")).unwrap();
        assert!(!base.covers(&renamed));
    }
}
