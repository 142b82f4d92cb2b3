//! Export of a model as a self-contained nodeset document.
//!
//! [`export`] renders the nodes of one model against a fresh namespace
//! table, replacing cross-namespace node ids with aliases derived from the
//! referenced nodes' display names. Aliases can only be chosen once every
//! reference has been seen, so the node walk runs a second time whenever
//! the first one assigned new aliases.

mod alias;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

pub use alias::{AliasSeed, MAX_ALIAS_ATTEMPTS, alias_base, standard_aliases};
use alias::AliasTable;

use crate::{
    domain::{
        Catalog, ExpandedNodeId, Model, NamespaceTable, Node, NodeId, NodeKind, Payload,
        QualifiedName, RequiredModel,
    },
    storage::{
        WriteError,
        xml::{self, index_payload},
    },
};

/// The node walk runs at most this many times.
const MAX_PASSES: usize = 2;

/// A rendered nodeset document for one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Namespace URIs for indices 1 and up.
    pub namespace_uris: Vec<String>,
    /// The exported model.
    pub model: ModelHeader,
    /// Aliases in numeric-aware node id order.
    pub aliases: Vec<Alias>,
    /// Nodes in export order.
    pub nodes: Vec<ExportedNode>,
}

impl Document {
    /// Serializes the document as `UANodeSet` XML.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML writer fails.
    pub fn to_xml(&self) -> Result<String, WriteError> {
        xml::write(self)
    }
}

/// Identity and requirements of the exported model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHeader {
    /// Namespace URI.
    pub namespace_uri: String,
    /// Version string.
    pub version: Option<String>,
    /// Publication date.
    pub publication_date: Option<DateTime<Utc>>,
    /// Every other namespace the document depends on.
    pub required_models: Vec<RequiredModelEntry>,
}

/// One required model of an exported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredModelEntry {
    /// The required namespace, with revision metadata when known.
    pub model: RequiredModel,
    /// Set when no revision metadata was available for the namespace.
    pub placeholder: bool,
}

/// An alias definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// The alias text.
    pub alias: String,
    /// The node id it stands for, indexed against the document.
    pub node_id: NodeId,
}

/// A node rendered against the document's namespace and alias tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNode {
    /// Node class.
    pub kind: NodeKind,
    /// Own node id.
    pub node_id: NodeId,
    /// Browse name in `<index>:<name>` form.
    pub browse_name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: Option<String>,
    /// Parent node id or alias.
    pub parent_node_id: Option<String>,
    /// Data type node id or alias.
    pub data_type: Option<String>,
    /// Further attributes, emitted verbatim.
    pub attributes: Vec<(String, String)>,
    /// References with ids or aliases.
    pub references: Vec<ExportedReference>,
    /// Opaque payload elements with re-indexed node ids.
    pub payloads: Vec<Payload>,
}

/// A reference rendered against the document's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedReference {
    /// Reference type node id or alias.
    pub reference_type: String,
    /// Target node id or alias.
    pub target: String,
    /// Direction.
    pub is_forward: bool,
}

/// Exports `model` as a self-contained document.
///
/// `catalog` supplies display names for alias derivation and revision
/// metadata for required models; it is never modified. `alias_seed`
/// provides aliases to use before any are derived.
///
/// The output depends only on the content of its inputs: exporting the same
/// model twice yields identical documents.
#[must_use]
#[instrument(skip_all, fields(model = %model))]
pub fn export(model: &Model, catalog: &Catalog, alias_seed: Option<&AliasSeed>) -> Document {
    let mut nodes: Vec<&Node> = model.nodes().collect();
    nodes.sort_by(|a, b| {
        a.kind
            .sort_rank()
            .cmp(&b.kind.sort_rank())
            .then_with(|| a.node_id.identifier.cmp(&b.node_id.identifier))
    });

    let mut exporter = Exporter::new(model, catalog, alias_seed, &nodes);

    let mut rendered = Vec::new();
    for pass in 1..=MAX_PASSES {
        exporter.used.clear();
        rendered = nodes.iter().map(|node| exporter.render_node(node)).collect();

        let assigned = exporter.assign_aliases();
        debug!(pass, assigned, "rendered nodes");
        if assigned == 0 {
            break;
        }
    }

    let aliases = exporter.alias_definitions();
    let required_models = exporter.required_models();
    Document {
        namespace_uris: exporter.namespaces.explicit_uris().to_vec(),
        model: ModelHeader {
            namespace_uri: model.namespace_uri.clone(),
            version: model.version.clone(),
            publication_date: model.publication_date,
            required_models,
        },
        aliases,
        nodes: rendered,
    }
}

struct Exporter<'a> {
    model: &'a Model,
    catalog: &'a Catalog,
    namespaces: NamespaceTable,
    aliases: AliasTable,
    /// Cross-namespace ids referenced during the current pass.
    used: BTreeSet<ExpandedNodeId>,
}

impl<'a> Exporter<'a> {
    /// Seeds the namespace table with the namespaces of the model's own
    /// nodes. Everything else is appended as the walk references it.
    fn new(
        model: &'a Model,
        catalog: &'a Catalog,
        alias_seed: Option<&AliasSeed>,
        nodes: &[&Node],
    ) -> Self {
        let mut namespaces = NamespaceTable::new();
        namespaces.get_or_append(&model.namespace_uri);
        for node in nodes {
            namespaces.get_or_append(&node.node_id.namespace);
        }

        Self {
            model,
            catalog,
            namespaces,
            aliases: AliasTable::seeded(alias_seed, &model.namespace_uri),
            used: BTreeSet::new(),
        }
    }

    fn is_own(&self, node_id: &ExpandedNodeId) -> bool {
        node_id.namespace == self.model.namespace_uri
    }

    fn index(&mut self, node_id: &ExpandedNodeId) -> NodeId {
        NodeId::new(
            self.namespaces.get_or_append(&node_id.namespace),
            node_id.identifier.clone(),
        )
    }

    /// Renders a node id as an alias if one is assigned, otherwise as an
    /// indexed node id.
    fn render_id(&mut self, node_id: &ExpandedNodeId) -> String {
        let indexed = self.index(node_id);
        if self.is_own(node_id) {
            return indexed.to_string();
        }
        self.used.insert(node_id.clone());
        self.aliases
            .get(node_id)
            .map_or_else(|| indexed.to_string(), str::to_string)
    }

    fn render_browse_name(&mut self, name: &QualifiedName) -> String {
        match self.namespaces.get_or_append(&name.namespace) {
            0 => name.name.clone(),
            index => format!("{index}:{}", name.name),
        }
    }

    fn render_node(&mut self, node: &Node) -> ExportedNode {
        let node_id = self.index(&node.node_id);
        let browse_name = self.render_browse_name(&node.browse_name);
        let parent_node_id = node.parent.as_ref().map(|id| self.render_id(id));
        let data_type = node.data_type.as_ref().map(|id| self.render_id(id));

        let attributes = node
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), index_payload(value, &mut self.namespaces)))
            .collect();

        let references = node
            .references
            .iter()
            .map(|reference| ExportedReference {
                reference_type: self.render_id(&reference.reference_type),
                target: self.render_id(&reference.target),
                is_forward: reference.is_forward,
            })
            .collect();

        let payloads = node
            .payloads
            .iter()
            .map(|payload| {
                for uri in &payload.namespaces {
                    self.namespaces.get_or_append(uri);
                }
                Payload {
                    inner_xml: index_payload(&payload.inner_xml, &mut self.namespaces),
                    ..payload.clone()
                }
            })
            .collect();

        ExportedNode {
            kind: node.kind,
            node_id,
            browse_name,
            display_name: node.display_name.clone(),
            description: node.description.clone(),
            parent_node_id,
            data_type,
            attributes,
            references,
            payloads,
        }
    }

    /// Assigns aliases to used ids that lack one. Returns how many were
    /// assigned.
    fn assign_aliases(&mut self) -> usize {
        let mut assigned = 0;
        for node_id in &self.used {
            if self.aliases.contains(node_id) {
                continue;
            }
            let Some(name) = self.display_name(node_id) else {
                continue;
            };
            if self.aliases.allocate(node_id, name).is_some() {
                assigned += 1;
            }
        }
        assigned
    }

    fn display_name(&self, node_id: &ExpandedNodeId) -> Option<&'a str> {
        let node = self
            .catalog
            .model(&node_id.namespace)?
            .node(&node_id.identifier)?;
        if alias_base(&node.display_name).is_empty() {
            Some(node.browse_name.name.as_str())
        } else {
            Some(node.display_name.as_str())
        }
    }

    /// Aliases actually used by the final pass.
    fn alias_definitions(&mut self) -> Vec<Alias> {
        let used = std::mem::take(&mut self.used);
        let mut definitions: Vec<Alias> = used
            .iter()
            .filter_map(|node_id| {
                let alias = self.aliases.get(node_id)?.to_string();
                Some(Alias {
                    alias,
                    node_id: self.index(node_id),
                })
            })
            .collect();
        definitions.sort_by(|a, b| {
            a.node_id
                .namespace_index
                .cmp(&b.node_id.namespace_index)
                .then_with(|| a.node_id.identifier.cmp(&b.node_id.identifier))
        });
        self.used = used;
        definitions
    }

    /// Declared dependencies first, then every other namespace in table
    /// order.
    fn required_models(&self) -> Vec<RequiredModelEntry> {
        let own = self.model.namespace_uri.as_str();
        let declared = self.model.dependencies().iter();
        let referenced = self
            .namespaces
            .uris()
            .iter()
            .filter(|uri| !self.model.depends_on(uri))
            .map(RequiredModel::new);

        declared
            .cloned()
            .chain(referenced)
            .filter(|required| required.namespace_uri != own)
            .map(|required| self.required_model_entry(required))
            .collect()
    }

    fn required_model_entry(&self, required: RequiredModel) -> RequiredModelEntry {
        if let Some(model) = self.catalog.model(&required.namespace_uri) {
            return RequiredModelEntry {
                model: model.identity(),
                placeholder: false,
            };
        }
        let placeholder = required.version.is_none() && required.publication_date.is_none();
        RequiredModelEntry {
            model: required,
            placeholder,
        }
    }
}
