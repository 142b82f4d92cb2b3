use std::collections::{BTreeMap, BTreeSet};

use super::node_id::{ExpandedNodeId, QualifiedName};

/// The node classes a nodeset can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    /// `UAReferenceType`
    ReferenceType,
    /// `UADataType`
    DataType,
    /// `UAObjectType`
    ObjectType,
    /// `UAVariableType`
    VariableType,
    /// `UAObject`
    Object,
    /// `UAVariable`
    Variable,
    /// `UAMethod`
    Method,
    /// `UAView`
    View,
}

/// Export sort rank per kind, indexed by discriminant.
const SORT_RANK: [u8; 8] = [0, 1, 2, 3, 4, 4, 4, 4];

const ELEMENT_NAMES: [(NodeKind, &str); 8] = [
    (NodeKind::ReferenceType, "UAReferenceType"),
    (NodeKind::DataType, "UADataType"),
    (NodeKind::ObjectType, "UAObjectType"),
    (NodeKind::VariableType, "UAVariableType"),
    (NodeKind::Object, "UAObject"),
    (NodeKind::Variable, "UAVariable"),
    (NodeKind::Method, "UAMethod"),
    (NodeKind::View, "UAView"),
];

impl NodeKind {
    /// Rank used to order nodes on export: types before instances.
    #[must_use]
    pub const fn sort_rank(self) -> u8 {
        SORT_RANK[self as usize]
    }

    /// The XML element name for this kind.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        ELEMENT_NAMES[self as usize].1
    }

    /// Looks up a kind by XML element name.
    #[must_use]
    pub fn from_element_name(name: &str) -> Option<Self> {
        ELEMENT_NAMES
            .iter()
            .find(|(_, element)| *element == name)
            .map(|(kind, _)| *kind)
    }
}

/// A typed, directed reference from one node to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The reference type node.
    pub reference_type: ExpandedNodeId,
    /// The referenced node.
    pub target: ExpandedNodeId,
    /// `false` for inverse references.
    pub is_forward: bool,
}

/// An opaque child element of a node (`Value`, `Definition`, ...).
///
/// The inner XML is kept verbatim except that embedded node ids are stored
/// in `nsu=` form, so they survive re-indexing against a different
/// namespace table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Element name.
    pub element: String,
    /// Attributes of the element, in document order.
    pub attributes: Vec<(String, String)>,
    /// Raw inner XML.
    pub inner_xml: String,
    /// Namespace URIs referenced from inside the payload.
    pub namespaces: BTreeSet<String>,
}

/// A node owned by a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Fully-qualified id; its namespace is the owning model's.
    pub node_id: ExpandedNodeId,
    /// Node class.
    pub kind: NodeKind,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name (locale dropped).
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Optional parent node.
    pub parent: Option<ExpandedNodeId>,
    /// Data type of variables and variable types.
    pub data_type: Option<ExpandedNodeId>,
    /// Any other attributes, emitted verbatim.
    pub attributes: BTreeMap<String, String>,
    /// Outgoing and inverse references.
    pub references: Vec<Reference>,
    /// Opaque child elements.
    pub payloads: Vec<Payload>,
}

impl Node {
    /// Creates a node with the given id, kind and name. The browse name
    /// lives in the node's own namespace.
    #[must_use]
    pub fn new(node_id: ExpandedNodeId, kind: NodeKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            browse_name: QualifiedName::new(node_id.namespace.clone(), name.clone()),
            node_id,
            kind,
            display_name: name,
            description: None,
            parent: None,
            data_type: None,
            attributes: BTreeMap::new(),
            references: Vec::new(),
            payloads: Vec::new(),
        }
    }

    /// Adds a forward reference.
    #[must_use]
    pub fn with_reference(mut self, reference_type: ExpandedNodeId, target: ExpandedNodeId) -> Self {
        self.references.push(Reference {
            reference_type,
            target,
            is_forward: true,
        });
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}
