//! OPC UA nodeset import and export
//!
//! Nodesets are XML documents describing one or more namespace-scoped
//! models. Importing resolves the models' dependencies through a cache and
//! an optional resolver; exporting renders a single model as a canonical,
//! self-contained document.

pub mod domain;
pub use domain::{
    Catalog, Config, ExpandedNodeId, Identifier, Model, Node, NodeId, NodeKind, RequiredModel,
    UA_NAMESPACE, order_by_dependencies,
};

/// Nodeset caches, resolvers and XML serialization.
pub mod storage;
pub use storage::{
    DirectoryCache, DirectoryResolver, MemoryCache, NodeSetCache, NodeSetResolver,
};

pub mod import;
pub use import::{ImportError, ImportResult, Importer};

pub mod export;
pub use export::{AliasSeed, Document, export, standard_aliases};

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for nodeset documents used in tests.

    use std::fmt::Write;

    pub struct NodeSetBuilder {
        namespace_uri: String,
        namespaces: Vec<String>,
        version: Option<String>,
        published: Option<String>,
        requires: Vec<String>,
        nodes: Vec<String>,
    }

    /// Starts a document declaring one model for `namespace_uri`, which gets
    /// namespace index 1.
    pub fn nodeset(namespace_uri: &str) -> NodeSetBuilder {
        NodeSetBuilder {
            namespace_uri: namespace_uri.to_string(),
            namespaces: Vec::new(),
            version: None,
            published: None,
            requires: Vec::new(),
            nodes: Vec::new(),
        }
    }

    impl NodeSetBuilder {
        pub fn version(mut self, version: &str) -> Self {
            self.version = Some(version.to_string());
            self
        }

        /// Publication date as `YYYY-MM-DD`.
        pub fn published(mut self, date: &str) -> Self {
            self.published = Some(format!("{date}T00:00:00Z"));
            self
        }

        pub fn requires(mut self, namespace_uri: &str) -> Self {
            self.requires.push(namespace_uri.to_string());
            self
        }

        /// Adds a namespace at the next index after the model's own.
        pub fn namespace(mut self, namespace_uri: &str) -> Self {
            self.namespaces.push(namespace_uri.to_string());
            self
        }

        /// Adds a raw node element.
        pub fn node(mut self, xml: &str) -> Self {
            self.nodes.push(xml.to_string());
            self
        }

        pub fn build(self) -> String {
            let mut out = String::from(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<UANodeSet \
                 xmlns=\"http://opcfoundation.org/UA/2011/03/UANodeSet.xsd\">\n",
            );

            out.push_str("  <NamespaceUris>\n");
            for uri in std::iter::once(&self.namespace_uri).chain(&self.namespaces) {
                let _ = writeln!(out, "    <Uri>{uri}</Uri>");
            }
            out.push_str("  </NamespaceUris>\n  <Models>\n");

            let _ = write!(out, "    <Model ModelUri=\"{}\"", self.namespace_uri);
            if let Some(version) = &self.version {
                let _ = write!(out, " Version=\"{version}\"");
            }
            if let Some(published) = &self.published {
                let _ = write!(out, " PublicationDate=\"{published}\"");
            }
            out.push_str(">\n");
            for uri in &self.requires {
                let _ = writeln!(out, "      <RequiredModel ModelUri=\"{uri}\" />");
            }
            out.push_str("    </Model>\n  </Models>\n");

            for node in &self.nodes {
                let _ = writeln!(out, "  {node}");
            }
            out.push_str("</UANodeSet>\n");
            out
        }
    }
}
