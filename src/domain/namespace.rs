use super::node_id::UA_NAMESPACE;

/// An ordered, append-only list of namespace URIs.
///
/// Position 0 always holds the standard namespace. Positions, once handed
/// out, never change for the lifetime of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    uris: Vec<String>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceTable {
    /// Creates a table containing only the standard namespace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uris: vec![UA_NAMESPACE.to_string()],
        }
    }

    /// Returns the index of `uri`, if present.
    #[must_use]
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris
            .iter()
            .position(|candidate| candidate == uri)
            .and_then(|index| u16::try_from(index).ok())
    }

    /// Returns the index of `uri`, appending it first if necessary.
    ///
    /// # Panics
    ///
    /// Panics if the table would exceed `u16::MAX` entries.
    pub fn get_or_append(&mut self, uri: &str) -> u16 {
        if let Some(index) = self.index_of(uri) {
            return index;
        }
        self.uris.push(uri.to_string());
        u16::try_from(self.uris.len() - 1).expect("namespace table overflow")
    }

    /// Returns the URI at `index`.
    #[must_use]
    pub fn uri(&self, index: u16) -> Option<&str> {
        self.uris.get(usize::from(index)).map(String::as_str)
    }

    /// All URIs in index order, including the standard namespace.
    #[must_use]
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// The URIs a document lists explicitly (everything after position 0).
    #[must_use]
    pub fn explicit_uris(&self) -> &[String] {
        &self.uris[1..]
    }

    /// Number of entries, including the standard namespace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Always `false`: the standard namespace is implicit.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }
}
