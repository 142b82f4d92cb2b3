//! Alias allocation for exported documents.

use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::{ExpandedNodeId, UA_NAMESPACE};

/// Caller-supplied aliases, applied before any are derived.
pub type AliasSeed = BTreeMap<ExpandedNodeId, String>;

/// How many numeric suffixes are tried before giving up on an alias.
pub const MAX_ALIAS_ATTEMPTS: usize = 10_000;

/// A bijection between node ids and alias strings.
#[derive(Debug, Clone, Default)]
pub(crate) struct AliasTable {
    by_id: BTreeMap<ExpandedNodeId, String>,
    by_alias: BTreeMap<String, ExpandedNodeId>,
}

impl AliasTable {
    /// Builds a table from `seed`, dropping entries for `own_namespace` and
    /// entries whose alias is already taken.
    pub(crate) fn seeded(seed: Option<&AliasSeed>, own_namespace: &str) -> Self {
        let mut table = Self::default();
        for (node_id, alias) in seed.into_iter().flatten() {
            if node_id.namespace == own_namespace {
                warn!(%node_id, %alias, "ignoring seeded alias for the exported namespace");
                continue;
            }
            if let Some(holder) = table.by_alias.get(alias) {
                warn!(%node_id, %alias, %holder, "ignoring duplicate seeded alias");
                continue;
            }
            table.insert(node_id.clone(), alias.clone());
        }
        table
    }

    pub(crate) fn get(&self, node_id: &ExpandedNodeId) -> Option<&str> {
        self.by_id.get(node_id).map(String::as_str)
    }

    pub(crate) fn contains(&self, node_id: &ExpandedNodeId) -> bool {
        self.by_id.contains_key(node_id)
    }

    /// Assigns an alias derived from `name`, suffixing `_1`, `_2`, ... on
    /// collision.
    ///
    /// Returns `None` when `name` has no usable characters or every suffix
    /// up to [`MAX_ALIAS_ATTEMPTS`] is taken.
    pub(crate) fn allocate(&mut self, node_id: &ExpandedNodeId, name: &str) -> Option<&str> {
        let base = alias_base(name);
        if base.is_empty() {
            return None;
        }

        let alias = std::iter::once(base.clone())
            .chain((1..=MAX_ALIAS_ATTEMPTS).map(|n| format!("{base}_{n}")))
            .find(|candidate| !self.by_alias.contains_key(candidate));

        let Some(alias) = alias else {
            warn!(%node_id, %base, "no free alias, emitting the full node id");
            return None;
        };
        self.insert(node_id.clone(), alias);
        self.get(node_id)
    }

    fn insert(&mut self, node_id: ExpandedNodeId, alias: String) {
        self.by_alias.insert(alias.clone(), node_id.clone());
        self.by_id.insert(node_id, alias);
    }
}

/// The characters of `name` usable in an alias.
#[must_use]
pub fn alias_base(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Aliases for the standard reference types and data types.
#[must_use]
pub fn standard_aliases() -> AliasSeed {
    const STANDARD: &[(&str, u32)] = &[
        ("Boolean", 1),
        ("SByte", 2),
        ("Byte", 3),
        ("Int16", 4),
        ("UInt16", 5),
        ("Int32", 6),
        ("UInt32", 7),
        ("Int64", 8),
        ("UInt64", 9),
        ("Float", 10),
        ("Double", 11),
        ("String", 12),
        ("DateTime", 13),
        ("Guid", 14),
        ("ByteString", 15),
        ("XmlElement", 16),
        ("NodeId", 17),
        ("ExpandedNodeId", 18),
        ("StatusCode", 19),
        ("QualifiedName", 20),
        ("LocalizedText", 21),
        ("Structure", 22),
        ("BaseDataType", 24),
        ("Number", 26),
        ("Integer", 27),
        ("UInteger", 28),
        ("Enumeration", 29),
        ("Decimal", 50),
        ("Duration", 290),
        ("NumericRange", 291),
        ("UtcTime", 294),
        ("LocaleId", 295),
        ("Argument", 296),
        ("Range", 884),
        ("EUInformation", 887),
        ("EnumValueType", 7594),
        ("References", 31),
        ("NonHierarchicalReferences", 32),
        ("HierarchicalReferences", 33),
        ("HasChild", 34),
        ("Organizes", 35),
        ("HasEventSource", 36),
        ("HasModellingRule", 37),
        ("HasEncoding", 38),
        ("HasDescription", 39),
        ("HasTypeDefinition", 40),
        ("GeneratesEvent", 41),
        ("Aggregates", 44),
        ("HasSubtype", 45),
        ("HasProperty", 46),
        ("HasComponent", 47),
        ("HasNotifier", 48),
        ("HasOrderedComponent", 49),
        ("HasInterface", 17603),
    ];

    STANDARD
        .iter()
        .map(|(alias, id)| (ExpandedNodeId::numeric(UA_NAMESPACE, *id), (*alias).to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn id(value: u32) -> ExpandedNodeId {
        ExpandedNodeId::numeric("urn:other", value)
    }

    #[test_case("Pump Speed", "PumpSpeed"; "spaces")]
    #[test_case("Temp.(°C)", "TempC"; "punctuation and non-ascii")]
    #[test_case("has_under_score9", "has_under_score9"; "kept as is")]
    #[test_case("<>", ""; "nothing usable")]
    fn base_keeps_identifier_characters(name: &str, expected: &str) {
        assert_eq!(alias_base(name), expected);
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let mut table = AliasTable::default();
        assert_eq!(table.allocate(&id(1), "Name"), Some("Name"));
        assert_eq!(table.allocate(&id(2), "Name"), Some("Name_1"));
        assert_eq!(table.allocate(&id(3), "Name"), Some("Name_2"));
        assert_eq!(table.get(&id(2)), Some("Name_1"));
    }

    #[test]
    fn empty_names_are_not_aliased() {
        let mut table = AliasTable::default();
        assert_eq!(table.allocate(&id(1), "<>"), None);
        assert!(!table.contains(&id(1)));
    }

    #[test]
    fn gives_up_after_the_attempt_ceiling() {
        let mut table = AliasTable::default();
        table.insert(id(0), "Name".to_string());
        for n in 1..=MAX_ALIAS_ATTEMPTS {
            table.insert(id(u32::try_from(n).unwrap()), format!("Name_{n}"));
        }

        assert_eq!(table.allocate(&id(99_999), "Name"), None);
        assert!(!table.contains(&id(99_999)));
    }

    #[test]
    fn seed_drops_own_namespace_and_duplicates() {
        let seed: AliasSeed = [
            (ExpandedNodeId::numeric("urn:own", 1), "Mine".to_string()),
            (id(1), "Shared".to_string()),
            (id(2), "Shared".to_string()),
            (id(3), "Other".to_string()),
        ]
        .into_iter()
        .collect();

        let table = AliasTable::seeded(Some(&seed), "urn:own");
        assert!(!table.contains(&ExpandedNodeId::numeric("urn:own", 1)));
        assert_eq!(table.get(&id(1)), Some("Shared"));
        assert!(!table.contains(&id(2)));
        assert_eq!(table.get(&id(3)), Some("Other"));
    }

    #[test]
    fn standard_aliases_are_unique() {
        let aliases = standard_aliases();
        let mut names: Vec<_> = aliases.values().collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), aliases.len());
        assert_eq!(
            aliases.get(&ExpandedNodeId::numeric(UA_NAMESPACE, 47)).map(String::as_str),
            Some("HasComponent")
        );
    }
}
