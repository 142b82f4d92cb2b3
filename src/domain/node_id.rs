use std::{cmp::Ordering, fmt, iter::Peekable, str::Chars, str::FromStr};

/// The URI of the standard namespace, always at namespace index 0.
pub const UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// Compare two strings treating runs of ASCII digits as numbers.
///
/// `"i=9"` sorts before `"i=10"`, and `"Node2"` before `"Node10"`. Strings that
/// differ only in leading zeros of a digit run compare equal; callers that need
/// a total order break the tie with a plain byte comparison.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let ordering = compare_digit_runs(&l_run, &r_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                left.next();
                right.next();
                let ordering = l.cmp(&r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Natural ordering made total by falling back to byte order.
#[must_use]
pub fn natural_total_cmp(a: &str, b: &str) -> Ordering {
    natural_cmp(a, b).then_with(|| a.cmp(b))
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        run.push(c);
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// The identifier part of a node id, unique within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// `i=<u32>`
    Numeric(u32),
    /// `s=<string>`
    String(String),
    /// `g=<guid>`
    Guid(String),
    /// `b=<base64>`
    Opaque(String),
}

impl Identifier {
    const fn prefix(&self) -> char {
        match self {
            Self::Numeric(_) => 'i',
            Self::String(_) => 's',
            Self::Guid(_) => 'g',
            Self::Opaque(_) => 'b',
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "i={value}"),
            Self::String(value) => write!(f, "s={value}"),
            Self::Guid(value) => write!(f, "g={value}"),
            Self::Opaque(value) => write!(f, "b={value}"),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            _ => self.prefix().cmp(&other.prefix()).then_with(|| {
                natural_total_cmp(&self.to_string(), &other.to_string())
            }),
        }
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, value) = s
            .split_once('=')
            .ok_or_else(|| Error::Syntax(s.to_string()))?;

        match prefix {
            "i" => value
                .parse()
                .map(Self::Numeric)
                .map_err(|_| Error::Numeric(s.to_string())),
            "s" => Ok(Self::String(value.to_string())),
            "g" => Ok(Self::Guid(value.to_string())),
            "b" => Ok(Self::Opaque(value.to_string())),
            _ => Err(Error::Syntax(s.to_string())),
        }
    }
}

/// A node id as it appears in a document: a namespace index into the
/// document's namespace table plus an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// Position in the owning document's namespace table.
    pub namespace_index: u16,
    /// Identifier within that namespace.
    pub identifier: Identifier,
}

impl NodeId {
    /// Creates a node id.
    #[must_use]
    pub const fn new(namespace_index: u16, identifier: Identifier) -> Self {
        Self {
            namespace_index,
            identifier,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(rest) = s.strip_prefix("ns=") else {
            return Ok(Self::new(0, s.parse()?));
        };

        let (index, identifier) = rest
            .split_once(';')
            .ok_or_else(|| Error::Syntax(s.to_string()))?;
        let namespace_index = index
            .parse()
            .map_err(|_| Error::NamespaceIndex(s.to_string()))?;

        Ok(Self::new(namespace_index, identifier.parse()?))
    }
}

/// A fully-qualified node identifier: namespace URI plus identifier.
///
/// This is the form used everywhere inside the catalog, since namespace
/// indices are only meaningful relative to a single document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpandedNodeId {
    /// Namespace URI.
    pub namespace: String,
    /// Identifier within the namespace.
    pub identifier: Identifier,
}

impl ExpandedNodeId {
    /// Creates an expanded node id.
    #[must_use]
    pub fn new(namespace: impl Into<String>, identifier: Identifier) -> Self {
        Self {
            namespace: namespace.into(),
            identifier,
        }
    }

    /// Shorthand for a numeric id in the given namespace.
    #[must_use]
    pub fn numeric(namespace: impl Into<String>, value: u32) -> Self {
        Self::new(namespace, Identifier::Numeric(value))
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nsu={};{}", self.namespace, self.identifier)
    }
}

impl FromStr for ExpandedNodeId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix("nsu=")
            .ok_or_else(|| Error::Syntax(s.to_string()))?;
        // Identifiers may contain ';' (string ids), URIs practically never do.
        let (namespace, identifier) = rest
            .split_once(';')
            .ok_or_else(|| Error::Syntax(s.to_string()))?;
        Ok(Self::new(namespace, identifier.parse()?))
    }
}

/// A browse name: namespace URI plus name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    /// Namespace URI the name belongs to.
    pub namespace: String,
    /// The name itself.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Splits the `<index>:<name>` wire form.
    ///
    /// A missing or non-numeric prefix means namespace index 0.
    #[must_use]
    pub fn split_indexed(s: &str) -> (u16, &str) {
        s.split_once(':')
            .and_then(|(index, name)| index.parse().ok().map(|index| (index, name)))
            .unwrap_or((0, s))
    }
}

/// Errors that can occur when parsing node ids.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The text is not of the form `<prefix>=<value>`.
    #[error("invalid node id: {0}")]
    Syntax(String),

    /// A numeric identifier is not a valid `u32`.
    #[error("invalid numeric identifier in node id '{0}'")]
    Numeric(String),

    /// The namespace index is not a valid `u16`.
    #[error("invalid namespace index in node id '{0}'")]
    NamespaceIndex(String),
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("i=9", "i=10", Ordering::Less; "numeric runs")]
    #[test_case("Node10", "Node2", Ordering::Greater; "embedded numbers")]
    #[test_case("abc", "abd", Ordering::Less; "plain text")]
    #[test_case("a01", "a1", Ordering::Equal; "leading zeros")]
    #[test_case("a", "a1", Ordering::Less; "prefix")]
    fn natural_ordering(a: &str, b: &str, expected: Ordering) {
        assert_eq!(natural_cmp(a, b), expected);
    }

    #[test]
    fn natural_total_ordering_breaks_ties() {
        assert_eq!(natural_total_cmp("a01", "a1"), Ordering::Less);
    }

    #[test]
    fn identifiers_sort_numerically() {
        let mut ids: Vec<Identifier> = ["i=10", "s=Pump10", "i=9", "s=Pump9", "g=abc"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        ids.sort();

        let rendered: Vec<_> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["g=abc", "i=9", "i=10", "s=Pump9", "s=Pump10"]);
    }

    #[test_case("i=85", 0, Identifier::Numeric(85); "standard namespace")]
    #[test_case("ns=2;i=5001", 2, Identifier::Numeric(5001); "numeric")]
    #[test_case("ns=1;s=Line;1", 1, Identifier::String("Line;1".into()); "string with separator")]
    fn parses_node_ids(text: &str, index: u16, identifier: Identifier) {
        let node_id: NodeId = text.parse().unwrap();
        assert_eq!(node_id, NodeId::new(index, identifier));
        assert_eq!(node_id.to_string(), text);
    }

    #[test_case("x=1"; "unknown prefix")]
    #[test_case("85"; "missing prefix")]
    #[test_case("ns=1"; "missing identifier")]
    fn rejects_malformed_node_ids(text: &str) {
        assert!(matches!(text.parse::<NodeId>(), Err(Error::Syntax(_))));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(matches!(
            "i=99999999999".parse::<NodeId>(),
            Err(Error::Numeric(_))
        ));
        assert!(matches!(
            "ns=70000;i=1".parse::<NodeId>(),
            Err(Error::NamespaceIndex(_))
        ));
    }

    #[test]
    fn expanded_node_id_round_trips() {
        let id = ExpandedNodeId::numeric("urn:example", 42);
        assert_eq!(id.to_string(), "nsu=urn:example;i=42");
        assert_eq!(id.to_string().parse::<ExpandedNodeId>().unwrap(), id);
    }

    #[test]
    fn splits_browse_names() {
        assert_eq!(QualifiedName::split_indexed("1:Motor"), (1, "Motor"));
        assert_eq!(QualifiedName::split_indexed("Motor"), (0, "Motor"));
        assert_eq!(QualifiedName::split_indexed("x:Motor"), (0, "x:Motor"));
    }
}
