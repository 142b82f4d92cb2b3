//! XML serialization for nodesets.
//!
//! Reading turns a `UANodeSet` document into [`Model`]s whose node ids are
//! fully qualified. Writing turns an exported [`Document`] back into XML.

use std::{
    collections::{BTreeMap, BTreeSet},
    string::FromUtf8Error,
    sync::LazyLock,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use quick_xml::{
    Reader, Writer,
    escape::{EscapeError, escape, unescape},
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event, attributes::AttrError},
};
use regex::{Captures, Regex};
use tracing::{debug, instrument};

use crate::{
    domain::{
        ExpandedNodeId, Model, ModelError, NamespaceTable, Node, NodeId, NodeIdError, NodeKind,
        Payload, QualifiedName, Reference, RequiredModel, UA_NAMESPACE,
    },
    export::{Document, ExportedNode},
};

/// XML namespace of `UANodeSet` documents.
pub const NODESET_XMLNS: &str = "http://opcfoundation.org/UA/2011/03/UANodeSet.xsd";

static NAMESPACE_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bns=(\d+);").expect("this must never fail"));

static NAMESPACE_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnsu=([^;<]+);").expect("this must never fail"));

/// The models contained in one nodeset document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    /// Namespace URIs in document order, standard namespace first.
    pub namespace_uris: Vec<String>,
    /// Models with their nodes attached.
    pub models: Vec<Model>,
}

/// Parses a complete nodeset document.
///
/// # Errors
///
/// Returns an error if the document is not well-formed XML, is not a
/// `UANodeSet`, contains an invalid node id or date, references a namespace
/// index it does not declare, or declares a model that depends on itself.
#[instrument(level = "debug", skip(text), fields(len = text.len()))]
pub fn parse(text: &str) -> Result<NodeSet, ParseError> {
    Parser::new(text).run(false)
}

/// Reads only the models a document declares, without their nodes.
///
/// Documents without a `Models` section are parsed in full so that models
/// can be inferred from node namespaces.
///
/// # Errors
///
/// As for [`parse`], limited to the part of the document that is read.
pub fn read_header(text: &str) -> Result<Vec<Model>, ParseError> {
    let header = Parser::new(text).run(true)?;
    if header.models.is_empty() {
        return parse(text).map(|nodeset| nodeset.models);
    }
    Ok(header.models)
}

struct Parser<'a> {
    input: &'a str,
    reader: Reader<&'a [u8]>,
    namespace_uris: Vec<String>,
    aliases: BTreeMap<String, NodeId>,
    models: Vec<Model>,
    nodes: Vec<Node>,
    seen_root: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);
        Self {
            input,
            reader,
            namespace_uris: vec![UA_NAMESPACE.to_string()],
            aliases: BTreeMap::new(),
            models: Vec::new(),
            nodes: Vec::new(),
            seen_root: false,
        }
    }

    fn run(mut self, header_only: bool) -> Result<NodeSet, ParseError> {
        let mut open = 0_usize;
        loop {
            match self.reader.read_event()? {
                Event::Start(start) => match local_name(&start).as_str() {
                    "UANodeSet" => {
                        self.seen_root = true;
                        open += 1;
                    }
                    "Models" | "Aliases" => open += 1,
                    "NamespaceUris" => self.read_namespace_uris()?,
                    "Model" => self.read_model(&start, false)?,
                    "Alias" => self.read_alias(&start)?,
                    name => match NodeKind::from_element_name(name) {
                        Some(_) if header_only => break,
                        Some(kind) => self.read_node(&start, kind, false)?,
                        None => {
                            self.reader.read_to_end(start.name())?;
                        }
                    },
                },
                Event::Empty(start) => match local_name(&start).as_str() {
                    "UANodeSet" => self.seen_root = true,
                    "Model" => self.read_model(&start, true)?,
                    name => match NodeKind::from_element_name(name) {
                        Some(_) if header_only => break,
                        Some(kind) => self.read_node(&start, kind, true)?,
                        None => {}
                    },
                },
                Event::End(_) => open = open.saturating_sub(1),
                Event::Eof if open > 0 => return Err(ParseError::UnexpectedEof),
                Event::Eof => break,
                _ => {}
            }
        }

        if !self.seen_root {
            return Err(ParseError::NotANodeSet);
        }
        self.finish()
    }

    fn finish(mut self) -> Result<NodeSet, ParseError> {
        if self.models.is_empty() {
            // Older documents carry no model metadata: one model per owning
            // namespace, in order of first appearance.
            for node in &self.nodes {
                if !self.models.iter().any(|m| m.namespace_uri == node.node_id.namespace) {
                    self.models.push(Model::new(node.node_id.namespace.clone()));
                }
            }
        }

        let mut orphans = Vec::new();
        for node in self.nodes {
            match self
                .models
                .iter_mut()
                .find(|m| m.namespace_uri == node.node_id.namespace)
            {
                Some(model) => {
                    model.insert_node(node)?;
                }
                None => orphans.push(node.node_id),
            }
        }

        if let Some(first) = self.models.first_mut() {
            for orphan in orphans {
                first.diagnostics.push(format!(
                    "ignored node {orphan}: no model in this document owns its namespace"
                ));
            }
        }

        debug!(models = self.models.len(), "parsed nodeset");
        Ok(NodeSet {
            namespace_uris: self.namespace_uris,
            models: self.models,
        })
    }

    fn read_namespace_uris(&mut self) -> Result<(), ParseError> {
        loop {
            match self.reader.read_event()? {
                Event::Start(start) if local_name(&start) == "Uri" => {
                    let uri = self.read_text()?;
                    self.namespace_uris.push(uri);
                }
                Event::Start(start) => {
                    self.reader.read_to_end(start.name())?;
                }
                Event::End(_) => return Ok(()),
                Event::Eof => return Err(ParseError::UnexpectedEof),
                _ => {}
            }
        }
    }

    fn read_model(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<(), ParseError> {
        let attributes: BTreeMap<_, _> = attributes(start, false)?.into_iter().collect();
        let mut model = Model::new(required(&attributes, "Model", "ModelUri")?);
        model.version = attributes.get("Version").cloned();
        model.publication_date = attributes
            .get("PublicationDate")
            .map(|date| parse_date(date))
            .transpose()?;

        if !empty {
            loop {
                match self.reader.read_event()? {
                    Event::Empty(child) if local_name(&child) == "RequiredModel" => {
                        model.add_dependency(required_model(&child)?)?;
                    }
                    Event::Start(child) => {
                        if local_name(&child) == "RequiredModel" {
                            model.add_dependency(required_model(&child)?)?;
                        }
                        self.reader.read_to_end(child.name())?;
                    }
                    Event::End(_) => break,
                    Event::Eof => return Err(ParseError::UnexpectedEof),
                    _ => {}
                }
            }
        }

        self.models.push(model);
        Ok(())
    }

    fn read_alias(&mut self, start: &BytesStart<'_>) -> Result<(), ParseError> {
        let attributes: BTreeMap<_, _> = attributes(start, false)?.into_iter().collect();
        let alias = required(&attributes, "Alias", "Alias")?;
        let node_id: NodeId = self.read_text()?.parse()?;
        self.aliases.insert(alias, node_id);
        Ok(())
    }

    fn read_node(
        &mut self,
        start: &BytesStart<'_>,
        kind: NodeKind,
        empty: bool,
    ) -> Result<(), ParseError> {
        let element = kind.element_name();
        let mut attributes: BTreeMap<_, _> = attributes(start, false)?.into_iter().collect();

        let node_id = self.resolve(&required(&attributes, element, "NodeId")?)?;
        attributes.remove("NodeId");

        let browse_name = attributes.remove("BrowseName").unwrap_or_default();
        let (index, name) = QualifiedName::split_indexed(&browse_name);
        let browse_namespace = self.namespace(index, &browse_name)?.to_string();

        let mut node = Node::new(node_id, kind, name);
        node.browse_name = QualifiedName::new(browse_namespace, name);
        node.parent = attributes
            .remove("ParentNodeId")
            .map(|id| self.resolve(&id))
            .transpose()?;
        node.data_type = attributes
            .remove("DataType")
            .map(|id| self.resolve(&id))
            .transpose()?;
        node.attributes = attributes
            .into_iter()
            .map(|(key, value)| {
                canonicalize_payload(&value, &self.namespace_uris).map(|(value, _)| (key, value))
            })
            .collect::<Result<_, _>>()?;

        if !empty {
            loop {
                match self.reader.read_event()? {
                    Event::Start(child) => match local_name(&child).as_str() {
                        "DisplayName" => node.display_name = self.read_text()?,
                        "Description" => node.description = Some(self.read_text()?),
                        "References" => node.references = self.read_references()?,
                        _ => node.payloads.push(self.read_payload(&child, false)?),
                    },
                    Event::Empty(child) => match local_name(&child).as_str() {
                        "DisplayName" | "Description" | "References" => {}
                        _ => node.payloads.push(self.read_payload(&child, true)?),
                    },
                    Event::End(_) => break,
                    Event::Eof => return Err(ParseError::UnexpectedEof),
                    _ => {}
                }
            }
        }

        self.nodes.push(node);
        Ok(())
    }

    fn read_references(&mut self) -> Result<Vec<Reference>, ParseError> {
        let mut references = Vec::new();
        loop {
            match self.reader.read_event()? {
                Event::Start(start) if local_name(&start) == "Reference" => {
                    let attributes: BTreeMap<_, _> =
                        attributes(&start, false)?.into_iter().collect();
                    let reference_type =
                        self.resolve(&required(&attributes, "Reference", "ReferenceType")?)?;
                    let is_forward = attributes
                        .get("IsForward")
                        .is_none_or(|value| !value.eq_ignore_ascii_case("false"));
                    let text = self.read_text()?;
                    let target = self.resolve(&text)?;
                    references.push(Reference {
                        reference_type,
                        target,
                        is_forward,
                    });
                }
                Event::Start(start) => {
                    self.reader.read_to_end(start.name())?;
                }
                Event::End(_) => return Ok(references),
                Event::Eof => return Err(ParseError::UnexpectedEof),
                _ => {}
            }
        }
    }

    fn read_payload(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<Payload, ParseError> {
        let element = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = attributes(start, true)?;

        let inner = if empty {
            ""
        } else {
            let span = self.reader.read_to_end(start.name())?;
            usize::try_from(span.start)
                .ok()
                .zip(usize::try_from(span.end).ok())
                .and_then(|(from, to)| self.input.get(from..to))
                .ok_or(ParseError::UnexpectedEof)?
        };

        let (inner_xml, namespaces) = canonicalize_payload(inner, &self.namespace_uris)?;
        Ok(Payload {
            element,
            attributes,
            inner_xml,
            namespaces,
        })
    }

    /// Collects the text content up to the end of the current element,
    /// skipping nested elements.
    fn read_text(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.reader.read_event()? {
                Event::Text(content) => text.push_str(&content.unescape()?),
                Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content)),
                Event::Start(start) => {
                    self.reader.read_to_end(start.name())?;
                }
                Event::End(_) => return Ok(text),
                Event::Eof => return Err(ParseError::UnexpectedEof),
                _ => {}
            }
        }
    }

    /// Resolves an alias or node id text against this document.
    fn resolve(&self, text: &str) -> Result<ExpandedNodeId, ParseError> {
        let text = text.trim();
        let node_id = match self.aliases.get(text) {
            Some(node_id) => node_id.clone(),
            None => text.parse::<NodeId>()?,
        };
        let namespace = self.namespace(node_id.namespace_index, text)?;
        Ok(ExpandedNodeId::new(namespace, node_id.identifier))
    }

    fn namespace(&self, index: u16, context: &str) -> Result<&str, ParseError> {
        self.namespace_uris
            .get(usize::from(index))
            .map(String::as_str)
            .ok_or_else(|| ParseError::UnknownNamespaceIndex {
                index,
                context: context.to_string(),
            })
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attributes(
    start: &BytesStart<'_>,
    keep_namespace_declarations: bool,
) -> Result<Vec<(String, String)>, ParseError> {
    let mut out = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = attribute.key.as_ref();
        if !keep_namespace_declarations && key.starts_with(b"xmlns") {
            continue;
        }
        let key = String::from_utf8_lossy(key).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn required(
    attributes: &BTreeMap<String, String>,
    element: &str,
    attribute: &'static str,
) -> Result<String, ParseError> {
    attributes
        .get(attribute)
        .cloned()
        .ok_or_else(|| ParseError::MissingAttribute {
            element: element.to_string(),
            attribute,
        })
}

fn required_model(start: &BytesStart<'_>) -> Result<RequiredModel, ParseError> {
    let attributes: BTreeMap<_, _> = attributes(start, false)?.into_iter().collect();
    Ok(RequiredModel {
        namespace_uri: required(&attributes, "RequiredModel", "ModelUri")?,
        version: attributes.get("Version").cloned(),
        publication_date: attributes
            .get("PublicationDate")
            .map(|date| parse_date(date))
            .transpose()?,
    })
}

fn parse_date(text: &str) -> Result<DateTime<Utc>, ParseError> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|date| date.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").map(|date| date.and_utc())
        })
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        })
        .map_err(|_| ParseError::Date(text.to_string()))
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rewrites `ns=<index>;` prefixes inside raw payload XML to `nsu=<uri>;`
/// and collects every namespace URI the payload refers to.
pub(crate) fn canonicalize_payload(
    inner: &str,
    namespace_uris: &[String],
) -> Result<(String, BTreeSet<String>), ParseError> {
    let mut namespaces = BTreeSet::new();

    for captures in NAMESPACE_INDEX.captures_iter(inner) {
        let index: u16 = captures[1]
            .parse()
            .map_err(|_| NodeIdError::NamespaceIndex(captures[0].to_string()))?;
        let uri = namespace_uris.get(usize::from(index)).ok_or_else(|| {
            ParseError::UnknownNamespaceIndex {
                index,
                context: captures[0].to_string(),
            }
        })?;
        namespaces.insert(uri.clone());
    }
    for captures in NAMESPACE_URI.captures_iter(inner) {
        namespaces.insert(unescape(&captures[1])?.into_owned());
    }

    let canonical = NAMESPACE_INDEX.replace_all(inner, |captures: &Captures<'_>| {
        // Indices were validated above.
        let index: usize = captures[1].parse().unwrap_or_default();
        let uri = namespace_uris.get(index).map_or("", String::as_str);
        format!("nsu={};", escape(uri))
    });

    Ok((canonical.into_owned(), namespaces))
}

/// Rewrites `nsu=<uri>;` prefixes inside canonical payload XML to indices in
/// `table`, appending namespaces as needed. Standard namespace prefixes are
/// dropped.
pub(crate) fn index_payload(inner: &str, table: &mut NamespaceTable) -> String {
    NAMESPACE_URI
        .replace_all(inner, |captures: &Captures<'_>| {
            let uri = unescape(&captures[1]).map_or_else(
                |_| captures[1].to_string(),
                std::borrow::Cow::into_owned,
            );
            match table.get_or_append(&uri) {
                0 => String::new(),
                index => format!("ns={index};"),
            }
        })
        .into_owned()
}

/// Serializes an exported document.
///
/// # Errors
///
/// Returns an error if the XML writer fails.
pub fn write(document: &Document) -> Result<String, WriteError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("UANodeSet");
    root.push_attribute(("xmlns", NODESET_XMLNS));
    writer.write_event(Event::Start(root))?;

    if !document.namespace_uris.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("NamespaceUris")))?;
        for uri in &document.namespace_uris {
            write_text_element(&mut writer, BytesStart::new("Uri"), uri)?;
        }
        writer.write_event(Event::End(BytesEnd::new("NamespaceUris")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("Models")))?;
    let header = &document.model;
    let mut model = BytesStart::new("Model");
    push_model_attributes(
        &mut model,
        &header.namespace_uri,
        header.version.as_deref(),
        header.publication_date.as_ref(),
    );
    if header.required_models.is_empty() {
        writer.write_event(Event::Empty(model))?;
    } else {
        writer.write_event(Event::Start(model))?;
        for entry in &header.required_models {
            let mut required = BytesStart::new("RequiredModel");
            push_model_attributes(
                &mut required,
                &entry.model.namespace_uri,
                entry.model.version.as_deref(),
                entry.model.publication_date.as_ref(),
            );
            writer.write_event(Event::Empty(required))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Model")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("Models")))?;

    if !document.aliases.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("Aliases")))?;
        for alias in &document.aliases {
            let mut start = BytesStart::new("Alias");
            start.push_attribute(("Alias", alias.alias.as_str()));
            write_text_element(&mut writer, start, &alias.node_id.to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new("Aliases")))?;
    }

    for node in &document.nodes {
        write_node(&mut writer, node)?;
    }

    writer.write_event(Event::End(BytesEnd::new("UANodeSet")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

fn push_model_attributes(
    start: &mut BytesStart<'_>,
    namespace_uri: &str,
    version: Option<&str>,
    publication_date: Option<&DateTime<Utc>>,
) {
    start.push_attribute(("ModelUri", namespace_uri));
    if let Some(version) = version {
        start.push_attribute(("Version", version));
    }
    if let Some(date) = publication_date {
        start.push_attribute(("PublicationDate", format_date(date).as_str()));
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &ExportedNode) -> Result<(), WriteError> {
    let element = node.kind.element_name();
    let mut start = BytesStart::new(element);
    start.push_attribute(("NodeId", node.node_id.to_string().as_str()));
    start.push_attribute(("BrowseName", node.browse_name.as_str()));
    if let Some(parent) = &node.parent_node_id {
        start.push_attribute(("ParentNodeId", parent.as_str()));
    }
    if let Some(data_type) = &node.data_type {
        start.push_attribute(("DataType", data_type.as_str()));
    }
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    writer.write_event(Event::Start(start))?;

    write_text_element(writer, BytesStart::new("DisplayName"), &node.display_name)?;
    if let Some(description) = &node.description {
        write_text_element(writer, BytesStart::new("Description"), description)?;
    }

    if !node.references.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("References")))?;
        for reference in &node.references {
            let mut start = BytesStart::new("Reference");
            start.push_attribute(("ReferenceType", reference.reference_type.as_str()));
            if !reference.is_forward {
                start.push_attribute(("IsForward", "false"));
            }
            write_text_element(writer, start, &reference.target)?;
        }
        writer.write_event(Event::End(BytesEnd::new("References")))?;
    }

    for payload in &node.payloads {
        let mut start = BytesStart::new(payload.element.as_str());
        for (key, value) in &payload.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if payload.inner_xml.is_empty() {
            writer.write_event(Event::Empty(start))?;
        } else {
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::from_escaped(payload.inner_xml.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new(payload.element.as_str())))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new(element)))?;
    Ok(())
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    start: BytesStart<'_>,
    text: &str,
) -> Result<(), WriteError> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Errors that can occur when reading a nodeset document.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// An attribute is malformed.
    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),

    /// An escape sequence is malformed.
    #[error("malformed XML escape: {0}")]
    Escape(#[from] EscapeError),

    /// The document has no `UANodeSet` root element.
    #[error("document is not a UANodeSet")]
    NotANodeSet,

    /// The document ended inside an element.
    #[error("unexpected end of document")]
    UnexpectedEof,

    /// A required attribute is missing.
    #[error("<{element}> is missing the {attribute} attribute")]
    MissingAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: &'static str,
    },

    /// A node id references a namespace index the document does not declare.
    #[error("namespace index {index} in '{context}' is not declared by the document")]
    UnknownNamespaceIndex {
        /// The undeclared index.
        index: u16,
        /// The text containing it.
        context: String,
    },

    /// A node id is malformed.
    #[error(transparent)]
    NodeId(#[from] NodeIdError),

    /// A model violates a model invariant, such as depending on itself.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A publication date could not be parsed.
    #[error("invalid publication date '{0}'")]
    Date(String),
}

/// Errors that can occur when writing a nodeset document.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The XML writer failed.
    #[error("failed to write XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The underlying sink failed.
    #[error("failed to write XML: {0}")]
    Io(#[from] std::io::Error),

    /// The writer produced invalid UTF-8.
    #[error("writer produced invalid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::Identifier;

    const PUMPS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<UANodeSet xmlns="http://opcfoundation.org/UA/2011/03/UANodeSet.xsd"
           xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <NamespaceUris>
    <Uri>urn:example:pumps</Uri>
    <Uri>urn:example:devices</Uri>
  </NamespaceUris>
  <Models>
    <Model ModelUri="urn:example:pumps" Version="1.0.2" PublicationDate="2023-04-01T00:00:00Z">
      <RequiredModel ModelUri="http://opcfoundation.org/UA/" Version="1.05.02" />
      <RequiredModel ModelUri="urn:example:devices" PublicationDate="2022-01-01" />
    </Model>
  </Models>
  <Aliases>
    <Alias Alias="HasComponent">i=47</Alias>
    <Alias Alias="HasSubtype">i=45</Alias>
    <Alias Alias="DeviceType">ns=2;i=1002</Alias>
  </Aliases>
  <UAObjectType NodeId="ns=1;i=1001" BrowseName="1:PumpType" IsAbstract="false">
    <DisplayName Locale="en">PumpType &amp; Co</DisplayName>
    <References>
      <Reference ReferenceType="HasSubtype" IsForward="false">DeviceType</Reference>
      <Reference ReferenceType="HasComponent">ns=1;i=6001</Reference>
    </References>
  </UAObjectType>
  <UAVariable NodeId="ns=1;i=6001" BrowseName="Speed" ParentNodeId="ns=1;i=1001" DataType="i=11">
    <DisplayName>Speed</DisplayName>
    <Value>
      <ExtensionObject xmlns="http://opcfoundation.org/UA/2008/02/Types.xsd">
        <TypeId><Identifier>ns=2;i=5005</Identifier></TypeId>
      </ExtensionObject>
    </Value>
  </UAVariable>
</UANodeSet>"#;

    #[test]
    fn parses_models_and_dependencies() {
        let nodeset = parse(PUMPS).unwrap();
        assert_eq!(
            nodeset.namespace_uris,
            [UA_NAMESPACE, "urn:example:pumps", "urn:example:devices"]
        );

        let [model] = nodeset.models.as_slice() else {
            panic!("expected exactly one model");
        };
        assert_eq!(model.namespace_uri, "urn:example:pumps");
        assert_eq!(model.version.as_deref(), Some("1.0.2"));
        assert_eq!(
            model.publication_date,
            Some(Utc.with_ymd_and_hms(2023, 4, 1, 0, 0, 0).unwrap())
        );

        let deps = model.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].namespace_uri, UA_NAMESPACE);
        assert_eq!(
            deps[1].publication_date,
            Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn resolves_aliases_and_namespace_indices() {
        let nodeset = parse(PUMPS).unwrap();
        let model = &nodeset.models[0];

        let pump_type = model.node(&Identifier::Numeric(1001)).unwrap();
        assert_eq!(pump_type.kind, NodeKind::ObjectType);
        assert_eq!(pump_type.display_name, "PumpType & Co");
        assert_eq!(pump_type.browse_name, QualifiedName::new("urn:example:pumps", "PumpType"));
        assert_eq!(pump_type.attributes.get("IsAbstract").map(String::as_str), Some("false"));

        let subtype = &pump_type.references[0];
        assert!(!subtype.is_forward);
        assert_eq!(subtype.reference_type, ExpandedNodeId::numeric(UA_NAMESPACE, 45));
        assert_eq!(subtype.target, ExpandedNodeId::numeric("urn:example:devices", 1002));
        assert_eq!(
            pump_type.references[1].reference_type,
            ExpandedNodeId::numeric(UA_NAMESPACE, 47)
        );

        let speed = model.node(&Identifier::Numeric(6001)).unwrap();
        assert_eq!(speed.browse_name.namespace, UA_NAMESPACE);
        assert_eq!(speed.parent, Some(ExpandedNodeId::numeric("urn:example:pumps", 1001)));
        assert_eq!(speed.data_type, Some(ExpandedNodeId::numeric(UA_NAMESPACE, 11)));
    }

    #[test]
    fn payload_node_ids_are_canonicalized() {
        let nodeset = parse(PUMPS).unwrap();
        let speed = nodeset.models[0].node(&Identifier::Numeric(6001)).unwrap();

        let [value] = speed.payloads.as_slice() else {
            panic!("expected a single payload");
        };
        assert_eq!(value.element, "Value");
        assert!(value.inner_xml.contains("nsu=urn:example:devices;i=5005"));
        assert!(!value.inner_xml.contains("ns=2;"));
        assert_eq!(
            value.namespaces.iter().collect::<Vec<_>>(),
            ["urn:example:devices"]
        );
    }

    #[test]
    fn index_payload_reverses_canonicalization() {
        let uris = vec![UA_NAMESPACE.to_string(), "urn:a".to_string()];
        let (canonical, _) =
            canonicalize_payload("<Id>ns=1;i=5</Id><Id>ns=0;i=7</Id>", &uris).unwrap();
        assert_eq!(canonical, format!("<Id>nsu=urn:a;i=5</Id><Id>nsu={UA_NAMESPACE};i=7</Id>"));

        let mut table = NamespaceTable::new();
        table.get_or_append("urn:other");
        assert_eq!(index_payload(&canonical, &mut table), "<Id>ns=2;i=5</Id><Id>i=7</Id>");
    }

    #[test]
    fn infers_models_without_metadata() {
        let text = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:legacy</Uri></NamespaceUris>
  <UAObject NodeId="ns=1;i=1" BrowseName="1:Thing" />
</UANodeSet>"#;
        let nodeset = parse(text).unwrap();
        assert_eq!(nodeset.models.len(), 1);
        assert_eq!(nodeset.models[0].namespace_uri, "urn:legacy");
        assert_eq!(nodeset.models[0].node_count(), 1);
        assert!(nodeset.models[0].version.is_none());
    }

    #[test]
    fn orphan_nodes_become_diagnostics() {
        let text = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:a</Uri><Uri>urn:b</Uri></NamespaceUris>
  <Models><Model ModelUri="urn:a" /></Models>
  <UAObject NodeId="ns=2;i=1" BrowseName="2:Stray" />
</UANodeSet>"#;
        let nodeset = parse(text).unwrap();
        assert_eq!(nodeset.models[0].node_count(), 0);
        assert_eq!(nodeset.models[0].diagnostics.len(), 1);
        assert!(nodeset.models[0].diagnostics[0].contains("nsu=urn:b;i=1"));
    }

    #[test]
    fn header_stops_before_nodes() {
        let models = read_header(PUMPS).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].node_count(), 0);
        assert_eq!(models[0].dependencies().len(), 2);
    }

    #[test]
    fn rejects_self_dependency() {
        let text = r#"<UANodeSet><Models>
  <Model ModelUri="urn:a"><RequiredModel ModelUri="urn:a" /></Model>
</Models></UANodeSet>"#;
        assert!(matches!(
            parse(text),
            Err(ParseError::Model(ModelError::SelfDependency(_)))
        ));
    }

    #[test]
    fn rejects_undeclared_namespace_index() {
        let text = r#"<UANodeSet><UAObject NodeId="ns=4;i=1" BrowseName="Thing" /></UANodeSet>"#;
        assert!(matches!(
            parse(text),
            Err(ParseError::UnknownNamespaceIndex { index: 4, .. })
        ));
    }

    #[test]
    fn rejects_non_nodesets() {
        assert!(matches!(parse("just some text"), Err(ParseError::NotANodeSet)));
        assert!(matches!(parse("<Other />"), Err(ParseError::NotANodeSet)));
        assert!(parse("<UANodeSet><Models>").is_err());
    }

    #[test]
    fn aliases_must_be_declared_by_the_document() {
        let text = r#"<UANodeSet>
  <NamespaceUris><Uri>urn:a</Uri></NamespaceUris>
  <UAObject NodeId="ns=1;i=1" BrowseName="1:One">
    <References><Reference ReferenceType="HasSubtype">i=58</Reference></References>
  </UAObject>
</UANodeSet>"#;
        assert!(matches!(parse(text), Err(ParseError::NodeId(_))));

        let declared = text.replace(
            "<UAObject",
            r#"<Aliases><Alias Alias="HasSubtype">i=45</Alias></Aliases><UAObject"#,
        );
        let nodeset = parse(&declared).unwrap();
        let node = nodeset.models[0].node(&Identifier::Numeric(1)).unwrap();
        assert_eq!(node.references[0].reference_type, ExpandedNodeId::numeric(UA_NAMESPACE, 45));
    }

    #[test]
    fn rejects_bad_dates() {
        let text = r#"<UANodeSet><Models><Model ModelUri="urn:a" PublicationDate="yesterday" /></Models></UANodeSet>"#;
        assert!(matches!(parse(text), Err(ParseError::Date(_))));
    }
}
