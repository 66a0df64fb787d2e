//! Owned, arena-based XML tree.
//!
//! Schemas, intermediate pipeline results, compiled programs, validated
//! documents and reports all use this one representation. Nodes live in a flat
//! vector and refer to each other by [`NodeId`], which keeps the tree cheap to
//! clone and trivially `Send + Sync`.

use crate::core::error::TreeError;
use std::fmt;

/// Namespace bound to the `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the document arena.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    /// Namespace URI, `None` for names in no namespace.
    pub namespace: Option<String>,
    /// Prefix used when serializing.
    pub prefix: Option<String>,
    /// Local part of the name.
    pub local: String,
}

impl QName {
    /// A name in no namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            prefix: None,
            local: local.into(),
        }
    }

    /// A name in `namespace`, serialized with `prefix`.
    pub fn ns(namespace: &str, prefix: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            prefix: prefix.map(str::to_string),
            local: local.into(),
        }
    }

    /// Check namespace and local name, ignoring the prefix.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    /// The lexical `prefix:local` form.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.clone(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: QName,
    /// Attribute value.
    pub value: String,
}

/// A namespace declaration carried by an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// Declared prefix, `None` for the default namespace.
    pub prefix: Option<String>,
    /// Namespace URI.
    pub uri: String,
}

/// Element payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element name.
    pub name: QName,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element.
    pub namespaces: Vec<Namespace>,
}

/// The kind of a node together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The document node; always at index 0.
    Document,
    /// An element.
    Element(Element),
    /// Character data.
    Text(String),
    /// A comment.
    Comment(String),
    /// A processing instruction.
    ProcessingInstruction {
        /// PI target.
        target: String,
        /// PI content.
        data: String,
    },
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An XML document tagged with the locator it was loaded from.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    origin: Option<String>,
}

impl Document {
    /// Create an empty document holding only the document node.
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            origin: None,
        }
    }

    /// Parse XML text. `origin` becomes the document's locator.
    pub fn parse(text: &str, origin: Option<&str>) -> Result<Self, TreeError> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let parsed = roxmltree::Document::parse_with_options(text, options).map_err(|e| {
            TreeError::Parse {
                origin: origin.map(str::to_string),
                message: e.to_string(),
            }
        })?;

        let mut doc = Document::new();
        doc.origin = origin.map(str::to_string);
        let root = doc.root();
        for child in parsed.root().children() {
            doc.import_parsed(root, child);
        }
        Ok(doc)
    }

    fn import_parsed(&mut self, parent: NodeId, node: roxmltree::Node<'_, '_>) {
        if node.is_element() {
            let tag = node.tag_name();
            let name = QName {
                namespace: tag.namespace().map(str::to_string),
                prefix: tag.namespace().and_then(|ns| lookup_prefix(&node, ns)),
                local: tag.name().to_string(),
            };

            let attributes = node
                .attributes()
                .map(|attr| Attribute {
                    name: QName {
                        namespace: attr.namespace().map(str::to_string),
                        prefix: attr.namespace().and_then(|ns| lookup_prefix(&node, ns)),
                        local: attr.name().to_string(),
                    },
                    value: attr.value().to_string(),
                })
                .collect();

            // Record only the declarations this element introduces.
            let parent_scope: Vec<(Option<&str>, &str)> = node
                .parent_element()
                .map(|p| p.namespaces().map(|ns| (ns.name(), ns.uri())).collect())
                .unwrap_or_default();
            let namespaces = node
                .namespaces()
                .filter(|ns| ns.uri() != XML_NS)
                .filter(|ns| !parent_scope.contains(&(ns.name(), ns.uri())))
                .map(|ns| Namespace {
                    prefix: ns.name().map(str::to_string),
                    uri: ns.uri().to_string(),
                })
                .collect();

            let id = self.push(
                parent,
                NodeKind::Element(Element {
                    name,
                    attributes,
                    namespaces,
                }),
            );
            for child in node.children() {
                self.import_parsed(id, child);
            }
        } else if node.is_text() {
            if let Some(text) = node.text() {
                self.append_text(parent, text);
            }
        } else if node.is_comment() {
            if let Some(text) = node.text() {
                self.push(parent, NodeKind::Comment(text.to_string()));
            }
        } else if let Some(pi) = node.pi() {
            self.push(
                parent,
                NodeKind::ProcessingInstruction {
                    target: pi.target.to_string(),
                    data: pi.value.unwrap_or_default().to_string(),
                },
            );
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    // ========================================================================
    // Origin
    // ========================================================================

    /// Locator of the source this document came from.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Replace the origin locator.
    pub fn set_origin(&mut self, origin: Option<String>) {
        self.origin = origin;
    }

    /// Builder-style [`set_origin`](Self::set_origin).
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// The document node.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The single top-level element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.element(c).is_some())
    }

    /// Number of nodes, the document node included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the document has no content besides the document node.
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    /// Kind and payload of a node.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// Element payload, if the node is an element.
    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Element name, if the node is an element.
    pub fn name(&self, id: NodeId) -> Option<&QName> {
        self.element(id).map(|e| &e.name)
    }

    /// Check whether a node is an element with the given namespace and local name.
    pub fn is_element(&self, id: NodeId, namespace: &str, local: &str) -> bool {
        self.name(id).map_or(false, |n| n.is(namespace, local))
    }

    /// Parent of a node.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Children of a node in document order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Child elements of a node.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id)
            .iter()
            .copied()
            .filter(move |&c| self.element(c).is_some())
    }

    /// All descendants of a node in document order, excluding the node itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Attributes of an element; empty for other nodes.
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        self.element(id).map(|e| e.attributes.as_slice()).unwrap_or(&[])
    }

    /// Value of a no-namespace attribute.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Find the first element carrying `id` or `xml:id` equal to `value`.
    pub fn element_by_id(&self, value: &str) -> Option<NodeId> {
        self.descendants(self.root()).find(|&n| {
            self.attributes(n).iter().any(|a| {
                a.value == value
                    && a.name.local == "id"
                    && (a.name.namespace.is_none() || a.name.namespace.as_deref() == Some(XML_NS))
            })
        })
    }

    /// XPath string-value: concatenated descendant text for elements and the
    /// document node, the content itself for other nodes.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::ProcessingInstruction { data, .. } => data.clone(),
            NodeKind::Document | NodeKind::Element(_) => {
                let mut out = String::new();
                for n in self.descendants(id) {
                    if let NodeKind::Text(t) = self.kind(n) {
                        out.push_str(t);
                    }
                }
                out
            }
        }
    }

    /// Namespace URI bound to `prefix` at `id`, looking through ancestors.
    pub fn lookup_namespace(&self, id: NodeId, prefix: Option<&str>) -> Option<&str> {
        if prefix == Some("xml") {
            return Some(XML_NS);
        }
        let mut current = Some(id);
        while let Some(n) = current {
            if let Some(e) = self.element(n) {
                if let Some(ns) = e.namespaces.iter().find(|ns| ns.prefix.as_deref() == prefix) {
                    return Some(&ns.uri);
                }
            }
            current = self.parent(n);
        }
        None
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Append a new empty element under `parent`.
    pub fn append_element(&mut self, parent: NodeId, name: QName) -> NodeId {
        self.push(
            parent,
            NodeKind::Element(Element {
                name,
                attributes: Vec::new(),
                namespaces: Vec::new(),
            }),
        )
    }

    /// Set an attribute, replacing an existing one with the same name.
    pub fn set_attribute(&mut self, id: NodeId, name: QName, value: impl Into<String>) {
        let value = value.into();
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            match e
                .attributes
                .iter_mut()
                .find(|a| a.name.local == name.local && a.name.namespace == name.namespace)
            {
                Some(existing) => existing.value = value,
                None => e.attributes.push(Attribute { name, value }),
            }
        }
    }

    /// Remove a no-namespace attribute. Returns true if it was present.
    pub fn remove_attribute(&mut self, id: NodeId, local: &str) -> bool {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            let before = e.attributes.len();
            e.attributes
                .retain(|a| !(a.name.namespace.is_none() && a.name.local == local));
            return e.attributes.len() != before;
        }
        false
    }

    /// Declare a namespace on an element.
    pub fn declare_namespace(&mut self, id: NodeId, prefix: Option<&str>, uri: &str) {
        if let NodeKind::Element(e) = &mut self.nodes[id.0].kind {
            if !e.namespaces.iter().any(|ns| ns.prefix.as_deref() == prefix) {
                e.namespaces.push(Namespace {
                    prefix: prefix.map(str::to_string),
                    uri: uri.to_string(),
                });
            }
        }
    }

    /// Append character data, merging with a preceding text sibling.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return last;
            }
        }
        self.push(parent, NodeKind::Text(text.to_string()))
    }

    /// Append a comment.
    pub fn append_comment(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.push(parent, NodeKind::Comment(text.to_string()))
    }

    /// Shallow-copy `node` from `source` under `parent`: elements keep their
    /// name, attributes and namespace declarations but not their children.
    pub fn copy_node(&mut self, parent: NodeId, source: &Document, node: NodeId) -> NodeId {
        match source.kind(node) {
            NodeKind::Document => parent,
            NodeKind::Text(t) => self.append_text(parent, t),
            kind => self.push(parent, kind.clone()),
        }
    }

    /// Deep-copy `node` from `source` under `parent`. Copying a document node
    /// copies its children. Returns the id of the copy (or `parent` for a
    /// document node).
    pub fn import(&mut self, parent: NodeId, source: &Document, node: NodeId) -> NodeId {
        match source.kind(node) {
            NodeKind::Document => {
                for &child in source.children(node) {
                    self.import(parent, source, child);
                }
                parent
            }
            NodeKind::Text(t) => self.append_text(parent, t),
            kind => {
                let id = self.push(parent, kind.clone());
                for &child in source.children(node) {
                    self.import(id, source, child);
                }
                id
            }
        }
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to XML text (no XML declaration).
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        let mut scope: Vec<(Option<String>, String)> = Vec::new();
        for &child in self.children(self.root()) {
            self.write_node(child, &mut out, &mut scope);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String, scope: &mut Vec<(Option<String>, String)>) {
        match self.kind(id) {
            NodeKind::Document => {}
            NodeKind::Text(t) => escape_into(out, t, false),
            NodeKind::Comment(t) => {
                out.push_str("<!--");
                out.push_str(t);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction { target, data } => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
            NodeKind::Element(e) => {
                let mark = scope.len();
                let mut declarations: Vec<(Option<String>, String)> = Vec::new();
                let mut declare = |prefix: Option<&str>, uri: &str, scope: &mut Vec<(Option<String>, String)>| {
                    if prefix == Some("xml") {
                        return;
                    }
                    let bound = scope
                        .iter()
                        .rev()
                        .find(|(p, _)| p.as_deref() == prefix)
                        .map(|(_, u)| u.as_str());
                    if bound != Some(uri) {
                        scope.push((prefix.map(str::to_string), uri.to_string()));
                        declarations.push((prefix.map(str::to_string), uri.to_string()));
                    }
                };

                for ns in &e.namespaces {
                    declare(ns.prefix.as_deref(), &ns.uri, scope);
                }
                match &e.name.namespace {
                    Some(uri) => declare(e.name.prefix.as_deref(), uri, scope),
                    None if e.name.prefix.is_none() => {
                        let default_bound = scope
                            .iter()
                            .rev()
                            .find(|(p, _)| p.is_none())
                            .map_or(false, |(_, u)| !u.is_empty());
                        if default_bound {
                            declare(None, "", scope);
                        }
                    }
                    None => {}
                }
                for attr in &e.attributes {
                    if let (Some(uri), Some(prefix)) = (&attr.name.namespace, &attr.name.prefix) {
                        declare(Some(prefix.as_str()), uri, scope);
                    }
                }

                out.push('<');
                out.push_str(&e.name.qualified());
                for (prefix, uri) in &declarations {
                    match prefix {
                        Some(p) => {
                            out.push_str(" xmlns:");
                            out.push_str(p);
                        }
                        None => out.push_str(" xmlns"),
                    }
                    out.push_str("=\"");
                    escape_into(out, uri, true);
                    out.push('"');
                }
                for attr in &e.attributes {
                    out.push(' ');
                    out.push_str(&attr.name.qualified());
                    out.push_str("=\"");
                    escape_into(out, &attr.value, true);
                    out.push('"');
                }

                let children = self.children(id);
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in children {
                        self.write_node(child, out, scope);
                    }
                    out.push_str("</");
                    out.push_str(&e.name.qualified());
                    out.push('>');
                }
                scope.truncate(mark);
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

/// Pre-order iterator over descendants.
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        self.stack.extend(self.doc.children(next).iter().rev().copied());
        Some(next)
    }
}

fn lookup_prefix(node: &roxmltree::Node<'_, '_>, namespace: &str) -> Option<String> {
    if namespace == XML_NS {
        return Some("xml".to_string());
    }
    node.lookup_prefix(namespace).map(str::to_string)
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<root xmlns:a="urn:a"><a:item id="1">one</a:item><item>two<!--c--></item></root>"#;

    #[test]
    fn test_parse_and_navigate() {
        let doc = Document::parse(SAMPLE, Some("sample.xml")).unwrap();
        assert_eq!(doc.origin(), Some("sample.xml"));

        let root = doc.document_element().unwrap();
        assert_eq!(doc.name(root).unwrap().local, "root");

        let items: Vec<_> = doc.child_elements(root).collect();
        assert_eq!(items.len(), 2);
        assert!(doc.is_element(items[0], "urn:a", "item"));
        assert_eq!(doc.name(items[0]).unwrap().qualified(), "a:item");
        assert_eq!(doc.attribute(items[0], "id"), Some("1"));
        assert_eq!(doc.string_value(root), "onetwo");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = Document::parse("<a><b><c/></b><d/></a>", None).unwrap();
        let names: Vec<_> = doc
            .descendants(doc.root())
            .filter_map(|n| doc.name(n).map(|q| q.local.clone()))
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let doc = Document::parse(SAMPLE, None).unwrap();
        let reparsed = Document::parse(&doc.to_xml(), None).unwrap();
        assert_eq!(reparsed.to_xml(), doc.to_xml());
    }

    #[test]
    fn test_built_tree_declares_namespaces() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.append_element(root, QName::ns("urn:x", Some("x"), "top"));
        doc.set_attribute(el, QName::local("n"), "a<b");
        doc.append_text(el, "t&");
        assert_eq!(doc.to_xml(), r#"<x:top xmlns:x="urn:x" n="a&lt;b">t&amp;</x:top>"#);
    }

    #[test]
    fn test_import_copies_subtree() {
        let source = Document::parse("<a><b k='v'>x</b></a>", None).unwrap();
        let mut target = Document::new();
        let root = target.root();
        let wrapper = target.append_element(root, QName::local("w"));
        let b = source.child_elements(source.document_element().unwrap()).next().unwrap();
        target.import(wrapper, &source, b);
        assert_eq!(target.to_xml(), r#"<w><b k="v">x</b></w>"#);
    }

    #[test]
    fn test_malformed_xml() {
        let err = Document::parse("<a><b></a>", Some("bad.xml")).unwrap_err();
        assert!(matches!(err, TreeError::Parse { .. }));
    }

    #[test]
    fn test_element_by_id() {
        let doc = Document::parse(r#"<a><b id="x"/><c xml:id="y"/></a>"#, None).unwrap();
        assert!(doc.element_by_id("x").is_some());
        assert!(doc.element_by_id("y").is_some());
        assert!(doc.element_by_id("z").is_none());
    }
}
