//! XML document handling
//!
//! This module builds the in-memory tree that both grammar compilation and
//! validation consume. Unlike a data-binding tree, validation needs ordered
//! mixed content (text and element children interleaved) and fully resolved
//! namespaces, so elements keep their children as a sequence of [`XmlNode`]s
//! and names are resolved against the in-scope declarations at parse time.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, QName};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

/// A node in element content: either a child element or a run of text
#[derive(Debug, Clone)]
pub enum XmlNode {
    /// Child element
    Element(Element),
    /// Character data
    Text(String),
}

impl XmlNode {
    /// Check whether this node is whitespace-only text
    pub fn is_whitespace(&self) -> bool {
        match self {
            XmlNode::Text(s) => s.chars().all(|c| c.is_whitespace()),
            XmlNode::Element(_) => false,
        }
    }
}

/// XML Element in the document tree
#[derive(Debug, Clone)]
pub struct Element {
    /// Element qualified name, resolved against in-scope declarations
    pub qname: QName,
    /// Element attributes in document order (namespace declarations excluded)
    pub attributes: Vec<(QName, String)>,
    /// Ordered content: child elements and text runs
    pub children: Vec<XmlNode>,
    /// In-scope namespace declarations at this element
    pub namespaces: NamespaceContext,
}

impl Element {
    /// Create a new element
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            attributes: Vec::new(),
            children: Vec::new(),
            namespaces: NamespaceContext::new(),
        }
    }

    /// Get the local name of the element
    pub fn local_name(&self) -> &str {
        &self.qname.local_name
    }

    /// Get the namespace of the element
    pub fn namespace(&self) -> Option<&str> {
        self.qname.namespace.as_deref()
    }

    /// Get an attribute value by local name (any namespace)
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(qname, _)| qname.local_name == name)
            .map(|(_, value)| value.as_str())
    }

    /// Get an attribute value by qualified name
    pub fn get_attribute_qname(&self, qname: &QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(q, _)| q == qname)
            .map(|(_, value)| value.as_str())
    }

    /// Child elements, skipping text nodes
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Concatenated text content of all direct text children
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(s) = node {
                out.push_str(s);
            }
        }
        out
    }

    /// Check whether the element has no child elements and no non-whitespace text
    pub fn is_empty(&self) -> bool {
        self.children.iter().all(|n| n.is_whitespace())
    }

    /// Add a child node
    ///
    /// Adjacent text runs, as produced by CDATA sections or comments splitting
    /// character data, are merged into one node so that the element's text
    /// content is validated as a single string.
    pub fn push_node(&mut self, node: XmlNode) {
        if let (XmlNode::Text(incoming), Some(XmlNode::Text(last))) =
            (&node, self.children.last_mut())
        {
            last.push_str(incoming);
            return;
        }
        self.children.push(node);
    }
}

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    /// Root element of the document
    pub root: Option<Element>,
}

impl Document {
    /// Create a new empty document
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Parse an XML document from a string
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse(xml.as_bytes())
    }

    /// Parse an XML document from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            Error::Resource(format!(
                "Failed to read file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::parse(&bytes)
    }

    /// Parse an XML document from bytes with default limits
    pub fn parse(xml: &[u8]) -> Result<Self> {
        Self::parse_with_limits(xml, &Limits::default())
    }

    /// Parse an XML document from bytes, enforcing the given limits
    pub fn parse_with_limits(xml: &[u8], limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = Reader::from_reader(xml);
        reader.trim_text(false);

        let mut doc = Document::new();
        let mut element_stack: Vec<Element> = Vec::new();
        let mut scope_stack: Vec<NamespaceContext> = vec![NamespaceContext::new()];
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    limits.check_xml_depth(element_stack.len() + 1)?;
                    let scope = scope_stack.last().map(|s| s.child_scope()).unwrap_or_default();
                    let (element, scope) = parse_element(&e, scope, limits)?;
                    scope_stack.push(scope);
                    element_stack.push(element);
                }
                Ok(Event::End(_)) => {
                    scope_stack.pop();
                    if let Some(current) = element_stack.pop() {
                        attach(&mut doc, &mut element_stack, current)?;
                    }
                }
                Ok(Event::Empty(e)) => {
                    limits.check_xml_depth(element_stack.len() + 1)?;
                    let scope = scope_stack.last().map(|s| s.child_scope()).unwrap_or_default();
                    let (element, _scope) = parse_element(&e, scope, limits)?;
                    attach(&mut doc, &mut element_stack, element)?;
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?
                            .to_string();
                        current.push_node(XmlNode::Text(text));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = element_stack.last_mut() {
                        let text = std::str::from_utf8(&e.into_inner())
                            .map_err(|e| Error::Xml(format!("Invalid CDATA: {}", e)))?
                            .to_string();
                        current.push_node(XmlNode::Text(text));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::Xml(format!(
                        "Error parsing XML at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {} // Comments, processing instructions, declarations
            }
            buf.clear();
        }

        if !element_stack.is_empty() {
            return Err(Error::Xml("Unexpected end of document".to_string()));
        }

        Ok(doc)
    }

    /// Get the root element
    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn attach(doc: &mut Document, stack: &mut Vec<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.push_node(XmlNode::Element(element));
        Ok(())
    } else if doc.root.is_none() {
        doc.root = Some(element);
        Ok(())
    } else {
        Err(Error::Xml("Multiple root elements".to_string()))
    }
}

/// Build an Element from a start tag, resolving names against the given scope
fn parse_element(
    start: &BytesStart,
    mut scope: NamespaceContext,
    limits: &Limits,
) -> Result<(Element, NamespaceContext)> {
    let name_bytes = start.name();
    let name = std::str::from_utf8(name_bytes.as_ref())
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
        .to_string();

    // First pass: namespace declarations, so sibling attributes resolve
    let mut plain_attrs: Vec<(String, String)> = Vec::new();
    for attr_result in start.attributes() {
        let attr =
            attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;

        let attr_name = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
            .to_string();

        let attr_value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
            .to_string();

        if attr_name == "xmlns" {
            scope.set_default_namespace(&attr_value);
        } else if let Some(prefix) = attr_name.strip_prefix("xmlns:") {
            scope.add_prefix(prefix, &attr_value);
        } else {
            plain_attrs.push((attr_name, attr_value));
        }
    }

    limits.check_attributes(plain_attrs.len())?;

    let qname = scope.resolve(&name)?;
    let mut element = Element::new(qname);

    for (attr_name, attr_value) in plain_attrs {
        let attr_qname = scope.resolve_attribute(&attr_name)?;
        element.attributes.push((attr_qname, attr_value));
    }

    element.namespaces = scope.clone();
    Ok((element, scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let doc = Document::new();
        assert!(doc.root.is_none());
    }

    #[test]
    fn test_parse_simple_xml() {
        let xml = r#"<root><child>text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.local_name(), "root");
        let children: Vec<_> = root.child_elements().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].local_name(), "child");
        assert_eq!(children[0].text(), "text");
    }

    #[test]
    fn test_adjacent_text_runs_are_merged() {
        let doc = Document::from_string("<n>12<![CDATA[34]]></n>").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert!(matches!(&root.children[0], XmlNode::Text(s) if s == "1234"));

        // A comment splitting character data must not split the text node
        let doc = Document::from_string("<n>12<!-- split -->34</n>").unwrap();
        let root = doc.root.unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.text(), "1234");
    }

    #[test]
    fn test_parse_with_attributes() {
        let xml = r#"<root attr1="value1" attr2="value2"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.get_attribute("attr1"), Some("value1"));
        assert_eq!(root.get_attribute("attr2"), Some("value2"));
    }

    #[test]
    fn test_default_namespace_applies_to_elements_only() {
        let xml = r#"<root xmlns="http://example.com" id="r1"><child/></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.namespace(), Some("http://example.com"));

        // Attributes never take the default namespace
        let (attr_qname, _) = &root.attributes[0];
        assert_eq!(attr_qname.namespace, None);

        // The default namespace is inherited by children
        let child = root.child_elements().next().unwrap();
        assert_eq!(child.namespace(), Some("http://example.com"));
    }

    #[test]
    fn test_prefixed_namespaces() {
        let xml = r#"<a:root xmlns:a="http://a.example"><a:child b:x="1" xmlns:b="http://b.example"/></a:root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.namespace(), Some("http://a.example"));

        let child = root.child_elements().next().unwrap();
        let (attr_qname, value) = &child.attributes[0];
        assert_eq!(attr_qname.namespace.as_deref(), Some("http://b.example"));
        assert_eq!(value, "1");
    }

    #[test]
    fn test_mixed_content_order_is_preserved() {
        let xml = r#"<p>one<b>two</b>three</p>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root.unwrap();
        assert_eq!(root.children.len(), 3);
        assert!(matches!(&root.children[0], XmlNode::Text(t) if t == "one"));
        assert!(matches!(&root.children[1], XmlNode::Element(e) if e.local_name() == "b"));
        assert!(matches!(&root.children[2], XmlNode::Text(t) if t == "three"));
    }

    #[test]
    fn test_whitespace_detection() {
        assert!(XmlNode::Text("  \n\t".to_string()).is_whitespace());
        assert!(!XmlNode::Text(" x ".to_string()).is_whitespace());
    }

    #[test]
    fn test_depth_limit() {
        let mut limits = Limits::default();
        limits.max_xml_depth = 2;

        let xml = r#"<a><b><c/></b></a>"#;
        let result = Document::parse_with_limits(xml.as_bytes(), &limits);
        assert!(result.is_err());
    }

    #[test]
    fn test_unbalanced_document_is_rejected() {
        let result = Document::from_string("<root><child></root>");
        assert!(result.is_err());
    }
}
