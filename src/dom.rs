//! Owned XML tree used to read input GPX files and compose the merged output.
//!
//! Elements own their children directly, so importing a node from one
//! document into another is a deep clone of the subtree. Parsing and
//! serialization go through quick-xml.

use std::collections::BTreeSet;
use std::path::Path;

use quick_xml::events::{
    BytesCData, BytesDecl, BytesEnd, BytesPI, BytesRef, BytesStart, BytesText, Event,
};
use quick_xml::{Reader, Writer};

use crate::error::XmlError;

type Result<T> = std::result::Result<T, XmlError>;

/// A single `name="value"` pair, namespace declarations included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// A child of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    /// Processing instruction content: target and data, without `<?` `?>`.
    PI(String),
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// An XML element with its attributes and children in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<Attribute>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// `<name>text</name>`, or `<name/>` when `text` is empty.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        let text = text.into();
        if !text.is_empty() {
            element.children.push(Node::Text(text));
        }
        element
    }

    /// Qualified name, including any prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> Option<&str> {
        prefix_of(&self.name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Set an attribute, replacing the value in place if it already exists.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|attr| attr.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn append_child(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|element| element.name == name)
    }

    /// Concatenated text and CDATA content of the direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) | Node::CData(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// All descendants named `tag`, in document order. The element itself is
    /// not included.
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect(tag, &mut found);
        found
    }

    fn collect<'a>(&'a self, tag: &str, found: &mut Vec<&'a Element>) {
        for child in self.child_elements() {
            if child.name == tag {
                found.push(child);
            }
            child.collect(tag, found);
        }
    }

    pub fn count_descendants(&self, tag: &str) -> usize {
        self.child_elements()
            .map(|child| usize::from(child.name == tag) + child.count_descendants(tag))
            .sum()
    }

    /// Call `f` on every descendant named `tag`, in document order.
    pub fn for_each_descendant_mut<F>(&mut self, tag: &str, f: &mut F)
    where
        F: FnMut(&mut Element),
    {
        for node in &mut self.children {
            if let Node::Element(child) = node {
                if child.name == tag {
                    f(child);
                }
                child.for_each_descendant_mut(tag, f);
            }
        }
    }

    /// Detach the descendants named `tag` whose ordinal in the document-order
    /// sequence returned by [`Element::find_all`] is listed in `ordinals`.
    ///
    /// Ordinals always refer to positions before any removal, so the result
    /// does not depend on the order in which nodes are detached. Returns the
    /// number of elements removed.
    pub fn remove_descendants(&mut self, tag: &str, ordinals: &BTreeSet<usize>) -> usize {
        let mut seen = 0;
        self.remove_matching(tag, ordinals, &mut seen)
    }

    fn remove_matching(
        &mut self,
        tag: &str,
        ordinals: &BTreeSet<usize>,
        seen: &mut usize,
    ) -> usize {
        let mut removed = 0;
        let mut kept = Vec::with_capacity(self.children.len());

        for node in std::mem::take(&mut self.children) {
            let mut child = match node {
                Node::Element(child) => child,
                other => {
                    kept.push(other);
                    continue;
                }
            };

            if child.name == tag {
                let ordinal = *seen;
                *seen += 1;
                if ordinals.contains(&ordinal) {
                    // Nested matches go with their ancestor but still occupy ordinals.
                    *seen += child.count_descendants(tag);
                    removed += 1;
                    continue;
                }
            }

            removed += child.remove_matching(tag, ordinals, seen);
            kept.push(Node::Element(child));
        }

        self.children = kept;
        removed
    }

    /// Collect prefixes used in this subtree that no declaration inside the
    /// subtree binds at the point of use.
    fn collect_unbound_prefixes<'a>(
        &'a self,
        scope: &mut Vec<&'a str>,
        unbound: &mut BTreeSet<&'a str>,
    ) {
        let depth = scope.len();
        scope.extend(
            self.attributes
                .iter()
                .filter_map(|attr| attr.name.strip_prefix("xmlns:")),
        );

        let attribute_prefixes = self
            .attributes
            .iter()
            .filter(|attr| !attr.name.starts_with("xmlns:"))
            .filter_map(|attr| prefix_of(&attr.name));
        for prefix in self.prefix().into_iter().chain(attribute_prefixes) {
            if !scope.contains(&prefix) {
                unbound.insert(prefix);
            }
        }

        for child in self.child_elements() {
            child.collect_unbound_prefixes(scope, unbound);
        }
        scope.truncate(depth);
    }
}

fn prefix_of(name: &str) -> Option<&str> {
    name.split_once(':').map(|(prefix, _)| prefix)
}

/// A whole XML document: a single root element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Read and parse a UTF-8 file. See [`Document::from_bytes`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Parse raw file content.
    ///
    /// Only UTF-8 input is supported, with or without a byte order mark. A
    /// file that declares another encoding is still accepted when its bytes
    /// are valid UTF-8 (plain ASCII, for instance); anything else fails with
    /// [`XmlError::Utf8`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(std::str::from_utf8(bytes)?)
    }

    /// Parse XML text into a tree.
    ///
    /// Whitespace-only text between elements is dropped. Entity and character
    /// references are resolved into the surrounding text.
    pub fn parse(xml: &str) -> Result<Self> {
        let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut text = String::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    flush_text(&mut stack, &mut text);
                    stack.push(start_element(&e)?);
                }
                Event::Empty(e) => {
                    flush_text(&mut stack, &mut text);
                    let element = start_element(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    flush_text(&mut stack, &mut text);
                    // The reader rejects mismatched end tags, so the top of
                    // the stack is the element being closed.
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element)?;
                    }
                }
                Event::Text(e) => {
                    if !stack.is_empty() {
                        text.push_str(std::str::from_utf8(e.as_ref())?);
                    }
                }
                Event::GeneralRef(e) => {
                    if !stack.is_empty() {
                        text.push(resolve_reference(&e)?);
                    }
                }
                Event::CData(e) => {
                    flush_text(&mut stack, &mut text);
                    if let Some(parent) = stack.last_mut() {
                        let content = std::str::from_utf8(e.as_ref())?;
                        parent.children.push(Node::CData(content.to_string()));
                    }
                }
                Event::Comment(e) => {
                    flush_text(&mut stack, &mut text);
                    if let Some(parent) = stack.last_mut() {
                        let content = std::str::from_utf8(e.as_ref())?;
                        parent.children.push(Node::Comment(content.to_string()));
                    }
                }
                Event::PI(e) => {
                    flush_text(&mut stack, &mut text);
                    if let Some(parent) = stack.last_mut() {
                        let content = std::str::from_utf8(e.as_ref())?;
                        parent.children.push(Node::PI(content.to_string()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::UnexpectedEof {
                open: open.name.clone(),
            });
        }

        root.map(Self::new).ok_or(XmlError::MissingRoot)
    }

    /// All elements named `tag` in document order, the root included.
    pub fn find_all<'a>(&'a self, tag: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        if self.root.name == tag {
            found.push(&self.root);
        }
        self.root.collect(tag, &mut found);
        found
    }

    /// Deep-copy `element` from `source` so it can be appended to this
    /// document.
    ///
    /// Namespace declarations that the subtree relies on but inherits from
    /// the source root are copied onto the imported element, unless this
    /// document's root already declares the same binding.
    pub fn import_node(&self, source: &Document, element: &Element) -> Element {
        let mut imported = element.clone();

        let mut unbound = BTreeSet::new();
        element.collect_unbound_prefixes(&mut Vec::new(), &mut unbound);

        for prefix in unbound {
            if matches!(prefix, "xml" | "xmlns") {
                continue;
            }
            let declaration = format!("xmlns:{prefix}");
            let Some(uri) = source.root.attribute(&declaration) else {
                continue;
            };
            if self.root.attribute(&declaration) != Some(uri) {
                imported.set_attribute(declaration, uri);
            }
        }

        if imported.attribute("xmlns").is_none() {
            if let Some(uri) = source.root.attribute("xmlns") {
                if self.root.attribute("xmlns") != Some(uri) {
                    imported.set_attribute("xmlns", uri);
                }
            }
        }

        imported
    }

    /// Serialize with an XML declaration and two-space indentation.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("no"))))?;
        write_element(&mut writer, &self.root)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn to_xml_string(&self) -> Result<String> {
        String::from_utf8(self.serialize()?).map_err(|e| XmlError::Utf8(e.utf8_error()))
    }
}

fn start_element(e: &BytesStart<'_>) -> Result<Element> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut element = Element::new(name);

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(quick_xml::Error::from)?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
        element.attributes.push(Attribute {
            name: key,
            value: value.into_owned(),
        });
    }

    Ok(element)
}

/// Hand a finished element to its parent, or make it the root.
fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(XmlError::MultipleRoots),
    }
    Ok(())
}

fn flush_text(stack: &mut [Element], text: &mut String) {
    if text.is_empty() {
        return;
    }
    let content = std::mem::take(text);
    if content.trim().is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Text(content));
    }
}

fn resolve_reference(e: &BytesRef<'_>) -> Result<char> {
    if let Some(ch) = e.resolve_char_ref().map_err(quick_xml::Error::from)? {
        return Ok(ch);
    }
    let name = std::str::from_utf8(e.as_ref())?;
    match name {
        "amp" => Ok('&'),
        "lt" => Ok('<'),
        "gt" => Ok('>'),
        "quot" => Ok('"'),
        "apos" => Ok('\''),
        _ => Err(XmlError::UnknownEntity(name.to_string())),
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for attr in &element.attributes {
        start.push_attribute((attr.name.as_str(), attr.value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(nested) => write_element(writer, nested)?,
            Node::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
            Node::CData(text) => writer.write_event(Event::CData(BytesCData::new(text.as_str())))?,
            Node::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?
            }
            Node::PI(content) => writer.write_event(Event::PI(BytesPI::new(content.as_str())))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
