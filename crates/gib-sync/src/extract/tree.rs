//! Minimal in-memory XML element tree
//!
//! Built with `quick-xml`. Element names are stored without their namespace
//! prefix, so `<ns2:User>` and `<User>` are the same element to every lookup
//! below. Attribute names keep their prefix: `xsi:type` and `type` are
//! distinct. Namespace declarations (`xmlns`, `xmlns:*`) are dropped.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ExtractError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a whole document and return its root element
    pub fn parse<R: BufRead>(source: R) -> Result<XmlElement, ExtractError> {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);

        let mut open: Vec<XmlElement> = Vec::new();
        let mut root = None;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(source) => {
                    return Err(ExtractError::Xml {
                        position: reader.error_position(),
                        source,
                    })
                },
            };

            match event {
                Event::Start(ref start) => open.push(Self::from_start(start)),
                Event::Empty(ref start) => {
                    Self::close(&mut open, &mut root, Self::from_start(start));
                },
                Event::End(_) => {
                    if let Some(element) = open.pop() {
                        Self::close(&mut open, &mut root, element);
                    }
                },
                Event::Text(ref text) => {
                    if let Some(current) = open.last_mut() {
                        let unescaped = text.unescape().map_err(|err| ExtractError::Xml {
                            position: reader.buffer_position(),
                            source: err.into(),
                        })?;
                        current.text.push_str(&unescaped);
                    }
                },
                Event::CData(cdata) => {
                    if let Some(current) = open.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                    }
                },
                Event::Eof => break,
                _ => {},
            }
        }

        root.ok_or(ExtractError::EmptyDocument)
    }

    fn from_start(start: &BytesStart<'_>) -> XmlElement {
        let attributes = start
            .attributes()
            .flatten()
            .filter(|attr| attr.key.as_namespace_binding().is_none())
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();

        XmlElement {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        }
    }

    fn close(open: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
        match open.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {},
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Trimmed text of the first direct child with the given name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }

    /// Every element below this one (not including it) with the given name,
    /// in document order
    pub fn descendants<'a>(&'a self, name: &'a str) -> Descendants<'a> {
        Descendants {
            name,
            pending: self.children.iter().rev().collect(),
        }
    }
}

/// Pre-order walk returned by [`XmlElement::descendants`]
pub struct Descendants<'a> {
    name: &'a str,
    pending: Vec<&'a XmlElement>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(element) = self.pending.pop() {
            self.pending.extend(element.children.iter().rev());
            if element.name == self.name {
                return Some(element);
            }
        }
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> XmlElement {
        XmlElement::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_namespace_prefixes_are_stripped() {
        let root = parse(
            r#"<ns2:UserList xmlns:ns2="urn:gib:userlist" xmlns:x="urn:x">
                 <ns2:User><x:Identifier>1234567890</x:Identifier></ns2:User>
               </ns2:UserList>"#,
        );

        assert_eq!(root.name(), "UserList");
        let user = root.child("User").unwrap();
        assert_eq!(user.child_text("Identifier"), Some("1234567890"));
        assert!(root.attribute("ns2").is_none());
    }

    #[test]
    fn test_attributes_and_entities() {
        let root = parse(r#"<Document type="DespatchAdvice" x:flag="a&amp;b" xmlns:x="urn:x">Tom &amp; Co</Document>"#);

        assert_eq!(root.attribute("type"), Some("DespatchAdvice"));
        assert_eq!(root.attribute("x:flag"), Some("a&b"));
        assert!(root.attribute("flag").is_none());
        assert_eq!(root.text(), "Tom & Co");
    }

    #[test]
    fn test_prefixed_attribute_does_not_shadow_plain_one() {
        let root = parse(
            r#"<Document xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="DocumentType" type="DespatchAdvice"/>"#,
        );

        assert_eq!(root.attribute("type"), Some("DespatchAdvice"));
        assert_eq!(root.attribute("xsi:type"), Some("DocumentType"));
    }

    #[test]
    fn test_cdata_text() {
        let root = parse("<Title><![CDATA[ACME <Ltd>]]></Title>");
        assert_eq!(root.text(), "ACME <Ltd>");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let root = parse(
            "<R><A id='1'><A id='2'/></A><B><A id='3'/></B><A id='4'/></R>",
        );

        let ids: Vec<_> = root
            .descendants("A")
            .map(|a| a.attribute("id").unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);
        assert_eq!(root.descendants("R").count(), 0);
    }

    #[test]
    fn test_children_named_is_direct_only() {
        let root = parse("<D><Alias/><X><Alias/></X><Alias/></D>");
        assert_eq!(root.children_named("Alias").count(), 2);
        assert_eq!(root.descendants("Alias").count(), 3);
    }

    #[test]
    fn test_malformed_xml() {
        let result = XmlElement::parse("<UserList><User></UserList>".as_bytes());
        assert!(matches!(result, Err(ExtractError::Xml { .. })));
    }

    #[test]
    fn test_empty_document() {
        let result = XmlElement::parse("<?xml version=\"1.0\"?>".as_bytes());
        assert!(matches!(result, Err(ExtractError::EmptyDocument)));
    }
}
