//! Minimal element tree read and written with quick-xml's event API
//!
//! Element names in topology documents are data (component and relation
//! types), so documents are parsed into a generic [`XmlElement`] tree first
//! and interpreted afterwards.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::XmlError;

/// One XML element with its attributes (in document order) and child
/// elements. Text content is not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Set an attribute, replacing an existing value for the same key.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First attribute present among `keys`, tried in order.
    pub fn attr_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.attr(k))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parse a document and return its root element.
    pub fn parse(xml: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader
                .read_event()
                .map_err(|e| XmlError::Parse(e.to_string()))?
            {
                Event::Start(start) => stack.push(Self::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Parse("unbalanced end tag".to_string()))?;
                    Self::attach(&mut stack, &mut root, element)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError::Parse(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| XmlError::Parse("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlElement, XmlError> {
        let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| XmlError::Parse(e.to_string()))?
                .into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        element: XmlElement,
    ) -> Result<(), XmlError> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => {
                return Err(XmlError::Parse(format!(
                    "second root element <{}>",
                    element.name
                )))
            }
        }
        Ok(())
    }

    /// Serialize this element as a document. `indent == 0` writes everything
    /// on one line.
    pub fn to_document(&self, indent: usize, declaration: bool) -> Result<String, XmlError> {
        let mut writer = if indent > 0 {
            Writer::new_with_indent(Vec::new(), b' ', indent)
        } else {
            Writer::new(Vec::new())
        };
        if declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(|e| XmlError::Serialize(e.to_string()))?;
        }
        self.write(&mut writer)?;
        String::from_utf8(writer.into_inner()).map_err(|e| XmlError::Serialize(e.to_string()))
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() {
            writer
                .write_event(Event::Empty(start))
                .map_err(|e| XmlError::Serialize(e.to_string()))?;
            return Ok(());
        }
        writer
            .write_event(Event::Start(start))
            .map_err(|e| XmlError::Serialize(e.to_string()))?;
        for child in &self.children {
            child.write(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| XmlError::Serialize(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let xml = r#"<?xml version="1.0"?>
<sys-sage>
  <Components>
    <Chip id="0" name="socket &amp; die" vendor="GenuineIntel">
      <Attribute name="CATcos" value="3"/>
    </Chip>
  </Components>
  <Relations/>
</sys-sage>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "sys-sage");
        assert_eq!(root.children.len(), 2);

        let chip = &root.child("Components").unwrap().children[0];
        assert_eq!(chip.attr("name"), Some("socket & die"));
        assert_eq!(chip.attr_any(&["model", "vendor"]), Some("GenuineIntel"));
        assert_eq!(chip.children_named("Attribute").count(), 1);
        assert!(root.child("Relations").unwrap().children.is_empty());
    }

    #[test]
    fn test_parse_rejects_broken_documents() {
        assert!(matches!(XmlElement::parse("<a><b></a>"), Err(XmlError::Parse(_))));
        assert!(matches!(XmlElement::parse("<a>"), Err(XmlError::Parse(_))));
        assert!(matches!(XmlElement::parse("<a/><b/>"), Err(XmlError::Parse(_))));
        assert!(matches!(XmlElement::parse(""), Err(XmlError::Parse(_))));
    }

    #[test]
    fn test_write_then_parse_preserves_tree() {
        let doc = XmlElement::new("root").with_child(
            XmlElement::new("NUMA")
                .with_attr("id", 1)
                .with_attr("name", "a<b>")
                .with_child(XmlElement::new("Core").with_attr("id", 2)),
        );
        for indent in [0, 2] {
            let text = doc.to_document(indent, true).unwrap();
            assert!(text.starts_with("<?xml"));
            assert_eq!(XmlElement::parse(&text).unwrap(), doc);
        }
        let compact = doc.to_document(0, false).unwrap();
        assert!(!compact.contains('\n'));
    }

    #[test]
    fn test_set_attr_replaces() {
        let mut e = XmlElement::new("Cache").with_attr("cache_size", 1);
        e.set_attr("cache_size", 2);
        assert_eq!(e.attributes, vec![("cache_size".to_string(), "2".to_string())]);
    }
}
