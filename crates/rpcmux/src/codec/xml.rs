//! Minimal XML tree reader and text normalisation shared by the XML codecs.
//!
//! Documents are small RPC envelopes, so they are read into an owned tree of
//! [`Element`]s keyed by local name. Namespace prefixes are dropped:
//! `soap:Envelope` and `s:Envelope` both read as `Envelope`.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

use super::CodecError;
use crate::sniff::ContentKind;

/// Deepest element nesting accepted in a document.
pub(crate) const MAX_DEPTH: usize = 128;

/// Element with its children and concatenated character data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Character data directly inside this element, unescaped.
    pub(crate) fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn children(&self) -> &[Element] {
        &self.children
    }

    /// First child with local name `name`.
    pub(crate) fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Follows a path of child names.
    pub(crate) fn descend(&self, path: &[&str]) -> Option<&Element> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }
}

/// Reads `text` into a tree and returns the root element.
///
/// Documents nested deeper than [`MAX_DEPTH`] elements are rejected, which
/// keeps every recursive walk over the tree shallow.
pub(crate) fn parse_document(text: &str, protocol: ContentKind) -> Result<Element, CodecError> {
    let mut reader = Reader::from_str(text);
    let mut open: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(CodecError::malformed(protocol, "content after root element"));
                }
                if open.len() >= MAX_DEPTH {
                    return Err(CodecError::malformed(protocol, "document nested too deeply"));
                }
                open.push(Element::named(&start));
            }
            Event::Empty(start) => {
                close(Element::named(&start), &mut open, &mut root, protocol)?;
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| CodecError::malformed(protocol, "unbalanced end tag"))?;
                close(element, &mut open, &mut root, protocol)?;
            }
            Event::Text(text) => {
                let unescaped = text.unescape()?;
                append_text(&mut open, &unescaped, protocol)?;
            }
            Event::CData(data) => {
                append_text(&mut open, &String::from_utf8_lossy(&data), protocol)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
        }
    }

    if !open.is_empty() {
        return Err(CodecError::malformed(protocol, "unclosed element"));
    }
    root.ok_or_else(|| CodecError::malformed(protocol, "empty document"))
}

fn close(
    element: Element,
    open: &mut [Element],
    root: &mut Option<Element>,
    protocol: ContentKind,
) -> Result<(), CodecError> {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CodecError::malformed(protocol, "multiple root elements")),
    }
    Ok(())
}

fn append_text(open: &mut [Element], text: &str, protocol: ContentKind) -> Result<(), CodecError> {
    match open.last_mut() {
        Some(current) => current.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => return Err(CodecError::malformed(protocol, "text outside root element")),
    }
    Ok(())
}

/// Escapes markup characters and drops control characters other than tab,
/// line feed and carriage return.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let filtered: Cow<'_, str> = if text.chars().any(is_dropped_control) {
        Cow::Owned(text.chars().filter(|ch| !is_dropped_control(*ch)).collect())
    } else {
        Cow::Borrowed(text)
    };
    escape(filtered.as_ref()).into_owned()
}

fn is_dropped_control(ch: char) -> bool {
    ch.is_ascii_control() && !matches!(ch, '\t' | '\n' | '\r')
}
