//! Cheap wire-format detection for undeclared payloads.
//!
//! The sniffer never parses the document. It looks at the first significant
//! character to tell JSON from XML, and at the last three significant
//! characters to tell a SOAP envelope (`...Envelope>`) from an XML-RPC call.

use std::fmt;

/// Wire formats understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// JSON-RPC 2.0.
    Json,
    /// XML-RPC.
    XmlRpc,
    /// SOAP 1.1 envelope.
    Soap,
}

impl ContentKind {
    /// Canonical content type declared for requests of this kind.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::XmlRpc => "text/xml",
            Self::Soap => "application/soap+xml",
        }
    }

    /// Maps a declared content type onto a wire format.
    ///
    /// Returns `None` for an empty declaration so the caller can sniff.
    /// Parameters after `;` are ignored. Unknown types fall back to JSON.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "" => None,
            "text/xml" => Some(Self::XmlRpc),
            "application/soap+xml" => Some(Self::Soap),
            _ => Some(Self::Json),
        }
    }

    /// Short protocol name used in logs and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json-rpc",
            Self::XmlRpc => "xml-rpc",
            Self::Soap => "soap-rpc",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

const SOAP_TAIL: [char; 3] = ['p', 'e', '>'];

/// Classifies a raw payload.
#[must_use]
pub fn classify(text: &str) -> ContentKind {
    let is_xml = text
        .chars()
        .find(|character| u32::from(*character) > 33)
        .is_some_and(|character| character == '<');
    if !is_xml {
        return ContentKind::Json;
    }

    let mut tail = [' '; 3];
    let mut slot = tail.len();
    for character in text.chars().rev() {
        if slot == tail.len() && u32::from(character) <= 33 {
            continue;
        }
        slot -= 1;
        if let Some(entry) = tail.get_mut(slot) {
            *entry = character;
        }
        if slot == 0 {
            break;
        }
    }

    if tail == SOAP_TAIL {
        ContentKind::Soap
    } else {
        ContentKind::XmlRpc
    }
}
