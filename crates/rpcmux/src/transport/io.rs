//! Stream transport over any reader/writer pair.

use std::io::{self, Read, Write};

use tracing::debug;

use super::{RawRequest, TRANSPORT_TARGET, Transport};
use crate::sniff::ContentKind;

/// Default upper bound on request size.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

const FALLBACK_ENCODING: &str = "ISO-8859-1";

/// Transport reading a whole request from `R` and writing the response to
/// `W`. Every method is authorised.
#[derive(Debug)]
pub struct IoTransport<R, W> {
    reader: R,
    writer: W,
    encoding: String,
    namespace_hint: Option<String>,
    max_request_bytes: usize,
}

impl<R: Read, W: Write> IoTransport<R, W> {
    /// Wraps a reader and writer. The encoding starts as UTF-8.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            encoding: String::from("UTF-8"),
            namespace_hint: None,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }

    /// Supplies a namespace hint for bare method names.
    #[must_use]
    pub fn with_namespace_hint(mut self, hint: impl Into<String>) -> Self {
        self.namespace_hint = Some(hint.into());
        self
    }

    /// Caps the request size.
    #[must_use]
    pub fn with_max_request_bytes(mut self, limit: usize) -> Self {
        self.max_request_bytes = limit;
        self
    }

    /// Releases the writer, e.g. to inspect an in-memory buffer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn read_body(&mut self) -> io::Result<String> {
        let mut buffer = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = read_with_retry(&mut self.reader, &mut chunk)?;
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(chunk.get(..read).unwrap_or_default());
            if buffer.len() > self.max_request_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request exceeds maximum size",
                ));
            }
        }
        String::from_utf8(buffer).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
    }
}

fn read_with_retry(reader: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

/// Maps an encoding name onto one suitable for an XML declaration.
///
/// Windows code pages (`Cp1252`, ...) become `ISO-8859-1`; `ISO-*` and
/// `UTF-*` names are kept; anything else becomes `ISO-8859-1`.
#[must_use]
pub fn normalize_encoding(name: &str) -> String {
    if name.starts_with("ISO-") || name.starts_with("UTF-") {
        name.to_owned()
    } else {
        FALLBACK_ENCODING.to_owned()
    }
}

impl<R: Read, W: Write> Transport for IoTransport<R, W> {
    fn read_request(&mut self, declared: Option<ContentKind>) -> io::Result<RawRequest> {
        let body = self.read_body()?;
        debug!(target: TRANSPORT_TARGET, bytes = body.len(), "read request");
        Ok(RawRequest {
            content_type: declared.map(|kind| kind.mime_type().to_owned()),
            body,
            namespace_hint: self.namespace_hint.clone(),
        })
    }

    fn check_authorization(&self, _method: &str) -> bool {
        true
    }

    fn write_response(&mut self, _content_type: &str, body: &str, _chunked: bool) -> io::Result<()> {
        self.writer.write_all(body.as_bytes())?;
        self.writer.flush()
    }

    fn encoding(&self) -> Option<String> {
        Some(normalize_encoding(&self.encoding))
    }

    fn set_encoding(&mut self, encoding: &str) {
        self.encoding = encoding.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rstest::rstest;

    use super::*;

    struct Interrupting {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn reads_whole_body_and_echoes_declared_type() {
        let body = "x".repeat(3000);
        let mut transport =
            IoTransport::new(Cursor::new(body.clone()), Vec::new()).with_namespace_hint("/TEST");
        let request = transport
            .read_request(Some(ContentKind::XmlRpc))
            .expect("read");
        assert_eq!(request.body, body);
        assert_eq!(request.content_type.as_deref(), Some("text/xml"));
        assert_eq!(request.namespace_hint.as_deref(), Some("/TEST"));
    }

    #[test]
    fn retries_interrupted_reads() {
        let reader = Interrupting {
            interrupted: false,
            inner: Cursor::new(b"{}".to_vec()),
        };
        let mut transport = IoTransport::new(reader, Vec::new());
        let request = transport.read_request(None).expect("read");
        assert_eq!(request.body, "{}");
        assert_eq!(request.content_type, None);
    }

    #[test]
    fn rejects_oversized_requests() {
        let mut transport =
            IoTransport::new(Cursor::new(vec![b'a'; 2048]), Vec::new()).with_max_request_bytes(100);
        let error = transport.read_request(None).expect_err("too large");
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn writes_body_verbatim() {
        let mut transport = IoTransport::new(Cursor::new(Vec::new()), Vec::new());
        transport
            .write_response("text/xml", "<a/>", true)
            .expect("write");
        assert_eq!(transport.into_writer(), b"<a/>");
    }

    #[rstest]
    #[case::code_page("Cp1252", "ISO-8859-1")]
    #[case::latin("ISO-8859-15", "ISO-8859-15")]
    #[case::utf("UTF-16", "UTF-16")]
    #[case::other("KOI8-R", "ISO-8859-1")]
    fn normalises_encodings(#[case] name: &str, #[case] expected: &str) {
        let mut transport = IoTransport::new(Cursor::new(Vec::new()), Vec::new());
        transport.set_encoding(name);
        assert_eq!(transport.encoding().as_deref(), Some(expected));
    }
}
