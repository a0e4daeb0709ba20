// Message framing for the Hypertext Transfer Protocol, version 1.x.
// See [RFC 2616] sections 4 through 6.
//
// [RFC 2616]: https://tools.ietf.org/html/rfc2616

use core::fmt;
use std::sync::OnceLock;

use super::{Datagram, Error, Result};
use crate::builder::BuildError;

pub const PORT: u16 = 80;

const CRLF: &[u8] = b"\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";
const VERSION_PREFIX: &[u8] = b"HTTP/";

/// A protocol version such as `HTTP/1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_1_0: Version = Version { major: 1, minor: 0 };
    pub const HTTP_1_1: Version = Version { major: 1, minor: 1 };

    fn parse(text: &[u8]) -> Result<Version> {
        let digits = text.strip_prefix(VERSION_PREFIX).ok_or(Error)?;
        match *digits {
            [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit() => {
                Ok(Version {
                    major: major - b'0',
                    minor: minor - b'0',
                })
            }
            _ => Err(Error),
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::HTTP_1_1
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// The first line of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request {
        method: String,
        uri: String,
        version: Version,
    },
    Response {
        version: Version,
        status_code: u16,
        reason: Vec<u8>,
    },
}

impl Default for StartLine {
    fn default() -> Self {
        StartLine::Request {
            method: "GET".into(),
            uri: "/".into(),
            version: Version::default(),
        }
    }
}

/// Token characters, which make up methods and field names.
fn is_token(text: &[u8]) -> bool {
    !text.is_empty()
        && text.iter().all(|&octet| {
            octet.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&octet)
        })
}

fn split_once(text: &[u8], separator: u8) -> Option<(&[u8], &[u8])> {
    let at = text.iter().position(|&octet| octet == separator)?;
    Some((&text[..at], &text[at + 1..]))
}

impl StartLine {
    fn parse(line: &[u8]) -> Result<StartLine> {
        let (first, rest) = split_once(line, b' ').ok_or(Error)?;
        if first.starts_with(VERSION_PREFIX) {
            let version = Version::parse(first)?;
            let (code, reason) = split_once(rest, b' ').ok_or(Error)?;
            if code.len() != 3 || !code.iter().all(u8::is_ascii_digit) {
                return Err(Error);
            }
            let status_code = code.iter().fold(0, |acc, &d| acc * 10 + (d - b'0') as u16);
            Ok(StartLine::Response {
                version,
                status_code,
                reason: reason.to_vec(),
            })
        } else {
            let (uri, version) = split_once(rest, b' ').ok_or(Error)?;
            if !is_token(first) || uri.is_empty() || !uri.iter().all(u8::is_ascii_graphic) {
                return Err(Error);
            }
            Ok(StartLine::Request {
                method: String::from_utf8(first.to_vec()).map_err(|_| Error)?,
                uri: String::from_utf8(uri.to_vec()).map_err(|_| Error)?,
                version: Version::parse(version)?,
            })
        }
    }

    fn emit(&self, out: &mut Vec<u8>) -> core::result::Result<(), BuildError> {
        match self {
            StartLine::Request {
                method,
                uri,
                version,
            } => {
                if !is_token(method.as_bytes()) {
                    return Err(BuildError::Mismatch {
                        what: "HTTP method is not a token",
                    });
                }
                if uri.is_empty() || !uri.bytes().all(|octet| octet.is_ascii_graphic()) {
                    return Err(BuildError::Mismatch {
                        what: "HTTP request URI is empty or holds whitespace",
                    });
                }
                out.extend_from_slice(format!("{method} {uri} {version}").as_bytes());
            }
            StartLine::Response {
                version,
                status_code,
                reason,
            } => {
                BuildError::check_range("HTTP status code", *status_code, 999u16)?;
                if reason.contains(&b'\r') || reason.contains(&b'\n') {
                    return Err(BuildError::Mismatch {
                        what: "HTTP reason phrase spans lines",
                    });
                }
                out.extend_from_slice(format!("{version} {status_code:03} ").as_bytes());
                out.extend_from_slice(reason);
            }
        }
        out.extend_from_slice(CRLF);
        Ok(())
    }
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StartLine::Request {
                method,
                uri,
                version,
            } => write!(f, "{method} {uri} {version}"),
            StartLine::Response {
                version,
                status_code,
                reason,
            } => write!(
                f,
                "{version} {status_code:03} {}",
                String::from_utf8_lossy(reason)
            ),
        }
    }
}

/// A header field. The value excludes surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: Vec<u8>,
}

impl Field {
    pub fn new(name: &str, value: impl Into<Vec<u8>>) -> Field {
        Field {
            name: name.into(),
            value: value.into(),
        }
    }

    fn parse(line: &[u8]) -> Result<Field> {
        let (name, value) = split_once(line, b':').ok_or(Error)?;
        if !is_token(name) {
            return Err(Error);
        }
        Ok(Field {
            name: String::from_utf8(name.to_vec()).map_err(|_| Error)?,
            value: value.trim_ascii().to_vec(),
        })
    }

    fn emit(&self, out: &mut Vec<u8>) -> core::result::Result<(), BuildError> {
        if !is_token(self.name.as_bytes()) {
            return Err(BuildError::Mismatch {
                what: "HTTP field name is not a token",
            });
        }
        if self.value.contains(&b'\r') || self.value.contains(&b'\n') {
            return Err(BuildError::Mismatch {
                what: "HTTP field value spans lines",
            });
        }
        out.extend_from_slice(self.name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(&self.value);
        out.extend_from_slice(CRLF);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    start_line: StartLine,
    fields: Vec<Field>,
    len: usize,
}

fn parse_header(bytes: &[u8]) -> Result<Header> {
    let end = bytes
        .windows(HEADER_END.len())
        .position(|window| window == HEADER_END)
        .ok_or(Error)?;
    let mut lines = bytes[..end].split(|&octet| octet == b'\n').map(|line| {
        line.strip_suffix(b"\r").unwrap_or(line)
    });
    let start_line = StartLine::parse(lines.next().ok_or(Error)?)?;
    let fields = lines.map(Field::parse).collect::<Result<Vec<_>>>()?;
    Ok(Header {
        start_line,
        fields,
        len: end + HEADER_END.len(),
    })
}

/// A read-only view of an HTTP message, or of the part of one that a
/// single segment carries.
#[derive(Debug, Clone)]
pub struct HttpDatagram<'a> {
    bytes: &'a [u8],
    header: OnceLock<Option<Header>>,
}

impl<'a> HttpDatagram<'a> {
    fn header(&self) -> Option<&Header> {
        self.header
            .get_or_init(|| parse_header(self.bytes).ok())
            .as_ref()
    }

    pub fn start_line(&self) -> Option<&StartLine> {
        self.header().map(|header| &header.start_line)
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line(), Some(StartLine::Request { .. }))
    }

    pub fn is_response(&self) -> bool {
        matches!(self.start_line(), Some(StartLine::Response { .. }))
    }

    pub fn fields(&self) -> &[Field] {
        self.header().map_or(&[], |header| &header.fields)
    }

    /// Look up the first field named `name`, ignoring case.
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.fields()
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| &field.value[..])
    }

    /// The octets after the empty line, or nothing if the header is not
    /// terminated.
    pub fn body(&self) -> &'a [u8] {
        self.header().map_or(&[], |header| &self.bytes[header.len..])
    }
}

impl<'a> Datagram<'a> for HttpDatagram<'a> {
    type Layer = HttpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        HttpDatagram {
            bytes,
            header: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    fn is_valid(&self) -> bool {
        self.header().is_some()
    }

    fn extract_layer(&self) -> HttpLayer {
        match self.header() {
            Some(header) => HttpLayer {
                start_line: header.start_line.clone(),
                fields: header.fields.clone(),
                body: self.body().to_vec(),
            },
            None => HttpLayer {
                body: self.bytes.to_vec(),
                ..HttpLayer::default()
            },
        }
    }
}

/// An HTTP message under construction. Fields are written as
/// `name: value`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HttpLayer {
    pub start_line: StartLine,
    pub fields: Vec<Field>,
    pub body: Vec<u8>,
}

impl HttpLayer {
    fn encode(&self) -> core::result::Result<Vec<u8>, BuildError> {
        let mut out = Vec::new();
        self.start_line.emit(&mut out)?;
        for field in &self.fields {
            field.emit(&mut out)?;
        }
        out.extend_from_slice(CRLF);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn buffer_len(&self) -> usize {
        self.encode().map_or(0, |bytes| bytes.len())
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        let bytes = self.encode()?;
        if bytes.len() != buffer.len() {
            return Err(BuildError::Mismatch {
                what: "HTTP message length",
            });
        }
        buffer.copy_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static REQUEST_BYTES: &[u8] =
        b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";

    static RESPONSE_BYTES: &[u8] =
        b"HTTP/1.0 404 Not Found\r\nContent-Length: 5\r\n\r\nhello";

    #[test]
    fn test_request() {
        let view = HttpDatagram::new(REQUEST_BYTES);
        assert!(view.is_valid());
        assert!(view.is_request());
        assert_eq!(
            view.start_line(),
            Some(&StartLine::Request {
                method: "GET".into(),
                uri: "/index.html".into(),
                version: Version::HTTP_1_1,
            })
        );
        assert_eq!(view.field("host"), Some(&b"example.com"[..]));
        assert_eq!(view.fields().len(), 2);
        assert!(view.body().is_empty());

        let layer = view.extract_layer();
        assert_eq!(layer.buffer_len(), REQUEST_BYTES.len());
        let mut bytes = vec![0; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, REQUEST_BYTES);
    }

    #[test]
    fn test_response() {
        let view = HttpDatagram::new(RESPONSE_BYTES);
        assert!(view.is_valid());
        assert!(view.is_response());
        assert_eq!(
            view.start_line(),
            Some(&StartLine::Response {
                version: Version::HTTP_1_0,
                status_code: 404,
                reason: b"Not Found".to_vec(),
            })
        );
        assert_eq!(view.body(), b"hello");
        assert_eq!(
            view.start_line().unwrap().to_string(),
            "HTTP/1.0 404 Not Found"
        );
    }

    #[test]
    fn test_unterminated() {
        let view = HttpDatagram::new(&REQUEST_BYTES[..REQUEST_BYTES.len() - 2]);
        assert!(!view.is_valid());
        assert_eq!(view.start_line(), None);
        assert!(view.body().is_empty());
        assert_eq!(view.extract_layer().body, &REQUEST_BYTES[..REQUEST_BYTES.len() - 2]);
    }

    #[test]
    fn test_malformed_start_line() {
        assert!(!HttpDatagram::new(b"GET\r\n\r\n").is_valid());
        assert!(!HttpDatagram::new(b"GET / HTTP/x.1\r\n\r\n").is_valid());
        assert!(!HttpDatagram::new(b"HTTP/1.1 20 OK\r\n\r\n").is_valid());
        assert!(!HttpDatagram::new(b"GET / HTTP/1.1\r\nno colon\r\n\r\n").is_valid());
        assert!(HttpDatagram::new(b"HTTP/1.1 204 \r\n\r\n").is_valid());
    }

    #[test]
    fn test_emit_rejects_line_breaks() {
        let layer = HttpLayer {
            fields: vec![Field::new("X-Bad", "a\r\nb")],
            ..HttpLayer::default()
        };
        let mut bytes = vec![0; 64];
        assert!(matches!(layer.emit(&mut bytes), Err(BuildError::Mismatch { .. })));
    }

    #[test]
    fn test_build_response() {
        let layer = HttpLayer {
            start_line: StartLine::Response {
                version: Version::HTTP_1_0,
                status_code: 404,
                reason: b"Not Found".to_vec(),
            },
            fields: vec![Field::new("Content-Length", "5")],
            body: b"hello".to_vec(),
        };
        let mut bytes = vec![0; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, RESPONSE_BYTES);
    }
}
