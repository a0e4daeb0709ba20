// Packet implementation for the Domain Name System.
// See [RFC 1035] and [RFC 3596].
//
// [RFC 1035]: https://tools.ietf.org/html/rfc1035
// [RFC 3596]: https://tools.ietf.org/html/rfc3596

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::codec::{Reader, Writer};
use super::{Datagram, Error, Ipv4Address, Ipv6Address, Result};
use crate::builder::BuildError;
use crate::config::{DNS_MAX_NAME_LEN, DNS_MAX_POINTER_JUMPS};

pub const PORT: u16 = 53;

enum_with_unknown! {
    /// DNS OpCodes
    pub enum Opcode(u8) {
        Query  = 0x00,
        Status = 0x02,
        Notify = 0x04,
        Update = 0x05
    }
}

enum_with_unknown! {
    /// DNS response codes
    pub enum Rcode(u8) {
        NoError  = 0x00,
        FormErr  = 0x01,
        ServFail = 0x02,
        NXDomain = 0x03,
        NotImp   = 0x04,
        Refused  = 0x05,
        YXDomain = 0x06,
        YXRRSet  = 0x07,
        NXRRSet  = 0x08,
        NotAuth  = 0x09,
        NotZone  = 0x0a
    }
}

enum_with_unknown! {
    /// DNS record types
    pub enum RecordType(u16) {
        A     = 0x0001,
        Ns    = 0x0002,
        Cname = 0x0005,
        Soa   = 0x0006,
        Ptr   = 0x000c,
        Mx    = 0x000f,
        Txt   = 0x0010,
        Aaaa  = 0x001c,
        Srv   = 0x0021,
        Opt   = 0x0029,
        Any   = 0x00ff
    }
}

bitflags! {
    /// The single-bit flags of the header. The opcode and response code
    /// share the same word.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const RESPONSE = 0x8000;
        const AUTHORITATIVE = 0x0400;
        const TRUNCATED = 0x0200;
        const RECURSION_DESIRED = 0x0100;
        const RECURSION_AVAILABLE = 0x0080;
        const ZERO = 0x0040;
        const AUTHENTIC_DATA = 0x0020;
        const CHECK_DISABLED = 0x0010;
    }
}

/// The Internet class.
pub const CLASS_IN: u16 = 1;

const OPCODE_MASK: u16 = 0x7800;
const RCODE_MASK: u16 = 0x000f;

mod field {
    use crate::wire::field::*;

    pub const ID: Field = 0..2;
    pub const FLAGS: Field = 2..4;
    pub const QDCOUNT: Field = 4..6;
    pub const ANCOUNT: Field = 6..8;
    pub const NSCOUNT: Field = 8..10;
    pub const ARCOUNT: Field = 10..12;
}

pub const HEADER_LEN: usize = field::ARCOUNT.end;

/// Marks a compression pointer in the top two bits of a label length.
const POINTER_TAG: u8 = 0xc0;
/// Compression pointers address the first 16 KiB of a message.
const MAX_POINTER_TARGET: usize = 0x3fff;
const MAX_LABEL_LEN: usize = 63;

/// A read/write wrapper around a DNS message header.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with DNS packet structure.
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is smaller than the header.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn transaction_id(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::ID];
        NetworkEndian::read_u16(field)
    }

    fn raw_flags(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::FLAGS];
        NetworkEndian::read_u16(field)
    }

    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.raw_flags())
    }

    pub fn opcode(&self) -> Opcode {
        Opcode::from(((self.raw_flags() & OPCODE_MASK) >> 11) as u8)
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from((self.raw_flags() & RCODE_MASK) as u8)
    }

    pub fn question_count(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::QDCOUNT];
        NetworkEndian::read_u16(field)
    }

    pub fn answer_record_count(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::ANCOUNT];
        NetworkEndian::read_u16(field)
    }

    pub fn authority_record_count(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::NSCOUNT];
        NetworkEndian::read_u16(field)
    }

    pub fn additional_record_count(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::ARCOUNT];
        NetworkEndian::read_u16(field)
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.check_len().is_err() {
            return write!(f, "DNS (truncated)");
        }
        write!(
            f,
            "DNS id={:#06x} opcode={:?} rcode={:?} qd={} an={} ns={} ar={}",
            self.transaction_id(),
            self.opcode(),
            self.rcode(),
            self.question_count(),
            self.answer_record_count(),
            self.authority_record_count(),
            self.additional_record_count()
        )
    }
}

/// A domain name, as a sequence of labels. The root name has none.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct DomainName {
    labels: Vec<Vec<u8>>,
}

impl DomainName {
    pub const fn root() -> DomainName {
        DomainName { labels: Vec::new() }
    }

    /// Build a name from its labels, checking label and name lengths.
    pub fn from_labels<L: AsRef<[u8]>>(labels: &[L]) -> Result<DomainName> {
        let name = DomainName {
            labels: labels.iter().map(|label| label.as_ref().to_vec()).collect(),
        };
        let well_formed = name
            .labels
            .iter()
            .all(|label| !label.is_empty() && label.len() <= MAX_LABEL_LEN);
        if well_formed && name.buffer_len() <= DNS_MAX_NAME_LEN {
            Ok(name)
        } else {
            Err(Error)
        }
    }

    pub fn labels(&self) -> &[Vec<u8>] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length of the name on the wire without compression.
    pub fn buffer_len(&self) -> usize {
        self.labels.iter().map(|label| 1 + label.len()).sum::<usize>() + 1
    }

    /// Read a possibly compressed name at the reader's position. The reader
    /// must cover the whole message, as pointers are offsets from its start.
    fn parse(reader: &mut Reader) -> Result<DomainName> {
        let message = reader.data();
        let mut pos = reader.position();
        let mut resume = None;
        let mut jumps = 0;
        let mut labels = Vec::new();
        let mut len = 1;
        loop {
            let length = *message.get(pos).ok_or(Error)?;
            match length & POINTER_TAG {
                0x00 if length == 0 => {
                    pos += 1;
                    break;
                }
                0x00 => {
                    let label = message.get(pos + 1..pos + 1 + length as usize).ok_or(Error)?;
                    len += 1 + label.len();
                    if len > DNS_MAX_NAME_LEN {
                        return Err(Error);
                    }
                    labels.push(label.to_vec());
                    pos += 1 + label.len();
                }
                POINTER_TAG => {
                    let low = *message.get(pos + 1).ok_or(Error)?;
                    resume.get_or_insert(pos + 2);
                    jumps += 1;
                    if jumps > DNS_MAX_POINTER_JUMPS {
                        net_debug!("DNS name at {} loops", reader.position());
                        return Err(Error);
                    }
                    pos = ((length & !POINTER_TAG) as usize) << 8 | low as usize;
                }
                _ => return Err(Error),
            }
        }
        reader.seek(resume.unwrap_or(pos))?;
        Ok(DomainName { labels })
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return write!(f, ".");
        }
        for (index, label) in self.labels.iter().enumerate() {
            if index > 0 {
                write!(f, ".")?;
            }
            for &octet in label {
                match octet {
                    b'.' | b'\\' => write!(f, "\\{}", octet as char)?,
                    0x21..=0x7e => write!(f, "{}", octet as char)?,
                    _ => write!(f, "\\{octet:03}")?,
                }
            }
        }
        Ok(())
    }
}

/// Writes names with suffix compression against everything written before.
struct NameWriter {
    out: Vec<u8>,
    suffixes: Vec<(Vec<Vec<u8>>, u16)>,
}

impl NameWriter {
    fn new() -> NameWriter {
        NameWriter {
            out: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    fn write_name(&mut self, name: &DomainName) -> core::result::Result<(), BuildError> {
        for label in &name.labels {
            BuildError::check_len("DNS label", label.len(), MAX_LABEL_LEN)?;
        }
        BuildError::check_len("DNS name", name.buffer_len(), DNS_MAX_NAME_LEN)?;

        for index in 0..name.labels.len() {
            let suffix = &name.labels[index..];
            if let Some((_, offset)) = self.suffixes.iter().find(|(known, _)| known == suffix) {
                let pointer = (POINTER_TAG as u16) << 8 | offset;
                self.out.extend_from_slice(&pointer.to_be_bytes());
                return Ok(());
            }
            if self.out.len() <= MAX_POINTER_TARGET {
                self.suffixes.push((suffix.to_vec(), self.out.len() as u16));
            }
            let label = &name.labels[index];
            self.out.push(label.len() as u8);
            self.out.extend_from_slice(label);
        }
        self.out.push(0);
        Ok(())
    }

    fn write_u16(&mut self, value: u16) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }
}

/// An entry of the question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: DomainName,
    pub record_type: RecordType,
    pub class: u16,
}

impl Question {
    fn parse(reader: &mut Reader) -> Result<Question> {
        Ok(Question {
            name: DomainName::parse(reader)?,
            record_type: RecordType::from(reader.read_u16()?),
            class: reader.read_u16()?,
        })
    }

    fn emit(&self, writer: &mut NameWriter) -> core::result::Result<(), BuildError> {
        writer.write_name(&self.name)?;
        writer.write_u16(self.record_type.into());
        writer.write_u16(self.class);
        Ok(())
    }
}

/// The typed contents of a resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Address),
    Aaaa(Ipv6Address),
    Ns(DomainName),
    Cname(DomainName),
    Ptr(DomainName),
    Mx {
        preference: u16,
        exchange: DomainName,
    },
    /// One or more character strings.
    Txt(Vec<Vec<u8>>),
    Soa {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Unknown {
        record_type: RecordType,
        data: Vec<u8>,
    },
}

impl RecordData {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordData::A(_) => RecordType::A,
            RecordData::Aaaa(_) => RecordType::Aaaa,
            RecordData::Ns(_) => RecordType::Ns,
            RecordData::Cname(_) => RecordType::Cname,
            RecordData::Ptr(_) => RecordType::Ptr,
            RecordData::Mx { .. } => RecordType::Mx,
            RecordData::Txt(_) => RecordType::Txt,
            RecordData::Soa { .. } => RecordType::Soa,
            RecordData::Unknown { record_type, .. } => *record_type,
        }
    }

    /// Decode `len` octets of data at the reader's position.
    fn parse(reader: &mut Reader, record_type: RecordType, len: usize) -> Result<RecordData> {
        let end = reader.position() + len;
        let data = match record_type {
            RecordType::A => RecordData::A(reader.read_ipv4()?),
            RecordType::Aaaa => RecordData::Aaaa(reader.read_ipv6()?),
            RecordType::Ns => RecordData::Ns(DomainName::parse(reader)?),
            RecordType::Cname => RecordData::Cname(DomainName::parse(reader)?),
            RecordType::Ptr => RecordData::Ptr(DomainName::parse(reader)?),
            RecordType::Mx => RecordData::Mx {
                preference: reader.read_u16()?,
                exchange: DomainName::parse(reader)?,
            },
            RecordType::Txt => {
                let mut strings = Vec::new();
                while reader.position() < end || strings.is_empty() {
                    let len = reader.read_u8()?;
                    strings.push(reader.read_bytes(len as usize)?.to_vec());
                }
                RecordData::Txt(strings)
            }
            RecordType::Soa => RecordData::Soa {
                mname: DomainName::parse(reader)?,
                rname: DomainName::parse(reader)?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            _ => RecordData::Unknown {
                record_type,
                data: reader.read_bytes(len)?.to_vec(),
            },
        };
        if reader.position() != end {
            return Err(Error);
        }
        Ok(data)
    }

    fn emit(&self, writer: &mut NameWriter) -> core::result::Result<(), BuildError> {
        match self {
            RecordData::A(address) => writer.out.extend_from_slice(&address.octets()),
            RecordData::Aaaa(address) => writer.out.extend_from_slice(&address.octets()),
            RecordData::Ns(name) | RecordData::Cname(name) | RecordData::Ptr(name) => {
                writer.write_name(name)?
            }
            RecordData::Mx {
                preference,
                exchange,
            } => {
                writer.write_u16(*preference);
                writer.write_name(exchange)?;
            }
            RecordData::Txt(strings) => {
                if strings.is_empty() {
                    return Err(BuildError::Mismatch {
                        what: "DNS text record without strings",
                    });
                }
                for string in strings {
                    BuildError::check_len("DNS character string", string.len(), u8::MAX as usize)?;
                    writer.out.push(string.len() as u8);
                    writer.out.extend_from_slice(string);
                }
            }
            RecordData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_name(mname)?;
                writer.write_name(rname)?;
                for value in [serial, refresh, retry, expire, minimum] {
                    writer.write_u32(*value);
                }
            }
            RecordData::Unknown { data, .. } => writer.out.extend_from_slice(data),
        }
        Ok(())
    }
}

/// An entry of the answer, authority or additional section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub class: u16,
    /// Seconds the record may be cached.
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn record_type(&self) -> RecordType {
        self.data.record_type()
    }

    fn parse(reader: &mut Reader) -> Result<ResourceRecord> {
        let name = DomainName::parse(reader)?;
        let record_type = RecordType::from(reader.read_u16()?);
        let class = reader.read_u16()?;
        let ttl = reader.read_u32()?;
        let len = reader.read_u16()? as usize;
        if reader.remaining() < len {
            return Err(Error);
        }
        let data = RecordData::parse(reader, record_type, len)?;
        Ok(ResourceRecord {
            name,
            class,
            ttl,
            data,
        })
    }

    fn emit(&self, writer: &mut NameWriter) -> core::result::Result<(), BuildError> {
        writer.write_name(&self.name)?;
        writer.write_u16(self.record_type().into());
        writer.write_u16(self.class);
        writer.write_u32(self.ttl);
        let len_at = writer.out.len();
        writer.write_u16(0);
        self.data.emit(writer)?;
        let len = writer.out.len() - len_at - 2;
        BuildError::check_len("DNS resource data", len, u16::MAX as usize)?;
        NetworkEndian::write_u16(&mut writer.out[len_at..len_at + 2], len as u16);
        Ok(())
    }
}

/// The four sections of a message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Sections {
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
}

fn parse_sections(packet: &Packet<&[u8]>) -> Result<Sections> {
    packet.check_len()?;
    let mut reader = Reader::new(packet.buffer);
    reader.seek(HEADER_LEN)?;
    let records = |reader: &mut Reader, count: u16| {
        (0..count)
            .map(|_| ResourceRecord::parse(reader))
            .collect::<Result<Vec<_>>>()
    };
    let sections = Sections {
        questions: (0..packet.question_count())
            .map(|_| Question::parse(&mut reader))
            .collect::<Result<Vec<_>>>()?,
        answers: records(&mut reader, packet.answer_record_count())?,
        authorities: records(&mut reader, packet.authority_record_count())?,
        additionals: records(&mut reader, packet.additional_record_count())?,
    };
    reader.finish()?;
    Ok(sections)
}

/// A read-only view of a DNS message.
#[derive(Debug, Clone)]
pub struct DnsDatagram<'a> {
    packet: Packet<&'a [u8]>,
    sections: OnceLock<Option<Sections>>,
}

impl<'a> DnsDatagram<'a> {
    fn sections(&self) -> Option<&Sections> {
        self.sections
            .get_or_init(|| parse_sections(&self.packet).ok())
            .as_ref()
    }

    /// The question section; empty if the message doesn't parse.
    pub fn questions(&self) -> &[Question] {
        self.sections().map_or(&[], |sections| &sections.questions)
    }

    pub fn answers(&self) -> &[ResourceRecord] {
        self.sections().map_or(&[], |sections| &sections.answers)
    }

    pub fn authorities(&self) -> &[ResourceRecord] {
        self.sections().map_or(&[], |sections| &sections.authorities)
    }

    pub fn additionals(&self) -> &[ResourceRecord] {
        self.sections().map_or(&[], |sections| &sections.additionals)
    }
}

impl<'a> core::ops::Deref for DnsDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for DnsDatagram<'a> {
    type Layer = DnsLayer;

    fn new(bytes: &'a [u8]) -> Self {
        DnsDatagram {
            packet: Packet::new_unchecked(bytes),
            sections: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    /// The header is complete, every counted entry parses, names resolve
    /// without loops, and nothing trails the last record.
    fn is_valid(&self) -> bool {
        self.sections().is_some()
    }

    fn extract_layer(&self) -> DnsLayer {
        if self.packet.check_len().is_err() {
            return DnsLayer::default();
        }
        let sections = self.sections().cloned().unwrap_or_default();
        DnsLayer {
            id: self.transaction_id(),
            flags: self.flags(),
            opcode: self.opcode(),
            rcode: self.rcode(),
            questions: sections.questions,
            answers: sections.answers,
            authorities: sections.authorities,
            additionals: sections.additionals,
        }
    }
}

/// A DNS message under construction. Names are compressed on output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsLayer {
    pub id: u16,
    pub flags: Flags,
    pub opcode: Opcode,
    pub rcode: Rcode,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

impl Default for DnsLayer {
    fn default() -> Self {
        DnsLayer {
            id: 0,
            flags: Flags::empty(),
            opcode: Opcode::Query,
            rcode: Rcode::NoError,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }
}

impl DnsLayer {
    fn encode(&self) -> core::result::Result<Vec<u8>, BuildError> {
        BuildError::check_range("DNS opcode", u8::from(self.opcode), 0x0fu8)?;
        BuildError::check_range("DNS response code", u8::from(self.rcode), 0x0fu8)?;
        for (what, len) in [
            ("DNS questions", self.questions.len()),
            ("DNS answers", self.answers.len()),
            ("DNS authority records", self.authorities.len()),
            ("DNS additional records", self.additionals.len()),
        ] {
            BuildError::check_len(what, len, u16::MAX as usize)?;
        }

        let mut header = [0; HEADER_LEN];
        let raw_flags = self.flags.bits()
            | (u8::from(self.opcode) as u16) << 11
            | u8::from(self.rcode) as u16;
        let mut writer = Writer::new(&mut header);
        writer.write_u16(self.id);
        writer.write_u16(raw_flags);
        writer.write_u16(self.questions.len() as u16);
        writer.write_u16(self.answers.len() as u16);
        writer.write_u16(self.authorities.len() as u16);
        writer.write_u16(self.additionals.len() as u16);

        let mut names = NameWriter::new();
        names.out.extend_from_slice(&header);
        for question in &self.questions {
            question.emit(&mut names)?;
        }
        for record in self.answers.iter().chain(&self.authorities).chain(&self.additionals) {
            record.emit(&mut names)?;
        }
        Ok(names.out)
    }

    /// Octets of the encoded message. A message that can't be encoded is
    /// reported by [emit](Self::emit) instead.
    pub fn buffer_len(&self) -> usize {
        self.encode().map_or(HEADER_LEN, |bytes| bytes.len())
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        let bytes = self.encode()?;
        if bytes.len() != buffer.len() {
            return Err(BuildError::Mismatch {
                what: "DNS message length",
            });
        }
        buffer.copy_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static QUERY_BYTES: [u8; 29] = [
        0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07, 0x65,
        0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, 0x00, 0x01, 0x00,
        0x01,
    ];

    static RESPONSE_BYTES: [u8; 63] = [
        0x12, 0x34, 0x81, 0x80, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x03, 0x77,
        0x77, 0x77, 0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d,
        0x00, 0x00, 0x01, 0x00, 0x01, 0xc0, 0x0c, 0x00, 0x05, 0x00, 0x01, 0x00, 0x00, 0x01,
        0x2c, 0x00, 0x02, 0xc0, 0x10, 0xc0, 0x10, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01,
        0x2c, 0x00, 0x04, 0x5d, 0xb8, 0xd8, 0x22,
    ];

    fn name(labels: &[&str]) -> DomainName {
        DomainName::from_labels(labels).unwrap()
    }

    #[test]
    fn test_query() {
        let view = DnsDatagram::new(&QUERY_BYTES[..]);
        assert!(view.is_valid());
        assert_eq!(view.transaction_id(), 0x1234);
        assert_eq!(view.flags(), Flags::RECURSION_DESIRED);
        assert_eq!(view.opcode(), Opcode::Query);
        assert_eq!(
            view.questions(),
            &[Question {
                name: name(&["example", "com"]),
                record_type: RecordType::A,
                class: CLASS_IN,
            }]
        );
        assert!(view.answers().is_empty());

        let layer = view.extract_layer();
        assert_eq!(layer.buffer_len(), QUERY_BYTES.len());
        let mut bytes = [0; 29];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, QUERY_BYTES);
    }

    #[test]
    fn test_response_decompression() {
        let view = DnsDatagram::new(&RESPONSE_BYTES[..]);
        assert!(view.is_valid());
        assert_eq!(view.rcode(), Rcode::NoError);
        assert_eq!(
            view.answers(),
            &[
                ResourceRecord {
                    name: name(&["www", "example", "com"]),
                    class: CLASS_IN,
                    ttl: 300,
                    data: RecordData::Cname(name(&["example", "com"])),
                },
                ResourceRecord {
                    name: name(&["example", "com"]),
                    class: CLASS_IN,
                    ttl: 300,
                    data: RecordData::A(Ipv4Address::new(93, 184, 216, 34)),
                },
            ]
        );
    }

    #[test]
    fn test_response_compression() {
        let layer = DnsLayer {
            id: 0x1234,
            flags: Flags::RESPONSE | Flags::RECURSION_DESIRED | Flags::RECURSION_AVAILABLE,
            questions: vec![Question {
                name: name(&["www", "example", "com"]),
                record_type: RecordType::A,
                class: CLASS_IN,
            }],
            answers: DnsDatagram::new(&RESPONSE_BYTES[..]).answers().to_vec(),
            ..DnsLayer::default()
        };
        let mut bytes = vec![0; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, RESPONSE_BYTES);
    }

    #[test]
    fn test_pointer_loop() {
        let mut bytes = QUERY_BYTES[..12].to_vec();
        bytes.extend_from_slice(&[0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01]);
        let view = DnsDatagram::new(&bytes[..]);
        assert!(!view.is_valid());
        assert!(view.questions().is_empty());
    }

    #[test]
    fn test_truncated_and_trailing() {
        assert!(!DnsDatagram::new(&QUERY_BYTES[..11]).is_valid());
        assert!(!DnsDatagram::new(&QUERY_BYTES[..28]).is_valid());
        let mut bytes = QUERY_BYTES.to_vec();
        bytes.push(0);
        assert!(!DnsDatagram::new(&bytes[..]).is_valid());
    }

    #[test]
    fn test_record_data_length_mismatch() {
        let mut bytes = RESPONSE_BYTES;
        // The CNAME data claims three octets but its name takes two.
        bytes[44] = 0x03;
        assert!(!DnsDatagram::new(&bytes[..]).is_valid());
    }

    #[test]
    fn test_domain_name() {
        assert!(DomainName::root().is_root());
        assert_eq!(DomainName::root().to_string(), ".");
        assert_eq!(name(&["www", "example", "com"]).to_string(), "www.example.com");
        assert_eq!(name(&["a.b", "c"]).to_string(), "a\\.b.c");
        assert!(DomainName::from_labels(&["a".repeat(64)]).is_err());
        assert!(DomainName::from_labels(&[""]).is_err());
        assert!(DomainName::from_labels(&vec!["a".repeat(63); 4]).is_err());
    }

    #[test]
    fn test_txt_and_soa() {
        let layer = DnsLayer {
            answers: vec![
                ResourceRecord {
                    name: name(&["example", "com"]),
                    class: CLASS_IN,
                    ttl: 60,
                    data: RecordData::Txt(vec![b"v=spf1".to_vec(), b"-all".to_vec()]),
                },
                ResourceRecord {
                    name: name(&["example", "com"]),
                    class: CLASS_IN,
                    ttl: 60,
                    data: RecordData::Soa {
                        mname: name(&["ns", "example", "com"]),
                        rname: name(&["hostmaster", "example", "com"]),
                        serial: 2024010101,
                        refresh: 7200,
                        retry: 3600,
                        expire: 1209600,
                        minimum: 300,
                    },
                },
            ],
            ..DnsLayer::default()
        };
        let mut bytes = vec![0; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        let view = DnsDatagram::new(&bytes[..]);
        assert!(view.is_valid());
        assert_eq!(view.answer_record_count(), 2);
        assert_eq!(view.extract_layer(), layer);
    }

    #[test]
    fn test_empty_txt_rejected() {
        let layer = DnsLayer {
            answers: vec![ResourceRecord {
                name: DomainName::root(),
                class: CLASS_IN,
                ttl: 0,
                data: RecordData::Txt(vec![]),
            }],
            ..DnsLayer::default()
        };
        let mut bytes = vec![0; layer.buffer_len()];
        assert!(matches!(layer.emit(&mut bytes), Err(BuildError::Mismatch { .. })));
    }
}
