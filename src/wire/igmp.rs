// Packet implementation for the Internet Group Management Protocol.
// See [RFC 1112], [RFC 2236] and [RFC 3376].
//
// [RFC 1112]: https://tools.ietf.org/html/rfc1112
// [RFC 2236]: https://tools.ietf.org/html/rfc2236
// [RFC 3376]: https://tools.ietf.org/html/rfc3376

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::codec::{Reader, Writer};
use super::{Datagram, Error, IpProtocol, Ipv4Address, Ipv4AddressExt, Result};
use crate::builder::BuildError;
use crate::layer::IpNextLayer;
use crate::time::Duration;
use crate::wire::ip::checksum;

enum_with_unknown! {
    /// Internet Group Management Protocol message type.
    pub enum MessageType(u8) {
        MembershipQuery    = 0x11,
        MembershipReportV1 = 0x12,
        MembershipReportV2 = 0x16,
        LeaveGroup         = 0x17,
        MembershipReportV3 = 0x22
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MessageType::MembershipQuery => write!(f, "membership query"),
            MessageType::MembershipReportV1 => write!(f, "version 1 membership report"),
            MessageType::MembershipReportV2 => write!(f, "version 2 membership report"),
            MessageType::LeaveGroup => write!(f, "leave group"),
            MessageType::MembershipReportV3 => write!(f, "version 3 membership report"),
            MessageType::Unknown(id) => write!(f, "0x{id:02x}"),
        }
    }
}

enum_with_unknown! {
    /// IGMPv3 group record type. See [RFC 3376 § 4.2.12].
    ///
    /// [RFC 3376 § 4.2.12]: https://tools.ietf.org/html/rfc3376#section-4.2.12
    pub enum RecordType(u8) {
        ModeIsInclude   = 0x01,
        ModeIsExclude   = 0x02,
        ChangeToInclude = 0x03,
        ChangeToExclude = 0x04,
        AllowNewSources = 0x05,
        BlockOldSources = 0x06
    }
}

/// A read/write wrapper around an IGMP packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const MAX_RESP_CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const GROUP_ADDRESS: Field = 4..8;

    // Version 3 query.
    pub const SQRV: usize = 8;
    pub const QQIC: usize = 9;
    pub const NUM_SOURCES: Field = 10..12;
    pub const SOURCES: Rest = 12..;

    // Version 3 report.
    pub const NUM_RECORDS: Field = 6..8;
    pub const RECORDS: Rest = 8..;
}

pub const HEADER_LEN: usize = field::GROUP_ADDRESS.end;

/// Length of a version 3 query without its source addresses.
pub const QUERY_V3_HEADER_LEN: usize = field::SOURCES.start;

/// The largest time an exponential code can express, in its own units.
const MAX_EXPONENTIAL_VALUE: u32 = 0x1f << 10;

/// Expand an 8-bit code where values of 128 and up hold a 3-bit exponent and
/// a 4-bit mantissa. See [RFC 3376 § 4.1.1].
///
/// [RFC 3376 § 4.1.1]: https://tools.ietf.org/html/rfc3376#section-4.1.1
fn from_exponential(code: u8) -> u32 {
    if code < 0x80 {
        return code as u32;
    }
    let exp = (code >> 4) & 0x07;
    let mant = code & 0x0f;
    ((mant as u32) | 0x10) << (exp + 3)
}

/// The inverse of [from_exponential]. Values the format can't express exactly
/// are rounded down.
fn to_exponential(field: &'static str, value: u32) -> core::result::Result<u8, BuildError> {
    BuildError::check_range(field, value, MAX_EXPONENTIAL_VALUE)?;
    if value < 0x80 {
        return Ok(value as u8);
    }
    let mut exp = 0;
    while value >> (exp + 3) > 0x1f {
        exp += 1;
    }
    let mant = (value >> (exp + 3)) as u8 & 0x0f;
    Ok(0x80 | (exp as u8) << 4 | mant)
}

const fn tenths(time: Duration) -> u64 {
    time.total_millis() / 100
}

const fn from_tenths(tenths: u32) -> Duration {
    Duration::from_millis(tenths as u64 * 100)
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with IGMP packet structure.
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
    /// Returns `Err(Error)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the message type field.
    #[inline]
    pub fn msg_type(&self) -> MessageType {
        let data = self.buffer.as_ref();
        MessageType::from(data[field::TYPE])
    }

    /// Return the maximum response code field.
    #[inline]
    pub fn max_resp_code(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::MAX_RESP_CODE]
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the group address field. Version 3 reports reuse these octets.
    #[inline]
    pub fn group_addr(&self) -> Ipv4Address {
        let data = self.buffer.as_ref();
        Ipv4Address::from_bytes(&data[field::GROUP_ADDRESS])
    }

    /// Whether this is a version 3 query, which is told apart from older
    /// queries by its length alone.
    pub fn is_query_v3(&self) -> bool {
        self.msg_type() == MessageType::MembershipQuery
            && self.buffer.as_ref().len() >= QUERY_V3_HEADER_LEN
    }

    /// Return the number of group records of a version 3 report.
    #[inline]
    pub fn num_records(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::NUM_RECORDS])
    }

    /// Validate the checksum over the whole message.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        checksum::data(self.buffer.as_ref()) == !0
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_msg_type(&mut self, value: MessageType) {
        let data = self.buffer.as_mut();
        data[field::TYPE] = value.into()
    }

    #[inline]
    pub fn set_max_resp_code(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::MAX_RESP_CODE] = value
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_group_addr(&mut self, value: Ipv4Address) {
        let data = self.buffer.as_mut();
        data[field::GROUP_ADDRESS].copy_from_slice(&value.octets())
    }

    /// Compute and fill in the checksum over the whole buffer.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = !checksum::data(self.buffer.as_ref());
        self.set_checksum(checksum)
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.check_len().is_err() {
            return write!(f, "IGMP (truncated)");
        }
        write!(f, "IGMP {} group={}", self.msg_type(), self.group_addr())
    }
}

/// One group record of a version 3 membership report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub record_type: RecordType,
    pub multicast_address: Ipv4Address,
    pub sources: Vec<Ipv4Address>,
    /// Auxiliary data, a whole number of 32-bit words.
    pub aux_data: Vec<u8>,
}

impl GroupRecord {
    const HEADER_LEN: usize = 8;

    pub fn buffer_len(&self) -> usize {
        Self::HEADER_LEN + 4 * self.sources.len() + self.aux_data.len()
    }

    fn parse(reader: &mut Reader) -> Result<GroupRecord> {
        let record_type = RecordType::from(reader.read_u8()?);
        let aux_words = reader.read_u8()? as usize;
        let num_sources = reader.read_u16()?;
        let multicast_address = reader.read_ipv4()?;
        let sources = (0..num_sources)
            .map(|_| reader.read_ipv4())
            .collect::<Result<Vec<_>>>()?;
        let aux_data = reader.read_bytes(4 * aux_words)?.to_vec();
        Ok(GroupRecord {
            record_type,
            multicast_address,
            sources,
            aux_data,
        })
    }

    fn emit(&self, writer: &mut Writer) -> core::result::Result<(), BuildError> {
        if self.aux_data.len() % 4 != 0 {
            return Err(BuildError::Mismatch {
                what: "IGMP auxiliary data isn't a whole number of words",
            });
        }
        BuildError::check_len("IGMP auxiliary data", self.aux_data.len(), 4 * u8::MAX as usize)?;
        BuildError::check_len("IGMP group record sources", self.sources.len(), u16::MAX as usize)?;
        writer.write_u8(self.record_type.into());
        writer.write_u8((self.aux_data.len() / 4) as u8);
        writer.write_u16(self.sources.len() as u16);
        writer.write_ipv4(self.multicast_address);
        for source in &self.sources {
            writer.write_ipv4(*source);
        }
        writer.write_bytes(&self.aux_data);
        Ok(())
    }
}

/// The body of an IGMP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A version 1 or 2 query. A zero response time makes it version 1.
    Query {
        max_response_time: Duration,
        group_address: Ipv4Address,
    },
    QueryV3 {
        max_response_time: Duration,
        group_address: Ipv4Address,
        suppress_router_processing: bool,
        robustness: u8,
        query_interval: Duration,
        sources: Vec<Ipv4Address>,
    },
    ReportV1 {
        group_address: Ipv4Address,
    },
    ReportV2 {
        max_response_time: Duration,
        group_address: Ipv4Address,
    },
    LeaveGroup {
        max_response_time: Duration,
        group_address: Ipv4Address,
    },
    ReportV3 {
        records: Vec<GroupRecord>,
    },
    /// A message of an unknown type, or one that doesn't hold together,
    /// with every octet after the checksum.
    Unknown {
        kind: u8,
        code: u8,
        data: Vec<u8>,
    },
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Query { .. } | Message::QueryV3 { .. } => MessageType::MembershipQuery,
            Message::ReportV1 { .. } => MessageType::MembershipReportV1,
            Message::ReportV2 { .. } => MessageType::MembershipReportV2,
            Message::LeaveGroup { .. } => MessageType::LeaveGroup,
            Message::ReportV3 { .. } => MessageType::MembershipReportV3,
            Message::Unknown { kind, .. } => MessageType::from(*kind),
        }
    }

    pub fn buffer_len(&self) -> usize {
        match self {
            Message::QueryV3 { sources, .. } => QUERY_V3_HEADER_LEN + 4 * sources.len(),
            Message::ReportV3 { records } => {
                HEADER_LEN + records.iter().map(GroupRecord::buffer_len).sum::<usize>()
            }
            Message::Unknown { data, .. } => field::GROUP_ADDRESS.start + data.len(),
            _ => HEADER_LEN,
        }
    }

    /// Decode a message whose length and checksum have been checked.
    fn parse(packet: &Packet<&[u8]>) -> Result<Message> {
        let bytes = packet.buffer;
        let code = packet.max_resp_code();
        let message = match packet.msg_type() {
            MessageType::MembershipQuery if bytes.len() == HEADER_LEN => Message::Query {
                max_response_time: from_tenths(code as u32),
                group_address: packet.group_addr(),
            },
            MessageType::MembershipQuery if bytes.len() >= QUERY_V3_HEADER_LEN => {
                let sqrv = bytes[field::SQRV];
                if sqrv & 0xf0 != 0 {
                    return Err(Error);
                }
                let num_sources = NetworkEndian::read_u16(&bytes[field::NUM_SOURCES]);
                let mut reader = Reader::new(&bytes[field::SOURCES]);
                let sources = (0..num_sources)
                    .map(|_| reader.read_ipv4())
                    .collect::<Result<Vec<_>>>()?;
                reader.finish()?;
                Message::QueryV3 {
                    max_response_time: from_tenths(from_exponential(code)),
                    group_address: packet.group_addr(),
                    suppress_router_processing: sqrv & 0x08 != 0,
                    robustness: sqrv & 0x07,
                    query_interval: Duration::from_secs(from_exponential(bytes[field::QQIC]) as u64),
                    sources,
                }
            }
            MessageType::MembershipReportV1 if bytes.len() == HEADER_LEN && code == 0 => {
                Message::ReportV1 {
                    group_address: packet.group_addr(),
                }
            }
            MessageType::MembershipReportV2 if bytes.len() == HEADER_LEN => Message::ReportV2 {
                max_response_time: from_tenths(code as u32),
                group_address: packet.group_addr(),
            },
            MessageType::LeaveGroup if bytes.len() == HEADER_LEN => Message::LeaveGroup {
                max_response_time: from_tenths(code as u32),
                group_address: packet.group_addr(),
            },
            MessageType::MembershipReportV3 if code == 0 => {
                if NetworkEndian::read_u16(&bytes[4..6]) != 0 {
                    return Err(Error);
                }
                let mut reader = Reader::new(&bytes[field::RECORDS]);
                let records = (0..packet.num_records())
                    .map(|_| GroupRecord::parse(&mut reader))
                    .collect::<Result<Vec<_>>>()?;
                reader.finish()?;
                Message::ReportV3 { records }
            }
            _ => return Err(Error),
        };
        Ok(message)
    }

    /// Write the maximum response code and everything after the checksum.
    fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        let code = match self {
            Message::Query {
                max_response_time,
                ..
            }
            | Message::ReportV2 {
                max_response_time,
                ..
            }
            | Message::LeaveGroup {
                max_response_time,
                ..
            } => {
                let tenths = tenths(*max_response_time);
                BuildError::check_range("IGMP maximum response time", tenths, u8::MAX)?;
                tenths as u8
            }
            Message::QueryV3 {
                max_response_time,
                ..
            } => {
                let tenths = tenths(*max_response_time).min(u32::MAX as u64) as u32;
                to_exponential("IGMP maximum response time", tenths)?
            }
            Message::ReportV1 { .. } | Message::ReportV3 { .. } => 0,
            Message::Unknown { code, .. } => *code,
        };
        buffer[field::MAX_RESP_CODE] = code;

        let mut writer = Writer::new(&mut buffer[field::GROUP_ADDRESS.start..]);
        match self {
            Message::Query { group_address, .. }
            | Message::ReportV1 { group_address }
            | Message::ReportV2 { group_address, .. }
            | Message::LeaveGroup { group_address, .. } => writer.write_ipv4(*group_address),
            Message::QueryV3 {
                group_address,
                suppress_router_processing,
                robustness,
                query_interval,
                sources,
                ..
            } => {
                BuildError::check_range("IGMP robustness", *robustness, 7u8)?;
                BuildError::check_len("IGMP query sources", sources.len(), u16::MAX as usize)?;
                let interval = query_interval.secs().min(u32::MAX as u64) as u32;
                let suppress = if *suppress_router_processing { 0x08 } else { 0 };
                writer.write_ipv4(*group_address);
                writer.write_u8(suppress | robustness);
                writer.write_u8(to_exponential("IGMP query interval", interval)?);
                writer.write_u16(sources.len() as u16);
                for source in sources {
                    writer.write_ipv4(*source);
                }
            }
            Message::ReportV3 { records } => {
                BuildError::check_len("IGMP group records", records.len(), u16::MAX as usize)?;
                writer.write_u16(0);
                writer.write_u16(records.len() as u16);
                for record in records {
                    record.emit(&mut writer)?;
                }
            }
            Message::Unknown { data, .. } => writer.write_bytes(data),
        }
        Ok(())
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::Query {
            max_response_time: Duration::ZERO,
            group_address: Ipv4Address::UNSPECIFIED,
        }
    }
}

/// A read-only view of an IGMP message.
#[derive(Debug, Clone)]
pub struct IgmpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    message: OnceLock<Option<Message>>,
}

impl<'a> IgmpDatagram<'a> {
    fn parsed(&self) -> Option<&Message> {
        self.message
            .get_or_init(|| {
                self.packet.check_len().ok()?;
                Message::parse(&self.packet).ok()
            })
            .as_ref()
    }

    /// Return the decoded message. Messages that don't hold together are
    /// returned verbatim as [Message::Unknown].
    pub fn message(&self) -> Message {
        if let Some(message) = self.parsed() {
            return message.clone();
        }
        let bytes = self.packet.buffer;
        Message::Unknown {
            kind: bytes.first().copied().unwrap_or_default(),
            code: bytes.get(field::MAX_RESP_CODE).copied().unwrap_or_default(),
            data: bytes.get(field::GROUP_ADDRESS.start..).unwrap_or_default().to_vec(),
        }
    }

    /// The maximum response time, as interpreted for the message version.
    pub fn max_response_time(&self) -> Duration {
        match self.parsed() {
            Some(Message::Query {
                max_response_time,
                ..
            })
            | Some(Message::QueryV3 {
                max_response_time,
                ..
            })
            | Some(Message::ReportV2 {
                max_response_time,
                ..
            })
            | Some(Message::LeaveGroup {
                max_response_time,
                ..
            }) => *max_response_time,
            _ => Duration::ZERO,
        }
    }
}

impl<'a> core::ops::Deref for IgmpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for IgmpDatagram<'a> {
    type Layer = IgmpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        IgmpDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            message: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.packet.check_len().is_err() {
                net_debug!("IGMP message of {} octets is truncated", self.packet.buffer.len());
                return false;
            }
            if !self.verify_checksum() {
                net_debug!("IGMP checksum {:#06x} is wrong", self.checksum());
                return false;
            }
            self.parsed().is_some()
        })
    }

    fn extract_layer(&self) -> IgmpLayer {
        IgmpLayer {
            checksum: self.packet.check_len().ok().map(|()| self.checksum()),
            message: self.message(),
        }
    }
}

/// An IGMP message under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IgmpLayer {
    /// `None` computes the checksum over the message and every later layer.
    pub checksum: Option<u16>,
    pub message: Message,
}

impl IgmpLayer {
    pub fn buffer_len(&self) -> usize {
        self.message.buffer_len()
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        let mut packet = Packet::new_unchecked(&mut *buffer);
        packet.set_msg_type(self.message.msg_type());
        packet.set_checksum(self.checksum.unwrap_or(0));
        self.message.emit(buffer)
    }

    pub(crate) fn finalize(&self, buffer: &mut [u8], payload_len: usize) {
        if self.checksum.is_none() {
            let len = self.buffer_len() + payload_len;
            Packet::new_unchecked(&mut buffer[..len]).fill_checksum();
        }
    }
}

impl IpNextLayer for IgmpLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::Igmp
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static QUERY_V2_BYTES: [u8; 8] = [0x11, 0x64, 0xee, 0x9b, 0x00, 0x00, 0x00, 0x00];

    static QUERY_V3_BYTES: [u8; 16] = [
        0x11, 0x0a, 0x4a, 0xcc, 0xe0, 0x00, 0x00, 0x01, 0x02, 0x7d, 0x00, 0x01, 0xc0, 0xa8,
        0x01, 0x01,
    ];

    static REPORT_V3_BYTES: [u8; 16] = [
        0x22, 0x00, 0xe8, 0xf9, 0x00, 0x00, 0x00, 0x01, 0x04, 0x00, 0x00, 0x00, 0xef, 0x01,
        0x02, 0x03,
    ];

    static REPORT_V2_BYTES: [u8; 8] = [0x16, 0x00, 0x09, 0x04, 0xe0, 0x00, 0x00, 0xfb];

    fn emit_standalone(layer: &IgmpLayer) -> Vec<u8> {
        let mut bytes = vec![0; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        layer.finalize(&mut bytes, 0);
        bytes
    }

    #[test]
    fn test_query_v2() {
        let view = IgmpDatagram::new(&QUERY_V2_BYTES[..]);
        assert!(view.is_valid());
        assert!(!view.is_query_v3());
        assert_eq!(view.max_response_time(), Duration::from_secs(10));
        assert_eq!(
            view.message(),
            Message::Query {
                max_response_time: Duration::from_secs(10),
                group_address: Ipv4Address::UNSPECIFIED
            }
        );
        assert_eq!(emit_standalone(&view.extract_layer()), QUERY_V2_BYTES);
    }

    #[test]
    fn test_query_v3() {
        let view = IgmpDatagram::new(&QUERY_V3_BYTES[..]);
        assert!(view.is_valid());
        assert!(view.is_query_v3());
        assert_eq!(
            view.message(),
            Message::QueryV3 {
                max_response_time: Duration::from_secs(1),
                group_address: Ipv4Address::new(224, 0, 0, 1),
                suppress_router_processing: false,
                robustness: 2,
                query_interval: Duration::from_secs(125),
                sources: vec![Ipv4Address::new(192, 168, 1, 1)],
            }
        );

        let layer = IgmpLayer {
            checksum: None,
            message: view.message(),
        };
        assert_eq!(emit_standalone(&layer), QUERY_V3_BYTES);
    }

    #[test]
    fn test_query_between_versions() {
        let mut bytes = QUERY_V3_BYTES[..10].to_vec();
        Packet::new_unchecked(&mut bytes[..]).fill_checksum();
        let view = IgmpDatagram::new(&bytes[..]);
        assert!(view.verify_checksum());
        assert!(!view.is_valid());
        assert!(matches!(view.message(), Message::Unknown { kind: 0x11, code: 0x0a, .. }));
        assert_eq!(emit_standalone(&view.extract_layer()), bytes);
    }

    #[test]
    fn test_report_v3() {
        let view = IgmpDatagram::new(&REPORT_V3_BYTES[..]);
        assert!(view.is_valid());
        assert_eq!(view.num_records(), 1);
        assert_eq!(
            view.message(),
            Message::ReportV3 {
                records: vec![GroupRecord {
                    record_type: RecordType::ChangeToExclude,
                    multicast_address: Ipv4Address::new(239, 1, 2, 3),
                    sources: vec![],
                    aux_data: vec![],
                }]
            }
        );
        assert_eq!(emit_standalone(&view.extract_layer()), REPORT_V3_BYTES);
    }

    #[test]
    fn test_report_v3_record_overrun() {
        let mut bytes = REPORT_V3_BYTES;
        bytes[11] = 1;
        Packet::new_unchecked(&mut bytes[..]).fill_checksum();
        assert!(!IgmpDatagram::new(&bytes[..]).is_valid());
    }

    #[test]
    fn test_report_v2_construct() {
        let layer = IgmpLayer {
            checksum: None,
            message: Message::ReportV2 {
                max_response_time: Duration::ZERO,
                group_address: Ipv4Address::new(224, 0, 0, 251),
            },
        };
        assert_eq!(emit_standalone(&layer), REPORT_V2_BYTES);
        assert!(IgmpDatagram::new(&REPORT_V2_BYTES[..]).is_valid());
    }

    #[test]
    fn test_bad_checksum() {
        let mut bytes = REPORT_V2_BYTES;
        bytes[7] = 0xfc;
        assert!(!IgmpDatagram::new(&bytes[..]).is_valid());
        assert!(!IgmpDatagram::new(&REPORT_V2_BYTES[..6]).is_valid());
    }

    #[test]
    fn test_exponential_codes() {
        assert_eq!(from_exponential(0x7f), 127);
        assert_eq!(from_exponential(0x80), 128);
        assert_eq!(from_exponential(0xff), MAX_EXPONENTIAL_VALUE);
        assert_eq!(to_exponential("time", 128), Ok(0x80));
        assert_eq!(to_exponential("time", MAX_EXPONENTIAL_VALUE), Ok(0xff));
        assert_eq!(to_exponential("time", 255), Ok(0x8f));
        assert!(to_exponential("time", MAX_EXPONENTIAL_VALUE + 1).is_err());
        for code in 0..=u8::MAX {
            assert_eq!(to_exponential("time", from_exponential(code)), Ok(code));
        }
    }

    #[test]
    fn test_response_time_out_of_range() {
        let layer = IgmpLayer {
            checksum: None,
            message: Message::ReportV2 {
                max_response_time: Duration::from_secs(26),
                group_address: Ipv4Address::UNSPECIFIED,
            },
        };
        let mut bytes = vec![0; layer.buffer_len()];
        assert!(matches!(
            layer.emit(&mut bytes),
            Err(BuildError::OutOfRange { .. })
        ));
    }
}
