//! Internet Control Message Protocol for IPv4.
//!
//! Every message starts with the same eight octets: type, code, checksum and
//! a four-octet field whose meaning depends on the type. What follows is
//! different for every message kind. Each registered kind records the
//! largest code it accepts, the exact length it requires if any, and the
//! decoder for its body; other types are kept verbatim as
//! [Message::Unknown].

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::codec::{Reader, Writer};
use super::{Datagram, Error, IpProtocol, Ipv4Address, Ipv4Datagram, Result, TypeRegistry};
use crate::builder::BuildError;
use crate::layer::IpNextLayer;
use crate::time::Duration;
use crate::wire::ip::checksum;

enum_with_unknown! {
    /// Internet protocol control message type.
    pub enum MessageType(u8) {
        EchoReply              = 0,
        DestinationUnreachable = 3,
        SourceQuench           = 4,
        Redirect               = 5,
        Echo                   = 8,
        RouterAdvertisement    = 9,
        RouterSolicitation     = 10,
        TimeExceeded           = 11,
        ParameterProblem       = 12,
        Timestamp              = 13,
        TimestampReply         = 14,
        InformationRequest     = 15,
        InformationReply       = 16,
        AddressMaskRequest     = 17,
        AddressMaskReply       = 18,
        TraceRoute             = 30,
        ConversionFailed       = 31,
        DomainNameRequest      = 37,
        DomainNameReply        = 38,
        SecurityFailures       = 40
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MessageType::EchoReply => write!(f, "echo reply"),
            MessageType::DestinationUnreachable => write!(f, "destination unreachable"),
            MessageType::SourceQuench => write!(f, "source quench"),
            MessageType::Redirect => write!(f, "redirect"),
            MessageType::Echo => write!(f, "echo"),
            MessageType::RouterAdvertisement => write!(f, "router advertisement"),
            MessageType::RouterSolicitation => write!(f, "router solicitation"),
            MessageType::TimeExceeded => write!(f, "time exceeded"),
            MessageType::ParameterProblem => write!(f, "parameter problem"),
            MessageType::Timestamp => write!(f, "timestamp"),
            MessageType::TimestampReply => write!(f, "timestamp reply"),
            MessageType::InformationRequest => write!(f, "information request"),
            MessageType::InformationReply => write!(f, "information reply"),
            MessageType::AddressMaskRequest => write!(f, "address mask request"),
            MessageType::AddressMaskReply => write!(f, "address mask reply"),
            MessageType::TraceRoute => write!(f, "traceroute"),
            MessageType::ConversionFailed => write!(f, "datagram conversion error"),
            MessageType::DomainNameRequest => write!(f, "domain name request"),
            MessageType::DomainNameReply => write!(f, "domain name reply"),
            MessageType::SecurityFailures => write!(f, "security failures"),
            MessageType::Unknown(id) => write!(f, "{id}"),
        }
    }
}

/// A read/write wrapper around an ICMPv4 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const TYPE: usize = 0;
    pub const CODE: usize = 1;
    pub const CHECKSUM: Field = 2..4;
    pub const REST_OF_HEADER: Field = 4..8;
}

pub const HEADER_LEN: usize = field::REST_OF_HEADER.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with ICMPv4 packet structure.
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
    /// Returns `Err(Error)` if the buffer is shorter than the common header.
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

    /// Return the message code field.
    #[inline]
    pub fn msg_code(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::CODE]
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the four octets after the checksum, as one word.
    #[inline]
    pub fn rest_of_header(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::REST_OF_HEADER])
    }

    /// Validate the checksum over the whole message.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        let data = self.buffer.as_ref();
        checksum::data(data) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the octets after the common header.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[HEADER_LEN..]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the message type field.
    #[inline]
    pub fn set_msg_type(&mut self, value: MessageType) {
        let data = self.buffer.as_mut();
        data[field::TYPE] = value.into()
    }

    /// Set the message code field.
    #[inline]
    pub fn set_msg_code(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::CODE] = value
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Compute and fill in the checksum over the whole buffer.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::data(data)
        };
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
            return write!(f, "ICMPv4 (truncated)");
        }
        write!(
            f,
            "ICMPv4 type={} code={} len={}",
            self.msg_type(),
            self.msg_code(),
            self.buffer.as_ref().len() - HEADER_LEN
        )
    }
}

/// One address a router advertises, with its preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouterEntry {
    pub address: Ipv4Address,
    pub preference: i32,
}

/// The body of an ICMPv4 message: everything after the checksum.
///
/// Error messages carry the leading octets of the datagram that caused them
/// as `data`. Reserved fields are written as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    EchoReply {
        identifier: u16,
        sequence_number: u16,
        data: Vec<u8>,
    },
    DestinationUnreachable {
        /// Only meaningful with code 4, fragmentation needed (RFC 1191).
        next_hop_mtu: u16,
        data: Vec<u8>,
    },
    SourceQuench {
        data: Vec<u8>,
    },
    Redirect {
        gateway: Ipv4Address,
        data: Vec<u8>,
    },
    Echo {
        identifier: u16,
        sequence_number: u16,
        data: Vec<u8>,
    },
    RouterAdvertisement {
        lifetime: Duration,
        entries: Vec<RouterEntry>,
    },
    RouterSolicitation,
    TimeExceeded {
        data: Vec<u8>,
    },
    ParameterProblem {
        pointer: u8,
        data: Vec<u8>,
    },
    Timestamp {
        identifier: u16,
        sequence_number: u16,
        originate: u32,
        receive: u32,
        transmit: u32,
    },
    TimestampReply {
        identifier: u16,
        sequence_number: u16,
        originate: u32,
        receive: u32,
        transmit: u32,
    },
    InformationRequest {
        identifier: u16,
        sequence_number: u16,
    },
    InformationReply {
        identifier: u16,
        sequence_number: u16,
    },
    AddressMaskRequest {
        identifier: u16,
        sequence_number: u16,
        address_mask: Ipv4Address,
    },
    AddressMaskReply {
        identifier: u16,
        sequence_number: u16,
        address_mask: Ipv4Address,
    },
    /// RFC 1393.
    TraceRoute {
        identifier: u16,
        outbound_hop_count: u16,
        return_hop_count: u16,
        output_link_speed: u32,
        output_link_mtu: u32,
    },
    /// RFC 1475.
    ConversionFailed {
        pointer: u32,
        data: Vec<u8>,
    },
    /// RFC 1788.
    DomainNameRequest {
        identifier: u16,
        sequence_number: u16,
    },
    DomainNameReply {
        identifier: u16,
        sequence_number: u16,
        data: Vec<u8>,
    },
    /// RFC 2521.
    SecurityFailures {
        pointer: u16,
        data: Vec<u8>,
    },
    /// A message of an unregistered type, or one its kind could not decode.
    Unknown {
        kind: u8,
        rest_of_header: u32,
        data: Vec<u8>,
    },
}

impl Default for Message {
    fn default() -> Self {
        Message::Echo {
            identifier: 0,
            sequence_number: 0,
            data: Vec::new(),
        }
    }
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::EchoReply { .. } => MessageType::EchoReply,
            Message::DestinationUnreachable { .. } => MessageType::DestinationUnreachable,
            Message::SourceQuench { .. } => MessageType::SourceQuench,
            Message::Redirect { .. } => MessageType::Redirect,
            Message::Echo { .. } => MessageType::Echo,
            Message::RouterAdvertisement { .. } => MessageType::RouterAdvertisement,
            Message::RouterSolicitation => MessageType::RouterSolicitation,
            Message::TimeExceeded { .. } => MessageType::TimeExceeded,
            Message::ParameterProblem { .. } => MessageType::ParameterProblem,
            Message::Timestamp { .. } => MessageType::Timestamp,
            Message::TimestampReply { .. } => MessageType::TimestampReply,
            Message::InformationRequest { .. } => MessageType::InformationRequest,
            Message::InformationReply { .. } => MessageType::InformationReply,
            Message::AddressMaskRequest { .. } => MessageType::AddressMaskRequest,
            Message::AddressMaskReply { .. } => MessageType::AddressMaskReply,
            Message::TraceRoute { .. } => MessageType::TraceRoute,
            Message::ConversionFailed { .. } => MessageType::ConversionFailed,
            Message::DomainNameRequest { .. } => MessageType::DomainNameRequest,
            Message::DomainNameReply { .. } => MessageType::DomainNameReply,
            Message::SecurityFailures { .. } => MessageType::SecurityFailures,
            Message::Unknown { kind, .. } => MessageType::from(*kind),
        }
    }

    /// Octets after the common header.
    pub fn data_len(&self) -> usize {
        match self {
            Message::EchoReply { data, .. }
            | Message::DestinationUnreachable { data, .. }
            | Message::SourceQuench { data }
            | Message::Redirect { data, .. }
            | Message::Echo { data, .. }
            | Message::TimeExceeded { data }
            | Message::ParameterProblem { data, .. }
            | Message::ConversionFailed { data, .. }
            | Message::DomainNameReply { data, .. }
            | Message::SecurityFailures { data, .. }
            | Message::Unknown { data, .. } => data.len(),
            Message::RouterAdvertisement { entries, .. } => 8 * entries.len(),
            Message::RouterSolicitation
            | Message::InformationRequest { .. }
            | Message::InformationReply { .. }
            | Message::DomainNameRequest { .. } => 0,
            Message::AddressMaskRequest { .. } | Message::AddressMaskReply { .. } => 4,
            Message::Timestamp { .. }
            | Message::TimestampReply { .. }
            | Message::TraceRoute { .. } => 12,
        }
    }

    /// Write the four-octet field and the data.
    fn emit(&self, writer: &mut Writer) -> core::result::Result<(), BuildError> {
        match self {
            Message::EchoReply {
                identifier,
                sequence_number,
                data,
            }
            | Message::Echo {
                identifier,
                sequence_number,
                data,
            }
            | Message::DomainNameReply {
                identifier,
                sequence_number,
                data,
            } => {
                writer.write_u16(*identifier);
                writer.write_u16(*sequence_number);
                writer.write_bytes(data);
            }
            Message::DestinationUnreachable { next_hop_mtu, data } => {
                writer.write_u16(0);
                writer.write_u16(*next_hop_mtu);
                writer.write_bytes(data);
            }
            Message::SourceQuench { data } | Message::TimeExceeded { data } => {
                writer.write_u32(0);
                writer.write_bytes(data);
            }
            Message::Redirect { gateway, data } => {
                writer.write_ipv4(*gateway);
                writer.write_bytes(data);
            }
            Message::RouterAdvertisement { lifetime, entries } => {
                BuildError::check_len("ICMP router advertisement", entries.len(), u8::MAX as usize)?;
                BuildError::check_range("ICMP router lifetime", lifetime.secs(), u16::MAX)?;
                writer.write_u8(entries.len() as u8);
                writer.write_u8(2);
                writer.write_u16(lifetime.secs() as u16);
                for entry in entries {
                    writer.write_ipv4(entry.address);
                    writer.write_i32(entry.preference);
                }
            }
            Message::RouterSolicitation => writer.write_u32(0),
            Message::ParameterProblem { pointer, data } => {
                writer.write_u8(*pointer);
                writer.fill(0, 3);
                writer.write_bytes(data);
            }
            Message::Timestamp {
                identifier,
                sequence_number,
                originate,
                receive,
                transmit,
            }
            | Message::TimestampReply {
                identifier,
                sequence_number,
                originate,
                receive,
                transmit,
            } => {
                writer.write_u16(*identifier);
                writer.write_u16(*sequence_number);
                writer.write_u32(*originate);
                writer.write_u32(*receive);
                writer.write_u32(*transmit);
            }
            Message::InformationRequest {
                identifier,
                sequence_number,
            }
            | Message::InformationReply {
                identifier,
                sequence_number,
            }
            | Message::DomainNameRequest {
                identifier,
                sequence_number,
            } => {
                writer.write_u16(*identifier);
                writer.write_u16(*sequence_number);
            }
            Message::AddressMaskRequest {
                identifier,
                sequence_number,
                address_mask,
            }
            | Message::AddressMaskReply {
                identifier,
                sequence_number,
                address_mask,
            } => {
                writer.write_u16(*identifier);
                writer.write_u16(*sequence_number);
                writer.write_ipv4(*address_mask);
            }
            Message::TraceRoute {
                identifier,
                outbound_hop_count,
                return_hop_count,
                output_link_speed,
                output_link_mtu,
            } => {
                writer.write_u16(*identifier);
                writer.write_u16(0);
                writer.write_u16(*outbound_hop_count);
                writer.write_u16(*return_hop_count);
                writer.write_u32(*output_link_speed);
                writer.write_u32(*output_link_mtu);
            }
            Message::ConversionFailed { pointer, data } => {
                writer.write_u32(*pointer);
                writer.write_bytes(data);
            }
            Message::SecurityFailures { pointer, data } => {
                writer.write_u16(0);
                writer.write_u16(*pointer);
                writer.write_bytes(data);
            }
            Message::Unknown {
                rest_of_header,
                data,
                ..
            } => {
                writer.write_u32(*rest_of_header);
                writer.write_bytes(data);
            }
        }
        Ok(())
    }
}

/// Decodes a message body from the four-octet field onwards.
type Decoder = fn(&mut Reader) -> Option<Message>;

/// What the registry knows about one message type.
#[derive(Debug, Clone, Copy)]
struct Kind {
    max_code: u8,
    /// The exact message length, if the kind has one.
    len: Option<usize>,
    decode: Decoder,
}

const fn kind(max_code: u8, len: Option<usize>, decode: Decoder) -> Kind {
    Kind {
        max_code,
        len,
        decode,
    }
}

fn decode_echo_reply(r: &mut Reader) -> Option<Message> {
    Some(Message::EchoReply {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_echo(r: &mut Reader) -> Option<Message> {
    Some(Message::Echo {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_destination_unreachable(r: &mut Reader) -> Option<Message> {
    r.read_u16().ok()?;
    Some(Message::DestinationUnreachable {
        next_hop_mtu: r.read_u16().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_source_quench(r: &mut Reader) -> Option<Message> {
    r.read_u32().ok()?;
    Some(Message::SourceQuench {
        data: r.rest().to_vec(),
    })
}

fn decode_redirect(r: &mut Reader) -> Option<Message> {
    Some(Message::Redirect {
        gateway: r.read_ipv4().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_router_advertisement(r: &mut Reader) -> Option<Message> {
    let count = r.read_u8().ok()?;
    let entry_size = r.read_u8().ok()?;
    if entry_size != 2 {
        return None;
    }
    let lifetime = Duration::from_secs(r.read_u16().ok()? as u64);
    let entries = (0..count)
        .map(|_| {
            Some(RouterEntry {
                address: r.read_ipv4().ok()?,
                preference: r.read_i32().ok()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(Message::RouterAdvertisement { lifetime, entries })
}

fn decode_router_solicitation(r: &mut Reader) -> Option<Message> {
    r.read_u32().ok()?;
    Some(Message::RouterSolicitation)
}

fn decode_time_exceeded(r: &mut Reader) -> Option<Message> {
    r.read_u32().ok()?;
    Some(Message::TimeExceeded {
        data: r.rest().to_vec(),
    })
}

fn decode_parameter_problem(r: &mut Reader) -> Option<Message> {
    let pointer = r.read_u8().ok()?;
    r.read_u24().ok()?;
    Some(Message::ParameterProblem {
        pointer,
        data: r.rest().to_vec(),
    })
}

fn decode_timestamp(r: &mut Reader) -> Option<Message> {
    Some(Message::Timestamp {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        originate: r.read_u32().ok()?,
        receive: r.read_u32().ok()?,
        transmit: r.read_u32().ok()?,
    })
}

fn decode_timestamp_reply(r: &mut Reader) -> Option<Message> {
    Some(Message::TimestampReply {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        originate: r.read_u32().ok()?,
        receive: r.read_u32().ok()?,
        transmit: r.read_u32().ok()?,
    })
}

fn decode_information_request(r: &mut Reader) -> Option<Message> {
    Some(Message::InformationRequest {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
    })
}

fn decode_information_reply(r: &mut Reader) -> Option<Message> {
    Some(Message::InformationReply {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
    })
}

fn decode_address_mask_request(r: &mut Reader) -> Option<Message> {
    Some(Message::AddressMaskRequest {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        address_mask: r.read_ipv4().ok()?,
    })
}

fn decode_address_mask_reply(r: &mut Reader) -> Option<Message> {
    Some(Message::AddressMaskReply {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        address_mask: r.read_ipv4().ok()?,
    })
}

fn decode_trace_route(r: &mut Reader) -> Option<Message> {
    let identifier = r.read_u16().ok()?;
    r.read_u16().ok()?;
    Some(Message::TraceRoute {
        identifier,
        outbound_hop_count: r.read_u16().ok()?,
        return_hop_count: r.read_u16().ok()?,
        output_link_speed: r.read_u32().ok()?,
        output_link_mtu: r.read_u32().ok()?,
    })
}

fn decode_conversion_failed(r: &mut Reader) -> Option<Message> {
    Some(Message::ConversionFailed {
        pointer: r.read_u32().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_domain_name_request(r: &mut Reader) -> Option<Message> {
    Some(Message::DomainNameRequest {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
    })
}

fn decode_domain_name_reply(r: &mut Reader) -> Option<Message> {
    Some(Message::DomainNameReply {
        identifier: r.read_u16().ok()?,
        sequence_number: r.read_u16().ok()?,
        data: r.rest().to_vec(),
    })
}

fn decode_security_failures(r: &mut Reader) -> Option<Message> {
    r.read_u16().ok()?;
    Some(Message::SecurityFailures {
        pointer: r.read_u16().ok()?,
        data: r.rest().to_vec(),
    })
}

static KINDS: TypeRegistry<MessageType, Kind> = TypeRegistry::new(&[
    (0, kind(0, None, decode_echo_reply)),
    (3, kind(15, None, decode_destination_unreachable)),
    (4, kind(0, None, decode_source_quench)),
    (5, kind(3, None, decode_redirect)),
    (8, kind(0, None, decode_echo)),
    (9, kind(0, None, decode_router_advertisement)),
    (10, kind(0, None, decode_router_solicitation)),
    (11, kind(1, None, decode_time_exceeded)),
    (12, kind(2, None, decode_parameter_problem)),
    (13, kind(0, Some(20), decode_timestamp)),
    (14, kind(0, Some(20), decode_timestamp_reply)),
    (15, kind(0, None, decode_information_request)),
    (16, kind(0, None, decode_information_reply)),
    (17, kind(0, Some(12), decode_address_mask_request)),
    (18, kind(0, Some(12), decode_address_mask_reply)),
    (30, kind(1, Some(20), decode_trace_route)),
    (31, kind(11, None, decode_conversion_failed)),
    (37, kind(0, None, decode_domain_name_request)),
    (38, kind(0, None, decode_domain_name_reply)),
    (40, kind(5, None, decode_security_failures)),
]);

/// Decode the body of `packet` with the strategy registered for its type.
/// Every decoder must consume the whole message.
fn decode(packet: &Packet<&[u8]>) -> Option<Message> {
    let kind = KINDS.get(packet.msg_type())?;
    let bytes = packet.buffer;
    if kind.len.is_some_and(|len| len != bytes.len()) {
        return None;
    }
    let mut reader = Reader::new(&bytes[field::REST_OF_HEADER.start..]);
    let message = (kind.decode)(&mut reader)?;
    reader.finish().ok()?;
    Some(message)
}

/// A read-only view of an ICMPv4 message.
#[derive(Debug, Clone)]
pub struct IcmpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    message: OnceLock<Option<Message>>,
}

impl<'a> IcmpDatagram<'a> {
    /// The body decoded by the strategy registered for the message type, or
    /// `None` for an unregistered type or a body its kind rejects.
    fn decoded(&self) -> Option<&Message> {
        self.message
            .get_or_init(|| {
                if self.packet.check_len().is_err() {
                    None
                } else {
                    decode(&self.packet)
                }
            })
            .as_ref()
    }

    /// Return the decoded message body. Bodies that can't be decoded are
    /// returned verbatim as [Message::Unknown].
    pub fn message(&self) -> Message {
        match self.decoded() {
            Some(message) => message.clone(),
            None if self.packet.check_len().is_ok() => Message::Unknown {
                kind: self.msg_type().into(),
                rest_of_header: self.rest_of_header(),
                data: self.data().to_vec(),
            },
            None => Message::default(),
        }
    }

    /// Whether the code is legal for the message type. Unregistered types
    /// accept any code.
    pub fn is_code_in_range(&self) -> bool {
        match KINDS.get(self.msg_type()) {
            Some(kind) => self.msg_code() <= kind.max_code,
            None => true,
        }
    }

    /// The view of the datagram an error message was sent about: its IPv4
    /// header and leading payload octets.
    pub fn invoking_datagram(&self) -> Option<Ipv4Datagram<'a>> {
        if self.packet.check_len().is_err() {
            return None;
        }
        match self.msg_type() {
            MessageType::DestinationUnreachable
            | MessageType::SourceQuench
            | MessageType::Redirect
            | MessageType::TimeExceeded
            | MessageType::ParameterProblem
            | MessageType::SecurityFailures => Some(Ipv4Datagram::new(self.packet.data())),
            _ => None,
        }
    }
}

impl<'a> core::ops::Deref for IcmpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for IcmpDatagram<'a> {
    type Layer = IcmpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        IcmpDatagram {
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
                net_debug!("ICMPv4 message of {} octets is truncated", self.packet.buffer.len());
                return false;
            }
            if !self.verify_checksum() {
                net_debug!("ICMPv4 checksum {:#06x} is wrong", self.checksum());
                return false;
            }
            if !self.is_code_in_range() {
                net_debug!("ICMPv4 {} with code {}", self.msg_type(), self.msg_code());
                return false;
            }
            KINDS.get(self.msg_type()).is_none() || self.decoded().is_some()
        })
    }

    fn extract_layer(&self) -> IcmpLayer {
        if self.packet.check_len().is_err() {
            return IcmpLayer::default();
        }
        IcmpLayer {
            code: self.msg_code(),
            checksum: Some(self.checksum()),
            message: self.message(),
        }
    }
}

/// An ICMPv4 message under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IcmpLayer {
    pub code: u8,
    /// `None` computes the checksum over the message and every later layer.
    pub checksum: Option<u16>,
    pub message: Message,
}

impl IcmpLayer {
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.message.data_len()
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        let mut packet = Packet::new_unchecked(&mut *buffer);
        packet.set_msg_type(self.message.msg_type());
        packet.set_msg_code(self.code);
        packet.set_checksum(self.checksum.unwrap_or(0));

        let mut writer = Writer::new(&mut buffer[field::REST_OF_HEADER.start..]);
        self.message.emit(&mut writer)
    }

    pub(crate) fn finalize(&self, buffer: &mut [u8], payload_len: usize) {
        if self.checksum.is_none() {
            let len = self.buffer_len() + payload_len;
            Packet::new_unchecked(&mut buffer[..len]).fill_checksum();
        }
    }
}

impl IpNextLayer for IcmpLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::Icmp
    }
}
