// Packet implementation for Generic Routing Encapsulation.
// See [RFC 1701], [RFC 2784], [RFC 2890] and [RFC 2637 § 4.1].
//
// [RFC 1701]: https://tools.ietf.org/html/rfc1701
// [RFC 2784]: https://tools.ietf.org/html/rfc2784
// [RFC 2890]: https://tools.ietf.org/html/rfc2890
// [RFC 2637 § 4.1]: https://tools.ietf.org/html/rfc2637#section-4.1

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::codec::{Reader, Writer};
use super::{Datagram, Error, EtherType, EthernetPayload, IpProtocol, Ipv4Address, Result};
use crate::builder::BuildError;
use crate::layer::{IpNextLayer, Layer, Neighbours};
use crate::wire::ip::checksum;

bitflags! {
    /// The single-bit flags of the first two header octets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const CHECKSUM = 0x8000;
        const ROUTING = 0x4000;
        const KEY = 0x2000;
        const SEQUENCE = 0x1000;
        const STRICT_SOURCE_ROUTE = 0x0800;
        const ACKNOWLEDGMENT = 0x0080;
    }
}

/// A read/write wrapper around a GRE header.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const FLAGS_VERSION: Field = 0..2;
    pub const PROTOCOL: Field = 2..4;
    pub const CHECKSUM: Field = 4..6;
    pub const ROUTING_OFFSET: Field = 6..8;
}

/// Length of the header without optional fields.
pub const MIN_HEADER_LEN: usize = field::PROTOCOL.end;

/// The address family of source route entries listing IPv4 addresses.
pub const ADDRESS_FAMILY_IP: u16 = 0x0800;
/// The address family of source route entries listing autonomous systems.
pub const ADDRESS_FAMILY_AS: u16 = 0xfffe;

const RECURSION_MASK: u16 = 0x0700;
const RESERVED_MASK: u16 = 0x0078;
const VERSION_MASK: u16 = 0x0007;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with GRE header structure.
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

    /// Ensure that the fixed fields and the optional fields the flags
    /// announce are all present. Source routes are not covered.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < MIN_HEADER_LEN || len < self.routing_start() {
            Err(Error)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    #[inline]
    fn raw_flags(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLAGS_VERSION])
    }

    /// Return the single-bit flags.
    #[inline]
    pub fn flags(&self) -> Flags {
        Flags::from_bits_truncate(self.raw_flags())
    }

    /// Return the recursion control field.
    #[inline]
    pub fn recursion_control(&self) -> u8 {
        ((self.raw_flags() & RECURSION_MASK) >> 8) as u8
    }

    /// Return the reserved flag bits after the acknowledgment flag.
    #[inline]
    pub fn reserved_flags(&self) -> u8 {
        ((self.raw_flags() & RESERVED_MASK) >> 3) as u8
    }

    #[inline]
    pub fn version(&self) -> u8 {
        (self.raw_flags() & VERSION_MASK) as u8
    }

    /// Return the protocol type field, an EtherType.
    #[inline]
    pub fn protocol_type(&self) -> EtherType {
        let data = self.buffer.as_ref();
        EtherType::from(NetworkEndian::read_u16(&data[field::PROTOCOL]))
    }

    /// Whether the checksum and routing offset fields are present.
    #[inline]
    fn has_checksum_field(&self) -> bool {
        self.flags().intersects(Flags::CHECKSUM | Flags::ROUTING)
    }

    fn key_start(&self) -> usize {
        if self.has_checksum_field() {
            field::ROUTING_OFFSET.end
        } else {
            MIN_HEADER_LEN
        }
    }

    fn sequence_start(&self) -> usize {
        self.key_start() + if self.flags().contains(Flags::KEY) { 4 } else { 0 }
    }

    fn acknowledgment_start(&self) -> usize {
        self.sequence_start() + if self.flags().contains(Flags::SEQUENCE) { 4 } else { 0 }
    }

    /// Offset of the first source route entry.
    pub fn routing_start(&self) -> usize {
        self.acknowledgment_start()
            + if self.flags().contains(Flags::ACKNOWLEDGMENT) { 4 } else { 0 }
    }

    /// Return the checksum field, if present.
    pub fn checksum(&self) -> Option<u16> {
        let data = self.buffer.as_ref();
        self.has_checksum_field()
            .then(|| NetworkEndian::read_u16(&data[field::CHECKSUM]))
    }

    /// Return the routing offset field, if present.
    pub fn routing_offset(&self) -> Option<u16> {
        let data = self.buffer.as_ref();
        self.has_checksum_field()
            .then(|| NetworkEndian::read_u16(&data[field::ROUTING_OFFSET]))
    }

    pub fn key(&self) -> Option<u32> {
        let data = self.buffer.as_ref();
        let start = self.key_start();
        self.flags()
            .contains(Flags::KEY)
            .then(|| NetworkEndian::read_u32(&data[start..start + 4]))
    }

    pub fn sequence_number(&self) -> Option<u32> {
        let data = self.buffer.as_ref();
        let start = self.sequence_start();
        self.flags()
            .contains(Flags::SEQUENCE)
            .then(|| NetworkEndian::read_u32(&data[start..start + 4]))
    }

    pub fn acknowledgment_number(&self) -> Option<u32> {
        let data = self.buffer.as_ref();
        let start = self.acknowledgment_start();
        self.flags()
            .contains(Flags::ACKNOWLEDGMENT)
            .then(|| NetworkEndian::read_u32(&data[start..start + 4]))
    }

    /// Validate the checksum over the header and payload. Headers without a
    /// checksum always pass.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self) -> bool {
        if cfg!(fuzzing) || !self.flags().contains(Flags::CHECKSUM) {
            return true;
        }
        checksum::data(self.buffer.as_ref()) == !0
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
            return write!(f, "GRE (truncated)");
        }
        write!(f, "GRE v{} type={}", self.version(), self.protocol_type())?;
        if let Some(key) = self.key() {
            write!(f, " key={key:#x}")?;
        }
        if let Some(seq) = self.sequence_number() {
            write!(f, " seq={seq}")?;
        }
        Ok(())
    }
}

/// A source route entry (SRE) of RFC 1701 routing information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRouteEntry {
    pub address_family: u16,
    /// Offset into `data` of the next hop to visit.
    pub offset: u8,
    pub data: Vec<u8>,
}

impl SourceRouteEntry {
    const HEADER_LEN: usize = 4;

    pub fn buffer_len(&self) -> usize {
        Self::HEADER_LEN + self.data.len()
    }

    /// The hops of an IP source route.
    pub fn ipv4_addresses(&self) -> Option<Vec<Ipv4Address>> {
        if self.address_family != ADDRESS_FAMILY_IP || self.data.len() % 4 != 0 {
            return None;
        }
        let mut reader = Reader::new(&self.data);
        (0..self.data.len() / 4).map(|_| reader.read_ipv4().ok()).collect()
    }

    /// The hops of an autonomous system source route.
    pub fn as_numbers(&self) -> Option<Vec<u16>> {
        if self.address_family != ADDRESS_FAMILY_AS || self.data.len() % 2 != 0 {
            return None;
        }
        let mut reader = Reader::new(&self.data);
        (0..self.data.len() / 2).map(|_| reader.read_u16().ok()).collect()
    }

    /// Read one entry; `None` stands for the terminating null entry.
    fn parse(reader: &mut Reader) -> Result<Option<SourceRouteEntry>> {
        let address_family = reader.read_u16()?;
        let offset = reader.read_u8()?;
        let len = reader.read_u8()?;
        if address_family == 0 && len == 0 {
            return Ok(None);
        }
        if offset > len {
            return Err(Error);
        }
        Ok(Some(SourceRouteEntry {
            address_family,
            offset,
            data: reader.read_bytes(len as usize)?.to_vec(),
        }))
    }

    fn emit(&self, writer: &mut Writer) -> core::result::Result<(), BuildError> {
        BuildError::check_len("GRE source route entry", self.data.len(), u8::MAX as usize)?;
        BuildError::check_range("GRE source route offset", self.offset, self.data.len() as u64)?;
        writer.write_u16(self.address_family);
        writer.write_u8(self.offset);
        writer.write_u8(self.data.len() as u8);
        writer.write_bytes(&self.data);
        Ok(())
    }
}

/// The source routes and the full header length, once parsed.
#[derive(Debug, Clone)]
struct Layout {
    header_len: usize,
    routing: Option<Vec<SourceRouteEntry>>,
}

fn parse_layout(packet: &Packet<&[u8]>) -> Result<Layout> {
    packet.check_len()?;
    let start = packet.routing_start();
    if !packet.flags().contains(Flags::ROUTING) {
        return Ok(Layout {
            header_len: start,
            routing: None,
        });
    }
    let mut reader = Reader::new(&packet.buffer[start..]);
    let mut routing = Vec::new();
    while let Some(entry) = SourceRouteEntry::parse(&mut reader)? {
        routing.push(entry);
    }
    Ok(Layout {
        header_len: start + reader.position(),
        routing: Some(routing),
    })
}

/// A read-only view of a GRE header and what it carries.
#[derive(Debug, Clone)]
pub struct GreDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    layout: OnceLock<Option<Layout>>,
    payload: OnceLock<Box<EthernetPayload<'a>>>,
}

impl<'a> GreDatagram<'a> {
    fn layout(&self) -> Option<&Layout> {
        self.layout
            .get_or_init(|| parse_layout(&self.packet).ok())
            .as_ref()
    }

    /// Length of the header including source routes, if it holds together.
    pub fn header_len(&self) -> Option<usize> {
        self.layout().map(|layout| layout.header_len)
    }

    /// The source route entries, without the terminating null entry.
    pub fn routing(&self) -> Option<&[SourceRouteEntry]> {
        self.layout().and_then(|layout| layout.routing.as_deref())
    }

    /// The octets after the header.
    pub fn payload_bytes(&self) -> &'a [u8] {
        match self.header_len() {
            Some(len) => &self.packet.buffer[len..],
            None => &[],
        }
    }

    /// The view of the encapsulated payload, selected by the protocol type.
    pub fn ether_payload(&self) -> &EthernetPayload<'a> {
        self.payload.get_or_init(|| {
            Box::new(match self.header_len() {
                Some(_) => EthernetPayload::dispatch(self.protocol_type(), self.payload_bytes()),
                None => EthernetPayload::Unknown(&[]),
            })
        })
    }

    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if self.header_len().is_some() {
            self.ether_payload().extract_layers(layers);
        }
    }
}

impl<'a> core::ops::Deref for GreDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for GreDatagram<'a> {
    type Layer = GreLayer;

    fn new(bytes: &'a [u8]) -> Self {
        GreDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            layout: OnceLock::new(),
            payload: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.layout().is_none() {
                net_debug!("GRE header of {} octets is malformed", self.packet.buffer.len());
                return false;
            }
            if !self.verify_checksum() {
                net_debug!("GRE checksum {:?} is wrong", self.checksum());
                return false;
            }
            self.ether_payload().is_valid()
        })
    }

    fn extract_layer(&self) -> GreLayer {
        if self.packet.check_len().is_err() {
            return GreLayer::default();
        }
        GreLayer {
            protocol_type: Some(self.protocol_type()),
            checksum_present: self.flags().contains(Flags::CHECKSUM),
            checksum: self.checksum(),
            routing_offset: self.routing_offset().unwrap_or(0),
            key: self.key(),
            sequence_number: self.sequence_number(),
            acknowledgment_number: self.acknowledgment_number(),
            strict_source_route: self.flags().contains(Flags::STRICT_SOURCE_ROUTE),
            recursion_control: self.recursion_control(),
            reserved_flags: self.reserved_flags(),
            version: self.version(),
            routing: self.routing().map(<[_]>::to_vec),
        }
    }
}

/// A GRE header under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GreLayer {
    /// `None` asks the next layer for its EtherType.
    pub protocol_type: Option<EtherType>,
    pub checksum_present: bool,
    /// `None` computes the checksum, when present, over the header and
    /// every later layer.
    pub checksum: Option<u16>,
    /// Written whenever the checksum or routing is present.
    pub routing_offset: u16,
    pub key: Option<u32>,
    pub sequence_number: Option<u32>,
    pub acknowledgment_number: Option<u32>,
    pub strict_source_route: bool,
    /// 0 to 7.
    pub recursion_control: u8,
    /// 0 to 15.
    pub reserved_flags: u8,
    /// 0 to 7.
    pub version: u8,
    /// `Some` sets the routing flag; the null entry is added on output.
    pub routing: Option<Vec<SourceRouteEntry>>,
}

impl GreLayer {
    fn has_checksum_field(&self) -> bool {
        self.checksum_present || self.routing.is_some()
    }

    fn flags(&self) -> Flags {
        let mut flags = Flags::empty();
        flags.set(Flags::CHECKSUM, self.checksum_present);
        flags.set(Flags::ROUTING, self.routing.is_some());
        flags.set(Flags::KEY, self.key.is_some());
        flags.set(Flags::SEQUENCE, self.sequence_number.is_some());
        flags.set(Flags::STRICT_SOURCE_ROUTE, self.strict_source_route);
        flags.set(Flags::ACKNOWLEDGMENT, self.acknowledgment_number.is_some());
        flags
    }

    pub fn buffer_len(&self) -> usize {
        let optional = [
            self.key.is_some(),
            self.sequence_number.is_some(),
            self.acknowledgment_number.is_some(),
            self.has_checksum_field(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        let routing = self.routing.as_ref().map_or(0, |entries| {
            entries.iter().map(SourceRouteEntry::buffer_len).sum::<usize>()
                + SourceRouteEntry::HEADER_LEN
        });
        MIN_HEADER_LEN + 4 * optional + routing
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        BuildError::check_range("GRE recursion control", self.recursion_control, 7u8)?;
        BuildError::check_range("GRE reserved flags", self.reserved_flags, 15u8)?;
        BuildError::check_range("GRE version", self.version, 7u8)?;
        let protocol_type = match self.protocol_type {
            Some(protocol_type) => protocol_type,
            None => neighbours.ether_type("GRE")?,
        };

        let raw_flags = self.flags().bits()
            | (self.recursion_control as u16) << 8
            | (self.reserved_flags as u16) << 3
            | self.version as u16;
        let mut writer = Writer::new(buffer);
        writer.write_u16(raw_flags);
        writer.write_u16(protocol_type.into());
        if self.has_checksum_field() {
            writer.write_u16(self.checksum.unwrap_or(0));
            writer.write_u16(self.routing_offset);
        }
        for value in [self.key, self.sequence_number, self.acknowledgment_number]
            .into_iter()
            .flatten()
        {
            writer.write_u32(value);
        }
        if let Some(routing) = &self.routing {
            for entry in routing {
                entry.emit(&mut writer)?;
            }
            writer.write_u32(0);
        }
        Ok(())
    }

    pub(crate) fn finalize(&self, buffer: &mut [u8], payload_len: usize) {
        if self.checksum_present && self.checksum.is_none() {
            let len = self.buffer_len() + payload_len;
            let checksum = !checksum::data(&buffer[..len]);
            NetworkEndian::write_u16(&mut buffer[field::CHECKSUM], checksum);
        }
    }
}

impl IpNextLayer for GreLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::Gre
    }
}
