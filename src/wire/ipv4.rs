use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{
    Datagram, Error, EtherType, IpAddress, IpPayload, Ipv4Option, Options, Result,
};
use crate::builder::BuildError;
use crate::layer::{EthernetNextLayer, IpNextLayer, Layer, Neighbours};
use crate::wire::ip::checksum;

pub use super::IpProtocol as Protocol;

/// Size of IPv4 address in octets.
pub const ADDR_SIZE: usize = 4;

/// Largest option area an IPv4 header can carry.
pub const MAX_OPTIONS_LEN: usize = 40;

pub use core::net::Ipv4Addr as Address;

pub(crate) trait AddressExt {
    /// Construct an IPv4 address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not four octets long.
    fn from_bytes(data: &[u8]) -> Self;

    /// Query whether the address is an unicast address.
    ///
    /// `x_` prefix is to avoid a collision with the still-unstable method in `core::ip`.
    fn x_is_unicast(&self) -> bool;
}

impl AddressExt for Address {
    fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(data);
        Address::from_bits(u32::from_be_bytes(bytes))
    }

    fn x_is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast() || self.is_unspecified())
    }
}

/// A read/write wrapper around an Internet Protocol version 4 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const VER_IHL: usize = 0;
    pub const DSCP_ECN: usize = 1;
    pub const LENGTH: Field = 2..4;
    pub const IDENT: Field = 4..6;
    pub const FLG_OFF: Field = 6..8;
    pub const TTL: usize = 8;
    pub const PROTOCOL: usize = 9;
    pub const CHECKSUM: Field = 10..12;
    pub const SRC_ADDR: Field = 12..16;
    pub const DST_ADDR: Field = 16..20;
}

pub const HEADER_LEN: usize = field::DST_ADDR.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with IPv4 packet structure.
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
    /// Returns `Err(Error)` if the buffer is too short, if the header length
    /// is below the fixed header, or if the header length is greater than
    /// the total length or the total length greater than the buffer.
    ///
    /// The result of this check is invalidated by calling [set_header_len]
    /// and [set_total_len].
    ///
    /// [set_header_len]: #method.set_header_len
    /// [set_total_len]: #method.set_total_len
    #[allow(clippy::if_same_then_else)]
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error)
        } else if (self.header_len() as usize) < HEADER_LEN {
            Err(Error)
        } else if len < self.header_len() as usize {
            Err(Error)
        } else if self.header_len() as u16 > self.total_len() {
            Err(Error)
        } else if len < self.total_len() as usize {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the version field.
    #[inline]
    pub fn version(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::VER_IHL] >> 4
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let data = self.buffer.as_ref();
        (data[field::VER_IHL] & 0x0f) * 4
    }

    /// Return the type of service octet, DSCP and ECN together.
    #[inline]
    pub fn type_of_service(&self) -> u8 {
        self.buffer.as_ref()[field::DSCP_ECN]
    }

    /// Return the Differential Services Code Point field.
    pub fn dscp(&self) -> u8 {
        self.type_of_service() >> 2
    }

    /// Return the Explicit Congestion Notification field.
    pub fn ecn(&self) -> u8 {
        self.type_of_service() & 0x03
    }

    /// Return the total length field.
    #[inline]
    pub fn total_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::LENGTH])
    }

    /// Return the fragment identification field.
    #[inline]
    pub fn ident(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::IDENT])
    }

    /// Return the "don't fragment" flag.
    #[inline]
    pub fn dont_frag(&self) -> bool {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLG_OFF]) & 0x4000 != 0
    }

    /// Return the "more fragments" flag.
    #[inline]
    pub fn more_frags(&self) -> bool {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLG_OFF]) & 0x2000 != 0
    }

    /// Return the fragment offset, in octets.
    #[inline]
    pub fn frag_offset(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::FLG_OFF]) << 3
    }

    /// Return the time to live field.
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::TTL]
    }

    /// Return the next_header (protocol) field.
    #[inline]
    pub fn next_header(&self) -> Protocol {
        let data = self.buffer.as_ref();
        Protocol::from(data[field::PROTOCOL])
    }

    /// Return the header checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        Address::from_bytes(&data[field::SRC_ADDR])
    }

    /// Return the destination address field.
    #[inline]
    pub fn dst_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        Address::from_bytes(&data[field::DST_ADDR])
    }

    /// Validate the header checksum.
    ///
    /// # Fuzzing
    /// This function always returns `true` when fuzzing.
    pub fn verify_checksum(&self) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        let data = self.buffer.as_ref();
        checksum::data(&data[..self.header_len() as usize]) == !0
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the options.
    #[inline]
    pub fn options(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[HEADER_LEN..self.header_len() as usize]
    }

    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let range = self.header_len() as usize..self.total_len() as usize;
        let data = self.buffer.as_ref();
        &data[range]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the version field.
    #[inline]
    pub fn set_version(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::VER_IHL] = (data[field::VER_IHL] & !0xf0) | (value << 4);
    }

    /// Set the header length, in octets.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::VER_IHL] = (data[field::VER_IHL] & !0x0f) | ((value / 4) & 0x0f);
    }

    /// Set the type of service octet.
    #[inline]
    pub fn set_type_of_service(&mut self, value: u8) {
        self.buffer.as_mut()[field::DSCP_ECN] = value
    }

    /// Set the total length field.
    #[inline]
    pub fn set_total_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::LENGTH], value)
    }

    /// Set the fragment identification field.
    #[inline]
    pub fn set_ident(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::IDENT], value)
    }

    /// Set the flags and the fragment offset, in octets, together.
    #[inline]
    pub fn set_fragmentation(&mut self, fragmentation: Fragmentation) {
        let mut raw = fragmentation.offset >> 3;
        if fragmentation.dont_fragment {
            raw |= 0x4000;
        }
        if fragmentation.more_fragments {
            raw |= 0x2000;
        }
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::FLG_OFF], raw);
    }

    /// Set the time to live field.
    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::TTL] = value
    }

    /// Set the next header (protocol) field.
    #[inline]
    pub fn set_next_header(&mut self, value: Protocol) {
        let data = self.buffer.as_mut();
        data[field::PROTOCOL] = value.into()
    }

    /// Set the header checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the source address field.
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::SRC_ADDR].copy_from_slice(&value.octets())
    }

    /// Set the destination address field.
    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::DST_ADDR].copy_from_slice(&value.octets())
    }

    /// Compute and fill in the header checksum.
    pub fn fill_checksum(&mut self) {
        self.set_checksum(0);
        let checksum = {
            let data = self.buffer.as_ref();
            !checksum::data(&data[..self.header_len() as usize])
        };
        self.set_checksum(checksum)
    }

    /// Return a mutable pointer to the options.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        let range = HEADER_LEN..self.header_len() as usize;
        let data = self.buffer.as_mut();
        &mut data[range]
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
            return write!(f, "IPv4 (truncated)");
        }
        write!(
            f,
            "IPv4 src={} dst={} proto={} hop_limit={}",
            self.src_addr(),
            self.dst_addr(),
            self.next_header(),
            self.hop_limit()
        )?;
        if self.version() != 4 {
            write!(f, " ver={}", self.version())?;
        }
        if self.header_len() != 20 {
            write!(f, " hlen={}", self.header_len())?;
        }
        if self.dscp() != 0 {
            write!(f, " dscp={}", self.dscp())?;
        }
        if self.ecn() != 0 {
            write!(f, " ecn={}", self.ecn())?;
        }
        write!(f, " tlen={}", self.total_len())?;
        if self.dont_frag() {
            write!(f, " df")?;
        }
        if self.more_frags() {
            write!(f, " mf")?;
        }
        if self.frag_offset() != 0 {
            write!(f, " off={}", self.frag_offset())?;
        }
        if self.more_frags() || self.frag_offset() != 0 {
            write!(f, " id={}", self.ident())?;
        }
        Ok(())
    }
}

/// The fragmentation flags and offset of an IPv4 header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fragmentation {
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// Offset of this fragment, in octets. A multiple of 8.
    pub offset: u16,
}

impl Fragmentation {
    pub const MAX_OFFSET: u16 = 0xfff8;

    pub const fn is_fragment(&self) -> bool {
        self.more_fragments || self.offset != 0
    }
}

/// A read-only view of an IPv4 packet.
#[derive(Debug, Clone)]
pub struct Ipv4Datagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    options: OnceLock<Options<Ipv4Option>>,
    payload: OnceLock<Box<IpPayload<'a>>>,
}

impl<'a> Ipv4Datagram<'a> {
    fn bytes_len(&self) -> usize {
        self.packet.buffer.len()
    }

    /// Whether the fixed header and the declared option area are present.
    fn has_header(&self) -> bool {
        let len = self.bytes_len();
        len >= HEADER_LEN && (HEADER_LEN..=len).contains(&(self.packet.header_len() as usize))
    }

    /// Return the parsed option area.
    pub fn options(&self) -> &Options<Ipv4Option> {
        self.options.get_or_init(|| {
            if self.has_header() {
                Options::parse(self.packet.options())
            } else {
                Options::empty()
            }
        })
    }

    /// The octets after the header, up to the total length or the end of the
    /// buffer, whichever comes first.
    pub fn payload_bytes(&self) -> &'a [u8] {
        if !self.has_header() {
            return &[];
        }
        let data = self.packet.buffer;
        let start = self.packet.header_len() as usize;
        let end = (self.packet.total_len() as usize).clamp(start, data.len());
        &data[start..end]
    }

    pub fn fragmentation(&self) -> Fragmentation {
        Fragmentation {
            dont_fragment: self.dont_frag(),
            more_fragments: self.more_frags(),
            offset: self.frag_offset(),
        }
    }

    /// The view of the payload, selected by the protocol field. Fragments
    /// other than the first are not interpreted.
    pub fn ip_payload(&self) -> &IpPayload<'a> {
        self.payload.get_or_init(|| {
            let payload = if !self.has_header() {
                IpPayload::Unknown(&[])
            } else if self.frag_offset() != 0 {
                IpPayload::Unknown(self.payload_bytes())
            } else {
                IpPayload::dispatch(self.next_header(), self.payload_bytes())
            };
            Box::new(payload)
        })
    }

    /// Whether the TCP or UDP checksum of the payload is correct. Fragmented
    /// packets carry an incomplete segment and always pass.
    pub fn is_transport_checksum_correct(&self) -> bool {
        if !self.has_header() || self.fragmentation().is_fragment() {
            return true;
        }
        let src_addr = IpAddress::Ipv4(self.src_addr());
        let dst_addr = IpAddress::Ipv4(self.dst_addr());
        self.ip_payload()
            .is_transport_checksum_correct(&src_addr, &dst_addr)
    }

    /// Extract this packet and everything it carries as layers.
    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if self.has_header() {
            self.ip_payload().extract_layers(layers);
        }
    }
}

impl<'a> core::ops::Deref for Ipv4Datagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for Ipv4Datagram<'a> {
    type Layer = Ipv4Layer;

    fn new(bytes: &'a [u8]) -> Self {
        Ipv4Datagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            options: OnceLock::new(),
            payload: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.packet.check_len().is_err() || self.version() != 4 {
                net_debug!("IPv4 header of {} octets is malformed", self.bytes_len());
                return false;
            }
            if !self.verify_checksum() {
                net_debug!("IPv4 header checksum {:#06x} is wrong", self.checksum());
                return false;
            }
            self.options().is_valid()
                && self.ip_payload().is_valid()
                && self.is_transport_checksum_correct()
        })
    }

    fn extract_layer(&self) -> Ipv4Layer {
        if self.bytes_len() < HEADER_LEN {
            return Ipv4Layer::default();
        }
        Ipv4Layer {
            type_of_service: self.type_of_service(),
            identification: self.ident(),
            fragmentation: self.fragmentation(),
            ttl: self.hop_limit(),
            protocol: Some(self.next_header()),
            header_checksum: Some(self.checksum()),
            source: self.src_addr(),
            destination: self.dst_addr(),
            options: self.options().clone(),
        }
    }
}

/// An IPv4 header under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Layer {
    pub type_of_service: u8,
    pub identification: u16,
    pub fragmentation: Fragmentation,
    pub ttl: u8,
    /// `None` asks the next layer.
    pub protocol: Option<Protocol>,
    /// `None` computes the header checksum.
    pub header_checksum: Option<u16>,
    pub source: Address,
    pub destination: Address,
    pub options: Options<Ipv4Option>,
}

impl Default for Ipv4Layer {
    fn default() -> Self {
        Ipv4Layer {
            type_of_service: 0,
            identification: 0,
            fragmentation: Fragmentation::default(),
            ttl: 64,
            protocol: None,
            header_checksum: None,
            source: Address::UNSPECIFIED,
            destination: Address::UNSPECIFIED,
            options: Options::empty(),
        }
    }
}

impl Ipv4Layer {
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.options.buffer_len()
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        let header_len = self.buffer_len();
        BuildError::check_len("IPv4 options", self.options.buffer_len(), MAX_OPTIONS_LEN)?;
        BuildError::check_len("IPv4 packet", header_len + payload_len, u16::MAX as usize)?;
        BuildError::check_range(
            "IPv4 fragment offset",
            self.fragmentation.offset,
            Fragmentation::MAX_OFFSET,
        )?;
        if self.fragmentation.offset % 8 != 0 {
            return Err(BuildError::Mismatch {
                what: "IPv4 fragment offset is not a multiple of 8",
            });
        }
        let protocol = match self.protocol {
            Some(protocol) => protocol,
            None => neighbours.ip_protocol("IPv4")?,
        };

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_version(4);
        packet.set_header_len(header_len as u8);
        packet.set_type_of_service(self.type_of_service);
        packet.set_total_len((header_len + payload_len) as u16);
        packet.set_ident(self.identification);
        packet.set_fragmentation(self.fragmentation);
        packet.set_hop_limit(self.ttl);
        packet.set_next_header(protocol);
        packet.set_src_addr(self.source);
        packet.set_dst_addr(self.destination);
        self.options.emit(packet.options_mut());
        match self.header_checksum {
            Some(checksum) => packet.set_checksum(checksum),
            None => packet.fill_checksum(),
        }
        Ok(())
    }

    /// Complete the checksum of a TCP or UDP layer right after this one.
    pub(crate) fn finalize(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        let Some(transport) = neighbours.transport() else {
            return Ok(());
        };
        if transport.checksum().is_some() || !transport.calculate_checksum() {
            return Ok(());
        }
        let header_len = self.buffer_len();
        let protocol = Packet::new_unchecked(&buffer[..header_len]).next_header();
        checksum::fill_transport(
            &IpAddress::Ipv4(self.source),
            &IpAddress::Ipv4(self.destination),
            protocol,
            &mut buffer[header_len..header_len + payload_len],
            transport,
        );
        Ok(())
    }
}

impl EthernetNextLayer for Ipv4Layer {
    fn ether_type(&self) -> EtherType {
        EtherType::Ipv4
    }
}

impl IpNextLayer for Ipv4Layer {
    fn protocol(&self) -> Protocol {
        Protocol::Ipv4
    }
}
