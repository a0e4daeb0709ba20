use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{Datagram, Error, EtherType, IpAddress, IpPayload, Result};
use crate::builder::BuildError;
use crate::layer::{EthernetNextLayer, IpNextLayer, Layer, Neighbours};
use crate::wire::ip::checksum;

pub use super::IpProtocol as Protocol;

/// Size of IPv6 address in octets.
pub const ADDR_SIZE: usize = 16;

/// Largest value of the 20-bit flow label.
pub const MAX_FLOW_LABEL: u32 = 0xf_ffff;

pub use core::net::Ipv6Addr as Address;

/// A read/write wrapper around an Internet Protocol version 6 packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    // 4-bit version, 8-bit traffic class and 20-bit flow label.
    pub const VER_TC_FLOW: Field = 0..4;
    pub const LENGTH: Field = 4..6;
    pub const NXT_HDR: usize = 6;
    pub const HOP_LIMIT: usize = 7;
    pub const SRC_ADDR: Field = 8..24;
    pub const DST_ADDR: Field = 24..40;
}

/// Length of the fixed IPv6 header.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Create a raw octet buffer with an IPv6 packet structure.
    #[inline]
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    #[inline]
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short.
    ///
    /// The result of this check is invalidated by calling [set_payload_len].
    ///
    /// [set_payload_len]: #method.set_payload_len
    #[inline]
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN || len < self.total_len() {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    #[inline]
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the header length.
    #[inline]
    pub const fn header_len(&self) -> usize {
        HEADER_LEN
    }

    /// Return the version field.
    #[inline]
    pub fn version(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::VER_TC_FLOW.start] >> 4
    }

    /// Return the traffic class.
    #[inline]
    pub fn traffic_class(&self) -> u8 {
        let data = self.buffer.as_ref();
        ((NetworkEndian::read_u16(&data[0..2]) & 0x0ff0) >> 4) as u8
    }

    /// Return the flow label field.
    #[inline]
    pub fn flow_label(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u24(&data[1..4]) & 0x000f_ffff
    }

    /// Return the payload length field.
    #[inline]
    pub fn payload_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::LENGTH])
    }

    /// Return the payload length added to the known header length.
    #[inline]
    pub fn total_len(&self) -> usize {
        self.header_len() + self.payload_len() as usize
    }

    /// Return the next header field.
    #[inline]
    pub fn next_header(&self) -> Protocol {
        let data = self.buffer.as_ref();
        Protocol::from(data[field::NXT_HDR])
    }

    /// Return the hop limit field.
    #[inline]
    pub fn hop_limit(&self) -> u8 {
        let data = self.buffer.as_ref();
        data[field::HOP_LIMIT]
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(&data[field::SRC_ADDR]);
        Address::from(bytes)
    }

    /// Return the destination address field.
    #[inline]
    pub fn dst_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        let mut bytes = [0; ADDR_SIZE];
        bytes.copy_from_slice(&data[field::DST_ADDR]);
        Address::from(bytes)
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        let range = self.header_len()..self.total_len();
        &data[range]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the version field.
    #[inline]
    pub fn set_version(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        // Make sure to retain the lower order bits which contain
        // the higher order bits of the traffic class
        data[0] = (data[0] & 0x0f) | ((value & 0x0f) << 4);
    }

    /// Set the traffic class field.
    #[inline]
    pub fn set_traffic_class(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        // Put the higher order 4-bits of value in the lower order
        // 4-bits of the first byte
        data[0] = (data[0] & 0xf0) | ((value & 0xf0) >> 4);
        // Put the lower order 4-bits of value in the higher order
        // 4-bits of the second byte
        data[1] = (data[1] & 0x0f) | ((value & 0x0f) << 4);
    }

    /// Set the flow label field.
    #[inline]
    pub fn set_flow_label(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        // Retain the lower order 4-bits of the traffic class
        let raw = (((data[1] & 0xf0) as u32) << 16) | (value & 0x0f_ffff);
        NetworkEndian::write_u24(&mut data[1..4], raw);
    }

    /// Set the payload length field.
    #[inline]
    pub fn set_payload_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::LENGTH], value);
    }

    /// Set the next header field.
    #[inline]
    pub fn set_next_header(&mut self, value: Protocol) {
        let data = self.buffer.as_mut();
        data[field::NXT_HDR] = value.into();
    }

    /// Set the hop limit field.
    #[inline]
    pub fn set_hop_limit(&mut self, value: u8) {
        let data = self.buffer.as_mut();
        data[field::HOP_LIMIT] = value;
    }

    /// Set the source address field.
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::SRC_ADDR].copy_from_slice(&value.octets());
    }

    /// Set the destination address field.
    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::DST_ADDR].copy_from_slice(&value.octets());
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Packet<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.buffer.as_ref().len() < HEADER_LEN {
            return write!(f, "IPv6 (truncated)");
        }
        write!(
            f,
            "IPv6 src={} dst={} nxt_hdr={} hop_limit={}",
            self.src_addr(),
            self.dst_addr(),
            self.next_header(),
            self.hop_limit()
        )
    }
}

/// A read-only view of an IPv6 packet.
///
/// Extension headers are not followed: a packet whose next header is an
/// extension carries an uninterpreted payload.
#[derive(Debug, Clone)]
pub struct Ipv6Datagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    payload: OnceLock<Box<IpPayload<'a>>>,
}

impl<'a> Ipv6Datagram<'a> {
    fn has_header(&self) -> bool {
        self.packet.buffer.len() >= HEADER_LEN
    }

    /// The octets after the fixed header, up to the payload length or the
    /// end of the buffer, whichever comes first.
    pub fn payload_bytes(&self) -> &'a [u8] {
        if !self.has_header() {
            return &[];
        }
        let data = self.packet.buffer;
        let end = self.packet.total_len().min(data.len());
        &data[HEADER_LEN..end]
    }

    /// The view of the payload, selected by the next header field.
    pub fn ip_payload(&self) -> &IpPayload<'a> {
        self.payload.get_or_init(|| {
            let payload = if self.has_header() {
                IpPayload::dispatch(self.next_header(), self.payload_bytes())
            } else {
                IpPayload::Unknown(&[])
            };
            Box::new(payload)
        })
    }

    /// Whether the TCP or UDP checksum of the payload is correct.
    pub fn is_transport_checksum_correct(&self) -> bool {
        if !self.has_header() {
            return true;
        }
        let src_addr = IpAddress::Ipv6(self.src_addr());
        let dst_addr = IpAddress::Ipv6(self.dst_addr());
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

impl<'a> core::ops::Deref for Ipv6Datagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for Ipv6Datagram<'a> {
    type Layer = Ipv6Layer;

    fn new(bytes: &'a [u8]) -> Self {
        Ipv6Datagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            payload: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.packet.check_len().is_err() || self.version() != 6 {
                net_debug!("IPv6 header of {} octets is malformed", self.packet.buffer.len());
                return false;
            }
            self.ip_payload().is_valid() && self.is_transport_checksum_correct()
        })
    }

    fn extract_layer(&self) -> Ipv6Layer {
        if !self.has_header() {
            return Ipv6Layer::default();
        }
        Ipv6Layer {
            traffic_class: self.traffic_class(),
            flow_label: self.flow_label(),
            next_header: Some(self.next_header()),
            hop_limit: self.hop_limit(),
            source: self.src_addr(),
            destination: self.dst_addr(),
        }
    }
}

/// An IPv6 header under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Layer {
    pub traffic_class: u8,
    /// At most [MAX_FLOW_LABEL].
    pub flow_label: u32,
    /// `None` asks the next layer.
    pub next_header: Option<Protocol>,
    pub hop_limit: u8,
    pub source: Address,
    pub destination: Address,
}

impl Default for Ipv6Layer {
    fn default() -> Self {
        Ipv6Layer {
            traffic_class: 0,
            flow_label: 0,
            next_header: None,
            hop_limit: 64,
            source: Address::UNSPECIFIED,
            destination: Address::UNSPECIFIED,
        }
    }
}

impl Ipv6Layer {
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        BuildError::check_range("IPv6 flow label", self.flow_label, MAX_FLOW_LABEL)?;
        BuildError::check_len("IPv6 payload", payload_len, u16::MAX as usize)?;
        let next_header = match self.next_header {
            Some(next_header) => next_header,
            None => neighbours.ip_protocol("IPv6")?,
        };

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_version(6);
        packet.set_traffic_class(self.traffic_class);
        packet.set_flow_label(self.flow_label);
        packet.set_payload_len(payload_len as u16);
        packet.set_next_header(next_header);
        packet.set_hop_limit(self.hop_limit);
        packet.set_src_addr(self.source);
        packet.set_dst_addr(self.destination);
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
        let next_header = Packet::new_unchecked(&buffer[..HEADER_LEN]).next_header();
        checksum::fill_transport(
            &IpAddress::Ipv6(self.source),
            &IpAddress::Ipv6(self.destination),
            next_header,
            &mut buffer[HEADER_LEN..HEADER_LEN + payload_len],
            transport,
        );
        Ok(())
    }
}

impl EthernetNextLayer for Ipv6Layer {
    fn ether_type(&self) -> EtherType {
        EtherType::Ipv6
    }
}

impl IpNextLayer for Ipv6Layer {
    fn protocol(&self) -> Protocol {
        Protocol::Ipv6
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::UdpLayer;

    // fe80::1 -> ff02::1, UDP 546 -> 547 carrying 0xdead.
    static PACKET_BYTES: [u8; 50] = [
        0x61, 0x23, 0x45, 0x67, 0x00, 0x0a, 0x11, 0x40, 0xfe, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xff, 0x02, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x22,
        0x02, 0x23, 0x00, 0x0a, 0x1f, 0x62, 0xde, 0xad,
    ];

    const LINK_LOCAL: Address = Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
    const ALL_NODES: Address = Address::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_checked(&PACKET_BYTES[..]).unwrap();
        assert_eq!(packet.version(), 6);
        assert_eq!(packet.traffic_class(), 0x12);
        assert_eq!(packet.flow_label(), 0x34567);
        assert_eq!(packet.payload_len(), 10);
        assert_eq!(packet.next_header(), Protocol::Udp);
        assert_eq!(packet.hop_limit(), 64);
        assert_eq!(packet.src_addr(), LINK_LOCAL);
        assert_eq!(packet.dst_addr(), ALL_NODES);
        assert_eq!(packet.payload().len(), 10);
    }

    #[test]
    fn test_construct() {
        let mut bytes = [0xff; 40];
        let mut packet = Packet::new_unchecked(&mut bytes[..]);
        packet.set_version(6);
        packet.set_traffic_class(0x12);
        packet.set_flow_label(0x34567);
        packet.set_payload_len(10);
        packet.set_next_header(Protocol::Udp);
        packet.set_hop_limit(64);
        packet.set_src_addr(LINK_LOCAL);
        packet.set_dst_addr(ALL_NODES);
        assert_eq!(&bytes[..], &PACKET_BYTES[..40]);
    }

    #[test]
    fn test_view_with_udp() {
        let view = Ipv6Datagram::new(&PACKET_BYTES[..]);
        assert!(view.is_valid());
        assert!(matches!(view.ip_payload(), IpPayload::Udp(_)));

        let mut bytes = PACKET_BYTES;
        bytes[49] ^= 0x01;
        assert!(!Ipv6Datagram::new(&bytes[..]).is_valid());
    }

    #[test]
    fn test_payload_len_overruns_buffer() {
        let view = Ipv6Datagram::new(&PACKET_BYTES[..45]);
        assert!(!view.is_valid());
        assert_eq!(view.payload_bytes().len(), 5);

        let short = Ipv6Datagram::new(&PACKET_BYTES[..39]);
        assert!(!short.is_valid());
        assert!(matches!(*short.ip_payload(), IpPayload::Unknown(&[])));
    }

    #[test]
    fn test_rebuild() {
        let view = Ipv6Datagram::new(&PACKET_BYTES[..]);
        let layer = view.extract_layer();
        assert_eq!(layer.next_header, Some(Protocol::Udp));

        let udp = Layer::from(UdpLayer::default());
        let neighbours = Neighbours {
            previous: None,
            next: Some(&udp),
        };
        let mut bytes = [0; 40];
        layer.emit(&mut bytes, 10, &neighbours).unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..40]);
    }

    #[test]
    fn test_flow_label_out_of_range() {
        let layer = Ipv6Layer {
            flow_label: 0x10_0000,
            next_header: Some(Protocol::Udp),
            ..Ipv6Layer::default()
        };
        let neighbours = Neighbours {
            previous: None,
            next: None,
        };
        let mut bytes = [0; 40];
        assert_eq!(
            layer.emit(&mut bytes, 0, &neighbours),
            Err(BuildError::OutOfRange {
                field: "IPv6 flow label",
                value: 0x10_0000,
                max: 0xf_ffff
            })
        );
    }
}
