use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{
    Datagram, DhcpDatagram, DnsDatagram, Error, IpAddress, IpProtocol, Result, DHCP_CLIENT_PORT,
    DHCP_SERVER_PORT, DNS_PORT,
};
use crate::builder::BuildError;
use crate::layer::{push_application, push_payload, IpNextLayer, Layer, TransportChecksumLayer};
use crate::wire::ip::checksum;

/// A read/write wrapper around an User Datagram Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const LENGTH: Field = 4..6;
    pub const CHECKSUM: Field = 6..8;

    pub const fn PAYLOAD(length: u16) -> Field {
        CHECKSUM.end..(length as usize)
    }
}

pub const HEADER_LEN: usize = field::CHECKSUM.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with UDP packet structure.
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
    /// Returns `Err(Error)` if the buffer is too short, or if the length
    /// field is below the header length or past the end of the buffer.
    ///
    /// The result of this check is invalidated by calling [set_len].
    ///
    /// [set_len]: #method.set_len
    pub fn check_len(&self) -> Result<()> {
        let buffer_len = self.buffer.as_ref().len();
        if buffer_len < HEADER_LEN {
            Err(Error)
        } else {
            let field_len = self.len() as usize;
            if buffer_len < field_len || field_len < HEADER_LEN {
                Err(Error)
            } else {
                Ok(())
            }
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the source port field.
    #[inline]
    pub fn src_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::SRC_PORT])
    }

    /// Return the destination port field.
    #[inline]
    pub fn dst_port(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::DST_PORT])
    }

    /// Return the length field.
    #[inline]
    pub fn len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::LENGTH])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let length = self.len();
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD(length)]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the source port field.
    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::SRC_PORT], value)
    }

    /// Set the destination port field.
    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::DST_PORT], value)
    }

    /// Set the length field.
    #[inline]
    pub fn set_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::LENGTH], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
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
            return write!(f, "UDP (truncated)");
        }
        write!(
            f,
            "UDP src={} dst={} len={}",
            self.src_port(),
            self.dst_port(),
            self.len()
        )
    }
}

/// The view of whatever a UDP datagram carries, selected by its ports.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Dhcp(DhcpDatagram<'a>),
    Dns(DnsDatagram<'a>),
    Unknown(&'a [u8]),
}

impl<'a> Payload<'a> {
    fn dispatch(src_port: u16, dst_port: u16, bytes: &'a [u8]) -> Self {
        let dhcp_ports = [DHCP_CLIENT_PORT, DHCP_SERVER_PORT];
        if bytes.is_empty() {
            Payload::Unknown(bytes)
        } else if src_port == DNS_PORT || dst_port == DNS_PORT {
            Payload::Dns(DnsDatagram::new(bytes))
        } else if dhcp_ports.contains(&src_port) && dhcp_ports.contains(&dst_port) {
            Payload::Dhcp(DhcpDatagram::new(bytes))
        } else {
            Payload::Unknown(bytes)
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        match self {
            Payload::Dhcp(view) => view.bytes(),
            Payload::Dns(view) => view.bytes(),
            Payload::Unknown(bytes) => bytes,
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Payload::Dhcp(view) => view.is_valid(),
            Payload::Dns(view) => view.is_valid(),
            Payload::Unknown(_) => true,
        }
    }

    fn extract_layers(&self, layers: &mut Vec<Layer>) {
        match self {
            Payload::Dhcp(view) if view.is_valid() => {
                push_application(layers, view.extract_layer().into(), view.bytes())
            }
            Payload::Dns(view) if view.is_valid() => {
                push_application(layers, view.extract_layer().into(), view.bytes())
            }
            _ => push_payload(layers, self.bytes()),
        }
    }
}

/// A read-only view of a UDP datagram.
#[derive(Debug, Clone)]
pub struct UdpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    payload: OnceLock<Box<Payload<'a>>>,
}

impl<'a> UdpDatagram<'a> {
    /// The octets after the header, up to the length field or the end of the
    /// buffer, whichever comes first.
    pub fn payload_bytes(&self) -> &'a [u8] {
        let data = self.packet.buffer;
        if data.len() < HEADER_LEN {
            return &[];
        }
        let end = (self.len() as usize).clamp(HEADER_LEN, data.len());
        &data[HEADER_LEN..end]
    }

    /// The view of the payload, selected by the well-known ports.
    pub fn udp_payload(&self) -> &Payload<'a> {
        self.payload.get_or_init(|| {
            let payload = if self.packet.buffer.len() < HEADER_LEN {
                Payload::Unknown(&[])
            } else {
                Payload::dispatch(self.src_port(), self.dst_port(), self.payload_bytes())
            };
            Box::new(payload)
        })
    }

    /// The payload as a DNS message, if either port is the DNS port.
    pub fn dns(&self) -> Option<&DnsDatagram<'a>> {
        match self.udp_payload() {
            Payload::Dns(view) => Some(view),
            _ => None,
        }
    }

    /// The payload as a DHCP message, if both ports are DHCP ports.
    pub fn dhcp(&self) -> Option<&DhcpDatagram<'a>> {
        match self.udp_payload() {
            Payload::Dhcp(view) => Some(view),
            _ => None,
        }
    }

    /// Validate the checksum against the pseudo header of the enclosing IP
    /// header. Over IPv4 a zero checksum field means the sender computed none;
    /// over IPv6 the checksum is mandatory and zero is always wrong.
    pub fn is_checksum_correct(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.packet.buffer;
        if data.len() < HEADER_LEN {
            return false;
        }
        if self.checksum() == 0 {
            return matches!(src_addr, IpAddress::Ipv4(_));
        }
        let end = (self.len() as usize).min(data.len());
        checksum::verify_transport(src_addr, dst_addr, IpProtocol::Udp, &data[..end])
    }

    /// Extract this datagram and everything it carries as layers.
    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if self.packet.buffer.len() >= HEADER_LEN {
            self.udp_payload().extract_layers(layers);
        }
    }
}

impl<'a> core::ops::Deref for UdpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for UdpDatagram<'a> {
    type Layer = UdpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        UdpDatagram {
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
            if self.packet.check_len().is_err() {
                net_debug!("UDP header of {} octets is malformed", self.packet.buffer.len());
                return false;
            }
            self.udp_payload().is_valid()
        })
    }

    fn extract_layer(&self) -> UdpLayer {
        if self.packet.buffer.len() < HEADER_LEN {
            return UdpLayer::default();
        }
        UdpLayer {
            source_port: self.src_port(),
            destination_port: self.dst_port(),
            checksum: Some(self.checksum()),
            calculate_checksum: true,
        }
    }
}

/// A UDP header under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    /// `None` lets the IP layer in front compute the checksum.
    pub checksum: Option<u16>,
    /// With `checksum` unset, `false` sends no checksum at all.
    pub calculate_checksum: bool,
}

impl Default for UdpLayer {
    fn default() -> Self {
        UdpLayer {
            source_port: 0,
            destination_port: 0,
            checksum: None,
            calculate_checksum: true,
        }
    }
}

impl UdpLayer {
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
    ) -> core::result::Result<(), BuildError> {
        let len = HEADER_LEN + payload_len;
        BuildError::check_len("UDP datagram", len, u16::MAX as usize)?;

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_src_port(self.source_port);
        packet.set_dst_port(self.destination_port);
        packet.set_len(len as u16);
        packet.set_checksum(self.checksum.unwrap_or(0));
        Ok(())
    }
}

impl IpNextLayer for UdpLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::Udp
    }
}

impl TransportChecksumLayer for UdpLayer {
    fn checksum(&self) -> Option<u16> {
        self.checksum
    }

    fn checksum_offset(&self) -> usize {
        field::CHECKSUM.start
    }

    fn is_checksum_optional(&self) -> bool {
        true
    }

    fn calculate_checksum(&self) -> bool {
        self.calculate_checksum
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Ipv4Address, Ipv6Address};

    const SRC_ADDR: IpAddress = IpAddress::Ipv4(Ipv4Address::new(1, 2, 3, 4));
    const DST_ADDR: IpAddress = IpAddress::Ipv4(Ipv4Address::new(11, 22, 33, 44));

    static PACKET_BYTES: [u8; 10] = [0x0f, 0xd2, 0x00, 0x19, 0x00, 0x0a, 0x57, 0x3e, 0x68, 0x69];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_unchecked(&PACKET_BYTES[..]);
        assert_eq!(packet.src_port(), 4050);
        assert_eq!(packet.dst_port(), 25);
        assert_eq!(packet.len(), 10);
        assert_eq!(packet.checksum(), 0x573e);
        assert_eq!(packet.payload(), b"hi");
    }

    #[test]
    fn test_construct() {
        let mut bytes = [0xa5; 10];
        let layer = UdpLayer {
            source_port: 4050,
            destination_port: 25,
            checksum: Some(0x573e),
            ..UdpLayer::default()
        };
        layer.emit(&mut bytes[..8], 2).unwrap();
        bytes[8..].copy_from_slice(b"hi");
        assert_eq!(bytes, PACKET_BYTES);
    }

    #[test]
    fn test_checksum() {
        let view = UdpDatagram::new(&PACKET_BYTES[..]);
        assert!(view.is_valid());
        assert!(view.is_checksum_correct(&SRC_ADDR, &DST_ADDR));
        // addresses are summed, so swapping them is not detectable
        assert!(view.is_checksum_correct(&DST_ADDR, &SRC_ADDR));
        let other = IpAddress::Ipv4(Ipv4Address::new(11, 22, 33, 45));
        assert!(!view.is_checksum_correct(&SRC_ADDR, &other));

        let mut bytes = PACKET_BYTES;
        bytes[9] ^= 0x01;
        let view = UdpDatagram::new(&bytes[..]);
        assert!(!view.is_checksum_correct(&SRC_ADDR, &DST_ADDR));
    }

    #[test]
    fn test_zero_checksum_over_ipv6() {
        let mut bytes = PACKET_BYTES;
        bytes[6] = 0;
        bytes[7] = 0;
        let view = UdpDatagram::new(&bytes[..]);
        let src = IpAddress::Ipv6(Ipv6Address::LOCALHOST);
        let dst = IpAddress::Ipv6(Ipv6Address::UNSPECIFIED);
        assert!(!view.is_checksum_correct(&src, &dst));
    }

    #[test]
    fn test_zero_checksum_is_absent() {
        let mut bytes = PACKET_BYTES;
        bytes[6] = 0;
        bytes[7] = 0;
        let view = UdpDatagram::new(&bytes[..]);
        assert!(view.is_checksum_correct(&SRC_ADDR, &DST_ADDR));
    }

    #[test]
    fn test_impossible_len() {
        let mut bytes = PACKET_BYTES;
        bytes[5] = 4;
        assert!(!UdpDatagram::new(&bytes[..]).is_valid());
        bytes[5] = 12;
        let view = UdpDatagram::new(&bytes[..]);
        assert!(!view.is_valid());
        assert_eq!(view.payload_bytes(), b"hi");
    }

    #[test]
    fn test_payload_not_interpreted() {
        let view = UdpDatagram::new(&PACKET_BYTES[..]);
        assert!(view.dns().is_none());
        assert!(view.dhcp().is_none());

        let mut layers = Vec::new();
        view.extract_layers(&mut layers);
        assert_eq!(layers.len(), 2);
        assert_eq!(
            layers[1],
            Layer::Payload(crate::PayloadLayer::new(b"hi".to_vec()))
        );
    }

    #[test]
    fn test_too_long() {
        let mut bytes = [0; 8];
        assert_eq!(
            UdpLayer::default().emit(&mut bytes, 65528),
            Err(BuildError::TooLong {
                what: "UDP datagram",
                len: 65536,
                max: 65535
            })
        );
    }
}
