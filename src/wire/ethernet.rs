use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{
    ArpDatagram, ArpHardware, Datagram, Error, Ipv4Datagram, Ipv6Datagram, Result, VlanDatagram,
    VLAN_HEADER_LEN,
};
use crate::builder::BuildError;
use crate::layer::{push_payload, ArpPreviousLayer, Layer, Neighbours, TrailerLayer};

enum_with_unknown! {
    /// Ethernet protocol type.
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp  = 0x0806,
        Vlan = 0x8100,
        Ipv6 = 0x86DD
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Arp => write!(f, "ARP"),
            EtherType::Vlan => write!(f, "VLAN"),
            EtherType::Unknown(id) => write!(f, "0x{id:04x}"),
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// The broadcast address.
    pub const BROADCAST: Address = Address([0xff; 6]);

    /// Construct an Ethernet address from a sequence of octets, in big-endian.
    ///
    /// # Panics
    /// The function panics if `data` is not six octets long.
    pub fn from_bytes(data: &[u8]) -> Address {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(data);
        Address(bytes)
    }

    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Query whether the address is an unicast address.
    pub fn is_unicast(&self) -> bool {
        !(self.is_broadcast() || self.is_multicast())
    }

    /// Query whether this address is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Query whether the "multicast" bit in the OUI is set.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Query whether the "locally administered" bit in the OUI is set.
    pub const fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Query whether every octet is zero.
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]
        )
    }
}

/// A read/write wrapper around an Ethernet II frame buffer.
#[derive(Debug, Clone)]
pub struct Frame<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const DESTINATION: Field = 0..6;
    pub const SOURCE: Field = 6..12;
    pub const ETHERTYPE: Field = 12..14;
    pub const PAYLOAD: Rest = 14..;
}

/// The Ethernet header length
pub const HEADER_LEN: usize = 14;

/// Shortest frame on the wire, without the frame check sequence.
pub const MIN_FRAME_LEN: usize = 60;

/// Length of the frame check sequence.
pub const FCS_LEN: usize = 4;

impl<T: AsRef<[u8]>> Frame<T> {
    /// Imbue a raw octet buffer with Ethernet frame structure.
    pub const fn new_unchecked(buffer: T) -> Frame<T> {
        Frame { buffer }
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(buffer: T) -> Result<Frame<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consumes the frame, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the destination address field.
    #[inline]
    pub fn dst_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        Address::from_bytes(&data[field::DESTINATION])
    }

    /// Return the source address field.
    #[inline]
    pub fn src_addr(&self) -> Address {
        let data = self.buffer.as_ref();
        Address::from_bytes(&data[field::SOURCE])
    }

    /// Return the EtherType field, without checking for 802.1Q.
    #[inline]
    pub fn ethertype(&self) -> EtherType {
        let data = self.buffer.as_ref();
        let raw = NetworkEndian::read_u16(&data[field::ETHERTYPE]);
        EtherType::from(raw)
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Frame<&'a T> {
    /// Return a pointer to the payload, without checking for 802.1Q.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Frame<T> {
    /// Set the destination address field.
    #[inline]
    pub fn set_dst_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::DESTINATION].copy_from_slice(value.as_bytes())
    }

    /// Set the source address field.
    #[inline]
    pub fn set_src_addr(&mut self, value: Address) {
        let data = self.buffer.as_mut();
        data[field::SOURCE].copy_from_slice(value.as_bytes())
    }

    /// Set the EtherType field.
    #[inline]
    pub fn set_ethertype(&mut self, value: EtherType) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::ETHERTYPE], value.into())
    }
}

impl<T: AsRef<[u8]>> AsRef<[u8]> for Frame<T> {
    fn as_ref(&self) -> &[u8] {
        self.buffer.as_ref()
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Frame<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "EthernetII src={} dst={} type={}",
            self.src_addr(),
            self.dst_addr(),
            self.ethertype()
        )
    }
}

/// The view of whatever an EtherType-tagged header (Ethernet, VLAN, GRE)
/// carries.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Ipv4(Ipv4Datagram<'a>),
    Ipv6(Ipv6Datagram<'a>),
    Arp(ArpDatagram<'a>),
    Vlan(VlanDatagram<'a>),
    Unknown(&'a [u8]),
}

impl<'a> Payload<'a> {
    pub(crate) fn dispatch(ether_type: EtherType, bytes: &'a [u8]) -> Self {
        match ether_type {
            EtherType::Ipv4 => Payload::Ipv4(Ipv4Datagram::new(bytes)),
            EtherType::Ipv6 => Payload::Ipv6(Ipv6Datagram::new(bytes)),
            EtherType::Arp => Payload::Arp(ArpDatagram::new(bytes)),
            EtherType::Vlan => Payload::Vlan(VlanDatagram::new(bytes)),
            EtherType::Unknown(_) => Payload::Unknown(bytes),
        }
    }

    /// Return the octets of the payload, interpreted or not.
    pub fn bytes(&self) -> &'a [u8] {
        match self {
            Payload::Ipv4(view) => view.bytes(),
            Payload::Ipv6(view) => view.bytes(),
            Payload::Arp(view) => view.bytes(),
            Payload::Vlan(view) => view.bytes(),
            Payload::Unknown(bytes) => bytes,
        }
    }

    /// The octets the payload accounts for by its own length fields, if its
    /// header is intact. `None` when nothing bounds it.
    pub fn declared_len(&self) -> Option<usize> {
        match self {
            Payload::Ipv4(view) => view.check_len().ok().map(|()| view.total_len() as usize),
            Payload::Ipv6(view) => view.check_len().ok().map(|()| view.total_len()),
            Payload::Arp(view) => view.check_len().ok().map(|()| view.packet_len()),
            Payload::Vlan(view) => {
                view.check_len().ok()?;
                Some(VLAN_HEADER_LEN + view.ether_payload().declared_len()?)
            }
            Payload::Unknown(_) => None,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self {
            Payload::Ipv4(view) => view.is_valid(),
            Payload::Ipv6(view) => view.is_valid(),
            Payload::Arp(view) => view.is_valid(),
            Payload::Vlan(view) => view.is_valid(),
            Payload::Unknown(_) => true,
        }
    }

    pub(crate) fn extract_layers(&self, layers: &mut Vec<Layer>) {
        match self {
            Payload::Ipv4(view) => view.extract_layers(layers),
            Payload::Ipv6(view) => view.extract_layers(layers),
            Payload::Arp(view) => layers.push(view.extract_layer().into()),
            Payload::Vlan(view) => view.extract_layers(layers),
            Payload::Unknown(bytes) => push_payload(layers, bytes),
        }
    }
}

/// A read-only view of an Ethernet II frame.
#[derive(Debug, Clone)]
pub struct EthernetDatagram<'a> {
    frame: Frame<&'a [u8]>,
    valid: OnceLock<bool>,
    payload: OnceLock<Box<Payload<'a>>>,
}

impl<'a> EthernetDatagram<'a> {
    /// The view of the payload, selected by the EtherType field.
    pub fn ether_payload(&self) -> &Payload<'a> {
        self.payload.get_or_init(|| {
            let bytes = self.frame.buffer;
            let payload = if bytes.len() < HEADER_LEN {
                Payload::Unknown(&[])
            } else {
                Payload::dispatch(self.frame.ethertype(), self.frame.payload())
            };
            Box::new(payload)
        })
    }

    /// Octets after the payload: padding, trailer and frame check sequence
    /// together. `None` if the payload doesn't declare its own length.
    pub fn extra_data(&self) -> Option<&'a [u8]> {
        let payload_len = self.ether_payload().declared_len()?;
        self.frame.buffer.get(HEADER_LEN + payload_len..)
    }

    /// Zeros or junk that fill the frame up to [MIN_FRAME_LEN] octets.
    pub fn padding(&self) -> Option<&'a [u8]> {
        let extra = self.extra_data()?;
        if self.frame.buffer.len() < MIN_FRAME_LEN {
            return Some(&[]);
        }
        let data_len = self.frame.buffer.len() - extra.len();
        let padding_len = MIN_FRAME_LEN.saturating_sub(data_len).min(extra.len());
        Some(&extra[..padding_len])
    }

    /// The frame check sequence, assumed present when the frame runs to at
    /// least [MIN_FRAME_LEN] plus its four octets.
    pub fn frame_check_sequence(&self) -> Option<&'a [u8]> {
        let extra = self.extra_data()?;
        if self.frame.buffer.len() < MIN_FRAME_LEN + FCS_LEN || extra.len() < FCS_LEN {
            return None;
        }
        Some(&extra[extra.len() - FCS_LEN..])
    }

    /// Extra octets between the padding and the frame check sequence.
    pub fn trailer(&self) -> Option<&'a [u8]> {
        let extra = self.extra_data()?;
        let padding_len = self.padding().map_or(0, <[u8]>::len);
        let fcs_len = self.frame_check_sequence().map_or(0, <[u8]>::len);
        extra.get(padding_len..extra.len().saturating_sub(fcs_len).max(padding_len))
    }

    /// Extract this frame and everything it carries as layers. Octets past the
    /// payload come last, as a [TrailerLayer].
    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if self.frame.buffer.len() >= HEADER_LEN {
            self.ether_payload().extract_layers(layers);
        }
        if let Some(extra) = self.extra_data().filter(|extra| !extra.is_empty()) {
            layers.push(TrailerLayer::new(extra.to_vec()).into());
        }
    }
}

impl<'a> core::ops::Deref for EthernetDatagram<'a> {
    type Target = Frame<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

impl<'a> Datagram<'a> for EthernetDatagram<'a> {
    type Layer = EthernetLayer;

    fn new(bytes: &'a [u8]) -> Self {
        EthernetDatagram {
            frame: Frame::new_unchecked(bytes),
            valid: OnceLock::new(),
            payload: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.frame.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.frame.check_len().is_err() {
                net_debug!("Ethernet frame of {} octets is truncated", self.bytes().len());
                return false;
            }
            self.ether_payload().is_valid()
        })
    }

    fn extract_layer(&self) -> EthernetLayer {
        if self.frame.check_len().is_err() {
            return EthernetLayer::default();
        }
        EthernetLayer {
            source: self.src_addr(),
            destination: Some(self.dst_addr()),
            ether_type: Some(self.ethertype()),
        }
    }
}

/// An Ethernet II header under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EthernetLayer {
    pub source: Address,
    /// `None` asks the next layer for a default, falling back to all zeros.
    pub destination: Option<Address>,
    /// `None` asks the next layer.
    pub ether_type: Option<EtherType>,
}

impl EthernetLayer {
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub(crate) fn emit(&self, buffer: &mut [u8], neighbours: &Neighbours) -> core::result::Result<(), BuildError> {
        let ether_type = match self.ether_type {
            Some(ether_type) => ether_type,
            None => neighbours.ether_type("Ethernet")?,
        };
        let destination = self
            .destination
            .or_else(|| neighbours.default_destination())
            .unwrap_or_default();

        let mut frame = Frame::new_unchecked(buffer);
        frame.set_src_addr(self.source);
        frame.set_dst_addr(destination);
        frame.set_ethertype(ether_type);
        Ok(())
    }
}

impl ArpPreviousLayer for EthernetLayer {
    fn hardware_type(&self) -> ArpHardware {
        ArpHardware::Ethernet
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static FRAME_BYTES: [u8; 64] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x08, 0x00,
        0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff,
    ];

    #[test]
    fn test_broadcast() {
        assert!(Address::BROADCAST.is_broadcast());
        assert!(!Address::BROADCAST.is_unicast());
        assert!(Address::BROADCAST.is_multicast());
        assert!(Address::BROADCAST.is_local());
    }

    #[test]
    fn test_deconstruct() {
        let frame = Frame::new_unchecked(&FRAME_BYTES[..]);
        assert_eq!(
            frame.dst_addr(),
            Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
        );
        assert_eq!(
            frame.src_addr(),
            Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16])
        );
        assert_eq!(frame.ethertype(), EtherType::Ipv4);
        assert_eq!(frame.payload()[0], 0xaa);
        assert_eq!(frame.payload().len(), 50);
    }

    #[test]
    fn test_construct() {
        let mut bytes = vec![0xa5; 64];
        let mut frame = Frame::new_unchecked(&mut bytes);
        frame.set_dst_addr(Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        frame.set_src_addr(Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        frame.set_ethertype(EtherType::Ipv4);
        assert_eq!(&bytes[..14], &FRAME_BYTES[..14]);
    }

    #[test]
    fn test_short_frame_invalid() {
        for len in 0..HEADER_LEN {
            let view = EthernetDatagram::new(&FRAME_BYTES[..len]);
            assert!(!view.is_valid());
            assert!(matches!(*view.ether_payload(), Payload::Unknown(&[])));
        }
    }

    #[test]
    fn test_payload_dispatch_is_cached() {
        let view = EthernetDatagram::new(&FRAME_BYTES[..]);
        let first: *const Payload = view.ether_payload();
        let second: *const Payload = view.ether_payload();
        assert_eq!(first, second);
        assert!(matches!(view.ether_payload(), Payload::Ipv4(_)));
        // The IPv4 header inside is garbage.
        assert!(!view.is_valid());
    }

    #[test]
    fn test_unknown_ethertype_payload() {
        let mut bytes = FRAME_BYTES;
        bytes[12] = 0x88;
        bytes[13] = 0xcc;
        let view = EthernetDatagram::new(&bytes[..]);
        assert!(view.is_valid());
        match view.ether_payload() {
            Payload::Unknown(payload) => assert_eq!(payload.len(), 50),
            other => panic!("unexpected payload {other:?}"),
        }
        assert_eq!(
            view.extract_layer(),
            EthernetLayer {
                source: Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]),
                destination: Some(Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06])),
                ether_type: Some(EtherType::Unknown(0x88cc)),
            }
        );
    }
}
