use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{Datagram, Error, EtherType, EthernetAddress, Result};
use crate::builder::BuildError;
use crate::layer::{EthernetNextLayer, Neighbours};

pub use super::EtherType as Protocol;

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1,
        Ieee802 = 6,
        FrameRelay = 15,
        Atm = 16,
        Ieee1394 = 24,
        InfiniBand = 32
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2,
        ReverseRequest = 3,
        ReverseReply = 4,
        InverseRequest = 8,
        InverseReply = 9
    }
}

/// A read/write wrapper around an Address Resolution Protocol packet buffer,
/// for any hardware and protocol address length.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::*;

    pub const HTYPE: Field = 0..2;
    pub const PTYPE: Field = 2..4;
    pub const HLEN: usize = 4;
    pub const PLEN: usize = 5;
    pub const OPER: Field = 6..8;

    #[inline]
    pub const fn SHA(hardware_len: u8, _protocol_len: u8) -> Field {
        let start = OPER.end;
        start..(start + hardware_len as usize)
    }

    #[inline]
    pub const fn SPA(hardware_len: u8, protocol_len: u8) -> Field {
        let start = SHA(hardware_len, protocol_len).end;
        start..(start + protocol_len as usize)
    }

    #[inline]
    pub const fn THA(hardware_len: u8, protocol_len: u8) -> Field {
        let start = SPA(hardware_len, protocol_len).end;
        start..(start + hardware_len as usize)
    }

    #[inline]
    pub const fn TPA(hardware_len: u8, protocol_len: u8) -> Field {
        let start = THA(hardware_len, protocol_len).end;
        start..(start + protocol_len as usize)
    }
}

/// Length of the fixed part, before the addresses.
pub const HEADER_LEN: usize = field::OPER.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with ARP packet structure.
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
    /// Returns `Err(Error)` if the buffer is too short for the address
    /// lengths it declares.
    ///
    /// The result of this check is invalidated by calling [set_hardware_len] or
    /// [set_protocol_len].
    ///
    /// [set_hardware_len]: #method.set_hardware_len
    /// [set_protocol_len]: #method.set_protocol_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN || len < field::TPA(self.hardware_len(), self.protocol_len()).end {
            Err(Error)
        } else {
            Ok(())
        }
    }

    /// Consume the packet, returning the underlying buffer.
    pub fn into_inner(self) -> T {
        self.buffer
    }

    /// Return the hardware type field.
    #[inline]
    pub fn hardware_type(&self) -> Hardware {
        let data = self.buffer.as_ref();
        Hardware::from(NetworkEndian::read_u16(&data[field::HTYPE]))
    }

    /// Return the protocol type field.
    #[inline]
    pub fn protocol_type(&self) -> Protocol {
        let data = self.buffer.as_ref();
        Protocol::from(NetworkEndian::read_u16(&data[field::PTYPE]))
    }

    /// Return the hardware length field.
    #[inline]
    pub fn hardware_len(&self) -> u8 {
        self.buffer.as_ref()[field::HLEN]
    }

    /// Return the protocol length field.
    #[inline]
    pub fn protocol_len(&self) -> u8 {
        self.buffer.as_ref()[field::PLEN]
    }

    /// Return the operation field.
    #[inline]
    pub fn operation(&self) -> Operation {
        let data = self.buffer.as_ref();
        Operation::from(NetworkEndian::read_u16(&data[field::OPER]))
    }

    /// Return the sender hardware address field.
    pub fn source_hardware_addr(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[field::SHA(self.hardware_len(), self.protocol_len())]
    }

    /// Return the sender protocol address field.
    pub fn source_protocol_addr(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[field::SPA(self.hardware_len(), self.protocol_len())]
    }

    /// Return the target hardware address field.
    pub fn target_hardware_addr(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[field::THA(self.hardware_len(), self.protocol_len())]
    }

    /// Return the target protocol address field.
    pub fn target_protocol_addr(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[field::TPA(self.hardware_len(), self.protocol_len())]
    }

    /// Return the length of the packet its address lengths describe.
    pub fn packet_len(&self) -> usize {
        field::TPA(self.hardware_len(), self.protocol_len()).end
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_hardware_type(&mut self, value: Hardware) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::HTYPE], value.into())
    }

    #[inline]
    pub fn set_protocol_type(&mut self, value: Protocol) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::PTYPE], value.into())
    }

    #[inline]
    pub fn set_hardware_len(&mut self, value: u8) {
        self.buffer.as_mut()[field::HLEN] = value
    }

    #[inline]
    pub fn set_protocol_len(&mut self, value: u8) {
        self.buffer.as_mut()[field::PLEN] = value
    }

    #[inline]
    pub fn set_operation(&mut self, value: Operation) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::OPER], value.into())
    }

    /// Set the sender hardware address field.
    ///
    /// # Panics
    /// The function panics if `value` is not `self.hardware_len()` long.
    pub fn set_source_hardware_addr(&mut self, value: &[u8]) {
        let range = field::SHA(self.hardware_len(), self.protocol_len());
        self.buffer.as_mut()[range].copy_from_slice(value)
    }

    /// Set the sender protocol address field.
    ///
    /// # Panics
    /// The function panics if `value` is not `self.protocol_len()` long.
    pub fn set_source_protocol_addr(&mut self, value: &[u8]) {
        let range = field::SPA(self.hardware_len(), self.protocol_len());
        self.buffer.as_mut()[range].copy_from_slice(value)
    }

    /// Set the target hardware address field.
    ///
    /// # Panics
    /// The function panics if `value` is not `self.hardware_len()` long.
    pub fn set_target_hardware_addr(&mut self, value: &[u8]) {
        let range = field::THA(self.hardware_len(), self.protocol_len());
        self.buffer.as_mut()[range].copy_from_slice(value)
    }

    /// Set the target protocol address field.
    ///
    /// # Panics
    /// The function panics if `value` is not `self.protocol_len()` long.
    pub fn set_target_protocol_addr(&mut self, value: &[u8]) {
        let range = field::TPA(self.hardware_len(), self.protocol_len());
        self.buffer.as_mut()[range].copy_from_slice(value)
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ARP htype={:?} ptype={} op={:?} sha={:02x?} spa={:?} tha={:02x?} tpa={:?}",
            self.hardware_type(),
            self.protocol_type(),
            self.operation(),
            self.source_hardware_addr(),
            self.source_protocol_addr(),
            self.target_hardware_addr(),
            self.target_protocol_addr()
        )
    }
}

/// A read-only view of an ARP packet.
#[derive(Debug, Clone)]
pub struct ArpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
}

impl<'a> core::ops::Deref for ArpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for ArpDatagram<'a> {
    type Layer = ArpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        ArpDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| self.packet.check_len().is_ok())
    }

    fn extract_layer(&self) -> ArpLayer {
        if self.packet.check_len().is_err() {
            return ArpLayer::default();
        }
        ArpLayer {
            protocol_type: self.protocol_type(),
            operation: self.operation(),
            sender_hardware_addr: self.source_hardware_addr().to_vec(),
            sender_protocol_addr: self.source_protocol_addr().to_vec(),
            target_hardware_addr: self.target_hardware_addr().to_vec(),
            target_protocol_addr: self.target_protocol_addr().to_vec(),
        }
    }
}

/// An ARP packet under construction. The hardware type is taken from the
/// link layer in front of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpLayer {
    pub protocol_type: Protocol,
    pub operation: Operation,
    pub sender_hardware_addr: Vec<u8>,
    pub sender_protocol_addr: Vec<u8>,
    pub target_hardware_addr: Vec<u8>,
    pub target_protocol_addr: Vec<u8>,
}

impl Default for ArpLayer {
    fn default() -> Self {
        ArpLayer {
            protocol_type: Protocol::Ipv4,
            operation: Operation::Request,
            sender_hardware_addr: Vec::new(),
            sender_protocol_addr: Vec::new(),
            target_hardware_addr: Vec::new(),
            target_protocol_addr: Vec::new(),
        }
    }
}

impl ArpLayer {
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + 2 * (self.sender_hardware_addr.len() + self.sender_protocol_addr.len())
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        if self.sender_hardware_addr.len() != self.target_hardware_addr.len() {
            return Err(BuildError::Mismatch {
                what: "ARP sender and target hardware addresses differ in length",
            });
        }
        if self.sender_protocol_addr.len() != self.target_protocol_addr.len() {
            return Err(BuildError::Mismatch {
                what: "ARP sender and target protocol addresses differ in length",
            });
        }
        BuildError::check_len("ARP hardware address", self.sender_hardware_addr.len(), 255)?;
        BuildError::check_len("ARP protocol address", self.sender_protocol_addr.len(), 255)?;
        let hardware_type = neighbours.arp_hardware("ARP")?;

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_hardware_type(hardware_type);
        packet.set_protocol_type(self.protocol_type);
        packet.set_hardware_len(self.sender_hardware_addr.len() as u8);
        packet.set_protocol_len(self.sender_protocol_addr.len() as u8);
        packet.set_operation(self.operation);
        packet.set_source_hardware_addr(&self.sender_hardware_addr);
        packet.set_source_protocol_addr(&self.sender_protocol_addr);
        packet.set_target_hardware_addr(&self.target_hardware_addr);
        packet.set_target_protocol_addr(&self.target_protocol_addr);
        Ok(())
    }
}

impl EthernetNextLayer for ArpLayer {
    fn ether_type(&self) -> EtherType {
        EtherType::Arp
    }

    fn default_destination(&self) -> Option<EthernetAddress> {
        Some(EthernetAddress::BROADCAST)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{Layer, PayloadLayer};
    use crate::wire::EthernetLayer;

    static PACKET_BYTES: [u8; 28] = [
        0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
        0x21, 0x22, 0x23, 0x24, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x41, 0x42, 0x43, 0x44,
    ];

    fn request() -> ArpLayer {
        ArpLayer {
            protocol_type: Protocol::Ipv4,
            operation: Operation::Request,
            sender_hardware_addr: vec![0x11, 0x12, 0x13, 0x14, 0x15, 0x16],
            sender_protocol_addr: vec![0x21, 0x22, 0x23, 0x24],
            target_hardware_addr: vec![0x31, 0x32, 0x33, 0x34, 0x35, 0x36],
            target_protocol_addr: vec![0x41, 0x42, 0x43, 0x44],
        }
    }

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_unchecked(&PACKET_BYTES[..]);
        assert_eq!(packet.hardware_type(), Hardware::Ethernet);
        assert_eq!(packet.protocol_type(), Protocol::Ipv4);
        assert_eq!(packet.hardware_len(), 6);
        assert_eq!(packet.protocol_len(), 4);
        assert_eq!(packet.operation(), Operation::Request);
        assert_eq!(
            packet.source_hardware_addr(),
            &[0x11, 0x12, 0x13, 0x14, 0x15, 0x16]
        );
        assert_eq!(packet.source_protocol_addr(), &[0x21, 0x22, 0x23, 0x24]);
        assert_eq!(
            packet.target_hardware_addr(),
            &[0x31, 0x32, 0x33, 0x34, 0x35, 0x36]
        );
        assert_eq!(packet.target_protocol_addr(), &[0x41, 0x42, 0x43, 0x44]);
    }

    #[test]
    fn test_extract() {
        let view = ArpDatagram::new(&PACKET_BYTES[..]);
        assert!(view.is_valid());
        assert_eq!(view.extract_layer(), request());
    }

    #[test]
    fn test_truncated_addresses() {
        assert!(!ArpDatagram::new(&PACKET_BYTES[..27]).is_valid());
        assert!(!ArpDatagram::new(&PACKET_BYTES[..7]).is_valid());
    }

    #[test]
    fn test_emit_takes_hardware_from_link_layer() {
        let ethernet = Layer::from(EthernetLayer::default());
        let neighbours = Neighbours {
            previous: Some(&ethernet),
            next: None,
        };
        let layer = request();
        let mut bytes = vec![0xa5; layer.buffer_len()];
        layer.emit(&mut bytes, &neighbours).unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn test_emit_rejects_mismatched_lengths() {
        let ethernet = Layer::from(EthernetLayer::default());
        let neighbours = Neighbours {
            previous: Some(&ethernet),
            next: None,
        };
        let mut layer = request();
        layer.target_protocol_addr.pop();
        let mut bytes = vec![0; 28];
        assert!(matches!(
            layer.emit(&mut bytes, &neighbours),
            Err(BuildError::Mismatch { .. })
        ));
    }

    #[test]
    fn test_emit_needs_link_layer() {
        let payload = Layer::from(PayloadLayer::default());
        let neighbours = Neighbours {
            previous: Some(&payload),
            next: None,
        };
        let mut bytes = vec![0; 28];
        assert!(matches!(
            request().emit(&mut bytes, &neighbours),
            Err(BuildError::Unsupported { .. })
        ));
    }
}
