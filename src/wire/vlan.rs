use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{ArpHardware, Datagram, Error, EtherType, EthernetPayload, Result};
use crate::builder::BuildError;
use crate::layer::{ArpPreviousLayer, EthernetNextLayer, Layer, Neighbours};

/// A read/write wrapper around an IEEE 802.1Q tag, which sits where an
/// EtherType of `0x8100` says the payload begins.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | PCP |D|         VID           |           EtherType           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
mod field {
    use crate::wire::field::*;

    pub const TCI: Field = 0..2;
    pub const ETHERTYPE: Field = 2..4;
    pub const PAYLOAD: Rest = 4..;
}

pub const HEADER_LEN: usize = field::ETHERTYPE.end;

/// Largest VLAN identifier.
pub const MAX_VLAN_ID: u16 = 0x0fff;

impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

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

    /// Return the tag control information as one word.
    #[inline]
    pub fn tci(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::TCI])
    }

    /// Return the priority code point.
    #[inline]
    pub fn priority(&self) -> u8 {
        (self.tci() >> 13) as u8
    }

    /// Return the canonical format indicator (drop eligible indicator).
    #[inline]
    pub fn canonical_format(&self) -> bool {
        self.tci() & 0x1000 != 0
    }

    /// Return the VLAN identifier.
    #[inline]
    pub fn vlan_id(&self) -> u16 {
        self.tci() & MAX_VLAN_ID
    }

    /// Return the EtherType of the tagged payload.
    #[inline]
    pub fn ethertype(&self) -> EtherType {
        let data = self.buffer.as_ref();
        EtherType::from(NetworkEndian::read_u16(&data[field::ETHERTYPE]))
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    /// Set the tag control information from its three parts.
    #[inline]
    pub fn set_tci(&mut self, priority: u8, canonical_format: bool, vlan_id: u16) {
        let raw = ((priority as u16 & 0x7) << 13)
            | if canonical_format { 0x1000 } else { 0 }
            | (vlan_id & MAX_VLAN_ID);
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::TCI], raw)
    }

    #[inline]
    pub fn set_ethertype(&mut self, value: EtherType) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::ETHERTYPE], value.into())
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "802.1Q pcp={} vid={} type={}",
            self.priority(),
            self.vlan_id(),
            self.ethertype()
        )
    }
}

/// A read-only view of an 802.1Q tag and what it carries.
#[derive(Debug, Clone)]
pub struct VlanDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    payload: OnceLock<Box<EthernetPayload<'a>>>,
}

impl<'a> VlanDatagram<'a> {
    /// The view of the tagged payload, selected by the inner EtherType.
    pub fn ether_payload(&self) -> &EthernetPayload<'a> {
        self.payload.get_or_init(|| {
            Box::new(match self.packet.check_len() {
                Ok(()) => EthernetPayload::dispatch(self.ethertype(), self.packet.payload()),
                Err(_) => EthernetPayload::Unknown(&[]),
            })
        })
    }

    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if self.packet.check_len().is_ok() {
            self.ether_payload().extract_layers(layers);
        }
    }
}

impl<'a> core::ops::Deref for VlanDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for VlanDatagram<'a> {
    type Layer = VlanLayer;

    fn new(bytes: &'a [u8]) -> Self {
        VlanDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            payload: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self
            .valid
            .get_or_init(|| self.packet.check_len().is_ok() && self.ether_payload().is_valid())
    }

    fn extract_layer(&self) -> VlanLayer {
        if self.packet.check_len().is_err() {
            return VlanLayer::default();
        }
        VlanLayer {
            priority: self.priority(),
            canonical_format: self.canonical_format(),
            vlan_id: self.vlan_id(),
            ether_type: Some(self.ethertype()),
        }
    }
}

/// An 802.1Q tag under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VlanLayer {
    /// Priority code point, 0 to 7.
    pub priority: u8,
    pub canonical_format: bool,
    /// VLAN identifier, 0 to 4095.
    pub vlan_id: u16,
    /// `None` asks the next layer.
    pub ether_type: Option<EtherType>,
}

impl VlanLayer {
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        neighbours: &Neighbours,
    ) -> core::result::Result<(), BuildError> {
        BuildError::check_range("VLAN priority", self.priority, 7u8)?;
        BuildError::check_range("VLAN identifier", self.vlan_id, MAX_VLAN_ID)?;
        let ether_type = match self.ether_type {
            Some(ether_type) => ether_type,
            None => neighbours.ether_type("VLAN")?,
        };

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_tci(self.priority, self.canonical_format, self.vlan_id);
        packet.set_ethertype(ether_type);
        Ok(())
    }
}

impl EthernetNextLayer for VlanLayer {
    fn ether_type(&self) -> EtherType {
        EtherType::Vlan
    }
}

impl ArpPreviousLayer for VlanLayer {
    fn hardware_type(&self) -> ArpHardware {
        ArpHardware::Ethernet
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static TAG_BYTES: [u8; 6] = [0xa0, 0x64, 0x88, 0xcc, 0x01, 0x02];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_unchecked(&TAG_BYTES[..]);
        assert_eq!(packet.priority(), 5);
        assert!(!packet.canonical_format());
        assert_eq!(packet.vlan_id(), 100);
        assert_eq!(packet.ethertype(), EtherType::Unknown(0x88cc));
        assert_eq!(packet.payload(), &[0x01, 0x02]);
    }

    #[test]
    fn test_construct() {
        let mut bytes = [0xff; 4];
        let layer = VlanLayer {
            priority: 5,
            canonical_format: false,
            vlan_id: 100,
            ether_type: Some(EtherType::Unknown(0x88cc)),
        };
        let neighbours = Neighbours {
            previous: None,
            next: None,
        };
        layer.emit(&mut bytes, &neighbours).unwrap();
        assert_eq!(&bytes[..], &TAG_BYTES[..4]);
    }

    #[test]
    fn test_out_of_range() {
        let mut bytes = [0; 4];
        let neighbours = Neighbours {
            previous: None,
            next: None,
        };
        let layer = VlanLayer {
            vlan_id: 4096,
            ether_type: Some(EtherType::Ipv4),
            ..VlanLayer::default()
        };
        assert_eq!(
            layer.emit(&mut bytes, &neighbours),
            Err(BuildError::OutOfRange {
                field: "VLAN identifier",
                value: 4096,
                max: 4095
            })
        );
    }

    #[test]
    fn test_view() {
        let view = VlanDatagram::new(&TAG_BYTES[..]);
        assert!(view.is_valid());
        assert!(matches!(*view.ether_payload(), EthernetPayload::Unknown(&[0x01, 0x02])));
        assert!(!VlanDatagram::new(&TAG_BYTES[..3]).is_valid());
    }
}
