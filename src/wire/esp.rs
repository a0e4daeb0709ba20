use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Datagram, Error, IpProtocol, Result};
use crate::layer::{push_payload, IpNextLayer, Layer};

/// A read/write wrapper around an IPsec Encapsulating Security Payload header.
///
/// Everything after the sequence number, padding and integrity check value
/// included, is ciphertext and is left uninterpreted.
#[derive(Debug, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |               Security Parameters Index (SPI)                 |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                      Sequence Number                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                    Payload Data (variable)                    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
mod field {
    use crate::wire::field::*;

    pub const SPI: Field = 0..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const PAYLOAD: Rest = 8..;
}

pub const HEADER_LEN: usize = field::SEQ_NUM.end;

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

    /// Return the security parameters index field.
    #[inline]
    pub fn security_parameters_index(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::SPI])
    }

    /// Return the sequence number field.
    #[inline]
    pub fn sequence_number(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::SEQ_NUM])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the protected payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let data = self.buffer.as_ref();
        &data[field::PAYLOAD]
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    #[inline]
    pub fn set_security_parameters_index(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::SPI], value)
    }

    #[inline]
    pub fn set_sequence_number(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::SEQ_NUM], value)
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
            return write!(f, "ESP (truncated)");
        }
        write!(
            f,
            "ESP spi=0x{:08x} seq={} len={}",
            self.security_parameters_index(),
            self.sequence_number(),
            self.buffer.as_ref().len() - HEADER_LEN
        )
    }
}

/// A read-only view of an ESP header and its protected payload.
#[derive(Debug, Clone)]
pub struct EspDatagram<'a> {
    packet: Packet<&'a [u8]>,
}

impl<'a> EspDatagram<'a> {
    /// The protected payload, or nothing if the header is truncated.
    pub fn payload_bytes(&self) -> &'a [u8] {
        match self.packet.check_len() {
            Ok(()) => self.packet.payload(),
            Err(_) => &[],
        }
    }

    /// Extract the header, and the protected payload as opaque octets.
    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        push_payload(layers, self.payload_bytes());
    }
}

impl<'a> core::ops::Deref for EspDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for EspDatagram<'a> {
    type Layer = EspLayer;

    fn new(bytes: &'a [u8]) -> Self {
        EspDatagram {
            packet: Packet::new_unchecked(bytes),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        self.packet.check_len().is_ok()
    }

    fn extract_layer(&self) -> EspLayer {
        if self.packet.check_len().is_err() {
            return EspLayer::default();
        }
        EspLayer {
            security_parameters_index: self.security_parameters_index(),
            sequence_number: self.sequence_number(),
        }
    }
}

/// An ESP header under construction. The protected payload follows as a
/// [PayloadLayer](crate::PayloadLayer).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EspLayer {
    pub security_parameters_index: u32,
    pub sequence_number: u32,
}

impl EspLayer {
    pub const fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) {
        let mut packet = Packet::new_unchecked(buffer);
        packet.set_security_parameters_index(self.security_parameters_index);
        packet.set_sequence_number(self.sequence_number);
    }
}

impl IpNextLayer for EspLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::IpSecEsp
    }
}
