use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{
    Datagram, Error, HttpDatagram, IpAddress, IpProtocol, Options, Result, TcpOption, HTTP_PORT,
};
use crate::builder::BuildError;
use crate::layer::{push_application, push_payload, IpNextLayer, Layer, TransportChecksumLayer};
use crate::wire::ip::checksum;

/// Largest option area a TCP header can carry.
pub const MAX_OPTIONS_LEN: usize = 40;

bitflags::bitflags! {
    /// The control bits of a TCP header.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Control: u16 {
        const FIN = 0x001;
        const SYN = 0x002;
        const RST = 0x004;
        const PSH = 0x008;
        const ACK = 0x010;
        const URG = 0x020;
        const ECE = 0x040;
        const CWR = 0x080;
        const NS  = 0x100;
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Control::NS, "ns"),
            (Control::CWR, "cwr"),
            (Control::ECE, "ece"),
            (Control::URG, "urg"),
            (Control::ACK, "ack"),
            (Control::PSH, "psh"),
            (Control::RST, "rst"),
            (Control::SYN, "syn"),
            (Control::FIN, "fin"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A read/write wrapper around a Transmission Control Protocol packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

mod field {
    use crate::wire::field::*;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM: Field = 4..8;
    pub const ACK_NUM: Field = 8..12;
    pub const FLAGS: Field = 12..14;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT: Field = 18..20;
}

pub const HEADER_LEN: usize = field::URGENT.end;

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with TCP packet structure.
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
    /// Returns `Err(Error)` if the buffer is too short, or if the header
    /// length is below the fixed header or past the end of the buffer.
    ///
    /// The result of this check is invalidated by calling [set_header_len].
    ///
    /// [set_header_len]: #method.set_header_len
    pub fn check_len(&self) -> Result<()> {
        let len = self.buffer.as_ref().len();
        if len < HEADER_LEN {
            Err(Error)
        } else {
            let header_len = self.header_len() as usize;
            if len < header_len || header_len < HEADER_LEN {
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

    /// Return the sequence number field.
    #[inline]
    pub fn seq_number(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::SEQ_NUM])
    }

    /// Return the acknowledgement number field.
    #[inline]
    pub fn ack_number(&self) -> u32 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u32(&data[field::ACK_NUM])
    }

    /// Return the control bits.
    #[inline]
    pub fn control(&self) -> Control {
        let data = self.buffer.as_ref();
        Control::from_bits_truncate(NetworkEndian::read_u16(&data[field::FLAGS]))
    }

    /// Return the header length, in octets.
    #[inline]
    pub fn header_len(&self) -> u8 {
        let data = self.buffer.as_ref();
        let raw = NetworkEndian::read_u16(&data[field::FLAGS]);
        ((raw >> 12) * 4) as u8
    }

    /// Return the window size field.
    #[inline]
    pub fn window_len(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::WIN_SIZE])
    }

    /// Return the checksum field.
    #[inline]
    pub fn checksum(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::CHECKSUM])
    }

    /// Return the urgent pointer field.
    #[inline]
    pub fn urgent_at(&self) -> u16 {
        let data = self.buffer.as_ref();
        NetworkEndian::read_u16(&data[field::URGENT])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return a pointer to the options.
    #[inline]
    pub fn options(&self) -> &'a [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_ref();
        &data[HEADER_LEN..header_len]
    }

    /// Return a pointer to the payload.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_ref();
        &data[header_len..]
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

    /// Set the sequence number field.
    #[inline]
    pub fn set_seq_number(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::SEQ_NUM], value)
    }

    /// Set the acknowledgement number field.
    #[inline]
    pub fn set_ack_number(&mut self, value: u32) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u32(&mut data[field::ACK_NUM], value)
    }

    /// Set the header length, in octets, and the control bits together.
    #[inline]
    pub fn set_header_len_and_control(&mut self, header_len: u8, control: Control) {
        let data = self.buffer.as_mut();
        let raw = ((header_len as u16 / 4) << 12) | control.bits();
        NetworkEndian::write_u16(&mut data[field::FLAGS], raw)
    }

    /// Set the window size field.
    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::WIN_SIZE], value)
    }

    /// Set the checksum field.
    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::CHECKSUM], value)
    }

    /// Set the urgent pointer field.
    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        let data = self.buffer.as_mut();
        NetworkEndian::write_u16(&mut data[field::URGENT], value)
    }

    /// Return a mutable pointer to the options.
    #[inline]
    pub fn options_mut(&mut self) -> &mut [u8] {
        let header_len = self.header_len() as usize;
        let data = self.buffer.as_mut();
        &mut data[HEADER_LEN..header_len]
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
            return write!(f, "TCP (truncated)");
        }
        write!(
            f,
            "TCP src={} dst={} {} seq={}",
            self.src_port(),
            self.dst_port(),
            self.control(),
            self.seq_number()
        )?;
        if self.control().contains(Control::ACK) {
            write!(f, " ack={}", self.ack_number())?;
        }
        write!(f, " win={}", self.window_len())?;
        if self.control().contains(Control::URG) {
            write!(f, " urg={}", self.urgent_at())?;
        }
        let len = self.buffer.as_ref().len();
        write!(f, " len={}", len - self.header_len() as usize)
    }
}

/// A read-only view of a TCP segment.
#[derive(Debug, Clone)]
pub struct TcpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    options: OnceLock<Options<TcpOption>>,
    http: OnceLock<Option<Box<HttpDatagram<'a>>>>,
}

impl<'a> TcpDatagram<'a> {
    fn has_header(&self) -> bool {
        self.packet.check_len().is_ok()
    }

    /// Return the parsed option area.
    pub fn options(&self) -> &Options<TcpOption> {
        self.options.get_or_init(|| {
            if self.has_header() {
                Options::parse(self.packet.options())
            } else {
                Options::empty()
            }
        })
    }

    /// The octets after the header.
    pub fn payload_bytes(&self) -> &'a [u8] {
        if self.has_header() {
            self.packet.payload()
        } else {
            &[]
        }
    }

    /// The payload as an HTTP message, if either port is the HTTP port and
    /// the segment carries data.
    ///
    /// A segment holds one piece of a stream; the view is only whole when
    /// the message fits the segment.
    pub fn http(&self) -> Option<&HttpDatagram<'a>> {
        self.http
            .get_or_init(|| {
                let payload = self.payload_bytes();
                let interpret = !payload.is_empty()
                    && (self.src_port() == HTTP_PORT || self.dst_port() == HTTP_PORT);
                interpret.then(|| Box::new(HttpDatagram::new(payload)))
            })
            .as_deref()
    }

    /// Validate the checksum against the pseudo header of the enclosing IP
    /// header.
    pub fn is_checksum_correct(&self, src_addr: &IpAddress, dst_addr: &IpAddress) -> bool {
        let data = self.packet.buffer;
        data.len() >= HEADER_LEN
            && checksum::verify_transport(src_addr, dst_addr, IpProtocol::Tcp, data)
    }

    /// Extract this segment and everything it carries as layers.
    pub fn extract_layers(&self, layers: &mut Vec<Layer>) {
        layers.push(self.extract_layer().into());
        if !self.has_header() {
            return;
        }
        match self.http() {
            Some(http) if http.is_valid() => {
                push_application(layers, http.extract_layer().into(), http.bytes())
            }
            _ => push_payload(layers, self.payload_bytes()),
        }
    }
}

impl<'a> core::ops::Deref for TcpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for TcpDatagram<'a> {
    type Layer = TcpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        TcpDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            options: OnceLock::new(),
            http: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    /// Whether the header and its options are sound. The payload is a piece
    /// of a stream and does not take part.
    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if !self.has_header() {
                net_debug!("TCP header of {} octets is malformed", self.packet.buffer.len());
                return false;
            }
            self.options().is_valid()
        })
    }

    fn extract_layer(&self) -> TcpLayer {
        if self.packet.buffer.len() < HEADER_LEN {
            return TcpLayer::default();
        }
        TcpLayer {
            source_port: self.src_port(),
            destination_port: self.dst_port(),
            sequence_number: self.seq_number(),
            acknowledgment_number: self.ack_number(),
            control: self.control(),
            window: self.window_len(),
            checksum: Some(self.checksum()),
            urgent_pointer: self.urgent_at(),
            options: self.options().clone(),
        }
    }
}

/// A TCP header under construction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TcpLayer {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence_number: u32,
    pub acknowledgment_number: u32,
    pub control: Control,
    pub window: u16,
    /// `None` lets the IP layer in front compute the checksum.
    pub checksum: Option<u16>,
    pub urgent_pointer: u16,
    pub options: Options<TcpOption>,
}

impl TcpLayer {
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN + self.options.buffer_len()
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        BuildError::check_len("TCP options", self.options.buffer_len(), MAX_OPTIONS_LEN)?;

        let mut packet = Packet::new_unchecked(buffer);
        packet.set_src_port(self.source_port);
        packet.set_dst_port(self.destination_port);
        packet.set_seq_number(self.sequence_number);
        packet.set_ack_number(self.acknowledgment_number);
        packet.set_header_len_and_control(self.buffer_len() as u8, self.control);
        packet.set_window_len(self.window);
        packet.set_checksum(self.checksum.unwrap_or(0));
        packet.set_urgent_at(self.urgent_pointer);
        self.options.emit(packet.options_mut());
        Ok(())
    }
}

impl IpNextLayer for TcpLayer {
    fn protocol(&self) -> IpProtocol {
        IpProtocol::Tcp
    }
}

impl TransportChecksumLayer for TcpLayer {
    fn checksum(&self) -> Option<u16> {
        self.checksum
    }

    fn checksum_offset(&self) -> usize {
        field::CHECKSUM.start
    }

    fn is_checksum_optional(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Ipv4Address;

    const SRC_ADDR: IpAddress = IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 1));
    const DST_ADDR: IpAddress = IpAddress::Ipv4(Ipv4Address::new(192, 168, 1, 2));

    static SYN_BYTES: [u8; 40] = [
        0xc0, 0x00, 0x00, 0x50, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0xa0, 0x02,
        0xfa, 0xf0, 0x2e, 0xcb, 0x00, 0x00, 0x02, 0x04, 0x05, 0xb4, 0x04, 0x02, 0x08, 0x0a,
        0x00, 0x12, 0xd6, 0x87, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x03, 0x07,
    ];

    #[test]
    fn test_deconstruct() {
        let packet = Packet::new_checked(&SYN_BYTES[..]).unwrap();
        assert_eq!(packet.src_port(), 49152);
        assert_eq!(packet.dst_port(), 80);
        assert_eq!(packet.seq_number(), 0x0102_0304);
        assert_eq!(packet.header_len(), 40);
        assert_eq!(packet.control(), Control::SYN);
        assert_eq!(packet.window_len(), 64240);
        assert_eq!(packet.checksum(), 0x2ecb);
        assert_eq!(packet.options().len(), 20);
        assert!(packet.payload().is_empty());
        assert_eq!(
            format!("{packet}"),
            "TCP src=49152 dst=80 syn seq=16909060 win=64240 len=0"
        );
    }

    #[test]
    fn test_display_owned() {
        let mut bytes = SYN_BYTES.to_vec();
        bytes.extend_from_slice(b"data");
        let packet = Packet::new_checked(bytes).unwrap();
        assert_eq!(
            packet.to_string(),
            "TCP src=49152 dst=80 syn seq=16909060 win=64240 len=4"
        );
    }

    #[test]
    fn test_view() {
        let view = TcpDatagram::new(&SYN_BYTES[..]);
        assert!(view.is_valid());
        assert!(view.is_checksum_correct(&SRC_ADDR, &DST_ADDR));
        assert_eq!(view.options().len(), 5);
        assert_eq!(
            view.options().find(2),
            Some(&TcpOption::MaximumSegmentSize(1460))
        );
        assert!(view.http().is_none());
    }

    #[test]
    fn test_rebuild() {
        let view = TcpDatagram::new(&SYN_BYTES[..]);
        let layer = view.extract_layer();
        assert_eq!(layer.buffer_len(), 40);
        let mut bytes = [0; 40];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, SYN_BYTES);
    }

    #[test]
    fn test_header_len_overruns_buffer() {
        let view = TcpDatagram::new(&SYN_BYTES[..30]);
        assert!(!view.is_valid());
        assert!(view.options().is_empty());
        assert!(view.payload_bytes().is_empty());

        let mut bytes = SYN_BYTES;
        bytes[12] = 0x40;
        assert!(!TcpDatagram::new(&bytes[..]).is_valid());
    }

    #[test]
    fn test_bad_options() {
        let mut bytes = SYN_BYTES;
        // Second MSS in place of SACK permitted and the timestamp kind.
        bytes[24..28].copy_from_slice(&[0x02, 0x04, 0x05, 0xb4]);
        let view = TcpDatagram::new(&bytes[..]);
        assert!(!view.is_valid());
    }

    #[test]
    fn test_control_display() {
        assert_eq!(format!("{}", Control::SYN | Control::ACK), "ack|syn");
        assert_eq!(format!("{}", Control::empty()), "");
    }
}
