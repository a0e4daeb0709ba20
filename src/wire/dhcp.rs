// Packet implementation for the Dynamic Host Configuration Protocol and the
// BOOTP header it extends. See [RFC 951] and [RFC 2131].
//
// [RFC 951]: https://tools.ietf.org/html/rfc951
// [RFC 2131]: https://tools.ietf.org/html/rfc2131

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use std::sync::OnceLock;

use super::{
    ArpHardware, Datagram, DhcpMessageType, DhcpOption, Error, EthernetAddress, Ipv4Address,
    Ipv4AddressExt, Options, Result,
};
use crate::builder::BuildError;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// The first four octets of the option area of a DHCP message.
pub const MAGIC_COOKIE: u32 = 0x63825363;

enum_with_unknown! {
    /// The BOOTP message direction.
    pub enum OpCode(u8) {
        BootRequest = 1,
        BootReply   = 2
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        /// The client can't receive unicast datagrams before it is configured.
        const BROADCAST = 0x8000;
        const _ = !0;
    }
}

mod field {
    use crate::wire::field::*;

    pub const OP: usize = 0;
    pub const HTYPE: usize = 1;
    pub const HLEN: usize = 2;
    pub const HOPS: usize = 3;
    pub const XID: Field = 4..8;
    pub const SECS: Field = 8..10;
    pub const FLAGS: Field = 10..12;
    pub const CIADDR: Field = 12..16;
    pub const YIADDR: Field = 16..20;
    pub const SIADDR: Field = 20..24;
    pub const GIADDR: Field = 24..28;
    pub const CHADDR: Field = 28..44;
    pub const SNAME: Field = 44..108;
    pub const FILE: Field = 108..236;
    pub const MAGIC_NUMBER: Field = 236..240;
}

/// Length of the BOOTP header, without the magic cookie.
pub const HEADER_LEN: usize = field::FILE.end;

/// Largest option area: the largest UDP payload over IPv4 less the headers.
pub const MAX_OPTIONS_LEN: usize = 65_507 - field::MAGIC_NUMBER.end;

/// A read/write wrapper around a DHCP packet buffer.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

impl<T: AsRef<[u8]>> Packet<T> {
    /// Imbue a raw octet buffer with DHCP packet structure.
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
    /// Returns `Err(Error)` if the buffer is shorter than the BOOTP header.
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

    pub fn opcode(&self) -> OpCode {
        let data = self.buffer.as_ref();
        OpCode::from(data[field::OP])
    }

    pub fn hardware_type(&self) -> ArpHardware {
        let data = self.buffer.as_ref();
        ArpHardware::from(data[field::HTYPE] as u16)
    }

    pub fn hardware_len(&self) -> u8 {
        self.buffer.as_ref()[field::HLEN]
    }

    pub fn hops(&self) -> u8 {
        self.buffer.as_ref()[field::HOPS]
    }

    /// Return the transaction identifier the client picked.
    pub fn transaction_id(&self) -> u32 {
        let field = &self.buffer.as_ref()[field::XID];
        NetworkEndian::read_u32(field)
    }

    /// Return the seconds elapsed since the client began acquiring a lease.
    pub fn secs(&self) -> u16 {
        let field = &self.buffer.as_ref()[field::SECS];
        NetworkEndian::read_u16(field)
    }

    pub fn flags(&self) -> Flags {
        let field = &self.buffer.as_ref()[field::FLAGS];
        Flags::from_bits_retain(NetworkEndian::read_u16(field))
    }

    /// Return the client's address, if it already has one.
    pub fn client_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::CIADDR])
    }

    /// Return the address the server offers or assigns.
    pub fn your_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::YIADDR])
    }

    /// Return the address of the next server in the bootstrap.
    pub fn server_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::SIADDR])
    }

    /// Return the address of the relay agent, if any.
    pub fn relay_agent_ip(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.buffer.as_ref()[field::GIADDR])
    }

    /// Return all sixteen octets of the client hardware address field.
    pub fn client_hardware_address(&self) -> [u8; 16] {
        let mut address = [0; 16];
        address.copy_from_slice(&self.buffer.as_ref()[field::CHADDR]);
        address
    }

    /// Return the client hardware address as an Ethernet address.
    pub fn client_hardware_mac(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.buffer.as_ref()[field::CHADDR.start..field::CHADDR.start + 6])
    }

    /// Return the server host name field, without trailing zeros.
    pub fn server_name(&self) -> &[u8] {
        trim_zeros(&self.buffer.as_ref()[field::SNAME])
    }

    /// Return the boot file name field, without trailing zeros.
    pub fn boot_file(&self) -> &[u8] {
        trim_zeros(&self.buffer.as_ref()[field::FILE])
    }

    /// Whether the BOOTP header is followed by the DHCP magic cookie.
    pub fn is_dhcp(&self) -> bool {
        match self.buffer.as_ref().get(field::MAGIC_NUMBER) {
            Some(cookie) => NetworkEndian::read_u32(cookie) == MAGIC_COOKIE,
            None => false,
        }
    }

    /// Offset of the option area.
    pub fn options_start(&self) -> usize {
        if self.is_dhcp() {
            field::MAGIC_NUMBER.end
        } else {
            HEADER_LEN
        }
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> Packet<&'a T> {
    /// Return the option area, which runs to the end of the buffer.
    pub fn options(&self) -> &'a [u8] {
        let start = self.options_start();
        &self.buffer.as_ref()[start..]
    }
}

impl<T: AsRef<[u8]>> fmt::Display for Packet<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.check_len().is_err() {
            return write!(f, "DHCP (truncated)");
        }
        write!(
            f,
            "DHCP op={:?} xid={:#010x} chaddr={} yiaddr={}",
            self.opcode(),
            self.transaction_id(),
            self.client_hardware_mac(),
            self.your_ip()
        )
    }
}

fn trim_zeros(data: &[u8]) -> &[u8] {
    let len = data.iter().rposition(|octet| *octet != 0).map_or(0, |last| last + 1);
    &data[..len]
}

/// A read-only view of a BOOTP or DHCP message.
#[derive(Debug, Clone)]
pub struct DhcpDatagram<'a> {
    packet: Packet<&'a [u8]>,
    valid: OnceLock<bool>,
    options: OnceLock<Options<DhcpOption>>,
}

impl<'a> DhcpDatagram<'a> {
    pub fn options(&self) -> &Options<DhcpOption> {
        self.options.get_or_init(|| match self.packet.check_len() {
            Ok(()) => Options::parse(self.packet.options()),
            Err(_) => Options::empty(),
        })
    }

    /// The DHCP message type option, if present.
    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options().iter().find_map(|option| match option {
            DhcpOption::MessageType(kind) => Some(*kind),
            _ => None,
        })
    }
}

impl<'a> core::ops::Deref for DhcpDatagram<'a> {
    type Target = Packet<&'a [u8]>;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl<'a> Datagram<'a> for DhcpDatagram<'a> {
    type Layer = DhcpLayer;

    fn new(bytes: &'a [u8]) -> Self {
        DhcpDatagram {
            packet: Packet::new_unchecked(bytes),
            valid: OnceLock::new(),
            options: OnceLock::new(),
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.packet.buffer
    }

    fn is_valid(&self) -> bool {
        *self.valid.get_or_init(|| {
            if self.packet.check_len().is_err() {
                net_debug!("DHCP message of {} octets is truncated", self.packet.buffer.len());
                return false;
            }
            self.options().is_valid()
        })
    }

    fn extract_layer(&self) -> DhcpLayer {
        if self.packet.check_len().is_err() {
            return DhcpLayer::default();
        }
        DhcpLayer {
            opcode: self.opcode(),
            hardware_type: self.hardware_type(),
            hardware_len: self.hardware_len(),
            hops: self.hops(),
            transaction_id: self.transaction_id(),
            secs: self.secs(),
            flags: self.flags(),
            client_ip: self.client_ip(),
            your_ip: self.your_ip(),
            server_ip: self.server_ip(),
            relay_agent_ip: self.relay_agent_ip(),
            client_hardware_address: self.client_hardware_address(),
            server_name: self.server_name().to_vec(),
            boot_file: self.boot_file().to_vec(),
            is_dhcp: self.is_dhcp(),
            options: self.options().clone(),
        }
    }
}

/// A BOOTP or DHCP message under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpLayer {
    pub opcode: OpCode,
    pub hardware_type: ArpHardware,
    pub hardware_len: u8,
    pub hops: u8,
    pub transaction_id: u32,
    pub secs: u16,
    pub flags: Flags,
    pub client_ip: Ipv4Address,
    pub your_ip: Ipv4Address,
    pub server_ip: Ipv4Address,
    pub relay_agent_ip: Ipv4Address,
    pub client_hardware_address: [u8; 16],
    /// Up to 64 octets, zero padded on output.
    pub server_name: Vec<u8>,
    /// Up to 128 octets, zero padded on output.
    pub boot_file: Vec<u8>,
    /// Whether to write the magic cookie before the options.
    pub is_dhcp: bool,
    pub options: Options<DhcpOption>,
}

impl Default for DhcpLayer {
    fn default() -> Self {
        DhcpLayer {
            opcode: OpCode::BootRequest,
            hardware_type: ArpHardware::Ethernet,
            hardware_len: 6,
            hops: 0,
            transaction_id: 0,
            secs: 0,
            flags: Flags::empty(),
            client_ip: Ipv4Address::UNSPECIFIED,
            your_ip: Ipv4Address::UNSPECIFIED,
            server_ip: Ipv4Address::UNSPECIFIED,
            relay_agent_ip: Ipv4Address::UNSPECIFIED,
            client_hardware_address: [0; 16],
            server_name: Vec::new(),
            boot_file: Vec::new(),
            is_dhcp: true,
            options: Options::empty(),
        }
    }
}

impl DhcpLayer {
    /// Set the first six octets of the client hardware address.
    pub fn set_client_mac(&mut self, address: EthernetAddress) {
        self.client_hardware_address = [0; 16];
        self.client_hardware_address[..6].copy_from_slice(address.as_bytes());
    }

    pub fn buffer_len(&self) -> usize {
        let cookie_len = if self.is_dhcp { 4 } else { 0 };
        HEADER_LEN + cookie_len + self.options.buffer_len()
    }

    pub(crate) fn emit(&self, buffer: &mut [u8]) -> core::result::Result<(), BuildError> {
        BuildError::check_len("DHCP server name", self.server_name.len(), field::SNAME.len())?;
        BuildError::check_len("DHCP boot file", self.boot_file.len(), field::FILE.len())?;
        let hardware_type = u16::from(self.hardware_type);
        BuildError::check_range("DHCP hardware type", hardware_type, u8::MAX)?;

        buffer[..HEADER_LEN].fill(0);
        buffer[field::OP] = self.opcode.into();
        buffer[field::HTYPE] = hardware_type as u8;
        buffer[field::HLEN] = self.hardware_len;
        buffer[field::HOPS] = self.hops;
        NetworkEndian::write_u32(&mut buffer[field::XID], self.transaction_id);
        NetworkEndian::write_u16(&mut buffer[field::SECS], self.secs);
        NetworkEndian::write_u16(&mut buffer[field::FLAGS], self.flags.bits());
        buffer[field::CIADDR].copy_from_slice(&self.client_ip.octets());
        buffer[field::YIADDR].copy_from_slice(&self.your_ip.octets());
        buffer[field::SIADDR].copy_from_slice(&self.server_ip.octets());
        buffer[field::GIADDR].copy_from_slice(&self.relay_agent_ip.octets());
        buffer[field::CHADDR].copy_from_slice(&self.client_hardware_address);
        buffer[field::SNAME.start..field::SNAME.start + self.server_name.len()]
            .copy_from_slice(&self.server_name);
        buffer[field::FILE.start..field::FILE.start + self.boot_file.len()]
            .copy_from_slice(&self.boot_file);

        let mut start = HEADER_LEN;
        if self.is_dhcp {
            NetworkEndian::write_u32(&mut buffer[field::MAGIC_NUMBER], MAGIC_COOKIE);
            start = field::MAGIC_NUMBER.end;
        }
        self.options.emit(&mut buffer[start..]);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{DhcpOptionCode, TlvOption};

    const CLIENT_MAC: EthernetAddress = EthernetAddress([0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42]);

    fn discover_bytes() -> Vec<u8> {
        let mut bytes = vec![0; 250];
        bytes[..4].copy_from_slice(&[0x01, 0x01, 0x06, 0x00]);
        bytes[4..8].copy_from_slice(&[0x39, 0x03, 0xf3, 0x26]);
        bytes[10] = 0x80;
        bytes[28..34].copy_from_slice(CLIENT_MAC.as_bytes());
        bytes[44..48].copy_from_slice(b"boot");
        bytes[236..240].copy_from_slice(&[0x63, 0x82, 0x53, 0x63]);
        bytes[240..].copy_from_slice(&[0x35, 0x01, 0x01, 0x37, 0x04, 0x01, 0x03, 0x06, 0x0f, 0xff]);
        bytes
    }

    fn discover_options() -> Options<DhcpOption> {
        Options::new(vec![
            DhcpOption::MessageType(DhcpMessageType::Discover),
            DhcpOption::ParameterRequestList(vec![
                DhcpOptionCode::SubnetMask,
                DhcpOptionCode::Router,
                DhcpOptionCode::DomainNameServer,
                DhcpOptionCode::DomainName,
            ]),
            DhcpOption::end(),
        ])
        .unwrap()
    }

    #[test]
    fn test_deconstruct() {
        let bytes = discover_bytes();
        let packet = Packet::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.opcode(), OpCode::BootRequest);
        assert_eq!(packet.hardware_type(), ArpHardware::Ethernet);
        assert_eq!(packet.hardware_len(), 6);
        assert_eq!(packet.transaction_id(), 0x3903f326);
        assert_eq!(packet.flags(), Flags::BROADCAST);
        assert_eq!(packet.client_hardware_mac(), CLIENT_MAC);
        assert_eq!(packet.server_name(), b"boot");
        assert_eq!(packet.boot_file(), b"");
        assert!(packet.is_dhcp());
        assert_eq!(packet.options().len(), 10);
    }

    #[test]
    fn test_view() {
        let bytes = discover_bytes();
        let view = DhcpDatagram::new(&bytes[..]);
        assert!(view.is_valid());
        assert_eq!(view.message_type(), Some(DhcpMessageType::Discover));
        assert_eq!(view.options(), &discover_options());
    }

    #[test]
    fn test_construct() {
        let mut layer = DhcpLayer {
            transaction_id: 0x3903f326,
            flags: Flags::BROADCAST,
            server_name: b"boot".to_vec(),
            options: discover_options(),
            ..DhcpLayer::default()
        };
        layer.set_client_mac(CLIENT_MAC);
        assert_eq!(layer.buffer_len(), 250);

        let mut bytes = vec![0xa5; layer.buffer_len()];
        layer.emit(&mut bytes).unwrap();
        assert_eq!(bytes, discover_bytes());
        assert_eq!(DhcpDatagram::new(&bytes[..]).extract_layer(), layer);
    }

    #[test]
    fn test_bootp_without_cookie() {
        let bytes = discover_bytes();
        let view = DhcpDatagram::new(&bytes[..HEADER_LEN]);
        assert!(!view.is_dhcp());
        assert!(view.is_valid());
        assert!(view.options().is_empty());
        assert_eq!(view.message_type(), None);
    }

    #[test]
    fn test_truncated() {
        let bytes = discover_bytes();
        assert!(!DhcpDatagram::new(&bytes[..235]).is_valid());
        assert_eq!(DhcpDatagram::new(&bytes[..235]).extract_layer(), DhcpLayer::default());
    }

    #[test]
    fn test_server_name_too_long() {
        let layer = DhcpLayer {
            server_name: vec![b'a'; 65],
            ..DhcpLayer::default()
        };
        let mut bytes = vec![0; layer.buffer_len()];
        assert_eq!(
            layer.emit(&mut bytes),
            Err(BuildError::TooLong {
                what: "DHCP server name",
                len: 65,
                max: 64
            })
        );
    }
}
