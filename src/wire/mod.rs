/*! Low-level packet access and construction.

The `wire` module deals with the packet *representation*. Every protocol
family is exposed at three levels.

 * The `Packet` family of structures (e.g. [EthernetFrame] or [Ipv4Packet])
   extracts fields from sequences of octets and inserts fields into them.
   Field accessors read at fixed offsets and never allocate.
 * The `Datagram` family of structures (e.g. [EthernetDatagram] or
   [Ipv4Datagram]) wraps a borrowed `Packet` into a read-only view. A view
   validates itself on demand, caches the result, and materializes the view
   of its payload on first access. Views over the same buffer may be shared
   between threads.
 * The `Layer` family of structures (e.g. [EthernetLayer] or [Ipv4Layer])
   owns the logical field values of one header. Layers are assembled into
   octets by the [PacketBuilder], and recovered from a view through
   [Datagram::extract_layer].

[EthernetFrame]: struct.EthernetFrame.html
[Ipv4Packet]: struct.Ipv4Packet.html
[EthernetDatagram]: struct.EthernetDatagram.html
[Ipv4Datagram]: struct.Ipv4Datagram.html
[EthernetLayer]: struct.EthernetLayer.html
[Ipv4Layer]: struct.Ipv4Layer.html
[PacketBuilder]: ../struct.PacketBuilder.html
[Datagram::extract_layer]: trait.Datagram.html#tymethod.extract_layer

The `Packet` family of data structures guarantees that, if the `Packet::check_len()` method
returned `Ok(())`, then no accessor or setter method will panic; however, the guarantee
provided by `Packet::check_len()` may no longer hold after changing certain fields,
which are listed in the documentation for the specific packet.

The `Datagram` family never panics on any input: construction is free, and
every accessor a view exposes beyond the `Packet` accessors is bounded by the
octets actually present. Use `is_valid()` to learn whether the structure
holds together before trusting field values.

# Examples

To parse the UDP header inside a captured IPv4 packet:

```rust
use netcodec::wire::*;

let bytes = [
    0x45, 0x00, 0x00, 0x1e, 0x00, 0x7b, 0x00, 0x00, 0x64, 0x11, 0x13, 0x8d,
    0x01, 0x02, 0x03, 0x04, 0x0b, 0x16, 0x21, 0x2c, 0x0f, 0xd2, 0x00, 0x19,
    0x00, 0x0a, 0x00, 0x00, 0x68, 0x69,
];
let ip = Ipv4Datagram::new(&bytes);
assert_eq!(ip.src_addr(), Ipv4Address::new(1, 2, 3, 4));
match ip.ip_payload() {
    IpPayload::Udp(udp) => assert_eq!(udp.dst_port(), 25),
    _ => unreachable!(),
}
```
*/

use core::fmt;

mod field {
    pub type Field = ::core::ops::Range<usize>;
    pub type Rest = ::core::ops::RangeFrom<usize>;
}

pub(crate) mod codec;
pub(crate) mod ip;
pub mod option;
pub mod registry;

mod arp;
mod dhcp;
mod dhcpoption;
mod dns;
mod esp;
mod ethernet;
mod gre;
mod http;
mod icmp;
mod igmp;
mod ipv4;
mod ipv4option;
mod ipv6;
mod tcp;
mod tcpoption;
mod udp;
mod vlan;

pub use self::ip::{
    checksum, Address as IpAddress, Payload as IpPayload, Protocol as IpProtocol,
};

pub use self::option::{Options, TlvOption};

pub use self::registry::TypeRegistry;

pub use self::ethernet::{
    Address as EthernetAddress, EtherType, EthernetDatagram, EthernetLayer,
    Frame as EthernetFrame, Payload as EthernetPayload, HEADER_LEN as ETHERNET_HEADER_LEN,
};

pub use self::vlan::{Packet as VlanPacket, VlanDatagram, VlanLayer, HEADER_LEN as VLAN_HEADER_LEN};

pub use self::arp::{
    ArpDatagram, ArpLayer, Hardware as ArpHardware, Operation as ArpOperation,
    Packet as ArpPacket,
};

pub use self::ipv4::{
    Address as Ipv4Address, Fragmentation as Ipv4Fragmentation, Ipv4Datagram, Ipv4Layer,
    Packet as Ipv4Packet, HEADER_LEN as IPV4_HEADER_LEN,
    MAX_OPTIONS_LEN as IPV4_MAX_OPTIONS_LEN,
};

pub(crate) use self::ipv4::AddressExt as Ipv4AddressExt;

pub use self::ipv4option::{
    Ipv4Option, OptionType as Ipv4OptionType, QuickStart as Ipv4QuickStart,
    QuickStartFunction as Ipv4QuickStartFunction, Route as Ipv4Route,
    Security as Ipv4Security, SecurityLevel as Ipv4SecurityLevel,
    Timestamp as Ipv4Timestamp, TimestampValues as Ipv4TimestampValues,
    TraceRoute as Ipv4TraceRoute,
};

pub use self::ipv6::{
    Address as Ipv6Address, Ipv6Datagram, Ipv6Layer, Packet as Ipv6Packet,
    HEADER_LEN as IPV6_HEADER_LEN,
};

pub use self::icmp::{
    IcmpDatagram, IcmpLayer, Message as IcmpMessage, MessageType as IcmpMessageType,
    Packet as IcmpPacket, RouterEntry as IcmpRouterEntry, HEADER_LEN as ICMP_HEADER_LEN,
};

pub use self::igmp::{
    GroupRecord as IgmpGroupRecord, IgmpDatagram, IgmpLayer, Message as IgmpMessage,
    MessageType as IgmpMessageType, Packet as IgmpPacket, RecordType as IgmpRecordType,
};

pub use self::esp::{
    EspDatagram, EspLayer, Packet as EspPacket, HEADER_LEN as ESP_HEADER_LEN,
};

pub use self::gre::{
    Flags as GreFlags, GreDatagram, GreLayer, Packet as GrePacket,
    SourceRouteEntry as GreSourceRouteEntry,
};

pub use self::tcp::{
    Control as TcpControl, Packet as TcpPacket, TcpDatagram, TcpLayer,
    HEADER_LEN as TCP_HEADER_LEN, MAX_OPTIONS_LEN as TCP_MAX_OPTIONS_LEN,
};

pub use self::tcpoption::{
    ChecksumAlgorithm as TcpChecksumAlgorithm, OptionType as TcpOptionType,
    SackBlock as TcpSackBlock, TcpOption, UserTimeout as TcpUserTimeout,
};

pub use self::udp::{Packet as UdpPacket, UdpDatagram, UdpLayer, HEADER_LEN as UDP_HEADER_LEN};

pub use self::dhcp::{
    DhcpDatagram, DhcpLayer, Flags as DhcpFlags, OpCode as DhcpOpCode, Packet as DhcpPacket,
    CLIENT_PORT as DHCP_CLIENT_PORT, MAGIC_COOKIE as DHCP_MAGIC_COOKIE,
    SERVER_PORT as DHCP_SERVER_PORT,
};

pub use self::dhcpoption::{
    DhcpOption, MessageType as DhcpMessageType, OptionCode as DhcpOptionCode,
};

pub use self::dns::{
    DnsDatagram, DnsLayer, DomainName, Flags as DnsFlags, Opcode as DnsOpcode,
    Packet as DnsPacket, Question as DnsQuestion, Rcode as DnsRcode, RecordData as DnsRecordData,
    RecordType as DnsRecordType, ResourceRecord as DnsResourceRecord, HEADER_LEN as DNS_HEADER_LEN,
    PORT as DNS_PORT,
};

pub use self::http::{
    Field as HttpField, HttpDatagram, HttpLayer, StartLine as HttpStartLine,
    Version as HttpVersion, PORT as HTTP_PORT,
};

/// Parsing a packet failed.
///
/// Either it is malformed, or it is not supported by netcodec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

impl core::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// A read-only view of one protocol header over borrowed octets.
///
/// Constructing a view never fails and never inspects the octets. Validity,
/// options and nested payload views are computed on first use and cached for
/// the lifetime of the view; the caches are safe to fill from several threads.
pub trait Datagram<'a>: Sized {
    /// The owned description of this header.
    type Layer: Into<crate::Layer>;

    /// Create a view over `bytes`, which begin with this header.
    fn new(bytes: &'a [u8]) -> Self;

    /// Return the octets this view covers.
    fn bytes(&self) -> &'a [u8];

    /// Return whether the header, its options and any interpreted payload
    /// are structurally sound.
    fn is_valid(&self) -> bool;

    /// Describe this header as a layer that rebuilds the same octets.
    fn extract_layer(&self) -> Self::Layer;
}
