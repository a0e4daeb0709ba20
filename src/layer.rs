//! Owned header descriptions and the capabilities they offer their
//! neighbours while a packet is being built.

use crate::buffer::DataLinkKind;
use crate::builder::BuildError;
use crate::wire::{
    ArpHardware, ArpLayer, DhcpLayer, DnsLayer, EspLayer, EtherType, EthernetAddress,
    EthernetLayer, GreLayer, HttpLayer, IcmpLayer, IgmpLayer, IpProtocol, Ipv4Layer, Ipv6Layer,
    TcpLayer, UdpLayer, VlanLayer,
};

/// A layer that can sit behind an Ethernet-style header (Ethernet, VLAN, GRE)
/// and tell it which EtherType to declare.
pub trait EthernetNextLayer {
    /// The EtherType the previous header should declare.
    fn ether_type(&self) -> EtherType;

    /// The Ethernet destination to use when the caller left it unspecified.
    fn default_destination(&self) -> Option<EthernetAddress> {
        None
    }
}

/// A layer that can sit behind an IP header and tell it which protocol
/// number to declare.
pub trait IpNextLayer {
    fn protocol(&self) -> IpProtocol;
}

/// A transport layer whose checksum covers an IP pseudo header, and is
/// therefore completed by the IP layer in front of it.
pub trait TransportChecksumLayer {
    /// The checksum the caller asked for, or `None` to compute it.
    fn checksum(&self) -> Option<u16>;

    /// Offset of the checksum field from the start of the transport header.
    fn checksum_offset(&self) -> usize;

    /// Whether an all-zero checksum field means "no checksum".
    fn is_checksum_optional(&self) -> bool;

    /// Whether the checksum should be computed when the caller left it unset.
    fn calculate_checksum(&self) -> bool {
        true
    }
}

/// A link layer that can tell the ARP layer after it which hardware type to
/// declare.
pub trait ArpPreviousLayer {
    fn hardware_type(&self) -> ArpHardware;
}

/// Opaque octets carried after the last interpreted header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PayloadLayer {
    pub data: Vec<u8>,
}

impl PayloadLayer {
    pub fn new(data: Vec<u8>) -> PayloadLayer {
        PayloadLayer { data }
    }

    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    fn emit(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.data);
    }
}

/// Octets a captured frame carries after everything its headers account for:
/// padding up to the minimum frame size, a trailer, a frame check sequence.
///
/// A trailer goes last in a stack. The layers before it leave it out of the
/// lengths and checksums they compute.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrailerLayer {
    pub data: Vec<u8>,
}

impl TrailerLayer {
    pub fn new(data: Vec<u8>) -> TrailerLayer {
        TrailerLayer { data }
    }

    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    fn emit(&self, buffer: &mut [u8]) {
        buffer.copy_from_slice(&self.data);
    }
}

/// Append a payload layer for `bytes`, unless there are none.
pub(crate) fn push_payload(layers: &mut Vec<Layer>, bytes: &[u8]) {
    if !bytes.is_empty() {
        layers.push(Layer::Payload(PayloadLayer::new(bytes.to_vec())));
    }
}

/// Append `layer`, extracted from the application message `bytes`, if it
/// writes those exact octets back; otherwise keep the octets as a payload.
///
/// Application encoders make their own choices (name compression, header
/// spelling), and a rebuilt packet must keep the transport checksum it was
/// extracted with.
pub(crate) fn push_application(layers: &mut Vec<Layer>, layer: Layer, bytes: &[u8]) {
    let neighbours = Neighbours {
        previous: None,
        next: None,
    };
    let mut written = vec![0; layer.buffer_len()];
    let reproduces = layer.buffer_len() == bytes.len()
        && layer.emit(&mut written, 0, &neighbours).is_ok()
        && written == bytes;
    if reproduces {
        layers.push(layer);
    } else {
        net_trace!("{} message kept as payload", layer.name());
        push_payload(layers, bytes);
    }
}

/// One header of a packet under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Ethernet(EthernetLayer),
    Vlan(VlanLayer),
    Arp(ArpLayer),
    Ipv4(Ipv4Layer),
    Ipv6(Ipv6Layer),
    Icmp(IcmpLayer),
    Igmp(IgmpLayer),
    Gre(GreLayer),
    Esp(EspLayer),
    Tcp(TcpLayer),
    Udp(UdpLayer),
    Dhcp(DhcpLayer),
    Dns(DnsLayer),
    Http(HttpLayer),
    Payload(PayloadLayer),
    Trailer(TrailerLayer),
}

macro_rules! layer_from {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        $(
            impl From<$ty> for Layer {
                fn from(layer: $ty) -> Self {
                    Layer::$variant(layer)
                }
            }
        )+
    };
}

layer_from! {
    Ethernet(EthernetLayer),
    Vlan(VlanLayer),
    Arp(ArpLayer),
    Ipv4(Ipv4Layer),
    Ipv6(Ipv6Layer),
    Icmp(IcmpLayer),
    Igmp(IgmpLayer),
    Gre(GreLayer),
    Esp(EspLayer),
    Tcp(TcpLayer),
    Udp(UdpLayer),
    Dhcp(DhcpLayer),
    Dns(DnsLayer),
    Http(HttpLayer),
    Payload(PayloadLayer),
    Trailer(TrailerLayer),
}

impl Layer {
    /// The protocol name, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Ethernet(_) => "Ethernet",
            Layer::Vlan(_) => "VLAN",
            Layer::Arp(_) => "ARP",
            Layer::Ipv4(_) => "IPv4",
            Layer::Ipv6(_) => "IPv6",
            Layer::Icmp(_) => "ICMP",
            Layer::Igmp(_) => "IGMP",
            Layer::Gre(_) => "GRE",
            Layer::Esp(_) => "ESP",
            Layer::Tcp(_) => "TCP",
            Layer::Udp(_) => "UDP",
            Layer::Dhcp(_) => "DHCP",
            Layer::Dns(_) => "DNS",
            Layer::Http(_) => "HTTP",
            Layer::Payload(_) => "payload",
            Layer::Trailer(_) => "trailer",
        }
    }

    /// Octets this layer occupies in the built packet.
    pub fn buffer_len(&self) -> usize {
        match self {
            Layer::Ethernet(layer) => layer.buffer_len(),
            Layer::Vlan(layer) => layer.buffer_len(),
            Layer::Arp(layer) => layer.buffer_len(),
            Layer::Ipv4(layer) => layer.buffer_len(),
            Layer::Ipv6(layer) => layer.buffer_len(),
            Layer::Icmp(layer) => layer.buffer_len(),
            Layer::Igmp(layer) => layer.buffer_len(),
            Layer::Gre(layer) => layer.buffer_len(),
            Layer::Esp(layer) => layer.buffer_len(),
            Layer::Tcp(layer) => layer.buffer_len(),
            Layer::Udp(layer) => layer.buffer_len(),
            Layer::Dhcp(layer) => layer.buffer_len(),
            Layer::Dns(layer) => layer.buffer_len(),
            Layer::Http(layer) => layer.buffer_len(),
            Layer::Payload(layer) => layer.buffer_len(),
            Layer::Trailer(layer) => layer.buffer_len(),
        }
    }

    /// The data link kind of a packet that starts with this layer, if any.
    pub fn data_link(&self) -> Option<DataLinkKind> {
        match self {
            Layer::Ethernet(_) => Some(DataLinkKind::Ethernet),
            Layer::Ipv4(_) => Some(DataLinkKind::Ipv4),
            Layer::Ipv6(_) => Some(DataLinkKind::Ipv6),
            _ => None,
        }
    }

    pub fn as_ethernet_next(&self) -> Option<&dyn EthernetNextLayer> {
        match self {
            Layer::Vlan(layer) => Some(layer),
            Layer::Arp(layer) => Some(layer),
            Layer::Ipv4(layer) => Some(layer),
            Layer::Ipv6(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_ip_next(&self) -> Option<&dyn IpNextLayer> {
        match self {
            Layer::Ipv4(layer) => Some(layer),
            Layer::Ipv6(layer) => Some(layer),
            Layer::Icmp(layer) => Some(layer),
            Layer::Igmp(layer) => Some(layer),
            Layer::Gre(layer) => Some(layer),
            Layer::Esp(layer) => Some(layer),
            Layer::Tcp(layer) => Some(layer),
            Layer::Udp(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_transport(&self) -> Option<&dyn TransportChecksumLayer> {
        match self {
            Layer::Tcp(layer) => Some(layer),
            Layer::Udp(layer) => Some(layer),
            _ => None,
        }
    }

    pub fn as_arp_previous(&self) -> Option<&dyn ArpPreviousLayer> {
        match self {
            Layer::Ethernet(layer) => Some(layer),
            Layer::Vlan(layer) => Some(layer),
            _ => None,
        }
    }

    /// Write this layer into `buffer`, exactly `buffer_len()` octets, with
    /// `payload_len` octets of later layers following it.
    pub(crate) fn emit(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
        neighbours: &Neighbours,
    ) -> Result<(), BuildError> {
        match self {
            Layer::Ethernet(layer) => layer.emit(buffer, neighbours),
            Layer::Vlan(layer) => layer.emit(buffer, neighbours),
            Layer::Arp(layer) => layer.emit(buffer, neighbours),
            Layer::Ipv4(layer) => layer.emit(buffer, payload_len, neighbours),
            Layer::Ipv6(layer) => layer.emit(buffer, payload_len, neighbours),
            Layer::Icmp(layer) => layer.emit(buffer),
            Layer::Igmp(layer) => layer.emit(buffer),
            Layer::Gre(layer) => layer.emit(buffer, neighbours),
            Layer::Esp(layer) => {
                layer.emit(buffer);
                Ok(())
            }
            Layer::Tcp(layer) => layer.emit(buffer),
            Layer::Udp(layer) => layer.emit(buffer, payload_len),
            Layer::Dhcp(layer) => layer.emit(buffer),
            Layer::Dns(layer) => layer.emit(buffer),
            Layer::Http(layer) => layer.emit(buffer),
            Layer::Payload(layer) => {
                layer.emit(buffer);
                Ok(())
            }
            Layer::Trailer(layer) => {
                layer.emit(buffer);
                Ok(())
            }
        }
    }

    /// Complete the fields of this layer that cover later layers. `buffer`
    /// runs from the start of this layer to the end of the packet.
    pub(crate) fn finalize(
        &self,
        buffer: &mut [u8],
        payload_len: usize,
        neighbours: &Neighbours,
    ) -> Result<(), BuildError> {
        match self {
            Layer::Ipv4(layer) => layer.finalize(buffer, payload_len, neighbours),
            Layer::Ipv6(layer) => layer.finalize(buffer, payload_len, neighbours),
            Layer::Icmp(layer) => {
                layer.finalize(buffer, payload_len);
                Ok(())
            }
            Layer::Igmp(layer) => {
                layer.finalize(buffer, payload_len);
                Ok(())
            }
            Layer::Gre(layer) => {
                layer.finalize(buffer, payload_len);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// The layers on either side of the one being written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Neighbours<'a> {
    pub previous: Option<&'a Layer>,
    pub next: Option<&'a Layer>,
}

impl<'a> Neighbours<'a> {
    /// The EtherType `layer` should declare for the next layer.
    pub fn ether_type(&self, layer: &'static str) -> Result<EtherType, BuildError> {
        let field = "EtherType";
        let next = self
            .next
            .ok_or(BuildError::MissingNextLayer { layer, field })?;
        next.as_ethernet_next()
            .map(EthernetNextLayer::ether_type)
            .ok_or(BuildError::Unsupported {
                layer,
                field,
                neighbour: next.name(),
            })
    }

    /// The destination the next layer asks for, if it has an opinion.
    pub fn default_destination(&self) -> Option<EthernetAddress> {
        self.next
            .and_then(Layer::as_ethernet_next)
            .and_then(EthernetNextLayer::default_destination)
    }

    /// The protocol number `layer` should declare for the next layer.
    pub fn ip_protocol(&self, layer: &'static str) -> Result<IpProtocol, BuildError> {
        let field = "protocol";
        let next = self
            .next
            .ok_or(BuildError::MissingNextLayer { layer, field })?;
        next.as_ip_next()
            .map(IpNextLayer::protocol)
            .ok_or(BuildError::Unsupported {
                layer,
                field,
                neighbour: next.name(),
            })
    }

    /// The hardware type `layer` should declare, from the link layer in front.
    pub fn arp_hardware(&self, layer: &'static str) -> Result<ArpHardware, BuildError> {
        let field = "hardware type";
        let previous = self
            .previous
            .ok_or(BuildError::MissingPreviousLayer { layer, field })?;
        previous
            .as_arp_previous()
            .map(ArpPreviousLayer::hardware_type)
            .ok_or(BuildError::Unsupported {
                layer,
                field,
                neighbour: previous.name(),
            })
    }

    pub fn transport(&self) -> Option<&'a dyn TransportChecksumLayer> {
        self.next.and_then(Layer::as_transport)
    }
}
