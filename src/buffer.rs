//! Captured packets and the entry point for reading them.

use core::fmt;

use crate::layer::Layer;
use crate::time::Instant;
use crate::wire::{Datagram, EthernetDatagram, Ipv4Datagram, Ipv6Datagram};

/// The outermost header of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLinkKind {
    /// The packet starts with an Ethernet II header.
    Ethernet,
    /// The packet starts with an IPv4 header (raw IP).
    Ipv4,
    /// The packet starts with an IPv6 header (raw IP).
    Ipv6,
}

impl fmt::Display for DataLinkKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataLinkKind::Ethernet => write!(f, "Ethernet"),
            DataLinkKind::Ipv4 => write!(f, "raw IPv4"),
            DataLinkKind::Ipv6 => write!(f, "raw IPv6"),
        }
    }
}

/// The octets of one packet, with the time it was captured or built and
/// the kind of its outermost header.
///
/// A buffer never changes once created. The views returned by
/// [parse](Buffer::parse) borrow it and may be shared between threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    timestamp: Instant,
    data_link: DataLinkKind,
}

impl Buffer {
    pub fn new(data: Vec<u8>, timestamp: Instant, data_link: DataLinkKind) -> Buffer {
        Buffer {
            data,
            timestamp,
            data_link,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn data_link(&self) -> DataLinkKind {
        self.data_link
    }

    /// The view of the outermost header.
    pub fn parse(&self) -> LinkDatagram<'_> {
        parse_link_layer(self.data_link, &self.data)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// The view of the outermost header of a packet.
#[derive(Debug, Clone)]
pub enum LinkDatagram<'a> {
    Ethernet(EthernetDatagram<'a>),
    Ipv4(Ipv4Datagram<'a>),
    Ipv6(Ipv6Datagram<'a>),
}

/// Create the view of the outermost header of `data`, which is of kind
/// `data_link`.
pub fn parse_link_layer(data_link: DataLinkKind, data: &[u8]) -> LinkDatagram<'_> {
    match data_link {
        DataLinkKind::Ethernet => LinkDatagram::Ethernet(EthernetDatagram::new(data)),
        DataLinkKind::Ipv4 => LinkDatagram::Ipv4(Ipv4Datagram::new(data)),
        DataLinkKind::Ipv6 => LinkDatagram::Ipv6(Ipv6Datagram::new(data)),
    }
}

impl<'a> LinkDatagram<'a> {
    pub fn data_link(&self) -> DataLinkKind {
        match self {
            LinkDatagram::Ethernet(_) => DataLinkKind::Ethernet,
            LinkDatagram::Ipv4(_) => DataLinkKind::Ipv4,
            LinkDatagram::Ipv6(_) => DataLinkKind::Ipv6,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        match self {
            LinkDatagram::Ethernet(view) => view.bytes(),
            LinkDatagram::Ipv4(view) => view.bytes(),
            LinkDatagram::Ipv6(view) => view.bytes(),
        }
    }

    /// Whether the whole packet, as far as it is interpreted, is sound.
    pub fn is_valid(&self) -> bool {
        match self {
            LinkDatagram::Ethernet(view) => view.is_valid(),
            LinkDatagram::Ipv4(view) => view.is_valid(),
            LinkDatagram::Ipv6(view) => view.is_valid(),
        }
    }

    /// Describe every interpreted header as a layer, outermost first. Octets
    /// no view interprets become a trailing [PayloadLayer](crate::PayloadLayer).
    pub fn extract_layers(&self) -> Vec<Layer> {
        let mut layers = Vec::new();
        match self {
            LinkDatagram::Ethernet(view) => view.extract_layers(&mut layers),
            LinkDatagram::Ipv4(view) => view.extract_layers(&mut layers),
            LinkDatagram::Ipv6(view) => view.extract_layers(&mut layers),
        }
        layers
    }
}
