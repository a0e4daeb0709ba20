use core::fmt;

use super::{
    Datagram, EspDatagram, GreDatagram, IcmpDatagram, IgmpDatagram, Ipv4Address, Ipv4Datagram,
    Ipv6Address, Ipv6Datagram, TcpDatagram, UdpDatagram,
};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        HopByHop  = 0x00,
        Icmp      = 0x01,
        Igmp      = 0x02,
        Ipv4      = 0x04,
        Tcp       = 0x06,
        Udp       = 0x11,
        Ipv6      = 0x29,
        Ipv6Route = 0x2b,
        Ipv6Frag  = 0x2c,
        Gre       = 0x2f,
        IpSecEsp  = 0x32,
        IpSecAh   = 0x33,
        Icmpv6    = 0x3a,
        Ipv6NoNxt = 0x3b,
        Ipv6Opts  = 0x3c
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Protocol::HopByHop => write!(f, "Hop-by-Hop"),
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Igmp => write!(f, "IGMP"),
            Protocol::Ipv4 => write!(f, "IPv4"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Ipv6 => write!(f, "IPv6"),
            Protocol::Ipv6Route => write!(f, "IPv6-Route"),
            Protocol::Ipv6Frag => write!(f, "IPv6-Frag"),
            Protocol::Gre => write!(f, "GRE"),
            Protocol::IpSecEsp => write!(f, "IPsec-ESP"),
            Protocol::IpSecAh => write!(f, "IPsec-AH"),
            Protocol::Icmpv6 => write!(f, "ICMPv6"),
            Protocol::Ipv6NoNxt => write!(f, "IPv6-NoNxt"),
            Protocol::Ipv6Opts => write!(f, "IPv6-Opts"),
            Protocol::Unknown(id) => write!(f, "0x{id:02x}"),
        }
    }
}

/// An internetworking address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Address {
    /// An IPv4 address.
    Ipv4(Ipv4Address),
    /// An IPv6 address.
    Ipv6(Ipv6Address),
}

impl From<Ipv4Address> for Address {
    fn from(addr: Ipv4Address) -> Self {
        Address::Ipv4(addr)
    }
}

impl From<Ipv6Address> for Address {
    fn from(addr: Ipv6Address) -> Self {
        Address::Ipv6(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Ipv4(addr) => write!(f, "{addr}"),
            Address::Ipv6(addr) => write!(f, "{addr}"),
        }
    }
}

/// The view of whatever an IPv4 or IPv6 header carries.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Icmp(IcmpDatagram<'a>),
    Igmp(IgmpDatagram<'a>),
    Gre(GreDatagram<'a>),
    Esp(EspDatagram<'a>),
    Tcp(TcpDatagram<'a>),
    Udp(UdpDatagram<'a>),
    Ipv4(Ipv4Datagram<'a>),
    Ipv6(Ipv6Datagram<'a>),
    Unknown(&'a [u8]),
}

impl<'a> Payload<'a> {
    pub(crate) fn dispatch(protocol: Protocol, bytes: &'a [u8]) -> Self {
        match protocol {
            Protocol::Icmp => Payload::Icmp(IcmpDatagram::new(bytes)),
            Protocol::Igmp => Payload::Igmp(IgmpDatagram::new(bytes)),
            Protocol::Gre => Payload::Gre(GreDatagram::new(bytes)),
            Protocol::IpSecEsp => Payload::Esp(EspDatagram::new(bytes)),
            Protocol::Tcp => Payload::Tcp(TcpDatagram::new(bytes)),
            Protocol::Udp => Payload::Udp(UdpDatagram::new(bytes)),
            Protocol::Ipv4 => Payload::Ipv4(Ipv4Datagram::new(bytes)),
            Protocol::Ipv6 => Payload::Ipv6(Ipv6Datagram::new(bytes)),
            _ => Payload::Unknown(bytes),
        }
    }

    /// Return the octets of the payload, interpreted or not.
    pub fn bytes(&self) -> &'a [u8] {
        match self {
            Payload::Icmp(view) => view.bytes(),
            Payload::Igmp(view) => view.bytes(),
            Payload::Gre(view) => view.bytes(),
            Payload::Esp(view) => view.bytes(),
            Payload::Tcp(view) => view.bytes(),
            Payload::Udp(view) => view.bytes(),
            Payload::Ipv4(view) => view.bytes(),
            Payload::Ipv6(view) => view.bytes(),
            Payload::Unknown(bytes) => bytes,
        }
    }

    /// Validity of the payloads that can be judged without the enclosing
    /// header. Transport checksums are verified by the IP views.
    pub(crate) fn is_valid(&self) -> bool {
        match self {
            Payload::Icmp(view) => view.is_valid(),
            Payload::Igmp(view) => view.is_valid(),
            Payload::Gre(view) => view.is_valid(),
            Payload::Esp(view) => view.is_valid(),
            Payload::Tcp(view) => view.is_valid(),
            Payload::Udp(view) => view.is_valid(),
            Payload::Ipv4(view) => view.is_valid(),
            Payload::Ipv6(view) => view.is_valid(),
            Payload::Unknown(_) => true,
        }
    }

    /// Verify the checksum of a TCP or UDP payload against the pseudo header
    /// of the enclosing IP header. Other payloads have nothing to verify.
    pub(crate) fn is_transport_checksum_correct(&self, src_addr: &Address, dst_addr: &Address) -> bool {
        match self {
            Payload::Tcp(view) => view.is_checksum_correct(src_addr, dst_addr),
            Payload::Udp(view) => view.is_checksum_correct(src_addr, dst_addr),
            _ => true,
        }
    }

    /// Extract this payload, and everything inside it, as layers.
    pub(crate) fn extract_layers(&self, layers: &mut Vec<crate::Layer>) {
        match self {
            Payload::Icmp(view) => layers.push(view.extract_layer().into()),
            Payload::Igmp(view) => layers.push(view.extract_layer().into()),
            Payload::Gre(view) => view.extract_layers(layers),
            Payload::Esp(view) => view.extract_layers(layers),
            Payload::Tcp(view) => view.extract_layers(layers),
            Payload::Udp(view) => view.extract_layers(layers),
            Payload::Ipv4(view) => view.extract_layers(layers),
            Payload::Ipv6(view) => view.extract_layers(layers),
            Payload::Unknown(bytes) => crate::layer::push_payload(layers, bytes),
        }
    }
}

pub mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};

    use super::*;

    fn fold(mut sum: u64) -> u16 {
        while sum >> 16 != 0 {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        sum as u16
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub fn data(mut data: &[u8]) -> u16 {
        let mut accum: u64 = 0;

        // For each 32-byte chunk...
        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            let mut d = &data[..CHUNK_SIZE];
            // ... take by 2 bytes and sum them.
            while d.len() >= 2 {
                accum += NetworkEndian::read_u16(d) as u64;
                d = &d[2..];
            }

            data = &data[CHUNK_SIZE..];
        }

        // Sum the rest that does not fit the last 32-byte chunk,
        // taking by 2 bytes.
        while data.len() >= 2 {
            accum += NetworkEndian::read_u16(data) as u64;
            data = &data[2..];
        }

        // Add the last remaining odd byte, if any.
        if let Some(&value) = data.first() {
            accum += (value as u64) << 8;
        }

        fold(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub fn combine(checksums: &[u16]) -> u16 {
        let mut accum: u64 = 0;
        for &word in checksums {
            accum += word as u64;
        }
        fold(accum)
    }

    /// The complemented one's-complement sum of `data`, as it is stored in a
    /// checksum field.
    pub fn internet_checksum(data: &[u8]) -> u16 {
        !self::data(data)
    }

    /// Compute an IP pseudo header checksum.
    pub fn pseudo_header(
        src_addr: &Address,
        dst_addr: &Address,
        next_header: Protocol,
        length: u32,
    ) -> u16 {
        match (src_addr, dst_addr) {
            (Address::Ipv4(src_addr), Address::Ipv4(dst_addr)) => {
                pseudo_header_v4(src_addr, dst_addr, next_header, length)
            }
            (Address::Ipv6(src_addr), Address::Ipv6(dst_addr)) => {
                pseudo_header_v6(src_addr, dst_addr, next_header, length)
            }
            (Address::Ipv4(_), Address::Ipv6(_)) | (Address::Ipv6(_), Address::Ipv4(_)) => {
                // Mixed families never share one header; sum what there is.
                let mut accum = 0;
                for addr in [src_addr, dst_addr] {
                    accum = combine(&[accum, address_sum(addr)]);
                }
                combine(&[accum, u8::from(next_header) as u16, fold(length as u64)])
            }
        }
    }

    fn address_sum(addr: &Address) -> u16 {
        match addr {
            Address::Ipv4(addr) => data(&addr.octets()),
            Address::Ipv6(addr) => data(&addr.octets()),
        }
    }

    /// Compute the IPv4 pseudo header checksum: source, destination, a zero
    /// octet, the protocol and the 16-bit transport length.
    pub fn pseudo_header_v4(
        src_addr: &Ipv4Address,
        dst_addr: &Ipv4Address,
        next_header: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 4];
        proto_len[1] = next_header.into();
        NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

        combine(&[
            data(&src_addr.octets()),
            data(&dst_addr.octets()),
            data(&proto_len[..]),
        ])
    }

    /// Compute the IPv6 pseudo header checksum: source, destination, the
    /// 32-bit upper layer length and the next header.
    pub fn pseudo_header_v6(
        src_addr: &Ipv6Address,
        dst_addr: &Ipv6Address,
        next_header: Protocol,
        length: u32,
    ) -> u16 {
        let mut proto_len = [0u8; 8];
        proto_len[7] = next_header.into();
        NetworkEndian::write_u32(&mut proto_len[0..4], length);

        combine(&[
            data(&src_addr.octets()),
            data(&dst_addr.octets()),
            data(&proto_len[..]),
        ])
    }

    /// Compute the checksum a transport header should carry, over the pseudo
    /// header and `segment`, whose checksum field must read as zero.
    pub fn transport(src_addr: &Address, dst_addr: &Address, protocol: Protocol, segment: &[u8]) -> u16 {
        !combine(&[
            pseudo_header(src_addr, dst_addr, protocol, segment.len() as u32),
            data(segment),
        ])
    }

    /// Compute and store the checksum of the transport segment `layer` was
    /// written as. An optional checksum that computes to zero is sent as all
    /// ones, since zero means "no checksum".
    pub(crate) fn fill_transport(
        src_addr: &Address,
        dst_addr: &Address,
        protocol: Protocol,
        segment: &mut [u8],
        layer: &dyn crate::layer::TransportChecksumLayer,
    ) {
        let field = layer.checksum_offset()..layer.checksum_offset() + 2;
        segment[field.clone()].fill(0);
        let mut sum = transport(src_addr, dst_addr, protocol, segment);
        if sum == 0 && layer.is_checksum_optional() {
            sum = 0xffff;
        }
        NetworkEndian::write_u16(&mut segment[field], sum);
    }

    /// Whether `segment`, checksum field included, sums to all ones together
    /// with its pseudo header.
    pub fn verify_transport(
        src_addr: &Address,
        dst_addr: &Address,
        protocol: Protocol,
        segment: &[u8],
    ) -> bool {
        if cfg!(fuzzing) {
            return true;
        }

        combine(&[
            pseudo_header(src_addr, dst_addr, protocol, segment.len() as u32),
            data(segment),
        ]) == !0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checksum_of_zeros_is_all_ones() {
        assert_eq!(checksum::internet_checksum(&[0; 20]), 0xffff);
        assert_eq!(checksum::internet_checksum(&[]), 0xffff);
    }

    #[test]
    fn test_checksum_rfc1071_example() {
        // RFC 1071 section 3: the sum of these words is 0xddf2.
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum::data(&bytes), 0xddf2);
        assert_eq!(checksum::internet_checksum(&bytes), !0xddf2);
    }

    #[test]
    fn test_checksum_odd_length() {
        assert_eq!(checksum::data(&[0xab]), 0xab00);
        assert_eq!(checksum::data(&[0x12, 0x34, 0x56]), 0x6834);
    }

    #[test]
    fn test_checksum_carries_fold() {
        assert_eq!(checksum::data(&[0xff, 0xff, 0x00, 0x01]), 0x0001);
        assert_eq!(checksum::combine(&[0xffff, 0xffff]), 0xffff);
    }

    #[test]
    fn test_checksum_verifies_to_zero() {
        let mut bytes = [
            0x45, 0x00, 0x00, 0x1e, 0x01, 0x02, 0x62, 0x03, 0x1a, 0x01, 0x00, 0x00, 0x11, 0x12,
            0x13, 0x14, 0x21, 0x22, 0x23, 0x24,
        ];
        let sum = checksum::internet_checksum(&bytes);
        bytes[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(checksum::internet_checksum(&bytes), 0);
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(format!("{}", Protocol::Udp), "UDP");
        assert_eq!(format!("{}", Protocol::Unknown(0xfe)), "0xfe");
        assert_eq!(u8::from(Protocol::Gre), 47);
    }
}
