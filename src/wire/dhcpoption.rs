//! DHCP options, see [RFC 2132].
//!
//! Registered codes decode to typed variants; everything else is kept as
//! [DhcpOption::Any]. Text options whose value is not UTF-8 are kept the same
//! way rather than rejected.
//!
//! [RFC 2132]: https://tools.ietf.org/html/rfc2132

use super::codec::{Reader, Writer};
use super::{Ipv4Address, TlvOption, TypeRegistry};

enum_with_unknown! {
    /// DHCP option code.
    pub enum OptionCode(u8) {
        Pad                   = 0,
        SubnetMask            = 1,
        TimeOffset            = 2,
        Router                = 3,
        TimeServer            = 4,
        NameServer            = 5,
        DomainNameServer      = 6,
        LogServer             = 7,
        HostName              = 12,
        DomainName            = 15,
        InterfaceMtu          = 26,
        BroadcastAddress      = 28,
        StaticRoute           = 33,
        RequestedIpAddress    = 50,
        IpAddressLeaseTime    = 51,
        MessageType           = 53,
        ServerIdentifier      = 54,
        ParameterRequestList  = 55,
        Message               = 56,
        MaximumMessageSize    = 57,
        RenewalTime           = 58,
        RebindingTime         = 59,
        VendorClassIdentifier = 60,
        ClientIdentifier      = 61,
        End                   = 255
    }
}

enum_with_unknown! {
    /// The DHCP message type, option 53.
    pub enum MessageType(u8) {
        Discover = 1,
        Offer    = 2,
        Request  = 3,
        Decline  = 4,
        Ack      = 5,
        Nak      = 6,
        Release  = 7,
        Inform   = 8
    }
}

/// One destination and router pair of the static route option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticRoute {
    pub destination: Ipv4Address,
    pub router: Ipv4Address,
}

/// Smallest MTU an interface may announce.
const MIN_MTU: u16 = 68;
/// Smallest message size a client may announce.
const MIN_MESSAGE_SIZE: u16 = 576;

/// A DHCP option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    Pad,
    End,
    SubnetMask(Ipv4Address),
    /// Offset of the client's subnet from UTC, in seconds.
    TimeOffset(i32),
    Router(Vec<Ipv4Address>),
    TimeServer(Vec<Ipv4Address>),
    NameServer(Vec<Ipv4Address>),
    DomainNameServer(Vec<Ipv4Address>),
    LogServer(Vec<Ipv4Address>),
    HostName(String),
    DomainName(String),
    InterfaceMtu(u16),
    BroadcastAddress(Ipv4Address),
    StaticRoute(Vec<StaticRoute>),
    RequestedIpAddress(Ipv4Address),
    /// Seconds; `u32::MAX` is an infinite lease.
    IpAddressLeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Address),
    ParameterRequestList(Vec<OptionCode>),
    Message(String),
    MaximumMessageSize(u16),
    RenewalTime(u32),
    RebindingTime(u32),
    VendorClassIdentifier(Vec<u8>),
    ClientIdentifier { hardware_type: u8, data: Vec<u8> },
    Any { code: u8, data: Vec<u8> },
}

type Decoder = fn(&[u8]) -> Option<DhcpOption>;

fn decode_address(value: &[u8]) -> Option<Ipv4Address> {
    let mut reader = Reader::new(value);
    let address = reader.read_ipv4().ok()?;
    reader.finish().ok()?;
    Some(address)
}

/// A list of at least one address.
fn decode_addresses(value: &[u8]) -> Option<Vec<Ipv4Address>> {
    if value.is_empty() || value.len() % 4 != 0 {
        return None;
    }
    let mut reader = Reader::new(value);
    (0..value.len() / 4).map(|_| reader.read_ipv4().ok()).collect()
}

fn decode_u16(value: &[u8]) -> Option<u16> {
    let mut reader = Reader::new(value);
    let word = reader.read_u16().ok()?;
    reader.finish().ok()?;
    Some(word)
}

fn decode_u32(value: &[u8]) -> Option<u32> {
    let mut reader = Reader::new(value);
    let word = reader.read_u32().ok()?;
    reader.finish().ok()?;
    Some(word)
}

/// Text of at least one octet. Octets that aren't UTF-8 are kept opaque.
fn decode_text(code: u8, value: &[u8], text: fn(String) -> DhcpOption) -> Option<DhcpOption> {
    if value.is_empty() {
        return None;
    }
    Some(match core::str::from_utf8(value) {
        Ok(string) => text(string.to_owned()),
        Err(_) => DhcpOption::Any {
            code,
            data: value.to_vec(),
        },
    })
}

fn decode_static_routes(value: &[u8]) -> Option<DhcpOption> {
    if value.is_empty() || value.len() % 8 != 0 {
        return None;
    }
    let mut reader = Reader::new(value);
    let routes = (0..value.len() / 8)
        .map(|_| {
            Some(StaticRoute {
                destination: reader.read_ipv4().ok()?,
                router: reader.read_ipv4().ok()?,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(DhcpOption::StaticRoute(routes))
}

fn decode_message_type(value: &[u8]) -> Option<DhcpOption> {
    match value {
        [kind] => Some(DhcpOption::MessageType(MessageType::from(*kind))),
        _ => None,
    }
}

fn decode_client_identifier(value: &[u8]) -> Option<DhcpOption> {
    match value {
        [hardware_type, data @ ..] if !data.is_empty() => Some(DhcpOption::ClientIdentifier {
            hardware_type: *hardware_type,
            data: data.to_vec(),
        }),
        _ => None,
    }
}

static DECODERS: TypeRegistry<OptionCode, Decoder> = TypeRegistry::new(&[
    (1, (|value: &[u8]| decode_address(value).map(DhcpOption::SubnetMask)) as Decoder),
    (2, (|value: &[u8]| decode_u32(value).map(|word| DhcpOption::TimeOffset(word as i32))) as Decoder),
    (3, (|value: &[u8]| decode_addresses(value).map(DhcpOption::Router)) as Decoder),
    (4, (|value: &[u8]| decode_addresses(value).map(DhcpOption::TimeServer)) as Decoder),
    (5, (|value: &[u8]| decode_addresses(value).map(DhcpOption::NameServer)) as Decoder),
    (6, (|value: &[u8]| decode_addresses(value).map(DhcpOption::DomainNameServer)) as Decoder),
    (7, (|value: &[u8]| decode_addresses(value).map(DhcpOption::LogServer)) as Decoder),
    (12, (|value: &[u8]| decode_text(12, value, DhcpOption::HostName)) as Decoder),
    (15, (|value: &[u8]| decode_text(15, value, DhcpOption::DomainName)) as Decoder),
    (
        26,
        (|value: &[u8]| {
            decode_u16(value)
                .filter(|mtu| *mtu >= MIN_MTU)
                .map(DhcpOption::InterfaceMtu)
        }) as Decoder,
    ),
    (28, (|value: &[u8]| decode_address(value).map(DhcpOption::BroadcastAddress)) as Decoder),
    (33, decode_static_routes as Decoder),
    (50, (|value: &[u8]| decode_address(value).map(DhcpOption::RequestedIpAddress)) as Decoder),
    (51, (|value: &[u8]| decode_u32(value).map(DhcpOption::IpAddressLeaseTime)) as Decoder),
    (53, decode_message_type as Decoder),
    (54, (|value: &[u8]| decode_address(value).map(DhcpOption::ServerIdentifier)) as Decoder),
    (
        55,
        (|value: &[u8]| {
            (!value.is_empty()).then(|| {
                DhcpOption::ParameterRequestList(value.iter().copied().map(OptionCode::from).collect())
            })
        }) as Decoder,
    ),
    (56, (|value: &[u8]| decode_text(56, value, DhcpOption::Message)) as Decoder),
    (
        57,
        (|value: &[u8]| {
            decode_u16(value)
                .filter(|size| *size >= MIN_MESSAGE_SIZE)
                .map(DhcpOption::MaximumMessageSize)
        }) as Decoder,
    ),
    (58, (|value: &[u8]| decode_u32(value).map(DhcpOption::RenewalTime)) as Decoder),
    (59, (|value: &[u8]| decode_u32(value).map(DhcpOption::RebindingTime)) as Decoder),
    (
        60,
        (|value: &[u8]| (!value.is_empty()).then(|| DhcpOption::VendorClassIdentifier(value.to_vec())))
            as Decoder,
    ),
    (61, decode_client_identifier as Decoder),
]);

impl DhcpOption {
    pub fn option_code(&self) -> OptionCode {
        OptionCode::from(self.code())
    }
}

impl TlvOption for DhcpOption {
    const END: u8 = 255;
    const NOP: u8 = 0;
    const LENGTH_INCLUDES_HEADER: bool = false;
    const ALIGNMENT: usize = 1;
    const MAX_LEN: usize = super::dhcp::MAX_OPTIONS_LEN;
    const NAME: &'static str = "DHCP options";

    fn end() -> Self {
        DhcpOption::End
    }

    fn nop() -> Self {
        DhcpOption::Pad
    }

    fn code(&self) -> u8 {
        match self {
            DhcpOption::Pad => 0,
            DhcpOption::SubnetMask(_) => 1,
            DhcpOption::TimeOffset(_) => 2,
            DhcpOption::Router(_) => 3,
            DhcpOption::TimeServer(_) => 4,
            DhcpOption::NameServer(_) => 5,
            DhcpOption::DomainNameServer(_) => 6,
            DhcpOption::LogServer(_) => 7,
            DhcpOption::HostName(_) => 12,
            DhcpOption::DomainName(_) => 15,
            DhcpOption::InterfaceMtu(_) => 26,
            DhcpOption::BroadcastAddress(_) => 28,
            DhcpOption::StaticRoute(_) => 33,
            DhcpOption::RequestedIpAddress(_) => 50,
            DhcpOption::IpAddressLeaseTime(_) => 51,
            DhcpOption::MessageType(_) => 53,
            DhcpOption::ServerIdentifier(_) => 54,
            DhcpOption::ParameterRequestList(_) => 55,
            DhcpOption::Message(_) => 56,
            DhcpOption::MaximumMessageSize(_) => 57,
            DhcpOption::RenewalTime(_) => 58,
            DhcpOption::RebindingTime(_) => 59,
            DhcpOption::VendorClassIdentifier(_) => 60,
            DhcpOption::ClientIdentifier { .. } => 61,
            DhcpOption::End => 255,
            DhcpOption::Any { code, .. } => *code,
        }
    }

    /// Long values may be split over several copies of an option (RFC 3396).
    fn is_once_only(&self) -> bool {
        false
    }

    fn value_len(&self) -> usize {
        match self {
            DhcpOption::Pad | DhcpOption::End => 0,
            DhcpOption::SubnetMask(_)
            | DhcpOption::BroadcastAddress(_)
            | DhcpOption::RequestedIpAddress(_)
            | DhcpOption::ServerIdentifier(_)
            | DhcpOption::TimeOffset(_)
            | DhcpOption::IpAddressLeaseTime(_)
            | DhcpOption::RenewalTime(_)
            | DhcpOption::RebindingTime(_) => 4,
            DhcpOption::InterfaceMtu(_) | DhcpOption::MaximumMessageSize(_) => 2,
            DhcpOption::MessageType(_) => 1,
            DhcpOption::Router(addresses)
            | DhcpOption::TimeServer(addresses)
            | DhcpOption::NameServer(addresses)
            | DhcpOption::DomainNameServer(addresses)
            | DhcpOption::LogServer(addresses) => 4 * addresses.len(),
            DhcpOption::HostName(text) | DhcpOption::DomainName(text) | DhcpOption::Message(text) => {
                text.len()
            }
            DhcpOption::StaticRoute(routes) => 8 * routes.len(),
            DhcpOption::ParameterRequestList(codes) => codes.len(),
            DhcpOption::ClientIdentifier { data, .. } => 1 + data.len(),
            DhcpOption::VendorClassIdentifier(data) | DhcpOption::Any { data, .. } => data.len(),
        }
    }

    fn decode(code: u8, value: &[u8]) -> Option<Self> {
        match DECODERS.get_raw(code) {
            Some(decode) => decode(value),
            None => Some(DhcpOption::Any {
                code,
                data: value.to_vec(),
            }),
        }
    }

    fn emit_value(&self, writer: &mut Writer) {
        match self {
            DhcpOption::Pad | DhcpOption::End => {}
            DhcpOption::SubnetMask(address)
            | DhcpOption::BroadcastAddress(address)
            | DhcpOption::RequestedIpAddress(address)
            | DhcpOption::ServerIdentifier(address) => writer.write_ipv4(*address),
            DhcpOption::TimeOffset(offset) => writer.write_i32(*offset),
            DhcpOption::IpAddressLeaseTime(secs)
            | DhcpOption::RenewalTime(secs)
            | DhcpOption::RebindingTime(secs) => writer.write_u32(*secs),
            DhcpOption::InterfaceMtu(word) | DhcpOption::MaximumMessageSize(word) => {
                writer.write_u16(*word)
            }
            DhcpOption::MessageType(kind) => writer.write_u8((*kind).into()),
            DhcpOption::Router(addresses)
            | DhcpOption::TimeServer(addresses)
            | DhcpOption::NameServer(addresses)
            | DhcpOption::DomainNameServer(addresses)
            | DhcpOption::LogServer(addresses) => {
                for address in addresses {
                    writer.write_ipv4(*address);
                }
            }
            DhcpOption::HostName(text) | DhcpOption::DomainName(text) | DhcpOption::Message(text) => {
                writer.write_bytes(text.as_bytes())
            }
            DhcpOption::StaticRoute(routes) => {
                for route in routes {
                    writer.write_ipv4(route.destination);
                    writer.write_ipv4(route.router);
                }
            }
            DhcpOption::ParameterRequestList(codes) => {
                for code in codes {
                    writer.write_u8((*code).into());
                }
            }
            DhcpOption::ClientIdentifier {
                hardware_type,
                data,
            } => {
                writer.write_u8(*hardware_type);
                writer.write_bytes(data);
            }
            DhcpOption::VendorClassIdentifier(data) | DhcpOption::Any { data, .. } => {
                writer.write_bytes(data)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Options;

    static OPTION_BYTES: [u8; 27] = [
        0x35, 0x01, 0x01, 0x3d, 0x07, 0x01, 0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42, 0x37, 0x04,
        0x01, 0x03, 0x06, 0x0f, 0x00, 0xfa, 0x02, 0xab, 0xcd, 0xff, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_parse() {
        let options = Options::<DhcpOption>::parse(&OPTION_BYTES);
        assert!(options.is_valid());
        assert_eq!(options.buffer_len(), 27);
        assert_eq!(
            options.as_slice(),
            &[
                DhcpOption::MessageType(MessageType::Discover),
                DhcpOption::ClientIdentifier {
                    hardware_type: 1,
                    data: vec![0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42]
                },
                DhcpOption::ParameterRequestList(vec![
                    OptionCode::SubnetMask,
                    OptionCode::Router,
                    OptionCode::DomainNameServer,
                    OptionCode::DomainName
                ]),
                DhcpOption::Pad,
                DhcpOption::Any {
                    code: 0xfa,
                    data: vec![0xab, 0xcd]
                },
                DhcpOption::End,
            ]
        );
    }

    #[test]
    fn test_emit() {
        let options = Options::new(vec![
            DhcpOption::MessageType(MessageType::Discover),
            DhcpOption::ClientIdentifier {
                hardware_type: 1,
                data: vec![0x00, 0x0b, 0x82, 0x01, 0xfc, 0x42],
            },
            DhcpOption::ParameterRequestList(vec![
                OptionCode::SubnetMask,
                OptionCode::Router,
                OptionCode::DomainNameServer,
                OptionCode::DomainName,
            ]),
            DhcpOption::Pad,
            DhcpOption::Any {
                code: 0xfa,
                data: vec![0xab, 0xcd],
            },
            DhcpOption::End,
        ])
        .unwrap();
        assert_eq!(options.buffer_len(), 24);
        let mut bytes = [0xa5; 24];
        options.emit(&mut bytes);
        assert_eq!(bytes, OPTION_BYTES[..24]);
    }

    #[test]
    fn test_repeated_options() {
        let bytes = [0x0c, 0x02, b'a', b'b', 0x0c, 0x01, b'c', 0xff];
        let options = Options::<DhcpOption>::parse(&bytes);
        assert!(options.is_valid());
        assert_eq!(options.len(), 3);
        assert_eq!(options.find(12), Some(&DhcpOption::HostName("ab".into())));
    }

    #[test]
    fn test_non_utf8_text() {
        let bytes = [0x0f, 0x02, 0xc3, 0x28, 0xff];
        let options = Options::<DhcpOption>::parse(&bytes);
        assert!(options.is_valid());
        assert_eq!(
            options.find(15),
            Some(&DhcpOption::Any {
                code: 15,
                data: vec![0xc3, 0x28]
            })
        );
    }

    #[test]
    fn test_malformed_values() {
        // Address list not a multiple of four.
        assert!(!Options::<DhcpOption>::parse(&[0x03, 0x03, 0x0a, 0x00, 0x00, 0xff]).is_valid());
        // MTU below 68.
        assert!(!Options::<DhcpOption>::parse(&[0x1a, 0x02, 0x00, 0x20, 0xff]).is_valid());
        // Message type of two octets.
        assert!(!Options::<DhcpOption>::parse(&[0x35, 0x02, 0x01, 0x01, 0xff]).is_valid());
        // Length overruns the area.
        assert!(!Options::<DhcpOption>::parse(&[0x35, 0x05, 0x01]).is_valid());
    }

    #[test]
    fn test_static_route() {
        let bytes = [
            0x21, 0x08, 0x0a, 0x00, 0x00, 0x00, 0xc0, 0xa8, 0x01, 0x01, 0xff,
        ];
        let options = Options::<DhcpOption>::parse(&bytes);
        assert_eq!(
            options.find(33),
            Some(&DhcpOption::StaticRoute(vec![StaticRoute {
                destination: Ipv4Address::new(10, 0, 0, 0),
                router: Ipv4Address::new(192, 168, 1, 1),
            }]))
        );
    }

    #[test]
    fn test_value_too_long() {
        let option = DhcpOption::VendorClassIdentifier(vec![0; 256]);
        assert!(Options::new(vec![option]).is_err());
    }
}
