//! The option area of an IPv4 header.
//!
//! Every kind is registered in a [TypeRegistry] from its type code to its
//! decoder; unregistered codes are kept verbatim as [Ipv4Option::Unknown].

use heapless::Vec as HVec;

use super::codec::{Reader, Writer};
use super::{Ipv4Address as Address, TlvOption, TypeRegistry};
use crate::builder::BuildError;
use crate::config::{IPV4_MAX_ROUTE_ADDRESSES, IPV4_MAX_TIMESTAMP_ENTRIES};

enum_with_unknown! {
    /// IPv4 option type.
    pub enum OptionType(u8) {
        End               = 0,
        Nop               = 1,
        RecordRoute       = 7,
        QuickStart        = 25,
        Timestamp         = 68,
        TraceRoute        = 82,
        Security          = 130,
        LooseSourceRoute  = 131,
        StreamId          = 136,
        StrictSourceRoute = 137,
        RouterAlert       = 148
    }
}

enum_with_unknown! {
    /// Classification level of the basic security option (RFC 791).
    pub enum SecurityLevel(u16) {
        Unclassified = 0x0000,
        Confidential = 0xf135,
        Efto         = 0x789a,
        Mmmm         = 0xbc4d,
        Prog         = 0x5e26,
        Restricted   = 0xaf13,
        Secret       = 0xd788,
        TopSecret    = 0x6bc5
    }
}

/// The security option: level, compartments, handling restrictions and a
/// 24-bit transmission control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Security {
    pub level: SecurityLevel,
    pub compartments: u16,
    pub handling_restrictions: u16,
    /// Only the low 24 bits are carried.
    pub transmission_control_code: u32,
}

impl Security {
    const VALUE_LEN: usize = 9;

    fn decode(value: &[u8]) -> Option<Security> {
        let mut reader = Reader::new(value);
        let security = Security {
            level: SecurityLevel::from(reader.read_u16().ok()?),
            compartments: reader.read_u16().ok()?,
            handling_restrictions: reader.read_u16().ok()?,
            transmission_control_code: reader.read_u24().ok()?,
        };
        reader.finish().ok()?;
        Some(security)
    }

    fn emit_value(&self, writer: &mut Writer) {
        writer.write_u16(self.level.into());
        writer.write_u16(self.compartments);
        writer.write_u16(self.handling_restrictions);
        writer.write_u24(self.transmission_control_code & 0x00ff_ffff);
    }
}

/// A list of addresses with a pointer to the next one to process, shared by
/// the record route and the source route options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    addresses: HVec<Address, IPV4_MAX_ROUTE_ADDRESSES>,
    pointed_index: u8,
}

impl Route {
    /// Largest index the one-octet pointer can designate.
    pub const MAX_POINTED_INDEX: u8 = 62;

    pub fn new(addresses: &[Address], pointed_index: u8) -> Result<Route, BuildError> {
        BuildError::check_range("route pointed index", pointed_index, Self::MAX_POINTED_INDEX)?;
        let addresses = HVec::from_slice(addresses).map_err(|()| BuildError::TooLong {
            what: "route addresses",
            len: addresses.len(),
            max: IPV4_MAX_ROUTE_ADDRESSES,
        })?;
        Ok(Route {
            addresses,
            pointed_index,
        })
    }

    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// The index, in addresses, of the next address to process.
    pub const fn pointed_index(&self) -> u8 {
        self.pointed_index
    }

    fn decode(value: &[u8]) -> Option<Route> {
        let mut reader = Reader::new(value);
        let pointer = reader.read_u8().ok()?;
        if pointer % 4 != 0 || pointer < 4 || reader.remaining() % 4 != 0 {
            return None;
        }
        let mut addresses = HVec::new();
        while !reader.is_empty() {
            addresses.push(reader.read_ipv4().ok()?).ok()?;
        }
        Some(Route {
            addresses,
            pointed_index: pointer / 4 - 1,
        })
    }

    fn value_len(&self) -> usize {
        1 + 4 * self.addresses.len()
    }

    fn emit_value(&self, writer: &mut Writer) {
        writer.write_u8(4 + 4 * self.pointed_index);
        for address in &self.addresses {
            writer.write_ipv4(*address);
        }
    }
}

const MAX_TIMESTAMP_PAIRS: usize = IPV4_MAX_TIMESTAMP_ENTRIES / 2;

/// The entries of a timestamp option. Times are milliseconds since midnight
/// UT, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampValues {
    TimestampOnly(HVec<u32, IPV4_MAX_TIMESTAMP_ENTRIES>),
    AddressAndTimestamp(HVec<(Address, u32), MAX_TIMESTAMP_PAIRS>),
    AddressPrespecified(HVec<(Address, u32), MAX_TIMESTAMP_PAIRS>),
}

impl TimestampValues {
    pub fn timestamp_only(times: &[u32]) -> Result<TimestampValues, BuildError> {
        HVec::from_slice(times)
            .map(TimestampValues::TimestampOnly)
            .map_err(|()| BuildError::TooLong {
                what: "timestamp entries",
                len: times.len(),
                max: IPV4_MAX_TIMESTAMP_ENTRIES,
            })
    }

    pub fn address_and_timestamp(entries: &[(Address, u32)]) -> Result<TimestampValues, BuildError> {
        Self::pairs(entries).map(TimestampValues::AddressAndTimestamp)
    }

    pub fn address_prespecified(entries: &[(Address, u32)]) -> Result<TimestampValues, BuildError> {
        Self::pairs(entries).map(TimestampValues::AddressPrespecified)
    }

    fn pairs(entries: &[(Address, u32)]) -> Result<HVec<(Address, u32), MAX_TIMESTAMP_PAIRS>, BuildError> {
        HVec::from_slice(entries).map_err(|()| BuildError::TooLong {
            what: "timestamp entries",
            len: entries.len(),
            max: MAX_TIMESTAMP_PAIRS,
        })
    }

    /// The flag nibble selecting the entry layout.
    pub const fn flag(&self) -> u8 {
        match self {
            TimestampValues::TimestampOnly(_) => 0,
            TimestampValues::AddressAndTimestamp(_) => 1,
            TimestampValues::AddressPrespecified(_) => 3,
        }
    }

    fn len(&self) -> usize {
        match self {
            TimestampValues::TimestampOnly(times) => 4 * times.len(),
            TimestampValues::AddressAndTimestamp(pairs)
            | TimestampValues::AddressPrespecified(pairs) => 8 * pairs.len(),
        }
    }
}

/// The internet timestamp option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamp {
    overflow: u8,
    pointed_index: u8,
    values: TimestampValues,
}

impl Timestamp {
    pub const MAX_OVERFLOW: u8 = 15;
    pub const MAX_POINTED_INDEX: u8 = 62;

    pub fn new(
        overflow: u8,
        pointed_index: u8,
        values: TimestampValues,
    ) -> Result<Timestamp, BuildError> {
        BuildError::check_range("timestamp overflow", overflow, Self::MAX_OVERFLOW)?;
        BuildError::check_range("timestamp pointed index", pointed_index, Self::MAX_POINTED_INDEX)?;
        Ok(Timestamp {
            overflow,
            pointed_index,
            values,
        })
    }

    /// The number of hosts that could not register a timestamp.
    pub const fn overflow(&self) -> u8 {
        self.overflow
    }

    pub const fn pointed_index(&self) -> u8 {
        self.pointed_index
    }

    pub const fn values(&self) -> &TimestampValues {
        &self.values
    }

    fn decode(value: &[u8]) -> Option<Timestamp> {
        // The option length, value plus two, is a positive multiple of four.
        if value.len() < 2 || (value.len() + 2) % 4 != 0 {
            return None;
        }
        let mut reader = Reader::new(value);
        let pointer = reader.read_u8().ok()?;
        if pointer % 4 != 1 || pointer < 5 {
            return None;
        }
        let flags = reader.read_u8().ok()?;

        let values = match flags & 0x0f {
            0 => {
                let mut times = HVec::new();
                while !reader.is_empty() {
                    times.push(reader.read_u32().ok()?).ok()?;
                }
                TimestampValues::TimestampOnly(times)
            }
            flag @ (1 | 3) => {
                if reader.remaining() % 8 != 0 {
                    return None;
                }
                let mut pairs = HVec::new();
                while !reader.is_empty() {
                    let address = reader.read_ipv4().ok()?;
                    let time = reader.read_u32().ok()?;
                    pairs.push((address, time)).ok()?;
                }
                if flag == 1 {
                    TimestampValues::AddressAndTimestamp(pairs)
                } else {
                    TimestampValues::AddressPrespecified(pairs)
                }
            }
            _ => return None,
        };

        Some(Timestamp {
            overflow: flags >> 4,
            pointed_index: pointer / 4 - 1,
            values,
        })
    }

    fn value_len(&self) -> usize {
        2 + self.values.len()
    }

    fn emit_value(&self, writer: &mut Writer) {
        writer.write_u8(5 + 4 * self.pointed_index);
        writer.write_u8((self.overflow << 4) | self.values.flag());
        match &self.values {
            TimestampValues::TimestampOnly(times) => {
                for time in times {
                    writer.write_u32(*time);
                }
            }
            TimestampValues::AddressAndTimestamp(pairs)
            | TimestampValues::AddressPrespecified(pairs) => {
                for (address, time) in pairs {
                    writer.write_ipv4(*address);
                    writer.write_u32(*time);
                }
            }
        }
    }
}

/// Function of a quick-start option (RFC 4782).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuickStartFunction {
    RateRequest,
    RateReport,
}

impl QuickStartFunction {
    const fn nibble(self) -> u8 {
        match self {
            QuickStartFunction::RateRequest => 0x00,
            QuickStartFunction::RateReport => 0x80,
        }
    }
}

/// The quick-start option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickStart {
    function: QuickStartFunction,
    rate: u8,
    ttl: u8,
    nonce: u32,
}

impl QuickStart {
    pub const MAX_RATE: u8 = 0x0f;
    pub const MAX_NONCE: u32 = 0x3fff_ffff;
    const VALUE_LEN: usize = 6;

    pub fn new(
        function: QuickStartFunction,
        rate: u8,
        ttl: u8,
        nonce: u32,
    ) -> Result<QuickStart, BuildError> {
        BuildError::check_range("quick-start rate", rate, Self::MAX_RATE)?;
        BuildError::check_range("quick-start nonce", nonce, Self::MAX_NONCE)?;
        Ok(QuickStart {
            function,
            rate,
            ttl,
            nonce,
        })
    }

    pub const fn function(&self) -> QuickStartFunction {
        self.function
    }

    pub const fn rate(&self) -> u8 {
        self.rate
    }

    /// The requested or reported rate, in kilobits per second.
    pub const fn rate_kbps(&self) -> u32 {
        if self.rate == 0 { 0 } else { 40 << self.rate }
    }

    pub const fn ttl(&self) -> u8 {
        self.ttl
    }

    /// The 30-bit nonce.
    pub const fn nonce(&self) -> u32 {
        self.nonce
    }

    fn decode(value: &[u8]) -> Option<QuickStart> {
        let mut reader = Reader::new(value);
        let function_rate = reader.read_u8().ok()?;
        let function = match function_rate & 0xf0 {
            0x00 => QuickStartFunction::RateRequest,
            0x80 => QuickStartFunction::RateReport,
            _ => return None,
        };
        let ttl = reader.read_u8().ok()?;
        let nonce = reader.read_u32().ok()?;
        reader.finish().ok()?;
        if nonce & 0x03 != 0 {
            return None;
        }
        Some(QuickStart {
            function,
            rate: function_rate & 0x0f,
            ttl,
            nonce: nonce >> 2,
        })
    }

    fn emit_value(&self, writer: &mut Writer) {
        writer.write_u8(self.function.nibble() | self.rate);
        writer.write_u8(self.ttl);
        writer.write_u32(self.nonce << 2);
    }
}

/// The traceroute option (RFC 1393).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRoute {
    pub identification: u16,
    pub outbound_hop_count: u16,
    pub return_hop_count: u16,
    pub originator: Address,
}

impl TraceRoute {
    const VALUE_LEN: usize = 10;

    fn decode(value: &[u8]) -> Option<TraceRoute> {
        let mut reader = Reader::new(value);
        let trace_route = TraceRoute {
            identification: reader.read_u16().ok()?,
            outbound_hop_count: reader.read_u16().ok()?,
            return_hop_count: reader.read_u16().ok()?,
            originator: reader.read_ipv4().ok()?,
        };
        reader.finish().ok()?;
        Some(trace_route)
    }
}

/// One IPv4 header option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ipv4Option {
    End,
    Nop,
    Security(Security),
    LooseSourceRoute(Route),
    StrictSourceRoute(Route),
    RecordRoute(Route),
    StreamId(u16),
    Timestamp(Timestamp),
    RouterAlert(u16),
    QuickStart(QuickStart),
    TraceRoute(TraceRoute),
    Unknown { kind: u8, data: Vec<u8> },
}

type Decoder = fn(&[u8]) -> Option<Ipv4Option>;

fn decode_u16(value: &[u8]) -> Option<u16> {
    let mut reader = Reader::new(value);
    let word = reader.read_u16().ok()?;
    reader.finish().ok()?;
    Some(word)
}

static DECODERS: TypeRegistry<OptionType, Decoder> = TypeRegistry::new(&[
    (7, (|value: &[u8]| Route::decode(value).map(Ipv4Option::RecordRoute)) as Decoder),
    (25, (|value: &[u8]| QuickStart::decode(value).map(Ipv4Option::QuickStart)) as Decoder),
    (68, (|value: &[u8]| Timestamp::decode(value).map(Ipv4Option::Timestamp)) as Decoder),
    (82, (|value: &[u8]| TraceRoute::decode(value).map(Ipv4Option::TraceRoute)) as Decoder),
    (130, (|value: &[u8]| Security::decode(value).map(Ipv4Option::Security)) as Decoder),
    (131, (|value: &[u8]| Route::decode(value).map(Ipv4Option::LooseSourceRoute)) as Decoder),
    (136, (|value: &[u8]| decode_u16(value).map(Ipv4Option::StreamId)) as Decoder),
    (137, (|value: &[u8]| Route::decode(value).map(Ipv4Option::StrictSourceRoute)) as Decoder),
    (148, (|value: &[u8]| decode_u16(value).map(Ipv4Option::RouterAlert)) as Decoder),
]);

impl Ipv4Option {
    pub fn option_type(&self) -> OptionType {
        OptionType::from(self.code())
    }
}

impl TlvOption for Ipv4Option {
    const END: u8 = 0;
    const NOP: u8 = 1;
    const LENGTH_INCLUDES_HEADER: bool = true;
    const ALIGNMENT: usize = 4;
    const MAX_LEN: usize = super::IPV4_MAX_OPTIONS_LEN;
    const NAME: &'static str = "IPv4 options";

    fn end() -> Self {
        Ipv4Option::End
    }

    fn nop() -> Self {
        Ipv4Option::Nop
    }

    fn code(&self) -> u8 {
        match self {
            Ipv4Option::End => 0,
            Ipv4Option::Nop => 1,
            Ipv4Option::RecordRoute(_) => 7,
            Ipv4Option::QuickStart(_) => 25,
            Ipv4Option::Timestamp(_) => 68,
            Ipv4Option::TraceRoute(_) => 82,
            Ipv4Option::Security(_) => 130,
            Ipv4Option::LooseSourceRoute(_) => 131,
            Ipv4Option::StreamId(_) => 136,
            Ipv4Option::StrictSourceRoute(_) => 137,
            Ipv4Option::RouterAlert(_) => 148,
            Ipv4Option::Unknown { kind, .. } => *kind,
        }
    }

    fn is_once_only(&self) -> bool {
        !matches!(
            self,
            Ipv4Option::End | Ipv4Option::Nop | Ipv4Option::Unknown { .. }
        )
    }

    fn value_len(&self) -> usize {
        match self {
            Ipv4Option::End | Ipv4Option::Nop => 0,
            Ipv4Option::Security(_) => Security::VALUE_LEN,
            Ipv4Option::LooseSourceRoute(route)
            | Ipv4Option::StrictSourceRoute(route)
            | Ipv4Option::RecordRoute(route) => route.value_len(),
            Ipv4Option::StreamId(_) | Ipv4Option::RouterAlert(_) => 2,
            Ipv4Option::Timestamp(timestamp) => timestamp.value_len(),
            Ipv4Option::QuickStart(_) => QuickStart::VALUE_LEN,
            Ipv4Option::TraceRoute(_) => TraceRoute::VALUE_LEN,
            Ipv4Option::Unknown { data, .. } => data.len(),
        }
    }

    fn decode(code: u8, value: &[u8]) -> Option<Self> {
        match DECODERS.get_raw(code) {
            Some(decode) => decode(value),
            None => Some(Ipv4Option::Unknown {
                kind: code,
                data: value.to_vec(),
            }),
        }
    }

    fn emit_value(&self, writer: &mut Writer) {
        match self {
            Ipv4Option::End | Ipv4Option::Nop => {}
            Ipv4Option::Security(security) => security.emit_value(writer),
            Ipv4Option::LooseSourceRoute(route)
            | Ipv4Option::StrictSourceRoute(route)
            | Ipv4Option::RecordRoute(route) => route.emit_value(writer),
            Ipv4Option::StreamId(word) | Ipv4Option::RouterAlert(word) => writer.write_u16(*word),
            Ipv4Option::Timestamp(timestamp) => timestamp.emit_value(writer),
            Ipv4Option::QuickStart(quick_start) => quick_start.emit_value(writer),
            Ipv4Option::TraceRoute(trace_route) => {
                writer.write_u16(trace_route.identification);
                writer.write_u16(trace_route.outbound_hop_count);
                writer.write_u16(trace_route.return_hop_count);
                writer.write_ipv4(trace_route.originator);
            }
            Ipv4Option::Unknown { data, .. } => writer.write_bytes(data),
        }
    }
}
