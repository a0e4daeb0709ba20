//! Compile-time capacities.
//!
//! Options and resource data that carry lists are stored in fixed-capacity
//! `heapless` vectors sized by the constants below. The values are the largest
//! counts the corresponding wire format can hold.

/// Addresses carried by one IPv4 route option: `(40 - 3) / 4`.
pub const IPV4_MAX_ROUTE_ADDRESSES: usize = 9;

/// 32-bit words carried by one IPv4 timestamp option: `(40 - 4) / 4`.
pub const IPV4_MAX_TIMESTAMP_ENTRIES: usize = 9;

/// Blocks carried by one TCP selective acknowledgment option: `(40 - 2) / 8`.
pub const TCP_MAX_SACK_BLOCKS: usize = 4;

/// Compression pointers followed while decoding one DNS name.
pub const DNS_MAX_POINTER_JUMPS: usize = 32;

/// Longest DNS name on the wire, in octets.
pub const DNS_MAX_NAME_LEN: usize = 255;
