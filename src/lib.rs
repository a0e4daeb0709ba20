/*! A bidirectional codec for stacked network protocol headers.

`netcodec` turns captured octets into a tree of lazily validated, zero-copy
views, and turns an ordered stack of owned layer descriptions back into a
single correctly checksummed buffer.

# Reading

A [`Buffer`] owns the captured octets, the capture [timestamp](time::Instant)
and the [data link kind](DataLinkKind) that selects the outermost header.
[`Buffer::parse`] returns a [`LinkDatagram`], the root of a tree of views
such as [`wire::EthernetDatagram`] and [`wire::Ipv4Datagram`]. Views never
copy bytes; nested views are created on first access and cached. Malformed
input never fails to parse: [`wire::Datagram::is_valid`] reports whether the
structure is sound, and every accessor remains usable on a best-effort basis.

# Writing

A [`Layer`] describes the logical fields of one header. [`PacketBuilder`]
lays out a stack of layers, writes them front to back while letting each
layer ask its neighbours for fields left on automatic (EtherType, IP
protocol, default destination), then finalizes them back to front so that
checksums and lengths cover everything written after them.

```rust
use netcodec::time::Instant;
use netcodec::wire::*;
use netcodec::{Layer, PacketBuilder, PayloadLayer};

let layers: Vec<Layer> = vec![
    EthernetLayer {
        source: EthernetAddress([0x01; 6]),
        destination: Some(EthernetAddress([0x02; 6])),
        ether_type: None,
    }
    .into(),
    Ipv4Layer {
        identification: 123,
        ttl: 100,
        source: Ipv4Address::new(1, 2, 3, 4),
        destination: Ipv4Address::new(11, 22, 33, 44),
        ..Ipv4Layer::default()
    }
    .into(),
    UdpLayer {
        source_port: 4050,
        destination_port: 25,
        ..UdpLayer::default()
    }
    .into(),
    PayloadLayer::new(b"hello world".to_vec()).into(),
];

let buffer = PacketBuilder::new(layers)
    .build(Instant::from_secs(0))
    .expect("valid stack");
assert_eq!(buffer.len(), 53);

let parsed = buffer.parse();
assert!(parsed.is_valid());
let rebuilt = PacketBuilder::new(parsed.extract_layers())
    .build(buffer.timestamp())
    .expect("extracted stack");
assert_eq!(rebuilt.data(), buffer.data());
```
*/

#![deny(unsafe_code)]

#[macro_use]
mod macros;
mod parsers;

pub mod buffer;
pub mod builder;
pub mod config;
pub mod layer;
pub mod time;
pub mod wire;

pub use self::buffer::{parse_link_layer, Buffer, DataLinkKind, LinkDatagram};
pub use self::builder::{build, BuildError, PacketBuilder};
pub use self::layer::{
    ArpPreviousLayer, EthernetNextLayer, IpNextLayer, Layer, PayloadLayer, TrailerLayer,
    TransportChecksumLayer,
};
