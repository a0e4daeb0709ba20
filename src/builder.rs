//! Serialization of layer stacks.
//!
//! Building runs in two passes over one zeroed buffer sized to the sum of the
//! layer lengths. The first pass writes every header front to back; a layer
//! may consult its neighbours for the fields left on automatic. The second
//! pass runs back to front and completes the fields that cover later layers,
//! such as checksums, once everything after them is in place.

use crate::buffer::{Buffer, DataLinkKind};
use crate::layer::{Layer, Neighbours};
use crate::time::Instant;

/// A layer stack that cannot be serialized as asked.
///
/// These are mistakes in the stack handed to the builder, not properties of
/// untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no layers to build")]
    EmptyStack,
    #[error("a packet can't start with a {layer} layer")]
    NoDataLink { layer: &'static str },
    #[error("{layer} layer needs a next layer to derive its {field}")]
    MissingNextLayer {
        layer: &'static str,
        field: &'static str,
    },
    #[error("{layer} layer needs a previous layer to derive its {field}")]
    MissingPreviousLayer {
        layer: &'static str,
        field: &'static str,
    },
    #[error("{layer} layer can't derive its {field} from a {neighbour} layer")]
    Unsupported {
        layer: &'static str,
        field: &'static str,
        neighbour: &'static str,
    },
    #[error("{what} takes {len} octets, more than the {max} allowed")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} is {value}, more than the {max} allowed")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("{what}")]
    Mismatch { what: &'static str },
}

impl BuildError {
    /// Fail with [OutOfRange](BuildError::OutOfRange) if `value` exceeds `max`.
    pub(crate) fn check_range(
        field: &'static str,
        value: impl Into<u64>,
        max: impl Into<u64>,
    ) -> Result<(), BuildError> {
        let (value, max) = (value.into(), max.into());
        if value > max {
            Err(BuildError::OutOfRange { field, value, max })
        } else {
            Ok(())
        }
    }

    /// Fail with [TooLong](BuildError::TooLong) if `len` exceeds `max`.
    pub(crate) fn check_len(what: &'static str, len: usize, max: usize) -> Result<(), BuildError> {
        if len > max {
            Err(BuildError::TooLong { what, len, max })
        } else {
            Ok(())
        }
    }
}

/// A stack of layers waiting to be serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketBuilder {
    layers: Vec<Layer>,
}

impl PacketBuilder {
    pub fn new(layers: Vec<Layer>) -> PacketBuilder {
        PacketBuilder { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The data link kind of the packets this stack builds, if it has one.
    pub fn data_link(&self) -> Option<DataLinkKind> {
        self.layers.first().and_then(Layer::data_link)
    }

    /// Serialize the stack into a buffer stamped with `timestamp`.
    pub fn build(&self, timestamp: Instant) -> Result<Buffer, BuildError> {
        build(timestamp, &self.layers)
    }
}

impl From<Vec<Layer>> for PacketBuilder {
    fn from(layers: Vec<Layer>) -> Self {
        PacketBuilder::new(layers)
    }
}

/// Serialize `layers`, outermost first, into a buffer stamped with `timestamp`.
pub fn build(timestamp: Instant, layers: &[Layer]) -> Result<Buffer, BuildError> {
    let first = layers.first().ok_or(BuildError::EmptyStack)?;
    let data_link = first
        .data_link()
        .ok_or(BuildError::NoDataLink { layer: first.name() })?;

    let (last, inner) = layers.split_last().ok_or(BuildError::EmptyStack)?;
    if inner.iter().any(|layer| matches!(layer, Layer::Trailer(_))) {
        return Err(BuildError::Mismatch {
            what: "a trailer must be the last layer",
        });
    }
    let trailer_len = match last {
        Layer::Trailer(trailer) => trailer.buffer_len(),
        _ => 0,
    };

    let lengths: Vec<usize> = layers.iter().map(Layer::buffer_len).collect();
    let total_len: usize = lengths.iter().sum();
    // the trailer counts toward the buffer but not toward any payload
    let payload_end = total_len - trailer_len;
    let mut data = vec![0; total_len];
    net_trace!(
        "building {} layers into {} octets at {}",
        layers.len(),
        total_len,
        timestamp
    );

    let neighbours = |index: usize| Neighbours {
        previous: index.checked_sub(1).and_then(|index| layers.get(index)),
        next: layers.get(index + 1),
    };

    let mut offset = 0;
    for (index, layer) in layers.iter().enumerate() {
        let len = lengths[index];
        let payload_len = payload_end.saturating_sub(offset + len);
        net_trace!(
            "writing {} layer at {}: {} octets, {} after",
            layer.name(),
            offset,
            len,
            payload_len
        );
        layer.emit(&mut data[offset..offset + len], payload_len, &neighbours(index))?;
        offset += len;
    }

    for (index, layer) in layers.iter().enumerate().rev() {
        let len = lengths[index];
        offset -= len;
        let payload_len = payload_end.saturating_sub(offset + len);
        layer.finalize(&mut data[offset..], payload_len, &neighbours(index))?;
    }

    Ok(Buffer::new(data, timestamp, data_link))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{PayloadLayer, TrailerLayer};
    use crate::wire::{EtherType, EthernetAddress, EthernetLayer, Ipv4Layer, UdpLayer};

    #[test]
    fn test_empty_stack() {
        assert_eq!(build(Instant::ZERO, &[]), Err(BuildError::EmptyStack));
    }

    #[test]
    fn test_no_data_link() {
        let layers = [Layer::from(UdpLayer::default())];
        assert_eq!(
            build(Instant::ZERO, &layers),
            Err(BuildError::NoDataLink { layer: "UDP" })
        );
    }

    #[test]
    fn test_auto_ether_type_without_next_layer() {
        let layers = [Layer::from(EthernetLayer {
            source: EthernetAddress([1; 6]),
            destination: Some(EthernetAddress([2; 6])),
            ether_type: None,
        })];
        assert_eq!(
            build(Instant::ZERO, &layers),
            Err(BuildError::MissingNextLayer {
                layer: "Ethernet",
                field: "EtherType"
            })
        );
    }

    #[test]
    fn test_auto_ether_type_from_payload() {
        let layers = [
            Layer::from(EthernetLayer {
                source: EthernetAddress([1; 6]),
                destination: None,
                ether_type: None,
            }),
            Layer::from(PayloadLayer::new(vec![0xaa])),
        ];
        assert_eq!(
            build(Instant::ZERO, &layers),
            Err(BuildError::Unsupported {
                layer: "Ethernet",
                field: "EtherType",
                neighbour: "payload"
            })
        );
    }

    #[test]
    fn test_explicit_ether_type() {
        let builder = PacketBuilder::new(vec![
            EthernetLayer {
                source: EthernetAddress([1; 6]),
                destination: Some(EthernetAddress([2; 6])),
                ether_type: Some(EtherType::Unknown(0x88b5)),
            }
            .into(),
            PayloadLayer::new(vec![0xaa, 0xbb]).into(),
        ]);
        assert_eq!(builder.data_link(), Some(DataLinkKind::Ethernet));

        let buffer = builder.build(Instant::from_secs(7)).unwrap();
        assert_eq!(buffer.timestamp(), Instant::from_secs(7));
        assert_eq!(buffer.data_link(), DataLinkKind::Ethernet);
        assert_eq!(
            buffer.data(),
            &[2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 0x88, 0xb5, 0xaa, 0xbb][..]
        );
    }

    #[test]
    fn test_trailer_outside_lengths() {
        let layers = [
            Layer::from(Ipv4Layer::default()),
            Layer::from(UdpLayer::default()),
            Layer::from(PayloadLayer::new(vec![0xaa, 0xbb])),
            Layer::from(TrailerLayer::new(vec![0; 6])),
        ];
        let buffer = build(Instant::ZERO, &layers).unwrap();
        let data = buffer.data();
        assert_eq!(data.len(), 20 + 8 + 2 + 6);
        // IPv4 total length, UDP length
        assert_eq!(&data[2..4], &[0x00, 0x1e]);
        assert_eq!(&data[24..26], &[0x00, 0x0a]);
        assert_eq!(&data[30..], &[0; 6]);
    }

    #[test]
    fn test_trailer_not_last() {
        let layers = [
            Layer::from(Ipv4Layer::default()),
            Layer::from(TrailerLayer::new(vec![0; 6])),
            Layer::from(UdpLayer::default()),
        ];
        assert_eq!(
            build(Instant::ZERO, &layers),
            Err(BuildError::Mismatch {
                what: "a trailer must be the last layer"
            })
        );
    }

    #[test]
    fn test_error_display() {
        let error = BuildError::OutOfRange {
            field: "quick-start rate",
            value: 16,
            max: 15,
        };
        assert_eq!(error.to_string(), "quick-start rate is 16, more than the 15 allowed");
    }
}
