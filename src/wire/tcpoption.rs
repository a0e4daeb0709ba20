//! The option area of a TCP header.
//!
//! Shares the type-length-value discipline of the IPv4 option area: the
//! length octet counts the type and length octets, and the area is padded to
//! a multiple of four octets.

use heapless::Vec as HVec;

use super::codec::{Reader, Writer};
use super::{TlvOption, TypeRegistry};
use crate::builder::BuildError;
use crate::config::TCP_MAX_SACK_BLOCKS;

enum_with_unknown! {
    /// TCP option kind.
    pub enum OptionType(u8) {
        End                             = 0,
        Nop                             = 1,
        MaximumSegmentSize              = 2,
        WindowScale                     = 3,
        SackPermitted                   = 4,
        SelectiveAck                    = 5,
        Echo                            = 6,
        EchoReply                       = 7,
        Timestamp                       = 8,
        PartialOrderConnectionPermitted = 9,
        PartialOrderServiceProfile      = 10,
        ConnectionCount                 = 11,
        ConnectionCountNew              = 12,
        ConnectionCountEcho             = 13,
        AlternateChecksumRequest        = 14,
        AlternateChecksumData           = 15,
        Md5Signature                    = 19,
        UserTimeout                     = 28
    }
}

enum_with_unknown! {
    /// Checksum algorithm asked for by an alternate checksum request (RFC 1146).
    pub enum ChecksumAlgorithm(u8) {
        Tcp               = 0,
        Fletcher8         = 1,
        Fletcher16        = 2,
        RedundantChecksum = 3
    }
}

/// One block of a selective acknowledgment: the sequence numbers of the
/// first octet received and of the octet after the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SackBlock {
    pub left_edge: u32,
    pub right_edge: u32,
}

/// The user timeout of RFC 5482.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserTimeout {
    minutes: bool,
    timeout: u16,
}

impl UserTimeout {
    pub const MAX_TIMEOUT: u16 = 0x7fff;

    /// `timeout` counts minutes if `minutes` is set, seconds otherwise.
    pub fn new(minutes: bool, timeout: u16) -> Result<UserTimeout, BuildError> {
        BuildError::check_range("TCP user timeout", timeout, Self::MAX_TIMEOUT)?;
        Ok(UserTimeout { minutes, timeout })
    }

    pub const fn is_minutes(&self) -> bool {
        self.minutes
    }

    pub const fn timeout(&self) -> u16 {
        self.timeout
    }

    /// The timeout in seconds.
    pub const fn as_secs(&self) -> u32 {
        if self.minutes {
            self.timeout as u32 * 60
        } else {
            self.timeout as u32
        }
    }
}

/// A TCP header option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpOption {
    End,
    Nop,
    MaximumSegmentSize(u16),
    WindowScale(u8),
    SackPermitted,
    SelectiveAck(HVec<SackBlock, TCP_MAX_SACK_BLOCKS>),
    Echo(u32),
    EchoReply(u32),
    Timestamp { value: u32, echo_reply: u32 },
    PartialOrderConnectionPermitted,
    PartialOrderServiceProfile { start: bool, end: bool },
    ConnectionCount(u32),
    ConnectionCountNew(u32),
    ConnectionCountEcho(u32),
    AlternateChecksumRequest(ChecksumAlgorithm),
    AlternateChecksumData(Vec<u8>),
    Md5Signature([u8; 16]),
    UserTimeout(UserTimeout),
    Unknown { kind: u8, data: Vec<u8> },
}

impl TcpOption {
    /// A selective acknowledgment of up to four blocks.
    pub fn selective_ack(blocks: &[SackBlock]) -> Result<TcpOption, BuildError> {
        HVec::from_slice(blocks)
            .map(TcpOption::SelectiveAck)
            .map_err(|()| BuildError::TooLong {
                what: "TCP selective acknowledgment",
                len: 2 + 8 * blocks.len(),
                max: 2 + 8 * TCP_MAX_SACK_BLOCKS,
            })
    }

    pub fn option_type(&self) -> OptionType {
        OptionType::from(self.code())
    }
}

type Decoder = fn(&mut Reader) -> Option<TcpOption>;

fn decode_sack(reader: &mut Reader) -> Option<TcpOption> {
    if reader.remaining() % 8 != 0 {
        return None;
    }
    let mut blocks = HVec::new();
    while !reader.is_empty() {
        let block = SackBlock {
            left_edge: reader.read_u32().ok()?,
            right_edge: reader.read_u32().ok()?,
        };
        blocks.push(block).ok()?;
    }
    Some(TcpOption::SelectiveAck(blocks))
}

fn decode_user_timeout(reader: &mut Reader) -> Option<TcpOption> {
    let raw = reader.read_u16().ok()?;
    Some(TcpOption::UserTimeout(UserTimeout {
        minutes: raw & 0x8000 != 0,
        timeout: raw & UserTimeout::MAX_TIMEOUT,
    }))
}

// Each decoder must consume the whole value.
static DECODERS: TypeRegistry<OptionType, Decoder> = TypeRegistry::new(&[
    (2, (|r: &mut Reader| r.read_u16().ok().map(TcpOption::MaximumSegmentSize)) as Decoder),
    (3, (|r: &mut Reader| r.read_u8().ok().map(TcpOption::WindowScale)) as Decoder),
    (4, (|_: &mut Reader| Some(TcpOption::SackPermitted)) as Decoder),
    (5, decode_sack as Decoder),
    (6, (|r: &mut Reader| r.read_u32().ok().map(TcpOption::Echo)) as Decoder),
    (7, (|r: &mut Reader| r.read_u32().ok().map(TcpOption::EchoReply)) as Decoder),
    (
        8,
        (|r: &mut Reader| {
            Some(TcpOption::Timestamp {
                value: r.read_u32().ok()?,
                echo_reply: r.read_u32().ok()?,
            })
        }) as Decoder,
    ),
    (9, (|_: &mut Reader| Some(TcpOption::PartialOrderConnectionPermitted)) as Decoder),
    (
        10,
        (|r: &mut Reader| {
            let flags = r.read_u8().ok()?;
            Some(TcpOption::PartialOrderServiceProfile {
                start: flags & 0x80 != 0,
                end: flags & 0x40 != 0,
            })
        }) as Decoder,
    ),
    (11, (|r: &mut Reader| r.read_u32().ok().map(TcpOption::ConnectionCount)) as Decoder),
    (12, (|r: &mut Reader| r.read_u32().ok().map(TcpOption::ConnectionCountNew)) as Decoder),
    (13, (|r: &mut Reader| r.read_u32().ok().map(TcpOption::ConnectionCountEcho)) as Decoder),
    (
        14,
        (|r: &mut Reader| {
            let algorithm = r.read_u8().ok()?;
            Some(TcpOption::AlternateChecksumRequest(algorithm.into()))
        }) as Decoder,
    ),
    (
        15,
        (|r: &mut Reader| Some(TcpOption::AlternateChecksumData(r.rest().to_vec()))) as Decoder,
    ),
    (19, (|r: &mut Reader| r.read_array().ok().map(TcpOption::Md5Signature)) as Decoder),
    (28, decode_user_timeout as Decoder),
]);

impl TlvOption for TcpOption {
    const END: u8 = 0;
    const NOP: u8 = 1;
    const LENGTH_INCLUDES_HEADER: bool = true;
    const ALIGNMENT: usize = 4;
    const MAX_LEN: usize = super::TCP_MAX_OPTIONS_LEN;
    const NAME: &'static str = "TCP options";

    fn end() -> Self {
        TcpOption::End
    }

    fn nop() -> Self {
        TcpOption::Nop
    }

    fn code(&self) -> u8 {
        let kind = match self {
            TcpOption::End => OptionType::End,
            TcpOption::Nop => OptionType::Nop,
            TcpOption::MaximumSegmentSize(_) => OptionType::MaximumSegmentSize,
            TcpOption::WindowScale(_) => OptionType::WindowScale,
            TcpOption::SackPermitted => OptionType::SackPermitted,
            TcpOption::SelectiveAck(_) => OptionType::SelectiveAck,
            TcpOption::Echo(_) => OptionType::Echo,
            TcpOption::EchoReply(_) => OptionType::EchoReply,
            TcpOption::Timestamp { .. } => OptionType::Timestamp,
            TcpOption::PartialOrderConnectionPermitted => {
                OptionType::PartialOrderConnectionPermitted
            }
            TcpOption::PartialOrderServiceProfile { .. } => OptionType::PartialOrderServiceProfile,
            TcpOption::ConnectionCount(_) => OptionType::ConnectionCount,
            TcpOption::ConnectionCountNew(_) => OptionType::ConnectionCountNew,
            TcpOption::ConnectionCountEcho(_) => OptionType::ConnectionCountEcho,
            TcpOption::AlternateChecksumRequest(_) => OptionType::AlternateChecksumRequest,
            TcpOption::AlternateChecksumData(_) => OptionType::AlternateChecksumData,
            TcpOption::Md5Signature(_) => OptionType::Md5Signature,
            TcpOption::UserTimeout(_) => OptionType::UserTimeout,
            TcpOption::Unknown { kind, .. } => return *kind,
        };
        kind.into()
    }

    fn is_once_only(&self) -> bool {
        !matches!(
            self,
            TcpOption::End | TcpOption::Nop | TcpOption::Unknown { .. }
        )
    }

    fn value_len(&self) -> usize {
        match self {
            TcpOption::End
            | TcpOption::Nop
            | TcpOption::SackPermitted
            | TcpOption::PartialOrderConnectionPermitted => 0,
            TcpOption::WindowScale(_)
            | TcpOption::PartialOrderServiceProfile { .. }
            | TcpOption::AlternateChecksumRequest(_) => 1,
            TcpOption::MaximumSegmentSize(_) | TcpOption::UserTimeout(_) => 2,
            TcpOption::Echo(_)
            | TcpOption::EchoReply(_)
            | TcpOption::ConnectionCount(_)
            | TcpOption::ConnectionCountNew(_)
            | TcpOption::ConnectionCountEcho(_) => 4,
            TcpOption::Timestamp { .. } => 8,
            TcpOption::Md5Signature(_) => 16,
            TcpOption::SelectiveAck(blocks) => 8 * blocks.len(),
            TcpOption::AlternateChecksumData(data) | TcpOption::Unknown { data, .. } => data.len(),
        }
    }

    fn decode(code: u8, value: &[u8]) -> Option<Self> {
        let Some(decode) = DECODERS.get_raw(code) else {
            return Some(TcpOption::Unknown {
                kind: code,
                data: value.to_vec(),
            });
        };
        let mut reader = Reader::new(value);
        let option = decode(&mut reader)?;
        reader.finish().ok()?;
        Some(option)
    }

    fn emit_value(&self, writer: &mut Writer) {
        match self {
            TcpOption::End
            | TcpOption::Nop
            | TcpOption::SackPermitted
            | TcpOption::PartialOrderConnectionPermitted => {}
            TcpOption::MaximumSegmentSize(mss) => writer.write_u16(*mss),
            TcpOption::WindowScale(shift) => writer.write_u8(*shift),
            TcpOption::SelectiveAck(blocks) => {
                for block in blocks {
                    writer.write_u32(block.left_edge);
                    writer.write_u32(block.right_edge);
                }
            }
            TcpOption::Echo(value)
            | TcpOption::EchoReply(value)
            | TcpOption::ConnectionCount(value)
            | TcpOption::ConnectionCountNew(value)
            | TcpOption::ConnectionCountEcho(value) => writer.write_u32(*value),
            TcpOption::Timestamp { value, echo_reply } => {
                writer.write_u32(*value);
                writer.write_u32(*echo_reply);
            }
            TcpOption::PartialOrderServiceProfile { start, end } => {
                writer.write_u8(((*start as u8) << 7) | ((*end as u8) << 6))
            }
            TcpOption::AlternateChecksumRequest(algorithm) => writer.write_u8((*algorithm).into()),
            TcpOption::Md5Signature(digest) => writer.write_bytes(digest),
            TcpOption::UserTimeout(user_timeout) => {
                let flag = if user_timeout.minutes { 0x8000 } else { 0 };
                writer.write_u16(flag | user_timeout.timeout)
            }
            TcpOption::AlternateChecksumData(data) | TcpOption::Unknown { data, .. } => {
                writer.write_bytes(data)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::Options;

    fn emit(options: &Options<TcpOption>) -> Vec<u8> {
        let mut bytes = vec![0xff; options.buffer_len()];
        options.emit(&mut bytes);
        bytes
    }

    // A SYN from a Linux host: MSS, SACK permitted, timestamps, NOP, window scale.
    static SYN_OPTION_BYTES: [u8; 20] = [
        0x02, 0x04, 0x05, 0xb4, 0x04, 0x02, 0x08, 0x0a, 0x00, 0x12, 0xd6, 0x87, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x03, 0x03, 0x07,
    ];

    #[test]
    fn test_syn_options() {
        let options = Options::<TcpOption>::parse(&SYN_OPTION_BYTES);
        assert!(options.is_valid());
        assert_eq!(
            options.as_slice(),
            &[
                TcpOption::MaximumSegmentSize(1460),
                TcpOption::SackPermitted,
                TcpOption::Timestamp {
                    value: 0x0012_d687,
                    echo_reply: 0
                },
                TcpOption::Nop,
                TcpOption::WindowScale(7),
            ]
        );
        assert_eq!(emit(&options), SYN_OPTION_BYTES);

        let built = Options::new(options.as_slice().to_vec()).unwrap();
        assert_eq!(built, options);
    }

    #[test]
    fn test_selective_ack() {
        let blocks = [
            SackBlock {
                left_edge: 1000,
                right_edge: 2000,
            },
            SackBlock {
                left_edge: 3000,
                right_edge: 4000,
            },
        ];
        let option = TcpOption::selective_ack(&blocks).unwrap();
        let options = Options::new(vec![TcpOption::Nop, TcpOption::Nop, option.clone()]).unwrap();
        assert_eq!(options.buffer_len(), 20);

        let bytes = emit(&options);
        assert_eq!(&bytes[..4], &[0x01, 0x01, 0x05, 0x12]);
        assert_eq!(Options::<TcpOption>::parse(&bytes).find(5), Some(&option));

        assert!(matches!(
            TcpOption::selective_ack(&[SackBlock::default(); 5]),
            Err(BuildError::TooLong { len: 42, max: 34, .. })
        ));
    }

    #[test]
    fn test_selective_ack_partial_block() {
        let bytes = [0x05, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00];
        assert!(!Options::<TcpOption>::parse(&bytes).is_valid());
    }

    #[test]
    fn test_wrong_fixed_length() {
        let bytes = [0x02, 0x03, 0x05, 0x00];
        assert!(!Options::<TcpOption>::parse(&bytes).is_valid());
        let bytes = [0x03, 0x04, 0x07, 0x00];
        assert!(!Options::<TcpOption>::parse(&bytes).is_valid());
    }

    #[test]
    fn test_duplicate_mss() {
        let bytes = [0x02, 0x04, 0x05, 0xb4, 0x02, 0x04, 0x05, 0xb4];
        let options = Options::<TcpOption>::parse(&bytes);
        assert!(!options.is_valid());
        assert_eq!(options.as_slice(), &[TcpOption::MaximumSegmentSize(1460)]);
    }

    #[test]
    fn test_unknown_kind() {
        let bytes = [0xfd, 0x04, 0xab, 0xcd];
        let options = Options::<TcpOption>::parse(&bytes);
        assert!(options.is_valid());
        assert_eq!(
            options.as_slice(),
            &[TcpOption::Unknown {
                kind: 0xfd,
                data: vec![0xab, 0xcd]
            }]
        );
        assert_eq!(emit(&options), bytes);
    }

    #[test]
    fn test_user_timeout() {
        let bytes = [0x1c, 0x04, 0x80, 0x0a];
        let options = Options::<TcpOption>::parse(&bytes);
        let Some(TcpOption::UserTimeout(user_timeout)) = options.find(28) else {
            panic!("no user timeout option");
        };
        assert!(user_timeout.is_minutes());
        assert_eq!(user_timeout.as_secs(), 600);
        assert_eq!(emit(&options), bytes);
        assert!(UserTimeout::new(false, 0x8000).is_err());
    }

    #[test]
    fn test_small_options() {
        let options = Options::new(vec![
            TcpOption::PartialOrderServiceProfile {
                start: true,
                end: false,
            },
            TcpOption::AlternateChecksumRequest(ChecksumAlgorithm::Fletcher16),
            TcpOption::Md5Signature([0x5a; 16]),
        ])
        .unwrap();
        let bytes = emit(&options);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..6], &[0x0a, 0x03, 0x80, 0x0e, 0x03, 0x02]);
        assert_eq!(Options::parse(&bytes), options);
    }

    #[test]
    fn test_registry() {
        assert!(DECODERS.contains(OptionType::UserTimeout));
        assert!(!DECODERS.contains(OptionType::Nop));
        assert_eq!(DECODERS.codes().count(), 16);
    }
}
