//! Type-length-value option areas.
//!
//! IPv4, TCP and DHCP headers end in an area of options, each either a
//! single marker octet (end of list, no-operation) or a type octet, a length
//! octet and a value. [Options] parses and writes such an area for any option
//! family implementing [TlvOption]; the families differ only in their marker
//! codes, in whether the length octet counts the two header octets, and in
//! the alignment and maximum size of the area.
//!
//! Parsing never fails. A truncated entry, a length the area cannot hold, a
//! value the option's decoder rejects, or a second copy of a once-only option
//! marks the whole collection invalid; everything decoded up to that point
//! stays available.

use core::fmt;

use super::codec::Writer;
use crate::builder::BuildError;

/// One family of type-length-value options.
pub trait TlvOption: fmt::Debug + Clone + PartialEq + Sized {
    /// Type code of the end-of-list marker.
    const END: u8;
    /// Type code of the single-octet no-operation marker.
    const NOP: u8;
    /// Whether the length octet counts the type and length octets too.
    const LENGTH_INCLUDES_HEADER: bool;
    /// Size, in octets, the whole area is padded to.
    const ALIGNMENT: usize;
    /// Largest area the enclosing header can carry, in octets.
    const MAX_LEN: usize;
    /// Family name used in diagnostics.
    const NAME: &'static str;

    /// The end-of-list marker.
    fn end() -> Self;

    /// The no-operation marker.
    fn nop() -> Self;

    /// The wire type code of this option.
    fn code(&self) -> u8;

    /// Whether a well-formed area holds this kind at most once.
    fn is_once_only(&self) -> bool;

    /// Length of the option value, without type and length octets.
    /// Never called on the markers.
    fn value_len(&self) -> usize;

    /// Decode the value of a non-marker option.
    ///
    /// Codes without a registered decoder yield the family's opaque variant;
    /// `None` means a registered decoder rejected the value.
    fn decode(code: u8, value: &[u8]) -> Option<Self>;

    /// Write the value of a non-marker option, `value_len()` octets.
    fn emit_value(&self, writer: &mut Writer);

    /// Whether this option is one of the single-octet markers.
    fn is_marker(&self) -> bool {
        let code = self.code();
        code == Self::END || code == Self::NOP
    }

    /// Length of the option on the wire.
    fn buffer_len(&self) -> usize {
        if self.is_marker() { 1 } else { 2 + self.value_len() }
    }
}

/// An ordered option area, in wire order.
///
/// Two collections are equal when they hold equal options and occupy the same
/// number of octets.
#[derive(Debug, Clone)]
pub struct Options<O> {
    options: Vec<O>,
    buffer_len: usize,
    valid: bool,
}

impl<O: TlvOption> Options<O> {
    /// An empty option area.
    pub const fn empty() -> Options<O> {
        Options {
            options: Vec::new(),
            buffer_len: 0,
            valid: true,
        }
    }

    /// Assemble an option area for building.
    ///
    /// If the options do not fill the area up to its alignment and the last
    /// one is not already the end-of-list marker, an end-of-list marker is
    /// appended. The area is then padded with zeros to the alignment.
    pub fn new(mut options: Vec<O>) -> Result<Options<O>, BuildError> {
        for option in options.iter().filter(|option| !option.is_marker()) {
            let max = 255 - if O::LENGTH_INCLUDES_HEADER { 2 } else { 0 };
            if option.value_len() > max {
                return Err(BuildError::TooLong {
                    what: O::NAME,
                    len: option.value_len(),
                    max,
                });
            }
        }

        let content_len: usize = options.iter().map(TlvOption::buffer_len).sum();
        let ends_with_end = options.last().is_some_and(|option| option.code() == O::END);
        if content_len % O::ALIGNMENT != 0 && !ends_with_end {
            options.push(O::end());
        }

        let content_len: usize = options.iter().map(TlvOption::buffer_len).sum();
        let buffer_len = content_len.div_ceil(O::ALIGNMENT) * O::ALIGNMENT;
        if buffer_len > O::MAX_LEN {
            return Err(BuildError::TooLong {
                what: O::NAME,
                len: buffer_len,
                max: O::MAX_LEN,
            });
        }

        Ok(Options {
            options,
            buffer_len,
            valid: true,
        })
    }

    /// Parse an option area occupying all of `data`.
    pub fn parse(data: &[u8]) -> Options<O> {
        let mut options = Vec::new();
        let valid = match Self::parse_into(data, &mut options) {
            Ok(()) => true,
            Err(reason) => {
                net_debug!("invalid {} area: {}", O::NAME, reason);
                false
            }
        };

        Options {
            options,
            buffer_len: data.len(),
            valid,
        }
    }

    fn parse_into(data: &[u8], options: &mut Vec<O>) -> Result<(), &'static str> {
        let mut pos = 0;
        while pos < data.len() {
            let code = data[pos];
            if code == O::END {
                options.push(O::end());
                return Ok(());
            }
            if code == O::NOP {
                options.push(O::nop());
                pos += 1;
                continue;
            }

            let length = *data.get(pos + 1).ok_or("truncated option header")? as usize;
            let (value_start, end) = if O::LENGTH_INCLUDES_HEADER {
                if length < 2 {
                    return Err("option length below 2");
                }
                (pos + 2, pos + length)
            } else {
                (pos + 2, pos + 2 + length)
            };
            let value = data.get(value_start..end).ok_or("option overruns the area")?;

            let option = O::decode(code, value).ok_or("malformed option value")?;
            if option.is_once_only() && options.iter().any(|other| other.code() == code) {
                return Err("duplicate once-only option");
            }
            options.push(option);
            pos = end;
        }
        Ok(())
    }

    /// Whether the area parsed cleanly. Always true for areas made by [new](Self::new).
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Octets the area occupies, padding included.
    pub const fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, O> {
        self.options.iter()
    }

    pub fn as_slice(&self) -> &[O] {
        &self.options
    }

    /// The first option with the given type code.
    pub fn find(&self, code: u8) -> Option<&O> {
        self.options.iter().find(|option| option.code() == code)
    }

    /// Write the area into `buffer`, which must be exactly `buffer_len()`
    /// octets long.
    pub fn emit(&self, buffer: &mut [u8]) {
        let mut writer = Writer::new(buffer);
        for option in &self.options {
            writer.write_u8(option.code());
            if option.is_marker() {
                continue;
            }
            let length = option.value_len() + if O::LENGTH_INCLUDES_HEADER { 2 } else { 0 };
            writer.write_u8(length as u8);
            option.emit_value(&mut writer);
        }
        let padding = self.buffer_len - writer.position();
        writer.fill(0, padding);
    }
}

impl<O: TlvOption> Default for Options<O> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<O: PartialEq> PartialEq for Options<O> {
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options && self.buffer_len == other.buffer_len
    }
}

impl<O: Eq> Eq for Options<O> {}

impl<'a, O> IntoIterator for &'a Options<O> {
    type Item = &'a O;
    type IntoIter = core::slice::Iter<'a, O>;

    fn into_iter(self) -> Self::IntoIter {
        self.options.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::codec::Reader;

    /// A minimal family: kind 2 carries a once-only u16, kind 3 any octets.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Toy {
        End,
        Nop,
        Word(u16),
        Blob(u8, Vec<u8>),
    }

    impl TlvOption for Toy {
        const END: u8 = 0;
        const NOP: u8 = 1;
        const LENGTH_INCLUDES_HEADER: bool = true;
        const ALIGNMENT: usize = 4;
        const MAX_LEN: usize = 12;
        const NAME: &'static str = "toy options";

        fn end() -> Self {
            Toy::End
        }

        fn nop() -> Self {
            Toy::Nop
        }

        fn code(&self) -> u8 {
            match self {
                Toy::End => 0,
                Toy::Nop => 1,
                Toy::Word(_) => 2,
                Toy::Blob(code, _) => *code,
            }
        }

        fn is_once_only(&self) -> bool {
            matches!(self, Toy::Word(_))
        }

        fn value_len(&self) -> usize {
            match self {
                Toy::Word(_) => 2,
                Toy::Blob(_, data) => data.len(),
                Toy::End | Toy::Nop => 0,
            }
        }

        fn decode(code: u8, value: &[u8]) -> Option<Self> {
            match code {
                2 => {
                    let mut reader = Reader::new(value);
                    let word = reader.read_u16().ok()?;
                    reader.finish().ok()?;
                    Some(Toy::Word(word))
                }
                _ => Some(Toy::Blob(code, value.to_vec())),
            }
        }

        fn emit_value(&self, writer: &mut Writer) {
            match self {
                Toy::Word(word) => writer.write_u16(*word),
                Toy::Blob(_, data) => writer.write_bytes(data),
                Toy::End | Toy::Nop => {}
            }
        }
    }

    #[test]
    fn test_parse_stops_at_end() {
        let options = Options::<Toy>::parse(&[0x01, 0x02, 0x04, 0xab, 0xcd, 0x00, 0x07, 0x07]);
        assert!(options.is_valid());
        assert_eq!(
            options.as_slice(),
            &[Toy::Nop, Toy::Word(0xabcd), Toy::End]
        );
        assert_eq!(options.buffer_len(), 8);
    }

    #[test]
    fn test_parse_unregistered_is_opaque() {
        let options = Options::<Toy>::parse(&[0x09, 0x03, 0x55, 0x00]);
        assert!(options.is_valid());
        assert_eq!(options.as_slice(), &[Toy::Blob(9, vec![0x55]), Toy::End]);
    }

    #[test]
    fn test_parse_duplicate_once_only() {
        let options = Options::<Toy>::parse(&[0x02, 0x04, 0x00, 0x01, 0x02, 0x04, 0x00, 0x02]);
        assert!(!options.is_valid());
        assert_eq!(options.as_slice(), &[Toy::Word(1)]);
    }

    #[test]
    fn test_parse_bad_lengths() {
        assert!(!Options::<Toy>::parse(&[0x03, 0x01, 0x00, 0x00]).is_valid());
        assert!(!Options::<Toy>::parse(&[0x03, 0x06, 0x00, 0x00]).is_valid());
        assert!(!Options::<Toy>::parse(&[0x01, 0x01, 0x01, 0x03]).is_valid());
        assert!(!Options::<Toy>::parse(&[0x02, 0x03, 0x00, 0x00]).is_valid());
    }

    #[test]
    fn test_new_appends_end_and_pads() {
        let options = Options::new(vec![Toy::Blob(9, vec![0x07])]).unwrap();
        assert_eq!(options.as_slice(), &[Toy::Blob(9, vec![0x07]), Toy::End]);
        assert_eq!(options.buffer_len(), 4);

        let mut bytes = [0xff; 4];
        options.emit(&mut bytes);
        assert_eq!(bytes, [0x09, 0x03, 0x07, 0x00]);
        assert_eq!(Options::parse(&bytes), options);
    }

    #[test]
    fn test_new_pads_after_end() {
        let options = Options::new(vec![Toy::Word(7), Toy::Nop, Toy::End]).unwrap();
        assert_eq!(options.buffer_len(), 8);

        let mut bytes = [0xff; 8];
        options.emit(&mut bytes);
        assert_eq!(bytes, [0x02, 0x04, 0x00, 0x07, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(Options::parse(&bytes), options);
    }

    #[test]
    fn test_new_aligned_needs_no_end() {
        let options = Options::new(vec![Toy::Nop, Toy::Nop, Toy::Nop, Toy::Nop]).unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options.buffer_len(), 4);
    }

    #[test]
    fn test_new_too_long() {
        let result = Options::new(vec![Toy::Blob(9, vec![0; 11])]);
        assert_eq!(
            result,
            Err(BuildError::TooLong {
                what: "toy options",
                len: 16,
                max: 12
            })
        );
    }
}
