//! Sequential access to big-endian fields whose offsets depend on earlier
//! fields: option values, ICMP message bodies, DHCP and DNS records.
//!
//! Fixed layouts use `NetworkEndian` on `field` ranges directly; these cursors
//! cover the remainder.

use byteorder::{ByteOrder, NetworkEndian};

use super::{EthernetAddress, Error, Ipv4Address, Ipv6Address, Result};

/// A reading cursor over borrowed octets.
///
/// Every read is bounds checked and fails with [Error] once the octets run
/// out, leaving the cursor where it was.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub const fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    /// Offset of the next octet to be read.
    pub const fn position(&self) -> usize {
        self.pos
    }

    pub const fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Every octet the cursor covers, including those already read.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Consume and return everything left.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(Error)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(Error)?;
        let bytes = self.data.get(self.pos..end).ok_or(Error)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut array = [0; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.peek_u8()?;
        self.pos += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_bytes(2).map(NetworkEndian::read_u16)
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        self.read_bytes(3).map(NetworkEndian::read_u24)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_bytes(4).map(NetworkEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_bytes(4).map(NetworkEndian::read_i32)
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Address> {
        self.read_array::<4>().map(Ipv4Address::from)
    }

    pub fn read_ipv6(&mut self) -> Result<Ipv6Address> {
        self.read_array::<16>().map(Ipv6Address::from)
    }

    pub fn read_ethernet(&mut self) -> Result<EthernetAddress> {
        self.read_array::<6>().map(EthernetAddress)
    }

    /// Succeed only if every octet has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() { Ok(()) } else { Err(Error) }
    }
}

/// A writing cursor over a buffer sized in advance.
///
/// Writers are handed exactly `buffer_len()` octets by the builder; writing
/// past the end is a bug in the length computation and panics.
#[derive(Debug)]
pub struct Writer<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(data: &'a mut [u8]) -> Writer<'a> {
        Writer { data, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Write `len` copies of `value`.
    pub fn fill(&mut self, value: u8, len: usize) {
        self.data[self.pos..self.pos + len].fill(value);
        self.pos += len;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data[self.pos] = value;
        self.pos += 1;
    }

    pub fn write_u16(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.data[self.pos..self.pos + 2], value);
        self.pos += 2;
    }

    pub fn write_u24(&mut self, value: u32) {
        NetworkEndian::write_u24(&mut self.data[self.pos..self.pos + 3], value);
        self.pos += 3;
    }

    pub fn write_u32(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.data[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    pub fn write_i32(&mut self, value: i32) {
        NetworkEndian::write_i32(&mut self.data[self.pos..self.pos + 4], value);
        self.pos += 4;
    }

    pub fn write_ipv4(&mut self, value: Ipv4Address) {
        self.write_bytes(&value.octets());
    }

    pub fn write_ipv6(&mut self, value: Ipv6Address) {
        self.write_bytes(&value.octets());
    }

    pub fn write_ethernet(&mut self, value: EthernetAddress) {
        self.write_bytes(value.as_bytes());
    }

    /// The part of the buffer not yet written.
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.pos..]
    }

    /// Skip `len` octets already written through [remaining_mut](Self::remaining_mut).
    pub fn advance(&mut self, len: usize) {
        assert!(self.pos + len <= self.data.len());
        self.pos += len;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reader_fields() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_u8(), Ok(0x01));
        assert_eq!(reader.read_u16(), Ok(0x0203));
        assert_eq!(reader.read_u24(), Ok(0x040506));
        assert_eq!(reader.read_ipv4(), Ok(Ipv4Address::new(7, 8, 9, 10)));
        assert!(reader.is_empty());
        assert_eq!(reader.finish(), Ok(()));
    }

    #[test]
    fn test_reader_truncated() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = Reader::new(&bytes);
        assert_eq!(reader.read_u32(), Err(Error));
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_bytes(3), Ok(&bytes[..]));
        assert_eq!(reader.read_u8(), Err(Error));
        assert_eq!(reader.seek(4), Err(Error));
    }

    #[test]
    fn test_writer_fields() {
        let mut bytes = [0xff; 12];
        let mut writer = Writer::new(&mut bytes);
        writer.write_u8(0x01);
        writer.write_u16(0x0203);
        writer.write_u24(0x040506);
        writer.write_ipv4(Ipv4Address::new(7, 8, 9, 10));
        writer.fill(0, 2);
        assert_eq!(writer.position(), 12);
        assert_eq!(
            bytes,
            [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x00, 0x00]
        );
    }
}
