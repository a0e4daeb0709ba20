use core::{result, str::FromStr};

use crate::wire::{DomainName, EthernetAddress};

type Result<T> = result::Result<T, ()>;

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(data: &'a str) -> Parser<'a> {
        Parser {
            data: data.as_bytes(),
            pos: 0,
        }
    }

    fn lookahead_char(&self, ch: u8) -> bool {
        self.data.get(self.pos) == Some(&ch)
    }

    fn advance(&mut self) -> Result<u8> {
        match self.data.get(self.pos) {
            Some(&chr) => {
                self.pos += 1;
                Ok(chr)
            }
            None => Err(()),
        }
    }

    fn try_do<F, T>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut Parser<'a>) -> Result<T>,
    {
        let pos = self.pos;
        match f(self) {
            Ok(res) => Some(res),
            Err(()) => {
                self.pos = pos;
                None
            }
        }
    }

    fn is_eof(&self) -> bool {
        self.data.len() == self.pos
    }

    fn accept_eof(&mut self) -> Result<()> {
        if self.is_eof() { Ok(()) } else { Err(()) }
    }

    fn until_eof<F, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Parser<'a>) -> Result<T>,
    {
        let res = f(self)?;
        self.accept_eof()?;
        Ok(res)
    }

    fn accept_char(&mut self, chr: u8) -> Result<()> {
        if self.advance()? == chr {
            Ok(())
        } else {
            Err(())
        }
    }

    fn accept_digit(&mut self, hex: bool) -> Result<u8> {
        let digit = self.advance()?;
        if digit.is_ascii_digit() {
            Ok(digit - b'0')
        } else if hex && (b'a'..=b'f').contains(&digit) {
            Ok(digit - b'a' + 10)
        } else if hex && (b'A'..=b'F').contains(&digit) {
            Ok(digit - b'A' + 10)
        } else {
            Err(())
        }
    }

    fn accept_number(&mut self, max_digits: usize, max_value: u32, hex: bool) -> Result<u32> {
        let mut value = self.accept_digit(hex)? as u32;
        for _ in 1..max_digits {
            match self.try_do(|p| p.accept_digit(hex)) {
                Some(digit) => {
                    value *= if hex { 16 } else { 10 };
                    value += digit as u32;
                }
                None => break,
            }
        }
        if value < max_value {
            Ok(value)
        } else {
            Err(())
        }
    }

    fn accept_mac_joined_with(&mut self, separator: u8) -> Result<EthernetAddress> {
        let mut octets = [0u8; 6];
        for (n, octet) in octets.iter_mut().enumerate() {
            *octet = self.accept_number(2, 0x100, true)? as u8;
            if n != 5 {
                self.accept_char(separator)?;
            }
        }
        Ok(EthernetAddress(octets))
    }

    fn accept_mac(&mut self) -> Result<EthernetAddress> {
        if let Some(mac) = self.try_do(|p| p.accept_mac_joined_with(b'-')) {
            return Ok(mac);
        }
        if let Some(mac) = self.try_do(|p| p.accept_mac_joined_with(b':')) {
            return Ok(mac);
        }
        Err(())
    }

    /// One label in presentation form, with `\.` and `\DDD` escapes.
    fn accept_label(&mut self) -> Result<Vec<u8>> {
        let mut label = Vec::new();
        while !self.is_eof() && !self.lookahead_char(b'.') {
            match self.advance()? {
                b'\\' => match self.try_do(|p| p.accept_exact_number(3)) {
                    Some(octet) => label.push(octet),
                    None => label.push(self.advance()?),
                },
                chr => label.push(chr),
            }
        }
        if label.is_empty() { Err(()) } else { Ok(label) }
    }

    fn accept_exact_number(&mut self, digits: usize) -> Result<u8> {
        let mut value = 0u32;
        for _ in 0..digits {
            value = value * 10 + self.accept_digit(false)? as u32;
        }
        u8::try_from(value).map_err(|_| ())
    }

    fn accept_domain_name(&mut self) -> Result<DomainName> {
        if self.try_do(|p| p.until_eof(|p| p.accept_char(b'.'))).is_some() {
            return Ok(DomainName::root());
        }
        let mut labels = vec![self.accept_label()?];
        while self.try_do(|p| p.accept_char(b'.')).is_some() {
            if self.is_eof() {
                break;
            }
            labels.push(self.accept_label()?);
        }
        DomainName::from_labels(&labels).map_err(|_| ())
    }
}

impl FromStr for EthernetAddress {
    type Err = ();

    /// Parse a string representation of an Ethernet address.
    fn from_str(s: &str) -> Result<EthernetAddress> {
        Parser::new(s).until_eof(|p| p.accept_mac())
    }
}

impl FromStr for DomainName {
    type Err = ();

    /// Parse a domain name in presentation form. A trailing dot is optional
    /// and a lone dot names the root.
    fn from_str(s: &str) -> Result<DomainName> {
        Parser::new(s).until_eof(|p| p.accept_domain_name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_mac() {
        assert_eq!(EthernetAddress::from_str(""), Err(()));
        assert_eq!(
            EthernetAddress::from_str("02:00:00:00:00:00"),
            Ok(EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x00]))
        );
        assert_eq!(
            EthernetAddress::from_str("01:23:45:67:89:ab"),
            Ok(EthernetAddress([0x01, 0x23, 0x45, 0x67, 0x89, 0xab]))
        );
        assert_eq!(
            EthernetAddress::from_str("cd:ef:10:00:00:00"),
            Ok(EthernetAddress([0xcd, 0xef, 0x10, 0x00, 0x00, 0x00]))
        );
        assert_eq!(
            EthernetAddress::from_str("00:00:00:ab:cd:ef"),
            Ok(EthernetAddress([0x00, 0x00, 0x00, 0xab, 0xcd, 0xef]))
        );
        assert_eq!(
            EthernetAddress::from_str("00-00-00-ab-cd-ef"),
            Ok(EthernetAddress([0x00, 0x00, 0x00, 0xab, 0xcd, 0xef]))
        );
        assert_eq!(
            EthernetAddress::from_str("AB-CD-EF-00-00-00"),
            Ok(EthernetAddress([0xab, 0xcd, 0xef, 0x00, 0x00, 0x00]))
        );
        assert_eq!(EthernetAddress::from_str("100:00:00:00:00:00"), Err(()));
        assert_eq!(EthernetAddress::from_str("002:00:00:00:00:00"), Err(()));
        assert_eq!(EthernetAddress::from_str("02:00:00:00:00:000"), Err(()));
        assert_eq!(EthernetAddress::from_str("02:00:00:00:00:0x"), Err(()));
    }

    #[test]
    fn test_domain_name() {
        let name = DomainName::from_labels(&["www", "example", "com"]).unwrap();
        assert_eq!(DomainName::from_str("www.example.com"), Ok(name.clone()));
        assert_eq!(DomainName::from_str("www.example.com."), Ok(name));
        assert_eq!(DomainName::from_str("."), Ok(DomainName::root()));
        assert_eq!(
            DomainName::from_str("a\\.b.c\\032d"),
            Ok(DomainName::from_labels(&["a.b", "c d"]).unwrap())
        );
        assert_eq!(DomainName::from_str(""), Err(()));
        assert_eq!(DomainName::from_str("a..b"), Err(()));
        assert_eq!(DomainName::from_str(".com"), Err(()));
        assert_eq!(DomainName::from_str(&"a".repeat(64)), Err(()));
    }

    #[test]
    fn test_domain_name_display_round_trip() {
        let name = DomainName::from_labels(&[&b"tab\there"[..], &b"dot.ted"[..]]).unwrap();
        assert_eq!(DomainName::from_str(&name.to_string()), Ok(name));
    }
}
