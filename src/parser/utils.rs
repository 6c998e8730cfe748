/*!
Length-checked readers over [Bytes] used throughout the decoder.

Every accessor verifies the remaining length before consuming, so a
declared length that oversells the payload surfaces as
[ParserError::Truncated] instead of a panic, and the caller can drop the
record and keep going.
*/
use crate::error::ParserError;
use crate::models::*;
use bytes::{Buf, Bytes};
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub trait ReadUtils {
    fn has_n_remaining(&self, n: usize) -> Result<(), ParserError>;
    fn read_u8(&mut self) -> Result<u8, ParserError>;
    fn read_u16(&mut self) -> Result<u16, ParserError>;
    fn read_u32(&mut self) -> Result<u32, ParserError>;
    fn read_n_bytes(&mut self, n: usize) -> Result<Bytes, ParserError>;
    fn read_n_bytes_to_string(&mut self, n: usize) -> Result<String, ParserError>;

    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr, ParserError>;
    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr, ParserError>;
    fn read_address(&mut self, afi: Afi) -> Result<IpAddr, ParserError>;
    fn read_asn(&mut self, len: AsnLength) -> Result<Asn, ParserError>;
    fn read_afi(&mut self) -> Result<Afi, ParserError>;
    fn read_safi(&mut self) -> Result<Safi, ParserError>;
    fn read_nlri_prefix(
        &mut self,
        afi: Afi,
        add_path: bool,
    ) -> Result<NetworkPrefix, ParserError>;
}

impl ReadUtils for Bytes {
    #[inline]
    fn has_n_remaining(&self, n: usize) -> Result<(), ParserError> {
        if self.remaining() < n {
            return Err(ParserError::Truncated(format!(
                "expected {} more bytes, {} available",
                n,
                self.remaining()
            )));
        }
        Ok(())
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8, ParserError> {
        self.has_n_remaining(1)?;
        Ok(self.get_u8())
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16, ParserError> {
        self.has_n_remaining(2)?;
        Ok(self.get_u16())
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32, ParserError> {
        self.has_n_remaining(4)?;
        Ok(self.get_u32())
    }

    fn read_n_bytes(&mut self, n: usize) -> Result<Bytes, ParserError> {
        self.has_n_remaining(n)?;
        Ok(self.split_to(n))
    }

    fn read_n_bytes_to_string(&mut self, n: usize) -> Result<String, ParserError> {
        let bytes = self.read_n_bytes(n)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ParserError::ParseError("invalid UTF-8 string".to_string()))
    }

    fn read_ipv4_address(&mut self) -> Result<Ipv4Addr, ParserError> {
        Ok(Ipv4Addr::from(self.read_u32()?))
    }

    fn read_ipv6_address(&mut self) -> Result<Ipv6Addr, ParserError> {
        self.has_n_remaining(16)?;
        let mut buf = [0u8; 16];
        self.copy_to_slice(&mut buf);
        Ok(Ipv6Addr::from(buf))
    }

    fn read_address(&mut self, afi: Afi) -> Result<IpAddr, ParserError> {
        match afi {
            Afi::Ipv4 => self.read_ipv4_address().map(IpAddr::V4),
            Afi::Ipv6 => self.read_ipv6_address().map(IpAddr::V6),
        }
    }

    fn read_asn(&mut self, len: AsnLength) -> Result<Asn, ParserError> {
        match len {
            AsnLength::Bits16 => Ok(Asn::new_16bit(self.read_u16()?)),
            AsnLength::Bits32 => Ok(Asn::new_32bit(self.read_u32()?)),
        }
    }

    fn read_afi(&mut self) -> Result<Afi, ParserError> {
        let afi = self.read_u16()?;
        Afi::try_from(afi).map_err(|_| ParserError::UnsupportedAfi(afi))
    }

    fn read_safi(&mut self) -> Result<Safi, ParserError> {
        let safi = self.read_u8()?;
        Safi::try_from(safi).map_err(|_| ParserError::UnsupportedSafi(safi))
    }

    /// Read one NLRI-encoded prefix: an optional path id, a bit length,
    /// then just enough octets to cover it.
    fn read_nlri_prefix(
        &mut self,
        afi: Afi,
        add_path: bool,
    ) -> Result<NetworkPrefix, ParserError> {
        let path_id = if add_path {
            Some(self.read_u32()?)
        } else {
            None
        };

        let bit_len = self.read_u8()?;
        if bit_len > afi.max_prefix_len() {
            return Err(ParserError::BadPrefixWidth { bits: bit_len, afi });
        }
        let byte_len = (bit_len as usize).div_ceil(8);
        self.has_n_remaining(byte_len)?;

        let prefix = match afi {
            Afi::Ipv4 => {
                let mut buf = [0u8; 4];
                self.copy_to_slice(&mut buf[..byte_len]);
                // Ipv4Net::new cannot fail after the width check above
                IpNet::V4(Ipv4Net::new(Ipv4Addr::from(buf), bit_len).unwrap())
            }
            Afi::Ipv6 => {
                let mut buf = [0u8; 16];
                self.copy_to_slice(&mut buf[..byte_len]);
                IpNet::V6(Ipv6Net::new(Ipv6Addr::from(buf), bit_len).unwrap())
            }
        };

        Ok(NetworkPrefix::new(prefix, path_id))
    }
}
