use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp::attributes::parse_attributes;
use crate::parser::ReadUtils;
use bytes::Bytes;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// Parse a legacy TABLE_DUMP (v1) message.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.2>
///
/// The record subtype is the AFI of both the dumped prefix and the peer
/// address. Unlike the NLRI encoding, the prefix field always occupies the
/// full address width.
pub fn parse_table_dump_message(
    sub_type: u16,
    mut data: Bytes,
) -> Result<TableDumpMessage, ParserError> {
    let afi = match sub_type {
        1 => Afi::Ipv4,
        2 => Afi::Ipv6,
        _ => {
            return Err(ParserError::BadSubtype {
                mrt_type: "table dump",
                subtype: sub_type,
            })
        }
    };

    let view_number = data.read_u16()?;
    let sequence_number = data.read_u16()?;

    let addr = data.read_address(afi)?;
    let prefix_len = data.read_u8()?;
    if prefix_len > afi.max_prefix_len() {
        return Err(ParserError::BadPrefixWidth {
            bits: prefix_len,
            afi,
        });
    }
    let prefix = match addr {
        std::net::IpAddr::V4(v4) => IpNet::V4(Ipv4Net::new(v4, prefix_len).unwrap()),
        std::net::IpAddr::V6(v6) => IpNet::V6(Ipv6Net::new(v6, prefix_len).unwrap()),
    };

    let status = data.read_u8()?;
    let originated_time = data.read_u32()?;
    let peer_address = data.read_address(afi)?;
    let peer_asn = data.read_asn(AsnLength::Bits16)?;

    let attribute_length = data.read_u16()? as usize;
    let attr_data = data.read_n_bytes(attribute_length)?;
    let attributes = parse_attributes(attr_data, BgpMessageFlags::empty(), false)?;

    Ok(TableDumpMessage {
        view_number,
        sequence_number,
        prefix: NetworkPrefix::new(prefix, None),
        status,
        originated_time,
        peer_address,
        peer_asn,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_parse_table_dump_v1() {
        let mut buf = vec![];
        buf.extend_from_slice(&0u16.to_be_bytes()); // view
        buf.extend_from_slice(&7u16.to_be_bytes()); // sequence
        buf.extend_from_slice(&[192, 0, 2, 0]); // prefix address
        buf.push(24); // prefix length
        buf.push(1); // status
        buf.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]); // peer address
        buf.extend_from_slice(&65001u16.to_be_bytes()); // peer asn
        buf.extend_from_slice(&0u16.to_be_bytes()); // attribute length

        let msg = parse_table_dump_message(1, Bytes::from(buf)).unwrap();
        assert_eq!(msg.sequence_number, 7);
        assert_eq!(msg.prefix.prefix, IpNet::from_str("192.0.2.0/24").unwrap());
        assert_eq!(msg.peer_asn, 65001);
        assert!(!msg.peer_asn.is_four_byte());
    }

    #[test]
    fn test_bad_subtype() {
        let res = parse_table_dump_message(3, Bytes::new());
        assert!(matches!(res, Err(ParserError::BadSubtype { .. })));
    }
}
