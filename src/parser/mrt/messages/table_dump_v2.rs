use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp::attributes::parse_attributes;
use crate::parser::ReadUtils;
use bytes::{Buf, Bytes};
use log::warn;
use std::net::Ipv4Addr;

/// TABLE_DUMP_V2 message parsing.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3>
pub fn parse_table_dump_v2_message(
    sub_type: u16,
    data: Bytes,
) -> Result<TableDumpV2Message, ParserError> {
    let v2_type = TableDumpV2Type::try_from(sub_type)?;
    match v2_type {
        TableDumpV2Type::PeerIndexTable => {
            Ok(TableDumpV2Message::PeerIndexTable(parse_peer_index_table(data)?))
        }
        TableDumpV2Type::RibGeneric | TableDumpV2Type::RibGenericAddPath => Ok(
            TableDumpV2Message::RibGeneric(parse_rib_generic_entries(v2_type, data)?),
        ),
        TableDumpV2Type::GeoPeerTable => Err(ParserError::BadSubtype {
            mrt_type: "table dump v2",
            subtype: sub_type,
        }),
        _ => Ok(TableDumpV2Message::RibAfi(parse_rib_afi_entries(
            v2_type, data,
        )?)),
    }
}

/// Peer index table.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3.1>
///
/// The packed peer entries stay unparsed in the returned table; indexed
/// access goes through the table's lazily built offset cache, iteration
/// through [PeerIndexTable::peers].
pub fn parse_peer_index_table(mut data: Bytes) -> Result<PeerIndexTable, ParserError> {
    let collector_bgp_id = Ipv4Addr::from(data.read_u32()?);
    let view_name_length = data.read_u16()?;
    // entirely reasonable for the view name to be empty
    let view_name = data.read_n_bytes_to_string(view_name_length as usize)?;

    let peer_count = data.read_u16()?;
    let peers_buf = data.split_to(data.remaining());

    Ok(PeerIndexTable::new(
        collector_bgp_id,
        view_name,
        peer_count,
        peers_buf,
    ))
}

/// RIB AFI-specific entries.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3.2>,
/// AddPath variants per RFC 8050.
pub fn parse_rib_afi_entries(
    rib_type: TableDumpV2Type,
    mut data: Bytes,
) -> Result<RibAfiEntries, ParserError> {
    let afi = rib_type
        .afi()
        .expect("rib_type is an AFI-specific subtype");
    let add_path = rib_type.is_addpath();

    let sequence_number = data.read_u32()?;
    // the prefix itself never carries a path id; those sit in the entries
    let prefix = data.read_nlri_prefix(afi, false)?;

    let rib_entries = parse_rib_entries(&mut data, add_path)?;

    Ok(RibAfiEntries {
        rib_type,
        sequence_number,
        prefix,
        rib_entries,
    })
}

/// RIB_GENERIC entries with an explicit AFI/SAFI pair.
pub fn parse_rib_generic_entries(
    rib_type: TableDumpV2Type,
    mut data: Bytes,
) -> Result<RibGenericEntries, ParserError> {
    let add_path = rib_type.is_addpath();

    let sequence_number = data.read_u32()?;
    let afi = data.read_afi()?;
    let safi = data.read_safi()?;
    let nlri = data.read_nlri_prefix(afi, false)?;

    let rib_entries = parse_rib_entries(&mut data, add_path)?;

    Ok(RibGenericEntries {
        sequence_number,
        afi,
        safi,
        nlri,
        rib_entries,
    })
}

/// Entry-count-prefixed RIB entry list. A count that disagrees with the
/// actual payload is reported and the well-formed entries are kept; the
/// surrounding record stays usable.
fn parse_rib_entries(data: &mut Bytes, add_path: bool) -> Result<Vec<RibEntry>, ParserError> {
    let entry_count = data.read_u16()? as usize;
    let mut rib_entries = Vec::with_capacity(entry_count.min(512));

    for parsed in 0..entry_count {
        if !data.has_remaining() {
            warn!(
                "{}",
                ParserError::BadCount {
                    expected: entry_count,
                    got: parsed,
                }
            );
            return Ok(rib_entries);
        }
        rib_entries.push(parse_rib_entry(data, add_path)?);
    }

    if data.has_remaining() {
        warn!(
            "{}",
            ParserError::BadCount {
                expected: entry_count,
                got: entry_count + 1,
            }
        );
    }
    Ok(rib_entries)
}

fn parse_rib_entry(data: &mut Bytes, add_path: bool) -> Result<RibEntry, ParserError> {
    let peer_index = data.read_u16()?;
    let originated_time = data.read_u32()?;
    let path_id = if add_path {
        Some(data.read_u32()?)
    } else {
        None
    };
    let attribute_length = data.read_u16()? as usize;
    let attr_data = data.read_n_bytes(attribute_length)?;

    // RIB entries always encode AS numbers in 4 octets and use the
    // abbreviated MP_REACH next-hop form.
    let attributes = parse_attributes(attr_data, BgpMessageFlags::ASN32BIT, true)?;

    Ok(RibEntry {
        peer_index,
        originated_time,
        path_id,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnet::IpNet;
    use std::str::FromStr;

    fn peer_index_table_payload() -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(&[192, 0, 2, 0]); // collector id
        buf.extend_from_slice(&4u16.to_be_bytes());
        buf.extend_from_slice(b"view");
        buf.extend_from_slice(&1u16.to_be_bytes()); // peer count
        buf.push(0x2); // AS32, IPv4
        buf.extend_from_slice(&[192, 0, 2, 1]);
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&65001u32.to_be_bytes());
        buf
    }

    #[test]
    fn test_parse_peer_index_table() {
        let table = parse_peer_index_table(Bytes::from(peer_index_table_payload())).unwrap();
        assert_eq!(table.view_name, "view");
        assert_eq!(table.peer_count, 1);
        let peer = table.get_peer_by_index(0).unwrap();
        assert_eq!(peer.peer_asn, 65001);
    }

    #[test]
    fn test_parse_rib_afi_entries() {
        let mut buf = vec![];
        buf.extend_from_slice(&9u32.to_be_bytes()); // sequence
        buf.push(24);
        buf.extend_from_slice(&[10, 1, 2]); // 10.1.2.0/24
        buf.extend_from_slice(&1u16.to_be_bytes()); // entry count
        buf.extend_from_slice(&0u16.to_be_bytes()); // peer index
        buf.extend_from_slice(&1_600_000_000u32.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes()); // attr len

        let rib =
            parse_rib_afi_entries(TableDumpV2Type::RibIpv4Unicast, Bytes::from(buf)).unwrap();
        assert_eq!(rib.sequence_number, 9);
        assert_eq!(rib.prefix.prefix, IpNet::from_str("10.1.2.0/24").unwrap());
        assert_eq!(rib.rib_entries.len(), 1);
        assert_eq!(rib.rib_entries[0].peer_index, 0);
        assert_eq!(rib.rib_entries[0].path_id, None);
    }

    #[test]
    fn test_rib_entry_count_over_declared() {
        let mut buf = vec![];
        buf.extend_from_slice(&9u32.to_be_bytes());
        buf.push(0); // 0.0.0.0/0
        buf.extend_from_slice(&5u16.to_be_bytes()); // claims 5 entries, has none
        let rib =
            parse_rib_afi_entries(TableDumpV2Type::RibIpv4Unicast, Bytes::from(buf)).unwrap();
        assert!(rib.rib_entries.is_empty());
    }

    #[test]
    fn test_addpath_entry() {
        let mut buf = vec![];
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(8);
        buf.push(10); // 10.0.0.0/8
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&77u32.to_be_bytes()); // path id
        buf.extend_from_slice(&0u16.to_be_bytes());

        let rib = parse_rib_afi_entries(
            TableDumpV2Type::RibIpv4UnicastAddPath,
            Bytes::from(buf),
        )
        .unwrap();
        assert_eq!(rib.rib_entries[0].path_id, Some(77));
    }
}
