use crate::error::ParserError;
use crate::models::*;
use crate::parser::ReadUtils;
use bytes::{Buf, Bytes};
use log::warn;
use smallvec::SmallVec;
use std::net::IpAddr;

const AS_PATH_SEQUENCE: u8 = 2;
const AS_PATH_SET: u8 = 1;
const AS_PATH_CONFED_SEQUENCE: u8 = 3;
const AS_PATH_CONFED_SET: u8 = 4;

/// Parse a BGP path attribute list.
///
/// `rib_encoding` selects the abbreviated MP_REACH_NLRI form used inside
/// TABLE_DUMP_V2 RIB entries (next hop only, no AFI/SAFI/NLRI; RFC 6396
/// section 4.3.4).
pub fn parse_attributes(
    mut data: Bytes,
    flags: BgpMessageFlags,
    rib_encoding: bool,
) -> Result<Attributes, ParserError> {
    let asn_len = flags.asn_length();
    let add_path = flags.contains(BgpMessageFlags::ADDPATH);
    let mut attributes: Vec<Attribute> = Vec::with_capacity(8);

    while data.remaining() >= 3 {
        let attr_flags = AttrFlags::from_bits_retain(data.read_u8()?);
        let attr_type = data.read_u8()?;
        let attr_length = match attr_flags.contains(AttrFlags::EXTENDED) {
            true => data.read_u16()? as usize,
            false => data.read_u8()? as usize,
        };
        let attr_data = data.read_n_bytes(attr_length)?;

        let value = match AttrType::try_from(attr_type) {
            Ok(t) => parse_attribute_value(t, attr_data, asn_len, add_path, rib_encoding)?,
            Err(_) => AttributeValue::Raw(attr_data),
        };

        attributes.push(Attribute {
            attr_type,
            flags: attr_flags,
            value,
        });
    }

    if data.has_remaining() {
        warn!(
            "{} dangling bytes at the end of an attribute list",
            data.remaining()
        );
    }

    Ok(attributes.into_iter().collect())
}

fn parse_attribute_value(
    attr_type: AttrType,
    mut data: Bytes,
    asn_len: AsnLength,
    add_path: bool,
    rib_encoding: bool,
) -> Result<AttributeValue, ParserError> {
    Ok(match attr_type {
        AttrType::ORIGIN => {
            let value = data.read_u8()?;
            let origin = Origin::try_from(value).map_err(|_| {
                ParserError::ParseError(format!("invalid ORIGIN value: {value}"))
            })?;
            AttributeValue::Origin(origin)
        }
        AttrType::AS_PATH => AttributeValue::AsPath(parse_as_path(data, asn_len)?),
        // AS4_PATH always carries 4-octet AS numbers
        AttrType::AS4_PATH => AttributeValue::As4Path(parse_as_path(data, AsnLength::Bits32)?),
        AttrType::NEXT_HOP => AttributeValue::NextHop(parse_next_hop(&mut data)?),
        AttrType::MULTI_EXIT_DISCRIMINATOR => {
            AttributeValue::MultiExitDiscriminator(data.read_u32()?)
        }
        AttrType::LOCAL_PREFERENCE => AttributeValue::LocalPreference(data.read_u32()?),
        AttrType::ATOMIC_AGGREGATE => AttributeValue::AtomicAggregate,
        AttrType::AGGREGATOR => {
            let asn = data.read_asn(asn_len)?;
            let addr = data.read_ipv4_address()?;
            AttributeValue::Aggregator(asn, addr)
        }
        AttrType::AS4_AGGREGATOR => {
            let asn = data.read_asn(AsnLength::Bits32)?;
            let addr = data.read_ipv4_address()?;
            AttributeValue::Aggregator(asn, addr)
        }
        AttrType::COMMUNITIES => {
            if data.remaining() % 4 != 0 {
                return Err(ParserError::ParseError(format!(
                    "COMMUNITIES length {} is not a multiple of 4",
                    data.remaining()
                )));
            }
            let mut communities = Vec::with_capacity(data.remaining() / 4);
            while data.has_remaining() {
                communities.push(Community(data.read_u32()?));
            }
            AttributeValue::Communities(communities)
        }
        AttrType::ORIGINATOR_ID => AttributeValue::OriginatorId(data.read_ipv4_address()?),
        AttrType::CLUSTER_LIST => {
            let mut ids = Vec::with_capacity(data.remaining() / 4);
            while data.has_remaining() {
                ids.push(data.read_ipv4_address()?);
            }
            AttributeValue::ClusterList(ids)
        }
        AttrType::MP_REACHABLE_NLRI => {
            AttributeValue::MpReachNlri(parse_mp_reach(data, add_path, rib_encoding)?)
        }
        AttrType::MP_UNREACHABLE_NLRI => {
            AttributeValue::MpUnreachNlri(parse_mp_unreach(data, add_path)?)
        }
        AttrType::ONLY_TO_CUSTOMER => AttributeValue::OnlyToCustomer(data.read_asn(AsnLength::Bits32)?),
        // present so `-attr` can see them, but the filters never look inside
        AttrType::EXTENDED_COMMUNITIES | AttrType::LARGE_COMMUNITIES => {
            AttributeValue::Raw(data)
        }
    })
}

fn parse_as_path(mut data: Bytes, asn_len: AsnLength) -> Result<AsPath, ParserError> {
    let mut segments = vec![];
    while data.has_remaining() {
        let seg_type = data.read_u8()?;
        let count = data.read_u8()? as usize;
        let mut asns: SmallVec<[Asn; 6]> = SmallVec::with_capacity(count);
        for _ in 0..count {
            asns.push(data.read_asn(asn_len)?);
        }
        segments.push(match seg_type {
            AS_PATH_SEQUENCE => AsPathSegment::AsSequence(asns),
            AS_PATH_SET => AsPathSegment::AsSet(asns),
            AS_PATH_CONFED_SEQUENCE => AsPathSegment::ConfedSequence(asns),
            AS_PATH_CONFED_SET => AsPathSegment::ConfedSet(asns),
            _ => {
                return Err(ParserError::ParseError(format!(
                    "invalid AS_PATH segment type: {seg_type}"
                )))
            }
        });
    }
    Ok(AsPath::from_segments(segments))
}

fn parse_next_hop(data: &mut Bytes) -> Result<IpAddr, ParserError> {
    match data.remaining() {
        4 => data.read_ipv4_address().map(IpAddr::V4),
        16 => data.read_ipv6_address().map(IpAddr::V6),
        n => Err(ParserError::ParseError(format!(
            "invalid NEXT_HOP length: {n}"
        ))),
    }
}

/// Next-hop field shared by MP_REACH and the RIB short form: 4, 16, or 32
/// bytes (the last being a global/link-local IPv6 pair, of which the
/// global address is kept).
fn parse_mp_next_hop(data: &mut Bytes, len: usize) -> Result<Option<IpAddr>, ParserError> {
    Ok(match len {
        0 => None,
        4 => Some(IpAddr::V4(data.read_ipv4_address()?)),
        16 => Some(IpAddr::V6(data.read_ipv6_address()?)),
        32 => {
            let global = IpAddr::V6(data.read_ipv6_address()?);
            data.read_ipv6_address()?;
            Some(global)
        }
        n => {
            return Err(ParserError::ParseError(format!(
                "invalid MP next hop length: {n}"
            )))
        }
    })
}

fn parse_mp_reach(
    mut data: Bytes,
    add_path: bool,
    rib_encoding: bool,
) -> Result<Nlri, ParserError> {
    if rib_encoding {
        // RFC 6396 4.3.4: only the next hop survives in RIB entries
        let nh_len = data.read_u8()? as usize;
        let next_hop = parse_mp_next_hop(&mut data, nh_len)?;
        let afi = match next_hop {
            Some(IpAddr::V4(_)) => Afi::Ipv4,
            _ => Afi::Ipv6,
        };
        return Ok(Nlri {
            afi,
            safi: Safi::Unicast,
            next_hop,
            prefixes: vec![],
        });
    }

    let afi = data.read_afi()?;
    let safi = data.read_safi()?;
    let nh_len = data.read_u8()? as usize;
    let next_hop = parse_mp_next_hop(&mut data, nh_len)?;
    // reserved octet
    data.read_u8()?;

    let mut prefixes = vec![];
    while data.has_remaining() {
        prefixes.push(data.read_nlri_prefix(afi, add_path)?);
    }

    Ok(Nlri {
        afi,
        safi,
        next_hop,
        prefixes,
    })
}

fn parse_mp_unreach(mut data: Bytes, add_path: bool) -> Result<Nlri, ParserError> {
    let afi = data.read_afi()?;
    let safi = data.read_safi()?;
    let mut prefixes = vec![];
    while data.has_remaining() {
        prefixes.push(data.read_nlri_prefix(afi, add_path)?);
    }
    Ok(Nlri {
        afi,
        safi,
        next_hop: None,
        prefixes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr_bytes(attr_type: u8, value: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x40, attr_type, value.len() as u8];
        buf.extend_from_slice(value);
        buf
    }

    #[test]
    fn test_parse_as_path_16bit() {
        let mut value = vec![AS_PATH_SEQUENCE, 3];
        for asn in [65001u16, 65002, 65003] {
            value.extend_from_slice(&asn.to_be_bytes());
        }
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(2, &value)),
            BgpMessageFlags::empty(),
            false,
        )
        .unwrap();
        let path = attrs.as_path().unwrap();
        let asns: Vec<u32> = path.iter_asns().map(|a| a.to_u32()).collect();
        assert_eq!(asns, vec![65001, 65002, 65003]);
    }

    #[test]
    fn test_parse_as_path_32bit() {
        let mut value = vec![AS_PATH_SEQUENCE, 2];
        for asn in [396982u32, 13335] {
            value.extend_from_slice(&asn.to_be_bytes());
        }
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(2, &value)),
            BgpMessageFlags::ASN32BIT,
            false,
        )
        .unwrap();
        let asns: Vec<u32> = attrs.as_path().unwrap().iter_asns().map(|a| a.to_u32()).collect();
        assert_eq!(asns, vec![396982, 13335]);
    }

    #[test]
    fn test_parse_communities() {
        let mut value = vec![];
        value.extend_from_slice(&Community::new(65001, 666).0.to_be_bytes());
        value.extend_from_slice(&Community::BLACKHOLE.0.to_be_bytes());
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(8, &value)),
            BgpMessageFlags::empty(),
            false,
        )
        .unwrap();
        let communities = attrs.communities().unwrap();
        assert_eq!(communities, &[Community::new(65001, 666), Community::BLACKHOLE]);
    }

    #[test]
    fn test_parse_mp_reach_v6() {
        let mut value = vec![];
        value.extend_from_slice(&2u16.to_be_bytes()); // afi ipv6
        value.push(1); // safi unicast
        value.push(16);
        value.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        value.push(0); // reserved
        value.extend_from_slice(&[32, 0x20, 0x01, 0x0d, 0xb8]); // 2001:db8::/32
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(14, &value)),
            BgpMessageFlags::empty(),
            false,
        )
        .unwrap();
        let nlri = attrs.mp_reach().unwrap();
        assert_eq!(nlri.afi, Afi::Ipv6);
        assert_eq!(nlri.prefixes[0].to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_mp_reach_rib_form() {
        let mut value = vec![16];
        value.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(14, &value)),
            BgpMessageFlags::ASN32BIT,
            true,
        )
        .unwrap();
        let nlri = attrs.mp_reach().unwrap();
        assert!(nlri.prefixes.is_empty());
        assert_eq!(nlri.next_hop.unwrap().to_string(), "2001:db8::1");
    }

    #[test]
    fn test_unknown_attr_kept_raw() {
        let attrs = parse_attributes(
            Bytes::from(attr_bytes(99, &[1, 2, 3])),
            BgpMessageFlags::empty(),
            false,
        )
        .unwrap();
        assert!(attrs.has_attr(99));
        assert!(!attrs.has_attr(8));
    }

    #[test]
    fn test_truncated_attr() {
        // declares 10 value bytes, provides 2
        let data = Bytes::from_static(&[0x40, 8, 10, 0, 0]);
        assert!(matches!(
            parse_attributes(data, BgpMessageFlags::empty(), false),
            Err(ParserError::Truncated(_))
        ));
    }
}
