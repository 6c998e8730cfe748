//! MRT table dump version 2 structs, including the peer-offset table that
//! backs indexed peer lookups.
use crate::error::ParserError;
use crate::models::*;
use bitflags::bitflags;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// TableDump message version 2 enum
#[derive(Debug)]
pub enum TableDumpV2Message {
    PeerIndexTable(PeerIndexTable),
    RibAfi(RibAfiEntries),
    RibGeneric(RibGenericEntries),
}

/// TableDump version 2 subtypes.
///
/// <https://www.iana.org/assignments/mrt/mrt.xhtml#subtype-codes>
#[derive(Debug, TryFromPrimitive, IntoPrimitive, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TableDumpV2Type {
    PeerIndexTable = 1,
    RibIpv4Unicast = 2,
    RibIpv4Multicast = 3,
    RibIpv6Unicast = 4,
    RibIpv6Multicast = 5,
    RibGeneric = 6,
    GeoPeerTable = 7,
    RibIpv4UnicastAddPath = 8,
    RibIpv4MulticastAddPath = 9,
    RibIpv6UnicastAddPath = 10,
    RibIpv6MulticastAddPath = 11,
    RibGenericAddPath = 12,
}

impl TableDumpV2Type {
    /// True for the RFC 8050 subtypes whose RIB entries carry a path id.
    pub const fn is_addpath(&self) -> bool {
        matches!(
            self,
            TableDumpV2Type::RibIpv4UnicastAddPath
                | TableDumpV2Type::RibIpv4MulticastAddPath
                | TableDumpV2Type::RibIpv6UnicastAddPath
                | TableDumpV2Type::RibIpv6MulticastAddPath
                | TableDumpV2Type::RibGenericAddPath
        )
    }

    pub const fn afi(&self) -> Option<Afi> {
        match self {
            TableDumpV2Type::RibIpv4Unicast
            | TableDumpV2Type::RibIpv4Multicast
            | TableDumpV2Type::RibIpv4UnicastAddPath
            | TableDumpV2Type::RibIpv4MulticastAddPath => Some(Afi::Ipv4),
            TableDumpV2Type::RibIpv6Unicast
            | TableDumpV2Type::RibIpv6Multicast
            | TableDumpV2Type::RibIpv6UnicastAddPath
            | TableDumpV2Type::RibIpv6MulticastAddPath => Some(Afi::Ipv6),
            _ => None,
        }
    }
}

bitflags! {
    /// Peer entry type byte: bit 0 selects IPv6 addressing, bit 1 a
    /// 4-octet AS number.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct PeerType: u8 {
        const ADDRESS_FAMILY_IPV6 = 0x1;
        const AS_SIZE_32BIT = 0x2;
    }
}

impl PeerType {
    /// Encoded size of a peer entry with these flags: type byte, BGP id,
    /// address, AS number.
    pub const fn encoded_size(&self) -> usize {
        let addr = if self.contains(PeerType::ADDRESS_FAMILY_IPV6) {
            16
        } else {
            4
        };
        let asn = if self.contains(PeerType::AS_SIZE_32BIT) {
            4
        } else {
            2
        };
        1 + 4 + addr + asn
    }
}

/// A peer entry from a PEER_INDEX_TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub peer_type: PeerType,
    pub peer_bgp_id: Ipv4Addr,
    pub peer_address: IpAddr,
    pub peer_asn: Asn,
}

impl Peer {
    /// Decode the peer entry starting at `offset` in a packed peer region.
    /// Returns the entry and its encoded size.
    pub(crate) fn parse_at(buf: &[u8], offset: usize) -> Result<(Peer, usize), ParserError> {
        let truncated =
            || ParserError::Truncated(format!("peer entry at offset {offset} runs past the table"));

        let flags = *buf.get(offset).ok_or_else(truncated)?;
        let peer_type = PeerType::from_bits_retain(flags);
        let size = peer_type.encoded_size();
        let entry = buf.get(offset..offset + size).ok_or_else(truncated)?;

        let peer_bgp_id = Ipv4Addr::from(u32::from_be_bytes(entry[1..5].try_into().unwrap()));
        let (peer_address, asn_off): (IpAddr, usize) =
            if peer_type.contains(PeerType::ADDRESS_FAMILY_IPV6) {
                let octets: [u8; 16] = entry[5..21].try_into().unwrap();
                (IpAddr::V6(Ipv6Addr::from(octets)), 21)
            } else {
                let octets: [u8; 4] = entry[5..9].try_into().unwrap();
                (IpAddr::V4(Ipv4Addr::from(octets)), 9)
            };
        let peer_asn = if peer_type.contains(PeerType::AS_SIZE_32BIT) {
            Asn::new_32bit(u32::from_be_bytes(entry[asn_off..asn_off + 4].try_into().unwrap()))
        } else {
            Asn::new_16bit(u16::from_be_bytes(entry[asn_off..asn_off + 2].try_into().unwrap()))
        };

        Ok((
            Peer {
                peer_type,
                peer_bgp_id,
                peer_address,
                peer_asn,
            },
            size,
        ))
    }
}

/// Byte offsets of already-scanned peer entries.
///
/// `valid` counts the entries whose offsets have been published. Offset
/// slots use relaxed loads and stores: every writer that touches a slot
/// stores the same value (offsets are a pure function of the packed
/// bytes), so racing scans are benign. The acquire load on `valid` pairs
/// with the release CAS that advances it, making the covered slots
/// visible to readers on the fast path.
#[derive(Debug)]
struct PeerOffsetTable {
    valid: AtomicU32,
    offsets: Box<[AtomicU32]>,
}

impl PeerOffsetTable {
    fn new(peer_count: u16) -> Self {
        PeerOffsetTable {
            valid: AtomicU32::new(0),
            offsets: (0..peer_count).map(|_| AtomicU32::new(0)).collect(),
        }
    }
}

/// Peer index table.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.3.1>
///
/// Peer entries are variable-size and packed back-to-back, so the table
/// keeps them unparsed and resolves indexed lookups through a lazily
/// installed [PeerOffsetTable]. Concurrent installation attempts collapse
/// to one; the losers' tables are dropped.
#[derive(Debug)]
pub struct PeerIndexTable {
    pub collector_bgp_id: Ipv4Addr,
    pub view_name: String,
    pub peer_count: u16,
    peers_buf: Bytes,
    offsets: OnceLock<PeerOffsetTable>,
}

impl PeerIndexTable {
    pub fn new(
        collector_bgp_id: Ipv4Addr,
        view_name: String,
        peer_count: u16,
        peers_buf: Bytes,
    ) -> Self {
        PeerIndexTable {
            collector_bgp_id,
            view_name,
            peer_count,
            peers_buf,
            offsets: OnceLock::new(),
        }
    }

    fn offset_table(&self) -> &PeerOffsetTable {
        if let Some(tab) = self.offsets.get() {
            return tab;
        }
        let _ = self.offsets.set(PeerOffsetTable::new(self.peer_count));
        self.offsets.get().unwrap()
    }

    /// Look up peer `index`, amortizing the linear scan over the packed
    /// entries across calls (and across threads sharing this record).
    pub fn get_peer_by_index(&self, index: u16) -> Result<Peer, ParserError> {
        let tab = self.offset_table();

        let valid = tab.valid.load(Ordering::Acquire);
        if (index as u32) < valid {
            let off = tab.offsets[index as usize].load(Ordering::Relaxed) as usize;
            return Peer::parse_at(&self.peers_buf, off).map(|(peer, _)| peer);
        }

        if index >= self.peer_count {
            return Err(ParserError::BadPeerIndex {
                index,
                peer_count: self.peer_count,
            });
        }

        // Resume the scan right after the last known entry; everything
        // before `valid` is already well-formed.
        let mut cursor = if valid == 0 {
            0
        } else {
            let last = tab.offsets[(valid - 1) as usize].load(Ordering::Relaxed) as usize;
            let (_, size) = Peer::parse_at(&self.peers_buf, last)?;
            last + size
        };

        let mut target_offset = 0usize;
        for next in valid..=index as u32 {
            tab.offsets[next as usize].store(cursor as u32, Ordering::Relaxed);
            if next == index as u32 {
                target_offset = cursor;
            }
            let (_, size) = Peer::parse_at(&self.peers_buf, cursor)?;
            cursor += size;
        }

        // A failed exchange means another scan advanced the counter
        // concurrently; it stored the same offsets, so there is nothing to
        // retry.
        let _ = tab.valid.compare_exchange(
            valid,
            index as u32 + 1,
            Ordering::Release,
            Ordering::Relaxed,
        );

        Peer::parse_at(&self.peers_buf, target_offset).map(|(peer, _)| peer)
    }

    /// Iterate over all peer entries in table order.
    pub fn peers(&self) -> PeerIter<'_> {
        PeerIter {
            buf: &self.peers_buf,
            pos: 0,
            next_idx: 0,
            count: self.peer_count,
            done: false,
        }
    }
}

/// Cursor over the packed peer entries of a [PeerIndexTable].
pub struct PeerIter<'a> {
    buf: &'a [u8],
    pos: usize,
    next_idx: u16,
    count: u16,
    done: bool,
}

impl Iterator for PeerIter<'_> {
    type Item = Result<Peer, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.next_idx == self.count {
            self.done = true;
            if self.pos != self.buf.len() {
                // trailing bytes: the count field under-declared
                return Some(Err(ParserError::BadCount {
                    expected: self.count as usize,
                    got: self.count as usize + 1,
                }));
            }
            return None;
        }
        if self.pos == self.buf.len() {
            self.done = true;
            return Some(Err(ParserError::BadCount {
                expected: self.count as usize,
                got: self.next_idx as usize,
            }));
        }
        match Peer::parse_at(self.buf, self.pos) {
            Ok((peer, size)) => {
                self.pos += size;
                self.next_idx += 1;
                Some(Ok(peer))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// AFI/SAFI-specific RIB subtype payload.
///
/// ```text
///         0                   1                   2                   3
///         0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                         Sequence Number                       |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        | Prefix Length |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                        Prefix (variable)                      |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |         Entry Count           |  RIB Entries (variable)
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug)]
pub struct RibAfiEntries {
    pub rib_type: TableDumpV2Type,
    pub sequence_number: u32,
    pub prefix: NetworkPrefix,
    pub rib_entries: Vec<RibEntry>,
}

/// RIB_GENERIC payload: an explicit AFI/SAFI pair plus a single NLRI.
#[derive(Debug)]
pub struct RibGenericEntries {
    pub sequence_number: u32,
    pub afi: Afi,
    pub safi: Safi,
    pub nlri: NetworkPrefix,
    pub rib_entries: Vec<RibEntry>,
}

/// RIB entry: a peer index into the PEER_INDEX_TABLE, an originated time,
/// an optional RFC 8050 path id, and the BGP path attributes.
#[derive(Debug)]
pub struct RibEntry {
    pub peer_index: u16,
    pub originated_time: u32,
    pub path_id: Option<u32>,
    pub attributes: Attributes,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::Arc;

    fn packed_peers() -> Bytes {
        // peer 0: AS32 IPv4 10.0.0.1, ASN 65001
        // peer 1: AS16 IPv6 2001:db8::1, ASN 64512
        let mut buf = vec![];
        buf.push(0x2);
        buf.extend_from_slice(&[192, 0, 2, 1]); // bgp id
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&65001u32.to_be_bytes());
        buf.push(0x1);
        buf.extend_from_slice(&[192, 0, 2, 2]);
        buf.extend_from_slice(&Ipv6Addr::from_str("2001:db8::1").unwrap().octets());
        buf.extend_from_slice(&64512u16.to_be_bytes());
        Bytes::from(buf)
    }

    fn table() -> PeerIndexTable {
        PeerIndexTable::new(Ipv4Addr::new(192, 0, 2, 0), "test".to_string(), 2, packed_peers())
    }

    #[test]
    fn test_indexed_lookup() {
        let tab = table();
        let p1 = tab.get_peer_by_index(1).unwrap();
        assert_eq!(p1.peer_address, IpAddr::from_str("2001:db8::1").unwrap());
        assert_eq!(p1.peer_asn, 64512);
        assert!(!p1.peer_asn.is_four_byte());

        // fast path after the scan
        let p0 = tab.get_peer_by_index(0).unwrap();
        assert_eq!(p0.peer_address, IpAddr::from_str("10.0.0.1").unwrap());
        assert_eq!(p0.peer_asn, 65001);
        assert!(p0.peer_asn.is_four_byte());
    }

    #[test]
    fn test_bad_peer_index() {
        let tab = table();
        assert!(matches!(
            tab.get_peer_by_index(2),
            Err(ParserError::BadPeerIndex {
                index: 2,
                peer_count: 2
            })
        ));

        let empty =
            PeerIndexTable::new(Ipv4Addr::new(0, 0, 0, 0), String::new(), 0, Bytes::new());
        assert!(matches!(
            empty.get_peer_by_index(0),
            Err(ParserError::BadPeerIndex { .. })
        ));
    }

    #[test]
    fn test_offsets_match_linear_scan() {
        let tab = table();
        let scanned: Vec<Peer> = tab.peers().collect::<Result<_, _>>().unwrap();
        for (i, expected) in scanned.iter().enumerate() {
            assert_eq!(&tab.get_peer_by_index(i as u16).unwrap(), expected);
        }
    }

    #[test]
    fn test_iter_count_mismatch() {
        let over = PeerIndexTable::new(
            Ipv4Addr::new(0, 0, 0, 0),
            String::new(),
            3,
            packed_peers(),
        );
        let last = over.peers().last().unwrap();
        assert!(matches!(
            last,
            Err(ParserError::BadCount {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_concurrent_lookups() {
        let tab = Arc::new(table());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tab = Arc::clone(&tab);
                std::thread::spawn(move || {
                    let idx = (i % 2) as u16;
                    tab.get_peer_by_index(idx).unwrap()
                })
            })
            .collect();
        let results: Vec<Peer> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let fresh: Vec<Peer> = tab.peers().collect::<Result<_, _>>().unwrap();
        for (i, peer) in results.iter().enumerate() {
            assert_eq!(peer, &fresh[i % 2]);
        }
    }
}
