//! MRT TABLE_DUMP (version 1) structs.
use crate::models::*;
use std::net::IpAddr;

/// TABLE_DUMP message, the legacy RFC 6396 section 4.2 format.
///
/// Each record carries exactly one prefix with one set of attributes; the
/// record subtype is the AFI of both the prefix and the peer address.
#[derive(Debug)]
pub struct TableDumpMessage {
    pub view_number: u16,
    pub sequence_number: u16,
    pub prefix: NetworkPrefix,
    pub status: u8,
    pub originated_time: u32,
    pub peer_address: IpAddr,
    pub peer_asn: Asn,
    pub attributes: Attributes,
}
