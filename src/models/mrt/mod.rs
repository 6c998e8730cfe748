//! MRT record and message structs.

pub mod bgp4mp;
pub mod table_dump;
pub mod table_dump_v2;
pub mod zebra;

pub use bgp4mp::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
pub use table_dump::*;
pub use table_dump_v2::*;
pub use zebra::*;

/// MrtRecord is a wrapper struct that contains a header and a message.
///
/// See [CommonHeader] for the content in header, and [MrtMessage] for the
/// message format.
#[derive(Debug)]
pub struct MrtRecord {
    pub common_header: CommonHeader,
    pub message: MrtMessage,
}

/// MRT common header.
///
/// A CommonHeader ([RFC6396 section 2][header-link]) is constructed as the following:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |             Type              |            Subtype            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             Length                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Types with the `_ET` suffix carry an extra 4-byte microsecond timestamp
/// field between the header and the message. `length` always stores the
/// message length only; the microsecond field is accounted for separately.
///
/// [header-link]: https://datatracker.ietf.org/doc/html/rfc6396#section-2
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommonHeader {
    pub timestamp: u32,
    pub microsecond_timestamp: Option<u32>,
    pub entry_type: EntryType,
    pub entry_subtype: u16,
    pub length: u32,
}

impl CommonHeader {
    /// Timestamp with sub-second precision folded in.
    pub fn timestamp_secs(&self) -> f64 {
        match self.microsecond_timestamp {
            Some(us) => self.timestamp as f64 + us as f64 / 1_000_000.0,
            None => self.timestamp as f64,
        }
    }
}

#[derive(Debug)]
pub enum MrtMessage {
    TableDumpMessage(TableDumpMessage),
    TableDumpV2Message(TableDumpV2Message),
    Bgp4Mp(Bgp4Mp),
    Zebra(ZebraMessage),
}

/// MRT entry type.
///
/// EntryType indicates the type of the current MRT record. Types 0 to 4 and
/// 6 to 10 are deprecated; type 5 (the pre-BGP4MP `BGP` format emitted by
/// Zebra) is kept because route collector archives from the late 1990s
/// still carry it.
///
/// Excerpt from [RFC6396 section 4](https://datatracker.ietf.org/doc/html/rfc6396#section-4):
/// ```text
///     11   OSPFv2
///     12   TABLE_DUMP
///     13   TABLE_DUMP_V2
///     16   BGP4MP
///     17   BGP4MP_ET
///     32   ISIS
///     33   ISIS_ET
///     48   OSPFv3
///     49   OSPFv3_ET
/// ```
#[allow(non_camel_case_types)]
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum EntryType {
    BGP = 5,
    TABLE_DUMP = 12,
    TABLE_DUMP_V2 = 13,
    BGP4MP = 16,
    BGP4MP_ET = 17,
}

impl EntryType {
    /// True for types whose header carries the 4-byte microsecond field.
    pub const fn has_extended_timestamp(&self) -> bool {
        matches!(self, EntryType::BGP4MP_ET)
    }
}
