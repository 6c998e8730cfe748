/*!
error module defines the error types used across bgpsieve.
*/
use crate::filter::VmError;
use crate::models::{Afi, Bgp4MpType, BgpState, EntryType, TableDumpV2Type, ZebraType};
use num_enum::TryFromPrimitiveError;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::{error::Error, fmt, io};

#[derive(Debug)]
pub enum ParserError {
    IoError(io::Error),
    EofError(io::Error),
    /// The decoder would have to step past the declared end of the data.
    Truncated(String),
    /// The MRT type code is not one this crate understands.
    UnrecognizedMrtType(u16),
    /// The subtype code is not valid for the record's MRT type.
    BadSubtype { mrt_type: &'static str, subtype: u16 },
    /// An iterator finished with a different number of items than the
    /// record's count field declared.
    BadCount { expected: usize, got: usize },
    /// A RIB entry references a peer index past the PEER_INDEX_TABLE size.
    BadPeerIndex { index: u16, peer_count: u16 },
    UnsupportedAfi(u16),
    UnsupportedSafi(u8),
    /// Prefix bit-length exceeds the maximum for its address family.
    BadPrefixWidth { bits: u8, afi: Afi },
    /// An unwrapped BGP message exceeds the plain (4096) or extended
    /// (65535) message size limit.
    OversizedMessage { length: usize, limit: usize },
    ParseError(String),
    FilterError(String),
    VmError(VmError),
}

impl Error for ParserError {}

/// How far up the processing stack an error should unwind.
///
/// The outer loops in `peerindex` and `bgpgrep` interpret the variant and
/// continue with the next file, record, or sub-item accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Abort the process.
    Fatal,
    /// Drop the current input file, continue with the next.
    DropFile,
    /// Drop the current record, continue with the next one in the stream.
    DropRecord,
    /// Warn and skip the offending sub-item, continue the record.
    DropItem,
}

impl ParserError {
    pub fn recovery(&self) -> Recovery {
        match self {
            ParserError::IoError(_) | ParserError::EofError(_) => Recovery::DropFile,
            ParserError::Truncated(_)
            | ParserError::UnrecognizedMrtType(_)
            | ParserError::BadSubtype { .. }
            | ParserError::UnsupportedAfi(_)
            | ParserError::UnsupportedSafi(_)
            | ParserError::BadPrefixWidth { .. }
            | ParserError::OversizedMessage { .. }
            | ParserError::ParseError(_) => Recovery::DropRecord,
            ParserError::BadCount { .. } | ParserError::BadPeerIndex { .. } => Recovery::DropItem,
            ParserError::FilterError(_) | ParserError::VmError(_) => Recovery::Fatal,
        }
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParserError::IoError(e) => write!(f, "I/O error: {e}"),
            ParserError::EofError(e) => write!(f, "unexpected end of file: {e}"),
            ParserError::Truncated(s) => write!(f, "truncated: {s}"),
            ParserError::UnrecognizedMrtType(t) => write!(f, "unrecognized MRT type: {t}"),
            ParserError::BadSubtype { mrt_type, subtype } => {
                write!(f, "bad {mrt_type} subtype: {subtype}")
            }
            ParserError::BadCount { expected, got } => {
                write!(f, "entry count mismatch: declared {expected}, found {got}")
            }
            ParserError::BadPeerIndex { index, peer_count } => {
                write!(
                    f,
                    "peer index {index} out of range (table has {peer_count} peers)"
                )
            }
            ParserError::UnsupportedAfi(afi) => write!(f, "unsupported AFI: {afi}"),
            ParserError::UnsupportedSafi(safi) => write!(f, "unsupported SAFI: {safi}"),
            ParserError::BadPrefixWidth { bits, afi } => {
                write!(f, "prefix length {bits} exceeds {afi:?} maximum")
            }
            ParserError::OversizedMessage { length, limit } => {
                write!(f, "BGP message of {length} bytes exceeds limit of {limit}")
            }
            ParserError::ParseError(s) => write!(f, "parse error: {s}"),
            ParserError::FilterError(s) => write!(f, "filter error: {s}"),
            ParserError::VmError(e) => write!(f, "filter vm error: {e}"),
        }
    }
}

impl From<io::Error> for ParserError {
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            ErrorKind::UnexpectedEof => ParserError::EofError(io_error),
            _ => ParserError::IoError(io_error),
        }
    }
}

impl From<VmError> for ParserError {
    fn from(e: VmError) -> Self {
        ParserError::VmError(e)
    }
}

impl From<TryFromPrimitiveError<EntryType>> for ParserError {
    fn from(value: TryFromPrimitiveError<EntryType>) -> Self {
        ParserError::UnrecognizedMrtType(value.number)
    }
}

impl From<TryFromPrimitiveError<Bgp4MpType>> for ParserError {
    fn from(value: TryFromPrimitiveError<Bgp4MpType>) -> Self {
        ParserError::BadSubtype {
            mrt_type: "bgp4mp",
            subtype: value.number,
        }
    }
}

impl From<TryFromPrimitiveError<TableDumpV2Type>> for ParserError {
    fn from(value: TryFromPrimitiveError<TableDumpV2Type>) -> Self {
        ParserError::BadSubtype {
            mrt_type: "table dump v2",
            subtype: value.number,
        }
    }
}

impl From<TryFromPrimitiveError<ZebraType>> for ParserError {
    fn from(value: TryFromPrimitiveError<ZebraType>) -> Self {
        ParserError::BadSubtype {
            mrt_type: "zebra bgp",
            subtype: value.number,
        }
    }
}

impl From<TryFromPrimitiveError<BgpState>> for ParserError {
    fn from(value: TryFromPrimitiveError<BgpState>) -> Self {
        ParserError::ParseError(format!("cannot parse bgp4mp state: {}", value.number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_classes() {
        let io = ParserError::from(io::Error::new(ErrorKind::ConnectionReset, "reset"));
        assert_eq!(io.recovery(), Recovery::DropFile);

        let eof = ParserError::from(io::Error::new(ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(eof, ParserError::EofError(_)));
        assert_eq!(eof.recovery(), Recovery::DropFile);

        let trunc = ParserError::Truncated("peer entry".to_string());
        assert_eq!(trunc.recovery(), Recovery::DropRecord);

        let idx = ParserError::BadPeerIndex {
            index: 3,
            peer_count: 2,
        };
        assert_eq!(idx.recovery(), Recovery::DropItem);

        let vm = ParserError::VmError(VmError::StackUnderflow);
        assert_eq!(vm.recovery(), Recovery::Fatal);
    }
}
