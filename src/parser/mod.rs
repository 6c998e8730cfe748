pub mod bgp;
pub mod mrt;
pub mod utils;

pub use self::utils::ReadUtils;
pub use bgp::{parse_attributes, parse_bgp_message, CapabilityIter, ParamIter};
pub use mrt::{
    parse_common_header, parse_mrt_body, parse_mrt_record, parse_mrt_record_from_buf,
    try_parse_common_header, try_parse_mrt_record, try_parse_raw_record, RawMrtRecord,
};

use crate::error::ParserError;
use crate::io::get_reader;
use crate::models::MrtRecord;
use std::io::Read;

/// Streaming MRT reader over a possibly compressed input.
pub struct MrtReader {
    reader: Box<dyn Read>,
    done: bool,
}

impl MrtReader {
    /// Open `path` with extension-sniffed decompression; `-` reads stdin.
    pub fn new(path: &str) -> Result<MrtReader, ParserError> {
        Ok(MrtReader::from_reader(get_reader(path)?))
    }

    pub fn from_reader(reader: Box<dyn Read>) -> MrtReader {
        MrtReader {
            reader,
            done: false,
        }
    }

    /// Frame the next record without decoding the body. `None` on a clean
    /// end of input.
    pub fn next_raw(&mut self) -> Result<Option<RawMrtRecord>, ParserError> {
        try_parse_raw_record(&mut self.reader)
    }
}

impl Iterator for MrtReader {
    type Item = Result<MrtRecord, ParserError>;

    /// Yields decoded records. A body that fails to decode yields an `Err`
    /// and iteration continues with the next record. A framing error is
    /// yielded once and ends the iteration: an I/O failure loses the
    /// stream, and a declared-length overrun only happens once the input
    /// is exhausted.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_raw() {
            Ok(Some(raw)) => Some(raw.decode()),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
