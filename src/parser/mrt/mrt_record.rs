use crate::error::ParserError;
use crate::models::*;
use crate::parser::mrt::messages::{
    parse_bgp4mp, parse_table_dump_message, parse_table_dump_v2_message, parse_zebra_message,
};
use crate::parser::ReadUtils;
use bytes::{Bytes, BytesMut};
use std::io::Read;
use zerocopy::big_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// On-wire MRT common header layout (12 bytes, network byte order).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
struct RawMrtCommonHeader {
    timestamp: U32,
    entry_type: U16,
    entry_subtype: U16,
    length: U32,
}

const _: () = assert!(size_of::<RawMrtCommonHeader>() == 12);

/// MRT common header [RFC6396][header].
///
/// [header]: https://tools.ietf.org/html/rfc6396#section-4.1
///
/// A MRT record is constructed as the following:
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
/// |                      Message... (variable)
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Types with the `_ET` suffix insert a 4-byte microsecond timestamp
/// before the message; its length is included in the on-wire length field
/// and subtracted here, so [CommonHeader::length] is always the message
/// length alone.
pub fn parse_common_header<T: Read>(input: &mut T) -> Result<CommonHeader, ParserError> {
    let mut base_bytes = [0u8; 12];
    input.read_exact(&mut base_bytes)?;

    // Single bounds check via zerocopy instead of four sequential cursor reads.
    let raw = RawMrtCommonHeader::ref_from_bytes(&base_bytes)
        .expect("base_bytes is exactly 12 bytes with no alignment requirement");

    let timestamp = raw.timestamp.get();
    let entry_type = EntryType::try_from(raw.entry_type.get())?;
    let entry_subtype = raw.entry_subtype.get();
    // the length field does not include the length of the common header
    let mut length = raw.length.get();

    let microsecond_timestamp = match entry_type.has_extended_timestamp() {
        true => {
            if length < 4 {
                return Err(ParserError::ParseError(
                    "invalid MRT header length for ET record: length < 4".into(),
                ));
            }
            length -= 4;
            let mut micro_bytes = [0u8; 4];
            input.read_exact(&mut micro_bytes)?;
            Some(u32::from_be_bytes(micro_bytes))
        }
        false => None,
    };

    Ok(CommonHeader {
        timestamp,
        microsecond_timestamp,
        entry_type,
        entry_subtype,
        length,
    })
}

/// An alternative to [parse_common_header] which returns `None` if the end
/// of the file is reached upon beginning to read the header. A partial
/// header is still an error.
pub fn try_parse_common_header<T: Read>(
    input: &mut T,
) -> Result<Option<CommonHeader>, ParserError> {
    let mut first_byte = [0];
    match input.read(&mut first_byte)? {
        0 => Ok(None),
        1 => {
            let mut reader = &first_byte[..];
            parse_common_header(&mut Read::chain(&mut reader, input)).map(Some)
        }
        _ => unreachable!("can only read 0 or 1 bytes into a buffer of length 1"),
    }
}

/// Header plus the raw message payload, not yet decoded.
///
/// Splitting framing from body decoding lets the tools keep their place in
/// the stream when a body fails to decode: the payload was fully consumed,
/// so the next record starts exactly where this one ended.
#[derive(Debug)]
pub struct RawMrtRecord {
    pub common_header: CommonHeader,
    pub payload: Bytes,
}

impl RawMrtRecord {
    pub fn decode(self) -> Result<MrtRecord, ParserError> {
        let message = parse_mrt_body(
            self.common_header.entry_type,
            self.common_header.entry_subtype,
            self.payload,
        )?;
        Ok(MrtRecord {
            common_header: self.common_header,
            message,
        })
    }
}

/// Read the `length` payload bytes a header declared. Running out of
/// input here means the declared length oversold the payload, which is a
/// truncated record rather than a stream failure; only the record is
/// dropped.
fn read_record_payload<T: Read>(input: &mut T, length: u32) -> Result<Bytes, ParserError> {
    let mut buffer = BytesMut::zeroed(length as usize);
    match input.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer.freeze()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ParserError::Truncated(format!(
                "record declares {length} payload bytes but the input ended early"
            )))
        }
        Err(e) => Err(e.into()),
    }
}

/// Frame one record: header plus `length` payload bytes. Returns `None` on
/// a clean end of input.
pub fn try_parse_raw_record<T: Read>(input: &mut T) -> Result<Option<RawMrtRecord>, ParserError> {
    let common_header = match try_parse_common_header(input)? {
        Some(v) => v,
        None => return Ok(None),
    };

    let payload = read_record_payload(input, common_header.length)?;

    Ok(Some(RawMrtRecord {
        common_header,
        payload,
    }))
}

/// Frame and decode one record, or `None` on a clean end of input.
pub fn try_parse_mrt_record<T: Read>(input: &mut T) -> Result<Option<MrtRecord>, ParserError> {
    match try_parse_raw_record(input)? {
        Some(raw) => raw.decode().map(Some),
        None => Ok(None),
    }
}

pub fn parse_mrt_record<T: Read>(input: &mut T) -> Result<MrtRecord, ParserError> {
    let common_header = parse_common_header(input)?;

    let payload = read_record_payload(input, common_header.length)?;
    let message = parse_mrt_body(
        common_header.entry_type,
        common_header.entry_subtype,
        payload,
    )?;

    Ok(MrtRecord {
        common_header,
        message,
    })
}

/// Same framing as [parse_mrt_record], over an in-memory buffer. The
/// cursor advances past the record on success.
pub fn parse_mrt_record_from_buf(data: &mut Bytes) -> Result<MrtRecord, ParserError> {
    use bytes::Buf;

    let mut reader = (&mut *data).reader();
    let common_header = parse_common_header(&mut reader)?;

    let payload = data.read_n_bytes(common_header.length as usize)?;
    let message = parse_mrt_body(
        common_header.entry_type,
        common_header.entry_subtype,
        payload,
    )?;

    Ok(MrtRecord {
        common_header,
        message,
    })
}

/// Parse a MRT message body with the given entry type and subtype, both
/// taken from the common header.
pub fn parse_mrt_body(
    entry_type: EntryType,
    entry_subtype: u16,
    data: Bytes,
) -> Result<MrtMessage, ParserError> {
    match entry_type {
        EntryType::TABLE_DUMP => {
            let msg = parse_table_dump_message(entry_subtype, data)?;
            Ok(MrtMessage::TableDumpMessage(msg))
        }
        EntryType::TABLE_DUMP_V2 => {
            let msg = parse_table_dump_v2_message(entry_subtype, data)?;
            Ok(MrtMessage::TableDumpV2Message(msg))
        }
        EntryType::BGP4MP | EntryType::BGP4MP_ET => {
            let msg = parse_bgp4mp(entry_subtype, data, BgpMessageFlags::empty())?;
            Ok(MrtMessage::Bgp4Mp(msg))
        }
        EntryType::BGP => {
            let msg = parse_zebra_message(entry_subtype, data)?;
            Ok(MrtMessage::Zebra(msg))
        }
    }
}
