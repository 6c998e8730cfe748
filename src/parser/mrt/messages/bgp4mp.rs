use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp::messages::parse_bgp_message;
use crate::parser::ReadUtils;
use bytes::{Buf, Bytes};

/// Parse a MRT BGP4MP message.
///
/// RFC: <https://www.rfc-editor.org/rfc/rfc6396#section-4.4>
///
/// The wire subtype decides the AS-number width and AddPath handling of
/// the embedded message; any conflicting `ASN32BIT`/`ADDPATH` bits in the
/// caller's `flags` are ignored. Only `EXMSG` is honored from the caller.
pub fn parse_bgp4mp(
    sub_type: u16,
    input: Bytes,
    flags: BgpMessageFlags,
) -> Result<Bgp4Mp, ParserError> {
    let bgp4mp_type = Bgp4MpType::try_from(sub_type)?;

    let msg = match bgp4mp_type {
        Bgp4MpType::StateChange | Bgp4MpType::StateChangeAs4 => {
            Bgp4Mp::StateChange(parse_bgp4mp_state_change(input, bgp4mp_type)?)
        }
        _ => Bgp4Mp::Message(parse_bgp4mp_message(input, bgp4mp_type, flags)?),
    };

    Ok(msg)
}

/*
   0                   1                   2                   3
   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |         Peer AS Number        |        Local AS Number        |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |        Interface Index        |        Address Family         |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                      Peer IP Address (variable)               |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                      Local IP Address (variable)              |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |                    BGP Message... (variable)
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  (AS4 subtypes widen the AS fields to 32 bits.)
*/
pub fn parse_bgp4mp_message(
    mut data: Bytes,
    msg_type: Bgp4MpType,
    flags: BgpMessageFlags,
) -> Result<Bgp4MpMessage, ParserError> {
    let asn_len = msg_type.asn_length();

    let peer_asn = data.read_asn(asn_len)?;
    let local_asn = data.read_asn(asn_len)?;
    let interface_index = data.read_u16()?;
    let afi = data.read_afi()?;
    let peer_ip = data.read_address(afi)?;
    let local_ip = data.read_address(afi)?;

    // force the flag bits the wire subtype mandates
    let mut msg_flags = flags & BgpMessageFlags::EXMSG;
    if asn_len.is_four_byte() {
        msg_flags |= BgpMessageFlags::ASN32BIT;
    }
    if msg_type.is_addpath() {
        msg_flags |= BgpMessageFlags::ADDPATH;
    }

    let bgp_message = parse_bgp_message(&mut data, msg_flags)?;
    if data.has_remaining() {
        return Err(ParserError::ParseError(format!(
            "{} trailing bytes after embedded BGP message",
            data.remaining()
        )));
    }

    Ok(Bgp4MpMessage {
        msg_type,
        peer_asn,
        local_asn,
        interface_index,
        peer_ip,
        local_ip,
        bgp_message,
    })
}

/*
  Same preamble as the message subtypes, followed by:
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
  |            Old State          |          New State            |
  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
*/
pub fn parse_bgp4mp_state_change(
    mut input: Bytes,
    msg_type: Bgp4MpType,
) -> Result<Bgp4MpStateChange, ParserError> {
    let asn_len = msg_type.asn_length();

    let peer_asn = input.read_asn(asn_len)?;
    let local_asn = input.read_asn(asn_len)?;
    let interface_index = input.read_u16()?;
    let address_family = input.read_afi()?;
    let peer_addr = input.read_address(address_family)?;
    let local_addr = input.read_address(address_family)?;
    let old_state = BgpState::try_from(input.read_u16()?)?;
    let new_state = BgpState::try_from(input.read_u16()?)?;

    Ok(Bgp4MpStateChange {
        msg_type,
        peer_asn,
        local_asn,
        interface_index,
        peer_addr,
        local_addr,
        old_state,
        new_state,
    })
}
