use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp::attributes::parse_attributes;
use crate::parser::ReadUtils;
use bytes::{Buf, Bytes};

/// Parse one BGP message off the front of `data`.
///
/// Format:
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// +                                                               +
/// |                                                               |
/// +                                                               +
/// |                           Marker                              |
/// +                                                               +
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Length               |      Type     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The declared length must be at least the header size and at most 4096,
/// or 65535 when `flags` accepts RFC 8654 extended messages.
pub fn parse_bgp_message(
    data: &mut Bytes,
    flags: BgpMessageFlags,
) -> Result<BgpMessage, ParserError> {
    // RFC 4271 requires the marker to be all ones; some collectors write
    // garbage here, so it is consumed without inspection.
    data.read_n_bytes(16)?;

    let length = data.read_u16()? as usize;
    if length < BGP_HEADER_SIZE {
        return Err(ParserError::ParseError(format!(
            "invalid BGP message length {length}"
        )));
    }
    let limit = flags.max_message_size();
    if length > limit {
        return Err(ParserError::OversizedMessage { length, limit });
    }

    let msg_type_raw = data.read_u8()?;
    let msg_type = BgpMessageType::try_from(msg_type_raw).map_err(|_| {
        ParserError::ParseError(format!("unknown BGP message type: {msg_type_raw}"))
    })?;

    let mut body = data.read_n_bytes(length - BGP_HEADER_SIZE)?;

    Ok(match msg_type {
        BgpMessageType::Open => BgpMessage::Open(parse_bgp_open_message(&mut body)?),
        BgpMessageType::Update => BgpMessage::Update(parse_bgp_update_message(body, flags)?),
        BgpMessageType::Notification => {
            BgpMessage::Notification(parse_bgp_notification_message(body)?)
        }
        BgpMessageType::KeepAlive => BgpMessage::KeepAlive,
    })
}

/// Cursor over the optional parameter region of an OPEN message.
///
/// Terminal success is an exhausted region; a parameter running past the
/// region end surfaces as `Truncated`.
pub struct ParamIter {
    data: Bytes,
}

impl ParamIter {
    pub fn new(data: Bytes) -> ParamIter {
        ParamIter { data }
    }
}

impl Iterator for ParamIter {
    type Item = Result<OptParam, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.data.has_remaining() {
            return None;
        }
        let parse = |data: &mut Bytes| -> Result<OptParam, ParserError> {
            let param_type = data.read_u8()?;
            let param_len = data.read_u8()? as u16;
            let value = data.read_n_bytes(param_len as usize)?;
            Ok(OptParam {
                param_type,
                param_len,
                value,
            })
        };
        match parse(&mut self.data) {
            Ok(param) => Some(Ok(param)),
            Err(e) => {
                self.data.clear(); // fuse after an error
                Some(Err(e))
            }
        }
    }
}

/// Iterator over the capabilities of an OPEN message (RFC 5492).
///
/// Composes [ParamIter]: when the current capability span is exhausted it
/// pulls the next parameter whose code is CAPABILITY and re-seeds the
/// range. One parameter may carry several capabilities back-to-back.
pub struct CapabilityIter {
    params: ParamIter,
    span: Bytes,
}

impl CapabilityIter {
    pub fn new(params: ParamIter) -> CapabilityIter {
        CapabilityIter {
            params,
            span: Bytes::new(),
        }
    }
}

impl Iterator for CapabilityIter {
    type Item = Result<Capability, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.span.has_remaining() {
            match self.params.next()? {
                Ok(param) if param.param_type == OPT_PARAM_CAPABILITY => {
                    self.span = param.value;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }

        let parse = |span: &mut Bytes| -> Result<Capability, ParserError> {
            let code = span.read_u8()?;
            let len = span.read_u8()? as usize;
            let value = span.read_n_bytes(len)?;
            Ok(Capability { code, value })
        };
        match parse(&mut self.span) {
            Ok(cap) => Some(Ok(cap)),
            Err(e) => {
                self.span.clear();
                self.params.data.clear();
                Some(Err(e))
            }
        }
    }
}

impl BgpOpenMessage {
    /// Walk all capabilities across this message's capability parameters.
    pub fn capabilities(&self) -> CapabilityIter {
        let mut region = bytes::BytesMut::new();
        for param in &self.opt_params {
            use bytes::BufMut;
            region.put_u8(param.param_type);
            region.put_u8(param.param_len as u8);
            region.put_slice(&param.value);
        }
        CapabilityIter::new(ParamIter::new(region.freeze()))
    }
}

pub fn parse_bgp_open_message(input: &mut Bytes) -> Result<BgpOpenMessage, ParserError> {
    let version = input.read_u8()?;
    let asn = input.read_asn(AsnLength::Bits16)?;
    let hold_time = input.read_u16()?;
    let sender_ip = input.read_ipv4_address()?;

    let mut opt_params_len = input.read_u8()? as u16;
    let mut extended_length = false;

    // RFC 9072: a length of 255 followed by parameter type 255 switches the
    // parameter region to an extended 2-byte length.
    if opt_params_len == 255 {
        let mut probe = input.clone();
        if probe.read_u8()? == 255 {
            input.read_u8()?;
            extended_length = true;
            opt_params_len = input.read_u16()?;
        }
    }

    let region = input.read_n_bytes(opt_params_len as usize)?;
    let opt_params: Vec<OptParam> = ParamIter::new(region).collect::<Result<_, _>>()?;

    Ok(BgpOpenMessage {
        version,
        asn,
        hold_time,
        sender_ip,
        extended_length,
        opt_params,
    })
}

pub fn parse_bgp_update_message(
    mut input: Bytes,
    flags: BgpMessageFlags,
) -> Result<BgpUpdateMessage, ParserError> {
    let add_path = flags.contains(BgpMessageFlags::ADDPATH);

    let withdrawn_length = input.read_u16()? as usize;
    let mut withdrawn_region = input.read_n_bytes(withdrawn_length)?;
    let mut withdrawn_prefixes = vec![];
    while withdrawn_region.has_remaining() {
        withdrawn_prefixes.push(withdrawn_region.read_nlri_prefix(Afi::Ipv4, add_path)?);
    }

    let attribute_length = input.read_u16()? as usize;
    let attr_data = input.read_n_bytes(attribute_length)?;
    let attributes = parse_attributes(attr_data, flags, false)?;

    let mut announced_prefixes = vec![];
    while input.has_remaining() {
        announced_prefixes.push(input.read_nlri_prefix(Afi::Ipv4, add_path)?);
    }

    Ok(BgpUpdateMessage {
        withdrawn_prefixes,
        attributes,
        announced_prefixes,
    })
}

pub fn parse_bgp_notification_message(
    mut input: Bytes,
) -> Result<BgpNotificationMessage, ParserError> {
    let error_code = input.read_u8()?;
    let error_subcode = input.read_u8()?;
    let data = input.split_to(input.remaining());
    Ok(BgpNotificationMessage {
        error_code,
        error_subcode,
        data,
    })
}
