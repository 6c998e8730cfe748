use crate::error::ParserError;
use crate::models::*;
use crate::parser::bgp::messages::parse_bgp_message;
use crate::parser::ReadUtils;
use bytes::{BufMut, Bytes, BytesMut};

/// Parse a legacy MRT `BGP` (Zebra) message.
///
/// Wire layout: peer AS (u16), peer IPv4 address, local AS (u16), local
/// IPv4 address, then either a state pair or a raw BGP payload. The
/// payload has no BGP header; [wrap_zebra_payload] synthesizes one so the
/// regular BGP parser can take over.
pub fn parse_zebra_message(sub_type: u16, mut data: Bytes) -> Result<ZebraMessage, ParserError> {
    let zebra_type = ZebraType::try_from(sub_type)?;

    let peer_asn = data.read_asn(AsnLength::Bits16)?;
    let peer_addr = data.read_ipv4_address()?;
    let local_asn = data.read_asn(AsnLength::Bits16)?;
    let local_addr = data.read_ipv4_address()?;

    match zebra_type {
        ZebraType::StateChange => {
            let old_state = BgpState::try_from(data.read_u16()?)?;
            let new_state = BgpState::try_from(data.read_u16()?)?;
            Ok(ZebraMessage::StateChange(ZebraStateChange {
                peer_asn,
                peer_addr,
                local_asn,
                local_addr,
                old_state,
                new_state,
            }))
        }
        ZebraType::Update | ZebraType::Open | ZebraType::Notify | ZebraType::Keepalive => {
            let bgp_type = zebra_type
                .bgp_message_type()
                .expect("message-bearing zebra subtype");
            let mut framed =
                wrap_zebra_payload(bgp_type, data, BgpMessageFlags::empty())?;
            let bgp_message = parse_bgp_message(&mut framed, BgpMessageFlags::empty())?;
            Ok(ZebraMessage::Message(ZebraBgpMessage {
                msg_type: zebra_type,
                peer_asn,
                peer_addr,
                local_asn,
                local_addr,
                bgp_message,
            }))
        }
        ZebraType::Null | ZebraType::PrefUpdate | ZebraType::Sync => {
            Err(ParserError::BadSubtype {
                mrt_type: "zebra bgp",
                subtype: sub_type,
            })
        }
    }
}

/// Materialize a BGP header around a headerless Zebra payload: an all-ones
/// marker, the total length, and the resolved message type. The resulting
/// size is validated against the plain or extended message limit before
/// anything is copied.
pub fn wrap_zebra_payload(
    bgp_type: BgpMessageType,
    payload: Bytes,
    flags: BgpMessageFlags,
) -> Result<Bytes, ParserError> {
    let total = BGP_HEADER_SIZE + payload.len();
    let limit = flags.max_message_size();
    if total > limit {
        return Err(ParserError::OversizedMessage {
            length: total,
            limit,
        });
    }

    let mut framed = BytesMut::with_capacity(total);
    framed.put_bytes(0xFF, 16);
    framed.put_u16(total as u16);
    framed.put_u8(bgp_type.into());
    framed.put_slice(&payload);
    Ok(framed.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn zebra_update_payload() -> Vec<u8> {
        let mut buf = vec![];
        buf.extend_from_slice(&65001u16.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&65002u16.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 2]);
        // headerless UPDATE: empty withdrawn, empty attributes, one prefix
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&[24, 192, 0, 2]);
        buf
    }

    #[test]
    fn test_parse_zebra_update() {
        let msg = parse_zebra_message(1, Bytes::from(zebra_update_payload())).unwrap();
        let ZebraMessage::Message(msg) = msg else {
            panic!("expected message variant");
        };
        assert_eq!(msg.peer_asn, 65001);
        assert_eq!(msg.peer_addr, Ipv4Addr::new(10, 0, 0, 1));
        let BgpMessage::Update(update) = &msg.bgp_message else {
            panic!("expected update");
        };
        assert_eq!(update.announced_prefixes.len(), 1);
        assert_eq!(update.announced_prefixes[0].to_string(), "192.0.2.0/24");
    }

    /// The synthesized frame must reproduce the raw payload byte-for-byte
    /// after the 19-byte header.
    #[test]
    fn test_wrap_round_trip() {
        let payload = Bytes::from_static(&[0, 0, 0, 0, 24, 192, 0, 2]);
        let framed =
            wrap_zebra_payload(BgpMessageType::Update, payload.clone(), BgpMessageFlags::empty())
                .unwrap();
        assert_eq!(framed.len(), BGP_HEADER_SIZE + payload.len());
        assert!(framed[..16].iter().all(|b| *b == 0xFF));
        assert_eq!(
            u16::from_be_bytes([framed[16], framed[17]]) as usize,
            framed.len()
        );
        assert_eq!(framed[18], u8::from(BgpMessageType::Update));
        assert_eq!(&framed[BGP_HEADER_SIZE..], &payload[..]);
    }

    #[test]
    fn test_wrap_oversize() {
        let payload = Bytes::from(vec![0u8; BGP_MAX_MESSAGE_SIZE - BGP_HEADER_SIZE + 1]);
        assert!(matches!(
            wrap_zebra_payload(BgpMessageType::Update, payload.clone(), BgpMessageFlags::empty()),
            Err(ParserError::OversizedMessage {
                length: 4097,
                limit: 4096
            })
        ));
        // the same payload fits under the extended limit
        assert!(
            wrap_zebra_payload(BgpMessageType::Update, payload, BgpMessageFlags::EXMSG).is_ok()
        );
    }

    #[test]
    fn test_state_change() {
        let mut buf = vec![];
        buf.extend_from_slice(&65001u16.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 1]);
        buf.extend_from_slice(&65002u16.to_be_bytes());
        buf.extend_from_slice(&[10, 0, 0, 2]);
        buf.extend_from_slice(&6u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        let msg = parse_zebra_message(3, Bytes::from(buf)).unwrap();
        let ZebraMessage::StateChange(change) = msg else {
            panic!("expected state change");
        };
        assert_eq!(change.old_state, BgpState::Established);
        assert_eq!(change.new_state, BgpState::Idle);
    }

    #[test]
    fn test_unsupported_subtype() {
        assert!(matches!(
            parse_zebra_message(4, Bytes::new()),
            Err(ParserError::BadSubtype { .. })
        ));
    }
}
