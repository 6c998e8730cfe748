//! Legacy MRT `BGP` (Zebra) structs.
//!
//! The pre-BGP4MP format: 16-bit AS numbers, IPv4 peer addresses, and -- for
//! the message-bearing subtypes -- a raw BGP payload with no BGP header on
//! the wire. The decoder synthesizes the header before handing the payload
//! to the regular BGP message parser.
use crate::models::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::Ipv4Addr;

/// Subtypes of the legacy `BGP` MRT type.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum ZebraType {
    Null = 0,
    Update = 1,
    PrefUpdate = 2,
    StateChange = 3,
    Sync = 4,
    Open = 5,
    Notify = 6,
    Keepalive = 7,
}

impl ZebraType {
    /// BGP message type the subtype's payload resolves to, if any.
    pub const fn bgp_message_type(&self) -> Option<BgpMessageType> {
        match self {
            ZebraType::Update => Some(BgpMessageType::Update),
            ZebraType::Open => Some(BgpMessageType::Open),
            ZebraType::Notify => Some(BgpMessageType::Notification),
            ZebraType::Keepalive => Some(BgpMessageType::KeepAlive),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ZebraMessage {
    StateChange(ZebraStateChange),
    Message(ZebraBgpMessage),
}

#[derive(Debug)]
pub struct ZebraStateChange {
    pub peer_asn: Asn,
    pub peer_addr: Ipv4Addr,
    pub local_asn: Asn,
    pub local_addr: Ipv4Addr,
    pub old_state: BgpState,
    pub new_state: BgpState,
}

#[derive(Debug)]
pub struct ZebraBgpMessage {
    pub msg_type: ZebraType,
    pub peer_asn: Asn,
    pub peer_addr: Ipv4Addr,
    pub local_asn: Asn,
    pub local_addr: Ipv4Addr,
    pub bgp_message: BgpMessage,
}
