//! MRT BGP4MP structs.
use crate::models::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::IpAddr;

/// BGP4MP message types.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum Bgp4MpType {
    StateChange = 0,
    Message = 1,
    MessageAs4 = 4,
    StateChangeAs4 = 5,
    MessageLocal = 6,
    MessageAs4Local = 7,
    MessageAddpath = 8,
    MessageAs4Addpath = 9,
    MessageLocalAddpath = 10,
    MessageLocalAs4Addpath = 11,
}

impl Bgp4MpType {
    /// AS-number width the subtype mandates for the peer/local AS fields
    /// and the embedded message.
    pub const fn asn_length(&self) -> AsnLength {
        match self {
            Bgp4MpType::StateChange
            | Bgp4MpType::Message
            | Bgp4MpType::MessageLocal
            | Bgp4MpType::MessageAddpath
            | Bgp4MpType::MessageLocalAddpath => AsnLength::Bits16,
            Bgp4MpType::StateChangeAs4
            | Bgp4MpType::MessageAs4
            | Bgp4MpType::MessageAs4Local
            | Bgp4MpType::MessageAs4Addpath
            | Bgp4MpType::MessageLocalAs4Addpath => AsnLength::Bits32,
        }
    }

    pub const fn is_addpath(&self) -> bool {
        matches!(
            self,
            Bgp4MpType::MessageAddpath
                | Bgp4MpType::MessageAs4Addpath
                | Bgp4MpType::MessageLocalAddpath
                | Bgp4MpType::MessageLocalAs4Addpath
        )
    }
}

/// BGP states enum.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u16)]
pub enum BgpState {
    Idle = 1,
    Connect = 2,
    Active = 3,
    OpenSent = 4,
    OpenConfirm = 5,
    Established = 6,
}

#[derive(Debug)]
pub enum Bgp4Mp {
    StateChange(Bgp4MpStateChange),
    Message(Bgp4MpMessage),
}

/// BGP4MP state change message.
#[derive(Debug)]
pub struct Bgp4MpStateChange {
    pub msg_type: Bgp4MpType,
    pub peer_asn: Asn,
    pub local_asn: Asn,
    pub interface_index: u16,
    pub peer_addr: IpAddr,
    pub local_addr: IpAddr,
    pub old_state: BgpState,
    pub new_state: BgpState,
}

/// BGP4MP message wrapper around an embedded BGP message.
#[derive(Debug)]
pub struct Bgp4MpMessage {
    pub msg_type: Bgp4MpType,
    pub peer_asn: Asn,
    pub local_asn: Asn,
    pub interface_index: u16,
    pub peer_ip: IpAddr,
    pub local_ip: IpAddr,
    pub bgp_message: BgpMessage,
}
