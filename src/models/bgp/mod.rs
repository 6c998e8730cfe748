//! BGP message structs.
pub mod aspath;
pub mod attributes;
pub mod community;

pub use aspath::*;
pub use attributes::*;
use bitflags::bitflags;
pub use community::*;

use crate::models::*;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::net::Ipv4Addr;

/// Size of the fixed BGP message header: 16-byte marker, length, type.
pub const BGP_HEADER_SIZE: usize = 19;
/// RFC 4271 message size ceiling.
pub const BGP_MAX_MESSAGE_SIZE: usize = 4096;
/// RFC 8654 extended message size ceiling.
pub const BGP_EXTENDED_MAX_MESSAGE_SIZE: usize = 65535;
/// OPEN optional parameter code carrying capabilities (RFC 5492).
pub const OPT_PARAM_CAPABILITY: u8 = 2;

/// BGP message type.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u8)]
pub enum BgpMessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    KeepAlive = 4,
}

bitflags! {
    /// Decoding options carried alongside a BGP message.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct BgpMessageFlags: u8 {
        /// Accept RFC 8654 extended message lengths (up to 65535).
        const EXMSG = 0x1;
        /// AS numbers in AS_PATH are 4 octets wide.
        const ASN32BIT = 0x2;
        /// NLRI fields carry RFC 7911 path identifiers.
        const ADDPATH = 0x4;
    }
}

impl BgpMessageFlags {
    pub const fn asn_length(&self) -> AsnLength {
        if self.contains(BgpMessageFlags::ASN32BIT) {
            AsnLength::Bits32
        } else {
            AsnLength::Bits16
        }
    }

    /// Largest acceptable message under these flags.
    pub const fn max_message_size(&self) -> usize {
        if self.contains(BgpMessageFlags::EXMSG) {
            BGP_EXTENDED_MAX_MESSAGE_SIZE
        } else {
            BGP_MAX_MESSAGE_SIZE
        }
    }
}

#[derive(Debug)]
pub enum BgpMessage {
    Open(BgpOpenMessage),
    Update(BgpUpdateMessage),
    Notification(BgpNotificationMessage),
    KeepAlive,
}

impl BgpMessage {
    pub fn msg_type(&self) -> BgpMessageType {
        match self {
            BgpMessage::Open(_) => BgpMessageType::Open,
            BgpMessage::Update(_) => BgpMessageType::Update,
            BgpMessage::Notification(_) => BgpMessageType::Notification,
            BgpMessage::KeepAlive => BgpMessageType::KeepAlive,
        }
    }
}

/// BGP OPEN message.
#[derive(Debug)]
pub struct BgpOpenMessage {
    pub version: u8,
    pub asn: Asn,
    pub hold_time: u16,
    pub sender_ip: Ipv4Addr,
    /// True when the parameter region used the RFC 9072 extended length
    /// encoding.
    pub extended_length: bool,
    pub opt_params: Vec<OptParam>,
}

/// A single OPEN optional parameter. The value is kept raw; capability
/// parameters are walked by the capability iterator.
#[derive(Debug, Clone)]
pub struct OptParam {
    pub param_type: u8,
    pub param_len: u16,
    pub value: Bytes,
}

/// One capability from an OPEN capability parameter (RFC 5492).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capability {
    pub code: u8,
    pub value: Bytes,
}

/// BGP UPDATE message.
#[derive(Debug)]
pub struct BgpUpdateMessage {
    pub withdrawn_prefixes: Vec<NetworkPrefix>,
    pub attributes: Attributes,
    pub announced_prefixes: Vec<NetworkPrefix>,
}

/// BGP NOTIFICATION message.
#[derive(Debug)]
pub struct BgpNotificationMessage {
    pub error_code: u8,
    pub error_subcode: u8,
    pub data: Bytes,
}

impl BgpNotificationMessage {
    /// RFC 4271 error code name.
    pub fn error_name(&self) -> &'static str {
        match self.error_code {
            1 => "Message Header Error",
            2 => "OPEN Message Error",
            3 => "UPDATE Message Error",
            4 => "Hold Timer Expired",
            5 => "Finite State Machine Error",
            6 => "Cease",
            _ => "Unknown",
        }
    }
}
