use num_enum::{IntoPrimitive, TryFromPrimitive};

/// AFI -- Address Family Identifier
///
/// <https://www.iana.org/assignments/address-family-numbers/address-family-numbers.xhtml>
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Clone, Copy, Eq, Hash)]
#[repr(u16)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
}

impl Afi {
    /// Maximum prefix bit-length for the family.
    pub const fn max_prefix_len(&self) -> u8 {
        match self {
            Afi::Ipv4 => 32,
            Afi::Ipv6 => 128,
        }
    }
}

/// SAFI -- Subsequent Address Family Identifier
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Clone, Copy, Eq, Hash)]
#[repr(u8)]
pub enum Safi {
    Unicast = 1,
    Multicast = 2,
    UnicastMulticast = 3,
}
