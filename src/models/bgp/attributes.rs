//! BGP path attribute structs.
use crate::models::*;
use bitflags::bitflags;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};

/// Attribute types.
///
/// All attributes codes are defined in the [IANA BGP Path Attributes registry][iana].
///
/// [iana]: https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-2
#[allow(non_camel_case_types)]
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u8)]
pub enum AttrType {
    ORIGIN = 1,
    AS_PATH = 2,
    NEXT_HOP = 3,
    MULTI_EXIT_DISCRIMINATOR = 4,
    LOCAL_PREFERENCE = 5,
    ATOMIC_AGGREGATE = 6,
    AGGREGATOR = 7,
    COMMUNITIES = 8,
    ORIGINATOR_ID = 9,
    CLUSTER_LIST = 10,
    MP_REACHABLE_NLRI = 14,
    MP_UNREACHABLE_NLRI = 15,
    EXTENDED_COMMUNITIES = 16,
    AS4_PATH = 17,
    AS4_AGGREGATOR = 18,
    LARGE_COMMUNITIES = 32,
    ONLY_TO_CUSTOMER = 35,
}

impl AttrType {
    /// Resolve an attribute name as used by filter expressions.
    pub fn from_name(name: &str) -> Option<AttrType> {
        let name = name.to_ascii_uppercase();
        Some(match name.as_str() {
            "ORIGIN" => AttrType::ORIGIN,
            "AS_PATH" | "AS-PATH" | "ASPATH" => AttrType::AS_PATH,
            "NEXT_HOP" | "NEXT-HOP" | "NEXTHOP" => AttrType::NEXT_HOP,
            "MULTI_EXIT_DISC" | "MED" => AttrType::MULTI_EXIT_DISCRIMINATOR,
            "LOCAL_PREF" | "LOCAL_PREFERENCE" => AttrType::LOCAL_PREFERENCE,
            "ATOMIC_AGGREGATE" => AttrType::ATOMIC_AGGREGATE,
            "AGGREGATOR" => AttrType::AGGREGATOR,
            "COMMUNITY" | "COMMUNITIES" => AttrType::COMMUNITIES,
            "ORIGINATOR_ID" => AttrType::ORIGINATOR_ID,
            "CLUSTER_LIST" => AttrType::CLUSTER_LIST,
            "MP_REACH_NLRI" => AttrType::MP_REACHABLE_NLRI,
            "MP_UNREACH_NLRI" => AttrType::MP_UNREACHABLE_NLRI,
            "EXTENDED_COMMUNITIES" | "EXT_COMMUNITY" => AttrType::EXTENDED_COMMUNITIES,
            "AS4_PATH" => AttrType::AS4_PATH,
            "AS4_AGGREGATOR" => AttrType::AS4_AGGREGATOR,
            "LARGE_COMMUNITY" | "LARGE_COMMUNITIES" => AttrType::LARGE_COMMUNITIES,
            "OTC" | "ONLY_TO_CUSTOMER" => AttrType::ONLY_TO_CUSTOMER,
            _ => return None,
        })
    }
}

bitflags! {
    /// Attribute flags octet (RFC 4271 section 4.3).
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct AttrFlags: u8 {
        const OPTIONAL = 0x80;
        const TRANSITIVE = 0x40;
        const PARTIAL = 0x20;
        const EXTENDED = 0x10;
    }
}

/// ORIGIN attribute value.
#[derive(Debug, TryFromPrimitive, IntoPrimitive, PartialEq, Eq, Hash, Copy, Clone)]
#[repr(u8)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Origin::Igp => "IGP",
            Origin::Egp => "EGP",
            Origin::Incomplete => "INCOMPLETE",
        };
        write!(f, "{s}")
    }
}

/// Multiprotocol NLRI carried by MP_REACH_NLRI / MP_UNREACH_NLRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nlri {
    pub afi: Afi,
    pub safi: Safi,
    pub next_hop: Option<IpAddr>,
    pub prefixes: Vec<NetworkPrefix>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Origin(Origin),
    AsPath(AsPath),
    As4Path(AsPath),
    NextHop(IpAddr),
    MultiExitDiscriminator(u32),
    LocalPreference(u32),
    AtomicAggregate,
    Aggregator(Asn, Ipv4Addr),
    Communities(Vec<Community>),
    OriginatorId(Ipv4Addr),
    ClusterList(Vec<Ipv4Addr>),
    MpReachNlri(Nlri),
    MpUnreachNlri(Nlri),
    OnlyToCustomer(Asn),
    /// Attribute kept as raw bytes, either because the type is unknown or
    /// because it is outside what the filters consume.
    Raw(Bytes),
}

/// One decoded path attribute. `attr_type` keeps the raw wire code so
/// unknown attributes stay addressable by `-attr` filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub attr_type: u8,
    pub flags: AttrFlags,
    pub value: AttributeValue,
}

/// The decoded attribute list of an UPDATE message or RIB entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attributes {
    inner: Vec<Attribute>,
}

impl Attributes {
    pub fn from_vec(inner: Vec<Attribute>) -> Attributes {
        Attributes { inner }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.inner.iter()
    }

    pub fn has_attr(&self, code: u8) -> bool {
        self.inner.iter().any(|a| a.attr_type == code)
    }

    pub fn get(&self, attr_type: AttrType) -> Option<&AttributeValue> {
        self.inner
            .iter()
            .find(|a| a.attr_type == u8::from(attr_type))
            .map(|a| &a.value)
    }

    pub fn origin(&self) -> Option<Origin> {
        match self.get(AttrType::ORIGIN) {
            Some(AttributeValue::Origin(o)) => Some(*o),
            _ => None,
        }
    }

    /// The AS path with any AS4_PATH merged in.
    pub fn as_path(&self) -> Option<AsPath> {
        let aspath = match self.get(AttrType::AS_PATH) {
            Some(AttributeValue::AsPath(p)) => Some(p),
            _ => None,
        };
        let as4path = match self.get(AttrType::AS4_PATH) {
            Some(AttributeValue::As4Path(p)) => Some(p),
            _ => None,
        };
        match (aspath, as4path) {
            (Some(p), Some(p4)) => Some(AsPath::merge_aspath_as4path(p, p4)),
            (Some(p), None) => Some(p.clone()),
            (None, Some(p4)) => Some(p4.clone()),
            (None, None) => None,
        }
    }

    pub fn communities(&self) -> Option<&[Community]> {
        match self.get(AttrType::COMMUNITIES) {
            Some(AttributeValue::Communities(c)) => Some(c),
            _ => None,
        }
    }

    pub fn next_hop(&self) -> Option<IpAddr> {
        match self.get(AttrType::NEXT_HOP) {
            Some(AttributeValue::NextHop(ip)) => Some(*ip),
            _ => None,
        }
    }

    pub fn mp_reach(&self) -> Option<&Nlri> {
        match self.get(AttrType::MP_REACHABLE_NLRI) {
            Some(AttributeValue::MpReachNlri(n)) => Some(n),
            _ => None,
        }
    }

    pub fn mp_unreach(&self) -> Option<&Nlri> {
        match self.get(AttrType::MP_UNREACHABLE_NLRI) {
            Some(AttributeValue::MpUnreachNlri(n)) => Some(n),
            _ => None,
        }
    }
}

impl FromIterator<Attribute> for Attributes {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        Attributes {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attr(attr_type: AttrType, value: AttributeValue) -> Attribute {
        Attribute {
            attr_type: attr_type.into(),
            flags: AttrFlags::TRANSITIVE,
            value,
        }
    }

    #[test]
    fn test_merged_as_path() {
        let attrs = Attributes::from_vec(vec![
            attr(
                AttrType::AS_PATH,
                AttributeValue::AsPath(AsPath::from_sequence([23456, 3356])),
            ),
            attr(
                AttrType::AS4_PATH,
                AttributeValue::As4Path(AsPath::from_sequence([64496, 3356])),
            ),
        ]);
        let merged = attrs.as_path().unwrap();
        let asns: Vec<u32> = merged.iter_asns().map(|a| a.to_u32()).collect();
        assert_eq!(asns, vec![64496, 3356]);
    }

    #[test]
    fn test_attr_presence() {
        let attrs = Attributes::from_vec(vec![attr(
            AttrType::COMMUNITIES,
            AttributeValue::Communities(vec![Community::new(65001, 100)]),
        )]);
        assert!(attrs.has_attr(8));
        assert!(!attrs.has_attr(2));
        assert_eq!(attrs.communities().unwrap().len(), 1);
    }

    #[test]
    fn test_attr_names() {
        assert_eq!(AttrType::from_name("med"), Some(AttrType::MULTI_EXIT_DISCRIMINATOR));
        assert_eq!(AttrType::from_name("COMMUNITY"), Some(AttrType::COMMUNITIES));
        assert_eq!(AttrType::from_name("bogus"), None);
    }
}
