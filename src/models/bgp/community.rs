//! Plain RFC 1997 communities.
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A 32-bit community value.
///
/// Rendered as `HI:LO` unless the value is one of the well-known
/// communities, which render by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Community(pub u32);

/// Well-known community values from the IANA registry.
pub const WELL_KNOWN_COMMUNITIES: &[(&str, u32)] = &[
    ("GRACEFUL_SHUTDOWN", 0xFFFF0000),
    ("ACCEPT_OWN", 0xFFFF0001),
    ("ROUTE_FILTER_TRANSLATED_V4", 0xFFFF0002),
    ("ROUTE_FILTER_V4", 0xFFFF0003),
    ("ROUTE_FILTER_TRANSLATED_V6", 0xFFFF0004),
    ("ROUTE_FILTER_V6", 0xFFFF0005),
    ("LLGR_STALE", 0xFFFF0006),
    ("NO_LLGR", 0xFFFF0007),
    ("ACCEPT_OWN_NEXTHOP", 0xFFFF0008),
    ("BLACKHOLE", 0xFFFF029A),
    ("NO_EXPORT", 0xFFFFFF01),
    ("NO_ADVERTISE", 0xFFFFFF02),
    ("NO_EXPORT_SUBCONFED", 0xFFFFFF03),
    ("NO_PEER", 0xFFFFFF04),
];

impl Community {
    pub const NO_EXPORT: Community = Community(0xFFFFFF01);
    pub const NO_ADVERTISE: Community = Community(0xFFFFFF02);
    pub const NO_EXPORT_SUBCONFED: Community = Community(0xFFFFFF03);
    pub const BLACKHOLE: Community = Community(0xFFFF029A);

    pub const fn new(hi: u16, lo: u16) -> Community {
        Community((hi as u32) << 16 | lo as u32)
    }

    /// High 16 bits, conventionally the tagging AS.
    pub const fn hi(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Low 16 bits, the AS-local value.
    pub const fn lo(&self) -> u16 {
        self.0 as u16
    }

    pub fn name(&self) -> Option<&'static str> {
        WELL_KNOWN_COMMUNITIES
            .iter()
            .find(|(_, v)| *v == self.0)
            .map(|(n, _)| *n)
    }
}

impl Display for Community {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}:{}", self.hi(), self.lo()),
        }
    }
}

impl FromStr for Community {
    type Err = String;

    /// Accepts a well-known name, `HI:LO`, or a `0x`-prefixed 32-bit
    /// value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((_, v)) = WELL_KNOWN_COMMUNITIES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(s))
        {
            return Ok(Community(*v));
        }
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u32::from_str_radix(hex, 16)
                .map(Community)
                .map_err(|e| format!("bad hex community {s:?}: {e}"));
        }
        let (hi, lo) = s
            .split_once(':')
            .ok_or_else(|| format!("bad community {s:?}: expected NAME, HI:LO or 0x value"))?;
        let hi: u16 = hi
            .parse()
            .map_err(|e| format!("bad community {s:?}: {e}"))?;
        let lo: u16 = lo
            .parse()
            .map_err(|e| format!("bad community {s:?}: {e}"))?;
        Ok(Community::new(hi, lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves() {
        let c = Community::new(65001, 666);
        assert_eq!(c.hi(), 65001);
        assert_eq!(c.lo(), 666);
        assert_eq!(c.to_string(), "65001:666");
    }

    #[test]
    fn test_well_known() {
        assert_eq!(Community::BLACKHOLE.to_string(), "BLACKHOLE");
        assert_eq!(Community::from_str("no_export").unwrap(), Community::NO_EXPORT);
        assert_eq!(
            Community::from_str("0xFFFF029A").unwrap(),
            Community::BLACKHOLE
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Community::from_str("65536:0").is_err());
        assert!(Community::from_str("no-such-name").is_err());
    }
}
