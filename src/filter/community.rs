/*!
Community set matching for the `-communities` and `-all-communities`
filters.
*/
use crate::models::{Community, WELL_KNOWN_COMMUNITIES};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// One community pattern: each 16-bit half is either a literal or a `*`
/// wildcard. Both halves wild is rejected at parse time; `-attr COMMUNITY`
/// already expresses "any community at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunityPattern {
    pub hi: Option<u16>,
    pub lo: Option<u16>,
}

impl CommunityPattern {
    pub fn exact(value: u32) -> CommunityPattern {
        CommunityPattern {
            hi: Some((value >> 16) as u16),
            lo: Some(value as u16),
        }
    }

    pub fn matches(&self, community: Community) -> bool {
        self.hi.map_or(true, |hi| hi == community.hi())
            && self.lo.map_or(true, |lo| lo == community.lo())
    }
}

impl Display for CommunityPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let (Some(hi), Some(lo)) = (self.hi, self.lo) {
            if let Some(name) = Community::new(hi, lo).name() {
                return write!(f, "{name}");
            }
        }
        match self.hi {
            Some(hi) => write!(f, "{hi}")?,
            None => write!(f, "*")?,
        }
        write!(f, ":")?;
        match self.lo {
            Some(lo) => write!(f, "{lo}"),
            None => write!(f, "*"),
        }
    }
}

impl FromStr for CommunityPattern {
    type Err = String;

    /// Accepts a well-known name, `HI:LO` where either half may be `*`,
    /// or a `0x`-prefixed exact 32-bit value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((_, v)) = WELL_KNOWN_COMMUNITIES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(s))
        {
            return Ok(CommunityPattern::exact(*v));
        }
        if s.starts_with("0x") || s.starts_with("0X") {
            let community = Community::from_str(s)?;
            return Ok(CommunityPattern::exact(community.0));
        }

        let (hi, lo) = s
            .split_once(':')
            .ok_or_else(|| format!("bad community {s:?}: expected NAME, HI:LO or 0x value"))?;
        let parse_half = |half: &str| -> Result<Option<u16>, String> {
            if half == "*" {
                return Ok(None);
            }
            half.parse()
                .map(Some)
                .map_err(|e| format!("bad community {s:?}: {e}"))
        };
        let pattern = CommunityPattern {
            hi: parse_half(hi)?,
            lo: parse_half(lo)?,
        };
        if pattern.hi.is_none() && pattern.lo.is_none() {
            return Err(format!("bad community {s:?}: both halves cannot be wildcards"));
        }
        Ok(pattern)
    }
}

/// An ordered list of community patterns with any-of / all-of queries.
#[derive(Debug, Clone, Default)]
pub struct CommunitySet {
    patterns: Vec<CommunityPattern>,
}

impl CommunitySet {
    pub fn new(patterns: Vec<CommunityPattern>) -> CommunitySet {
        CommunitySet { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[CommunityPattern] {
        &self.patterns
    }

    /// True iff the message carries a community matching at least one
    /// pattern. An empty set matches nothing.
    pub fn match_any(&self, communities: &[Community]) -> bool {
        self.patterns
            .iter()
            .any(|p| communities.iter().any(|c| p.matches(*c)))
    }

    /// True iff every pattern has a matching community. An empty set is
    /// vacuously satisfied.
    pub fn match_all(&self, communities: &[Community]) -> bool {
        self.patterns
            .iter()
            .all(|p| communities.iter().any(|c| p.matches(*c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> CommunityPattern {
        CommunityPattern::from_str(s).unwrap()
    }

    #[test]
    fn test_wildcards() {
        assert!(pattern("65001:*").matches(Community::new(65001, 42)));
        assert!(!pattern("65001:*").matches(Community::new(65002, 42)));
        assert!(pattern("*:666").matches(Community::new(64512, 666)));
        assert!(pattern("65001:666").matches(Community::new(65001, 666)));
        assert!(!pattern("65001:666").matches(Community::new(65001, 667)));
        assert!(CommunityPattern::from_str("*:*").is_err());
    }

    #[test]
    fn test_well_known_and_hex() {
        assert!(pattern("BLACKHOLE").matches(Community::BLACKHOLE));
        assert!(pattern("0xFFFFFF01").matches(Community::NO_EXPORT));
        assert_eq!(pattern("no_export").to_string(), "NO_EXPORT");
        assert_eq!(pattern("65001:*").to_string(), "65001:*");
    }

    #[test]
    fn test_match_any_all() {
        let set = CommunitySet::new(vec![pattern("65001:100"), pattern("65001:200")]);
        let both = [Community::new(65001, 100), Community::new(65001, 200)];
        let one = [Community::new(65001, 100)];
        let neither = [Community::new(64512, 1)];

        assert!(set.match_any(&both));
        assert!(set.match_any(&one));
        assert!(!set.match_any(&neither));

        assert!(set.match_all(&both));
        assert!(!set.match_all(&one));
        assert!(!set.match_all(&neither));
    }

    #[test]
    fn test_empty_set() {
        let empty = CommunitySet::default();
        let communities = [Community::new(65001, 100)];
        assert!(!empty.match_any(&communities));
        assert!(empty.match_all(&communities));
        assert!(empty.match_all(&[]));
    }
}
