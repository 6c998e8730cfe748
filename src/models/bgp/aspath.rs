//! AS path storage and the AS4_PATH merge.
use crate::models::Asn;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt::{Display, Formatter};

/// One AS path segment (RFC 4271 section 4.3, RFC 5065 for the confed
/// variants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsPathSegment {
    AsSequence(SmallVec<[Asn; 6]>),
    AsSet(SmallVec<[Asn; 6]>),
    ConfedSequence(SmallVec<[Asn; 6]>),
    ConfedSet(SmallVec<[Asn; 6]>),
}

impl AsPathSegment {
    pub fn sequence<S: AsRef<[u32]>>(seq: S) -> Self {
        AsPathSegment::AsSequence(seq.as_ref().iter().map(|v| Asn::new_32bit(*v)).collect())
    }

    pub fn set<S: AsRef<[u32]>>(seq: S) -> Self {
        AsPathSegment::AsSet(seq.as_ref().iter().map(|v| Asn::new_32bit(*v)).collect())
    }

    pub fn asns(&self) -> &[Asn] {
        match self {
            AsPathSegment::AsSequence(v)
            | AsPathSegment::AsSet(v)
            | AsPathSegment::ConfedSequence(v)
            | AsPathSegment::ConfedSet(v) => v,
        }
    }

    /// Number of ASNs this segment adds to the route length: a set counts
    /// as one hop, confed segments as zero.
    pub fn route_len(&self) -> usize {
        match self {
            AsPathSegment::AsSequence(v) => v.len(),
            AsPathSegment::AsSet(_) => 1,
            AsPathSegment::ConfedSequence(_) | AsPathSegment::ConfedSet(_) => 0,
        }
    }
}

/// An AS path: an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsPath {
    pub segments: Vec<AsPathSegment>,
}

impl AsPath {
    pub fn new() -> AsPath {
        AsPath::default()
    }

    pub fn from_segments(segments: Vec<AsPathSegment>) -> AsPath {
        AsPath { segments }
    }

    /// Shorthand for a path that is a single AS_SEQUENCE.
    pub fn from_sequence<S: AsRef<[u32]>>(seq: S) -> AsPath {
        AsPath {
            segments: vec![AsPathSegment::sequence(seq)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.asns().is_empty())
    }

    /// Route length as used for path selection.
    pub fn route_len(&self) -> usize {
        self.segments.iter().map(|s| s.route_len()).sum()
    }

    /// All ASNs in wire order, sets flattened in their encoded order.
    pub fn iter_asns(&self) -> impl Iterator<Item = Asn> + '_ {
        self.segments.iter().flat_map(|s| s.asns().iter().copied())
    }

    /// True iff any ASN appears more than once in the path.
    pub fn has_loop(&self) -> bool {
        let mut seen: Vec<Asn> = vec![];
        for asn in self.iter_asns() {
            if seen.contains(&asn) {
                return true;
            }
            seen.push(asn);
        }
        false
    }

    /// Merge an AS_PATH with its AS4_PATH following RFC 6793 section 4.2.3:
    /// keep the leading AS_PATH hops that the shorter AS4_PATH does not
    /// cover, then splice the AS4_PATH in. When the AS4_PATH claims more
    /// hops than the AS_PATH, the AS_PATH wins unchanged.
    pub fn merge_aspath_as4path(aspath: &AsPath, as4path: &AsPath) -> AsPath {
        let as_len = aspath.route_len();
        let as4_len = as4path.route_len();
        if as4_len > as_len {
            return aspath.clone();
        }

        let mut keep = as_len - as4_len;
        let mut segments: Vec<AsPathSegment> = vec![];
        for segment in &aspath.segments {
            if keep == 0 {
                break;
            }
            match segment {
                AsPathSegment::AsSequence(seq) => {
                    let take = keep.min(seq.len());
                    segments.push(AsPathSegment::AsSequence(
                        seq.iter().take(take).copied().collect(),
                    ));
                    keep -= take;
                }
                other => {
                    segments.push(other.clone());
                    keep -= other.route_len().min(keep);
                }
            }
        }
        segments.extend(as4path.segments.iter().cloned());
        AsPath { segments }
    }
}

impl Display for AsPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match segment {
                AsPathSegment::AsSequence(v) | AsPathSegment::ConfedSequence(v) => {
                    write!(f, "{}", v.iter().join(" "))?;
                }
                AsPathSegment::AsSet(v) | AsPathSegment::ConfedSet(v) => {
                    write!(f, "{{{}}}", v.iter().join(","))?;
                }
            }
        }
        Ok(())
    }
}
