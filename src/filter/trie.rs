/*!
Bitwise radix tree over network prefixes, backing the `-exact`,
`-subnet`, `-supernet`, and `-related` filters.

One trie holds one address family; keys are the prefix bits left-aligned
in a `u128` (IPv4 occupies the top 32 bits). Nodes are path-compressed:
every internal node either marks an inserted prefix or has two children,
so any subtree reached during a lookup contains at least one entry.
*/
use crate::models::Afi;
use ipnet::IpNet;

/// Containment relation asked of the trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixMatchOp {
    /// The probe equals an entry.
    Exact,
    /// The probe is contained in an entry (or equals one).
    Subnet,
    /// The probe contains an entry (or equals one).
    Supernet,
    /// Either direction.
    Related,
}

#[derive(Debug)]
struct Node {
    key: u128,
    len: u8,
    is_entry: bool,
    child: [Option<Box<Node>>; 2],
}

#[derive(Debug)]
pub struct PrefixTrie {
    afi: Afi,
    root: Option<Box<Node>>,
    len: usize,
}

#[inline]
fn key_of(prefix: &IpNet) -> (u128, u8) {
    let key = match prefix {
        IpNet::V4(p) => (u32::from(p.network()) as u128) << 96,
        IpNet::V6(p) => u128::from(p.network()),
    };
    (key, prefix.prefix_len())
}

#[inline]
fn bit_at(key: u128, index: u8) -> usize {
    ((key >> (127 - index)) & 1) as usize
}

#[inline]
fn mask(key: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        key & (u128::MAX << (128 - len))
    }
}

/// Length of the common prefix of two keys, capped at `max` bits.
#[inline]
fn common_prefix_len(a: u128, b: u128, max: u8) -> u8 {
    ((a ^ b).leading_zeros() as u8).min(max)
}

impl PrefixTrie {
    pub fn new(afi: Afi) -> PrefixTrie {
        PrefixTrie {
            afi,
            root: None,
            len: 0,
        }
    }

    pub fn afi(&self) -> Afi {
        self.afi
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a prefix of this trie's family. Re-inserting is a no-op.
    pub fn insert(&mut self, prefix: &IpNet) {
        debug_assert_eq!(family_of(prefix), self.afi);
        let (key, len) = key_of(prefix);
        if Self::insert_at(&mut self.root, key, len) {
            self.len += 1;
        }
    }

    fn insert_at(slot: &mut Option<Box<Node>>, key: u128, len: u8) -> bool {
        let Some(node) = slot else {
            *slot = Some(Box::new(Node {
                key: mask(key, len),
                len,
                is_entry: true,
                child: [None, None],
            }));
            return true;
        };

        let cp = common_prefix_len(node.key, key, node.len.min(len));
        if cp == node.len && cp == len {
            let fresh = !node.is_entry;
            node.is_entry = true;
            return fresh;
        }
        if cp == node.len {
            // the new prefix extends past this node
            return Self::insert_at(&mut node.child[bit_at(key, node.len)], key, len);
        }
        if cp == len {
            // the new prefix sits above this node
            let old = slot.take().unwrap();
            let mut parent = Box::new(Node {
                key: mask(key, len),
                len,
                is_entry: true,
                child: [None, None],
            });
            let old_bit = bit_at(old.key, len);
            parent.child[old_bit] = Some(old);
            *slot = Some(parent);
            return true;
        }
        // diverged inside both: split at the common prefix
        let old = slot.take().unwrap();
        let mut fork = Box::new(Node {
            key: mask(key, cp),
            len: cp,
            is_entry: false,
            child: [None, None],
        });
        let leaf = Box::new(Node {
            key: mask(key, len),
            len,
            is_entry: true,
            child: [None, None],
        });
        let old_bit = bit_at(old.key, cp);
        fork.child[old_bit] = Some(old);
        fork.child[bit_at(key, cp)] = Some(leaf);
        *slot = Some(fork);
        true
    }

    /// True iff the probe prefix itself was inserted.
    pub fn contains_exact(&self, prefix: &IpNet) -> bool {
        let (key, len) = key_of(prefix);
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            let cp = common_prefix_len(node.key, key, node.len.min(len));
            if cp < node.len.min(len) || node.len > len {
                return false;
            }
            if node.len == len {
                return node.is_entry;
            }
            cursor = &node.child[bit_at(key, node.len)];
        }
        false
    }

    /// True iff some entry contains the probe (the probe is a subnet of an
    /// entry, equality included).
    pub fn covers(&self, prefix: &IpNet) -> bool {
        let (key, len) = key_of(prefix);
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            let cp = common_prefix_len(node.key, key, node.len.min(len));
            if cp < node.len.min(len) {
                return false;
            }
            if node.len <= len && node.is_entry {
                return true;
            }
            if node.len >= len {
                return false;
            }
            cursor = &node.child[bit_at(key, node.len)];
        }
        false
    }

    /// True iff the probe contains some entry (the probe is a supernet of
    /// an entry, equality included).
    pub fn covered_by(&self, prefix: &IpNet) -> bool {
        let (key, len) = key_of(prefix);
        let mut cursor = &self.root;
        while let Some(node) = cursor {
            let cp = common_prefix_len(node.key, key, node.len.min(len));
            if cp < node.len.min(len) {
                return false;
            }
            if node.len >= len {
                // every subtree holds at least one entry
                return true;
            }
            cursor = &node.child[bit_at(key, node.len)];
        }
        false
    }

    pub fn matches(&self, prefix: &IpNet, op: PrefixMatchOp) -> bool {
        match op {
            PrefixMatchOp::Exact => self.contains_exact(prefix),
            PrefixMatchOp::Subnet => self.covers(prefix),
            PrefixMatchOp::Supernet => self.covered_by(prefix),
            PrefixMatchOp::Related => self.covers(prefix) || self.covered_by(prefix),
        }
    }
}

fn family_of(prefix: &IpNet) -> Afi {
    match prefix {
        IpNet::V4(_) => Afi::Ipv4,
        IpNet::V6(_) => Afi::Ipv6,
    }
}
