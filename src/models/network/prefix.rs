use crate::models::Afi;
use ipnet::IpNet;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// A network prefix with an optional AddPath path identifier.
#[derive(PartialEq, Eq, Clone, Copy, Hash)]
pub struct NetworkPrefix {
    pub prefix: IpNet,
    pub path_id: Option<u32>,
}

impl NetworkPrefix {
    pub fn new(prefix: IpNet, path_id: Option<u32>) -> NetworkPrefix {
        NetworkPrefix { prefix, path_id }
    }

    pub fn afi(&self) -> Afi {
        match self.prefix {
            IpNet::V4(_) => Afi::Ipv4,
            IpNet::V6(_) => Afi::Ipv6,
        }
    }
}

impl FromStr for NetworkPrefix {
    type Err = ipnet::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = IpNet::from_str(s)?;
        Ok(NetworkPrefix {
            prefix,
            path_id: None,
        })
    }
}

// Keep the debug output compact; records can hold hundreds of prefixes.
impl Debug for NetworkPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.path_id {
            Some(path_id) => write!(f, "{}#{}", self.prefix, path_id),
            None => write!(f, "{}", self.prefix),
        }
    }
}

impl Display for NetworkPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str() {
        let p = NetworkPrefix::from_str("192.168.0.0/24").unwrap();
        assert_eq!(p.prefix, IpNet::from_str("192.168.0.0/24").unwrap());
        assert_eq!(p.path_id, None);
        assert_eq!(p.afi(), Afi::Ipv4);
    }

    #[test]
    fn test_debug() {
        let p = NetworkPrefix::new(IpNet::from_str("10.0.0.0/8").unwrap(), Some(7));
        assert_eq!(format!("{p:?}"), "10.0.0.0/8#7");
        assert_eq!(p.to_string(), "10.0.0.0/8");
    }
}
