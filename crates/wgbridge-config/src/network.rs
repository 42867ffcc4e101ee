//! Addresses, CIDR blocks and peer endpoints

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An address with prefix length, e.g. `10.0.0.2/32` or `fd00::/64`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InetNetwork {
    pub address: IpAddr,
    pub prefix: u8,
}

impl InetNetwork {
    pub fn new(address: IpAddr, prefix: u8) -> Result<Self, String> {
        let max = max_prefix(&address);
        if prefix > max {
            return Err(format!("prefix /{} exceeds /{}", prefix, max));
        }
        Ok(Self { address, prefix })
    }
}

fn max_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

impl FromStr for InetNetwork {
    type Err = String;

    /// A bare address is taken as a host route
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_part, prefix_part) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let address: IpAddr = addr_part
            .trim()
            .parse()
            .map_err(|_| format!("invalid address '{}'", addr_part.trim()))?;

        let prefix = match prefix_part {
            Some(p) => p
                .trim()
                .parse::<u8>()
                .map_err(|_| format!("invalid prefix length '{}'", p.trim()))?,
            None => max_prefix(&address),
        };

        Self::new(address, prefix)
    }
}

impl fmt::Display for InetNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// Peer endpoint. The host may be a DNS name, resolved by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest
                .split_once("]:")
                .ok_or_else(|| format!("invalid bracketed endpoint '{}'", s))?;
            (host, port)
        } else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| format!("endpoint '{}' is missing a port", s))?;
            if host.contains(':') {
                return Err(format!("IPv6 endpoint '{}' must use [addr]:port", s));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(format!("endpoint '{}' has an empty host", s));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid endpoint port '{}'", port))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
