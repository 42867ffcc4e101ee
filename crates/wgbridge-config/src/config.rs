//! Typed wg-quick configuration and its parser

use std::fmt::Write as _;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::{ConfigErrorKind, ConfigParseError};
use crate::key::{Key, SecretKey};
use crate::network::{Endpoint, InetNetwork};

/// `[Interface]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub private_key: SecretKey,
    pub addresses: Vec<InetNetwork>,
    pub dns_servers: Vec<IpAddr>,
    pub dns_search_domains: Vec<String>,
    pub listen_port: Option<u16>,
    pub mtu: Option<u16>,
    pub table: Option<String>,
    pub pre_up: Vec<String>,
    pub post_up: Vec<String>,
    pub pre_down: Vec<String>,
    pub post_down: Vec<String>,
}

/// `[Peer]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub public_key: Key,
    pub preshared_key: Option<SecretKey>,
    pub allowed_ips: Vec<InetNetwork>,
    pub endpoint: Option<Endpoint>,
    pub persistent_keepalive: Option<u16>,
}

/// A complete tunnel configuration: one interface, any number of peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub interface: InterfaceConfig,
    pub peers: Vec<PeerConfig>,
}

impl TunnelConfig {
    /// Parse wg-quick configuration text
    pub fn parse(text: &str) -> Result<Self, ConfigParseError> {
        let mut interface: Option<InterfaceBuilder> = None;
        let mut peers: Vec<PeerBuilder> = Vec::new();
        let mut current = Section::None;
        let mut last_line = 0;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            last_line = line_no;

            let line = match raw.split_once('#') {
                Some((before, _comment)) => before,
                None => raw,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = match name.trim().to_ascii_lowercase().as_str() {
                    "interface" => {
                        if interface.is_some() {
                            return Err(ConfigParseError::new(
                                line_no,
                                ConfigErrorKind::DuplicateInterface,
                            ));
                        }
                        interface = Some(InterfaceBuilder::new(line_no));
                        Section::Interface
                    }
                    "peer" => {
                        peers.push(PeerBuilder::new(line_no));
                        Section::Peer
                    }
                    _ => {
                        return Err(ConfigParseError::new(
                            line_no,
                            ConfigErrorKind::UnknownSection(name.trim().to_string()),
                        ))
                    }
                };
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| ConfigParseError::new(line_no, ConfigErrorKind::Syntax))?;

            let result = match current {
                Section::None => Err(ConfigErrorKind::AttributeOutsideSection),
                Section::Interface => match interface.as_mut() {
                    Some(builder) => builder.set(key, value),
                    None => Err(ConfigErrorKind::AttributeOutsideSection),
                },
                Section::Peer => match peers.last_mut() {
                    Some(builder) => builder.set(key, value),
                    None => Err(ConfigErrorKind::AttributeOutsideSection),
                },
            };
            result.map_err(|kind| ConfigParseError::new(line_no, kind))?;
        }

        let interface = interface
            .ok_or_else(|| ConfigParseError::new(last_line, ConfigErrorKind::MissingInterface))?
            .build()?;
        let peers = peers
            .into_iter()
            .map(PeerBuilder::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { interface, peers })
    }

    /// Render back to wg-quick text
    pub fn to_wg_quick(&self) -> String {
        let mut out = String::new();
        let iface = &self.interface;

        out.push_str("[Interface]\n");
        let _ = writeln!(out, "PrivateKey = {}", iface.private_key.expose());
        if !iface.addresses.is_empty() {
            let _ = writeln!(out, "Address = {}", join(&iface.addresses));
        }
        if !iface.dns_servers.is_empty() || !iface.dns_search_domains.is_empty() {
            let mut entries: Vec<String> =
                iface.dns_servers.iter().map(|ip| ip.to_string()).collect();
            entries.extend(iface.dns_search_domains.iter().cloned());
            let _ = writeln!(out, "DNS = {}", entries.join(", "));
        }
        if let Some(port) = iface.listen_port {
            let _ = writeln!(out, "ListenPort = {}", port);
        }
        if let Some(mtu) = iface.mtu {
            let _ = writeln!(out, "MTU = {}", mtu);
        }
        if let Some(table) = &iface.table {
            let _ = writeln!(out, "Table = {}", table);
        }
        for (key, commands) in [
            ("PreUp", &iface.pre_up),
            ("PostUp", &iface.post_up),
            ("PreDown", &iface.pre_down),
            ("PostDown", &iface.post_down),
        ] {
            for command in commands {
                let _ = writeln!(out, "{} = {}", key, command);
            }
        }

        for peer in &self.peers {
            out.push_str("\n[Peer]\n");
            let _ = writeln!(out, "PublicKey = {}", peer.public_key);
            if let Some(psk) = &peer.preshared_key {
                let _ = writeln!(out, "PresharedKey = {}", psk.expose());
            }
            if !peer.allowed_ips.is_empty() {
                let _ = writeln!(out, "AllowedIPs = {}", join(&peer.allowed_ips));
            }
            if let Some(endpoint) = &peer.endpoint {
                let _ = writeln!(out, "Endpoint = {}", endpoint);
            }
            if let Some(keepalive) = peer.persistent_keepalive {
                let _ = writeln!(out, "PersistentKeepalive = {}", keepalive);
            }
        }

        out
    }
}

impl FromStr for TunnelConfig {
    type Err = ConfigParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Clone, Copy)]
enum Section {
    None,
    Interface,
    Peer,
}

fn join(networks: &[InetNetwork]) -> String {
    networks
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn invalid(key: &str, reason: impl ToString) -> ConfigErrorKind {
    ConfigErrorKind::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_networks(key: &str, value: &str) -> Result<Vec<InetNetwork>, ConfigErrorKind> {
    split_list(value)
        .map(|item| item.parse::<InetNetwork>().map_err(|e| invalid(key, e)))
        .collect()
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigErrorKind> {
    value
        .parse::<T>()
        .map_err(|_| invalid(key, format!("'{}' is not a valid number", value)))
}

struct InterfaceBuilder {
    line: usize,
    private_key: Option<SecretKey>,
    addresses: Vec<InetNetwork>,
    dns_servers: Vec<IpAddr>,
    dns_search_domains: Vec<String>,
    listen_port: Option<u16>,
    mtu: Option<u16>,
    table: Option<String>,
    pre_up: Vec<String>,
    post_up: Vec<String>,
    pre_down: Vec<String>,
    post_down: Vec<String>,
}

impl InterfaceBuilder {
    fn new(line: usize) -> Self {
        Self {
            line,
            private_key: None,
            addresses: Vec::new(),
            dns_servers: Vec::new(),
            dns_search_domains: Vec::new(),
            listen_port: None,
            mtu: None,
            table: None,
            pre_up: Vec::new(),
            post_up: Vec::new(),
            pre_down: Vec::new(),
            post_down: Vec::new(),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigErrorKind> {
        match key.to_ascii_lowercase().as_str() {
            "privatekey" => {
                self.private_key = Some(SecretKey::from_base64(value).map_err(|e| invalid(key, e))?)
            }
            "address" => self.addresses.extend(parse_networks(key, value)?),
            "dns" => {
                for entry in split_list(value) {
                    match entry.parse::<IpAddr>() {
                        Ok(ip) => self.dns_servers.push(ip),
                        Err(_) => self.dns_search_domains.push(entry.to_string()),
                    }
                }
            }
            "listenport" => self.listen_port = Some(parse_number(key, value)?),
            "mtu" => self.mtu = Some(parse_number(key, value)?),
            "table" => self.table = Some(value.to_string()),
            "preup" => self.pre_up.push(value.to_string()),
            "postup" => self.post_up.push(value.to_string()),
            "predown" => self.pre_down.push(value.to_string()),
            "postdown" => self.post_down.push(value.to_string()),
            _ => return Err(ConfigErrorKind::UnrecognizedKey(key.to_string())),
        }
        Ok(())
    }

    fn build(self) -> Result<InterfaceConfig, ConfigParseError> {
        let private_key = self.private_key.ok_or_else(|| {
            ConfigParseError::new(self.line, ConfigErrorKind::MissingAttribute("PrivateKey"))
        })?;

        Ok(InterfaceConfig {
            private_key,
            addresses: self.addresses,
            dns_servers: self.dns_servers,
            dns_search_domains: self.dns_search_domains,
            listen_port: self.listen_port,
            mtu: self.mtu,
            table: self.table,
            pre_up: self.pre_up,
            post_up: self.post_up,
            pre_down: self.pre_down,
            post_down: self.post_down,
        })
    }
}

struct PeerBuilder {
    line: usize,
    public_key: Option<Key>,
    preshared_key: Option<SecretKey>,
    allowed_ips: Vec<InetNetwork>,
    endpoint: Option<Endpoint>,
    persistent_keepalive: Option<u16>,
}

impl PeerBuilder {
    fn new(line: usize) -> Self {
        Self {
            line,
            public_key: None,
            preshared_key: None,
            allowed_ips: Vec::new(),
            endpoint: None,
            persistent_keepalive: None,
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigErrorKind> {
        match key.to_ascii_lowercase().as_str() {
            "publickey" => {
                self.public_key = Some(Key::from_base64(value).map_err(|e| invalid(key, e))?)
            }
            "presharedkey" => {
                self.preshared_key =
                    Some(SecretKey::from_base64(value).map_err(|e| invalid(key, e))?)
            }
            "allowedips" => self.allowed_ips.extend(parse_networks(key, value)?),
            "endpoint" => self.endpoint = Some(value.parse::<Endpoint>().map_err(|e| invalid(key, e))?),
            "persistentkeepalive" => {
                // wg-quick accepts "off" as an alias for 0
                self.persistent_keepalive = if value.eq_ignore_ascii_case("off") {
                    None
                } else {
                    Some(parse_number(key, value)?)
                };
            }
            _ => return Err(ConfigErrorKind::UnrecognizedKey(key.to_string())),
        }
        Ok(())
    }

    fn build(self) -> Result<PeerConfig, ConfigParseError> {
        let public_key = self.public_key.ok_or_else(|| {
            ConfigParseError::new(self.line, ConfigErrorKind::MissingAttribute("PublicKey"))
        })?;

        Ok(PeerConfig {
            public_key,
            preshared_key: self.preshared_key,
            allowed_ips: self.allowed_ips,
            endpoint: self.endpoint,
            persistent_keepalive: self.persistent_keepalive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &str = "yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=";
    const PEER_A: &str = "xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=";
    const PEER_B: &str = "TrMvSoP4jYQlY6RIzBgbssQqY3vxI2Pi+y71lOWWXX0=";
    const PSK: &str = "HIgo9xNzJMWLKASShiTqIybxZ0U3wGLiUeJ1PKf8ykw=";

    fn sample() -> String {
        format!(
            "# office tunnel\n\
             [Interface]\n\
             PrivateKey = {PRIVATE}\n\
             Address = 10.192.122.3/32, fd00::3/128\n\
             DNS = 10.192.122.1, corp.example.com\n\
             ListenPort = 51820\n\
             MTU = 1420\n\
             PostUp = iptables -A FORWARD -i %i -j ACCEPT\n\
             \n\
             [Peer]\n\
             PublicKey = {PEER_A}\n\
             PresharedKey = {PSK}\n\
             AllowedIPs = 10.192.122.0/24, 0.0.0.0/0\n\
             Endpoint = 192.95.5.67:1234 # primary\n\
             PersistentKeepalive = 25\n\
             \n\
             [Peer]\n\
             PublicKey = {PEER_B}\n\
             AllowedIPs = 10.10.10.230/32\n\
             Endpoint = [2607:5300:60:6b0::c05f:543]:2468\n"
        )
    }

    #[test]
    fn test_parse_full_config() {
        let config = TunnelConfig::parse(&sample()).unwrap();

        let iface = &config.interface;
        assert_eq!(iface.private_key.expose().to_base64(), PRIVATE);
        assert_eq!(iface.addresses.len(), 2);
        assert_eq!(iface.dns_servers, vec!["10.192.122.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(iface.dns_search_domains, vec!["corp.example.com".to_string()]);
        assert_eq!(iface.listen_port, Some(51820));
        assert_eq!(iface.mtu, Some(1420));
        assert_eq!(iface.post_up.len(), 1);

        assert_eq!(config.peers.len(), 2);
        let first = &config.peers[0];
        assert_eq!(first.public_key.to_base64(), PEER_A);
        assert!(first.preshared_key.is_some());
        assert_eq!(first.allowed_ips.len(), 2);
        assert_eq!(first.endpoint.as_ref().unwrap().port, 1234);
        assert_eq!(first.persistent_keepalive, Some(25));

        let second = &config.peers[1];
        assert_eq!(
            second.endpoint.as_ref().unwrap().host,
            "2607:5300:60:6b0::c05f:543"
        );
        assert_eq!(second.persistent_keepalive, None);
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let text = format!(
            "[interface]\nprivatekey = {PRIVATE}\n[PEER]\nPUBLICKEY = {PEER_A}\nallowedips = 0.0.0.0/0\n"
        );
        let config = TunnelConfig::parse(&text).unwrap();
        assert_eq!(config.peers[0].allowed_ips[0].prefix, 0);
    }

    #[test]
    fn test_rendered_config_parses_back() {
        let config = TunnelConfig::parse(&sample()).unwrap();
        let rendered = config.to_wg_quick();
        assert!(rendered.starts_with("[Interface]\n"));
        assert_eq!(TunnelConfig::parse(&rendered).unwrap(), config);
    }

    #[test]
    fn test_missing_private_key() {
        let text = format!("[Interface]\nAddress = 10.0.0.2/32\n[Peer]\nPublicKey = {PEER_A}\n");
        let err = TunnelConfig::parse(&text).unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.kind, ConfigErrorKind::MissingAttribute("PrivateKey"));
    }

    #[test]
    fn test_missing_interface() {
        let text = format!("[Peer]\nPublicKey = {PEER_A}\n");
        let err = TunnelConfig::parse(&text).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::MissingInterface);
    }

    #[test]
    fn test_unrecognized_key_reports_line() {
        let text = format!("[Interface]\nPrivateKey = {PRIVATE}\nColor = blue\n");
        let err = TunnelConfig::parse(&text).unwrap_err();
        assert_eq!(err.line, 3);
        assert_eq!(err.kind, ConfigErrorKind::UnrecognizedKey("Color".to_string()));
    }

    #[test]
    fn test_attribute_outside_section() {
        let err = TunnelConfig::parse("PrivateKey = abc\n").unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::AttributeOutsideSection);
    }

    #[test]
    fn test_garbage_text_is_rejected() {
        assert!(TunnelConfig::parse("this is not a tunnel config").is_err());
        assert!(TunnelConfig::parse("").is_err());
    }

    #[test]
    fn test_invalid_values() {
        let bad_key = "[Interface]\nPrivateKey = c2hvcnQ=\n";
        assert!(matches!(
            TunnelConfig::parse(bad_key).unwrap_err().kind,
            ConfigErrorKind::InvalidValue { .. }
        ));

        let bad_port = format!("[Interface]\nPrivateKey = {PRIVATE}\nListenPort = 70000\n");
        assert!(matches!(
            TunnelConfig::parse(&bad_port).unwrap_err().kind,
            ConfigErrorKind::InvalidValue { .. }
        ));

        let bad_cidr = format!("[Interface]\nPrivateKey = {PRIVATE}\nAddress = 10.0.0.1/40\n");
        assert_eq!(TunnelConfig::parse(&bad_cidr).unwrap_err().line, 3);
    }

    #[test]
    fn test_duplicate_interface() {
        let text = format!("[Interface]\nPrivateKey = {PRIVATE}\n[Interface]\n");
        let err = TunnelConfig::parse(&text).unwrap_err();
        assert_eq!(err.kind, ConfigErrorKind::DuplicateInterface);
    }

    #[test]
    fn test_keepalive_off() {
        let text = format!(
            "[Interface]\nPrivateKey = {PRIVATE}\n[Peer]\nPublicKey = {PEER_A}\nPersistentKeepalive = off\n"
        );
        let config = TunnelConfig::parse(&text).unwrap();
        assert_eq!(config.peers[0].persistent_keepalive, None);
    }
}
