//! WireGuard tunnel configuration
//!
//! Parses the wg-quick INI format handed over by the host shell into a typed
//! [`TunnelConfig`], and writes it back out for backends that shell out to `wg-quick`.
//!
//! ```
//! use wgbridge_config::TunnelConfig;
//!
//! let config = TunnelConfig::parse(
//!     "[Interface]\n\
//!      PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
//!      Address = 10.0.0.2/32\n\
//!      \n\
//!      [Peer]\n\
//!      PublicKey = xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=\n\
//!      AllowedIPs = 0.0.0.0/0\n\
//!      Endpoint = vpn.example.com:51820\n",
//! )
//! .unwrap();
//!
//! assert_eq!(config.peers.len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod network;

pub use config::{InterfaceConfig, PeerConfig, TunnelConfig};
pub use error::{ConfigErrorKind, ConfigParseError};
pub use key::{Key, KeyError, SecretKey, KEY_LEN};
pub use network::{Endpoint, InetNetwork};
