//! Backend and tunnel traits

use async_trait::async_trait;
use std::sync::Arc;
use wgbridge_config::TunnelConfig;
use wgbridge_proto::TunnelState;

use crate::error::BackendError;

/// A named tunnel as seen by the backend
///
/// The backend calls [`Tunnel::on_state_change`] once a requested transition has actually
/// happened, and again whenever the tunnel changes state on its own (e.g. the interface
/// disappears).
pub trait Tunnel: Send + Sync {
    fn name(&self) -> &str;

    fn on_state_change(&self, new_state: TunnelState);
}

/// Traffic counters for a single peer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerStatistics {
    /// Base64 public key of the peer
    pub public_key: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Traffic counters for a tunnel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statistics {
    pub peers: Vec<PeerStatistics>,
}

impl Statistics {
    pub fn total_rx(&self) -> u64 {
        self.peers.iter().map(|p| p.rx_bytes).sum()
    }

    pub fn total_tx(&self) -> u64 {
        self.peers.iter().map(|p| p.tx_bytes).sum()
    }
}

/// The native tunnel engine
#[async_trait]
pub trait Backend: Send + Sync {
    /// Names of the tunnels that are currently up
    async fn running_tunnel_names(&self) -> Result<Vec<String>, BackendError>;

    /// Current state of a tunnel. Unknown tunnels are reported as down.
    async fn get_state(&self, name: &str) -> Result<TunnelState, BackendError>;

    /// Ask the backend to move `tunnel` to `state`
    ///
    /// Returns once the backend accepted or rejected the request. The transition itself is
    /// confirmed through `tunnel.on_state_change`.
    async fn set_state(
        &self,
        tunnel: Arc<dyn Tunnel>,
        state: TunnelState,
        config: Option<TunnelConfig>,
    ) -> Result<TunnelState, BackendError>;

    /// Byte counters for a tunnel the backend knows about
    async fn get_statistics(&self, name: &str) -> Result<Statistics, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_totals() {
        let stats = Statistics {
            peers: vec![
                PeerStatistics {
                    public_key: "a".to_string(),
                    rx_bytes: 100,
                    tx_bytes: 10,
                },
                PeerStatistics {
                    public_key: "b".to_string(),
                    rx_bytes: 50,
                    tx_bytes: 5,
                },
            ],
        };
        assert_eq!(stats.total_rx(), 150);
        assert_eq!(stats.total_tx(), 15);
        assert_eq!(Statistics::default().total_rx(), 0);
    }
}
