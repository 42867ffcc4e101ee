//! In-process backend simulation
//!
//! `MemoryBackend` keeps tunnel state in memory and confirms transitions from a spawned task
//! after a configurable delay, the way a real engine confirms them from its own thread. It
//! can be told to fail the next request, to never confirm, to account traffic and to drop a
//! tunnel as if the link was lost.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};
use wgbridge_config::TunnelConfig;
use wgbridge_proto::TunnelState;

use crate::error::BackendError;
use crate::tunnel::{Backend, PeerStatistics, Statistics, Tunnel};

struct TunnelEntry {
    state: TunnelState,
    handle: Arc<dyn Tunnel>,
    config: Option<TunnelConfig>,
    rx_bytes: u64,
    tx_bytes: u64,
}

#[derive(Default)]
struct Inner {
    tunnels: HashMap<String, TunnelEntry>,
    fail_next: Option<BackendError>,
    silent: bool,
    set_state_calls: usize,
}

pub struct MemoryBackend {
    inner: Arc<Mutex<Inner>>,
    confirm_delay: Duration,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            confirm_delay: Duration::from_millis(10),
        }
    }

    /// Delay between accepting a transition and confirming it
    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    /// Reject the next `set_state` call with `err`
    pub fn fail_next(&self, err: BackendError) {
        self.lock().fail_next = Some(err);
    }

    /// Accept transitions but never confirm them
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Account traffic on an existing tunnel
    pub fn record_traffic(&self, name: &str, rx_bytes: u64, tx_bytes: u64) {
        if let Some(entry) = self.lock().tunnels.get_mut(name) {
            entry.rx_bytes += rx_bytes;
            entry.tx_bytes += tx_bytes;
        }
    }

    /// Take a tunnel down without anyone asking for it
    pub fn simulate_link_loss(&self, name: &str) {
        let handle = {
            let mut inner = self.lock();
            match inner.tunnels.get_mut(name) {
                Some(entry) if entry.state == TunnelState::Up => {
                    entry.state = TunnelState::Down;
                    entry.handle.clone()
                }
                _ => return,
            }
        };

        warn!("[{}] Simulated link loss", name);
        handle.on_state_change(TunnelState::Down);
    }

    /// Number of `set_state` calls accepted or rejected so far
    pub fn set_state_calls(&self) -> usize {
        self.lock().set_state_calls
    }

    /// Configuration most recently handed to `name`
    pub fn last_config(&self, name: &str) -> Option<TunnelConfig> {
        self.lock()
            .tunnels
            .get(name)
            .and_then(|entry| entry.config.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn running_tunnel_names(&self) -> Result<Vec<String>, BackendError> {
        let inner = self.lock();
        let mut names: Vec<String> = inner
            .tunnels
            .iter()
            .filter(|(_, entry)| entry.state == TunnelState::Up)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn get_state(&self, name: &str) -> Result<TunnelState, BackendError> {
        Ok(self
            .lock()
            .tunnels
            .get(name)
            .map(|entry| entry.state)
            .unwrap_or(TunnelState::Down))
    }

    async fn set_state(
        &self,
        tunnel: Arc<dyn Tunnel>,
        state: TunnelState,
        config: Option<TunnelConfig>,
    ) -> Result<TunnelState, BackendError> {
        let name = tunnel.name().to_string();

        let (target, silent) = {
            let mut inner = self.lock();
            inner.set_state_calls += 1;

            if let Some(err) = inner.fail_next.take() {
                debug!("[{}] Injected failure: {}", name, err);
                return Err(err);
            }

            let current = inner
                .tunnels
                .get(&name)
                .map(|entry| entry.state)
                .unwrap_or(TunnelState::Down);

            let target = match state {
                TunnelState::Toggle if current == TunnelState::Up => TunnelState::Down,
                TunnelState::Toggle => TunnelState::Up,
                other => other,
            };

            let known_config = inner
                .tunnels
                .get(&name)
                .and_then(|entry| entry.config.clone());
            let config = config.or(known_config);

            if target == TunnelState::Up && config.is_none() {
                return Err(BackendError::MissingConfig);
            }

            let entry = inner
                .tunnels
                .entry(name.clone())
                .or_insert_with(|| TunnelEntry {
                    state: TunnelState::Down,
                    handle: tunnel.clone(),
                    config: None,
                    rx_bytes: 0,
                    tx_bytes: 0,
                });
            entry.handle = tunnel.clone();
            entry.config = config;

            (target, inner.silent)
        };

        info!("[{}] Accepted transition to {}", name, target);

        if silent {
            return Ok(target);
        }

        let inner = self.inner.clone();
        let delay = self.confirm_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(entry) = inner.tunnels.get_mut(&name) {
                    entry.state = target;
                }
            }
            debug!("[{}] Confirming {}", name, target);
            tunnel.on_state_change(target);
        });

        Ok(target)
    }

    async fn get_statistics(&self, name: &str) -> Result<Statistics, BackendError> {
        let inner = self.lock();
        let entry = inner
            .tunnels
            .get(name)
            .ok_or_else(|| BackendError::UnknownTunnel(name.to_string()))?;

        let mut peers: Vec<PeerStatistics> = entry
            .config
            .iter()
            .flat_map(|config| config.peers.iter())
            .map(|peer| PeerStatistics {
                public_key: peer.public_key.to_base64(),
                rx_bytes: 0,
                tx_bytes: 0,
            })
            .collect();

        match peers.first_mut() {
            Some(first) => {
                first.rx_bytes = entry.rx_bytes;
                first.tx_bytes = entry.tx_bytes;
            }
            None => peers.push(PeerStatistics {
                public_key: String::new(),
                rx_bytes: entry.rx_bytes,
                tx_bytes: entry.tx_bytes,
            }),
        }

        Ok(Statistics { peers })
    }
}
