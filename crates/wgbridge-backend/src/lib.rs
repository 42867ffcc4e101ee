//! Tunnel backend contract
//!
//! The backend is the native engine that actually brings tunnels up and down. This crate
//! defines the [`Backend`] and [`Tunnel`] traits the lifecycle controller talks to, the
//! memoized [`BackendProvider`] that constructs the backend once, and two implementations:
//!
//! - [`MemoryBackend`]: in-process simulation with controllable confirmation, used by tests
//!   and by the daemon's `memory` mode
//! - [`WgQuickBackend`]: drives the system `wg-quick` and `wg` tools

pub mod error;
pub mod memory;
pub mod naming;
pub mod provider;
pub mod tunnel;
pub mod wg_quick;

pub use error::BackendError;
pub use memory::MemoryBackend;
pub use naming::{is_name_invalid, NAME_MAX_LENGTH};
pub use provider::{AcquireError, BackendFactory, BackendProvider};
pub use tunnel::{Backend, PeerStatistics, Statistics, Tunnel};
pub use wg_quick::WgQuickBackend;

pub use wgbridge_proto::TunnelState;
