//! Controller configuration

use std::time::Duration;

/// What to do when a lifecycle operation arrives while another one is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Fail the new operation with `Busy`
    #[default]
    Reject,
    /// Wait for the running operation to finish
    Queue,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on waiting for the backend to be constructed
    pub backend_wait: Duration,
    /// Upper bound on waiting for the backend to confirm a transition
    pub transition_timeout: Duration,
    pub busy_policy: BusyPolicy,
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self {
            backend_wait: Duration::from_secs(10),
            transition_timeout: Duration::from_secs(30),
            busy_policy: BusyPolicy::Reject,
        }
    }

    pub fn with_backend_wait(mut self, wait: Duration) -> Self {
        self.backend_wait = wait;
        self
    }

    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.backend_wait, Duration::from_secs(10));
        assert_eq!(config.transition_timeout, Duration::from_secs(30));
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_builder() {
        let config = ControllerConfig::new()
            .with_backend_wait(Duration::from_millis(5))
            .with_transition_timeout(Duration::from_millis(50))
            .with_busy_policy(BusyPolicy::Queue);
        assert_eq!(config.backend_wait, Duration::from_millis(5));
        assert_eq!(config.transition_timeout, Duration::from_millis(50));
        assert_eq!(config.busy_policy, BusyPolicy::Queue);
    }
}
