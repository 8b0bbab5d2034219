//! Connection lifecycle state.
//!
//! The engine task owns exactly one [`Connection`]; there are no process-wide
//! counters. The backoff schedule is a plain value so the delay table can be
//! tested without sleeping.

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Transport-level connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnection attempts exhausted; manual reconnect required.
    Errored,
}

/// Exponential backoff schedule for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    max: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: Duration::from_secs(config.base_delay_secs),
            max: Duration::from_secs(config.max_delay_secs),
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before attempt `n` (1-based): min(base * 2^(n-1), max).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt.saturating_sub(1)).min(31);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// The one transport connection and its mutable counters.
#[derive(Debug)]
pub struct Connection {
    pub status: ConnectionStatus,
    pub session_id: Option<String>,
    /// Set by an explicit disconnect; suppresses auto-reconnect.
    pub manual_close: bool,
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Connection {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            session_id: None,
            manual_close: false,
            policy: ReconnectPolicy::new(config),
            attempts: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Starts a fresh user-initiated connect: counters cleared, manual-close
    /// suppression lifted.
    pub fn begin_connect(&mut self) {
        self.reset();
        self.manual_close = false;
        self.status = ConnectionStatus::Connecting;
    }

    /// Records a successful connect: session established, counter cleared.
    pub fn established(&mut self, session_id: String) {
        self.status = ConnectionStatus::Connected;
        self.session_id = Some(session_id);
        self.attempts = 0;
    }

    /// Advances the retry counter and returns (attempt, delay) for the next
    /// reconnection attempt, or `None` once attempts are exhausted.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.attempts >= self.policy.max_attempts() {
            return None;
        }
        self.attempts += 1;
        Some((self.attempts, self.policy.delay_for(self.attempts)))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Resets to a clean disconnected state.
    pub fn reset(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.session_id = None;
        self.attempts = 0;
    }
}
