//! Reconnect state machine for one listener session.
//!
//! A session spans every reconnect attempt made under one client id:
//!
//! ```text
//! Connecting -> Open -> Closed -> (delay) -> Connecting -> ...
//!                          \-> Closed for good once the retry budget is spent
//! any state -> Stopped (deactivation only)
//! ```
//!
//! The session only decides; the driver in [`crate::listener`] owns the socket,
//! the heartbeat interval and the delay.
use std::time::Duration;

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    Unlimited,
    Max(u32),
}

impl RetryLimit {
    /// `-1` means unlimited. Any other negative value allows no retries.
    pub fn from_max_retries(max_retries: i64) -> Self {
        match max_retries {
            -1 => RetryLimit::Unlimited,
            n if n < 0 => RetryLimit::Max(0),
            n => RetryLimit::Max(u32::try_from(n).unwrap_or(u32::MAX)),
        }
    }

    fn allows(&self, retries_so_far: u32) -> bool {
        match self {
            RetryLimit::Unlimited => true,
            RetryLimit::Max(max) => retries_so_far < *max,
        }
    }
}

/// What the driver should do after a socket closed (or never opened).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Reconnect { attempt: u32, delay: Duration },
    /// Retry budget spent; stay closed until deactivated.
    Exhausted,
    Stopped,
}

#[derive(Debug)]
pub struct Session {
    client_id: Uuid,
    state: SessionState,
    retry_count: u32,
    closing: bool,
    reconnect_interval: Duration,
    retry_limit: RetryLimit,
}

impl Session {
    pub fn new(reconnect_interval: Duration, retry_limit: RetryLimit) -> Self {
        Session {
            client_id: Uuid::new_v4(),
            state: SessionState::Connecting,
            retry_count: 0,
            closing: false,
            reconnect_interval,
            retry_limit,
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Enter `Connecting`. Returns false once the session is stopping.
    pub fn begin_connect(&mut self) -> bool {
        if self.closing {
            return false;
        }
        self.state = SessionState::Connecting;
        true
    }

    pub fn on_open(&mut self) {
        if self.closing {
            return;
        }
        self.state = SessionState::Open;
        self.retry_count = 0;
    }

    /// Handle a close, or a connection that could not be built or opened.
    pub fn on_close(&mut self) -> CloseDecision {
        if self.closing {
            self.state = SessionState::Stopped;
            return CloseDecision::Stopped;
        }
        self.state = SessionState::Closed;
        if !self.retry_limit.allows(self.retry_count) {
            return CloseDecision::Exhausted;
        }
        self.retry_count = self.retry_count.saturating_add(1);
        CloseDecision::Reconnect { attempt: self.retry_count, delay: self.reconnect_interval }
    }

    /// Set the closing flag. It is never cleared. Returns false if already set.
    pub fn stop(&mut self) -> bool {
        let first = !self.closing;
        self.closing = true;
        self.state = SessionState::Stopped;
        first
    }
}
