//! Connection lifecycle for the streaming transport.
//!
//! The supervisor is a plain state machine: the streaming engine reports
//! transitions and receives the delay to wait before the next attempt. It
//! owns no sockets and no timers, which keeps the single-pending-reconnect
//! rule checkable without a network.

use std::time::Duration;

use metrics::gauge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
}

impl ConnectionState {
    fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Subscribed => 2.0,
        }
    }
}

/// Doubling delay capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay for this attempt and doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    state: ConnectionState,
    backoff: Backoff,
    reconnect_pending: bool,
    established: u64,
}

impl ReconnectSupervisor {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff: Backoff::new(base, max),
            reconnect_pending: false,
            established: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// Number of subscriptions established so far; anything above one means
    /// the current subscription is a reconnect.
    pub fn established(&self) -> u64 {
        self.established
    }

    /// `Disconnected -> Connecting`. Consumes the pending reconnect, if any.
    /// Returns `false` when a connection is already in progress or up.
    pub fn connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.reconnect_pending = false;
        self.transition(ConnectionState::Connecting);
        true
    }

    /// `Connecting -> Subscribed`; resets the backoff to its base.
    pub fn on_subscribed(&mut self) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.backoff.reset();
        self.established += 1;
        self.transition(ConnectionState::Subscribed);
    }

    /// A transport error, close or failed attempt. Moves to `Disconnected`
    /// and returns the delay of the newly scheduled reconnect, or `None`
    /// when one is already pending or the supervisor was idle.
    pub fn on_failure(&mut self) -> Option<Duration> {
        match self.state {
            ConnectionState::Disconnected => None,
            ConnectionState::Connecting | ConnectionState::Subscribed => {
                self.transition(ConnectionState::Disconnected);
                if self.reconnect_pending {
                    return None;
                }
                self.reconnect_pending = true;
                Some(self.backoff.next_delay())
            }
        }
    }

    /// Resets to `Disconnected` and cancels any pending reconnect. Always
    /// permitted, including while connecting.
    pub fn unsubscribe(&mut self) {
        self.reconnect_pending = false;
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        self.state = next;
        gauge!("monitor_connection_state").set(next.as_gauge());
    }
}
