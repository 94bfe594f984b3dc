//! Component G: Keep-Alive Controller.
//!
//! Modeled on a test-and-reset repeater shape, but built on
//! `chrono::DateTime<Local>` rather than a monotonic `Instant`: keep-alive
//! timeouts need to tolerate a suspended laptop to within one `net_timeout`
//! cycle, which a monotonic clock does not give us on most platforms.

use chrono::{DateTime, Local};

use crate::constants::MAX_PINGS;
use crate::error::Fatal;
use crate::state::{ServerFeatures, SessionState};

/// What the event loop should do as a result of one keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// Nothing due yet.
    Idle,
    /// Send an `l`-type ping; the caller increments `pings_outstanding`.
    SendPing,
    /// Send an `n`-type no-op; since it has no response, the caller should
    /// immediately refresh `last_inbound_time` as if it were inbound.
    SendNoop,
}

/// `net_timeout` in seconds; `0` disables keep-alives entirely.
pub struct KeepAlive {
    net_timeout_secs: u64,
}

impl KeepAlive {
    pub fn new(net_timeout_secs: u64) -> Self {
        Self { net_timeout_secs }
    }

    pub fn is_disabled(&self) -> bool {
        self.net_timeout_secs == 0
    }

    /// The `poll` timeout: `net_timeout` seconds expressed in tenths of a
    /// second, or `None` (infinite) when disabled.
    pub fn poll_timeout(&self) -> Option<std::time::Duration> {
        if self.is_disabled() {
            None
        } else {
            Some(std::time::Duration::from_millis(self.net_timeout_secs * 100))
        }
    }

    /// Evaluate one keep-alive tick against wall-clock `now`. Returns
    /// `Err(Fatal::ServerTimedOut)` once the peer has missed `max_pings`
    /// worth of keep-alives.
    pub fn tick(&self, session: &mut SessionState, now: DateTime<Local>) -> Result<KeepAliveAction, Fatal> {
        if self.is_disabled() {
            return Ok(KeepAliveAction::Idle);
        }
        let elapsed = (now - session.last_inbound_time).num_seconds().max(0) as u64;
        let timeout = self.net_timeout_secs;

        if elapsed > timeout * u64::from(MAX_PINGS) {
            return Err(Fatal::ServerTimedOut);
        }

        if elapsed > timeout * (u64::from(session.pings_outstanding) + 1) {
            if session.server_features.contains(ServerFeatures::PING) {
                session.pings_outstanding += 1;
                Ok(KeepAliveAction::SendPing)
            } else {
                session.last_inbound_time = now;
                Ok(KeepAliveAction::SendNoop)
            }
        } else {
            Ok(KeepAliveAction::Idle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(secs_ago: i64) -> SessionState {
        let mut s = SessionState::new("alice", "host", "lounge");
        s.last_inbound_time = Local::now() - chrono::Duration::seconds(secs_ago);
        s
    }

    #[test]
    fn disabled_when_zero_timeout() {
        let ka = KeepAlive::new(0);
        assert!(ka.is_disabled());
        assert!(ka.poll_timeout().is_none());
        let mut s = session_at(1_000_000);
        assert_eq!(ka.tick(&mut s, Local::now()).unwrap(), KeepAliveAction::Idle);
    }

    #[test]
    fn pings_escalate_then_time_out() {
        let ka = KeepAlive::new(5);
        let mut s = session_at(6);
        assert_eq!(ka.tick(&mut s, Local::now()).unwrap(), KeepAliveAction::SendPing);
        assert_eq!(s.pings_outstanding, 1);

        s.last_inbound_time = Local::now() - chrono::Duration::seconds(11);
        assert_eq!(ka.tick(&mut s, Local::now()).unwrap(), KeepAliveAction::SendPing);
        assert_eq!(s.pings_outstanding, 2);

        s.last_inbound_time = Local::now() - chrono::Duration::seconds(16);
        assert_eq!(ka.tick(&mut s, Local::now()).unwrap(), KeepAliveAction::SendPing);
        assert_eq!(s.pings_outstanding, 3);

        assert!(matches!(ka.tick(&mut s, Local::now()).unwrap_err(), Fatal::ServerTimedOut));
    }

    #[test]
    fn falls_back_to_noop_once_ping_feature_is_cleared() {
        let ka = KeepAlive::new(5);
        let mut s = session_at(6);
        s.clear_ping_feature();
        assert_eq!(ka.tick(&mut s, Local::now()).unwrap(), KeepAliveAction::SendNoop);
        assert_eq!(s.pings_outstanding, 0, "noop has no response, no ping to track");
    }

    #[test]
    fn inbound_byte_resets_pings_outstanding() {
        let mut s = session_at(6);
        s.pings_outstanding = 2;
        s.note_inbound();
        assert_eq!(s.pings_outstanding, 0);
    }
}
