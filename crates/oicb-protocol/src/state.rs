//! Component F: Connection State Machine.

use bitflags::bitflags;
use chrono::{DateTime, Local};

use crate::error::Fatal;

bitflags! {
    /// Capabilities the server has (or hasn't) advertised.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ServerFeatures: u8 {
        /// Server answers `l` pings. Starts set; cleared on "Undefined
        /// message type 108".
        const PING = 0b0000_0001;
        /// Server speaks the extended (multi-packet continuation) wire
        /// scheme. No activation path is described for this client — it
        /// always encodes outbound messages in legacy mode and only ever
        /// needs to *decode* extended framing from peers. See DESIGN.md.
        const EXTENDED = 0b0000_0010;
    }
}

impl Default for ServerFeatures {
    fn default() -> Self {
        ServerFeatures::PING
    }
}

/// Position in the protocol handshake/operation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Connected,
    LoginSent,
    Chat,
    CommandSent,
}

impl Phase {
    /// Inbound message kinds permitted in this phase.
    fn permits(self, kind: u8) -> bool {
        match self {
            Phase::Connecting => false,
            Phase::Connected => kind == b'j',
            Phase::LoginSent => kind == b'a',
            Phase::Chat => matches!(kind, b'b' | b'c' | b'd' | b'e' | b'f' | b'g' | b'i' | b'k' | b'l' | b'm' | b'n'),
            Phase::CommandSent => matches!(kind, b'b' | b'c' | b'd' | b'f' | b'e' | b'i'),
        }
    }
}

/// Everything the protocol engine needs to track about one connection.
pub struct SessionState {
    pub nick: String,
    pub hostname: String,
    pub room: String,
    pub server_features: ServerFeatures,
    pub phase: Phase,
    /// Wall-clock, not monotonic: keep-alive timeouts need to tolerate a
    /// suspended laptop, which a monotonic `Instant` would not (it stalls
    /// across suspend on most platforms).
    pub last_inbound_time: DateTime<Local>,
    pub pings_outstanding: u8,
    /// Set by `co`, consulted by `ec`; sound only because `phase` admits at
    /// most one outstanding command at a time.
    pub last_cmd_has_nl: bool,
}

impl SessionState {
    pub fn new(nick: impl Into<String>, hostname: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            hostname: hostname.into(),
            room: room.into(),
            server_features: ServerFeatures::default(),
            phase: Phase::Connecting,
            last_inbound_time: Local::now(),
            pings_outstanding: 0,
            last_cmd_has_nl: false,
        }
    }

    /// Reject a message the current phase doesn't permit; this is the
    /// entire job of the "connection state machine" — everything else
    /// about handling a message is the dispatcher's job.
    pub fn check_phase(&self, kind: u8) -> Result<(), Fatal> {
        if self.phase.permits(kind) {
            Ok(())
        } else {
            Err(Fatal::UnexpectedMessage { kind: kind as char, phase: self.phase_label() })
        }
    }

    fn phase_label(&self) -> &'static str {
        match self.phase {
            Phase::Connecting => "Connecting",
            Phase::Connected => "Connected",
            Phase::LoginSent => "LoginSent",
            Phase::Chat => "Chat",
            Phase::CommandSent => "CommandSent",
        }
    }

    /// Build the login packet payload sent on `j`.
    pub fn login_payload(&self) -> Vec<u8> {
        format!("{nick}\x01{nick}\x01{room}\x01login\x01", nick = self.nick, room = self.room).into_bytes()
    }

    /// A user typed a line beginning with `/`: classify it into the
    /// `h`-type command payload and transition Chat/CommandSent appropriately.
    pub fn enter_command(&mut self) {
        self.phase = Phase::CommandSent;
    }

    /// `ec` arrived: return to steady-state chat.
    pub fn end_of_command(&mut self) {
        self.phase = Phase::Chat;
    }

    /// A chat-like message (`b`/`c`/`d`/`f`) arrived while a command was
    /// outstanding: these are ordinary Chat arrivals and revert the phase.
    pub fn revert_to_chat_if_command_sent(&mut self) {
        if self.phase == Phase::CommandSent {
            self.phase = Phase::Chat;
        }
    }

    /// Any inbound byte resets the keep-alive clock.
    pub fn note_inbound(&mut self) {
        self.last_inbound_time = Local::now();
        self.pings_outstanding = 0;
    }

    /// `e` payload `"Undefined message type 108"`: the peer doesn't answer
    /// pings. The keep-alive controller falls back to no-ops from here on.
    pub fn clear_ping_feature(&mut self) {
        self.server_features.remove(ServerFeatures::PING);
    }
}
