//! Component H: Event Loop.
//!
//! A single `mio::Poll` multiplexing one remote socket against several
//! *local* fds (stdin, stdout, and one history file per active room/peer),
//! each tracked by its own `Token` and registered or deregistered as its
//! queue empties or fills — the mirror image of a server's token-indexed
//! table of many remote connections.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

use chrono::Local;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, info, warn};

use oicb_protocol::codec::{self, Message};
use oicb_protocol::connection::Connection;
use oicb_protocol::constants::FIELD_SEP;
use oicb_protocol::dispatcher::{self, DispatchEffect};
use oicb_protocol::error::Fatal;
use oicb_protocol::formatter::render_chat_line;
use oicb_protocol::history::{HistoryKind, HistoryWriter};
use oicb_protocol::keepalive::{KeepAlive, KeepAliveAction};
use oicb_protocol::line_editor::{Bridge, Feed, LineEditor};
use oicb_protocol::state::{Phase, SessionState};
use oicb_protocol::task_queue::{DrainOutcome, OutputTask, TaskQueue};

use crate::signals::Flags;
use crate::terminal::{RawStdin, RawStdout};

const TOKEN_STDIN: Token = Token(0);
const TOKEN_STDOUT: Token = Token(1);
const TOKEN_SOCKET: Token = Token(2);
const FIRST_HISTORY_TOKEN: usize = 16;

pub struct EventLoop {
    connection: Connection,
    session: SessionState,
    keepalive: KeepAlive,
    history: HistoryWriter,
    stdout_queue: TaskQueue,
    socket_queue: TaskQueue,
    editor: LineEditor,
    bridge: Bridge,
    flags: Flags,
    stdin: RawStdin,
    stdout: RawStdout,

    poll: Poll,
    stdout_registered: bool,
    history_tokens: HashMap<PathBuf, (Token, std::os::unix::io::RawFd)>,
    next_history_token: usize,
}

impl EventLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection: Connection,
        session: SessionState,
        net_timeout_secs: u64,
        history_enabled: bool,
        server_label: String,
        flags: Flags,
        stdin_fd: std::os::unix::io::RawFd,
        stdout_fd: std::os::unix::io::RawFd,
    ) -> std::io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry().register(&mut SourceFd(&stdin_fd), TOKEN_STDIN, Interest::READABLE)?;
        poll.registry().register(&mut SourceFd(&connection.stream.as_raw_fd()), TOKEN_SOCKET, Interest::READABLE)?;

        Ok(Self {
            connection,
            session,
            keepalive: KeepAlive::new(net_timeout_secs),
            history: HistoryWriter::new(server_label, history_enabled),
            stdout_queue: TaskQueue::new(),
            socket_queue: TaskQueue::new(),
            editor: LineEditor::new(),
            bridge: Bridge::new(),
            flags,
            stdin: RawStdin(stdin_fd),
            stdout: RawStdout(stdout_fd),
            poll,
            stdout_registered: false,
            history_tokens: HashMap::new(),
            next_history_token: FIRST_HISTORY_TOKEN,
        })
    }

    /// Runs until a fatal error, a server `g`, or a signal-driven exit.
    /// Returns the process exit code.
    pub fn run(&mut self) -> Result<i32, Fatal> {
        let mut events = Events::with_capacity(32);

        loop {
            if self.flags.take_exit() {
                info!("exit requested, shutting down");
                return Ok(0);
            }
            if self.flags.take_info() {
                self.enqueue_status_line();
            }

            self.drain_socket_outbound()?;

            let now = Local::now();
            match self.keepalive.tick(&mut self.session, now)? {
                KeepAliveAction::Idle => {}
                KeepAliveAction::SendPing => self.enqueue_socket(b'l', Vec::new()),
                KeepAliveAction::SendNoop => self.enqueue_socket(b'n', Vec::new()),
            }
            self.drain_socket_outbound()?;

            self.refresh_pollset()?;

            let timeout = self.keepalive.poll_timeout();
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(Fatal::ReadinessError { label: "poll" });
            }

            for event in &events {
                match event.token() {
                    TOKEN_STDIN => {
                        if event.is_error() {
                            return Err(Fatal::ReadinessError { label: "stdin" });
                        }
                        if event.is_readable() {
                            self.deliver_one_char()?;
                        }
                    }
                    TOKEN_STDOUT => {
                        if event.is_error() {
                            return Err(Fatal::ReadinessError { label: "stdout" });
                        }
                    }
                    TOKEN_SOCKET => {
                        if event.is_error() {
                            return Err(Fatal::ReadinessError { label: "socket" });
                        }
                        if event.is_writable() && self.session.phase == Phase::Connecting {
                            self.session.phase = Phase::Connected;
                            debug!("socket connected");
                        }
                        if event.is_readable() {
                            match self.read_and_dispatch() {
                                Ok(Shutdown::Continue) => {}
                                Ok(Shutdown::CleanExit) => return Ok(0),
                                Err(e) => return Err(e),
                            }
                        }
                    }
                    _ => {}
                }
            }

            if !self.stdout_queue.is_empty() {
                let blank = self.bridge.save_and_blank(&self.editor);
                self.stdout_queue.enqueue(OutputTask::new(blank));
                match self.stdout_queue.drain(&mut self.stdout) {
                    DrainOutcome::Drained | DrainOutcome::WouldBlock => {}
                    DrainOutcome::Failed(e) => return Err(Fatal::WriteFailed { label: "stdout", source: e }),
                }
                if let Some(redraw) = self.bridge.restore_and_redraw(&mut self.editor) {
                    let mut t = TaskQueue::new();
                    t.enqueue(OutputTask::new(redraw));
                    if let DrainOutcome::Failed(e) = t.drain(&mut self.stdout) {
                        return Err(Fatal::WriteFailed { label: "stdout", source: e });
                    }
                }
            }

            self.history.drain_and_prune();
        }
    }

    fn enqueue_status_line(&mut self) {
        let line = format!(
            "[=status: nick={} room={} phase={:?} pings_outstanding={}=]\n",
            self.session.nick, self.session.room, self.session.phase, self.session.pings_outstanding
        );
        self.stdout_queue.enqueue(OutputTask::new(line.into_bytes()));
    }

    fn enqueue_socket(&mut self, kind: u8, payload: Vec<u8>) {
        for packet in codec::encode_legacy(kind, &payload, &self.session.nick) {
            self.socket_queue.enqueue(OutputTask::new(packet));
        }
    }

    fn drain_socket_outbound(&mut self) -> Result<(), Fatal> {
        match self.socket_queue.drain(&mut self.connection) {
            DrainOutcome::Drained | DrainOutcome::WouldBlock => Ok(()),
            DrainOutcome::Failed(e) => Err(Fatal::WriteFailed { label: "socket", source: e }),
        }
    }

    /// Read exactly one byte from stdin and deliver it to the editor — the
    /// line editor's contract is one byte at a time, not a whole read's
    /// worth.
    fn deliver_one_char(&mut self) -> Result<(), Fatal> {
        let mut byte = [0u8; 1];
        match std::io::Read::read(&mut self.stdin, &mut byte) {
            Ok(0) => Ok(()),
            Ok(_) => {
                match self.editor.feed_byte(byte[0]) {
                    Feed::Nothing => {}
                    Feed::Redraw => {
                        self.stdout_queue.enqueue(OutputTask::new(self.editor.render()));
                    }
                    Feed::Line(line) => self.handle_input_line(line),
                    Feed::WantInfo => self.enqueue_status_line(),
                    Feed::WantExit => self.flags.want_exit.store(true, std::sync::atomic::Ordering::SeqCst),
                }
                Ok(())
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(Fatal::Io(e)),
        }
    }

    /// A completed input line: `/`-prefixed becomes an `h`-type command
    /// (Chat → CommandSent), anything else an ordinary `b`-type chat line.
    /// A bare `"/"` with nothing after it is literal chat text, not a
    /// zero-length command.
    fn handle_input_line(&mut self, line: Vec<u8>) {
        if line.first() == Some(&b'/') && line.len() > 1 {
            let command = &line[1..];
            let payload = if let Some(rest) = command.strip_prefix(b"m ") {
                let space = rest.iter().position(|&b| b == b' ').unwrap_or(rest.len());
                let (peer, text) = rest.split_at(space);
                let text = text.strip_prefix(b" ").unwrap_or(text);
                let peer_str = String::from_utf8_lossy(peer).into_owned();
                let text_str = String::from_utf8_lossy(text).into_owned();
                self.history.append(HistoryKind::Private, "me", &self.session.room, &format!("{peer_str}\x01{text_str}"));

                let mut p = b"m\x01".to_vec();
                p.extend_from_slice(peer);
                p.push(FIELD_SEP);
                p.extend_from_slice(text);
                p
            } else {
                let mut p = command.to_vec();
                if let Some(sp) = p.iter().position(|&b| b == b' ') {
                    p[sp] = FIELD_SEP;
                }
                p
            };
            self.enqueue_socket(b'h', payload);
            self.session.enter_command();
        } else {
            self.enqueue_socket(b'b', line);
        }
    }

    fn read_and_dispatch(&mut self) -> Result<Shutdown, Fatal> {
        self.connection.fill()?;
        for msg in self.connection.decode_ready()? {
            if let Shutdown::CleanExit = self.handle_inbound(msg)? {
                return Ok(Shutdown::CleanExit);
            }
        }
        Ok(Shutdown::Continue)
    }

    fn handle_inbound(&mut self, msg: Message) -> Result<Shutdown, Fatal> {
        self.session.check_phase(msg.kind)?;
        self.session.note_inbound();

        match msg.kind {
            b'j' => self.handle_login_challenge(&msg)?,
            b'a' => self.session.phase = Phase::Chat,
            b'b' | b'c' | b'd' | b'f' => {
                self.session.revert_to_chat_if_command_sent();
                self.handle_chat_line(msg.kind, &msg)?;
            }
            b'e' => self.handle_error(&msg.payload),
            b'k' => {
                if let Some(line) = render_chat_line(b'k', b"", &msg.payload) {
                    self.stdout_queue.enqueue(OutputTask::new(line));
                }
            }
            b'g' => {
                info!("server closed the group, exiting");
                return Ok(Shutdown::CleanExit);
            }
            b'i' => {
                let (out, effect) = dispatcher::dispatch(&msg.payload, &self.session.room, &mut self.session.last_cmd_has_nl)?;
                if !out.is_empty() {
                    self.stdout_queue.enqueue(OutputTask::new(out));
                }
                if effect == DispatchEffect::EndOfCommand {
                    self.session.end_of_command();
                }
            }
            b'l' => self.enqueue_socket(b'm', msg.payload.clone()),
            b'm' | b'n' => {}
            other => {
                warn!(kind = %(other as char), "unsupported message of type");
            }
        }
        Ok(Shutdown::Continue)
    }

    fn handle_login_challenge(&mut self, msg: &Message) -> Result<(), Fatal> {
        let mut fields = msg.fields();
        let version = fields.next().ok_or(Fatal::MissingField { context: "j: protocol_version" })?;
        if version != oicb_protocol::constants::PROTOCOL_VERSION.as_bytes() {
            return Err(Fatal::UnsupportedProtocolVersion(String::from_utf8_lossy(version).into_owned()));
        }
        let payload = self.session.login_payload();
        self.enqueue_socket(b'a', payload);
        self.session.phase = Phase::LoginSent;
        Ok(())
    }

    fn handle_chat_line(&mut self, kind: u8, msg: &Message) -> Result<(), Fatal> {
        let mut fields = msg.fields();
        let author = fields.next().ok_or(Fatal::MissingField { context: "chat message: author" })?;
        let text = fields.next().ok_or(Fatal::MissingField { context: "chat message: text" })?;

        if let Some(line) = render_chat_line(kind, author, text) {
            self.stdout_queue.enqueue(OutputTask::new(line));
        }

        let author_str = String::from_utf8_lossy(author).into_owned();
        let text_str = String::from_utf8_lossy(text).into_owned();
        let history_kind = if kind == b'c' { HistoryKind::Private } else { HistoryKind::Room };
        self.history.append(history_kind, &author_str, &self.session.room, &text_str);
        Ok(())
    }

    /// `"Undefined message type 108"` is the server telling us it doesn't
    /// answer `l` pings; everything else is an ordinary chat error line.
    fn handle_error(&mut self, payload: &[u8]) {
        const UNSUPPORTED_PING: &[u8] = b"Undefined message type 108";
        if payload == UNSUPPORTED_PING {
            self.session.clear_ping_feature();
            return;
        }
        if let Some(line) = render_chat_line(b'e', b"", payload) {
            self.stdout_queue.enqueue(OutputTask::new(line));
        }
    }

    fn refresh_pollset(&mut self) -> std::io::Result<()> {
        let registry = self.poll.registry();

        let want_stdout = !self.stdout_queue.is_empty();
        if want_stdout && !self.stdout_registered {
            registry.register(&mut SourceFd(&self.stdout.0), TOKEN_STDOUT, Interest::WRITABLE)?;
            self.stdout_registered = true;
        } else if !want_stdout && self.stdout_registered {
            registry.deregister(&mut SourceFd(&self.stdout.0))?;
            self.stdout_registered = false;
        }

        let socket_fd = self.connection.stream.as_raw_fd();
        let socket_interest = if !self.socket_queue.is_empty() || self.session.phase == Phase::Connecting {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        registry.reregister(&mut SourceFd(&socket_fd), TOKEN_SOCKET, socket_interest)?;

        let writable = self.history.writable_fds();
        let wanted: HashMap<PathBuf, i32> = writable.into_iter().collect();

        let stale: Vec<PathBuf> = self.history_tokens.keys().filter(|p| !wanted.contains_key(*p)).cloned().collect();
        for path in stale {
            if let Some((_, fd)) = self.history_tokens.remove(&path) {
                // Best-effort: the fd may already be closed if the entry was pruned.
                let _ = registry.deregister(&mut SourceFd(&fd));
            }
        }

        for (path, fd) in &wanted {
            match self.history_tokens.get(path) {
                Some((_, registered_fd)) if registered_fd == fd => {}
                Some((token, _)) => {
                    let token = *token;
                    registry.reregister(&mut SourceFd(fd), token, Interest::WRITABLE)?;
                    self.history_tokens.insert(path.clone(), (token, *fd));
                }
                None => {
                    let token = Token(self.next_history_token);
                    self.next_history_token += 1;
                    registry.register(&mut SourceFd(fd), token, Interest::WRITABLE)?;
                    self.history_tokens.insert(path.clone(), (token, *fd));
                }
            }
        }

        Ok(())
    }
}

enum Shutdown {
    Continue,
    CleanExit,
}
