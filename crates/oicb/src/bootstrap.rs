//! Component J: Bootstrap. Parses argv, dials the server, installs signal
//! handlers and raw terminal mode, and drives the event loop.

use std::os::unix::io::AsRawFd;

use oicb_protocol::connection::Connection;
use oicb_protocol::error::Fatal;
use oicb_protocol::state::SessionState;

use crate::cli::{self, Config};
use crate::event_loop::EventLoop;
use crate::signals::Flags;
use crate::terminal::{RawMode, set_nonblocking};

/// Runs the client to completion, returning the process exit code: 0 clean
/// shutdown, 1 usage/local error, 2 network/protocol error.
pub fn run() -> i32 {
    let config = cli::parse_args();
    init_tracing(config.debug_level);

    match run_connected(&config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("oicb: {e}");
            e.exit_code()
        }
    }
}

fn run_connected(config: &Config) -> Result<i32, Fatal> {
    let stream = crate::dial::dial(&config.host, config.port).map_err(Fatal::Io)?;
    let connection = Connection::new(stream);

    let stdin_fd = std::io::stdin().as_raw_fd();
    let stdout_fd = std::io::stdout().as_raw_fd();
    set_nonblocking(stdin_fd).map_err(Fatal::Io)?;
    set_nonblocking(stdout_fd).map_err(Fatal::Io)?;
    let _raw_mode = RawMode::enable(stdin_fd).map_err(Fatal::Io)?;

    let flags = Flags::install().map_err(Fatal::Io)?;

    let session = SessionState::new(config.nick.clone(), config.host.clone(), config.room.clone());
    let server_label = format!("{}:{}", config.host, config.port);

    let mut event_loop = EventLoop::new(
        connection,
        session,
        config.net_timeout_secs,
        config.history_enabled,
        server_label,
        flags,
        stdin_fd,
        stdout_fd,
    )
    .map_err(Fatal::Io)?;

    event_loop.run()
}

fn init_tracing(debug_level: u8) {
    let default_level = match debug_level {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
