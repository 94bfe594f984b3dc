//! CLI grammar and the [`Config`] it produces. Component J (Bootstrap)
//! owns everything here; nothing downstream of [`Config`] touches `clap` or
//! `std::env` directly — a plain owned config struct instead of a global
//! singleton.

use clap::Parser;
use oicb_protocol::constants::{DEFAULT_PORT, GROUPNAME_MAX, NICKNAME_MAX};

#[derive(Parser, Debug)]
#[command(name = "oicb", about = "Terminal client for the ICB chat protocol", version)]
struct Args {
    /// Increase debug verbosity (repeatable).
    #[arg(short = 'd', action = clap::ArgAction::Count)]
    debug: u8,

    /// Disable history logging.
    #[arg(short = 'H')]
    no_history: bool,

    /// Keep-alive timeout in seconds; 0 disables keep-alives.
    #[arg(short = 't', default_value_t = oicb_protocol::constants::DEFAULT_NET_TIMEOUT_SECS)]
    net_timeout: u64,

    /// `[nick@]host[:port]`.
    target: String,

    /// The room (group) to join.
    room: String,
}

/// Everything the rest of the client needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub nick: String,
    pub host: String,
    pub port: u16,
    pub room: String,
    pub net_timeout_secs: u64,
    pub history_enabled: bool,
    pub debug_level: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("nickname {0:?} is {1} bytes, longer than the server's {NICKNAME_MAX}-byte limit")]
    NickTooLong(String, usize),
    #[error("room name {0:?} is {1} bytes, longer than the server's {GROUPNAME_MAX}-byte limit")]
    RoomTooLong(String, usize),
    #[error("empty host in target {0:?}")]
    EmptyHost(String),
}

/// Parse argv, exiting the process on `--help`/`--version`/a usage error.
/// `--help`/`--version` exit 0 (clap's own behavior); any other parse
/// failure exits 1.
pub fn parse_args() -> Config {
    let args = match Args::try_parse() {
        Ok(a) => a,
        Err(e) => {
            let code = match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    match Config::from_args(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("oicb: {e}");
            std::process::exit(1);
        }
    }
}

impl Config {
    fn from_args(args: Args) -> Result<Self, UsageError> {
        let (nick, host, port) = parse_target(&args.target);
        let nick = nick.unwrap_or_else(default_login_name);

        if nick.len() >= NICKNAME_MAX {
            return Err(UsageError::NickTooLong(nick, nick.len()));
        }
        if args.room.len() >= GROUPNAME_MAX {
            return Err(UsageError::RoomTooLong(args.room.clone(), args.room.len()));
        }
        if host.is_empty() {
            return Err(UsageError::EmptyHost(args.target.clone()));
        }

        Ok(Config {
            nick,
            host,
            port,
            room: args.room,
            net_timeout_secs: args.net_timeout,
            history_enabled: !args.no_history,
            debug_level: args.debug,
        })
    }
}

/// `[nick@]host[:port]`. IPv6-literal `host:port` parsing is out of scope —
/// a bracketed `[::1]:7326` form is not recognized; `rsplit_once(':')` is
/// the deliberately narrower-than-general parse.
fn parse_target(target: &str) -> (Option<String>, String, u16) {
    let (nick, rest) = match target.split_once('@') {
        Some((n, r)) => (Some(n.to_string()), r),
        None => (None, target),
    };
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            port.parse().map_or_else(|_| (nick.clone(), rest.to_string(), DEFAULT_PORT), |p| (nick, host.to_string(), p))
        }
        _ => (nick, rest.to_string(), DEFAULT_PORT),
    }
}

fn default_login_name() -> String {
    std::env::var("USER").or_else(|_| std::env::var("LOGNAME")).unwrap_or_else(|_| "user".to_string())
}
