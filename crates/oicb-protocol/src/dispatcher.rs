//! Component E: Command-Result Dispatcher.
//!
//! A server response of type `i` carries a sub-type string: fields
//! `sub-type \x01 body`. This module renders the sub-types that produce
//! visible output and silently acknowledges the ones that don't.

use chrono::{Local, TimeZone};

use crate::constants::FIELD_SEP;
use crate::error::Fatal;
use crate::formatter::visible_encode;

/// What the event loop should do after handling one `i` message, beyond
/// whatever bytes it already enqueued to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEffect {
    None,
    /// `ec` (end-of-command): return to the `Chat` phase.
    EndOfCommand,
}

fn split_fields(payload: &[u8]) -> Vec<&[u8]> {
    payload.split(|&b| b == FIELD_SEP).collect()
}

/// Handle one `i`-type message. `last_cmd_has_nl` is the shared flag set by
/// `co` and consulted by `ec`; this is sound only because the connection
/// state machine guarantees at most one outstanding command at a time.
pub fn dispatch(payload: &[u8], current_room: &str, last_cmd_has_nl: &mut bool) -> Result<(Vec<u8>, DispatchEffect), Fatal> {
    let mut parts = payload.splitn(2, |&b| b == FIELD_SEP);
    let sub_type = parts.next().unwrap_or(&[]);
    let body = parts.next().unwrap_or(&[]);

    match sub_type {
        b"co" => {
            *last_cmd_has_nl = body.ends_with(b"\n");
            let mut out = visible_encode(body);
            if !out.ends_with(b"\n") {
                out.push(b'\n');
            }
            Ok((out, DispatchEffect::None))
        }
        b"ec" => {
            let out = if *last_cmd_has_nl { Vec::new() } else { vec![b'\n'] };
            Ok((out, DispatchEffect::EndOfCommand))
        }
        b"wl" => Ok((render_wl(body)?, DispatchEffect::None)),
        b"wg" => Ok((render_wg(body, current_room), DispatchEffect::None)),
        b"wh" | b"gh" | b"ch" | b"c" => Ok((Vec::new(), DispatchEffect::None)),
        other => Err(Fatal::UnsupportedOutputType(String::from_utf8_lossy(other).into_owned())),
    }
}

/// `wl` — a user-list row: moderator-flag, nick, idle-seconds,
/// reserved-zero, signon-epoch, ident, source-address. Missing trailing
/// fields are tolerated.
fn render_wl(body: &[u8]) -> Result<Vec<u8>, Fatal> {
    let fields = split_fields(body);
    let field = |i: usize| fields.get(i).copied().unwrap_or(&[]);

    let moderator = field(0) == b"1" || field(0) == b"*";
    let nick = field(1);
    let idle = String::from_utf8_lossy(field(2));
    let signon = String::from_utf8_lossy(field(4));
    let ident = field(5);
    let source = field(6);

    let mut out = Vec::new();
    out.push(if moderator { b'*' } else { b' ' });
    out.push(b' ');
    out.extend_from_slice(&visible_encode(nick));
    out.push(b' ');
    out.extend_from_slice(idle.as_bytes());
    out.extend_from_slice(b"s ");
    out.extend_from_slice(signon_ctime(&signon).as_bytes());
    out.push(b' ');
    out.extend_from_slice(&visible_encode(ident));
    out.push(b' ');
    out.extend_from_slice(&visible_encode(source));
    out.push(b'\n');
    Ok(out)
}

fn signon_ctime(epoch: &str) -> String {
    epoch
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map_or_else(|| "?".to_string(), |dt| dt.format("%a %b %e %H:%M:%S %Y").to_string())
}

/// `wg` — a group-list row: name, topic, optional msg-id. The marker is
/// `*` when `name` equals the current room.
fn render_wg(body: &[u8], current_room: &str) -> Vec<u8> {
    let fields = split_fields(body);
    let name = fields.first().copied().unwrap_or(&[]);
    let topic = fields.get(1).copied().unwrap_or(&[]);

    let is_current = name == current_room.as_bytes();
    let mut out = Vec::new();
    out.push(if is_current { b'*' } else { b' ' });
    out.push(b' ');
    let visible_name = visible_encode(name);
    out.extend_from_slice(&visible_name);
    let pad = 30usize.saturating_sub(visible_name.len());
    out.extend(std::iter::repeat_n(b' ', pad));
    out.extend_from_slice(&visible_encode(topic));
    out.push(b'\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co_tracks_trailing_newline_and_ec_respects_it() {
        let mut has_nl = false;
        let payload = [b"co\x01line one\n".as_slice()].concat();
        let (line, effect) = dispatch(&payload, "lounge", &mut has_nl).unwrap();
        assert_eq!(line, b"line one\n".to_vec());
        assert_eq!(effect, DispatchEffect::None);
        assert!(has_nl);

        let (ec_out, effect) = dispatch(b"ec\x01", "lounge", &mut has_nl).unwrap();
        assert!(ec_out.is_empty());
        assert_eq!(effect, DispatchEffect::EndOfCommand);
    }

    #[test]
    fn ec_emits_newline_when_last_co_lacked_one() {
        let mut has_nl = false;
        let (line, _) = dispatch(b"co\x01no newline here", "lounge", &mut has_nl).unwrap();
        assert_eq!(line, b"no newline here\n".to_vec());
        assert!(!has_nl);

        let (ec_out, _) = dispatch(b"ec\x01", "lounge", &mut has_nl).unwrap();
        assert_eq!(ec_out, b"\n".to_vec());
    }

    #[test]
    fn wl_row_renders_moderator_marker_and_idle_suffix() {
        let body = b"1\x01alice\x0142\x010\x01915148548\x01ident\x01host.example.org";
        let line = render_wl(body).unwrap();
        let text = String::from_utf8(line).unwrap();
        assert!(text.starts_with("* "));
        assert!(text.contains("alice"));
        assert!(text.contains("42s"));
        assert!(text.contains("ident"));
        assert!(text.contains("host.example.org"));
    }

    #[test]
    fn wl_row_tolerates_missing_trailing_fields() {
        let body = b"0\x01bob\x015";
        let line = render_wl(body).unwrap();
        assert!(String::from_utf8(line).unwrap().starts_with("  "));
    }

    #[test]
    fn wg_marks_current_room_and_pads_name() {
        let body = b"lounge\x01general chat";
        let line = render_wg(body, "lounge");
        let text = String::from_utf8(line).unwrap();
        assert!(text.starts_with("* lounge"));
        assert!(text.contains("general chat"));

        let other = render_wg(body, "elsewhere");
        assert!(other.starts_with(b"  lounge"));
    }

    #[test]
    fn silently_recognized_subtypes_produce_no_output() {
        let mut has_nl = false;
        for sub in ["wh", "gh", "ch", "c"] {
            let payload = format!("{sub}\x01whatever");
            let (out, effect) = dispatch(payload.as_bytes(), "lounge", &mut has_nl).unwrap();
            assert!(out.is_empty());
            assert_eq!(effect, DispatchEffect::None);
        }
    }

    #[test]
    fn unrecognized_subtype_is_fatal() {
        let mut has_nl = false;
        assert!(matches!(dispatch(b"zz\x01x", "lounge", &mut has_nl), Err(Fatal::UnsupportedOutputType(_))));
    }
}
