//! Component D: Chat Formatter.

use chrono::Local;

/// Delimiter pair bracketing the author name in a rendered chat line.
fn delimiters(kind: u8) -> Option<(&'static str, &'static str)> {
    match kind {
        b'b' => Some((" <", "> ")),
        b'c' => Some((" *", "* ")),
        b'd' => Some((" [=", "=] ")),
        b'e' | b'k' => Some((" !", "! ")),
        b'f' => Some((" {", "} ")),
        _ => None,
    }
}

/// Escape control and non-printable bytes so foreign strings can never
/// smuggle terminal escape sequences into the user's screen. The literal
/// backslash byte is preserved too, escaped to `\\`.
pub fn visible_encode(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    for &b in bytes {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x20..=0x7e => out.push(b),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\t' => out.extend_from_slice(b"\\t"),
            _ => out.extend_from_slice(format!("\\x{b:02x}").as_bytes()),
        }
    }
    out
}

/// Render one chat-like inbound message (`b`/`c`/`d`/`e`/`k`/`f`) as a
/// timestamped, escape-safe terminal line. Returns `None` for kinds this
/// formatter doesn't own (the dispatcher handles those).
pub fn render_chat_line(kind: u8, author: &[u8], text: &[u8]) -> Option<Vec<u8>> {
    let (pre, post) = delimiters(kind)?;
    let mut line = format!("[{}]", Local::now().format("%H:%M:%S")).into_bytes();
    line.extend_from_slice(pre.as_bytes());
    line.extend_from_slice(&visible_encode(author));
    line.extend_from_slice(post.as_bytes());
    line.extend_from_slice(&visible_encode(text));
    line.push(b'\n');
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_bytes_and_preserves_backslash() {
        let encoded = visible_encode(b"a\x01b\\c\x7f");
        assert_eq!(encoded, b"a\\x01b\\\\c\\x7f".to_vec());
    }

    #[test]
    fn printable_ascii_passes_through_unchanged() {
        assert_eq!(visible_encode(b"hello world!"), b"hello world!".to_vec());
    }

    #[test]
    fn open_message_uses_angle_bracket_delimiters() {
        let line = render_chat_line(b'b', b"alice", b"hi").unwrap();
        let line = String::from_utf8(line).unwrap();
        assert!(line.contains(" <alice> hi"));
        assert!(line.ends_with('\n'));
        assert!(line.starts_with('['));
    }

    #[test]
    fn private_message_uses_asterisk_delimiters() {
        let line = render_chat_line(b'c', b"bob", b"psst").unwrap();
        let line = String::from_utf8(line).unwrap();
        assert!(line.contains(" *bob* psst"));
    }

    #[test]
    fn error_and_beep_share_bang_delimiters() {
        let e = String::from_utf8(render_chat_line(b'e', b"server", b"oops").unwrap()).unwrap();
        let k = String::from_utf8(render_chat_line(b'k', b"server", b"bell").unwrap()).unwrap();
        assert!(e.contains(" !server! oops"));
        assert!(k.contains(" !server! bell"));
    }

    #[test]
    fn unknown_kind_is_not_a_chat_line() {
        assert!(render_chat_line(b'i', b"x", b"y").is_none());
    }

    #[test]
    fn non_printable_author_is_escaped_before_visible_bytes() {
        let line = render_chat_line(b'd', b"\x01sys", b"joined").unwrap();
        let line = String::from_utf8(line).unwrap();
        assert!(line.contains("[=\\x01sys=]"));
    }
}
