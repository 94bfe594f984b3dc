//! Component I: Line-Editor Bridge, plus the minimal editing engine behind
//! it.
//!
//! The terminal line-editing library is treated as an external collaborator
//! with a narrow contract: it accepts one character at a time, supplies a
//! completed input line, and can redraw its own prompt. No published crate
//! actually matches that one-byte-at-a-time, externally-driven-poll-loop
//! shape (readline-family crates own the whole blocking read loop; see
//! DESIGN.md), so the engine is implemented here narrowly, not as a
//! general-purpose editing library.

/// Bytes written to draw the prompt before any input.
const PROMPT: &[u8] = b"> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EscapeState {
    #[default]
    None,
    SawEsc,
    SawBracket,
}

/// One line's worth of editable text: an insertion point and a mark
/// (Ctrl-U/Ctrl-K use a fixed mark of 0/end rather than a movable one, but
/// the field exists so a snapshot captures everything the bridge needs to
/// restore).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub buffer: Vec<u8>,
    pub point: usize,
    pub mark: usize,
}

/// Result of feeding one byte to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Nothing externally visible happened (e.g. a bare ESC waiting for the
    /// rest of an arrow sequence).
    Nothing,
    /// The visible line changed; the caller should redraw.
    Redraw,
    /// Enter: a completed line, buffer cleared.
    Line(Vec<u8>),
    /// Ctrl-T: status summary requested.
    WantInfo,
    /// Ctrl-C: exit requested.
    WantExit,
}

/// The editing engine: printable insert at point, Backspace, Ctrl-U (kill
/// to start), Ctrl-K (kill to end), Left/Right arrow, Home/End (Ctrl-A/
/// Ctrl-E), Enter.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
    point: usize,
    escape: EscapeState,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot { buffer: self.buffer.clone(), point: self.point, mark: self.buffer.len() }
    }

    pub fn restore(&mut self, snap: Snapshot) {
        self.buffer = snap.buffer;
        self.point = snap.point.min(self.buffer.len());
    }

    /// Bytes that redraw the prompt and current buffer with the cursor
    /// positioned at `point`: clear the line, write prompt + buffer, then
    /// move the cursor left to `point`.
    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PROMPT.len() + self.buffer.len() + 16);
        out.extend_from_slice(b"\r\x1b[K");
        out.extend_from_slice(PROMPT);
        out.extend_from_slice(&self.buffer);
        let back = self.buffer.len() - self.point;
        if back > 0 {
            out.extend_from_slice(format!("\x1b[{back}D").as_bytes());
        }
        out
    }

    /// Bytes that blank the visible line entirely (used by the bridge
    /// before an async stdout write).
    pub fn blank(&self) -> Vec<u8> {
        b"\r\x1b[K".to_vec()
    }

    /// Feed one byte from stdin.
    pub fn feed_byte(&mut self, b: u8) -> Feed {
        match self.escape {
            EscapeState::None => self.feed_normal(b),
            EscapeState::SawEsc => {
                if b == b'[' {
                    self.escape = EscapeState::SawBracket;
                    Feed::Nothing
                } else {
                    self.escape = EscapeState::None;
                    Feed::Nothing
                }
            }
            EscapeState::SawBracket => {
                self.escape = EscapeState::None;
                match b {
                    b'C' => self.move_right(),
                    b'D' => self.move_left(),
                    _ => Feed::Nothing,
                }
            }
        }
    }

    fn feed_normal(&mut self, b: u8) -> Feed {
        match b {
            0x1b => {
                self.escape = EscapeState::SawEsc;
                Feed::Nothing
            }
            b'\r' | b'\n' => {
                let line = std::mem::take(&mut self.buffer);
                self.point = 0;
                Feed::Line(line)
            }
            0x7f | 0x08 => self.backspace(),
            0x15 => self.kill_to_start(),
            0x0b => self.kill_to_end(),
            0x01 => self.move_home(),
            0x05 => self.move_end(),
            0x14 => Feed::WantInfo,
            0x03 => Feed::WantExit,
            _ if b.is_ascii_graphic() || b == b' ' => {
                self.buffer.insert(self.point, b);
                self.point += 1;
                Feed::Redraw
            }
            _ => Feed::Nothing,
        }
    }

    fn backspace(&mut self) -> Feed {
        if self.point == 0 {
            return Feed::Nothing;
        }
        self.buffer.remove(self.point - 1);
        self.point -= 1;
        Feed::Redraw
    }

    fn kill_to_start(&mut self) -> Feed {
        if self.point == 0 {
            return Feed::Nothing;
        }
        self.buffer.drain(..self.point);
        self.point = 0;
        Feed::Redraw
    }

    fn kill_to_end(&mut self) -> Feed {
        if self.point == self.buffer.len() {
            return Feed::Nothing;
        }
        self.buffer.truncate(self.point);
        Feed::Redraw
    }

    fn move_left(&mut self) -> Feed {
        if self.point == 0 {
            return Feed::Nothing;
        }
        self.point -= 1;
        Feed::Redraw
    }

    fn move_right(&mut self) -> Feed {
        if self.point == self.buffer.len() {
            return Feed::Nothing;
        }
        self.point += 1;
        Feed::Redraw
    }

    fn move_home(&mut self) -> Feed {
        if self.point == 0 {
            return Feed::Nothing;
        }
        self.point = 0;
        Feed::Redraw
    }

    fn move_end(&mut self) -> Feed {
        if self.point == self.buffer.len() {
            return Feed::Nothing;
        }
        self.point = self.buffer.len();
        Feed::Redraw
    }
}

/// Around one asynchronous stdout write: snapshot, blank, (caller writes),
/// then restore and redraw. Invariant: at most one snapshot outstanding.
#[derive(Default)]
pub struct Bridge {
    outstanding: Option<Snapshot>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the editor and return the bytes that blank its visible
    /// line. Panics if a snapshot is already outstanding.
    pub fn save_and_blank(&mut self, editor: &LineEditor) -> Vec<u8> {
        oicb_utils::safe_assert!(self.outstanding.is_none(), "line-editor bridge snapshot already outstanding");
        self.outstanding = Some(editor.snapshot());
        editor.blank()
    }

    /// Restore the editor from the outstanding snapshot and return the
    /// bytes that redraw its prompt and buffer.
    pub fn restore_and_redraw(&mut self, editor: &mut LineEditor) -> Option<Vec<u8>> {
        let snap = self.outstanding.take()?;
        editor.restore(snap);
        Some(editor.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_str(editor: &mut LineEditor, s: &str) -> Vec<Feed> {
        s.bytes().map(|b| editor.feed_byte(b)).collect()
    }

    #[test]
    fn printable_bytes_insert_and_enter_completes_the_line() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "hi");
        assert_eq!(e.feed_byte(b'\r'), Feed::Line(b"hi".to_vec()));
        assert_eq!(e.snapshot().buffer, Vec::<u8>::new());
    }

    #[test]
    fn backspace_removes_before_point() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "hit");
        e.feed_byte(0x7f);
        assert_eq!(e.feed_byte(b'\n'), Feed::Line(b"hi".to_vec()));
    }

    #[test]
    fn left_arrow_then_insert_splices_mid_buffer() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "ac");
        // ESC [ D = left arrow
        e.feed_byte(0x1b);
        e.feed_byte(b'[');
        e.feed_byte(b'D');
        e.feed_byte(b'b');
        assert_eq!(e.feed_byte(b'\n'), Feed::Line(b"abc".to_vec()));
    }

    #[test]
    fn ctrl_u_kills_to_start_of_line() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "hello");
        e.feed_byte(0x15);
        assert_eq!(e.feed_byte(b'\n'), Feed::Line(Vec::new()));
    }

    #[test]
    fn ctrl_t_requests_info_without_touching_buffer() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "hi");
        assert_eq!(e.feed_byte(0x14), Feed::WantInfo);
        assert_eq!(e.feed_byte(b'\n'), Feed::Line(b"hi".to_vec()));
    }

    #[test]
    fn ctrl_c_requests_exit() {
        let mut e = LineEditor::new();
        assert_eq!(e.feed_byte(0x03), Feed::WantExit);
    }

    #[test]
    #[should_panic(expected = "snapshot already outstanding")]
    fn double_snapshot_panics() {
        let e = LineEditor::new();
        let mut bridge = Bridge::new();
        bridge.save_and_blank(&e);
        bridge.save_and_blank(&e);
    }

    #[test]
    fn save_then_restore_round_trips_buffer_and_point() {
        let mut e = LineEditor::new();
        feed_str(&mut e, "abc");
        let mut bridge = Bridge::new();
        let _ = bridge.save_and_blank(&e);
        let redraw = bridge.restore_and_redraw(&mut e).unwrap();
        assert!(redraw.windows(3).any(|w| w == b"abc"));
    }
}
