//! Raw-mode terminal glue: puts stdin into non-canonical, no-echo,
//! no-signal-generating mode (so Ctrl-C/Ctrl-T reach
//! [`oicb_protocol::line_editor`] as plain bytes instead of the kernel
//! raising `SIGINT`), and makes stdin/stdout non-blocking for the event
//! loop. Restored on drop so a crash or clean exit always leaves the
//! user's shell in a sane state.

use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;

/// Sets `fd` non-blocking via `fcntl`. Used for stdin, stdout, and every
/// history file (the latter via `O_NONBLOCK` at `open` time instead; see
/// `oicb_protocol::history`).
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fd is a valid, open file descriptor for the duration of this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Restores the terminal's original `termios` settings on drop.
pub struct RawMode {
    fd: RawFd,
    original: libc::termios,
}

impl RawMode {
    /// Puts `fd` (stdin) into cbreak mode: `ICANON`/`ECHO`/`ISIG` off, reads
    /// return immediately with whatever is available (`VMIN = 0, VTIME =
    /// 0`) since the event loop drives all reads through `poll` anyway.
    /// Leaves output processing (`OPOST`) untouched so `\n` still becomes
    /// `\r\n` for lines the formatter writes.
    pub fn enable(fd: RawFd) -> io::Result<Self> {
        // SAFETY: termios is a plain-old-data struct; zeroed is a valid
        // (if meaningless) initial value overwritten by tcgetattr below.
        let mut original: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: fd is a valid terminal fd, original is writable for the call's duration.
        if unsafe { libc::tcgetattr(fd, &mut original) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut raw = original;
        raw.c_lflag &= !(libc::ICANON | libc::ECHO | libc::ISIG);
        raw.c_cc[libc::VMIN] = 0;
        raw.c_cc[libc::VTIME] = 0;
        // SAFETY: fd is the same valid terminal fd, raw is a fully-initialized termios.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, original })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        // SAFETY: fd was valid at construction; tcsetattr failing here
        // (e.g. fd already closed) has nothing useful to do about it.
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
        }
    }
}

/// A raw stdin fd, read directly via `libc::read` rather than
/// `std::io::Stdin` (which takes an internal lock incompatible with
/// registering the same fd with `mio`).
pub struct RawStdin(pub RawFd);

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for buf.len() bytes for the duration of the call.
        let n = unsafe { libc::read(self.0, buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(err);
            }
            return Err(err);
        }
        Ok(n as usize)
    }
}

/// A raw stdout fd, written directly via `libc::write` for the same reason
/// [`RawStdin`] bypasses `std::io::Stdout`.
pub struct RawStdout(pub RawFd);

impl Write for RawStdout {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: buf is valid for buf.len() bytes for the duration of the call.
        let n = unsafe { libc::write(self.0, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
