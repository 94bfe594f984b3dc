//! The two signal-driven flags: `want_exit` (SIGINT/SIGTERM) and `want_info`
//! (`SIGINFO` where the platform defines it; BSD/macOS only). Handlers only
//! ever touch `AtomicBool`s via `Arc`, never allocate or take locks —
//! signal handlers may only set volatile flags, never call `process::exit`
//! directly, since pending history-file writes and the raw-mode terminal
//! restore need to happen on the normal loop shutdown path, not mid-handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

#[derive(Clone)]
pub struct Flags {
    pub want_exit: Arc<AtomicBool>,
    pub want_info: Arc<AtomicBool>,
}

impl Flags {
    /// Installs handlers for `SIGINT`/`SIGTERM` (set `want_exit`) and, where
    /// the platform defines `SIGINFO`, for `SIGINFO` (set `want_info`). On
    /// Linux, `want_info` is reachable only via Ctrl-T in the editor, since
    /// `SIGINFO` doesn't exist there.
    pub fn install() -> io::Result<Self> {
        let want_exit = Arc::new(AtomicBool::new(false));
        let want_info = Arc::new(AtomicBool::new(false));

        for sig in [SIGINT, SIGTERM] {
            let flag = Arc::clone(&want_exit);
            // SAFETY: the closure only performs an atomic store, satisfying
            // signal-hook's async-signal-safety requirement.
            unsafe {
                signal_hook::low_level::register(sig, move || {
                    flag.store(true, Ordering::SeqCst);
                })?;
            }
        }

        install_siginfo(&want_info)?;

        Ok(Self { want_exit, want_info })
    }

    pub fn take_exit(&self) -> bool {
        self.want_exit.swap(false, Ordering::SeqCst)
    }

    pub fn take_info(&self) -> bool {
        self.want_info.swap(false, Ordering::SeqCst)
    }
}

use std::io;

#[cfg(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly"))]
fn install_siginfo(want_info: &Arc<AtomicBool>) -> io::Result<()> {
    let flag = Arc::clone(want_info);
    // SAFETY: see the loop above; same single-atomic-store handler.
    unsafe {
        signal_hook::low_level::register(signal_hook::consts::SIGINFO, move || {
            flag.store(true, Ordering::SeqCst);
        })?;
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd", target_os = "netbsd", target_os = "openbsd", target_os = "dragonfly")))]
fn install_siginfo(_want_info: &Arc<AtomicBool>) -> io::Result<()> {
    Ok(())
}
