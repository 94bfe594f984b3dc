use std::path::PathBuf;

/// `$HOME`, or `None` if unset — callers decide whether that's fatal.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// `$HOME/.oicb`, the root of all on-disk client state.
pub fn state_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".oicb"))
}

/// `$HOME/.oicb/logs/<server>`, where per-room/per-peer transcripts live.
pub fn logs_dir(server: &str) -> Option<PathBuf> {
    state_dir().map(|d| d.join("logs").join(server))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_dir_nests_under_state_dir() {
        // SAFETY: single-threaded test, no other thread reads HOME concurrently.
        unsafe { std::env::set_var("HOME", "/tmp/oicb-test-home") };
        let dir = logs_dir("icb.example.org").unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/oicb-test-home/.oicb/logs/icb.example.org"));
    }
}
