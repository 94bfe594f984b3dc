use thiserror::Error;

/// Fatal, connection-ending conditions. Every variant here ends the process
/// with exit code 2 (protocol/network errors); usage errors (exit code 1)
/// are reported separately by `oicb::cli` before a connection is ever
/// attempted.
#[derive(Error, Debug)]
pub enum Fatal {
    #[error("message types messed up")]
    MismatchedFragmentTypes,

    #[error("inbound message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },

    #[error("unsupported protocol version {0:?}")]
    UnsupportedProtocolVersion(String),

    #[error("missing required field in {context}")]
    MissingField { context: &'static str },

    #[error("unsupported output type {0:?}")]
    UnsupportedOutputType(String),

    #[error("unexpected message of type '{kind}' in phase {phase}")]
    UnexpectedMessage { kind: char, phase: &'static str },

    #[error("{label} readiness error")]
    ReadinessError { label: &'static str },

    #[error("write failure on {label}: {source}")]
    WriteFailed { label: &'static str, #[source] source: std::io::Error },

    #[error("Server timed out, exiting")]
    ServerTimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Fatal {
    /// Usage/local errors are 1 (handled at the CLI layer, never reach this
    /// type); network/protocol errors are 2.
    pub const fn exit_code(&self) -> i32 {
        2
    }
}
