//! Component A: Task Queue & Writer.
//!
//! A `VecDeque` holding only-the-front-partially-written byte buffers,
//! generalized with an optional completion callback since history files and
//! stdout need one-shot hooks a single always-live socket backlog never did.

use std::collections::VecDeque;
use std::io::{self, Write};

use tracing::debug;

/// A pending write plus what's already gone out.
pub struct OutputTask {
    bytes: Vec<u8>,
    written: usize,
    on_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl OutputTask {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, written: 0, on_complete: None }
    }

    pub fn with_callback(bytes: Vec<u8>, on_complete: Box<dyn FnOnce() + Send>) -> Self {
        Self { bytes, written: 0, on_complete: Some(on_complete) }
    }

    fn remaining(&self) -> &[u8] {
        &self.bytes[self.written..]
    }

    fn is_done(&self) -> bool {
        self.written == self.bytes.len()
    }
}

/// Outcome of one `drain` call.
#[derive(Debug)]
pub enum DrainOutcome {
    /// Wrote everything currently queued.
    Drained,
    /// The underlying fd would block; resume next readiness tick.
    WouldBlock,
    /// Hard I/O failure; caller decides whether that's fatal (stdout/socket)
    /// or just latches a permanent error (history files).
    Failed(io::Error),
}

/// FIFO of pending writes for a single stream (stdout, socket, one history
/// file). Invariant: only `tasks[0]` may be partially written.
#[derive(Default)]
pub struct TaskQueue {
    tasks: VecDeque<OutputTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self { tasks: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn enqueue(&mut self, task: OutputTask) {
        self.tasks.push_back(task);
    }

    /// Write from the head task's unwritten suffix until the queue drains,
    /// a write would block, or a hard failure occurs. Stops without error on
    /// short writes so the caller's poll loop can resume on the next
    /// writable event.
    pub fn drain<W: Write>(&mut self, w: &mut W) -> DrainOutcome {
        while let Some(task) = self.tasks.front_mut() {
            match w.write(task.remaining()) {
                Ok(0) => {
                    return DrainOutcome::Failed(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned 0",
                    ));
                }
                Ok(n) => {
                    task.written += n;
                    if task.is_done() {
                        let done = self.tasks.pop_front().expect("front just matched");
                        if let Some(cb) = done.on_complete {
                            cb();
                        }
                    } else {
                        return DrainOutcome::WouldBlock;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return DrainOutcome::WouldBlock;
                }
                Err(e) => {
                    debug!(?e, "task queue: write failed");
                    return DrainOutcome::Failed(e);
                }
            }
        }
        DrainOutcome::Drained
    }
}
