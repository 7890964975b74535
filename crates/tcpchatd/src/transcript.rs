//! Operator-facing transcript of the relay.
//!
//! The transcript is the only thing the daemon writes to stdout:
//!
//! ```text
//! 10.0.0.5:40122 connected
//! 10.0.0.5:40122 >> hello
//! 10.0.0.5:40122 disconnected
//! ```
//!
//! It is owned by the registry actor, so the lines come out in the same
//! order the actor admitted, relayed and removed clients. Diagnostics go
//! through `tracing` to stderr instead.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tcpchat_core::{ClientInfo, Line};
use tracing::warn;

/// Line-oriented writer for connect, relay and disconnect notices.
pub struct Transcript {
    sink: Box<dyn Write + Send>,
}

impl Transcript {
    /// Creates a transcript writing to `sink`.
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Box::new(sink),
        }
    }

    /// Creates a transcript writing to the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Creates a transcript that discards everything.
    pub fn sink() -> Self {
        Self::new(io::sink())
    }

    pub fn connected(&mut self, client: &ClientInfo) {
        self.emit(format_args!("{} connected\n", client.peer));
    }

    pub fn disconnected(&mut self, client: &ClientInfo) {
        self.emit(format_args!("{} disconnected\n", client.peer));
    }

    /// Echoes a message received from `client`; `line` carries its own terminator.
    pub fn relayed(&mut self, client: &ClientInfo, line: &Line) {
        self.emit(format_args!("{} >> {}", client.peer, line));
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        let result = self
            .sink
            .write_fmt(args)
            .and_then(|()| self.sink.flush());

        // A closed stdout must not take the relay down with it.
        if let Err(e) = result {
            warn!(error = %e, "Failed to write transcript");
        }
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript").finish_non_exhaustive()
    }
}

/// In-memory transcript sink that can be read back.
///
/// Clones share the same buffer, so one clone can be handed to the
/// registry while another is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct TranscriptBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far.
    pub fn contents(&self) -> String {
        let bytes = match self.bytes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Returns the transcript split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for TranscriptBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.bytes.lock() {
            Ok(mut guard) => guard.extend_from_slice(buf),
            Err(poisoned) => poisoned.into_inner().extend_from_slice(buf),
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
