//! Operator console input.
//!
//! The console is read on its own task and forwarded line by line over a
//! channel, so the event loop only ever waits on `recv`, which is
//! cancel-safe.
//!
//! The task never holds more than `LINE_LIMIT` bytes of one line. A line
//! that runs past the limit is reported as `Oversized` and the rest of it,
//! up to the next newline, is read and thrown away.

use std::io;
use std::mem;

use tcpchat_core::MAX_MESSAGE_LEN;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lines buffered between the console task and the event loop.
pub const CONSOLE_BUFFER: usize = 16;

/// Most bytes of one console line held at a time, terminator included.
pub const LINE_LIMIT: usize = MAX_MESSAGE_LEN + 1;

/// One event from the operator console.
#[derive(Debug)]
pub enum ConsoleInput {
    /// Raw line, including its terminator if one was read.
    Line(Vec<u8>),

    /// A line longer than `LINE_LIMIT` was discarded.
    Oversized,

    /// The console was closed.
    Eof,

    /// Reading the console failed.
    Failed(io::Error),
}

/// Spawns a task that reads `reader` line by line until EOF, an error, or
/// `cancel` fires.
///
/// The receiver yields `Eof` or `Failed` at most once, as the last item.
/// `Oversized` is sent once per discarded line, when the limit is hit.
pub fn spawn_console<R>(reader: R, cancel: CancellationToken) -> mpsc::Receiver<ConsoleInput>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(CONSOLE_BUFFER);

    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(LINE_LIMIT);
        let mut discarding = false;

        loop {
            let room = LINE_LIMIT.saturating_sub(buf.len()) as u64;
            let mut bounded = (&mut reader).take(room);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = bounded.read_until(b'\n', &mut buf) => result,
            };

            let read = match result {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let _ = tx.send(ConsoleInput::Failed(e)).await;
                    break;
                }
            };
            let terminated = buf.last() == Some(&b'\n');

            if discarding {
                if read == 0 {
                    let _ = tx.send(ConsoleInput::Eof).await;
                    break;
                }
                buf.clear();
                discarding = !terminated;
                continue;
            }

            let input = if read == 0 && buf.is_empty() {
                ConsoleInput::Eof
            } else if terminated || buf.len() < LINE_LIMIT {
                // A short unterminated read means EOF; the tail is still a line.
                ConsoleInput::Line(mem::take(&mut buf))
            } else {
                buf.clear();
                discarding = true;
                ConsoleInput::Oversized
            };

            let last = matches!(input, ConsoleInput::Eof);
            if tx.send(input).await.is_err() || last {
                break;
            }
        }

        debug!("Console reader stopped");
    });

    rx
}
