// src/exec/capture.rs

//! Child-process output readers.
//!
//! Every spawned child gets one reader task per pipe. A reader forwards each
//! line to the [`BuildOutput`] sinks, appends it to the capture buffer, and
//! raises the "wrote to this stream" flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::output::{BuildOutput, CapturedOutput, Stream};

/// Set once a child has written at least one line to a stream.
#[derive(Debug, Default)]
pub struct OutputFlags {
    stdout: AtomicBool,
    stderr: AtomicBool,
}

impl OutputFlags {
    pub fn mark(&self, stream: Stream) {
        match stream {
            Stream::Stdout => self.stdout.store(true, Ordering::SeqCst),
            Stream::Stderr => self.stderr.store(true, Ordering::SeqCst),
        }
    }

    pub fn has_stdout(&self) -> bool {
        self.stdout.load(Ordering::SeqCst)
    }

    pub fn has_stderr(&self) -> bool {
        self.stderr.load(Ordering::SeqCst)
    }
}

/// Where a reader sends its lines.
#[derive(Debug, Clone)]
pub struct LineTarget {
    pub label: String,
    pub output: BuildOutput,
    pub captured: CapturedOutput,
    pub flags: Arc<OutputFlags>,
}

/// Spawn a task that drains `reader` line by line until EOF.
pub fn spawn_line_reader<R>(reader: R, stream: Stream, target: LineTarget) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    trace!(process = %target.label, ?stream, "{}", line);
                    target.flags.mark(stream);
                    target.captured.push(stream, &line);
                    target.output.write(stream, &line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(process = %target.label, ?stream, error = %e, "output reader failed");
                    break;
                }
            }
        }
        debug!(process = %target.label, ?stream, "output reader ended");
    })
}

/// Wait for readers to drain, giving up after `timeout`.
///
/// A grandchild that inherited the pipes can keep them open past the exit of
/// the process we spawned; such readers are left running.
pub async fn join_readers(readers: Vec<JoinHandle<()>>, timeout: Duration) {
    for reader in readers {
        if tokio::time::timeout(timeout, reader).await.is_err() {
            debug!(?timeout, "output reader still open after process exit");
        }
    }
}
