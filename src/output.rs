// src/output.rs

//! Line sinks for build and application output.
//!
//! Build steps, the forked build tool and the supervised application all
//! report text line by line through a [`BuildOutput`]. The host decides
//! where lines go: the console, the tracing log, or a capture buffer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

/// Which stream a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// A pair of line sinks (stdout-like and stderr-like).
#[derive(Clone)]
pub struct BuildOutput {
    stdout: LineSink,
    stderr: LineSink,
}

impl fmt::Debug for BuildOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildOutput").finish_non_exhaustive()
    }
}

impl BuildOutput {
    pub fn new<O, E>(stdout: O, stderr: E) -> Self
    where
        O: Fn(&str) + Send + Sync + 'static,
        E: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            stdout: Arc::new(stdout),
            stderr: Arc::new(stderr),
        }
    }

    /// Print to the process' own stdout/stderr.
    pub fn console() -> Self {
        Self::new(|line| println!("{line}"), |line| eprintln!("{line}"))
    }

    /// Route lines into the tracing log.
    pub fn logging() -> Self {
        Self::new(
            |line| info!(target: "devloop::output", "{}", line),
            |line| warn!(target: "devloop::output", "{}", line),
        )
    }

    pub fn discard() -> Self {
        Self::new(|_| {}, |_| {})
    }

    /// Sinks that record every line, plus the handle to read them back.
    pub fn capture() -> (Self, CapturedOutput) {
        let captured = CapturedOutput::default();
        let out = captured.clone();
        let err = captured.clone();
        let output = Self::new(
            move |line| out.push(Stream::Stdout, line),
            move |line| err.push(Stream::Stderr, line),
        );
        (output, captured)
    }

    /// Send every line to both `self` and `other`.
    pub fn tee(&self, other: &BuildOutput) -> Self {
        let (a_out, b_out) = (Arc::clone(&self.stdout), Arc::clone(&other.stdout));
        let (a_err, b_err) = (Arc::clone(&self.stderr), Arc::clone(&other.stderr));
        Self::new(
            move |line| {
                a_out(line);
                b_out(line);
            },
            move |line| {
                a_err(line);
                b_err(line);
            },
        )
    }

    pub fn out(&self, line: &str) {
        (self.stdout)(line)
    }

    pub fn err(&self, line: &str) {
        (self.stderr)(line)
    }

    pub fn write(&self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => self.out(line),
            Stream::Stderr => self.err(line),
        }
    }
}

/// Append-only, lock-guarded line buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    lines: Arc<Mutex<Vec<(Stream, String)>>>,
}

impl CapturedOutput {
    pub fn push(&self, stream: Stream, line: &str) {
        self.guard().push((stream, line.to_string()));
    }

    /// Every captured line in arrival order.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.guard().clone()
    }

    pub fn stdout_lines(&self) -> Vec<String> {
        self.lines_of(Stream::Stdout)
    }

    pub fn stderr_lines(&self) -> Vec<String> {
        self.lines_of(Stream::Stderr)
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// True if any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.guard().iter().any(|(_, l)| l.contains(needle))
    }

    /// Number of captured lines containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.guard().iter().filter(|(_, l)| l.contains(needle)).count()
    }

    fn lines_of(&self, stream: Stream) -> Vec<String> {
        self.guard()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, l)| l.clone())
            .collect()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(Stream, String)>> {
        // Readers only append; a poisoned lock still holds valid lines.
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_separates_streams_and_tee_duplicates() {
        let (first, a) = BuildOutput::capture();
        let (second, b) = BuildOutput::capture();
        let both = first.tee(&second);

        both.out("Compiling 1 source file");
        both.err("A.java:1: error: boom");

        assert_eq!(a.stdout_lines(), vec!["Compiling 1 source file"]);
        assert_eq!(a.stderr_lines(), vec!["A.java:1: error: boom"]);
        assert_eq!(b.len(), 2);
        assert!(b.contains("boom"));
        assert_eq!(b.count_containing("Compiling"), 1);
    }
}
