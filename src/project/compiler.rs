// src/project/compiler.rs

//! Java compiler collaborator.
//!
//! The build steps only talk to a [`JavaCompiler`]. Production code uses
//! [`JavacCompiler`], which runs `javac` as a subprocess; tests plug in a
//! compiler that writes class files without a JDK.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::errors::Result;

/// Everything a compiler invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    pub sources: Vec<PathBuf>,
    pub classpath: Vec<PathBuf>,
    pub flags: Vec<String>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
    Note,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        };
        f.write_str(s)
    }
}

/// One compiler message, optionally tied to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source: Option<PathBuf>,
    pub line: Option<u32>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            source: None,
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.line) {
            (Some(src), Some(line)) => {
                write!(f, "{}:{}: {}: {}", src.display(), line, self.kind, self.message)
            }
            (Some(src), None) => write!(f, "{}: {}: {}", src.display(), self.kind, self.message),
            _ => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            diagnostics: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
            .count()
    }
}

/// Trait abstracting how Java sources are compiled.
pub trait JavaCompiler: Send + Sync {
    /// Compile `request.sources` into `request.output_dir`.
    ///
    /// A compile that ran but rejected the sources is `Ok` with
    /// `success == false`; `Err` is reserved for failing to run at all.
    fn compile(
        &self,
        request: CompileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompileOutcome>> + Send + '_>>;
}

/// Runs `javac` as a child process.
#[derive(Debug, Clone)]
pub struct JavacCompiler {
    program: String,
}

impl JavacCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for JavacCompiler {
    fn default() -> Self {
        Self::new("javac")
    }
}

impl JavaCompiler for JavacCompiler {
    fn compile(
        &self,
        request: CompileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompileOutcome>> + Send + '_>> {
        Box::pin(async move {
            let mut cmd = Command::new(&self.program);
            cmd.arg("-d").arg(&request.output_dir);
            if !request.classpath.is_empty() {
                let cp: OsString = std::env::join_paths(&request.classpath)
                    .context("joining classpath entries")?;
                cmd.arg("-classpath").arg(cp);
            }
            cmd.args(&request.flags)
                .args(&request.sources)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            debug!(
                program = %self.program,
                sources = request.sources.len(),
                "running java compiler"
            );

            let output = cmd
                .output()
                .await
                .with_context(|| format!("running {}", self.program))?;

            let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stdout));
            let mut diagnostics = parse_diagnostics(&text);

            let success = output.status.success();
            if !success && !diagnostics.iter().any(|d| d.kind == DiagnosticKind::Error) {
                let code = output.status.code().unwrap_or(-1);
                diagnostics.push(Diagnostic::error(format!(
                    "{} exited with status {}: {}",
                    self.program,
                    code,
                    text.trim()
                )));
            }

            Ok(CompileOutcome {
                success,
                diagnostics,
            })
        })
    }
}

static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<file>.+?\.java):(?P<line>\d+): (?P<kind>error|warning|note|Note|Warning): (?P<msg>.*)$")
        .expect("diagnostic regex is valid")
});

/// Parse `javac` output into diagnostics.
///
/// Only `path:line: kind: message` lines start a diagnostic; the source
/// excerpt and caret lines javac prints underneath are dropped.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    output
        .lines()
        .filter_map(|line| {
            let caps = DIAGNOSTIC_LINE.captures(line.trim_end())?;
            let kind = match caps["kind"].to_lowercase().as_str() {
                "error" => DiagnosticKind::Error,
                "warning" => DiagnosticKind::Warning,
                _ => DiagnosticKind::Note,
            };
            Some(Diagnostic {
                kind,
                source: Some(PathBuf::from(&caps["file"])),
                line: caps["line"].parse().ok(),
                message: caps["msg"].to_string(),
            })
        })
        .collect()
}
