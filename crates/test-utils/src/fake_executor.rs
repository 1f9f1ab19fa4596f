use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use devloop::errors::{DevLoopError, Result};
use devloop::exec::BuildExecutor;
use devloop::fs::FileTimestampIndex;
use devloop::output::BuildOutput;
use devloop::project::compiler::{
    CompileOutcome, CompileRequest, Diagnostic, DiagnosticKind, JavaCompiler,
};
use devloop::types::BuildRootType;

/// A source containing this marker fails to compile.
pub const SYNTAX_ERROR: &str = "SYNTAX ERROR";

/// A compiler that needs no JDK:
/// - records the sources of every invocation
/// - writes `<package dirs>/<Stem>.class` for each source
/// - rejects the whole batch (writing nothing) if any source contains
///   [`SYNTAX_ERROR`].
#[derive(Debug, Clone, Default)]
pub struct FakeCompiler {
    calls: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl FakeCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sources passed to each invocation, oldest first.
    pub fn calls(&self) -> Vec<Vec<PathBuf>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<Vec<PathBuf>> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl JavaCompiler for FakeCompiler {
    fn compile(
        &self,
        request: CompileRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompileOutcome>> + Send + '_>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.sources.clone());
            compile_sources(&request.sources, &request.output_dir)
        })
    }
}

/// Pretend-compile `sources` into `output_dir`.
pub fn compile_sources(sources: &[PathBuf], output_dir: &Path) -> Result<CompileOutcome> {
    let mut diagnostics = Vec::new();
    let mut targets = Vec::new();

    for source in sources {
        let text = fs::read_to_string(source)?;
        if let Some(line) = text.lines().position(|l| l.contains(SYNTAX_ERROR)) {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::Error,
                source: Some(source.clone()),
                line: Some(line as u32 + 1),
                message: "';' expected".to_string(),
            });
            continue;
        }

        let package = text
            .lines()
            .find_map(|l| l.trim().strip_prefix("package "))
            .map(|p| p.trim_end_matches(';').trim().to_string());
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let mut dir = output_dir.to_path_buf();
        if let Some(package) = package {
            dir.extend(package.split('.'));
        }
        targets.push(dir.join(format!("{stem}.class")));
    }

    if !diagnostics.is_empty() {
        return Ok(CompileOutcome {
            success: false,
            diagnostics,
        });
    }

    for target in targets {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, [0xCA, 0xFE, 0xBA, 0xBE])?;
    }
    Ok(CompileOutcome::succeeded())
}

/// Stands in for an external build tool (`mvn compile` and friends).
///
/// Compiles every source under `source_dir` into `output_dir` (both relative
/// to the project dir) and prints Maven-like status lines.
#[derive(Debug, Clone)]
pub struct FakeBuildExecutor {
    source_dir: PathBuf,
    output_dir: PathBuf,
    runs: Arc<AtomicUsize>,
    cleans: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl FakeBuildExecutor {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            runs: Arc::new(AtomicUsize::new(0)),
            cleans: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Executor for the [`ScratchProject`](crate::ScratchProject) layout.
    pub fn maven() -> Self {
        Self::new("src/main/java", "target/classes")
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn cleans(&self) -> usize {
        self.cleans.load(Ordering::SeqCst)
    }

    /// Make every following run fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn run(&self, clean: bool, project_dir: &Path, output: &BuildOutput) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        output.out("[INFO] Scanning for projects...");

        let out_dir = project_dir.join(&self.output_dir);
        if clean {
            self.cleans.fetch_add(1, Ordering::SeqCst);
            devloop::fs::clean_dir(&out_dir)?;
        }
        if self.fail.load(Ordering::SeqCst) {
            output.out("[INFO] BUILD FAILURE");
            return Err(DevLoopError::BuildFailed("fake build tool failed".to_string()));
        }

        let mut sources: Vec<PathBuf> = FileTimestampIndex::new(project_dir.join(&self.source_dir))
            .with_file_filter(|p| BuildRootType::JavaSources.accepts(p))
            .entries()?
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        sources.sort();

        let outcome = compile_sources(&sources, &out_dir)?;
        for diagnostic in &outcome.diagnostics {
            output.err(&format!("[ERROR] {diagnostic}"));
        }
        if !outcome.success {
            output.out("[INFO] BUILD FAILURE");
            return Err(DevLoopError::BuildFailed(format!(
                "{} compilation error(s)",
                outcome.error_count()
            )));
        }
        output.out("[INFO] BUILD SUCCESS");
        Ok(())
    }
}

impl BuildExecutor for FakeBuildExecutor {
    fn execute<'a>(
        &'a self,
        clean: bool,
        project_dir: &'a Path,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move { self.run(clean, project_dir, output) })
    }
}
