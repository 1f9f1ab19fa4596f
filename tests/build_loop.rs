// tests/build_loop.rs

use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use devloop::engine::{BuildLoop, LoopOptions, LoopState};
use devloop::errors::DevLoopError;
use devloop::output::BuildOutput;
use devloop::project::{LayoutProjectSupplier, Project, ProjectSupplier};
use devloop::types::{BuildType, ChangeType, NextAction};
use devloop_test_utils::builders::{GREETER_JAVA, MAIN_JAVA};
use devloop_test_utils::{
    FakeBuildExecutor, FakeCompiler, MonitorEvent, RecordingMonitor, SYNTAX_ERROR, ScratchProject,
    init_tracing,
};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(5);

fn options() -> LoopOptions {
    LoopOptions {
        poll_interval: Duration::from_millis(20),
        ..LoopOptions::default()
    }
}

fn succeeded(cycle: u64) -> impl Fn(&MonitorEvent) -> bool {
    move |e| matches!(e, MonitorEvent::BuildSuccess(c, _) if *c == cycle)
}

fn failed(cycle: u64) -> impl Fn(&MonitorEvent) -> bool {
    move |e| matches!(e, MonitorEvent::BuildFail(c, _, _) if *c == cycle)
}

#[tokio::test]
async fn up_to_date_project_is_skipped_on_start() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let mut supplier = scratch.supplier(&compiler);
    let (output, captured) = BuildOutput::capture();
    supplier.new_project(false, false, &output).await?;

    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(supplier, monitor, scratch.root(), options(), output).start();

    assert!(log.wait_for(succeeded(1), WAIT).await, "first cycle never finished");
    handle.stop(WAIT).await?;

    assert_eq!(log.successes(), vec![BuildType::Skipped]);
    assert!(log.contains(&MonitorEvent::BuildStart(1, BuildType::Complete)));
    assert!(log.contains(&MonitorEvent::Ready(1)));
    assert!(captured.contains("Project scratch is up to date"));
    assert_eq!(compiler.call_count(), 1);
    assert_eq!(handle.state(), LoopState::Stopped);
    assert!(handle.is_stopped());
    Ok(())
}

#[tokio::test]
async fn touched_source_triggers_incremental_build() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let (output, captured) = BuildOutput::capture();
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&compiler),
        monitor,
        scratch.root(),
        options(),
        output,
    )
    .start();

    assert!(log.wait_for(succeeded(1), WAIT).await);
    scratch.touch(GREETER_JAVA);
    assert!(log.wait_for(succeeded(2), WAIT).await, "no build after touching a source");
    handle.stop(WAIT).await?;

    assert_eq!(
        log.successes(),
        vec![BuildType::Complete, BuildType::Incremental]
    );
    assert!(log.contains(&MonitorEvent::Changed(2, ChangeType::SourceFile)));
    assert!(log.contains(&MonitorEvent::BuildStart(2, BuildType::Incremental)));
    assert_eq!(captured.count_containing("Compiling 1 source file"), 1);
    assert_eq!(compiler.last_call(), Some(vec![scratch.path(GREETER_JAVA)]));
    Ok(())
}

#[tokio::test]
async fn touched_build_file_forces_forked_full_build() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let executor = FakeBuildExecutor::maven();
    let supplier = scratch
        .supplier(&compiler)
        .with_executor(Arc::new(executor.clone()));
    let (output, captured) = BuildOutput::capture();
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(supplier, monitor, scratch.root(), options(), output).start();

    assert!(log.wait_for(succeeded(1), WAIT).await);
    scratch.touch("pom.xml");
    assert!(log.wait_for(succeeded(2), WAIT).await, "no build after touching pom.xml");
    handle.stop(WAIT).await?;

    assert_eq!(
        log.successes(),
        vec![BuildType::ForkedComplete, BuildType::ForkedComplete]
    );
    assert!(log.contains(&MonitorEvent::Changed(2, ChangeType::BuildFile)));
    assert!(log.contains(&MonitorEvent::BuildStart(2, BuildType::Complete)));
    assert_eq!(executor.runs(), 2);
    assert_eq!(captured.count_containing("BUILD SUCCESS"), 2);
    assert_eq!(compiler.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn syntax_error_fails_then_fix_recovers() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let (output, captured) = BuildOutput::capture();
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&compiler),
        monitor,
        scratch.root(),
        options(),
        output,
    )
    .start();
    assert!(log.wait_for(succeeded(1), WAIT).await);

    let good = std::fs::read_to_string(scratch.path(MAIN_JAVA))?;
    scratch.edit(MAIN_JAVA, &format!("{good}\n{SYNTAX_ERROR}\n"));
    assert!(log.wait_for(failed(2), WAIT).await, "broken source did not fail");

    scratch.edit(MAIN_JAVA, &good);
    assert!(log.wait_for(succeeded(3), WAIT).await, "fixed source did not rebuild");
    handle.stop(WAIT).await?;

    let failure = log
        .snapshot()
        .into_iter()
        .find_map(|e| match e {
            MonitorEvent::BuildFail(2, build_type, msg) => Some((build_type, msg)),
            _ => None,
        })
        .expect("failure recorded");
    assert_eq!(failure.0, BuildType::Incremental);
    assert!(failure.1.contains("Compilation failed"));
    assert!(captured.contains("error: ';' expected"));
    assert_eq!(
        log.successes(),
        vec![BuildType::Complete, BuildType::Incremental]
    );
    Ok(())
}

#[tokio::test]
async fn failed_first_build_waits_for_any_change_then_builds_fully() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let good = std::fs::read_to_string(scratch.path(MAIN_JAVA))?;
    scratch.write(MAIN_JAVA, SYNTAX_ERROR);

    let compiler = FakeCompiler::new();
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&compiler),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(log.wait_for(failed(1), WAIT).await);
    assert!(
        log.wait_for(|e| matches!(e, MonitorEvent::CycleEnd(1, _)), WAIT)
            .await
    );
    scratch.edit(MAIN_JAVA, &good);
    assert!(log.wait_for(succeeded(2), WAIT).await, "fix was not picked up");
    handle.stop(WAIT).await?;

    assert!(log.contains(&MonitorEvent::Changed(2, ChangeType::BuildFile)));
    assert!(log.contains(&MonitorEvent::BuildStart(2, BuildType::Complete)));
    assert_eq!(log.successes(), vec![BuildType::Complete]);
    assert!(!log.contains(&MonitorEvent::Ready(1)));
    Ok(())
}

/// Fails its first full build slowly, with the fix saved while it runs.
struct FixedDuringFailedBuild {
    inner: LayoutProjectSupplier,
    fix: Option<(PathBuf, String)>,
}

impl ProjectSupplier for FixedDuringFailedBuild {
    fn new_project<'a>(
        &'a mut self,
        clean: bool,
        allow_skip: bool,
        output: &'a BuildOutput,
    ) -> Pin<Box<dyn Future<Output = devloop::errors::Result<(Project, BuildType)>> + Send + 'a>>
    {
        Box::pin(async move {
            if let Some((path, contents)) = self.fix.take() {
                tokio::time::sleep(Duration::from_millis(20)).await;
                std::fs::write(&path, contents)?;
                tokio::time::sleep(Duration::from_millis(100)).await;
                return Err(DevLoopError::BuildFailed("tool crashed".to_string()));
            }
            self.inner.new_project(clean, allow_skip, output).await
        })
    }

    fn output_dirs(&self) -> Vec<PathBuf> {
        self.inner.output_dirs()
    }
}

#[tokio::test]
async fn fix_saved_during_a_failing_full_build_is_picked_up() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let good = std::fs::read_to_string(scratch.path(MAIN_JAVA))?;
    let supplier = FixedDuringFailedBuild {
        inner: scratch.supplier(&FakeCompiler::new()),
        fix: Some((scratch.path(MAIN_JAVA), good)),
    };
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(supplier, monitor, scratch.root(), options(), BuildOutput::discard())
        .start();

    assert!(log.wait_for(failed(1), WAIT).await);
    assert!(
        log.wait_for(succeeded(2), WAIT).await,
        "edit made during the failed build was missed"
    );
    handle.stop(WAIT).await?;

    assert!(log.contains(&MonitorEvent::Changed(2, ChangeType::BuildFile)));
    assert_eq!(log.successes(), vec![BuildType::Complete]);
    Ok(())
}

#[tokio::test]
async fn outputs_of_a_failed_full_build_do_not_retrigger_it() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    // Resources are copied before the compile fails.
    scratch.write_config(
        r#"
[project]
name = "scratch"
build_files = ["pom.xml"]
main_class = "io.example.Main"
dependencies = ["lib"]

[[component]]
kind = "copy"
source = "src/main/resources"
output = "target/classes"

[[component]]
kind = "compile"
source = "src/main/java"
output = "target/classes"

[loop]
poll_interval = "20ms"
"#,
    );
    let good = std::fs::read_to_string(scratch.path(MAIN_JAVA))?;
    scratch.write(MAIN_JAVA, SYNTAX_ERROR);

    let compiler = FakeCompiler::new();
    let monitor = RecordingMonitor::new();
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&compiler),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(log.wait_for(failed(1), WAIT).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(handle.cycle(), 1, "copied resources woke the wait");
    assert!(scratch.output_dir().join("app.properties").is_file());

    scratch.edit(MAIN_JAVA, &good);
    assert!(log.wait_for(succeeded(2), WAIT).await);
    handle.stop(WAIT).await?;
    assert_eq!(compiler.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn up_to_date_project_skips_then_stops_at_max_cycles() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let mut supplier = scratch.supplier(&compiler);
    supplier
        .new_project(false, false, &BuildOutput::discard())
        .await?;

    let monitor = RecordingMonitor::new().with_action(NextAction::Continue);
    let log = monitor.log();
    let handle = BuildLoop::new(
        supplier,
        monitor,
        scratch.root(),
        LoopOptions {
            max_cycles: Some(4),
            ..options()
        },
        BuildOutput::discard(),
    )
    .start();

    handle.wait_for_stopped(WAIT).await?;

    assert_eq!(log.successes(), vec![BuildType::Skipped; 4]);
    assert_eq!(handle.cycle(), 4);
    assert!(handle.is_stopped());
    assert_eq!(handle.state(), LoopState::Stopped);
    assert_eq!(compiler.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn continue_action_polls_until_max_cycles() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let compiler = FakeCompiler::new();
    let monitor = RecordingMonitor::new().with_action(NextAction::Continue);
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&compiler),
        monitor,
        scratch.root(),
        LoopOptions {
            max_cycles: Some(3),
            ..options()
        },
        BuildOutput::discard(),
    )
    .start();

    handle.wait_for_stopped(WAIT).await?;

    assert_eq!(
        log.successes(),
        vec![BuildType::Complete, BuildType::Skipped, BuildType::Skipped]
    );
    assert_eq!(log.count(|e| matches!(e, MonitorEvent::Ready(_))), 3);
    assert_eq!(handle.cycle(), 3);
    assert_eq!(handle.state(), LoopState::Stopped);
    assert_eq!(log.snapshot().last(), Some(&MonitorEvent::Stopped));
    Ok(())
}

#[tokio::test]
async fn exit_action_stops_after_one_cycle() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let monitor = RecordingMonitor::new().with_action(NextAction::Exit);
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    handle.wait_for_stopped(WAIT).await?;
    assert_eq!(handle.cycle(), 1);
    assert_eq!(log.count(|e| matches!(e, MonitorEvent::Stopped)), 1);
    Ok(())
}

#[tokio::test]
async fn stop_reports_timeout_while_a_callback_is_busy() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let monitor = RecordingMonitor::new().with_build_start_delay(Duration::from_millis(500));
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(
        log.wait_for(|e| matches!(e, MonitorEvent::BuildStart(1, _)), WAIT)
            .await
    );
    let err = handle
        .stop(Duration::from_millis(50))
        .await
        .expect_err("loop is still inside on_build_start");
    assert!(matches!(err, DevLoopError::StopTimeout(_)));
    assert!(!handle.is_stopped());

    handle.wait_for_stopped(WAIT).await?;
    assert!(handle.is_stopped());
    // Stopping again is a no-op.
    handle.stop(WAIT).await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_waiters_share_one_deadline_each() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let monitor = RecordingMonitor::new().with_build_start_delay(Duration::from_secs(1));
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();
    assert!(
        log.wait_for(|e| matches!(e, MonitorEvent::BuildStart(1, _)), WAIT)
            .await
    );

    let started = tokio::time::Instant::now();
    let (first, second) = tokio::join!(
        handle.wait_for_stopped(Duration::from_millis(150)),
        async {
            let result = handle.wait_for_stopped(Duration::from_millis(200)).await;
            (result, started.elapsed())
        }
    );

    assert!(matches!(first, Err(DevLoopError::StopTimeout(_))));
    let (second, elapsed) = second;
    assert!(matches!(second, Err(DevLoopError::StopTimeout(_))));
    assert!(elapsed < Duration::from_millis(320), "waited {elapsed:?}");

    handle.stop(WAIT).await?;
    Ok(())
}

#[tokio::test]
async fn monitor_error_fails_the_loop_but_still_reports_stopped() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let monitor = RecordingMonitor::new().failing_build_start(1);
    let log = monitor.log();
    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    let err = handle
        .wait_for_stopped(WAIT)
        .await
        .expect_err("monitor error must surface");
    assert!(err.to_string().contains("monitor refused cycle 1"));
    assert_eq!(handle.state(), LoopState::Failed);
    assert!(log.contains(&MonitorEvent::Stopped));
    assert!(log.successes().is_empty());

    // Only the first waiter sees the error.
    handle.wait_for_stopped(WAIT).await?;
    Ok(())
}

#[tokio::test]
async fn failing_on_stopped_marks_the_loop_failed() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let monitor = RecordingMonitor::new().failing_stop();
    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    let err = handle.stop(WAIT).await.expect_err("on_stopped error must surface");
    assert!(err.to_string().contains("monitor failed to stop"));
    assert_eq!(handle.state(), LoopState::Failed);
    Ok(())
}
