// tests/dev_monitor.rs
#![cfg(unix)]

use std::error::Error;
use std::time::Duration;

use devloop::engine::{BuildLoop, DevLoopMonitor, FailurePolicy, LoopOptions};
use devloop::exec::CommandSpec;
use devloop::output::{BuildOutput, CapturedOutput};
use devloop::project::Project;
use devloop_test_utils::builders::GREETER_JAVA;
use devloop_test_utils::{FakeCompiler, ScratchProject, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(5);

fn options() -> LoopOptions {
    LoopOptions {
        poll_interval: Duration::from_millis(20),
        ..LoopOptions::default()
    }
}

fn shell_app(script: &'static str) -> impl Fn(&Project) -> devloop::errors::Result<CommandSpec> {
    move |project| Ok(CommandSpec::new("sh", project.root_dir()).args(["-c", script]))
}

async fn wait_for_line(captured: &CapturedOutput, needle: &str) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if captured.contains(needle) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn application_runs_after_build_and_is_stopped_with_the_loop() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let (status, status_lines) = BuildOutput::capture();
    let (app_output, app_lines) = BuildOutput::capture();
    let monitor = DevLoopMonitor::new("java", FailurePolicy::default())
        .with_launcher(shell_app("echo app up; exec sleep 30"))
        .with_poll_interval(Duration::from_millis(20))
        .with_graceful_retries(1)
        .with_status_output(status)
        .with_app_output(app_output);

    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(wait_for_line(&app_lines, "app up").await, "application never started");
    assert!(status_lines.contains("io.example.Main (pid"));

    handle.stop(WAIT).await?;
    assert!(status_lines.contains("stopping application"));
    assert!(status_lines.contains("devloop stopped"));
    Ok(())
}

#[tokio::test]
async fn application_is_restarted_around_an_incremental_build() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let (status, status_lines) = BuildOutput::capture();
    let monitor = DevLoopMonitor::new("java", FailurePolicy::default())
        .with_launcher(shell_app("exec sleep 30"))
        .with_poll_interval(Duration::from_millis(20))
        .with_status_output(status)
        .with_app_output(BuildOutput::discard());

    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(wait_for_line(&status_lines, "io.example.Main (pid").await);
    scratch.touch(GREETER_JAVA);
    assert!(wait_for_line(&status_lines, "build succeeded (incremental)").await);
    assert!(
        with_timeout(async {
            while status_lines.count_containing("io.example.Main (pid") < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            true
        })
        .await
    );
    assert!(status_lines.contains("stopping application"));

    handle.stop(WAIT).await?;
    Ok(())
}

#[tokio::test]
async fn crashing_application_exhausts_its_budget_and_ends_the_loop() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let (status, status_lines) = BuildOutput::capture();
    let monitor = DevLoopMonitor::new("java", FailurePolicy::new(3, 10, 1))
        .with_launcher(shell_app("echo boom >&2; exit 1"))
        .with_poll_interval(Duration::from_millis(200))
        .with_status_output(status)
        .with_app_output(BuildOutput::discard());

    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(wait_for_line(&status_lines, "application exited with status 1").await);
    assert!(!handle.is_stopped(), "one failure is within budget");

    scratch.touch(GREETER_JAVA);
    handle.wait_for_stopped(WAIT).await?;

    assert_eq!(status_lines.count_containing("application exited with status 1"), 2);
    assert!(status_lines.contains("exiting, max application failures reached"));
    Ok(())
}

#[tokio::test]
async fn clean_exit_with_stderr_output_counts_as_a_failure() -> TestResult {
    init_tracing();
    let scratch = ScratchProject::new();
    let (status, status_lines) = BuildOutput::capture();
    let monitor = DevLoopMonitor::new("java", FailurePolicy::default())
        .with_launcher(shell_app("echo boom >&2; echo again >&2; exit 0"))
        .with_poll_interval(Duration::from_millis(200))
        .with_status_output(status)
        .with_app_output(BuildOutput::discard());

    let handle = BuildLoop::new(
        scratch.supplier(&FakeCompiler::new()),
        monitor,
        scratch.root(),
        options(),
        BuildOutput::discard(),
    )
    .start();

    assert!(wait_for_line(&status_lines, "application wrote to stderr").await);
    handle.stop(WAIT).await?;

    assert_eq!(status_lines.count_containing("application wrote to stderr"), 1);
    assert_eq!(status_lines.count_containing("application exited"), 0);
    Ok(())
}
