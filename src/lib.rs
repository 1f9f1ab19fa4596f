// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod output;
pub mod project;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ComponentKind, ConfigFile};
use crate::engine::{BuildLoop, DevLoopMonitor, FailurePolicy, LoopOptions};
use crate::output::BuildOutput;
use crate::project::LayoutProjectSupplier;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the project supplier and the application monitor
/// - the build loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let supplier = LayoutProjectSupplier::from_path(&config_path)?;
    let cfg = supplier.config().clone();

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let options = LoopOptions {
        initial_clean: args.clean || cfg.loop_.clean,
        poll_interval: cfg.loop_.poll_interval,
        max_cycles: args.max_cycles,
        exclude: cfg.loop_.exclude.clone(),
    };
    info!(project = %cfg.project.name, root = ?cfg.root_dir, ?options, "starting devloop");

    let monitor = DevLoopMonitor::new(&cfg.build.java, FailurePolicy::from_config(&cfg.loop_))
        .with_graceful_retries(cfg.executor.graceful_retries)
        .with_poll_interval(cfg.loop_.poll_interval);

    let build_loop = BuildLoop::new(
        supplier,
        monitor,
        cfg.root_dir.clone(),
        options,
        BuildOutput::console(),
    );
    let handle = Arc::new(build_loop.start());

    // Ctrl-C → graceful shutdown; the monitor stops the application.
    {
        let handle = Arc::clone(&handle);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            handle.request_stop();
        });
    }

    handle.wait().await?;
    Ok(())
}

/// Print the resolved layout without building anything.
fn print_dry_run(cfg: &ConfigFile) {
    println!("devloop dry-run");
    println!("  project: {}", cfg.project.name);
    println!("  root: {}", cfg.root_dir.display());
    println!("  main_class: {}", cfg.project.main_class);
    println!();

    println!("build files:");
    for path in cfg.build_file_paths() {
        println!("  - {}", path.display());
    }

    println!("dependencies:");
    for path in cfg.dependency_paths() {
        println!("  - {}", path.display());
    }

    println!("components ({}):", cfg.components.len());
    for component in &cfg.components {
        let kind = match component.kind {
            ComponentKind::Compile => "compile",
            ComponentKind::Copy => "copy",
        };
        println!(
            "  - {kind}: {} -> {}",
            cfg.resolve(&component.source).display(),
            cfg.resolve(&component.output).display()
        );
    }

    match &cfg.build.command {
        Some(command) => println!("full build: {command}"),
        None => println!("full build: in-process ({})", cfg.build.javac),
    }
    if !cfg.project.compiler_flags.is_empty() {
        println!("compiler flags: {:?}", cfg.project.compiler_flags);
    }
    if !cfg.project.jvm_args.is_empty() {
        println!("jvm args: {:?}", cfg.project.jvm_args);
    }
    if !cfg.project.app_args.is_empty() {
        println!("app args: {:?}", cfg.project.app_args);
    }

    debug!("dry-run complete (no execution)");
}
