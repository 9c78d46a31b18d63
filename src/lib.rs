// src/lib.rs

pub mod catalog;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::io::Write;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, RunArgs};
use crate::config::{default_config_path, load_and_validate};
use crate::exec::{ExecutionManager, render_frame};
use crate::types::{EventKind, ExecutionRequest, OutputEvent};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the script catalog and execution manager
/// - event printing
/// - Ctrl-C handling (cancels the running script)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    info!(path = %config_path.display(), scripts = cfg.script.len(), "config loaded");

    let manager = ExecutionManager::from_config(&cfg);

    match args.command {
        Command::List => {
            print_catalog(&manager);
            Ok(())
        }
        Command::Run(run_args) if run_args.dry_run => print_dry_run(&manager, &run_args),
        Command::Run(run_args) => run_scripts(&manager, &run_args).await,
    }
}

async fn run_scripts(manager: &ExecutionManager, run_args: &RunArgs) -> Result<()> {
    let mut failed = Vec::new();

    for name in &run_args.names {
        let request = build_request(name, run_args);
        let mut stream = manager.run(request);
        let id = stream.id();
        debug!(execution_id = %id, script = %name, "streaming execution");

        let mut saw_error = false;
        let mut cancelled = false;

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(event) => {
                        saw_error |= event.kind == EventKind::Error;
                        print_event(&event, run_args.sse)?;
                    }
                    None => break,
                },
                res = tokio::signal::ctrl_c(), if !cancelled => {
                    if let Err(e) = res {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                    }
                    cancelled = true;
                    if let Err(e) = manager.cancel(&id) {
                        debug!(error = %e, "nothing to cancel");
                    }
                }
            }
        }

        if saw_error {
            failed.push(name.clone());
        }
        if cancelled {
            bail!("cancelled while running '{name}'");
        }
    }

    if run_args.show_result {
        match manager.last_result() {
            Some(result) => {
                let json = serde_json::to_string_pretty(&result.structured_payload)?;
                println!("{json}");
            }
            None => eprintln!("(no structured result cached)"),
        }
    }

    if !failed.is_empty() {
        bail!("scripts reported errors: {}", failed.join(", "));
    }
    Ok(())
}

fn build_request(name: &str, run_args: &RunArgs) -> ExecutionRequest {
    let mut request = ExecutionRequest::new(name);
    if let Some(args) = &run_args.args {
        request = request.with_args(args.clone());
    }
    if let Some(cwd) = &run_args.cwd {
        request = request.in_dir(cwd.clone());
    }
    request
}

fn print_event(event: &OutputEvent, sse: bool) -> Result<()> {
    if sse {
        let mut out = std::io::stdout().lock();
        out.write_all(render_frame(event).as_bytes())?;
        out.flush()?;
        return Ok(());
    }

    match event.kind {
        EventKind::Output => {
            let mut out = std::io::stdout().lock();
            out.write_all(event.text.as_bytes())?;
            out.flush()?;
        }
        EventKind::Error => {
            let mut err = std::io::stderr().lock();
            err.write_all(event.text.as_bytes())?;
            if !event.text.ends_with('\n') {
                err.write_all(b"\n")?;
            }
        }
        EventKind::Done => debug!(text = %event.text, "execution finished"),
    }
    Ok(())
}

/// Print each script's launch plan; nothing is written or executed.
fn print_dry_run(manager: &ExecutionManager, run_args: &RunArgs) -> Result<()> {
    println!("scriptrun dry-run");
    for name in &run_args.names {
        let request = build_request(name, run_args);
        let plan = manager
            .plan(&request)
            .with_context(|| format!("planning '{name}'"))?;

        println!("  - {}", name.trim());
        println!("      language: {}", plan.language);
        println!("      program: {}", plan.program.display());
        if !plan.args.is_empty() {
            println!("      args: {:?}", plan.args);
        }
        if let Some(cwd) = &plan.cwd {
            println!("      cwd: {}", cwd.display());
        }
    }
    Ok(())
}

fn print_catalog(manager: &ExecutionManager) {
    let scripts = manager.catalog().list();
    if scripts.is_empty() {
        println!("no scripts configured");
        return;
    }

    let mut current_category: Option<&str> = None;
    for script in &scripts {
        if current_category != Some(script.category.as_str()) {
            println!("{}:", script.category);
            current_category = Some(script.category.as_str());
        }
        let reference = if script.accepts_reference { " [reference]" } else { "" };
        if script.description.is_empty() {
            println!("  - {}{}", script.name, reference);
        } else {
            println!("  - {}{} : {}", script.name, reference, script.description);
        }
    }
}
