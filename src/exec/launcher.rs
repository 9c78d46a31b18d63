// src/exec/launcher.rs

//! Turn a catalog script into a running process.
//!
//! Launching happens in three steps so that each can be inspected on its own:
//!
//! 1. [`ProcessLauncher::plan`] classifies the script and computes the file
//!    contents and argv. Pure apart from reading the reference payload handed
//!    in by the caller.
//! 2. [`ProcessLauncher::materialize`] writes the body to a temp file and
//!    marks it executable. The returned [`TempPath`] deletes the file when
//!    dropped, so every exit path after this point cleans up.
//! 3. [`ProcessLauncher::spawn`] starts the interpreter in its own process
//!    group with both output pipes captured.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempPath;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::catalog::ScriptDescriptor;
use crate::config::ExecSection;
use crate::errors::{Result, ScriptRunError};
use crate::exec::language::{Interpreter, ScriptLanguage, classify};
use crate::types::ExecutionRequest;

/// Everything needed to start a script, computed before touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub language: ScriptLanguage,
    /// Interpreter executable.
    pub program: PathBuf,
    /// Contents of the materialized script file.
    pub file_contents: String,
    /// Suffix of the materialized script file, including the dot.
    pub file_suffix: String,
    /// Arguments following the script path.
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl LaunchPlan {
    /// Full argv for a given script path, program first.
    pub fn argv(&self, script_path: &Path) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.program.display().to_string());
        argv.push(script_path.display().to_string());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

/// A spawned script together with the temp file it runs from.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub child: Child,
    pub script_file: TempPath,
    pub argv: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exec: ExecSection,
}

impl ProcessLauncher {
    pub fn new(exec: ExecSection) -> Self {
        Self { exec }
    }

    /// Compute the launch plan for `script`.
    ///
    /// `reference` is the structured payload of the cached result; it is only
    /// consulted when the script accepts a reference, and an empty JSON
    /// object is injected when it is `None`.
    pub fn plan(
        &self,
        script: &ScriptDescriptor,
        request: &ExecutionRequest,
        reference: Option<&serde_json::Value>,
    ) -> Result<LaunchPlan> {
        let language = classify(&script.name, &script.body);

        let (program, file_contents, file_suffix) = match language {
            ScriptLanguage::ShellScript => (
                self.exec.shell.clone(),
                format!("#!{}\n{}", self.exec.shell.display(), script.body),
                ".sh".to_string(),
            ),
            ScriptLanguage::InterpretedScript(interp) => (
                self.interpreter_path(interp),
                script.body.clone(),
                format!(".{}", interp.extension()),
            ),
        };

        let mut args = match request.argument_string.as_deref() {
            Some(raw) => split_arguments(raw)?,
            None => Vec::new(),
        };

        if script.accepts_reference {
            let empty = serde_json::Value::Object(serde_json::Map::new());
            let payload = reference.unwrap_or(&empty);
            args.push(self.exec.reference_flag.clone());
            args.push(encode_reference(payload)?);
        }

        Ok(LaunchPlan {
            language,
            program,
            file_contents,
            file_suffix,
            args,
            cwd: request.working_directory.clone(),
        })
    }

    /// Write the planned script body to an executable temp file.
    pub fn materialize(&self, plan: &LaunchPlan) -> Result<TempPath> {
        let dir = std::path::absolute(self.exec.effective_temp_dir()).map_err(|e| {
            ScriptRunError::LaunchError(format!("resolving temp directory: {e}"))
        })?;

        let mut file = tempfile::Builder::new()
            .prefix("script_")
            .suffix(&plan.file_suffix)
            .tempfile_in(&dir)
            .map_err(|e| {
                ScriptRunError::LaunchError(format!(
                    "failed to create script file in {}: {e}",
                    dir.display()
                ))
            })?;

        file.write_all(plan.file_contents.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| {
                ScriptRunError::LaunchError(format!("failed to write script file: {e}"))
            })?;

        // Closing the handle here; the path still deletes on drop.
        let path = file.into_temp_path();
        make_executable(&path)?;

        debug!(path = %path.display(), "materialized script file");
        Ok(path)
    }

    /// Start the interpreter on `script_path`.
    pub fn spawn(&self, plan: &LaunchPlan, script_path: &Path) -> Result<Child> {
        let mut cmd = Command::new(&plan.program);
        cmd.arg(script_path)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &plan.cwd {
            cmd.current_dir(cwd);
        }

        // New process group so cancellation reaches the script's children.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|e| {
            ScriptRunError::LaunchError(format!(
                "failed to start {}: {e}",
                plan.program.display()
            ))
        })
    }

    /// Plan, materialize and spawn in one go.
    pub fn launch(
        &self,
        script: &ScriptDescriptor,
        request: &ExecutionRequest,
        reference: Option<&serde_json::Value>,
    ) -> Result<LaunchedProcess> {
        let plan = self.plan(script, request, reference)?;
        let script_file = self.materialize(&plan)?;
        let argv = plan.argv(&script_file);
        let child = self.spawn(&plan, &script_file)?;

        info!(
            script = %script.name,
            language = %plan.language,
            pid = child.id(),
            "spawned script process"
        );

        Ok(LaunchedProcess {
            child,
            script_file,
            argv,
        })
    }

    fn interpreter_path(&self, interp: Interpreter) -> PathBuf {
        match interp {
            Interpreter::Python => self.exec.python.clone(),
        }
    }
}

/// Split an argument string with POSIX shell word rules.
pub fn split_arguments(raw: &str) -> Result<Vec<String>> {
    shlex::split(raw).ok_or_else(|| {
        ScriptRunError::LaunchError(format!("invalid argument string (unbalanced quotes?): {raw}"))
    })
}

/// Lowercase hex of the UTF-8 JSON serialization of `payload`.
pub fn encode_reference(payload: &serde_json::Value) -> Result<String> {
    let json = serde_json::to_string(payload)
        .map_err(|e| ScriptRunError::LaunchError(format!("serializing reference: {e}")))?;

    let mut hex = String::with_capacity(json.len() * 2);
    for byte in json.as_bytes() {
        // Writing to a String cannot fail.
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
        ScriptRunError::LaunchError(format!(
            "failed to mark {} executable: {e}",
            path.display()
        ))
    })
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
