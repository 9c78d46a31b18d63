// tests/launch_plan.rs

use std::path::{Path, PathBuf};

use serde_json::json;

use scriptrun::catalog::ScriptDescriptor;
use scriptrun::config::ExecSection;
use scriptrun::errors::ScriptRunError;
use scriptrun::exec::launcher::{encode_reference, split_arguments};
use scriptrun::exec::{Interpreter, ProcessLauncher, ScriptLanguage, classify};
use scriptrun::types::ExecutionRequest;

const PYTHON: ScriptLanguage = ScriptLanguage::InterpretedScript(Interpreter::Python);

fn script(name: &str, body: &str, accepts_reference: bool) -> ScriptDescriptor {
    ScriptDescriptor {
        name: name.to_string(),
        body: body.to_string(),
        accepts_reference,
    }
}

fn launcher_in(dir: &Path) -> ProcessLauncher {
    ProcessLauncher::new(ExecSection {
        temp_dir: Some(dir.to_path_buf()),
        ..ExecSection::default()
    })
}

#[test]
fn classification_follows_name_shebang_and_leading_statement() {
    assert_eq!(classify("report.py", "echo hi"), PYTHON);
    assert_eq!(classify("  report.py  ", "echo hi"), PYTHON);
    assert_eq!(classify("t", "#!/usr/bin/env python3\nprint(1)"), PYTHON);
    assert_eq!(classify("t", "#!/usr/bin/python\nprint(1)"), PYTHON);
    assert_eq!(classify("t", "\n\n#!/usr/bin/env python\nprint(1)"), PYTHON);
    assert_eq!(classify("t", "import os\nprint(os.getcwd())"), PYTHON);
    assert_eq!(classify("t", "   from pathlib import Path\n"), PYTHON);

    assert_eq!(classify("t", "echo hi"), ScriptLanguage::ShellScript);
    assert_eq!(classify("t", "#!/bin/sh\nimport_things"), ScriptLanguage::ShellScript);
    assert_eq!(classify("t", "echo import os"), ScriptLanguage::ShellScript);
    assert_eq!(classify("report.pyc", "echo hi"), ScriptLanguage::ShellScript);
}

#[test]
fn shell_plan_gets_shebang_and_shell_program() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());

    let plan = launcher
        .plan(&script("hello", "echo hi", false), &ExecutionRequest::new("hello"), None)
        .unwrap();

    assert_eq!(plan.language, ScriptLanguage::ShellScript);
    assert_eq!(plan.program, PathBuf::from("/bin/bash"));
    assert_eq!(plan.file_contents, "#!/bin/bash\necho hi");
    assert_eq!(plan.file_suffix, ".sh");
    assert!(plan.args.is_empty());
    assert_eq!(plan.cwd, None);
}

#[test]
fn python_plan_keeps_body_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let body = "import sys\nprint(sys.argv)";

    let plan = launcher
        .plan(&script("argv", body, false), &ExecutionRequest::new("argv"), None)
        .unwrap();

    assert_eq!(plan.language, PYTHON);
    assert_eq!(plan.program, PathBuf::from("/usr/bin/python3"));
    assert_eq!(plan.file_contents, body);
    assert_eq!(plan.file_suffix, ".py");
}

#[test]
fn arguments_use_shell_word_splitting() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let request = ExecutionRequest::new("s")
        .with_args(r#"--name "hello world" 'a b' plain"#)
        .in_dir("/tmp");

    let plan = launcher.plan(&script("s", "echo", false), &request, None).unwrap();

    assert_eq!(plan.args, vec!["--name", "hello world", "a b", "plain"]);
    assert_eq!(plan.cwd, Some(PathBuf::from("/tmp")));

    let argv = plan.argv(Path::new("/tmp/script_x.sh"));
    assert_eq!(argv[0], "/bin/bash");
    assert_eq!(argv[1], "/tmp/script_x.sh");
    assert_eq!(&argv[2..], plan.args.as_slice());
}

#[test]
fn unbalanced_quotes_are_a_launch_error() {
    match split_arguments(r#"--name "unterminated"#) {
        Err(ScriptRunError::LaunchError(msg)) => assert!(msg.contains("unterminated")),
        other => panic!("expected LaunchError, got {other:?}"),
    }
}

#[test]
fn reference_defaults_to_empty_object() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let request = ExecutionRequest::new("consumer").with_args("-v");

    let plan = launcher
        .plan(&script("consumer", "echo", true), &request, None)
        .unwrap();

    // "{}" == 7b 7d
    assert_eq!(plan.args, vec!["-v", "--reference", "7b7d"]);
}

#[test]
fn reference_is_hex_of_compact_json() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let payload = json!({"k": 1});

    let plan = launcher
        .plan(
            &script("consumer", "echo", true),
            &ExecutionRequest::new("consumer"),
            Some(&payload),
        )
        .unwrap();

    // {"k":1}
    assert_eq!(plan.args, vec!["--reference", "7b226b223a317d"]);
    assert_eq!(encode_reference(&payload).unwrap(), "7b226b223a317d");
}

#[test]
fn reference_is_ignored_by_scripts_that_do_not_accept_it() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let payload = json!({"k": 1});

    let plan = launcher
        .plan(&script("plain", "echo", false), &ExecutionRequest::new("plain"), Some(&payload))
        .unwrap();

    assert!(plan.args.is_empty());
}

#[test]
fn reference_hex_handles_non_ascii() {
    let encoded = encode_reference(&json!("é")).unwrap();
    // "\"é\"" as UTF-8
    assert_eq!(encoded, "22c3a922");
}

#[cfg(unix)]
#[test]
fn materialized_file_is_executable_and_removed_on_close() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(dir.path());
    let plan = launcher
        .plan(&script("hello", "echo hi", false), &ExecutionRequest::new("hello"), None)
        .unwrap();

    let path = launcher.materialize(&plan).unwrap();
    let file_name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("script_"), "{file_name}");
    assert!(file_name.ends_with(".sh"), "{file_name}");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "#!/bin/bash\necho hi");

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let kept = path.to_path_buf();
    path.close().unwrap();
    assert!(!kept.exists());
}

#[test]
fn materialize_into_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = launcher_in(&dir.path().join("does-not-exist"));
    let plan = launcher
        .plan(&script("hello", "echo hi", false), &ExecutionRequest::new("hello"), None)
        .unwrap();

    assert!(matches!(
        launcher.materialize(&plan),
        Err(ScriptRunError::LaunchError(_))
    ));
}
