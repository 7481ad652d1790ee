//! End-to-end tests for the modeller CLI.
//!
//! Argument and setup failures are checked everywhere. Calls against the
//! stub engine are ignored by default because the stub is a separate
//! package; run them with
//! `cargo build -p modeller-stub-engine && cargo test -p modeller-cli -- --ignored`.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

fn modeller() -> Command {
    let mut cmd = Command::cargo_bin("modeller").expect("modeller binary not built");
    cmd.env_remove("EMMEPATH").env_remove("MODELLER_PROJECT");
    cmd
}

/// Temporary directory holding an empty project file.
struct TestProject {
    temp: TempDir,
    project: PathBuf,
}

impl TestProject {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let project = temp.path().join("network.emp");
        fs::write(&project, "").expect("Failed to write project file");
        Self { temp, project }
    }
}

// =============================================================================
// Arguments and setup
// =============================================================================

#[test]
fn test_help_lists_commands() {
    modeller()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run-params"))
        .stdout(predicate::str::contains("exists"))
        .stdout(predicate::str::contains("clean-log"));
}

#[test]
fn test_missing_project_argument() {
    modeller()
        .args(["exists", "pkg.tool"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No project file given"));
}

#[test]
fn test_missing_emmepath() {
    let project = TestProject::new();

    modeller()
        .arg("--project")
        .arg(&project.project)
        .args(["exists", "pkg.tool"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("EMMEPATH"));
}

#[test]
fn test_blank_emmepath() {
    let project = TestProject::new();

    modeller()
        .env("EMMEPATH", "  ")
        .arg("--project")
        .arg(&project.project)
        .args(["exists", "pkg.tool"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Environment variable EMMEPATH is not set",
        ));
}

#[test]
fn test_project_must_be_emp_file() {
    let project = TestProject::new();
    let not_a_project = project.temp.path().join("network.txt");
    fs::write(&not_a_project, "").unwrap();

    modeller()
        .arg("--project")
        .arg(&not_a_project)
        .arg("--emme-path")
        .arg(project.temp.path())
        .args(["run", "pkg.tool"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an existing Emme project file"));
}

#[test]
fn test_malformed_parameter_fails_before_launch() {
    let project = TestProject::new();

    modeller()
        .arg("--project")
        .arg(&project.project)
        .args(["run-params", "pkg.tool", "--param", "no_equals_sign"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected NAME=VALUE"));
}

#[test]
fn test_unreadable_params_file() {
    let project = TestProject::new();

    modeller()
        .arg("--project")
        .arg(&project.project)
        .args(["run-params", "pkg.tool", "--params-file"])
        .arg(project.temp.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

// =============================================================================
// Calls against the stub engine
// =============================================================================

#[cfg(unix)]
mod stub {
    use super::*;

    /// Fake installation whose runtime is the stub engine binary.
    struct StubInstallation {
        project: TestProject,
        installation: PathBuf,
    }

    impl StubInstallation {
        fn new() -> Self {
            let cli = assert_cmd::cargo::cargo_bin("modeller");
            let stub = cli.with_file_name("modeller-stub-engine");
            assert!(
                stub.is_file(),
                "{} not built; run `cargo build -p modeller-stub-engine` first",
                stub.display()
            );

            let project = TestProject::new();
            let installation = project.temp.path().join("emme");
            let bin = installation.join("Python311").join("bin");
            fs::create_dir_all(&bin).unwrap();
            std::os::unix::fs::symlink(&stub, bin.join("python3")).unwrap();

            Self {
                project,
                installation,
            }
        }

        fn command(&self) -> Command {
            let mut cmd = modeller();
            cmd.arg("--project")
                .arg(&self.project.project)
                .arg("--emme-path")
                .arg(&self.installation)
                .arg("--script")
                .arg(self.project.temp.path().join("ModellerBridge.py"))
                .arg("--no-display-wrapper");
            cmd
        }
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_run_prints_value() {
        let stub = StubInstallation::new();

        stub.command()
            .args(["run", "stub.echo", "1 2 3"])
            .assert()
            .success()
            .stdout("1 2 3\n");
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_run_streams_print_and_progress() {
        let stub = StubInstallation::new();

        stub.command()
            .args(["run", "stub.progress"])
            .assert()
            .success()
            .stdout(predicate::str::contains("halfway"))
            .stderr(predicate::str::contains("100%"));
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_run_json_outcomes() {
        let stub = StubInstallation::new();

        stub.command()
            .args(["run", "stub.complete", "--json"])
            .assert()
            .success()
            .stdout(r#"{"success":true,"value":null}"#.to_string() + "\n");

        stub.command()
            .args(["run", "stub.parameter_error", "scenario 9 missing", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"{"success":false,"value":"scenario 9 missing"}"#,
            ));
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_run_engine_error_fails() {
        let stub = StubInstallation::new();

        stub.command()
            .args(["run", "stub.runtime_error", "division by zero"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Runtime error: division by zero"));
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_run_params_from_file_and_flags() {
        let stub = StubInstallation::new();
        let file = stub.project.temp.path().join("params.json");
        fs::write(&file, r#"[{"name": "scenario_id", "value": "3"}]"#).unwrap();

        stub.command()
            .args(["run-params", "stub.export", "--params-file"])
            .arg(&file)
            .args(["--param", "export_nodes=True"])
            .assert()
            .success()
            .stdout("scenario_id=3;export_nodes=True\n");
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_exists_exit_codes() {
        let stub = StubInstallation::new();

        stub.command()
            .args(["exists", "stub.echo"])
            .assert()
            .success()
            .stdout("true\n");

        stub.command()
            .args(["exists", "pkg.missing"])
            .assert()
            .code(1)
            .stdout("false\n");
    }

    #[test]
    #[ignore = "needs the modeller-stub-engine binary"]
    fn test_clean_log() {
        let stub = StubInstallation::new();

        stub.command()
            .arg("clean-log")
            .assert()
            .success()
            .stderr(predicate::str::contains("Logbook cleaned"));
    }
}
