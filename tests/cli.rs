use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("history")).unwrap();
        let ws = Self { dir };
        let config = format!(
            "dest_folder: {staging}\n\
             web1:\n  \
               files: {{www: /var/www}}\n  \
               local_history: {{folder: {history}, memory: {{day: 1}}}}\n\
             report:\n  - file: {report}",
            staging = ws.path().join("staging").display(),
            history = ws.history().display(),
            report = ws.report().display(),
        );
        fs::write(ws.config(), config).unwrap();
        ws
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PathBuf {
        self.path().join("backup.config")
    }

    fn history(&self) -> PathBuf {
        self.path().join("history")
    }

    fn report(&self) -> PathBuf {
        self.path().join("report.log")
    }

    fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::cargo_bin("backuper").unwrap();
        cmd.arg(subcommand)
            .arg("--config")
            .arg(self.config())
            .args(["--log", "stdout"]);
        cmd
    }
}

#[test]
fn test_config_shows_actions_and_reports() {
    let ws = Workspace::new();
    ws.command("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("web1_www"))
        .stdout(predicate::str::contains("File report target"));
}

#[test]
fn test_missing_config_exits_with_failure() {
    let ws = Workspace::new();
    Command::cargo_bin("backuper")
        .unwrap()
        .args(["config", "--log", "stdout", "--config"])
        .arg(ws.path().join("absent.config"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unable to read config file"));
}

#[test]
fn test_unknown_target_exits_with_failure() {
    let ws = Workspace::new();
    ws.command("list")
        .arg("mail*")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Unknown target mail*"));
}

#[test]
fn test_unknown_option_exits_with_failure() {
    Command::cargo_bin("backuper")
        .unwrap()
        .args(["config", "--frobnicate"])
        .assert()
        .code(1);
}

#[test]
fn test_check_reports_writes_test_report() {
    let ws = Workspace::new();
    ws.command("check-reports").assert().success();
    let report = fs::read_to_string(ws.report()).unwrap();
    assert!(report.contains("Backup a test"));
}

#[test]
fn test_list_then_clean_old_archives() {
    let ws = Workspace::new();
    let old = ws.history().join("20000101_web1_www.tgz");
    let foreign = ws.history().join("notes.txt");
    fs::write(&old, "old").unwrap();
    fs::write(&foreign, "keep").unwrap();

    ws.command("list")
        .arg("web1")
        .assert()
        .success()
        .stdout(predicate::str::contains("20000101_web1_www.tgz [old]"));

    ws.command("clean").assert().success();
    assert!(!old.exists());
    assert!(foreign.exists());
}
