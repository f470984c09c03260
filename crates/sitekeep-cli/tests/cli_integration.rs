use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

struct CliFixture {
    _tmp: TempDir,
    home_dir: PathBuf,
    content_dir: PathBuf,
    backup_dir: PathBuf,
    config_path: PathBuf,
}

impl CliFixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let home_dir = tmp.path().join("home");
        let content_dir = tmp.path().join("content");
        let backup_dir = tmp.path().join("backups");
        let config_path = tmp.path().join("sitekeep.yaml");

        std::fs::create_dir_all(&home_dir).unwrap();
        std::fs::create_dir_all(&content_dir).unwrap();
        std::fs::write(content_dir.join("index.html"), b"<html></html>").unwrap();

        Self {
            _tmp: tmp,
            home_dir,
            content_dir,
            backup_dir,
            config_path,
        }
    }

    /// Config pointing at an unreachable destination with retries disabled,
    /// so transfer attempts fail fast.
    fn write_config(&self) {
        let config = format!(
            "backup:\n\
             \x20 content_dir: {content}\n\
             \x20 backup_dir: {backup}\n\
             database:\n\
             \x20 user: site\n\
             \x20 name: sitedb\n\
             \x20 dump_command: echo\n\
             transfer:\n\
             \x20 host: 127.0.0.1\n\
             \x20 port: 1\n\
             \x20 user: backup\n\
             \x20 password: secret\n\
             \x20 remote_path: /sites/\n\
             \x20 timeout: 30s\n\
             \x20 known_hosts: {kh}\n\
             \x20 retry:\n\
             \x20\x20\x20 max_retries: 0\n\
             retention:\n\
             \x20 keep_last: 2\n",
            content = yaml_quote_path(&self.content_dir),
            backup = yaml_quote_path(&self.backup_dir),
            kh = yaml_quote_path(&self.home_dir.join("known_hosts")),
        );
        std::fs::write(&self.config_path, config).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(sitekeep_binary_path());
        cmd.args(args);
        cmd.env("HOME", &self.home_dir);
        cmd.env("SITEKEEP_CONFIG", "");
        cmd.env("NO_COLOR", "1");
        cmd.current_dir(self._tmp.path());
        cmd.output().unwrap()
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        if !output.status.success() {
            panic!(
                "command failed: {:?}\nstdout:\n{}\nstderr:\n{}",
                args,
                stdout(&output),
                stderr(&output)
            );
        }
        stdout(&output)
    }

    fn run_err(&self, args: &[&str]) -> (String, String) {
        let output = self.run(args);
        assert!(
            !output.status.success(),
            "command unexpectedly succeeded: {:?}\nstdout:\n{}\nstderr:\n{}",
            args,
            stdout(&output),
            stderr(&output)
        );
        (stdout(&output), stderr(&output))
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn sitekeep_binary_path() -> PathBuf {
    if let Some(path) = std::env::var_os("CARGO_BIN_EXE_sitekeep") {
        return PathBuf::from(path);
    }

    let current_exe = std::env::current_exe().expect("failed to resolve current test binary path");
    let debug_dir = current_exe
        .parent()
        .and_then(|p| p.parent())
        .expect("unexpected test binary path layout");

    #[cfg(windows)]
    let candidate = debug_dir.join("sitekeep.exe");
    #[cfg(not(windows))]
    let candidate = debug_dir.join("sitekeep");

    assert!(
        candidate.exists(),
        "unable to locate sitekeep binary at {:?}",
        candidate
    );
    candidate
}

fn yaml_quote_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

#[test]
fn missing_config_is_a_clear_error() {
    let fixture = CliFixture::new();
    // No sitekeep.yaml in the working directory and no flag.
    let (_out, err) = fixture.run_err(&["run"]);
    assert!(
        err.contains("no configuration file found"),
        "unexpected stderr: {err}"
    );
    assert!(err.contains("sitekeep config"), "unexpected stderr: {err}");
}

#[test]
fn config_subcommand_writes_template() {
    let fixture = CliFixture::new();
    let dest = fixture._tmp.path().join("generated.yaml");
    let dest_str = dest.to_string_lossy().into_owned();

    let out = fixture.run_ok(&["config", &dest_str]);
    assert!(out.contains("Config written to"), "unexpected stdout: {out}");
    assert!(dest.exists());

    // Refuses to overwrite.
    let (_out, err) = fixture.run_err(&["config", &dest_str]);
    assert!(err.contains("already exists"), "unexpected stderr: {err}");
}

#[test]
fn invalid_config_is_rejected() {
    let fixture = CliFixture::new();
    std::fs::write(
        &fixture.config_path,
        "backup:\n  content_dir: /a\n  backup_dir: /b\n",
    )
    .unwrap();
    let cfg = fixture.config_path.to_string_lossy().into_owned();
    let (_out, err) = fixture.run_err(&["-c", &cfg, "run"]);
    assert!(err.contains("Error:"), "unexpected stderr: {err}");
}

#[cfg(unix)]
#[test]
fn run_keeps_local_archive_when_destination_unreachable() {
    let fixture = CliFixture::new();
    fixture.write_config();
    let cfg = fixture.config_path.to_string_lossy().into_owned();

    let out = fixture.run_ok(&["-c", &cfg, "run"]);
    assert!(out.contains("Upload FAILED"), "unexpected stdout: {out}");

    let archives: Vec<_> = std::fs::read_dir(&fixture.backup_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("backup_") && n.ends_with(".zip"))
        .collect();
    assert_eq!(archives.len(), 1, "archives: {archives:?}");
}

#[test]
fn prune_applies_keep_last_override() {
    let fixture = CliFixture::new();
    fixture.write_config();
    let cfg = fixture.config_path.to_string_lossy().into_owned();

    std::fs::create_dir_all(&fixture.backup_dir).unwrap();
    for (name, age_secs) in [
        ("backup_2024-01-01_00-00-00.zip", 300u64),
        ("backup_2024-01-02_00-00-00.zip", 200),
        ("backup_2024-01-03_00-00-00.zip", 100),
    ] {
        let path = fixture.backup_dir.join(name);
        let f = std::fs::File::create(&path).unwrap();
        f.set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(age_secs))
            .unwrap();
    }

    let out = fixture.run_ok(&["-c", &cfg, "prune", "--keep-last", "1"]);
    assert!(out.contains("Deleted 2"), "unexpected stdout: {out}");
    assert!(fixture
        .backup_dir
        .join("backup_2024-01-03_00-00-00.zip")
        .exists());
}

#[test]
fn self_test_reports_failing_phase_against_unreachable_host() {
    let fixture = CliFixture::new();
    fixture.write_config();
    let cfg = fixture.config_path.to_string_lossy().into_owned();

    let (_out, err) = fixture.run_err(&["-c", &cfg, "test"]);
    assert!(
        err.contains("self-test failed at phase"),
        "unexpected stderr: {err}"
    );
}

#[test]
fn daemon_requires_schedule_enabled() {
    let fixture = CliFixture::new();
    fixture.write_config();
    let cfg = fixture.config_path.to_string_lossy().into_owned();

    let (_out, err) = fixture.run_err(&["-c", &cfg, "daemon"]);
    assert!(
        err.contains("schedule.enabled is false"),
        "unexpected stderr: {err}"
    );
}
