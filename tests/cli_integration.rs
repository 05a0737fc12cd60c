//! Integration tests for the `vt` CLI.
//!
//! Each test builds a temp vault, runs `vt` as a subprocess with an empty
//! config directory, and checks stdout and/or file contents.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Get the path to the built `vt` binary.
fn vt_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("vt");
    path
}

struct Fixture {
    _tmp: TempDir,
    root: PathBuf,
    vault: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    let vault = root.join("vault");
    fs::create_dir_all(vault.join("work")).unwrap();
    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(
        vault.join("inbox.md"),
        "# Inbox\n- [ ] buy milk\n- [x] call mum ✅ 2025-05-01\n",
    )
    .unwrap();
    fs::write(vault.join("work/plan.md"), "- [ ] ship release\n").unwrap();
    Fixture {
        _tmp: tmp,
        root,
        vault,
    }
}

fn vt(fx: &Fixture, args: &[&str]) -> Output {
    Command::new(vt_bin())
        .args(args)
        .current_dir(&fx.root)
        .env("XDG_CONFIG_HOME", fx.root.join("config"))
        .env("HOME", &fx.root)
        .env_remove("VT_LOG")
        .output()
        .unwrap()
}

fn vt_vault(fx: &Fixture, args: &[&str]) -> Output {
    let vault = fx.vault.display().to_string();
    let mut full = vec!["--vault", vault.as_str()];
    full.extend_from_slice(args);
    vt(fx, &full)
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn list_everything_by_default() {
    let fx = fixture();
    let out = vt_vault(&fx, &["list"]);
    assert!(out.status.success());
    assert_eq!(
        stdout(&out),
        "Found 3 task(s):\n\n\
         [ ] buy milk (inbox.md:2)\n\
         [x] call mum ✅ 2025-05-01 (inbox.md:3)\n\
         [ ] ship release (work/plan.md:1)\n\n"
    );
}

#[test]
fn list_inline_query_as_json() {
    let fx = fixture();
    let out = vt_vault(&fx, &["--json", "list", "not done\ngroup by folder"]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json[0]["count"], 2);
    assert_eq!(json[0]["groups"][0]["name"], "/");
    assert_eq!(json[0]["groups"][1]["name"], "work");
    assert_eq!(json[0]["groups"][1]["tasks"][0]["file"], "work/plan.md");
}

#[test]
fn toggle_marks_done_with_a_stamp() {
    let fx = fixture();
    let out = vt_vault(&fx, &["toggle", "inbox.md:2"]);
    assert!(out.status.success());
    let content = read(&fx.vault.join("inbox.md"));
    let line = content.lines().nth(1).unwrap();
    assert!(line.starts_with("- [x] buy milk ✅ "), "got: {}", line);
}

#[test]
fn delete_several_lines_of_one_file() {
    let fx = fixture();
    let out = vt_vault(&fx, &["delete", "inbox.md:2", "inbox.md:3"]);
    assert!(out.status.success());
    assert_eq!(read(&fx.vault.join("inbox.md")), "# Inbox\n");
}

#[test]
fn priority_by_name() {
    let fx = fixture();
    let out = vt_vault(&fx, &["priority", "work/plan.md:1", "high"]);
    assert!(out.status.success());
    assert_eq!(read(&fx.vault.join("work/plan.md")), "- [ ] ship release ⏫\n");
}

#[test]
fn non_task_line_is_an_error() {
    let fx = fixture();
    let out = vt_vault(&fx, &["toggle", "inbox.md:1"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("error: "));
}

#[test]
fn missing_vault_is_an_error() {
    let fx = fixture();
    let out = vt(&fx, &["list"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn init_creates_tasks_file_once() {
    let fx = fixture();
    let out = vt(&fx, &["init"]);
    assert!(out.status.success());
    assert_eq!(read(&fx.root.join("tasks.md")), "# Tasks\n\n- [ ] \n");

    let again = vt(&fx, &["init"]);
    assert_eq!(again.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));
}
