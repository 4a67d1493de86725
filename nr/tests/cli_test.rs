//! CLI surface tests
//!
//! Every command here runs without a model: HOME, the XDG directories and the
//! working directory all point into a temp dir.

use assert_cmd::Command;
use chrono::{Days, Local};
use predicates::prelude::*;
use tempfile::TempDir;

fn neura(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("neura").expect("binary should build");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("GEMINI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn in_days(days: u64) -> String {
    let date = Local::now().date_naive().checked_add_days(Days::new(days)).unwrap();
    date.format("%Y-%m-%d").to_string()
}

#[test]
fn test_check_comfortable_timeline() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .args(["check", "--deadline", &in_days(120), "--hours", "3", "--days", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("This timeline looks comfortable."));
}

#[test]
fn test_check_tight_timeline() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .args(["check", "--deadline", &in_days(5), "--hours", "1", "--days", "3", "--resources", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("At 1h/day, this looks tight."));
}

#[test]
fn test_check_rejects_bad_date() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .args(["check", "--deadline", "next week", "--hours", "1", "--days", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YYYY-MM-DD"));
}

#[test]
fn test_goal_list_and_show_on_empty_store() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .args(["goal", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No goals yet"));

    neura(&home)
        .args(["goal", "show", "goal-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No goal with ID goal-missing"));
}

#[test]
fn test_profile_prints_default_profile() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .arg("profile")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Dev User\""));
}

#[test]
fn test_chat_requires_api_key() {
    let home = TempDir::new().unwrap();
    neura(&home)
        .arg("chat")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY"));
}
