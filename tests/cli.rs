use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn stored_profile_json() -> &'static str {
    r#"
{
  "version": 1,
  "profile": {
    "bedTime": "23:00:00.000000",
    "wakeupTime": "07:00:00",
    "timezoneTZ": "Europe/Berlin",
    "initialSleepLevel": -30,
    "midStageSleepLevel": -50,
    "finalSleepLevel": 15
  }
}
"#
}

#[test]
fn evaluate_prints_stage_transitions() {
    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.args(["evaluate", "--bed", "22:00", "--wake", "06:00"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sleep duration: 8h 0m"))
        .stdout(predicate::str::contains("Mid-stage transition: 23:00"))
        .stdout(predicate::str::contains("Final-stage transition: 04:00"));
}

#[test]
fn evaluate_rejects_short_night() {
    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.args(["evaluate", "--bed", "23:30", "--wake", "02:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Sleep duration must be at least 4 hours.",
        ));
}

#[test]
fn evaluate_rejects_malformed_time() {
    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.args(["evaluate", "--bed", "9:00", "--wake", "06:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid time '9:00'"));
}

#[test]
fn show_without_profile_reports_defaults() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("show")
        .arg("--profile")
        .arg(&profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("Existing profile: no"))
        .stdout(predicate::str::contains("Bed time: 22:00"))
        .stdout(predicate::str::contains("Wake time: 06:00"))
        .stdout(predicate::str::contains("Timezone: UTC"));
}

#[test]
fn show_decodes_stored_profile() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");
    fs::write(&profile, stored_profile_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("show")
        .arg("--profile")
        .arg(&profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("Existing profile: yes"))
        .stdout(predicate::str::contains("Bed time: 23:00"))
        .stdout(predicate::str::contains("Initial sleep level: -3"))
        .stdout(predicate::str::contains("Mid-stage sleep level: -5"))
        .stdout(predicate::str::contains("Final sleep level: 1.5"));
}

#[test]
fn malformed_store_falls_back_to_defaults() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");
    fs::write(&profile, "{ not-valid-json ").expect("write invalid json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("show")
        .arg("--profile")
        .arg(&profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("Existing profile: no"))
        .stderr(predicate::str::contains("invalid JSON"));
}

#[test]
fn set_writes_encoded_payload() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("set")
        .arg("--profile")
        .arg(&profile)
        .args(["--bed", "21:45", "--wake", "05:30"])
        .args(["--timezone", "America/New_York"])
        .args(["--initial", "-4", "--mid", "2", "--final", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile saved."));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&profile).expect("read")).expect("json");
    let stored = &written["profile"];
    assert_eq!(stored["bedTime"], "21:45:00.000000");
    assert_eq!(stored["wakeupTime"], "05:30:00.000000");
    assert_eq!(stored["timezoneTZ"], "America/New_York");
    assert_eq!(stored["initialSleepLevel"], -40);
    assert_eq!(stored["midStageSleepLevel"], 20);
    assert_eq!(stored["finalSleepLevel"], 100);
}

#[test]
fn set_refuses_invalid_schedule_without_writing() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("set")
        .arg("--profile")
        .arg(&profile)
        .args(["--bed", "08:00", "--wake", "08:00"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Sleep duration must be at least 4 hours.",
        ));
    assert!(!profile.exists());
}

#[test]
fn set_rejects_fractional_and_out_of_range_levels() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");

    let mut fractional = cargo_bin_cmd!("sleepcurve");
    fractional
        .arg("set")
        .arg("--profile")
        .arg(&profile)
        .args(["--initial", "2.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--initial"));

    let mut too_cold = cargo_bin_cmd!("sleepcurve");
    too_cold
        .arg("set")
        .arg("--profile")
        .arg(&profile)
        .args(["--final", "-11"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--final"));
    assert!(!profile.exists());
}

#[test]
fn set_rejects_unknown_timezone() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("set")
        .arg("--profile")
        .arg(&profile)
        .args(["--timezone", "Mars/Olympus_Mons"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown timezone"));
}

#[test]
fn adjust_clamps_level() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");
    fs::write(&profile, stored_profile_json()).expect("write json");

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("adjust")
        .arg("--profile")
        .arg(&profile)
        .args(["--stage", "mid", "--steps", "-9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mid sleep level is now -10."));

    let written = fs::read_to_string(&profile).expect("read");
    assert!(written.contains("\"midStageSleepLevel\": -100"));
}

#[test]
fn delete_requires_confirmation_and_resets() {
    let dir = tempdir().expect("tempdir");
    let profile = dir.path().join("profile.json");
    fs::write(&profile, stored_profile_json()).expect("write json");

    let mut refused = cargo_bin_cmd!("sleepcurve");
    refused
        .arg("delete")
        .arg("--profile")
        .arg(&profile)
        .assert()
        .failure()
        .stderr(predicate::str::contains("without --yes"));
    assert!(profile.exists());

    let mut cmd = cargo_bin_cmd!("sleepcurve");
    cmd.arg("delete")
        .arg("--yes")
        .arg("--profile")
        .arg(&profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("defaults restored"))
        .stdout(predicate::str::contains("Bed time: 22:00"));
    assert!(!profile.exists());
}
