#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/lhml-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn lhmlink(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_lhmlink"));
    cmd.args(["--log-level", "error"])
        .args(args)
        .arg("--socket-dir")
        .arg(dir)
        .args(["--tick", "10ms"]);
    cmd
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn view_prints_full_conversation_from_host() {
    let dir = unique_temp_dir("conversation");

    let mut host = lhmlink(&dir, &["--format", "json", "host", "--surface", "48879"])
        .args(["--ticks", "1000"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("host should start");

    let output = lhmlink(&dir, &["--format", "json", "view"])
        .args(["--ticks", "500"])
        .output()
        .expect("view should run");

    let _ = host.kill();
    let _ = host.wait();
    let _ = std::fs::remove_dir_all(&dir);

    assert!(
        output.status.success(),
        "view failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let messages = json_lines(&output);
    let types: Vec<&str> = messages
        .iter()
        .map(|m| m["type"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(types, ["Connect", "Plugins", "Sensors"]);
    assert_eq!(messages[0]["id"], 1);
    assert_eq!(messages[0]["body"]["render_surface"], 48879);
    assert_eq!(
        messages[1]["body"]["sensor_plugin_infos"][0]["name"],
        "OHM Sensors"
    );
}

#[test]
fn view_without_host_times_out_with_124() {
    let dir = unique_temp_dir("nohost");

    let output = lhmlink(&dir, &["view"])
        .args(["--ticks", "5"])
        .output()
        .expect("view should run");

    let _ = std::fs::remove_dir_all(&dir);
    assert_eq!(output.status.code(), Some(124));
    assert!(String::from_utf8_lossy(&output.stderr).contains("waiting for Connect"));
}

#[test]
fn host_with_tick_budget_prints_summary() {
    let dir = unique_temp_dir("summary");

    let output = lhmlink(&dir, &["--format", "json", "host"])
        .args(["--ticks", "3", "--pipe", "summary"])
        .output()
        .expect("host should run");

    let _ = std::fs::remove_dir_all(&dir);
    assert!(output.status.success());
    let summary = &json_lines(&output)[0];
    assert_eq!(summary["pipe"], "summary");
    assert_eq!(summary["ticks"], 3);
    assert_eq!(summary["messages_sent"], 0);
}

#[test]
fn bad_tick_is_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_lhmlink"))
        .args(["view", "--tick", "0s"])
        .output()
        .expect("view should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_message_order() {
    let output = Command::new(env!("CARGO_BIN_EXE_lhmlink"))
        .args(["version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("message_order: Connect=1 -> Plugins=2 -> Sensors=3 -> Null=0"));
}
