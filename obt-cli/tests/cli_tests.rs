//! End-to-end runs of the obt-cli binary

use std::io::Write;
use std::process::Command;

fn obt_cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_obt-cli"))
}

#[test]
fn test_simple_mode_text_report() {
    let output = obt_cli()
        .args(["--on", "click|push(2,3) add(4)", "--to", "=|text", "--fire", "click", "-q"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("click at #node on #node (via #node): done"));
    assert!(stdout.contains("text=\"9\""));
}

#[test]
fn test_scene_json_report() {
    let mut scene = tempfile::NamedTempFile::new().unwrap();
    scene
        .write_all(
            br#"
            [output]
            format = "json"

            [[node]]
            id = "menu"
            tag = "ul"
            on = "click(li)|attr('data-v') defer"
            to = "=|%color"

            [[node]]
            id = "red"
            tag = "li"
            parent = "menu"
            attrs = { data-v = "red" }

            [[fire]]
            node = "red"
            event = "click"
            "#,
        )
        .unwrap();

    let output = obt_cli()
        .arg("--config")
        .arg(scene.path())
        .arg("-q")
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["firings"][0]["status"], "done");
    assert_eq!(report["firings"][0]["delegate"], "#red");
    let menu = &report["nodes"][0];
    assert_eq!(menu["node"], "#menu");
    assert_eq!(menu["styles"]["color"], "red");
}

#[test]
fn test_strict_failure_exits_nonzero() {
    let output = obt_cli()
        .args(["--on", "click|nosuch", "--fire", "click", "-q"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nosuch"));
}

#[test]
fn test_lenient_flag_keeps_going() {
    let output = obt_cli()
        .args(["--on", "click|nosuch; click|push(1)", "--lenient", "--fire", "click", "-q"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("skipped group 0"));
}
