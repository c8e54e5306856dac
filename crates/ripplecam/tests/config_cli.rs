use std::fs;
use std::process::Command;

use rippleconfig::{RippleConfig, SourceKind};
use tempfile::TempDir;

fn ripplecam(config_dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_ripplecam"));
    command
        .env("RIPPLECAM_CONFIG_DIR", config_dir)
        .env_remove("RUST_LOG");
    command
}

#[test]
fn config_path_honours_env_override() {
    let root = TempDir::new().unwrap();

    let output = ripplecam(root.path())
        .args(["config", "path"])
        .output()
        .expect("failed to run ripplecam config path");

    assert!(output.status.success());
    let printed = String::from_utf8(output.stdout).unwrap();
    assert_eq!(printed.trim(), root.path().join("config.toml").display().to_string());
}

#[test]
fn config_init_writes_defaults_once() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("nested");
    let config_file = config_dir.join("config.toml");

    let status = ripplecam(&config_dir)
        .args(["config", "init"])
        .status()
        .expect("failed to run ripplecam config init");
    assert!(status.success());

    let written = fs::read_to_string(&config_file).unwrap();
    assert_eq!(RippleConfig::from_toml_str(&written).unwrap(), RippleConfig::default());

    let second = ripplecam(&config_dir)
        .args(["config", "init"])
        .status()
        .expect("failed to rerun ripplecam config init");
    assert!(!second.success());

    let forced = ripplecam(&config_dir)
        .args(["config", "init", "--force"])
        .status()
        .expect("failed to run ripplecam config init --force");
    assert!(forced.success());
}

#[test]
fn config_show_merges_file_and_flags() {
    let root = TempDir::new().unwrap();
    fs::write(
        root.path().join("config.toml"),
        "[simulation]\ndamping = 0.95\n\n[window]\ntitle = \"pond\"\n",
    )
    .unwrap();

    let output = ripplecam(root.path())
        .args(["--camera", "1", "--no-mirror", "config", "show"])
        .output()
        .expect("failed to run ripplecam config show");
    assert!(output.status.success());

    let shown = RippleConfig::from_toml_str(&String::from_utf8(output.stdout).unwrap()).unwrap();
    assert_eq!(shown.simulation.damping, 0.95);
    assert_eq!(shown.window.title, "pond");
    assert_eq!(shown.source.kind, SourceKind::Camera);
    assert_eq!(shown.source.camera_index, 1);
    assert!(!shown.compositing.mirror);
}

#[test]
fn config_show_rejects_invalid_file() {
    let root = TempDir::new().unwrap();
    fs::write(root.path().join("config.toml"), "[simulation]\ndamping = 2.0\n").unwrap();

    let status = ripplecam(root.path())
        .args(["config", "show"])
        .status()
        .expect("failed to run ripplecam config show");
    assert!(!status.success());
}
