use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn pct_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("pct");
    path
}

fn run_pct(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = pct_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run pct binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn write_dataset(path: &Path, features: u64, clusters: u64, points: u64, payload: usize) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&features.to_le_bytes());
    bytes.extend_from_slice(&clusters.to_le_bytes());
    bytes.extend_from_slice(&points.to_le_bytes());
    bytes.resize(bytes.len() + payload, 0);
    fs::write(path, bytes).unwrap();
}

/// Temp dir with a config that disables compiler include detection and points the
/// generator at `generator`.
fn setup_test_env(generator: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[generator]
path = "{generator}"
output_dir = "{}/data"

[sweeps.bulk]
stem = "cluster_data_2f_10c_"
postfix = "mb.bin"
vary = "size"
values = [16, 32, 64]
features = 2
clusters = 10
divisor = 8

[flags]
detect_system_includes = false
"#,
        root.display()
    );

    let config_path = root.join("pct.toml");
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

#[test]
fn test_info_prints_summary() {
    let (tmp, config_path) = setup_test_env("gen");
    let file = tmp.path().join("d.bin");
    write_dataset(&file, 2, 0, 65536, 2 * 65536 * 4);

    let (stdout, stderr, success) = run_pct(&config_path, &["info", file.to_str().unwrap()]);
    assert!(success, "info failed: {}", stderr);
    assert_eq!(
        stdout,
        "Num Features: 2\nNum Clusters: 0\nNum Points:   65536\nSize (MiB):   0.5\n"
    );
}

#[test]
fn test_info_header_only_file() {
    let (tmp, config_path) = setup_test_env("gen");
    let file = tmp.path().join("empty.bin");
    write_dataset(&file, 4, 3, 0, 0);

    let (stdout, _, success) = run_pct(&config_path, &["info", file.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("Size (MiB):   0.0"));
}

#[test]
fn test_info_short_file_fails() {
    let (tmp, config_path) = setup_test_env("gen");
    let file = tmp.path().join("short.bin");
    fs::write(&file, [0u8; 12]).unwrap();

    let (_, stderr, success) = run_pct(&config_path, &["info", file.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Failed to decode header"), "stderr: {}", stderr);
}

#[test]
fn test_info_without_file_is_usage_error() {
    let (_tmp, config_path) = setup_test_env("gen");
    let (_, stderr, success) = run_pct(&config_path, &["info"]);
    assert!(!success);
    assert!(stderr.contains("Usage"));
}

#[test]
fn test_info_check_and_points() {
    let (tmp, config_path) = setup_test_env("gen");
    let file = tmp.path().join("p.bin");
    let mut bytes = Vec::new();
    for v in [1u64, 0, 2] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for v in [0.5f32, -1.5] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(&file, bytes).unwrap();

    let (stdout, stderr, success) = run_pct(
        &config_path,
        &["info", file.to_str().unwrap(), "--check", "--points", "5"],
    );
    assert!(success, "info failed: {}", stderr);
    assert!(stdout.contains("Payload:      ok"));
    assert!(stdout.contains("0: [0.5]"));
    assert!(stdout.contains("1: [-1.5]"));
}

#[test]
fn test_sweeps_lists_config() {
    let (_tmp, config_path) = setup_test_env("gen");
    let (stdout, _, success) = run_pct(&config_path, &["sweeps"]);
    assert!(success);
    assert!(stdout.contains("bulk"));
    assert!(stdout.contains("cluster_data_2f_10c_{size}mb.bin"));
    assert!(!stdout.contains("features "));
}

#[test]
fn test_sweep_dry_run_prints_commands() {
    let (tmp, config_path) = setup_test_env("build/generator");
    let (stdout, stderr, success) = run_pct(&config_path, &["sweep", "bulk", "--dry-run"]);
    assert!(success, "dry run failed: {}", stderr);

    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    let expected = format!(
        "build/generator --features 2 --clusters 10 --divisor 8 --size 16 {}",
        tmp.path().join("data/cluster_data_2f_10c_16mb.bin").display()
    );
    assert_eq!(lines[0], expected);
    assert!(!tmp.path().join("data").exists());
}

#[test]
fn test_default_config_has_both_sweeps() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("none.toml");
    let (stdout, _, success) = run_pct(&missing, &["sweep", "features", "--dry-run"]);
    assert!(success);
    assert_eq!(stdout.lines().count(), 12);
    assert!(stdout.contains("--features 4096 data/cluster_data_4096f_10c_2048mb.bin"));
}

#[test]
fn test_unknown_sweep_fails() {
    let (_tmp, config_path) = setup_test_env("gen");
    let (_, stderr, success) = run_pct(&config_path, &["sweep", "missing"]);
    assert!(!success);
    assert!(stderr.contains("Unknown sweep"));
}

#[cfg(unix)]
#[test]
fn test_sweep_runs_generator_per_value_and_tolerates_failure() {
    use std::os::unix::fs::PermissionsExt;

    let scripts = TempDir::new().unwrap();
    let log = scripts.path().join("calls.log");
    let generator = scripts.path().join("generator");
    fs::write(
        &generator,
        format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\ncase \"$*\" in *\"--size 32 \"*) exit 1;; esac\nexit 0\n",
            log.display()
        ),
    )
    .unwrap();
    fs::set_permissions(&generator, fs::Permissions::from_mode(0o755)).unwrap();

    let (tmp, config_path) = setup_test_env(generator.to_str().unwrap());
    let (stdout, stderr, success) = run_pct(&config_path, &["sweep", "bulk"]);
    assert!(success, "sweep failed: stdout={}, stderr={}", stdout, stderr);
    assert!(tmp.path().join("data").is_dir());
    assert!(stdout.contains("Generating"));
    assert!(stdout.contains("sweep bulk: 3 runs, 1 failed"));

    let calls = fs::read_to_string(&log).unwrap();
    let calls: Vec<&str> = calls.lines().collect();
    assert_eq!(calls.len(), 3);
    for (call, size) in calls.iter().zip(["16", "32", "64"]) {
        assert!(call.starts_with("--features 2 --clusters 10 --divisor 8 --size "));
        assert!(call.contains(&format!("--size {} ", size)));
    }
}

#[test]
fn test_flags_json_without_database() {
    let (tmp, config_path) = setup_test_env("gen");
    let (stdout, stderr, success) = run_pct(
        &config_path,
        &["flags", "src/join.c", "--cwd", tmp.path().to_str().unwrap(), "--json"],
    );
    assert!(success, "flags failed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["flags"], serde_json::json!(["-x", "c", "-std=c11"]));
    assert_eq!(value["do_cache"], true);
}

#[test]
fn test_flags_header_paired_with_source() {
    let (tmp, config_path) = setup_test_env("gen");
    let root = tmp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/kmeans.hpp"), "").unwrap();
    fs::write(root.join("src/kmeans.cpp"), "").unwrap();
    let db = serde_json::json!([{
        "directory": root.join("build"),
        "arguments": ["c++", "-I", "../include", "-stdlib=libc++", "-c", "../src/kmeans.cpp"],
        "file": "../src/kmeans.cpp"
    }]);
    fs::write(root.join("compile_commands.json"), db.to_string()).unwrap();
    fs::write(root.join("Kbuild"), "").unwrap();

    let (stdout, stderr, success) = run_pct(
        &config_path,
        &["flags", "src/kmeans.hpp", "--cwd", root.to_str().unwrap()],
    );
    assert!(success, "flags failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], format!("# {}", root.join("src/kmeans.cpp").display()));
    assert_eq!(lines[1], "-I");
    assert_eq!(
        lines[2],
        root.join("build").join("../include").to_str().unwrap()
    );
    assert_eq!(&lines[3..], &["-x", "c++", "-UCC_HAVE_ASM_GOTO"]);
}
