//! `--new` writes a template config that `rirb-core` can load back; a second
//! `--new` against the same path refuses to clobber it (§6, §4.L).

use std::process::Command;

#[test]
fn new_writes_a_loadable_template_and_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("rirb.toml");

    let output = Command::new(env!("CARGO_BIN_EXE_rirb"))
        .arg(&config_path)
        .arg("--new")
        .output()
        .expect("failed to run rirb --new");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(config_path.exists());

    let text = std::fs::read_to_string(&config_path).unwrap();
    let raw = rirb_core::config::RawConfig::from_toml(&text).expect("template must parse");
    assert!(raw.uuid.is_some());
    assert_ne!(raw.uuid.as_deref(), Some("{{uuid}}"));

    let second = Command::new(env!("CARGO_BIN_EXE_rirb"))
        .arg(&config_path)
        .arg("--new")
        .output()
        .expect("failed to run rirb --new a second time");
    assert!(!second.status.success());
}
