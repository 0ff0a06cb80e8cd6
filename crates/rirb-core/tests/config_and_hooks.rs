//! Ambient testable properties 7, 8, and 10 from SPEC_FULL.md §8.

use std::path::PathBuf;

use rirb_core::config::{Config, RawConfig};
use rirb_core::errors::RirbError;
use rirb_core::log::Log;
use rirb_core::shell::{self, HookPoint};

fn base_file() -> RawConfig {
    RawConfig {
        src: Some("/data/src".into()),
        dst: Some("myremote:backups".into()),
        uuid: Some("fixed-uuid".into()),
        ..RawConfig::default()
    }
}

#[test]
fn filter_flag_in_rclone_flags_names_the_offender_and_touches_no_sentinel() {
    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");

    let mut file = base_file();
    file.rclone_flags = Some(vec!["--exclude".into(), "*.tmp".into()]);
    let err = Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap_err();

    assert!(matches!(err, RirbError::Config(_)));
    assert!(err.to_string().contains("--exclude"));
    assert!(!cache_dir.join("rirb/stat/fixed-uuid").exists());
}

#[test]
fn override_after_file_wins_but_untouched_file_values_still_apply() {
    let file = {
        let mut f = base_file();
        f.compare = Some("size".to_string());
        f.get_hashes = Some(true);
        f
    };
    let overrides = vec![RawConfig::parse_override("compare = \"hash\"").unwrap()];
    let cfg = Config::from_raw(file, &overrides, PathBuf::from("."), None, "0.0.0").unwrap();

    // The override names `compare`, so it wins over the file's "size".
    assert_eq!(cfg.compare, rirb_core::model::CompareAttr::Hash);
    // The override never mentions `get_hashes`, so the file's value survives.
    assert!(cfg.get_hashes);
}

#[tokio::test]
async fn post_shell_failure_is_a_warning_unless_stop_on_shell_error_names_the_step() {
    let work = tempfile::tempdir().unwrap();
    let log = Log::new(work.path().join("log"), false).unwrap();

    let tolerated = shell::run_hook(HookPoint::Post, "exit 7", false, &log).await;
    assert!(tolerated.is_ok());

    let rendered = std::fs::read_to_string(work.path().join("log/log.log")).unwrap();
    assert!(rendered.contains("post_shell"));

    let fatal = shell::run_hook(HookPoint::Post, "exit 7", true, &log).await.unwrap_err();
    assert!(matches!(fatal, RirbError::Shell { .. }));
    assert!(fatal.to_string().contains("post_shell"));
}
