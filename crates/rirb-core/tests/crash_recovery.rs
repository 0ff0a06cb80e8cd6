//! Scenario 4 from SPEC_FULL.md §8: a crash between the pre-manifest upload and
//! the final unprefix must leave `INCOMPLETE_BACKUP_`-prefixed manifests (and no
//! `curr.json.gz`) on disk, with the sentinel still present, and a later
//! `unprefix_manifests` call must complete the promotion.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rirb_core::config::Config;
use rirb_core::driver::SyncToolDriver;
use rirb_core::log::Log;
use rirb_core::manifest::{self, BackedUpFiles};
use rirb_core::model::{DiffSet, FileEntry, FileMap};
use rirb_core::sentinel::Sentinel;

/// A stand-in sync tool: `copyto src dst` and `moveto src dst` operate on real
/// local paths via `cp`/`mv`, so manifest round trips can be exercised without a
/// real rclone remote.
fn fake_rclone() -> PathBuf {
    let dir = tempfile::tempdir().unwrap().into_path();
    let script = dir.join("rclone");
    std::fs::write(
        &script,
        r#"#!/bin/sh
cmd="$1"
shift
case "$cmd" in
  copyto) cp "$1" "$2" ;;
  moveto) mv "$1" "$2" ;;
  lsjson) echo "[]" ;;
  *) : ;;
esac
"#,
    )
    .unwrap();
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
    std::fs::set_permissions(&script, perms).unwrap();
    script
}

fn test_config(dst: &str) -> Config {
    let file = rirb_core::config::RawConfig {
        src: Some("/src".into()),
        dst: Some(dst.into()),
        uuid: Some("crash-test-uuid".into()),
        ..Default::default()
    };
    Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap()
}

#[tokio::test]
async fn crash_between_pre_upload_and_transfer_leaves_prefixed_manifests_and_sentinel() {
    let work = tempfile::tempdir().unwrap();
    let logs_dir = work.path().join("dst/logs/run1");
    std::fs::create_dir_all(&logs_dir).unwrap();

    let log = Log::new(work.path().join("log"), false).unwrap();
    let driver = SyncToolDriver::new(fake_rclone().to_string_lossy().into_owned(), vec![], BTreeMap::new(), false);
    let cfg = test_config(&work.path().join("dst").to_string_lossy());

    let mut prior = FileMap::new();
    prior.insert("m.txt".to_string(), FileEntry { size: 1, mod_time: None, hashes: None, extra: Default::default() });
    prior.insert("d.txt".to_string(), FileEntry { size: 2, mod_time: None, hashes: None, extra: Default::default() });

    let diff = DiffSet {
        new: vec![],
        modified: vec!["m.txt".to_string()],
        deleted: vec!["d.txt".to_string()],
        renamed: vec![],
    };
    let backed_up = BackedUpFiles::from_diff(&prior, &diff);
    assert!(!backed_up.is_empty());

    let cache_dir = work.path().join("cache");
    let sentinel = Sentinel::for_uuid(&cache_dir, &cfg.uuid);
    assert!(!sentinel.create_exclusive().unwrap());

    manifest::upload_pre_manifests(&driver, &cfg, &logs_dir.to_string_lossy(), &diff, &backed_up, &log)
        .await
        .unwrap();

    // Simulated crash: the transfer and upload_curr steps never ran.
    assert!(logs_dir.join("INCOMPLETE_BACKUP_diffs.json.gz").exists());
    assert!(logs_dir.join("INCOMPLETE_BACKUP_backed_up_files.json.gz").exists());
    assert!(!logs_dir.join("curr.json.gz").exists());
    assert!(sentinel.exists());

    // Next invocation observes the sentinel before doing anything else.
    let prior_run_unfinished = sentinel.create_exclusive().unwrap();
    assert!(prior_run_unfinished);
    assert!(cfg.automatic_dst_list);

    // Finishing the interrupted run promotes the prefixed manifests.
    manifest::unprefix_manifests(&driver, &cfg, &logs_dir.to_string_lossy(), true, &log)
        .await
        .unwrap();
    assert!(logs_dir.join("diffs.json.gz").exists());
    assert!(logs_dir.join("backed_up_files.json.gz").exists());
    assert!(!logs_dir.join("INCOMPLETE_BACKUP_diffs.json.gz").exists());
    assert!(!logs_dir.join("INCOMPLETE_BACKUP_backed_up_files.json.gz").exists());

    sentinel.remove().unwrap();
    assert!(!sentinel.exists());
}
