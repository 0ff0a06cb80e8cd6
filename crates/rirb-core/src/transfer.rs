//! Transfer planner / executor (component E): turns a [`DiffSet`] into the
//! sequence of `copy`/`move`/`moveto`/`rmdirs` sync-tool calls that realize it.

use std::collections::BTreeSet;

use crate::config::{CleanupEmptyDirs, Config};
use crate::driver::{CallMode, SyncToolDriver};
use crate::errors::RirbResult;
use crate::log::Log;
use crate::model::{DiffSet, FileMap};

const NO_TRAVERSE_THRESHOLD: usize = 50;

fn write_files_from(paths: &[String]) -> RirbResult<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    use std::io::Write;
    for p in paths {
        writeln!(file, "{p}")?;
    }
    Ok(file)
}

/// Copy `paths` from `src` into `<dst>/curr`, backing up any overwritten file into
/// `<dst>/back/<ts>`. `extra_flag` is `--ignore-times` for the same-size group and
/// `--size-only` for the new/diff-size group (§4.E).
async fn copy_group(
    driver: &SyncToolDriver,
    cfg: &Config,
    src_root: &str,
    dst_root: &str,
    back_dir: &str,
    paths: &[String],
    extra_flag: &str,
    log: &Log,
) -> RirbResult<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let files_from = write_files_from(paths)?;
    let mut argv = vec![
        "copy".to_string(),
        src_root.to_string(),
        dst_root.to_string(),
        "--backup-dir".to_string(),
        back_dir.to_string(),
        extra_flag.to_string(),
        "--files-from".to_string(),
        files_from.path().to_string_lossy().into_owned(),
    ];
    if paths.len() <= NO_TRAVERSE_THRESHOLD {
        argv.push("--no-traverse".to_string());
    }
    argv.extend(cfg.filter_flags.iter().cloned());
    driver.call(&argv, CallMode::Streamed, log).await?;
    Ok(())
}

/// Move `paths` out of `<dst>/curr` into `<dst>/back/<ts>` (§4.E Deletes).
async fn move_deleted(
    driver: &SyncToolDriver,
    cfg: &Config,
    dst_root: &str,
    back_dir: &str,
    paths: &[String],
    log: &Log,
) -> RirbResult<()> {
    if paths.is_empty() {
        return Ok(());
    }
    let files_from = write_files_from(paths)?;
    let mut argv = vec![
        "move".to_string(),
        dst_root.to_string(),
        back_dir.to_string(),
        "--files-from".to_string(),
        files_from.path().to_string_lossy().into_owned(),
        "--no-check-dest".to_string(),
        "--ignore-times".to_string(),
        "--no-traverse".to_string(),
    ];
    argv.extend(cfg.filter_flags.iter().cloned());
    driver.call(&argv, CallMode::Streamed, log).await?;
    Ok(())
}

/// One `moveto` per rename pair, both under `<dst>/curr` (§4.E Renames).
async fn apply_renames(driver: &SyncToolDriver, dst_root: &str, renames: &[(String, String)], log: &Log) -> RirbResult<()> {
    for (old, new) in renames {
        let argv = vec![
            "moveto".to_string(),
            format!("{dst_root}/{old}"),
            format!("{dst_root}/{new}"),
            "--no-check-dest".to_string(),
            "--ignore-times".to_string(),
            "--no-traverse".to_string(),
        ];
        driver.call(&argv, CallMode::Streamed, log).await?;
    }
    Ok(())
}

/// Execute the new/modified copy, the rename batch, and the delete move. Callers
/// are responsible for manifest uploads around this call, and for calling
/// [`cleanup_empty_dirs`] afterward, per §4.F/§5's ordering guarantees.
pub async fn execute(
    driver: &SyncToolDriver,
    cfg: &Config,
    src_root: &str,
    dst_root: &str,
    back_dir: &str,
    prev: &FileMap,
    curr: &FileMap,
    diff: &DiffSet,
    log: &Log,
) -> RirbResult<()> {
    let same_size: Vec<String> = diff
        .modified
        .iter()
        .filter(|p| matches!((prev.get(*p), curr.get(*p)), (Some(a), Some(b)) if a.size == b.size))
        .cloned()
        .collect();
    let diff_size: Vec<String> = diff
        .modified
        .iter()
        .filter(|p| !same_size.contains(p))
        .cloned()
        .collect();
    let mut group_b = diff_size;
    group_b.extend(diff.new.iter().cloned());

    copy_group(driver, cfg, src_root, dst_root, back_dir, &same_size, "--ignore-times", log).await?;
    copy_group(driver, cfg, src_root, dst_root, back_dir, &group_b, "--size-only", log).await?;

    apply_renames(driver, dst_root, &diff.renamed, log).await?;
    move_deleted(driver, cfg, dst_root, back_dir, &diff.deleted, log).await?;

    Ok(())
}

/// Whether the destination backend supports empty directories, via `backend
/// features`. Used only when `cleanup_empty_dirs="auto"`.
async fn dst_supports_empty_dirs(driver: &SyncToolDriver, dst_root: &str, log: &Log) -> bool {
    let Ok(out) = driver
        .call(&["backend".to_string(), "features".to_string(), dst_root.to_string()], CallMode::Buffered, log)
        .await
    else {
        return false;
    };
    serde_json::from_str::<serde_json::Value>(&out.stdout)
        .ok()
        .and_then(|v| v.get("Features").and_then(|f| f.get("CanHaveEmptyDirectories")).and_then(|b| b.as_bool()))
        .unwrap_or(false)
}

fn dir_prefixes(map: &FileMap) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in map.keys() {
        let mut parts: Vec<&str> = path.split('/').collect();
        parts.pop();
        while !parts.is_empty() {
            dirs.insert(parts.join("/"));
            parts.pop();
        }
    }
    dirs
}

/// Remove directories emptied by this run, skipping any whose ancestor is
/// already queued for removal (§4.E Directory cleanup).
pub async fn cleanup_empty_dirs(
    driver: &SyncToolDriver,
    cfg: &Config,
    dst_root: &str,
    prev: &FileMap,
    curr: &FileMap,
    log: &Log,
) -> RirbResult<()> {
    let should = match cfg.cleanup_empty_dirs {
        CleanupEmptyDirs::False => false,
        CleanupEmptyDirs::True => true,
        CleanupEmptyDirs::Auto => dst_supports_empty_dirs(driver, dst_root, log).await,
    };
    if !should {
        return Ok(());
    }

    let prev_dirs = dir_prefixes(prev);
    let curr_dirs = dir_prefixes(curr);
    let mut candidates: Vec<String> = prev_dirs.difference(&curr_dirs).cloned().collect();
    candidates.sort();

    let mut queued: Vec<String> = Vec::new();
    for candidate in candidates.drain(..) {
        let has_queued_ancestor = queued.iter().any(|q| candidate.starts_with(&format!("{q}/")));
        if has_queued_ancestor {
            continue;
        }
        let argv = vec!["rmdirs".to_string(), format!("{dst_root}/{candidate}")];
        let _ = driver.call(&argv, CallMode::Buffered, log).await;
        queued.push(candidate);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size: u64) -> crate::model::FileEntry {
        crate::model::FileEntry { size, mod_time: None, hashes: None, extra: Default::default() }
    }

    #[test]
    fn dir_prefixes_collects_every_non_empty_ancestor() {
        let mut map = FileMap::new();
        map.insert("a/b/c.txt".to_string(), entry(1));
        let dirs = dir_prefixes(&map);
        assert!(dirs.contains("a"));
        assert!(dirs.contains("a/b"));
        assert!(!dirs.contains("a/b/c.txt"));
    }

    #[test]
    fn write_files_from_produces_one_path_per_line() {
        let file = write_files_from(&["a".to_string(), "b".to_string()]).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content, "a\nb\n");
    }
}
