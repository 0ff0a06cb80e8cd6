//! Manifest I/O (component F): pulling the previous `curr.json.gz` and uploading
//! the current run's manifests, in the order the recovery contract depends on
//! (see §5's ordering guarantees in the design notes).

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde::Serialize;

use crate::config::Config;
use crate::driver::{CallMode, SyncToolDriver};
use crate::errors::{RirbError, RirbResult};
use crate::log::Log;
use crate::model::{BackedUpEntry, BackupStatus, FileMap};

const CURR_NAME: &str = "curr.json.gz";
const DIFFS_NAME: &str = "diffs.json.gz";
const BACKED_UP_NAME: &str = "backed_up_files.json.gz";
const INCOMPLETE_PREFIX: &str = "INCOMPLETE_BACKUP_";

fn gzip_encode<T: serde::Serialize>(value: &T) -> RirbResult<Vec<u8>> {
    let mut json = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut json, formatter);
    value.serialize(&mut ser)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    std::io::Write::write_all(&mut encoder, &json)?;
    Ok(encoder.finish()?)
}

fn gzip_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> RirbResult<T> {
    let mut decoder = GzDecoder::new(bytes);
    let mut json = Vec::new();
    std::io::Read::read_to_end(&mut decoder, &mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

fn local_cache_path(cache_dir: &Path, uuid: &str) -> PathBuf {
    cache_dir.join("rirb").join(format!("{uuid}.json.gz"))
}

/// Pull the previous `curr` file map. `--init` short-circuits to an empty map.
/// Otherwise: local cache first, then the most recent `<dst>/logs/<ts>/` entry.
pub async fn pull_previous(
    driver: &SyncToolDriver,
    cfg: &Config,
    cache_dir: &Path,
    init: bool,
    log: &Log,
) -> RirbResult<FileMap> {
    if init {
        return Ok(FileMap::new());
    }

    let cache_path = local_cache_path(cache_dir, &cfg.uuid);
    if cfg.use_local_cache {
        if let Ok(bytes) = std::fs::read(&cache_path) {
            log.debug(format!("using cached previous manifest at {}", cache_path.display()));
            return gzip_decode(&bytes);
        }
    }

    let logs_root = format!("{}/logs", cfg.dst);
    let listing = driver
        .call(
            &["lsjson".to_string(), "--dirs-only".to_string(), logs_root.clone()],
            CallMode::Buffered,
            log,
        )
        .await;

    let entries: Vec<serde_json::Value> = match listing {
        Ok(out) => serde_json::from_str(&out.stdout).unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let timestamp_re = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{6}\.\d{6}[+-]\d{4}$").expect("valid regex");
    let mut names: Vec<String> = entries
        .iter()
        .filter_map(|v| v.get("Name").and_then(|n| n.as_str()))
        .filter(|n| timestamp_re.is_match(n))
        .map(str::to_string)
        .collect();
    names.sort();

    let Some(latest) = names.last() else {
        return Err(RirbError::NoPreviousList {
            reason: format!("no timestamped directories found under {logs_root}"),
        });
    };

    let remote_path = format!("{logs_root}/{latest}/{CURR_NAME}");
    let tmp = tempfile::NamedTempFile::new()?;
    let tmp_path = tmp.path().to_path_buf();
    let copy = driver
        .call(
            &[
                "copyto".to_string(),
                "--retries".to_string(),
                "1".to_string(),
                remote_path.clone(),
                tmp_path.to_string_lossy().into_owned(),
            ],
            CallMode::Buffered,
            log,
        )
        .await;

    if copy.is_err() {
        return Err(RirbError::NoPreviousList {
            reason: format!("could not fetch {remote_path}; re-run with --init for a first backup"),
        });
    }

    let bytes = std::fs::read(&tmp_path)?;
    gzip_decode(&bytes)
}

pub struct BackedUpFiles(pub std::collections::BTreeMap<String, BackedUpEntry>);

impl BackedUpFiles {
    pub fn from_diff(prior: &FileMap, diff: &crate::model::DiffSet) -> Self {
        let mut map = std::collections::BTreeMap::new();
        for path in &diff.modified {
            if let Some(entry) = prior.get(path) {
                map.insert(path.clone(), BackedUpEntry { entry: entry.clone(), status: BackupStatus::Modified });
            }
        }
        for path in &diff.deleted {
            if let Some(entry) = prior.get(path) {
                map.insert(path.clone(), BackedUpEntry { entry: entry.clone(), status: BackupStatus::Deleted });
            }
        }
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

async fn upload_manifest<T: serde::Serialize>(
    driver: &SyncToolDriver,
    value: &T,
    remote_dir: &str,
    filename: &str,
    log: &Log,
) -> RirbResult<()> {
    let bytes = gzip_encode(value)?;
    let tmp = tempfile::NamedTempFile::new()?;
    std::fs::write(tmp.path(), &bytes)?;
    driver
        .call(
            &[
                "copyto".to_string(),
                tmp.path().to_string_lossy().into_owned(),
                format!("{remote_dir}/{filename}"),
            ],
            CallMode::Buffered,
            log,
        )
        .await?;
    Ok(())
}

/// Step 1 of §4.F's ordered upload: push `diffs` (and `backed_up_files`, if
/// non-empty) before any transfer happens, optionally under the fail-safe prefix.
pub async fn upload_pre_manifests(
    driver: &SyncToolDriver,
    cfg: &Config,
    remote_dir: &str,
    diff: &crate::model::DiffSet,
    backed_up: &BackedUpFiles,
    log: &Log,
) -> RirbResult<()> {
    let diffs_name = prefixed(cfg, DIFFS_NAME);
    upload_manifest(driver, diff, remote_dir, &diffs_name, log).await?;

    if !backed_up.is_empty() {
        let backed_up_name = prefixed(cfg, BACKED_UP_NAME);
        upload_manifest(driver, &backed_up.0, remote_dir, &backed_up_name, log).await?;
    }
    Ok(())
}

fn prefixed(cfg: &Config, name: &str) -> String {
    if cfg.prefix_incomplete_backups {
        format!("{INCOMPLETE_PREFIX}{name}")
    } else {
        name.to_string()
    }
}

/// Step 3 of §4.F: upload `curr.json.gz` after transfer succeeds, and mirror it
/// to the local cache when enabled.
pub async fn upload_curr(
    driver: &SyncToolDriver,
    cfg: &Config,
    remote_dir: &str,
    cache_dir: &Path,
    curr: &FileMap,
    log: &Log,
) -> RirbResult<()> {
    upload_manifest(driver, curr, remote_dir, CURR_NAME, log).await?;
    if cfg.use_local_cache {
        let path = local_cache_path(cache_dir, &cfg.uuid);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, gzip_encode(curr)?)?;
    }
    Ok(())
}

/// Step 4 of §4.F: rename the prefixed pre-manifests to their final names, once
/// the transfer has completed without error.
pub async fn unprefix_manifests(
    driver: &SyncToolDriver,
    cfg: &Config,
    remote_dir: &str,
    backed_up_present: bool,
    log: &Log,
) -> RirbResult<()> {
    if !cfg.prefix_incomplete_backups {
        return Ok(());
    }
    moveto(driver, &format!("{remote_dir}/{INCOMPLETE_PREFIX}{DIFFS_NAME}"), &format!("{remote_dir}/{DIFFS_NAME}"), log).await?;
    if backed_up_present {
        moveto(
            driver,
            &format!("{remote_dir}/{INCOMPLETE_PREFIX}{BACKED_UP_NAME}"),
            &format!("{remote_dir}/{BACKED_UP_NAME}"),
            log,
        )
        .await?;
    }
    Ok(())
}

/// Step 5 of §4.F's ordered upload: copy the run's log file to `<dst>/logs/<ts>/log.log`
/// and to each configured `log_dest` (spec.md's "any additional configured destinations").
pub async fn upload_log(driver: &SyncToolDriver, cfg: &Config, remote_dir: &str, log: &Log) -> RirbResult<()> {
    let primary = log.primary_log_path();
    copyto(driver, &primary.to_string_lossy(), &format!("{remote_dir}/log.log"), log).await?;
    for dest in &cfg.log_dest {
        copyto(driver, &primary.to_string_lossy(), dest, log).await?;
    }
    Ok(())
}

async fn copyto(driver: &SyncToolDriver, from: &str, to: &str, log: &Log) -> RirbResult<()> {
    driver
        .call(&["copyto".to_string(), from.to_string(), to.to_string()], CallMode::Buffered, log)
        .await?;
    Ok(())
}

async fn moveto(driver: &SyncToolDriver, from: &str, to: &str, log: &Log) -> RirbResult<()> {
    driver
        .call(&["moveto".to_string(), from.to_string(), to.to_string()], CallMode::Buffered, log)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trips_a_file_map() {
        let mut map = FileMap::new();
        map.insert(
            "a.txt".to_string(),
            crate::model::FileEntry { size: 10, mod_time: None, hashes: None, extra: Default::default() },
        );
        let bytes = gzip_encode(&map).unwrap();
        let decoded: FileMap = gzip_decode(&bytes).unwrap();
        assert_eq!(decoded.get("a.txt").unwrap().size, 10);
    }

    #[test]
    fn backed_up_files_tags_modified_and_deleted() {
        let mut prior = FileMap::new();
        prior.insert("m.txt".to_string(), crate::model::FileEntry { size: 1, mod_time: None, hashes: None, extra: Default::default() });
        prior.insert("d.txt".to_string(), crate::model::FileEntry { size: 2, mod_time: None, hashes: None, extra: Default::default() });

        let diff = crate::model::DiffSet {
            new: vec![],
            modified: vec!["m.txt".to_string()],
            deleted: vec!["d.txt".to_string()],
            renamed: vec![],
        };
        let backed_up = BackedUpFiles::from_diff(&prior, &diff);
        assert_eq!(backed_up.0.get("m.txt").unwrap().status, BackupStatus::Modified);
        assert_eq!(backed_up.0.get("d.txt").unwrap().status, BackupStatus::Deleted);
    }

    #[test]
    fn prefixed_name_applies_only_when_configured() {
        let mut file = crate::config::RawConfig::default();
        file.src = Some("/s".into());
        file.dst = Some("r:d".into());
        file.uuid = Some("u".into());
        file.prefix_incomplete_backups = Some(false);
        let cfg = Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap();
        assert_eq!(prefixed(&cfg, DIFFS_NAME), DIFFS_NAME);
    }
}
