//! Listing engine (component C): produce a [`FileMap`] for the source or
//! destination root via the sync tool's `lsjson`, honoring hash-reuse policy.

use crate::config::{Config, ReuseHashes};
use crate::driver::{CallMode, SyncToolDriver};
use crate::errors::RirbResult;
use crate::log::Log;
use crate::model::{entries_from_lsjson, FileMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Source,
    Destination,
}

/// Whether this listing pass needs hashes and/or modtimes, derived from the
/// configured comparison attributes and hash-reuse policy (§4.C).
pub struct ListingPlan {
    pub compute_hashes: bool,
    pub skip_modtime: bool,
}

impl ListingPlan {
    /// `dst_list` is whether destination-listing is in effect for this run; the
    /// source listing still needs `ModTime` when `dst_compare="mtime"` governs the
    /// eventual comparison, even though that attribute belongs to the destination
    /// side (§4.C).
    pub fn for_root(cfg: &Config, root: Root, dst_list: bool) -> Self {
        let compare = match root {
            Root::Source => cfg.compare,
            Root::Destination => cfg.dst_compare.unwrap_or(cfg.compare),
        };
        let needs_hash_for_compare = compare == crate::model::CompareAttr::Hash;
        let needs_hash_for_rename = cfg.renames == Some(crate::model::CompareAttr::Hash);
        let compute_hashes = cfg.get_hashes || needs_hash_for_compare || needs_hash_for_rename;

        let needs_mtime_for_compare = compare == crate::model::CompareAttr::Mtime;
        let needs_mtime_for_dst_list = dst_list && cfg.dst_compare == Some(crate::model::CompareAttr::Mtime);
        let needs_mtime_for_rename = cfg.renames == Some(crate::model::CompareAttr::Mtime);
        let needs_mtime_for_hash_reuse = compute_hashes && cfg.reuse_hashes == Some(ReuseHashes::Mtime);
        let skip_modtime = !(cfg.get_modtime
            || needs_mtime_for_compare
            || needs_mtime_for_dst_list
            || needs_mtime_for_rename
            || needs_mtime_for_hash_reuse);

        Self { compute_hashes, skip_modtime }
    }
}

/// List `path` via `lsjson`, returning the ingested [`FileMap`].
pub async fn list(
    driver: &SyncToolDriver,
    path: &str,
    plan: &ListingPlan,
    hash_type: &[String],
    log: &Log,
) -> RirbResult<FileMap> {
    let mut argv = vec!["lsjson".to_string(), "--recursive".to_string(), "--files-only".to_string()];
    if plan.compute_hashes {
        argv.push("--hash".to_string());
        for h in hash_type {
            argv.push("--hash-type".to_string());
            argv.push(h.clone());
        }
    }
    if plan.skip_modtime {
        argv.push("--no-modtime".to_string());
    }
    argv.push(path.to_string());

    let out = driver.call(&argv, CallMode::Buffered, log).await?;
    let raw: Vec<serde_json::Value> = serde_json::from_str(&out.stdout)?;
    Ok(entries_from_lsjson(raw))
}

/// Hash-reuse listing (§4.C): when `reuse_hashes` is set and a prior map exists,
/// list without hashes first, then re-list (hashed) only the subset whose
/// identity under `reuse_hashes` changed relative to the prior map.
pub async fn list_with_hash_reuse(
    driver: &SyncToolDriver,
    path: &str,
    cfg: &Config,
    prior: Option<&FileMap>,
    dst_list: bool,
    log: &Log,
) -> RirbResult<FileMap> {
    let plan = ListingPlan::for_root(cfg, Root::Source, dst_list);
    let Some(reuse) = cfg.reuse_hashes else {
        return list(driver, path, &plan, &cfg.hash_type, log).await;
    };
    let Some(prior) = prior else {
        return list(driver, path, &plan, &cfg.hash_type, log).await;
    };
    if !plan.compute_hashes {
        return list(driver, path, &plan, &cfg.hash_type, log).await;
    }

    let cheap_plan = ListingPlan { compute_hashes: false, skip_modtime: plan.skip_modtime };
    let mut current = list(driver, path, &cheap_plan, &cfg.hash_type, log).await?;

    let changed: Vec<String> = current
        .iter()
        .filter(|(p, entry)| match prior.get(*p) {
            None => true,
            Some(prior_entry) => !identity_matches(reuse, prior_entry, entry, cfg.dt),
        })
        .map(|(p, _)| p.clone())
        .collect();

    if changed.is_empty() {
        reuse_prior_hashes(&mut current, prior);
        return Ok(current);
    }

    log.debug(format!("hash reuse: re-listing {} of {} changed paths", changed.len(), current.len()));
    let rehashed_plan = ListingPlan { compute_hashes: true, skip_modtime: plan.skip_modtime };
    let rehashed = list(driver, path, &rehashed_plan, &cfg.hash_type, log).await?;

    reuse_prior_hashes(&mut current, prior);
    for path in &changed {
        if let Some(entry) = rehashed.get(path) {
            current.insert(path.clone(), entry.clone());
        }
    }
    Ok(current)
}

/// Whether `current` can keep `prior`'s hashes under the reuse policy. A prior
/// entry with no `Hashes` at all can never be reused from, regardless of how well
/// size/mtime match (matches the original's explicit skip of hash-less prior
/// entries, rclone.py's `if "Hashes" not in pfile: update_list.append(path)`).
fn identity_matches(
    reuse: ReuseHashes,
    prior: &crate::model::FileEntry,
    current: &crate::model::FileEntry,
    dt: f64,
) -> bool {
    if prior.hashes.is_none() {
        return false;
    }
    match reuse {
        ReuseHashes::Size => prior.size == current.size,
        ReuseHashes::Mtime => {
            prior.size == current.size
                && crate::pathutil::mtimes_close(prior.mod_time.as_deref(), current.mod_time.as_deref(), dt)
        }
        ReuseHashes::Off => false,
    }
}

fn reuse_prior_hashes(current: &mut FileMap, prior: &FileMap) {
    for (path, entry) in current.iter_mut() {
        if entry.hashes.is_some() {
            continue;
        }
        if let Some(prior_entry) = prior.get(path) {
            entry.hashes = prior_entry.hashes.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn entry(size: u64, mtime: &str, hash: Option<&str>) -> crate::model::FileEntry {
        let mut hashes = None;
        if let Some(h) = hash {
            let mut m = Map::new();
            m.insert("sha1".to_string(), h.to_string());
            hashes = Some(m);
        }
        crate::model::FileEntry { size, mod_time: Some(mtime.to_string()), hashes, extra: Map::new() }
    }

    #[test]
    fn identity_matches_by_size_only() {
        let a = entry(10, "t1", Some("deadbeef"));
        let b = entry(10, "t2", None);
        assert!(identity_matches(ReuseHashes::Size, &a, &b, 1.1));
    }

    #[test]
    fn identity_mismatches_by_mtime_when_size_equal() {
        let a = entry(10, "2024-01-01T000000.000000+0000", Some("deadbeef"));
        let b = entry(10, "2024-01-01T010000.000000+0000", None);
        assert!(!identity_matches(ReuseHashes::Mtime, &a, &b, 1.1));
    }

    #[test]
    fn identity_never_matches_when_prior_entry_has_no_hashes() {
        let a = entry(10, "t1", None);
        let b = entry(10, "t1", None);
        assert!(!identity_matches(ReuseHashes::Size, &a, &b, 1.1));
    }

    #[test]
    fn reuse_prior_hashes_fills_in_missing_hashes() {
        let mut current = FileMap::new();
        current.insert("a".to_string(), entry(1, "t", None));
        let mut prior = FileMap::new();
        prior.insert("a".to_string(), entry(1, "t", Some("deadbeef")));
        reuse_prior_hashes(&mut current, &prior);
        assert!(current["a"].hashes.is_some());
    }
}
