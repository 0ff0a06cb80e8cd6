//! Differential engine (component D): prior vs. current file maps to a [`DiffSet`].
//!
//! Renames are extracted from the `new`/`deleted` sets by bucketing *the source
//! prior map* by size (not the current map) — a deliberate asymmetry resolved in
//! the design notes: the prior map is what we have stable identity for.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::errors::{RirbError, RirbResult};
use crate::log::Log;
use crate::model::{CompareAttr, DiffSet, FileEntry, FileMap};
use crate::pathutil::mtimes_close;

/// Compare two entries under `attr`, returning `true` when they are "the same".
pub fn file_compare(attr: CompareAttr, prior: &FileEntry, current: &FileEntry, dt: f64) -> bool {
    match attr {
        CompareAttr::Size => prior.size == current.size,
        CompareAttr::Mtime => prior.size == current.size && mtimes_close(prior.mod_time.as_deref(), current.mod_time.as_deref(), dt),
        CompareAttr::Hash => hash_equal(prior, current),
    }
}

/// `true` if the two entries share at least one hash algorithm and all shared
/// algorithms agree; returns an explicit no-common-hash signal via `Result`
/// elsewhere (this helper is used only once a common algorithm is confirmed).
fn hash_equal(prior: &FileEntry, current: &FileEntry) -> bool {
    let (Some(p), Some(c)) = (&prior.hashes, &current.hashes) else {
        return false;
    };
    let mut any_common = false;
    for (algo, p_value) in p {
        if let Some(c_value) = c.get(algo) {
            any_common = true;
            if p_value != c_value {
                return false;
            }
        }
    }
    any_common
}

pub fn common_hash_algorithms(prior: &FileEntry, current: &FileEntry) -> Vec<String> {
    let (Some(p), Some(c)) = (&prior.hashes, &current.hashes) else {
        return Vec::new();
    };
    p.keys().filter(|k| c.contains_key(*k)).cloned().collect()
}

/// Compute `new` / `modified` / `deleted`, then extract `renamed` pairs (§4.D).
/// `compare` is the effective comparison attribute (`dst_compare` when listing the
/// destination, else `compare`); `renames` must already be `None` when listing the
/// destination, since rename extraction only runs against the source prior map.
///
/// Raises [`RirbError::NoCommonHash`] when `compare="hash"` and a path's prior and
/// current entries share no hash algorithm at all (spec.md's "must be non-empty;
/// otherwise raise no-common-hash").
pub fn compute_diff(
    prior: &FileMap,
    current: &FileMap,
    compare: CompareAttr,
    renames: Option<CompareAttr>,
    cfg: &Config,
    log: &Log,
) -> RirbResult<DiffSet> {
    let mut new = Vec::new();
    let mut modified = Vec::new();
    let mut deleted = Vec::new();

    for (path, current_entry) in current {
        match prior.get(path) {
            None => new.push(path.clone()),
            Some(prior_entry) => {
                if compare == CompareAttr::Hash && common_hash_algorithms(prior_entry, current_entry).is_empty() {
                    return Err(RirbError::NoCommonHash {
                        path: path.clone(),
                        prior_algos: prior_entry.hashes.as_ref().map(|h| h.keys().cloned().collect()).unwrap_or_default(),
                        current_algos: current_entry.hashes.as_ref().map(|h| h.keys().cloned().collect()).unwrap_or_default(),
                    });
                } else if !file_compare(compare, prior_entry, current_entry, cfg.dt) {
                    modified.push(path.clone());
                }
            }
        }
    }
    for path in prior.keys() {
        if !current.contains_key(path) {
            deleted.push(path.clone());
        }
    }

    let renamed = match renames {
        None => Vec::new(),
        Some(attr) => extract_renames(prior, current, &mut new, &mut deleted, attr, cfg.dt, log),
    };

    Ok(DiffSet { new, modified, deleted, renamed })
}

/// Bucket the deleted paths' *prior* entries by size, then for each new path try
/// to find a unique same-size match among the deleted bucket under `attr`. When a
/// bucket has more than one plausible match, log an ambiguity and skip renaming
/// those paths (they stay as new+deleted) rather than guess.
pub fn extract_renames(
    prior: &FileMap,
    current: &FileMap,
    new: &mut Vec<String>,
    deleted: &mut Vec<String>,
    attr: CompareAttr,
    dt: f64,
    log: &Log,
) -> Vec<(String, String)> {
    let mut by_size: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for path in deleted.iter() {
        if let Some(entry) = prior.get(path) {
            by_size.entry(entry.size).or_default().push(path.clone());
        }
    }

    let mut renamed = Vec::new();
    let mut matched_deleted = std::collections::BTreeSet::new();
    let mut matched_new = std::collections::BTreeSet::new();

    for new_path in new.iter() {
        let Some(new_entry) = current.get(new_path) else { continue };
        let Some(candidates) = by_size.get(&new_entry.size) else { continue };
        let unmatched: Vec<&String> = candidates.iter().filter(|c| !matched_deleted.contains(*c)).collect();
        if unmatched.is_empty() {
            continue;
        }

        let matches: Vec<&String> = unmatched
            .into_iter()
            .filter(|old_path| {
                let old_entry = prior.get(*old_path).expect("bucketed from prior");
                file_compare(attr, old_entry, new_entry, dt)
            })
            .collect();

        match matches.as_slice() {
            [] => {}
            [single] => {
                renamed.push(((*single).clone(), new_path.clone()));
                matched_deleted.insert((*single).clone());
                matched_new.insert(new_path.clone());
            }
            many => {
                log.log(format!(
                    "too many rename candidates for '{new_path}' (size {}): {many:?}; leaving as new+deleted",
                    new_entry.size
                ));
            }
        }
    }

    new.retain(|p| !matched_new.contains(p));
    deleted.retain(|p| !matched_deleted.contains(p));
    renamed
}
