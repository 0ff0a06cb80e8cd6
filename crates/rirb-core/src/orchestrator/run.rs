//! Orchestrator (component H): sequences §4.A-G into one run and produces a
//! [`RunSummary`]. Follows the data flow in §2:
//! `G.init -> F.pull_prev -> (C.list_src || C.list_dst) -> D.diff -> D.renames ->
//! F.upload_pre -> E.transfer/rename/delete -> F.upload_curr -> F.unprefix ->
//! E.rmdirs -> G.finalize`.

use std::time::Instant;

use crate::config::Config;
use crate::diff;
use crate::driver::SyncToolDriver;
use crate::errors::RirbResult;
use crate::listing::{self, ListingPlan};
use crate::log::Log;
use crate::manifest::{self, BackedUpFiles};
use crate::model::{DiffSet, FileMap};
use crate::pathutil::now_timestamp;
use crate::sentinel::Sentinel;

use super::options::RunOptions;
use super::summary::RunSummary;

pub struct Orchestrator<'a> {
    cfg: &'a Config,
    driver: SyncToolDriver,
    log: &'a Log,
    cache_dir: std::path::PathBuf,
}

impl<'a> Orchestrator<'a> {
    pub fn new(cfg: &'a Config, driver: SyncToolDriver, log: &'a Log, cache_dir: std::path::PathBuf) -> Self {
        Self { cfg, driver, log, cache_dir }
    }

    pub async fn run(&self, mut opts: RunOptions) -> RirbResult<RunSummary> {
        let t0 = Instant::now();
        let now = now_timestamp();

        let sentinel = Sentinel::for_uuid(&self.cache_dir, &self.cfg.uuid);
        let prior_run_unfinished = sentinel.create_exclusive()?;
        if prior_run_unfinished {
            if self.cfg.automatic_dst_list || opts.dst_list {
                self.log.log("prior run did not finish; moving to --dst-list mode");
                opts.dst_list = true;
            } else {
                self.log.log("WARNING: prior run did not finish and automatic_dst_list is disabled");
            }
        }
        if opts.init {
            opts.dst_list = true;
        }

        let result = self.run_body(&now, &opts).await;

        match &result {
            Ok(_) => sentinel.remove()?,
            Err(e) => self.log.log(format!("ERROR Occured. See logs for detail: {e}")),
        }

        let elapsed = t0.elapsed();
        result.map(|mut summary| {
            summary.duration = elapsed;
            summary.timestamp = now;
            summary.dry_run = opts.dry_run;
            summary.dst_list = opts.dst_list;
            summary
        })
    }

    async fn run_body(&self, now: &str, opts: &RunOptions) -> RirbResult<RunSummary> {
        let prior = manifest::pull_previous(&self.driver, self.cfg, &self.cache_dir, opts.init, self.log).await;
        let prior = match prior {
            Ok(p) => p,
            Err(e) if opts.init => {
                self.log.debug(format!("no previous manifest, proceeding with --init ({e})"));
                FileMap::new()
            }
            Err(e) => return Err(e),
        };

        let src_root = self.cfg.resolve_path(&self.cfg.src);
        let dst_curr = format!("{}/curr", self.cfg.dst);
        let back_dir = format!("{}/back/{now}", self.cfg.dst);
        let logs_dir = format!("{}/logs/{now}", self.cfg.dst);

        let dst_list_enabled = opts.dst_list || opts.init;
        let (src_result, dst_result) = tokio::join!(
            listing::list_with_hash_reuse(&self.driver, &src_root, self.cfg, Some(&prior), dst_list_enabled, self.log),
            self.list_destination(&dst_curr, dst_list_enabled, opts.init),
        );
        let curr = src_result?;
        let dst_prev = dst_result?;

        let using_dst_list = dst_prev.is_some();
        let effective_prior = dst_prev.unwrap_or_else(|| prior.clone());
        let compare = if using_dst_list { self.cfg.dst_compare.unwrap_or(self.cfg.compare) } else { self.cfg.compare };
        let renames = if using_dst_list { None } else { self.cfg.renames };
        let diff = diff::compute_diff(&effective_prior, &curr, compare, renames, self.cfg, self.log)?;
        let renamed_count = diff.renamed.len();

        let backed_up = BackedUpFiles::from_diff(&effective_prior, &diff);

        if !opts.dry_run {
            manifest::upload_pre_manifests(&self.driver, self.cfg, &logs_dir, &diff, &backed_up, self.log).await?;

            crate::transfer::execute(
                &self.driver,
                self.cfg,
                &src_root,
                &dst_curr,
                &back_dir,
                &effective_prior,
                &curr,
                &diff,
                self.log,
            )
            .await?;

            manifest::upload_curr(&self.driver, self.cfg, &logs_dir, &self.cache_dir, &curr, self.log).await?;
            manifest::unprefix_manifests(&self.driver, self.cfg, &logs_dir, !backed_up.is_empty(), self.log).await?;
            manifest::upload_log(&self.driver, self.cfg, &logs_dir, self.log).await?;
            crate::transfer::cleanup_empty_dirs(&self.driver, self.cfg, &dst_curr, &effective_prior, &curr, self.log).await?;
        } else {
            self.log.log("dry run: no sync-tool mutations issued");
        }

        Ok(self.summarize(&diff, &curr, renamed_count))
    }

    async fn list_destination(&self, dst_curr: &str, enabled: bool, init: bool) -> RirbResult<Option<FileMap>> {
        if !enabled {
            return Ok(None);
        }
        let dst_compare = self.cfg.dst_compare.unwrap_or(self.cfg.compare);
        let plan = ListingPlan {
            compute_hashes: dst_compare == crate::model::CompareAttr::Hash,
            skip_modtime: dst_compare != crate::model::CompareAttr::Mtime,
        };
        match listing::list(&self.driver, dst_curr, &plan, &self.cfg.hash_type, self.log).await {
            Ok(map) => Ok(Some(map)),
            Err(_) if init => Ok(Some(FileMap::new())),
            Err(e) => Err(e),
        }
    }

    fn summarize(&self, diff: &DiffSet, curr: &FileMap, renamed_count: usize) -> RunSummary {
        let bytes: u64 = diff
            .new
            .iter()
            .chain(diff.modified.iter())
            .filter_map(|p| curr.get(p))
            .map(|e| e.size)
            .sum();
        RunSummary {
            new_files: diff.new.len(),
            modified_files: diff.modified.len(),
            deleted_files: diff.deleted.len(),
            renamed_files: renamed_count,
            bytes_transferred: bytes,
            dry_run: false,
            dst_list: false,
            duration: std::time::Duration::default(),
            rclone_time: std::time::Duration::from_millis(self.driver.rclonetime_ms()),
            timestamp: String::new(),
        }
    }
}
