use std::time::Duration;

/// Aggregated counts and timing for a single run, substituted into `post_shell`
/// and printed at the end of the run (§4.H, §6).
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub new_files: usize,
    pub modified_files: usize,
    pub deleted_files: usize,
    pub renamed_files: usize,
    pub bytes_transferred: u64,
    pub dry_run: bool,
    pub dst_list: bool,
    pub duration: Duration,
    pub rclone_time: Duration,
    pub timestamp: String,
}

impl RunSummary {
    pub fn total_changes(&self) -> usize {
        self.new_files + self.modified_files + self.deleted_files + self.renamed_files
    }
}
