//! Config file loading and template writing (component L, CLI half). Reads the
//! TOML text from disk and hands it to `rirb_core::config::RawConfig`; writing a
//! fresh template is the `--new` flag's entire job.

use std::path::Path;

use eyre::{eyre, Result};
use rirb_core::config::RawConfig;

const TEMPLATE: &str = r#"# rirb configuration.
# src/dst accept a local path or a "remote:path" sync-tool root.
src = "/path/to/source"
dst = "myremote:backups"

# filter_flags = ["--exclude", "*.tmp"]
# rclone_flags = []
# rclone_env = { RCLONE_CONFIG_PASS = "..." }

compare = "mtime"
# dst_compare = "mtime"
# renames = "size"
dt = 1.1
get_modtime = true
reuse_hashes = "mtime"
# hash_type = ["sha1"]
get_hashes = false

cleanup_empty_dirs = "auto"
use_local_cache = true
rclone_exe = "rclone"
metadata = true

# log_dest = ["/var/log/rirb"]
# pre_shell = ""
# post_shell = ""
stop_on_shell_error = false

# dst_list_rclone_flags = []
automatic_dst_list = true
prefix_incomplete_backups = true

_uuid = "{{uuid}}"
"#;

pub fn write_template(path: &Path, uuid: &str) -> Result<()> {
    if path.exists() {
        return Err(eyre!("refusing to overwrite existing config at {}", path.display()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, TEMPLATE.replace("{{uuid}}", uuid))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<RawConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| eyre!("reading config {}: {e}", path.display()))?;
    RawConfig::from_toml(&text).map_err(|e| eyre!("{e}"))
}

pub fn parse_overrides(exprs: &[String]) -> Result<Vec<RawConfig>> {
    exprs
        .iter()
        .map(|e| RawConfig::parse_override(e).map_err(|err| eyre!("{err}")))
        .collect()
}
