//! Declarative configuration (component L, core half). Defaults mirror the
//! reference implementation's `config_example.py` exactly; the file format is TOML
//! instead of eval'd Python (§9's "config file as executable source text" note).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{RirbError, RirbResult};
use crate::model::CompareAttr;

static CACHE_DIR_OVERRIDE: Lazy<RwLock<Option<PathBuf>>> = Lazy::new(|| RwLock::new(None));

/// Override the cache directory for the current process (primarily for tests and
/// `--cache-dir`-style CLI overrides).
pub fn set_cache_dir_override<P: AsRef<Path>>(path: P) {
    *CACHE_DIR_OVERRIDE.write() = Some(path.as_ref().to_path_buf());
}

pub fn clear_cache_dir_override() {
    CACHE_DIR_OVERRIDE.write().take();
}

/// Resolve the directory that holds the local prior-list cache and the sentinel.
/// Priority: explicit override -> platform cache dir -> `~/.cache/rirb`.
pub fn cache_dir() -> RirbResult<PathBuf> {
    if let Some(path) = CACHE_DIR_OVERRIDE.read().clone() {
        return Ok(path);
    }
    if let Some(proj) = ProjectDirs::from("com", "rirb", "rirb") {
        return Ok(proj.cache_dir().to_path_buf());
    }
    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".cache").join("rirb"));
    }
    Err(RirbError::Config(
        "unable to determine a cache directory (no override and no platform default)".into(),
    ))
}

/// Sync-tool flags that control filtering; these must live in `filter_flags`, never
/// in `rclone_flags` (§6).
pub const FILTER_FLAGS: &[&str] = &[
    "--include",
    "--exclude",
    "--include-from",
    "--exclude-from",
    "--filter",
    "--filter-from",
    "--files-from",
    "--one-file-system",
    "--exclude-if-present",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupEmptyDirs {
    True,
    False,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseHashes {
    Size,
    Mtime,
    Off,
}

/// The key used to redact a sync-tool config password from every log line and
/// `Debug` rendering (§6, §8 scenario 6).
pub const REDACTED_ENV_KEY: &str = "RCLONE_CONFIG_PASS";
const REDACTED_PLACEHOLDER: &str = "**REDACTED**";

/// Fully validated run configuration. Constructed via [`Config::from_raw`], never
/// deserialized directly, so that defaults and validation always apply together.
#[derive(Clone)]
pub struct Config {
    pub src: String,
    pub dst: String,
    pub filter_flags: Vec<String>,
    pub rclone_flags: Vec<String>,
    pub rclone_env: BTreeMap<String, String>,
    pub compare: CompareAttr,
    pub dst_compare: Option<CompareAttr>,
    pub renames: Option<CompareAttr>,
    pub dt: f64,
    pub get_modtime: bool,
    pub reuse_hashes: Option<ReuseHashes>,
    pub hash_type: Vec<String>,
    pub get_hashes: bool,
    pub cleanup_empty_dirs: CleanupEmptyDirs,
    pub use_local_cache: bool,
    pub rclone_exe: String,
    pub metadata: bool,
    pub log_dest: Vec<String>,
    pub pre_shell: String,
    pub post_shell: String,
    pub stop_on_shell_error: bool,
    pub dst_list_rclone_flags: Vec<String>,
    pub automatic_dst_list: bool,
    pub prefix_incomplete_backups: bool,
    pub uuid: String,
    pub version: String,
    /// Directory the config file lives in; every relative path above is resolved
    /// against it (§4.L).
    pub config_dir: PathBuf,
}

/// The serde-visible shape of the TOML file. Every field is optional so the file can
/// specify only what differs from [`RawConfig::default`]'s values (which mirror the
/// reference implementation's defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub filter_flags: Option<Vec<String>>,
    pub rclone_flags: Option<Vec<String>>,
    pub rclone_env: Option<BTreeMap<String, String>>,
    pub compare: Option<String>,
    pub dst_compare: Option<String>,
    pub renames: Option<RawRenames>,
    pub dt: Option<f64>,
    pub get_modtime: Option<bool>,
    pub reuse_hashes: Option<RawReuseHashes>,
    pub hash_type: Option<Vec<String>>,
    pub get_hashes: Option<bool>,
    pub cleanup_empty_dirs: Option<RawCleanup>,
    pub use_local_cache: Option<bool>,
    pub rclone_exe: Option<String>,
    pub metadata: Option<bool>,
    pub log_dest: Option<Vec<String>>,
    pub pre_shell: Option<String>,
    pub post_shell: Option<String>,
    pub stop_on_shell_error: Option<bool>,
    pub dst_list_rclone_flags: Option<Vec<String>>,
    pub automatic_dst_list: Option<bool>,
    pub prefix_incomplete_backups: Option<bool>,
    #[serde(rename = "_uuid")]
    pub uuid: Option<String>,
    #[serde(rename = "_version")]
    pub version: Option<String>,
}

/// `renames` accepts `false`, a bare string (`"size"`/`"mtime"`/`"hash"`), matching
/// the reference's `{size, mtime, hash, false, null}` domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRenames {
    Disabled(bool),
    Attr(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawReuseHashes {
    Disabled(bool),
    Kind(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawCleanup {
    Bool(bool),
    Auto(String),
}

impl RawConfig {
    pub fn from_toml(text: &str) -> RirbResult<Self> {
        toml::from_str(text).map_err(|e| RirbError::Config(format!("invalid config file: {e}")))
    }

    /// Merge `other` on top of `self`: any field `other` sets wins. Used to apply
    /// `--override` key/value pairs, once before the file body and once after
    /// (§4.L / §9), by folding the same override map into the merge twice.
    pub fn merge(mut self, other: &RawConfig) -> Self {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field.clone();
                }
            };
        }
        take!(src);
        take!(dst);
        take!(filter_flags);
        take!(rclone_flags);
        take!(rclone_env);
        take!(compare);
        take!(dst_compare);
        take!(renames);
        take!(dt);
        take!(get_modtime);
        take!(reuse_hashes);
        take!(hash_type);
        take!(get_hashes);
        take!(cleanup_empty_dirs);
        take!(use_local_cache);
        take!(rclone_exe);
        take!(metadata);
        take!(log_dest);
        take!(pre_shell);
        take!(post_shell);
        take!(stop_on_shell_error);
        take!(dst_list_rclone_flags);
        take!(automatic_dst_list);
        take!(prefix_incomplete_backups);
        take!(uuid);
        take!(version);
        self
    }

    /// Parse a single `KEY = VALUE` override expression (the right-hand side is a
    /// TOML value fragment, e.g. `compare = "hash"` or `get_hashes = true`).
    pub fn parse_override(expr: &str) -> RirbResult<RawConfig> {
        let wrapped = expr.trim();
        if wrapped.is_empty() {
            return Ok(RawConfig::default());
        }
        toml::from_str(wrapped)
            .map_err(|e| RirbError::Config(format!("invalid --override '{expr}': {e}")))
    }
}

impl Config {
    pub const MUST_SPECIFY: &'static str = "<<MUST SPECIFY>>";

    /// Build a validated [`Config`] from a parsed file, applying `overrides` both
    /// before and after the file body per §4.L / §9.
    pub fn from_raw(
        file: RawConfig,
        overrides: &[RawConfig],
        config_dir: PathBuf,
        uuid_for_new: Option<String>,
        version: &str,
    ) -> RirbResult<Self> {
        let mut merged = RawConfig {
            src: Some(Self::MUST_SPECIFY.to_string()),
            dst: Some(Self::MUST_SPECIFY.to_string()),
            compare: Some("mtime".to_string()),
            dt: Some(1.1),
            get_modtime: Some(true),
            reuse_hashes: Some(RawReuseHashes::Kind("mtime".to_string())),
            get_hashes: Some(false),
            cleanup_empty_dirs: Some(RawCleanup::Auto("auto".to_string())),
            use_local_cache: Some(true),
            rclone_exe: Some("rclone".to_string()),
            metadata: Some(true),
            stop_on_shell_error: Some(false),
            automatic_dst_list: Some(true),
            prefix_incomplete_backups: Some(true),
            ..RawConfig::default()
        };

        for o in overrides {
            merged = merged.merge(o);
        }
        merged = merged.merge(&file);
        for o in overrides {
            merged = merged.merge(o);
        }

        let compare = merged
            .compare
            .as_deref()
            .and_then(CompareAttr::parse)
            .ok_or_else(|| RirbError::Config("'compare' must be one of size, mtime, hash".into()))?;

        let dst_compare = match merged.dst_compare.as_deref() {
            None => None,
            Some(s) => Some(
                CompareAttr::parse(s)
                    .ok_or_else(|| RirbError::Config(format!("'dst_compare' invalid value '{s}'")))?,
            ),
        };

        let renames = match merged.renames {
            None => None,
            Some(RawRenames::Disabled(false)) => None,
            Some(RawRenames::Disabled(true)) => {
                return Err(RirbError::Config("'renames' cannot be 'true'".into()))
            }
            Some(RawRenames::Attr(s)) => Some(
                CompareAttr::parse(&s)
                    .ok_or_else(|| RirbError::Config(format!("'renames' invalid value '{s}'")))?,
            ),
        };

        let reuse_hashes = match merged.reuse_hashes {
            None => None,
            Some(RawReuseHashes::Disabled(false)) => None,
            Some(RawReuseHashes::Disabled(true)) => {
                return Err(RirbError::Config("'reuse_hashes' cannot be 'true'".into()))
            }
            Some(RawReuseHashes::Kind(s)) => Some(match s.as_str() {
                "size" => ReuseHashes::Size,
                "mtime" => ReuseHashes::Mtime,
                other => return Err(RirbError::Config(format!("'reuse_hashes' invalid value '{other}'"))),
            }),
        };

        let cleanup_empty_dirs = match merged.cleanup_empty_dirs {
            Some(RawCleanup::Bool(true)) => CleanupEmptyDirs::True,
            Some(RawCleanup::Bool(false)) => CleanupEmptyDirs::False,
            Some(RawCleanup::Auto(ref s)) if s == "auto" => CleanupEmptyDirs::Auto,
            Some(RawCleanup::Auto(ref other)) => {
                return Err(RirbError::Config(format!(
                    "'cleanup_empty_dirs' invalid value '{other}'"
                )))
            }
            None => CleanupEmptyDirs::Auto,
        };

        let uuid = merged
            .uuid
            .or(uuid_for_new)
            .ok_or_else(|| RirbError::Config("config is missing '_uuid'".into()))?;

        let config = Config {
            src: merged.src.unwrap_or_else(|| Self::MUST_SPECIFY.to_string()),
            dst: merged.dst.unwrap_or_else(|| Self::MUST_SPECIFY.to_string()),
            filter_flags: merged.filter_flags.unwrap_or_default(),
            rclone_flags: merged.rclone_flags.unwrap_or_default(),
            rclone_env: merged.rclone_env.unwrap_or_default(),
            compare,
            dst_compare,
            renames,
            dt: merged.dt.unwrap_or(1.1),
            get_modtime: merged.get_modtime.unwrap_or(true),
            reuse_hashes,
            hash_type: merged.hash_type.unwrap_or_default(),
            get_hashes: merged.get_hashes.unwrap_or(false),
            cleanup_empty_dirs,
            use_local_cache: merged.use_local_cache.unwrap_or(true),
            rclone_exe: merged.rclone_exe.unwrap_or_else(|| "rclone".to_string()),
            metadata: merged.metadata.unwrap_or(true),
            log_dest: merged.log_dest.unwrap_or_default(),
            pre_shell: merged.pre_shell.unwrap_or_default(),
            post_shell: merged.post_shell.unwrap_or_default(),
            stop_on_shell_error: merged.stop_on_shell_error.unwrap_or(false),
            dst_list_rclone_flags: merged.dst_list_rclone_flags.unwrap_or_default(),
            automatic_dst_list: merged.automatic_dst_list.unwrap_or(true),
            prefix_incomplete_backups: merged.prefix_incomplete_backups.unwrap_or(true),
            uuid,
            version: merged.version.unwrap_or_else(|| version.to_string()),
            config_dir,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> RirbResult<()> {
        if self.src == Self::MUST_SPECIFY {
            return Err(RirbError::Config("must specify 'src'".into()));
        }
        if self.dst == Self::MUST_SPECIFY {
            return Err(RirbError::Config("must specify 'dst'".into()));
        }

        let filter_set: HashSet<&str> = FILTER_FLAGS.iter().copied().collect();
        let bad: Vec<&String> = self
            .rclone_flags
            .iter()
            .filter(|f| filter_set.contains(f.split('=').next().unwrap_or(f.as_str())))
            .collect();
        if !bad.is_empty() {
            return Err(RirbError::Config(format!(
                "may not have {bad:?} in 'rclone_flags'; use 'filter_flags'"
            )));
        }

        Ok(())
    }

    /// Resolve a path from the config against the config file's directory, unless
    /// it is already absolute or carries a remote-root marker (a colon before the
    /// first path separator).
    pub fn resolve_path(&self, raw: &str) -> String {
        if raw.contains(':') || Path::new(raw).is_absolute() {
            return raw.to_string();
        }
        self.config_dir.join(raw).to_string_lossy().into_owned()
    }

    /// A redacted rendering of `rclone_env`, safe to print or log (§6, §8 scenario 6).
    pub fn redacted_rclone_env(&self) -> BTreeMap<String, String> {
        self.rclone_env
            .iter()
            .map(|(k, v)| {
                if k == REDACTED_ENV_KEY {
                    (k.clone(), REDACTED_PLACEHOLDER.to_string())
                } else {
                    (k.clone(), v.clone())
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("compare", &self.compare)
            .field("renames", &self.renames)
            .field("rclone_env", &self.redacted_rclone_env())
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_file() -> RawConfig {
        RawConfig {
            src: Some("/data/src".into()),
            dst: Some("myremote:backups".into()),
            uuid: Some("fixed-uuid".into()),
            ..RawConfig::default()
        }
    }

    #[test]
    fn missing_src_or_dst_is_a_config_error() {
        let file = RawConfig {
            uuid: Some("u".into()),
            ..RawConfig::default()
        };
        let err = Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap_err();
        assert!(matches!(err, RirbError::Config(_)));
    }

    #[test]
    fn filter_flag_in_rclone_flags_is_rejected() {
        let mut file = base_file();
        file.rclone_flags = Some(vec!["--exclude".into(), "*.tmp".into()]);
        let err = Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap_err();
        assert!(err.to_string().contains("rclone_flags"));
    }

    #[test]
    fn defaults_match_reference_implementation() {
        let cfg = Config::from_raw(base_file(), &[], PathBuf::from("."), None, "0.0.0").unwrap();
        assert_eq!(cfg.compare, CompareAttr::Mtime);
        assert_eq!(cfg.dt, 1.1);
        assert!(cfg.automatic_dst_list);
        assert!(cfg.prefix_incomplete_backups);
        assert_eq!(cfg.cleanup_empty_dirs, CleanupEmptyDirs::Auto);
        assert_eq!(cfg.reuse_hashes, Some(ReuseHashes::Mtime));
    }

    #[test]
    fn override_after_file_wins() {
        let file = base_file();
        let overrides = vec![RawConfig::parse_override("compare = \"hash\"").unwrap()];
        let cfg = Config::from_raw(file, &overrides, PathBuf::from("."), None, "0.0.0").unwrap();
        assert_eq!(cfg.compare, CompareAttr::Hash);
    }

    #[test]
    fn redacts_config_pass_in_debug_and_helper() {
        let mut file = base_file();
        let mut env = BTreeMap::new();
        env.insert(REDACTED_ENV_KEY.to_string(), "donotshow".to_string());
        file.rclone_env = Some(env);
        let cfg = Config::from_raw(file, &[], PathBuf::from("."), None, "0.0.0").unwrap();
        assert_eq!(
            cfg.redacted_rclone_env().get(REDACTED_ENV_KEY).unwrap(),
            REDACTED_PLACEHOLDER
        );
        assert!(!format!("{cfg:?}").contains("donotshow"));
    }

    #[test]
    fn resolve_path_keeps_remote_paths_untouched() {
        let cfg = Config::from_raw(base_file(), &[], PathBuf::from("/etc/rirb"), None, "0.0.0").unwrap();
        assert_eq!(cfg.resolve_path("myremote:backups"), "myremote:backups");
        assert_eq!(cfg.resolve_path("sub/dir"), "/etc/rirb/sub/dir");
    }
}
