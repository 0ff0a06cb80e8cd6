//! Core data model (§3): file entries, file maps, and diff sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A record per path with the attributes the sync tool reports. `IsDir`, `Name`,
/// `ID`, and `Tier` are stripped on ingest (§3); `Path` becomes the map key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "ModTime", skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<String>,
    #[serde(rename = "Hashes", skip_serializing_if = "Option::is_none")]
    pub hashes: Option<BTreeMap<String, String>>,
    /// Any other field the sync tool returned, preserved opaquely so the manifest
    /// round-trips byte-for-byte-equivalent content even for fields this crate
    /// doesn't interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Ordered so that JSON serialization and log-directory comparisons are both
/// deterministic. Keys are POSIX-style relative paths, case-sensitive, no leading
/// slash, no `.`/`..` components.
pub type FileMap = BTreeMap<String, FileEntry>;

/// Raw field name emitted by the sync tool for a listing entry's path; stripped
/// before the rest of the entry becomes the map value.
pub const PATH_FIELD: &str = "Path";

/// Fields present on a raw listing entry that carry no comparison-relevant
/// information and are dropped on ingest.
pub const IGNORED_FIELDS: &[&str] = &["IsDir", "Name", "ID", "Tier"];

/// The attribute used to decide whether two entries for the same path "match".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareAttr {
    Size,
    Mtime,
    Hash,
}

impl CompareAttr {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "size" => Some(Self::Size),
            "mtime" => Some(Self::Mtime),
            "hash" => Some(Self::Hash),
            _ => None,
        }
    }
}

/// `new`, `modified`, `deleted`, and `renamed` per §3. Pairwise disjoint after
/// rename extraction (invariant 1 in §8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffSet {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    pub renamed: Vec<(String, String)>,
}

/// An entry from `backed_up_files.json.gz`: a clone of the prior entry plus the
/// reason it was archived (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackedUpEntry {
    #[serde(flatten)]
    pub entry: FileEntry,
    pub status: BackupStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Modified,
    Deleted,
}

/// Convert a raw JSON array (as produced by `lsjson`) into a [`FileMap`], stripping
/// the ignored fields and keying by `Path`.
pub fn entries_from_lsjson(raw: Vec<serde_json::Value>) -> FileMap {
    let mut map = FileMap::new();
    for mut value in raw {
        let Some(obj) = value.as_object_mut() else {
            continue;
        };
        let Some(path) = obj.remove(PATH_FIELD).and_then(|v| v.as_str().map(str::to_string)) else {
            continue;
        };
        for field in IGNORED_FIELDS {
            obj.remove(*field);
        }
        let entry: FileEntry = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(_) => continue,
        };
        map.insert(path, entry);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entries_from_lsjson_strips_ignored_fields_and_keys_by_path() {
        let raw = vec![json!({
            "Path": "a/b.txt",
            "Name": "b.txt",
            "Size": 42,
            "IsDir": false,
            "ID": "abc",
            "Tier": "hot",
            "ModTime": "2024-01-01T00:00:00.000000000Z",
        })];
        let map = entries_from_lsjson(raw);
        let entry = map.get("a/b.txt").unwrap();
        assert_eq!(entry.size, 42);
        assert!(entry.extra.is_empty());
    }

    #[test]
    fn file_entry_round_trips_through_json_without_escaping_unicode() {
        let mut hashes = BTreeMap::new();
        hashes.insert("sha1".to_string(), "deadbeef".to_string());
        let entry = FileEntry {
            size: 10,
            mod_time: Some("2024-01-01T000000.000000+0000".into()),
            hashes: Some(hashes),
            extra: BTreeMap::new(),
        };
        let mut map = FileMap::new();
        map.insert("unįçôde, spaces, symb°ls".to_string(), entry);
        let rendered = serde_json::to_string(&map).unwrap();
        assert!(rendered.contains("unįçôde"));
        assert!(!rendered.contains("\\u"));
    }
}
