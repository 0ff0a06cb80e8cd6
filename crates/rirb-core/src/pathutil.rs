//! Remote-aware path joining and timestamp utilities (component A).

use chrono::{DateTime, Local, SecondsFormat};

use crate::errors::RirbError;

/// Join a root with one or more segments the way a remote-aware sync tool expects.
///
/// A trailing `:` on `root` marks a remote root (e.g. `"myremote:"`); in that case no
/// `/` is inserted before the next segment unless the segment already starts with one.
/// A trailing `/` on `root` is stripped before joining. Remaining segments are joined
/// with plain `/`.
pub fn pathjoin(root: &str, segments: &[&str]) -> String {
    let root = root.strip_suffix('/').unwrap_or(root);

    let mut out = if root.ends_with(':') {
        match segments.first() {
            Some(first) if first.starts_with('/') => format!("{root}{first}"),
            Some(first) => format!("{root}{first}"),
            None => root.to_string(),
        }
    } else {
        root.to_string()
    };

    let rest = if root.ends_with(':') {
        &segments[segments.len().min(1)..]
    } else {
        segments
    };

    for seg in rest {
        let seg = seg.trim_matches('/');
        if seg.is_empty() {
            continue;
        }
        if out.is_empty() {
            out.push_str(seg);
        } else {
            out.push('/');
            out.push_str(seg);
        }
    }
    out
}

/// `YYYY-MM-DDThhmmss.ffffff±hhmm`: fixed-width fields so lexicographic order equals
/// chronological order, and microsecond precision the way the reference backup
/// timestamps do.
pub fn now_timestamp() -> String {
    format_timestamp(Local::now())
}

pub fn format_timestamp(dt: DateTime<Local>) -> String {
    dt.format("%Y-%m-%dT%H%M%S%.6f%z").to_string()
}

/// Parse a timestamp in the run's own format (or a standard RFC3339 rendering, since
/// the sync tool reports `ModTime` with colons in the offset) down to a Unix epoch
/// with fractional seconds.
pub fn timestamp_to_epoch(raw: &str) -> Result<f64, RirbError> {
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H%M%S%.f%z") {
        return Ok(epoch_seconds(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(epoch_seconds(dt));
    }
    Err(RirbError::Config(format!("cannot parse timestamp: {raw}")))
}

fn epoch_seconds(dt: DateTime<chrono::FixedOffset>) -> f64 {
    dt.timestamp() as f64 + dt.timestamp_subsec_micros() as f64 / 1_000_000.0
}

/// `true` when two optional timestamp strings are within `dt` seconds of one another.
/// Per §4.D rule 3, both must be present for the comparison to hold.
pub fn mtimes_close(a: Option<&str>, b: Option<&str>, dt: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (timestamp_to_epoch(a), timestamp_to_epoch(b)) {
            (Ok(a), Ok(b)) => (a - b).abs() <= dt,
            _ => false,
        },
        _ => false,
    }
}

/// Render a timestamp the way `chrono`'s RFC3339 formatter would, for places that
/// genuinely want the standard (colon-bearing) form rather than the run's `<ts>`.
pub fn rfc3339_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pathjoin_remote_root() {
        assert_eq!(pathjoin("myremote:", &["curr", "a/b"]), "myremote:curr/a/b");
    }

    #[test]
    fn pathjoin_remote_root_absolute_segment() {
        assert_eq!(pathjoin("myremote:", &["/abs"]), "myremote:/abs");
    }

    #[test]
    fn pathjoin_local_root_strips_trailing_slash() {
        assert_eq!(pathjoin("/srv/backup/", &["curr", "x"]), "/srv/backup/curr/x");
    }

    #[test]
    fn pathjoin_no_segments() {
        assert_eq!(pathjoin("myremote:", &[]), "myremote:");
    }

    #[test]
    fn timestamp_roundtrip_our_format() {
        let ts = now_timestamp();
        let epoch = timestamp_to_epoch(&ts).unwrap();
        assert!(epoch > 0.0);
    }

    #[test]
    fn mtimes_close_respects_dt() {
        let a = "2024-01-01T000000.000000+0000";
        let b = "2024-01-01T000001.000000+0000";
        assert!(mtimes_close(Some(a), Some(b), 1.1));
        assert!(!mtimes_close(Some(a), Some(b), 0.5));
    }

    #[test]
    fn mtimes_close_requires_both_present() {
        assert!(!mtimes_close(None, Some("2024-01-01T000000.000000+0000"), 10.0));
    }
}
