//! Filename extraction, sanitization, and output-path resolution.
//!
//! Filenames are derived in priority order: `Content-Disposition` header,
//! then the URL path's last segment, then a synthesized
//! `download_<timestamp>` fallback. All derived names are sanitized before
//! touching the filesystem.

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use url::Url;

/// Parses a filename out of a `Content-Disposition` header value.
///
/// Understands the common forms, in order of preference:
/// - `filename*=UTF-8''percent%20encoded.pdf` (RFC 5987)
/// - `filename="quoted name.pdf"`
/// - `filename=bare-token.pdf`
///
/// Returns `None` when no usable filename is present.
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // RFC 5987 extended form takes precedence when present.
    if let Some(rest) = find_param(header, "filename*") {
        let encoded = rest.split('\'').next_back().unwrap_or(rest);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            let name = sanitize_filename(&decoded);
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    let value = find_param(header, "filename")?;
    let raw = if let Some(stripped) = value.strip_prefix('"') {
        stripped.split('"').next().unwrap_or("")
    } else if let Some(stripped) = value.strip_prefix('\'') {
        stripped.split('\'').next().unwrap_or("")
    } else {
        value.split(';').next().unwrap_or("").trim()
    };

    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
    let name = sanitize_filename(&decoded);
    (!name.is_empty()).then_some(name)
}

/// Finds a `key=value` parameter in a header, case-insensitively.
///
/// Matches `filename` without also matching `filename*` (exact key match on
/// the segment before `=`).
fn find_param<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        let part = part.trim();
        let (k, v) = part.split_once('=')?;
        k.trim().eq_ignore_ascii_case(key).then(|| v.trim())
    })
}

/// Derives a filename from a URL's path, falling back to a timestamp name.
///
/// The last path segment is used when non-empty; query strings never leak
/// into the name. Empty paths produce `download_<unix-seconds>`.
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(std::string::ToString::to_string))
        .map(|segment| {
            urlencoding::decode(&segment).map_or(segment.clone(), |d| d.into_owned())
        })
        .map(|segment| sanitize_filename(&segment))
        .filter(|name| !name.is_empty());

    from_path.unwrap_or_else(timestamp_filename)
}

/// Synthesizes a `download_<timestamp>` filename for nameless targets.
#[must_use]
pub fn timestamp_filename() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{secs}")
}

/// Sanitizes a filename for safe filesystem use.
///
/// Replaces path separators, control characters, and shell-hostile
/// punctuation with underscores, collapses runs of underscores, and strips
/// leading/trailing separators. Rejects traversal components entirely.
#[must_use]
pub fn sanitize_filename(value: &str) -> String {
    // A name that is purely traversal must not survive sanitization.
    if value == "." || value == ".." {
        return String::new();
    }

    let mut out = String::with_capacity(value.len());
    let mut prev_underscore = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
                prev_underscore = true;
            }
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }
    out.trim_matches(|c: char| c == '_' || c.is_whitespace())
        .to_string()
}

/// Resolves a unique path in `dir` for `filename`, appending `_2`, `_3`, ...
/// before the extension when the name is already taken.
#[must_use]
pub fn resolve_unique_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_name(filename);
    for suffix in 2u32.. {
        let name = if ext.is_empty() {
            format!("{stem}_{suffix}")
        } else {
            format!("{stem}_{suffix}.{ext}")
        };
        let path = dir.join(&name);
        if !path.exists() {
            return path;
        }
    }
    unreachable!("suffix search is unbounded")
}

fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => (&filename[..idx], &filename[idx + 1..]),
        _ => (filename, ""),
    }
}

/// Returns true when `path` stays inside a single directory level
/// (no parent components, no absolute roots).
#[must_use]
pub fn is_safe_relative_name(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
}
