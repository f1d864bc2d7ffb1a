//! URL classification into provider categories.
//!
//! This module provides the pure classification step that maps a raw URL
//! string onto a [`UrlCategory`] plus any provider metadata extractable from
//! the URL itself (file ids, share paths, video ids). Classification never
//! performs network I/O: it runs on every submission before any network
//! resources are committed, so it must stay cheap and deterministic.
//!
//! # Classification order
//!
//! 1. Normalize: trim, prepend `https://` when no scheme is present, validate.
//! 2. Match ordered per-provider host/path pattern sets.
//! 3. Fall back to [`UrlCategory::DirectFile`] when the path carries a known
//!    binary/document/media extension.
//! 4. Otherwise classify as [`UrlCategory::Other`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Provider category assigned to a submitted URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlCategory {
    /// Plain URL whose path ends in a recognized file extension.
    DirectFile,
    /// Google Drive file/folder share links.
    GoogleDrive,
    /// Dropbox share links.
    Dropbox,
    /// OneDrive share links (including `1drv.ms` short links).
    OneDrive,
    /// Video streaming sites (YouTube family, Vimeo, Dailymotion).
    StreamingSite,
    /// Anything else; handled by the generic fallback handler.
    Other,
}

impl UrlCategory {
    /// Returns the stable string representation used in persisted records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectFile => "direct_file",
            Self::GoogleDrive => "google_drive",
            Self::Dropbox => "dropbox",
            Self::OneDrive => "onedrive",
            Self::StreamingSite => "streaming",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for UrlCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UrlCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_file" => Ok(Self::DirectFile),
            "google_drive" => Ok(Self::GoogleDrive),
            "dropbox" => Ok(Self::Dropbox),
            "onedrive" => Ok(Self::OneDrive),
            "streaming" => Ok(Self::StreamingSite),
            "other" => Ok(Self::Other),
            _ => Err(format!("invalid url category: {s}")),
        }
    }
}

/// Provider-specific metadata extracted during classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderMetadata {
    /// Google Drive resource id from `/d/{id}`, `id={id}`, or `/folders/{id}`.
    GoogleDrive {
        /// The extracted file or folder id.
        file_id: String,
    },
    /// Dropbox share path (everything after the host).
    Dropbox {
        /// Path + query of the share link.
        share_path: String,
    },
    /// OneDrive resource id when extractable from the link.
    OneDrive {
        /// Resource id from `resid=`/`id=` params, if present.
        resource_id: Option<String>,
    },
    /// Streaming-site video id when extractable.
    Streaming {
        /// Video id from `v=`, `youtu.be/`, `/embed/`, or `/shorts/`.
        video_id: Option<String>,
    },
    /// No provider metadata applies.
    None,
}

/// Result of classifying a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Normalized URL (scheme forced, whitespace trimmed).
    pub url: String,
    /// Assigned provider category.
    pub category: UrlCategory,
    /// Provider metadata extracted from the URL.
    pub metadata: ProviderMetadata,
}

/// Errors rejecting a URL at submission time.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The input was empty or whitespace-only.
    #[error("empty URL")]
    Empty,

    /// The input is not a parseable absolute URL even after normalization.
    #[error("malformed URL: {url}")]
    Malformed {
        /// The rejected input.
        url: String,
    },

    /// The URL uses a scheme this system cannot fetch.
    #[error("unsupported URL scheme {scheme} in {url}")]
    UnsupportedScheme {
        /// The rejected scheme.
        scheme: String,
        /// The rejected input.
        url: String,
    },
}

/// File extensions classified as direct-file targets.
///
/// Covers common binary, document, archive, and media formats. Matching is
/// case-insensitive on the final path segment.
const DIRECT_FILE_EXTENSIONS: &[&str] = &[
    "7z", "aac", "apk", "avi", "bin", "bz2", "csv", "deb", "dmg", "doc", "docx", "epub", "exe",
    "flac", "flv", "gif", "gz", "iso", "jpeg", "jpg", "json", "m4a", "m4v", "mkv", "mov", "mp3",
    "mp4", "msi", "ogg", "pdf", "png", "ppt", "pptx", "rar", "rpm", "svg", "tar", "tgz", "txt",
    "wav", "webm", "webp", "xls", "xlsx", "xml", "zip",
];

static GOOGLE_DRIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"(?i)^https?://drive\.google\.com/file/d/([A-Za-z0-9_-]+)",
        r"(?i)^https?://drive\.google\.com/open\?.*\bid=([A-Za-z0-9_-]+)",
        r"(?i)^https?://drive\.google\.com/uc\?.*\bid=([A-Za-z0-9_-]+)",
        r"(?i)^https?://drive\.google\.com/drive/folders/([A-Za-z0-9_-]+)",
        r"(?i)^https?://docs\.google\.com/[a-z]+/d/([A-Za-z0-9_-]+)",
    ])
});

static DROPBOX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"(?i)^https?://(?:www\.)?dropbox\.com/s/\S+",
        r"(?i)^https?://(?:www\.)?dropbox\.com/scl/fi/\S+",
        r"(?i)^https?://(?:www\.)?dropbox\.com/sh/\S+",
        r"(?i)^https?://dl\.dropboxusercontent\.com/\S+",
    ])
});

static ONEDRIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"(?i)^https?://onedrive\.live\.com/\S*",
        r"(?i)^https?://1drv\.ms/\S+",
        r"(?i)^https?://[a-z0-9-]+\.sharepoint\.com/\S*/personal/\S+",
    ])
});

static STREAMING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"(?i)^https?://(?:www\.|m\.)?youtube\.com/(?:watch|embed|shorts)\S*",
        r"(?i)^https?://youtu\.be/[A-Za-z0-9_-]+",
        r"(?i)^https?://(?:www\.)?vimeo\.com/\d+",
        r"(?i)^https?://(?:www\.)?dailymotion\.com/video/\S+",
    ])
});

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_patterns(&[
        r"(?i)[?&]v=([A-Za-z0-9_-]{6,})",
        r"(?i)youtu\.be/([A-Za-z0-9_-]{6,})",
        r"(?i)/embed/([A-Za-z0-9_-]{6,})",
        r"(?i)/shorts/([A-Za-z0-9_-]{6,})",
    ])
});

/// Compiles a fixed pattern set, panicking on invalid patterns.
///
/// All patterns are compile-time string literals; an invalid one is a bug
/// caught by the pattern tests below, so the expect here is unreachable in
/// a released build.
#[allow(clippy::expect_used)]
fn compile_patterns(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static classifier pattern must compile"))
        .collect()
}

/// Normalizes a raw URL string for classification.
///
/// Trims whitespace, prepends `https://` when no scheme is present, and
/// validates the result parses as an absolute http(s) URL.
///
/// # Errors
///
/// Returns [`ClassifyError`] for empty, malformed, or non-http(s) inputs.
pub fn normalize_url(raw: &str) -> Result<String, ClassifyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ClassifyError::Empty);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate).map_err(|_| ClassifyError::Malformed {
        url: trimmed.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ClassifyError::UnsupportedScheme {
                scheme: scheme.to_string(),
                url: trimmed.to_string(),
            });
        }
    }

    if parsed.host_str().is_none() {
        return Err(ClassifyError::Malformed {
            url: trimmed.to_string(),
        });
    }

    Ok(candidate)
}

/// Classifies a raw URL into a provider category with extracted metadata.
///
/// Pure function: no network I/O, no clock access beyond none at all.
///
/// # Errors
///
/// Returns [`ClassifyError`] when the URL is rejected at submission
/// (empty/malformed/unsupported scheme). A URL that parses but matches no
/// provider is never an error; it classifies as [`UrlCategory::Other`].
pub fn classify(raw: &str) -> Result<Classification, ClassifyError> {
    let url = normalize_url(raw)?;

    if let Some(id) = first_capture(&GOOGLE_DRIVE_PATTERNS, &url) {
        return Ok(Classification {
            url,
            category: UrlCategory::GoogleDrive,
            metadata: ProviderMetadata::GoogleDrive { file_id: id },
        });
    }

    if matches_any(&DROPBOX_PATTERNS, &url) {
        let share_path = share_path_of(&url);
        return Ok(Classification {
            url,
            category: UrlCategory::Dropbox,
            metadata: ProviderMetadata::Dropbox { share_path },
        });
    }

    if matches_any(&ONEDRIVE_PATTERNS, &url) {
        let resource_id = onedrive_resource_id(&url);
        return Ok(Classification {
            url,
            category: UrlCategory::OneDrive,
            metadata: ProviderMetadata::OneDrive { resource_id },
        });
    }

    if matches_any(&STREAMING_PATTERNS, &url) {
        let video_id = first_capture(&VIDEO_ID_PATTERNS, &url);
        return Ok(Classification {
            url,
            category: UrlCategory::StreamingSite,
            metadata: ProviderMetadata::Streaming { video_id },
        });
    }

    if has_direct_file_extension(&url) {
        return Ok(Classification {
            url,
            category: UrlCategory::DirectFile,
            metadata: ProviderMetadata::None,
        });
    }

    Ok(Classification {
        url,
        category: UrlCategory::Other,
        metadata: ProviderMetadata::None,
    })
}

fn matches_any(patterns: &[Regex], url: &str) -> bool {
    patterns.iter().any(|p| p.is_match(url))
}

fn first_capture(patterns: &[Regex], url: &str) -> Option<String> {
    patterns.iter().find_map(|p| {
        p.captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Extracts the share path (path + query) of a Dropbox link.
fn share_path_of(url: &str) -> String {
    Url::parse(url)
        .map(|u| {
            let mut path = u.path().to_string();
            if let Some(query) = u.query() {
                path.push('?');
                path.push_str(query);
            }
            path
        })
        .unwrap_or_default()
}

fn onedrive_resource_id(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "resid" || key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

fn has_direct_file_extension(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(last_segment) = parsed.path_segments().and_then(|mut s| s.next_back()) else {
        return false;
    };
    let Some(dot) = last_segment.rfind('.') else {
        return false;
    };
    let ext = last_segment[dot + 1..].to_lowercase();
    DIRECT_FILE_EXTENSIONS.contains(&ext.as_str())
}
