//! Metadata probing for fetch targets.
//!
//! The [`Probe`] issues a metadata-only HEAD request (following redirects,
//! short timeout) and reads size, content type, range support, and filename.
//! When HEAD is rejected it falls back to a one-byte ranged GET before
//! degrading entirely. Probing never fails: on any network error the caller
//! gets a degraded [`RemoteInfo`] with the filename derived from the URL.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::engine::EngineError;
use crate::filename::{filename_from_url, parse_content_disposition, timestamp_filename};

/// Probe connect timeout.
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Probe total request timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Browser-like User-Agent; several providers reject unadorned clients.
const PROBE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Metadata describing a fetch target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Total size in bytes, when the origin declares one.
    pub size: Option<u64>,
    /// MIME type without parameters, when declared.
    pub mime_type: Option<String>,
    /// Whether the origin confirmed `Accept-Ranges: bytes`.
    pub accepts_ranges: bool,
    /// Best-known filename for the artifact.
    pub filename: String,
}

impl RemoteInfo {
    /// Builds degraded info for a target that could not be probed.
    ///
    /// Size unknown, no range support, filename derived purely from the URL.
    #[must_use]
    pub fn degraded(url: &str) -> Self {
        let filename = Url::parse(url)
            .map(|u| filename_from_url(&u))
            .unwrap_or_else(|_| timestamp_filename());
        Self {
            size: None,
            mime_type: None,
            accepts_ranges: false,
            filename,
        }
    }
}

/// Shared metadata prober used by all handlers.
#[derive(Debug, Clone)]
pub struct Probe {
    client: Client,
}

impl Probe {
    /// Creates a probe with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ClientBuild`] when client construction fails.
    pub fn new() -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(PROBE_CONNECT_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .user_agent(PROBE_USER_AGENT)
            .gzip(true)
            .build()
            .map_err(EngineError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Probes a target, degrading instead of failing.
    ///
    /// HEAD first; if the origin rejects HEAD (405 and friends are common),
    /// retries with a one-byte ranged GET. A ranged-GET 206 also confirms
    /// range support even when `Accept-Ranges` is absent from headers.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn inspect(&self, url: &str) -> RemoteInfo {
        match self.head(url).await {
            Ok(info) => info,
            Err(head_err) => {
                debug!(error = %head_err, "HEAD probe failed; trying ranged GET");
                match self.ranged_get(url).await {
                    Ok(info) => info,
                    Err(get_err) => {
                        warn!(error = %get_err, "probe degraded to URL-derived info");
                        RemoteInfo::degraded(url)
                    }
                }
            }
        }
    }

    async fn head(&self, url: &str) -> Result<RemoteInfo, reqwest::Error> {
        let response = self.client.head(url).send().await?;
        let response = response.error_for_status()?;
        Ok(info_from_response(&response, url, false))
    }

    /// GET with `Range: bytes=0-0` to pull headers without the body.
    async fn ranged_get(&self, url: &str) -> Result<RemoteInfo, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        let response = response.error_for_status()?;
        let partial = response.status().as_u16() == 206;
        Ok(info_from_response(&response, url, partial))
    }

    /// Fetches the leading bytes of a page body, for handlers that must
    /// inspect interstitial HTML (confirmation-token flows).
    ///
    /// # Errors
    ///
    /// Returns the underlying request error; capability callers treat a
    /// failure as "no token found".
    pub async fn fetch_page_head(&self, url: &str, max_bytes: usize) -> Result<String, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.text().await?;
        let mut truncated = body;
        truncated.truncate(max_bytes);
        Ok(truncated)
    }
}

/// Extracts [`RemoteInfo`] from response headers.
///
/// `ranged` indicates the response came from a `bytes=0-0` GET: the 206
/// status itself confirms range support, and `Content-Range` (not
/// `Content-Length`, which would be 1) carries the full size.
fn info_from_response(response: &reqwest::Response, url: &str, ranged: bool) -> RemoteInfo {
    let headers = response.headers();

    let size = if ranged {
        headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
    } else {
        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
    };

    let mime_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());

    let accepts_ranges = ranged
        || headers
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));

    let filename = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_disposition)
        // Prefer the final (post-redirect) URL for the path fallback.
        .unwrap_or_else(|| filename_from_url(response.url()));

    debug!(
        url = %url,
        size = ?size,
        mime = ?mime_type,
        accepts_ranges,
        filename = %filename,
        "probe resolved"
    );

    RemoteInfo {
        size,
        mime_type,
        accepts_ranges,
        filename,
    }
}

/// Parses the total size out of `Content-Range: bytes 0-0/12345`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let total = value.rsplit('/').next()?;
    total.trim().parse::<u64>().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_degraded_info_from_url() {
        let info = RemoteInfo::degraded("https://example.com/files/data.csv");
        assert_eq!(info.size, None);
        assert!(!info.accepts_ranges);
        assert_eq!(info.filename, "data.csv");
    }

    #[test]
    fn test_degraded_info_from_unparseable_url() {
        let info = RemoteInfo::degraded("not a url");
        assert!(info.filename.starts_with("download_"));
    }

    #[test]
    fn test_parse_content_range_total() {
        assert_eq!(parse_content_range_total("bytes 0-0/12345"), Some(12345));
        assert_eq!(parse_content_range_total("bytes */512"), Some(512));
        assert_eq!(parse_content_range_total("bytes 0-0/*"), None);
    }

    #[tokio::test]
    async fn test_inspect_reads_head_headers() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", "2048")
                    .insert_header("Content-Type", "application/octet-stream; charset=binary")
                    .insert_header("Accept-Ranges", "bytes"),
            )
            .mount(&server)
            .await;

        let probe = Probe::new().unwrap();
        let info = probe.inspect(&format!("{}/file.bin", server.uri())).await;

        assert_eq!(info.size, Some(2048));
        assert_eq!(info.mime_type.as_deref(), Some("application/octet-stream"));
        assert!(info.accepts_ranges);
        assert_eq!(info.filename, "file.bin");
    }

    #[tokio::test]
    async fn test_inspect_prefers_content_disposition_name() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/dl"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", "10")
                    .insert_header("Content-Disposition", r#"attachment; filename="real.pdf""#),
            )
            .mount(&server)
            .await;

        let probe = Probe::new().unwrap();
        let info = probe.inspect(&format!("{}/dl", server.uri())).await;
        assert_eq!(info.filename, "real.pdf");
    }

    #[tokio::test]
    async fn test_inspect_falls_back_to_ranged_get() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .and(header("Range", "bytes=0-0"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", "bytes 0-0/4096")
                    .insert_header("Content-Type", "application/zip")
                    .set_body_bytes(b"x".to_vec()),
            )
            .mount(&server)
            .await;

        let probe = Probe::new().unwrap();
        let info = probe.inspect(&format!("{}/file.bin", server.uri())).await;

        assert_eq!(info.size, Some(4096));
        assert!(info.accepts_ranges, "206 must confirm range support");
        assert_eq!(info.mime_type.as_deref(), Some("application/zip"));
    }

    #[tokio::test]
    async fn test_inspect_degrades_when_both_fail() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let probe = Probe::new().unwrap();
        let info = probe
            .inspect(&format!("{}/files/broken.iso", server.uri()))
            .await;

        assert_eq!(info.size, None);
        assert!(!info.accepts_ranges);
        assert_eq!(info.filename, "broken.iso");
    }
}
