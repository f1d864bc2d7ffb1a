//! OneDrive handler: share link → `download=1` direct form.

use async_trait::async_trait;
use url::Url;

use crate::classify::UrlCategory;

use super::{Handler, HandlerError, Probe};

/// Handler for OneDrive and `1drv.ms` share links.
#[derive(Debug)]
pub struct OneDriveHandler {
    probe: Probe,
}

impl OneDriveHandler {
    /// Creates the handler with a shared probe.
    #[must_use]
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Handler for OneDriveHandler {
    fn name(&self) -> &'static str {
        "onedrive"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn supports(&self, category: UrlCategory) -> bool {
        category == UrlCategory::OneDrive
    }

    fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Appends `download=1`; OneDrive serves file bytes instead of the
    /// viewer when the parameter is present. Short links redirect first and
    /// the probe follows them.
    fn rewrite(&self, url: &str) -> Result<String, HandlerError> {
        let mut parsed = Url::parse(url)
            .map_err(|e| HandlerError::invalid_url("onedrive", url, e.to_string()))?;

        let already = parsed.query_pairs().any(|(k, v)| k == "download" && v == "1");
        if !already {
            parsed.query_pairs_mut().append_pair("download", "1");
        }
        Ok(parsed.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handler() -> OneDriveHandler {
        OneDriveHandler::new(Probe::new().unwrap())
    }

    #[test]
    fn test_supports_only_onedrive() {
        let h = handler();
        assert!(h.supports(UrlCategory::OneDrive));
        assert!(!h.supports(UrlCategory::Dropbox));
    }

    #[test]
    fn test_rewrite_appends_download_param() {
        let h = handler();
        let direct = h
            .rewrite("https://onedrive.live.com/redir?resid=AB12!34&authkey=x")
            .unwrap();
        assert!(direct.contains("download=1"));
        assert!(direct.contains("resid="));
    }

    #[test]
    fn test_rewrite_short_link() {
        let h = handler();
        let direct = h.rewrite("https://1drv.ms/u/s!AkZ9").unwrap();
        assert!(direct.contains("download=1"));
    }

    #[test]
    fn test_rewrite_idempotent() {
        let h = handler();
        let once = h.rewrite("https://1drv.ms/u/s!AkZ9").unwrap();
        let twice = h.rewrite(&once).unwrap();
        assert_eq!(once, twice);
    }
}
