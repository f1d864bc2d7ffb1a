//! Dropbox handler: share link → `dl.dropboxusercontent.com` direct form.

use async_trait::async_trait;
use url::Url;

use crate::classify::UrlCategory;

use super::{Handler, HandlerError, Probe};

/// Handler for Dropbox share links.
#[derive(Debug)]
pub struct DropboxHandler {
    probe: Probe,
}

impl DropboxHandler {
    /// Creates the handler with a shared probe.
    #[must_use]
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Handler for DropboxHandler {
    fn name(&self) -> &'static str {
        "dropbox"
    }

    fn priority(&self) -> u32 {
        70
    }

    fn supports(&self, category: UrlCategory) -> bool {
        category == UrlCategory::Dropbox
    }

    fn probe(&self) -> &Probe {
        &self.probe
    }

    /// Rewrites `www.dropbox.com/...?dl=0` into the user-content host with
    /// `dl=1`, which serves raw file bytes instead of the preview page.
    fn rewrite(&self, url: &str) -> Result<String, HandlerError> {
        let mut parsed = Url::parse(url)
            .map_err(|e| HandlerError::invalid_url("dropbox", url, e.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| HandlerError::invalid_url("dropbox", url, "missing host"))?;

        if host.ends_with("dropbox.com") {
            parsed
                .set_host(Some("dl.dropboxusercontent.com"))
                .map_err(|e| HandlerError::invalid_url("dropbox", url, e.to_string()))?;
        }

        let retained: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != "dl")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut query = parsed.query_pairs_mut();
            query.clear();
            for (k, v) in &retained {
                query.append_pair(k, v);
            }
            query.append_pair("dl", "1");
        }

        Ok(parsed.to_string())
    }
}
