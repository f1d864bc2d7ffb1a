//! Generic fallback handler.
//!
//! Permanently registered at the lowest priority; supports every category
//! unconditionally and treats the raw URL as a best-effort direct link.
//! Guarantees registry selection never comes up empty.

use async_trait::async_trait;

use crate::classify::UrlCategory;

use super::{Handler, HandlerError, Probe};

/// Best-effort fallback handler for unrecognized URLs.
#[derive(Debug)]
pub struct GenericHandler {
    probe: Probe,
}

impl GenericHandler {
    /// Creates the handler with a shared probe.
    #[must_use]
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Handler for GenericHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn priority(&self) -> u32 {
        0
    }

    fn supports(&self, _category: UrlCategory) -> bool {
        true
    }

    fn probe(&self) -> &Probe {
        &self.probe
    }

    fn rewrite(&self, url: &str) -> Result<String, HandlerError> {
        Ok(url.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_supports_everything() {
        let h = GenericHandler::new(Probe::new().unwrap());
        for category in [
            UrlCategory::DirectFile,
            UrlCategory::GoogleDrive,
            UrlCategory::Dropbox,
            UrlCategory::OneDrive,
            UrlCategory::StreamingSite,
            UrlCategory::Other,
        ] {
            assert!(h.supports(category));
        }
    }

    #[test]
    fn test_generic_priority_is_lowest() {
        let h = GenericHandler::new(Probe::new().unwrap());
        assert_eq!(h.priority(), 0);
    }
}
