//! Direct-file handler: URL passthrough for links with file extensions.

use async_trait::async_trait;

use crate::classify::UrlCategory;

use super::{Handler, HandlerError, Probe};

/// Handler for URLs whose path names a file directly.
#[derive(Debug)]
pub struct DirectFileHandler {
    probe: Probe,
}

impl DirectFileHandler {
    /// Creates the handler with a shared probe.
    #[must_use]
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Handler for DirectFileHandler {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn supports(&self, category: UrlCategory) -> bool {
        category == UrlCategory::DirectFile
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
    fn test_direct_passthrough() {
        let h = DirectFileHandler::new(Probe::new().unwrap());
        assert_eq!(
            h.rewrite("https://example.com/file.pdf").unwrap(),
            "https://example.com/file.pdf"
        );
    }

    #[test]
    fn test_supports_only_direct_file() {
        let h = DirectFileHandler::new(Probe::new().unwrap());
        assert!(h.supports(UrlCategory::DirectFile));
        assert!(!h.supports(UrlCategory::Other));
    }
}
