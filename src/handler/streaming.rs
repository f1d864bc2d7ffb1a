//! Streaming-site handler.
//!
//! Fetching from streaming sites requires an external extractor binary,
//! which this build does not ship. The handler still classifies and refuses
//! with a descriptive capability error so these URLs never fall through to
//! a wrong handler and produce an HTML page as the "download".

use async_trait::async_trait;

use crate::classify::UrlCategory;

use super::{Handler, HandlerError, Probe, ResolvedTarget};

/// Handler for YouTube-family / Vimeo / Dailymotion URLs.
#[derive(Debug)]
pub struct StreamingHandler {
    probe: Probe,
}

impl StreamingHandler {
    /// Creates the handler with a shared probe.
    #[must_use]
    pub fn new(probe: Probe) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl Handler for StreamingHandler {
    fn name(&self) -> &'static str {
        "streaming"
    }

    fn priority(&self) -> u32 {
        50
    }

    fn supports(&self, category: UrlCategory) -> bool {
        category == UrlCategory::StreamingSite
    }

    fn probe(&self) -> &Probe {
        &self.probe
    }

    fn rewrite(&self, _url: &str) -> Result<String, HandlerError> {
        Err(HandlerError::MissingCapability {
            provider: "streaming",
            tool: "an external media extractor (yt-dlp)",
            detail: "install the extractor on the host and register a streaming-capable handler",
        })
    }

    async fn resolve(&self, url: &str) -> Result<ResolvedTarget, HandlerError> {
        // Surface the capability error without probing; the page URL would
        // only ever yield HTML.
        self.rewrite(url).map(|_| unreachable!())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handler() -> StreamingHandler {
        StreamingHandler::new(Probe::new().unwrap())
    }

    #[test]
    fn test_supports_only_streaming() {
        let h = handler();
        assert!(h.supports(UrlCategory::StreamingSite));
        assert!(!h.supports(UrlCategory::DirectFile));
    }

    #[tokio::test]
    async fn test_resolve_fails_with_capability_error() {
        let h = handler();
        let err = h
            .resolve("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("yt-dlp"), "error must name the tool: {msg}");
        assert!(matches!(err, HandlerError::MissingCapability { .. }));
    }
}
