//! Provider handlers and the priority-ordered handler registry.
//!
//! A [`Handler`] turns a submitted URL into a fetchable target: it rewrites
//! provider share links into canonical direct-fetch form and probes the
//! result for size, content type, range support, and filename. The
//! [`HandlerRegistry`] selects the highest-priority handler supporting a
//! category, with a generic fallback that accepts everything.
//!
//! # Architecture
//!
//! - [`Handler`] - async trait individual handlers implement
//! - [`HandlerRegistry`] - selection table built once at process start
//! - [`Probe`] - shared HEAD/ranged-GET metadata prober
//! - Provider handlers: [`GoogleDriveHandler`], [`DropboxHandler`],
//!   [`OneDriveHandler`], [`StreamingHandler`], [`DirectFileHandler`],
//!   [`GenericHandler`]

mod direct;
mod dropbox;
mod generic;
mod google_drive;
mod onedrive;
mod probe;
mod streaming;

pub use direct::DirectFileHandler;
pub use dropbox::DropboxHandler;
pub use generic::GenericHandler;
pub use google_drive::GoogleDriveHandler;
pub use onedrive::OneDriveHandler;
pub use probe::{Probe, RemoteInfo};
pub use streaming::StreamingHandler;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::classify::UrlCategory;

/// Errors a handler can raise while producing a fetchable target.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The URL matched the provider but is missing required pieces.
    #[error("invalid {provider} URL {url}: {reason}")]
    InvalidProviderUrl {
        /// Provider (handler) name.
        provider: &'static str,
        /// The offending URL.
        url: String,
        /// What was missing or wrong.
        reason: String,
    },

    /// The handler needs an external capability that is not available.
    #[error("{provider} downloads require {tool}: {detail}")]
    MissingCapability {
        /// Provider (handler) name.
        provider: &'static str,
        /// The missing external tool.
        tool: &'static str,
        /// User-facing guidance.
        detail: &'static str,
    },

    /// No handler is registered under the requested name.
    #[error("unknown handler: {name}")]
    UnknownHandler {
        /// The requested handler name.
        name: String,
    },
}

impl HandlerError {
    /// Creates an invalid-provider-URL error.
    pub fn invalid_url(
        provider: &'static str,
        url: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidProviderUrl {
            provider,
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// A resolved, fetchable target: the URL the engine will actually GET plus
/// the probed metadata for it.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Canonical direct-fetch URL.
    pub fetch_url: String,
    /// Probed metadata (possibly degraded).
    pub info: RemoteInfo,
}

/// Trait all provider handlers implement.
///
/// # Object Safety
///
/// Uses `async_trait` to support `Arc<dyn Handler>` dispatch in the
/// registry; Rust 2024 native async traits are not object-safe.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Returns the handler's stable name (persisted on jobs for re-binding).
    fn name(&self) -> &'static str;

    /// Returns the handler's selection priority. Higher wins.
    fn priority(&self) -> u32;

    /// Returns true if this handler can serve the given category.
    fn supports(&self, category: UrlCategory) -> bool;

    /// Returns the shared metadata prober.
    fn probe(&self) -> &Probe;

    /// Rewrites a provider share link into its canonical direct-fetch form.
    ///
    /// Pure string transformation; handlers needing a network round trip
    /// (confirmation tokens) do that in [`Handler::resolve`] instead.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the URL is recognizably the provider's
    /// but unusable, or when the handler lacks a required capability.
    fn rewrite(&self, url: &str) -> Result<String, HandlerError>;

    /// Produces the fetchable target for a URL: rewrite, then probe.
    ///
    /// The probe itself never fails (it degrades), so errors here are
    /// rewrite/capability errors only.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] from the rewrite step.
    async fn resolve(&self, url: &str) -> Result<ResolvedTarget, HandlerError> {
        let fetch_url = self.rewrite(url)?;
        let info = self.probe().inspect(&fetch_url).await;
        Ok(ResolvedTarget { fetch_url, info })
    }
}

/// Priority-ordered handler selection table.
///
/// Built once at process start; selection is a pure fold over the table.
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registers a handler.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        debug!(
            name = handler.name(),
            priority = handler.priority(),
            "registering handler"
        );
        self.handlers.push(handler);
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Selects the highest-priority handler supporting `category`.
    ///
    /// Ties are broken by registration order (first registered wins).
    /// Returns `None` only for a registry with no supporting handler; the
    /// default registry always includes the generic fallback, which
    /// supports every category.
    #[must_use]
    pub fn select(&self, category: UrlCategory) -> Option<Arc<dyn Handler>> {
        self.handlers
            .iter()
            .filter(|h| h.supports(category))
            .max_by(|a, b| {
                a.priority()
                    .cmp(&b.priority())
                    // max_by returns the LAST maximal element; invert the
                    // tie so the first-registered handler wins.
                    .then(std::cmp::Ordering::Greater)
            })
            .cloned()
    }

    /// Looks up a handler by exact name.
    ///
    /// Used when a persisted job resumes and must re-bind to the handler it
    /// started with.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::UnknownHandler`] when no handler has that name.
    pub fn select_by_name(&self, name: &str) -> Result<Arc<dyn Handler>, HandlerError> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .cloned()
            .ok_or_else(|| HandlerError::UnknownHandler {
                name: name.to_string(),
            })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handlers.len())
            .field("handlers", &names)
            .finish()
    }
}

/// Builds the default handler registry used by execution flows.
///
/// Registration order is deterministic; the generic fallback is always
/// present and always supports every category.
#[must_use]
pub fn build_default_registry(probe: Probe) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(GoogleDriveHandler::new(probe.clone())));
    registry.register(Arc::new(DropboxHandler::new(probe.clone())));
    registry.register(Arc::new(OneDriveHandler::new(probe.clone())));
    registry.register(Arc::new(StreamingHandler::new(probe.clone())));
    registry.register(Arc::new(DirectFileHandler::new(probe.clone())));
    registry.register(Arc::new(GenericHandler::new(probe)));
    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct MockHandler {
        mock_name: &'static str,
        mock_priority: u32,
        categories: Vec<UrlCategory>,
        probe: Probe,
    }

    #[async_trait]
    impl Handler for MockHandler {
        fn name(&self) -> &'static str {
            self.mock_name
        }

        fn priority(&self) -> u32 {
            self.mock_priority
        }

        fn supports(&self, category: UrlCategory) -> bool {
            self.categories.contains(&category)
        }

        fn probe(&self) -> &Probe {
            &self.probe
        }

        fn rewrite(&self, url: &str) -> Result<String, HandlerError> {
            Ok(url.to_string())
        }
    }

    fn mock(name: &'static str, priority: u32, categories: Vec<UrlCategory>) -> Arc<dyn Handler> {
        Arc::new(MockHandler {
            mock_name: name,
            mock_priority: priority,
            categories,
            probe: Probe::new().unwrap(),
        })
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_select_highest_priority_wins() {
        let mut registry = HandlerRegistry::new();
        registry.register(mock("low", 10, vec![UrlCategory::Dropbox]));
        registry.register(mock("high", 90, vec![UrlCategory::Dropbox]));

        let selected = registry.select(UrlCategory::Dropbox).unwrap();
        assert_eq!(selected.name(), "high");
    }

    #[test]
    fn test_select_tie_broken_by_registration_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(mock("first", 50, vec![UrlCategory::Other]));
        registry.register(mock("second", 50, vec![UrlCategory::Other]));

        let selected = registry.select(UrlCategory::Other).unwrap();
        assert_eq!(selected.name(), "first");
    }

    #[test]
    fn test_select_none_when_unsupported() {
        let mut registry = HandlerRegistry::new();
        registry.register(mock("dropbox-only", 50, vec![UrlCategory::Dropbox]));
        assert!(registry.select(UrlCategory::GoogleDrive).is_none());
    }

    #[test]
    fn test_select_by_name_exact() {
        let mut registry = HandlerRegistry::new();
        registry.register(mock("alpha", 10, vec![UrlCategory::Other]));
        registry.register(mock("beta", 20, vec![UrlCategory::Other]));

        assert_eq!(registry.select_by_name("beta").unwrap().name(), "beta");
        assert!(matches!(
            registry.select_by_name("gamma"),
            Err(HandlerError::UnknownHandler { .. })
        ));
    }

    #[test]
    fn test_default_registry_covers_every_category() {
        let registry = build_default_registry(Probe::new().unwrap());
        for category in [
            UrlCategory::DirectFile,
            UrlCategory::GoogleDrive,
            UrlCategory::Dropbox,
            UrlCategory::OneDrive,
            UrlCategory::StreamingSite,
            UrlCategory::Other,
        ] {
            assert!(
                registry.select(category).is_some(),
                "no handler for {category:?}"
            );
        }
    }

    #[test]
    fn test_default_registry_provider_selection() {
        let registry = build_default_registry(Probe::new().unwrap());
        assert_eq!(
            registry.select(UrlCategory::GoogleDrive).unwrap().name(),
            "google_drive"
        );
        assert_eq!(
            registry.select(UrlCategory::Dropbox).unwrap().name(),
            "dropbox"
        );
        assert_eq!(
            registry.select(UrlCategory::OneDrive).unwrap().name(),
            "onedrive"
        );
        assert_eq!(
            registry.select(UrlCategory::StreamingSite).unwrap().name(),
            "streaming"
        );
        assert_eq!(
            registry.select(UrlCategory::DirectFile).unwrap().name(),
            "direct"
        );
        assert_eq!(registry.select(UrlCategory::Other).unwrap().name(), "generic");
    }

    #[test]
    fn test_default_registry_generic_is_lowest_priority() {
        let registry = build_default_registry(Probe::new().unwrap());
        let generic = registry.select_by_name("generic").unwrap();
        assert_eq!(generic.priority(), 0);
        for category in [
            UrlCategory::DirectFile,
            UrlCategory::GoogleDrive,
            UrlCategory::Dropbox,
            UrlCategory::OneDrive,
            UrlCategory::StreamingSite,
            UrlCategory::Other,
        ] {
            assert!(generic.supports(category));
        }
    }

    #[test]
    fn test_registry_debug_lists_names() {
        let registry = build_default_registry(Probe::new().unwrap());
        let debug = format!("{registry:?}");
        assert!(debug.contains("google_drive"));
        assert!(debug.contains("generic"));
    }
}
