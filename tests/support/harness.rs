//! Service wiring over a temp data directory and in-memory store.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use fetchkit::{
    Database, DownloadService, EngineConfig, EventPublisher, Probe, SqliteStore, ThrottlePolicy,
    TransferEngine, build_default_registry,
};

/// A fully wired service over throwaway storage.
pub struct Harness {
    pub service: Arc<DownloadService>,
    pub store: Arc<SqliteStore>,
    pub data_dir: PathBuf,
    _tmp: TempDir,
}

/// Builds a harness with the given engine configuration.
pub async fn harness_with_config(config: EngineConfig) -> Harness {
    let tmp = TempDir::new().expect("temp dir");
    let data_dir = tmp.path().to_path_buf();

    let db = Database::new(&data_dir.join("test.db")).await.expect("db");
    let store = Arc::new(SqliteStore::new(db));

    let throttle = ThrottlePolicy {
        min_delta_pct: config.progress_emit_min_delta_pct,
        max_silence: config.progress_emit_max_silence,
    };
    let engine = TransferEngine::new(config, store.clone()).expect("engine");
    let registry = Arc::new(build_default_registry(Probe::new().expect("probe")));
    let publisher = Arc::new(EventPublisher::new(throttle));

    let service = Arc::new(DownloadService::new(
        store.clone(),
        registry,
        engine,
        publisher,
        data_dir.clone(),
    ));

    Harness {
        service,
        store,
        data_dir,
        _tmp: tmp,
    }
}

/// Builds a harness with small chunks and fast polling, suited to tests.
pub async fn harness() -> Harness {
    harness_with_config(test_config()).await
}

/// An engine configuration scaled down for test fixtures: 1 KiB chunks and
/// a 100ms cancellation poll.
pub fn test_config() -> EngineConfig {
    use std::time::Duration;
    EngineConfig {
        chunk_size_tiers: vec![fetchkit::engine::ChunkSizeTier {
            min_file_size: 0,
            chunk_size: 1024,
        }],
        cancel_poll_interval: Duration::from_millis(100),
        ..EngineConfig::default()
    }
}
