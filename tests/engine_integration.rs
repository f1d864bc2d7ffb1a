//! End-to-end transfer scenarios against a mock HTTP origin.
//!
//! Drives the service boundary (submit → execute) so every scenario
//! exercises classification, handler resolution, the transfer engine, the
//! store, and event publishing together.

use std::time::Duration;

use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fetchkit::{ChunkStatus, JobStatus};

mod support;
use support::harness::{harness, harness_with_config, test_config};
use support::range_server::RangeResponder;

/// Deterministic test body: no repeated 1 KiB blocks, so a misordered
/// merge can never produce identical bytes.
fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn mount_head(server: &MockServer, len: usize, ranges: bool) {
    let mut template = ResponseTemplate::new(200)
        .insert_header("Content-Length", len.to_string().as_str())
        .insert_header("Content-Type", "application/octet-stream");
    if ranges {
        template = template.insert_header("Accept-Ranges", "bytes");
    }
    Mock::given(method("HEAD"))
        .respond_with(template)
        .mount(server)
        .await;
}

// ==================== Chunked Success ====================

#[tokio::test]
async fn test_chunked_download_produces_identical_artifact() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(4096 + 100); // 5 chunks at the 1 KiB test tier

    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(RangeResponder::new(body.clone()))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/data.bin", server.uri()), 1)
        .await
        .unwrap();
    assert_eq!(job.status(), JobStatus::Pending);

    let done = h.service.execute(&job.job_id).await.unwrap();
    assert_eq!(done.status(), JobStatus::Completed);
    assert!((done.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(done.downloaded_bytes as usize, body.len());

    let saved = done.save_path.expect("save path recorded");
    let artifact = tokio::fs::read(&saved).await.unwrap();
    assert_eq!(artifact, body, "artifact must be byte-identical");

    // Chunk records are deleted after a successful merge, and the per-job
    // scratch directory is gone.
    use fetchkit::JobStore;
    assert!(h.store.chunks(done.id).await.unwrap().is_empty());
    assert!(!h.data_dir.join("tmp").join(&done.job_id).exists());
}

#[tokio::test]
async fn test_chunked_plan_respects_concurrency_bound() {
    // Concurrency 2 over 5 chunks still completes; the bound only shapes
    // scheduling, never the result.
    let mut config = test_config();
    config.max_concurrent_chunks = 2;
    let h = harness_with_config(config).await;

    let server = MockServer::start().await;
    let body = patterned_body(5 * 1024);
    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .and(path("/data.bin"))
        .respond_with(RangeResponder::new(body.clone()))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/data.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Completed);
    let artifact = tokio::fs::read(done.save_path.unwrap()).await.unwrap();
    assert_eq!(artifact, body);
}

// ==================== Sequential Fallback ====================

#[tokio::test]
async fn test_unknown_size_falls_back_to_sequential() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(3000);

    // Probe cannot learn anything: HEAD and ranged GET both fail.
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/plain.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/plain.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Completed);
    // Total size in the final record equals bytes actually written.
    assert_eq!(done.total_size, Some(body.len() as i64));
    assert_eq!(done.downloaded_bytes as usize, body.len());

    let artifact = tokio::fs::read(done.save_path.unwrap()).await.unwrap();
    assert_eq!(artifact, body);

    // No chunk records were ever created for a sequential transfer.
    use fetchkit::JobStore;
    assert!(h.store.chunks(done.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_no_range_support_with_known_size_is_sequential() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(4096); // would be 4 chunks if ranges worked

    mount_head(&server, body.len(), false).await;
    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/file.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Completed);
    let artifact = tokio::fs::read(done.save_path.unwrap()).await.unwrap();
    assert_eq!(artifact, body);
}

#[tokio::test]
async fn test_zero_length_origin_completes() {
    let h = harness().await;
    let server = MockServer::start().await;

    mount_head(&server, 0, true).await;
    Mock::given(method("GET"))
        .and(path("/empty.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/empty.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Completed);
    assert!((done.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(done.downloaded_bytes, 0);
}

// ==================== Cancellation ====================

#[tokio::test]
async fn test_cancel_mid_transfer_discards_partial_state() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(64 * 1024);

    // Degrade the probe so the transfer takes the sequential path, then
    // delay the body long enough to cancel mid-flight.
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/slow.bin", server.uri()), 1)
        .await
        .unwrap();

    let service = h.service.clone();
    let token = job.job_id.clone();
    let exec = tokio::spawn(async move { service.execute(&token).await });

    // Wait until the job is past resolution, then cancel.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(h.service.cancel(&job.job_id).await.unwrap());

    let done = exec.await.unwrap().unwrap();
    assert_eq!(done.status(), JobStatus::Cancelled);
    assert!(done.error_message.is_none(), "cancellation is not an error");

    // No artifact, no scratch leftovers.
    assert!(!h.data_dir.join("tmp").join(&done.job_id).exists());
    let owner_dir = h.data_dir.join("files").join("1");
    let artifact_count = match tokio::fs::read_dir(&owner_dir).await {
        Ok(mut entries) => {
            let mut count = 0;
            while entries.next_entry().await.unwrap().is_some() {
                count += 1;
            }
            count
        }
        Err(_) => 0,
    };
    assert_eq!(artifact_count, 0, "cancelled job must not produce artifacts");
}

#[tokio::test]
async fn test_cancel_inactive_job_returns_false() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(100);
    mount_head(&server, body.len(), false).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/f.bin", server.uri()), 1)
        .await
        .unwrap();
    h.service.execute(&job.job_id).await.unwrap();

    assert!(!h.service.cancel(&job.job_id).await.unwrap());
}

// ==================== Retry Exhaustion ====================

#[tokio::test]
async fn test_single_chunk_failure_beyond_budget_fails_job() {
    let mut config = test_config();
    config.chunk_retry_limit = 2; // keep backoff time in check
    let h = harness_with_config(config).await;

    let server = MockServer::start().await;
    let body = patterned_body(4096); // 4 chunks; chunk 2 covers 2048-3071

    mount_head(&server, body.len(), true).await;
    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(RangeResponder::new(body.clone()).failing_starts(vec![2048]))
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/flaky.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Failed);
    let error = done.error_message.expect("failure detail recorded");
    assert!(
        error.contains("2048-3071"),
        "error must name the failing range: {error}"
    );

    // The other three chunks stay completed with their temp files intact,
    // ready for a later resume.
    use fetchkit::JobStore;
    let chunks = h.store.chunks(done.id).await.unwrap();
    assert_eq!(chunks.len(), 4);
    for chunk in &chunks {
        if chunk.chunk_index == 2 {
            assert_eq!(chunk.status(), ChunkStatus::Failed);
        } else {
            assert_eq!(chunk.status(), ChunkStatus::Completed);
            let len = tokio::fs::metadata(&chunk.temp_path).await.unwrap().len();
            assert_eq!(len, chunk.len(), "completed temp file preserved");
        }
    }
}

// ==================== Resume ====================

#[tokio::test]
async fn test_resume_skips_confirmed_bytes() {
    let h = harness().await;
    let server = MockServer::start().await;
    let body = patterned_body(4096); // 4 chunks of 1 KiB

    mount_head(&server, body.len(), true).await;
    let responder = RangeResponder::new(body.clone());
    let requested = responder.requested();
    Mock::given(method("GET"))
        .and(path("/resumable.bin"))
        .respond_with(responder)
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/resumable.bin", server.uri()), 1)
        .await
        .unwrap();

    // Seed prior-attempt state: chunk 0 fully confirmed, chunk 1 half done.
    let scratch = h.data_dir.join("tmp").join(&job.job_id);
    tokio::fs::create_dir_all(&scratch).await.unwrap();
    let specs: Vec<fetchkit::ChunkSpec> = (0..4u32)
        .map(|i| fetchkit::ChunkSpec {
            index: i,
            start: u64::from(i) * 1024,
            end: u64::from(i) * 1024 + 1023,
        })
        .collect();
    let temp_paths: Vec<String> = (0..4)
        .map(|i| scratch.join(format!("chunk_{i}.part")).to_string_lossy().into_owned())
        .collect();
    use fetchkit::JobStore;
    let chunks = h.store.insert_chunks(job.id, &specs, &temp_paths).await.unwrap();

    tokio::fs::write(&temp_paths[0], &body[0..1024]).await.unwrap();
    h.store
        .set_chunk_status(chunks[0].id, ChunkStatus::Completed)
        .await
        .unwrap();
    h.store.update_chunk_progress(chunks[0].id, 1024).await.unwrap();

    tokio::fs::write(&temp_paths[1], &body[1024..1536]).await.unwrap();
    h.store.update_chunk_progress(chunks[1].id, 512).await.unwrap();

    let done = h.service.execute(&job.job_id).await.unwrap();
    assert_eq!(done.status(), JobStatus::Completed);

    let artifact = tokio::fs::read(done.save_path.unwrap()).await.unwrap();
    assert_eq!(artifact, body, "resumed artifact must be byte-identical");

    let log = requested.lock().unwrap();
    assert!(
        !log.iter().any(|r| r.starts_with("bytes=0-")),
        "completed chunk 0 must never be re-requested: {log:?}"
    );
    assert!(
        log.iter().any(|r| r == "bytes=1536-2047"),
        "partial chunk 1 must resume from its confirmed offset: {log:?}"
    );
    assert!(
        !log.iter().any(|r| r == "bytes=1024-2047"),
        "partial chunk 1 must not restart from its original start: {log:?}"
    );
}

// ==================== Wall Clock ====================

#[tokio::test]
async fn test_wall_clock_ceiling_fails_job() {
    let mut config = test_config();
    config.job_wall_clock_timeout = Duration::from_millis(300);
    let h = harness_with_config(config).await;

    let server = MockServer::start().await;
    let body = patterned_body(1024);
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(header_exists("range"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/stuck.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body)
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let job = h
        .service
        .submit(&format!("{}/stuck.bin", server.uri()), 1)
        .await
        .unwrap();
    let done = h.service.execute(&job.job_id).await.unwrap();

    assert_eq!(done.status(), JobStatus::Failed);
    let error = done.error_message.unwrap();
    assert!(error.contains("wall-clock"), "got: {error}");
}
