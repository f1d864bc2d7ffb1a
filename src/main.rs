//! CLI entry point for fetchkit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use fetchkit::progress::Event;
use fetchkit::{
    Database, DownloadService, EngineConfig, EventPublisher, JobStatus, Probe, SqliteStore,
    ThrottlePolicy, TransferEngine, build_default_registry,
};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", args.data_dir.display()))?;
    let db = Database::new(&args.data_dir.join("fetchkit.db"))
        .await
        .context("opening job database")?;
    let store = Arc::new(SqliteStore::new(db));

    let mut config = EngineConfig::default();
    if let Command::Get { concurrency, .. } = &args.command {
        config.max_concurrent_chunks = usize::from(*concurrency);
    }
    let throttle = ThrottlePolicy {
        min_delta_pct: config.progress_emit_min_delta_pct,
        max_silence: config.progress_emit_max_silence,
    };

    let engine = TransferEngine::new(config, store.clone()).context("building transfer engine")?;
    let registry = Arc::new(build_default_registry(
        Probe::new().context("building probe client")?,
    ));
    let publisher = Arc::new(EventPublisher::new(throttle));
    let service = DownloadService::new(
        store,
        registry,
        engine,
        publisher,
        args.data_dir.clone(),
    );

    match args.command {
        Command::Get { url, .. } => get(&service, &url, args.owner, args.quiet).await,
        Command::Probe { url } => probe(&service, &url).await,
        Command::Status { job_id } => status(&service, &job_id).await,
        Command::Cancel { job_id } => cancel(&service, &job_id).await,
        Command::Resume { job_id } => resume(&service, &job_id, args.quiet).await,
        Command::List { status } => list(&service, args.owner, status.as_deref()).await,
        Command::Watch { job_id } => watch(&service, &job_id).await,
    }
}

async fn get(service: &DownloadService, url: &str, owner: i64, quiet: bool) -> Result<()> {
    let job = service.submit(url, owner).await?;
    println!("submitted {}", job.job_id);
    run_to_completion(service, &job.job_id, quiet).await
}

async fn resume(service: &DownloadService, job_id: &str, quiet: bool) -> Result<()> {
    let job = service.resume(job_id).await?;
    println!("resuming {}", job.job_id);
    run_to_completion(service, &job.job_id, quiet).await
}

/// Executes a job while rendering its event stream as a progress bar.
async fn run_to_completion(service: &DownloadService, job_id: &str, quiet: bool) -> Result<()> {
    let mut subscription = service.subscribe(job_id).await?;
    let renderer = (!quiet).then(|| {
        tokio::spawn(async move {
            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {percent:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            while let Some(event) = subscription.next().await {
                render_event(&bar, &event);
                if event.is_terminal() {
                    break;
                }
            }
            bar.finish_and_clear();
        })
    });

    let job = service.execute(job_id).await?;
    if let Some(renderer) = renderer {
        let _ = renderer.await;
    }

    match job.status() {
        JobStatus::Completed => {
            println!(
                "completed: {} ({} bytes)",
                job.save_path.unwrap_or_default(),
                job.downloaded_bytes
            );
            Ok(())
        }
        JobStatus::Cancelled => {
            println!("cancelled");
            Ok(())
        }
        status => {
            bail!(
                "job {job_id} ended {status}: {}",
                job.error_message.unwrap_or_else(|| "unknown error".to_string())
            );
        }
    }
}

fn render_event(bar: &ProgressBar, event: &Event) {
    match event {
        Event::Progress {
            progress,
            downloaded,
            speed_bps,
            eta_seconds,
            ..
        } => {
            if let Some(pct) = progress {
                bar.set_position(*pct as u64);
            }
            let speed = speed_bps
                .map(|s| format!("{:.1} KiB/s", s as f64 / 1024.0))
                .unwrap_or_default();
            let eta = eta_seconds.map(|e| format!("eta {e}s")).unwrap_or_default();
            bar.set_message(format!("{downloaded} B {speed} {eta}"));
        }
        Event::Failed { error, .. } => bar.set_message(format!("failed: {error}")),
        _ => {}
    }
}

async fn probe(service: &DownloadService, url: &str) -> Result<()> {
    let preview = service.probe(url).await?;
    if preview.downloadable {
        println!("downloadable: yes");
        println!(
            "category:     {}",
            preview.category.map(|c| c.to_string()).unwrap_or_default()
        );
        println!("filename:     {}", preview.filename.unwrap_or_default());
        println!(
            "size:         {}",
            preview
                .size
                .map_or_else(|| "unknown".to_string(), |s| s.to_string())
        );
        println!(
            "mime type:    {}",
            preview.mime_type.unwrap_or_else(|| "unknown".to_string())
        );
        println!("ranges:       {}", if preview.accepts_ranges { "yes" } else { "no" });
    } else {
        println!("downloadable: no");
        println!(
            "reason:       {}",
            preview.reason.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(())
}

async fn status(service: &DownloadService, job_id: &str) -> Result<()> {
    let job = service.status(job_id).await?;
    println!("{job}");
    println!(
        "  progress: {:.2}% ({} of {})",
        job.progress,
        job.downloaded_bytes,
        job.total_size
            .map_or_else(|| "unknown".to_string(), |t| t.to_string())
    );
    if let Some(error) = &job.error_message {
        println!("  error: {error}");
    }
    if let Some(path) = &job.save_path {
        println!("  saved: {path}");
    }
    Ok(())
}

async fn cancel(service: &DownloadService, job_id: &str) -> Result<()> {
    if service.cancel(job_id).await? {
        println!("cancelled {job_id}");
    } else {
        println!("{job_id} is not active; nothing to cancel");
    }
    Ok(())
}

async fn list(service: &DownloadService, owner: i64, status: Option<&str>) -> Result<()> {
    let filter = status
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;
    let jobs = service.list(owner, filter).await?;
    if jobs.is_empty() {
        println!("no jobs");
        return Ok(());
    }
    for job in jobs {
        println!(
            "{}  {:<11}  {:>6.2}%  {}",
            job.job_id,
            job.status().to_string(),
            job.progress,
            job.url
        );
    }
    Ok(())
}

async fn watch(service: &DownloadService, job_id: &str) -> Result<()> {
    let mut subscription = service.subscribe(job_id).await?;
    while let Some(event) = subscription.next().await {
        println!("{}", serde_json::to_string(&event)?);
        if event.is_terminal() {
            break;
        }
    }
    Ok(())
}
