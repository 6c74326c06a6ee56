//! Segmentation worker binary.
//!
//! Usage: `vseg-worker <video> [background-image]`
//!
//! Exits 0 when the job completes, 75 when it failed for a transient reason,
//! 1 for any other failure and 2 on bad usage.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use vseg_models::ProcessingStatus;
use vseg_worker::logging::init_tracing;
use vseg_worker::metrics::install_exporter;
use vseg_worker::{
    backend_from_config, transcriber_from_config, FfmpegToolkit, JobExecutor, JobRequest, MediaToolkit, Orchestrator,
    ProgressStore, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // TLS for the storage and CI endpoints
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    let mut args = std::env::args().skip(1);
    let Some(video) = args.next().map(PathBuf::from) else {
        eprintln!("usage: vseg-worker <video> [background-image]");
        std::process::exit(2);
    };
    let background = args.next().map(PathBuf::from);

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        if let Err(e) = install_exporter(addr) {
            error!("{}", e);
            std::process::exit(1);
        }
        info!("Serving metrics on {}", addr);
    }

    let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::default());
    let backend = match backend_from_config(config.segmentation_backend, Arc::clone(&toolkit)) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to create segmentation backend: {}", e);
            std::process::exit(1);
        }
    };
    let transcriber = transcriber_from_config(config.asr_service);

    let mut request = JobRequest::new(video);
    if let Some(background) = background {
        request = request.with_background(background, config.composite_strategy);
    }

    let max_jobs = config.max_concurrent_jobs;
    let shutdown_timeout = config.shutdown_timeout;
    let orchestrator = Orchestrator::new(Arc::new(config), ProgressStore::new(), backend, transcriber, toolkit);
    let executor = Arc::new(JobExecutor::new(orchestrator, max_jobs));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown(shutdown_timeout).await;
        }
    });

    let record = executor.run_to_completion(request).await;

    let Some(record) = record else {
        error!("Job record disappeared");
        std::process::exit(1);
    };
    match serde_json::to_string_pretty(&record) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("Failed to serialize job record: {}", e),
    }

    if record.status != ProcessingStatus::Completed {
        std::process::exit(failure_exit_code(record.retryable));
    }
    info!("Worker finished");
}

/// `EX_TEMPFAIL` tells a supervisor the same job may be rerun.
fn failure_exit_code(retryable: bool) -> i32 {
    if retryable {
        75
    } else {
        1
    }
}
