use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use error::AppError;
use futures::future::join_all;
use imago_engine::{
    CacheConfig, DownloaderConfig, Fetch, ImageDownloader, ImageRequest, TransportConfig,
    cache_key,
};
use indicatif::MultiProgress;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod error;
mod utils;

use cli::CliArgs;
use utils::progress::ProgressManager;
use utils::{create_dirs, format_bytes, image_path, parse_headers, parse_size};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging, RUST_LOG wins over --verbose
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    info!("Imago image downloader - Part of the rust-srec project by hua0512");
    info!("==================================================================");

    let cache = if args.no_cache {
        info!("Memory cache disabled (--no-cache flag)");
        None
    } else {
        let cache = CacheConfig::new(
            parse_size(&args.memory_capacity)?,
            parse_size(&args.preferred_usage)?,
        );
        info!(
            "Memory cache configuration: capacity={}, purge target={}",
            format_bytes(cache.memory_capacity),
            format_bytes(cache.preferred_memory_usage_after_purge)
        );
        Some(cache)
    };

    // Log HTTP timeout settings
    info!(
        "HTTP timeout configuration: overall={}s, connect={}s",
        args.timeout, args.connect_timeout
    );

    let mut transport = TransportConfig {
        timeout: Duration::from_secs(args.timeout),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..Default::default()
    };
    transport.merge_headers(&parse_headers(&args.headers)?);

    let config = DownloaderConfig {
        max_active_downloads: args.max_active,
        prioritization: args.prioritization,
        cache,
        transport,
    };
    let downloader = ImageDownloader::builder().with_config(config).build()?;

    // Determine output directory
    let output_dir = args.output_dir.unwrap_or_else(|| PathBuf::from("./images"));
    create_dirs(&output_dir).await?;

    let multi = MultiProgress::new();
    let progress_manager = if args.show_progress {
        ProgressManager::new(multi)
    } else {
        ProgressManager::new_disabled(multi)
    };

    let mut pending = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let request = ImageRequest::get(url)
            .map_err(|e| AppError::InvalidInput(format!("Invalid URL '{url}': {e}")))?;
        let key = cache_key(&request, None);

        let fetch = downloader.request_download(request, None);
        if let Fetch::Pending(handle) = &fetch {
            progress_manager.track(url, handle.progress());
        }
        pending.push((url.clone(), key, fetch));
    }

    info!(
        requested = pending.len(),
        active = downloader.active_downloads(),
        queued = downloader.queued_downloads(),
        "Downloads submitted"
    );

    let results = join_all(
        pending
            .into_iter()
            .map(|(url, key, fetch)| async move { (url, key, fetch.image().await) }),
    )
    .await;

    let total = results.len();
    let mut failed = 0;
    let mut bytes_written = 0;
    let mut written = HashSet::new();
    for (url, key, result) in results {
        let image = match result {
            Ok(image) => image,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to download image");
                failed += 1;
                continue;
            }
        };

        // Repeated URLs resolve to the same image; write it once
        if !written.insert(key.clone()) {
            debug!(url = %url, "Image already written");
            continue;
        }

        let path = image_path(&output_dir, &key, &image);
        tokio::fs::write(&path, image.data()).await?;
        bytes_written += image.byte_size();
        info!(url = %url, path = %path.display(), size = %format_bytes(image.byte_size()), "Saved image");
    }

    info!(
        "Finished: {} of {} downloads succeeded, {} written to {}",
        total - failed,
        total,
        format_bytes(bytes_written),
        output_dir.display()
    );

    if failed > 0 {
        return Err(AppError::Incomplete { failed, total });
    }
    Ok(())
}
