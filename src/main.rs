use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cellar_images::domain::{FailureReason, LoadState};
use cellar_images::infrastructure::{
    AppConfig, CliArgs, HttpImageFetcher, ImageLoader, LoaderStats, StorageManager,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err("Failed to load configuration")?;
    config.merge_with_args(args);
    Ok(config)
}

#[derive(Debug, Serialize)]
struct PhotoReport {
    pass: u32,
    url: String,
    state: &'static str,
    reason: Option<String>,
    object_url: Option<String>,
    content_type: Option<String>,
    size: Option<usize>,
    dimensions: Option<(u32, u32)>,
}

impl PhotoReport {
    fn new(pass: u32, url: &str, state: Option<LoadState>) -> Self {
        let state = state.unwrap_or(LoadState::Error(FailureReason::ShutDown));
        let mut report = Self {
            pass,
            url: url.to_string(),
            state: state.name(),
            reason: None,
            object_url: None,
            content_type: None,
            size: None,
            dimensions: None,
        };
        match state {
            LoadState::Loaded(handle) => {
                report.object_url = Some(handle.object_url.to_string());
                report.content_type.clone_from(&handle.content_type);
                report.size = Some(handle.size);
                report.dimensions = handle.dimensions;
            }
            LoadState::Error(reason) => report.reason = Some(reason.to_string()),
            LoadState::Loading => {}
        }
        report
    }
}

impl std::fmt::Display for PhotoReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let url = if self.url.is_empty() {
            "<none>"
        } else {
            &self.url
        };
        write!(f, "[pass {}] {:<7} {}", self.pass, self.state, url)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(object_url) = &self.object_url {
            write!(f, " -> {object_url}")?;
        }
        if let Some(content_type) = &self.content_type {
            write!(f, " {content_type}")?;
        }
        if let Some(size) = self.size {
            write!(f, " {size} bytes")?;
        }
        if let Some((width, height)) = self.dimensions {
            write!(f, " {width}x{height}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    photos: Vec<PhotoReport>,
    stats: LoaderStats,
}

async fn run_pass(loader: &ImageLoader, urls: &[String], pass: u32) -> Vec<PhotoReport> {
    let mut requests: Vec<_> = urls
        .iter()
        .map(|url| loader.request(Some(url.as_str())))
        .collect();

    let states = join_all(requests.iter_mut().map(|request| request.settled())).await;

    urls.iter()
        .zip(states)
        .map(|(url, state)| PhotoReport::new(pass, url, state))
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = cellar_images::VERSION, "Starting {}", cellar_images::NAME);

    if args.urls.is_empty() {
        warn!("No photo URLs given, nothing to load");
    }

    let fetcher = HttpImageFetcher::new(config.cache.timeout_secs, &config.cache.user_agent)?;
    let loader = ImageLoader::new(config.cache.loader_config(), Arc::new(fetcher))?;

    let mut photos = Vec::new();
    for pass in 1..=args.passes {
        let reports = run_pass(&loader, &args.urls, pass).await;
        if !args.json {
            for report in &reports {
                println!("{report}");
            }
        }
        photos.extend(reports);
    }

    let stats = loader.stats();
    if args.json {
        let output = RunReport { photos, stats };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{stats}");
    }

    loader.shutdown();
    Ok(())
}
