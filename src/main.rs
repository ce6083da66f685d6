use clap::{Parser, Subcommand};
use image_loader::cache::{DiskCache, ImageCache, MemoryCache};
use image_loader::config::{self, LoaderConfig};
use image_loader::imaging::{Encoder, LanczosResizer};
use image_loader::transport::{FsLoader, ReqwestFetcher, Scheme, TransportSelector, data_url};
use image_loader::{
    CacheOutcome, ImageRequest, Pipeline, RequestDescriptor, Response, TransformParams,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "image-loader")]
#[command(about = "Fetch, downscale and re-encode images with a persistent cache")]
#[command(long_about = "\
Fetch, downscale and re-encode images with a persistent cache

Each image is looked up in the cache first. On a miss the original is loaded
(data: URL, file path or http(s) URL), resized, encoded as PNG or JPEG
(whichever is smaller within the configured ratio) and written back.

Local files use their modification time as the cache timestamp; pass
--timestamp for network sources to enable caching them.

Run 'image-loader gen-config' to generate a documented config file.
Set RUST_LOG=debug to trace every phase of the request.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load one image and print the JSON response
    Fetch(FetchArgs),
    /// Print a stock config file with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct FetchArgs {
    /// data: URL, file path, file:// URL or http(s) URL
    locator: String,

    /// Uniform scale factor applied before the other limits
    #[arg(long)]
    scale: Option<f64>,
    /// Exact output width
    #[arg(long)]
    width: Option<u32>,
    /// Exact output height
    #[arg(long)]
    height: Option<u32>,
    /// Upper bound on the output width, keeping aspect ratio
    #[arg(long)]
    max_width: Option<u32>,
    /// Upper bound on the output height, keeping aspect ratio
    #[arg(long)]
    max_height: Option<u32>,

    /// Freshness timestamp of the source; cached renders older than this are refetched
    #[arg(long)]
    timestamp: Option<i64>,
    /// Bypass the cache and drop any cached render of this request
    #[arg(long)]
    no_cache: bool,
    /// Scheduling priority (lower is more urgent)
    #[arg(long)]
    priority: Option<i32>,
    /// Identifier echoed back in the response
    #[arg(long, default_value = "cli")]
    task_id: String,

    /// Write the encoded image here instead of printing the response
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Config file (defaults apply without one)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_log = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = FmtSubscriber::builder()
        .compact()
        .with_file(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_log);
    tracing::subscriber::set_global_default(subscriber.finish())?;

    let cli = Cli::parse();

    match cli.command {
        Command::Fetch(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(fetch(args))?;
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => LoaderConfig::default(),
    };

    let cache: Arc<dyn ImageCache> = if config.cache.enabled {
        Arc::new(DiskCache::open(&config.cache.dir).await?)
    } else {
        Arc::new(MemoryCache::new())
    };
    let transport = TransportSelector::new(
        Arc::new(FsLoader::new()),
        Arc::new(ReqwestFetcher::new(&config.network)?),
    );
    let pipeline = Arc::new(Pipeline::new(
        transport,
        Arc::new(LanczosResizer::new()),
        Encoder::new(config.encode_policy()),
    ));

    let mut descriptor = RequestDescriptor::new(args.locator.clone(), args.task_id.clone())
        .with_transform(TransformParams {
            scale: args.scale,
            width: args.width,
            height: args.height,
            max_width: args.max_width,
            max_height: args.max_height,
        });
    if !args.no_cache {
        let timestamp = match args.timestamp {
            Some(ts) => Some(ts),
            None => source_timestamp(&args.locator).await,
        };
        descriptor = descriptor.with_cache(timestamp);
    }
    if let Some(priority) = args.priority {
        descriptor = descriptor.with_priority(priority);
    }

    let (tx, rx) = tokio::sync::oneshot::channel();
    let request = ImageRequest::new(descriptor, cache, pipeline, move |response| {
        let _ = tx.send(response);
    });
    debug!("Request {} at priority {}", request.task_id(), request.priority());

    let interrupt = request.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            interrupt.cancel();
        }
    });

    match request.load_from_cache_and_process().await {
        CacheOutcome::Hit => info!("Served {} from cache", args.locator),
        CacheOutcome::Miss => {
            request
                .download_and_process(|| debug!("Download finished"))?
                .wait()
                .await;
        }
        CacheOutcome::Cancelled => {}
    }

    let Ok(response) = rx.await else {
        return Err("request cancelled".into());
    };

    match (&response, &args.output) {
        (Response::Success { data, .. }, Some(path)) => {
            let decoded = data_url::decode(data)?;
            tokio::fs::write(path, &decoded.bytes).await?;
            info!(
                "Wrote {} bytes of {} to {}",
                decoded.bytes.len(),
                decoded.content_type,
                path.display()
            );
        }
        _ => println!("{}", serde_json::to_string(&response)?),
    }

    if response.is_success() {
        Ok(())
    } else {
        Err(format!("failed to load {}", args.locator).into())
    }
}

/// Cache timestamp for sources that carry one: the modification time of
/// local files in milliseconds, and a constant for `data:` URLs, whose content
/// is part of the cache key.
async fn source_timestamp(locator: &str) -> Option<i64> {
    if Scheme::of(locator) == Scheme::Network {
        return None;
    }
    if data_url::is_data_url(locator) {
        return Some(1);
    }
    let path = locator.strip_prefix("file://").unwrap_or(locator);
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    let millis = modified.duration_since(UNIX_EPOCH).ok()?.as_millis();
    i64::try_from(millis).ok()
}
