use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blog_feed_cache::bootstrap::warm_cache;
use blog_feed_cache::cache::ContentCache;
use blog_feed_cache::config::Config;
use blog_feed_cache::controller::{FetchOutcome, PostListController};
use blog_feed_cache::feed::{convert_legacy_file, FeedLoader, FileFeedSource, PostPager};
use blog_feed_cache::links::{post_cover_url, share_url, ImageVariant};
use blog_feed_cache::model::{Label, PostRecord};
use blog_feed_cache::normalize::Normalizer;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting blog-feed-cache");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        feed = %config.feed_path.display(),
        shape = config.feed_shape.as_str(),
        page_size = config.page_size,
        "Configuration loaded"
    );

    let normalizer = Normalizer::default();

    if let Some(legacy) = &config.legacy_feed_path {
        if let Err(e) = convert_legacy_file(legacy, &config.feed_path, &normalizer).await {
            warn!(path = %legacy.display(), "Legacy feed conversion failed: {e:#}");
        }
    }

    let loader = FeedLoader::new(
        Arc::new(FileFeedSource::new(&config.feed_path)),
        config.feed_shape,
        normalizer,
    )
    .with_page_size(config.page_size);

    // The cache is optional: without it the list is served straight from the feed.
    let cache = open_cache(&config).await;

    if let Some(cache) = &cache {
        if config.cache_on_startup {
            let _ = warm_cache(&loader, cache).await;
        } else if config.read_from_cache {
            warn!("READ_FROM_CACHE is set without CACHE_ON_STARTUP; cached posts may be stale");
        }
    }

    let pager: Arc<dyn PostPager> = match cache {
        Some(cache) if config.read_from_cache => {
            info!("Serving posts from the content cache");
            Arc::new(cache.with_page_size(config.page_size))
        }
        None if config.read_from_cache => {
            warn!("Content cache unavailable, serving posts from the feed");
            Arc::new(loader)
        }
        _ => Arc::new(loader),
    };

    let controller = PostListController::new(pager);
    if let FetchOutcome::Failed(e) = controller.fetch_posts().await {
        anyhow::bail!("Could not load posts: {e}");
    }

    // Walk the list the way a scrolling reader would, one page at a time.
    loop {
        let posts = controller.posts();
        let Some(last) = posts.last() else {
            break;
        };
        match controller.load_more_posts_if_needed(last.id()).await {
            Some(FetchOutcome::Loaded { .. }) if controller.posts().len() > posts.len() => {}
            Some(FetchOutcome::Failed(e)) => {
                warn!("Stopped paging: {e}");
                break;
            }
            _ => break,
        }
    }

    let snapshot = controller.snapshot();
    for post in snapshot.posts.iter() {
        print_post(post);
    }
    info!(
        shown = snapshot.posts.len(),
        total = snapshot.total,
        pages = snapshot.page,
        "Done"
    );

    Ok(())
}

async fn open_cache(config: &Config) -> Option<ContentCache> {
    if let Some(parent) = config
        .database_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), "Failed to create database directory: {e}");
            return None;
        }
    }

    match ContentCache::open(&config.database_path).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Content cache disabled: {e}");
            None
        }
    }
}

fn print_post(post: &PostRecord) {
    let labels: Vec<&str> = post.labels().iter().map(Label::as_str).collect();
    println!(
        "{}  {}  ({})  [{}]  {} comments",
        post.formatted_publish_time(),
        post.title(),
        post.author(),
        labels.join(", "),
        post.comment_count()
    );
    if let Some(cover) = post_cover_url(post, ImageVariant::ListThumbnail) {
        println!("    cover: {cover}");
    }
    println!("    share: {}", share_url(post.id()));
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blog_feed_cache=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
