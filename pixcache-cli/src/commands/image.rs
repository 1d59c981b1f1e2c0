//! Image commands: `get` and `prefetch`.

use clap::Args;
use pixcache::prefetch::{PrefetchOutcome, PrefetchResult};
use pixcache::service::{GetImageOptions, ImageCache};
use tokio::sync::broadcast::error::RecvError;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for `get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Original image URI
    pub uri: String,

    /// CDN variant (defaults to the configured default variant when --cdn-id is set)
    #[arg(long)]
    pub variant: Option<String>,

    /// CDN image id; the CDN is tried before the original URI
    #[arg(long)]
    pub cdn_id: Option<String>,

    /// Also fetch the other configured variants before exiting
    #[arg(long)]
    pub prefetch_related: bool,
}

/// Arguments for `prefetch`.
#[derive(Debug, Args)]
pub struct PrefetchArgs {
    /// Original image URI
    pub uri: String,

    /// CDN image id
    #[arg(long)]
    pub cdn_id: Option<String>,

    /// Variant to fetch; repeat for several. Defaults to the image itself.
    #[arg(long = "variant")]
    pub variants: Vec<String>,
}

/// Resolve one image and print its local path.
pub async fn run_get(runner: &CliRunner, args: GetArgs) -> Result<(), CliError> {
    runner.log_startup("get");
    let cache = runner.open_cache().await?;

    let options = GetImageOptions {
        variant: args.variant,
        cdn_id: args.cdn_id,
        prefetch_related: args.prefetch_related,
    };
    let result = cache.get_image(&args.uri, options).await;

    if args.prefetch_related {
        cache.wait_for_prefetch().await;
    }
    cache.shutdown().await;

    let path = result.map_err(|error| CliError::Fetch {
        uri: args.uri.clone(),
        error,
    })?;
    println!("{}", path.display());
    Ok(())
}

/// Queue variants, wait for them, and report each outcome.
pub async fn run_prefetch(runner: &CliRunner, args: PrefetchArgs) -> Result<(), CliError> {
    runner.log_startup("prefetch");
    let cache = runner.open_cache().await?;
    let mut outcomes = cache.prefetch_outcomes();

    let queued = cache.prefetch(&args.uri, args.cdn_id.as_deref(), &args.variants);
    if queued == 0 {
        if cache.config().prefetch_enabled {
            println!("Nothing to prefetch: already cached");
        } else {
            println!("Prefetch is disabled in the configuration");
        }
        cache.shutdown().await;
        return Ok(());
    }

    let (succeeded, failed) = report_outcomes(&cache, &mut outcomes, queued).await;
    cache.shutdown().await;

    println!();
    println!("Prefetched {} of {} ({} failed)", succeeded, queued, failed);
    Ok(())
}

/// Print outcomes as they arrive until `expected` have been seen.
async fn report_outcomes(
    cache: &ImageCache,
    outcomes: &mut tokio::sync::broadcast::Receiver<PrefetchOutcome>,
    expected: usize,
) -> (usize, usize) {
    let mut succeeded = 0;
    let mut failed = 0;

    while succeeded + failed < expected {
        match outcomes.recv().await {
            Ok(outcome) => {
                match &outcome.result {
                    PrefetchResult::Completed => {
                        succeeded += 1;
                        println!("  ok      {} ({})", outcome.uri, outcome.key);
                    }
                    PrefetchResult::Failed(reason) => {
                        failed += 1;
                        println!("  failed  {} ({}): {}", outcome.uri, outcome.key, reason);
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed = missed, "Missed prefetch outcomes");
                cache.wait_for_prefetch().await;
                let stats = cache.prefetch_stats();
                return (stats.completed as usize, stats.failed as usize);
            }
            Err(RecvError::Closed) => break,
        }
    }

    (succeeded, failed)
}
