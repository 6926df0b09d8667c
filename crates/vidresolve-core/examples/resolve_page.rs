//! Debug script to resolve a single content page
//!
//! Run with: cargo run --example resolve_page -p vidresolve-core -- <page-url> [config.toml]
//!
//! Set `RUST_LOG=vidresolve_core=debug` to watch each strategy run.

use vidresolve_core::{ResolutionOutcome, ResolverConfig, VideoResolver};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vidresolve_core=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(page_url) = args.next() else {
        eprintln!("usage: resolve_page <page-url> [config.toml]");
        return Ok(());
    };
    let config = match args.next() {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::default(),
    };

    let resolver = VideoResolver::with_config(config)?;
    println!("Resolving {}...\n", page_url);

    match resolver.resolve(&page_url).await {
        ResolutionOutcome::Success(videos) => {
            println!("✓ Found {} playable URLs:\n", videos.len());
            for (i, video) in videos.iter().enumerate() {
                println!("{}. [{}] {}", i + 1, video.quality, video.mirror_label);
                println!("   {}", video.url);
            }
        }
        ResolutionOutcome::NoDataFound(reason) => println!("✗ No playable media: {}", reason),
        ResolutionOutcome::NetworkError(reason) => println!("✗ Network error: {}", reason),
        ResolutionOutcome::ParseError(reason) => println!("✗ Parse error: {}", reason),
        ResolutionOutcome::SecurityRejected(reason) => println!("✗ Rejected: {}", reason),
    }

    let stats = resolver.cache_stats();
    println!(
        "\nCache: {} entries, {} URLs, mean age {:.1}s",
        stats.entry_count, stats.total_url_count, stats.average_age_seconds
    );

    Ok(())
}
