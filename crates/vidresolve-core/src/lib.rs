//! Video URL Resolver Core Library
//!
//! Turns a content page URL on a trusted streaming site into a ranked list
//! of directly playable video URLs (MP4 files or HLS manifests).
//!
//! # Overview
//!
//! This crate provides a complete resolution pipeline with:
//! - An HTTPS/trusted-domain security gate applied to every URL in and out
//! - A size-capped, cancellable HTTP reader
//! - Per-site providers (IMVBox, Namakade, generic DooPlay sites)
//! - Mirror racing with an early exit on top quality
//! - Throttled form submission and HLS manifest expansion
//! - An LRU result cache with a fixed TTL
//!
//! # Example
//!
//! ```no_run
//! use vidresolve_core::{ResolutionOutcome, Result, VideoResolver};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let resolver = VideoResolver::new()?;
//!
//!     match resolver.resolve("https://farsiland.com/movies/yek-shab/").await {
//!         ResolutionOutcome::Success(videos) => {
//!             for video in &videos {
//!                 println!("[{}] {} ({})", video.quality, video.url, video.mirror_label);
//!             }
//!         }
//!         other => eprintln!("resolution failed: {:?}", other),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Outcomes
//!
//! [`VideoResolver::resolve`] never returns an error. Every call yields
//! exactly one [`ResolutionOutcome`]; only `Success` results are cached.
//!
//! **Important:** resolved URLs often carry short-lived tokens. The cache TTL
//! (five minutes by default) should stay below the token lifetime of the sites
//! being resolved.

mod cache;
mod cdn;
mod client;
mod config;
mod error;
mod forms;
pub mod parser;
pub mod providers;
mod race;
mod resolver;
mod security;
mod types;
pub mod url;

// Re-export cache types
pub use cache::{Clock, LruTtlCache, ManualClock, ResultCache, SystemClock};

// Re-export HTTP types
pub use client::{BodyKind, BoundedReader, Fetch, FetchMethod, FetchRequest};

// Re-export configuration
pub use config::{
    CacheConfig, CdnMirrors, FetchLimits, FormConfig, RaceConfig, ResolverConfig, USER_AGENT,
};

// Re-export error types
pub use error::{ResolveError, Result};

// Re-export pipeline building blocks
pub use cdn::CdnRewriter;
pub use forms::{FormResolver, FormSubmission};
pub use race::{MirrorRacer, RaceCandidate};
pub use security::SecurityGate;

// Re-export main resolver API
pub use resolver::VideoResolver;

// Re-export data types
pub use types::{CacheStats, Quality, ResolutionOutcome, ResolvedVideo, rank_videos};
