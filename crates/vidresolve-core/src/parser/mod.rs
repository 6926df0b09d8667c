//! Document parsers
//!
//! Pure functions over fetched text: DooPlay WordPress pages and HLS master
//! playlists. Nothing here performs I/O.

pub mod dooplay;
pub mod hls;

pub use dooplay::{decode_html_entities, is_media_url, scan_media_urls};
pub use hls::{ManifestVariant, expand_manifest, parse_manifest};
