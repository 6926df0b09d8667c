//! Tauri commands for the video resolver
//!
//! This module contains all Tauri command implementations.

use tauri::State;
use vidresolve_core::{CacheStats, ResolutionOutcome};

use crate::ResolverState;

/// Resolve a content page into playable video URLs
///
/// # Arguments
/// * `state` - Managed ResolverState from Tauri
/// * `request_id` - Caller-chosen id used to cancel this call
/// * `page_url` - Content page URL
///
/// # Returns
/// The resolution outcome; failures are reported as outcome variants,
/// never as command errors
#[tauri::command]
pub async fn resolve_video(
    state: State<'_, ResolverState>,
    request_id: String,
    page_url: String,
) -> Result<ResolutionOutcome, String> {
    let guard = state.begin(&request_id);
    let outcome = state
        .resolver
        .resolve_with_cancel(&page_url, guard.token())
        .await;
    drop(guard);
    Ok(outcome)
}

/// Cancel an in-flight resolution
///
/// # Returns
/// `true` if a call with `request_id` was running
#[tauri::command]
pub fn cancel_resolve(state: State<'_, ResolverState>, request_id: String) -> bool {
    state.cancel(&request_id)
}

/// Drop every cached resolution
#[tauri::command]
pub fn clear_cache(state: State<'_, ResolverState>) {
    state.resolver.clear_cache();
}

/// Drop the cached resolution for one page
#[tauri::command]
pub fn evict_cache(state: State<'_, ResolverState>, page_url: String) {
    state.resolver.evict_cache(&page_url);
}

#[tauri::command]
pub fn cache_stats(state: State<'_, ResolverState>) -> CacheStats {
    state.resolver.cache_stats()
}

/// Replace the CDN mirror list used for hostname rewriting
///
/// Calls already in flight keep the list they started with.
///
/// # Errors
/// Returns error message as String if `mirrors` is empty
#[tauri::command]
pub fn set_cdn_mirrors(state: State<'_, ResolverState>, mirrors: Vec<String>) -> Result<(), String> {
    if mirrors.iter().all(|m| m.trim().is_empty()) {
        return Err("at least one CDN mirror is required".to_string());
    }
    state.resolver.cdn_mirrors().replace(mirrors);
    Ok(())
}
