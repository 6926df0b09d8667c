//! Video Resolver Tauri Integration
//!
//! Provides Tauri plugin for frontend integration with the video resolver.
//!
//! # Usage
//!
//! Register the plugin in your Tauri application:
//!
//! ```ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(vidresolve_tauri::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
//!
//! Then invoke commands from the frontend:
//!
//! ```javascript
//! import { invoke } from '@tauri-apps/api/core';
//!
//! // Resolve a page; the request id lets the UI cancel it later
//! const outcome = await invoke('plugin:vidresolve|resolve_video', {
//!   requestId: 'tab-1',
//!   pageUrl: 'https://farsiland.com/movies/yek-shab/'
//! });
//!
//! // Abandon an in-flight resolution
//! await invoke('plugin:vidresolve|cancel_resolve', { requestId: 'tab-1' });
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tauri::{
    Manager, Runtime,
    plugin::{Builder, TauriPlugin},
};
use tokio_util::sync::CancellationToken;
use vidresolve_core::{ResolverConfig, VideoResolver};

mod commands;

/// Shared resolver plus the cancellation tokens of in-flight calls
///
/// `VideoResolver` is internally synchronized, so commands share it through
/// an `Arc` without a lock; only the in-flight map is guarded.
pub struct ResolverState {
    pub(crate) resolver: Arc<VideoResolver>,
    pub(crate) in_flight: Mutex<HashMap<String, InFlight>>,
    next_call: AtomicU64,
}

/// Token of one running call, tagged so a finished call cannot remove
/// the entry of a newer call reusing its request id
pub(crate) struct InFlight {
    pub(crate) call: u64,
    pub(crate) token: CancellationToken,
}

impl ResolverState {
    /// Create a new ResolverState with the given configuration
    ///
    /// # Errors
    /// Returns error string if the configuration is invalid or the HTTP
    /// client cannot be built
    pub fn with_config(config: ResolverConfig) -> Result<Self, String> {
        let resolver = VideoResolver::with_config(config).map_err(|e| e.to_string())?;
        Ok(Self {
            resolver: Arc::new(resolver),
            in_flight: Mutex::new(HashMap::new()),
            next_call: AtomicU64::new(0),
        })
    }

    /// Create a new ResolverState with default configuration
    pub fn new() -> Result<Self, String> {
        Self::with_config(ResolverConfig::default())
    }

    /// Registers a token for `request_id`, cancelling any previous call
    /// still running under the same id
    ///
    /// The entry is removed when the returned guard drops, including when
    /// the command future is abandoned before it completes.
    pub(crate) fn begin(&self, request_id: &str) -> InFlightGuard<'_> {
        let call = self.next_call.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let entry = InFlight {
            call,
            token: token.clone(),
        };
        if let Some(previous) = self.in_flight.lock().insert(request_id.to_string(), entry) {
            previous.token.cancel();
        }
        InFlightGuard {
            state: self,
            request_id: request_id.to_string(),
            call,
            token,
        }
    }

    /// Forgets `request_id` if it still belongs to `call`
    fn finish(&self, request_id: &str, call: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(request_id).is_some_and(|entry| entry.call == call) {
            in_flight.remove(request_id);
        }
    }

    /// Cancels the call registered under `request_id`
    ///
    /// # Returns
    /// `true` if a call was in flight
    pub(crate) fn cancel(&self, request_id: &str) -> bool {
        match self.in_flight.lock().remove(request_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Registration of one running call; unregisters it on drop
pub(crate) struct InFlightGuard<'a> {
    state: &'a ResolverState,
    request_id: String,
    call: u64,
    token: CancellationToken,
}

impl InFlightGuard<'_> {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.state.finish(&self.request_id, self.call);
    }
}

/// Configuration file read at plugin setup, relative to the app config dir
const CONFIG_FILE: &str = "vidresolve.toml";

fn load_config(dir: Option<PathBuf>) -> ResolverConfig {
    let Some(path) = dir.map(|d| d.join(CONFIG_FILE)) else {
        return ResolverConfig::default();
    };
    match ResolverConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid resolver config, using defaults");
            ResolverConfig::default()
        }
    }
}

/// Initialize the vidresolve plugin
///
/// Reads `vidresolve.toml` from the app config directory when present.
///
/// # Returns
/// A configured TauriPlugin ready to be registered with the Tauri application
///
/// # Example
/// ```ignore
/// tauri::Builder::default()
///     .plugin(vidresolve_tauri::init())
///     .run(tauri::generate_context!())
///     .expect("error while running tauri application");
/// ```
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("vidresolve")
        .invoke_handler(tauri::generate_handler![
            commands::resolve_video,
            commands::cancel_resolve,
            commands::clear_cache,
            commands::evict_cache,
            commands::cache_stats,
            commands::set_cdn_mirrors
        ])
        .setup(|app, _api| {
            let config = load_config(app.path().app_config_dir().ok());
            let state = ResolverState::with_config(config).map_err(Box::<dyn std::error::Error>::from)?;
            app.manage(state);
            Ok(())
        })
        .build()
}

// Re-export types for convenience
pub use vidresolve_core::{CacheStats, ResolutionOutcome, ResolvedVideo as Video};
