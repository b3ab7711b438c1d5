//! Build-once cache for expensive model resources.
//!
//! The lock is held for the whole construction, so a caller that arrives
//! while a build is in progress waits for it and then reuses its result
//! instead of starting a second build.

use crate::error::Result;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

struct Entry<B> {
    identity: String,
    bundle: Arc<B>,
}

/// Holds at most one bundle, keyed by its configuration identity.
pub struct ResourceCache<B> {
    slot: Mutex<Option<Entry<B>>>,
}

impl<B> Default for ResourceCache<B> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<B> std::fmt::Debug for ResourceCache<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ResourceCache")
            .field("identity", &slot.as_ref().map(|e| e.identity.as_str()))
            .finish()
    }
}

impl<B> ResourceCache<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bundle for `identity`, building it with `build` if absent,
    /// cached under another identity, or `force_reload` is set.
    ///
    /// # Errors
    ///
    /// Propagates the builder's error; the cache is left empty.
    pub fn ensure<F>(&self, identity: &str, force_reload: bool, build: F) -> Result<Arc<B>>
    where
        F: FnOnce() -> Result<B>,
    {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if !force_reload
            && let Some(entry) = slot.as_ref()
            && entry.identity == identity
        {
            return Ok(Arc::clone(&entry.bundle));
        }

        // Drop any stale bundle before building so a failure leaves nothing.
        *slot = None;
        info!("building resources for {identity}");
        let started = Instant::now();
        match build() {
            Ok(bundle) => {
                let bundle = Arc::new(bundle);
                *slot = Some(Entry {
                    identity: identity.to_owned(),
                    bundle: Arc::clone(&bundle),
                });
                info!(
                    "resources for {identity} ready in {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                Ok(bundle)
            }
            Err(e) => {
                warn!("building resources for {identity} failed: {e}");
                Err(e)
            }
        }
    }

    /// The cached bundle for `identity`, without building.
    pub fn get(&self, identity: &str) -> Option<Arc<B>> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|entry| entry.identity == identity)
            .map(|entry| Arc::clone(&entry.bundle))
    }

    /// Identity of whatever is cached.
    pub fn current(&self) -> Option<String> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref().map(|entry| entry.identity.clone())
    }

    /// Drop the cached bundle. Workers still holding it keep their `Arc`.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = slot.take() {
            info!("resource cache invalidated ({})", entry.identity);
        }
    }
}
