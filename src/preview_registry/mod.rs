//! PreviewRegistry - Object URLs for uploaded images
//!
//! ## Responsibilities
//!
//! - Hand out `preview://<uuid>` handles for image uploads
//! - Keep preview bytes resolvable by URL while the handle lives
//! - Revoke on handle drop (exactly once)
//!
//! Handles are owned by the input source manager; nothing else keeps
//! one across an operation boundary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const URL_SCHEME: &str = "preview://";

/// Registry of live preview objects
pub struct PreviewRegistry {
    entries: Mutex<HashMap<Uuid, Arc<Vec<u8>>>>,
    created: AtomicU64,
    revoked: AtomicU64,
}

impl PreviewRegistry {
    /// Create new registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            created: AtomicU64::new(0),
            revoked: AtomicU64::new(0),
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Vec<u8>>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register bytes and return the owning handle
    pub fn create(self: &Arc<Self>, data: Vec<u8>) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries().insert(id, Arc::new(data));
        self.created.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(preview_id = %id, "Preview created");

        PreviewHandle {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Revoke a preview. Unknown ids are a no-op.
    fn revoke(&self, id: &Uuid) -> bool {
        let removed = self.entries().remove(id).is_some();
        if removed {
            self.revoked.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(preview_id = %id, "Preview revoked");
        }
        removed
    }

    /// Resolve a `preview://` URL to its bytes
    pub fn resolve(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        let id = url.strip_prefix(URL_SCHEME)?.parse::<Uuid>().ok()?;
        self.entries().get(&id).cloned()
    }

    /// Number of previews currently alive
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    /// Total previews created
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total previews revoked
    pub fn revoked_count(&self) -> u64 {
        self.revoked.load(Ordering::Relaxed)
    }
}

/// Preview object - revoked on Drop
pub struct PreviewHandle {
    id: Uuid,
    registry: Arc<PreviewRegistry>,
}

impl PreviewHandle {
    pub fn url(&self) -> String {
        format!("{}{}", URL_SCHEME, self.id)
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle").field("id", &self.id).finish()
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.revoke(&self.id);
    }
}
