//! Releasable resource handles
//!
//! A handle is an opaque reference (object-URL style) to loaded bytes owned
//! by an allocator. [`ResourceHandle`] releases its reference when dropped,
//! so every path that discards a handle (eviction, removal, clearing,
//! replacement) releases it exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Backend that turns bytes into handle URLs and frees them again.
pub trait HandleAllocator: Send + Sync {
    /// Store `bytes` and return the URL that refers to them.
    fn allocate(&self, bytes: Vec<u8>) -> String;

    /// Free the bytes behind `url`.
    fn release(&self, url: &str);
}

/// Owned handle to loaded bytes. Released on drop.
pub struct ResourceHandle {
    url: String,
    allocator: Arc<dyn HandleAllocator>,
}

impl ResourceHandle {
    pub fn allocate(allocator: &Arc<dyn HandleAllocator>, bytes: Vec<u8>) -> Self {
        let url = allocator.allocate(bytes);
        Self { url, allocator: Arc::clone(allocator) }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        self.allocator.release(&self.url);
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle").field("url", &self.url).finish()
    }
}

#[derive(Default)]
struct BlobState {
    blobs: HashMap<String, Arc<[u8]>>,
    next_id: u64,
    allocated: u64,
    released: u64,
}

/// In-process allocator issuing `blob:gallery/<n>` URLs.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gallery_cache::{BlobStore, HandleAllocator, ResourceHandle};
///
/// let store = Arc::new(BlobStore::new());
/// let allocator: Arc<dyn HandleAllocator> = store.clone();
///
/// let handle = ResourceHandle::allocate(&allocator, vec![1, 2, 3]);
/// assert_eq!(store.bytes(handle.url()).as_deref(), Some(&[1u8, 2, 3][..]));
///
/// drop(handle);
/// assert_eq!(store.live_count(), 0);
/// ```
#[derive(Default)]
pub struct BlobStore {
    state: Mutex<BlobState>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BlobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes behind a live URL.
    pub fn bytes(&self, url: &str) -> Option<Arc<[u8]>> {
        self.state().blobs.get(url).cloned()
    }

    /// Number of URLs allocated and not yet released.
    pub fn live_count(&self) -> usize {
        self.state().blobs.len()
    }

    /// Total bytes held by live URLs.
    pub fn live_bytes(&self) -> usize {
        self.state().blobs.values().map(|bytes| bytes.len()).sum()
    }

    pub fn allocated(&self) -> u64 {
        self.state().allocated
    }

    pub fn released(&self) -> u64 {
        self.state().released
    }
}

impl HandleAllocator for BlobStore {
    fn allocate(&self, bytes: Vec<u8>) -> String {
        let mut state = self.state();
        state.next_id += 1;
        state.allocated += 1;

        let url = format!("blob:gallery/{}", state.next_id);
        state.blobs.insert(url.clone(), Arc::from(bytes));
        url
    }

    fn release(&self, url: &str) {
        let mut state = self.state();
        if state.blobs.remove(url).is_some() {
            state.released += 1;
        }
    }
}

impl fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("BlobStore")
            .field("live", &state.blobs.len())
            .field("allocated", &state.allocated)
            .field("released", &state.released)
            .finish()
    }
}
