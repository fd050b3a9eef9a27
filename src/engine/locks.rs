use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per shelf id, created on first use.
///
/// Reports for different shelves proceed in parallel; reports for the same
/// shelf serialize through its mutex. Entries nobody holds a handle to are
/// dropped when a new shelf is added, so the map tracks shelves in flight
/// rather than every shelf ever seen.
#[derive(Default)]
pub struct ShelfLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ShelfLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding `shelf_id`. The map lock is released before returning.
    pub fn handle(&self, shelf_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = map.get(shelf_id) {
            return existing.clone();
        }
        // count of 1 means only the map refers to it: no holder, no waiter
        map.retain(|_, m| Arc::strong_count(m) > 1);
        map.entry(shelf_id.to_string()).or_default().clone()
    }
}
