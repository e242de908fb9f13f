//! Pending request table: request id -> in-flight [`BridgeRequest`].
//!
//! Shared by HTTP handler threads (allocate/remove) and engine threads
//! (get/finalize). One mutex guards the map and the admission flag so that a
//! shutdown drain and a new allocation can never interleave.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde_json::Value;

use super::error::{BridgeError, Result};
use super::request::{BridgeRequest, RequestId};
use super::routes::CommandPath;

struct Table {
    entries: HashMap<RequestId, Arc<BridgeRequest>>,
    open: bool,
}

pub struct PendingRequests {
    table: Mutex<Table>,
    next_id: AtomicU64,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                open: true,
            }),
            next_id: AtomicU64::new(0),
        }
    }

    /// Create, insert and return a new request with a fresh id.
    ///
    /// Ids are monotonic for the lifetime of the table and never reused.
    pub fn allocate(&self, payload: Value, command: CommandPath) -> Result<Arc<BridgeRequest>> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if !table.open {
            return Err(BridgeError::ShuttingDown);
        }
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = Arc::new(BridgeRequest::new(id, command, payload));
        table.entries.insert(id, Arc::clone(&request));
        debug!("Allocated request {} for {}", id, command);
        Ok(request)
    }

    pub fn get(&self, id: RequestId) -> Option<Arc<BridgeRequest>> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .get(&id)
            .cloned()
    }

    pub fn remove(&self, id: RequestId) -> Option<Arc<BridgeRequest>> {
        self.table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .remove(&id)
    }

    /// Store `output` on a pending request and wake its handler.
    ///
    /// An id that is no longer pending (handler gone, forced shutdown) yields
    /// [`BridgeError::StaleFinalize`], which callers may ignore.
    pub fn finalize(&self, id: RequestId, output: Value) -> Result<()> {
        // Clone out so the latch is set without holding the table lock
        match self.get(id) {
            Some(request) => {
                request.finalize(output);
                Ok(())
            }
            None => {
                debug!("Ignoring finalize for request {} (no longer pending)", id);
                Err(BridgeError::StaleFinalize(id))
            }
        }
    }

    /// Refuse new allocations and finalize every pending request with `{}`.
    ///
    /// Returns how many handlers were released.
    pub fn close(&self) -> usize {
        let pending: Vec<Arc<BridgeRequest>> = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.open = false;
            table.entries.values().cloned().collect()
        };
        for request in &pending {
            info!("Cancelling request {} ({})", request.id(), request.command());
            request.finalize(Value::Object(Default::default()));
        }
        pending.len()
    }

    /// Admit allocations again after a [`close`](Self::close).
    pub fn reopen(&self) {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).open = true;
    }

    pub fn is_open(&self) -> bool {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).open
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of pending ids, sorted.
    pub fn ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<_> = self
            .table
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_allocate_get_remove() {
        let table = PendingRequests::new();
        let r = table.allocate(json!({"a": 1}), CommandPath::Txt2Img).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(r.id()).unwrap().payload(), &json!({"a": 1}));
        assert!(table.remove(r.id()).is_some());
        assert!(table.get(r.id()).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_ids_never_reused() {
        let table = PendingRequests::new();
        let a = table.allocate(json!({}), CommandPath::Upscale).unwrap().id();
        table.remove(a);
        let b = table.allocate(json!({}), CommandPath::Upscale).unwrap().id();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_finalize_absent_is_stale() {
        let table = PendingRequests::new();
        let err = table.finalize(RequestId(42), json!({})).unwrap_err();
        assert!(matches!(err, BridgeError::StaleFinalize(RequestId(42))));
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let table = PendingRequests::new();
        let ids: Vec<RequestId> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..250)
                            .map(|_| table.allocate(json!({}), CommandPath::Txt2Img).unwrap().id())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
        assert_eq!(table.len(), 2000);
    }

    #[test]
    fn test_finalize_visible_to_waiter_under_stress() {
        // Each waiter must see exactly the payload its own finalizer wrote
        let table = PendingRequests::new();
        thread::scope(|s| {
            for worker in 0..8u64 {
                let table = &table;
                s.spawn(move || {
                    for i in 0..200u64 {
                        let request = table.allocate(json!({}), CommandPath::Img2Img).unwrap();
                        let id = request.id();
                        let expected = json!({"worker": worker, "i": i, "id": id.0});
                        let finalizer = {
                            let expected = expected.clone();
                            thread::spawn(move || request.finalize(expected))
                        };
                        let got = table.get(id).unwrap().wait();
                        assert_eq!(got, expected);
                        finalizer.join().unwrap();
                        table.remove(id);
                    }
                });
            }
        });
        assert!(table.is_empty());
    }

    #[test]
    fn test_close_releases_waiters_and_refuses_new_work() {
        let table = PendingRequests::new();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let r = table.allocate(json!({}), CommandPath::Txt2Img).unwrap();
                thread::spawn(move || r.wait())
            })
            .collect();
        thread::sleep(Duration::from_millis(10));

        assert_eq!(table.close(), 4);
        for w in waiters {
            assert_eq!(w.join().unwrap(), json!({}));
        }
        assert!(matches!(
            table.allocate(json!({}), CommandPath::Txt2Img),
            Err(BridgeError::ShuttingDown)
        ));

        table.reopen();
        assert!(table.allocate(json!({}), CommandPath::Txt2Img).is_ok());
    }
}
