//! In-memory registry of invoices awaiting payment.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::api::Invoice;

/// An invoice the reconciliation loop is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedInvoice {
    pub invoice_id: i64,
    pub added_at: DateTime<Utc>,
}

/// Concurrent set of tracked invoices keyed by invoice id.
///
/// An id present here has not yet been confirmed paid by the reconciliation loop.
/// Entries never expire on their own.
#[derive(Debug, Default)]
pub struct TrackingSet {
    entries: RwLock<HashMap<i64, TrackedInvoice>>,
}

impl TrackingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `invoice`, overwriting any previous entry for the same id.
    pub fn register(&self, invoice: &Invoice) {
        self.register_id(invoice.invoice_id);
    }

    pub fn register_id(&self, invoice_id: i64) {
        let entry = TrackedInvoice {
            invoice_id,
            added_at: Utc::now(),
        };
        self.entries.write().insert(invoice_id, entry);
        tracing::debug!(invoice_id, "Tracking invoice");
    }

    pub fn contains(&self, invoice_id: i64) -> bool {
        self.entries.read().contains_key(&invoice_id)
    }

    /// Stop tracking `invoice_id`. Returns whether an entry was present.
    pub fn remove(&self, invoice_id: i64) -> bool {
        self.entries.write().remove(&invoice_id).is_some()
    }

    /// Point-in-time copy of all entries, oldest registration first.
    pub fn snapshot(&self) -> Vec<TrackedInvoice> {
        let mut entries: Vec<TrackedInvoice> = self.entries.read().values().copied().collect();
        entries.sort_by_key(|e| (e.added_at, e.invoice_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn invoice(id: i64) -> Invoice {
        Invoice {
            invoice_id: id,
            ..Default::default()
        }
    }

    #[test]
    fn test_register_and_remove() {
        let set = TrackingSet::new();
        assert!(set.is_empty());

        set.register(&invoice(1));
        set.register(&invoice(2));
        assert!(set.contains(1));
        assert!(set.contains(2));
        assert_eq!(set.len(), 2);

        assert!(set.remove(1));
        assert!(!set.contains(1));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_register_twice_keeps_one_entry() {
        let set = TrackingSet::new();
        set.register(&invoice(42));
        let first = set.snapshot()[0];

        set.register(&invoice(42));

        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].added_at >= first.added_at);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let set = TrackingSet::new();
        assert!(!set.remove(7));
        set.register_id(8);
        assert!(!set.remove(7));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let set = TrackingSet::new();
        set.register_id(1);
        set.register_id(2);

        let snapshot = set.snapshot();
        set.remove(1);
        set.register_id(3);

        let mut ids: Vec<i64> = snapshot.iter().map(|e| e.invoice_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_concurrent_registration() {
        let set = Arc::new(TrackingSet::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let set = set.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = t * 100 + i;
                        set.register_id(id);
                        assert!(set.contains(id));
                        // readers interleave with writers
                        let _ = set.snapshot();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.len(), 800);
    }
}
