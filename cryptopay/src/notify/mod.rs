//! Invoice-paid notification: tracking set, reconciliation loop and the shared sink.
//!
//! ```text
//!   create_invoice ──► TrackingSet ◄── InvoicePoller (tick every period)
//!                                        │ query_invoices_by_ids (batches)
//!                                        ▼
//!                                  NotificationSink ◄── WebhookReceiver (signed push)
//!                                        │
//!                                        ▼
//!                                  user handler (Fn(Invoice))
//! ```
//!
//! Both paths report into the same [`NotificationSink`]. They are not
//! coordinated, so a single payment may be reported once by each path and the
//! handler must be idempotent.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use metrics::counter;

use crate::api::Invoice;

pub mod poller;
pub mod tracking;

pub use poller::{InvoicePoller, PollerSettings, Reconciler, TickReport};
pub use tracking::{TrackedInvoice, TrackingSet};

/// Callback invoked with a paid invoice.
///
/// Runs on the blocking thread pool. May be invoked twice for the same invoice
/// when both polling and webhooks are in use.
pub type InvoiceHandler = Box<dyn Fn(Invoice) + Send + Sync + 'static>;

/// Which delivery path observed the payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Polling,
    Webhook,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Polling => "polling",
            Source::Webhook => "webhook",
        }
    }
}

/// Result of handing an invoice to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No handler registered, notification dropped
    NoHandler,
    /// The handler panicked or its task was aborted
    Failed,
}

/// Replaceable handler shared by the reconciliation loop and webhook ingestion.
///
/// Cloning yields another reference to the same slot; the last registration wins
/// and takes effect for subsequent notifications only.
#[derive(Clone, Default)]
pub struct NotificationSink {
    handler: Arc<ArcSwapOption<InvoiceHandler>>,
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink").field("registered", &self.is_set()).finish()
    }
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<F>(&self, handler: F)
    where
        F: Fn(Invoice) + Send + Sync + 'static,
    {
        let handler: InvoiceHandler = Box::new(handler);
        self.handler.store(Some(Arc::new(handler)));
    }

    /// Unregister the handler; later notifications are dropped.
    pub fn clear(&self) {
        self.handler.store(None);
    }

    pub fn is_set(&self) -> bool {
        self.handler.load().is_some()
    }

    /// Run the handler for `invoice` on the blocking pool and wait for it.
    ///
    /// A panicking handler is contained here and reported as [`Delivery::Failed`].
    pub async fn notify(&self, invoice: Invoice, source: Source) -> Delivery {
        let invoice_id = invoice.invoice_id;

        let Some(handler) = self.handler.load_full() else {
            tracing::debug!(invoice_id, source = source.as_str(), "No invoice-paid handler registered, dropping notification");
            return Delivery::NoHandler;
        };

        counter!("cryptopay_invoices_paid_total", "source" => source.as_str()).increment(1);

        match tokio::task::spawn_blocking(move || handler(invoice)).await {
            Ok(()) => {
                tracing::debug!(invoice_id, source = source.as_str(), "Invoice-paid handler completed");
                Delivery::Delivered
            }
            Err(e) => {
                counter!("cryptopay_handler_failures_total", "source" => source.as_str()).increment(1);
                tracing::error!(invoice_id, source = source.as_str(), error = %e, "Invoice-paid handler failed");
                Delivery::Failed
            }
        }
    }

    /// Fire-and-forget variant of [`notify`](Self::notify); the caller never waits on the handler.
    pub fn notify_detached(&self, invoice: Invoice, source: Source) {
        let sink = self.clone();
        tokio::spawn(async move {
            sink.notify(invoice, source).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn paid(id: i64) -> Invoice {
        Invoice {
            invoice_id: id,
            status: crate::api::InvoiceStatus::Paid,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_notify_without_handler_drops() {
        let sink = NotificationSink::new();
        assert!(!sink.is_set());
        assert_eq!(sink.notify(paid(1), Source::Polling).await, Delivery::NoHandler);
    }

    #[tokio::test]
    async fn test_clear_drops_later_notifications() {
        let sink = NotificationSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.set(move |invoice| tx.send(invoice.invoice_id).unwrap());
        assert_eq!(sink.notify(paid(1), Source::Polling).await, Delivery::Delivered);

        sink.clone().clear();

        assert!(!sink.is_set());
        assert_eq!(sink.notify(paid(2), Source::Webhook).await, Delivery::NoHandler);
        assert_eq!(rx.recv().await, Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_invokes_handler() {
        let sink = NotificationSink::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        sink.set(move |invoice| {
            assert_eq!(invoice.invoice_id, 5);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(sink.notify(paid(5), Source::Webhook).await, Delivery::Delivered);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_registration_wins_across_clones() {
        let sink = NotificationSink::new();
        let shared = sink.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let first = tx.clone();
        sink.set(move |_| first.send("first").unwrap());
        shared.set(move |_| tx.send("second").unwrap());

        sink.notify(paid(1), Source::Polling).await;
        assert_eq!(rx.recv().await, Some("second"));
    }

    #[test_log::test(tokio::test)]
    async fn test_panicking_handler_is_contained() {
        let sink = NotificationSink::new();
        sink.set(|_| panic!("handler exploded"));

        assert_eq!(sink.notify(paid(9), Source::Polling).await, Delivery::Failed);

        // the sink keeps working afterwards
        sink.set(|_| {});
        assert_eq!(sink.notify(paid(10), Source::Polling).await, Delivery::Delivered);
    }

    #[tokio::test]
    async fn test_notify_detached_delivers() {
        let sink = NotificationSink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        sink.set(move |invoice| tx.send(invoice.invoice_id).unwrap());

        sink.notify_detached(paid(77), Source::Webhook);

        assert_eq!(rx.recv().await, Some(77));
    }
}
