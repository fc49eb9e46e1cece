//! Invoice reconciliation loop.
//!
//! Every `period` the tracked invoice ids are snapshotted, split into batches of at
//! most `batch_size`, and looked up through an [`InvoiceQuery`]. Paid invoices are
//! reported to the [`NotificationSink`] and dropped from the [`TrackingSet`].
//!
//! A failing batch does not affect the other batches of the same tick. If any batch
//! failed, the loop waits `failure_cooldown` once before the next tick.
//!
//! Stopping is cooperative: the loop exits at once while idle or cooling down; mid
//! tick, the batch in flight completes (including its notifications) and the
//! remaining batches are skipped. [`InvoicePoller::stop`] joins the task, so no
//! polling notification fires after it returns.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::{NotificationSink, Source, TrackingSet};
use crate::api::{Invoice, InvoiceQuery};
use crate::errors::{Error, Result};

/// Timing and batching knobs for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    /// Time between ticks
    pub period: Duration,
    /// Pause after a tick in which any batch failed
    pub failure_cooldown: Duration,
    /// Maximum invoice ids per remote query
    pub batch_size: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3),
            failure_cooldown: Duration::from_secs(5),
            batch_size: 100,
        }
    }
}

/// Outcome of a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tracked ids in the snapshot
    pub tracked: usize,
    /// Batches sent to the remote side
    pub batches: usize,
    pub failed_batches: usize,
    /// Paid invoices handed to the sink and untracked
    pub notified: usize,
    /// Remaining batches were skipped because of a stop request
    pub interrupted: bool,
}

/// One reconciliation pass over the tracking set, independent of any scheduling.
pub struct Reconciler {
    query: Arc<dyn InvoiceQuery>,
    tracked: Arc<TrackingSet>,
    sink: NotificationSink,
    batch_size: usize,
}

impl Reconciler {
    pub fn new(query: Arc<dyn InvoiceQuery>, tracked: Arc<TrackingSet>, sink: NotificationSink, batch_size: usize) -> Self {
        Self {
            query,
            tracked,
            sink,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Reconcile every tracked invoice once.
    ///
    /// `shutdown` is checked between batches, never during one.
    pub async fn reconcile(&self, shutdown: &CancellationToken) -> TickReport {
        let ids: Vec<i64> = self.tracked.snapshot().into_iter().map(|e| e.invoice_id).collect();
        let mut report = TickReport {
            tracked: ids.len(),
            ..Default::default()
        };

        for batch in ids.chunks(self.batch_size) {
            if shutdown.is_cancelled() {
                report.interrupted = true;
                break;
            }

            report.batches += 1;
            match self.query.query_invoices_by_ids(batch).await {
                Ok(invoices) => report.notified += self.settle(batch, invoices).await,
                Err(e) => {
                    report.failed_batches += 1;
                    counter!("cryptopay_poll_batch_failures_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        batch_len = batch.len(),
                        first_invoice_id = batch[0],
                        "Failed to query tracked invoices"
                    );
                }
            }
        }

        report
    }

    async fn settle(&self, requested: &[i64], invoices: Vec<Invoice>) -> usize {
        let requested: HashSet<i64> = requested.iter().copied().collect();
        let mut notified = 0;

        for invoice in invoices {
            let invoice_id = invoice.invoice_id;
            // Untracked in the meantime, or never asked for
            if !invoice.is_paid() || !requested.contains(&invoice_id) || !self.tracked.contains(invoice_id) {
                continue;
            }

            tracing::info!(invoice_id, "Invoice paid, detected by polling");
            self.sink.notify(invoice, Source::Polling).await;
            self.tracked.remove(invoice_id);
            notified += 1;
        }

        notified
    }
}

/// Cancels the task when dropped, so a poller dropped without `stop` does not leak it.
struct RunningLoop {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    _drop_guard: DropGuard,
}

/// Owner of the background reconciliation task: Stopped → Running → Stopped.
pub struct InvoicePoller {
    reconciler: Arc<Reconciler>,
    settings: PollerSettings,
    running: Mutex<Option<RunningLoop>>,
    active: AtomicBool,
}

impl InvoicePoller {
    pub fn new(reconciler: Reconciler, settings: PollerSettings) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
            settings,
            running: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Spawn the reconciliation task.
    ///
    /// Fails with [`Error::PollingAlreadyActive`] if it is already running.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::PollingAlreadyActive);
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.reconciler.clone(), self.settings.clone(), shutdown.clone()));

        *running = Some(RunningLoop {
            _drop_guard: shutdown.clone().drop_guard(),
            shutdown,
            handle,
        });
        self.active.store(true, Ordering::Release);
        Ok(())
    }

    /// Signal the task and wait until it exited. No-op when not running.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(RunningLoop { shutdown, handle, .. }) = running.take() else {
            return;
        };

        // New invoices stop being tracked as soon as shutdown begins
        self.active.store(false, Ordering::Release);
        shutdown.cancel();

        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Invoice reconciliation task terminated abnormally");
        }
    }
}

async fn run_loop(reconciler: Arc<Reconciler>, settings: PollerSettings, shutdown: CancellationToken) {
    tracing::info!(
        period = ?settings.period,
        failure_cooldown = ?settings.failure_cooldown,
        batch_size = reconciler.batch_size(),
        "Starting invoice reconciliation loop"
    );

    let mut ticker = tokio::time::interval_at(Instant::now() + settings.period, settings.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let report = reconciler.reconcile(&shutdown).await;
        counter!("cryptopay_poll_ticks_total").increment(1);

        if report.batches > 0 {
            tracing::debug!(
                tracked = report.tracked,
                batches = report.batches,
                failed_batches = report.failed_batches,
                notified = report.notified,
                "Reconciliation tick completed"
            );
        }

        if report.interrupted {
            break;
        }

        if report.failed_batches > 0 {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(settings.failure_cooldown) => {}
            }
        }
    }

    tracing::info!("Invoice reconciliation loop stopped");
}
