//! High-level client tying the API, the tracking set, the reconciliation loop and the
//! webhook receiver to one notification sink.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use url::Url;

use crate::api::models::*;
use crate::api::{ApiClient, InvoiceQuery, Network};
use crate::config::Config;
use crate::errors::Result;
use crate::notify::{InvoicePoller, NotificationSink, PollerSettings, Reconciler, TrackingSet};
use crate::webhooks::WebhookReceiver;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Crypto Pay client with invoice-paid notifications.
///
/// ```ignore
/// let client = Client::for_network(Network::Testnet, &token)?;
/// client.on_invoice_paid(|invoice| println!("paid: {}", invoice.invoice_id));
/// client.start_polling().await?;
/// let invoice = client.create_invoice(&options).await?; // tracked until paid
/// ```
pub struct Client {
    api: ApiClient,
    tracked: Arc<TrackingSet>,
    sink: NotificationSink,
    poller: InvoicePoller,
    webhooks: WebhookReceiver,
}

impl Client {
    pub fn new(base_url: Url, token: &str, timeout: Duration, polling: PollerSettings) -> Result<Self> {
        let api = ApiClient::new(base_url, token, timeout)?;
        let query: Arc<dyn InvoiceQuery> = Arc::new(api.clone());
        Ok(Self::with_query(api, query, token, polling))
    }

    /// Client for a public network with default timeout and polling settings.
    pub fn for_network(network: Network, token: &str) -> Result<Self> {
        Self::new(Url::parse(network.base_url())?, token, DEFAULT_TIMEOUT, PollerSettings::default())
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_url()?, config.api_token(), config.request_timeout, config.polling.settings())
    }

    /// Assemble a client whose reconciliation loop queries through `query`.
    pub fn with_query(api: ApiClient, query: Arc<dyn InvoiceQuery>, token: &str, polling: PollerSettings) -> Self {
        let tracked = Arc::new(TrackingSet::new());
        let sink = NotificationSink::new();
        let reconciler = Reconciler::new(query, tracked.clone(), sink.clone(), polling.batch_size);

        Self {
            api,
            tracked,
            poller: InvoicePoller::new(reconciler, polling),
            webhooks: WebhookReceiver::new(token, sink.clone()),
            sink,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // --- notifications ---

    /// Register the handler for paid invoices, replacing any previous one.
    ///
    /// Used by both polling and webhooks. The same invoice may be reported by each
    /// path, so the handler must tolerate duplicates.
    pub fn on_invoice_paid<F>(&self, handler: F)
    where
        F: Fn(Invoice) + Send + Sync + 'static,
    {
        self.sink.set(handler);
    }

    /// Start the reconciliation loop. Fails if it is already running.
    pub async fn start_polling(&self) -> Result<()> {
        self.poller.start().await?;
        tracing::info!(tracked = self.tracked.len(), "Invoice polling started");
        Ok(())
    }

    /// Stop the reconciliation loop and wait for it to exit. Tracked invoices are kept.
    pub async fn stop_polling(&self) {
        self.poller.stop().await;
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_active()
    }

    /// Track an invoice created elsewhere.
    pub fn track_invoice(&self, invoice: &Invoice) {
        self.tracked.register(invoice);
    }

    pub fn track_invoice_id(&self, invoice_id: i64) {
        self.tracked.register_id(invoice_id);
    }

    pub fn tracking(&self) -> &TrackingSet {
        &self.tracked
    }

    pub fn webhook_receiver(&self) -> WebhookReceiver {
        self.webhooks.clone()
    }

    /// Router serving the webhook endpoint at `path`.
    pub fn webhook_router(&self, path: &str) -> Router {
        self.webhooks.clone().router(path)
    }

    // --- API ---

    pub async fn get_me(&self) -> Result<AppInfo> {
        self.api.get_me().await
    }

    /// Create an invoice; tracked for payment if polling is active once the API answers.
    ///
    /// The polling state is read once, after the remote call, so a stop that completes
    /// while the call is in flight leaves the invoice untracked. A stop landing between
    /// that read and the registration leaves it tracked while stopped; it is reconciled
    /// on the next `start_polling`.
    pub async fn create_invoice(&self, options: &CreateInvoiceOptions) -> Result<Invoice> {
        let invoice = self.api.create_invoice(options).await?;
        if self.poller.is_active() {
            self.tracked.register(&invoice);
        }
        Ok(invoice)
    }

    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<bool> {
        let deleted = self.api.delete_invoice(invoice_id).await?;
        self.tracked.remove(invoice_id);
        Ok(deleted)
    }

    pub async fn create_check(&self, options: &CreateCheckOptions) -> Result<Check> {
        self.api.create_check(options).await
    }

    pub async fn delete_check(&self, check_id: i64) -> Result<bool> {
        self.api.delete_check(check_id).await
    }

    pub async fn transfer(&self, options: &TransferOptions) -> Result<Transfer> {
        self.api.transfer(options).await
    }

    pub async fn get_invoices(&self, options: &GetInvoicesOptions) -> Result<Vec<Invoice>> {
        self.api.get_invoices(options).await
    }

    pub async fn get_transfers(&self, options: &GetTransfersOptions) -> Result<Vec<Transfer>> {
        self.api.get_transfers(options).await
    }

    pub async fn get_checks(&self, options: &GetChecksOptions) -> Result<Vec<Check>> {
        self.api.get_checks(options).await
    }

    pub async fn get_balance(&self) -> Result<Vec<Balance>> {
        self.api.get_balance().await
    }

    pub async fn get_exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        self.api.get_exchange_rates().await
    }

    pub async fn get_currencies(&self) -> Result<Vec<Currency>> {
        self.api.get_currencies().await
    }

    pub async fn get_stats(&self, options: &GetStatsOptions) -> Result<AppStats> {
        self.api.get_stats(options).await
    }
}
