//! # cryptopay: Crypto Pay client with invoice-paid notifications
//!
//! A typed client for the [Crypto Pay API](https://help.crypt.bot/crypto-pay-api) together
//! with a subsystem that tells the application, once per delivery path, when an invoice it
//! created has been paid.
//!
//! ## Delivery paths
//!
//! Two independent paths report payments into the same handler registered with
//! [`Client::on_invoice_paid`]:
//!
//! - **Polling**: while [`Client::start_polling`] is active, every invoice created through
//!   [`Client::create_invoice`] is tracked in memory. A background task looks the tracked
//!   invoices up in batches every few seconds; paid ones are reported and untracked.
//! - **Webhooks**: Crypto Pay pushes an `invoice_paid` update signed with HMAC-SHA256 keyed by
//!   `SHA-256(api token)`. [`WebhookReceiver`] verifies the signature, answers immediately,
//!   and reports the invoice in the background.
//!
//! The paths are not deduplicated against each other, so handlers must be idempotent.
//! Tracking is in-memory only and does not survive restarts.
//!
//! ## Watcher service
//!
//! The `cryptopay-watch` binary wraps a [`Client`] in an [`Application`]: it loads
//! [`Config`], tracks any configured invoice ids, starts polling, serves the webhook
//! endpoint and `/healthz`, and logs every paid invoice until SIGTERM or Ctrl+C.

use std::sync::Arc;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};

pub mod api;
mod client;
pub mod config;
pub mod errors;
pub mod notify;
pub mod telemetry;
pub mod webhooks;

pub use api::{ApiClient, Invoice, InvoiceQuery, InvoiceStatus, Network, WebhookUpdate};
pub use client::Client;
pub use config::Config;
pub use errors::{Error, Result};
pub use notify::{NotificationSink, PollerSettings, TrackingSet};
pub use webhooks::WebhookReceiver;

/// Build the HTTP router: `/healthz` plus the webhook endpoint when enabled.
fn build_router(config: &Config, client: &Client) -> Router {
    let mut router = Router::new().route("/healthz", get(|| async { "OK" }));

    if config.webhook.enabled {
        info!(path = %config.webhook.path, "Serving Crypto Pay webhooks");
        router = router.merge(client.webhook_router(&config.webhook.path));
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Log line for every paid invoice, whichever path reported it.
fn log_paid_invoice(invoice: Invoice) {
    info!(
        invoice_id = invoice.invoice_id,
        asset = invoice.asset.as_deref().or(invoice.fiat.as_deref()).unwrap_or("-"),
        amount = %invoice.amount,
        paid_asset = invoice.paid_asset.as_deref().unwrap_or("-"),
        paid_amount = ?invoice.paid_amount,
        paid_at = ?invoice.paid_at,
        "Invoice paid"
    );
}

/// The watcher service.
///
/// 1. **Create**: [`Application::new`] builds the client, tracks configured invoices and
///    starts polling
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and serves webhooks
/// 3. **Shutdown**: when the shutdown future resolves, stops the HTTP server and then polling
pub struct Application {
    router: Router,
    client: Arc<Client>,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        debug!(
            network = ?config.network,
            api_url = ?config.api_url,
            polling = ?config.polling,
            webhook = ?config.webhook,
            "Starting Crypto Pay watcher"
        );

        let client = Arc::new(Client::from_config(&config)?);
        client.on_invoice_paid(log_paid_invoice);

        for &invoice_id in &config.polling.watch_invoice_ids {
            client.track_invoice_id(invoice_id);
        }

        if config.polling.enabled {
            client.start_polling().await?;
        }

        let router = build_router(&config, &client);

        Ok(Self { router, client, config })
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, Arc<Client>) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.client)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Crypto Pay watcher listening on http://{}", bind_addr);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        // No polling notification fires once this returns
        info!("Stopping invoice polling...");
        self.client.stop_polling().await;

        Ok(())
    }
}
