//! Inbound webhook endpoint.
//!
//! Authenticates the raw body against [`SIGNATURE_HEADER`], decodes the
//! [`WebhookUpdate`] and hands the embedded invoice to the [`NotificationSink`]
//! without waiting for it. The tracking set is never consulted here.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use bytes::Bytes;
use metrics::counter;

use super::signing::{SIGNATURE_HEADER, WebhookSecret};
use crate::api::WebhookUpdate;
use crate::api::models::UpdateType;
use crate::notify::{NotificationSink, Source};

/// Result of processing one webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    /// Missing, non-hex or mismatching signature
    Forbidden,
    /// Authentic body that does not decode as an update
    Malformed,
}

impl IngestOutcome {
    fn as_str(self) -> &'static str {
        match self {
            IngestOutcome::Accepted => "accepted",
            IngestOutcome::Forbidden => "forbidden",
            IngestOutcome::Malformed => "malformed",
        }
    }
}

impl From<IngestOutcome> for StatusCode {
    fn from(outcome: IngestOutcome) -> Self {
        match outcome {
            IngestOutcome::Accepted => StatusCode::OK,
            IngestOutcome::Forbidden => StatusCode::FORBIDDEN,
            IngestOutcome::Malformed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookReceiver {
    secret: Arc<WebhookSecret>,
    sink: NotificationSink,
}

impl WebhookReceiver {
    pub fn new(token: &str, sink: NotificationSink) -> Self {
        Self {
            secret: Arc::new(WebhookSecret::from_token(token)),
            sink,
        }
    }

    /// Authenticate and dispatch one request body.
    ///
    /// Must be called from within a tokio runtime; an accepted invoice is delivered on a
    /// detached task.
    pub fn ingest(&self, body: &[u8], signature: Option<&str>) -> IngestOutcome {
        let outcome = self.process(body, signature);
        counter!("cryptopay_webhook_requests_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    fn process(&self, body: &[u8], signature: Option<&str>) -> IngestOutcome {
        let Some(signature) = signature else {
            tracing::warn!("Webhook request without signature header");
            return IngestOutcome::Forbidden;
        };

        if !self.secret.verify(body, signature) {
            tracing::warn!(body_len = body.len(), "Webhook signature mismatch");
            return IngestOutcome::Forbidden;
        }

        let update: WebhookUpdate = match serde_json::from_slice(body) {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(error = %e, "Failed to decode webhook update");
                return IngestOutcome::Malformed;
            }
        };

        if update.update_type != UpdateType::InvoicePaid {
            tracing::debug!(update_id = update.update_id, update_type = ?update.update_type, "Ignoring webhook update");
            return IngestOutcome::Accepted;
        }

        tracing::info!(
            update_id = update.update_id,
            invoice_id = update.payload.invoice_id,
            "Invoice paid, reported by webhook"
        );
        self.sink.notify_detached(update.payload, Source::Webhook);
        IngestOutcome::Accepted
    }

    /// Router serving this receiver at `path` (POST).
    pub fn router(self, path: &str) -> Router {
        Router::new().route(path, post(receive_webhook)).with_state(self)
    }
}

async fn receive_webhook(State(receiver): State<WebhookReceiver>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    receiver.ingest(&body, signature).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use serde_json::json;
    use std::sync::Barrier;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const TOKEN: &str = "1234:AAtest";
    const PATH: &str = "/webhooks/crypto-pay";

    fn update_body(invoice_id: i64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "update_id": 17,
            "update_type": "invoice_paid",
            "request_date": "2024-03-01T10:05:00.000Z",
            "payload": {
                "invoice_id": invoice_id,
                "hash": "IVabc",
                "currency_type": "crypto",
                "asset": "TON",
                "amount": "1.5",
                "paid_asset": "TON",
                "paid_amount": "1.5",
                "bot_invoice_url": "https://t.me/CryptoBot?start=IVabc",
                "status": "paid",
                "created_at": "2024-03-01T10:00:00.000Z",
                "paid_at": "2024-03-01T10:04:59.000Z",
                "allow_comments": true,
                "allow_anonymous": true
            }
        }))
        .unwrap()
    }

    fn sign(body: &[u8]) -> String {
        WebhookSecret::from_token(TOKEN).sign(body).unwrap()
    }

    fn server_with_channel() -> (TestServer, mpsc::UnboundedReceiver<i64>) {
        let sink = NotificationSink::new();
        let (tx, rx) = mpsc::unbounded_channel();
        sink.set(move |invoice| {
            let _ = tx.send(invoice.invoice_id);
        });
        let server = TestServer::new(WebhookReceiver::new(TOKEN, sink).router(PATH)).unwrap();
        (server, rx)
    }

    #[test_log::test(tokio::test)]
    async fn test_valid_signature_accepted_and_dispatched() {
        let (server, mut rx) = server_with_channel();
        let body = update_body(42);

        let response = server.post(PATH).add_header(SIGNATURE_HEADER, &sign(&body)).bytes(body.into()).await;

        response.assert_status(StatusCode::OK);
        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(id, Some(42));
    }

    #[tokio::test]
    async fn test_bit_flipped_signature_forbidden() {
        let (server, mut rx) = server_with_channel();
        let body = update_body(42);
        let mut signature = hex::decode(sign(&body)).unwrap();
        signature[0] ^= 0x01;

        let response = server
            .post(PATH)
            .add_header(SIGNATURE_HEADER, &hex::encode(signature))
            .bytes(body.into())
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_or_garbage_signature_forbidden() {
        let (server, _rx) = server_with_channel();

        let response = server.post(PATH).bytes(update_body(1).into()).await;
        response.assert_status(StatusCode::FORBIDDEN);

        let response = server.post(PATH).add_header(SIGNATURE_HEADER, "zz-not-hex").bytes(update_body(1).into()).await;
        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_signed_invalid_json_is_server_error() {
        let (server, mut rx) = server_with_channel();
        let body = b"{not json".to_vec();

        let response = server.post(PATH).add_header(SIGNATURE_HEADER, &sign(&body)).bytes(body.into()).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_signature_over_different_body_forbidden() {
        let (server, _rx) = server_with_channel();
        let signature = sign(&update_body(1));

        let response = server.post(PATH).add_header(SIGNATURE_HEADER, &signature).bytes(update_body(2).into()).await;

        response.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_response_does_not_wait_for_handler() {
        let sink = NotificationSink::new();
        let barrier = Arc::new(Barrier::new(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler_barrier = barrier.clone();
        sink.set(move |invoice| {
            handler_barrier.wait();
            let _ = tx.send(invoice.invoice_id);
        });
        let server = TestServer::new(WebhookReceiver::new(TOKEN, sink).router(PATH)).unwrap();
        let body = update_body(7);

        let response = server.post(PATH).add_header(SIGNATURE_HEADER, &sign(&body)).bytes(body.into()).await;
        response.assert_status(StatusCode::OK);

        // the handler is still parked on the barrier; release it
        tokio::task::spawn_blocking(move || barrier.wait()).await.unwrap();
        let id = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(id, Some(7));
    }

    #[tokio::test]
    async fn test_ingest_without_handler_still_accepts() {
        let receiver = WebhookReceiver::new(TOKEN, NotificationSink::new());
        let body = update_body(3);
        assert_eq!(receiver.ingest(&body, Some(&sign(&body))), IngestOutcome::Accepted);
    }

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(StatusCode::from(IngestOutcome::Accepted), StatusCode::OK);
        assert_eq!(StatusCode::from(IngestOutcome::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(StatusCode::from(IngestOutcome::Malformed), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
