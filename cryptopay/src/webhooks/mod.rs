//! Signed push notifications from Crypto Pay.
//!
//! - [`signing`]: HMAC-SHA256 key derivation and signature verification
//! - [`receiver`]: axum endpoint that authenticates, decodes and dispatches updates

pub mod receiver;
pub mod signing;

pub use receiver::{IngestOutcome, WebhookReceiver};
pub use signing::{SIGNATURE_HEADER, WebhookSecret};
