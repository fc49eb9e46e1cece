//! Remote Crypto Pay API access.
//!
//! - [`client`]: reqwest-based [`ApiClient`] with one method per API endpoint
//! - [`models`]: request options and response records
//!
//! The reconciliation loop only needs one capability from the remote side, looking
//! invoices up by id, which is expressed by the [`InvoiceQuery`] trait so the loop
//! can be driven by test doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::errors::Result;

pub mod client;
pub mod models;

pub use client::ApiClient;
pub use models::{Invoice, InvoiceStatus, WebhookUpdate};

/// Remote lookup of invoices by id.
#[async_trait]
pub trait InvoiceQuery: Send + Sync {
    /// Fetch the current records for `ids`.
    ///
    /// Ids unknown to the remote side are simply missing from the result.
    async fn query_invoices_by_ids(&self, ids: &[i64]) -> Result<Vec<Invoice>>;
}

/// Crypto Pay deployment to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn base_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://pay.crypt.bot/",
            Network::Testnet => "https://testnet-pay.crypt.bot/",
        }
    }
}
