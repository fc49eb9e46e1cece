//! HTTP client for the Crypto Pay API.
//!
//! Every endpoint is a `POST {base}api/{method}` carrying the app token in the
//! `Crypto-Pay-API-Token` header and an optional JSON body. Responses share the
//! `{ok, result, error}` envelope; `ok: false` becomes [`Error::Api`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use super::InvoiceQuery;
use super::models::*;
use crate::errors::{Error, Result};

pub const TOKEN_HEADER: &str = "Crypto-Pay-API-Token";

const GET_ME: &str = "getMe";
const CREATE_INVOICE: &str = "createInvoice";
const DELETE_INVOICE: &str = "deleteInvoice";
const CREATE_CHECK: &str = "createCheck";
const DELETE_CHECK: &str = "deleteCheck";
const TRANSFER: &str = "transfer";
const GET_INVOICES: &str = "getInvoices";
const GET_CHECKS: &str = "getChecks";
const GET_TRANSFERS: &str = "getTransfers";
const GET_BALANCE: &str = "getBalance";
const GET_EXCHANGE_RATES: &str = "getExchangeRates";
const GET_CURRENCIES: &str = "getCurrencies";
const GET_STATS: &str = "getStats";

/// Thin wrapper over the Crypto Pay endpoints.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client for `base_url` (e.g. `https://pay.crypt.bot/`).
    pub fn new(mut base_url: Url, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        // `Url::join` replaces the last path segment unless the base ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Http { method: "client", source })?;

        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[tracing::instrument(skip(self, body), fields(base_url = %self.base_url))]
    async fn call<B, T>(&self, method: &'static str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(&format!("api/{method}"))?;

        let mut request = self.http.post(url).header(TOKEN_HEADER, &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| {
            tracing::debug!(error = %source, "Crypto Pay request failed");
            Error::Http { method, source }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|source| Error::Http { method, source })?;

        tracing::trace!(status = status.as_u16(), response_len = bytes.len(), "Crypto Pay request completed");

        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes).map_err(|source| Error::Decode { method, source })?;
        envelope.into_result(method)
    }

    pub async fn get_me(&self) -> Result<AppInfo> {
        self.call::<(), _>(GET_ME, None).await
    }

    pub async fn create_invoice(&self, options: &CreateInvoiceOptions) -> Result<Invoice> {
        self.call(CREATE_INVOICE, Some(options)).await
    }

    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<bool> {
        self.call(DELETE_INVOICE, Some(&DeleteInvoiceOptions { invoice_id })).await
    }

    pub async fn create_check(&self, options: &CreateCheckOptions) -> Result<Check> {
        self.call(CREATE_CHECK, Some(options)).await
    }

    pub async fn delete_check(&self, check_id: i64) -> Result<bool> {
        self.call(DELETE_CHECK, Some(&DeleteCheckOptions { check_id })).await
    }

    pub async fn transfer(&self, options: &TransferOptions) -> Result<Transfer> {
        self.call(TRANSFER, Some(options)).await
    }

    pub async fn get_invoices(&self, options: &GetInvoicesOptions) -> Result<Vec<Invoice>> {
        let result: Items<Invoice> = self.call(GET_INVOICES, Some(options)).await?;
        Ok(result.items)
    }

    pub async fn get_transfers(&self, options: &GetTransfersOptions) -> Result<Vec<Transfer>> {
        let result: Items<Transfer> = self.call(GET_TRANSFERS, Some(options)).await?;
        Ok(result.items)
    }

    pub async fn get_checks(&self, options: &GetChecksOptions) -> Result<Vec<Check>> {
        let result: Items<Check> = self.call(GET_CHECKS, Some(options)).await?;
        Ok(result.items)
    }

    pub async fn get_balance(&self) -> Result<Vec<Balance>> {
        self.call::<(), _>(GET_BALANCE, None).await
    }

    pub async fn get_exchange_rates(&self) -> Result<Vec<ExchangeRate>> {
        self.call::<(), _>(GET_EXCHANGE_RATES, None).await
    }

    pub async fn get_currencies(&self) -> Result<Vec<Currency>> {
        self.call::<(), _>(GET_CURRENCIES, None).await
    }

    pub async fn get_stats(&self, options: &GetStatsOptions) -> Result<AppStats> {
        self.call(GET_STATS, Some(options)).await
    }
}

#[async_trait]
impl InvoiceQuery for ApiClient {
    async fn query_invoices_by_ids(&self, ids: &[i64]) -> Result<Vec<Invoice>> {
        // getInvoices pages at 100 by default; ask for exactly as many as we name
        let options = GetInvoicesOptions {
            invoice_ids: Some(ids.to_vec()),
            count: Some(ids.len() as u32),
            ..Default::default()
        };
        self.get_invoices(&options).await
    }
}
