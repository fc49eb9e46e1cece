//! Request and response records for the Crypto Pay API.
//!
//! Monetary values travel as decimal strings on the wire and are held as [`Decimal`].
//! Id lists in request options are sent comma-separated, which is what the API expects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{StringWithSeparator, formats::CommaSeparator, serde_as, skip_serializing_none};

use crate::errors::{Error, Result};

/// Supported crypto asset codes.
pub mod asset {
    pub const USDT: &str = "USDT";
    pub const TON: &str = "TON";
    pub const BTC: &str = "BTC";
    pub const ETH: &str = "ETH";
    pub const LTC: &str = "LTC";
    pub const BNB: &str = "BNB";
    pub const TRX: &str = "TRX";
    pub const USDC: &str = "USDC";
    pub const JET: &str = "JET";
}

/// Supported fiat currency codes.
pub mod fiat {
    pub const USD: &str = "USD";
    pub const EUR: &str = "EUR";
    pub const RUB: &str = "RUB";
    pub const BYN: &str = "BYN";
    pub const UAH: &str = "UAH";
    pub const GBP: &str = "GBP";
    pub const CNY: &str = "CNY";
    pub const KZT: &str = "KZT";
    pub const UZS: &str = "UZS";
    pub const GEL: &str = "GEL";
    pub const TRY: &str = "TRY";
    pub const AMD: &str = "AMD";
    pub const THB: &str = "THB";
    pub const INR: &str = "INR";
    pub const BRL: &str = "BRL";
    pub const IDR: &str = "IDR";
    pub const AZN: &str = "AZN";
    pub const AED: &str = "AED";
    pub const PLN: &str = "PLN";
    pub const ILS: &str = "ILS";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    #[default]
    Active,
    Paid,
    Expired,
    /// Any status this client does not know about yet
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyType {
    #[default]
    Crypto,
    Fiat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    #[default]
    Active,
    Activated,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    #[default]
    Completed,
    #[serde(other)]
    Unknown,
}

/// Label of the button shown to the user after an invoice is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaidButtonName {
    ViewItem,
    OpenChannel,
    OpenBot,
    Callback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    #[default]
    InvoicePaid,
    #[serde(other)]
    Unknown,
}

/// A payment request tracked by the remote service.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: i64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub currency_type: CurrencyType,
    pub asset: Option<String>,
    pub fiat: Option<String>,
    pub amount: Decimal,
    pub paid_asset: Option<String>,
    pub paid_amount: Option<Decimal>,
    pub paid_fiat_rate: Option<Decimal>,
    pub accepted_assets: Option<Vec<String>>,
    pub fee_asset: Option<String>,
    pub fee_amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    pub pay_url: Option<String>,
    #[serde(default)]
    pub bot_invoice_url: String,
    pub mini_app_invoice_url: Option<String>,
    pub web_app_invoice_url: Option<String>,
    pub description: Option<String>,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub paid_usd_rate: Option<Decimal>,
    pub usd_rate: Option<Decimal>,
    #[serde(default)]
    pub allow_comments: bool,
    #[serde(default)]
    pub allow_anonymous: bool,
    pub expiration_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_anonymously: Option<bool>,
    pub comment: Option<String>,
    pub hidden_message: Option<String>,
    pub payload: Option<String>,
    pub paid_btn_name: Option<PaidButtonName>,
    pub paid_btn_url: Option<String>,
}

impl Invoice {
    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: i64,
    #[serde(default)]
    pub spend_id: String,
    pub user_id: i64,
    pub asset: String,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub completed_at: DateTime<Utc>,
    pub comment: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub check_id: i64,
    pub hash: String,
    pub asset: String,
    pub amount: Decimal,
    pub bot_check_url: String,
    pub status: CheckStatus,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency_code: String,
    pub available: Decimal,
    #[serde(rename = "onhold", default)]
    pub on_hold: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub is_valid: bool,
    pub is_crypto: bool,
    pub is_fiat: bool,
    pub source: String,
    pub target: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub is_blockchain: bool,
    pub is_stablecoin: bool,
    pub is_fiat: bool,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub url: Option<String>,
    pub decimals: u32,
}

/// Basic information about the app owning the API token (`getMe`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_id: i64,
    pub name: String,
    pub payment_processing_bot_username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStats {
    pub volume: Decimal,
    pub conversion: Decimal,
    pub unique_users_count: i64,
    pub created_invoice_count: i64,
    pub paid_invoice_count: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Body of an inbound webhook request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookUpdate {
    pub update_id: i64,
    pub update_type: UpdateType,
    pub request_date: DateTime<Utc>,
    pub payload: Invoice,
}

// --- request options ---

#[serde_as]
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateInvoiceOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_type: Option<CurrencyType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiat: Option<String>,
    #[serde_as(as = "Option<StringWithSeparator::<CommaSeparator, String>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_assets: Option<Vec<String>>,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_btn_name: Option<PaidButtonName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_btn_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_comments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_anonymous: Option<bool>,
    /// Seconds until the invoice expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteInvoiceOptions {
    pub invoice_id: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateCheckOptions {
    pub asset: String,
    pub amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_to_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin_to_username: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeleteCheckOptions {
    pub check_id: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransferOptions {
    pub user_id: i64,
    pub asset: String,
    pub amount: Decimal,
    /// Idempotency key; the API rejects a second transfer with the same value
    pub spend_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_send_notification: Option<bool>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetInvoicesOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiat: Option<String>,
    #[serde_as(as = "Option<StringWithSeparator::<CommaSeparator, i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetTransfersOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde_as(as = "Option<StringWithSeparator::<CommaSeparator, i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spend_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Serialize)]
pub struct GetChecksOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde_as(as = "Option<StringWithSeparator::<CommaSeparator, i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GetStatsOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
}

// --- response envelope ---

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: i64,
    name: String,
}

impl<T> ApiResponse<T> {
    pub(crate) fn into_result(self, method: &'static str) -> Result<T> {
        if !self.ok {
            let (code, name) = self.error.map(|e| (e.code, e.name)).unwrap_or_else(|| (0, "UNKNOWN".to_string()));
            return Err(Error::Api { code, name, method });
        }
        self.result.ok_or(Error::MissingResult { method })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Items<T> {
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoice_deserializes_api_shape() {
        let invoice: Invoice = serde_json::from_value(json!({
            "invoice_id": 528890,
            "hash": "IVDoTcNBYEfk",
            "currency_type": "crypto",
            "asset": "TON",
            "amount": "12.5",
            "bot_invoice_url": "https://t.me/CryptoTestnetBot?start=IVDoTcNBYEfk",
            "status": "paid",
            "created_at": "2024-03-01T10:00:00.000Z",
            "paid_at": "2024-03-01T10:05:00.000Z",
            "allow_comments": true,
            "allow_anonymous": false,
            "paid_btn_name": "openBot",
            "payload": "order-42"
        }))
        .unwrap();

        assert_eq!(invoice.invoice_id, 528890);
        assert!(invoice.is_paid());
        assert_eq!(invoice.amount, Decimal::new(125, 1));
        assert_eq!(invoice.paid_btn_name, Some(PaidButtonName::OpenBot));
        assert_eq!(invoice.payload.as_deref(), Some("order-42"));
        assert!(invoice.paid_at.is_some());
        assert!(invoice.expiration_date.is_none());
    }

    #[test]
    fn test_unknown_invoice_status_is_tolerated() {
        let invoice: Invoice = serde_json::from_value(json!({
            "invoice_id": 1,
            "amount": "1",
            "status": "refunded",
            "created_at": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Unknown);
        assert!(!invoice.is_paid());
    }

    #[test]
    fn test_get_invoices_options_sends_comma_separated_ids() {
        let options = GetInvoicesOptions {
            invoice_ids: Some(vec![1, 22, 333]),
            count: Some(3),
            ..Default::default()
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value, json!({ "invoice_ids": "1,22,333", "count": 3 }));
    }

    #[test]
    fn test_create_invoice_options_omit_unset_fields() {
        let options = CreateInvoiceOptions {
            asset: Some(asset::USDT.to_string()),
            amount: Decimal::new(1050, 2),
            accepted_assets: Some(vec![asset::USDT.to_string(), asset::TON.to_string()]),
            paid_btn_name: Some(PaidButtonName::ViewItem),
            ..Default::default()
        };
        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({
                "asset": "USDT",
                "amount": "10.50",
                "accepted_assets": "USDT,TON",
                "paid_btn_name": "viewItem"
            })
        );
    }

    #[test]
    fn test_envelope_error_maps_to_api_error() {
        let response: ApiResponse<Invoice> = serde_json::from_value(json!({
            "ok": false,
            "error": { "code": 401, "name": "UNAUTHORIZED" }
        }))
        .unwrap();

        match response.into_result("getInvoices") {
            Err(Error::Api { code, name, method }) => {
                assert_eq!(code, 401);
                assert_eq!(name, "UNAUTHORIZED");
                assert_eq!(method, "getInvoices");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn test_envelope_without_result_is_an_error() {
        let response: ApiResponse<bool> = serde_json::from_value(json!({ "ok": true })).unwrap();
        assert!(matches!(response.into_result("deleteInvoice"), Err(Error::MissingResult { .. })));
    }
}
