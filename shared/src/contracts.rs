use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[async_trait]
pub trait CommercePlatformClient: Send + Sync {
    /// Records a successful capture of `amount` against the order.
    async fn mark_order_paid(&self, order_id: i64, amount: &str, currency: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub customer_name: String,
    pub email: String,
    pub item_name: String,
    pub item_description: String,
    pub amount: String,
    /// `MM/DD/YYYY`
    pub payment_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCreated {
    pub invoice_id: String,
    pub check_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub check_id: String,
    pub processed: bool,
    pub rejected: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceStatus {
    pub invoice_id: String,
    pub check_id: Option<String>,
    pub result: String,
    pub description: Option<String>,
}

impl InvoiceStatus {
    /// Check id of the debit behind the invoice. The gateway reports `"0"`
    /// (or nothing) until a real debit exists.
    pub fn debit_check_id(&self) -> Option<&str> {
        self.check_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "0")
    }
}

#[async_trait]
pub trait AchGatewayClient: Send + Sync {
    async fn create_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceCreated>;

    async fn check_status(&self, check_id: &str) -> Result<CheckStatus>;

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardOrderRequest {
    pub external_order_ref: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub dial_code: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
    pub language: String,
    pub sms: bool,
    pub customer_service: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardOrderCreated {
    pub gateway_order_id: String,
    pub external_order_ref: Option<String>,
    pub checkout_url: String,
    pub status: String,
}

#[async_trait]
pub trait CardGatewayClient: Send + Sync {
    async fn create_order(&self, order: &CardOrderRequest) -> Result<CardOrderCreated>;
}

/// Runs an upstream call under its own deadline; elapsing counts as a call
/// failure.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{operation} timed out after {limit:?}")),
    }
}
