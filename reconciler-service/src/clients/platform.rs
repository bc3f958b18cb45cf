use super::excerpt;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use shared::CommercePlatformClient;

/// Commerce platform Admin API client.
pub struct HttpCommercePlatform {
    store_domain: String,
    access_token: String,
    api_version: String,
    gateway_label: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TransactionRequest<'a> {
    transaction: Transaction<'a>,
}

#[derive(Debug, Serialize)]
struct Transaction<'a> {
    kind: &'a str,
    status: &'a str,
    amount: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    currency: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    gateway: &'a str,
}

impl HttpCommercePlatform {
    pub fn new(
        store_domain: &str,
        access_token: &str,
        api_version: &str,
        gateway_label: &str,
        http: reqwest::Client,
    ) -> Self {
        Self {
            store_domain: store_domain.trim().to_string(),
            access_token: access_token.trim().to_string(),
            api_version: api_version.trim().to_string(),
            gateway_label: gateway_label.trim().to_string(),
            http,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.store_domain.is_empty() && !self.access_token.is_empty()
    }

    fn transactions_url(&self, order_id: i64) -> String {
        format!(
            "https://{}/admin/api/{}/orders/{order_id}/transactions.json",
            self.store_domain, self.api_version
        )
    }
}

#[async_trait]
impl CommercePlatformClient for HttpCommercePlatform {
    async fn mark_order_paid(&self, order_id: i64, amount: &str, currency: &str) -> Result<()> {
        if !self.is_configured() {
            return Err(anyhow!("commerce platform store domain or access token missing"));
        }

        let body = TransactionRequest {
            transaction: Transaction {
                kind: "capture",
                status: "success",
                amount,
                currency,
                gateway: &self.gateway_label,
            },
        };
        let resp = self
            .http
            .post(self.transactions_url(order_id))
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("mark-paid request for order {order_id} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "mark-paid for order {order_id} returned {status}: {}",
                excerpt(&body)
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_transaction_shape() {
        let body = serde_json::to_value(TransactionRequest {
            transaction: Transaction {
                kind: "capture",
                status: "success",
                amount: "49.99",
                currency: "USD",
                gateway: "",
            },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"transaction": {"kind": "capture", "status": "success", "amount": "49.99", "currency": "USD"}})
        );
    }

    #[tokio::test]
    async fn unconfigured_platform_refuses_to_mark_paid() {
        let platform = HttpCommercePlatform::new("", "", "2024-10", "Green Money", reqwest::Client::new());
        assert!(!platform.is_configured());
        assert!(platform.mark_order_paid(1001, "49.99", "USD").await.is_err());
        let platform = HttpCommercePlatform::new("shop.example.com", "tok", "2024-10", "", reqwest::Client::new());
        assert_eq!(
            platform.transactions_url(1001),
            "https://shop.example.com/admin/api/2024-10/orders/1001/transactions.json"
        );
    }
}
