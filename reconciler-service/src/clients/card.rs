use super::excerpt;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use num_traits::ToPrimitive;
use serde::Serialize;
use sha2::Sha256;
use shared::*;

type HmacSha256 = Hmac<Sha256>;

const CREATE_ORDER_SERVICE: &str = "createOrderExt";

/// Card gateway client. Every request is signed with the API secret.
pub struct HttpCardGateway {
    base_url: String,
    api_key: String,
    api_secret: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderExtBody<'a> {
    amount: f64,
    currency: &'a str,
    name: &'a str,
    mail: &'a str,
    phone_number: &'a str,
    dial_code: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    zip: &'a str,
    country: &'a str,
    id_order_ext: &'a str,
    language: &'a str,
    sms: bool,
    customer_service: &'a str,
}

impl HttpCardGateway {
    pub fn new(base_url: &str, api_key: &str, api_secret: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            api_secret: api_secret.trim().to_string(),
            http,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

/// Base64(HMAC-SHA256(secret, service + salt + api key + timestamp + body)).
pub(crate) fn sign(
    service: &str,
    salt: &str,
    api_key: &str,
    timestamp: &str,
    body: &str,
    secret: &str,
) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("HMAC key error: {}", e))?;
    mac.update(service.as_bytes());
    mac.update(salt.as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn order_created(envelope: &CardEnvelope) -> Result<CardOrderCreated> {
    let content = envelope
        .first_content()
        .ok_or_else(|| anyhow!("createOrderExt response has no content"))?;
    let gateway_order_id = content
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| anyhow!("createOrderExt response has no order id"))?;
    let checkout_url = content
        .url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| anyhow!("createOrderExt response has no checkout url"))?;

    let status = match content.normalized_status() {
        s if s.is_empty() => envelope.status.clone().unwrap_or_default(),
        s => s,
    };
    Ok(CardOrderCreated {
        gateway_order_id,
        external_order_ref: content.external_reference().map(ToString::to_string),
        checkout_url,
        status,
    })
}

#[async_trait]
impl CardGatewayClient for HttpCardGateway {
    async fn create_order(&self, order: &CardOrderRequest) -> Result<CardOrderCreated> {
        if !self.is_configured() {
            return Err(anyhow!("card gateway base url, API key or secret missing"));
        }

        let amount = order
            .amount
            .to_f64()
            .ok_or_else(|| anyhow!("amount {} is not representable", order.amount))?;
        let body = serde_json::to_string(&CreateOrderExtBody {
            amount,
            currency: &order.currency,
            name: &order.customer_name,
            mail: &order.email,
            phone_number: &order.phone,
            dial_code: &order.dial_code,
            address: &order.address,
            city: &order.city,
            state: &order.state,
            zip: &order.zip,
            country: &order.country,
            id_order_ext: &order.external_order_ref,
            language: &order.language,
            sms: order.sms,
            customer_service: &order.customer_service,
        })?;

        let salt = hex::encode(rand::random::<[u8; 16]>());
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign(
            CREATE_ORDER_SERVICE,
            &salt,
            &self.api_key,
            &timestamp,
            &body,
            &self.api_secret,
        )?;

        let resp = self
            .http
            .post(format!("{}/api/{CREATE_ORDER_SERVICE}", self.base_url))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("apiKey", &self.api_key)
            .header("salt", &salt)
            .header("timestamp", &timestamp)
            .header("signature", signature)
            .body(body)
            .send()
            .await
            .context("createOrderExt request failed")?;

        let status = resp.status();
        let raw = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("createOrderExt returned {status}: {}", excerpt(&raw)));
        }
        let envelope: CardEnvelope = serde_json::from_str(&raw)
            .with_context(|| format!("malformed createOrderExt response: {}", excerpt(&raw)))?;
        order_created(&envelope)
    }
}
