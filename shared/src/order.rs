use anyhow::{anyhow, Context, Result};
use bigdecimal::BigDecimal;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subset of the commerce platform's order-created webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommerceOrder {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub total_price: String,
    pub currency: String,
    #[serde(default)]
    pub payment_gateway_names: Vec<String>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Address {
    pub fn full_name(&self) -> Option<String> {
        full_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

impl CommerceOrder {
    /// Parses `total_price` into a non-negative decimal amount.
    pub fn total_amount(&self) -> Result<BigDecimal> {
        let amount = BigDecimal::from_str(self.total_price.trim())
            .with_context(|| format!("invalid total_price {:?}", self.total_price))?;
        if amount.is_negative() {
            return Err(anyhow!("negative total_price {:?}", self.total_price));
        }
        Ok(amount)
    }

    /// Rejects payloads that cannot back a payment record.
    pub fn validate(&self) -> Result<BigDecimal> {
        if self.id <= 0 {
            return Err(anyhow!("order id must be positive, got {}", self.id));
        }
        if self.currency.trim().is_empty() {
            return Err(anyhow!("order {} has no currency", self.id));
        }
        self.total_amount()
    }

    /// First non-empty full name from billing, customer, then shipping details.
    pub fn customer_name(&self) -> Option<String> {
        let billing = self
            .billing_address
            .as_ref()
            .and_then(|a| full_name(a.first_name.as_deref(), a.last_name.as_deref()));
        let customer = self
            .customer
            .as_ref()
            .and_then(|c| full_name(c.first_name.as_deref(), c.last_name.as_deref()));
        let shipping = self
            .shipping_address
            .as_ref()
            .and_then(|a| full_name(a.first_name.as_deref(), a.last_name.as_deref()));

        billing.or(customer).or(shipping)
    }

    pub fn customer_email(&self) -> Option<String> {
        non_empty(self.email.as_deref())
            .or_else(|| self.customer.as_ref().and_then(|c| non_empty(c.email.as_deref())))
    }

    /// Address used for card checkout: shipping, falling back to billing.
    pub fn contact_address(&self) -> Option<&Address> {
        self.shipping_address
            .as_ref()
            .or(self.billing_address.as_ref())
    }
}

fn full_name(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let first = first.unwrap_or_default().trim();
    let last = last.unwrap_or_default().trim();
    non_empty(Some(&format!("{first} {last}")))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Country display name and phone dial code the card gateway expects for an
/// ISO country code. Unknown codes pass through unchanged with `+1`.
pub fn country_and_dial_code(country_code: &str) -> (String, &'static str) {
    match country_code.trim().to_ascii_uppercase().as_str() {
        "US" => ("United States".to_string(), "+1"),
        "CA" => ("Canada".to_string(), "+1"),
        "SV" => ("El Salvador".to_string(), "+503"),
        "CO" => ("Colombia".to_string(), "+57"),
        _ => (country_code.trim().to_string(), "+1"),
    }
}
