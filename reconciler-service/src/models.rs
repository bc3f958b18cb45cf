use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::ach_payments)]
pub struct DbAchPayment {
    pub id: Uuid,
    pub order_id: i64,
    pub order_name: String,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub invoice_id: Option<String>,
    pub check_id: Option<String>,
    pub status: String,
    pub is_cleared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_status_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::card_payments)]
pub struct DbCardPayment {
    pub id: Uuid,
    pub order_id: i64,
    pub order_ref: String,
    pub order_name: String,
    pub amount: bigdecimal::BigDecimal,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub gateway_order_id: Option<String>,
    pub checkout_url: Option<String>,
    pub gateway_status: Option<String>,
    pub status: String,
    pub is_cleared: bool,
    pub failure_reason: Option<String>,
    pub last_webhook_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_status_at: DateTime<Utc>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<AchPayment> for DbAchPayment {
    fn from(payment: AchPayment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            order_name: payment.order_name,
            amount: payment.amount,
            currency: payment.currency,
            invoice_id: payment.invoice_id,
            check_id: payment.check_id,
            status: payment.status.as_str().to_string(),
            is_cleared: payment.is_cleared,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            last_status_at: payment.last_status_at,
            processed_at: payment.processed_at,
            rejected_at: payment.rejected_at,
            paid_at: payment.paid_at,
        }
    }
}

impl TryFrom<DbAchPayment> for AchPayment {
    type Error = anyhow::Error;

    fn try_from(row: DbAchPayment) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            order_name: row.order_name,
            amount: row.amount,
            currency: row.currency,
            invoice_id: row.invoice_id,
            check_id: row.check_id,
            status: row.status.parse()?,
            is_cleared: row.is_cleared,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_status_at: row.last_status_at,
            processed_at: row.processed_at,
            rejected_at: row.rejected_at,
            paid_at: row.paid_at,
        })
    }
}

impl From<CardPayment> for DbCardPayment {
    fn from(payment: CardPayment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            order_ref: payment.order_ref,
            order_name: payment.order_name,
            amount: payment.amount,
            currency: payment.currency,
            customer_email: payment.customer_email,
            customer_name: payment.customer_name,
            customer_phone: payment.customer_phone,
            gateway_order_id: payment.gateway_order_id,
            checkout_url: payment.checkout_url,
            gateway_status: payment.gateway_status,
            status: payment.status.as_str().to_string(),
            is_cleared: payment.is_cleared,
            failure_reason: payment.failure_reason,
            last_webhook_payload: payment.last_webhook_payload,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            last_status_at: payment.last_status_at,
            last_event_at: payment.last_event_at,
            processed_at: payment.processed_at,
            failed_at: payment.failed_at,
            paid_at: payment.paid_at,
        }
    }
}

impl TryFrom<DbCardPayment> for CardPayment {
    type Error = anyhow::Error;

    fn try_from(row: DbCardPayment) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            order_ref: row.order_ref,
            order_name: row.order_name,
            amount: row.amount,
            currency: row.currency,
            customer_email: row.customer_email,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            gateway_order_id: row.gateway_order_id,
            checkout_url: row.checkout_url,
            gateway_status: row.gateway_status,
            status: row.status.parse()?,
            is_cleared: row.is_cleared,
            failure_reason: row.failure_reason,
            last_webhook_payload: row.last_webhook_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_status_at: row.last_status_at,
            last_event_at: row.last_event_at,
            processed_at: row.processed_at,
            failed_at: row.failed_at,
            paid_at: row.paid_at,
        })
    }
}
