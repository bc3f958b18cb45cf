use anyhow::anyhow;
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// ACH payment lifecycle:
/// `pending_invoice -> invoice_sent -> processed_pending_lag -> cleared`, with
/// `invoice_error`, `rejected` and `platform_payment_error` as failure exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchStatus {
    PendingInvoice,
    InvoiceSent,
    InvoiceError,
    ProcessedPendingLag,
    Cleared,
    Rejected,
    PlatformPaymentError,
}

impl AchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchStatus::PendingInvoice => "pending_invoice",
            AchStatus::InvoiceSent => "invoice_sent",
            AchStatus::InvoiceError => "invoice_error",
            AchStatus::ProcessedPendingLag => "processed_pending_lag",
            AchStatus::Cleared => "cleared",
            AchStatus::Rejected => "rejected",
            AchStatus::PlatformPaymentError => "platform_payment_error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AchStatus::Cleared
                | AchStatus::Rejected
                | AchStatus::InvoiceError
                | AchStatus::PlatformPaymentError
        )
    }

    /// States a record must be in to move into `self`.
    ///
    /// `invoice_sent -> cleared` is the synchronous callback's short-circuit;
    /// the poller only clears from `processed_pending_lag`.
    pub fn predecessors(&self) -> &'static [AchStatus] {
        match self {
            AchStatus::PendingInvoice => &[],
            AchStatus::InvoiceSent | AchStatus::InvoiceError => &[AchStatus::PendingInvoice],
            AchStatus::ProcessedPendingLag => &[AchStatus::InvoiceSent],
            AchStatus::Cleared | AchStatus::Rejected => {
                &[AchStatus::InvoiceSent, AchStatus::ProcessedPendingLag]
            }
            AchStatus::PlatformPaymentError => &[AchStatus::ProcessedPendingLag],
        }
    }

    pub fn can_transition_to(&self, next: AchStatus) -> bool {
        next.predecessors().contains(self)
    }

    /// States the reconciliation poller revisits on every sweep.
    pub fn awaiting_settlement() -> &'static [AchStatus] {
        &[AchStatus::InvoiceSent, AchStatus::ProcessedPendingLag]
    }
}

impl fmt::Display for AchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_invoice" => Ok(AchStatus::PendingInvoice),
            "invoice_sent" => Ok(AchStatus::InvoiceSent),
            "invoice_error" => Ok(AchStatus::InvoiceError),
            "processed_pending_lag" => Ok(AchStatus::ProcessedPendingLag),
            "cleared" => Ok(AchStatus::Cleared),
            "rejected" => Ok(AchStatus::Rejected),
            "platform_payment_error" => Ok(AchStatus::PlatformPaymentError),
            other => Err(anyhow!("unknown ACH status {other:?}")),
        }
    }
}

/// Card payment lifecycle: `created -> link_created -> {paid | failed}`.
/// A paid signal after a failed one is a customer retry and is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Created,
    LinkCreated,
    Paid,
    Failed,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Created => "created",
            CardStatus::LinkCreated => "link_created",
            CardStatus::Paid => "paid",
            CardStatus::Failed => "failed",
        }
    }

    pub fn predecessors(&self) -> &'static [CardStatus] {
        match self {
            CardStatus::Created => &[],
            CardStatus::LinkCreated => &[CardStatus::Created],
            CardStatus::Paid => &[CardStatus::Created, CardStatus::LinkCreated, CardStatus::Failed],
            CardStatus::Failed => &[CardStatus::Created, CardStatus::LinkCreated],
        }
    }

    pub fn can_transition_to(&self, next: CardStatus) -> bool {
        next.predecessors().contains(self)
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(CardStatus::Created),
            "link_created" => Ok(CardStatus::LinkCreated),
            "paid" => Ok(CardStatus::Paid),
            "failed" => Ok(CardStatus::Failed),
            other => Err(anyhow!("unknown card status {other:?}")),
        }
    }
}

/// Renders an amount the way the commerce platform expects it: two decimals,
/// half-up.
pub fn format_amount(amount: &BigDecimal) -> String {
    amount.with_scale_round(2, RoundingMode::HalfUp).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAchPayment {
    pub order_id: i64,
    pub order_name: String,
    pub amount: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchPayment {
    pub id: Uuid,
    pub order_id: i64,
    pub order_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub invoice_id: Option<String>,
    pub check_id: Option<String>,
    pub status: AchStatus,
    pub is_cleared: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_status_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl AchPayment {
    pub fn pending_invoice(new: NewAchPayment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            order_name: new.order_name,
            amount: new.amount,
            currency: new.currency,
            invoice_id: None,
            check_id: None,
            status: AchStatus::PendingInvoice,
            is_cleared: false,
            created_at: now,
            updated_at: now,
            last_status_at: now,
            processed_at: None,
            rejected_at: None,
            paid_at: None,
        }
    }

    pub fn amount_string(&self) -> String {
        format_amount(&self.amount)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCardPayment {
    pub order_id: i64,
    pub order_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardPayment {
    pub id: Uuid,
    pub order_id: i64,
    /// External order reference exchanged with the card gateway (`idOrderExt`).
    pub order_ref: String,
    pub order_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub gateway_order_id: Option<String>,
    pub checkout_url: Option<String>,
    pub gateway_status: Option<String>,
    pub status: CardStatus,
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

impl CardPayment {
    pub fn created(new: NewCardPayment, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: new.order_id,
            order_ref: new.order_id.to_string(),
            order_name: new.order_name,
            amount: new.amount,
            currency: new.currency,
            customer_email: new.customer_email,
            customer_name: new.customer_name,
            customer_phone: new.customer_phone,
            gateway_order_id: None,
            checkout_url: None,
            gateway_status: None,
            status: CardStatus::Created,
            is_cleared: false,
            failure_reason: None,
            last_webhook_payload: None,
            created_at: now,
            updated_at: now,
            last_status_at: now,
            last_event_at: None,
            processed_at: None,
            failed_at: None,
            paid_at: None,
        }
    }

    pub fn amount_string(&self) -> String {
        format_amount(&self.amount)
    }
}
