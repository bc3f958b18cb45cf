//! Payment record persistence.
//!
//! Every mutation is a single conditional update: it names the states the
//! record must currently be in and reports whether a row actually changed.
//! Callers treat `false` as "someone else got there first" and never retry
//! blindly. The paid timestamp is claimed before the commerce platform is
//! called, so only one caller per record can ever mark an order paid.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::*;
use uuid::Uuid;

pub use memory::InMemoryPaymentStore;
pub use postgres::PgPaymentStore;

/// Result of inserting a record under the one-record-per-order constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted<T> {
    Created(T),
    Existing(T),
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_ach(&self, payment: AchPayment) -> Result<Inserted<AchPayment>>;

    async fn ach_by_id(&self, id: Uuid) -> Result<Option<AchPayment>>;

    async fn ach_by_check_id(&self, check_id: &str) -> Result<Option<AchPayment>>;

    /// Uncleared records in `invoice_sent` or `processed_pending_lag`.
    async fn ach_awaiting_settlement(&self) -> Result<Vec<AchPayment>>;

    /// `pending_invoice -> invoice_sent`, storing the gateway's ids.
    async fn record_invoice(
        &self,
        id: Uuid,
        invoice_id: &str,
        check_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// `pending_invoice -> invoice_error`.
    async fn mark_invoice_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Stores a check id discovered after invoicing. Only fills an empty slot.
    async fn attach_check_id(&self, id: Uuid, check_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// `invoice_sent -> processed_pending_lag`, starting the holding period.
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    async fn mark_rejected(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Sets the paid timestamp if it is unset and the record may still clear.
    async fn claim_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Undoes a claim whose platform call failed.
    async fn release_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Claimed record -> `cleared`.
    async fn mark_cleared(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// `processed_pending_lag -> platform_payment_error`, dropping the claim.
    async fn mark_platform_payment_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    async fn insert_card(&self, payment: CardPayment) -> Result<Inserted<CardPayment>>;

    async fn card_by_ref(&self, order_ref: &str) -> Result<Option<CardPayment>>;

    /// `created -> link_created`, storing the checkout link.
    async fn record_card_link(
        &self,
        id: Uuid,
        created: &CardOrderCreated,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Stores the latest webhook payload and gateway status.
    async fn record_card_event(
        &self,
        order_ref: &str,
        gateway_status: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn claim_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn release_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn mark_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn mark_card_failed(
        &self,
        order_ref: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

pub(crate) const FAILURE_REASON_LIMIT: usize = 500;

pub(crate) fn truncate_reason(reason: &str) -> String {
    reason.chars().take(FAILURE_REASON_LIMIT).collect()
}
