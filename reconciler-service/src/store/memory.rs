use super::{truncate_reason, Inserted, PaymentStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory payment store.
///
/// Each conditional update runs under a single write lock, which gives the
/// same all-or-nothing behaviour as the keyed `UPDATE` statements of the
/// PostgreSQL store. Used by tests and local runs without a database.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentStore {
    ach: Arc<RwLock<HashMap<Uuid, AchPayment>>>,
    card: Arc<RwLock<HashMap<Uuid, CardPayment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ach_records(&self) -> Vec<AchPayment> {
        let mut records: Vec<_> = self.ach.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub async fn card_records(&self) -> Vec<CardPayment> {
        let mut records: Vec<_> = self.card.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    async fn update_ach<F>(&self, id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut AchPayment) -> bool + Send,
    {
        let mut records = self.ach.write().await;
        records.get_mut(&id).map(apply).unwrap_or(false)
    }

    async fn update_card<F>(&self, order_ref: &str, apply: F) -> bool
    where
        F: FnOnce(&mut CardPayment) -> bool + Send,
    {
        let mut records = self.card.write().await;
        records
            .values_mut()
            .find(|r| r.order_ref == order_ref)
            .map(apply)
            .unwrap_or(false)
    }
}

fn move_ach(record: &mut AchPayment, next: AchStatus, at: DateTime<Utc>) {
    record.status = next;
    record.updated_at = at;
    record.last_status_at = at;
}

fn move_card(record: &mut CardPayment, next: CardStatus, at: DateTime<Utc>) {
    record.status = next;
    record.updated_at = at;
    record.last_status_at = at;
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_ach(&self, payment: AchPayment) -> Result<Inserted<AchPayment>> {
        let mut records = self.ach.write().await;
        if let Some(existing) = records.values().find(|r| r.order_id == payment.order_id) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        records.insert(payment.id, payment.clone());
        Ok(Inserted::Created(payment))
    }

    async fn ach_by_id(&self, id: Uuid) -> Result<Option<AchPayment>> {
        Ok(self.ach.read().await.get(&id).cloned())
    }

    async fn ach_by_check_id(&self, check_id: &str) -> Result<Option<AchPayment>> {
        Ok(self
            .ach
            .read()
            .await
            .values()
            .find(|r| r.check_id.as_deref() == Some(check_id))
            .cloned())
    }

    async fn ach_awaiting_settlement(&self) -> Result<Vec<AchPayment>> {
        Ok(self
            .ach_records()
            .await
            .into_iter()
            .filter(|r| !r.is_cleared && AchStatus::awaiting_settlement().contains(&r.status))
            .collect())
    }

    async fn record_invoice(
        &self,
        id: Uuid,
        invoice_id: &str,
        check_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if !r.status.can_transition_to(AchStatus::InvoiceSent) {
                    return false;
                }
                r.invoice_id = Some(invoice_id.to_string());
                r.check_id = check_id.map(ToString::to_string);
                move_ach(r, AchStatus::InvoiceSent, at);
                true
            })
            .await)
    }

    async fn mark_invoice_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if !r.status.can_transition_to(AchStatus::InvoiceError) {
                    return false;
                }
                move_ach(r, AchStatus::InvoiceError, at);
                true
            })
            .await)
    }

    async fn attach_check_id(&self, id: Uuid, check_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.ach.write().await;
        if records
            .values()
            .any(|r| r.id != id && r.check_id.as_deref() == Some(check_id))
        {
            return Err(anyhow!("check id {check_id} already belongs to another payment"));
        }
        Ok(records
            .get_mut(&id)
            .map(|r| {
                if r.check_id.is_some() || !AchStatus::awaiting_settlement().contains(&r.status) {
                    return false;
                }
                r.check_id = Some(check_id.to_string());
                r.updated_at = at;
                true
            })
            .unwrap_or(false))
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if r.processed_at.is_some()
                    || !r.status.can_transition_to(AchStatus::ProcessedPendingLag)
                {
                    return false;
                }
                r.processed_at = Some(at);
                move_ach(r, AchStatus::ProcessedPendingLag, at);
                true
            })
            .await)
    }

    async fn mark_rejected(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if r.paid_at.is_some() || !r.status.can_transition_to(AchStatus::Rejected) {
                    return false;
                }
                r.rejected_at = Some(at);
                move_ach(r, AchStatus::Rejected, at);
                true
            })
            .await)
    }

    async fn claim_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if r.paid_at.is_some() || !r.status.can_transition_to(AchStatus::Cleared) {
                    return false;
                }
                r.paid_at = Some(at);
                r.updated_at = at;
                true
            })
            .await)
    }

    async fn release_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if r.paid_at.is_none() || r.status == AchStatus::Cleared {
                    return false;
                }
                r.paid_at = None;
                r.updated_at = at;
                true
            })
            .await)
    }

    async fn mark_cleared(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if r.paid_at.is_none() || !r.status.can_transition_to(AchStatus::Cleared) {
                    return false;
                }
                r.is_cleared = true;
                move_ach(r, AchStatus::Cleared, at);
                true
            })
            .await)
    }

    async fn mark_platform_payment_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_ach(id, |r| {
                if !r.status.can_transition_to(AchStatus::PlatformPaymentError) {
                    return false;
                }
                r.paid_at = None;
                move_ach(r, AchStatus::PlatformPaymentError, at);
                true
            })
            .await)
    }

    async fn insert_card(&self, payment: CardPayment) -> Result<Inserted<CardPayment>> {
        let mut records = self.card.write().await;
        if let Some(existing) = records
            .values()
            .find(|r| r.order_id == payment.order_id || r.order_ref == payment.order_ref)
        {
            return Ok(Inserted::Existing(existing.clone()));
        }
        records.insert(payment.id, payment.clone());
        Ok(Inserted::Created(payment))
    }

    async fn card_by_ref(&self, order_ref: &str) -> Result<Option<CardPayment>> {
        Ok(self
            .card
            .read()
            .await
            .values()
            .find(|r| r.order_ref == order_ref)
            .cloned())
    }

    async fn record_card_link(
        &self,
        id: Uuid,
        created: &CardOrderCreated,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut records = self.card.write().await;
        Ok(records
            .get_mut(&id)
            .map(|r| {
                if !r.status.can_transition_to(CardStatus::LinkCreated) {
                    return false;
                }
                r.gateway_order_id = Some(created.gateway_order_id.clone());
                r.checkout_url = Some(created.checkout_url.clone());
                r.gateway_status = Some(created.status.clone());
                move_card(r, CardStatus::LinkCreated, at);
                true
            })
            .unwrap_or(false))
    }

    async fn record_card_event(
        &self,
        order_ref: &str,
        gateway_status: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .update_card(order_ref, |r| {
                if !gateway_status.is_empty() {
                    r.gateway_status = Some(gateway_status.to_string());
                }
                r.last_webhook_payload = Some(payload.clone());
                r.last_event_at = Some(at);
                r.updated_at = at;
                true
            })
            .await)
    }

    async fn claim_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_card(order_ref, |r| {
                if r.paid_at.is_some() || !r.status.can_transition_to(CardStatus::Paid) {
                    return false;
                }
                r.paid_at = Some(at);
                r.updated_at = at;
                true
            })
            .await)
    }

    async fn release_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_card(order_ref, |r| {
                if r.paid_at.is_none() || r.status == CardStatus::Paid {
                    return false;
                }
                r.paid_at = None;
                r.updated_at = at;
                true
            })
            .await)
    }

    async fn mark_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_card(order_ref, |r| {
                if r.paid_at.is_none() || !r.status.can_transition_to(CardStatus::Paid) {
                    return false;
                }
                r.is_cleared = true;
                r.processed_at = Some(at);
                move_card(r, CardStatus::Paid, at);
                true
            })
            .await)
    }

    async fn mark_card_failed(
        &self,
        order_ref: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self
            .update_card(order_ref, |r| {
                if !r.status.can_transition_to(CardStatus::Failed) {
                    return false;
                }
                r.failure_reason = Some(truncate_reason(reason));
                r.failed_at = Some(at);
                move_card(r, CardStatus::Failed, at);
                true
            })
            .await)
    }
}
