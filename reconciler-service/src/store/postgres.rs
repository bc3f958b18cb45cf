use super::{truncate_reason, Inserted, PaymentStore};
use crate::models::*;
use crate::schema::*;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::*;
use uuid::Uuid;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgPaymentStore {
    pool: DbPool,
}

impl PgPaymentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn ach_states(states: &[AchStatus]) -> Vec<&'static str> {
    states.iter().map(AchStatus::as_str).collect()
}

fn card_states(states: &[CardStatus]) -> Vec<&'static str> {
    states.iter().map(CardStatus::as_str).collect()
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_ach(&self, payment: AchPayment) -> Result<Inserted<AchPayment>> {
        let mut conn = self.pool.get().await?;
        let order_id = payment.order_id;

        let inserted = diesel::insert_into(ach_payments::table)
            .values(&DbAchPayment::from(payment.clone()))
            .on_conflict(ach_payments::order_id)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 1 {
            return Ok(Inserted::Created(payment));
        }

        let existing = ach_payments::table
            .filter(ach_payments::order_id.eq(order_id))
            .first::<DbAchPayment>(&mut conn)
            .await?;
        Ok(Inserted::Existing(existing.try_into()?))
    }

    async fn ach_by_id(&self, id: Uuid) -> Result<Option<AchPayment>> {
        let mut conn = self.pool.get().await?;
        ach_payments::table
            .filter(ach_payments::id.eq(id))
            .first::<DbAchPayment>(&mut conn)
            .await
            .optional()?
            .map(AchPayment::try_from)
            .transpose()
    }

    async fn ach_by_check_id(&self, check_id: &str) -> Result<Option<AchPayment>> {
        let mut conn = self.pool.get().await?;
        ach_payments::table
            .filter(ach_payments::check_id.eq(check_id))
            .first::<DbAchPayment>(&mut conn)
            .await
            .optional()?
            .map(AchPayment::try_from)
            .transpose()
    }

    async fn ach_awaiting_settlement(&self) -> Result<Vec<AchPayment>> {
        let mut conn = self.pool.get().await?;
        let rows = ach_payments::table
            .filter(ach_payments::is_cleared.eq(false))
            .filter(ach_payments::status.eq_any(ach_states(AchStatus::awaiting_settlement())))
            .order(ach_payments::created_at.asc())
            .load::<DbAchPayment>(&mut conn)
            .await?;
        rows.into_iter().map(AchPayment::try_from).collect()
    }

    async fn record_invoice(
        &self,
        id: Uuid,
        invoice_id: &str,
        check_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::InvoiceSent.predecessors()))),
        )
        .set((
            ach_payments::invoice_id.eq(Some(invoice_id)),
            ach_payments::check_id.eq(check_id),
            ach_payments::status.eq(AchStatus::InvoiceSent.as_str()),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_invoice_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::InvoiceError.predecessors()))),
        )
        .set((
            ach_payments::status.eq(AchStatus::InvoiceError.as_str()),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn attach_check_id(&self, id: Uuid, check_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::check_id.is_null())
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::awaiting_settlement()))),
        )
        .set((
            ach_payments::check_id.eq(Some(check_id)),
            ach_payments::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::processed_at.is_null())
                .filter(
                    ach_payments::status
                        .eq_any(ach_states(AchStatus::ProcessedPendingLag.predecessors())),
                ),
        )
        .set((
            ach_payments::status.eq(AchStatus::ProcessedPendingLag.as_str()),
            ach_payments::processed_at.eq(Some(at)),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_rejected(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::paid_at.is_null())
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::Rejected.predecessors()))),
        )
        .set((
            ach_payments::status.eq(AchStatus::Rejected.as_str()),
            ach_payments::rejected_at.eq(Some(at)),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn claim_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::paid_at.is_null())
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::Cleared.predecessors()))),
        )
        .set((
            ach_payments::paid_at.eq(Some(at)),
            ach_payments::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn release_ach_paid(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::paid_at.is_not_null())
                .filter(ach_payments::status.ne(AchStatus::Cleared.as_str())),
        )
        .set((
            ach_payments::paid_at.eq(None::<DateTime<Utc>>),
            ach_payments::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_cleared(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table
                .filter(ach_payments::id.eq(id))
                .filter(ach_payments::paid_at.is_not_null())
                .filter(ach_payments::status.eq_any(ach_states(AchStatus::Cleared.predecessors()))),
        )
        .set((
            ach_payments::status.eq(AchStatus::Cleared.as_str()),
            ach_payments::is_cleared.eq(true),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_platform_payment_error(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            ach_payments::table.filter(ach_payments::id.eq(id)).filter(
                ach_payments::status
                    .eq_any(ach_states(AchStatus::PlatformPaymentError.predecessors())),
            ),
        )
        .set((
            ach_payments::status.eq(AchStatus::PlatformPaymentError.as_str()),
            ach_payments::paid_at.eq(None::<DateTime<Utc>>),
            ach_payments::updated_at.eq(at),
            ach_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn insert_card(&self, payment: CardPayment) -> Result<Inserted<CardPayment>> {
        let mut conn = self.pool.get().await?;
        let order_id = payment.order_id;

        // order_id and order_ref are both unique; either conflict means a prior delivery.
        let inserted = diesel::insert_into(card_payments::table)
            .values(&DbCardPayment::from(payment.clone()))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 1 {
            return Ok(Inserted::Created(payment));
        }

        let existing = card_payments::table
            .filter(card_payments::order_id.eq(order_id))
            .first::<DbCardPayment>(&mut conn)
            .await?;
        Ok(Inserted::Existing(existing.try_into()?))
    }

    async fn card_by_ref(&self, order_ref: &str) -> Result<Option<CardPayment>> {
        let mut conn = self.pool.get().await?;
        card_payments::table
            .filter(card_payments::order_ref.eq(order_ref))
            .first::<DbCardPayment>(&mut conn)
            .await
            .optional()?
            .map(CardPayment::try_from)
            .transpose()
    }

    async fn record_card_link(
        &self,
        id: Uuid,
        created: &CardOrderCreated,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            card_payments::table
                .filter(card_payments::id.eq(id))
                .filter(card_payments::status.eq_any(card_states(CardStatus::LinkCreated.predecessors()))),
        )
        .set((
            card_payments::gateway_order_id.eq(Some(created.gateway_order_id.as_str())),
            card_payments::checkout_url.eq(Some(created.checkout_url.as_str())),
            card_payments::gateway_status.eq(Some(created.status.as_str())),
            card_payments::status.eq(CardStatus::LinkCreated.as_str()),
            card_payments::updated_at.eq(at),
            card_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn record_card_event(
        &self,
        order_ref: &str,
        gateway_status: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let target = card_payments::table.filter(card_payments::order_ref.eq(order_ref));
        let changed = if gateway_status.is_empty() {
            diesel::update(target)
                .set((
                    card_payments::last_webhook_payload.eq(Some(payload.clone())),
                    card_payments::last_event_at.eq(Some(at)),
                    card_payments::updated_at.eq(at),
                ))
                .execute(&mut conn)
                .await?
        } else {
            diesel::update(target)
                .set((
                    card_payments::gateway_status.eq(Some(gateway_status)),
                    card_payments::last_webhook_payload.eq(Some(payload.clone())),
                    card_payments::last_event_at.eq(Some(at)),
                    card_payments::updated_at.eq(at),
                ))
                .execute(&mut conn)
                .await?
        };
        Ok(changed > 0)
    }

    async fn claim_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            card_payments::table
                .filter(card_payments::order_ref.eq(order_ref))
                .filter(card_payments::paid_at.is_null())
                .filter(card_payments::status.eq_any(card_states(CardStatus::Paid.predecessors()))),
        )
        .set((
            card_payments::paid_at.eq(Some(at)),
            card_payments::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn release_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            card_payments::table
                .filter(card_payments::order_ref.eq(order_ref))
                .filter(card_payments::paid_at.is_not_null())
                .filter(card_payments::status.ne(CardStatus::Paid.as_str())),
        )
        .set((
            card_payments::paid_at.eq(None::<DateTime<Utc>>),
            card_payments::updated_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            card_payments::table
                .filter(card_payments::order_ref.eq(order_ref))
                .filter(card_payments::paid_at.is_not_null())
                .filter(card_payments::status.eq_any(card_states(CardStatus::Paid.predecessors()))),
        )
        .set((
            card_payments::status.eq(CardStatus::Paid.as_str()),
            card_payments::is_cleared.eq(true),
            card_payments::processed_at.eq(Some(at)),
            card_payments::updated_at.eq(at),
            card_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }

    async fn mark_card_failed(
        &self,
        order_ref: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let changed = diesel::update(
            card_payments::table
                .filter(card_payments::order_ref.eq(order_ref))
                .filter(card_payments::status.eq_any(card_states(CardStatus::Failed.predecessors()))),
        )
        .set((
            card_payments::status.eq(CardStatus::Failed.as_str()),
            card_payments::failure_reason.eq(Some(truncate_reason(reason))),
            card_payments::failed_at.eq(Some(at)),
            card_payments::updated_at.eq(at),
            card_payments::last_status_at.eq(at),
        ))
        .execute(&mut conn)
        .await?;
        Ok(changed > 0)
    }
}
