use crate::store::PaymentStore;
use serde::Deserialize;
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_FAILURE_REASON: &str = "Payment failed at card gateway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Malformed,
    MissingReference,
    UnknownOrder,
    AlreadyPaid,
    Paid,
    PlatformFailed,
    Failed,
    /// Status stored; nothing else to do.
    Recorded(String),
    StoreFailed,
}

/// Asynchronous settlement webhook for the card rail. Every delivery is
/// acknowledged; outcomes are only logged.
pub struct CardWebhookHandler {
    store: Arc<dyn PaymentStore>,
    platform: Arc<dyn CommercePlatformClient>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl CardWebhookHandler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        platform: Arc<dyn CommercePlatformClient>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            platform,
            clock,
            call_timeout,
        }
    }

    pub async fn handle(&self, body: &[u8]) -> WebhookOutcome {
        let payload: serde_json::Value = match serde_json::from_slice(body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Ignoring card webhook with invalid JSON: {e}");
                return WebhookOutcome::Malformed;
            }
        };
        let envelope = match CardEnvelope::deserialize(&payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring card webhook with unexpected shape: {e}");
                return WebhookOutcome::Malformed;
            }
        };

        let Some(content) = envelope.first_content() else {
            warn!("Card webhook carries no content item");
            return WebhookOutcome::MissingReference;
        };
        let Some(order_ref) = content.external_reference() else {
            warn!(gateway_order_id = content.id.as_deref(), "Card webhook without external order reference");
            return WebhookOutcome::MissingReference;
        };
        let status = content.normalized_status();

        match self
            .store
            .record_card_event(order_ref, &status, &payload, self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(order_ref, status = %status, "Card webhook for unknown order reference");
                return WebhookOutcome::UnknownOrder;
            }
            Err(e) => error!(order_ref, status = %status, "Failed to store card webhook payload: {e:#}"),
        }

        match CardSignal::from_status(&status) {
            CardSignal::Paid => self.mark_paid(order_ref).await,
            CardSignal::Failed => {
                let reason = envelope
                    .message
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or(DEFAULT_FAILURE_REASON);
                self.mark_failed(order_ref, reason).await
            }
            CardSignal::Other => WebhookOutcome::Recorded(status),
        }
    }

    async fn mark_paid(&self, order_ref: &str) -> WebhookOutcome {
        let record = match self.store.card_by_ref(order_ref).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(order_ref, "Paid card webhook for unknown order reference");
                return WebhookOutcome::UnknownOrder;
            }
            Err(e) => {
                error!(order_ref, "Failed to load card record: {e:#}");
                return WebhookOutcome::StoreFailed;
            }
        };
        if record.paid_at.is_some() || record.status == CardStatus::Paid {
            info!(record_id = %record.id, order_ref, "Card order already marked paid");
            return WebhookOutcome::AlreadyPaid;
        }

        match self.store.claim_card_paid(order_ref, self.clock.now()).await {
            Ok(true) => {}
            Ok(false) => return WebhookOutcome::AlreadyPaid,
            Err(e) => {
                error!(record_id = %record.id, order_ref, "Failed to claim card record: {e:#}");
                return WebhookOutcome::StoreFailed;
            }
        }

        let paid = bounded(
            self.call_timeout,
            "mark order paid",
            self.platform
                .mark_order_paid(record.order_id, &record.amount_string(), &record.currency),
        )
        .await;

        if let Err(e) = paid {
            error!(
                record_id = %record.id,
                order_id = record.order_id,
                order_ref,
                gateway_order_id = record.gateway_order_id.as_deref(),
                "Failed to mark card order paid, waiting for redelivery: {e:#}"
            );
            if let Err(e) = self.store.release_card_paid(order_ref, self.clock.now()).await {
                error!(record_id = %record.id, order_ref, "Failed to release card paid claim: {e:#}");
            }
            return WebhookOutcome::PlatformFailed;
        }

        match self.store.mark_card_paid(order_ref, self.clock.now()).await {
            Ok(_) => {
                info!(record_id = %record.id, order_id = record.order_id, order_ref, "Card payment captured, order marked paid");
                WebhookOutcome::Paid
            }
            Err(e) => {
                error!(record_id = %record.id, order_ref, "Order marked paid but card record not updated: {e:#}");
                WebhookOutcome::StoreFailed
            }
        }
    }

    async fn mark_failed(&self, order_ref: &str, reason: &str) -> WebhookOutcome {
        match self
            .store
            .mark_card_failed(order_ref, reason, self.clock.now())
            .await
        {
            Ok(true) => {
                info!(order_ref, reason, "Card payment failed");
                WebhookOutcome::Failed
            }
            Ok(false) => WebhookOutcome::Recorded(CardStatus::Failed.to_string()),
            Err(e) => {
                error!(order_ref, "Failed to record card failure: {e:#}");
                WebhookOutcome::StoreFailed
            }
        }
    }
}
