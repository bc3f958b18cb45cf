use crate::store::PaymentStore;
use anyhow::Result;
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Gateway says the check was rejected. Not persisted here; the poller
    /// records rejections.
    Rejected,
    NotProcessed,
    NotFound,
    AlreadyCleared,
    /// Processed and now inside the holding period.
    Holding,
    Cleared,
    /// The record is in a state that cannot be settled from a callback.
    Conflict(AchStatus),
    PlatformFailed(String),
}

/// Synchronous settlement callback for the ACH rail.
pub struct AchCallbackHandler {
    store: Arc<dyn PaymentStore>,
    verifier: Option<Arc<dyn AchGatewayClient>>,
    platform: Arc<dyn CommercePlatformClient>,
    clock: Arc<dyn Clock>,
    hold: chrono::Duration,
    call_timeout: Duration,
    clears_directly: bool,
}

impl AchCallbackHandler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        platform: Arc<dyn CommercePlatformClient>,
        clock: Arc<dyn Clock>,
        hold: chrono::Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            verifier: None,
            platform,
            clock,
            hold,
            call_timeout,
            clears_directly: true,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn AchGatewayClient>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// When off, a verified callback only starts the holding period and the
    /// poller does the clearing. Records already inside the holding period are
    /// never cleared early either way.
    pub fn clears_directly(mut self, enabled: bool) -> Self {
        self.clears_directly = enabled;
        self
    }

    pub async fn handle(&self, check_id: &str, transaction_id: Option<&str>) -> Result<CallbackOutcome> {
        if let Some(outcome) = self.verify(check_id, transaction_id).await {
            return Ok(outcome);
        }

        let Some(record) = self.store.ach_by_check_id(check_id).await? else {
            warn!(check_id, transaction_id, "ACH callback for unknown check id");
            return Ok(CallbackOutcome::NotFound);
        };
        if record.is_cleared {
            return Ok(CallbackOutcome::AlreadyCleared);
        }
        if !record.status.can_transition_to(AchStatus::Cleared) {
            warn!(record_id = %record.id, check_id, status = %record.status, "ACH callback for a record that cannot clear");
            return Ok(CallbackOutcome::Conflict(record.status));
        }
        if let Some(processed_at) = record.processed_at {
            if self.clock.now() - processed_at < self.hold {
                info!(record_id = %record.id, order_id = record.order_id, check_id, %processed_at, "ACH callback inside holding period");
                return Ok(CallbackOutcome::Holding);
            }
        }

        if !self.clears_directly {
            if self.store.mark_processed(record.id, self.clock.now()).await? {
                info!(record_id = %record.id, order_id = record.order_id, check_id, "ACH callback started holding period");
            }
            return Ok(CallbackOutcome::Holding);
        }

        if !self.store.claim_ach_paid(record.id, self.clock.now()).await? {
            return self.lost_claim(&record).await;
        }

        let paid = bounded(
            self.call_timeout,
            "mark order paid",
            self.platform
                .mark_order_paid(record.order_id, &record.amount_string(), &record.currency),
        )
        .await;

        if let Err(e) = paid {
            error!(record_id = %record.id, order_id = record.order_id, check_id, "Failed to mark order paid from ACH callback: {e:#}");
            self.store.release_ach_paid(record.id, self.clock.now()).await?;
            return Ok(CallbackOutcome::PlatformFailed(format!("{e:#}")));
        }

        if !self.store.mark_cleared(record.id, self.clock.now()).await? {
            warn!(record_id = %record.id, order_id = record.order_id, check_id, "Order marked paid but ACH record was not moved to cleared");
        }
        info!(record_id = %record.id, order_id = record.order_id, check_id, transaction_id, "ACH payment cleared by callback");
        Ok(CallbackOutcome::Cleared)
    }

    /// Asks the gateway about the check. Query failures fall through so the
    /// callback is handled optimistically.
    async fn verify(&self, check_id: &str, transaction_id: Option<&str>) -> Option<CallbackOutcome> {
        let verifier = self.verifier.as_ref()?;
        match bounded(self.call_timeout, "CheckStatus", verifier.check_status(check_id)).await {
            Ok(status) if status.rejected => {
                info!(check_id, transaction_id, "ACH callback for rejected check");
                Some(CallbackOutcome::Rejected)
            }
            Ok(status) if !status.processed => Some(CallbackOutcome::NotProcessed),
            Ok(_) => None,
            Err(e) => {
                warn!(check_id, transaction_id, "ACH callback verification failed, continuing unverified: {e:#}");
                None
            }
        }
    }

    async fn lost_claim(&self, record: &AchPayment) -> Result<CallbackOutcome> {
        let current = self.store.ach_by_id(record.id).await?;
        Ok(match current {
            Some(current) if current.is_cleared => CallbackOutcome::AlreadyCleared,
            Some(current) => CallbackOutcome::Conflict(current.status),
            None => CallbackOutcome::NotFound,
        })
    }
}
