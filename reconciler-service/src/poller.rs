use crate::schedule::{PollSchedule, WindowSlot};
use crate::store::PaymentStore;
use anyhow::{anyhow, Result};
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct PollerConfig {
    /// Holding period between a check being reported processed and the order
    /// being marked paid.
    pub hold: chrono::Duration,
    pub call_timeout: Duration,
    pub tick_interval: Duration,
    pub schedule: PollSchedule,
}

/// What one sweep did to one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The invoice has no real debit behind it yet.
    AwaitingDebit,
    NotProcessed,
    /// First processed observation; the holding period starts now.
    Processed,
    Holding,
    Cleared,
    Rejected,
    PlatformPaymentError,
    /// Another writer moved the record first.
    Superseded,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub steps: Vec<(Uuid, Step)>,
    pub errors: usize,
    pub interrupted: bool,
}

impl SweepReport {
    pub fn count(&self, step: Step) -> usize {
        self.steps.iter().filter(|(_, s)| *s == step).count()
    }
}

pub struct ReconciliationPoller {
    store: Arc<dyn PaymentStore>,
    ach: Arc<dyn AchGatewayClient>,
    platform: Arc<dyn CommercePlatformClient>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    last_window: Option<WindowSlot>,
}

impl ReconciliationPoller {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        ach: Arc<dyn AchGatewayClient>,
        platform: Arc<dyn CommercePlatformClient>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        Self {
            store,
            ach,
            platform,
            clock,
            config,
            last_window: None,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.tick_interval);
        info!(tick = ?self.config.tick_interval, hold = %self.config.hold, "Reconciliation poller started");

        loop {
            let ticked = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    false
                }
                _ = interval.tick() => true,
            };
            if *shutdown.borrow() {
                break;
            }
            if ticked {
                self.tick(&shutdown).await;
            }
        }

        info!("Reconciliation poller stopped");
    }

    /// Sweeps if a window is open and has not been swept yet.
    pub async fn tick(&mut self, shutdown: &watch::Receiver<bool>) -> Option<SweepReport> {
        let slot = self.config.schedule.window_at(self.clock.now())?;
        if self.last_window == Some(slot) {
            return None;
        }
        self.last_window = Some(slot);

        info!(date = %slot.date, window = slot.index, "Poll window open, sweeping");
        match self.sweep(shutdown).await {
            Ok(report) => {
                info!(
                    examined = report.steps.len(),
                    cleared = report.count(Step::Cleared),
                    rejected = report.count(Step::Rejected),
                    errors = report.errors,
                    "Sweep finished"
                );
                Some(report)
            }
            Err(e) => {
                error!("Error loading records for sweep: {e:#}");
                None
            }
        }
    }

    /// Visits every uncleared ACH record awaiting settlement. A failure on one
    /// record is logged and the sweep moves on.
    pub async fn sweep(&self, shutdown: &watch::Receiver<bool>) -> Result<SweepReport> {
        let records = self.store.ach_awaiting_settlement().await?;
        let mut report = SweepReport::default();

        for record in records {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }
            match self.process(&record).await {
                Ok(step) => report.steps.push((record.id, step)),
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        record_id = %record.id,
                        order_id = record.order_id,
                        invoice_id = record.invoice_id.as_deref(),
                        check_id = record.check_id.as_deref(),
                        "Failed to reconcile ACH record: {e:#}"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn process(&self, record: &AchPayment) -> Result<Step> {
        let check_id = match record.check_id.as_deref() {
            Some(check_id) => check_id.to_string(),
            None => match self.discover_check_id(record).await? {
                Some(check_id) => check_id,
                None => return Ok(Step::AwaitingDebit),
            },
        };

        let status = bounded(
            self.config.call_timeout,
            "CheckStatus",
            self.ach.check_status(&check_id),
        )
        .await?;

        if status.rejected {
            return if self.store.mark_rejected(record.id, self.clock.now()).await? {
                info!(record_id = %record.id, order_id = record.order_id, check_id, "ACH check rejected");
                Ok(Step::Rejected)
            } else {
                Ok(Step::Superseded)
            };
        }
        if !status.processed {
            return Ok(Step::NotProcessed);
        }

        let now = self.clock.now();
        match record.processed_at {
            None => {
                if !self.store.mark_processed(record.id, now).await? {
                    return Ok(Step::Superseded);
                }
                info!(record_id = %record.id, order_id = record.order_id, check_id, "ACH check processed, holding period started");
                Ok(Step::Processed)
            }
            Some(processed_at) if now - processed_at < self.config.hold => Ok(Step::Holding),
            Some(_) => self.settle(record, &check_id).await,
        }
    }

    /// Looks up the debit behind an invoice and stores its check id.
    async fn discover_check_id(&self, record: &AchPayment) -> Result<Option<String>> {
        let invoice_id = record
            .invoice_id
            .as_deref()
            .ok_or_else(|| anyhow!("record has neither an invoice id nor a check id"))?;

        let status = bounded(
            self.config.call_timeout,
            "InvoiceStatus",
            self.ach.invoice_status(invoice_id),
        )
        .await?;
        let Some(check_id) = status.debit_check_id() else {
            return Ok(None);
        };

        if !self
            .store
            .attach_check_id(record.id, check_id, self.clock.now())
            .await?
        {
            return Err(anyhow!("check id {check_id} could not be attached"));
        }
        info!(record_id = %record.id, invoice_id, check_id, "Discovered check id for invoice");
        Ok(Some(check_id.to_string()))
    }

    async fn settle(&self, record: &AchPayment, check_id: &str) -> Result<Step> {
        if !self.store.claim_ach_paid(record.id, self.clock.now()).await? {
            return Ok(Step::Superseded);
        }

        let paid = bounded(
            self.config.call_timeout,
            "mark order paid",
            self.platform
                .mark_order_paid(record.order_id, &record.amount_string(), &record.currency),
        )
        .await;

        match paid {
            Ok(()) => {
                if !self.store.mark_cleared(record.id, self.clock.now()).await? {
                    warn!(record_id = %record.id, order_id = record.order_id, check_id, "Order marked paid but ACH record was not moved to cleared");
                }
                info!(record_id = %record.id, order_id = record.order_id, check_id, "ACH payment cleared, order marked paid");
                Ok(Step::Cleared)
            }
            Err(e) => {
                error!(
                    record_id = %record.id,
                    order_id = record.order_id,
                    check_id,
                    "Commerce platform rejected mark-paid, manual follow-up needed: {e:#}"
                );
                self.store
                    .mark_platform_payment_error(record.id, self.clock.now())
                    .await?;
                Ok(Step::PlatformPaymentError)
            }
        }
    }
}
