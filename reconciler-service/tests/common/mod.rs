#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use reconciler_service::api::{create_router, AppState};
use reconciler_service::*;
use shared::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Friday 2025-03-07 09:00 at UTC-6, outside every poll window.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 7, 15, 0, 0).unwrap()
}

/// 2025-03-07 08:30 at UTC-6, the first poll window of the day.
pub fn first_window() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 7, 14, 30, 0).unwrap()
}

pub fn order(id: i64, gateway: &str) -> CommerceOrder {
    serde_json::from_value(order_json(id, gateway)).unwrap()
}

pub fn order_json(id: i64, gateway: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("#{id}"),
        "email": "buyer@example.com",
        "total_price": "49.99",
        "currency": "USD",
        "payment_gateway_names": [gateway],
        "billing_address": {
            "first_name": "Ana",
            "last_name": "Lopez",
            "phone": "5551234",
            "address1": "1 Main St",
            "city": "Austin",
            "province": "TX",
            "zip": "78701",
            "country_code": "US"
        }
    })
}

pub fn card_payload(order_ref: &str, status: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "status": "success",
        "message": "",
        "content": [{"id": 8812, "status": status, "idOrderExt": order_ref, "url": "https://pay.example/8812"}]
    }))
    .unwrap()
}

#[derive(Default)]
pub struct RecordingPlatform {
    pub calls: Mutex<Vec<(i64, String, String)>>,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

impl RecordingPlatform {
    pub fn calls(&self) -> Vec<(i64, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommercePlatformClient for RecordingPlatform {
    async fn mark_order_paid(&self, order_id: i64, amount: &str, currency: &str) -> Result<()> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("platform returned 503"));
        }
        self.calls
            .lock()
            .unwrap()
            .push((order_id, amount.to_string(), currency.to_string()));
        Ok(())
    }
}

pub struct FakeAch {
    pub invoices: Mutex<Vec<InvoiceRequest>>,
    pub invoice_response: Mutex<Result<InvoiceCreated, String>>,
    pub checks: Mutex<HashMap<String, CheckStatus>>,
    pub invoice_checks: Mutex<HashMap<String, String>>,
    pub check_queries: AtomicU64,
    pub fail_status: AtomicBool,
}

impl Default for FakeAch {
    fn default() -> Self {
        Self {
            invoices: Mutex::default(),
            invoice_response: Mutex::new(Ok(InvoiceCreated {
                invoice_id: "INV-1".to_string(),
                check_id: None,
            })),
            checks: Mutex::default(),
            invoice_checks: Mutex::default(),
            check_queries: AtomicU64::new(0),
            fail_status: AtomicBool::new(false),
        }
    }
}

impl FakeAch {
    pub fn invoices(&self) -> Vec<InvoiceRequest> {
        self.invoices.lock().unwrap().clone()
    }

    pub fn respond_to_invoice(&self, response: Result<InvoiceCreated, String>) {
        *self.invoice_response.lock().unwrap() = response;
    }

    pub fn set_check(&self, check_id: &str, processed: bool, rejected: bool) {
        self.checks.lock().unwrap().insert(
            check_id.to_string(),
            CheckStatus {
                check_id: check_id.to_string(),
                processed,
                rejected,
                description: None,
            },
        );
    }

    pub fn set_invoice_check(&self, invoice_id: &str, check_id: &str) {
        self.invoice_checks
            .lock()
            .unwrap()
            .insert(invoice_id.to_string(), check_id.to_string());
    }

    pub fn set_status_failing(&self, failing: bool) {
        self.fail_status.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AchGatewayClient for FakeAch {
    async fn create_invoice(&self, invoice: &InvoiceRequest) -> Result<InvoiceCreated> {
        self.invoices.lock().unwrap().push(invoice.clone());
        self.invoice_response.lock().unwrap().clone().map_err(|e| anyhow!(e))
    }

    async fn check_status(&self, check_id: &str) -> Result<CheckStatus> {
        self.check_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(anyhow!("CheckStatus connection reset"));
        }
        self.checks
            .lock()
            .unwrap()
            .get(check_id)
            .cloned()
            .ok_or_else(|| anyhow!("CheckStatus Result=3 Description=unknown check"))
    }

    async fn invoice_status(&self, invoice_id: &str) -> Result<InvoiceStatus> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(anyhow!("InvoiceStatus connection reset"));
        }
        Ok(InvoiceStatus {
            invoice_id: invoice_id.to_string(),
            check_id: self.invoice_checks.lock().unwrap().get(invoice_id).cloned(),
            result: "0".to_string(),
            description: None,
        })
    }
}

#[derive(Default)]
pub struct FakeCard {
    pub orders: Mutex<Vec<CardOrderRequest>>,
    pub fail: AtomicBool,
}

impl FakeCard {
    pub fn orders(&self) -> Vec<CardOrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CardGatewayClient for FakeCard {
    async fn create_order(&self, order: &CardOrderRequest) -> Result<CardOrderCreated> {
        self.orders.lock().unwrap().push(order.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("createOrderExt returned 500"));
        }
        Ok(CardOrderCreated {
            gateway_order_id: format!("G-{}", order.external_order_ref),
            external_order_ref: Some(order.external_order_ref.clone()),
            checkout_url: format!("https://pay.example/{}", order.external_order_ref),
            status: "pending".to_string(),
        })
    }
}

pub const CALL_TIMEOUT: Duration = Duration::from_secs(1);

pub fn hold() -> chrono::Duration {
    chrono::Duration::hours(24)
}

pub struct Harness {
    pub store: InMemoryPaymentStore,
    pub ach: Arc<FakeAch>,
    pub card: Arc<FakeCard>,
    pub platform: Arc<RecordingPlatform>,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: InMemoryPaymentStore::new(),
            ach: Arc::new(FakeAch::default()),
            card: Arc::new(FakeCard::default()),
            platform: Arc::new(RecordingPlatform::default()),
            clock: ManualClock::new(start_time()),
        }
    }

    fn store(&self) -> Arc<dyn PaymentStore> {
        Arc::new(self.store.clone())
    }

    fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }

    pub fn intake(&self) -> OrderIntake {
        OrderIntake::new(
            self.store(),
            RailTags::default(),
            "Acme".to_string(),
            self.clock(),
            CALL_TIMEOUT,
        )
        .with_ach(self.ach.clone())
        .with_card(self.card.clone())
    }

    pub fn ach_callback(&self) -> AchCallbackHandler {
        AchCallbackHandler::new(
            self.store(),
            self.platform.clone(),
            self.clock(),
            hold(),
            CALL_TIMEOUT,
        )
            .with_verifier(self.ach.clone())
    }

    pub fn card_webhook(&self) -> CardWebhookHandler {
        CardWebhookHandler::new(self.store(), self.platform.clone(), self.clock(), CALL_TIMEOUT)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            hold: hold(),
            call_timeout: CALL_TIMEOUT,
            tick_interval: Duration::from_secs(60),
            schedule: PollSchedule::new(
                PollSchedule::parse_starts("08:30,13:30,16:30").unwrap(),
                PollSchedule::offset_from_minutes(-360).unwrap(),
                chrono::Duration::seconds(60),
            ),
        }
    }

    pub fn poller(&self) -> ReconciliationPoller {
        ReconciliationPoller::new(
            self.store(),
            self.ach.clone(),
            self.platform.clone(),
            self.clock(),
            self.poller_config(),
        )
    }

    pub fn router(&self) -> Router {
        create_router(AppState {
            intake: Arc::new(self.intake()),
            ach_callback: Arc::new(self.ach_callback()),
            card_webhook: Arc::new(self.card_webhook()),
        })
    }

    pub async fn only_ach(&self) -> AchPayment {
        let records = self.store.ach_records().await;
        assert_eq!(records.len(), 1, "expected exactly one ACH record");
        records.into_iter().next().unwrap()
    }

    pub async fn only_card(&self) -> CardPayment {
        let records = self.store.card_records().await;
        assert_eq!(records.len(), 1, "expected exactly one card record");
        records.into_iter().next().unwrap()
    }
}

/// In-memory store whose invoice write can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryPaymentStore,
    pub fail_record_invoice: AtomicBool,
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn insert_ach(&self, payment: AchPayment) -> Result<Inserted<AchPayment>> {
        self.inner.insert_ach(payment).await
    }

    async fn ach_by_id(&self, id: uuid::Uuid) -> Result<Option<AchPayment>> {
        self.inner.ach_by_id(id).await
    }

    async fn ach_by_check_id(&self, check_id: &str) -> Result<Option<AchPayment>> {
        self.inner.ach_by_check_id(check_id).await
    }

    async fn ach_awaiting_settlement(&self) -> Result<Vec<AchPayment>> {
        self.inner.ach_awaiting_settlement().await
    }

    async fn record_invoice(
        &self,
        id: uuid::Uuid,
        invoice_id: &str,
        check_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if self.fail_record_invoice.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset by peer"));
        }
        self.inner.record_invoice(id, invoice_id, check_id, at).await
    }

    async fn mark_invoice_error(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_invoice_error(id, at).await
    }

    async fn attach_check_id(&self, id: uuid::Uuid, check_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.attach_check_id(id, check_id, at).await
    }

    async fn mark_processed(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_processed(id, at).await
    }

    async fn mark_rejected(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_rejected(id, at).await
    }

    async fn claim_ach_paid(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.claim_ach_paid(id, at).await
    }

    async fn release_ach_paid(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.release_ach_paid(id, at).await
    }

    async fn mark_cleared(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_cleared(id, at).await
    }

    async fn mark_platform_payment_error(&self, id: uuid::Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_platform_payment_error(id, at).await
    }

    async fn insert_card(&self, payment: CardPayment) -> Result<Inserted<CardPayment>> {
        self.inner.insert_card(payment).await
    }

    async fn card_by_ref(&self, order_ref: &str) -> Result<Option<CardPayment>> {
        self.inner.card_by_ref(order_ref).await
    }

    async fn record_card_link(
        &self,
        id: uuid::Uuid,
        created: &CardOrderCreated,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.record_card_link(id, created, at).await
    }

    async fn record_card_event(
        &self,
        order_ref: &str,
        gateway_status: &str,
        payload: &serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner
            .record_card_event(order_ref, gateway_status, payload, at)
            .await
    }

    async fn claim_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.claim_card_paid(order_ref, at).await
    }

    async fn release_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.release_card_paid(order_ref, at).await
    }

    async fn mark_card_paid(&self, order_ref: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_card_paid(order_ref, at).await
    }

    async fn mark_card_failed(
        &self,
        order_ref: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.inner.mark_card_failed(order_ref, reason, at).await
    }
}
