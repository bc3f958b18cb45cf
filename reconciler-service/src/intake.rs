use crate::store::{Inserted, PaymentStore};
use anyhow::{anyhow, Result};
use serde::Serialize;
use shared::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What intake did with an order-created delivery. Serialized into the
/// acknowledgment body for operators; callers never branch on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntakeOutcome {
    Ignored,
    InvoiceSent { record_id: Uuid, invoice_id: String },
    InvoiceError { record_id: Uuid, reason: String },
    LinkCreated { record_id: Uuid, checkout_url: String },
    LinkUnavailable { record_id: Uuid, reason: String },
    Duplicate { record_id: Uuid, status: String },
}

pub struct OrderIntake {
    store: Arc<dyn PaymentStore>,
    ach: Option<Arc<dyn AchGatewayClient>>,
    card: Option<Arc<dyn CardGatewayClient>>,
    rails: RailTags,
    merchant_name: String,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl OrderIntake {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        rails: RailTags,
        merchant_name: String,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ach: None,
            card: None,
            rails,
            merchant_name,
            clock,
            call_timeout,
        }
    }

    pub fn with_ach(mut self, client: Arc<dyn AchGatewayClient>) -> Self {
        self.ach = Some(client);
        self
    }

    pub fn with_card(mut self, client: Arc<dyn CardGatewayClient>) -> Self {
        self.card = Some(client);
        self
    }

    /// Handles one order-created delivery.
    ///
    /// An `Err` means the caller must answer with a server error so the
    /// upstream redelivers: only the initial insert and the card link creation
    /// can fail that way. Everything else is an `Ok` outcome.
    pub async fn receive(&self, order: &CommerceOrder) -> Result<IntakeOutcome> {
        let Some(rail) = self.rails.classify(order.payment_gateway_names.as_slice()) else {
            info!(order_id = order.id, gateways = ?order.payment_gateway_names, "Order has no handled payment rail");
            return Ok(IntakeOutcome::Ignored);
        };

        let amount = order.validate()?;
        match rail {
            Rail::Ach => self.receive_ach(order, amount).await,
            Rail::Card => self.receive_card(order, amount).await,
        }
    }

    async fn receive_ach(
        &self,
        order: &CommerceOrder,
        amount: bigdecimal::BigDecimal,
    ) -> Result<IntakeOutcome> {
        let now = self.clock.now();
        let new = NewAchPayment {
            order_id: order.id,
            order_name: order.name.clone(),
            amount,
            currency: order.currency.trim().to_string(),
        };

        let record = match self.store.insert_ach(AchPayment::pending_invoice(new, now)).await? {
            Inserted::Created(record) => record,
            Inserted::Existing(existing) => {
                info!(order_id = order.id, record_id = %existing.id, status = %existing.status, "Duplicate ACH order delivery");
                return Ok(IntakeOutcome::Duplicate {
                    record_id: existing.id,
                    status: existing.status.to_string(),
                });
            }
        };

        match self.send_invoice(order, &record).await {
            Ok(created) => self.record_invoice(&record, created).await,
            Err(e) => {
                warn!(order_id = order.id, record_id = %record.id, "ACH invoice creation failed: {e:#}");
                self.invoice_error(&record, format!("{e:#}")).await
            }
        }
    }

    async fn send_invoice(&self, order: &CommerceOrder, record: &AchPayment) -> Result<InvoiceCreated> {
        let client = self
            .ach
            .as_ref()
            .ok_or_else(|| anyhow!("ACH gateway is not configured"))?;
        let invoice = self.invoice_request(order, record)?;

        let created = bounded(self.call_timeout, "OneTimeInvoice", client.create_invoice(&invoice)).await?;
        if created.invoice_id.trim().is_empty() {
            return Err(anyhow!("ACH gateway returned no invoice id"));
        }
        Ok(created)
    }

    async fn record_invoice(&self, record: &AchPayment, created: InvoiceCreated) -> Result<IntakeOutcome> {
        let invoice_id = created.invoice_id.trim();
        let check_id = created
            .check_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "0");

        match self
            .store
            .record_invoice(record.id, invoice_id, check_id, self.clock.now())
            .await
        {
            Ok(true) => {
                info!(order_id = record.order_id, record_id = %record.id, invoice_id, check_id, "ACH invoice sent");
                Ok(IntakeOutcome::InvoiceSent {
                    record_id: record.id,
                    invoice_id: invoice_id.to_string(),
                })
            }
            Ok(false) => {
                warn!(order_id = record.order_id, record_id = %record.id, invoice_id, "ACH record left pending_invoice before the invoice was stored");
                Ok(IntakeOutcome::Duplicate {
                    record_id: record.id,
                    status: AchStatus::PendingInvoice.to_string(),
                })
            }
            Err(e) => {
                error!(order_id = record.order_id, record_id = %record.id, invoice_id, check_id, "Failed to store ACH invoice: {e:#}");
                self.invoice_error(record, format!("invoice {invoice_id} created but not stored"))
                    .await
            }
        }
    }

    async fn invoice_error(&self, record: &AchPayment, reason: String) -> Result<IntakeOutcome> {
        if let Err(e) = self.store.mark_invoice_error(record.id, self.clock.now()).await {
            error!(order_id = record.order_id, record_id = %record.id, "Failed to record invoice_error: {e:#}");
        }
        Ok(IntakeOutcome::InvoiceError {
            record_id: record.id,
            reason,
        })
    }

    fn invoice_request(&self, order: &CommerceOrder, record: &AchPayment) -> Result<InvoiceRequest> {
        let email = order
            .customer_email()
            .ok_or_else(|| anyhow!("order {} has no customer email", order.id))?;

        Ok(InvoiceRequest {
            customer_name: invoice_customer_name(order),
            email,
            item_name: format!("Order {}", order.name),
            item_description: format!("{} order {} ({})", self.merchant_name, order.name, order.id),
            amount: record.amount_string(),
            payment_date: self.clock.now().format("%m/%d/%Y").to_string(),
        })
    }

    async fn receive_card(
        &self,
        order: &CommerceOrder,
        amount: bigdecimal::BigDecimal,
    ) -> Result<IntakeOutcome> {
        let new = NewCardPayment {
            order_id: order.id,
            order_name: order.name.clone(),
            amount,
            currency: order.currency.trim().to_string(),
            customer_email: order.customer_email(),
            customer_name: order.contact_address().and_then(Address::full_name),
            customer_phone: order.contact_address().and_then(|a| a.phone.clone()),
        };

        let record = match self
            .store
            .insert_card(CardPayment::created(new, self.clock.now()))
            .await?
        {
            Inserted::Created(record) => record,
            Inserted::Existing(existing) if existing.status == CardStatus::Created => {
                info!(order_id = order.id, record_id = %existing.id, "Retrying checkout link for existing card record");
                existing
            }
            Inserted::Existing(existing) => {
                info!(order_id = order.id, record_id = %existing.id, status = %existing.status, "Duplicate card order delivery");
                return Ok(IntakeOutcome::Duplicate {
                    record_id: existing.id,
                    status: existing.status.to_string(),
                });
            }
        };

        let Some(client) = self.card.as_ref() else {
            let reason = "card gateway is not configured";
            warn!(order_id = order.id, record_id = %record.id, "{reason}");
            self.store
                .mark_card_failed(&record.order_ref, reason, self.clock.now())
                .await?;
            return Ok(IntakeOutcome::LinkUnavailable {
                record_id: record.id,
                reason: reason.to_string(),
            });
        };

        let request = self.card_request(order, &record);
        let created = bounded(self.call_timeout, "createOrderExt", client.create_order(&request))
            .await
            .map_err(|e| {
                error!(order_id = order.id, record_id = %record.id, order_ref = %record.order_ref, "Card order creation failed: {e:#}");
                e
            })?;

        if !self
            .store
            .record_card_link(record.id, &created, self.clock.now())
            .await?
        {
            warn!(order_id = order.id, record_id = %record.id, "Card record moved on before its checkout link was stored");
        }
        info!(
            order_id = order.id,
            record_id = %record.id,
            gateway_order_id = %created.gateway_order_id,
            "Card checkout link created"
        );
        Ok(IntakeOutcome::LinkCreated {
            record_id: record.id,
            checkout_url: created.checkout_url,
        })
    }

    fn card_request(&self, order: &CommerceOrder, record: &CardPayment) -> CardOrderRequest {
        let address = order.contact_address().cloned().unwrap_or_default();
        let (country, dial_code) =
            country_and_dial_code(address.country_code.as_deref().unwrap_or_default());

        CardOrderRequest {
            external_order_ref: record.order_ref.clone(),
            amount: record.amount.clone(),
            currency: record.currency.clone(),
            // Name and address must describe the same person.
            customer_name: record
                .customer_name
                .clone()
                .unwrap_or_else(|| "Customer".to_string()),
            email: record.customer_email.clone().unwrap_or_default(),
            phone: address.phone.unwrap_or_default(),
            dial_code: dial_code.to_string(),
            address: address.address1.unwrap_or_default(),
            city: address.city.unwrap_or_default(),
            state: address.province.unwrap_or_default(),
            zip: address.zip.unwrap_or_default(),
            country,
            language: "English".to_string(),
            sms: false,
            customer_service: self.merchant_name.clone(),
        }
    }
}

fn invoice_customer_name(order: &CommerceOrder) -> String {
    order
        .customer_name()
        .or_else(|| Some(order.name.trim().to_string()).filter(|n| !n.is_empty()))
        .unwrap_or_else(|| "Customer".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPaymentStore;
    use chrono::{TimeZone, Utc};

    fn order() -> CommerceOrder {
        serde_json::from_value(serde_json::json!({
            "id": 1001,
            "name": "#1001",
            "email": "buyer@example.com",
            "total_price": "49.99",
            "currency": "USD",
            "payment_gateway_names": ["Green Money"],
            "shipping_address": {
                "first_name": "Ana",
                "last_name": "Lopez",
                "phone": "5551234",
                "address1": "1 Main St",
                "city": "Austin",
                "province": "TX",
                "zip": "78701",
                "country_code": "SV"
            }
        }))
        .unwrap()
    }

    fn intake() -> OrderIntake {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 7, 15, 0, 0).unwrap());
        OrderIntake::new(
            Arc::new(InMemoryPaymentStore::new()),
            RailTags::default(),
            "Acme".to_string(),
            Arc::new(clock),
            Duration::from_secs(15),
        )
    }

    #[test]
    fn invoice_fields_are_derived_from_the_order() {
        let intake = intake();
        let order = order();
        let record = AchPayment::pending_invoice(
            NewAchPayment {
                order_id: order.id,
                order_name: order.name.clone(),
                amount: order.total_amount().unwrap(),
                currency: "USD".to_string(),
            },
            Utc::now(),
        );

        let invoice = intake.invoice_request(&order, &record).unwrap();
        assert_eq!(invoice.customer_name, "Ana Lopez");
        assert_eq!(invoice.email, "buyer@example.com");
        assert_eq!(invoice.item_name, "Order #1001");
        assert_eq!(invoice.item_description, "Acme order #1001 (1001)");
        assert_eq!(invoice.amount, "49.99");
        assert_eq!(invoice.payment_date, "03/07/2025");
    }

    #[test]
    fn invoice_needs_an_email() {
        let intake = intake();
        let mut order = order();
        order.email = None;
        let record = AchPayment::pending_invoice(
            NewAchPayment {
                order_id: order.id,
                order_name: order.name.clone(),
                amount: order.total_amount().unwrap(),
                currency: "USD".to_string(),
            },
            Utc::now(),
        );
        assert!(intake.invoice_request(&order, &record).is_err());
    }

    #[test]
    fn customer_name_falls_back_to_order_reference() {
        let mut order = order();
        order.shipping_address = None;
        assert_eq!(invoice_customer_name(&order), "#1001");
        order.name = " ".to_string();
        assert_eq!(invoice_customer_name(&order), "Customer");
    }

    #[test]
    fn card_request_uses_country_lookup() {
        let intake = intake();
        let order = order();
        let record = CardPayment::created(
            NewCardPayment {
                order_id: order.id,
                order_name: order.name.clone(),
                amount: order.total_amount().unwrap(),
                currency: "USD".to_string(),
                customer_email: order.customer_email(),
                customer_name: order.contact_address().and_then(Address::full_name),
                customer_phone: None,
            },
            Utc::now(),
        );

        let request = intake.card_request(&order, &record);
        assert_eq!(request.external_order_ref, "1001");
        assert_eq!(request.customer_name, "Ana Lopez");
        assert_eq!(request.country, "El Salvador");
        assert_eq!(request.dial_code, "+503");
        assert_eq!(request.phone, "5551234");
        assert_eq!(request.city, "Austin");
        assert_eq!(request.state, "TX");
        assert_eq!(request.language, "English");
        assert!(!request.sms);
        assert_eq!(request.customer_service, "Acme");
    }
}
