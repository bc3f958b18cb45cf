mod common;

use common::*;
use reconciler_service::*;
use shared::*;

#[tokio::test]
async fn ach_order_gets_one_record_and_one_invoice() {
    let h = Harness::new();

    let outcome = h.intake().receive(&order(1001, "Green Money")).await.unwrap();

    let record = h.only_ach().await;
    assert_eq!(
        outcome,
        IntakeOutcome::InvoiceSent {
            record_id: record.id,
            invoice_id: "INV-1".to_string()
        }
    );
    assert_eq!(record.order_id, 1001);
    assert_eq!(record.amount_string(), "49.99");
    assert_eq!(record.currency, "USD");
    assert_eq!(record.status, AchStatus::InvoiceSent);
    assert_eq!(record.invoice_id.as_deref(), Some("INV-1"));
    assert_eq!(record.check_id, None);
    assert!(!record.is_cleared);

    let invoices = h.ach.invoices();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].email, "buyer@example.com");
    assert_eq!(invoices[0].customer_name, "Ana Lopez");
    assert_eq!(invoices[0].amount, "49.99");
    assert_eq!(invoices[0].payment_date, "03/07/2025");
}

#[tokio::test]
async fn invoice_check_id_is_stored_when_returned() {
    let h = Harness::new();
    h.ach.respond_to_invoice(Ok(InvoiceCreated {
        invoice_id: "INV-2".to_string(),
        check_id: Some("CHK-2".to_string()),
    }));

    h.intake().receive(&order(1002, "Green Money")).await.unwrap();

    assert_eq!(h.only_ach().await.check_id.as_deref(), Some("CHK-2"));
}

#[tokio::test]
async fn unhandled_rail_creates_nothing() {
    let h = Harness::new();

    let outcome = h.intake().receive(&order(1003, "Cash on Delivery")).await.unwrap();

    assert_eq!(outcome, IntakeOutcome::Ignored);
    assert!(h.store.ach_records().await.is_empty());
    assert!(h.store.card_records().await.is_empty());
    assert!(h.ach.invoices().is_empty());
    assert!(h.card.orders().is_empty());
}

#[tokio::test]
async fn gateway_failure_is_terminal_invoice_error() {
    let h = Harness::new();
    h.ach.respond_to_invoice(Err("OneTimeInvoice returned 500".to_string()));

    let outcome = h.intake().receive(&order(1004, "Green Money")).await.unwrap();

    let record = h.only_ach().await;
    assert!(matches!(outcome, IntakeOutcome::InvoiceError { record_id, .. } if record_id == record.id));
    assert_eq!(record.status, AchStatus::InvoiceError);
    assert!(record.status.is_terminal());
}

#[tokio::test]
async fn missing_email_is_invoice_error_without_gateway_call() {
    let h = Harness::new();
    let mut order = order(1005, "Green Money");
    order.email = None;

    let outcome = h.intake().receive(&order).await.unwrap();

    assert!(matches!(outcome, IntakeOutcome::InvoiceError { .. }));
    assert_eq!(h.only_ach().await.status, AchStatus::InvoiceError);
    assert!(h.ach.invoices().is_empty());
}

#[tokio::test]
async fn unconfigured_ach_gateway_is_invoice_error() {
    let h = Harness::new();
    let intake = OrderIntake::new(
        std::sync::Arc::new(h.store.clone()),
        RailTags::default(),
        "Acme".to_string(),
        std::sync::Arc::new(h.clock.clone()),
        CALL_TIMEOUT,
    );

    let outcome = intake.receive(&order(1006, "Green Money")).await.unwrap();

    assert!(matches!(outcome, IntakeOutcome::InvoiceError { ref reason, .. } if reason.contains("not configured")));
    assert_eq!(h.only_ach().await.status, AchStatus::InvoiceError);
}

#[tokio::test]
async fn redelivered_ach_order_is_not_invoiced_twice() {
    let h = Harness::new();
    let intake = h.intake();

    intake.receive(&order(1007, "Green Money")).await.unwrap();
    let second = intake.receive(&order(1007, "Green Money")).await.unwrap();

    let record = h.only_ach().await;
    assert_eq!(
        second,
        IntakeOutcome::Duplicate {
            record_id: record.id,
            status: "invoice_sent".to_string()
        }
    );
    assert_eq!(h.ach.invoices().len(), 1);
}

#[tokio::test]
async fn card_order_gets_checkout_link() {
    let h = Harness::new();

    let outcome = h
        .intake()
        .receive(&order(2001, "Credit/Debit Card"))
        .await
        .unwrap();

    let record = h.only_card().await;
    assert_eq!(
        outcome,
        IntakeOutcome::LinkCreated {
            record_id: record.id,
            checkout_url: "https://pay.example/2001".to_string()
        }
    );
    assert_eq!(record.status, CardStatus::LinkCreated);
    assert_eq!(record.order_ref, "2001");
    assert_eq!(record.gateway_order_id.as_deref(), Some("G-2001"));
    assert_eq!(record.gateway_status.as_deref(), Some("pending"));

    let sent = h.card.orders();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].country, "United States");
    assert_eq!(sent[0].dial_code, "+1");
    assert_eq!(sent[0].address, "1 Main St");
}

#[tokio::test]
async fn card_gateway_failure_is_retryable() {
    let h = Harness::new();
    let intake = h.intake();
    h.card.set_failing(true);

    assert!(intake.receive(&order(2002, "Credit/Debit Card")).await.is_err());
    assert_eq!(h.only_card().await.status, CardStatus::Created);

    h.card.set_failing(false);
    let retried = intake.receive(&order(2002, "Credit/Debit Card")).await.unwrap();

    assert!(matches!(retried, IntakeOutcome::LinkCreated { .. }));
    assert_eq!(h.only_card().await.status, CardStatus::LinkCreated);
    assert_eq!(h.card.orders().len(), 2);
}

#[tokio::test]
async fn redelivered_card_order_after_link_is_duplicate() {
    let h = Harness::new();
    let intake = h.intake();

    intake.receive(&order(2003, "Credit/Debit Card")).await.unwrap();
    let second = intake.receive(&order(2003, "Credit/Debit Card")).await.unwrap();

    assert!(matches!(second, IntakeOutcome::Duplicate { ref status, .. } if status == "link_created"));
    assert_eq!(h.card.orders().len(), 1);
}

#[tokio::test]
async fn ach_tag_wins_when_both_rails_are_listed() {
    let h = Harness::new();
    let mut order = order(1008, "Green Money");
    order.payment_gateway_names.push("Credit/Debit Card".to_string());

    h.intake().receive(&order).await.unwrap();

    assert_eq!(h.store.ach_records().await.len(), 1);
    assert!(h.store.card_records().await.is_empty());
}

#[tokio::test]
async fn card_customer_name_follows_checkout_address() {
    let h = Harness::new();
    let mut json = order_json(2004, "Credit/Debit Card");
    json["shipping_address"] = serde_json::json!({
        "first_name": "Luis",
        "last_name": "Perez",
        "address1": "9 Elm Ave",
        "city": "Dallas",
        "country_code": "US"
    });
    let order: CommerceOrder = serde_json::from_value(json).unwrap();

    h.intake().receive(&order).await.unwrap();

    let sent = h.card.orders();
    assert_eq!(sent[0].customer_name, "Luis Perez");
    assert_eq!(sent[0].address, "9 Elm Ave");
    assert_eq!(h.only_card().await.customer_name.as_deref(), Some("Luis Perez"));
}

#[tokio::test]
async fn card_customer_name_defaults_when_address_is_unnamed() {
    let h = Harness::new();
    let mut json = order_json(2005, "Credit/Debit Card");
    json["billing_address"]["first_name"] = serde_json::Value::Null;
    json["billing_address"]["last_name"] = serde_json::Value::Null;
    json["customer"] = serde_json::json!({"first_name": "Ana", "last_name": "Lopez"});
    let order: CommerceOrder = serde_json::from_value(json).unwrap();

    h.intake().receive(&order).await.unwrap();

    assert_eq!(h.card.orders()[0].customer_name, "Customer");
}

#[tokio::test]
async fn unstored_invoice_still_ends_in_invoice_error() {
    let h = Harness::new();
    let store = std::sync::Arc::new(FlakyStore::default());
    store
        .fail_record_invoice
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let intake = OrderIntake::new(
        store.clone(),
        RailTags::default(),
        "Acme".to_string(),
        std::sync::Arc::new(h.clock.clone()),
        CALL_TIMEOUT,
    )
    .with_ach(h.ach.clone());

    let outcome = intake.receive(&order(1009, "Green Money")).await.unwrap();

    let records = store.inner.ach_records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, AchStatus::InvoiceError);
    assert!(matches!(
        outcome,
        IntakeOutcome::InvoiceError { ref reason, .. } if reason.contains("INV-1")
    ));
    assert_eq!(h.ach.invoices().len(), 1);
}
