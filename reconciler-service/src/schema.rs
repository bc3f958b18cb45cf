diesel::table! {
    ach_payments (id) {
        id -> Uuid,
        order_id -> Int8,
        order_name -> Varchar,
        amount -> Numeric,
        currency -> Varchar,
        invoice_id -> Nullable<Varchar>,
        check_id -> Nullable<Varchar>,
        status -> Varchar,
        is_cleared -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        last_status_at -> Timestamptz,
        processed_at -> Nullable<Timestamptz>,
        rejected_at -> Nullable<Timestamptz>,
        paid_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    card_payments (id) {
        id -> Uuid,
        order_id -> Int8,
        order_ref -> Varchar,
        order_name -> Varchar,
        amount -> Numeric,
        currency -> Varchar,
        customer_email -> Nullable<Varchar>,
        customer_name -> Nullable<Varchar>,
        customer_phone -> Nullable<Varchar>,
        gateway_order_id -> Nullable<Varchar>,
        checkout_url -> Nullable<Text>,
        gateway_status -> Nullable<Varchar>,
        status -> Varchar,
        is_cleared -> Bool,
        failure_reason -> Nullable<Text>,
        last_webhook_payload -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        last_status_at -> Timestamptz,
        last_event_at -> Nullable<Timestamptz>,
        processed_at -> Nullable<Timestamptz>,
        failed_at -> Nullable<Timestamptz>,
        paid_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    ach_payments,
    card_payments,
);
