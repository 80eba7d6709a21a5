mod common;

use chrono::{TimeZone, Utc};
use clinic_checkout::application::normalizer::{self, normalize, validate};
use clinic_checkout::domain::plan::canonical_features;
use clinic_checkout::domain::session::{Session, SessionSource, SessionStatus};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

#[test]
fn test_normalize_is_total_over_random_payloads() {
    let mut rng = StdRng::seed_from_u64(0x5e55_1011);
    let now = Utc::now();

    for _ in 0..2_000 {
        let raw = common::random_payload(&mut rng);
        for source in [SessionSource::Checkout, SessionSource::Login, SessionSource::Register] {
            let session = normalize(&raw, source, now).session;

            assert!(validate(&session), "invalid session from {raw}");
            assert_eq!(session.plan.features, canonical_features());
            assert!(!session.registration_completed || session.account_created);
            assert_eq!(
                session.valid_until,
                Session::compute_valid_until(session.payment_date, session.plan.duration_months)
            );
            assert_eq!(session.source, source);
        }
    }
}

#[test]
fn test_non_object_inputs_default_everything() {
    let now = Utc::now();
    for raw in [json!(null), json!(42), json!("order"), json!([{"orderId": "x"}])] {
        let normalized = normalize(&raw, SessionSource::Checkout, now);
        assert!(validate(&normalized.session));
        assert!(normalized.was_defaulted("orderId"));
        assert_eq!(normalized.session.customer.contact_name, normalizer::DEFAULT_CONTACT_NAME);
        assert_eq!(normalized.session.plan.name, "Professional");
    }
}

#[test]
fn test_feature_parity_between_checkout_and_login() {
    let now = Utc::now();
    let checkout = normalize(
        &json!({ "plan": { "name": "Starter", "features": ["A"] } }),
        SessionSource::Checkout,
        now,
    )
    .session;
    let login = normalize(
        &json!({ "plan": "Starter", "planFeatures": ["B", "C"] }),
        SessionSource::Login,
        now,
    )
    .session;
    assert_eq!(checkout.plan.features, login.plan.features);
    assert_eq!(checkout.plan.features.len(), 8);
}

#[test]
fn test_identifiers_preserved_verbatim() {
    let raw = json!({ "orderId": "ORDER-123", "transactionId": "TXN-456" });
    let session = normalize(&raw, SessionSource::Checkout, Utc::now()).session;
    assert_eq!(session.order_id, "ORDER-123");
    assert_eq!(session.transaction_id, "TXN-456");
}

#[test]
fn test_identifiers_synthesized_from_clock() {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap();
    let normalized = normalize(&json!({}), SessionSource::Checkout, now);
    let millis = now.timestamp_millis();
    assert_eq!(normalized.session.order_id, format!("ORDER-{millis}"));
    assert_eq!(normalized.session.transaction_id, format!("TXN-{millis}"));
    assert!(normalized.was_defaulted("transactionId"));
}

#[test]
fn test_checkout_scenario_defaults() {
    let raw = json!({
        "customerName": "Dr. A",
        "email": "a@x.com",
        "plan": { "name": "Professional", "price": 5_000_000 },
        "amount": 5_000_000
    });
    let normalized = normalize(&raw, SessionSource::Checkout, Utc::now());
    let session = &normalized.session;

    assert_eq!(session.customer.contact_name, "Dr. A");
    assert_eq!(session.amount_minor_units, 5_000_000);
    assert_eq!(session.status, SessionStatus::Paid);
    assert_eq!(session.payment_method_id, "bank_transfer");
    assert!(!session.registration_completed);
    assert!(!session.account_created);
    assert!(normalized.was_defaulted("customer.clinicName"));
    assert!(!normalized.was_defaulted("customer.email"));
}

#[test]
fn test_login_defaults_to_registered() {
    let session = normalize(&json!({ "email": "a@x.com" }), SessionSource::Login, Utc::now()).session;
    assert!(session.registration_completed);
    assert!(session.account_created);
}

#[test]
fn test_epoch_millis_payment_date() {
    let paid = Utc.with_ymd_and_hms(2025, 11, 30, 0, 0, 0).unwrap();
    let raw = json!({ "paymentDate": paid.timestamp_millis(), "plan": { "durationMonths": 3 } });
    let session = normalize(&raw, SessionSource::Checkout, Utc::now()).session;
    assert_eq!(session.payment_date, paid);
    assert_eq!(session.valid_until, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
}

#[test]
fn test_restore_rejects_records_without_order() {
    let now = Utc::now();
    assert!(normalizer::restore(&json!({ "email": "a@x.com" }), "durable", now).is_err());
    assert!(normalizer::restore(&json!("ORDER-1"), "durable", now).is_err());

    let restored = normalizer::restore(
        &json!({ "orderId": "ORDER-1", "source": "checkout", "revision": 4 }),
        "durable",
        now,
    )
    .unwrap();
    assert_eq!(restored.source, SessionSource::Checkout);
    assert_eq!(restored.revision, 4);
}
