#![allow(dead_code)]

use clinic_checkout::application::engine::{CheckoutEngine, CheckoutRequest, Dependencies};
use clinic_checkout::config::Config;
use clinic_checkout::domain::plan::PlanTier;
use clinic_checkout::domain::ports::{NotifierBox, SessionStorageBox};
use clinic_checkout::domain::session::CustomerInfo;
use clinic_checkout::infrastructure::in_memory::InMemorySessionStorage;
use clinic_checkout::infrastructure::simulated_gateway::SimulatedGateway;
use clinic_checkout::interfaces::notifier::BroadcastNotifier;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub fn customer() -> CustomerInfo {
    CustomerInfo {
        contact_name: "Dr. A".to_string(),
        email: "a@x.com".to_string(),
        phone: "+62 811 000 111".to_string(),
        clinic_name: "Klinik Sehat".to_string(),
    }
}

pub fn checkout_request(method_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        plan: PlanTier::Professional.plan(),
        customer: customer(),
        method_id: method_id.to_string(),
    }
}

pub struct Harness {
    pub engine: CheckoutEngine,
    pub gateway: SimulatedGateway,
    pub notifier: BroadcastNotifier,
}

/// An engine over the given durable tier, a fresh tab tier and a simulated gateway.
pub async fn harness(durable: SessionStorageBox) -> Harness {
    harness_with_tab(durable, Arc::new(InMemorySessionStorage::new())).await
}

pub async fn harness_with_tab(durable: SessionStorageBox, tab_scoped: SessionStorageBox) -> Harness {
    let gateway = SimulatedGateway::new();
    let notifier = BroadcastNotifier::default();
    let boxed: NotifierBox = Arc::new(notifier.clone());
    let engine = CheckoutEngine::init(
        &Config::default(),
        Dependencies {
            durable,
            tab_scoped,
            gateway: Arc::new(gateway.clone()),
            notifier: boxed,
        },
    )
    .await;
    Harness {
        engine,
        gateway,
        notifier,
    }
}

/// A loosely shaped order payload: random subsets of fields, random aliases,
/// and values of the wrong type.
pub fn random_payload<R: Rng>(rng: &mut R) -> Value {
    let junk = |rng: &mut R| -> Value {
        match rng.gen_range(0..7) {
            0 => Value::Null,
            1 => json!(rng.gen_range(-1_000_000i64..10_000_000)),
            2 => json!(rng.gen_bool(0.5)),
            3 => json!(""),
            4 => json!("   "),
            5 => json!([1, 2, 3]),
            _ => json!({ "nested": rng.r#gen::<u32>() }),
        }
    };

    let text_keys = [
        "customerName",
        "name",
        "contactName",
        "email",
        "phone",
        "clinicName",
        "orderId",
        "transactionId",
        "paymentMethod",
        "status",
        "paymentDate",
        "validUntil",
    ];
    let numeric_keys = ["amount", "price", "amountMinorUnits", "total"];
    let flag_keys = ["registrationCompleted", "accountCreated", "rememberMe"];

    let mut map = Map::new();
    for key in text_keys.iter().chain(numeric_keys.iter()).chain(flag_keys.iter()) {
        if !rng.gen_bool(0.5) {
            continue;
        }
        let value = if rng.gen_bool(0.3) {
            junk(rng)
        } else if numeric_keys.contains(key) {
            json!(rng.gen_range(1i64..20_000_000))
        } else if flag_keys.contains(key) {
            [json!(true), json!(false), json!("true"), json!(0)]
                .choose(rng)
                .cloned()
                .unwrap_or(Value::Null)
        } else {
            json!(format!("{key}-{}", rng.gen_range(0..1000)))
        };
        map.insert((*key).to_string(), value);
    }

    if rng.gen_bool(0.5) {
        let plan = if rng.gen_bool(0.5) {
            let name = ["Starter", "Professional", "Enterprise", "Custom"]
                .choose(rng)
                .copied()
                .unwrap_or("Custom");
            json!({
                "name": name,
                "price": junk(rng),
                "durationMonths": rng.gen_range(-3i64..48),
                "features": ["only one feature"],
            })
        } else {
            junk(rng)
        };
        map.insert("plan".to_string(), plan);
    }
    if rng.gen_bool(0.3) {
        map.insert(
            "customer".to_string(),
            json!({ "contactName": junk(rng), "email": "nested@clinic.test" }),
        );
    }
    Value::Object(map)
}
