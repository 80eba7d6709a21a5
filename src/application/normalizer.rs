//! Maps checkout, login and registration payloads onto the canonical session.
//!
//! Normalization is total: anything missing or of the wrong shape is replaced
//! by a documented default and reported in [`NormalizedSession::defaulted`],
//! so a paying customer is never blocked over missing metadata.

use crate::domain::plan::{Plan, PlanTier, canonical_features};
use crate::domain::session::{CustomerInfo, Session, SessionSource, SessionStatus};
use crate::error::{FALLBACK_METHOD_ID, StoreError};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_CONTACT_NAME: &str = "Clinic Administrator";
pub const DEFAULT_EMAIL: &str = "unknown@clinic.local";
pub const DEFAULT_PHONE: &str = "-";
pub const DEFAULT_CLINIC_NAME: &str = "My Clinic";
pub const DEFAULT_DURATION_MONTHS: u32 = 12;
pub const DEFAULT_MAX_USERS: u32 = 10;

/// A canonical session plus the field paths that had to be defaulted.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSession {
    pub session: Session,
    pub defaulted: Vec<&'static str>,
}

impl NormalizedSession {
    pub fn was_defaulted(&self, field: &str) -> bool {
        self.defaulted.contains(&field)
    }
}

/// Builds a canonical session from a partial payload. Never fails.
pub fn normalize(raw: &Value, source: SessionSource, now: DateTime<Utc>) -> NormalizedSession {
    let mut fields = Fields {
        raw,
        defaulted: Vec::new(),
    };

    let customer = CustomerInfo {
        contact_name: fields.string(
            "customer.contactName",
            &[
                &["customer", "contactName"],
                &["customerInfo", "contactName"],
                &["contactName"],
                &["customerName"],
                &["name"],
            ],
            DEFAULT_CONTACT_NAME,
        ),
        email: fields.string(
            "customer.email",
            &[&["customer", "email"], &["customerInfo", "email"], &["email"]],
            DEFAULT_EMAIL,
        ),
        phone: fields.string(
            "customer.phone",
            &[
                &["customer", "phone"],
                &["customerInfo", "phone"],
                &["phone"],
                &["phoneNumber"],
            ],
            DEFAULT_PHONE,
        ),
        clinic_name: fields.string(
            "customer.clinicName",
            &[
                &["customer", "clinicName"],
                &["customerInfo", "clinicName"],
                &["clinicName"],
                &["clinic"],
            ],
            DEFAULT_CLINIC_NAME,
        ),
    };

    let plan = fields.plan();

    let amount_minor_units = fields.positive_int(
        "amount",
        &[&["amount"], &["amountMinorUnits"], &["total"]],
        plan.price_minor_units,
    );
    let payment_method_id = fields.string(
        "paymentMethod",
        &[&["paymentMethod", "id"], &["paymentMethod"], &["paymentMethodId"], &["method"]],
        FALLBACK_METHOD_ID,
    );

    let millis = now.timestamp_millis();
    let order_id = fields.string_or_else(
        "orderId",
        &[&["orderId"], &["order_id"], &["order", "id"]],
        || format!("ORDER-{millis}"),
    );
    let transaction_id = fields.string_or_else(
        "transactionId",
        &[&["transactionId"], &["transaction_id"], &["externalReference"]],
        || format!("TXN-{millis}"),
    );

    let payment_date = fields.timestamp("paymentDate", &[&["paymentDate"], &["paidAt"]], now);
    let status = fields.parsed(
        "status",
        &[&["status"], &["paymentStatus"]],
        SessionStatus::Paid,
    );

    let registration_completed = fields.boolean(
        "registrationCompleted",
        &[&["registrationCompleted"]],
        source != SessionSource::Checkout,
    );
    let account_created =
        fields.boolean("accountCreated", &[&["accountCreated"]], registration_completed)
            || registration_completed;
    let remember_me = fields.boolean("rememberMe", &[&["rememberMe"]], false);

    let valid_until = Session::compute_valid_until(payment_date, plan.duration_months);
    if let Some(supplied) = fields.optional_timestamp(&[&["validUntil"]])
        && supplied != valid_until
    {
        debug!(%supplied, %valid_until, "Recomputed validUntil from payment date");
    }

    let registration_date = fields.optional_timestamp(&[&["registrationDate"]]);
    let credential_digest = fields.optional_string(&[&["credentialDigest"]]);
    let revision = fields
        .first(&[&["revision"]])
        .and_then(as_i64)
        .and_then(|r| u64::try_from(r).ok())
        .unwrap_or(0);

    let session = Session {
        customer,
        plan,
        order_id,
        transaction_id,
        amount_minor_units,
        payment_method_id,
        payment_date,
        status,
        registration_completed,
        account_created,
        valid_until,
        source,
        remember_me,
        registration_date,
        credential_digest,
        revision,
    };

    if !fields.defaulted.is_empty() {
        debug!(%source, defaulted = ?fields.defaulted, "Normalized session with defaults");
    }

    NormalizedSession {
        session,
        defaulted: fields.defaulted,
    }
}

/// Re-normalizes a persisted record, keeping the source it was stamped with.
///
/// A record must at least be an object carrying an `orderId`; anything else is
/// not a session at all.
pub fn restore(raw: &Value, tier: &str, now: DateTime<Utc>) -> Result<Session, StoreError> {
    let malformed = |reason: &str| StoreError::MalformedPersistedRecord {
        tier: tier.to_string(),
        reason: reason.to_string(),
    };

    if !raw.is_object() {
        return Err(malformed("record is not an object"));
    }
    match raw.get("orderId").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => {}
        _ => return Err(malformed("record has no orderId")),
    }

    // Records this crate wrote come back exactly as written.
    if let Ok(session) = serde_json::from_value::<Session>(raw.clone())
        && validate(&session)
        && (session.account_created || !session.registration_completed)
        && session.valid_until
            == Session::compute_valid_until(session.payment_date, session.plan.duration_months)
    {
        return Ok(session);
    }

    let source = raw
        .get("source")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(SessionSource::Login);

    Ok(normalize(raw, source, now).session)
}

/// Diagnostic check of the fields every dashboard screen relies on.
///
/// `registrationCompleted` is part of the required set too, but once typed as
/// a `bool` it cannot be absent.
pub fn validate(session: &Session) -> bool {
    let present = |s: &str| !s.trim().is_empty();

    present(&session.customer.contact_name)
        && present(&session.customer.email)
        && present(&session.customer.clinic_name)
        && present(&session.plan.name)
        && session.plan.price_minor_units > 0
        && present(&session.order_id)
        && session.amount_minor_units > 0
}

struct Fields<'a> {
    raw: &'a Value,
    defaulted: Vec<&'static str>,
}

impl<'a> Fields<'a> {
    fn first(&self, candidates: &[&[&str]]) -> Option<&'a Value> {
        candidates.iter().find_map(|path| lookup(self.raw, path))
    }

    fn first_with<T>(
        &self,
        candidates: &[&[&str]],
        extract: impl Fn(&'a Value) -> Option<T>,
    ) -> Option<T> {
        candidates
            .iter()
            .filter_map(|path| lookup(self.raw, path))
            .find_map(extract)
    }

    fn or_default<T>(&mut self, field: &'static str, value: Option<T>, default: impl FnOnce() -> T) -> T {
        value.unwrap_or_else(|| {
            self.defaulted.push(field);
            default()
        })
    }

    fn string(&mut self, field: &'static str, candidates: &[&[&str]], default: &str) -> String {
        self.string_or_else(field, candidates, || default.to_string())
    }

    fn string_or_else(
        &mut self,
        field: &'static str,
        candidates: &[&[&str]],
        default: impl FnOnce() -> String,
    ) -> String {
        let value = self.first_with(candidates, as_text);
        self.or_default(field, value, default)
    }

    fn optional_string(&self, candidates: &[&[&str]]) -> Option<String> {
        self.first_with(candidates, as_text)
    }

    fn positive_int(&mut self, field: &'static str, candidates: &[&[&str]], default: i64) -> i64 {
        let value = self.first_with(candidates, |v| as_i64(v).filter(|n| *n > 0));
        self.or_default(field, value, || default)
    }

    fn count(&mut self, field: &'static str, candidates: &[&[&str]], default: u32, min: u32) -> u32 {
        let value = self.first_with(candidates, |v| {
            as_i64(v)
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n >= min)
        });
        self.or_default(field, value, || default)
    }

    fn boolean(&mut self, field: &'static str, candidates: &[&[&str]], default: bool) -> bool {
        let value = self.first_with(candidates, as_bool);
        self.or_default(field, value, || default)
    }

    fn parsed<T: std::str::FromStr>(
        &mut self,
        field: &'static str,
        candidates: &[&[&str]],
        default: T,
    ) -> T {
        let value = self.first_with(candidates, |v| v.as_str().and_then(|s| s.parse().ok()));
        self.or_default(field, value, || default)
    }

    fn timestamp(
        &mut self,
        field: &'static str,
        candidates: &[&[&str]],
        default: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let value = self.optional_timestamp(candidates);
        self.or_default(field, value, || default)
    }

    fn optional_timestamp(&self, candidates: &[&[&str]]) -> Option<DateTime<Utc>> {
        self.first_with(candidates, as_timestamp)
    }

    fn plan(&mut self) -> Plan {
        // `plan` may arrive as a bare tier name instead of an object.
        let tier_name = self
            .first_with(&[&["plan", "name"], &["plan"], &["planName"]], as_text);
        let base = tier_name
            .as_deref()
            .and_then(|name| name.parse::<PlanTier>().ok())
            .unwrap_or_default()
            .plan();

        let name = self.or_default("plan.name", tier_name, || base.name.clone());
        let price_minor_units = self.positive_int(
            "plan.price",
            &[&["plan", "price"], &["plan", "priceMinorUnits"], &["planPrice"]],
            base.price_minor_units,
        );
        let duration_months = self.count(
            "plan.durationMonths",
            &[&["plan", "durationMonths"], &["plan", "duration"]],
            DEFAULT_DURATION_MONTHS,
            1,
        );
        let max_users = self.count("plan.maxUsers", &[&["plan", "maxUsers"]], DEFAULT_MAX_USERS, 1);
        let max_patients = self.count(
            "plan.maxPatients",
            &[&["plan", "maxPatients"]],
            base.max_patients,
            1,
        );
        let setup_time = self.string("plan.setupTime", &[&["plan", "setupTime"]], &base.setup_time);
        let training_hours = self.count(
            "plan.trainingHours",
            &[&["plan", "trainingHours"]],
            base.training_hours,
            0,
        );

        Plan {
            name,
            price_minor_units,
            duration_months,
            max_users,
            max_patients,
            setup_time,
            training_hours,
            // Always the canonical list, whatever the payload carried.
            features: canonical_features(),
        }
    }
}

fn lookup<'v>(raw: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter()
        .try_fold(raw, |value, key| value.as_object()?.get(*key))
        .filter(|v| !v.is_null())
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truthiness of a loosely typed flag (`true`, `"true"`, `1`, ...).
pub(crate) fn is_truthy(value: &Value) -> bool {
    as_bool(value) == Some(true)
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
