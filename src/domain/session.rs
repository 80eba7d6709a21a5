use super::plan::Plan;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub clinic_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Paid,
    Pending,
    Failed,
}

impl FromStr for SessionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" | "success" | "settled" | "completed" => Ok(Self::Paid),
            "pending" | "initiated" => Ok(Self::Pending),
            "failed" | "expired" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

/// Where a session record was first produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionSource {
    Checkout,
    Login,
    Register,
}

impl fmt::Display for SessionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checkout => "checkout",
            Self::Login => "login",
            Self::Register => "register",
        };
        f.write_str(name)
    }
}

impl FromStr for SessionSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "checkout" => Ok(Self::Checkout),
            "login" => Ok(Self::Login),
            "register" => Ok(Self::Register),
            _ => Err(()),
        }
    }
}

/// The canonical record asserting that a visitor purchased a plan.
///
/// Only the session store mutates a `Session`; everything else works on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub customer: CustomerInfo,
    pub plan: Plan,
    pub order_id: String,
    pub transaction_id: String,
    #[serde(rename = "amount")]
    pub amount_minor_units: i64,
    #[serde(rename = "paymentMethod")]
    pub payment_method_id: String,
    pub payment_date: DateTime<Utc>,
    pub status: SessionStatus,
    pub registration_completed: bool,
    pub account_created: bool,
    pub valid_until: DateTime<Utc>,
    pub source: SessionSource,
    pub remember_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_digest: Option<String>,
    #[serde(default)]
    pub revision: u64,
}

impl Session {
    /// `payment_date` plus the plan duration in calendar months.
    pub fn compute_valid_until(payment_date: DateTime<Utc>, duration_months: u32) -> DateTime<Utc> {
        payment_date
            .checked_add_months(Months::new(duration_months))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Moves the payment date and keeps `valid_until` in step with it.
    pub fn set_payment_date(&mut self, payment_date: DateTime<Utc>) {
        self.payment_date = payment_date;
        self.valid_until = Self::compute_valid_until(payment_date, self.plan.duration_months);
    }

    pub fn is_plan_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Paid && now < self.valid_until
    }
}
