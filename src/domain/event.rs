use super::plan::Plan;
use super::session::CustomerInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    NewCustomer,
    StepProgress,
    OrderCompleted,
}

/// Checkout milestones reported through `StepProgress` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckoutStep {
    PaymentInitiated,
    PaymentConfirmed,
    SignedIn,
    RegistrationCompleted,
}

/// Lifecycle event handed to the activity notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub customer_info: CustomerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<CheckoutStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new_customer(customer: CustomerInfo, plan: Plan) -> Self {
        Self {
            kind: ActivityKind::NewCustomer,
            customer_info: customer,
            plan: Some(plan),
            step: None,
            amount: None,
            timestamp: Utc::now(),
        }
    }

    pub fn step(customer: CustomerInfo, step: CheckoutStep) -> Self {
        Self {
            kind: ActivityKind::StepProgress,
            customer_info: customer,
            plan: None,
            step: Some(step),
            amount: None,
            timestamp: Utc::now(),
        }
    }

    pub fn order_completed(customer: CustomerInfo, plan: Plan, amount: i64) -> Self {
        Self {
            kind: ActivityKind::OrderCompleted,
            customer_info: customer,
            plan: Some(plan),
            step: None,
            amount: Some(amount),
            timestamp: Utc::now(),
        }
    }
}
