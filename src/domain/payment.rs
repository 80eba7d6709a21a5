use super::money::{Amount, FeeRule};
use super::plan::Plan;
use super::session::CustomerInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A class of payment gateway sharing one interaction shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderFamily {
    VirtualAccount,
    EWallet,
    Invoice,
    ManualTransfer,
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VirtualAccount => "virtual account",
            Self::EWallet => "e-wallet",
            Self::Invoice => "invoice",
            Self::ManualTransfer => "manual transfer",
        };
        f.write_str(name)
    }
}

/// A selectable payment method and the fee it charges.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: &'static str,
    pub provider_family: ProviderFamily,
    pub display_name: &'static str,
    /// Channel or bank code sent to the gateway.
    pub channel_code: &'static str,
    pub fee_rule: FeeRule,
    /// Marked for UI hinting as the recommended (cheapest) choice.
    pub recommended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionStatus {
    Initiated,
    Pending,
    Paid,
    Expired,
    Failed,
}

impl TransactionStatus {
    /// Whether a poller should keep asking the provider.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Initiated | Self::Pending)
    }
}

/// The outcome of an adapter call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub external_reference: String,
    pub method_id: String,
    pub status: TransactionStatus,
    pub amount_due: i64,
    pub fee: i64,
    pub expires_at: DateTime<Utc>,
    /// Rendering data for the UI (account number, QR string, redirect URL).
    /// Never interpreted by the pipeline.
    pub provider_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Transaction {
    pub fn failed(
        request: &PaymentRequest,
        fee: i64,
        expires_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            external_reference: request.order_id.clone(),
            method_id: request.method_id.clone(),
            status: TransactionStatus::Failed,
            amount_due: request.amount.minor_units().saturating_add(fee),
            fee,
            expires_at,
            provider_payload: Value::Null,
            failure_reason: Some(reason.into()),
        }
    }

    /// Reports `Expired` for an open transaction whose deadline has passed.
    pub fn expire_if_due(mut self, now: DateTime<Utc>) -> Self {
        if self.status.is_open() && now >= self.expires_at {
            self.status = TransactionStatus::Expired;
        }
        self
    }
}

/// Everything an adapter needs to open a provider transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub plan: Plan,
    pub customer: CustomerInfo,
    pub amount: Amount,
    pub method_id: String,
    /// Doubles as the provider's external reference.
    pub order_id: String,
}

/// Provider webhook body. Fields stay loose so a malformed callback can be
/// rejected instead of failing to deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub external_reference: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub signature: Option<String>,
}

impl CallbackPayload {
    /// Maps the provider's status word onto the transaction lifecycle.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        match self.status.to_ascii_uppercase().as_str() {
            "PAID" | "SETTLED" | "SUCCEEDED" | "COMPLETED" => Some(TransactionStatus::Paid),
            "PENDING" | "ACTIVE" => Some(TransactionStatus::Pending),
            "EXPIRED" => Some(TransactionStatus::Expired),
            "FAILED" | "VOIDED" | "INACTIVE" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}
