use super::catalog::FeeCatalog;
use super::event::ActivityEvent;
use super::money::Amount;
use super::payment::{PaymentRequest, ProviderFamily, Transaction};
use crate::error::{GatewayError, ProviderError, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One persistence horizon for the serialized session (durable or tab-scoped).
///
/// Values are raw strings so that corrupted records can be represented and
/// skipped by the caller instead of failing inside the backend.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

pub type SessionStorageBox = Arc<dyn SessionStorage>;

/// The single asynchronous call through which an adapter reaches its provider.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError>;
    async fn get(&self, path: &str) -> Result<Value, GatewayError>;
}

pub type GatewayBox = Arc<dyn Gateway>;

/// Common contract of the payment provider adapters.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn family(&self) -> ProviderFamily;

    fn catalog(&self) -> &FeeCatalog;

    /// Opens a provider transaction. Transport failures come back as a
    /// `Failed` transaction carrying the cause.
    async fn initiate(&self, request: &PaymentRequest) -> Result<Transaction, ProviderError>;

    /// Latest known state of a transaction; safe to call repeatedly.
    async fn check_status(&self, external_reference: &str) -> Result<Transaction, ProviderError>;

    /// Returns `false` for any payload that is malformed or does not match.
    fn verify_callback(&self, payload: &Value, signature: &str) -> bool;

    fn compute_fee(&self, amount: Amount, method_id: &str) -> Result<i64, ProviderError> {
        let method = self.catalog().find(method_id)?;
        if method.provider_family != self.family() {
            return Err(ProviderError::UnsupportedMethod(method_id.to_string()));
        }
        Ok(method.fee_rule.apply(amount))
    }
}

pub type ProviderBox = Arc<dyn PaymentProvider>;

/// Receives lifecycle events. Failures are logged by the caller and never
/// interrupt the pipeline.
#[async_trait]
pub trait ActivityNotifier: Send + Sync {
    async fn notify(
        &self,
        event: &ActivityEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

pub type NotifierBox = Arc<dyn ActivityNotifier>;
