//! Payment provider adapters, one per provider family, behind the
//! [`PaymentProvider`](crate::domain::ports::PaymentProvider) port.

pub mod ewallet;
pub mod invoice;
pub mod manual_transfer;
pub mod virtual_account;

use crate::domain::catalog::FeeCatalog;
use crate::domain::payment::{PaymentMethod, PaymentRequest, ProviderFamily, Transaction};
use crate::domain::ports::{GatewayBox, ProviderBox};
use crate::error::{GatewayError, ProviderError};
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub use ewallet::EWalletProvider;
pub use invoice::InvoiceProvider;
pub use manual_transfer::ManualTransferProvider;
pub use virtual_account::VirtualAccountProvider;

/// Signs and checks provider callbacks with the merchant's shared secret.
///
/// The signature is `hex(sha256("{reference}|{amount}|{merchant}|{secret}"))`.
pub struct CallbackSigner {
    merchant_id: String,
    secret: SecretString,
}

impl CallbackSigner {
    pub fn new(merchant_id: impl Into<String>, secret: SecretString) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            secret,
        }
    }

    pub fn sign(&self, external_reference: &str, amount: i64) -> String {
        let message = format!(
            "{external_reference}|{amount}|{}|{}",
            self.merchant_id,
            self.secret.expose_secret()
        );
        hex::encode(Sha256::digest(message.as_bytes()))
    }

    /// `false` for missing fields, wrong types, or a mismatching signature.
    pub fn verify(&self, payload: &Value, signature: &str) -> bool {
        let signature = signature.trim();
        if signature.is_empty() {
            return false;
        }
        let Some(reference) = payload
            .get("externalReference")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
        else {
            return false;
        };
        let Some(amount) = payload.get("amount").and_then(Value::as_i64) else {
            return false;
        };
        if payload.get("status").and_then(Value::as_str).is_none() {
            return false;
        }
        self.sign(reference, amount).eq_ignore_ascii_case(signature)
    }
}

/// State shared by the gateway-backed adapters.
pub(crate) struct GatewayCore {
    pub catalog: FeeCatalog,
    pub gateway: GatewayBox,
    pub signer: Arc<CallbackSigner>,
    pub ttl: Duration,
}

impl GatewayCore {
    /// Looks up `method_id` and checks it belongs to `family`.
    pub fn method(&self, family: ProviderFamily, method_id: &str) -> Result<&PaymentMethod, ProviderError> {
        let method = self.catalog.find(method_id)?;
        if method.provider_family != family {
            return Err(ProviderError::UnsupportedMethod(method_id.to_string()));
        }
        Ok(method)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }
}

/// Adapters keyed by the family they serve.
#[derive(Clone)]
pub struct ProviderRegistry {
    catalog: FeeCatalog,
    providers: HashMap<ProviderFamily, ProviderBox>,
    manual_transfer: Option<Arc<ManualTransferProvider>>,
}

impl ProviderRegistry {
    pub fn new(catalog: FeeCatalog) -> Self {
        Self {
            catalog,
            providers: HashMap::new(),
            manual_transfer: None,
        }
    }

    /// Wires the four built-in adapters over one gateway.
    pub fn with_builtin(
        catalog: FeeCatalog,
        gateway: GatewayBox,
        signer: Arc<CallbackSigner>,
        ttl: Duration,
    ) -> Self {
        let core = || GatewayCore {
            catalog: catalog.clone(),
            gateway: gateway.clone(),
            signer: signer.clone(),
            ttl,
        };
        let manual_transfer = Arc::new(ManualTransferProvider::new(
            catalog.clone(),
            signer.clone(),
            ttl,
        ));
        let mut registry = Self::new(catalog.clone())
            .register(Arc::new(VirtualAccountProvider::new(core())))
            .register(Arc::new(EWalletProvider::new(core())))
            .register(Arc::new(InvoiceProvider::new(core())))
            .register(manual_transfer.clone());
        registry.manual_transfer = Some(manual_transfer);
        registry
    }

    pub fn register(mut self, provider: ProviderBox) -> Self {
        self.providers.insert(provider.family(), provider);
        self
    }

    pub fn catalog(&self) -> &FeeCatalog {
        &self.catalog
    }

    /// The built-in manual transfer adapter, for out-of-band confirmation.
    pub fn manual_transfer(&self) -> Option<&ManualTransferProvider> {
        self.manual_transfer.as_deref()
    }

    pub fn for_family(&self, family: ProviderFamily) -> Option<ProviderBox> {
        self.providers.get(&family).cloned()
    }

    /// The adapter serving `method_id`.
    pub fn for_method(&self, method_id: &str) -> Result<ProviderBox, ProviderError> {
        let method = self.catalog.find(method_id)?;
        self.for_family(method.provider_family)
            .ok_or_else(|| ProviderError::UnsupportedMethod(method_id.to_string()))
    }
}

pub(crate) fn str_at<'v>(value: &'v Value, path: &[&str]) -> Option<&'v str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
}

pub(crate) fn i64_at(value: &Value, path: &[&str]) -> Option<i64> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_i64)
}

pub(crate) fn timestamp_at(value: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    str_at(value, path)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Metadata echoed back by the gateway so a status response can be parsed
/// without local state.
pub(crate) fn metadata(request: &PaymentRequest, fee: i64, expires_at: DateTime<Utc>) -> Value {
    json!({
        "orderId": request.order_id,
        "methodId": request.method_id,
        "fee": fee,
        "expiresAt": expires_at.to_rfc3339(),
    })
}

/// Turns the gateway's answer to a creation call into a transaction.
/// Transport failures and unparseable answers become `Failed` transactions.
pub(crate) fn opened(
    family: ProviderFamily,
    response: Result<Value, GatewayError>,
    request: &PaymentRequest,
    fee: i64,
    expires_at: DateTime<Utc>,
    parse: impl FnOnce(&Value) -> Option<Transaction>,
) -> Transaction {
    match response {
        Ok(body) => parse(&body).unwrap_or_else(|| {
            warn!(%family, order_id = %request.order_id, "Unparseable gateway response");
            Transaction::failed(request, fee, expires_at, "malformed gateway response")
        }),
        Err(e) => {
            warn!(%family, order_id = %request.order_id, error = %e, "Payment initiation failed");
            Transaction::failed(request, fee, expires_at, e.to_string())
        }
    }
}

/// Status responses must parse; anything else means the provider could not
/// tell us the state.
pub(crate) fn polled(
    response: Result<Value, GatewayError>,
    parse: impl FnOnce(&Value) -> Option<Transaction>,
) -> Result<Transaction, ProviderError> {
    let body = response?;
    parse(&body)
        .map(|tx| tx.expire_if_due(Utc::now()))
        .ok_or_else(|| ProviderError::ProviderUnreachable {
            cause: "malformed gateway status response".to_string(),
        })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::plan::PlanTier;
    use crate::domain::session::CustomerInfo;
    use crate::infrastructure::simulated_gateway::SimulatedGateway;

    pub fn signer() -> Arc<CallbackSigner> {
        Arc::new(CallbackSigner::new(
            "merchant-1",
            SecretString::from("secret".to_string()),
        ))
    }

    pub fn core(gateway: &SimulatedGateway) -> GatewayCore {
        GatewayCore {
            catalog: FeeCatalog::new(),
            gateway: Arc::new(gateway.clone()),
            signer: signer(),
            ttl: Duration::hours(24),
        }
    }

    pub fn request(method_id: &str, amount: i64) -> PaymentRequest {
        PaymentRequest {
            plan: PlanTier::Professional.plan(),
            customer: CustomerInfo {
                contact_name: "Dr. Sari".to_string(),
                email: "sari@clinic.test".to_string(),
                phone: "+628111".to_string(),
                clinic_name: "Klinik Sehat".to_string(),
            },
            amount: Amount::new(amount).unwrap(),
            method_id: method_id.to_string(),
            order_id: "ORDER-1".to_string(),
        }
    }
}
