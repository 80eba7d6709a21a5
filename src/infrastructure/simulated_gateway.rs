use crate::domain::ports::Gateway;
use crate::error::GatewayError;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

pub const VIRTUAL_ACCOUNTS_PATH: &str = "/callback_virtual_accounts";
pub const EWALLET_CHARGES_PATH: &str = "/ewallets/charges";
pub const INVOICES_PATH: &str = "/v2/invoices";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    VirtualAccount,
    EWalletCharge,
    Invoice,
}

impl Resource {
    fn from_path(path: &str) -> Option<(Self, Option<&str>)> {
        [
            (VIRTUAL_ACCOUNTS_PATH, Self::VirtualAccount),
            (EWALLET_CHARGES_PATH, Self::EWalletCharge),
            (INVOICES_PATH, Self::Invoice),
        ]
        .into_iter()
        .find_map(|(prefix, resource)| {
            let rest = path.strip_prefix(prefix)?;
            match rest.strip_prefix('/') {
                Some(id) if !id.is_empty() => Some((resource, Some(id))),
                Some(_) => None,
                None if rest.is_empty() => Some((resource, None)),
                None => None,
            }
        })
    }

    fn id_prefix(self) -> &'static str {
        match self {
            Self::VirtualAccount => "va",
            Self::EWalletCharge => "ewc",
            Self::Invoice => "inv",
        }
    }

    fn reference_key(self) -> &'static str {
        match self {
            Self::EWalletCharge => "reference_id",
            Self::VirtualAccount | Self::Invoice => "external_id",
        }
    }

    fn paid_status(self) -> &'static str {
        match self {
            Self::EWalletCharge => "SUCCEEDED",
            Self::VirtualAccount | Self::Invoice => "PAID",
        }
    }
}

/// A gateway that answers like the hosted provider APIs without a network.
///
/// Created resources are kept in memory and echo their request body, so the
/// adapters can parse a status response the same way as a creation response.
/// Used by the CLI when no gateway URL is configured, and by tests.
#[derive(Default, Clone)]
pub struct SimulatedGateway {
    records: Arc<RwLock<HashMap<String, (Resource, Value)>>>,
    requests: Arc<RwLock<Vec<(String, Value)>>>,
    unreachable: Arc<AtomicBool>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails as if the network were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Marks the resource with this provider id or merchant reference as paid.
    /// Returns `false` when no such resource exists.
    pub async fn settle(&self, reference: &str) -> bool {
        self.set_status(reference, None).await
    }

    /// Forces an arbitrary provider status word, e.g. `EXPIRED`.
    pub async fn set_status(&self, reference: &str, status: Option<&str>) -> bool {
        let mut records = self.records.write().await;
        let Some((resource, body)) = records.values_mut().find(|(resource, body)| {
            body.get("id").and_then(Value::as_str) == Some(reference)
                || body.get(resource.reference_key()).and_then(Value::as_str) == Some(reference)
        }) else {
            return false;
        };
        let status = status.unwrap_or(resource.paid_status());
        match body.as_object_mut() {
            Some(fields) => {
                fields.insert("status".to_string(), Value::String(status.to_string()));
                true
            }
            None => false,
        }
    }

    /// Every `(path, body)` received so far; GET calls record `null` bodies.
    pub async fn requests(&self) -> Vec<(String, Value)> {
        self.requests.read().await.clone()
    }

    fn ensure_reachable(&self) -> Result<(), GatewayError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable(
                "simulated gateway is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn create(resource: Resource, body: Value) -> Result<(String, Value), GatewayError> {
        let Value::Object(mut fields) = body else {
            return Err(GatewayError::Rejected {
                status: 400,
                body: "request body must be an object".to_string(),
            });
        };
        let reference = fields
            .get(resource.reference_key())
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| GatewayError::Rejected {
                status: 400,
                body: format!("missing {}", resource.reference_key()),
            })?
            .to_string();
        let id = format!("{}-{reference}", resource.id_prefix());

        fields.insert("id".to_string(), Value::String(id.clone()));
        fields.insert("status".to_string(), json!("PENDING"));
        match resource {
            Resource::VirtualAccount => {
                fields.insert(
                    "account_number".to_string(),
                    Value::String(account_number(&reference)),
                );
            }
            Resource::EWalletCharge => {
                let actions = actions_for(&id, &fields);
                fields.insert("actions".to_string(), actions);
            }
            Resource::Invoice => {
                fields.insert(
                    "invoice_url".to_string(),
                    Value::String(format!("https://checkout.simulated.local/invoices/{id}")),
                );
            }
        }
        Ok((id, Value::Object(fields)))
    }
}

/// Deterministic 16-digit account number derived from the reference.
fn account_number(reference: &str) -> String {
    let seed = reference
        .bytes()
        .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
    format!("8808{:012}", seed % 1_000_000_000_000)
}

fn actions_for(id: &str, fields: &Map<String, Value>) -> Value {
    let channel = fields
        .get("channel_code")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if channel == "ID_QRIS" {
        json!({ "qr_checkout_string": format!("00020101021226SIM{id}") })
    } else {
        json!({ "mobile_deeplink_checkout_url": format!("https://checkout.simulated.local/ewallets/{id}") })
    }
}

#[async_trait]
impl Gateway for SimulatedGateway {
    async fn post(&self, path: &str, body: Value) -> Result<Value, GatewayError> {
        self.requests
            .write()
            .await
            .push((path.to_string(), body.clone()));
        self.ensure_reachable()?;

        let Some((resource, None)) = Resource::from_path(path) else {
            return Err(GatewayError::Rejected {
                status: 404,
                body: format!("no route for POST {path}"),
            });
        };
        let (id, record) = Self::create(resource, body)?;
        self.records
            .write()
            .await
            .insert(id, (resource, record.clone()));
        Ok(record)
    }

    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.requests
            .write()
            .await
            .push((path.to_string(), Value::Null));
        self.ensure_reachable()?;

        let Some((_, Some(id))) = Resource::from_path(path) else {
            return Err(GatewayError::Rejected {
                status: 404,
                body: format!("no route for GET {path}"),
            });
        };
        self.records
            .read()
            .await
            .get(id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| GatewayError::Rejected {
                status: 404,
                body: format!("{id} not found"),
            })
    }
}
