use super::{GatewayCore, i64_at, metadata, opened, polled, str_at, timestamp_at};
use crate::domain::catalog::FeeCatalog;
use crate::domain::payment::{PaymentRequest, ProviderFamily, Transaction, TransactionStatus};
use crate::domain::ports::PaymentProvider;
use crate::error::ProviderError;
use crate::infrastructure::simulated_gateway::VIRTUAL_ACCOUNTS_PATH;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Bank virtual accounts: a closed account number per order, fixed fee.
pub struct VirtualAccountProvider {
    core: GatewayCore,
}

impl VirtualAccountProvider {
    pub(crate) fn new(core: GatewayCore) -> Self {
        Self { core }
    }

    fn status(word: &str) -> TransactionStatus {
        match word {
            "PENDING" | "ACTIVE" => TransactionStatus::Pending,
            "PAID" => TransactionStatus::Paid,
            "INACTIVE" | "EXPIRED" => TransactionStatus::Expired,
            "FAILED" => TransactionStatus::Failed,
            _ => TransactionStatus::Initiated,
        }
    }

    fn transaction_from(&self, body: &Value) -> Option<Transaction> {
        let id = str_at(body, &["id"])?;
        let bank_code = str_at(body, &["bank_code"]).unwrap_or_default();
        let method_id = match str_at(body, &["metadata", "methodId"]) {
            Some(method_id) => method_id.to_string(),
            None => self
                .core
                .catalog
                .methods_for(ProviderFamily::VirtualAccount)
                .find(|m| m.channel_code == bank_code)?
                .id
                .to_string(),
        };
        Some(Transaction {
            external_reference: id.to_string(),
            method_id,
            status: Self::status(str_at(body, &["status"]).unwrap_or_default()),
            amount_due: i64_at(body, &["expected_amount"])?,
            fee: i64_at(body, &["metadata", "fee"]).unwrap_or_default(),
            expires_at: timestamp_at(body, &["expiration_date"])
                .unwrap_or_else(|| self.core.expires_at()),
            provider_payload: json!({
                "bankCode": bank_code,
                "accountNumber": str_at(body, &["account_number"]),
                "accountName": str_at(body, &["name"]),
            }),
            failure_reason: None,
        })
    }
}

#[async_trait]
impl PaymentProvider for VirtualAccountProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::VirtualAccount
    }

    fn catalog(&self) -> &FeeCatalog {
        &self.core.catalog
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<Transaction, ProviderError> {
        let method = self.core.method(self.family(), &request.method_id)?;
        let fee = method.fee_rule.apply(request.amount);
        let expires_at = self.core.expires_at();
        let body = json!({
            "external_id": request.order_id,
            "bank_code": method.channel_code,
            "name": request.customer.clinic_name,
            "expected_amount": request.amount.plus(fee).minor_units(),
            "is_closed": true,
            "expiration_date": expires_at.to_rfc3339(),
            "metadata": metadata(request, fee, expires_at),
        });

        let response = self.core.gateway.post(VIRTUAL_ACCOUNTS_PATH, body).await;
        Ok(opened(self.family(), response, request, fee, expires_at, |body| {
            self.transaction_from(body)
        }))
    }

    async fn check_status(&self, external_reference: &str) -> Result<Transaction, ProviderError> {
        let path = format!("{VIRTUAL_ACCOUNTS_PATH}/{external_reference}");
        polled(self.core.gateway.get(&path).await, |body| {
            self.transaction_from(body)
        })
    }

    fn verify_callback(&self, payload: &Value, signature: &str) -> bool {
        self.core.signer.verify(payload, signature)
    }
}
