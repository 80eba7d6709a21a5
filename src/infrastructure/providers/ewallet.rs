use super::{GatewayCore, i64_at, metadata, opened, polled, str_at, timestamp_at};
use crate::domain::catalog::FeeCatalog;
use crate::domain::payment::{PaymentRequest, ProviderFamily, Transaction, TransactionStatus};
use crate::domain::ports::PaymentProvider;
use crate::error::ProviderError;
use crate::infrastructure::simulated_gateway::EWALLET_CHARGES_PATH;
use async_trait::async_trait;
use serde_json::{Value, json};

const CURRENCY: &str = "IDR";

/// E-wallet and QRIS charges, percentage fee.
///
/// The payload carries either a QR string or a deeplink, depending on the
/// channel.
pub struct EWalletProvider {
    core: GatewayCore,
}

impl EWalletProvider {
    pub(crate) fn new(core: GatewayCore) -> Self {
        Self { core }
    }

    fn status(word: &str) -> TransactionStatus {
        match word {
            "PENDING" => TransactionStatus::Pending,
            "SUCCEEDED" => TransactionStatus::Paid,
            "FAILED" | "VOIDED" => TransactionStatus::Failed,
            _ => TransactionStatus::Initiated,
        }
    }

    fn transaction_from(&self, body: &Value) -> Option<Transaction> {
        let id = str_at(body, &["id"])?;
        let channel_code = str_at(body, &["channel_code"]).unwrap_or_default();
        let method_id = match str_at(body, &["metadata", "methodId"]) {
            Some(method_id) => method_id.to_string(),
            None => self
                .core
                .catalog
                .methods_for(ProviderFamily::EWallet)
                .find(|m| m.channel_code == channel_code)?
                .id
                .to_string(),
        };
        Some(Transaction {
            external_reference: id.to_string(),
            method_id,
            status: Self::status(str_at(body, &["status"]).unwrap_or_default()),
            amount_due: i64_at(body, &["amount"])?,
            fee: i64_at(body, &["metadata", "fee"]).unwrap_or_default(),
            expires_at: timestamp_at(body, &["metadata", "expiresAt"])
                .unwrap_or_else(|| self.core.expires_at()),
            provider_payload: json!({
                "channelCode": channel_code,
                "qrString": str_at(body, &["actions", "qr_checkout_string"]),
                "deeplinkUrl": str_at(body, &["actions", "mobile_deeplink_checkout_url"]),
            }),
            failure_reason: None,
        })
    }
}

#[async_trait]
impl PaymentProvider for EWalletProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::EWallet
    }

    fn catalog(&self) -> &FeeCatalog {
        &self.core.catalog
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<Transaction, ProviderError> {
        let method = self.core.method(self.family(), &request.method_id)?;
        let fee = method.fee_rule.apply(request.amount);
        let expires_at = self.core.expires_at();
        let body = json!({
            "reference_id": request.order_id,
            "currency": CURRENCY,
            "amount": request.amount.plus(fee).minor_units(),
            "checkout_method": "ONE_TIME_PAYMENT",
            "channel_code": method.channel_code,
            "channel_properties": {
                "mobile_number": request.customer.phone,
            },
            "metadata": metadata(request, fee, expires_at),
        });

        let response = self.core.gateway.post(EWALLET_CHARGES_PATH, body).await;
        Ok(opened(self.family(), response, request, fee, expires_at, |body| {
            self.transaction_from(body)
        }))
    }

    async fn check_status(&self, external_reference: &str) -> Result<Transaction, ProviderError> {
        let path = format!("{EWALLET_CHARGES_PATH}/{external_reference}");
        polled(self.core.gateway.get(&path).await, |body| {
            self.transaction_from(body)
        })
    }

    fn verify_callback(&self, payload: &Value, signature: &str) -> bool {
        self.core.signer.verify(payload, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::test_support::{core, request, signer};
    use crate::infrastructure::simulated_gateway::SimulatedGateway;

    #[tokio::test]
    async fn test_qris_charge_carries_qr_string() {
        let gateway = SimulatedGateway::new();
        let provider = EWalletProvider::new(core(&gateway));

        let tx = provider.initiate(&request("qris", 1_000_000)).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.fee, 7000);
        assert_eq!(tx.amount_due, 1_007_000);
        assert!(tx.provider_payload["qrString"].is_string());
        assert!(tx.provider_payload["deeplinkUrl"].is_null());
    }

    #[tokio::test]
    async fn test_ovo_charge_carries_deeplink() {
        let gateway = SimulatedGateway::new();
        let provider = EWalletProvider::new(core(&gateway));

        let tx = provider.initiate(&request("ovo", 1_000_000)).await.unwrap();
        assert_eq!(tx.fee, 25_000);
        assert!(tx.provider_payload["deeplinkUrl"].is_string());

        let (_, body) = gateway.requests().await.remove(0);
        assert_eq!(body["checkout_method"], "ONE_TIME_PAYMENT");
        assert_eq!(body["channel_code"], "ID_OVO");
        assert_eq!(body["currency"], "IDR");
    }

    #[tokio::test]
    async fn test_voided_charge_is_failed() {
        let gateway = SimulatedGateway::new();
        let provider = EWalletProvider::new(core(&gateway));
        let tx = provider.initiate(&request("dana", 2_000_000)).await.unwrap();

        gateway.set_status(&tx.external_reference, Some("VOIDED")).await;
        let polled = provider.check_status(&tx.external_reference).await.unwrap();
        assert_eq!(polled.status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_verify_callback_uses_shared_secret() {
        let gateway = SimulatedGateway::new();
        let provider = EWalletProvider::new(core(&gateway));
        let payload = json!({ "externalReference": "ewc-ORDER-1", "status": "SUCCEEDED", "amount": 1_015_000 });
        let signature = signer().sign("ewc-ORDER-1", 1_015_000);
        assert!(provider.verify_callback(&payload, &signature));
        assert!(!provider.verify_callback(&payload, "deadbeef"));
    }
}
