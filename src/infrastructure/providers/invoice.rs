use super::{GatewayCore, i64_at, metadata, opened, polled, str_at, timestamp_at};
use crate::domain::catalog::FeeCatalog;
use crate::domain::payment::{PaymentRequest, ProviderFamily, Transaction, TransactionStatus};
use crate::domain::ports::PaymentProvider;
use crate::error::ProviderError;
use crate::infrastructure::simulated_gateway::INVOICES_PATH;
use async_trait::async_trait;
use serde_json::{Value, json};

/// Hosted invoice page (cards and everything else the page offers).
pub struct InvoiceProvider {
    core: GatewayCore,
}

impl InvoiceProvider {
    pub(crate) fn new(core: GatewayCore) -> Self {
        Self { core }
    }

    fn status(word: &str) -> TransactionStatus {
        match word {
            "PENDING" => TransactionStatus::Pending,
            "PAID" | "SETTLED" => TransactionStatus::Paid,
            "EXPIRED" => TransactionStatus::Expired,
            _ => TransactionStatus::Initiated,
        }
    }

    fn transaction_from(&self, body: &Value) -> Option<Transaction> {
        let id = str_at(body, &["id"])?;
        let method_id = str_at(body, &["metadata", "methodId"])
            .or_else(|| {
                self.core
                    .catalog
                    .methods_for(ProviderFamily::Invoice)
                    .next()
                    .map(|m| m.id)
            })?
            .to_string();
        Some(Transaction {
            external_reference: id.to_string(),
            method_id,
            status: Self::status(str_at(body, &["status"]).unwrap_or_default()),
            amount_due: i64_at(body, &["amount"])?,
            fee: i64_at(body, &["metadata", "fee"]).unwrap_or_default(),
            expires_at: timestamp_at(body, &["expiry_date"])
                .or_else(|| timestamp_at(body, &["metadata", "expiresAt"]))
                .unwrap_or_else(|| self.core.expires_at()),
            provider_payload: json!({
                "invoiceUrl": str_at(body, &["invoice_url"]),
            }),
            failure_reason: None,
        })
    }
}

#[async_trait]
impl PaymentProvider for InvoiceProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Invoice
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
            "amount": request.amount.plus(fee).minor_units(),
            "payer_email": request.customer.email,
            "description": format!("{} plan for {}", request.plan.name, request.customer.clinic_name),
            "invoice_duration": self.core.ttl.num_seconds(),
            "metadata": metadata(request, fee, expires_at),
        });

        let response = self.core.gateway.post(INVOICES_PATH, body).await;
        Ok(opened(self.family(), response, request, fee, expires_at, |body| {
            self.transaction_from(body)
        }))
    }

    async fn check_status(&self, external_reference: &str) -> Result<Transaction, ProviderError> {
        let path = format!("{INVOICES_PATH}/{external_reference}");
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
    use crate::infrastructure::providers::test_support::{core, request};
    use crate::infrastructure::simulated_gateway::SimulatedGateway;

    #[tokio::test]
    async fn test_invoice_returns_hosted_url() {
        let gateway = SimulatedGateway::new();
        let provider = InvoiceProvider::new(core(&gateway));

        let tx = provider.initiate(&request("invoice", 5_000_000)).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.fee, 145_000);
        assert_eq!(tx.amount_due, 5_145_000);
        assert!(tx.provider_payload["invoiceUrl"].as_str().unwrap().contains(&tx.external_reference));

        let (_, body) = gateway.requests().await.remove(0);
        assert_eq!(body["invoice_duration"], 86_400);
        assert_eq!(body["payer_email"], "sari@clinic.test");
    }

    #[tokio::test]
    async fn test_expired_invoice() {
        let gateway = SimulatedGateway::new();
        let provider = InvoiceProvider::new(core(&gateway));
        let tx = provider.initiate(&request("invoice", 5_000_000)).await.unwrap();

        gateway.set_status("ORDER-1", Some("EXPIRED")).await;
        let polled = provider.check_status(&tx.external_reference).await.unwrap();
        assert_eq!(polled.status, TransactionStatus::Expired);
    }

    #[tokio::test]
    async fn test_status_of_unknown_invoice_is_an_error() {
        let gateway = SimulatedGateway::new();
        let provider = InvoiceProvider::new(core(&gateway));
        let err = provider.check_status("inv-nope").await.unwrap_err();
        assert!(matches!(err, ProviderError::ProviderUnreachable { .. }));
    }
}
