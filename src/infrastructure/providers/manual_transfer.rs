use super::CallbackSigner;
use crate::domain::catalog::FeeCatalog;
use crate::domain::payment::{PaymentRequest, ProviderFamily, Transaction, TransactionStatus};
use crate::domain::ports::PaymentProvider;
use crate::error::{FALLBACK_METHOD_ID, ProviderError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const REFERENCE_PREFIX: &str = "MT-";

pub const BANK_NAME: &str = "Bank Central Asia";
pub const ACCOUNT_NUMBER: &str = "8720 1188 42";
pub const ACCOUNT_HOLDER: &str = "PT Klinik Digital Nusantara";

/// Disambiguation codes are added to the amount so transfers of the same
/// plan can be told apart on the bank statement.
pub const UNIQUE_CODE_RANGE: std::ops::Range<i64> = 100..1000;

/// Transfer to the merchant's bank account, confirmed out of band.
///
/// Nothing is sent over the network; opened transfers are kept in a local
/// ledger until an operator confirms them.
pub struct ManualTransferProvider {
    catalog: FeeCatalog,
    signer: Arc<CallbackSigner>,
    ttl: Duration,
    ledger: RwLock<HashMap<String, Transaction>>,
}

impl ManualTransferProvider {
    pub fn new(catalog: FeeCatalog, signer: Arc<CallbackSigner>, ttl: Duration) -> Self {
        Self {
            catalog,
            signer,
            ttl,
            ledger: RwLock::new(HashMap::new()),
        }
    }

    /// Marks an open transfer as received. `None` when this process never
    /// opened `reference`.
    pub async fn confirm(&self, reference: &str) -> Option<Transaction> {
        let mut ledger = self.ledger.write().await;
        let transaction = ledger.get_mut(reference)?;
        if transaction.status.is_open() {
            transaction.status = TransactionStatus::Paid;
            info!(reference, "Manual transfer confirmed");
        }
        Some(transaction.clone())
    }
}

#[async_trait]
impl PaymentProvider for ManualTransferProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::ManualTransfer
    }

    fn catalog(&self) -> &FeeCatalog {
        &self.catalog
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<Transaction, ProviderError> {
        let fee = self.compute_fee(request.amount, &request.method_id)?;
        let unique_code = rand::thread_rng().gen_range(UNIQUE_CODE_RANGE);
        let transfer_amount = request.amount.plus(fee).plus(unique_code).minor_units();
        let expires_at = Utc::now() + self.ttl;

        let transaction = Transaction {
            external_reference: format!("{REFERENCE_PREFIX}{}", request.order_id),
            method_id: request.method_id.clone(),
            status: TransactionStatus::Pending,
            amount_due: transfer_amount,
            fee,
            expires_at,
            provider_payload: json!({
                "bankName": BANK_NAME,
                "accountNumber": ACCOUNT_NUMBER,
                "accountHolder": ACCOUNT_HOLDER,
                "uniqueCode": unique_code,
                "transferAmount": transfer_amount,
                "instructions": format!(
                    "Transfer exactly {transfer_amount} to {BANK_NAME} {ACCOUNT_NUMBER} ({ACCOUNT_HOLDER}) before {}.",
                    expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
            }),
            failure_reason: None,
        };

        self.ledger
            .write()
            .await
            .insert(transaction.external_reference.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn check_status(&self, external_reference: &str) -> Result<Transaction, ProviderError> {
        if let Some(tx) = self.ledger.read().await.get(external_reference) {
            return Ok(tx.clone().expire_if_due(Utc::now()));
        }
        if !external_reference.starts_with(REFERENCE_PREFIX) {
            return Err(ProviderError::ProviderUnreachable {
                cause: format!("no manual transfer recorded for {external_reference}"),
            });
        }

        // Opened by an earlier process. The transfer stays pending until an
        // operator confirms it.
        debug!(reference = external_reference, "Manual transfer not in ledger");
        let method_id = self
            .catalog
            .methods_for(ProviderFamily::ManualTransfer)
            .next()
            .map_or(FALLBACK_METHOD_ID, |m| m.id)
            .to_string();
        Ok(Transaction {
            external_reference: external_reference.to_string(),
            method_id,
            status: TransactionStatus::Pending,
            amount_due: 0,
            fee: 0,
            expires_at: Utc::now() + self.ttl,
            provider_payload: json!({
                "bankName": BANK_NAME,
                "accountNumber": ACCOUNT_NUMBER,
                "accountHolder": ACCOUNT_HOLDER,
            }),
            failure_reason: None,
        })
    }

    fn verify_callback(&self, payload: &Value, signature: &str) -> bool {
        self.signer.verify(payload, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::providers::test_support::{request, signer};

    fn provider(ttl: Duration) -> ManualTransferProvider {
        ManualTransferProvider::new(FeeCatalog::new(), signer(), ttl)
    }

    #[tokio::test]
    async fn test_unique_code_stays_in_range() {
        let provider = provider(Duration::hours(24));
        for _ in 0..200 {
            let tx = provider.initiate(&request("bank_transfer", 5_000_000)).await.unwrap();
            let code = tx.provider_payload["uniqueCode"].as_i64().unwrap();
            assert!(UNIQUE_CODE_RANGE.contains(&code), "code {code} out of range");
            assert_eq!(tx.amount_due, 5_000_000 + code);
            assert_eq!(tx.fee, 0);
            assert_eq!(tx.status, TransactionStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_stays_pending_until_confirmed() {
        let provider = provider(Duration::hours(24));
        let tx = provider.initiate(&request("bank_transfer", 2_500_000)).await.unwrap();
        assert_eq!(tx.external_reference, "MT-ORDER-1");

        let polled = provider.check_status("MT-ORDER-1").await.unwrap();
        assert_eq!(polled.status, TransactionStatus::Pending);

        let confirmed = provider.confirm("MT-ORDER-1").await.unwrap();
        assert_eq!(confirmed.status, TransactionStatus::Paid);
        assert_eq!(
            provider.check_status("MT-ORDER-1").await.unwrap().status,
            TransactionStatus::Paid
        );
        assert!(provider.confirm("MT-UNKNOWN").await.is_none());
    }

    #[tokio::test]
    async fn test_transfer_from_earlier_process_polls_pending() {
        let provider = provider(Duration::hours(24));

        let polled = provider.check_status("MT-ORDER-9").await.unwrap();
        assert_eq!(polled.status, TransactionStatus::Pending);
        assert_eq!(polled.external_reference, "MT-ORDER-9");
        assert_eq!(polled.method_id, "bank_transfer");
        assert_eq!(polled.provider_payload["bankName"], BANK_NAME);

        assert!(provider.check_status("va-ORDER-9").await.is_err());
    }

    #[tokio::test]
    async fn test_past_expiry_reports_expired() {
        let provider = provider(Duration::seconds(-1));
        provider.initiate(&request("bank_transfer", 2_500_000)).await.unwrap();
        let polled = provider.check_status("MT-ORDER-1").await.unwrap();
        assert_eq!(polled.status, TransactionStatus::Expired);
    }

    #[tokio::test]
    async fn test_only_serves_manual_methods() {
        let provider = provider(Duration::hours(24));
        assert!(matches!(
            provider.initiate(&request("bca_va", 1000)).await,
            Err(ProviderError::UnsupportedMethod(_))
        ));
    }
}
