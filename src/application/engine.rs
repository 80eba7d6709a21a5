use super::guard::{Resolution, RoutingGuard};
use super::normalizer;
use super::session_store::{RegistrationPatch, SessionStore};
use crate::config::Config;
use crate::domain::catalog::{FeeCatalog, Quote};
use crate::domain::event::{ActivityEvent, CheckoutStep};
use crate::domain::money::Amount;
use crate::domain::payment::{
    CallbackPayload, PaymentMethod, PaymentRequest, Transaction, TransactionStatus,
};
use crate::domain::plan::Plan;
use crate::domain::ports::{GatewayBox, NotifierBox, SessionStorageBox};
use crate::domain::session::{CustomerInfo, Session, SessionSource, SessionStatus};
use crate::error::{CheckoutError, ProviderError, Result, StoreError};
use crate::infrastructure::providers::{CallbackSigner, ProviderRegistry};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Collaborators the engine is wired with.
pub struct Dependencies {
    pub durable: SessionStorageBox,
    pub tab_scoped: SessionStorageBox,
    pub gateway: GatewayBox,
    pub notifier: NotifierBox,
}

/// What the checkout screen submits.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub plan: Plan,
    pub customer: CustomerInfo,
    pub method_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOutcome {
    pub session: Session,
    pub transaction: Transaction,
}

/// The explicit context object of the pipeline.
///
/// `CheckoutEngine` owns the provider registry, the session store, the routing
/// guard and the activity notifier. It is built once by [`CheckoutEngine::init`]
/// and passed by reference to whatever drives the flow.
pub struct CheckoutEngine {
    registry: ProviderRegistry,
    store: Arc<SessionStore>,
    guard: RoutingGuard,
    notifier: NotifierBox,
    poll_interval: Duration,
}

impl CheckoutEngine {
    /// Wires the built-in adapters over the given tiers and gateway.
    ///
    /// Memory starts empty, as on a fresh page load; the persisted session is
    /// adopted lazily by the first operation or guarded navigation needing it.
    pub async fn init(config: &Config, deps: Dependencies) -> Self {
        let signer = Arc::new(CallbackSigner::new(
            config.merchant_id.clone(),
            SecretString::from(config.callback_secret.expose_secret().to_string()),
        ));
        let ttl = chrono::Duration::from_std(config.transaction_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let registry = ProviderRegistry::with_builtin(FeeCatalog::new(), deps.gateway, signer, ttl);
        let store = Arc::new(SessionStore::new(
            deps.durable,
            deps.tab_scoped,
            config.storage_keys.clone(),
        ));

        let engine = Self::new(registry, store, deps.notifier, config.poll_interval);
        match engine.store.persisted_hint().await {
            Some(hint) => info!(tier = %hint.tier, "Engine initialized; persisted session found"),
            None => info!("Engine initialized without a persisted session"),
        }
        engine
    }

    pub fn new(
        registry: ProviderRegistry,
        store: Arc<SessionStore>,
        notifier: NotifierBox,
        poll_interval: Duration,
    ) -> Self {
        Self {
            guard: RoutingGuard::new(store.clone()),
            registry,
            store,
            notifier,
            poll_interval,
        }
    }

    /// Drops the in-memory session. Persisted records are left alone.
    pub async fn teardown(self) {
        self.store.clear_memory().await;
        info!("Engine torn down");
    }

    pub fn catalog(&self) -> &FeeCatalog {
        self.registry.catalog()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn list_methods(&self) -> &[PaymentMethod] {
        self.catalog().list_methods()
    }

    pub fn quote(&self, amount_minor_units: i64, method_id: &str) -> Result<Quote> {
        let amount = Amount::new(amount_minor_units)?;
        Ok(self.catalog().quote(amount, method_id)?)
    }

    /// Opens a provider transaction for `request` and persists the resulting
    /// session.
    ///
    /// A transaction the provider could not open is returned as a retryable
    /// `ProviderUnreachable` carrying the cause; the caller can retry or fall
    /// back to [`crate::error::FALLBACK_METHOD_ID`].
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        let amount = Amount::new(request.plan.price_minor_units)?;
        let provider = self.registry.for_method(&request.method_id)?;
        let now = Utc::now();
        let order_id = format!("ORDER-{}", now.timestamp_millis());

        self.emit(ActivityEvent::new_customer(
            request.customer.clone(),
            request.plan.clone(),
        ))
        .await;

        let payment = PaymentRequest {
            plan: request.plan.clone(),
            customer: request.customer.clone(),
            amount,
            method_id: request.method_id.clone(),
            order_id: order_id.clone(),
        };
        let transaction = provider.initiate(&payment).await?;
        if transaction.status == TransactionStatus::Failed {
            let cause = transaction
                .failure_reason
                .clone()
                .unwrap_or_else(|| "provider reported failure".to_string());
            warn!(%order_id, method = %request.method_id, %cause, "Checkout failed");
            return Err(ProviderError::ProviderUnreachable { cause }.into());
        }
        info!(
            %order_id,
            reference = %transaction.external_reference,
            status = ?transaction.status,
            "Payment initiated"
        );
        self.emit(ActivityEvent::step(
            request.customer.clone(),
            CheckoutStep::PaymentInitiated,
        ))
        .await;

        let raw = json!({
            "customer": request.customer,
            "plan": request.plan,
            "orderId": order_id,
            "transactionId": transaction.external_reference,
            "amount": transaction.amount_due,
            "paymentMethod": transaction.method_id,
            "paymentDate": now,
            "status": session_status(transaction.status),
        });
        let normalized = normalizer::normalize(&raw, SessionSource::Checkout, now);
        self.store.save(normalized.session.clone()).await?;

        Ok(CheckoutOutcome {
            session: normalized.session,
            transaction,
        })
    }

    /// Adopts a login result as the active session.
    pub async fn login(&self, raw: &Value) -> Result<Session> {
        let normalized = normalizer::normalize(raw, SessionSource::Login, Utc::now());
        if !normalized.defaulted.is_empty() {
            debug!(defaulted = ?normalized.defaulted, "Login payload was incomplete");
        }
        let session = normalized.session;
        self.store.save(session.clone()).await?;
        info!(order_id = %session.order_id, "Signed in");
        self.emit(ActivityEvent::step(session.customer.clone(), CheckoutStep::SignedIn))
            .await;
        Ok(session)
    }

    pub async fn complete_registration(&self, patch: RegistrationPatch) -> Result<Session> {
        let session = self.store.complete_registration(patch).await?;
        self.emit(ActivityEvent::step(
            session.customer.clone(),
            CheckoutStep::RegistrationCompleted,
        ))
        .await;
        self.emit(ActivityEvent::order_completed(
            session.customer.clone(),
            session.plan.clone(),
            session.amount_minor_units,
        ))
        .await;
        Ok(session)
    }

    /// Asks the provider for the latest state of the active session's
    /// transaction and records any change. Paid sessions are not re-checked.
    pub async fn refresh_payment(&self) -> Result<Session> {
        let session = self.store.load().await.ok_or(StoreError::NoActiveSession)?;
        if session.status == SessionStatus::Paid {
            return Ok(session);
        }

        let provider = self.registry.for_method(&session.payment_method_id)?;
        let transaction = provider.check_status(&session.transaction_id).await?;
        self.record_status(&session, &session.transaction_id, session_status(transaction.status))
            .await
    }

    /// Polls until the transaction leaves `Pending` or `max_attempts` polls
    /// have been made. Unreachable providers count as an attempt.
    pub async fn poll_until_settled(&self, interval: Duration, max_attempts: u32) -> Result<Session> {
        let mut ticker = tokio::time::interval(interval);
        let mut last = None;
        for attempt in 1..=max_attempts {
            ticker.tick().await;
            match self.refresh_payment().await {
                Ok(session) if session.status != SessionStatus::Pending => return Ok(session),
                Ok(session) => last = Some(session),
                Err(CheckoutError::Provider(e)) if e.is_retryable() => {
                    warn!(attempt, error = %e, "Status poll failed");
                }
                Err(e) => return Err(e),
            }
        }
        match last {
            Some(session) => Ok(session),
            None => Ok(self.store.load().await.ok_or(StoreError::NoActiveSession)?),
        }
    }

    /// Applies a signed provider webhook to the active session.
    pub async fn handle_callback(&self, payload: &Value, signature: &str) -> Result<Session> {
        let session = self.store.load().await.ok_or(StoreError::NoActiveSession)?;
        let provider = self.registry.for_method(&session.payment_method_id)?;
        if !provider.verify_callback(payload, signature) {
            warn!(order_id = %session.order_id, "Callback signature rejected");
            return Err(CheckoutError::CallbackRejected(
                "signature does not match".to_string(),
            ));
        }

        let callback: CallbackPayload = serde_json::from_value(payload.clone())
            .map_err(|e| CheckoutError::CallbackRejected(e.to_string()))?;
        let status = callback.transaction_status().ok_or_else(|| {
            CheckoutError::CallbackRejected(format!("unknown status {}", callback.status))
        })?;
        if callback.amount != session.amount_minor_units {
            return Err(CheckoutError::CallbackRejected(format!(
                "amount {} does not match {}",
                callback.amount, session.amount_minor_units
            )));
        }
        self.record_status(&session, &callback.external_reference, session_status(status))
            .await
    }

    /// Operator confirmation that a manual transfer arrived.
    pub async fn confirm_manual_transfer(&self, reference: &str) -> Result<Session> {
        let session = self.store.load().await.ok_or(StoreError::NoActiveSession)?;
        if let Some(manual) = self.registry.manual_transfer()
            && manual.confirm(reference).await.is_none()
        {
            debug!(reference, "Transfer not opened by this process");
        }
        self.record_status(&session, reference, SessionStatus::Paid).await
    }

    pub async fn navigate(&self, path: &str) -> Resolution {
        self.guard.navigate(path).await
    }

    /// The active session, restored from storage when needed.
    pub async fn session(&self) -> Option<Session> {
        self.store.load().await
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear().await?;
        Ok(())
    }

    async fn record_status(
        &self,
        session: &Session,
        reference: &str,
        status: SessionStatus,
    ) -> Result<Session> {
        let updated = self.store.apply_payment_status(reference, status).await?;
        if session.status != SessionStatus::Paid && updated.status == SessionStatus::Paid {
            self.emit(ActivityEvent::step(
                updated.customer.clone(),
                CheckoutStep::PaymentConfirmed,
            ))
            .await;
        }
        Ok(updated)
    }

    /// Fire-and-forget: notifier failures never reach the caller.
    async fn emit(&self, event: ActivityEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(kind = ?event.kind, error = %e, "Activity notification failed");
        }
    }
}

fn session_status(status: TransactionStatus) -> SessionStatus {
    match status {
        TransactionStatus::Paid => SessionStatus::Paid,
        TransactionStatus::Initiated | TransactionStatus::Pending => SessionStatus::Pending,
        TransactionStatus::Expired | TransactionStatus::Failed => SessionStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::ActivityKind;
    use crate::domain::plan::PlanTier;
    use crate::domain::ports::ActivityNotifier;
    use crate::infrastructure::in_memory::InMemorySessionStorage;
    use crate::infrastructure::simulated_gateway::SimulatedGateway;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<ActivityEvent>>,
    }

    #[async_trait]
    impl ActivityNotifier for RecordingNotifier {
        async fn notify(
            &self,
            event: &ActivityEvent,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl ActivityNotifier for FailingNotifier {
        async fn notify(
            &self,
            _event: &ActivityEvent,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("collector offline".into())
        }
    }

    async fn engine_with(gateway: SimulatedGateway, notifier: NotifierBox) -> CheckoutEngine {
        CheckoutEngine::init(
            &Config::default(),
            Dependencies {
                durable: Arc::new(InMemorySessionStorage::new()),
                tab_scoped: Arc::new(InMemorySessionStorage::new()),
                gateway: Arc::new(gateway),
                notifier,
            },
        )
        .await
    }

    fn request(method_id: &str) -> CheckoutRequest {
        CheckoutRequest {
            plan: PlanTier::Professional.plan(),
            customer: CustomerInfo {
                contact_name: "Dr. A".to_string(),
                email: "a@x.com".to_string(),
                phone: "+62811".to_string(),
                clinic_name: "Klinik A".to_string(),
            },
            method_id: method_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_checkout_persists_pending_session() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine_with(SimulatedGateway::new(), notifier.clone()).await;

        let outcome = engine.checkout(request("bca_va")).await.unwrap();
        assert_eq!(outcome.session.status, SessionStatus::Pending);
        assert_eq!(outcome.session.transaction_id, outcome.transaction.external_reference);
        assert_eq!(outcome.session.amount_minor_units, 5_004_000);
        assert!(!outcome.session.registration_completed);
        assert_eq!(engine.session().await, Some(outcome.session));

        let kinds: Vec<_> = notifier.events.lock().await.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ActivityKind::NewCustomer, ActivityKind::StepProgress]);
    }

    #[tokio::test]
    async fn test_checkout_offline_is_retryable_with_fallback() {
        let gateway = SimulatedGateway::new();
        gateway.set_unreachable(true);
        let engine = engine_with(gateway, Arc::new(FailingNotifier)).await;

        let provider_err = match engine.checkout(request("ovo")).await {
            Err(CheckoutError::Provider(e)) => e,
            other => panic!("expected provider error, got {other:?}"),
        };
        assert!(provider_err.is_retryable());
        assert_eq!(provider_err.fallback_method(), Some("bank_transfer"));
        assert!(engine.session().await.is_none());

        // The fallback method needs no network.
        let outcome = engine.checkout(request("bank_transfer")).await.unwrap();
        assert_eq!(outcome.transaction.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_settlement() {
        let gateway = SimulatedGateway::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine_with(gateway.clone(), notifier.clone()).await;
        let outcome = engine.checkout(request("invoice")).await.unwrap();

        assert_eq!(engine.refresh_payment().await.unwrap().status, SessionStatus::Pending);
        gateway.settle(&outcome.transaction.external_reference).await;
        let settled = engine
            .poll_until_settled(Duration::from_millis(1), 3)
            .await
            .unwrap();
        assert_eq!(settled.status, SessionStatus::Paid);
        assert_eq!(settled.revision, 1);
        assert!(
            notifier
                .events
                .lock()
                .await
                .iter()
                .any(|e| e.step == Some(CheckoutStep::PaymentConfirmed))
        );
    }

    #[tokio::test]
    async fn test_callback_requires_valid_signature() {
        let engine = engine_with(SimulatedGateway::new(), Arc::new(FailingNotifier)).await;
        let outcome = engine.checkout(request("qris")).await.unwrap();
        let reference = outcome.transaction.external_reference.clone();
        let amount = outcome.session.amount_minor_units;
        let payload = json!({ "externalReference": reference, "status": "SUCCEEDED", "amount": amount });

        let err = engine.handle_callback(&payload, "forged").await.unwrap_err();
        assert!(matches!(err, CheckoutError::CallbackRejected(_)));

        let config = Config::default();
        let signer = CallbackSigner::new(
            config.merchant_id.clone(),
            SecretString::from(config.callback_secret.expose_secret().to_string()),
        );
        let signature = signer.sign(&reference, amount);
        let session = engine.handle_callback(&payload, &signature).await.unwrap();
        assert_eq!(session.status, SessionStatus::Paid);
    }

    #[tokio::test]
    async fn test_manual_transfer_confirmation() {
        let engine = engine_with(SimulatedGateway::new(), Arc::new(FailingNotifier)).await;
        let outcome = engine.checkout(request("bank_transfer")).await.unwrap();
        assert_eq!(engine.refresh_payment().await.unwrap().status, SessionStatus::Pending);

        let confirmed = engine
            .confirm_manual_transfer(&outcome.transaction.external_reference)
            .await
            .unwrap();
        assert_eq!(confirmed.status, SessionStatus::Paid);

        // Confirming again is a no-op; another order's reference is refused.
        let again = engine
            .confirm_manual_transfer(&outcome.transaction.external_reference)
            .await
            .unwrap();
        assert_eq!(again.revision, confirmed.revision);
        assert!(matches!(
            engine.confirm_manual_transfer("MT-other").await,
            Err(CheckoutError::Store(StoreError::ReferenceMismatch(_)))
        ));
    }

    #[tokio::test]
    async fn test_registration_emits_order_completed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = engine_with(SimulatedGateway::new(), notifier.clone()).await;
        engine.checkout(request("bank_transfer")).await.unwrap();

        let session = engine
            .complete_registration(RegistrationPatch {
                password: Some("secret".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(session.registration_completed);

        let events = notifier.events.lock().await;
        let completed = events.last().unwrap();
        assert_eq!(completed.kind, ActivityKind::OrderCompleted);
        assert_eq!(completed.amount, Some(session.amount_minor_units));
    }

    #[tokio::test]
    async fn test_invalid_plan_price_is_rejected_before_any_call() {
        let gateway = SimulatedGateway::new();
        let engine = engine_with(gateway.clone(), Arc::new(FailingNotifier)).await;
        let mut req = request("bca_va");
        req.plan.price_minor_units = 0;

        let err = engine.checkout(req).await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::Provider(ProviderError::InvalidAmount(0))
        ));
        assert!(gateway.requests().await.is_empty());
    }
}
