use super::normalizer;
use crate::config::StorageKeys;
use crate::domain::ports::SessionStorageBox;
use crate::domain::session::{Session, SessionSource, SessionStatus};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The two persistence horizons a session is mirrored into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Survives restarts; authoritative when the tiers disagree.
    Durable,
    /// Scoped to the current tab.
    TabScoped,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Durable => "durable",
            Self::TabScoped => "tab-scoped",
        })
    }
}

/// What a storage probe found, without adopting anything into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedHint {
    pub tier: Tier,
    /// `registrationCompleted` as written in the record, not as defaulted.
    pub registration_completed: bool,
}

/// Fields the registration step may add to a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrationPatch {
    pub password: Option<String>,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub clinic_name: Option<String>,
    pub remember_me: Option<bool>,
}

impl RegistrationPatch {
    fn apply(self, session: &mut Session, now: DateTime<Utc>) {
        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(password) = self.password.filter(|p| !p.trim().is_empty()) {
            session.credential_digest = Some(hex::encode(Sha256::digest(password.as_bytes())));
        }
        if let Some(name) = non_empty(self.contact_name) {
            session.customer.contact_name = name;
        }
        if let Some(phone) = non_empty(self.phone) {
            session.customer.phone = phone;
        }
        if let Some(clinic) = non_empty(self.clinic_name) {
            session.customer.clinic_name = clinic;
        }
        if let Some(remember_me) = self.remember_me {
            session.remember_me = remember_me;
        }
        session.account_created = true;
        session.registration_completed = true;
        session.registration_date = Some(now);
        session.source = SessionSource::Register;
    }
}

/// Single source of truth for "is there a usable session".
///
/// Holds the session in memory and mirrors every write into the durable tier
/// and then the tab-scoped tier. Writes are serialized in issue order.
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    write_lock: Mutex<()>,
    durable: SessionStorageBox,
    tab_scoped: SessionStorageBox,
    keys: StorageKeys,
}

impl SessionStore {
    pub fn new(durable: SessionStorageBox, tab_scoped: SessionStorageBox, keys: StorageKeys) -> Self {
        Self {
            current: RwLock::new(None),
            write_lock: Mutex::new(()),
            durable,
            tab_scoped,
            keys,
        }
    }

    /// Persists `session` in memory and in both tiers.
    ///
    /// Refuses with `StaleWrite` when the durable tier already holds a strictly
    /// newer revision of the same order. A session for a different order
    /// replaces whatever was stored. A failing tab-scoped mirror is only logged.
    pub async fn save(&self, session: Session) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.save_locked(session).await
    }

    async fn save_locked(&self, session: Session) -> Result<(), StoreError> {
        if let Some(persisted) = self.persisted_revision(&session.order_id).await
            && persisted > session.revision
        {
            warn!(
                persisted,
                attempted = session.revision,
                order_id = %session.order_id,
                "Refusing to overwrite newer session"
            );
            return Err(StoreError::StaleWrite {
                persisted,
                attempted: session.revision,
            });
        }

        let encoded = serde_json::to_string(&session)?;
        let order_id = session.order_id.clone();
        let revision = session.revision;
        *self.current.write().await = Some(session);

        self.durable.write(&self.keys.durable, &encoded).await?;
        if let Err(e) = self.tab_scoped.write(&self.keys.tab_scoped, &encoded).await {
            warn!(error = %e, "Tab-scoped mirror write failed");
        }

        debug!(%order_id, revision, "Session saved");
        Ok(())
    }

    /// Returns the active session, restoring it from storage when memory is empty.
    ///
    /// Tiers are tried durable first; unreadable or malformed records are
    /// skipped in favour of the next tier.
    pub async fn load(&self) -> Option<Session> {
        if let Some(session) = self.current.read().await.clone() {
            return Some(session);
        }

        for tier in [Tier::Durable, Tier::TabScoped] {
            match self.read_tier(tier).await {
                Ok(Some((session, _))) => {
                    info!(%tier, order_id = %session.order_id, "Restored session from storage");
                    let mut current = self.current.write().await;
                    return Some(current.get_or_insert(session).clone());
                }
                Ok(None) => {}
                Err(e) => warn!(%tier, error = %e, "Skipping unusable persisted session"),
            }
        }
        None
    }

    /// The in-memory session, without touching storage.
    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Probes the tiers in load order for a restorable record.
    pub async fn persisted_hint(&self) -> Option<PersistedHint> {
        for tier in [Tier::Durable, Tier::TabScoped] {
            if let Ok(Some((_, raw))) = self.read_tier(tier).await {
                let registration_completed = raw
                    .get("registrationCompleted")
                    .is_some_and(normalizer::is_truthy);
                return Some(PersistedHint {
                    tier,
                    registration_completed,
                });
            }
        }
        None
    }

    /// Marks the active session as registered and writes it back.
    pub async fn complete_registration(&self, patch: RegistrationPatch) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load().await.ok_or(StoreError::NoActiveSession)?;

        patch.apply(&mut session, Utc::now());
        session.revision += 1;
        self.save_locked(session.clone()).await?;

        if session.remember_me {
            let remembered = json!({
                "email": session.customer.email,
                "clinicName": session.customer.clinic_name,
            });
            if let Err(e) = self
                .durable
                .write(&self.keys.remembered_credentials, &remembered.to_string())
                .await
            {
                warn!(error = %e, "Could not store remembered credentials");
            }
        }

        info!(order_id = %session.order_id, "Registration completed");
        Ok(session)
    }

    /// Records a payment outcome for the active session's transaction.
    pub async fn apply_payment_status(
        &self,
        reference: &str,
        status: SessionStatus,
    ) -> Result<Session, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load().await.ok_or(StoreError::NoActiveSession)?;

        if reference != session.transaction_id && reference != session.order_id {
            return Err(StoreError::ReferenceMismatch(reference.to_string()));
        }
        if session.status == status {
            return Ok(session);
        }
        if session.status == SessionStatus::Paid {
            warn!(
                order_id = %session.order_id,
                ?status,
                "Ignoring status update for a paid order"
            );
            return Ok(session);
        }

        session.status = status;
        session.revision += 1;
        self.save_locked(session.clone()).await?;
        info!(order_id = %session.order_id, ?status, "Payment status updated");
        Ok(session)
    }

    /// Drops the session from memory and from every tier. Idempotent.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        *self.current.write().await = None;

        let removals = [
            self.durable.remove(&self.keys.durable).await,
            self.tab_scoped.remove(&self.keys.tab_scoped).await,
            self.durable.remove(&self.keys.remembered_credentials).await,
        ];

        let mut first_error = None;
        for result in removals {
            if let Err(e) = result {
                warn!(error = %e, "Failed to remove persisted session record");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Session cleared");
                Ok(())
            }
        }
    }

    /// Forgets the in-memory copy only, as a fresh page load would.
    pub async fn clear_memory(&self) {
        *self.current.write().await = None;
    }

    async fn read_tier(&self, tier: Tier) -> Result<Option<(Session, Value)>, StoreError> {
        let (storage, key) = match tier {
            Tier::Durable => (&self.durable, &self.keys.durable),
            Tier::TabScoped => (&self.tab_scoped, &self.keys.tab_scoped),
        };
        let Some(encoded) = storage.read(key).await? else {
            return Ok(None);
        };
        let raw: Value =
            serde_json::from_str(&encoded).map_err(|e| StoreError::MalformedPersistedRecord {
                tier: tier.to_string(),
                reason: e.to_string(),
            })?;
        let session = normalizer::restore(&raw, &tier.to_string(), Utc::now())?;
        Ok(Some((session, raw)))
    }

    /// Revision of the durable record, if it belongs to the same order.
    async fn persisted_revision(&self, order_id: &str) -> Option<u64> {
        let encoded = self.durable.read(&self.keys.durable).await.ok()??;
        let raw: Value = serde_json::from_str(&encoded).ok()?;
        if raw.get("orderId").and_then(Value::as_str) != Some(order_id) {
            return None;
        }
        raw.get("revision").and_then(Value::as_u64)
    }
}
