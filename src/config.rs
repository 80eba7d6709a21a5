use crate::error::ConfigError;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Keys the session record and its side-records are stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub durable: String,
    pub tab_scoped: String,
    pub remembered_credentials: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            durable: "clinic.session".to_string(),
            tab_scoped: "clinic.session.tab".to_string(),
            remembered_credentials: "clinic.remembered".to_string(),
        }
    }
}

/// Runtime configuration for the checkout pipeline.
#[derive(Debug)]
pub struct Config {
    /// Merchant identity mixed into callback signatures.
    pub merchant_id: String,
    /// Shared secret for callback signatures.
    pub callback_secret: SecretString,
    /// Provider API base URL; `None` runs against the simulated gateway.
    pub gateway_url: Option<Url>,
    pub gateway_api_key: Option<SecretString>,
    /// Directory backing the durable tier.
    pub state_dir: PathBuf,
    /// How long a provider transaction stays payable.
    pub transaction_ttl: Duration,
    pub poll_interval: Duration,
    pub storage_keys: StorageKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            merchant_id: "clinic-merchant".to_string(),
            callback_secret: SecretString::from("development-callback-secret".to_string()),
            gateway_url: None,
            gateway_api_key: None,
            state_dir: PathBuf::from(".clinic-checkout"),
            transaction_ttl: Duration::from_secs(24 * 60 * 60),
            poll_interval: Duration::from_secs(5),
            storage_keys: StorageKeys::default(),
        }
    }
}

impl Config {
    /// Reads `CLINIC_*` variables, falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let gateway_url = match var("CLINIC_GATEWAY_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|_| ConfigError::Invalid {
                key: "CLINIC_GATEWAY_URL",
                value: raw,
            })?),
            None => None,
        };

        let ttl_minutes = parse_u64(&var, "CLINIC_TRANSACTION_TTL_MINUTES", 24 * 60)?;
        let poll_secs = parse_u64(&var, "CLINIC_POLL_INTERVAL_SECS", 5)?;

        let mut storage_keys = defaults.storage_keys;
        if let Some(key) = var("CLINIC_SESSION_KEY") {
            storage_keys.tab_scoped = format!("{key}.tab");
            storage_keys.durable = key;
        }

        Ok(Self {
            merchant_id: var("CLINIC_MERCHANT_ID").unwrap_or(defaults.merchant_id),
            callback_secret: var("CLINIC_CALLBACK_SECRET")
                .map(SecretString::from)
                .unwrap_or(defaults.callback_secret),
            gateway_url,
            gateway_api_key: var("CLINIC_GATEWAY_API_KEY").map(SecretString::from),
            state_dir: var("CLINIC_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_dir),
            transaction_ttl: Duration::from_secs(ttl_minutes * 60),
            poll_interval: Duration::from_secs(poll_secs),
            storage_keys,
        })
    }
}

fn parse_u64<F>(var: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
