use thiserror::Error;

/// Method id every failed or unsupported checkout can fall back to.
pub const FALLBACK_METHOD_ID: &str = "bank_transfer";

/// Failures raised by the payment provider adapters.
///
/// All of them are recoverable: the caller offers a retry, or falls back to
/// manual bank transfer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Payment provider unreachable: {cause}")]
    ProviderUnreachable { cause: String },
    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),
    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnreachable { .. })
    }

    /// The method the checkout screen should offer instead.
    pub fn fallback_method(&self) -> Option<&'static str> {
        match self {
            Self::ProviderUnreachable { .. } | Self::UnsupportedMethod(_) => {
                Some(FALLBACK_METHOD_ID)
            }
            Self::InvalidAmount(_) => None,
        }
    }
}

/// Transport-level failures of a gateway call.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),
    #[error("Gateway rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Gateway response could not be decoded: {0}")]
    Decode(String),
}

impl From<GatewayError> for ProviderError {
    fn from(err: GatewayError) -> Self {
        Self::ProviderUnreachable {
            cause: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Malformed persisted record in {tier} tier: {reason}")]
    MalformedPersistedRecord { tier: String, reason: String },
    #[error("No active session")]
    NoActiveSession,
    #[error("Stale write: persisted revision {persisted} is newer than {attempted}")]
    StaleWrite { persisted: u64, attempted: u64 },
    #[error("Reference {0} does not belong to the active session")]
    ReferenceMismatch(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal storage error: {0}")]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Callback rejected: {0}")]
    CallbackRejected(String),
    #[error("Gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = CheckoutError> = std::result::Result<T, E>;
