use crate::models::Chain;
use thiserror::Error;

/// Top-level error type for the fee job
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Price error: {0}")]
    Price(#[from] PriceError),

    #[error("Fee derivation error: {0}")]
    Fee(#[from] FeeError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("Chain adapter error: {0}")]
    Chain(#[from] ChainError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Required price of [{0}] is not available")]
    RequiredPrice(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("External error: {0}")]
    ExternalError(String),
}

/// Price resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("Price unavailable for [{token}]: {reason}")]
    PriceUnavailable { token: String, reason: String },

    #[error("Token [{token}] depends on [{dependency}] whose price is not resolved")]
    DependencyUnresolved { token: String, dependency: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl PriceError {
    pub fn unavailable(token: &str, reason: impl Into<String>) -> Self {
        PriceError::PriceUnavailable {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for PriceError {
    fn from(error: reqwest::Error) -> Self {
        PriceError::Http(error.to_string())
    }
}

/// Fee derivation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("Price of [{0}] is required")]
    MissingPrice(String),

    #[error("Height of chain [{0}] is not fetched")]
    MissingHeight(Chain),

    #[error("Fee rate for confirmation target [{0}] is not available")]
    MissingFeeRate(u32),

    #[error("Network fee estimate for chain [{chain}] is not configured for token [{token}]")]
    MissingNetworkFee { chain: Chain, token: String },

    #[error("ImpossibleBehavior: rsn ratio of [{0}] is zero")]
    ImpossibleRatio(String),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

/// Fee schedule errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Failed to fetch config box of [{token}]: {reason}")]
    ScheduleFetchFailed { token: String, reason: String },

    #[error("Malformed schedule registers: {0}")]
    Decode(String),

    #[error("Schedule value does not fit the register layout: {0}")]
    Encode(String),

    #[error("Unknown chain identifier [{0}]")]
    UnknownChain(String),
}

/// Transaction assembly errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("Available boxes didn't cover required assets. Native: {native}, Tokens: {tokens}")]
    InsufficientFunds { native: u64, tokens: String },

    #[error("Transaction is not balanced: {0}")]
    Imbalanced(String),

    #[error("Cannot reduce {asset}: [{available}] is less than [{required}]")]
    BalanceUnderflow {
        asset: String,
        available: u64,
        required: u64,
    },

    #[error("Transaction encoding failed: {0}")]
    Encoding(String),
}

/// Chain provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("No provider registered for chain [{0}]")]
    NotRegistered(Chain),

    #[error("Request to {chain} failed: {message}")]
    Request { chain: Chain, message: String },

    #[error("Unexpected response from {chain}: {message}")]
    Parse { chain: Chain, message: String },
}

impl From<config::ConfigError> for AppError {
    fn from(error: config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");
        AppError::Config(format!("Validation failed: {}", message))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
