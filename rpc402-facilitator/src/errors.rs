use std::time::Duration;

/// Errors raised by the settlement authority while settling a payment.
///
/// Verification problems are not errors: they are reported as an invalid
/// [`VerifyResponse`](rpc402_core::facilitator::VerifyResponse).
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Transaction not confirmed within {0:?}")]
    ConfirmationTimeout(Duration),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("URL parse error for {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}
