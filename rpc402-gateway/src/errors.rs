//! Error types of the gateway.
//!
//! [`GateRejection`] is the only one that reaches callers directly; with the `axum`
//! feature it renders itself as an HTTP response.

use rpc402_core::transport::{PaymentChallenge, PaymentFailure};

/// Why the payment gate refused to forward a call.
#[derive(Debug, thiserror::Error)]
pub enum GateRejection {
    /// No payment presented: the caller gets a fresh invoice.
    #[error("Payment Required")]
    PaymentRequired(Box<PaymentChallenge>),

    #[error("Invalid X-PAYMENT header: failed to parse")]
    MalformedPayment,

    #[error("Invoice {0} already settled")]
    AlreadySettled(String),

    #[error("Invoice {0} already failed")]
    AlreadyFailed(String),

    /// The facilitator judged the payment invalid.
    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),

    /// Verification or settlement could not be carried out.
    #[error("Payment processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Internal server error")]
    Internal,
}

impl GateRejection {
    pub fn status(&self) -> http::StatusCode {
        match self {
            GateRejection::MalformedPayment => http::StatusCode::BAD_REQUEST,
            GateRejection::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => http::StatusCode::PAYMENT_REQUIRED,
        }
    }

    /// The `{error, details}` body for every rejection but a challenge.
    pub fn failure(&self) -> PaymentFailure {
        let (error, details) = match self {
            GateRejection::PaymentRequired(_) => ("Payment Required", None),
            GateRejection::MalformedPayment => ("Invalid X-PAYMENT header: failed to parse", None),
            GateRejection::AlreadySettled(_) => (
                "Invoice already settled",
                Some("Request a new invoice".to_string()),
            ),
            GateRejection::AlreadyFailed(_) => (
                "Invoice already failed",
                Some("Request a new invoice and submit a new payment".to_string()),
            ),
            GateRejection::VerificationFailed(reason) => {
                ("Payment verification failed", Some(reason.clone()))
            }
            GateRejection::ProcessingFailed(reason) => {
                ("Payment processing failed", Some(reason.clone()))
            }
            GateRejection::Internal => ("Internal server error", None),
        };
        PaymentFailure {
            error: error.to_string(),
            details,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for GateRejection {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match self {
            GateRejection::PaymentRequired(challenge) => {
                (status, axum::extract::Json(challenge)).into_response()
            }
            other => (status, axum::extract::Json(other.failure())).into_response(),
        }
    }
}

/// Errors raised by the receipt ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Receipt {0} not found")]
    NotFound(String),

    #[error("A receipt for invoice {0} already exists")]
    DuplicateInvoice(String),

    #[error("Receipt {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: rpc402_core::receipt::ReceiptStatus,
        to: rpc402_core::receipt::ReceiptStatus,
    },
}

/// Errors raised while issuing or checking a signed capability.
#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("Malformed token")]
    Malformed,
    #[error("Token signature mismatch")]
    BadSignature,
    #[error("Token expired")]
    Expired,
    #[error("Invalid signing key")]
    InvalidKey,
    #[error("Serialization/Deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("Base64 decode error: {0}")]
    Base64DecodeError(#[from] base64::DecodeError),
}

/// Errors raised by a range purchase.
#[derive(Debug, thiserror::Error)]
pub enum RangeError {
    #[error("Invalid range: startSlot must be less than endSlot")]
    EmptyRange,
    #[error("Range too large: maximum {max} slots, requested {requested}")]
    TooLarge { max: u64, requested: u64 },
    #[error("Invalid duration: must be at least one second")]
    ZeroDuration,
    #[error(transparent)]
    Capability(#[from] CapabilityError),
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
