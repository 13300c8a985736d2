//! The settlement authority boundary.
//!
//! A facilitator verifies that a signed payment satisfies an invoice and broadcasts it.
//! The gateway only ever talks to one through the [`Facilitator`] trait, which keeps the
//! trust boundary in one place and lets tests swap in doubles.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    transport::{PaymentPayload, PaymentRequirements},
    types::Network,
};

/// Request body of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub payment: PaymentPayload,
    pub requirements: PaymentRequirements,
}

/// Request body of `POST /settle`.
pub type SettleRequest = VerifyRequest;

/// Response body of `POST /verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fee payer of the verified transaction, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    pub fn valid(payer: Option<String>) -> Self {
        VerifyResponse {
            is_valid: true,
            error: None,
            payer,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        VerifyResponse {
            is_valid: false,
            error: Some(reason.into()),
            payer: None,
        }
    }

    /// The reason for rejection, or a generic one if the facilitator gave none.
    pub fn invalid_reason(&self) -> &str {
        self.error
            .as_deref()
            .unwrap_or("Payment verification failed")
    }
}

/// Response body of `POST /settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Base58 transaction signature
    pub signature: String,
    /// Milliseconds since the unix epoch at confirmation
    pub timestamp: u64,
}

/// Response body of `GET /supported`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub version: u8,
    pub scheme: Vec<String>,
    pub network: Vec<Network>,
    /// Address that pays transaction fees on behalf of callers
    pub fee_payer: String,
}

/// Settlement authority interface.
pub trait Facilitator {
    type Error: std::error::Error + Send + Sync + 'static;

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Send + Sync> Facilitator for Arc<T> {
    type Error = T::Error;

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn verify_response_wire_shape() {
        let invalid = VerifyResponse::invalid("Insufficient payment: 10 < 20");
        assert_eq!(
            serde_json::to_value(&invalid).unwrap(),
            json!({ "isValid": false, "error": "Insufficient payment: 10 < 20" })
        );

        let parsed: VerifyResponse = serde_json::from_value(json!({ "isValid": true })).unwrap();
        assert!(parsed.is_valid);
        assert_eq!(parsed.error, None);
    }

    #[test]
    fn supported_response_wire_shape() {
        let supported: SupportedResponse = serde_json::from_value(json!({
            "version": 1,
            "scheme": ["exact"],
            "network": ["devnet"],
            "feePayer": "62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf"
        }))
        .unwrap();

        assert_eq!(supported.network, vec![Network::Devnet]);
        assert_eq!(supported.scheme, vec!["exact".to_string()]);
    }
}
