//! Payment protocol messages exchanged between callers, the gateway and the facilitator.

use base64::{Engine, prelude::BASE64_STANDARD};
use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::types::{AmountValue, Base64EncodedHeader, Network, X402V1};

/// Header carrying a base64-encoded JSON [`PaymentPayload`].
pub const PAYMENT_HEADER: &str = "x-payment";

/// Header carrying the JSON [`PaymentResponse`] of a settled call.
pub const PAYMENT_RESPONSE_HEADER: &str = "x-payment-response";

/// Header carrying a signed range access token.
pub const RANGE_TOKEN_HEADER: &str = "x-range-token";

/// An invoice: what the gateway requires to be paid for one call.
///
/// Issued by the gateway, never mutated afterwards. On payment the gateway rebuilds the
/// required fields from its own configuration instead of trusting anything the caller
/// echoes back.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    #[builder(default)]
    pub version: X402V1,
    /// Wallet address receiving the payment
    #[builder(into)]
    pub recipient: String,
    /// Destination token account the transfer must credit, if pinned
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub token_account: Option<String>,
    /// Token mint of the payment asset
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub mint: Option<String>,
    /// Required amount in the smallest unit of the asset
    #[builder(into)]
    pub amount: AmountValue,
    #[builder(into, default = "USDC".to_string())]
    pub currency: String,
    #[builder(default)]
    pub network: Network,
    #[builder(into)]
    pub invoice_id: String,
    /// Seconds the caller has to pay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// Payment scheme named by a [`PaymentPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentScheme {
    #[serde(rename = "exact")]
    Exact,
    #[serde(rename = "quote")]
    Quote,
}

/// The caller-supplied payment artifact: a signed transaction plus the invoice it pays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub version: X402V1,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<PaymentScheme>,
    pub network: Network,
    /// Base64-encoded, fully signed transaction bytes
    pub transaction: String,
    pub invoice_id: String,
}

impl PaymentPayload {
    /// Decode the signed transaction bytes.
    pub fn transaction_bytes(&self) -> crate::errors::Result<Vec<u8>> {
        Ok(BASE64_STANDARD.decode(&self.transaction)?)
    }
}

impl TryFrom<PaymentPayload> for Base64EncodedHeader {
    type Error = serde_json::Error;

    fn try_from(value: PaymentPayload) -> Result<Self, Self::Error> {
        let json = serde_json::to_string(&value)?;
        let encoded = BASE64_STANDARD.encode(json);
        Ok(Base64EncodedHeader(encoded))
    }
}

impl TryFrom<Base64EncodedHeader> for PaymentPayload {
    type Error = crate::errors::Error;

    fn try_from(value: Base64EncodedHeader) -> Result<Self, Self::Error> {
        let decoded_bytes = BASE64_STANDARD.decode(value.0.trim())?;
        let json_str = String::from_utf8(decoded_bytes)?;
        let payload = serde_json::from_str(&json_str)?;
        Ok(payload)
    }
}

/// Body of a `402 Payment Required` challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub error: String,
    pub message: String,
    pub method: String,
    pub payment: PaymentRequirements,
}

/// Body returned when a presented payment could not be accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Value of the `X-PAYMENT-RESPONSE` header attached to a settled call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    /// Settlement transaction signature
    pub signature: String,
    /// Price paid, in USD
    pub amount: f64,
    pub invoice_id: String,
}
