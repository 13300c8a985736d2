//! Miscellaneous common types used throughout the rpc402 codebase.

use std::{
    fmt::{Debug, Display},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// Represents an key-value pair. The key is a `String`.
pub type Record<V> = std::collections::HashMap<String, V>;

/// Represents any JSON value. Used for serializing/deserializing arbitrary JSON data.
pub type AnyJson = serde_json::Value;

/// Represents version 1 of the payment protocol. Any type specific to version 1 can use
/// this struct for its `version` field.
///
/// ```
/// use serde::{Serialize, Deserialize};
/// use rpc402_core::types::X402V1;
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct ExampleV1 {
///     version: X402V1,
/// }
///
/// let example: ExampleV1 = serde_json::from_value(serde_json::json!({
///     "version": 1,
/// })).unwrap();
///
/// assert_eq!(example.version, X402V1);
///
/// let json = serde_json::to_value(&example).unwrap();
/// assert_eq!(json.get("version").unwrap(), &serde_json::json!(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct X402V1;

impl Serialize for X402V1 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i8(1)
    }
}

impl<'de> Deserialize<'de> for X402V1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let v = i8::deserialize(deserializer)?;
        match v {
            1 => Ok(X402V1),
            _ => Err(serde::de::Error::custom(format!(
                "Unsupported protocol version {}; expected 1",
                v
            ))),
        }
    }
}

impl Display for X402V1 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "1")
    }
}

/// The Solana cluster a payment is made on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Network {
    #[default]
    #[serde(rename = "devnet")]
    Devnet,
    #[serde(rename = "mainnet-beta")]
    MainnetBeta,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::MainnetBeta => "mainnet-beta",
        }
    }

    /// Canonical USDC mint address for the cluster.
    pub fn usdc_mint(&self) -> &'static str {
        match self {
            Network::Devnet => "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            Network::MainnetBeta => "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown network name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown network '{0}'; expected 'devnet' or 'mainnet-beta'")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devnet" => Ok(Network::Devnet),
            "mainnet-beta" => Ok(Network::MainnetBeta),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Represents a base64-encoded header value for payment protocol headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64EncodedHeader(pub String);

impl Serialize for Base64EncodedHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Base64EncodedHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Base64EncodedHeader(s))
    }
}

impl Display for Base64EncodedHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
