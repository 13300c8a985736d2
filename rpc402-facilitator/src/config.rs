//! Facilitator configuration.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use bon::Builder;
use rpc402_core::types::Network;
use url::Url;

use crate::errors::ConfigError;

/// Default address that pays transaction fees and receives payments.
pub const DEFAULT_FEE_PAYER: &str = "62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf";

/// Default upper bound on broadcast plus confirmation.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Which policy check the authority applies after the structural checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    /// Accept every structurally valid transaction.
    AllowAll,
    /// Simulate the transaction against the cluster and reject on simulation errors.
    #[default]
    Simulate,
}

impl FromStr for PolicyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow-all" | "allow_all" | "none" => Ok(PolicyMode::AllowAll),
            "simulate" => Ok(PolicyMode::Simulate),
            other => Err(ConfigError::InvalidValue {
                name: "POLICY_MODE",
                reason: format!("unknown policy mode '{other}'"),
            }),
        }
    }
}

#[derive(Builder, Debug, Clone)]
pub struct FacilitatorConfig {
    #[builder(default = "0.0.0.0".to_string(), into)]
    pub host: String,
    #[builder(default = 3000)]
    pub port: u16,
    #[builder(default)]
    pub network: Network,
    pub solana_rpc_url: Url,
    /// Advertised by `/supported` for clients building a payment.
    #[builder(default = DEFAULT_FEE_PAYER.to_string(), into)]
    pub fee_payer: String,
    #[builder(default)]
    pub policy: PolicyMode,
    /// Upper bound on broadcast plus confirmation.
    #[builder(default = DEFAULT_SETTLE_TIMEOUT)]
    pub settle_timeout: Duration,
}

impl FacilitatorConfig {
    /// Load configuration from `FACILITATOR_*`, `NETWORK`, `SOLANA_RPC_URL`,
    /// `FEE_PAYER_ADDRESS` (or `RECIPIENT_WALLET`), `POLICY_MODE` and `SETTLE_TIMEOUT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("FACILITATOR_PORT") {
            Some(p) => p.parse().map_err(|err| ConfigError::InvalidValue {
                name: "FACILITATOR_PORT",
                reason: format!("{err}"),
            })?,
            None => 3000,
        };

        let network = match lookup("NETWORK") {
            Some(n) => n.parse().map_err(|err| ConfigError::InvalidValue {
                name: "NETWORK",
                reason: format!("{err}"),
            })?,
            None => Network::Devnet,
        };

        let rpc_url = lookup("SOLANA_RPC_URL")
            .unwrap_or_else(|| "https://api.devnet.solana.com".to_string());
        let solana_rpc_url = Url::parse(&rpc_url).map_err(|source| ConfigError::InvalidUrl {
            name: "SOLANA_RPC_URL",
            source,
        })?;

        let fee_payer = lookup("FEE_PAYER_ADDRESS")
            .or_else(|| lookup("RECIPIENT_WALLET"))
            .unwrap_or_else(|| DEFAULT_FEE_PAYER.to_string());

        let policy = lookup("POLICY_MODE")
            .map(|p| p.parse())
            .transpose()?
            .unwrap_or_default();

        let settle_timeout = lookup("SETTLE_TIMEOUT")
            .map(|s| {
                s.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|err| ConfigError::InvalidValue {
                        name: "SETTLE_TIMEOUT",
                        reason: format!("{err}"),
                    })
            })
            .transpose()?;

        Ok(FacilitatorConfig::builder()
            .host(lookup("FACILITATOR_HOST").unwrap_or_else(|| "0.0.0.0".to_string()))
            .port(port)
            .network(network)
            .solana_rpc_url(solana_rpc_url)
            .fee_payer(fee_payer)
            .policy(policy)
            .maybe_settle_timeout(settle_timeout)
            .build())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|err| ConfigError::InvalidValue {
                name: "FACILITATOR_HOST",
                reason: format!("{err}"),
            })
    }
}
