//! Gateway configuration.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use bon::Builder;
use rpc402_core::types::Network;
use rpc402_facilitator::svm;
use url::Url;

use crate::{errors::ConfigError, pricing::PriceTable, range::SignatureRangeCheck};

pub const DEFAULT_RECIPIENT: &str = "62pyPYsdSLah2vDSeenEep2R2hP9jz98eDbnz4Zyb1Lf";

/// Signing secret used when none is configured. Only suitable for development.
pub const DEFAULT_RANGE_TOKEN_SECRET: &str = "rpc402-range-secret-change-in-production";

/// Which settlement authority the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationMode {
    /// A facilitator reached over HTTP.
    #[default]
    Remote,
    /// Accept every payment. Development only.
    Stub,
}

impl FromStr for VerificationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "remote" => Ok(VerificationMode::Remote),
            "stub" | "mock" => Ok(VerificationMode::Stub),
            other => Err(ConfigError::InvalidValue {
                name: "VERIFICATION_MODE",
                reason: format!("expected 'remote' or 'stub', got '{other}'"),
            }),
        }
    }
}

/// How invoices are priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricingMode {
    /// The method's table price.
    #[default]
    Flat,
    /// Table price plus a per-KiB surcharge on the upstream response, fetched while quoting.
    Bandwidth,
}

impl FromStr for PricingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(PricingMode::Flat),
            "bandwidth" => Ok(PricingMode::Bandwidth),
            other => Err(ConfigError::InvalidValue {
                name: "PRICING_MODE",
                reason: format!("expected 'flat' or 'bandwidth', got '{other}'"),
            }),
        }
    }
}

#[derive(Builder, Debug, Clone)]
pub struct GatewayConfig {
    #[builder(default = "0.0.0.0".to_string(), into)]
    pub host: String,
    #[builder(default = 4021)]
    pub port: u16,
    #[builder(default)]
    pub network: Network,
    pub upstream_rpc_url: Url,
    pub facilitator_url: Url,
    /// Wallet receiving payments
    #[builder(default = DEFAULT_RECIPIENT.to_string(), into)]
    pub recipient_wallet: String,
    /// Token account a payment must credit; the wallet's associated token account when unset
    #[builder(into)]
    pub recipient_token_account: Option<String>,
    /// Defaults to the network's canonical USDC mint
    #[builder(into)]
    pub usdc_mint: Option<String>,
    #[builder(default)]
    pub prices: PriceTable,
    #[builder(default)]
    pub verification: VerificationMode,
    #[builder(default)]
    pub pricing_mode: PricingMode,
    #[builder(default)]
    pub signature_range_check: SignatureRangeCheck,
    #[builder(default = DEFAULT_RANGE_TOKEN_SECRET.to_string(), into)]
    pub range_token_secret: String,
    /// JSON file mirroring the receipt ledger; in-memory only when unset
    pub receipts_path: Option<PathBuf>,
    /// Seconds a caller has to pay an invoice
    #[builder(default = 60)]
    pub invoice_timeout: u64,
    #[builder(default = Duration::from_secs(60))]
    pub upstream_timeout: Duration,
    /// Bound on `/verify` and every other facilitator call but `/settle`
    #[builder(default = Duration::from_secs(30))]
    pub facilitator_timeout: Duration,
    /// Bound on `/settle`; must outlast the facilitator's own confirmation bound
    #[builder(default = rpc402_facilitator::facilitator_client::DEFAULT_SETTLE_TIMEOUT)]
    pub settle_timeout: Duration,
    #[builder(default = Duration::from_secs(60))]
    pub cache_ttl: Duration,
    #[builder(default = 10_000)]
    pub cache_capacity: usize,
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
        name,
        reason: err.to_string(),
    })
}

fn parse_seconds(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(name, value).map(Duration::from_secs)
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl { name, source })
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let network: Network = match get("NETWORK") {
            Some(n) => parse("NETWORK", &n)?,
            None => Network::Devnet,
        };

        let usdc_mint = match network {
            Network::Devnet => get("USDC_MINT_DEVNET"),
            Network::MainnetBeta => get("USDC_MINT_MAINNET"),
        };

        let defaults = PriceTable::default();
        let prices = PriceTable {
            get_transaction: get("PRICE_GET_TRANSACTION")
                .map(|v| parse("PRICE_GET_TRANSACTION", &v))
                .transpose()?
                .unwrap_or(defaults.get_transaction),
            get_block: get("PRICE_GET_BLOCK")
                .map(|v| parse("PRICE_GET_BLOCK", &v))
                .transpose()?
                .unwrap_or(defaults.get_block),
            get_signatures_for_address: get("PRICE_GET_SIGNATURES")
                .map(|v| parse("PRICE_GET_SIGNATURES", &v))
                .transpose()?
                .unwrap_or(defaults.get_signatures_for_address),
            default: defaults.default,
        };

        let seconds = |name: &'static str| get(name).map(|v| parse_seconds(name, &v)).transpose();

        let config = GatewayConfig::builder()
            .host(get("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".to_string()))
            .port(
                get("GATEWAY_PORT")
                    .map(|v| parse("GATEWAY_PORT", &v))
                    .transpose()?
                    .unwrap_or(4021),
            )
            .network(network)
            .upstream_rpc_url(parse_url(
                "UPSTREAM_RPC_URL",
                &get("UPSTREAM_RPC_URL")
                    .unwrap_or_else(|| "https://solana-rpc.parafi.tech".to_string()),
            )?)
            .facilitator_url(parse_url(
                "FACILITATOR_URL",
                &get("FACILITATOR_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            )?)
            .recipient_wallet(get("RECIPIENT_WALLET").unwrap_or_else(|| DEFAULT_RECIPIENT.to_string()))
            .maybe_recipient_token_account(get("RECIPIENT_TOKEN_ACCOUNT"))
            .maybe_usdc_mint(usdc_mint)
            .prices(prices)
            .verification(
                get("VERIFICATION_MODE")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
            )
            .pricing_mode(
                get("PRICING_MODE")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
            )
            .signature_range_check(
                get("SIGNATURE_RANGE_CHECK")
                    .map(|v| v.parse())
                    .transpose()?
                    .unwrap_or_default(),
            )
            .range_token_secret(
                get("RANGE_TOKEN_SECRET").unwrap_or_else(|| DEFAULT_RANGE_TOKEN_SECRET.to_string()),
            )
            .maybe_receipts_path(get("RECEIPTS_PATH").map(PathBuf::from))
            .maybe_facilitator_timeout(seconds("FACILITATOR_TIMEOUT")?)
            .maybe_settle_timeout(seconds("FACILITATOR_SETTLE_TIMEOUT")?)
            .maybe_upstream_timeout(seconds("UPSTREAM_TIMEOUT")?)
            .build();

        // Fails early on an unusable wallet or mint.
        config.token_account()?;
        Ok(config)
    }

    /// The token account payments must credit: the configured one, or the recipient
    /// wallet's associated token account for [`mint`](Self::mint).
    pub fn token_account(&self) -> Result<String, ConfigError> {
        if let Some(account) = &self.recipient_token_account {
            if !svm::is_valid_address(account) {
                return Err(ConfigError::InvalidValue {
                    name: "RECIPIENT_TOKEN_ACCOUNT",
                    reason: format!("'{account}' is not a base58 address"),
                });
            }
            return Ok(account.clone());
        }
        svm::associated_token_address(&self.recipient_wallet, &self.mint()).map_err(|err| {
            ConfigError::InvalidValue {
                name: "RECIPIENT_WALLET",
                reason: err.to_string(),
            }
        })
    }

    /// The configured mint, or the network's canonical USDC mint.
    pub fn mint(&self) -> String {
        self.usdc_mint
            .clone()
            .unwrap_or_else(|| self.network.usdc_mint().to_string())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse("GATEWAY_HOST", &format!("{}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.port, 4021);
        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.upstream_rpc_url.as_str(), "https://solana-rpc.parafi.tech/");
        assert_eq!(config.facilitator_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.recipient_wallet, DEFAULT_RECIPIENT);
        assert_eq!(config.mint(), Network::Devnet.usdc_mint());
        assert_eq!(config.prices, PriceTable::default());
        assert_eq!(config.verification, VerificationMode::Remote);
        assert_eq!(config.pricing_mode, PricingMode::Flat);
        assert_eq!(config.signature_range_check, SignatureRangeCheck::Lenient);
        assert_eq!(config.receipts_path, None);
        assert_eq!(config.invoice_timeout, 60);
        assert_eq!(config.facilitator_timeout, Duration::from_secs(30));
        assert!(config.settle_timeout > rpc402_facilitator::config::DEFAULT_SETTLE_TIMEOUT);
    }

    #[test]
    fn token_account_defaults_to_the_associated_account() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        let derived = config.token_account().unwrap();

        assert_ne!(derived, DEFAULT_RECIPIENT);
        assert_eq!(
            Ok(derived.clone()),
            svm::associated_token_address(DEFAULT_RECIPIENT, Network::Devnet.usdc_mint())
        );

        // A different mint credits a different account.
        let mainnet = GatewayConfig::from_lookup(lookup(&[("NETWORK", "mainnet-beta")])).unwrap();
        assert_ne!(mainnet.token_account().unwrap(), derived);

        let pinned = GatewayConfig::from_lookup(lookup(&[(
            "RECIPIENT_TOKEN_ACCOUNT",
            "Ge3jkza5KRfXvaq3GELNLh6V1pjjdEKNpEdGXJgjjKUR",
        )]))
        .unwrap();
        assert_eq!(
            pinned.token_account().unwrap(),
            "Ge3jkza5KRfXvaq3GELNLh6V1pjjdEKNpEdGXJgjjKUR"
        );
    }

    #[test]
    fn overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("GATEWAY_PORT", "8080"),
            ("NETWORK", "mainnet-beta"),
            ("USDC_MINT_DEVNET", "ignored"),
            ("PRICE_GET_BLOCK", "0.001"),
            ("VERIFICATION_MODE", "stub"),
            ("PRICING_MODE", "bandwidth"),
            ("SIGNATURE_RANGE_CHECK", "strict"),
            ("RECIPIENT_TOKEN_ACCOUNT", "Ge3jkza5KRfXvaq3GELNLh6V1pjjdEKNpEdGXJgjjKUR"),
            ("RECEIPTS_PATH", "data/receipts.json"),
            ("FACILITATOR_TIMEOUT", "10"),
            ("FACILITATOR_SETTLE_TIMEOUT", "120"),
            ("UPSTREAM_TIMEOUT", "15"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.mint(), Network::MainnetBeta.usdc_mint());
        assert_eq!(config.prices.get_block, 0.001);
        assert_eq!(config.verification, VerificationMode::Stub);
        assert_eq!(config.pricing_mode, PricingMode::Bandwidth);
        assert_eq!(config.signature_range_check, SignatureRangeCheck::Strict);
        assert!(config.recipient_token_account.is_some());
        assert_eq!(config.receipts_path, Some(PathBuf::from("data/receipts.json")));
        assert_eq!(config.facilitator_timeout, Duration::from_secs(10));
        assert_eq!(config.settle_timeout, Duration::from_secs(120));
        assert_eq!(config.upstream_timeout, Duration::from_secs(15));
    }

    #[test]
    fn rejects_invalid_values() {
        for vars in [
            [("GATEWAY_PORT", "port")],
            [("NETWORK", "testnet")],
            [("UPSTREAM_RPC_URL", "not a url")],
            [("PRICE_GET_TRANSACTION", "free")],
            [("VERIFICATION_MODE", "trust-me")],
            [("RECIPIENT_WALLET", "not-a-wallet")],
            [("RECIPIENT_TOKEN_ACCOUNT", "0OIl")],
            [("FACILITATOR_SETTLE_TIMEOUT", "soon")],
        ] {
            assert!(GatewayConfig::from_lookup(lookup(&vars)).is_err(), "{vars:?}");
        }
    }
}
