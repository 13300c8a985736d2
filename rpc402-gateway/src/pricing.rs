//! Per-method prices of the gateway.

use rpc402_core::types::AmountValue;
use serde::{Deserialize, Serialize};

/// Methods that are never charged and bypass the gate.
pub const FREE_METHODS: &[&str] = &[
    "getHealth",
    "getVersion",
    "getSlot",
    "getBlockHeight",
    "getGenesisHash",
    "getEpochInfo",
    "getLatestBlockhash",
    "getFirstAvailableBlock",
    "minimumLedgerSlot",
];

/// Size-based surcharge of the bandwidth-priced path, in USD per KiB.
pub const PRICE_PER_KB_USD: f64 = 0.000001;

/// Configurable base prices, in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTable {
    pub get_transaction: f64,
    pub get_block: f64,
    pub get_signatures_for_address: f64,
    /// Price of every method without its own entry.
    pub default: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        PriceTable {
            get_transaction: 0.00002,
            get_block: 0.00005,
            get_signatures_for_address: 0.0001,
            default: 0.00001,
        }
    }
}

/// What a call to one method costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodPrice {
    pub method: String,
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
    pub requires_payment: bool,
    pub description: String,
}

/// Resolves the price of JSON-RPC methods from a [`PriceTable`].
#[derive(Debug, Clone, Default)]
pub struct PricingResolver {
    table: PriceTable,
}

impl PricingResolver {
    pub fn new(table: PriceTable) -> Self {
        PricingResolver { table }
    }

    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    pub fn price_of(&self, method: &str) -> MethodPrice {
        if FREE_METHODS.contains(&method) {
            return MethodPrice {
                method: method.to_string(),
                price_usd: 0.0,
                requires_payment: false,
                description: "Free method".to_string(),
            };
        }

        let t = &self.table;
        let (price_usd, description) = match method {
            "getTransaction" => (t.get_transaction, "Retrieve a single transaction by signature"),
            "getConfirmedTransaction" => (t.get_transaction, "Retrieve confirmed transaction (deprecated)"),
            "getBlock" => (t.get_block, "Retrieve a block by slot number"),
            "getConfirmedBlock" => (t.get_block, "Retrieve confirmed block (deprecated, use getBlock)"),
            "getSignaturesForAddress" => (
                t.get_signatures_for_address,
                "Retrieve transaction signatures for an address",
            ),
            "getBlockTime" => (t.default, "Retrieve block time for a slot"),
            "getBlocks" => (t.default * 2.0, "Retrieve blocks in a slot range"),
            "getBlocksWithLimit" => (t.default * 2.0, "Retrieve blocks with limit"),
            _ => (t.default, "Historical data query"),
        };

        MethodPrice {
            method: method.to_string(),
            price_usd,
            requires_payment: price_usd > 0.0,
            description: description.to_string(),
        }
    }

    /// Base price plus a surcharge proportional to the response size.
    pub fn dynamic_price(&self, method: &str, size_bytes: usize) -> f64 {
        let size_kb = size_bytes as f64 / 1024.0;
        self.price_of(method).price_usd + size_kb * PRICE_PER_KB_USD
    }
}

/// Convert a USD price to the smallest USDC unit, rounding down.
pub fn usd_to_smallest_unit(usd: f64) -> AmountValue {
    AmountValue::from_usdc(usd)
}
