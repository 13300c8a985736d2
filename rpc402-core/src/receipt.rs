//! Ledger records of invoice outcomes and the statistics computed over them.

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::types::{Network, Record};

/// Lifecycle of a receipt.
///
/// Transitions only move forward: `pending → verified → settled`, and `pending` or
/// `verified` may fail. `settled` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Verified,
    Failed,
    Settled,
}

impl ReceiptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReceiptStatus::Settled | ReceiptStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: ReceiptStatus) -> bool {
        use ReceiptStatus::*;
        match (self, next) {
            (a, b) if *a == b => !a.is_terminal(),
            (Pending, Verified | Failed | Settled) => true,
            (Verified, Failed | Settled) => true,
            _ => false,
        }
    }
}

/// One invoice's lifecycle and outcome.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[builder(into)]
    pub id: String,
    #[builder(into)]
    pub invoice_id: String,
    /// Empty until settled
    #[builder(into, default)]
    pub tx_signature: String,
    #[builder(into)]
    pub method: String,
    #[builder(into)]
    pub endpoint: String,
    #[serde(rename = "amountUSD")]
    pub amount_usd: f64,
    #[builder(into, default = "USDC".to_string())]
    pub currency: String,
    #[builder(default = ReceiptStatus::Pending)]
    pub status: ReceiptStatus,
    #[builder(default)]
    pub payload_size: usize,
    #[builder(default)]
    pub latency_ms: u64,
    /// Milliseconds since the unix epoch
    pub timestamp: u64,
    #[builder(into)]
    pub payer: String,
    #[builder(into)]
    pub recipient: String,
    #[builder(default)]
    pub network: Network,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub error: Option<String>,
}

/// A partial update applied to a stored receipt.
#[derive(Builder, Debug, Clone, Default, PartialEq)]
pub struct ReceiptUpdate {
    pub status: Option<ReceiptStatus>,
    #[builder(into)]
    pub tx_signature: Option<String>,
    pub latency_ms: Option<u64>,
    #[builder(into)]
    pub error: Option<String>,
    #[builder(into)]
    pub payer: Option<String>,
}

impl ReceiptUpdate {
    /// Apply the update onto a receipt, without checking the status transition.
    pub fn apply(self, receipt: &mut Receipt) {
        if let Some(status) = self.status {
            receipt.status = status;
        }
        if let Some(sig) = self.tx_signature {
            receipt.tx_signature = sig;
        }
        if let Some(latency) = self.latency_ms {
            receipt.latency_ms = latency;
        }
        if let Some(error) = self.error {
            receipt.error = Some(error);
        }
        if let Some(payer) = self.payer {
            receipt.payer = payer;
        }
    }
}

/// Per-method call count and settled revenue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub count: u64,
    pub revenue: f64,
}

/// Aggregate statistics over the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_requests: u64,
    /// Sum of `amountUSD` over settled receipts only
    pub total_revenue: f64,
    pub method_breakdown: Record<MethodStats>,
    /// Mean latency in milliseconds across all receipts
    pub average_latency: f64,
    /// `failed / total`, 0 on an empty ledger
    pub failure_rate: f64,
}

impl UsageStats {
    pub fn from_receipts<'a>(receipts: impl IntoIterator<Item = &'a Receipt>) -> Self {
        let mut stats = UsageStats::default();
        let mut latency_sum = 0u64;
        let mut failed = 0u64;

        for receipt in receipts {
            stats.total_requests += 1;
            latency_sum += receipt.latency_ms;

            let entry = stats
                .method_breakdown
                .entry(receipt.method.clone())
                .or_default();
            entry.count += 1;

            match receipt.status {
                ReceiptStatus::Settled => {
                    stats.total_revenue += receipt.amount_usd;
                    entry.revenue += receipt.amount_usd;
                }
                ReceiptStatus::Failed => failed += 1,
                _ => {}
            }
        }

        if stats.total_requests > 0 {
            stats.average_latency = latency_sum as f64 / stats.total_requests as f64;
            stats.failure_rate = failed as f64 / stats.total_requests as f64;
        }

        stats
    }
}
