//! Slot-range access tokens.
//!
//! A range purchase yields a [`SignedCapability`] over [`RangeToken`] claims. While it is
//! unexpired, calls that address slots inside the range skip the per-call payment.

use std::{collections::HashMap, future::Future, str::FromStr};

use parking_lot::RwLock;
use rpc402_core::types::unix_millis;
use serde::{Deserialize, Serialize};

use crate::{
    capability::{Expiring, SignedCapability},
    errors::{ConfigError, RangeError},
};

/// Largest `endSlot - startSlot` a single purchase may cover.
pub const MAX_RANGE_SPAN: u64 = 10_000;

pub const PRICE_PER_BLOCK_USD: f64 = 0.00001;

/// Claims of a range access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeToken {
    /// `{startSlot}-{endSlot}-{purchaser}`
    pub range_id: String,
    pub start_slot: u64,
    pub end_slot: u64,
    pub purchaser: String,
    /// Signature of the payment that bought the range
    pub tx_signature: String,
    /// Milliseconds since the unix epoch
    pub issued_at: u64,
    /// Milliseconds since the unix epoch
    pub expires_at: u64,
}

impl Expiring for RangeToken {
    fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRangeRequest {
    pub start_slot: u64,
    pub end_slot: u64,
    /// Seconds of access
    pub duration: u64,
    pub payment_tx_signature: String,
    pub payer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangePricing {
    pub price_per_block: f64,
    pub total_price: f64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangePurchase {
    pub token: String,
    pub claims: RangeToken,
    pub pricing: RangePricing,
}

/// How signature-keyed calls are matched against a range token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureRangeCheck {
    /// Any unexpired token authorizes signature-keyed calls.
    #[default]
    Lenient,
    /// The signature's slot must be resolved and lie inside the range.
    Strict,
}

impl FromStr for SignatureRangeCheck {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lenient" => Ok(SignatureRangeCheck::Lenient),
            "strict" => Ok(SignatureRangeCheck::Strict),
            other => Err(ConfigError::InvalidValue {
                name: "SIGNATURE_RANGE_CHECK",
                reason: format!("expected 'lenient' or 'strict', got '{other}'"),
            }),
        }
    }
}

/// Finds the slot a transaction landed in.
pub trait SlotResolver {
    fn slot_of(&self, signature: &str) -> impl Future<Output = Option<u64>> + Send;
}

pub fn range_price(start_slot: u64, end_slot: u64) -> f64 {
    (end_slot - start_slot + 1) as f64 * PRICE_PER_BLOCK_USD
}

/// Inclusive on both ends.
pub fn is_slot_in_range(slot: u64, token: &RangeToken) -> bool {
    slot >= token.start_slot && slot <= token.end_slot
}

pub async fn is_transaction_in_range<S: SlotResolver>(
    signature: &str,
    token: &RangeToken,
    check: SignatureRangeCheck,
    resolver: &S,
) -> bool {
    match check {
        SignatureRangeCheck::Lenient => true,
        SignatureRangeCheck::Strict => resolver
            .slot_of(signature)
            .await
            .is_some_and(|slot| is_slot_in_range(slot, token)),
    }
}

/// Issues range tokens and tracks the purchases still active.
///
/// Expired purchases are dropped whenever a new one is recorded or the active set is read.
#[derive(Debug)]
pub struct RangeAuthority {
    signer: SignedCapability<RangeToken>,
    active: RwLock<HashMap<String, RangeToken>>,
}

impl RangeAuthority {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        RangeAuthority {
            signer: SignedCapability::new(secret),
            active: RwLock::new(HashMap::new()),
        }
    }

    pub fn purchase(&self, request: PurchaseRangeRequest) -> Result<RangePurchase, RangeError> {
        self.purchase_at(request, unix_millis())
    }

    fn purchase_at(
        &self,
        request: PurchaseRangeRequest,
        now_ms: u64,
    ) -> Result<RangePurchase, RangeError> {
        if request.start_slot >= request.end_slot {
            return Err(RangeError::EmptyRange);
        }
        let span = request.end_slot - request.start_slot;
        if span > MAX_RANGE_SPAN {
            return Err(RangeError::TooLarge {
                max: MAX_RANGE_SPAN,
                requested: span,
            });
        }
        if request.duration == 0 {
            return Err(RangeError::ZeroDuration);
        }

        let claims = RangeToken {
            range_id: format!(
                "{}-{}-{}",
                request.start_slot, request.end_slot, request.payer
            ),
            start_slot: request.start_slot,
            end_slot: request.end_slot,
            purchaser: request.payer,
            tx_signature: request.payment_tx_signature,
            issued_at: now_ms,
            expires_at: now_ms.saturating_add(request.duration.saturating_mul(1000)),
        };
        let token = self.signer.sign(&claims)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            range_id = %claims.range_id,
            expires_at = claims.expires_at,
            "Range access issued"
        );

        {
            let mut active = self.active.write();
            active.retain(|_, range| range.expires_at > now_ms);
            active.insert(claims.range_id.clone(), claims.clone());
        }

        Ok(RangePurchase {
            token,
            pricing: RangePricing {
                price_per_block: PRICE_PER_BLOCK_USD,
                total_price: range_price(claims.start_slot, claims.end_slot),
                currency: "USDC".to_string(),
            },
            claims,
        })
    }

    /// The token's claims, if it is authentic and unexpired.
    pub fn validate(&self, token: &str) -> Option<RangeToken> {
        self.signer.verify(token, unix_millis()).ok()
    }

    /// Unexpired purchases made by `payer`.
    pub fn active_ranges(&self, payer: &str) -> Vec<RangeToken> {
        let now = unix_millis();
        let mut active = self.active.write();
        active.retain(|_, range| range.expires_at > now);
        active
            .values()
            .filter(|range| range.purchaser == payer)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start_slot: u64, end_slot: u64, duration: u64) -> PurchaseRangeRequest {
        PurchaseRangeRequest {
            start_slot,
            end_slot,
            duration,
            payment_tx_signature: "5sig".to_string(),
            payer: "wallet".to_string(),
        }
    }

    struct FixedSlots(HashMap<&'static str, u64>);

    impl SlotResolver for FixedSlots {
        async fn slot_of(&self, signature: &str) -> Option<u64> {
            self.0.get(signature).copied()
        }
    }

    #[test]
    fn purchase_prices_and_expires() {
        let authority = RangeAuthority::new("secret");
        let purchase = authority.purchase(request(100, 200, 3600)).unwrap();

        assert!((purchase.pricing.total_price - 0.00101).abs() < 1e-12);
        assert_eq!(purchase.claims.range_id, "100-200-wallet");
        assert_eq!(
            purchase.claims.expires_at - purchase.claims.issued_at,
            3_600_000
        );
        assert_eq!(authority.validate(&purchase.token), Some(purchase.claims));
    }

    #[test]
    fn purchase_rejects_bad_ranges() {
        let authority = RangeAuthority::new("secret");

        assert!(matches!(
            authority.purchase(request(200, 200, 60)),
            Err(RangeError::EmptyRange)
        ));
        assert!(matches!(
            authority.purchase(request(300, 200, 60)),
            Err(RangeError::EmptyRange)
        ));
        assert!(matches!(
            authority.purchase(request(0, 10_001, 60)),
            Err(RangeError::TooLarge { requested: 10_001, .. })
        ));
        assert!(matches!(
            authority.purchase(request(0, 10, 0)),
            Err(RangeError::ZeroDuration)
        ));
        assert!(authority.purchase(request(0, 10_000, 60)).is_ok());
    }

    #[test]
    fn expired_and_tampered_tokens_look_the_same() {
        let authority = RangeAuthority::new("secret");
        let expired = authority
            .purchase_at(request(1, 2, 1), unix_millis() - 10_000)
            .unwrap();
        assert_eq!(authority.validate(&expired.token), None);

        let live = authority.purchase(request(1, 2, 60)).unwrap();
        let mut tampered = live.token.clone();
        tampered.insert(3, 'x');
        assert_eq!(authority.validate(&tampered), None);
    }

    #[test]
    fn slot_bounds_are_inclusive() {
        let authority = RangeAuthority::new("secret");
        let claims = authority.purchase(request(100, 200, 60)).unwrap().claims;

        assert!(is_slot_in_range(100, &claims));
        assert!(is_slot_in_range(200, &claims));
        assert!(!is_slot_in_range(99, &claims));
        assert!(!is_slot_in_range(201, &claims));
    }

    #[tokio::test]
    async fn signature_checks() {
        let authority = RangeAuthority::new("secret");
        let claims = authority.purchase(request(100, 200, 60)).unwrap().claims;
        let resolver = FixedSlots(HashMap::from([("inside", 150), ("outside", 500)]));

        for sig in ["inside", "outside", "unknown"] {
            assert!(
                is_transaction_in_range(sig, &claims, SignatureRangeCheck::Lenient, &resolver)
                    .await
            );
        }

        assert!(is_transaction_in_range("inside", &claims, SignatureRangeCheck::Strict, &resolver).await);
        assert!(!is_transaction_in_range("outside", &claims, SignatureRangeCheck::Strict, &resolver).await);
        assert!(!is_transaction_in_range("unknown", &claims, SignatureRangeCheck::Strict, &resolver).await);
    }

    #[test]
    fn active_ranges_filter_by_wallet_and_expiry() {
        let authority = RangeAuthority::new("secret");
        authority.purchase(request(1, 2, 60)).unwrap();
        authority
            .purchase_at(request(3, 4, 1), unix_millis() - 10_000)
            .unwrap();
        authority
            .purchase(PurchaseRangeRequest {
                payer: "someone-else".to_string(),
                ..request(5, 6, 60)
            })
            .unwrap();

        let active = authority.active_ranges("wallet");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].range_id, "1-2-wallet");
    }

    #[test]
    fn purchases_prune_expired_entries() {
        let authority = RangeAuthority::new("secret");
        let long_ago = unix_millis() - 10_000;
        for start in 0..5 {
            authority
                .purchase_at(request(start, start + 1, 1), long_ago)
                .unwrap();
        }
        assert_eq!(authority.active.read().len(), 5);

        authority.purchase(request(10, 20, 60)).unwrap();

        let active = authority.active.read();
        assert_eq!(active.len(), 1);
        assert!(active.contains_key("10-20-wallet"));
    }

    #[test]
    fn parses_check_names() {
        assert_eq!("strict".parse::<SignatureRangeCheck>().unwrap(), SignatureRangeCheck::Strict);
        assert_eq!("Lenient".parse::<SignatureRangeCheck>().unwrap(), SignatureRangeCheck::Lenient);
        assert!("loose".parse::<SignatureRangeCheck>().is_err());
    }
}
