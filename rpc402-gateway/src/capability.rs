//! Signed, self-expiring capabilities.
//!
//! A capability is a set of serde claims and an HMAC-SHA256 tag, encoded as
//! `base64url(json(claims)) "." base64url(tag)`. Holding a valid, unexpired token is
//! the whole authorization; there is no revocation list.

use std::marker::PhantomData;

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;

use crate::errors::CapabilityError;

type HmacSha256 = Hmac<Sha256>;

/// Claims that carry their own expiry.
pub trait Expiring {
    /// Milliseconds since the unix epoch after which the claims are void.
    fn expires_at(&self) -> u64;
}

/// Issues and checks capabilities carrying claims of type `C`.
pub struct SignedCapability<C> {
    secret: Vec<u8>,
    _claims: PhantomData<fn() -> C>,
}

impl<C> std::fmt::Debug for SignedCapability<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCapability").finish_non_exhaustive()
    }
}

impl<C> SignedCapability<C>
where
    C: Serialize + DeserializeOwned + Expiring,
{
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        SignedCapability {
            secret: secret.as_ref().to_vec(),
            _claims: PhantomData,
        }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, CapabilityError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| CapabilityError::InvalidKey)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, claims: &C) -> Result<String, CapabilityError> {
        let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let tag = self.mac(&payload)?.finalize().into_bytes();
        Ok(format!("{payload}.{}", BASE64_URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Check the tag and the expiry against `now_ms`, returning the claims.
    pub fn verify(&self, token: &str, now_ms: u64) -> Result<C, CapabilityError> {
        let (payload, tag) = token
            .trim()
            .split_once('.')
            .ok_or(CapabilityError::Malformed)?;
        let tag = BASE64_URL_SAFE_NO_PAD.decode(tag)?;

        self.mac(payload)?
            .verify_slice(&tag)
            .map_err(|_| CapabilityError::BadSignature)?;

        let claims: C = serde_json::from_slice(&BASE64_URL_SAFE_NO_PAD.decode(payload)?)?;
        if claims.expires_at() <= now_ms {
            return Err(CapabilityError::Expired);
        }
        Ok(claims)
    }
}
