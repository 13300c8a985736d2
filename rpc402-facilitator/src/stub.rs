use std::convert::Infallible;

use rand::Rng;
use rpc402_core::{
    facilitator::{
        Facilitator, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest,
        VerifyResponse,
    },
    types::{Network, unix_millis},
};

/// A facilitator that accepts every payment without looking at it.
///
/// Settlement returns a synthetic base58 signature of 64 random bytes. Only meant for
/// local development against a gateway.
#[derive(Debug, Clone, Default)]
pub struct StubFacilitator {
    pub network: Network,
}

impl StubFacilitator {
    pub fn new(network: Network) -> Self {
        StubFacilitator { network }
    }
}

fn synthetic_signature() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes[..]);
    bs58::encode(bytes).into_string()
}

impl Facilitator for StubFacilitator {
    type Error = Infallible;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        Ok(SupportedResponse {
            version: 1,
            scheme: vec!["exact".to_string()],
            network: vec![self.network],
            fee_payer: String::new(),
        })
    }

    async fn verify(&self, _request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        Ok(VerifyResponse::valid(None))
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        #[cfg(feature = "tracing")]
        tracing::warn!(invoice_id = %request.payment.invoice_id, "Stub settlement, no funds moved");

        Ok(SettleResponse {
            signature: synthetic_signature(),
            timestamp: unix_millis(),
        })
    }
}
