use std::{sync::Arc, time::Duration};

use bon::Builder;
use rpc402_core::{
    facilitator::{
        Facilitator, SettleRequest, SettleResponse, SupportedResponse, VerifyRequest,
        VerifyResponse,
    },
    types::{Network, unix_millis},
};

use crate::{
    errors::FacilitatorError,
    policy::PolicyCheck,
    rpc::SolanaRpc,
    svm::{self, InvalidPayment},
};

/// The settlement authority for Solana `exact`-scheme payments.
///
/// Verification is purely structural plus one policy check. Settlement submits the
/// caller's signed transaction unchanged.
#[derive(Builder, Debug)]
pub struct SolanaFacilitator<R, P> {
    rpc: Arc<R>,
    policy: P,
    #[builder(default)]
    network: Network,
    #[builder(into)]
    fee_payer: String,
    #[builder(default = crate::config::DEFAULT_SETTLE_TIMEOUT)]
    settle_timeout: Duration,
}

impl<R, P> SolanaFacilitator<R, P>
where
    R: SolanaRpc + Send + Sync,
    P: PolicyCheck + Send + Sync,
{
    async fn check(&self, request: &VerifyRequest) -> Result<String, String> {
        let tx = svm::decode_transaction(&request.payment.transaction)
            .map_err(|err| err.to_string())?;
        svm::check_signatures(&tx).map_err(|err| err.to_string())?;

        if request.payment.invoice_id != request.requirements.invoice_id {
            return Err("Invoice mismatch".to_string());
        }
        if request.payment.network != self.network {
            return Err(format!(
                "Network mismatch: {} != {}",
                request.payment.network, self.network
            ));
        }

        let ix = svm::find_token_instruction(&tx).map_err(|err| err.to_string())?;
        #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
        let transfer =
            svm::check_transfer(&ix, &request.requirements).map_err(|err| err.to_string())?;

        self.policy
            .approve(&tx)
            .await
            .map_err(|reason| format!("Transaction rejected by policy ({reason})"))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            invoice_id = %request.payment.invoice_id,
            amount = transfer.amount,
            destination = %transfer.destination,
            "Payment passed verification"
        );

        svm::fee_payer(&tx)
            .map(|pk| pk.to_string())
            .ok_or_else(|| InvalidPayment::MissingSignatures.to_string())
    }
}

impl<R, P> Facilitator for SolanaFacilitator<R, P>
where
    R: SolanaRpc + Send + Sync,
    P: PolicyCheck + Send + Sync,
{
    type Error = FacilitatorError;

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        Ok(SupportedResponse {
            version: 1,
            scheme: vec!["exact".to_string()],
            network: vec![self.network],
            fee_payer: self.fee_payer.clone(),
        })
    }

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        match self.check(request).await {
            Ok(payer) => Ok(VerifyResponse::valid(Some(payer))),
            Err(reason) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(invoice_id = %request.payment.invoice_id, %reason, "Payment rejected");
                Ok(VerifyResponse::invalid(reason))
            }
        }
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let tx = svm::decode_transaction(&request.payment.transaction)
            .map_err(|err| FacilitatorError::InvalidTransaction(err.to_string()))?;

        let signature = tokio::time::timeout(self.settle_timeout, self.rpc.send_and_confirm(&tx))
            .await
            .map_err(|_| FacilitatorError::ConfirmationTimeout(self.settle_timeout))?
            .map_err(FacilitatorError::BroadcastRejected)?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            invoice_id = %request.payment.invoice_id,
            %signature,
            "Payment settled"
        );

        Ok(SettleResponse {
            signature: signature.to_string(),
            timestamp: unix_millis(),
        })
    }
}
