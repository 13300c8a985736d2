use std::future::Future;

use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

/// The slice of a Solana RPC node the settlement authority depends on.
pub trait SolanaRpc {
    /// Simulate the transaction, failing with the node's reason when it would not succeed.
    fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Submit the transaction as-is and wait until the cluster confirms it.
    fn send_and_confirm(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, String>> + Send;
}

#[cfg(feature = "solana-rpc")]
pub use adapter::RpcClientAdapter;

#[cfg(feature = "solana-rpc")]
mod adapter {
    use solana_rpc_client::nonblocking::rpc_client::RpcClient;

    use super::*;

    /// [`SolanaRpc`] backed by the nonblocking Solana RPC client.
    pub struct RpcClientAdapter {
        client: RpcClient,
    }

    impl RpcClientAdapter {
        pub fn new(url: impl Into<String>) -> Self {
            RpcClientAdapter {
                client: RpcClient::new(url.into()),
            }
        }
    }

    impl std::fmt::Debug for RpcClientAdapter {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RpcClientAdapter")
                .field("url", &self.client.url())
                .finish()
        }
    }

    impl SolanaRpc for RpcClientAdapter {
        async fn simulate(&self, tx: &VersionedTransaction) -> Result<(), String> {
            let response = self
                .client
                .simulate_transaction(tx)
                .await
                .map_err(|e| e.to_string())?;

            match response.value.err {
                Some(err) => Err(format!("Simulation failed: {err:?}")),
                None => Ok(()),
            }
        }

        async fn send_and_confirm(&self, tx: &VersionedTransaction) -> Result<Signature, String> {
            self.client
                .send_and_confirm_transaction(tx)
                .await
                .map_err(|e| e.to_string())
        }
    }
}
