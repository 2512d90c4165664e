//! Valscope Extractor
//!
//! Read-only access to the execution layer (alloy HTTP provider) and the consensus layer
//! (CometBFT RPC), behind the [`ChainReader`] trait. Every call goes through
//! [`call_with_retry`] with the configured [`RetryPolicy`].
pub mod comet;
pub mod contracts;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use alloy::{
    primitives::{Address, BlockNumber, Bytes},
    providers::{Provider, ProviderBuilder},
};
use alloy_rpc_client::ClientBuilder;
use alloy_rpc_types_eth::{
    BlockId, BlockNumberOrTag, Filter, Log, TransactionInput, TransactionRequest,
};
use async_trait::async_trait;
use chainio::DefaultProvider;
use derive_more::Debug;
use primitives::{
    retries::{RetryPolicy, RpcError, call_with_retry},
    validator::ConsensusAddress,
};
use url::Url;

pub use comet::{CometClient, ConsensusValidator};

/// Everything the scoring engine reads from the chain.
#[async_trait]
pub trait ChainReader: Send + Sync + std::fmt::Debug {
    /// Current head of the execution chain.
    async fn latest_block_number(&self) -> Result<BlockNumber, RpcError>;

    /// Timestamp (UNIX seconds) of block `number`.
    async fn block_timestamp(&self, number: BlockNumber) -> Result<u64, RpcError>;

    /// Number of transactions included in block `number`.
    async fn block_transaction_count(&self, number: BlockNumber) -> Result<u64, RpcError>;

    /// Consensus proposer of block `number`.
    async fn block_proposer(&self, number: BlockNumber) -> Result<ConsensusAddress, RpcError>;

    /// Consensus validator set at block `number`.
    async fn validator_set(
        &self,
        number: BlockNumber,
    ) -> Result<Vec<ConsensusValidator>, RpcError>;

    /// Logs matching `filter`.
    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError>;

    /// `eth_call` of `data` against `to` at block `number`.
    async fn call(&self, to: Address, data: Bytes, number: BlockNumber) -> Result<Bytes, RpcError>;
}

/// [`ChainReader`] backed by an execution RPC and a CometBFT RPC.
#[derive(Debug)]
pub struct RpcChainClient {
    #[debug(skip)]
    provider: DefaultProvider,
    comet: CometClient,
    retry: RetryPolicy,
}

impl RpcChainClient {
    /// Connect to the execution endpoint `el_url` and the consensus endpoint `cl_url`.
    pub fn new(el_url: Url, cl_url: Url, retry: RetryPolicy) -> Self {
        let client = ClientBuilder::default().http(el_url);
        let provider = ProviderBuilder::new().connect_client(client);
        let comet = CometClient::new(cl_url, retry);
        Self { provider, comet, retry }
    }

    async fn block_header(&self, number: BlockNumber) -> Result<(u64, u64), RpcError> {
        call_with_retry(&self.retry, || async move {
            let block = self
                .provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .hashes()
                .await?
                .ok_or_else(|| RpcError::Transient(format!("block {number} not found")))?;
            Ok((block.header.timestamp, block.transactions.len() as u64))
        })
        .await
    }
}

#[async_trait]
impl ChainReader for RpcChainClient {
    async fn latest_block_number(&self) -> Result<BlockNumber, RpcError> {
        call_with_retry(&self.retry, || async { Ok(self.provider.get_block_number().await?) })
            .await
    }

    async fn block_timestamp(&self, number: BlockNumber) -> Result<u64, RpcError> {
        Ok(self.block_header(number).await?.0)
    }

    async fn block_transaction_count(&self, number: BlockNumber) -> Result<u64, RpcError> {
        Ok(self.block_header(number).await?.1)
    }

    async fn block_proposer(&self, number: BlockNumber) -> Result<ConsensusAddress, RpcError> {
        self.comet.block_proposer(number).await
    }

    async fn validator_set(
        &self,
        number: BlockNumber,
    ) -> Result<Vec<ConsensusValidator>, RpcError> {
        self.comet.validator_set(number).await
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        call_with_retry(&self.retry, || async { Ok(self.provider.get_logs(filter).await?) }).await
    }

    async fn call(&self, to: Address, data: Bytes, number: BlockNumber) -> Result<Bytes, RpcError> {
        let tx = TransactionRequest::default().to(to).input(TransactionInput::new(data));
        call_with_retry(&self.retry, || {
            let tx = tx.clone();
            async move { Ok(self.provider.call(tx).block(BlockId::number(number)).await?) }
        })
        .await
    }
}
