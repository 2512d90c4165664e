//! Chunked `eth_getLogs` over a block window.
use std::{collections::HashMap, sync::Arc};

use alloy::primitives::{B256, BlockNumber};
use alloy_rpc_types_eth::{Filter, Log};
use extractor::ChainReader;
use primitives::{
    pipeline::MultiProvider, retries::RpcError, validator::Pubkey, window::chunk_range,
};
use tracing::debug;

/// Topic hash of each tracked validator's pubkey.
pub type IdentityIndex = HashMap<B256, Pubkey>;

/// Run `filter` over `[start, end]` in chunks of `chunk_size` blocks and fold each chunk's
/// logs with `fold`. Chunks that fail after retries yield `None`.
pub async fn scan_chunks<R, F>(
    providers: &MultiProvider<dyn ChainReader>,
    filter: &Filter,
    (start, end): (BlockNumber, BlockNumber),
    chunk_size: u64,
    fold: F,
) -> Vec<Option<R>>
where
    F: Fn(Vec<Log>) -> R,
{
    let chunks = chunk_range(start, end, chunk_size);
    debug!(start, end, chunks = chunks.len(), "scanning logs");
    let fold = &fold;
    providers
        .process(chunks, |chain: Arc<dyn ChainReader>, (from, to)| {
            let filter = filter.clone().from_block(from).to_block(to);
            async move {
                let logs = chain.get_logs(&filter).await?;
                Ok::<_, RpcError>(fold(logs))
            }
        })
        .await
}

/// The tracked validator a log is about, read from topic 1.
pub fn tracked_validator<'a>(log: &Log, index: &'a IdentityIndex) -> Option<&'a Pubkey> {
    log.topics().get(1).and_then(|topic| index.get(topic))
}
