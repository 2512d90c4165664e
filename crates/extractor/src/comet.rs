//! Minimal CometBFT RPC client: block proposers and validator sets.
use alloy::primitives::BlockNumber;
use primitives::{
    retries::{RetryPolicy, RpcError, call_with_retry},
    validator::ConsensusAddress,
};
use reqwest::{Client, Url};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

/// Page size used when walking `/validators`.
pub const VALIDATORS_PER_PAGE: u64 = 100;

/// One entry of the consensus validator set at a given height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusValidator {
    /// Proposer address
    pub address: ConsensusAddress,
    /// Voting power at that height
    pub voting_power: u64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BlockResult {
    block: BlockBody,
}

#[derive(Debug, Deserialize)]
struct BlockBody {
    header: BlockHeader,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    proposer_address: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorsResult {
    validators: Vec<RawValidator>,
    total: String,
}

#[derive(Debug, Deserialize)]
struct RawValidator {
    address: String,
    voting_power: String,
}

/// HTTP client for a CometBFT node.
#[derive(Debug, Clone)]
pub struct CometClient {
    http: Client,
    base: Url,
    retry: RetryPolicy,
}

impl CometClient {
    /// Create a client for the node at `base`.
    pub fn new(mut base: Url, retry: RetryPolicy) -> Self {
        // `Url::join` replaces the last segment unless the path ends with a slash
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http: Client::new(), base, retry }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RpcError> {
        let url = self.base.join(path).map_err(RpcError::fatal)?;
        call_with_retry(&self.retry, || async {
            let resp = self.http.get(url.clone()).query(query).send().await?.error_for_status()?;
            let envelope: Envelope<T> = resp.json().await.map_err(RpcError::fatal)?;
            if let Some(err) = envelope.error {
                return Err(RpcError::Fatal(format!("cometbft error: {err}")));
            }
            envelope.result.ok_or_else(|| RpcError::Transient("empty cometbft result".into()))
        })
        .await
    }

    /// Proposer of block `height`.
    pub async fn block_proposer(&self, height: BlockNumber) -> Result<ConsensusAddress, RpcError> {
        let block: BlockResult = self.get("block", &[("height", height.to_string())]).await?;
        parse_consensus_address(&block.block.header.proposer_address)
    }

    /// Full validator set at `height`, walking every page.
    pub async fn validator_set(
        &self,
        height: BlockNumber,
    ) -> Result<Vec<ConsensusValidator>, RpcError> {
        let mut out = Vec::new();
        let mut page = 1u64;
        loop {
            let result: ValidatorsResult = self
                .get(
                    "validators",
                    &[
                        ("height", height.to_string()),
                        ("page", page.to_string()),
                        ("per_page", VALIDATORS_PER_PAGE.to_string()),
                    ],
                )
                .await?;
            let total: usize = result.total.parse().map_err(RpcError::fatal)?;
            let fetched = result.validators.len();
            for raw in result.validators {
                out.push(ConsensusValidator {
                    address: parse_consensus_address(&raw.address)?,
                    voting_power: raw.voting_power.parse().map_err(RpcError::fatal)?,
                });
            }
            debug!(height, page, fetched, total, "fetched validator page");
            if fetched == 0 || out.len() >= total {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

/// Parse a hex proposer address, with or without `0x`, in any case.
pub fn parse_consensus_address(s: &str) -> Result<ConsensusAddress, RpcError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| RpcError::Fatal(format!("bad address {s}: {e}")))?;
    if bytes.len() != 20 {
        return Err(RpcError::Fatal(format!("bad address length {}: {s}", bytes.len())));
    }
    Ok(ConsensusAddress::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn reads_block_proposer() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/block")
            .match_query(Matcher::UrlEncoded("height".into(), "42".into()))
            .with_status(200)
            .with_body(
                r#"{"jsonrpc":"2.0","id":-1,"result":{"block":{"header":{"height":"42","proposer_address":"0A0B0C0D0E0F101112131415161718191A1B1C1D"}}}}"#,
            )
            .create_async()
            .await;

        let client = CometClient::new(Url::parse(&server.url()).unwrap(), retry());
        let proposer = client.block_proposer(42).await.unwrap();
        assert_eq!(
            proposer,
            parse_consensus_address("0a0b0c0d0e0f101112131415161718191a1b1c1d").unwrap()
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn walks_validator_pages() {
        let mut server = Server::new_async().await;
        let mut page = |n: &str, body: &str| {
            server
                .mock("GET", "/validators")
                .match_query(Matcher::AllOf(vec![
                    Matcher::UrlEncoded("height".into(), "7".into()),
                    Matcher::UrlEncoded("page".into(), n.into()),
                ]))
                .with_status(200)
                .with_body(body.to_owned())
        };
        let first = page(
            "1",
            r#"{"result":{"block_height":"7","validators":[{"address":"0101010101010101010101010101010101010101","voting_power":"250000000000000"}],"count":"1","total":"2"}}"#,
        )
        .create_async()
        .await;
        let second = page(
            "2",
            r#"{"result":{"block_height":"7","validators":[{"address":"0202020202020202020202020202020202020202","voting_power":"500"}],"count":"1","total":"2"}}"#,
        )
        .create_async()
        .await;

        let client = CometClient::new(Url::parse(&server.url()).unwrap(), retry());
        let set = client.validator_set(7).await.unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set[0].voting_power, 250_000_000_000_000);
        assert_eq!(set[1].address, ConsensusAddress::repeat_byte(2));
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn rpc_error_is_fatal() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/block")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"jsonrpc":"2.0","id":-1,"error":{"code":-32603,"message":"height 99 must be less than or equal to the current blockchain height 10"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = CometClient::new(Url::parse(&server.url()).unwrap(), retry());
        let err = client.block_proposer(99).await.unwrap_err();
        assert!(!err.is_transient());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/block")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = CometClient::new(Url::parse(&server.url()).unwrap(), retry());
        let err = client.block_proposer(1).await.unwrap_err();
        assert!(err.is_transient());
        mock.assert_async().await;
    }

    #[test]
    fn rejects_short_addresses() {
        assert!(parse_consensus_address("0xabcd").is_err());
    }
}
