//! Token quotes from a swap-routing API.
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use derive_more::Debug;
use primitives::retries::{RetryPolicy, RpcError, call_with_retry};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Failure to obtain a quote.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The router has no path between the two tokens.
    #[error("no swap route from {token_in} to {token_out}")]
    RouteNotFound {
        /// Input token
        token_in: Address,
        /// Output token
        token_out: Address,
    },
    /// The request failed after retries.
    #[error(transparent)]
    Request(#[from] RpcError),
    /// The response could not be understood.
    #[error("invalid quote response: {0}")]
    Decode(String),
}

/// Something that can quote `amount` of one token in another.
#[async_trait]
pub trait PriceSource: Send + Sync + std::fmt::Debug {
    /// Amount of `token_out`, in its smallest unit, received for `amount` of `token_in`.
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<U256, PricingError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapQuote {
    assumed_amount_out: String,
}

/// HTTP client for `GET {base}/v1/swap`.
#[derive(Debug, Clone)]
pub struct PricingClient {
    http: Client,
    base: Url,
    #[debug(skip)]
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl PricingClient {
    /// Create a new client. `api_key` is sent as a bearer token when present.
    pub fn new(base: Url, api_key: Option<String>, retry: RetryPolicy) -> Self {
        Self { http: Client::new(), base, api_key, retry }
    }
}

#[async_trait]
impl PriceSource for PricingClient {
    async fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<U256, PricingError> {
        let url = self.base.join("v1/swap").map_err(|e| PricingError::Decode(e.to_string()))?;
        let query = [
            ("tokenIn", token_in.to_string()),
            ("tokenOut", token_out.to_string()),
            ("amount", amount.to_string()),
        ];

        let quote = call_with_retry(&self.retry, || async {
            let mut req = self.http.get(url.clone()).query(&query);
            if let Some(key) = &self.api_key {
                req = req.bearer_auth(key);
            }
            let resp = req.send().await?;
            if resp.status() == StatusCode::BAD_REQUEST {
                return Ok(None);
            }
            let quote: SwapQuote = resp.error_for_status()?.json().await.map_err(RpcError::fatal)?;
            Ok(Some(quote))
        })
        .await?
        .ok_or(PricingError::RouteNotFound { token_in, token_out })?;

        debug!(%token_in, %token_out, %amount, out = %quote.assumed_amount_out, "swap quote");
        quote
            .assumed_amount_out
            .parse::<U256>()
            .map_err(|e| PricingError::Decode(format!("{}: {e}", quote.assumed_amount_out)))
    }
}
