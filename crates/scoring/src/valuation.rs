//! Token metadata and USD conversion of incentive totals.
use std::{collections::BTreeMap, sync::Arc};

use alloy::primitives::{Address, BlockNumber, U256};
use dashmap::DashMap;
use derive_more::Debug;
use extractor::{ChainReader, contracts};
use pricing::{PriceSource, PricingError};
use primitives::{
    ledger::TokenTotals,
    pipeline::process,
    retries::RpcError,
    units::{USD_SCALE_DECIMALS, one_usd, pow10, rate_to_f64, to_f64, usd_value},
};
use tracing::{debug, info, warn};

/// Decimals assumed when `decimals()` cannot be read.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Cached facts about a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// ERC-20 decimals
    pub decimals: u8,
    /// ERC-20 name, or the address when unavailable
    pub name: String,
    /// USD per whole token, scaled by 1e18
    pub usd_rate: U256,
}

/// Tokens with fixed pricing rules.
#[derive(Debug, Clone, Copy)]
pub struct PricingTokens {
    /// USD-pegged quote token, always worth 1.0
    pub honey: Address,
    /// Boost token, priced as the wrapped native token
    pub bgt: Address,
    /// Wrapped native token
    pub wbera: Address,
}

/// USD value of one validator-day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsdValuation {
    /// Value per token name
    pub per_token: BTreeMap<String, f64>,
    /// Exact sum, scaled by 1e18
    pub total: U256,
}

impl UsdValuation {
    /// The total as a float, for display and scoring.
    pub fn total_f64(&self) -> f64 {
        to_f64(self.total, USD_SCALE_DECIMALS)
    }
}

/// Token metadata for the lifetime of a run.
#[derive(Debug)]
pub struct TokenCache {
    #[debug(skip)]
    chain: Arc<dyn ChainReader>,
    #[debug(skip)]
    prices: Arc<dyn PriceSource>,
    tokens: PricingTokens,
    block: BlockNumber,
    decimals: DashMap<Address, u8>,
    metadata: DashMap<Address, TokenMetadata>,
}

impl TokenCache {
    /// Read contract state at `block`, quote through `prices`.
    pub fn new(
        chain: Arc<dyn ChainReader>,
        prices: Arc<dyn PriceSource>,
        tokens: PricingTokens,
        block: BlockNumber,
    ) -> Self {
        Self { chain, prices, tokens, block, decimals: DashMap::new(), metadata: DashMap::new() }
    }

    /// Cached metadata of `token`, if loaded.
    pub fn get(&self, token: &Address) -> Option<TokenMetadata> {
        self.metadata.get(token).map(|m| m.clone())
    }

    async fn decimals(&self, token: Address) -> u8 {
        if let Some(decimals) = self.decimals.get(&token) {
            return *decimals;
        }
        let decimals = contracts::token_decimals(self.chain.as_ref(), token, self.block)
            .await
            .unwrap_or_else(|e| {
                warn!(%token, error = %e, "could not read decimals, assuming {DEFAULT_DECIMALS}");
                DEFAULT_DECIMALS
            });
        self.decimals.insert(token, decimals);
        decimals
    }

    async fn name(&self, token: Address) -> String {
        contracts::token_name(self.chain.as_ref(), token, self.block)
            .await
            .unwrap_or_else(|_| token.to_string())
    }

    async fn quote_rate(&self, token: Address, decimals: u8) -> Result<U256, PricingError> {
        let amount_in = pow10(decimals);
        let out = self.prices.quote(token, self.tokens.honey, amount_in).await?;
        let honey_decimals = self.decimals(self.tokens.honey).await;
        Ok(out.saturating_mul(one_usd()) / pow10(honey_decimals))
    }

    async fn usd_rate(&self, token: Address, decimals: u8) -> U256 {
        if token == self.tokens.honey {
            return one_usd();
        }
        let (priced, priced_decimals) = if token == self.tokens.bgt {
            (self.tokens.wbera, self.decimals(self.tokens.wbera).await)
        } else {
            (token, decimals)
        };

        match self.quote_rate(priced, priced_decimals).await {
            Ok(rate) => rate,
            Err(PricingError::RouteNotFound { .. }) => {
                warn!(%token, "no swap route, valuing at 1 USD");
                one_usd()
            }
            Err(e) => {
                warn!(%token, error = %e, "pricing failed, valuing at 0");
                U256::ZERO
            }
        }
    }

    /// Load metadata of one token.
    pub async fn load(&self, token: Address) -> TokenMetadata {
        if let Some(meta) = self.get(&token) {
            return meta;
        }
        let decimals = self.decimals(token).await;
        let name = self.name(token).await;
        let usd_rate = self.usd_rate(token, decimals).await;
        let meta = TokenMetadata { decimals, name, usd_rate };
        debug!(%token, decimals, name = %meta.name, usd = rate_to_f64(usd_rate), "token metadata");
        self.metadata.insert(token, meta.clone());
        meta
    }

    /// Load every token in `tokens`, `max_concurrency` at a time.
    pub async fn load_all(&self, tokens: impl IntoIterator<Item = Address>, max_concurrency: usize) {
        let tokens: Vec<Address> = tokens.into_iter().collect();
        let count = tokens.len();
        process(
            tokens,
            |token| async move { Ok::<_, RpcError>(self.load(token).await) },
            max_concurrency,
        )
        .await;
        info!(tokens = count, "token metadata loaded");
    }

    /// USD value of `totals`. Tokens that were never loaded are valued at zero.
    pub fn value(&self, totals: &TokenTotals) -> UsdValuation {
        let mut valuation = UsdValuation::default();
        for (token, amount) in totals {
            let Some(meta) = self.get(token) else {
                continue;
            };
            let usd = usd_value(*amount, meta.usd_rate, meta.decimals);
            *valuation.per_token.entry(meta.name).or_default() += to_f64(usd, USD_SCALE_DECIMALS);
            valuation.total = valuation.total.saturating_add(usd);
        }
        valuation
    }
}
