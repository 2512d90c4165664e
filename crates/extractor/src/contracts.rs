//! Typed contract reads on top of [`ChainReader::call`].
use alloy::{
    primitives::{Address, BlockNumber, Bytes},
    sol_types::SolCall,
};
use chainio::{
    IBGT::boosteesCall,
    IBeraChef::{Weight, getActiveRewardAllocationCall, getDefaultRewardAllocationCall},
    IERC20Metadata::{decimalsCall, nameCall},
};
use primitives::{retries::RpcError, validator::Pubkey};

use crate::ChainReader;

/// Encode `call`, execute it against `to` at `block` and decode the return value.
pub async fn read<C: SolCall + Send + Sync>(
    chain: &dyn ChainReader,
    to: Address,
    call: &C,
    block: BlockNumber,
) -> Result<C::Return, RpcError> {
    let data = chain.call(to, Bytes::from(call.abi_encode()), block).await?;
    C::abi_decode_returns(&data)
        .map_err(|e| RpcError::Fatal(format!("decoding {} return: {e}", C::SIGNATURE)))
}

/// Weights of the validator's active reward allocation.
pub async fn active_allocation(
    chain: &dyn ChainReader,
    berachef: Address,
    pubkey: &Pubkey,
    block: BlockNumber,
) -> Result<Vec<Weight>, RpcError> {
    let call = getActiveRewardAllocationCall { valPubkey: Bytes::copy_from_slice(pubkey.as_slice()) };
    Ok(read(chain, berachef, &call, block).await?.weights)
}

/// Weights of the network's default reward allocation.
pub async fn default_allocation(
    chain: &dyn ChainReader,
    berachef: Address,
    block: BlockNumber,
) -> Result<Vec<Weight>, RpcError> {
    Ok(read(chain, berachef, &getDefaultRewardAllocationCall {}, block).await?.weights)
}

/// BGT boost delegated to the validator, in wei.
pub async fn boostees(
    chain: &dyn ChainReader,
    bgt: Address,
    pubkey: &Pubkey,
    block: BlockNumber,
) -> Result<u128, RpcError> {
    let call = boosteesCall { pubkey: Bytes::copy_from_slice(pubkey.as_slice()) };
    read(chain, bgt, &call, block).await
}

/// ERC-20 `decimals()`.
pub async fn token_decimals(
    chain: &dyn ChainReader,
    token: Address,
    block: BlockNumber,
) -> Result<u8, RpcError> {
    read(chain, token, &decimalsCall {}, block).await
}

/// ERC-20 `name()`.
pub async fn token_name(
    chain: &dyn ChainReader,
    token: Address,
    block: BlockNumber,
) -> Result<String, RpcError> {
    read(chain, token, &nameCall {}, block).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use alloy::primitives::{U256, aliases::U96};
    use chainio::IBeraChef::RewardAllocation;

    #[tokio::test]
    async fn reads_default_allocation() {
        let berachef = Address::repeat_byte(0xbe);
        let weights = vec![Weight {
            receiver: Address::repeat_byte(1),
            percentageNumerator: U96::from(10_000u64),
        }];
        let mut chain = MockChain::new(vec![0, 10, 20]);
        chain.respond(
            berachef,
            &getDefaultRewardAllocationCall {},
            RewardAllocation { startBlock: 1, weights: weights.clone() },
        );

        let got = default_allocation(&chain, berachef, 2).await.unwrap();
        assert_eq!(got, weights);
    }

    #[tokio::test]
    async fn reads_boost_and_metadata() {
        let bgt = Address::repeat_byte(0xb6);
        let token = Address::repeat_byte(0x70);
        let pubkey = Pubkey::repeat_byte(7);
        let mut chain = MockChain::new(vec![0, 10]);
        chain.respond(
            bgt,
            &boosteesCall { pubkey: Bytes::copy_from_slice(pubkey.as_slice()) },
            5_000_000_000_000_000_000u128,
        );
        chain.respond(token, &decimalsCall {}, U256::from(6));
        chain.respond(token, &nameCall {}, String::from("USD Coin"));

        assert_eq!(boostees(&chain, bgt, &pubkey, 1).await.unwrap(), 5_000_000_000_000_000_000);
        assert_eq!(token_decimals(&chain, token, 1).await.unwrap(), 6);
        assert_eq!(token_name(&chain, token, 1).await.unwrap(), "USD Coin");
    }

    #[tokio::test]
    async fn unknown_call_is_fatal() {
        let chain = MockChain::new(vec![0, 10]);
        let err = token_decimals(&chain, Address::repeat_byte(3), 1).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
