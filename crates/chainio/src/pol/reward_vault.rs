//! Reward vaults emit one `IncentivesProcessed` per incentive token paid for a validator.
use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IRewardVault {
        event IncentivesProcessed(
            bytes indexed pubkey,
            address indexed token,
            uint256 bgtEmitted,
            uint256 amount
        );
    }
}
