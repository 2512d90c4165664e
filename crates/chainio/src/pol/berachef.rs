//! BeraChef: validator reward allocations.
use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IBeraChef {
        /// A receiving vault and its share of the reward, in basis points of 10_000.
        #[derive(Default, PartialEq, Eq)]
        struct Weight {
            address receiver;
            uint96 percentageNumerator;
        }

        #[derive(Default, PartialEq, Eq)]
        struct RewardAllocation {
            uint64 startBlock;
            Weight[] weights;
        }

        /// Emitted when a queued allocation becomes the validator's active allocation.
        event ActivateRewardAllocation(bytes indexed valPubkey, uint64 startBlock, Weight[] weights);

        function getActiveRewardAllocation(bytes calldata valPubkey) external view returns (RewardAllocation memory);

        function getDefaultRewardAllocation() external view returns (RewardAllocation memory);
    }
}
