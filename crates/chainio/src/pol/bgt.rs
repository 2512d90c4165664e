//! BGT governance token and boost accounting.
use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IBGT {
        /// Total BGT boost delegated to a validator.
        function boostees(bytes calldata pubkey) external view returns (uint128);
    }
}
