//! ERC-20 metadata
use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[derive(Debug)]
    interface IERC20Metadata {
        function name() external view returns (string memory);
        function decimals() external view returns (uint8);
    }
}
