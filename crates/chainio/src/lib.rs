//! `ChainIO` is a library for interacting with on-chain contracts.
pub mod pol;
pub mod token;

use alloy::providers::{RootProvider, fillers::FillProvider, utils::JoinedRecommendedFillers};

pub use pol::{
    AllocationWeight, berachef::IBeraChef, bgt::IBGT, reward_vault::IRewardVault,
    same_allocation,
};
pub use token::IERC20Metadata;

/// Alias to the default provider with all recommended fillers (read-only).
pub type DefaultProvider = FillProvider<JoinedRecommendedFillers, RootProvider>;
