//! Proof-of-Liquidity contracts: reward allocations, incentive events and boosts.
pub mod berachef;
pub mod bgt;
pub mod reward_vault;

use alloy::primitives::Address;

use berachef::IBeraChef::Weight;

/// A single `(receiver, percentage)` entry of a reward allocation, comparable and sortable.
pub type AllocationWeight = (Address, u128);

fn normalized(weights: &[Weight]) -> Vec<AllocationWeight> {
    let mut out: Vec<AllocationWeight> =
        weights.iter().map(|w| (w.receiver, w.percentageNumerator.to::<u128>())).collect();
    out.sort_unstable();
    out
}

/// Whether two allocations distribute to the same receivers with the same weights,
/// regardless of the order the weights are listed in.
pub fn same_allocation(a: &[Weight], b: &[Weight]) -> bool {
    normalized(a) == normalized(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::aliases::U96;

    fn weight(byte: u8, pct: u64) -> Weight {
        Weight { receiver: Address::repeat_byte(byte), percentageNumerator: U96::from(pct) }
    }

    #[test]
    fn order_does_not_matter() {
        let a = vec![weight(1, 6_000), weight(2, 4_000)];
        let b = vec![weight(2, 4_000), weight(1, 6_000)];
        assert!(same_allocation(&a, &b));
    }

    #[test]
    fn different_weights_differ() {
        let a = vec![weight(1, 6_000), weight(2, 4_000)];
        let b = vec![weight(1, 5_000), weight(2, 5_000)];
        assert!(!same_allocation(&a, &b));
        assert!(!same_allocation(&a, &a[..1]));
    }
}
