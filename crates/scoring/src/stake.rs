//! Daily stake and BGT boost of every validator, read at each day's last block.
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy::primitives::{Address, BlockNumber, U256};
use chrono::NaiveDate;
use extractor::{ChainReader, contracts};
use primitives::{
    pipeline::MultiProvider,
    units::to_f64,
    validator::{ConsensusAddress, Pubkey, Validator},
    window::DayRanges,
};
use tracing::{info, warn};

/// Voting power is denominated in gwei of the native token.
pub const VOTING_POWER_DECIMALS: u8 = 9;

/// BGT has 18 decimals.
pub const BGT_DECIMALS: u8 = 18;

/// Stake and boost of one validator on one day, in whole tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StakeEntry {
    /// Native tokens staked
    pub stake: f64,
    /// BGT boosting the validator
    pub boost: f64,
}

/// `date -> pubkey -> stake/boost`.
#[derive(Debug, Clone, Default)]
pub struct StakeSnapshot {
    days: BTreeMap<NaiveDate, HashMap<Pubkey, StakeEntry>>,
}

impl StakeSnapshot {
    /// Entry for `(date, pubkey)`, zero when unknown.
    pub fn get(&self, date: NaiveDate, pubkey: &Pubkey) -> StakeEntry {
        self.days.get(&date).and_then(|d| d.get(pubkey)).copied().unwrap_or_default()
    }

    /// Stake on the latest day that has one.
    pub fn latest_stake(&self, pubkey: &Pubkey) -> f64 {
        self.days.values().rev().find_map(|d| d.get(pubkey)).map(|e| e.stake).unwrap_or_default()
    }

    fn entry(&mut self, date: NaiveDate, pubkey: Pubkey) -> &mut StakeEntry {
        self.days.entry(date).or_default().entry(pubkey).or_default()
    }
}

/// Days on which a validator was absent from the consensus set.
pub type InactiveDays = HashMap<Pubkey, Vec<NaiveDate>>;

/// Read voting power and boosts for every validator and day.
///
/// If the validator set of a day cannot be read, the registry's last-known voting power is
/// used for that day. A failed boost read counts as zero boost.
pub async fn snapshot_stakes(
    providers: &MultiProvider<dyn ChainReader>,
    validators: &[Validator],
    days: &DayRanges,
    bgt: Address,
) -> (StakeSnapshot, InactiveDays) {
    let mut snapshot = StakeSnapshot::default();
    let mut inactive = InactiveDays::new();

    let day_blocks: Vec<(NaiveDate, BlockNumber)> =
        days.iter().map(|d| (d.date, d.end_block)).collect();
    let sets = providers
        .process(day_blocks.clone(), |chain: Arc<dyn ChainReader>, (_, block)| async move {
            chain.validator_set(block).await
        })
        .await;

    for ((date, block), set) in day_blocks.iter().zip(sets) {
        let powers: Option<HashMap<ConsensusAddress, u64>> =
            set.map(|set| set.into_iter().map(|v| (v.address, v.voting_power)).collect());
        if powers.is_none() {
            warn!(%date, block, "validator set unavailable, using registry voting power");
        }
        for validator in validators {
            let power = match &powers {
                Some(powers) => match powers.get(&validator.proposer_address) {
                    Some(power) => *power,
                    None => {
                        inactive.entry(validator.pubkey).or_default().push(*date);
                        0
                    }
                },
                None => validator.voting_power,
            };
            snapshot.entry(*date, validator.pubkey).stake =
                to_f64(U256::from(power), VOTING_POWER_DECIMALS);
        }
    }

    let reads: Vec<(NaiveDate, BlockNumber, Pubkey)> = day_blocks
        .iter()
        .flat_map(|(date, block)| validators.iter().map(move |v| (*date, *block, v.pubkey)))
        .collect();
    let boosts = providers
        .process(reads.clone(), |chain: Arc<dyn ChainReader>, (_, block, pubkey)| async move {
            contracts::boostees(chain.as_ref(), bgt, &pubkey, block).await
        })
        .await;
    for ((date, _, pubkey), boost) in reads.into_iter().zip(boosts) {
        snapshot.entry(date, pubkey).boost =
            boost.map(|b| to_f64(U256::from(b), BGT_DECIMALS)).unwrap_or_default();
    }

    info!(days = days.len(), validators = validators.len(), "stake snapshot complete");
    (snapshot, inactive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;
    use chainio::IBGT::boosteesCall;
    use extractor::{ConsensusValidator, mock::MockChain};
    use primitives::window::DayRange;

    fn validator(byte: u8, voting_power: u64) -> Validator {
        Validator {
            name: format!("v{byte}"),
            pubkey: Pubkey::repeat_byte(byte),
            proposer_address: ConsensusAddress::repeat_byte(byte),
            operator: Address::repeat_byte(byte),
            voting_power,
        }
    }

    fn days() -> DayRanges {
        let d = |n| NaiveDate::from_ymd_opt(2025, 3, n).unwrap();
        DayRanges::new(vec![
            DayRange { date: d(1), start_block: 1, end_block: 10 },
            DayRange { date: d(2), start_block: 11, end_block: 20 },
        ])
        .unwrap()
    }

    fn boost_call(v: &Validator) -> boosteesCall {
        boosteesCall { pubkey: Bytes::copy_from_slice(v.pubkey.as_slice()) }
    }

    #[tokio::test]
    async fn reads_stake_and_boost_per_day() {
        let bgt = Address::repeat_byte(0xb6);
        let a = validator(1, 0);
        let b = validator(2, 0);

        let mut chain = MockChain::with_block_time(0, 2, 20);
        chain.set_validator_set(
            1,
            vec![
                ConsensusValidator { address: a.proposer_address, voting_power: 250_000_000_000_000 },
                ConsensusValidator { address: b.proposer_address, voting_power: 500_000_000_000_000 },
            ],
        );
        // b leaves the set on day two
        chain.set_validator_set(
            15,
            vec![ConsensusValidator { address: a.proposer_address, voting_power: 300_000_000_000_000 }],
        );
        chain.respond(bgt, &boost_call(&a), 1_500_000_000_000_000_000_000u128);

        let chain: Arc<dyn ChainReader> = Arc::new(chain);
        let providers = MultiProvider::single(chain, 4);
        let ranges = days();
        let (snapshot, inactive) =
            snapshot_stakes(&providers, &[a.clone(), b.clone()], &ranges, bgt).await;

        let day1 = ranges.dates()[0];
        let day2 = ranges.dates()[1];
        assert_eq!(snapshot.get(day1, &a.pubkey), StakeEntry { stake: 250_000.0, boost: 1_500.0 });
        assert_eq!(snapshot.get(day1, &b.pubkey).stake, 500_000.0);
        // boost read reverted for b
        assert_eq!(snapshot.get(day1, &b.pubkey).boost, 0.0);
        assert_eq!(snapshot.get(day2, &a.pubkey).stake, 300_000.0);
        assert_eq!(snapshot.get(day2, &b.pubkey).stake, 0.0);
        assert_eq!(inactive[&b.pubkey], vec![day2]);
        assert_eq!(snapshot.latest_stake(&a.pubkey), 300_000.0);
    }
}
