use std::collections::HashSet;

use super::TransactionInfo;

/// Estimates network-wide active addresses from a recent transaction sample.
pub trait ActiveAddressEstimator: Send + Sync {
    fn estimate(&self, sample: &[TransactionInfo]) -> u64;
}

/// Counts distinct senders and receivers in the sample and scales the count
/// by `factor` to extrapolate from the sample to the network.
#[derive(Debug, Clone, Copy)]
pub struct DistinctAddressEstimator {
    pub factor: u64,
}

impl Default for DistinctAddressEstimator {
    fn default() -> Self {
        Self { factor: 10 }
    }
}

impl ActiveAddressEstimator for DistinctAddressEstimator {
    fn estimate(&self, sample: &[TransactionInfo]) -> u64 {
        let distinct: HashSet<&str> = sample
            .iter()
            .flat_map(|tx| [tx.from_address.as_deref(), tx.to_address.as_deref()])
            .flatten()
            .collect();
        distinct.len() as u64 * self.factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solana::transaction::tests::transfer;

    #[test]
    fn counts_distinct_addresses_times_factor() {
        let sample = vec![transfer("a", "b", 1), transfer("b", "c", 1), transfer("a", "c", 1)];
        assert_eq!(DistinctAddressEstimator::default().estimate(&sample), 30);
        assert_eq!(DistinctAddressEstimator { factor: 1 }.estimate(&sample), 3);
    }

    #[test]
    fn empty_sample_estimates_zero() {
        assert_eq!(DistinctAddressEstimator::default().estimate(&[]), 0);
    }
}
