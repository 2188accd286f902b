// oasys-consensus/src/beacon.rs

//! Wall-clock timestamp to block header resolution.
//!
//! The auxiliary beacon APIs need the header whose time equals a given unix
//! timestamp. The chain is only reachable through point lookups, so the
//! search brackets the target between a low and a high header, estimates the
//! next probe from the observed average block time, and narrows until the
//! exact header surfaces. Peers running the older linear tail-scan return
//! the same header number for any timestamp; only the probe trace differs.

use crate::EngineError;
use oasys_chain::header::Header;
use oasys_chain::traits::ChainHeaderReader;
use std::sync::atomic::{AtomicBool, Ordering};

/// Find the header with `time == ts`. Cancellation is checked between
/// backend calls; there is no internal timeout.
pub fn find_header_by_time(
    chain: &dyn ChainHeaderReader,
    ts: u64,
    cancel: &AtomicBool,
) -> Result<Header, EngineError> {
    let head = chain.current_header();
    if ts == head.time {
        return Ok(head);
    }
    if ts > head.time {
        return Err(EngineError::TimestampInFuture);
    }

    let mut average_block_time = chain.chain_config().oasys.period.max(1);
    let mut low: Option<Header> = None;
    let mut high = head.clone();
    let mut cursor = head;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        if high.number == 0 {
            return Err(EngineError::TimestampBeforeGenesis);
        }
        if let Some(low) = &low {
            if high.number - low.number <= 1 {
                return Err(EngineError::NoHeaderAtTimestamp(ts));
            }
        }

        let drift = ts as i128 - cursor.time as i128;
        let mut estimate = cursor.number as i128 + drift / average_block_time as i128;
        let lower_bound = low.as_ref().map_or(0, |l| l.number as i128 + 1);
        let upper_bound = high.number as i128 - 1;
        estimate = estimate.clamp(lower_bound, upper_bound);

        let probe = chain
            .get_header_by_number(estimate as u64)
            .ok_or(EngineError::UnknownAncestor)?;
        if probe.time == ts {
            return Ok(probe);
        }

        if probe.time < ts {
            low = Some(probe.clone());
        } else {
            high = probe.clone();
        }
        cursor = probe;

        if let Some(low) = &low {
            if high.number > low.number {
                average_block_time =
                    ((high.time - low.time) / (high.number - low.number)).max(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oasys_chain::config::ChainConfig;
    use oasys_crypto::Hash;
    use std::sync::atomic::AtomicUsize;

    /// Headers synthesized from a timestamp table; counts backend fetches
    struct TimeChain {
        config: ChainConfig,
        times: Vec<u64>,
        fetches: AtomicUsize,
    }

    impl TimeChain {
        fn with_spacing(config: ChainConfig, count: u64, spacing: &[u64], start: u64) -> Self {
            let mut times = Vec::with_capacity(count as usize);
            let mut t = start;
            for i in 0..count {
                times.push(t);
                t += spacing[(i as usize) % spacing.len()];
            }
            Self {
                config,
                times,
                fetches: AtomicUsize::new(0),
            }
        }

        fn synthesize(&self, number: u64) -> Header {
            Header {
                number,
                time: self.times[number as usize],
                ..Default::default()
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::Relaxed)
        }
    }

    impl ChainHeaderReader for TimeChain {
        fn chain_config(&self) -> &ChainConfig {
            &self.config
        }
        fn get_header(&self, _hash: &Hash, number: u64) -> Option<Header> {
            self.get_header_by_number(number)
        }
        fn get_header_by_number(&self, number: u64) -> Option<Header> {
            if (number as usize) < self.times.len() {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                Some(self.synthesize(number))
            } else {
                None
            }
        }
        fn get_header_by_hash(&self, _hash: &Hash) -> Option<Header> {
            None
        }
        fn get_canonical_hash(&self, number: u64) -> Option<Hash> {
            self.get_header_by_number(number).map(|h| h.hash())
        }
        fn current_header(&self) -> Header {
            self.synthesize(self.times.len() as u64 - 1)
        }
    }

    fn no_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn test_head_itself() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 100, &[6], 1_000);
        let head_time = chain.current_header().time;
        let found = find_header_by_time(&chain, head_time, &no_cancel()).unwrap();
        assert_eq!(found.number, 99);
    }

    #[test]
    fn test_future_time_is_rejected() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 100, &[6], 1_000);
        let head_time = chain.current_header().time;
        assert!(matches!(
            find_header_by_time(&chain, head_time + 1, &no_cancel()),
            Err(EngineError::TimestampInFuture)
        ));
    }

    #[test]
    fn test_stable_growth_resolves_in_few_probes() {
        // 100 headers six seconds apart; the first estimate lands exactly
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 100, &[6], 1_000);
        let target_time = 1_000 + 10 * 6;

        let found = find_header_by_time(&chain, target_time, &no_cancel()).unwrap();
        assert_eq!(found.number, 10);
        assert!(
            chain.fetch_count() <= 6,
            "took {} probes",
            chain.fetch_count()
        );
    }

    #[test]
    fn test_delayed_growth_resolves_exactly() {
        // 14400 * 8 headers whose separations cycle {6,6,6,6,6,7,7,8}
        let spacing = [6u64, 6, 6, 6, 6, 7, 7, 8];
        let chain = TimeChain::with_spacing(
            ChainConfig::local(1, 6, 14400),
            14400 * 8,
            &spacing,
            1_000_000,
        );
        let target_time = chain.synthesize(14400).time;

        let found = find_header_by_time(&chain, target_time, &no_cancel()).unwrap();
        assert_eq!(found.number, 14400);
    }

    #[test]
    fn test_before_genesis() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 50, &[6], 10_000);
        assert!(matches!(
            find_header_by_time(&chain, 9, &no_cancel()),
            Err(EngineError::TimestampBeforeGenesis)
        ));
    }

    #[test]
    fn test_missing_timestamp_between_blocks() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 50, &[6], 10_000);
        // Between block 10 and 11
        assert!(matches!(
            find_header_by_time(&chain, 10_000 + 10 * 6 + 3, &no_cancel()),
            Err(EngineError::NoHeaderAtTimestamp(_))
        ));
    }

    #[test]
    fn test_cancellation() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 5_000, &[6], 1_000);
        let cancel = AtomicBool::new(true);
        assert!(matches!(
            find_header_by_time(&chain, 1_000 + 6, &cancel),
            Err(EngineError::Cancelled)
        ));
    }

    #[test]
    fn test_genesis_timestamp_resolves() {
        let chain = TimeChain::with_spacing(ChainConfig::local(1, 6, 40), 50, &[6], 10_000);
        let found = find_header_by_time(&chain, 10_000, &no_cancel()).unwrap();
        assert_eq!(found.number, 0);
    }
}
