//! Online weight sampling — periodic records of the voting weight observed
//! online, feeding the trended quorum base.

use std::sync::Arc;

use weave_ledger::Ledger;
use weave_store::{StoreError, Writer};
use weave_types::{Amount, Timestamp};

/// Samples older than two weeks are dropped.
const SAMPLE_CUTOFF_SECS: u64 = 14 * 24 * 60 * 60;

pub struct OnlineWeightSampler {
    ledger: Arc<Ledger>,
    /// Floor below which the trend never drops.
    minimum: Amount,
}

impl OnlineWeightSampler {
    pub fn new(ledger: Arc<Ledger>, minimum: Amount) -> Self {
        Self { ledger, minimum }
    }

    /// Record the currently observed online weight and prune old samples.
    pub fn sample(&self, online: Amount) -> Result<(), StoreError> {
        let store = self.ledger.store();
        let now = Timestamp::now();
        let mut txn = store.tx_begin_write(Writer::OnlineWeight)?;
        store.online_weight.put(txn.raw_mut(), now.as_secs(), &online)?;
        let expired: Vec<u64> = store
            .online_weight
            .iter(txn.raw())?
            .into_iter()
            .map(|(timestamp, _)| timestamp)
            .filter(|timestamp| now.as_secs().saturating_sub(*timestamp) > SAMPLE_CUTOFF_SECS)
            .collect();
        for timestamp in expired {
            store.online_weight.del(txn.raw_mut(), timestamp)?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Trended online weight: the median sample, floored by the configured
    /// minimum.
    pub fn trended(&self) -> Result<Amount, StoreError> {
        let store = self.ledger.store();
        let txn = store.tx_begin_read()?;
        let mut samples: Vec<Amount> = store
            .online_weight
            .iter(txn.raw())?
            .into_iter()
            .map(|(_, amount)| amount)
            .collect();
        if samples.is_empty() {
            return Ok(self.minimum);
        }
        samples.sort();
        let median = samples[samples.len() / 2];
        Ok(median.max(self.minimum))
    }

    /// Quorum delta: `quorum_percent` of the trended weight.
    pub fn delta(&self, quorum_percent: u8) -> Result<Amount, StoreError> {
        let trended = self.trended()?;
        Ok(Amount::new(
            trended.raw() / 100 * quorum_percent.min(100) as u128,
        ))
    }
}
