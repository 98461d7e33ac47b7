//! Block-type-aware PoW difficulty thresholds.
//!
//! Send-side blocks carry the base difficulty. Receive/open blocks get a
//! higher bar since they are the free half of a transfer, and epoch blocks
//! the highest since only the epoch signer produces them.

/// Simplified block kind for PoW threshold selection.
///
/// Avoids a dependency on `weave-blocks` (which depends on `weave-work`,
/// creating a cycle). Call sites map from the block subtype to this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkBlockKind {
    /// Send and change blocks.
    Base,
    /// Receive or open — higher difficulty to deter spam.
    ReceiveOrOpen,
    /// Epoch — very high difficulty, only the epoch signer produces these.
    Epoch,
}

const BASE_THRESHOLD: u64 = 0xFFFFFE00_00000000;
const RECEIVE_MULTIPLIER: f64 = 8.0;
const EPOCH_MULTIPLIER: f64 = 64.0;

/// Per-block-type PoW thresholds.
///
/// Higher threshold values = harder work required. The `multiply` helper
/// scales difficulty by shrinking the "inverse gap" (`u64::MAX - threshold`)
/// which raises the bar the work nonce must clear.
pub struct WorkThresholds {
    pub base: u64,
    pub receive_multiplier: f64,
    pub epoch_multiplier: f64,
}

impl WorkThresholds {
    pub fn new() -> Self {
        Self {
            base: BASE_THRESHOLD,
            receive_multiplier: RECEIVE_MULTIPLIER,
            epoch_multiplier: EPOCH_MULTIPLIER,
        }
    }

    /// Construct with a custom base (useful in tests or low-difficulty devnets).
    pub fn with_base(base: u64) -> Self {
        Self {
            base,
            receive_multiplier: RECEIVE_MULTIPLIER,
            epoch_multiplier: EPOCH_MULTIPLIER,
        }
    }

    /// Get the required work difficulty for a specific block kind.
    pub fn threshold_for(&self, kind: WorkBlockKind) -> u64 {
        match kind {
            WorkBlockKind::ReceiveOrOpen => self.multiply(self.base, self.receive_multiplier),
            WorkBlockKind::Epoch => self.multiply(self.base, self.epoch_multiplier),
            WorkBlockKind::Base => self.base,
        }
    }

    /// Scale difficulty: higher threshold = harder work.
    ///
    /// The "difficulty inverse" is `u64::MAX - threshold`. Dividing that by
    /// the multiplier shrinks the gap, raising the threshold. When `base` is
    /// 0 (PoW disabled), all derived thresholds are also 0.
    fn multiply(&self, base: u64, multiplier: f64) -> u64 {
        if base == 0 {
            return 0;
        }
        let difficulty_inv = u64::MAX - base;
        let scaled_inv = (difficulty_inv as f64 / multiplier) as u64;
        u64::MAX - scaled_inv
    }
}

impl Default for WorkThresholds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_harder_than_send() {
        let thresholds = WorkThresholds::new();
        let send = thresholds.threshold_for(WorkBlockKind::Base);
        let receive = thresholds.threshold_for(WorkBlockKind::ReceiveOrOpen);
        assert!(receive > send);
    }

    #[test]
    fn epoch_hardest() {
        let thresholds = WorkThresholds::new();
        let epoch = thresholds.threshold_for(WorkBlockKind::Epoch);
        let receive = thresholds.threshold_for(WorkBlockKind::ReceiveOrOpen);
        assert!(epoch > receive);
    }

    #[test]
    fn base_is_unchanged() {
        let thresholds = WorkThresholds::new();
        assert_eq!(thresholds.threshold_for(WorkBlockKind::Base), BASE_THRESHOLD);
    }

    #[test]
    fn zero_base_stays_zero() {
        let thresholds = WorkThresholds::with_base(0);
        assert_eq!(thresholds.threshold_for(WorkBlockKind::Base), 0);
        assert_eq!(thresholds.threshold_for(WorkBlockKind::ReceiveOrOpen), 0);
    }
}
