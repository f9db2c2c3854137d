//! Realized counts for a generated trace.

use serde::Serialize;

use crate::sink::{
    HandoverKind,
    TxRecord,
};

/// Per-kind record counts, accumulated as records are emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    /// Activation records.
    pub activations: usize,
    /// Deactivation records.
    pub deactivations: usize,
    /// Handovers within the entity's home unit.
    pub local_handovers: usize,
    /// Movable entities pulled into a neighbouring unit.
    pub remote_fetches: usize,
    /// Movable entities brought home, including cleanup restorations.
    pub remote_returns: usize,
    /// Returns emitted by the cleanup phase rather than the rate-matching loop.
    pub restorations: usize,
}

impl TraceStats {
    /// Count one emitted record.
    pub fn record(&mut self, record: &TxRecord) {
        match record {
            TxRecord::Activate { .. } => self.activations += 1,
            TxRecord::Deactivate { .. } => self.deactivations += 1,
            TxRecord::Handover { kind: HandoverKind::Local, .. } => self.local_handovers += 1,
            TxRecord::Handover { kind: HandoverKind::Fetch, .. } => self.remote_fetches += 1,
            TxRecord::Handover { kind: HandoverKind::Return, .. } => self.remote_returns += 1,
        }
    }

    /// All records.
    pub const fn total(&self) -> usize {
        self.activations + self.deactivations + self.handovers()
    }

    /// Local and remote handovers together.
    pub const fn handovers(&self) -> usize {
        self.local_handovers + self.remote_handovers()
    }

    /// Fetches plus returns.
    pub const fn remote_handovers(&self) -> usize {
        self.remote_fetches + self.remote_returns
    }

    /// Fraction of all transactions that are handovers.
    #[allow(clippy::cast_precision_loss)]
    pub fn handover_ratio(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.handovers() as f64 / self.total() as f64
    }

    /// Fraction of handovers that cross units.
    #[allow(clippy::cast_precision_loss)]
    pub fn remote_ratio(&self) -> f64 {
        if self.handovers() == 0 {
            return 0.0;
        }
        self.remote_handovers() as f64 / self.handovers() as f64
    }
}

#[cfg(test)]
mod tests {
    use assertables::assert_in_delta;

    use super::*;

    #[test]
    fn test_ratios() {
        let mut stats = TraceStats::default();
        assert_eq!(stats.handover_ratio(), 0.0);

        for record in [
            TxRecord::Activate { entity: 0, access_point: 0 },
            TxRecord::Handover { entity: 0, access_point: 1, kind: HandoverKind::Local },
            TxRecord::Handover { entity: 0, access_point: 0, kind: HandoverKind::Local },
            TxRecord::Handover { entity: 9, access_point: 4, kind: HandoverKind::Fetch },
            TxRecord::Deactivate { entity: 0 },
        ] {
            stats.record(&record);
        }

        assert_eq!(stats.total(), 5);
        assert_in_delta!(stats.handover_ratio(), 0.6, 1e-9);
        assert_in_delta!(stats.remote_ratio(), 1.0 / 3.0, 1e-9);
    }
}
