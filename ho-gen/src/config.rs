//! Run configuration.
//!
//! A [`TraceConfig`] is built once (by the CLI or a caller) and handed by reference to
//! [`Topology::new`](crate::topology::Topology::new), which checks every structural precondition.
//! It is also serialized verbatim into the run metadata so a trace can be regenerated.

use ho_core::GenError;
use serde::{
    Deserialize,
    Serialize,
};

/// Scalar parameters of one trace-generation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Number of nodes; units are grouped evenly into nodes.
    pub node_total: usize,
    /// Number of execution units (threads).
    pub unit_total: usize,
    /// Number of entities (UEs), divisible by `unit_total`.
    pub entity_total: usize,
    /// Number of access points (eNodeBs), divisible by `unit_total`.
    pub access_point_total: usize,
    /// Fraction of transactions that are handovers.
    pub p_handovers: f64,
    /// Fraction of handovers that cross unit boundaries.
    pub p_remote: f64,
    /// Fraction of each unit's entities that may migrate.
    pub p_moving_fraction: f64,
    /// Total number of transactions in the trace.
    pub tx_total: usize,
    /// Seed for the uniform generator; `None` means one is drawn from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl TraceConfig {
    /// Check the parameters that do not depend on the derived topology.
    pub(crate) fn validate_probabilities(&self) -> Result<(), GenError> {
        for (name, value) in [
            ("p_handovers", self.p_handovers),
            ("p_remote", self.p_remote),
            ("p_moving_fraction", self.p_moving_fraction),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(GenError::config(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}
