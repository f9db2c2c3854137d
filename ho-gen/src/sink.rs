//! Trace records and the sinks that receive them.

use std::io;
use std::ops::Range;

use serde::Serialize;

use crate::config::TraceConfig;
use crate::topology::{
    AccessPointId,
    EntityId,
    Topology,
    UnitId,
};

/// How a handover moved its entity. Never written out: replay sees every handover the same way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum HandoverKind {
    /// Within the entity's current home unit.
    Local,
    /// A neighbour's movable entity pulled into the acting unit.
    Fetch,
    /// A movable entity brought back to its native unit and preset access point.
    Return,
}

/// One emitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TxRecord {
    /// Tag `0`: the entity comes online on `access_point`.
    Activate {
        /// Entity being activated.
        entity: EntityId,
        /// Access point it attaches to.
        access_point: AccessPointId,
    },
    /// Tag `1`: the entity goes offline, keeping its access point.
    Deactivate {
        /// Entity being deactivated.
        entity: EntityId,
    },
    /// Tag `2`: the entity moves to `access_point`.
    Handover {
        /// Entity being handed over.
        entity: EntityId,
        /// Destination access point.
        access_point: AccessPointId,
        /// Local or remote, for statistics only.
        kind: HandoverKind,
    },
}

impl TxRecord {
    /// Numeric record tag used in the output files.
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Activate { .. } => 0,
            Self::Deactivate { .. } => 1,
            Self::Handover { .. } => 2,
        }
    }

    /// The entity this record acts on.
    pub const fn entity(&self) -> EntityId {
        match *self {
            Self::Activate { entity, .. } | Self::Deactivate { entity } | Self::Handover { entity, .. } => entity,
        }
    }
}

/// Id ranges owned by one unit, recorded at the top of its trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnitHeader {
    /// Unit the stream belongs to.
    pub unit: UnitId,
    /// Entities native to the unit.
    pub entities: Range<EntityId>,
    /// Access points owned by the unit.
    pub access_points: Range<AccessPointId>,
}

/// Everything a sink needs to know before the first record.
#[derive(Clone, Debug, Serialize)]
pub struct TraceHeader {
    /// Parameters of the run.
    pub config: TraceConfig,
    /// One entry per unit, indexed by unit id.
    pub units: Vec<UnitHeader>,
}

impl TraceHeader {
    /// Collect the per-unit ranges of `topology`.
    pub fn new(config: &TraceConfig, topology: &Topology) -> Self {
        let units = (0..topology.unit_total())
            .map(|unit| UnitHeader {
                unit,
                entities: topology.entity_range(unit),
                access_points: topology.access_point_range(unit),
            })
            .collect();
        Self { config: config.clone(), units }
    }
}

/// Append-only destination for emitted records, one ordered stream per unit.
pub trait TraceSink {
    /// Called once before any record, with the ranges of every unit.
    fn begin(&mut self, header: &TraceHeader) -> io::Result<()>;

    /// Append `record` to the stream of `unit`.
    fn append(&mut self, unit: UnitId, record: &TxRecord) -> io::Result<()>;

    /// Called once after the last record; flush anything buffered.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn begin(&mut self, header: &TraceHeader) -> io::Result<()> {
        (**self).begin(header)
    }

    fn append(&mut self, unit: UnitId, record: &TxRecord) -> io::Result<()> {
        (**self).append(unit, record)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Keeps every stream in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    /// Header passed to `begin`, if the run got that far.
    pub header: Option<TraceHeader>,
    /// Records per unit, in emission order.
    pub units: Vec<Vec<TxRecord>>,
}

impl MemorySink {
    /// Records emitted to `unit` so far.
    pub fn records(&self, unit: UnitId) -> &[TxRecord] {
        &self.units[unit]
    }

    /// Records across all units.
    pub fn len(&self) -> usize {
        self.units.iter().map(Vec::len).sum()
    }

    /// True when nothing has been emitted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for MemorySink {
    fn begin(&mut self, header: &TraceHeader) -> io::Result<()> {
        self.units = vec![Vec::new(); header.units.len()];
        self.header = Some(header.clone());
        Ok(())
    }

    fn append(&mut self, unit: UnitId, record: &TxRecord) -> io::Result<()> {
        self.units[unit].push(*record);
        Ok(())
    }
}
