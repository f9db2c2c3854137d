//! Circular migration queues.
//!
//! Every unit owns a fixed ring of movable entity ids: first the movable entities of its neighbour
//! ([`Topology::next_unit`]), then its own. Dequeuing walks the ring, so a unit alternates between a run
//! of fetches (pulling the neighbour's entities in) and a run of returns (pulling back its own entities,
//! which the previous unit borrowed in the meantime). No entity is ever more than one ring lap away from
//! home, which keeps the closure cleanup bounded.

use ho_core::{
    GenError,
    PoolKind,
};

use crate::topology::{
    EntityId,
    Topology,
    UnitId,
};

/// Whether a remote handover pulls in a neighbour's entity or brings one of the unit's own back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MigrationDirection {
    /// The entity is native to the neighbour and moves into the acting unit.
    Fetch,
    /// The entity is native to the acting unit and returns to its preset access point.
    Return,
}

/// Fixed-capacity ring; only the rotation changes, never the membership.
#[derive(Clone, Debug)]
pub struct MigrationRing {
    /// Ring members in their original order.
    slots: Box<[EntityId]>,
    /// Slot dequeued next.
    head: usize,
}

impl MigrationRing {
    /// A ring starting at the first of `slots`.
    fn new(slots: impl IntoIterator<Item = EntityId>) -> Self {
        Self { slots: slots.into_iter().collect(), head: 0 }
    }

    /// Return the front id and rotate it to the back.
    pub fn next(&mut self) -> Option<EntityId> {
        let id = *self.slots.get(self.head)?;
        self.head = (self.head + 1) % self.slots.len();
        Some(id)
    }

    /// Number of ids in the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the run has no movable entities.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The ring contents in dequeue order, starting at the head.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots[self.head..].iter().chain(&self.slots[..self.head]).copied()
    }
}

/// One [`MigrationRing`] per execution unit.
#[derive(Clone, Debug)]
pub struct MigrationQueues {
    /// Ring of each unit, indexed by unit id.
    rings: Vec<MigrationRing>,
    /// Used to recover an entity's native unit.
    entities_per_unit: usize,
}

impl MigrationQueues {
    /// Build every unit's ring with its head on the first of the neighbour's movable entities.
    pub fn new(topology: &Topology) -> Self {
        let rings = (0..topology.unit_total())
            .map(|unit| {
                let fetched = topology.movable_range(topology.next_unit(unit));
                MigrationRing::new(fetched.chain(topology.movable_range(unit)))
            })
            .collect();
        Self { rings, entities_per_unit: topology.entities_per_unit() }
    }

    /// Dequeue the next movable entity for `unit`.
    ///
    /// Only fails when the run has no movable entities at all.
    pub fn next(&mut self, unit: UnitId) -> Result<EntityId, GenError> {
        self.rings[unit].next().ok_or(GenError::EmptyPool(PoolKind::Migration))
    }

    /// Classify an id dequeued by `unit`.
    pub const fn direction(&self, unit: UnitId, entity: EntityId) -> MigrationDirection {
        if entity / self.entities_per_unit == unit {
            MigrationDirection::Return
        } else {
            MigrationDirection::Fetch
        }
    }

    /// The ring of `unit`.
    pub fn ring(&self, unit: UnitId) -> &MigrationRing {
        &self.rings[unit]
    }
}
