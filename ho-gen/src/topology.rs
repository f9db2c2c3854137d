//! Static partitioning of entities and access points over execution units.
//!
//! Units own contiguous id ranges of entities and access points. Within each unit's entity range the
//! last `moving_per_unit` ids are movable (eligible for remote handover), the rest never leave their
//! unit. Units are grouped into nodes of `units_per_node`; a unit's migration neighbour is the unit at
//! the same offset in the next node, wrapping from the last node back to node 0.

use std::ops::Range;

use ho_core::GenError;
use tracing::{
    debug,
    instrument,
};

use crate::config::TraceConfig;

/// Entity (UE) identifier.
pub type EntityId = usize;
/// Execution unit (thread) identifier.
pub type UnitId = usize;
/// Access point (eNodeB) identifier.
pub type AccessPointId = usize;

/// Guards `floor(x * fraction)` against values like `0.05 * 100 = 4.999...`.
const TRUNCATION_EPSILON: f64 = 1e-6;

/// Derived, immutable partition assignment for one run.
#[derive(Clone, Debug)]
pub struct Topology {
    /// Number of nodes.
    node_total: usize,
    /// Number of execution units.
    unit_total: usize,
    /// Units grouped into each node.
    units_per_node: usize,
    /// Number of entities.
    entity_total: usize,
    /// Number of access points.
    access_point_total: usize,
    /// Size of each unit's entity range.
    entities_per_unit: usize,
    /// Size of each unit's access point range.
    access_points_per_unit: usize,
    /// Movable entities at the tail of each unit's range.
    moving_per_unit: usize,
    /// Preset access point of every entity, indexed by entity id.
    preset_access_points: Vec<AccessPointId>,
}

impl Topology {
    /// Derive the partitioning from `config`, rejecting any configuration the generator cannot honour.
    #[instrument(skip(config), fields(units = config.unit_total, entities = config.entity_total))]
    pub fn new(config: &TraceConfig) -> Result<Self, GenError> {
        config.validate_probabilities()?;

        let TraceConfig { node_total, unit_total, entity_total, access_point_total, .. } = *config;
        if node_total == 0 || unit_total == 0 || entity_total == 0 || access_point_total == 0 {
            return Err(GenError::config("node, unit, entity and access point totals must all be > 0"));
        }
        if unit_total % node_total != 0 {
            return Err(GenError::config(format!(
                "unit_total {unit_total} is not divisible by node_total {node_total}"
            )));
        }
        if entity_total % unit_total != 0 {
            return Err(GenError::config(format!(
                "entity_total {entity_total} is not divisible by unit_total {unit_total}"
            )));
        }
        if access_point_total % unit_total != 0 {
            return Err(GenError::config(format!(
                "access_point_total {access_point_total} is not divisible by unit_total {unit_total}"
            )));
        }

        let units_per_node = unit_total / node_total;
        let entities_per_unit = entity_total / unit_total;
        let access_points_per_unit = access_point_total / unit_total;
        if access_points_per_unit <= 1 {
            // a local handover needs somewhere else to go
            return Err(GenError::config(format!(
                "need more than one access point per unit, got {access_points_per_unit}"
            )));
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let moving_per_unit =
            ((entities_per_unit as f64 * config.p_moving_fraction + TRUNCATION_EPSILON).floor() as usize)
                .min(entities_per_unit);
        if moving_per_unit == entities_per_unit {
            return Err(GenError::config("every unit needs at least one local-only entity"));
        }
        if moving_per_unit > 0 && node_total == 1 {
            return Err(GenError::config("movable entities need at least two nodes to migrate between"));
        }

        let preamble = unit_total * moving_per_unit;
        if config.tx_total <= 2 * preamble || config.tx_total < 2 {
            return Err(GenError::config(format!(
                "tx_total {} is too small: movable activations and deactivations alone take {}",
                config.tx_total,
                2 * preamble
            )));
        }

        let mut preset_access_points: Vec<_> = (0..entity_total)
            .map(|id| (id / entities_per_unit) * access_points_per_unit + id % access_points_per_unit)
            .collect();
        preset_access_points.sort_unstable();

        debug!(units_per_node, entities_per_unit, access_points_per_unit, moving_per_unit, "derived topology");
        Ok(Self {
            node_total,
            unit_total,
            units_per_node,
            entity_total,
            access_point_total,
            entities_per_unit,
            access_points_per_unit,
            moving_per_unit,
            preset_access_points,
        })
    }

    /// Number of nodes.
    pub const fn node_total(&self) -> usize {
        self.node_total
    }

    /// Number of execution units.
    pub const fn unit_total(&self) -> usize {
        self.unit_total
    }

    /// Units in every node.
    pub const fn units_per_node(&self) -> usize {
        self.units_per_node
    }

    /// Number of entities.
    pub const fn entity_total(&self) -> usize {
        self.entity_total
    }

    /// Number of access points.
    pub const fn access_point_total(&self) -> usize {
        self.access_point_total
    }

    /// Entities native to each unit.
    pub const fn entities_per_unit(&self) -> usize {
        self.entities_per_unit
    }

    /// Access points owned by each unit.
    pub const fn access_points_per_unit(&self) -> usize {
        self.access_points_per_unit
    }

    /// Movable entities in every unit.
    pub const fn moving_per_unit(&self) -> usize {
        self.moving_per_unit
    }

    /// Transactions spent activating every movable entity up front (and, symmetrically, deactivating
    /// them at the end).
    pub const fn preamble_tx_count(&self) -> usize {
        self.unit_total * self.moving_per_unit
    }

    /// The unit an entity belongs to before any migration.
    pub const fn native_unit(&self, entity: EntityId) -> UnitId {
        entity / self.entities_per_unit
    }

    /// The unit owning an access point.
    pub const fn unit_of_access_point(&self, access_point: AccessPointId) -> UnitId {
        access_point / self.access_points_per_unit
    }

    /// Entities native to `unit`.
    pub const fn entity_range(&self, unit: UnitId) -> Range<EntityId> {
        unit * self.entities_per_unit..(unit + 1) * self.entities_per_unit
    }

    /// Access points owned by `unit`.
    pub const fn access_point_range(&self, unit: UnitId) -> Range<AccessPointId> {
        unit * self.access_points_per_unit..(unit + 1) * self.access_points_per_unit
    }

    /// Ids of the unit's movable entities: the tail of its entity range.
    pub const fn movable_range(&self, unit: UnitId) -> Range<EntityId> {
        (unit + 1) * self.entities_per_unit - self.moving_per_unit..(unit + 1) * self.entities_per_unit
    }

    /// Whether the entity may take part in remote handovers.
    pub const fn is_movable(&self, entity: EntityId) -> bool {
        entity % self.entities_per_unit >= self.entities_per_unit - self.moving_per_unit
    }

    /// Access point an entity is first attached to.
    pub fn preset_access_point(&self, entity: EntityId) -> AccessPointId {
        self.preset_access_points[entity]
    }

    /// The unit whose movable entities `unit` pulls in: same offset, next node.
    pub const fn next_unit(&self, unit: UnitId) -> UnitId {
        (unit + self.units_per_node) % self.unit_total
    }

    /// The unit that pulls in `unit`'s movable entities.
    pub const fn prev_unit(&self, unit: UnitId) -> UnitId {
        (unit + self.unit_total - self.units_per_node) % self.unit_total
    }

    /// Where a fetched entity lands: its preset access point shifted back by one node's worth of
    /// access points, which is the same relative access point in the fetching unit.
    pub fn fetch_destination(&self, entity: EntityId) -> AccessPointId {
        let shift = self.units_per_node * self.access_points_per_unit;
        (self.preset_access_point(entity) + self.access_point_total - shift) % self.access_point_total
    }
}
