//! Per-entity mutable state.
//!
//! The store owns one [`EntityState`] per entity plus the pools the event driver samples from. Local-only
//! and movable entities live in separate active/inactive pool pairs so the driver can draw a uniformly
//! random local-only entity without ever touching a movable one; the four pools together partition the
//! entity range, and every transition moves the id between pools in the same call that flips its state.

use ho_core::{
    GenError,
    PoolKind,
};
use rand::Rng;
use tracing::trace;

use crate::topology::{
    AccessPointId,
    EntityId,
    Topology,
    UnitId,
};

/// Set of entity ids with O(1) insert, remove and uniform sampling.
///
/// Members are kept densely in a vector; `positions` maps an id back to its slot so removal can
/// swap-remove. Sampling indexes the vector directly, so results depend only on the RNG and the sequence
/// of operations, never on hashing or container iteration order.
#[derive(Clone, Debug)]
pub struct SamplePool {
    /// Current members, densely packed in no particular order.
    members: Vec<EntityId>,
    /// Slot of each id in `members`, `None` when absent.
    positions: Vec<Option<usize>>,
}

impl SamplePool {
    /// An empty pool able to hold ids in `[0, capacity)`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { members: Vec::new(), positions: vec![None; capacity] }
    }

    /// Returns `false` if `id` was already present.
    pub fn insert(&mut self, id: EntityId) -> bool {
        if self.positions[id].is_some() {
            return false;
        }
        self.positions[id] = Some(self.members.len());
        self.members.push(id);
        true
    }

    /// Returns `false` if `id` was not present.
    pub fn remove(&mut self, id: EntityId) -> bool {
        let Some(pos) = self.positions[id].take() else { return false };
        self.members.swap_remove(pos);
        if let Some(&moved) = self.members.get(pos) {
            self.positions[moved] = Some(pos);
        }
        true
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: EntityId) -> bool {
        self.positions.get(id).is_some_and(Option::is_some)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True when the pool has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A uniformly random member, `None` if the pool is empty.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<EntityId> {
        if self.members.is_empty() {
            return None;
        }
        Some(self.members[rng.gen_range(0..self.members.len())])
    }

    /// Members in slot order, which shifts with every removal.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }
}

/// Mutable state of one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityState {
    /// Whether the entity is currently online.
    pub active: bool,
    /// Unit the entity is currently homed in; only remote handovers change it.
    pub home_unit: UnitId,
    /// Last access point the entity was attached to; kept across deactivation.
    pub access_point: Option<AccessPointId>,
}

/// Active and inactive pools for one class of entity.
#[derive(Clone, Debug)]
struct Partition {
    /// Entities currently online.
    active: SamplePool,
    /// Entities currently offline.
    inactive: SamplePool,
}

impl Partition {
    /// Empty pools sized for the whole entity range.
    fn new(capacity: usize) -> Self {
        Self { active: SamplePool::with_capacity(capacity), inactive: SamplePool::with_capacity(capacity) }
    }
}

/// Entity states and the active/inactive pools over them.
#[derive(Clone, Debug)]
pub struct EntityStore<'t> {
    /// Static layout the ids refer to.
    topology: &'t Topology,
    /// State of every entity, indexed by id.
    entities: Vec<EntityState>,
    /// Pools of local-only entities.
    local: Partition,
    /// Pools of movable entities.
    movable: Partition,
    /// Movable entities away from their native unit.
    displaced: usize,
}

impl<'t> EntityStore<'t> {
    /// Every entity starts inactive in its native unit. Local-only entities have no access point until
    /// their first activation; movable entities start on their preset one.
    pub fn new(topology: &'t Topology) -> Self {
        let total = topology.entity_total();
        let mut local = Partition::new(total);
        let mut movable = Partition::new(total);

        let entities = (0..total)
            .map(|id| {
                let is_movable = topology.is_movable(id);
                if is_movable {
                    movable.inactive.insert(id);
                } else {
                    local.inactive.insert(id);
                }
                EntityState {
                    active: false,
                    home_unit: topology.native_unit(id),
                    access_point: is_movable.then(|| topology.preset_access_point(id)),
                }
            })
            .collect();

        Self { topology, entities, local, movable, displaced: 0 }
    }

    /// State of `id`.
    pub fn entity(&self, id: EntityId) -> &EntityState {
        &self.entities[id]
    }

    /// Activate `id`, reattaching it to its last access point or, on a first activation, to a uniformly
    /// random access point of its home unit.
    pub fn activate<R: Rng + ?Sized>(&mut self, id: EntityId, rng: &mut R) -> Result<AccessPointId, GenError> {
        let access_point = match self.entities[id].access_point {
            Some(ap) => ap,
            None => rng.gen_range(self.topology.access_point_range(self.entities[id].home_unit)),
        };
        self.activate_at(id, access_point)?;
        Ok(access_point)
    }

    /// Activate `id` on an explicit access point.
    pub fn activate_at(&mut self, id: EntityId, access_point: AccessPointId) -> Result<(), GenError> {
        if self.entities[id].active {
            return Err(GenError::illegal(id, "activated while already active"));
        }
        let partition = self.partition_mut(id);
        partition.inactive.remove(id);
        partition.active.insert(id);

        let entity = &mut self.entities[id];
        entity.active = true;
        entity.access_point = Some(access_point);
        trace!(id, access_point, "activate");
        Ok(())
    }

    /// Deactivate `id`. The access point is retained for the next activation.
    pub fn deactivate(&mut self, id: EntityId) -> Result<(), GenError> {
        if !self.entities[id].active {
            return Err(GenError::illegal(id, "deactivated while inactive"));
        }
        let partition = self.partition_mut(id);
        partition.active.remove(id);
        partition.inactive.insert(id);

        self.entities[id].active = false;
        trace!(id, "deactivate");
        Ok(())
    }

    /// Move `id` to a different access point of its current home unit.
    pub fn local_handover<R: Rng + ?Sized>(&mut self, id: EntityId, rng: &mut R) -> Result<AccessPointId, GenError> {
        let entity = &self.entities[id];
        if !entity.active {
            return Err(GenError::illegal(id, "handed over while inactive"));
        }
        let current = entity.access_point.ok_or_else(|| GenError::illegal(id, "active without an access point"))?;

        // terminates because every unit has at least two access points
        let range = self.topology.access_point_range(entity.home_unit);
        let mut dst = rng.gen_range(range.clone());
        while dst == current {
            dst = rng.gen_range(range.clone());
        }

        self.entities[id].access_point = Some(dst);
        trace!(id, from = current, to = dst, "local handover");
        Ok(dst)
    }

    /// Rehome `id` to `dst_unit` on `dst_access_point`. The caller decides direction and destination.
    pub fn remote_handover(
        &mut self,
        id: EntityId,
        dst_unit: UnitId,
        dst_access_point: AccessPointId,
    ) -> Result<(), GenError> {
        if !self.entities[id].active {
            return Err(GenError::illegal(id, "handed over while inactive"));
        }
        if !self.topology.is_movable(id) {
            return Err(GenError::illegal(id, "remote handover of a local-only entity"));
        }

        let native = self.topology.native_unit(id);
        let entity = &mut self.entities[id];
        let was_away = entity.home_unit != native;
        entity.home_unit = dst_unit;
        entity.access_point = Some(dst_access_point);

        match (was_away, dst_unit != native) {
            (false, true) => self.displaced += 1,
            (true, false) => self.displaced -= 1,
            _ => (),
        }
        trace!(id, dst_unit, dst_access_point, displaced = self.displaced, "remote handover");
        Ok(())
    }

    /// A uniformly random active local-only entity.
    pub fn sample_active<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<EntityId, GenError> {
        self.local.active.sample(rng).ok_or(GenError::EmptyPool(PoolKind::Active))
    }

    /// A uniformly random inactive local-only entity.
    pub fn sample_inactive<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<EntityId, GenError> {
        self.local.inactive.sample(rng).ok_or(GenError::EmptyPool(PoolKind::Inactive))
    }

    /// A uniformly random active movable entity.
    pub fn sample_movable<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<EntityId, GenError> {
        self.movable.active.sample(rng).ok_or(GenError::EmptyPool(PoolKind::Movable))
    }

    /// Active local-only entities.
    pub fn active_len(&self) -> usize {
        self.local.active.len()
    }

    /// Inactive local-only entities.
    pub fn inactive_len(&self) -> usize {
        self.local.inactive.len()
    }

    /// Active movable entities.
    pub fn movable_active_len(&self) -> usize {
        self.movable.active.len()
    }

    /// Movable entities currently homed outside their native unit.
    pub const fn displaced_count(&self) -> usize {
        self.displaced
    }

    /// Whether `id` is homed outside its native unit.
    pub fn is_displaced(&self, id: EntityId) -> bool {
        self.entities[id].home_unit != self.topology.native_unit(id)
    }

    /// Verify that the pools partition the entity range and agree with every entity's state.
    pub fn check_partition(&self) -> Result<(), GenError> {
        for (id, entity) in self.entities.iter().enumerate() {
            let (own, other) = if self.topology.is_movable(id) {
                (&self.movable, &self.local)
            } else {
                (&self.local, &self.movable)
            };
            if other.active.contains(id) || other.inactive.contains(id) {
                return Err(GenError::illegal(id, "pooled with the wrong entity class"));
            }
            match (entity.active, own.active.contains(id), own.inactive.contains(id)) {
                (true, true, false) | (false, false, true) => (),
                _ => return Err(GenError::illegal(id, "pool membership disagrees with state")),
            }
        }
        Ok(())
    }

    /// The pools `id` belongs to.
    fn partition_mut(&mut self, id: EntityId) -> &mut Partition {
        if self.topology.is_movable(id) {
            &mut self.movable
        } else {
            &mut self.local
        }
    }
}
