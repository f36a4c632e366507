//! Candidate pool and reservation-backed household draws.
//!
//! The pool keeps a dense snapshot of households that contained at least one
//! placeable resident when last scanned. The snapshot is rebuilt wholesale
//! on a slow cadence and is stale in between; draws re-validate every member
//! against the live registry and the reservation set at the moment of
//! decision, so staleness costs retries, never correctness.

use std::collections::BTreeSet;

use contracts::{Household, HouseholdId, PoolReport, ResidentId, SCHEMA_VERSION_V1};
use rayon::prelude::*;

use crate::gate::TickGate;
use crate::registry::{FacilityKind, ResidentRegistry};
use crate::rng::Randomizer;

/// Pure eligibility predicate: the resident exists, belongs to the housed
/// category, and is alive. Total over stale or null identifiers.
pub fn is_placement_candidate(registry: &dyn ResidentRegistry, id: ResidentId) -> bool {
    if id == 0 {
        return false;
    }
    match registry.resident(id) {
        Some(record) => record.placement_candidate && !record.dead,
        None => false,
    }
}

/// Draw-time validation on top of the category predicate: not already
/// reserved, not homeless, and not already housed in an annex facility.
fn member_is_placeable(
    registry: &dyn ResidentRegistry,
    reserved: &BTreeSet<ResidentId>,
    id: ResidentId,
) -> bool {
    if reserved.contains(&id) {
        return false;
    }
    let Some(record) = registry.resident(id) else {
        return false;
    };
    if record.home_facility == 0 {
        return false;
    }
    !matches!(
        registry.facility_kind(record.home_facility),
        Some(FacilityKind::Annex)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolActivity {
    Idle,
    SkippedBusy,
    Refreshed { pool_size: usize },
}

#[derive(Debug)]
pub struct ResidentPool {
    snapshot: Vec<HouseholdId>,
    cadence_counter: u64,
    refresh_interval: u64,
    last_refresh_tick: Option<u64>,
    running: TickGate,
    reserved: BTreeSet<ResidentId>,
    rng: Randomizer,
}

impl ResidentPool {
    pub fn new(seed: u64, refresh_interval: u64) -> Self {
        Self {
            snapshot: Vec::new(),
            cadence_counter: 0,
            refresh_interval: refresh_interval.max(1),
            last_refresh_tick: None,
            running: TickGate::new(),
            reserved: BTreeSet::new(),
            rng: Randomizer::new(seed),
        }
    }

    pub fn report(&self) -> PoolReport {
        PoolReport {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            snapshot_len: self.snapshot.len() as u32,
            reserved_count: self.reserved.len() as u32,
            cadence_counter: self.cadence_counter,
            last_refresh_tick: self.last_refresh_tick,
        }
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Cadence driver, called once per host tick. A rebuild that loses the
    /// gate resets the cadence counter so it triggers again next tick.
    pub fn on_tick(&mut self, tick: u64, registry: &dyn ResidentRegistry) -> PoolActivity {
        let due = self.cadence_counter % self.refresh_interval == 0;
        self.cadence_counter = self.cadence_counter.wrapping_add(1);
        if !due {
            return PoolActivity::Idle;
        }

        if !self.running.try_enter() {
            self.cadence_counter = 0;
            return PoolActivity::SkippedBusy;
        }

        let pool_size = self.rebuild(registry);
        self.last_refresh_tick = Some(tick);
        self.cadence_counter = 1;
        self.running.release();
        PoolActivity::Refreshed { pool_size }
    }

    /// Full registry scan. Builds the replacement snapshot off to the side
    /// and swaps it in with a single assignment so a reader never observes
    /// a half-built sequence.
    fn rebuild(&mut self, registry: &dyn ResidentRegistry) -> usize {
        let reserved = &self.reserved;
        let next_snapshot = (1..registry.household_count())
            .into_par_iter()
            .filter_map(|id| {
                let record = registry.household(id)?;
                let has_placeable = record.members.iter().any(|&member| {
                    is_placement_candidate(registry, member)
                        && member_is_placeable(registry, reserved, member)
                });
                has_placeable.then_some(id)
            })
            .collect::<Vec<_>>();

        self.snapshot = next_snapshot;
        self.snapshot.len()
    }

    /// Draw a random household containing at least one placeable candidate
    /// and reserve every candidate member. Mutually exclusive with an
    /// in-progress rebuild; if the gate is held this returns `None` rather
    /// than reading a half-rebuilt snapshot.
    pub fn draw(
        &mut self,
        max_attempts: u32,
        registry: &dyn ResidentRegistry,
    ) -> Option<Household> {
        if !self.running.try_enter() {
            return None;
        }

        let drawn = self.draw_internal(max_attempts, registry);
        if let Some(household) = &drawn {
            for member in household.occupied_members() {
                if is_placement_candidate(registry, member) {
                    self.reserved.insert(member);
                }
            }
        }

        self.running.release();
        drawn
    }

    /// Each retry re-rolls the random index; retrying a fixed invalid index
    /// in place would starve.
    fn draw_internal(
        &mut self,
        attempts_left: u32,
        registry: &dyn ResidentRegistry,
    ) -> Option<Household> {
        if attempts_left == 0 {
            return None;
        }

        let household_id = self.random_pool_member()?;
        let Some(record) = registry.household(household_id) else {
            // Snapshot entry went stale since the last rebuild.
            return self.draw_internal(attempts_left - 1, registry);
        };

        let mut candidate_present = false;
        for member in record.members {
            if member != 0 && is_placement_candidate(registry, member) {
                if !member_is_placeable(registry, &self.reserved, member) {
                    return self.draw_internal(attempts_left - 1, registry);
                }
                candidate_present = true;
            }
        }

        if !candidate_present {
            return self.draw_internal(attempts_left - 1, registry);
        }

        Some(Household {
            household_id: record.id,
            members: record.members,
        })
    }

    fn random_pool_member(&mut self) -> Option<HouseholdId> {
        if self.snapshot.is_empty() {
            return None;
        }
        let index = self.rng.index(self.snapshot.len());
        Some(self.snapshot[index])
    }

    /// Drop a reservation. Intentionally unguarded: removing a marker is
    /// commutative and idempotent, and consumers release from arbitrary
    /// contexts.
    pub fn release(&mut self, id: ResidentId) -> bool {
        self.reserved.remove(&id)
    }

    pub fn is_reserved(&self, id: ResidentId) -> bool {
        self.reserved.contains(&id)
    }
}
