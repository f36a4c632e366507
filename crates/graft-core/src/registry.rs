//! Host resident-registry boundary.
//!
//! The host keeps residents in dense identifier-indexed tables grouped into
//! fixed-width household units. The kernel scans the full table only on the
//! pool rebuild cadence and resolves individual records at draw time, so
//! every lookup must tolerate stale or since-removed identifiers.

use contracts::{FacilityId, HouseholdId, ResidentId, MEMBERS_PER_HOUSEHOLD};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HouseholdRecord {
    pub id: HouseholdId,
    pub members: [ResidentId; MEMBERS_PER_HOUSEHOLD],
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResidentRecord {
    pub id: ResidentId,
    /// Whether this resident belongs to the category the annex wing houses.
    pub placement_candidate: bool,
    pub dead: bool,
    /// Home facility, zero when homeless.
    pub home_facility: FacilityId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    Stock,
    Annex,
}

/// `Sync` because the pool rebuild scans the table from a parallel
/// iterator.
pub trait ResidentRegistry: Sync {
    /// Upper bound of the household table; ids below this may or may not
    /// resolve.
    fn household_count(&self) -> HouseholdId;

    fn household(&self, id: HouseholdId) -> Option<HouseholdRecord>;

    fn resident(&self, id: ResidentId) -> Option<ResidentRecord>;

    fn facility_kind(&self, id: FacilityId) -> Option<FacilityKind>;
}
