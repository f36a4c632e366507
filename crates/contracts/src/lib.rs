//! v1 cross-boundary contracts for the graft kernel, API, persistence, and drivers.

pub mod serde_u64_string;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SCHEMA_VERSION_V1: &str = "1.0";

/// Resident, household, and facility identifiers are dense host-registry
/// indices. Zero is the host's null slot and never names a live record.
pub type ResidentId = u32;
pub type HouseholdId = u32;
pub type FacilityId = u32;

/// Fixed member-slot width of a host household unit.
pub const MEMBERS_PER_HOUSEHOLD: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraftConfig {
    pub schema_version: String,
    pub run_id: String,
    #[serde(with = "serde_u64_string")]
    pub seed: u64,
    pub max_ticks: u64,
    /// Pool snapshot rebuild cadence, in host ticks.
    pub pool_refresh_interval_ticks: u64,
    /// Retry budget for a single household draw.
    pub draw_attempt_budget: u32,
    /// Named-template lookups before falling back to a catalog scan.
    pub template_search_limit: u32,
    /// Host ticks between a graph mutation being issued and it landing.
    pub mutation_latency_ticks: u64,
    /// Host tick at which the load phase reports complete.
    pub load_ready_tick: u64,
    pub household_count: u32,
    #[serde(default)]
    pub scenario_flags: BTreeMap<String, bool>,
    pub notes: Option<String>,
}

impl GraftConfig {
    pub fn scenario_flag(&self, name: &str) -> bool {
        self.scenario_flags.get(name).copied().unwrap_or(false)
    }
}

impl Default for GraftConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: "graft_local_001".to_string(),
            seed: 73,
            max_ticks: 720,
            pool_refresh_interval_ticks: 600,
            draw_attempt_budget: 3,
            template_search_limit: 5,
            mutation_latency_ticks: 2,
            load_ready_tick: 8,
            household_count: 48,
            scenario_flags: BTreeMap::new(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Running,
    Paused,
}

/// Host loading phase as reported by the external driver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    NotLoaded,
    Game,
    AssetEditor,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraftStatus {
    pub schema_version: String,
    pub run_id: String,
    pub current_tick: u64,
    pub max_ticks: u64,
    pub mode: RunMode,
    pub load_phase: LoadPhase,
    pub bootstrap_armed: bool,
    pub graft_active: bool,
    pub migration_done: bool,
    pub pool_size: u32,
    pub reserved_count: u32,
}

impl GraftStatus {
    pub fn is_complete(&self) -> bool {
        self.current_tick >= self.max_ticks
    }
}

impl fmt::Display for GraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={} tick={}/{} mode={:?} migration_done={} pool={} reserved={}",
            self.run_id,
            self.current_tick,
            self.max_ticks,
            self.mode,
            self.migration_done,
            self.pool_size,
            self.reserved_count
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    StepTick,
    DrawHousehold,
    ReleaseResident,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandPayload {
    StepTick {
        steps: u64,
    },
    DrawHousehold {
        max_attempts: Option<u32>,
    },
    ReleaseResident {
        resident_id: ResidentId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Command {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub issued_at_tick: u64,
    pub command_type: CommandType,
    pub payload: CommandPayload,
}

impl Command {
    pub fn new(
        command_id: impl Into<String>,
        run_id: impl Into<String>,
        issued_at_tick: u64,
        command_type: CommandType,
        payload: CommandPayload,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command_id.into(),
            run_id: run_id.into(),
            issued_at_tick,
            command_type,
            payload,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RunNotFound,
    InvalidCommand,
    InvalidQuery,
    RunStateConflict,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub schema_version: String,
    pub command_id: String,
    pub run_id: String,
    pub accepted: bool,
    pub error: Option<ApiError>,
}

impl CommandResult {
    pub fn accepted(command: &Command) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: true,
            error: None,
        }
    }

    pub fn rejected(command: &Command, error: ApiError) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            command_id: command.command_id.clone(),
            run_id: command.run_id.clone(),
            accepted: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LoadingCompletedBeforeArm,
    BootstrapArmed,
    TemplateLocated,
    TemplateFallbackUsed,
    BaselineRefreshed,
    ServicesPanelReplaced,
    AnnexTabCreated,
    AnnexPanelAttached,
    TabCountMismatch,
    LegacyChildrenDraining,
    MenuGraftCompleted,
    CustomRefreshFaulted,
    PoolRefreshed,
    PoolRefreshSkipped,
    HouseholdDrawn,
    DrawExhausted,
    ResidentReleased,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub schema_version: String,
    pub run_id: String,
    pub tick: u64,
    pub created_at: String,
    pub event_id: String,
    pub sequence_in_tick: u64,
    pub event_type: EventType,
    pub details: Option<Value>,
}

/// A household unit drawn as a single placement group. Empty member slots
/// hold the zero id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Household {
    pub household_id: HouseholdId,
    pub members: [ResidentId; MEMBERS_PER_HOUSEHOLD],
}

impl Household {
    pub fn occupied_members(&self) -> impl Iterator<Item = ResidentId> + '_ {
        self.members.iter().copied().filter(|id| *id != 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationReport {
    pub schema_version: String,
    pub started: bool,
    pub replaced_services_panel: bool,
    pub created_annex_tab: bool,
    pub attached_annex_panel: bool,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolReport {
    pub schema_version: String,
    pub snapshot_len: u32,
    pub reserved_count: u32,
    pub cadence_counter: u64,
    pub last_refresh_tick: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub schema_version: String,
    pub query_type: String,
    pub run_id: String,
    pub generated_at_tick: u64,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_round_trips_through_json() {
        let config = GraftConfig::default();
        let raw = serde_json::to_string(&config).expect("serialize config");
        let parsed: GraftConfig = serde_json::from_str(&raw).expect("parse config");
        assert_eq!(parsed, config);
        assert_eq!(parsed.seed, 73);
        assert_eq!(parsed.pool_refresh_interval_ticks, 600);
    }

    #[test]
    fn command_payload_uses_tagged_representation() {
        let payload = CommandPayload::DrawHousehold {
            max_attempts: Some(3),
        };
        let raw = serde_json::to_value(&payload).expect("serialize payload");
        assert_eq!(raw.get("type").and_then(Value::as_str), Some("draw_household"));
    }

    #[test]
    fn household_occupied_members_skips_null_slots() {
        let household = Household {
            household_id: 9,
            members: [4, 0, 7, 0, 0],
        };
        let members = household.occupied_members().collect::<Vec<_>>();
        assert_eq!(members, vec![4, 7]);
    }
}
