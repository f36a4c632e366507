//! In-process API facade over the graft kernel: command validation, audit
//! logging, and SQLite persistence, plus the HTTP server.

mod persistence;
mod server;

use std::path::Path;

use contracts::{
    ApiError, Command, CommandPayload, CommandResult, CommandType, ErrorCode, Event, GraftConfig,
    GraftStatus, Household, MigrationReport, PoolReport, ResidentId,
};
use graft_core::kernel::GraftKernel;
use graft_core::sim::SimulatedHost;
use persistence::SqliteAuditStore;
pub use persistence::{PersistedCommandEntry, PersistedRunSummary, PersistenceError};
pub use server::{serve, ServerError};

/// Upper bound on a caller-supplied draw budget; the recursion depth is the
/// budget, so an unbounded request is rejected rather than honored.
const MAX_DRAW_ATTEMPTS: u32 = 32;

#[derive(Debug)]
struct PersistenceState {
    store: SqliteAuditStore,
    persisted_command_count: usize,
    persisted_event_count: usize,
}

#[derive(Debug)]
pub struct GraftApi {
    kernel: GraftKernel,
    host: SimulatedHost,
    command_log: Vec<PersistedCommandEntry>,
    persistence: Option<PersistenceState>,
    last_persistence_error: Option<String>,
    next_command_number: u64,
}

impl GraftApi {
    pub fn from_config(config: GraftConfig) -> Self {
        let host = SimulatedHost::from_config(&config);
        Self {
            kernel: GraftKernel::new(config),
            host,
            command_log: Vec::new(),
            persistence: None,
            last_persistence_error: None,
            next_command_number: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        self.kernel.run_id()
    }

    pub fn config(&self) -> &GraftConfig {
        self.kernel.config()
    }

    pub fn status(&self) -> GraftStatus {
        self.kernel.status()
    }

    pub fn events(&self) -> &[Event] {
        self.kernel.events()
    }

    pub fn migration_report(&self) -> MigrationReport {
        self.kernel.migration_report()
    }

    pub fn pool_report(&self) -> PoolReport {
        self.kernel.pool_report()
    }

    pub fn command_audit(&self) -> &[PersistedCommandEntry] {
        &self.command_log
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let store = SqliteAuditStore::open(path)?;
        self.attach_store(store);
        Ok(())
    }

    pub fn attach_in_memory_store(&mut self) -> Result<(), PersistenceError> {
        let store = SqliteAuditStore::open_in_memory()?;
        self.attach_store(store);
        Ok(())
    }

    fn attach_store(&mut self, store: SqliteAuditStore) {
        self.persistence = Some(PersistenceState {
            store,
            persisted_command_count: 0,
            persisted_event_count: 0,
        });
    }

    pub fn initialize_run_storage(
        &mut self,
        replace_existing_run: bool,
    ) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let run_id = self.kernel.run_id().to_string();
        if state.store.run_exists(&run_id)? {
            if replace_existing_run {
                state.store.delete_run(&run_id)?;
                state.persisted_command_count = 0;
                state.persisted_event_count = 0;
            } else {
                return Err(PersistenceError::RunAlreadyExists(run_id));
            }
        }

        state
            .store
            .persist_delta(self.kernel.config(), &self.kernel.status(), &[], &[])?;
        self.last_persistence_error = None;
        Ok(())
    }

    pub fn flush_persistence_checked(&mut self) -> Result<(), PersistenceError> {
        let Some(state) = self.persistence.as_mut() else {
            return Err(PersistenceError::NotAttached);
        };

        let new_commands = &self.command_log[state.persisted_command_count..];
        let new_events = &self.kernel.events()[state.persisted_event_count..];
        state.store.persist_delta(
            self.kernel.config(),
            &self.kernel.status(),
            new_commands,
            new_events,
        )?;
        state.persisted_command_count = self.command_log.len();
        state.persisted_event_count = self.kernel.events().len();
        Ok(())
    }

    /// Best-effort flush: audit persistence must never fail the drive, so
    /// errors land in `last_persistence_error` instead of propagating.
    fn flush_persistence(&mut self) {
        if self.persistence.is_none() {
            return;
        }
        match self.flush_persistence_checked() {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => self.last_persistence_error = Some(err.to_string()),
        }
    }

    /// Advance the simulated host and the kernel together. Returns the
    /// status after stepping and the number of ticks actually committed.
    pub fn step_ticks(&mut self, steps: u64) -> (GraftStatus, u64) {
        let command = self.make_command(
            CommandType::StepTick,
            CommandPayload::StepTick { steps },
        );
        let result = if steps == 0 {
            CommandResult::rejected(
                &command,
                ApiError::new(
                    ErrorCode::InvalidCommand,
                    "steps must be greater than zero",
                    None,
                ),
            )
        } else {
            CommandResult::accepted(&command)
        };
        let accepted = result.accepted;
        self.record_command(command, result);

        let mut committed = 0_u64;
        if accepted {
            for _ in 0..steps {
                self.host.advance_host_tick();
                if !self.kernel.tick(&mut self.host) {
                    break;
                }
                committed += 1;
            }
        }

        self.flush_persistence();
        (self.kernel.status(), committed)
    }

    pub fn draw_household(
        &mut self,
        max_attempts: Option<u32>,
    ) -> (CommandResult, Option<Household>) {
        let command = self.make_command(
            CommandType::DrawHousehold,
            CommandPayload::DrawHousehold { max_attempts },
        );

        if let Some(budget) = max_attempts {
            if budget == 0 || budget > MAX_DRAW_ATTEMPTS {
                let result = CommandResult::rejected(
                    &command,
                    ApiError::new(
                        ErrorCode::InvalidCommand,
                        "max_attempts must be between 1 and 32",
                        Some(format!("max_attempts={budget}")),
                    ),
                );
                self.record_command(command, result.clone());
                self.flush_persistence();
                return (result, None);
            }
        }

        let household = self.kernel.draw_household(&self.host, max_attempts);
        let result = CommandResult::accepted(&command);
        self.record_command(command, result.clone());
        self.flush_persistence();
        (result, household)
    }

    pub fn release_resident(&mut self, resident_id: ResidentId) -> (CommandResult, bool) {
        let command = self.make_command(
            CommandType::ReleaseResident,
            CommandPayload::ReleaseResident { resident_id },
        );

        if resident_id == 0 {
            let result = CommandResult::rejected(
                &command,
                ApiError::new(
                    ErrorCode::InvalidCommand,
                    "resident_id must be a live identifier",
                    None,
                ),
            );
            self.record_command(command, result.clone());
            self.flush_persistence();
            return (result, false);
        }

        let was_reserved = self.kernel.release_resident(resident_id);
        let result = CommandResult::accepted(&command);
        self.record_command(command, result.clone());
        self.flush_persistence();
        (result, was_reserved)
    }

    fn make_command(&mut self, command_type: CommandType, payload: CommandPayload) -> Command {
        let command_id = format!("cmd:{:06}", self.next_command_number);
        self.next_command_number += 1;
        Command::new(
            command_id,
            self.kernel.run_id(),
            self.kernel.current_tick(),
            command_type,
            payload,
        )
    }

    fn record_command(&mut self, command: Command, result: CommandResult) {
        let effective_tick = self.kernel.current_tick();
        self.command_log.push(PersistedCommandEntry {
            command,
            result,
            effective_tick,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> GraftConfig {
        let mut config = GraftConfig::default();
        config.max_ticks = 120;
        config.pool_refresh_interval_ticks = 10;
        config
    }

    #[test]
    fn stepping_drives_the_graft_to_completion() {
        let mut api = GraftApi::from_config(fast_config());
        let (status, committed) = api.step_ticks(60);
        assert_eq!(committed, 60);
        assert!(status.migration_done);
        assert!(status.bootstrap_armed);
    }

    #[test]
    fn zero_step_command_is_rejected_without_stepping() {
        let mut api = GraftApi::from_config(fast_config());
        let (status, committed) = api.step_ticks(0);
        assert_eq!(committed, 0);
        assert_eq!(status.current_tick, 0);
        assert!(!api.command_audit()[0].result.accepted);
    }

    #[test]
    fn draw_validation_rejects_out_of_range_budgets() {
        let mut api = GraftApi::from_config(fast_config());
        api.step_ticks(2);

        let (result, household) = api.draw_household(Some(0));
        assert!(!result.accepted);
        assert!(household.is_none());

        let (result, household) = api.draw_household(Some(MAX_DRAW_ATTEMPTS + 1));
        assert!(!result.accepted);
        assert!(household.is_none());
    }

    #[test]
    fn draw_and_release_flow_persists_an_audit_trail() {
        let mut api = GraftApi::from_config(fast_config());
        api.attach_in_memory_store().expect("attach store");
        api.initialize_run_storage(true).expect("init storage");

        api.step_ticks(2);
        let (result, household) = api.draw_household(Some(16));
        assert!(result.accepted);
        let household = household.expect("seeded registry yields a household");

        let member = household
            .occupied_members()
            .next()
            .expect("occupied member");
        let (release_result, _) = api.release_resident(member);
        assert!(release_result.accepted);

        assert!(api.last_persistence_error().is_none());
        assert_eq!(api.command_audit().len(), 3);
    }

    #[test]
    fn duplicate_run_storage_requires_replace() {
        let mut api = GraftApi::from_config(fast_config());
        api.attach_in_memory_store().expect("attach store");
        api.initialize_run_storage(true).expect("first init");

        let err = api.initialize_run_storage(false).expect_err("conflict");
        assert!(matches!(err, PersistenceError::RunAlreadyExists(_)));
        api.initialize_run_storage(true).expect("replace");
    }
}
