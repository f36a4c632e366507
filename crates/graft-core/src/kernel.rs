//! Kernel facade: drives bootstrap, the staged graft, and the candidate pool
//! one host tick at a time, recording everything in a structured event log.

use contracts::{
    Event, EventType, GraftConfig, GraftStatus, Household, LoadPhase, ResidentId, RunMode,
    SCHEMA_VERSION_V1,
};
use serde_json::{json, Value};

use crate::bootstrap::{BootstrapDecision, BootstrapGate, HostLoadState, PostLoadAction, TemplateCatalog};
use crate::graph::HostGraph;
use crate::migration::{MenuMigration, StepActivity};
use crate::pool::{PoolActivity, ResidentPool};
use crate::registry::ResidentRegistry;
use crate::synthetic_timestamp;

/// Everything the kernel needs from the host, as one injected object.
pub trait GraftHost: HostGraph + HostLoadState + TemplateCatalog + ResidentRegistry {}

impl<T> GraftHost for T where T: HostGraph + HostLoadState + TemplateCatalog + ResidentRegistry {}

#[derive(Debug)]
pub struct GraftKernel {
    config: GraftConfig,
    current_tick: u64,
    observed_phase: LoadPhase,
    bootstrap: BootstrapGate,
    graft_active: bool,
    migration: MenuMigration,
    pool: ResidentPool,
    event_log: Vec<Event>,
    sequence_in_tick: u64,
    next_event_number: u64,
}

impl GraftKernel {
    pub fn new(config: GraftConfig) -> Self {
        let bootstrap = BootstrapGate::new(config.template_search_limit);
        let pool = ResidentPool::new(config.seed, config.pool_refresh_interval_ticks);
        Self {
            config,
            current_tick: 0,
            observed_phase: LoadPhase::NotLoaded,
            bootstrap,
            graft_active: false,
            migration: MenuMigration::new(),
            pool,
            event_log: Vec::new(),
            sequence_in_tick: 0,
            next_event_number: 0,
        }
    }

    pub fn config(&self) -> &GraftConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.config.run_id
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn events(&self) -> &[Event] {
        &self.event_log
    }

    pub fn migration_report(&self) -> contracts::MigrationReport {
        self.migration.report()
    }

    pub fn pool_report(&self) -> contracts::PoolReport {
        self.pool.report()
    }

    pub fn status(&self) -> GraftStatus {
        let mode = if self.current_tick >= self.config.max_ticks {
            RunMode::Paused
        } else {
            RunMode::Running
        };
        GraftStatus {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            current_tick: self.current_tick,
            max_ticks: self.config.max_ticks,
            mode,
            load_phase: self.observed_phase,
            bootstrap_armed: self.bootstrap.is_armed(),
            graft_active: self.graft_active,
            migration_done: self.migration.is_done(),
            pool_size: self.pool.snapshot_len() as u32,
            reserved_count: self.pool.reserved_count() as u32,
        }
    }

    /// One kernel tick against the host. Returns `false` once the run's
    /// tick budget is exhausted.
    pub fn tick<H: GraftHost>(&mut self, host: &mut H) -> bool {
        if self.current_tick >= self.config.max_ticks {
            return false;
        }
        self.current_tick += 1;
        self.sequence_in_tick = 0;
        self.observed_phase = host.load_phase();

        if !self.bootstrap.is_armed() {
            let decision = self.bootstrap.poll(host);
            self.record_bootstrap(decision);
        }

        for action in host.take_due_actions() {
            match action {
                PostLoadAction::BeginMenuGraft => self.graft_active = true,
            }
        }

        match self.pool.on_tick(self.current_tick, host) {
            PoolActivity::Idle => {}
            PoolActivity::SkippedBusy => self.emit(EventType::PoolRefreshSkipped, None),
            PoolActivity::Refreshed { pool_size } => self.emit(
                EventType::PoolRefreshed,
                Some(json!({ "pool_size": pool_size })),
            ),
        }

        if self.graft_active && !self.migration.is_done() {
            let report = self.migration.attempt_step(host);
            for activity in report.activities {
                self.record_step_activity(activity);
            }
        }

        true
    }

    pub fn tick_n<H: GraftHost>(&mut self, host: &mut H, n: u64) -> u64 {
        let mut committed = 0_u64;
        for _ in 0..n {
            if !self.tick(host) {
                break;
            }
            committed += 1;
        }
        committed
    }

    /// Draw a household and reserve its candidate members. `None` is a
    /// normal outcome: busy engine, empty pool, or exhausted attempts.
    pub fn draw_household(
        &mut self,
        registry: &dyn ResidentRegistry,
        max_attempts: Option<u32>,
    ) -> Option<Household> {
        let budget = max_attempts.unwrap_or(self.config.draw_attempt_budget);
        match self.pool.draw(budget, registry) {
            Some(household) => {
                let members = household.occupied_members().collect::<Vec<_>>();
                self.emit(
                    EventType::HouseholdDrawn,
                    Some(json!({
                        "household_id": household.household_id,
                        "members": members,
                    })),
                );
                Some(household)
            }
            None => {
                self.emit(
                    EventType::DrawExhausted,
                    Some(json!({ "max_attempts": budget })),
                );
                None
            }
        }
    }

    /// Release a reservation. Idempotent; callable at any time.
    pub fn release_resident(&mut self, id: ResidentId) -> bool {
        let was_reserved = self.pool.release(id);
        self.emit(
            EventType::ResidentReleased,
            Some(json!({ "resident_id": id, "was_reserved": was_reserved })),
        );
        was_reserved
    }

    /// Content refresh of the migrated menu, for external callers. Always
    /// reports success.
    pub fn refresh_menu(&mut self, graph: &mut dyn HostGraph) -> bool {
        self.migration.refresh_panel(graph)
    }

    pub fn is_reserved(&self, id: ResidentId) -> bool {
        self.pool.is_reserved(id)
    }

    fn record_bootstrap(&mut self, decision: BootstrapDecision) {
        match decision {
            BootstrapDecision::AlreadyArmed
            | BootstrapDecision::Busy
            | BootstrapDecision::NotReady => {}
            BootstrapDecision::ArmedDegraded => {
                self.emit(EventType::LoadingCompletedBeforeArm, None);
                self.emit(EventType::BootstrapArmed, Some(json!({ "degraded": true })));
            }
            BootstrapDecision::Armed {
                template,
                used_fallback,
            } => {
                let event_type = if used_fallback {
                    EventType::TemplateFallbackUsed
                } else {
                    EventType::TemplateLocated
                };
                self.emit(event_type, Some(json!({ "template": template.name })));
                self.emit(EventType::BootstrapArmed, Some(json!({ "degraded": false })));
            }
        }
    }

    fn record_step_activity(&mut self, activity: StepActivity) {
        match activity {
            StepActivity::BaselineRefreshed => self.emit(EventType::BaselineRefreshed, None),
            StepActivity::ReplacedServicesPanel => {
                self.emit(EventType::ServicesPanelReplaced, None)
            }
            StepActivity::CreatedAnnexTab => self.emit(EventType::AnnexTabCreated, None),
            StepActivity::AttachedAnnexPanel => self.emit(EventType::AnnexPanelAttached, None),
            StepActivity::TabCountMismatch { found } => self.emit(
                EventType::TabCountMismatch,
                Some(json!({ "found": found, "expected": 2 })),
            ),
            StepActivity::LegacyChildrenDraining { remaining } => self.emit(
                EventType::LegacyChildrenDraining,
                Some(json!({ "remaining": remaining })),
            ),
            StepActivity::CustomRefreshFaulted { message } => self.emit(
                EventType::CustomRefreshFaulted,
                Some(json!({ "message": message })),
            ),
            StepActivity::GraftCompleted => self.emit(EventType::MenuGraftCompleted, None),
        }
    }

    fn emit(&mut self, event_type: EventType, details: Option<Value>) {
        let event_id = format!("evt:{:06}", self.next_event_number);
        self.next_event_number += 1;
        let event = Event {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            run_id: self.config.run_id.clone(),
            tick: self.current_tick,
            created_at: synthetic_timestamp(self.current_tick, self.sequence_in_tick),
            event_id,
            sequence_in_tick: self.sequence_in_tick,
            event_type,
            details,
        };
        self.sequence_in_tick += 1;
        self.event_log.push(event);
    }
}
