//! Staged replacement of the host's stock services menu.
//!
//! The host cannot be paused and offers no atomic multi-object edits, so the
//! menu is converted one step per tick: replace the stock services panel,
//! add the annex tab, attach the annex panel, then drain and refresh. A
//! mutation issued this tick is not observable until the host has processed
//! more of its own ticks, so every mutating step ends the attempt
//! immediately and the next attempt re-inspects the graph before trusting
//! any completion flag.

use contracts::{MigrationReport, SCHEMA_VERSION_V1};

use crate::gate::TickGate;
use crate::graph::{
    ComponentType, GraphFault, HostGraph, ANNEX_TAB_NODE, SERVICES_TAB_NODE, TAB_STRIP_NODE,
};

/// Tab-strip children once the graft is complete: services + annex.
const EXPECTED_TAB_COUNT: usize = 2;

/// One completion marker per flag-gated step. A set flag means the step's
/// mutation has been issued at least once, not that the graph reflects it;
/// only re-inspection retires a flag.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepFlags {
    pub replaced_services_panel: bool,
    pub created_annex_tab: bool,
    pub attached_annex_panel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepActivity {
    BaselineRefreshed,
    ReplacedServicesPanel,
    CreatedAnnexTab,
    AttachedAnnexPanel,
    TabCountMismatch { found: usize },
    LegacyChildrenDraining { remaining: usize },
    CustomRefreshFaulted { message: String },
    GraftCompleted,
}

impl StepActivity {
    /// Whether this activity issued a structural mutation against the host
    /// graph this attempt.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::ReplacedServicesPanel
                | Self::CreatedAnnexTab
                | Self::AttachedAnnexPanel
                | Self::LegacyChildrenDraining { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub done: bool,
    pub activities: Vec<StepActivity>,
}

impl StepReport {
    fn pending(activities: Vec<StepActivity>) -> Self {
        Self {
            done: false,
            activities,
        }
    }
}

#[derive(Debug)]
struct RefreshOutcome {
    fault: Option<GraphFault>,
}

#[derive(Debug, Default)]
pub struct MenuMigration {
    started: bool,
    flags: StepFlags,
    done: bool,
    refreshing: TickGate,
}

impl MenuMigration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> MigrationReport {
        MigrationReport {
            schema_version: SCHEMA_VERSION_V1.to_string(),
            started: self.started,
            replaced_services_panel: self.flags.replaced_services_panel,
            created_annex_tab: self.flags.created_annex_tab,
            attached_annex_panel: self.flags.attached_annex_panel,
            done: self.done,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance the graft by at most one step. Invoked once per host tick by
    /// the driver until it returns `done = true`; after that it stays done
    /// and issues no further graph calls.
    pub fn attempt_step(&mut self, graph: &mut dyn HostGraph) -> StepReport {
        if self.done {
            return StepReport {
                done: true,
                activities: Vec::new(),
            };
        }

        let mut activities = Vec::new();

        // Baseline refresh runs exactly once, before any step, whatever the
        // current graph state. It consumes the whole attempt: one externally
        // visible action per tick.
        if !self.started {
            let outcome = self.internal_refresh_panel(graph, false);
            self.started = true;
            activities.push(StepActivity::BaselineRefreshed);
            if let Some(fault) = outcome.fault {
                activities.push(StepActivity::CustomRefreshFaulted {
                    message: fault.message,
                });
            }
            return StepReport::pending(activities);
        }

        let Some(strip) = graph.find_node(TAB_STRIP_NODE) else {
            return StepReport::pending(activities);
        };
        let Some(services_tab) = graph.find_node(SERVICES_TAB_NODE) else {
            return StepReport::pending(activities);
        };

        // Step: services panel must be the custom variant.
        let custom_panel = graph.resolve_component(services_tab, ComponentType::CustomServicesPanel);
        let Some(custom_panel) = custom_panel else {
            if self.flags.replaced_services_panel {
                // Replacement issued on an earlier tick and not landed yet.
                return StepReport::pending(activities);
            }
            if let Some(stock) =
                graph.resolve_component(services_tab, ComponentType::StockServicesPanel)
            {
                graph.destroy(stock);
            }
            graph.create_component(services_tab, ComponentType::CustomServicesPanel);
            self.flags.replaced_services_panel = true;
            activities.push(StepActivity::ReplacedServicesPanel);
            return StepReport::pending(activities);
        };

        // Step: annex tab must exist on the strip.
        let Some(annex_tab) = graph.find_node(ANNEX_TAB_NODE) else {
            if self.flags.created_annex_tab {
                return StepReport::pending(activities);
            }
            graph.create_component(strip, ComponentType::AnnexTab);
            self.flags.created_annex_tab = true;
            activities.push(StepActivity::CreatedAnnexTab);
            return StepReport::pending(activities);
        };

        // Step: annex tab must carry its panel.
        if graph
            .resolve_component(annex_tab, ComponentType::AnnexPanel)
            .is_none()
        {
            if self.flags.attached_annex_panel {
                return StepReport::pending(activities);
            }
            graph.create_component(annex_tab, ComponentType::AnnexPanel);
            self.flags.attached_annex_panel = true;
            activities.push(StepActivity::AttachedAnnexPanel);
            return StepReport::pending(activities);
        }

        // Pure precondition re-check, safe to repeat every tick unflagged.
        let tab_count = graph.child_count(strip);
        if tab_count != EXPECTED_TAB_COUNT {
            activities.push(StepActivity::TabCountMismatch { found: tab_count });
            return StepReport::pending(activities);
        }

        // Drain stock buttons left on the replaced panel; removal may take
        // more than one host tick, so re-check instead of flagging.
        let remaining = graph.child_count(custom_panel);
        if remaining > 0 {
            graph.remove_all_children(custom_panel);
            activities.push(StepActivity::LegacyChildrenDraining { remaining });
            return StepReport::pending(activities);
        }

        let outcome = self.internal_refresh_panel(graph, true);
        if let Some(fault) = outcome.fault {
            activities.push(StepActivity::CustomRefreshFaulted {
                message: fault.message,
            });
        }
        self.done = true;
        activities.push(StepActivity::GraftCompleted);
        StepReport {
            done: true,
            activities,
        }
    }

    /// Full content refresh of the migrated menu, exposed for external
    /// callers. Always reports success; a concurrent refresh covers the
    /// same work and a fault in the optional custom refresh must not stall
    /// the caller.
    pub fn refresh_panel(&mut self, graph: &mut dyn HostGraph) -> bool {
        let _ = self.internal_refresh_panel(graph, true);
        true
    }

    fn internal_refresh_panel(
        &mut self,
        graph: &mut dyn HostGraph,
        refresh_customs: bool,
    ) -> RefreshOutcome {
        if !self.refreshing.try_enter() {
            return RefreshOutcome { fault: None };
        }

        if refresh_customs {
            if let Err(fault) = self.refresh_custom_panels(graph) {
                self.refreshing.release();
                return RefreshOutcome { fault: Some(fault) };
            }
        }

        let mut fault = None;
        if let Some(strip) = graph.find_node(TAB_STRIP_NODE) {
            if let Err(base_fault) = graph.refresh_content(strip) {
                fault = Some(base_fault);
            }
        }

        self.refreshing.release();
        RefreshOutcome { fault }
    }

    /// Custom sub-panels can't be refreshed before the graft finishes
    /// creating them; both lookups tolerate absence.
    fn refresh_custom_panels(&self, graph: &mut dyn HostGraph) -> Result<(), GraphFault> {
        if let Some(services_tab) = graph.find_node(SERVICES_TAB_NODE) {
            if let Some(panel) =
                graph.resolve_component(services_tab, ComponentType::CustomServicesPanel)
            {
                graph.refresh_content(panel)?;
            }
        }

        if let Some(annex_tab) = graph.find_node(ANNEX_TAB_NODE) {
            if let Some(panel) = graph.resolve_component(annex_tab, ComponentType::AnnexPanel) {
                graph.refresh_content(panel)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedHost;
    use contracts::GraftConfig;

    fn host() -> SimulatedHost {
        SimulatedHost::from_config(&GraftConfig::default())
    }

    fn settle(host: &mut SimulatedHost) {
        // Default latency is two host ticks.
        host.advance_host_tick();
        host.advance_host_tick();
    }

    #[test]
    fn full_sequence_lands_in_expected_attempts() {
        let mut host = host();
        let mut migration = MenuMigration::new();

        // Attempt 1: baseline refresh only.
        let report = migration.attempt_step(&mut host);
        assert!(!report.done);
        assert_eq!(report.activities, vec![StepActivity::BaselineRefreshed]);
        assert_eq!(host.structural_mutation_requests(), 0);
        settle(&mut host);

        // Attempt 2: the panel replacement request.
        let report = migration.attempt_step(&mut host);
        assert_eq!(report.activities, vec![StepActivity::ReplacedServicesPanel]);
        settle(&mut host);

        // Attempt 3: annex tab creation.
        let report = migration.attempt_step(&mut host);
        assert_eq!(report.activities, vec![StepActivity::CreatedAnnexTab]);
        settle(&mut host);

        // Attempt 4: annex panel attachment.
        let report = migration.attempt_step(&mut host);
        assert_eq!(report.activities, vec![StepActivity::AttachedAnnexPanel]);
        settle(&mut host);

        // Attempt 5: drain of the stock buttons.
        let report = migration.attempt_step(&mut host);
        assert!(!report.done);
        assert!(matches!(
            report.activities[0],
            StepActivity::LegacyChildrenDraining { remaining } if remaining > 0
        ));
        settle(&mut host);

        // Attempt 6: terminal refresh.
        let report = migration.attempt_step(&mut host);
        assert!(report.done);
        assert!(report.activities.contains(&StepActivity::GraftCompleted));

        // Exactly three flag-gated mutations plus the drain request.
        assert_eq!(host.structural_mutation_requests(), 5);
    }

    #[test]
    fn at_most_one_mutating_activity_per_attempt() {
        let mut host = host();
        let mut migration = MenuMigration::new();

        for _ in 0..32 {
            let report = migration.attempt_step(&mut host);
            let mutations = report
                .activities
                .iter()
                .filter(|activity| activity.is_mutation())
                .count();
            assert!(mutations <= 1);
            if report.done {
                return;
            }
            host.advance_host_tick();
        }
        panic!("graft did not complete");
    }

    #[test]
    fn done_state_is_terminal_and_side_effect_free() {
        let mut host = host();
        let mut migration = MenuMigration::new();
        while !migration.attempt_step(&mut host).done {
            settle(&mut host);
        }

        let issued = host.structural_mutation_requests();
        for _ in 0..10 {
            let report = migration.attempt_step(&mut host);
            assert!(report.done);
            assert!(report.activities.is_empty());
        }
        assert_eq!(host.structural_mutation_requests(), issued);
    }

    #[test]
    fn pending_flag_suppresses_duplicate_replacement() {
        let mut host = host();
        let mut migration = MenuMigration::new();

        migration.attempt_step(&mut host);
        let second = migration.attempt_step(&mut host);
        assert!(second
            .activities
            .contains(&StepActivity::ReplacedServicesPanel));
        let issued = host.structural_mutation_requests();

        // Replacement has not landed; repeated attempts must only wait.
        for _ in 0..4 {
            let report = migration.attempt_step(&mut host);
            assert!(!report.done);
            assert!(report.activities.is_empty());
        }
        assert_eq!(host.structural_mutation_requests(), issued);
    }

    #[test]
    fn tab_count_mismatch_retries_without_flagging() {
        let mut host = host();
        let mut migration = MenuMigration::new();

        // Run to the structural check, then wedge an extra tab in.
        for _ in 0..4 {
            migration.attempt_step(&mut host);
            settle(&mut host);
        }
        host.insert_extra_tab();

        for _ in 0..5 {
            let report = migration.attempt_step(&mut host);
            assert!(!report.done);
            assert_eq!(
                report.activities,
                vec![StepActivity::TabCountMismatch { found: 3 }]
            );
        }

        host.remove_extra_tab();
        let report = migration.attempt_step(&mut host);
        assert!(matches!(
            report.activities.first(),
            Some(StepActivity::LegacyChildrenDraining { .. })
        ));
    }

    #[test]
    fn custom_refresh_fault_is_swallowed_and_graft_still_completes() {
        let mut host = host();
        let mut migration = MenuMigration::new();

        for _ in 0..5 {
            migration.attempt_step(&mut host);
            settle(&mut host);
        }

        host.inject_refresh_fault_once();
        let report = migration.attempt_step(&mut host);
        assert!(report.done);
        assert!(report
            .activities
            .iter()
            .any(|activity| matches!(activity, StepActivity::CustomRefreshFaulted { .. })));
        assert!(!migration.refresh_gate_held());
    }

    #[test]
    fn refresh_panel_reports_success_while_busy() {
        let mut host = host();
        let mut migration = MenuMigration::new();
        assert!(migration.refreshing.try_enter());
        assert!(migration.refresh_panel(&mut host));
        migration.refreshing.release();
    }

    impl MenuMigration {
        fn refresh_gate_held(&self) -> bool {
            self.refreshing.is_held()
        }
    }
}
