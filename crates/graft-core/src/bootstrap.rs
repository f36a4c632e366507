//! Bootstrap gating: decide when the graft may begin.
//!
//! The host loads assets over many ticks and the graft must not start until
//! the template facility it copies from is available. Polled once per tick
//! behind a CAS guard; once armed it never polls again. If the host finishes
//! loading before the gate arms, the gate arms anyway in a degraded state so
//! the driver stops burning ticks on a graft that can no longer help.

use contracts::LoadPhase;

use crate::gate::TickGate;

/// Well-known name of the stock facility the annex wing copies its stats
/// from.
pub const TEMPLATE_NODE_NAME: &str = "CampusCommons";

/// One-shot work the host runs once the current load phase has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostLoadAction {
    BeginMenuGraft,
}

/// Host loading surface. The action queue is a host capability: the kernel
/// never reaches into host internals to reorder queued work.
pub trait HostLoadState {
    fn load_phase(&self) -> LoadPhase;

    fn loading_complete(&self) -> bool;

    /// Schedule a one-shot action to run after the current load phase
    /// completes.
    fn queue_after_current_load(&mut self, action: PostLoadAction);

    /// Hand back queued actions whose load phase has completed. Drained by
    /// the driver once per tick.
    fn take_due_actions(&mut self) -> Vec<PostLoadAction>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Education,
    Healthcare,
    Residential,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRecord {
    pub name: String,
    pub service: ServiceKind,
    pub landmark: bool,
}

impl TemplateRecord {
    /// Whether this record can stand in for the named template.
    pub fn usable_as_template(&self) -> bool {
        self.service == ServiceKind::Education && !self.landmark
    }
}

pub trait TemplateCatalog {
    /// Number of catalog records loaded so far; grows while the host loads.
    fn loaded_count(&self) -> u32;

    fn find_by_name(&self, name: &str) -> Option<TemplateRecord>;

    fn template(&self, index: u32) -> Option<TemplateRecord>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapDecision {
    AlreadyArmed,
    Busy,
    NotReady,
    /// Loading finished before the gate armed; armed anyway so polling
    /// stops, but the graft may not function.
    ArmedDegraded,
    Armed {
        template: TemplateRecord,
        used_fallback: bool,
    },
}

#[derive(Debug)]
pub struct BootstrapGate {
    armed: bool,
    attempting: TickGate,
    template_lookups: u32,
    search_limit: u32,
}

impl BootstrapGate {
    pub fn new(search_limit: u32) -> Self {
        Self {
            armed: false,
            attempting: TickGate::new(),
            template_lookups: 0,
            search_limit: search_limit.max(1),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn poll<H>(&mut self, host: &mut H) -> BootstrapDecision
    where
        H: HostLoadState + TemplateCatalog + ?Sized,
    {
        if self.armed {
            return BootstrapDecision::AlreadyArmed;
        }
        // The host callback is not guaranteed non-overlapping; lose the
        // swap and try again next tick.
        if !self.attempting.try_enter() {
            return BootstrapDecision::Busy;
        }

        let decision = self.poll_inner(host);
        if matches!(
            decision,
            BootstrapDecision::Armed { .. } | BootstrapDecision::ArmedDegraded
        ) {
            self.armed = true;
            self.template_lookups = 0;
        }
        self.attempting.release();
        decision
    }

    fn poll_inner<H>(&mut self, host: &mut H) -> BootstrapDecision
    where
        H: HostLoadState + TemplateCatalog + ?Sized,
    {
        // Loading already over: arming now cannot help, but continue the
        // attempt so a late template still gets the graft queued.
        let degraded = host.loading_complete();

        if host.loaded_count() == 0 {
            return if degraded {
                BootstrapDecision::ArmedDegraded
            } else {
                BootstrapDecision::NotReady
            };
        }

        let Some((template, used_fallback)) = self.locate_template(host) else {
            return if degraded {
                BootstrapDecision::ArmedDegraded
            } else {
                BootstrapDecision::NotReady
            };
        };

        if host.load_phase() == LoadPhase::Game {
            host.queue_after_current_load(PostLoadAction::BeginMenuGraft);
        }
        BootstrapDecision::Armed {
            template,
            used_fallback,
        }
    }

    /// Look up the well-known template first; after enough failed lookups,
    /// fall back to scanning the catalog for any usable record.
    fn locate_template(
        &mut self,
        catalog: &(impl TemplateCatalog + ?Sized),
    ) -> Option<(TemplateRecord, bool)> {
        if let Some(record) = catalog.find_by_name(TEMPLATE_NODE_NAME) {
            return Some((record, false));
        }

        self.template_lookups += 1;
        if self.template_lookups < self.search_limit {
            return None;
        }

        for index in 0..catalog.loaded_count() {
            if let Some(record) = catalog.template(index) {
                if record.usable_as_template() {
                    return Some((record, true));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct HostFixture {
        phase: LoadPhase,
        complete: bool,
        queued: Vec<PostLoadAction>,
        records: Vec<TemplateRecord>,
    }

    impl HostLoadState for HostFixture {
        fn load_phase(&self) -> LoadPhase {
            self.phase
        }

        fn loading_complete(&self) -> bool {
            self.complete
        }

        fn queue_after_current_load(&mut self, action: PostLoadAction) {
            self.queued.push(action);
        }

        fn take_due_actions(&mut self) -> Vec<PostLoadAction> {
            std::mem::take(&mut self.queued)
        }
    }

    impl TemplateCatalog for HostFixture {
        fn loaded_count(&self) -> u32 {
            self.records.len() as u32
        }

        fn find_by_name(&self, name: &str) -> Option<TemplateRecord> {
            self.records.iter().find(|record| record.name == name).cloned()
        }

        fn template(&self, index: u32) -> Option<TemplateRecord> {
            self.records.get(index as usize).cloned()
        }
    }

    fn game_fixture(records: Vec<TemplateRecord>) -> HostFixture {
        HostFixture {
            phase: LoadPhase::Game,
            complete: false,
            queued: Vec::new(),
            records,
        }
    }

    fn commons() -> TemplateRecord {
        TemplateRecord {
            name: TEMPLATE_NODE_NAME.to_string(),
            service: ServiceKind::Education,
            landmark: false,
        }
    }

    #[test]
    fn arms_and_queues_graft_when_template_is_named() {
        let mut host = game_fixture(vec![commons()]);
        let mut gate = BootstrapGate::new(5);

        let decision = gate.poll(&mut host);
        assert!(matches!(
            decision,
            BootstrapDecision::Armed {
                used_fallback: false,
                ..
            }
        ));
        assert!(gate.is_armed());
        assert_eq!(host.take_due_actions(), vec![PostLoadAction::BeginMenuGraft]);
        assert_eq!(gate.poll(&mut host), BootstrapDecision::AlreadyArmed);
    }

    #[test]
    fn waits_while_catalog_is_empty() {
        let mut host = game_fixture(Vec::new());
        let mut gate = BootstrapGate::new(5);

        assert_eq!(gate.poll(&mut host), BootstrapDecision::NotReady);
        assert!(!gate.is_armed());
        assert!(host.take_due_actions().is_empty());
    }

    #[test]
    fn falls_back_to_catalog_scan_after_enough_failed_lookups() {
        let mut host = game_fixture(vec![
            TemplateRecord {
                name: "GrandLibrary".to_string(),
                service: ServiceKind::Education,
                landmark: true,
            },
            TemplateRecord {
                name: "TradeSchool".to_string(),
                service: ServiceKind::Education,
                landmark: false,
            },
        ]);
        let mut gate = BootstrapGate::new(3);

        assert_eq!(gate.poll(&mut host), BootstrapDecision::NotReady);
        assert_eq!(gate.poll(&mut host), BootstrapDecision::NotReady);
        let decision = gate.poll(&mut host);
        let BootstrapDecision::Armed {
            template,
            used_fallback,
        } = decision
        else {
            panic!("expected fallback arm, got {decision:?}");
        };
        assert!(used_fallback);
        assert_eq!(template.name, "TradeSchool");
    }

    #[test]
    fn late_loading_completion_arms_degraded() {
        let mut host = game_fixture(Vec::new());
        host.complete = true;
        let mut gate = BootstrapGate::new(5);

        assert_eq!(gate.poll(&mut host), BootstrapDecision::ArmedDegraded);
        assert!(gate.is_armed());
        assert_eq!(gate.poll(&mut host), BootstrapDecision::AlreadyArmed);
    }

    #[test]
    fn editor_phase_arms_without_queueing_the_graft() {
        let mut host = game_fixture(vec![commons()]);
        host.phase = LoadPhase::AssetEditor;
        let mut gate = BootstrapGate::new(5);

        assert!(matches!(
            gate.poll(&mut host),
            BootstrapDecision::Armed { .. }
        ));
        assert!(host.take_due_actions().is_empty());
    }

    #[test]
    fn concurrent_poll_is_skipped() {
        let mut host = game_fixture(vec![commons()]);
        let mut gate = BootstrapGate::new(5);
        assert!(gate.attempting.try_enter());
        assert_eq!(gate.poll(&mut host), BootstrapDecision::Busy);
        gate.attempting.release();
    }
}
