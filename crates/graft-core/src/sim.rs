//! Deterministic simulated host.
//!
//! Stands in for the real host in tests and local drives: a tab-strip object
//! graph whose mutations land with a configurable tick latency, a seeded
//! resident registry, a template catalog, and a load-phase timeline, all
//! derived from the run seed so every drive replays identically.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{FacilityId, GraftConfig, HouseholdId, LoadPhase, ResidentId, MEMBERS_PER_HOUSEHOLD};

use crate::bootstrap::{
    HostLoadState, PostLoadAction, ServiceKind, TemplateCatalog, TemplateRecord, TEMPLATE_NODE_NAME,
};
use crate::graph::{
    ComponentType, GraphFault, HostGraph, NodeRef, ANNEX_TAB_NODE, SERVICES_TAB_NODE,
    TAB_STRIP_NODE,
};
use crate::registry::{FacilityKind, HouseholdRecord, ResidentRecord, ResidentRegistry};
use crate::rng::Randomizer;

/// Stock buttons the host seeds onto a freshly created services panel.
const LEGACY_BUTTON_COUNT: usize = 3;

/// Facility ids above this bound are annex facilities in the seeded world.
const STOCK_FACILITY_COUNT: u32 = 8;
const ANNEX_FACILITY_COUNT: u32 = 2;

#[derive(Debug)]
struct SimNode {
    name: Option<String>,
    component: Option<ComponentType>,
    children: Vec<NodeRef>,
    parent: Option<NodeRef>,
}

#[derive(Debug)]
enum PendingOp {
    Destroy(NodeRef),
    Create {
        container: NodeRef,
        component: ComponentType,
    },
    RemoveChildren(NodeRef),
}

#[derive(Debug)]
pub struct SimulatedHost {
    host_tick: u64,
    mutation_latency: u64,
    load_ready_tick: u64,
    phase: LoadPhase,
    pending: Vec<(u64, PendingOp)>,
    queued_actions: Vec<PostLoadAction>,

    nodes: BTreeMap<NodeRef, SimNode>,
    next_ref: NodeRef,
    strip: NodeRef,
    structural_requests: u64,
    refresh_count: u64,
    fault_next_refresh: bool,
    extra_tab: Option<NodeRef>,

    templates: Vec<TemplateRecord>,
    templates_ready_tick: u64,

    households: Vec<[ResidentId; MEMBERS_PER_HOUSEHOLD]>,
    residents: BTreeMap<ResidentId, ResidentRecord>,
    annex_facilities: BTreeSet<FacilityId>,
}

impl SimulatedHost {
    pub fn from_config(config: &GraftConfig) -> Self {
        let mut rng = Randomizer::new(config.seed);

        let mut host = Self {
            host_tick: 0,
            mutation_latency: config.mutation_latency_ticks,
            load_ready_tick: config.load_ready_tick,
            phase: LoadPhase::Game,
            pending: Vec::new(),
            queued_actions: Vec::new(),
            nodes: BTreeMap::new(),
            next_ref: 1,
            strip: 0,
            structural_requests: 0,
            refresh_count: 0,
            fault_next_refresh: false,
            extra_tab: None,
            templates: Vec::new(),
            templates_ready_tick: 1,
            households: vec![[0; MEMBERS_PER_HOUSEHOLD]],
            residents: BTreeMap::new(),
            annex_facilities: (STOCK_FACILITY_COUNT + 1
                ..=STOCK_FACILITY_COUNT + ANNEX_FACILITY_COUNT)
                .collect(),
        };

        host.seed_graph();
        host.seed_templates(config);
        host.seed_registry(config, &mut rng);
        host
    }

    fn seed_graph(&mut self) {
        let strip = self.mint_node(Some(TAB_STRIP_NODE), None, None);
        self.strip = strip;
        let services_tab = self.mint_node(Some(SERVICES_TAB_NODE), None, Some(strip));
        let stock_panel = self.mint_node(None, Some(ComponentType::StockServicesPanel), Some(services_tab));
        for _ in 0..LEGACY_BUTTON_COUNT {
            self.mint_node(None, None, Some(stock_panel));
        }
    }

    fn seed_templates(&mut self, config: &GraftConfig) {
        if !config.scenario_flag("drop_commons_template") {
            self.templates.push(TemplateRecord {
                name: TEMPLATE_NODE_NAME.to_string(),
                service: ServiceKind::Education,
                landmark: false,
            });
        }
        self.templates.push(TemplateRecord {
            name: "GrandLibrary".to_string(),
            service: ServiceKind::Education,
            landmark: true,
        });
        self.templates.push(TemplateRecord {
            name: "FieldHospital".to_string(),
            service: ServiceKind::Healthcare,
            landmark: false,
        });
        self.templates.push(TemplateRecord {
            name: "TradeSchool".to_string(),
            service: ServiceKind::Education,
            landmark: false,
        });
        self.templates.push(TemplateRecord {
            name: "RowHouses".to_string(),
            service: ServiceKind::Residential,
            landmark: false,
        });
    }

    fn seed_registry(&mut self, config: &GraftConfig, rng: &mut Randomizer) {
        let mut next_resident: ResidentId = 1000;
        for _ in 1..=config.household_count {
            let mut members = [0; MEMBERS_PER_HOUSEHOLD];
            let occupied = 1 + rng.index(MEMBERS_PER_HOUSEHOLD);
            for slot in members.iter_mut().take(occupied) {
                let id = next_resident;
                next_resident += 1;

                let homeless = rng.chance(1, 20);
                let home_facility = if homeless {
                    0
                } else {
                    1 + rng.index((STOCK_FACILITY_COUNT + ANNEX_FACILITY_COUNT) as usize) as u32
                };
                self.residents.insert(
                    id,
                    ResidentRecord {
                        id,
                        placement_candidate: rng.chance(2, 5),
                        dead: rng.chance(1, 20),
                        home_facility,
                    },
                );
                *slot = id;
            }
            self.households.push(members);
        }
    }

    fn mint_node(
        &mut self,
        name: Option<&str>,
        component: Option<ComponentType>,
        parent: Option<NodeRef>,
    ) -> NodeRef {
        let node_ref = self.next_ref;
        self.next_ref += 1;
        self.nodes.insert(
            node_ref,
            SimNode {
                name: name.map(str::to_string),
                component,
                children: Vec::new(),
                parent,
            },
        );
        if let Some(parent_ref) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_ref) {
                parent_node.children.push(node_ref);
            }
        }
        node_ref
    }

    fn drop_subtree(&mut self, node_ref: NodeRef) {
        let Some(node) = self.nodes.remove(&node_ref) else {
            return;
        };
        if let Some(parent_ref) = node.parent {
            if let Some(parent) = self.nodes.get_mut(&parent_ref) {
                parent.children.retain(|child| *child != node_ref);
            }
        }
        for child in node.children {
            self.drop_subtree(child);
        }
    }

    /// Advance the host's own clock by one tick, landing any mutation whose
    /// latency has elapsed.
    pub fn advance_host_tick(&mut self) {
        self.host_tick += 1;
        let due = self
            .pending
            .iter()
            .take_while(|(land_at, _)| *land_at <= self.host_tick)
            .count();
        for (_, op) in self.pending.drain(..due).collect::<Vec<_>>() {
            self.apply(op);
        }
    }

    fn apply(&mut self, op: PendingOp) {
        match op {
            PendingOp::Destroy(node_ref) => self.drop_subtree(node_ref),
            PendingOp::Create {
                container,
                component,
            } => {
                if !self.nodes.contains_key(&container) {
                    return;
                }
                let name = match component {
                    ComponentType::AnnexTab => Some(ANNEX_TAB_NODE),
                    _ => None,
                };
                let created = self.mint_node(name, Some(component), Some(container));
                // The host auto-populates a fresh services panel with its
                // stock buttons.
                if component == ComponentType::CustomServicesPanel {
                    for _ in 0..LEGACY_BUTTON_COUNT {
                        self.mint_node(None, None, Some(created));
                    }
                }
            }
            PendingOp::RemoveChildren(node_ref) => {
                let children = self
                    .nodes
                    .get(&node_ref)
                    .map(|node| node.children.clone())
                    .unwrap_or_default();
                for child in children {
                    self.drop_subtree(child);
                }
            }
        }
    }

    fn land_tick(&self) -> u64 {
        self.host_tick + self.mutation_latency.max(1)
    }

    pub fn host_tick(&self) -> u64 {
        self.host_tick
    }

    pub fn structural_mutation_requests(&self) -> u64 {
        self.structural_requests
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_count
    }

    pub fn inject_refresh_fault_once(&mut self) {
        self.fault_next_refresh = true;
    }

    /// Immediately wedge an extra tab onto the strip, bypassing latency.
    pub fn insert_extra_tab(&mut self) {
        if self.extra_tab.is_none() {
            let strip = self.strip;
            self.extra_tab = Some(self.mint_node(Some("ExtraTab"), None, Some(strip)));
        }
    }

    pub fn remove_extra_tab(&mut self) {
        if let Some(tab) = self.extra_tab.take() {
            self.drop_subtree(tab);
        }
    }

    /// Rehouse a resident, e.g. after a consumer finishes placing them into
    /// an annex facility.
    pub fn set_home_facility(&mut self, resident: ResidentId, facility: FacilityId) {
        if let Some(record) = self.residents.get_mut(&resident) {
            record.home_facility = facility;
        }
    }

    pub fn first_annex_facility(&self) -> FacilityId {
        STOCK_FACILITY_COUNT + 1
    }
}

impl HostGraph for SimulatedHost {
    fn find_node(&self, identifier: &str) -> Option<NodeRef> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name.as_deref() == Some(identifier))
            .map(|(node_ref, _)| *node_ref)
    }

    fn resolve_component(&self, container: NodeRef, component: ComponentType) -> Option<NodeRef> {
        let node = self.nodes.get(&container)?;
        node.children
            .iter()
            .find(|child| {
                self.nodes
                    .get(child)
                    .is_some_and(|candidate| candidate.component == Some(component))
            })
            .copied()
    }

    fn destroy(&mut self, node: NodeRef) {
        self.structural_requests += 1;
        let land_at = self.land_tick();
        self.pending.push((land_at, PendingOp::Destroy(node)));
    }

    fn create_component(&mut self, container: NodeRef, component: ComponentType) {
        self.structural_requests += 1;
        let land_at = self.land_tick();
        self.pending.push((
            land_at,
            PendingOp::Create {
                container,
                component,
            },
        ));
    }

    fn child_count(&self, container: NodeRef) -> usize {
        self.nodes
            .get(&container)
            .map(|node| node.children.len())
            .unwrap_or(0)
    }

    fn remove_all_children(&mut self, container: NodeRef) {
        self.structural_requests += 1;
        let land_at = self.land_tick();
        self.pending.push((land_at, PendingOp::RemoveChildren(container)));
    }

    fn refresh_content(&mut self, _container: NodeRef) -> Result<(), GraphFault> {
        self.refresh_count += 1;
        if self.fault_next_refresh {
            self.fault_next_refresh = false;
            return Err(GraphFault::new("simulated content refresh fault"));
        }
        Ok(())
    }
}

impl HostLoadState for SimulatedHost {
    fn load_phase(&self) -> LoadPhase {
        self.phase
    }

    fn loading_complete(&self) -> bool {
        self.host_tick >= self.load_ready_tick
    }

    fn queue_after_current_load(&mut self, action: PostLoadAction) {
        self.queued_actions.push(action);
    }

    fn take_due_actions(&mut self) -> Vec<PostLoadAction> {
        std::mem::take(&mut self.queued_actions)
    }
}

impl TemplateCatalog for SimulatedHost {
    fn loaded_count(&self) -> u32 {
        if self.host_tick >= self.templates_ready_tick {
            self.templates.len() as u32
        } else {
            0
        }
    }

    fn find_by_name(&self, name: &str) -> Option<TemplateRecord> {
        if self.loaded_count() == 0 {
            return None;
        }
        self.templates
            .iter()
            .find(|record| record.name == name)
            .cloned()
    }

    fn template(&self, index: u32) -> Option<TemplateRecord> {
        if self.loaded_count() == 0 {
            return None;
        }
        self.templates.get(index as usize).cloned()
    }
}

impl ResidentRegistry for SimulatedHost {
    fn household_count(&self) -> HouseholdId {
        self.households.len() as HouseholdId
    }

    fn household(&self, id: HouseholdId) -> Option<HouseholdRecord> {
        if id == 0 {
            return None;
        }
        self.households
            .get(id as usize)
            .map(|members| HouseholdRecord {
                id,
                members: *members,
            })
    }

    fn resident(&self, id: ResidentId) -> Option<ResidentRecord> {
        self.residents.get(&id).copied()
    }

    fn facility_kind(&self, id: FacilityId) -> Option<FacilityKind> {
        if id == 0 || id > STOCK_FACILITY_COUNT + ANNEX_FACILITY_COUNT {
            return None;
        }
        if self.annex_facilities.contains(&id) {
            Some(FacilityKind::Annex)
        } else {
            Some(FacilityKind::Stock)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_builds_the_same_registry() {
        let config = GraftConfig::default();
        let a = SimulatedHost::from_config(&config);
        let b = SimulatedHost::from_config(&config);
        assert_eq!(a.households, b.households);
        assert_eq!(a.residents, b.residents);
    }

    #[test]
    fn mutations_land_after_the_configured_latency() {
        let config = GraftConfig::default();
        let mut host = SimulatedHost::from_config(&config);
        let strip = host.find_node(TAB_STRIP_NODE).expect("strip");

        host.create_component(strip, ComponentType::AnnexTab);
        assert!(host.find_node(ANNEX_TAB_NODE).is_none());
        host.advance_host_tick();
        assert!(host.find_node(ANNEX_TAB_NODE).is_none());
        host.advance_host_tick();
        assert!(host.find_node(ANNEX_TAB_NODE).is_some());
    }

    #[test]
    fn destroy_prunes_the_whole_subtree() {
        let config = GraftConfig::default();
        let mut host = SimulatedHost::from_config(&config);
        let services_tab = host.find_node(SERVICES_TAB_NODE).expect("services tab");
        let stock = host
            .resolve_component(services_tab, ComponentType::StockServicesPanel)
            .expect("stock panel");
        assert_eq!(host.child_count(stock), LEGACY_BUTTON_COUNT);

        host.destroy(stock);
        host.advance_host_tick();
        host.advance_host_tick();
        assert!(host
            .resolve_component(services_tab, ComponentType::StockServicesPanel)
            .is_none());
        assert_eq!(host.child_count(stock), 0);
    }

    #[test]
    fn dropping_the_commons_template_leaves_a_usable_fallback() {
        let mut config = GraftConfig::default();
        config
            .scenario_flags
            .insert("drop_commons_template".to_string(), true);
        let mut host = SimulatedHost::from_config(&config);
        host.advance_host_tick();

        assert!(host.find_by_name(TEMPLATE_NODE_NAME).is_none());
        let usable = (0..host.loaded_count())
            .filter_map(|index| host.template(index))
            .find(|record| record.usable_as_template());
        assert_eq!(usable.expect("fallback present").name, "TradeSchool");
    }
}
