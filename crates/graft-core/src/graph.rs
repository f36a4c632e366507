//! Host object-graph boundary.
//!
//! The host owns the UI object graph; the kernel only inspects and mutates it
//! through this narrow adapter. Mutations are fire-and-forget: the host may
//! not reflect one until it has processed more of its own ticks, so callers
//! re-inspect on a later tick instead of trusting a mutation synchronously.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque node handle minted by the host graph. Handles stay valid until the
/// node is destroyed; a stale handle simply stops resolving.
pub type NodeRef = u64;

/// Well-known node identifiers in the host's services menu.
pub const TAB_STRIP_NODE: &str = "ServicesTabStrip";
pub const SERVICES_TAB_NODE: &str = "ServicesDefault";
pub const ANNEX_TAB_NODE: &str = "AnnexDefault";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    StockServicesPanel,
    CustomServicesPanel,
    AnnexTab,
    AnnexPanel,
}

/// Fault raised by a content refresh. Structural operations never fault;
/// absence is modeled as `None` from the resolve calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphFault {
    pub message: String,
}

impl GraphFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for GraphFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph refresh fault: {}", self.message)
    }
}

impl std::error::Error for GraphFault {}

pub trait HostGraph {
    fn find_node(&self, identifier: &str) -> Option<NodeRef>;

    /// Resolve a component of the given type attached under `container`.
    fn resolve_component(&self, container: NodeRef, component: ComponentType) -> Option<NodeRef>;

    /// Request destruction of a node. Takes effect on a later host tick.
    fn destroy(&mut self, node: NodeRef);

    /// Request creation of a component under `container`. Takes effect on a
    /// later host tick.
    fn create_component(&mut self, container: NodeRef, component: ComponentType);

    fn child_count(&self, container: NodeRef) -> usize;

    /// Request removal of every child of `container`. May need more than one
    /// host tick to fully land.
    fn remove_all_children(&mut self, container: NodeRef);

    /// Repopulate a node's content from current graph state.
    fn refresh_content(&mut self, container: NodeRef) -> Result<(), GraphFault>;
}
