//! Construction Validator
//!
//! Performs all structural validation at construction time.
//! The executor only walks the order computed here.

use crate::error::GraphError;
use crate::topology::{AssetEntry, Output, ResourceNode, Topology, TopologyConstructor};
use crate::types::{EdgeKind, LogicalId};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Seals a builder's contents into a [`Topology`]
pub struct TopologyValidator;

impl TopologyValidator {
    /// Validate a complete topology
    ///
    /// 1. Reject cycles (explicit edges are checked on insertion; this is the backstop)
    /// 2. Compute a provisioning order
    /// 3. Construct the sealed `Topology`
    pub(crate) fn validate(
        description: String,
        graph: DiGraph<LogicalId, EdgeKind>,
        index: HashMap<LogicalId, NodeIndex>,
        nodes: IndexMap<LogicalId, ResourceNode>,
        outputs: IndexMap<String, Output>,
        assets: Vec<AssetEntry>,
    ) -> Result<Topology, GraphError> {
        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            let id = graph[cycle.node_id()].clone();
            return Err(GraphError::CycleDetected {
                dependent: id.clone(),
                dependency: id,
            });
        }

        let order = Self::stable_order(&graph);

        tracing::info!(
            resources = nodes.len(),
            edges = graph.edge_count(),
            outputs = outputs.len(),
            assets = assets.len(),
            "topology validated"
        );

        Ok(TopologyConstructor::construct(
            description,
            graph,
            index,
            nodes,
            outputs,
            assets,
            order,
        ))
    }

    /// Kahn's algorithm, breaking ties by insertion order
    ///
    /// The same builder calls always produce the same order.
    fn stable_order(graph: &DiGraph<LogicalId, EdgeKind>) -> Vec<LogicalId> {
        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| Reverse(n.index()))
            .collect();

        let mut order = Vec::with_capacity(graph.node_count());
        while let Some(Reverse(next)) = ready.pop() {
            let node = NodeIndex::new(next);
            order.push(graph[node].clone());
            for dependent in graph.neighbors_directed(node, Direction::Outgoing) {
                let slot = &mut in_degree[dependent.index()];
                *slot -= 1;
                if *slot == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }
        order
    }
}
