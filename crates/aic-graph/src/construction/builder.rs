//! Topology Builder
//!
//! The primary interface for the construction phase.
//! Collects resources, dependency edges, outputs and assets, then validates
//! them into a `Topology`.

use crate::asset::{AssetHandle, ImageAsset};
use crate::construction::handle::{ResourceHandle, Scope};
use crate::construction::validator::TopologyValidator;
use crate::error::GraphError;
use crate::token::Token;
use crate::topology::{AssetEntry, Output, ResourceNode, Topology};
use crate::types::{EdgeKind, LogicalId, ResourceSpec};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Builder for deployment topologies
///
/// Usage:
/// ```rust,ignore
/// let mut builder = TopologyBuilder::new("my stack");
/// let mut scope = builder.scope("Network", "Network");
/// let vpc = scope.add("Vpc", vpc_spec)?;
/// let subnet = scope.add("Subnet", subnet_spec_referencing(vpc.reference()))?;
/// let topology = builder.validate()?;
/// ```
///
/// Edges point from dependency to dependent, so a topological sort yields a
/// valid provisioning order.
#[derive(Debug)]
pub struct TopologyBuilder {
    description: String,
    graph: DiGraph<LogicalId, EdgeKind>,
    index: HashMap<LogicalId, NodeIndex>,
    nodes: IndexMap<LogicalId, ResourceNode>,
    outputs: IndexMap<String, Output>,
    assets: Vec<AssetEntry>,
}

impl TopologyBuilder {
    /// Empty builder for a topology described by `description`
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            graph: DiGraph::new(),
            index: HashMap::new(),
            nodes: IndexMap::new(),
            outputs: IndexMap::new(),
            assets: Vec::new(),
        }
    }

    /// Topology description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Resources added so far
    pub fn resource_count(&self) -> usize {
        self.nodes.len()
    }

    /// Dependency edges of either kind
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Open a component scope
    pub fn scope(&mut self, component: &str, prefix: &str) -> Scope<'_> {
        Scope::new(self, component, prefix)
    }

    /// Whether a resource with `id` was added
    pub fn contains(&self, id: &LogicalId) -> bool {
        self.index.contains_key(id)
    }

    fn check_references(&self, from: &str, refs: &[&LogicalId]) -> Result<(), GraphError> {
        match refs.iter().find(|r| !self.index.contains_key(**r)) {
            Some(missing) => Err(GraphError::UnresolvedReference {
                from: from.to_string(),
                missing: (*missing).clone(),
            }),
            None => Ok(()),
        }
    }

    /// Add a resource owned by `component`
    ///
    /// Every resource referenced from the properties must already exist;
    /// one reference edge is added per referenced resource.
    pub fn add_resource(
        &mut self,
        component: &str,
        id: LogicalId,
        spec: ResourceSpec,
    ) -> Result<ResourceHandle, GraphError> {
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateLogicalId(id));
        }

        let refs: Vec<LogicalId> = spec.properties().references().into_iter().cloned().collect();
        let borrowed: Vec<&LogicalId> = refs.iter().collect();
        self.check_references(id.as_str(), &borrowed)?;

        let node = self.graph.add_node(id.clone());
        for dependency in &refs {
            let from = self.index[dependency];
            self.graph.add_edge(from, node, EdgeKind::Reference);
        }
        self.index.insert(id.clone(), node);

        tracing::debug!(
            component,
            logical_id = %id,
            resource_type = spec.resource_type(),
            references = refs.len(),
            "resource added"
        );

        self.nodes.insert(
            id.clone(),
            ResourceNode {
                id: id.clone(),
                component: component.to_string(),
                spec,
                depends_on: Vec::new(),
            },
        );
        Ok(ResourceHandle::new(id))
    }

    /// Add an explicit dependency edge
    ///
    /// Rejects edges that would create a cycle, leaving the graph unchanged.
    pub fn add_dependency(
        &mut self,
        dependent: &ResourceHandle,
        dependency: &ResourceHandle,
    ) -> Result<(), GraphError> {
        let (dependent, dependency) = (dependent.id(), dependency.id());
        let to = *self.index.get(dependent).ok_or_else(|| GraphError::UnresolvedReference {
            from: dependency.to_string(),
            missing: dependent.clone(),
        })?;
        let from = *self.index.get(dependency).ok_or_else(|| GraphError::UnresolvedReference {
            from: dependent.to_string(),
            missing: dependency.clone(),
        })?;

        if from == to {
            return Err(GraphError::SelfDependency(dependent.clone()));
        }

        let edge = self.graph.add_edge(from, to, EdgeKind::Explicit);
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(GraphError::CycleDetected {
                dependent: dependent.clone(),
                dependency: dependency.clone(),
            });
        }

        if let Some(node) = self.nodes.get_mut(dependent) {
            if !node.depends_on.contains(dependency) {
                node.depends_on.push(dependency.clone());
            }
        }
        Ok(())
    }

    /// Register a named output of the topology
    pub fn add_output(
        &mut self,
        name: &str,
        description: &str,
        value: Token,
    ) -> Result<(), GraphError> {
        LogicalId::new(name)?;
        if self.outputs.contains_key(name) {
            return Err(GraphError::DuplicateOutput(name.to_string()));
        }
        self.check_references(name, &value.references())?;
        self.outputs.insert(
            name.to_string(),
            Output {
                name: name.to_string(),
                description: description.to_string(),
                value,
            },
        );
        Ok(())
    }

    /// Register an image asset; identical descriptions are deduplicated
    pub fn add_asset(&mut self, component: &str, asset: ImageAsset) -> Result<AssetHandle, GraphError> {
        asset.validate()?;
        let fingerprint = asset.fingerprint();
        if !self.assets.iter().any(|entry| entry.fingerprint == fingerprint) {
            self.assets.push(AssetEntry {
                component: component.to_string(),
                fingerprint: fingerprint.clone(),
                asset,
            });
        }
        Ok(AssetHandle::new(fingerprint))
    }

    /// Validate the topology and seal it
    ///
    /// Once validated, the topology cannot be modified.
    pub fn validate(self) -> Result<Topology, GraphError> {
        TopologyValidator::validate(
            self.description,
            self.graph,
            self.index,
            self.nodes,
            self.outputs,
            self.assets,
        )
    }

    /// Check if an explicit edge would create a cycle, without modifying the builder
    pub fn would_create_cycle(&self, dependent: &LogicalId, dependency: &LogicalId) -> bool {
        match (self.index.get(dependent), self.index.get(dependency)) {
            (Some(&to), Some(&from)) => {
                from == to || petgraph::algo::has_path_connecting(&self.graph, to, from, None)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::Props;

    fn bucket() -> ResourceSpec {
        ResourceSpec::new("AWS::S3::Bucket", Props::new())
    }

    fn policy(target: &ResourceHandle) -> ResourceSpec {
        ResourceSpec::new(
            "AWS::S3::BucketPolicy",
            Props::new().with("Bucket", target.reference()),
        )
    }

    #[test]
    fn scope_prefixes_logical_ids() {
        let mut builder = TopologyBuilder::new("test");
        let handle = builder.scope("EdgeTier", "Edge").add("Bucket", bucket()).unwrap();
        assert_eq!(handle.id().as_str(), "EdgeBucket");
        assert_eq!(builder.resource_count(), 1);
    }

    #[test]
    fn references_add_edges() {
        let mut builder = TopologyBuilder::new("test");
        let mut scope = builder.scope("Edge", "");
        let b = scope.add("Bucket", bucket()).unwrap();
        scope.add("Policy", policy(&b)).unwrap();
        assert_eq!(builder.edge_count(), 1);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut builder = TopologyBuilder::new("test");
        let mut scope = builder.scope("Edge", "");
        scope.add("Bucket", bucket()).unwrap();
        assert!(matches!(
            scope.add("Bucket", bucket()),
            Err(GraphError::DuplicateLogicalId(_))
        ));
    }

    #[test]
    fn rejects_reference_to_foreign_handle() {
        let mut other = TopologyBuilder::new("other");
        let foreign = other.scope("Edge", "").add("Bucket", bucket()).unwrap();

        let mut builder = TopologyBuilder::new("test");
        let err = builder.scope("Edge", "").add("Policy", policy(&foreign)).unwrap_err();
        assert!(err.is_unresolved_dependency());
    }

    #[test]
    fn explicit_dependency_rejects_self_and_cycles() {
        let mut builder = TopologyBuilder::new("test");
        let mut scope = builder.scope("Edge", "");
        let a = scope.add("A", bucket()).unwrap();
        let b = scope.add("B", policy(&a)).unwrap();

        assert!(matches!(scope.depends_on(&a, &a), Err(GraphError::SelfDependency(_))));
        assert!(matches!(
            scope.depends_on(&a, &b),
            Err(GraphError::CycleDetected { .. })
        ));
        assert!(builder.would_create_cycle(a.id(), b.id()));
        assert!(!builder.would_create_cycle(b.id(), a.id()));
        // rejected edge left nothing behind
        assert_eq!(builder.edge_count(), 1);
    }

    #[test]
    fn outputs_must_reference_existing_resources() {
        let mut other = TopologyBuilder::new("other");
        let foreign = other.scope("Edge", "").add("Bucket", bucket()).unwrap();

        let mut builder = TopologyBuilder::new("test");
        let err = builder
            .add_output("BucketName", "Bucket", foreign.reference())
            .unwrap_err();
        assert!(err.is_unresolved_dependency());

        builder.add_output("Static", "Static", Token::literal("x")).unwrap();
        assert!(matches!(
            builder.add_output("Static", "Static", Token::literal("y")),
            Err(GraphError::DuplicateOutput(_))
        ));
    }

    #[test]
    fn assets_are_deduplicated() {
        let mut builder = TopologyBuilder::new("test");
        let a = builder.add_asset("Compute", ImageAsset::new("portal")).unwrap();
        let b = builder.add_asset("Compute", ImageAsset::new("portal")).unwrap();
        assert_eq!(a, b);
        let topology = builder.validate().unwrap();
        assert_eq!(topology.assets().count(), 1);
    }
}
