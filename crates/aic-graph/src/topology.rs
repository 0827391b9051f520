//! Validated Topology - sealed result of the construction phase
//!
//! A [`Topology`] can ONLY be produced by `TopologyBuilder::validate()`:
//! 1. Every token reference points at a resource in the same topology
//! 2. The dependency graph is acyclic
//! 3. The provisioning order is fixed at validation time

use crate::asset::ImageAsset;
use crate::token::Token;
use crate::types::{EdgeKind, LogicalId, ResourceSpec};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Template format version emitted by [`Topology::synth`]
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key carrying the owning component
pub const COMPONENT_METADATA_KEY: &str = "aic:component";

/// A resource together with its owner and explicit dependencies
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    pub(crate) id: LogicalId,
    pub(crate) component: String,
    pub(crate) spec: ResourceSpec,
    pub(crate) depends_on: Vec<LogicalId>,
}

impl ResourceNode {
    /// Logical id of the resource
    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// Component that added the resource
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Resource definition
    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Provider resource type
    pub fn resource_type(&self) -> &str {
        self.spec.resource_type()
    }

    /// Explicitly declared dependencies, in declaration order
    pub fn depends_on(&self) -> &[LogicalId] {
        &self.depends_on
    }

    fn to_template(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("Type".into(), Value::String(self.spec.resource_type().to_string()));
        if !self.spec.properties().is_empty() {
            entry.insert("Properties".into(), self.spec.properties().to_template());
        }
        if !self.depends_on.is_empty() {
            let ids: Vec<Value> = self
                .depends_on
                .iter()
                .map(|id| Value::String(id.to_string()))
                .collect();
            entry.insert("DependsOn".into(), Value::Array(ids));
        }
        if let Some(policy) = self.spec.deletion_policy() {
            entry.insert("DeletionPolicy".into(), Value::String(policy.as_str().into()));
        }
        if let Some(policy) = self.spec.update_replace_policy() {
            entry.insert("UpdateReplacePolicy".into(), Value::String(policy.as_str().into()));
        }
        let mut metadata = Map::new();
        metadata.insert(
            COMPONENT_METADATA_KEY.into(),
            Value::String(self.component.clone()),
        );
        entry.insert("Metadata".into(), Value::Object(metadata));
        Value::Object(entry)
    }
}

/// A named value published after deployment
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) value: Token,
}

impl Output {
    /// Output name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Deferred output value
    pub fn value(&self) -> &Token {
        &self.value
    }
}

/// An image asset and the component that registered it
#[derive(Debug, Clone, PartialEq)]
pub struct AssetEntry {
    pub(crate) component: String,
    pub(crate) fingerprint: String,
    pub(crate) asset: ImageAsset,
}

impl AssetEntry {
    /// Component that registered the asset
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Content fingerprint of the build description
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Build description
    pub fn asset(&self) -> &ImageAsset {
        &self.asset
    }
}

/// Sealed, validated topology
#[derive(Debug, Clone)]
pub struct Topology {
    description: String,
    graph: DiGraph<LogicalId, EdgeKind>,
    index: HashMap<LogicalId, NodeIndex>,
    nodes: IndexMap<LogicalId, ResourceNode>,
    outputs: IndexMap<String, Output>,
    assets: Vec<AssetEntry>,
    order: Vec<LogicalId>,
    digest: String,
}

/// Sealed constructor for `Topology`
///
/// Only reachable from the construction validator.
pub(crate) struct TopologyConstructor;

impl TopologyConstructor {
    pub(crate) fn construct(
        description: String,
        graph: DiGraph<LogicalId, EdgeKind>,
        index: HashMap<LogicalId, NodeIndex>,
        nodes: IndexMap<LogicalId, ResourceNode>,
        outputs: IndexMap<String, Output>,
        assets: Vec<AssetEntry>,
        order: Vec<LogicalId>,
    ) -> Topology {
        let mut topology = Topology {
            description,
            graph,
            index,
            nodes,
            outputs,
            assets,
            order,
            digest: String::new(),
        };
        let rendered = topology.synth().to_string();
        topology.digest = hex::encode(Sha256::digest(rendered.as_bytes()));
        topology
    }
}

impl Topology {
    /// Topology description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of resources
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the topology has no resources
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependency edges of either kind
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Resource by logical id
    pub fn resource(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    /// Resources in insertion order
    pub fn resources(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.values()
    }

    /// Resources of one provider type, in insertion order
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a ResourceNode> + 'a {
        self.nodes
            .values()
            .filter(move |node| node.resource_type() == resource_type)
    }

    /// Resources added by one component, in insertion order
    pub fn resources_of_component<'a>(
        &'a self,
        component: &'a str,
    ) -> impl Iterator<Item = &'a ResourceNode> + 'a {
        self.nodes
            .values()
            .filter(move |node| node.component == component)
    }

    /// Provisioning order: every resource after all of its dependencies
    pub fn order(&self) -> &[LogicalId] {
        &self.order
    }

    /// Index of a resource in the provisioning order
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|candidate| candidate.as_str() == id)
    }

    /// Direct dependencies of a resource, of either edge kind
    pub fn dependencies(&self, id: &str) -> Vec<&LogicalId> {
        self.dependencies_where(id, |_| true)
    }

    /// Direct dependencies declared with `depends_on`
    pub fn explicit_dependencies(&self, id: &str) -> Vec<&LogicalId> {
        self.dependencies_where(id, |kind| kind == EdgeKind::Explicit)
    }

    /// Whether `dependent` transitively depends on `dependency`
    pub fn depends_on(&self, dependent: &str, dependency: &str) -> bool {
        match (self.node_index(dependency), self.node_index(dependent)) {
            (Some(from), Some(to)) => {
                from != to && petgraph::algo::has_path_connecting(&self.graph, from, to, None)
            }
            _ => false,
        }
    }

    fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    fn dependencies_where(&self, id: &str, keep: impl Fn(EdgeKind) -> bool) -> Vec<&LogicalId> {
        let Some(node) = self.node_index(id) else {
            return Vec::new();
        };
        let mut out: Vec<&LogicalId> = Vec::new();
        for edge in self.graph.edges_directed(node, Direction::Incoming) {
            let source = &self.graph[edge.source()];
            if keep(*edge.weight()) && !out.contains(&source) {
                out.push(source);
            }
        }
        out.sort();
        out
    }

    /// Outputs in publication order
    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Output by name
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.get(name)
    }

    /// Image assets in registration order
    pub fn assets(&self) -> impl Iterator<Item = &AssetEntry> {
        self.assets.iter()
    }

    /// SHA-256 of the synthesized template
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Render the topology as a declarative template
    pub fn synth(&self) -> Value {
        let mut resources = Map::new();
        for (id, node) in &self.nodes {
            resources.insert(id.to_string(), node.to_template());
        }

        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".into(),
            Value::String(TEMPLATE_FORMAT_VERSION.into()),
        );
        template.insert("Description".into(), Value::String(self.description.clone()));
        template.insert("Resources".into(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let mut outputs = Map::new();
            for output in self.outputs.values() {
                outputs.insert(
                    output.name.clone(),
                    json!({
                        "Description": output.description,
                        "Value": output.value.to_template(),
                    }),
                );
            }
            template.insert("Outputs".into(), Value::Object(outputs));
        }
        Value::Object(template)
    }
}

#[cfg(test)]
mod tests {
    use crate::construction::TopologyBuilder;
    use crate::props::Props;
    use crate::types::ResourceSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn synth_renders_explicit_edges_only_as_depends_on() {
        let mut builder = TopologyBuilder::new("demo");
        let mut scope = builder.scope("Cache", "Cache");
        let group = scope
            .add("SubnetGroup", ResourceSpec::new("AWS::ElastiCache::SubnetGroup", Props::new()))
            .unwrap();
        let sg = scope
            .add("Sg", ResourceSpec::new("AWS::EC2::SecurityGroup", Props::new()))
            .unwrap();
        let cluster = scope
            .add(
                "Cluster",
                ResourceSpec::new(
                    "AWS::ElastiCache::CacheCluster",
                    Props::new()
                        .with("CacheSubnetGroupName", group.reference())
                        .with("VpcSecurityGroupIds", vec![sg.attr("GroupId")]),
                ),
            )
            .unwrap();
        scope.depends_on(&cluster, &group).unwrap();
        builder.add_output("Endpoint", "Endpoint", cluster.attr("RedisEndpoint.Address")).unwrap();

        let topology = builder.validate().unwrap();
        let template = topology.synth();

        assert_eq!(template["AWSTemplateFormatVersion"], json!("2010-09-09"));
        assert_eq!(
            template["Resources"]["CacheCluster"]["DependsOn"],
            json!(["CacheSubnetGroup"])
        );
        assert_eq!(
            template["Resources"]["CacheCluster"]["Metadata"]["aic:component"],
            json!("Cache")
        );
        assert!(template["Resources"]["CacheSg"].get("DependsOn").is_none());
        assert_eq!(
            template["Outputs"]["Endpoint"]["Value"],
            json!({ "Fn::GetAtt": ["CacheCluster", "RedisEndpoint.Address"] })
        );

        let deps: Vec<&str> = topology
            .dependencies("CacheCluster")
            .into_iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(deps, vec!["CacheSg", "CacheSubnetGroup"]);
        assert_eq!(topology.explicit_dependencies("CacheCluster").len(), 1);
        assert!(topology.depends_on("CacheCluster", "CacheSg"));
        assert!(!topology.depends_on("CacheSg", "CacheCluster"));
    }

    #[test]
    fn digest_is_deterministic() {
        let build = || {
            let mut builder = TopologyBuilder::new("demo");
            builder
                .scope("Edge", "Edge")
                .add("Bucket", ResourceSpec::new("AWS::S3::Bucket", Props::new()).retain())
                .unwrap();
            builder.validate().unwrap()
        };
        assert_eq!(build().digest(), build().digest());
        assert_eq!(build().digest().len(), 64);
    }
}
