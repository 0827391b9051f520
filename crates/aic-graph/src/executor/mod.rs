//! Execution Phase
//!
//! The executor only accepts a sealed [`Topology`]. It performs no
//! structural validation; it only:
//! - Publishes image assets before any resource
//! - Resolves tokens against resources provisioned earlier in the run
//! - Creates, updates or reuses each resource in dependency order
//!
//! # Critical Invariant
//!
//! The caller's [`DeploymentState`] is only replaced when the whole run
//! succeeds. A failure leaves the previous state untouched, which is what a
//! rollback restores.

mod simulated;

pub use simulated::SimulatedProvisioner;

use crate::asset::ImageAsset;
use crate::error::{ExecutionError, ProvisionError};
use crate::token::Resolve;
use crate::topology::Topology;
use crate::types::{LogicalId, PseudoParam, PseudoValues};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Backend that turns resolved resource definitions into real resources
///
/// Implement this trait to target a provisioning engine.
#[async_trait::async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Build and publish a container image
    async fn publish_asset(&self, fingerprint: &str, asset: &ImageAsset)
        -> Result<(), ProvisionError>;

    /// Create or update a single resource
    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedResource, ProvisionError>;
}

/// A fully resolved resource definition
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    /// Resource being provisioned
    pub logical_id: LogicalId,
    /// Provider resource type
    pub resource_type: String,
    /// Component that owns the resource
    pub component: String,
    /// Properties with every token resolved
    pub properties: Value,
    /// Present when the resource already exists and is being updated
    pub previous: Option<ProvisionedResource>,
}

/// What the backend reports back for a provisioned resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedResource {
    /// Identifier the backend assigned
    pub physical_id: String,
    /// Attributes readable through `GetAtt`
    pub attributes: BTreeMap<String, String>,
}

/// A resource recorded in deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedResource {
    /// Provider resource type
    pub resource_type: String,
    /// Component that owns the resource
    pub component: String,
    /// Digest of the resolved definition the resource was last provisioned from
    pub properties_digest: String,
    /// Backend result of the last provisioning
    pub provisioned: ProvisionedResource,
}

/// Persistent record of a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Digest of the last topology deployed successfully
    pub topology_digest: Option<String>,
    /// Every provisioned resource, by logical id
    pub resources: BTreeMap<LogicalId, DeployedResource>,
    /// Resolved outputs of the last deployment
    pub outputs: IndexMap<String, String>,
}

impl DeploymentState {
    /// Empty state: nothing deployed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the first successful deployment
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Recorded resource by logical id
    pub fn resource(&self, id: &str) -> Option<&DeployedResource> {
        self.resources.get(id)
    }

    /// Serialize for persistence
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load previously persisted state
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentReport {
    /// Resolved output values, in publication order
    pub outputs: IndexMap<String, String>,
    /// Resources provisioned for the first time
    pub created: Vec<LogicalId>,
    /// Resources whose resolved definition changed
    pub updated: Vec<LogicalId>,
    /// Resources reused as they were
    pub unchanged: Vec<LogicalId>,
    /// Resources dropped from state because the topology no longer has them
    pub removed: Vec<LogicalId>,
    /// Image assets published before provisioning
    pub assets_published: usize,
    /// Wall-clock duration of the run
    pub execution_time_ms: u64,
}

impl DeploymentReport {
    /// True when nothing had to be created, updated or removed
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

struct StateView<'a> {
    resources: &'a BTreeMap<LogicalId, DeployedResource>,
    pseudo: &'a PseudoValues,
}

impl Resolve for StateView<'_> {
    fn physical_id(&self, id: &LogicalId) -> Option<&str> {
        self.resources
            .get(id)
            .map(|r| r.provisioned.physical_id.as_str())
    }

    fn attribute(&self, id: &LogicalId, attribute: &str) -> Option<&str> {
        self.resources
            .get(id)
            .and_then(|r| r.provisioned.attributes.get(attribute))
            .map(String::as_str)
    }

    fn pseudo(&self, param: PseudoParam) -> &str {
        self.pseudo.get(param)
    }
}

fn definition_digest(resource_type: &str, properties: &Value) -> String {
    let rendered = json!({ "Type": resource_type, "Properties": properties }).to_string();
    hex::encode(Sha256::digest(rendered.as_bytes()))
}

/// Topology executor
pub struct Executor {
    pseudo: PseudoValues,
    provisioner: Arc<dyn ResourceProvisioner>,
}

impl Executor {
    /// Executor resolving pseudo parameters from `pseudo`
    pub fn new(pseudo: PseudoValues, provisioner: Arc<dyn ResourceProvisioner>) -> Self {
        Self { pseudo, provisioner }
    }

    /// Pseudo parameter values used during resolution
    pub fn pseudo(&self) -> &PseudoValues {
        &self.pseudo
    }

    /// Deploy a validated topology on top of `state`
    ///
    /// # Errors
    /// Returns `ExecutionError` if:
    /// - An image asset fails to publish
    /// - A token cannot be resolved
    /// - The backend rejects a resource
    /// - An output resolves to an empty value
    ///
    /// On error `state` is left exactly as it was.
    pub async fn deploy(
        &self,
        topology: &Topology,
        state: &mut DeploymentState,
    ) -> Result<DeploymentReport, ExecutionError> {
        let start_time = Instant::now();
        let mut report = DeploymentReport::default();
        let mut working = state.resources.clone();

        tracing::info!(
            stack = %self.pseudo.stack_name,
            region = %self.pseudo.region,
            resources = topology.len(),
            "deployment started"
        );

        for entry in topology.assets() {
            self.provisioner
                .publish_asset(entry.fingerprint(), entry.asset())
                .await
                .map_err(|source| ExecutionError::AssetFailed {
                    component: entry.component().to_string(),
                    fingerprint: entry.fingerprint().to_string(),
                    source,
                })?;
            report.assets_published += 1;
            tracing::debug!(fingerprint = entry.fingerprint(), "asset published");
        }

        for id in topology.order() {
            let Some(node) = topology.resource(id.as_str()) else {
                continue;
            };
            let view = StateView {
                resources: &working,
                pseudo: &self.pseudo,
            };
            let properties = node.spec().properties().resolve(&view)?;
            let digest = definition_digest(node.resource_type(), &properties);

            let previous = working
                .get(id)
                .filter(|existing| existing.resource_type == node.resource_type());
            if let Some(existing) = previous {
                if existing.properties_digest == digest {
                    tracing::debug!(logical_id = %id, "resource unchanged");
                    report.unchanged.push(id.clone());
                    continue;
                }
            }

            let request = ProvisionRequest {
                logical_id: id.clone(),
                resource_type: node.resource_type().to_string(),
                component: node.component().to_string(),
                properties,
                previous: previous.map(|existing| existing.provisioned.clone()),
            };
            let is_update = request.previous.is_some();

            let provisioned = self.provisioner.provision(&request).await.map_err(|source| {
                tracing::warn!(logical_id = %id, component = node.component(), error = %source, "provisioning failed");
                ExecutionError::ProvisionFailed {
                    logical_id: id.clone(),
                    component: node.component().to_string(),
                    source,
                }
            })?;

            tracing::debug!(
                logical_id = %id,
                physical_id = %provisioned.physical_id,
                update = is_update,
                "resource provisioned"
            );

            if is_update {
                report.updated.push(id.clone());
            } else {
                report.created.push(id.clone());
            }
            working.insert(
                id.clone(),
                DeployedResource {
                    resource_type: request.resource_type,
                    component: request.component,
                    properties_digest: digest,
                    provisioned,
                },
            );
        }

        let stale: Vec<LogicalId> = working
            .keys()
            .filter(|id| topology.resource(id.as_str()).is_none())
            .cloned()
            .collect();
        for id in stale {
            working.remove(&id);
            report.removed.push(id);
        }

        let view = StateView {
            resources: &working,
            pseudo: &self.pseudo,
        };
        for output in topology.outputs() {
            let value = output.value().resolve(&view)?;
            if value.is_empty() {
                return Err(ExecutionError::EmptyOutput(output.name().to_string()));
            }
            report.outputs.insert(output.name().to_string(), value);
        }

        state.resources = working;
        state.outputs = report.outputs.clone();
        state.topology_digest = Some(topology.digest().to_string());
        report.execution_time_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            "deployment complete"
        );
        Ok(report)
    }
}
