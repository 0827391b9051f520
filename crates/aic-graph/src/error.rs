//! Error types for the graph engine
//!
//! - [`GraphError`]: construction-phase failures (ids, references, cycles)
//! - [`ProvisionError`]: failures reported by a provisioning backend
//! - [`ExecutionError`]: execution-phase failures, attributed to a component

use crate::types::LogicalId;

/// Construction-phase errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Logical id is empty, too long or not alphanumeric
    #[error("invalid logical id: '{0}'")]
    InvalidLogicalId(String),

    /// Two resources share a logical id
    #[error("duplicate logical id: {0}")]
    DuplicateLogicalId(LogicalId),

    /// A token refers to a resource that has not been added yet
    #[error("{from} references {missing}, which has not been built")]
    UnresolvedReference { from: String, missing: LogicalId },

    /// A resource would depend on itself
    #[error("{0} cannot depend on itself")]
    SelfDependency(LogicalId),

    /// The dependency edge would close a cycle
    #[error("dependency {dependent} -> {dependency} would create a cycle")]
    CycleDetected {
        dependent: LogicalId,
        dependency: LogicalId,
    },

    /// Two outputs share a name
    #[error("duplicate output: {0}")]
    DuplicateOutput(String),

    /// Container image asset is not buildable as described
    #[error("invalid image asset: {0}")]
    InvalidAsset(String),
}

impl GraphError {
    /// True when the error means something was requested before its producer existed
    pub fn is_unresolved_dependency(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. })
    }
}

/// Errors reported by a [`crate::ResourceProvisioner`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisionError {
    /// The engine rejected the resource definition (quota, parameter, naming collision)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The container image could not be built or published
    #[error("asset build failed: {0}")]
    AssetBuildFailed(String),
}

/// Execution-phase errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// An image asset failed to publish
    #[error("asset {fingerprint} of {component} failed: {source}")]
    AssetFailed {
        component: String,
        fingerprint: String,
        #[source]
        source: ProvisionError,
    },

    /// A resource failed to provision
    #[error("{logical_id} of {component} failed: {source}")]
    ProvisionFailed {
        logical_id: LogicalId,
        component: String,
        #[source]
        source: ProvisionError,
    },

    /// A token asked for an attribute the producer never exposed
    #[error("attribute {attribute} of {logical_id} is not available")]
    UnresolvedAttribute {
        logical_id: LogicalId,
        attribute: String,
    },

    /// A secret field is missing or the secret string is not a JSON object
    #[error("field {field} of secret {secret} is not available")]
    UnresolvedSecretField { secret: LogicalId, field: String },

    /// A resolved output was empty
    #[error("output {0} resolved to an empty value")]
    EmptyOutput(String),
}

impl ExecutionError {
    /// Component the failure is attributed to, when known
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::AssetFailed { component, .. } | Self::ProvisionFailed { component, .. } => {
                Some(component)
            }
            _ => None,
        }
    }
}
