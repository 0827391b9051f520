//! Error types for the stack
//!
//! - `ConfigInvalid`: bad input record, raised before any resource is built
//! - `DependencyUnresolved`: a value was requested before its producer existed
//! - `ProvisioningFailure`: the engine rejected a resource, attributed to its tier
//! - `PartialIdentityState`: the identity provider was left incomplete

use crate::config::ConfigError;
use aic_graph::{ExecutionError, GraphError};

/// Main stack error type
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Input record failed validation
    #[error("invalid configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// Build-time parameters are unusable
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A component asked for a value whose producer has not been built
    #[error("{component}: dependency unresolved: {source}")]
    DependencyUnresolved {
        component: String,
        #[source]
        source: GraphError,
    },

    /// Any other structural error while assembling a component
    #[error("{component}: invalid topology: {source}")]
    Topology {
        component: String,
        #[source]
        source: GraphError,
    },

    /// The provisioning engine rejected a resource
    #[error("provisioning failed in {component}: {source}")]
    ProvisioningFailure {
        component: String,
        #[source]
        source: ExecutionError,
    },

    /// Directory or client exists but a later identity step failed
    #[error("identity provider left incomplete at {step}: {reason}")]
    PartialIdentityState { step: String, reason: String },

    /// The published outputs do not match the fixed key set
    #[error("output set incomplete: missing {missing:?}, unexpected {unexpected:?}")]
    IncompleteOutputs {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl StackError {
    /// Attribute a construction error to `component`
    pub fn from_graph(component: &str, source: GraphError) -> Self {
        if source.is_unresolved_dependency() {
            Self::DependencyUnresolved {
                component: component.to_string(),
                source,
            }
        } else {
            Self::Topology {
                component: component.to_string(),
                source,
            }
        }
    }

    /// Component the error is attributed to, when known
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::DependencyUnresolved { component, .. }
            | Self::Topology { component, .. }
            | Self::ProvisioningFailure { component, .. } => Some(component),
            Self::PartialIdentityState { .. } => Some(crate::identity::COMPONENT),
            _ => None,
        }
    }

    /// True when the configuration was rejected before building
    #[inline]
    #[must_use]
    pub fn is_config_invalid(&self) -> bool {
        matches!(self, Self::ConfigInvalid(_))
    }
}
