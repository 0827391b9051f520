//! AIC Graph - resource topology engine
//!
//! Two-phase design:
//! 1. **Construction Phase**: resources are added to a [`TopologyBuilder`],
//!    wired together with deferred-value [`Token`]s and validated into a
//!    sealed [`Topology`].
//! 2. **Execution Phase**: an [`Executor`] walks the validated topology in
//!    dependency order, resolving tokens against already provisioned
//!    resources and delegating each create/update to a [`ResourceProvisioner`].
//!
//! A token that points at a resource can only be minted from that
//! resource's [`ResourceHandle`], and a handle only exists once the resource
//! has been added, so a forward reference cannot be expressed.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use aic_graph::prelude::*;
//!
//! let mut builder = TopologyBuilder::new("example");
//! let mut scope = builder.scope("Storage", "Storage");
//! let bucket = scope.add("Bucket", ResourceSpec::new("AWS::S3::Bucket", Props::new()))?;
//! builder.add_output("BucketName", "Bucket name", bucket.reference())?;
//!
//! let topology = builder.validate()?;
//! let template = topology.synth();
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod asset;
pub mod construction;
pub mod error;
pub mod executor;
pub mod props;
pub mod secret;
pub mod token;
pub mod topology;
pub mod types;

pub use asset::{AssetHandle, ImageAsset};
pub use construction::{ResourceHandle, Scope, TopologyBuilder};
pub use error::{ExecutionError, GraphError, ProvisionError};
pub use executor::{
    DeployedResource, DeploymentReport, DeploymentState, Executor, ProvisionRequest,
    ProvisionedResource, ResourceProvisioner, SimulatedProvisioner,
};
pub use props::{PropValue, Props};
pub use secret::{PasswordPolicy, DEFAULT_PASSWORD_LENGTH};
pub use token::Token;
pub use topology::{AssetEntry, Output, ResourceNode, Topology};
pub use types::{DeletionPolicy, EdgeKind, LogicalId, PseudoParam, PseudoValues, ResourceSpec};

/// Common imports for building and deploying topologies
pub mod prelude {
    pub use crate::construction::{ResourceHandle, Scope, TopologyBuilder};
    pub use crate::error::{ExecutionError, GraphError};
    pub use crate::executor::{DeploymentState, Executor, ResourceProvisioner};
    pub use crate::props::{PropValue, Props};
    pub use crate::token::Token;
    pub use crate::topology::Topology;
    pub use crate::types::{DeletionPolicy, LogicalId, PseudoParam, PseudoValues, ResourceSpec};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
