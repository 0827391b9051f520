//! AIC Stack - AI chatbot deployment topology
//!
//! Builds the chatbot's resource graph on top of [`aic_graph`]:
//! - [`network`]: isolated network, subnets, one NAT path, flow log
//! - [`edge`]: private bucket behind a content-delivery distribution
//! - [`data`]: PostgreSQL with a generated credentials secret
//! - [`cache`]: Redis replication group
//! - [`identity`]: user directory, OAuth client, admin bootstrap, hosted domain
//! - [`compute`]: Fargate service behind a load balancer, HTTP or HTTPS
//! - [`composer`]: builds the tiers in order and publishes the output contract
//!
//! # Example
//!
//! ```rust,ignore
//! use aic_stack::prelude::*;
//!
//! let config = Config::load(DEFAULT_CONFIG_PATH)?;
//! let deployment = DeploymentIdentity::new(DEFAULT_STACK_NAME, "123456789012", "us-east-1");
//! let stack = StackComposer::new(&config, StackSettings::default(), deployment)?.compose()?;
//!
//! let template = stack.synth();
//! let mut state = DeploymentState::new();
//! let deployed = stack.deploy(Arc::new(SimulatedProvisioner::new()), &mut state).await?;
//! println!("{}", deployed.outputs.alb_endpoint());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod cache;
pub mod composer;
pub mod compute;
pub mod config;
pub mod data;
pub mod edge;
pub mod error;
pub mod iam;
pub mod identity;
pub mod network;
pub mod outputs;
pub mod security;
pub mod settings;

pub use cache::{Cache, CacheTier};
pub use composer::{ComposedStack, StackComposer, StackDeployment};
pub use compute::{
    Compute, ComputeInputs, ComputeTier, ListenerMode, ListenerProtocol, PublicEndpoint,
    RuntimeEnvironment,
};
pub use config::{Config, ConfigError, ValidatedConfig, DEFAULT_CONFIG_PATH};
pub use data::{DataTier, Database};
pub use edge::{Edge, EdgeTier};
pub use error::StackError;
pub use identity::{IdentityProvider, IdentityRequest, IdentitySet};
pub use network::{NetworkFabric, NetworkHandle};
pub use outputs::{OutputPublisher, OutputSet, ResolvedOutputs, OUTPUT_KEYS};
pub use security::{PortRange, SecurityBoundary};
pub use settings::{DeploymentIdentity, StackSettings, DEFAULT_STACK_NAME};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        ComposedStack, Config, DeploymentIdentity, ListenerMode, ResolvedOutputs, StackComposer,
        StackError, StackSettings, DEFAULT_CONFIG_PATH, DEFAULT_STACK_NAME,
    };
    pub use aic_graph::{DeploymentState, SimulatedProvisioner};
    pub use std::sync::Arc;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
