//! StackComposer
//!
//! The only place that reads more than one tier's build result. Tiers are
//! built in dependency order:
//! 1. NetworkFabric and EdgeTier (independent of each other)
//! 2. DataTier and CacheTier (need the network)
//! 3. IdentityProvider (needs the public base URL)
//! 4. ComputeTier (needs every other tier)
//! 5. OutputPublisher
//!
//! A tier is only called with values returned by tiers that completed, so a
//! failed tier stops composition before anything consumes it. The composer
//! states dependency edges only; execution order is derived from them.

use crate::cache::CacheTier;
use crate::compute::{ComputeInputs, ComputeTier, ListenerMode, PublicEndpoint, RuntimeEnvironment};
use crate::config::{Config, ValidatedConfig};
use crate::data::DataTier;
use crate::edge::EdgeTier;
use crate::error::StackError;
use crate::identity::{self, IdentityProvider, IdentityRequest};
use crate::network::NetworkFabric;
use crate::outputs::{OutputPublisher, OutputSet, ResolvedOutputs};
use crate::settings::{DeploymentIdentity, StackSettings};
use aic_graph::{
    DeploymentReport, DeploymentState, ExecutionError, Executor, LogicalId, ResourceProvisioner,
    Topology, TopologyBuilder,
};
use serde_json::Value;
use std::sync::Arc;

/// Component name stamped on every composer resource
pub const COMPONENT: &str = "StackComposer";

/// Validated inputs, ready to compose
#[derive(Debug, Clone)]
pub struct StackComposer {
    config: ValidatedConfig,
    settings: StackSettings,
    deployment: DeploymentIdentity,
}

impl StackComposer {
    /// Validate `config` before any resource is built
    pub fn new(
        config: &Config,
        settings: StackSettings,
        deployment: DeploymentIdentity,
    ) -> Result<Self, StackError> {
        let config = config.validate()?;
        if settings.short_name.is_empty() || settings.max_azs == 0 {
            return Err(StackError::InvalidSettings(
                "short name must be non-empty and at least one zone is required".into(),
            ));
        }
        Ok(Self {
            config,
            settings,
            deployment,
        })
    }

    /// Validated configuration
    pub fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Fixed stack settings
    pub fn settings(&self) -> &StackSettings {
        &self.settings
    }

    /// Target stack, account and region
    pub fn deployment(&self) -> &DeploymentIdentity {
        &self.deployment
    }

    /// Base URL the application is reached at
    pub fn base_url(&self) -> String {
        self.config.public_base_url(&self.settings.local_fallback_url)
    }

    /// Build every tier and seal the topology
    pub fn compose(&self) -> Result<ComposedStack, StackError> {
        let settings = &self.settings;
        let deployment = &self.deployment;
        let base_url = self.base_url();
        tracing::info!(
            stack = %deployment.stack_name,
            region = %deployment.region,
            base_url = %base_url,
            "composing topology"
        );

        let mut builder = TopologyBuilder::new(settings.description.clone());

        let network = NetworkFabric::build(&mut builder, settings, deployment)?;
        let edge = EdgeTier::build(&mut builder)?;
        let database = DataTier::build(&mut builder, settings, deployment, &network)?;
        let cache = CacheTier::build(&mut builder, settings, &network)?;

        let request = IdentityRequest::for_base_url(self.config.email(), &base_url);
        let identity_set = IdentityProvider::build(&mut builder, settings, deployment, &request)?;

        let listener = ListenerMode::from_config(&self.config);
        let compute = ComputeTier::build(
            &mut builder,
            settings,
            deployment,
            &ComputeInputs {
                network: &network,
                database: &database,
                cache: &cache,
                identity: &identity_set,
                edge: &edge,
                listener: &listener,
                base_url: &base_url,
            },
        )?;

        let outputs = OutputSet::collect(&edge, &database, &cache, &compute, &identity_set);
        OutputPublisher::publish(&mut builder, &outputs)?;

        let topology = builder
            .validate()
            .map_err(|e| StackError::from_graph(COMPONENT, e))?;
        tracing::info!(
            resources = topology.len(),
            edges = topology.edge_count(),
            digest = %topology.digest(),
            "topology composed"
        );

        Ok(ComposedStack {
            topology,
            deployment: deployment.clone(),
            endpoint: compute.endpoint().clone(),
            environment: compute.environment().clone(),
            outputs,
            user_pool: identity_set.user_pool().id().clone(),
        })
    }
}

/// A sealed topology plus the derived values the composer exposes
#[derive(Debug)]
pub struct ComposedStack {
    topology: Topology,
    deployment: DeploymentIdentity,
    endpoint: PublicEndpoint,
    environment: RuntimeEnvironment,
    outputs: OutputSet,
    user_pool: LogicalId,
}

/// Result of a successful deployment
#[derive(Debug, Clone)]
pub struct StackDeployment {
    /// The nine published outputs
    pub outputs: ResolvedOutputs,
    /// What the executor did
    pub report: DeploymentReport,
}

impl ComposedStack {
    /// The sealed topology
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Target stack, account and region
    pub fn deployment(&self) -> &DeploymentIdentity {
        &self.deployment
    }

    /// Public endpoint of the load balancer
    pub fn endpoint(&self) -> &PublicEndpoint {
        &self.endpoint
    }

    /// Container environment of the application
    pub fn environment(&self) -> &RuntimeEnvironment {
        &self.environment
    }

    /// Deferred output values
    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    /// Render the declarative template
    pub fn synth(&self) -> Value {
        self.topology.synth()
    }

    /// Deploy through `provisioner`, updating `state` on success
    ///
    /// # Errors
    /// - `ProvisioningFailure` naming the tier whose resource was rejected
    /// - `PartialIdentityState` when the user directory exists but a later
    ///   identity resource failed
    /// - `IncompleteOutputs` when the resolved outputs miss a key
    pub async fn deploy(
        &self,
        provisioner: Arc<dyn ResourceProvisioner>,
        state: &mut DeploymentState,
    ) -> Result<StackDeployment, StackError> {
        let executor = Executor::new(self.deployment.pseudo_values(), provisioner);
        let report = executor
            .deploy(&self.topology, state)
            .await
            .map_err(|e| self.attribute_failure(e))?;
        let outputs = ResolvedOutputs::from_resolved(&report.outputs)?;
        tracing::info!(
            created = report.created.len(),
            updated = report.updated.len(),
            unchanged = report.unchanged.len(),
            removed = report.removed.len(),
            "deployment complete"
        );
        Ok(StackDeployment { outputs, report })
    }

    fn attribute_failure(&self, err: ExecutionError) -> StackError {
        if let ExecutionError::ProvisionFailed {
            logical_id,
            component,
            source,
        } = &err
        {
            // the directory is provisioned before every other identity resource
            if component == identity::COMPONENT && *logical_id != self.user_pool {
                tracing::error!(step = %logical_id, "identity provider left incomplete");
                return StackError::PartialIdentityState {
                    step: logical_id.to_string(),
                    reason: source.to_string(),
                };
            }
        }
        let component = err.component().unwrap_or(COMPONENT).to_string();
        tracing::error!(component = %component, error = %err, "deployment failed");
        StackError::ProvisioningFailure {
            component,
            source: err,
        }
    }
}
