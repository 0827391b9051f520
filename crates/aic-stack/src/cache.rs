//! CacheTier
//!
//! A Redis replication group with automatic failover and three replicas per
//! shard. The subnet group covers a single private subnet. The cache is not
//! credentialed, so its URL carries only host and port.

use crate::error::StackError;
use crate::network::NetworkHandle;
use crate::security::{PortRange, SecurityBoundary};
use crate::settings::StackSettings;
use aic_graph::{GraphError, Props, ResourceHandle, ResourceSpec, Scope, Token, TopologyBuilder};

/// Component name stamped on every cache tier resource
pub const COMPONENT: &str = "CacheTier";
const PREFIX: &str = "Cache";

/// Port the cache listens on
pub const REDIS_PORT: u16 = 6379;
const NODE_TYPE: &str = "cache.m5.large";
const ENGINE_VERSION: &str = "7.0";
const REPLICAS_PER_SHARD: u32 = 3;

/// The built cache tier
#[derive(Debug, Clone)]
pub struct Cache {
    boundary: SecurityBoundary,
    subnet_group: ResourceHandle,
    cluster: ResourceHandle,
}

impl Cache {
    /// Security boundary around the cache
    pub fn boundary(&self) -> &SecurityBoundary {
        &self.boundary
    }

    /// Subnet group the cache is placed in
    pub fn subnet_group(&self) -> &ResourceHandle {
        &self.subnet_group
    }

    /// The replication group
    pub fn cluster(&self) -> &ResourceHandle {
        &self.cluster
    }

    /// `redis://host:port` of the primary endpoint
    pub fn connection_url(&self) -> Token {
        Token::join([
            Token::literal("redis://"),
            self.cluster.attr("PrimaryEndPoint.Address"),
            Token::literal(":"),
            self.cluster.attr("PrimaryEndPoint.Port"),
        ])
    }
}

/// Builds the cache tier
pub struct CacheTier;

impl CacheTier {
    /// Add the cache inside `network`
    ///
    /// # Errors
    /// Fails when a resource cannot be added to the builder
    pub fn build(
        builder: &mut TopologyBuilder,
        settings: &StackSettings,
        network: &NetworkHandle,
    ) -> Result<Cache, StackError> {
        let mut scope = builder.scope(COMPONENT, PREFIX);
        let cache = Self::build_in(&mut scope, settings, network)
            .map_err(|e| StackError::from_graph(COMPONENT, e))?;
        tracing::info!(component = COMPONENT, cluster = %cache.cluster.id(), "cache tier built");
        Ok(cache)
    }

    fn build_in(
        scope: &mut Scope<'_>,
        settings: &StackSettings,
        network: &NetworkHandle,
    ) -> Result<Cache, GraphError> {
        let mut boundary = SecurityBoundary::create(
            scope,
            "RedisSecurityGroup",
            &format!("SecurityGroup associated with Redis Cluster {}", settings.short_name),
            &network.vpc_id(),
        )?;
        boundary.allow_internal(scope, "Allow all traffic inside SG")?;
        boundary.allow_from_network(
            scope,
            &network.cidr_block(),
            PortRange::Tcp(REDIS_PORT),
            "Allow access to Redis from the VPC",
        )?;

        let subnet_group_name = format!("{}RedisSubnetGroup", settings.short_name);
        let first_private = network
            .private_subnet_ids()
            .into_iter()
            .take(1)
            .collect::<Vec<_>>();
        let subnet_group = scope.add(
            "RedisSubnetGroup",
            ResourceSpec::new(
                "AWS::ElastiCache::SubnetGroup",
                Props::new()
                    .with("Description", "Redis Subnet Group")
                    .with("SubnetIds", first_private)
                    .with("CacheSubnetGroupName", subnet_group_name.as_str()),
            ),
        )?;

        let cluster = scope.add(
            "Redis",
            ResourceSpec::new(
                "AWS::ElastiCache::ReplicationGroup",
                Props::new()
                    .with("ReplicationGroupDescription", "Redis cluster")
                    .with("CacheNodeType", NODE_TYPE)
                    .with("Engine", "Redis")
                    .with("EngineVersion", ENGINE_VERSION)
                    .with("CacheSubnetGroupName", subnet_group_name.as_str())
                    .with("SecurityGroupIds", vec![boundary.group_id()])
                    .with("ReplicasPerNodeGroup", REPLICAS_PER_SHARD)
                    .with("AutomaticFailoverEnabled", true)
                    .with("TransitEncryptionEnabled", true)
                    .with("TransitEncryptionMode", "preferred")
                    .with("AtRestEncryptionEnabled", true),
            ),
        )?;
        // the subnet group is named by literal
        scope.depends_on(&cluster, &subnet_group)?;
        scope.depends_on(&cluster, boundary.handle())?;

        Ok(Cache {
            boundary,
            subnet_group,
            cluster,
        })
    }
}
