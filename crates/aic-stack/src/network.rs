//! NetworkFabric
//!
//! One isolated network spread over the configured number of availability
//! zones, with a public and a private-with-egress subnet per zone, exactly
//! one NAT egress path, and a flow log delivered to a retained log group.

use crate::error::StackError;
use crate::iam::{PolicyDocument, PolicyStatement};
use crate::settings::{DeploymentIdentity, StackSettings};
use aic_graph::{
    GraphError, Props, ResourceHandle, ResourceSpec, Scope, Token, TopologyBuilder,
};
use std::net::Ipv4Addr;

/// Component name stamped on every network resource
pub const COMPONENT: &str = "NetworkFabric";
const PREFIX: &str = "Network";

/// Opaque reference to the network, lent to the tiers that run inside it
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    vpc: ResourceHandle,
    public_subnets: Vec<ResourceHandle>,
    private_subnets: Vec<ResourceHandle>,
    public_routes: Vec<ResourceHandle>,
    nat_gateway: ResourceHandle,
    flow_log_group: ResourceHandle,
}

impl NetworkHandle {
    /// The virtual network
    pub fn vpc(&self) -> &ResourceHandle {
        &self.vpc
    }

    /// Id of the virtual network
    pub fn vpc_id(&self) -> Token {
        self.vpc.reference()
    }

    /// The network's declared address range
    pub fn cidr_block(&self) -> Token {
        self.vpc.attr("CidrBlock")
    }

    /// Public subnets, one per zone
    pub fn public_subnet_ids(&self) -> Vec<Token> {
        self.public_subnets.iter().map(ResourceHandle::reference).collect()
    }

    /// Private subnets, one per zone
    pub fn private_subnet_ids(&self) -> Vec<Token> {
        self.private_subnets.iter().map(ResourceHandle::reference).collect()
    }

    /// Default routes to the internet gateway; internet-facing resources wait for them
    pub fn public_routes(&self) -> &[ResourceHandle] {
        &self.public_routes
    }

    /// Shared outbound gateway of the private subnets
    pub fn nat_gateway(&self) -> &ResourceHandle {
        &self.nat_gateway
    }

    /// Log group receiving flow logs
    pub fn flow_log_group(&self) -> &ResourceHandle {
        &self.flow_log_group
    }
}

/// Split `cidr` into `count` equal subnets
///
/// Each subnet gets the smallest power-of-two share that fits `count`.
pub fn carve_subnets(cidr: &str, count: usize) -> Result<Vec<String>, StackError> {
    let invalid = || StackError::InvalidSettings(format!("'{cidr}' is not an IPv4 CIDR block"));
    let (address, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.parse().map_err(|_| invalid())?;
    let prefix: u32 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 || count == 0 {
        return Err(invalid());
    }

    let bits = usize::BITS - (count - 1).leading_zeros();
    let new_prefix = prefix + bits;
    if new_prefix > 28 {
        return Err(StackError::InvalidSettings(format!(
            "'{cidr}' is too small for {count} subnets"
        )));
    }

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let base = u32::from(address) & mask;
    let size = 1u32 << (32 - new_prefix);
    Ok((0..count)
        .map(|i| {
            // i < 2^bits, so the product stays inside the parent block
            let offset = u32::try_from(i).unwrap_or(0) * size;
            format!("{}/{new_prefix}", Ipv4Addr::from(base + offset))
        })
        .collect())
}

/// Builds the network
pub struct NetworkFabric;

impl NetworkFabric {
    /// Add the network with public and private subnets in each zone
    ///
    /// # Errors
    /// Fails on an unusable address range or when a resource cannot be added
    pub fn build(
        builder: &mut TopologyBuilder,
        settings: &StackSettings,
        identity: &DeploymentIdentity,
    ) -> Result<NetworkHandle, StackError> {
        let azs = usize::from(settings.max_azs.max(1));
        let cidrs = carve_subnets(&settings.vpc_cidr, azs * 2)?;
        let mut scope = builder.scope(COMPONENT, PREFIX);
        Self::build_in(&mut scope, settings, identity, &cidrs, azs)
            .map_err(|e| StackError::from_graph(COMPONENT, e))
    }

    fn build_in(
        scope: &mut Scope<'_>,
        settings: &StackSettings,
        identity: &DeploymentIdentity,
        cidrs: &[String],
        azs: usize,
    ) -> Result<NetworkHandle, GraphError> {
        let vpc = scope.add(
            "Vpc",
            ResourceSpec::new(
                "AWS::EC2::VPC",
                Props::new()
                    .with("CidrBlock", settings.vpc_cidr.as_str())
                    .with("EnableDnsHostnames", true)
                    .with("EnableDnsSupport", true)
                    .with("InstanceTenancy", "default")
                    .with("Tags", vec![name_tag("AI-Chatbot-VPC")]),
            ),
        )?;

        let igw = scope.add(
            "InternetGateway",
            ResourceSpec::new("AWS::EC2::InternetGateway", Props::new()),
        )?;
        let attachment = scope.add(
            "GatewayAttachment",
            ResourceSpec::new(
                "AWS::EC2::VPCGatewayAttachment",
                Props::new()
                    .with("VpcId", vpc.reference())
                    .with("InternetGatewayId", igw.reference()),
            ),
        )?;

        let mut public_subnets = Vec::with_capacity(azs);
        let mut public_routes = Vec::with_capacity(azs);
        for (i, cidr) in cidrs.iter().take(azs).enumerate() {
            let n = i + 1;
            let subnet = subnet(scope, &format!("PublicSubnet{n}"), &vpc, cidr, i, true)?;
            let table = route_table(scope, &format!("PublicSubnet{n}RouteTable"), &vpc, &subnet)?;
            let route = scope.add(
                &format!("PublicSubnet{n}DefaultRoute"),
                ResourceSpec::new(
                    "AWS::EC2::Route",
                    Props::new()
                        .with("RouteTableId", table.reference())
                        .with("DestinationCidrBlock", "0.0.0.0/0")
                        .with("GatewayId", igw.reference()),
                ),
            )?;
            // the gateway id is known before the gateway is attached
            scope.depends_on(&route, &attachment)?;
            public_subnets.push(subnet);
            public_routes.push(route);
        }

        let eip = scope.add(
            "NatEip",
            ResourceSpec::new("AWS::EC2::EIP", Props::new().with("Domain", "vpc")),
        )?;
        let nat_gateway = scope.add(
            "NatGateway",
            ResourceSpec::new(
                "AWS::EC2::NatGateway",
                Props::new()
                    .with("SubnetId", public_subnets[0].reference())
                    .with("AllocationId", eip.attr("AllocationId")),
            ),
        )?;
        scope.depends_on(&nat_gateway, &public_routes[0])?;

        let mut private_subnets = Vec::with_capacity(azs);
        for (i, cidr) in cidrs.iter().skip(azs).take(azs).enumerate() {
            let n = i + 1;
            let subnet = subnet(scope, &format!("PrivateSubnet{n}"), &vpc, cidr, i, false)?;
            let table = route_table(scope, &format!("PrivateSubnet{n}RouteTable"), &vpc, &subnet)?;
            scope.add(
                &format!("PrivateSubnet{n}DefaultRoute"),
                ResourceSpec::new(
                    "AWS::EC2::Route",
                    Props::new()
                        .with("RouteTableId", table.reference())
                        .with("DestinationCidrBlock", "0.0.0.0/0")
                        .with("NatGatewayId", nat_gateway.reference()),
                ),
            )?;
            private_subnets.push(subnet);
        }

        let flow_log_group = scope.add(
            "FlowLogGroup",
            ResourceSpec::new(
                "AWS::Logs::LogGroup",
                Props::new()
                    .with(
                        "LogGroupName",
                        format!("{}-vpc-flow-logs-{}", settings.short_name, identity.short_id()),
                    )
                    .with("RetentionInDays", settings.log_retention_days),
            )
            .retain(),
        )?;
        let flow_log_role = scope.add(
            "FlowLogRole",
            ResourceSpec::new(
                "AWS::IAM::Role",
                Props::new()
                    .with(
                        "AssumeRolePolicyDocument",
                        PolicyDocument::assumable_by("vpc-flow-logs.amazonaws.com"),
                    )
                    .with(
                        "Policies",
                        vec![Props::new()
                            .with("PolicyName", "FlowLogDelivery")
                            .with(
                                "PolicyDocument",
                                PolicyDocument::new().with(
                                    PolicyStatement::allow([
                                        "logs:CreateLogStream",
                                        "logs:PutLogEvents",
                                        "logs:DescribeLogStreams",
                                    ])
                                    .on(flow_log_group.attr("Arn")),
                                ),
                            )],
                    ),
            ),
        )?;
        scope.add(
            "FlowLog",
            ResourceSpec::new(
                "AWS::EC2::FlowLog",
                Props::new()
                    .with("ResourceId", vpc.reference())
                    .with("ResourceType", "VPC")
                    .with("TrafficType", "ALL")
                    .with("LogDestinationType", "cloud-watch-logs")
                    .with("LogGroupName", flow_log_group.reference())
                    .with("DeliverLogsPermissionArn", flow_log_role.attr("Arn")),
            ),
        )?;

        tracing::info!(
            component = COMPONENT,
            azs,
            cidr = %settings.vpc_cidr,
            "network built"
        );

        Ok(NetworkHandle {
            vpc,
            public_subnets,
            private_subnets,
            public_routes,
            nat_gateway,
            flow_log_group,
        })
    }
}

fn name_tag(name: &str) -> Props {
    Props::new().with("Key", "Name").with("Value", name)
}

fn subnet(
    scope: &mut Scope<'_>,
    name: &str,
    vpc: &ResourceHandle,
    cidr: &str,
    az: usize,
    public: bool,
) -> Result<ResourceHandle, GraphError> {
    let az = u8::try_from(az).unwrap_or(u8::MAX);
    let kind = if public { "Public" } else { "Private" };
    scope.add(
        name,
        ResourceSpec::new(
            "AWS::EC2::Subnet",
            Props::new()
                .with("VpcId", vpc.reference())
                .with("CidrBlock", cidr)
                .with("AvailabilityZone", Token::availability_zone(az))
                .with("MapPublicIpOnLaunch", public)
                .with(
                    "Tags",
                    vec![
                        name_tag(name),
                        Props::new().with("Key", "aic:subnet-type").with("Value", kind),
                    ],
                ),
        ),
    )
}

fn route_table(
    scope: &mut Scope<'_>,
    name: &str,
    vpc: &ResourceHandle,
    subnet: &ResourceHandle,
) -> Result<ResourceHandle, GraphError> {
    let table = scope.add(
        name,
        ResourceSpec::new(
            "AWS::EC2::RouteTable",
            Props::new().with("VpcId", vpc.reference()),
        ),
    )?;
    scope.add(
        &format!("{name}Association"),
        ResourceSpec::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            Props::new()
                .with("RouteTableId", table.reference())
                .with("SubnetId", subnet.reference()),
        ),
    )?;
    Ok(table)
}
