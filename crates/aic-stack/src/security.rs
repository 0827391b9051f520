//! Security boundaries
//!
//! A [`SecurityBoundary`] wraps one security group and records every ingress
//! rule added to it. Each rule is its own `SecurityGroupIngress` resource, so
//! a self-referencing rule can point at the group after the group exists.
//! A tier only ever adds rules to its own boundary.

use aic_graph::{GraphError, Props, ResourceHandle, ResourceSpec, Scope, Token};
use std::fmt;

/// Ports a rule opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRange {
    /// Every protocol and port
    AllTraffic,
    /// A single TCP port
    Tcp(u16),
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRange::AllTraffic => f.write_str("all traffic"),
            PortRange::Tcp(port) => write!(f, "tcp/{port}"),
        }
    }
}

/// Where allowed traffic may come from
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    /// Members of the same boundary
    SameBoundary,
    /// Members of another boundary
    Boundary(Token),
    /// An IPv4 address range
    Cidr(Token),
    /// Any IPv4 address
    Anywhere,
}

/// A recorded ingress rule
#[derive(Debug, Clone, PartialEq)]
pub struct IngressRule {
    /// Where traffic may come from
    pub peer: Peer,
    /// What it may reach
    pub ports: PortRange,
    /// Human readable purpose
    pub description: String,
    /// The ingress resource
    pub resource: ResourceHandle,
}

/// A security group plus the rules added to it
#[derive(Debug, Clone)]
pub struct SecurityBoundary {
    name: String,
    group: ResourceHandle,
    rules: Vec<IngressRule>,
}

impl SecurityBoundary {
    /// Create the group in `vpc`, allowing all outbound traffic
    pub fn create(
        scope: &mut Scope<'_>,
        name: &str,
        description: &str,
        vpc_id: &Token,
    ) -> Result<Self, GraphError> {
        let group = scope.add(
            name,
            ResourceSpec::new(
                "AWS::EC2::SecurityGroup",
                Props::new()
                    .with("GroupDescription", description)
                    .with(
                        "SecurityGroupEgress",
                        vec![Props::new()
                            .with("CidrIp", "0.0.0.0/0")
                            .with("Description", "Allow all outbound traffic by default")
                            .with("IpProtocol", "-1")],
                    )
                    .with("VpcId", vpc_id),
            ),
        )?;
        Ok(Self {
            name: name.to_string(),
            group,
            rules: Vec::new(),
        })
    }

    /// The security group
    pub fn handle(&self) -> &ResourceHandle {
        &self.group
    }

    /// Id of the security group
    pub fn group_id(&self) -> Token {
        self.group.attr("GroupId")
    }

    /// Rules in the order they were added
    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    /// Unrestricted traffic between members of this boundary
    pub fn allow_internal(&mut self, scope: &mut Scope<'_>, description: &str) -> Result<(), GraphError> {
        self.add_rule(scope, Peer::SameBoundary, PortRange::AllTraffic, description)
    }

    /// Traffic on `ports` from an address range, typically the network's own
    pub fn allow_from_network(
        &mut self,
        scope: &mut Scope<'_>,
        cidr: &Token,
        ports: PortRange,
        description: &str,
    ) -> Result<(), GraphError> {
        self.add_rule(scope, Peer::Cidr(cidr.clone()), ports, description)
    }

    /// Traffic on `ports` from members of `other`
    pub fn allow_from(
        &mut self,
        scope: &mut Scope<'_>,
        other: &SecurityBoundary,
        ports: PortRange,
        description: &str,
    ) -> Result<(), GraphError> {
        self.add_rule(scope, Peer::Boundary(other.group_id()), ports, description)
    }

    /// Traffic on `ports` from any IPv4 address
    pub fn allow_from_anywhere(
        &mut self,
        scope: &mut Scope<'_>,
        ports: PortRange,
        description: &str,
    ) -> Result<(), GraphError> {
        self.add_rule(scope, Peer::Anywhere, ports, description)
    }

    fn add_rule(
        &mut self,
        scope: &mut Scope<'_>,
        peer: Peer,
        ports: PortRange,
        description: &str,
    ) -> Result<(), GraphError> {
        let mut props = Props::new().with("GroupId", self.group_id());
        props = match &peer {
            Peer::SameBoundary => props.with("SourceSecurityGroupId", self.group_id()),
            Peer::Boundary(group) => props.with("SourceSecurityGroupId", group),
            Peer::Cidr(cidr) => props.with("CidrIp", cidr),
            Peer::Anywhere => props.with("CidrIp", "0.0.0.0/0"),
        };
        props = match ports {
            PortRange::AllTraffic => props.with("IpProtocol", "-1"),
            PortRange::Tcp(port) => props
                .with("IpProtocol", "tcp")
                .with("FromPort", port)
                .with("ToPort", port),
        };
        props.insert("Description", description);

        let name = format!("{}Ingress{}", self.name, self.rules.len() + 1);
        let resource = scope.add(&name, ResourceSpec::new("AWS::EC2::SecurityGroupIngress", props))?;
        tracing::debug!(boundary = %self.name, %ports, "ingress rule added");

        self.rules.push(IngressRule {
            peer,
            ports,
            description: description.to_string(),
            resource,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aic_graph::TopologyBuilder;

    #[test]
    fn rules_are_separate_resources() {
        let mut builder = TopologyBuilder::new("sg");
        let mut scope = builder.scope("Data", "Data");
        let vpc = scope
            .add("Vpc", ResourceSpec::new("AWS::EC2::VPC", Props::new()))
            .unwrap();
        let mut boundary =
            SecurityBoundary::create(&mut scope, "DbSg", "database", &vpc.reference()).unwrap();
        boundary.allow_internal(&mut scope, "inside").unwrap();
        boundary
            .allow_from_network(&mut scope, &vpc.attr("CidrBlock"), PortRange::Tcp(5432), "vpc")
            .unwrap();

        assert_eq!(boundary.rules().len(), 2);
        let topology = builder.validate().unwrap();
        assert_eq!(topology.resources_of_type("AWS::EC2::SecurityGroupIngress").count(), 2);

        let template = topology.synth();
        let rule = &template["Resources"]["DataDbSgIngress2"]["Properties"];
        assert_eq!(rule["FromPort"], 5432);
        assert_eq!(rule["CidrIp"]["Fn::GetAtt"][0], "DataVpc");
    }
}
