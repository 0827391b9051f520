//! Testing utilities for the AIC workspace
//!
//! Shared fixtures: configs, deployment identity, composed stacks and
//! simulated deployments.


use aic_graph::{DeploymentState, SimulatedProvisioner};
use aic_stack::{ComposedStack, Config, DeploymentIdentity, StackComposer, StackDeployment, StackError, StackSettings, DEFAULT_STACK_NAME};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Account every test deploys into
pub const TEST_ACCOUNT: &str = "123456789012";
/// Region every test deploys into
pub const TEST_REGION: &str = "us-east-1";
/// Administrator email of the fixture configs
pub const TEST_EMAIL: &str = "admin@example.com";
/// Certificate of the TLS fixture config
pub const TEST_CERTIFICATE_ARN: &str =
    "arn:aws:acm:us-east-1:123456789012:certificate/0f1e2d3c-4b5a-6978-8796-a5b4c3d2e1f0";
/// Simulator seed, so generated ids are repeatable
pub const TEST_SEED: u64 = 42;

/// Plaintext config: no certificate, no domain
pub fn plain_config() -> Config {
    Config::new(TEST_EMAIL)
}

/// TLS config with a public domain
pub fn tls_config() -> Config {
    Config::new(TEST_EMAIL)
        .with_certificate_arn(TEST_CERTIFICATE_ARN)
        .with_domain_name("chat.example.com")
}

/// Default stack in the test account and region
pub fn test_identity() -> DeploymentIdentity {
    DeploymentIdentity::new(DEFAULT_STACK_NAME, TEST_ACCOUNT, TEST_REGION)
}

/// Compose `config` with default settings, panicking on failure
pub fn compose(config: &Config) -> ComposedStack {
    StackComposer::new(config, StackSettings::default(), test_identity())
        .unwrap()
        .compose()
        .unwrap()
}

/// Provisioner bound to the test account and region
pub fn simulated_provisioner() -> Arc<SimulatedProvisioner> {
    Arc::new(
        SimulatedProvisioner::new()
            .with_identity(TEST_ACCOUNT, TEST_REGION)
            .with_seed(TEST_SEED),
    )
}

/// Deploy `stack` through `provisioner` on top of `state`
pub async fn deploy_with(
    stack: &ComposedStack,
    provisioner: Arc<SimulatedProvisioner>,
    state: &mut DeploymentState,
) -> Result<StackDeployment, StackError> {
    stack.deploy(provisioner, state).await
}

/// Compose `config` and deploy it into a fresh state
pub async fn deploy_fresh(config: &Config) -> (StackDeployment, DeploymentState) {
    let stack = compose(config);
    let mut state = DeploymentState::new();
    let deployed = deploy_with(&stack, simulated_provisioner(), &mut state)
        .await
        .unwrap();
    (deployed, state)
}

/// Every inbound rule on security group `group` in a synthesized template
///
/// Covers both standalone `SecurityGroupIngress` resources and rules inlined
/// on the group itself. Each rule is rendered as `(peer, ports)`:
/// `self`, `group:<id>`, a literal CIDR or `<id>.<attribute>` for the peer and
/// `all` or `tcp/<from>-<to>` for the ports.
pub fn inbound_rules(template: &Value, group: &str) -> BTreeSet<(String, String)> {
    let resources = template["Resources"].as_object().cloned().unwrap_or_default();
    let mut rules = BTreeSet::new();
    for (id, resource) in &resources {
        let properties = &resource["Properties"];
        match resource["Type"].as_str() {
            Some("AWS::EC2::SecurityGroupIngress")
                if properties["GroupId"]["Fn::GetAtt"][0] == group =>
            {
                rules.insert(describe_rule(properties, group));
            }
            Some("AWS::EC2::SecurityGroup") if id == group => {
                for inline in properties["SecurityGroupIngress"].as_array().into_iter().flatten() {
                    rules.insert(describe_rule(inline, group));
                }
            }
            _ => {}
        }
    }
    rules
}

fn describe_rule(rule: &Value, group: &str) -> (String, String) {
    let peer = if let Some(source) = rule["SourceSecurityGroupId"]["Fn::GetAtt"][0].as_str() {
        if source == group {
            "self".to_string()
        } else {
            format!("group:{source}")
        }
    } else if let Some(cidr) = rule["CidrIp"].as_str() {
        cidr.to_string()
    } else {
        let att = &rule["CidrIp"]["Fn::GetAtt"];
        format!("{}.{}", att[0].as_str().unwrap_or("?"), att[1].as_str().unwrap_or("?"))
    };
    let ports = match rule["IpProtocol"].as_str() {
        Some("-1") => "all".to_string(),
        protocol => format!(
            "{}/{}-{}",
            protocol.unwrap_or("?"),
            rule["FromPort"],
            rule["ToPort"]
        ),
    };
    (peer, ports)
}
