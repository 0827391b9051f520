use aic_graph::{PasswordPolicy, Props, ResourceSpec, TopologyBuilder, DEFAULT_PASSWORD_LENGTH};
use aic_stack::outputs::OUTPUT_KEYS;
use aic_stack::prelude::*;
use aic_stack::{ListenerProtocol, PortRange, SecurityBoundary};
use aic_test_utils::{
    compose, inbound_rules, plain_config, test_identity, tls_config, TEST_EMAIL,
};
use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Policy the database credentials secret is generated under
static DB_SECRET_POLICY: Lazy<PasswordPolicy> = Lazy::new(|| {
    let template = compose(&plain_config()).synth();
    let generate =
        &template["Resources"]["DataCredentialsSecret"]["Properties"]["GenerateSecretString"];
    PasswordPolicy {
        length: DEFAULT_PASSWORD_LENGTH,
        exclude_punctuation: generate["ExcludePunctuation"].as_bool().unwrap(),
        include_space: generate["IncludeSpace"].as_bool().unwrap(),
    }
});

#[test]
fn test_plaintext_listener_without_certificate() {
    let stack = compose(&plain_config());
    assert_eq!(stack.endpoint().protocol(), ListenerProtocol::Http);
    assert_eq!(stack.endpoint().port(), 80);

    let template = stack.synth();
    let listener = &template["Resources"]["ComputeListener"]["Properties"];
    assert_eq!(listener["Port"], 80);
    assert_eq!(listener["Protocol"], "HTTP");
    assert!(listener.get("Certificates").is_none());
}

#[test]
fn test_tls_listener_with_certificate() {
    let stack = compose(&tls_config());
    assert_eq!(stack.endpoint().protocol(), ListenerProtocol::Https);
    assert_eq!(stack.endpoint().port(), 443);
    assert_eq!(stack.endpoint().url().literal_prefix(), "https://");

    let template = stack.synth();
    let listener = &template["Resources"]["ComputeListener"]["Properties"];
    assert_eq!(listener["Port"], 443);
    assert_eq!(listener["Protocol"], "HTTPS");
    assert_eq!(
        listener["Certificates"][0]["CertificateArn"],
        aic_test_utils::TEST_CERTIFICATE_ARN
    );
}

#[test]
fn test_group_attachment_after_group() {
    for config in [plain_config(), tls_config()] {
        let stack = compose(&config);
        let topology = stack.topology();
        let group = topology.position("IdentityAdminGroup").unwrap();
        let user = topology.position("IdentityAdminUser").unwrap();
        let attachment = topology.position("IdentityAdminGroupAttachment").unwrap();
        assert!(group < attachment);
        assert!(user < attachment);

        let template = stack.synth();
        let depends_on = template["Resources"]["IdentityAdminGroupAttachment"]["DependsOn"]
            .as_array()
            .unwrap();
        assert!(depends_on.iter().any(|d| d == "IdentityAdminGroup"));
    }
}

#[test]
fn test_connection_urls_reference_their_producers() {
    let stack = compose(&plain_config());
    let env = stack.environment();

    let postgres: Vec<String> = env
        .get("POSTGRES_URL")
        .unwrap()
        .references()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    assert!(postgres.contains(&"DataCredentialsSecret".to_string()));
    assert!(postgres.contains(&"DataInstance".to_string()));

    let redis = env.get("REDIS_URL").unwrap();
    assert_eq!(redis.literal_prefix(), "redis://");
    assert!(redis.references().iter().all(|id| id.as_str() == "CacheRedis"));

    // the task definition can only be created after both producers
    let topology = stack.topology();
    assert!(topology.depends_on("ComputeTaskDefinition", "DataInstance"));
    assert!(topology.depends_on("ComputeTaskDefinition", "CacheRedis"));
    assert!(topology.depends_on("ComputeTaskDefinition", "IdentityAdminGroupAttachment"));
}

fn expected_rules(pairs: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    pairs
        .iter()
        .map(|(peer, ports)| ((*peer).to_string(), (*ports).to_string()))
        .collect()
}

#[test]
fn test_database_boundary_rules() {
    let template = compose(&plain_config()).synth();
    assert_eq!(
        inbound_rules(&template, "DataDbSecurityGroup"),
        expected_rules(&[("self", "all"), ("NetworkVpc.CidrBlock", "tcp/5432-5432")])
    );

    let internal = &template["Resources"]["DataDbSecurityGroupIngress1"]["Properties"];
    assert_eq!(internal["IpProtocol"], "-1");
    let network = &template["Resources"]["DataDbSecurityGroupIngress2"]["Properties"];
    assert_eq!(network["CidrIp"]["Fn::GetAtt"][1], "CidrBlock");
}

#[test]
fn test_cache_boundary_rules() {
    let template = compose(&plain_config()).synth();
    assert_eq!(
        inbound_rules(&template, "CacheRedisSecurityGroup"),
        expected_rules(&[("self", "all"), ("NetworkVpc.CidrBlock", "tcp/6379-6379")])
    );
}

#[test]
fn test_open_rule_shows_up_in_inbound_rules() {
    let mut builder = TopologyBuilder::new("boundary");
    let mut scope = builder.scope("Data", "Data");
    let vpc = scope
        .add("Vpc", ResourceSpec::new("AWS::EC2::VPC", Props::new()))
        .unwrap();
    let mut boundary =
        SecurityBoundary::create(&mut scope, "DbSecurityGroup", "db", &vpc.reference()).unwrap();
    boundary.allow_internal(&mut scope, "inside").unwrap();
    boundary
        .allow_from_network(&mut scope, &vpc.attr("CidrBlock"), PortRange::Tcp(5432), "vpc")
        .unwrap();
    boundary
        .allow_from_anywhere(&mut scope, PortRange::Tcp(5432), "everyone")
        .unwrap();
    let template = builder.validate().unwrap().synth();

    let rules = inbound_rules(&template, "DataDbSecurityGroup");
    assert!(rules.contains(&("0.0.0.0/0".to_string(), "tcp/5432-5432".to_string())));
    assert_ne!(
        rules,
        expected_rules(&[("self", "all"), ("DataVpc.CidrBlock", "tcp/5432-5432")])
    );
}

#[test]
fn test_task_role_policy_scope() {
    let template = compose(&plain_config()).synth();
    let policy = &template["Resources"]["ComputeTaskRolePolicy"]["Properties"];
    assert_eq!(policy["Roles"][0]["Ref"], "ComputeTaskRole");

    let statements = policy["PolicyDocument"]["Statement"].as_array().unwrap();
    let statement_for = |action: &str| {
        let matching: Vec<&Value> = statements
            .iter()
            .filter(|s| s["Action"].as_array().unwrap().iter().any(|a| a == action))
            .collect();
        assert_eq!(matching.len(), 1, "{action} granted by exactly one statement");
        matching[0]
    };

    let pass_role = statement_for("iam:PassRole");
    assert_eq!(pass_role["Effect"], "Allow");
    assert_eq!(
        pass_role["Resource"],
        json!([{ "Fn::GetAtt": ["ComputeTaskRole", "Arn"] }])
    );

    let read_secret = statement_for("secretsmanager:GetSecretValue");
    assert_eq!(read_secret["Resource"], json!([{ "Ref": "DataCredentialsSecret" }]));

    let objects = statement_for("s3:GetObject");
    assert_eq!(
        objects["Action"],
        json!(["s3:GetObject", "s3:PutObject", "s3:ListBucket"])
    );
    assert_eq!(
        objects["Resource"],
        json!([
            { "Fn::Join": ["", [{ "Fn::GetAtt": ["EdgeBucket", "Arn"] }, "/*"]] },
            { "Fn::GetAtt": ["EdgeBucket", "Arn"] }
        ])
    );

    let bedrock = statement_for("bedrock:InvokeModel");
    assert_eq!(
        bedrock["Action"],
        json!([
            "bedrock:InvokeAgent",
            "bedrock:InvokeModel",
            "bedrock:InvokeModelWithResponseStream"
        ])
    );
    assert_eq!(bedrock["Resource"], json!(["*"]));

    assert_eq!(statements.len(), 4);
}

#[test]
fn test_service_rollout_settings() {
    let template = compose(&plain_config()).synth();
    let service = &template["Resources"]["ComputeService"]["Properties"];
    assert_eq!(service["DesiredCount"], 2);
    assert_eq!(service["HealthCheckGracePeriodSeconds"], 60);
    assert_eq!(
        service["DeploymentConfiguration"]["DeploymentCircuitBreaker"],
        json!({ "Enable": true, "Rollback": true })
    );
    assert_eq!(service["LoadBalancers"][0]["TargetGroupArn"]["Ref"], "ComputeTargetGroup");

    let target_group = &template["Resources"]["ComputeTargetGroup"]["Properties"];
    assert_eq!(target_group["HealthCheckPath"], "/ping");
    assert_eq!(target_group["HealthCheckProtocol"], "HTTP");
    assert_eq!(target_group["TargetType"], "ip");
}

#[test]
fn test_exactly_nine_outputs() {
    for config in [plain_config(), tls_config()] {
        let stack = compose(&config);
        let names: Vec<&str> = stack.topology().outputs().map(|o| o.name()).collect();
        assert_eq!(names, OUTPUT_KEYS.to_vec());
    }
}

#[test]
fn test_retained_resources() {
    let stack = compose(&plain_config());
    let template = stack.synth();
    for id in ["DataInstance", "NetworkFlowLogGroup", "ComputeLogGroup"] {
        assert_eq!(template["Resources"][id]["DeletionPolicy"], "Retain", "{id}");
    }
}

#[test]
fn test_callback_urls_follow_domain() {
    let plain = compose(&plain_config()).synth();
    let client = &plain["Resources"]["IdentityUserPoolClient"]["Properties"];
    assert_eq!(
        client["CallbackURLs"][0],
        "http://localhost:3000/api/auth/callback/cognito"
    );

    let tls = compose(&tls_config()).synth();
    let client = &tls["Resources"]["IdentityUserPoolClient"]["Properties"];
    assert_eq!(
        client["CallbackURLs"][0],
        "https://chat.example.com/api/auth/callback/cognito"
    );
    assert_eq!(client["LogoutURLs"][0], "https://chat.example.com");
}

#[test]
fn test_auth_secret_is_generated_not_literal() {
    let stack = compose(&plain_config());
    assert!(stack.environment().get("AUTH_SECRET").is_none());

    let template = stack.synth();
    let container = &template["Resources"]["ComputeTaskDefinition"]["Properties"]
        ["ContainerDefinitions"][0];
    assert_eq!(container["Secrets"][0]["Name"], "AUTH_SECRET");
    assert_eq!(container["Secrets"][0]["ValueFrom"]["Ref"], "ComputeAuthSecret");
}

#[test]
fn test_invalid_config_stops_before_build() {
    let err = StackComposer::new(
        &Config::new(""),
        StackSettings::default(),
        test_identity(),
    )
    .unwrap_err();
    assert!(err.is_config_invalid());

    let err = StackComposer::new(
        &Config::new(TEST_EMAIL).with_certificate_arn("not-an-arn"),
        StackSettings::default(),
        test_identity(),
    )
    .unwrap_err();
    assert!(err.is_config_invalid());
}

#[test]
fn test_synth_is_stable() {
    let a = compose(&plain_config());
    let b = compose(&plain_config());
    assert_eq!(a.topology().digest(), b.topology().digest());
    assert_ne!(a.topology().digest(), compose(&tls_config()).topology().digest());
}

#[test]
fn test_cache_rules_use_redis_port() {
    let stack = compose(&plain_config());
    let template = stack.synth();
    let rule = &template["Resources"]["CacheRedisSecurityGroupIngress2"]["Properties"];
    assert_eq!(rule["FromPort"], 6379);
    let group = &template["Resources"]["CacheRedisSubnetGroup"]["Properties"];
    assert_eq!(group["SubnetIds"].as_array().unwrap().len(), 1);
}

proptest! {
    #[test]
    fn prop_database_password_policy(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let policy = *DB_SECRET_POLICY;
        let password = policy.generate(&mut rng);
        prop_assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        prop_assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        prop_assert!(password.chars().any(|c| c.is_ascii_digit()));
        prop_assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        prop_assert!(!password.contains(' '));
        prop_assert!(policy.admits(&password));
    }
}
