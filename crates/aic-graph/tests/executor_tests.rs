use aic_graph::prelude::*;
use aic_graph::{ImageAsset, SimulatedProvisioner};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn pseudo() -> PseudoValues {
    PseudoValues::new("exec-stack", "123456789012", "eu-west-1")
}

/// Secret -> database -> output built from both, plus an image asset
fn topology() -> Topology {
    let mut builder = TopologyBuilder::new("executor");
    let mut scope = builder.scope("Data", "Data");
    let secret = scope
        .add(
            "Secret",
            ResourceSpec::new(
                "AWS::SecretsManager::Secret",
                Props::new().with(
                    "GenerateSecretString",
                    Props::new()
                        .with("SecretStringTemplate", r#"{"username":"postgres"}"#)
                        .with("GenerateStringKey", "password")
                        .with("ExcludePunctuation", true),
                ),
            ),
        )
        .unwrap();
    let db = scope
        .add(
            "Db",
            ResourceSpec::new(
                "AWS::RDS::DBInstance",
                Props::new()
                    .with("MasterUsername", secret.secret_field("username"))
                    .with("MasterUserPassword", secret.secret_field("password"))
                    .with("AvailabilityZone", Token::availability_zone(0)),
            ),
        )
        .unwrap();
    let image = scope.add_asset(ImageAsset::new("app")).unwrap();
    scope
        .add(
            "Task",
            ResourceSpec::new("AWS::ECS::TaskDefinition", Props::new().with("Image", image.image_uri())),
        )
        .unwrap();
    builder
        .add_output(
            "DatabaseUrl",
            "Connection string",
            Token::join([
                Token::literal("postgres://"),
                secret.secret_field("username"),
                Token::literal(":"),
                secret.secret_field("password"),
                Token::literal("@"),
                db.attr("Endpoint.Address"),
            ]),
        )
        .unwrap();
    builder.validate().unwrap()
}

#[tokio::test]
async fn test_provisions_in_dependency_order() {
    let provisioner = Arc::new(SimulatedProvisioner::new().with_identity("123456789012", "eu-west-1"));
    let executor = Executor::new(pseudo(), provisioner.clone());
    let mut state = DeploymentState::new();
    let topology = topology();

    let report = executor.deploy(&topology, &mut state).await.unwrap();

    let order: Vec<String> = provisioner
        .provisioned_order()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(order, vec!["DataSecret", "DataDb", "DataTask"]);
    assert_eq!(provisioner.published_assets().len(), 1);
    assert_eq!(report.assets_published, 1);

    let url = &report.outputs["DatabaseUrl"];
    assert!(url.starts_with("postgres://postgres:"));
    assert!(url.ends_with(".eu-west-1.rds.amazonaws.com"));
    assert_eq!(state.topology_digest.as_deref(), Some(topology.digest()));
}

#[tokio::test]
async fn test_redeploy_does_not_rotate_secret() {
    let executor = Executor::new(pseudo(), Arc::new(SimulatedProvisioner::new()));
    let mut state = DeploymentState::new();
    let first = executor.deploy(&topology(), &mut state).await.unwrap();
    let second = executor.deploy(&topology(), &mut state).await.unwrap();

    assert!(second.is_noop());
    assert_eq!(first.outputs, second.outputs);
}

#[tokio::test]
async fn test_asset_failure_stops_before_any_resource() {
    let provisioner = Arc::new(SimulatedProvisioner::new().fail_assets());
    let executor = Executor::new(pseudo(), provisioner.clone());
    let mut state = DeploymentState::new();

    let err = executor.deploy(&topology(), &mut state).await.unwrap_err();
    assert!(matches!(err, ExecutionError::AssetFailed { .. }));
    assert_eq!(err.component(), Some("Data"));
    assert!(provisioner.provisioned_order().is_empty());
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_removed_resources_leave_state() {
    let executor = Executor::new(pseudo(), Arc::new(SimulatedProvisioner::new()));
    let mut state = DeploymentState::new();
    executor.deploy(&topology(), &mut state).await.unwrap();

    let mut builder = TopologyBuilder::new("smaller");
    builder
        .scope("Data", "Data")
        .add("Other", ResourceSpec::new("AWS::SNS::Topic", Props::new()))
        .unwrap();
    let report = executor
        .deploy(&builder.validate().unwrap(), &mut state)
        .await
        .unwrap();

    assert_eq!(report.removed.len(), 3);
    assert_eq!(state.resources.len(), 1);
    assert!(state.resource("DataOther").is_some());
    assert!(state.resource("DataDb").is_none());
    assert!(state.outputs.is_empty());
}
