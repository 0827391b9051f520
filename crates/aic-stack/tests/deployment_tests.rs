use aic_graph::{DeploymentState, ExecutionError, SimulatedProvisioner};
use aic_stack::outputs::OUTPUT_KEYS;
use aic_stack::StackError;
use aic_test_utils::{
    compose, deploy_fresh, deploy_with, plain_config, simulated_provisioner, tls_config,
    TEST_ACCOUNT, TEST_REGION,
};
use pretty_assertions::assert_eq;
use regex::Regex;
use std::sync::Arc;

#[tokio::test]
async fn test_plaintext_end_to_end() {
    let (deployed, _) = deploy_fresh(&plain_config()).await;
    let outputs = &deployed.outputs;

    assert_eq!(outputs.len(), OUTPUT_KEYS.len());
    assert!(outputs.iter().all(|(_, value)| !value.is_empty()));
    assert!(outputs.alb_endpoint().starts_with("http://"));
    assert_eq!(
        outputs.alb_endpoint(),
        format!("http://{}", outputs.alb_dns_name())
    );

    let issuer = Regex::new(r"^https://cognito-idp\.us-east-1\.amazonaws\.com/us-east-1_[A-Za-z0-9]+$").unwrap();
    assert!(issuer.is_match(outputs.cognito_issuer()), "{}", outputs.cognito_issuer());
    let redis = Regex::new(r"^redis://[a-z0-9.-]+:\d+$").unwrap();
    assert!(redis.is_match(outputs.redis_url()), "{}", outputs.redis_url());
    assert!(outputs.postgres_secret_name().ends_with("/postgres-credentials"));
}

#[tokio::test]
async fn test_tls_end_to_end() {
    let stack = compose(&tls_config());
    let mut state = DeploymentState::new();
    let deployed = deploy_with(&stack, simulated_provisioner(), &mut state)
        .await
        .unwrap();

    assert!(deployed.outputs.alb_endpoint().starts_with("https://"));
    assert_eq!(stack.endpoint().port(), 443);
    let listener = state.resource("ComputeListener").unwrap();
    assert!(listener.provisioned.physical_id.contains("listener/"));
}

#[tokio::test]
async fn test_redeploy_keeps_secrets_and_identity() {
    let stack = compose(&plain_config());
    let provisioner = simulated_provisioner();
    let mut state = DeploymentState::new();

    let first = deploy_with(&stack, provisioner.clone(), &mut state).await.unwrap();
    let secret_before = state
        .resource("DataCredentialsSecret")
        .unwrap()
        .provisioned
        .attributes["SecretString"]
        .clone();

    let second = deploy_with(&compose(&plain_config()), provisioner, &mut state)
        .await
        .unwrap();
    assert!(second.report.is_noop());

    let secret_after = &state
        .resource("DataCredentialsSecret")
        .unwrap()
        .provisioned
        .attributes["SecretString"];
    assert_eq!(&secret_before, secret_after);
    assert_eq!(first.outputs.cognito_issuer(), second.outputs.cognito_issuer());
    assert_eq!(first.outputs.cognito_client_id(), second.outputs.cognito_client_id());
    assert_eq!(first.outputs, second.outputs);
}

#[tokio::test]
async fn test_switching_to_tls_keeps_data_secret() {
    let provisioner = simulated_provisioner();
    let mut state = DeploymentState::new();
    let first = deploy_with(&compose(&plain_config()), provisioner.clone(), &mut state)
        .await
        .unwrap();
    let second = deploy_with(&compose(&tls_config()), provisioner, &mut state)
        .await
        .unwrap();

    let updated: Vec<&str> = second.report.updated.iter().map(|id| id.as_str()).collect();
    assert!(updated.contains(&"ComputeListener"));
    assert!(!updated.contains(&"DataCredentialsSecret"));
    assert_eq!(
        first.outputs.postgres_secret_name(),
        second.outputs.postgres_secret_name()
    );
    assert!(second.outputs.alb_endpoint().starts_with("https://"));
}

#[tokio::test]
async fn test_rejected_resource_names_its_tier() {
    let stack = compose(&plain_config());
    let provisioner = Arc::new(
        SimulatedProvisioner::new()
            .with_identity(TEST_ACCOUNT, TEST_REGION)
            .fail_resource_type("AWS::ElastiCache::ReplicationGroup"),
    );
    let mut state = DeploymentState::new();
    let err = stack.deploy(provisioner, &mut state).await.unwrap_err();

    match &err {
        StackError::ProvisioningFailure { component, source } => {
            assert_eq!(component, "CacheTier");
            assert!(matches!(source, ExecutionError::ProvisionFailed { .. }));
        }
        other => panic!("expected provisioning failure, got {other:?}"),
    }
    assert!(state.is_empty());
}

#[tokio::test]
async fn test_identity_failure_after_directory_is_partial_state() {
    let stack = compose(&plain_config());
    let provisioner = Arc::new(
        SimulatedProvisioner::new()
            .with_identity(TEST_ACCOUNT, TEST_REGION)
            .fail_resource("IdentityAdminGroupAttachment"),
    );
    let mut state = DeploymentState::new();
    let err = stack.deploy(provisioner.clone(), &mut state).await.unwrap_err();

    assert!(
        matches!(&err, StackError::PartialIdentityState { step, .. } if step == "IdentityAdminGroupAttachment")
    );
    // nothing of the compute tier ran against the incomplete directory
    assert!(provisioner
        .provisioned_order()
        .iter()
        .all(|id| !id.as_str().starts_with("ComputeTaskDefinition")
            && !id.as_str().starts_with("ComputeService")));
}

#[tokio::test]
async fn test_directory_failure_is_provisioning_failure() {
    let stack = compose(&plain_config());
    let provisioner = Arc::new(
        SimulatedProvisioner::new()
            .with_identity(TEST_ACCOUNT, TEST_REGION)
            .fail_resource("IdentityUserPool"),
    );
    let mut state = DeploymentState::new();
    let err = stack.deploy(provisioner, &mut state).await.unwrap_err();
    assert_eq!(err.component(), Some("IdentityProvider"));
    assert!(matches!(err, StackError::ProvisioningFailure { .. }));
}

#[tokio::test]
async fn test_image_failure_aborts_before_provisioning() {
    let stack = compose(&plain_config());
    let provisioner = Arc::new(
        SimulatedProvisioner::new()
            .with_identity(TEST_ACCOUNT, TEST_REGION)
            .fail_assets(),
    );
    let mut state = DeploymentState::new();
    let err = stack.deploy(provisioner.clone(), &mut state).await.unwrap_err();
    assert_eq!(err.component(), Some("ComputeTier"));
    assert!(provisioner.provisioned_order().is_empty());
}
