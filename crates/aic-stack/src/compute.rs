//! ComputeTier
//!
//! A Fargate service behind an internet-facing application load balancer.
//!
//! The listener is chosen once, from configuration, as a [`ListenerMode`];
//! port, protocol and the published endpoint scheme all read that value.
//! Every derived value the application needs is injected through a
//! [`RuntimeEnvironment`] assembled from the other tiers' build results, so
//! none of them can be missing when the task definition is written.

use crate::cache::Cache;
use crate::config::ValidatedConfig;
use crate::data::Database;
use crate::edge::Edge;
use crate::error::StackError;
use crate::iam::{PolicyDocument, PolicyStatement};
use crate::identity::IdentitySet;
use crate::network::NetworkHandle;
use crate::security::{PortRange, SecurityBoundary};
use crate::settings::{DeploymentIdentity, StackSettings};
use aic_graph::{
    AssetHandle, GraphError, ImageAsset, Props, PropValue, PseudoParam, ResourceHandle,
    ResourceSpec, Scope, Token, TopologyBuilder,
};
use std::fmt;

/// Component name stamped on every compute tier resource
pub const COMPONENT: &str = "ComputeTier";
const PREFIX: &str = "Compute";

const CONTAINER_NAME: &str = "portal";
const TASK_CPU: &str = "1024";
const TASK_MEMORY_MIB: &str = "2048";
const AUTH_SECRET_LENGTH: u32 = 44;
const EXECUTION_MANAGED_POLICY: &str = "iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy";

/// Application protocol of the public listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerProtocol {
    /// Plain HTTP on port 80
    Http,
    /// HTTPS on port 443
    Https,
}

impl ListenerProtocol {
    /// Protocol name as the load balancer spells it
    pub fn as_str(self) -> &'static str {
        match self {
            ListenerProtocol::Http => "HTTP",
            ListenerProtocol::Https => "HTTPS",
        }
    }

    /// URL scheme clients use to reach the listener
    pub fn scheme(self) -> &'static str {
        match self {
            ListenerProtocol::Http => "http",
            ListenerProtocol::Https => "https",
        }
    }
}

impl fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext or TLS, decided once from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerMode {
    /// No certificate configured
    Plaintext,
    /// TLS terminated with the configured certificate
    Tls { certificate_arn: String },
}

impl ListenerMode {
    /// TLS exactly when a certificate is configured
    pub fn from_config(config: &ValidatedConfig) -> Self {
        match config.certificate_arn() {
            Some(arn) => ListenerMode::Tls {
                certificate_arn: arn.to_string(),
            },
            None => ListenerMode::Plaintext,
        }
    }

    /// Listener port
    pub fn port(&self) -> u16 {
        match self {
            ListenerMode::Plaintext => 80,
            ListenerMode::Tls { .. } => 443,
        }
    }

    /// Listener protocol
    pub fn protocol(&self) -> ListenerProtocol {
        match self {
            ListenerMode::Plaintext => ListenerProtocol::Http,
            ListenerMode::Tls { .. } => ListenerProtocol::Https,
        }
    }
}

/// The load balancer as seen from outside
#[derive(Debug, Clone, PartialEq)]
pub struct PublicEndpoint {
    mode: ListenerMode,
    dns_name: Token,
}

impl PublicEndpoint {
    /// Listener mode
    pub fn mode(&self) -> &ListenerMode {
        &self.mode
    }

    /// Listener protocol
    pub fn protocol(&self) -> ListenerProtocol {
        self.mode.protocol()
    }

    /// Listener port
    pub fn port(&self) -> u16 {
        self.mode.port()
    }

    /// DNS name assigned to the load balancer
    pub fn dns_name(&self) -> &Token {
        &self.dns_name
    }

    /// `<scheme>://<dns name>`
    pub fn url(&self) -> Token {
        Token::join([
            Token::literal(format!("{}://", self.protocol().scheme())),
            self.dns_name.clone(),
        ])
    }
}

/// Ordered container environment, names stable across redeploys
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeEnvironment {
    vars: Vec<(String, Token)>,
}

impl RuntimeEnvironment {
    /// Every variable the portal container reads
    pub fn assemble(settings: &StackSettings, inputs: &ComputeInputs<'_>) -> Self {
        let mut env = Self::default();
        env.set("NODE_ENV", "production");
        env.set("PORT", settings.service_port.to_string());
        env.set("NEXTAUTH_URL", format!("{}/api/auth", inputs.base_url));
        env.set("POSTGRES_SECRET_NAME", inputs.database.secret_name());
        env.set("DB_HOST", inputs.database.endpoint_address());
        env.set("DB_PORT", inputs.database.endpoint_port());
        env.set("DB_NAME", inputs.database.database_name());
        env.set("POSTGRES_URL", inputs.database.connection_url());
        env.set("REDIS_URL", inputs.cache.connection_url());
        env.set("AUTH_COGNITO_ID", inputs.identity.client_id());
        env.set("AUTH_COGNITO_SECRET", inputs.identity.client_secret());
        env.set("AUTH_COGNITO_ISSUER", inputs.identity.issuer());
        env.set("AWS_REGION", Token::pseudo(PseudoParam::Region));
        env.set("BEDROCK_REGION", settings.model_region.as_str());
        env.set("BUCKET_NAME", inputs.edge.bucket_name());
        env.set(
            "CLOUDFRONT_DISTRIBUTION_DOMAIN_NAME",
            inputs.edge.distribution_domain(),
        );
        env
    }

    /// Set or replace a variable
    pub fn set(&mut self, name: &str, value: impl Into<Token>) {
        let value = value.into();
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name.to_string(), value)),
        }
    }

    /// Value of `name`
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Variable names in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.iter().map(|(n, _)| n.as_str())
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True when no variable is set
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn to_props(&self) -> Vec<PropValue> {
        self.vars
            .iter()
            .map(|(name, value)| {
                PropValue::from(Props::new().with("Name", name.as_str()).with("Value", value))
            })
            .collect()
    }
}

/// Build results of the tiers the compute tier consumes
#[derive(Debug, Clone, Copy)]
pub struct ComputeInputs<'a> {
    /// Network the tasks and load balancer run in
    pub network: &'a NetworkHandle,
    /// Database the application connects to
    pub database: &'a Database,
    /// Cache the application connects to
    pub cache: &'a Cache,
    /// Identity provider issuing sign-in tokens
    pub identity: &'a IdentitySet,
    /// Object storage and distribution
    pub edge: &'a Edge,
    /// Public listener mode
    pub listener: &'a ListenerMode,
    /// Public callback base URL, without a trailing slash
    pub base_url: &'a str,
}

/// The built compute tier
#[derive(Debug, Clone)]
pub struct Compute {
    endpoint: PublicEndpoint,
    environment: RuntimeEnvironment,
    image: AssetHandle,
    auth_secret: ResourceHandle,
    load_balancer: ResourceHandle,
    listener: ResourceHandle,
    task_role: ResourceHandle,
    service: ResourceHandle,
}

impl Compute {
    /// Public endpoint of the load balancer
    pub fn endpoint(&self) -> &PublicEndpoint {
        &self.endpoint
    }

    /// Container environment
    pub fn environment(&self) -> &RuntimeEnvironment {
        &self.environment
    }

    /// Application image asset
    pub fn image(&self) -> &AssetHandle {
        &self.image
    }

    /// Generated session signing secret
    pub fn auth_secret(&self) -> &ResourceHandle {
        &self.auth_secret
    }

    /// The application load balancer
    pub fn load_balancer(&self) -> &ResourceHandle {
        &self.load_balancer
    }

    /// The public listener
    pub fn listener(&self) -> &ResourceHandle {
        &self.listener
    }

    /// Role the application tasks run as
    pub fn task_role(&self) -> &ResourceHandle {
        &self.task_role
    }

    /// The container service
    pub fn service(&self) -> &ResourceHandle {
        &self.service
    }
}

/// Builds the compute tier
pub struct ComputeTier;

impl ComputeTier {
    /// Add the load balancer, container service and their roles
    ///
    /// # Errors
    /// Fails when a resource cannot be added to the builder
    pub fn build(
        builder: &mut TopologyBuilder,
        settings: &StackSettings,
        deployment: &DeploymentIdentity,
        inputs: &ComputeInputs<'_>,
    ) -> Result<Compute, StackError> {
        let mut scope = builder.scope(COMPONENT, PREFIX);
        let compute = Self::build_in(&mut scope, settings, deployment, inputs)
            .map_err(|e| StackError::from_graph(COMPONENT, e))?;
        tracing::info!(
            component = COMPONENT,
            protocol = %compute.endpoint.protocol(),
            port = compute.endpoint.port(),
            variables = compute.environment.len(),
            "compute tier built"
        );
        Ok(compute)
    }

    fn build_in(
        scope: &mut Scope<'_>,
        settings: &StackSettings,
        deployment: &DeploymentIdentity,
        inputs: &ComputeInputs<'_>,
    ) -> Result<Compute, GraphError> {
        let short_id = deployment.short_id();
        let network = inputs.network;
        let mode = inputs.listener;

        let auth_secret = scope.add(
            "AuthSecret",
            ResourceSpec::new(
                "AWS::SecretsManager::Secret",
                Props::new()
                    .with("Name", format!("{}-{short_id}/auth-secret", settings.short_name))
                    .with("Description", "Session signing secret of the portal")
                    .with(
                        "GenerateSecretString",
                        Props::new()
                            .with("PasswordLength", AUTH_SECRET_LENGTH)
                            .with("ExcludePunctuation", true)
                            .with("IncludeSpace", false),
                    ),
            ),
        )?;

        let image = scope.add_asset(
            ImageAsset::new(&settings.portal_directory)
                .with_dockerfile("Dockerfile")
                .with_platform("linux/amd64")
                .with_build_arg("NODE_ENV", "production")
                .with_exclude(["node_modules", ".next", "*.md", ".git", ".gitignore"]),
        )?;

        let log_group = scope.add(
            "LogGroup",
            ResourceSpec::new(
                "AWS::Logs::LogGroup",
                Props::new()
                    .with("LogGroupName", format!("ai-chatbot-fargate-{short_id}"))
                    .with("RetentionInDays", settings.log_retention_days),
            )
            .retain(),
        )?;

        let mut alb_boundary = SecurityBoundary::create(
            scope,
            "LoadBalancerSecurityGroup",
            "Public access to the load balancer",
            &network.vpc_id(),
        )?;
        alb_boundary.allow_from_anywhere(
            scope,
            PortRange::Tcp(mode.port()),
            &format!("Allow {} from anywhere", mode.protocol()),
        )?;
        let mut service_boundary = SecurityBoundary::create(
            scope,
            "ServiceSecurityGroup",
            "Portal tasks",
            &network.vpc_id(),
        )?;
        service_boundary.allow_from(
            scope,
            &alb_boundary,
            PortRange::Tcp(settings.service_port),
            "Allow traffic from the load balancer",
        )?;

        let load_balancer = scope.add(
            "LoadBalancer",
            ResourceSpec::new(
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
                Props::new()
                    .with("Type", "application")
                    .with("Scheme", "internet-facing")
                    .with("Subnets", network.public_subnet_ids())
                    .with("SecurityGroups", vec![alb_boundary.group_id()])
                    .with(
                        "LoadBalancerAttributes",
                        vec![Props::new()
                            .with("Key", "routing.http.drop_invalid_header_fields.enabled")
                            .with("Value", "true")],
                    ),
            ),
        )?;
        for route in network.public_routes() {
            scope.depends_on(&load_balancer, route)?;
        }

        let target_group = scope.add(
            "TargetGroup",
            ResourceSpec::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                Props::new()
                    .with("TargetType", "ip")
                    .with("Port", settings.service_port)
                    .with("Protocol", ListenerProtocol::Http.as_str())
                    .with("VpcId", network.vpc_id())
                    .with("HealthCheckPath", settings.health_check_path.as_str())
                    .with("HealthCheckProtocol", ListenerProtocol::Http.as_str()),
            ),
        )?;

        let mut listener_props = Props::new()
            .with("LoadBalancerArn", load_balancer.reference())
            .with("Port", mode.port())
            .with("Protocol", mode.protocol().as_str())
            .with(
                "DefaultActions",
                vec![Props::new()
                    .with("Type", "forward")
                    .with("TargetGroupArn", target_group.reference())],
            );
        if let ListenerMode::Tls { certificate_arn } = mode {
            listener_props.insert(
                "Certificates",
                vec![Props::new().with("CertificateArn", certificate_arn.as_str())],
            );
        }
        let listener = scope.add(
            "Listener",
            ResourceSpec::new("AWS::ElasticLoadBalancingV2::Listener", listener_props),
        )?;

        let cluster = scope.add(
            "Cluster",
            ResourceSpec::new(
                "AWS::ECS::Cluster",
                Props::new().with(
                    "ClusterSettings",
                    vec![Props::new()
                        .with("Name", "containerInsights")
                        .with("Value", "enabled")],
                ),
            ),
        )?;

        let execution_role = scope.add(
            "ExecutionRole",
            ResourceSpec::new(
                "AWS::IAM::Role",
                Props::new()
                    .with(
                        "AssumeRolePolicyDocument",
                        PolicyDocument::assumable_by("ecs-tasks.amazonaws.com"),
                    )
                    .with(
                        "ManagedPolicyArns",
                        vec![Token::join([
                            Token::literal("arn:"),
                            Token::pseudo(PseudoParam::Partition),
                            Token::literal(format!(":{EXECUTION_MANAGED_POLICY}")),
                        ])],
                    ),
            ),
        )?;
        let execution_policy = scope.add(
            "ExecutionRolePolicy",
            ResourceSpec::new(
                "AWS::IAM::Policy",
                Props::new()
                    .with("PolicyName", "ExecutionRolePolicy")
                    .with("Roles", vec![execution_role.reference()])
                    .with(
                        "PolicyDocument",
                        PolicyDocument::new()
                            .with(
                                PolicyStatement::allow([
                                    "secretsmanager:GetSecretValue",
                                    "secretsmanager:DescribeSecret",
                                ])
                                .on(auth_secret.reference()),
                            )
                            .with(
                                PolicyStatement::allow(["logs:CreateLogStream", "logs:PutLogEvents"])
                                    .on(log_group.attr("Arn")),
                            ),
                    ),
            ),
        )?;

        let task_role = scope.add(
            "TaskRole",
            ResourceSpec::new(
                "AWS::IAM::Role",
                Props::new()
                    .with(
                        "AssumeRolePolicyDocument",
                        PolicyDocument::assumable_by("ecs-tasks.amazonaws.com"),
                    )
                    .with("Description", "IAM role for ECS tasks to access AWS services"),
            ),
        )?;
        // a separate policy resource lets the role name its own ARN
        let task_policy = scope.add(
            "TaskRolePolicy",
            ResourceSpec::new(
                "AWS::IAM::Policy",
                Props::new()
                    .with("PolicyName", "TaskRolePolicy")
                    .with("Roles", vec![task_role.reference()])
                    .with("PolicyDocument", task_policy_document(inputs, &task_role)),
            ),
        )?;

        let environment = RuntimeEnvironment::assemble(settings, inputs);
        let container = Props::new()
            .with("Name", CONTAINER_NAME)
            .with("Image", image.image_uri())
            .with("Essential", true)
            .with(
                "PortMappings",
                vec![Props::new()
                    .with("ContainerPort", settings.service_port)
                    .with("Protocol", "tcp")],
            )
            .with("Environment", environment.to_props())
            .with(
                "Secrets",
                vec![Props::new()
                    .with("Name", "AUTH_SECRET")
                    .with("ValueFrom", auth_secret.reference())],
            )
            .with(
                "LogConfiguration",
                Props::new().with("LogDriver", "awslogs").with(
                    "Options",
                    Props::new()
                        .with("awslogs-group", log_group.reference())
                        .with("awslogs-region", Token::pseudo(PseudoParam::Region))
                        .with("awslogs-stream-prefix", CONTAINER_NAME),
                ),
            );

        let task_definition = scope.add(
            "TaskDefinition",
            ResourceSpec::new(
                "AWS::ECS::TaskDefinition",
                Props::new()
                    .with("Family", format!("{}-{CONTAINER_NAME}", settings.short_name))
                    .with("Cpu", TASK_CPU)
                    .with("Memory", TASK_MEMORY_MIB)
                    .with("NetworkMode", "awsvpc")
                    .with("RequiresCompatibilities", vec!["FARGATE"])
                    .with(
                        "RuntimePlatform",
                        Props::new()
                            .with("CpuArchitecture", "X86_64")
                            .with("OperatingSystemFamily", "LINUX"),
                    )
                    .with("ExecutionRoleArn", execution_role.attr("Arn"))
                    .with("TaskRoleArn", task_role.attr("Arn"))
                    .with("ContainerDefinitions", vec![container]),
            ),
        )?;

        // never start tasks against a half-built identity provider
        for gate in inputs.identity.completion() {
            scope.depends_on(&task_definition, gate)?;
        }

        let service = scope.add(
            "Service",
            ResourceSpec::new(
                "AWS::ECS::Service",
                Props::new()
                    .with("Cluster", cluster.reference())
                    .with("TaskDefinition", task_definition.reference())
                    .with("LaunchType", "FARGATE")
                    .with("DesiredCount", settings.desired_count)
                    .with("HealthCheckGracePeriodSeconds", settings.health_check_grace_seconds)
                    .with(
                        "DeploymentConfiguration",
                        Props::new()
                            .with(
                                "DeploymentCircuitBreaker",
                                Props::new().with("Enable", true).with("Rollback", true),
                            )
                            .with("MaximumPercent", 200)
                            .with("MinimumHealthyPercent", 50),
                    )
                    .with(
                        "NetworkConfiguration",
                        Props::new().with(
                            "AwsvpcConfiguration",
                            Props::new()
                                .with("AssignPublicIp", "DISABLED")
                                .with("Subnets", network.private_subnet_ids())
                                .with("SecurityGroups", vec![service_boundary.group_id()]),
                        ),
                    )
                    .with(
                        "LoadBalancers",
                        vec![Props::new()
                            .with("ContainerName", CONTAINER_NAME)
                            .with("ContainerPort", settings.service_port)
                            .with("TargetGroupArn", target_group.reference())],
                    ),
            ),
        )?;
        // tasks register only once the listener routes to the target group
        scope.depends_on(&service, &listener)?;
        scope.depends_on(&service, &task_policy)?;
        scope.depends_on(&service, &execution_policy)?;

        Ok(Compute {
            endpoint: PublicEndpoint {
                mode: mode.clone(),
                dns_name: load_balancer.attr("DNSName"),
            },
            environment,
            image,
            auth_secret,
            load_balancer,
            listener,
            task_role,
            service,
        })
    }
}

fn task_policy_document(inputs: &ComputeInputs<'_>, task_role: &ResourceHandle) -> PolicyDocument {
    PolicyDocument::new()
        .with(
            PolicyStatement::allow(["s3:GetObject", "s3:PutObject", "s3:ListBucket"])
                .on(inputs.edge.objects_arn())
                .on(inputs.edge.bucket_arn()),
        )
        .with(
            PolicyStatement::allow([
                "bedrock:InvokeAgent",
                "bedrock:InvokeModel",
                "bedrock:InvokeModelWithResponseStream",
            ])
            .on("*"),
        )
        .with(PolicyStatement::allow(["secretsmanager:GetSecretValue"]).on(inputs.database.secret_arn()))
        .with(PolicyStatement::allow(["iam:PassRole"]).on(task_role.attr("Arn")))
}
