//! In-process provisioning backend
//!
//! Produces deterministic identifiers and attributes shaped like the ones a
//! real engine reports, generates secret strings, and can be told to fail
//! specific resources. Used by `deploy --simulate` and by tests.

use super::{ProvisionRequest, ProvisionedResource, ResourceProvisioner};
use crate::asset::ImageAsset;
use crate::error::ProvisionError;
use crate::secret::{PasswordPolicy, DEFAULT_PASSWORD_LENGTH};
use crate::types::LogicalId;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Default)]
struct Recorded {
    provisioned: Vec<LogicalId>,
    published: Vec<String>,
}

/// Deterministic fake backend
pub struct SimulatedProvisioner {
    account_id: String,
    region: String,
    failing_ids: HashSet<String>,
    failing_types: HashSet<String>,
    fail_assets: bool,
    rng: Mutex<StdRng>,
    recorded: Mutex<Recorded>,
}

impl Default for SimulatedProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedProvisioner {
    /// Simulator for account `123456789012` in `us-east-1`
    pub fn new() -> Self {
        Self {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            failing_ids: HashSet::new(),
            failing_types: HashSet::new(),
            fail_assets: false,
            rng: Mutex::new(StdRng::from_os_rng()),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Identifiers and ARNs use this account and region
    #[must_use]
    pub fn with_identity(mut self, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self.region = region.into();
        self
    }

    /// Make generated secrets reproducible
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Reject the resource with this logical id
    #[must_use]
    pub fn fail_resource(mut self, logical_id: &str) -> Self {
        self.failing_ids.insert(logical_id.to_string());
        self
    }

    /// Reject every resource of this type
    #[must_use]
    pub fn fail_resource_type(mut self, resource_type: &str) -> Self {
        self.failing_types.insert(resource_type.to_string());
        self
    }

    /// Fail every image build
    #[must_use]
    pub fn fail_assets(mut self) -> Self {
        self.fail_assets = true;
        self
    }

    /// Logical ids in the order they were provisioned (creates and updates)
    pub fn provisioned_order(&self) -> Vec<LogicalId> {
        self.recorded.lock().provisioned.clone()
    }

    /// Fingerprints of published assets
    pub fn published_assets(&self) -> Vec<String> {
        self.recorded.lock().published.clone()
    }

    fn hash(&self, id: &LogicalId, len: usize) -> String {
        let digest = Sha256::digest(format!("{}/{}/{}", self.account_id, self.region, id).as_bytes());
        let mut out = hex::encode(digest);
        out.truncate(len);
        out
    }

    fn arn(&self, service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{service}:{}:{}:{resource}",
            self.region, self.account_id
        )
    }

    fn random_string(&self, charset: &[u8], len: usize) -> String {
        let mut rng = self.rng.lock();
        (0..len)
            .map(|_| char::from(charset[rng.random_range(0..charset.len())]))
            .collect()
    }

    fn generate_secret_string(&self, properties: &Value) -> Result<String, ProvisionError> {
        if let Some(literal) = properties.get("SecretString").and_then(Value::as_str) {
            return Ok(literal.to_string());
        }
        let Some(generate) = properties.get("GenerateSecretString") else {
            return Ok(self.random_string(ALPHANUMERIC, DEFAULT_PASSWORD_LENGTH));
        };

        let policy = PasswordPolicy {
            length: generate
                .get("PasswordLength")
                .and_then(Value::as_u64)
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or(DEFAULT_PASSWORD_LENGTH),
            exclude_punctuation: generate
                .get("ExcludePunctuation")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            include_space: generate
                .get("IncludeSpace")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        let password = policy.generate(&mut *self.rng.lock());

        let template = generate.get("SecretStringTemplate").and_then(Value::as_str);
        let key = generate.get("GenerateStringKey").and_then(Value::as_str);
        match (template, key) {
            (Some(template), Some(key)) => {
                let mut parsed: Value = serde_json::from_str(template).map_err(|e| {
                    ProvisionError::Rejected(format!("SecretStringTemplate is not JSON: {e}"))
                })?;
                let object = parsed.as_object_mut().ok_or_else(|| {
                    ProvisionError::Rejected("SecretStringTemplate is not an object".into())
                })?;
                object.insert(key.to_string(), Value::String(password));
                Ok(parsed.to_string())
            }
            (None, None) => Ok(password),
            _ => Err(ProvisionError::Rejected(
                "SecretStringTemplate and GenerateStringKey must be set together".into(),
            )),
        }
    }

    fn simulate(&self, request: &ProvisionRequest) -> Result<ProvisionedResource, ProvisionError> {
        let id = &request.logical_id;
        let props = &request.properties;
        let prop = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);
        let short = self.hash(id, 17);
        let lower = id.as_str().to_ascii_lowercase();
        let mut attributes = BTreeMap::new();

        let physical_id = match request.resource_type.as_str() {
            "AWS::EC2::VPC" => {
                let vpc = format!("vpc-{short}");
                attributes.insert("VpcId".into(), vpc.clone());
                attributes.insert(
                    "CidrBlock".into(),
                    prop("CidrBlock").unwrap_or_else(|| "10.0.0.0/16".into()),
                );
                vpc
            }
            "AWS::EC2::Subnet" => {
                let subnet = format!("subnet-{short}");
                attributes.insert("SubnetId".into(), subnet.clone());
                if let Some(az) = prop("AvailabilityZone") {
                    attributes.insert("AvailabilityZone".into(), az);
                }
                subnet
            }
            "AWS::EC2::SecurityGroup" => {
                let group = format!("sg-{short}");
                attributes.insert("GroupId".into(), group.clone());
                group
            }
            "AWS::EC2::EIP" => {
                let octet = u8::from_str_radix(&short[..2], 16).unwrap_or(1);
                let ip = format!("203.0.113.{octet}");
                attributes.insert("AllocationId".into(), format!("eipalloc-{short}"));
                attributes.insert("PublicIp".into(), ip.clone());
                ip
            }
            "AWS::EC2::InternetGateway" => format!("igw-{short}"),
            "AWS::EC2::NatGateway" => format!("nat-{short}"),
            "AWS::EC2::RouteTable" => format!("rtb-{short}"),
            "AWS::EC2::FlowLog" => format!("fl-{short}"),
            "AWS::SecretsManager::Secret" => {
                let name = prop("Name").unwrap_or_else(|| format!("{lower}-{}", self.hash(id, 8)));
                let arn = self.arn("secretsmanager", &format!("secret:{name}-{}", &short[..6]));
                // existing secret strings are never rotated by an update
                let secret_string = match request
                    .previous
                    .as_ref()
                    .and_then(|p| p.attributes.get("SecretString"))
                {
                    Some(existing) => existing.clone(),
                    None => self.generate_secret_string(props)?,
                };
                attributes.insert("Id".into(), arn.clone());
                attributes.insert("Name".into(), name);
                attributes.insert("SecretString".into(), secret_string);
                arn
            }
            "AWS::RDS::DBInstance" => {
                attributes.insert(
                    "Endpoint.Address".into(),
                    format!("{lower}.{}.{}.rds.amazonaws.com", &short[..12], self.region),
                );
                let port = match props.get("Port") {
                    Some(Value::String(port)) => port.clone(),
                    Some(Value::Number(port)) => port.to_string(),
                    _ => "5432".to_string(),
                };
                attributes.insert("Endpoint.Port".into(), port);
                attributes.insert("DBInstanceArn".into(), self.arn("rds", &format!("db:{lower}")));
                lower.clone()
            }
            "AWS::ElastiCache::ReplicationGroup" => {
                let address = format!("master.{lower}.{}.cache.amazonaws.com", &short[..6]);
                let readers = format!("replica.{lower}.{}.cache.amazonaws.com", &short[..6]);
                attributes.insert("PrimaryEndPoint.Address".into(), address);
                attributes.insert("PrimaryEndPoint.Port".into(), "6379".into());
                attributes.insert("ReaderEndPoint.Address".into(), readers);
                attributes.insert("ReaderEndPoint.Port".into(), "6379".into());
                lower.clone()
            }
            "AWS::ElastiCache::SubnetGroup" => {
                prop("CacheSubnetGroupName").unwrap_or_else(|| lower.clone())
            }
            "AWS::Cognito::UserPool" => {
                let pool = match &request.previous {
                    Some(previous) => previous.physical_id.clone(),
                    None => format!("{}_{}", self.region, self.random_string(ALPHANUMERIC, 9)),
                };
                attributes.insert("Arn".into(), self.arn("cognito-idp", &format!("userpool/{pool}")));
                attributes.insert(
                    "ProviderURL".into(),
                    format!("cognito-idp.{}.amazonaws.com/{pool}", self.region),
                );
                attributes.insert("UserPoolId".into(), pool.clone());
                pool
            }
            "AWS::Cognito::UserPoolClient" => {
                let client = self.random_string(b"abcdefghijklmnopqrstuvwxyz0123456789", 26);
                let generate = props
                    .get("GenerateSecret")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if generate {
                    let secret = match request
                        .previous
                        .as_ref()
                        .and_then(|p| p.attributes.get("ClientSecret"))
                    {
                        Some(existing) => existing.clone(),
                        None => self.random_string(ALPHANUMERIC, 51),
                    };
                    attributes.insert("ClientSecret".into(), secret);
                }
                match &request.previous {
                    Some(previous) => previous.physical_id.clone(),
                    None => client,
                }
            }
            "AWS::Cognito::UserPoolDomain" => {
                let domain = prop("Domain").unwrap_or_else(|| lower.clone());
                attributes.insert(
                    "CloudFrontDistribution".into(),
                    format!("{}.cloudfront.net", &short[..14]),
                );
                domain
            }
            "AWS::S3::Bucket" => {
                let name = prop("BucketName").unwrap_or_else(|| format!("{lower}-{}", &short[..12]));
                attributes.insert("Arn".into(), format!("arn:aws:s3:::{name}"));
                attributes.insert("DomainName".into(), format!("{name}.s3.amazonaws.com"));
                attributes.insert(
                    "RegionalDomainName".into(),
                    format!("{name}.s3.{}.amazonaws.com", self.region),
                );
                name
            }
            "AWS::CloudFront::Distribution" => {
                let distribution = format!("E{}", short[..13].to_ascii_uppercase());
                attributes.insert("DomainName".into(), format!("d{}.cloudfront.net", &short[..13]));
                attributes.insert("Id".into(), distribution.clone());
                distribution
            }
            "AWS::CloudFront::OriginAccessControl" => {
                let oac = format!("E{}", short[..13].to_ascii_uppercase());
                attributes.insert("Id".into(), oac.clone());
                oac
            }
            "AWS::ElasticLoadBalancingV2::LoadBalancer" => {
                let name = prop("Name").unwrap_or_else(|| format!("{}-{}", &lower[..lower.len().min(20)], &short[..6]));
                let digits: String = short.bytes().take(10).map(|b| char::from(b'0' + b % 10)).collect();
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("loadbalancer/app/{name}/{}", &short[..16]),
                );
                attributes.insert(
                    "DNSName".into(),
                    format!("{name}-{digits}.{}.elb.amazonaws.com", self.region),
                );
                attributes.insert("LoadBalancerArn".into(), arn.clone());
                arn
            }
            "AWS::ElasticLoadBalancingV2::TargetGroup" => {
                let arn = self.arn(
                    "elasticloadbalancing",
                    &format!("targetgroup/{}/{}", &lower[..lower.len().min(24)], &short[..16]),
                );
                attributes.insert("TargetGroupArn".into(), arn.clone());
                arn
            }
            "AWS::ElasticLoadBalancingV2::Listener" => {
                let arn = self.arn("elasticloadbalancing", &format!("listener/app/{lower}/{short}"));
                attributes.insert("ListenerArn".into(), arn.clone());
                arn
            }
            "AWS::IAM::Role" => {
                let name = prop("RoleName").unwrap_or_else(|| format!("{}-{}", id, &short[..12]));
                attributes.insert("Arn".into(), format!("arn:aws:iam::{}:role/{name}", self.account_id));
                attributes.insert("RoleId".into(), format!("AROA{}", short.to_ascii_uppercase()));
                name
            }
            "AWS::Logs::LogGroup" => {
                let name = prop("LogGroupName").unwrap_or_else(|| format!("{}-{}", id, &short[..12]));
                attributes.insert("Arn".into(), self.arn("logs", &format!("log-group:{name}:*")));
                name
            }
            "AWS::ECS::Cluster" => {
                let name = prop("ClusterName").unwrap_or_else(|| format!("{}-{}", id, &short[..12]));
                attributes.insert("Arn".into(), self.arn("ecs", &format!("cluster/{name}")));
                name
            }
            "AWS::ECS::TaskDefinition" => {
                let family = prop("Family").unwrap_or_else(|| id.to_string());
                self.arn("ecs", &format!("task-definition/{family}:1"))
            }
            "AWS::ECS::Service" => {
                let name = prop("ServiceName").unwrap_or_else(|| format!("{}-{}", id, &short[..12]));
                let arn = self.arn("ecs", &format!("service/{name}"));
                attributes.insert("Name".into(), name);
                attributes.insert("ServiceArn".into(), arn.clone());
                arn
            }
            _ => format!("{}-{}", id, &short[..12]),
        };

        Ok(ProvisionedResource {
            physical_id,
            attributes,
        })
    }
}

#[async_trait::async_trait]
impl ResourceProvisioner for SimulatedProvisioner {
    async fn publish_asset(
        &self,
        fingerprint: &str,
        asset: &ImageAsset,
    ) -> Result<(), ProvisionError> {
        if self.fail_assets {
            return Err(ProvisionError::AssetBuildFailed(format!(
                "build of {} failed",
                asset.directory.display()
            )));
        }
        self.recorded.lock().published.push(fingerprint.to_string());
        Ok(())
    }

    async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<ProvisionedResource, ProvisionError> {
        if self.failing_ids.contains(request.logical_id.as_str())
            || self.failing_types.contains(&request.resource_type)
        {
            return Err(ProvisionError::Rejected(format!(
                "{} ({}) rejected by simulated engine",
                request.logical_id, request.resource_type
            )));
        }
        let provisioned = self.simulate(request)?;
        self.recorded.lock().provisioned.push(request.logical_id.clone());
        Ok(provisioned)
    }
}
