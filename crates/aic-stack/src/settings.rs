//! Build-time parameters and deployment identity
//!
//! Everything the tiers would otherwise read from module-level constants is
//! passed in explicitly through [`StackSettings`], so the same build logic
//! can be reused across environments and tested in isolation.

use aic_graph::PseudoValues;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Named build-time parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSettings {
    /// Naming prefix for generated names
    pub short_name: String,
    /// Human readable description of the topology
    pub description: String,
    /// Port the application container listens on
    pub service_port: u16,
    /// HTTP health endpoint probed by the load balancer
    pub health_check_path: String,
    /// Seconds new tasks may fail health checks before counting as unhealthy
    pub health_check_grace_seconds: u32,
    /// Fixed number of running tasks
    pub desired_count: u32,
    /// Name of the application database
    pub database_name: String,
    /// Region of the model-inference service
    pub model_region: String,
    /// Directory holding the application image build context
    pub portal_directory: PathBuf,
    /// Address range of the network
    pub vpc_cidr: String,
    /// Number of availability zones spanned
    pub max_azs: u8,
    /// Retention of flow and application logs
    pub log_retention_days: u32,
    /// Base URL used when no public domain is configured
    pub local_fallback_url: String,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            short_name: "aichatbot".to_string(),
            description: "AI chatbot on AWS".to_string(),
            service_port: 8080,
            health_check_path: "/ping".to_string(),
            health_check_grace_seconds: 60,
            desired_count: 2,
            database_name: "aichatbot".to_string(),
            model_region: "us-west-2".to_string(),
            portal_directory: PathBuf::from("portal"),
            vpc_cidr: "10.0.0.0/16".to_string(),
            max_azs: 3,
            log_retention_days: 180,
            local_fallback_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Default stack name
pub const DEFAULT_STACK_NAME: &str = "ai-chatbot-on-aws";

/// Where a topology is deployed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIdentity {
    /// Name of the deployed stack
    pub stack_name: String,
    /// Target account id
    pub account: String,
    /// Target region
    pub region: String,
}

impl DeploymentIdentity {
    /// Identity of one deployment target
    pub fn new(
        stack_name: impl Into<String>,
        account: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            account: account.into(),
            region: region.into(),
        }
    }

    /// Short stable id: first 8 hex chars of SHA-256 over the identity
    ///
    /// Used wherever a name must be unique per deployment but identical
    /// across redeploys.
    pub fn short_id(&self) -> String {
        let digest = Sha256::digest(
            format!("{}/{}/{}", self.stack_name, self.account, self.region).as_bytes(),
        );
        let mut id = hex::encode(digest);
        id.truncate(8);
        id
    }

    /// Pseudo parameter values for this target
    pub fn pseudo_values(&self) -> PseudoValues {
        PseudoValues::new(&self.stack_name, &self.account, &self.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_is_stable_and_identity_bound() {
        let a = DeploymentIdentity::new(DEFAULT_STACK_NAME, "123456789012", "us-east-1");
        let b = DeploymentIdentity::new(DEFAULT_STACK_NAME, "123456789012", "us-east-1");
        let c = DeploymentIdentity::new(DEFAULT_STACK_NAME, "123456789012", "eu-west-1");
        assert_eq!(a.short_id(), b.short_id());
        assert_ne!(a.short_id(), c.short_id());
        assert_eq!(a.short_id().len(), 8);
        assert!(a.short_id().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn defaults_match_service_shape() {
        let settings = StackSettings::default();
        assert_eq!(settings.service_port, 8080);
        assert_eq!(settings.health_check_path, "/ping");
        assert_eq!(settings.desired_count, 2);
        assert_eq!(settings.max_azs, 3);
    }
}
