//! Published output contract
//!
//! The topology publishes exactly [`OUTPUT_KEYS`], in that order. The
//! [`OutputSet`] is assembled from the tiers' build results, so a key can
//! only be missing if the tier that produces it was never built.

use crate::cache::Cache;
use crate::compute::Compute;
use crate::data::Database;
use crate::edge::Edge;
use crate::error::StackError;
use crate::identity::IdentitySet;
use aic_graph::{Token, TopologyBuilder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Component name stamped on every output resource
pub const COMPONENT: &str = "OutputPublisher";

/// Name of the object bucket
pub const BUCKET_NAME: &str = "BucketName";
/// Domain name of the distribution
pub const CLOUDFRONT_DOMAIN_NAME: &str = "CloudFrontDomainName";
/// Name of the database credentials secret
pub const POSTGRES_SECRET_NAME: &str = "PostgresSecretName";
/// Connection URL of the cache
pub const REDIS_URL: &str = "RedisURL";
/// Public URL of the load balancer
pub const ALB_ENDPOINT: &str = "ALBEndpoint";
/// DNS name of the load balancer
pub const ALB_DNS_NAME: &str = "ALBDnsName";
/// OIDC issuer of the identity provider
pub const COGNITO_ISSUER: &str = "CognitoIssuer";
/// Application client id
pub const COGNITO_CLIENT_ID: &str = "CognitoClientId";
/// Application client secret
pub const COGNITO_CLIENT_SECRET: &str = "CognitoClientSecret";

/// The fixed output key set, in publication order
pub const OUTPUT_KEYS: [&str; 9] = [
    BUCKET_NAME,
    CLOUDFRONT_DOMAIN_NAME,
    POSTGRES_SECRET_NAME,
    REDIS_URL,
    ALB_ENDPOINT,
    ALB_DNS_NAME,
    COGNITO_ISSUER,
    COGNITO_CLIENT_ID,
    COGNITO_CLIENT_SECRET,
];

fn description(key: &str) -> &'static str {
    match key {
        BUCKET_NAME => "BucketName",
        CLOUDFRONT_DOMAIN_NAME => "CloudFront Domain Name",
        POSTGRES_SECRET_NAME => "Postgres Secret Name",
        REDIS_URL => "Redis URL",
        ALB_ENDPOINT => "Application Load Balancer Endpoint",
        ALB_DNS_NAME => "ALB DNS Name",
        COGNITO_ISSUER => "Cognito Issuer",
        COGNITO_CLIENT_ID => "Cognito Client Id",
        COGNITO_CLIENT_SECRET => "Cognito Client Secret",
        _ => "",
    }
}

/// Deferred values behind every output key
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSet {
    values: [Token; 9],
}

impl OutputSet {
    /// Gather every output value from the built tiers
    pub fn collect(
        edge: &Edge,
        database: &Database,
        cache: &Cache,
        compute: &Compute,
        identity: &IdentitySet,
    ) -> Self {
        Self {
            values: [
                edge.bucket_name(),
                edge.distribution_domain(),
                database.secret_name(),
                cache.connection_url(),
                compute.endpoint().url(),
                compute.endpoint().dns_name().clone(),
                identity.issuer(),
                identity.client_id(),
                identity.client_secret(),
            ],
        }
    }

    /// Deferred value of `key`
    pub fn get(&self, key: &str) -> Option<&Token> {
        OUTPUT_KEYS
            .iter()
            .position(|k| *k == key)
            .map(|i| &self.values[i])
    }

    /// Keys and values in publication order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Token)> {
        OUTPUT_KEYS.iter().copied().zip(self.values.iter())
    }
}

/// Registers the output set with the builder
pub struct OutputPublisher;

impl OutputPublisher {
    /// Register every output with the builder, in key order
    pub fn publish(builder: &mut TopologyBuilder, outputs: &OutputSet) -> Result<(), StackError> {
        for (key, value) in outputs.iter() {
            builder
                .add_output(key, description(key), value.clone())
                .map_err(|e| StackError::from_graph(COMPONENT, e))?;
        }
        tracing::info!(component = COMPONENT, outputs = OUTPUT_KEYS.len(), "outputs published");
        Ok(())
    }
}

/// Output values after a successful deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedOutputs(IndexMap<String, String>);

impl ResolvedOutputs {
    /// Check `resolved` against the fixed key set
    ///
    /// Keys with empty values count as missing. Values are reordered into
    /// publication order.
    pub fn from_resolved(resolved: &IndexMap<String, String>) -> Result<Self, StackError> {
        let missing: Vec<String> = OUTPUT_KEYS
            .iter()
            .filter(|key| resolved.get(**key).map_or(true, String::is_empty))
            .map(|key| (*key).to_string())
            .collect();
        let unexpected: Vec<String> = resolved
            .keys()
            .filter(|key| !OUTPUT_KEYS.contains(&key.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(StackError::IncompleteOutputs {
                missing,
                unexpected,
            });
        }

        let ordered = OUTPUT_KEYS
            .iter()
            .filter_map(|key| resolved.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect();
        Ok(Self(ordered))
    }

    /// Value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Keys and values in publication order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of outputs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no outputs
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name of the object bucket
    pub fn bucket_name(&self) -> &str {
        self.value(BUCKET_NAME)
    }

    /// Name of the database credentials secret
    pub fn postgres_secret_name(&self) -> &str {
        self.value(POSTGRES_SECRET_NAME)
    }

    /// Connection URL of the cache
    pub fn redis_url(&self) -> &str {
        self.value(REDIS_URL)
    }

    /// Public URL of the load balancer
    pub fn alb_endpoint(&self) -> &str {
        self.value(ALB_ENDPOINT)
    }

    /// DNS name of the load balancer
    pub fn alb_dns_name(&self) -> &str {
        self.value(ALB_DNS_NAME)
    }

    /// OIDC issuer
    pub fn cognito_issuer(&self) -> &str {
        self.value(COGNITO_ISSUER)
    }

    /// Application client id
    pub fn cognito_client_id(&self) -> &str {
        self.value(COGNITO_CLIENT_ID)
    }

    /// Application client secret
    pub fn cognito_client_secret(&self) -> &str {
        self.value(COGNITO_CLIENT_SECRET)
    }

    /// Render as a JSON object
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.0)
    }

    // every key is present once constructed
    fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> IndexMap<String, String> {
        OUTPUT_KEYS
            .iter()
            .rev()
            .map(|k| ((*k).to_string(), format!("value-of-{k}")))
            .collect()
    }

    #[test]
    fn accepts_exact_key_set_in_publication_order() {
        let outputs = ResolvedOutputs::from_resolved(&complete()).unwrap();
        assert_eq!(outputs.len(), 9);
        let keys: Vec<&str> = outputs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, OUTPUT_KEYS.to_vec());
        assert_eq!(outputs.redis_url(), "value-of-RedisURL");
    }

    #[test]
    fn rejects_missing_empty_and_extra_keys() {
        let mut resolved = complete();
        resolved.shift_remove(REDIS_URL);
        resolved.insert(COGNITO_ISSUER.to_string(), String::new());
        resolved.insert("Extra".to_string(), "x".to_string());
        match ResolvedOutputs::from_resolved(&resolved) {
            Err(StackError::IncompleteOutputs {
                missing,
                unexpected,
            }) => {
                assert_eq!(missing, vec![REDIS_URL, COGNITO_ISSUER]);
                assert_eq!(unexpected, vec!["Extra"]);
            }
            other => panic!("expected incomplete outputs, got {other:?}"),
        }
    }
}
