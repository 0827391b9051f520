//! EdgeTier
//!
//! A private object store behind a content-delivery distribution. The tier
//! knows nothing about its consumers; they read the bucket name and the
//! distribution domain as opaque values.

use crate::error::StackError;
use crate::iam::{PolicyDocument, PolicyStatement};
use aic_graph::{GraphError, Props, PseudoParam, ResourceHandle, ResourceSpec, Scope, Token, TopologyBuilder};

/// Component name stamped on every edge tier resource
pub const COMPONENT: &str = "EdgeTier";
const PREFIX: &str = "Edge";

/// Managed `CachingOptimized` cache policy
const CACHING_OPTIMIZED_POLICY: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

/// The built edge tier
#[derive(Debug, Clone)]
pub struct Edge {
    bucket: ResourceHandle,
    distribution: ResourceHandle,
}

impl Edge {
    /// The private bucket
    pub fn bucket(&self) -> &ResourceHandle {
        &self.bucket
    }

    /// The content distribution in front of the bucket
    pub fn distribution(&self) -> &ResourceHandle {
        &self.distribution
    }

    /// Name of the bucket
    pub fn bucket_name(&self) -> Token {
        self.bucket.reference()
    }

    /// ARN of the bucket
    pub fn bucket_arn(&self) -> Token {
        self.bucket.attr("Arn")
    }

    /// ARN pattern matching every object in the bucket
    pub fn objects_arn(&self) -> Token {
        Token::join([self.bucket_arn(), Token::literal("/*")])
    }

    /// Domain name of the distribution
    pub fn distribution_domain(&self) -> Token {
        self.distribution.attr("DomainName")
    }
}

/// Builds the edge tier
pub struct EdgeTier;

impl EdgeTier {
    /// Add the bucket and the distribution that serves it
    ///
    /// # Errors
    /// Fails when a resource cannot be added to the builder
    pub fn build(builder: &mut TopologyBuilder) -> Result<Edge, StackError> {
        let mut scope = builder.scope(COMPONENT, PREFIX);
        let edge = Self::build_in(&mut scope).map_err(|e| StackError::from_graph(COMPONENT, e))?;
        tracing::info!(component = COMPONENT, "edge tier built");
        Ok(edge)
    }

    fn build_in(scope: &mut Scope<'_>) -> Result<Edge, GraphError> {
        let bucket = scope.add(
            "Bucket",
            ResourceSpec::new(
                "AWS::S3::Bucket",
                Props::new()
                    .with(
                        "BucketEncryption",
                        Props::new().with(
                            "ServerSideEncryptionConfiguration",
                            vec![Props::new().with(
                                "ServerSideEncryptionByDefault",
                                Props::new().with("SSEAlgorithm", "AES256"),
                            )],
                        ),
                    )
                    .with(
                        "PublicAccessBlockConfiguration",
                        Props::new()
                            .with("BlockPublicAcls", true)
                            .with("BlockPublicPolicy", true)
                            .with("IgnorePublicAcls", true)
                            .with("RestrictPublicBuckets", true),
                    )
                    .with(
                        "VersioningConfiguration",
                        Props::new().with("Status", "Enabled"),
                    ),
            )
            .retain(),
        )?;

        let access_control = scope.add(
            "OriginAccessControl",
            ResourceSpec::new(
                "AWS::CloudFront::OriginAccessControl",
                Props::new().with(
                    "OriginAccessControlConfig",
                    Props::new()
                        .with(
                            "Name",
                            Token::join([
                                Token::pseudo(PseudoParam::StackName),
                                Token::literal("-edge-oac"),
                            ]),
                        )
                        .with("OriginAccessControlOriginType", "s3")
                        .with("SigningBehavior", "always")
                        .with("SigningProtocol", "sigv4"),
                ),
            ),
        )?;

        let distribution = scope.add(
            "Distribution",
            ResourceSpec::new(
                "AWS::CloudFront::Distribution",
                Props::new().with(
                    "DistributionConfig",
                    Props::new()
                        .with("Enabled", true)
                        .with("HttpVersion", "http2")
                        .with(
                            "Origins",
                            vec![Props::new()
                                .with("Id", "s3-origin")
                                .with("DomainName", bucket.attr("RegionalDomainName"))
                                .with("OriginAccessControlId", access_control.attr("Id"))
                                .with(
                                    "S3OriginConfig",
                                    Props::new().with("OriginAccessIdentity", ""),
                                )],
                        )
                        .with(
                            "DefaultCacheBehavior",
                            Props::new()
                                .with("TargetOriginId", "s3-origin")
                                .with("ViewerProtocolPolicy", "redirect-to-https")
                                .with("CachePolicyId", CACHING_OPTIMIZED_POLICY)
                                .with("Compress", true),
                        ),
                ),
            ),
        )?;

        let bucket_arn = bucket.attr("Arn");
        let policy = PolicyDocument::new()
            .with(
                PolicyStatement::allow(["s3:GetObject"])
                    .for_service("cloudfront.amazonaws.com")
                    .on(Token::join([bucket_arn.clone(), Token::literal("/*")]))
                    .when(
                        "StringEquals",
                        "AWS:SourceArn",
                        Token::join([
                            Token::literal("arn:"),
                            Token::pseudo(PseudoParam::Partition),
                            Token::literal(":cloudfront::"),
                            Token::pseudo(PseudoParam::AccountId),
                            Token::literal(":distribution/"),
                            distribution.reference(),
                        ]),
                    ),
            )
            .with(
                PolicyStatement::deny(["s3:*"])
                    .for_anyone()
                    .on(bucket_arn.clone())
                    .on(Token::join([bucket_arn, Token::literal("/*")]))
                    .when("Bool", "aws:SecureTransport", "false"),
            );
        scope.add(
            "BucketPolicy",
            ResourceSpec::new(
                "AWS::S3::BucketPolicy",
                Props::new()
                    .with("Bucket", bucket.reference())
                    .with("PolicyDocument", policy),
            ),
        )?;

        Ok(Edge {
            bucket,
            distribution,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_tier_stands_alone() {
        let mut builder = TopologyBuilder::new("edge");
        let edge = EdgeTier::build(&mut builder).unwrap();
        assert_eq!(edge.bucket_name().references()[0].as_str(), "EdgeBucket");

        let topology = builder.validate().unwrap();
        assert!(topology
            .resources()
            .all(|node| node.component() == COMPONENT));
        assert!(topology.depends_on("EdgeBucketPolicy", "EdgeDistribution"));

        let template = topology.synth();
        let behavior = &template["Resources"]["EdgeDistribution"]["Properties"]
            ["DistributionConfig"]["DefaultCacheBehavior"];
        assert_eq!(behavior["ViewerProtocolPolicy"], "redirect-to-https");
    }
}
