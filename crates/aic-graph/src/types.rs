//! Identifiers, resource definitions and pseudo parameters

use crate::error::GraphError;
use crate::props::Props;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Maximum length of a logical id accepted by the provisioning engine
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Template-unique identifier of a resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Create a logical id, rejecting anything that is not ASCII alphanumeric
    pub fn new(id: impl Into<String>) -> Result<Self, GraphError> {
        let id = id.into();
        if id.is_empty()
            || id.len() > MAX_LOGICAL_ID_LEN
            || !id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(GraphError::InvalidLogicalId(id));
        }
        Ok(Self(id))
    }

    /// The id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Hash, Eq and Ord are derived from the inner string, so keyed lookups by `&str` agree
impl Borrow<str> for LogicalId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// What the provisioning engine does with a resource when it leaves the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the resource
    Delete,
    /// Keep the resource
    Retain,
    /// Keep the resource unless it is removed while still being created
    RetainExceptOnCreate,
}

impl DeletionPolicy {
    /// Template spelling of the policy
    pub fn as_str(self) -> &'static str {
        match self {
            DeletionPolicy::Delete => "Delete",
            DeletionPolicy::Retain => "Retain",
            DeletionPolicy::RetainExceptOnCreate => "RetainExceptOnCreate",
        }
    }
}

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Inferred from a token embedded in the dependent's properties
    Reference,
    /// Declared with [`crate::Scope::depends_on`]; rendered as `DependsOn`
    Explicit,
}

/// Values known only to the provisioning engine at deploy time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PseudoParam {
    /// Deployment region
    Region,
    /// Deployment account
    AccountId,
    /// Partition, e.g. `aws`
    Partition,
    /// Name of the deployed stack
    StackName,
    /// Domain suffix of service endpoints
    UrlSuffix,
}

impl PseudoParam {
    /// Name of the pseudo parameter in templates
    pub fn cfn_name(self) -> &'static str {
        match self {
            PseudoParam::Region => "AWS::Region",
            PseudoParam::AccountId => "AWS::AccountId",
            PseudoParam::Partition => "AWS::Partition",
            PseudoParam::StackName => "AWS::StackName",
            PseudoParam::UrlSuffix => "AWS::URLSuffix",
        }
    }
}

/// Concrete pseudo parameter values for one deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoValues {
    /// Deployment region
    pub region: String,
    /// Deployment account
    pub account_id: String,
    /// Partition, e.g. `aws`
    pub partition: String,
    /// Name of the deployed stack
    pub stack_name: String,
    /// Domain suffix of service endpoints
    pub url_suffix: String,
}

impl PseudoValues {
    /// Values for the commercial partition
    pub fn new(
        stack_name: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            partition: "aws".to_string(),
            stack_name: stack_name.into(),
            url_suffix: "amazonaws.com".to_string(),
        }
    }

    /// Value of `param`
    pub fn get(&self, param: PseudoParam) -> &str {
        match param {
            PseudoParam::Region => &self.region,
            PseudoParam::AccountId => &self.account_id,
            PseudoParam::Partition => &self.partition,
            PseudoParam::StackName => &self.stack_name,
            PseudoParam::UrlSuffix => &self.url_suffix,
        }
    }
}

/// Declarative description of a single resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    resource_type: String,
    properties: Props,
    deletion_policy: Option<DeletionPolicy>,
    update_replace_policy: Option<DeletionPolicy>,
}

impl ResourceSpec {
    /// Resource of `resource_type` with `properties`
    pub fn new(resource_type: impl Into<String>, properties: Props) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    /// Keep the resource when it is removed or replaced
    #[must_use]
    pub fn retain(mut self) -> Self {
        self.deletion_policy = Some(DeletionPolicy::Retain);
        self.update_replace_policy = Some(DeletionPolicy::Retain);
        self
    }

    /// Set the deletion policy
    #[must_use]
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    /// Set the update-replace policy
    #[must_use]
    pub fn with_update_replace_policy(mut self, policy: DeletionPolicy) -> Self {
        self.update_replace_policy = Some(policy);
        self
    }

    /// Provider resource type
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Resource properties
    pub fn properties(&self) -> &Props {
        &self.properties
    }

    /// Deletion policy, if set
    pub fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.deletion_policy
    }

    /// Update-replace policy, if set
    pub fn update_replace_policy(&self) -> Option<DeletionPolicy> {
        self.update_replace_policy
    }
}
