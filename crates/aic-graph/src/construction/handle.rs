//! Resource handles and component scopes

use crate::asset::{AssetHandle, ImageAsset};
use crate::construction::TopologyBuilder;
use crate::error::GraphError;
use crate::token::Token;
use crate::types::{LogicalId, ResourceSpec};

/// Proof that a resource has been added to a builder
///
/// Handles have no public constructor: the only way to obtain one is
/// [`TopologyBuilder::add_resource`] (or [`Scope::add`]), which is also the
/// only way to mint tokens that point at the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: LogicalId,
}

impl ResourceHandle {
    pub(crate) fn new(id: LogicalId) -> Self {
        Self { id }
    }

    /// Logical id of the referenced resource
    pub fn id(&self) -> &LogicalId {
        &self.id
    }

    /// The resource's primary identifier (`Ref`)
    pub fn reference(&self) -> Token {
        Token::reference(self.id.clone())
    }

    /// A named attribute (`Fn::GetAtt`)
    pub fn attr(&self, attribute: &str) -> Token {
        Token::attribute(self.id.clone(), attribute)
    }

    /// A JSON field of the secret string held by this resource
    pub fn secret_field(&self, field: &str) -> Token {
        Token::secret_field(self.id.clone(), field)
    }
}

/// A component's view of the builder
///
/// Logical ids are prefixed with the component prefix and every resource
/// is stamped with the component name, so provisioning failures can be
/// attributed to the tier that declared the resource.
pub struct Scope<'a> {
    builder: &'a mut TopologyBuilder,
    component: String,
    prefix: String,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(builder: &'a mut TopologyBuilder, component: &str, prefix: &str) -> Self {
        Self {
            builder,
            component: component.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Component stamped on every resource added through this scope
    pub fn component(&self) -> &str {
        &self.component
    }

    /// Logical id a local name maps to inside this scope
    pub fn logical_id(&self, name: &str) -> Result<LogicalId, GraphError> {
        LogicalId::new(format!("{}{}", self.prefix, name))
    }

    /// Add a resource under `prefix + name`
    pub fn add(&mut self, name: &str, spec: ResourceSpec) -> Result<ResourceHandle, GraphError> {
        let id = self.logical_id(name)?;
        self.builder.add_resource(&self.component, id, spec)
    }

    /// Declare an explicit dependency edge
    pub fn depends_on(
        &mut self,
        dependent: &ResourceHandle,
        dependency: &ResourceHandle,
    ) -> Result<(), GraphError> {
        self.builder.add_dependency(dependent, dependency)
    }

    /// Register an image asset published before provisioning starts
    pub fn add_asset(&mut self, asset: ImageAsset) -> Result<AssetHandle, GraphError> {
        self.builder.add_asset(&self.component, asset)
    }
}
