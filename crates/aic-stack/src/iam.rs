//! IAM policy documents

use aic_graph::{Props, PropValue, Token};

const POLICY_VERSION: &str = "2012-10-17";

/// Allow or deny
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Grant the actions
    Allow,
    /// Refuse the actions
    Deny,
}

impl Effect {
    fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// One statement of a policy document
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    effect: Effect,
    actions: Vec<String>,
    resources: Vec<Token>,
    service_principal: Option<String>,
    any_principal: bool,
    conditions: Vec<(String, String, Token)>,
}

impl PolicyStatement {
    /// Statement allowing `actions`
    pub fn allow<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
            service_principal: None,
            any_principal: false,
            conditions: Vec::new(),
        }
    }

    /// Statement denying `actions`
    pub fn deny<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            effect: Effect::Deny,
            ..Self::allow(actions)
        }
    }

    /// Add a resource the statement applies to
    #[must_use]
    pub fn on(mut self, resource: impl Into<Token>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// Make a service the principal
    #[must_use]
    pub fn for_service(mut self, service: &str) -> Self {
        self.service_principal = Some(service.to_string());
        self
    }

    /// Make every principal subject to the statement
    #[must_use]
    pub fn for_anyone(mut self) -> Self {
        self.any_principal = true;
        self
    }

    /// `Condition: { operator: { key: value } }`
    #[must_use]
    pub fn when(mut self, operator: &str, key: &str, value: impl Into<Token>) -> Self {
        self.conditions
            .push((operator.to_string(), key.to_string(), value.into()));
        self
    }

    /// Allow or deny
    pub fn effect(&self) -> Effect {
        self.effect
    }

    /// Actions in declaration order
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Token] {
        &self.resources
    }

    fn to_props(&self) -> Props {
        let actions: Vec<PropValue> = self.actions.iter().map(|a| PropValue::from(a.as_str())).collect();
        let mut props = Props::new()
            .with("Effect", self.effect.as_str())
            .with("Action", actions);
        if let Some(service) = &self.service_principal {
            props.insert("Principal", Props::new().with("Service", service.as_str()));
        } else if self.any_principal {
            props.insert("Principal", Props::new().with("AWS", "*"));
        }
        if !self.resources.is_empty() {
            props.insert("Resource", self.resources.clone());
        }
        if !self.conditions.is_empty() {
            let mut conditions = Props::new();
            for (operator, key, value) in &self.conditions {
                conditions.insert(operator.clone(), Props::new().with(key.clone(), value));
            }
            props.insert("Condition", conditions);
        }
        props
    }
}

/// A complete policy document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a statement
    #[must_use]
    pub fn with(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Statements in declaration order
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Trust policy letting `service` assume a role
    pub fn assumable_by(service: &str) -> Self {
        Self::new().with(PolicyStatement::allow(["sts:AssumeRole"]).for_service(service))
    }

    /// Render as resource properties
    pub fn to_props(&self) -> Props {
        let statements: Vec<PropValue> = self
            .statements
            .iter()
            .map(|s| PropValue::from(s.to_props()))
            .collect();
        Props::new()
            .with("Version", POLICY_VERSION)
            .with("Statement", statements)
    }
}

impl From<PolicyDocument> for PropValue {
    fn from(value: PolicyDocument) -> Self {
        PropValue::from(value.to_props())
    }
}
