//! IdentityProvider
//!
//! Build order inside the component:
//! 1. User directory (admin-created users only, email sign-in, strict password policy)
//! 2. OAuth client with a generated secret
//! 3. `Admin` group
//! 4. Administrator user with a verified email
//! 5. User-to-group attachment, explicitly ordered after the group and the user
//! 6. Hosted authentication domain keyed by the deployment short id
//!
//! Any failure after step 1 is reported as
//! [`StackError::PartialIdentityState`]. An [`IdentitySet`] is only returned
//! when every step succeeded, so downstream tiers can never be wired to a
//! partial one.

use crate::error::StackError;
use crate::settings::{DeploymentIdentity, StackSettings};
use aic_graph::{GraphError, Props, PropValue, PseudoParam, ResourceHandle, ResourceSpec, Scope, Token, TopologyBuilder};

/// Component name stamped on every identity resource
pub const COMPONENT: &str = "IdentityProvider";
const PREFIX: &str = "Identity";

/// Name of the administrators group
pub const ADMIN_GROUP: &str = "Admin";

/// Access and ID token validity, in minutes
const TOKEN_VALIDITY_MINUTES: u32 = 24 * 60;

/// Inputs the identity provider needs from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequest {
    /// Email of the administrator created in the directory
    pub email: String,
    /// Allowed sign-in callback URLs
    pub callback_urls: Vec<String>,
    /// Allowed sign-out redirect URLs
    pub logout_urls: Vec<String>,
}

impl IdentityRequest {
    /// Callback and logout URLs for an application served at `base_url`
    pub fn for_base_url(email: impl Into<String>, base_url: &str) -> Self {
        Self {
            email: email.into(),
            callback_urls: vec![format!("{base_url}/api/auth/callback/cognito")],
            logout_urls: vec![base_url.to_string()],
        }
    }
}

/// OIDC endpoints and client credentials of a fully built identity provider
#[derive(Debug, Clone)]
pub struct IdentitySet {
    user_pool: ResourceHandle,
    client: ResourceHandle,
    domain: ResourceHandle,
    admin_group: ResourceHandle,
    admin_user: ResourceHandle,
    group_attachment: ResourceHandle,
}

impl IdentitySet {
    /// The user directory
    pub fn user_pool(&self) -> &ResourceHandle {
        &self.user_pool
    }

    /// The application client
    pub fn client(&self) -> &ResourceHandle {
        &self.client
    }

    /// Administrators group
    pub fn admin_group(&self) -> &ResourceHandle {
        &self.admin_group
    }

    /// Initial administrator
    pub fn admin_user(&self) -> &ResourceHandle {
        &self.admin_user
    }

    /// Membership of the administrator in the administrators group
    pub fn group_attachment(&self) -> &ResourceHandle {
        &self.group_attachment
    }

    /// Hosted sign-in domain
    pub fn domain(&self) -> &ResourceHandle {
        &self.domain
    }

    /// Resources that exist only once every identity step has completed
    pub fn completion(&self) -> [&ResourceHandle; 2] {
        [&self.group_attachment, &self.domain]
    }

    /// `https://cognito-idp.<region>.amazonaws.com/<poolId>`
    pub fn issuer(&self) -> Token {
        Token::join([
            Token::literal("https://cognito-idp."),
            Token::pseudo(PseudoParam::Region),
            Token::literal(".amazonaws.com/"),
            self.user_pool.reference(),
        ])
    }

    /// OAuth2 token endpoint
    pub fn token_endpoint(&self) -> Token {
        self.hosted_url("/oauth2/token")
    }

    /// OIDC user info endpoint
    pub fn user_info_endpoint(&self) -> Token {
        self.hosted_url("/oauth2/userInfo")
    }

    /// OAuth2 authorization endpoint
    pub fn authorization_endpoint(&self) -> Token {
        self.hosted_url("/oauth2/authorize")
    }

    /// Hosted sign-out URL
    pub fn logout_url(&self) -> Token {
        self.hosted_url("/logout")
    }

    /// Application client id
    pub fn client_id(&self) -> Token {
        self.client.reference()
    }

    /// Application client secret
    pub fn client_secret(&self) -> Token {
        self.client.attr("ClientSecret")
    }

    fn hosted_url(&self, path: &str) -> Token {
        Token::join([
            Token::literal("https://"),
            self.domain.reference(),
            Token::literal(".auth."),
            Token::pseudo(PseudoParam::Region),
            Token::literal(format!(".amazoncognito.com{path}")),
        ])
    }
}

/// Builds the identity provider
pub struct IdentityProvider;

impl IdentityProvider {
    /// Add the directory, client, domain and administrator
    ///
    /// # Errors
    /// Fails when a resource cannot be added to the builder
    pub fn build(
        builder: &mut TopologyBuilder,
        settings: &StackSettings,
        identity: &DeploymentIdentity,
        request: &IdentityRequest,
    ) -> Result<IdentitySet, StackError> {
        let mut scope = builder.scope(COMPONENT, PREFIX);

        let user_pool = scope
            .add("UserPool", user_pool_spec())
            .map_err(|e| StackError::from_graph(COMPONENT, e))?;

        let client = step(
            "UserPoolClient",
            scope.add("UserPoolClient", client_spec(&user_pool, request)),
        )?;
        let admin_group = step(
            "AdminGroup",
            scope.add(
                "AdminGroup",
                ResourceSpec::new(
                    "AWS::Cognito::UserPoolGroup",
                    Props::new()
                        .with("UserPoolId", user_pool.reference())
                        .with("GroupName", ADMIN_GROUP)
                        .with("Description", "Administrator group with full access"),
                ),
            ),
        )?;
        let admin_user = step(
            "AdminUser",
            scope.add(
                "AdminUser",
                ResourceSpec::new(
                    "AWS::Cognito::UserPoolUser",
                    Props::new()
                        .with("UserPoolId", user_pool.reference())
                        .with("Username", request.email.as_str())
                        .with(
                            "UserAttributes",
                            vec![
                                attribute("email", &request.email),
                                attribute("email_verified", "true"),
                            ],
                        ),
                ),
            ),
        )?;
        let group_attachment = step(
            "AdminGroupAttachment",
            Self::attach(&mut scope, &user_pool, &admin_group, &admin_user, &request.email),
        )?;

        let prefix = format!("{}-{}", settings.short_name, identity.short_id());
        let domain = step(
            "UserPoolDomain",
            scope.add(
                "UserPoolDomain",
                ResourceSpec::new(
                    "AWS::Cognito::UserPoolDomain",
                    Props::new()
                        .with("Domain", prefix.as_str())
                        .with("UserPoolId", user_pool.reference()),
                ),
            ),
        )?;

        tracing::info!(component = COMPONENT, domain_prefix = %prefix, "identity provider built");

        Ok(IdentitySet {
            user_pool,
            client,
            domain,
            admin_group,
            admin_user,
            group_attachment,
        })
    }

    /// Names are literal, so neither the group nor the user is referenced
    /// by a token; both orderings are stated explicitly.
    fn attach(
        scope: &mut Scope<'_>,
        user_pool: &ResourceHandle,
        group: &ResourceHandle,
        user: &ResourceHandle,
        email: &str,
    ) -> Result<ResourceHandle, GraphError> {
        let attachment = scope.add(
            "AdminGroupAttachment",
            ResourceSpec::new(
                "AWS::Cognito::UserPoolUserToGroupAttachment",
                Props::new()
                    .with("UserPoolId", user_pool.reference())
                    .with("GroupName", ADMIN_GROUP)
                    .with("Username", email),
            ),
        )?;
        scope.depends_on(&attachment, group)?;
        scope.depends_on(&attachment, user)?;
        Ok(attachment)
    }
}

fn step<T>(name: &str, result: Result<T, GraphError>) -> Result<T, StackError> {
    result.map_err(|e| {
        tracing::error!(component = COMPONENT, step = name, error = %e, "identity step failed");
        StackError::PartialIdentityState {
            step: name.to_string(),
            reason: e.to_string(),
        }
    })
}

fn attribute(name: &str, value: &str) -> Props {
    Props::new().with("Name", name).with("Value", value)
}

fn strings(values: &[String]) -> Vec<PropValue> {
    values.iter().map(|v| PropValue::from(v.as_str())).collect()
}

fn user_pool_spec() -> ResourceSpec {
    ResourceSpec::new(
        "AWS::Cognito::UserPool",
        Props::new()
            .with(
                "AdminCreateUserConfig",
                Props::new().with("AllowAdminCreateUserOnly", true),
            )
            .with("UsernameAttributes", vec!["email"])
            .with("AutoVerifiedAttributes", vec!["email"])
            .with(
                "UsernameConfiguration",
                Props::new().with("CaseSensitive", false),
            )
            .with(
                "Policies",
                Props::new().with(
                    "PasswordPolicy",
                    Props::new()
                        .with("MinimumLength", 8)
                        .with("RequireLowercase", true)
                        .with("RequireUppercase", true)
                        .with("RequireNumbers", true)
                        .with("RequireSymbols", true),
                ),
            ),
    )
}

fn client_spec(user_pool: &ResourceHandle, request: &IdentityRequest) -> ResourceSpec {
    ResourceSpec::new(
        "AWS::Cognito::UserPoolClient",
        Props::new()
            .with("UserPoolId", user_pool.reference())
            .with("GenerateSecret", true)
            .with("AllowedOAuthFlows", vec!["code", "implicit"])
            .with("AllowedOAuthFlowsUserPoolClient", true)
            .with("AllowedOAuthScopes", vec!["openid", "email", "profile"])
            .with("CallbackURLs", strings(&request.callback_urls))
            .with("LogoutURLs", strings(&request.logout_urls))
            .with("SupportedIdentityProviders", vec!["COGNITO"])
            .with("PreventUserExistenceErrors", "ENABLED")
            .with("AccessTokenValidity", TOKEN_VALIDITY_MINUTES)
            .with("IdTokenValidity", TOKEN_VALIDITY_MINUTES)
            .with(
                "TokenValidityUnits",
                Props::new()
                    .with("AccessToken", "minutes")
                    .with("IdToken", "minutes"),
            ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (aic_graph::Topology, IdentitySet) {
        let mut builder = TopologyBuilder::new("identity");
        let request = IdentityRequest::for_base_url("admin@example.com", "http://localhost:3000");
        let identity = DeploymentIdentity::new("stack", "123456789012", "us-east-1");
        let set =
            IdentityProvider::build(&mut builder, &StackSettings::default(), &identity, &request)
                .unwrap();
        (builder.validate().unwrap(), set)
    }

    #[test]
    fn attachment_waits_for_group_and_user() {
        let (topology, _) = build();
        let explicit: Vec<&str> = topology
            .explicit_dependencies("IdentityAdminGroupAttachment")
            .into_iter()
            .map(|id| id.as_str())
            .collect();
        assert!(explicit.contains(&"IdentityAdminGroup"));
        assert!(explicit.contains(&"IdentityAdminUser"));
        assert!(
            topology.position("IdentityAdminGroup").unwrap()
                < topology.position("IdentityAdminGroupAttachment").unwrap()
        );
    }

    #[test]
    fn callback_urls_follow_base_url() {
        let request = IdentityRequest::for_base_url("a@b.co", "https://chat.example.com");
        assert_eq!(
            request.callback_urls,
            vec!["https://chat.example.com/api/auth/callback/cognito"]
        );
        assert_eq!(request.logout_urls, vec!["https://chat.example.com"]);
    }

    #[test]
    fn endpoints_point_at_pool_and_domain() {
        let (topology, set) = build();
        assert_eq!(set.issuer().literal_prefix(), "https://cognito-idp.");
        assert_eq!(set.issuer().references()[0].as_str(), "IdentityUserPool");
        assert_eq!(set.token_endpoint().references()[0].as_str(), "IdentityUserPoolDomain");

        let domain = topology.resource("IdentityUserPoolDomain").unwrap();
        let prefix = domain.spec().properties().get("Domain").unwrap().as_str().unwrap();
        assert!(prefix.starts_with("aichatbot-"));
        assert_eq!(prefix.len(), "aichatbot-".len() + 8);
    }

    #[test]
    fn client_failure_after_pool_is_partial_state() {
        let mut builder = TopologyBuilder::new("identity");
        // occupy the client's logical id
        builder
            .scope("Other", "Identity")
            .add("UserPoolClient", ResourceSpec::new("AWS::SNS::Topic", Props::new()))
            .unwrap();
        let request = IdentityRequest::for_base_url("admin@example.com", "http://localhost:3000");
        let identity = DeploymentIdentity::new("stack", "123456789012", "us-east-1");
        let err =
            IdentityProvider::build(&mut builder, &StackSettings::default(), &identity, &request)
                .unwrap_err();
        assert!(matches!(err, StackError::PartialIdentityState { ref step, .. } if step == "UserPoolClient"));
        assert_eq!(err.component(), Some(COMPONENT));
    }
}
