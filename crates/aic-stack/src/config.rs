//! Deployment input record
//!
//! The record is persisted as JSON (`{ email, certificateArn?, domainName? }`)
//! and loaded once before anything is built. A missing file yields the
//! default record, which then fails validation on its empty email.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the input record
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

static CERTIFICATE_ARN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^arn:aws(-[a-z]+)*:acm:[a-z]{2}(-[a-z]+)+-\d:\d{12}:certificate/[A-Za-z0-9-]+$")
        .expect("certificate ARN pattern is valid")
});

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$")
        .expect("domain pattern is valid")
});

/// Configuration errors, all surfaced before any resource is built
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The record exists but could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record is not valid JSON of the expected shape
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Administrator email is missing
    #[error("administrator email is required")]
    MissingEmail,

    /// Administrator email is not an address
    #[error("administrator email '{0}' is not a valid address")]
    InvalidEmail(String),

    /// Certificate identifier is not an ACM certificate ARN
    #[error("certificate '{0}' is not an ACM certificate ARN")]
    InvalidCertificateArn(String),

    /// Domain name is not a bare host name
    #[error("domain name '{0}' is not a host name")]
    InvalidDomainName(String),
}

/// Raw input record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Administrator email; the first user of the identity provider
    #[serde(default)]
    pub email: String,
    /// ACM certificate for the public listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
    /// Public host name the application is served at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
}

impl Config {
    /// Record with only the administrator email set
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    /// Set the listener certificate
    #[must_use]
    pub fn with_certificate_arn(mut self, arn: impl Into<String>) -> Self {
        self.certificate_arn = Some(arn.into());
        self
    }

    /// Set the public host name
    #[must_use]
    pub fn with_domain_name(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = Some(domain.into());
        self
    }

    /// Load the record from `path`; a missing file yields the default record
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Persist the record as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, raw).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check the record and normalize empty optional fields to absent
    pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ConfigError::MissingEmail);
        }
        if !is_match(&EMAIL_RE, email) {
            return Err(ConfigError::InvalidEmail(email.to_string()));
        }

        let certificate_arn = non_empty(self.certificate_arn.as_deref());
        if let Some(arn) = &certificate_arn {
            if !is_match(&CERTIFICATE_ARN_RE, arn) {
                return Err(ConfigError::InvalidCertificateArn(arn.clone()));
            }
        }

        let domain_name = non_empty(self.domain_name.as_deref());
        if let Some(domain) = &domain_name {
            if !is_match(&DOMAIN_RE, domain) {
                return Err(ConfigError::InvalidDomainName(domain.clone()));
            }
        }

        Ok(ValidatedConfig {
            email: email.to_string(),
            certificate_arn,
            domain_name,
        })
    }
}

fn is_match(pattern: &Lazy<Regex>, candidate: &str) -> bool {
    pattern.is_match(candidate)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A record that passed [`Config::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedConfig {
    email: String,
    certificate_arn: Option<String>,
    domain_name: Option<String>,
}

impl ValidatedConfig {
    /// Trimmed administrator email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Listener certificate, if any
    pub fn certificate_arn(&self) -> Option<&str> {
        self.certificate_arn.as_deref()
    }

    /// Public host name, if any
    pub fn domain_name(&self) -> Option<&str> {
        self.domain_name.as_deref()
    }

    /// `https://<domain>` when a domain is configured, `fallback` otherwise
    pub fn public_base_url(&self, fallback: &str) -> String {
        match &self.domain_name {
            Some(domain) => format!("https://{domain}"),
            None => fallback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str =
        "arn:aws:acm:us-east-1:123456789012:certificate/0a1b2c3d-4e5f-6789-abcd-ef0123456789";

    #[test]
    fn validation_patterns_compile() {
        for pattern in [&EMAIL_RE, &CERTIFICATE_ARN_RE, &DOMAIN_RE] {
            assert!(!Lazy::force(pattern).as_str().is_empty());
        }
        assert!(is_match(&EMAIL_RE, "admin@example.com"));
        assert!(is_match(&DOMAIN_RE, "chat.example.com"));
        assert!(!is_match(&DOMAIN_RE, "https://chat.example.com"));
    }

    #[test]
    fn empty_email_is_rejected() {
        assert!(matches!(Config::default().validate(), Err(ConfigError::MissingEmail)));
        assert!(matches!(Config::new("   ").validate(), Err(ConfigError::MissingEmail)));
        assert!(matches!(
            Config::new("not-an-email").validate(),
            Err(ConfigError::InvalidEmail(_))
        ));
    }

    #[test]
    fn certificate_must_be_acm_arn() {
        let ok = Config::new("admin@example.com").with_certificate_arn(ARN).validate().unwrap();
        assert_eq!(ok.certificate_arn(), Some(ARN));

        let bad = Config::new("admin@example.com").with_certificate_arn("arn:aws:iam::123:role/x");
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidCertificateArn(_))));

        let china = "arn:aws-cn:acm:cn-north-1:123456789012:certificate/abc-123";
        assert!(Config::new("a@example.com").with_certificate_arn(china).validate().is_ok());
    }

    #[test]
    fn empty_optionals_are_absent() {
        let config = Config::new("admin@example.com")
            .with_certificate_arn("")
            .with_domain_name(" ")
            .validate()
            .unwrap();
        assert_eq!(config.certificate_arn(), None);
        assert_eq!(config.domain_name(), None);
        assert_eq!(config.public_base_url("http://localhost:3000"), "http://localhost:3000");
    }

    #[test]
    fn domain_must_be_a_bare_host() {
        let config = Config::new("admin@example.com")
            .with_domain_name("chat.example.com")
            .validate()
            .unwrap();
        assert_eq!(config.public_base_url("http://localhost:3000"), "https://chat.example.com");

        let bad = Config::new("admin@example.com").with_domain_name("https://chat.example.com");
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidDomainName(_))));
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let config: Config = serde_json::from_str(
            r#"{"email":"admin@example.com","certificateArn":null,"domainName":"chat.example.com"}"#,
        )
        .unwrap();
        assert_eq!(config.domain_name.as_deref(), Some("chat.example.com"));
        assert!(config.certificate_arn.is_none());
        assert!(!serde_json::to_string(&Config::new("a@b.co")).unwrap().contains("certificateArn"));
    }
}
