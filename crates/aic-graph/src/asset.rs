//! Container image assets
//!
//! An image asset is built and published before any resource is
//! provisioned. Its fingerprint is a hash of the build description, so an
//! unchanged description yields the same image URI across deployments.

use crate::error::GraphError;
use crate::token::Token;
use crate::types::PseudoParam;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Repository that receives published images
pub const ASSET_REPOSITORY: &str = "aic-container-assets";

/// Description of a container image build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Build context directory
    pub directory: PathBuf,
    /// Dockerfile path, relative to the build context
    pub dockerfile: String,
    /// Target platform, e.g. `linux/amd64`
    pub platform: String,
    /// Build arguments, sorted so the fingerprint is stable
    pub build_args: BTreeMap<String, String>,
    /// Glob patterns left out of the build context
    pub exclude: Vec<String>,
}

impl ImageAsset {
    /// Asset built from `directory` with its `Dockerfile`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            dockerfile: "Dockerfile".to_string(),
            platform: "linux/amd64".to_string(),
            build_args: BTreeMap::new(),
            exclude: Vec::new(),
        }
    }

    /// Use a Dockerfile other than the default
    #[must_use]
    pub fn with_dockerfile(mut self, dockerfile: impl Into<String>) -> Self {
        self.dockerfile = dockerfile.into();
        self
    }

    /// Build for `platform`
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Add a build argument
    #[must_use]
    pub fn with_build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(key.into(), value.into());
        self
    }

    /// Leave matching paths out of the build context
    #[must_use]
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub(crate) fn validate(&self) -> Result<(), GraphError> {
        if self.directory.as_os_str().is_empty() {
            return Err(GraphError::InvalidAsset("build directory is empty".into()));
        }
        if self.dockerfile.trim().is_empty() {
            return Err(GraphError::InvalidAsset("dockerfile name is empty".into()));
        }
        if !self.platform.contains('/') {
            return Err(GraphError::InvalidAsset(format!(
                "platform '{}' is not os/arch",
                self.platform
            )));
        }
        Ok(())
    }

    /// Content hash of the build description
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.directory.to_string_lossy().as_bytes());
        hasher.update([0]);
        hasher.update(self.dockerfile.as_bytes());
        hasher.update([0]);
        hasher.update(self.platform.as_bytes());
        for (key, value) in &self.build_args {
            hasher.update([0]);
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        for pattern in &self.exclude {
            hasher.update([1]);
            hasher.update(pattern.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

/// Reference to an asset registered with a builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHandle {
    fingerprint: String,
}

impl AssetHandle {
    pub(crate) fn new(fingerprint: String) -> Self {
        Self { fingerprint }
    }

    /// Content fingerprint of the build description
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Registry URI of the published image
    pub fn image_uri(&self) -> Token {
        Token::join([
            Token::pseudo(PseudoParam::AccountId),
            Token::literal(".dkr.ecr."),
            Token::pseudo(PseudoParam::Region),
            Token::literal("."),
            Token::pseudo(PseudoParam::UrlSuffix),
            Token::literal(format!("/{ASSET_REPOSITORY}:{}", self.fingerprint)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_sensitive() {
        let a = ImageAsset::new("portal").with_build_arg("NODE_ENV", "production");
        let b = ImageAsset::new("portal").with_build_arg("NODE_ENV", "production");
        let c = ImageAsset::new("portal").with_build_arg("NODE_ENV", "development");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn validate_rejects_empty_directory_and_bad_platform() {
        assert!(ImageAsset::new("").validate().is_err());
        assert!(ImageAsset::new("portal").with_platform("amd64").validate().is_err());
        assert!(ImageAsset::new("portal").validate().is_ok());
    }

    #[test]
    fn image_uri_ends_with_fingerprint() {
        let handle = AssetHandle::new("abc123".to_string());
        let rendered = handle.image_uri().to_template().to_string();
        assert!(rendered.contains("aic-container-assets:abc123"));
        assert!(rendered.contains("AWS::AccountId"));
    }
}
