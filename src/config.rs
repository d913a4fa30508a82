//! Configuration for the token network proxy

use serde::Deserialize;
use std::path::Path;

use crate::{error::ProxyError, packed::types::Address, Result};

/// Contract version the proxy was written against.
pub const DEFAULT_CONTRACT_VERSION: &str = "0.40.0";

/// Token network proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the deployed token network contract
    pub token_network_address: Address,

    /// Contract version this proxy speaks (`major.minor.patch`)
    pub expected_contract_version: String,

    /// Refuse to start against a contract of a different major/minor version
    pub check_contract_version: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token_network_address: Address::default(),
            expected_contract_version: DEFAULT_CONTRACT_VERSION.to_string(),
            check_contract_version: true,
        }
    }
}

impl Config {
    pub fn new(token_network_address: Address) -> Self {
        Self {
            token_network_address,
            ..Default::default()
        }
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(address) = var("TOKEN_NETWORK_ADDRESS") {
            config.token_network_address = address.trim().parse().map_err(|e| {
                ProxyError::Config(format!("Invalid TOKEN_NETWORK_ADDRESS: {}", e))
            })?;
        }

        if let Some(version) = var("TOKEN_NETWORK_CONTRACT_VERSION") {
            config.expected_contract_version = version;
        }

        if let Some(check) = var("TOKEN_NETWORK_CHECK_VERSION") {
            config.check_contract_version = check.trim().parse().map_err(|e| {
                ProxyError::Config(format!("Invalid TOKEN_NETWORK_CHECK_VERSION: {}", e))
            })?;
        }

        Ok(config)
    }
}

/// Major and minor component of a `major.minor.patch` version string.
pub(crate) fn major_minor(version: &str) -> Option<(u64, u64)> {
    let version = version.trim().trim_start_matches('v');
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

/// Whether `deployed` is compatible with `expected`, i.e. they share major
/// and minor version.
pub(crate) fn compatible_version(deployed: &str, expected: &str) -> bool {
    match (major_minor(deployed), major_minor(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
