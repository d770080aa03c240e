//! Kubeconfig document
//!
//! Mirrors the file written by `kubectl config view`. Only the fields the
//! client acts on are modeled; unknown keys are ignored.

use crate::error::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable listing kubeconfig files
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";

/// Parsed kubeconfig file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    /// Usually "v1"
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Usually "Config"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Named API servers
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<NamedCluster>,

    /// Named credentials
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<NamedUser>,

    /// Named cluster/user/namespace combinations
    #[serde(default, deserialize_with = "null_as_default")]
    pub contexts: Vec<NamedContext>,

    /// Context used when none is named explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
}

/// `clusters[]` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Name referenced by contexts
    pub name: String,
    /// Endpoint settings
    #[serde(default)]
    pub cluster: Cluster,
}

/// Cluster endpoint and trust settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    /// API server URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Path to a PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,

    /// Base64-encoded PEM CA bundle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,

    /// Skip server certificate verification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
}

/// `users[]` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Name referenced by contexts
    pub name: String,
    /// Credentials
    #[serde(default)]
    pub user: User,
}

/// Credentials
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    /// Path to a PEM client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,

    /// Base64-encoded PEM client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,

    /// Path to a PEM client key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,

    /// Base64-encoded PEM client key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,

    /// Bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Path to a file holding the bearer token
    #[serde(rename = "tokenFile", default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<String>,

    /// Basic auth user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Basic auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("client_certificate", &self.client_certificate)
            .field("client_certificate_data", &self.client_certificate_data.as_ref().map(|_| "<set>"))
            .field("client_key", &self.client_key)
            .field("client_key_data", &self.client_key_data.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// `contexts[]` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Name selected by `current-context`
    pub name: String,
    /// Cluster, user and namespace
    #[serde(default)]
    pub context: Context,
}

/// Cluster + user + default namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Name of a `clusters[]` entry
    #[serde(default)]
    pub cluster: String,

    /// Name of a `users[]` entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Default namespace for this context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Kubeconfig {
    /// Parse a YAML document (JSON is accepted too)
    pub fn from_yaml(text: &str) -> Result<Self, Error> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("failed to parse kubeconfig: {}", e)))
    }

    /// Parse the JSON form produced by `kubectl config view -o json`
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("failed to parse kubeconfig: {}", e)))
    }

    /// Read a kubeconfig file and inline every file reference it contains
    ///
    /// Relative paths are resolved against the kubeconfig's directory.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Reading kubeconfig from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = Self::from_yaml(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.inline_file_references(base)?;
        Ok(config)
    }

    /// Read from the first `$KUBECONFIG` entry, falling back to `~/.kube/config`
    pub fn read() -> Result<Self, Error> {
        let path = default_path().ok_or_else(|| {
            Error::Config(format!(
                "no kubeconfig found: {} is unset and the home directory is unknown",
                KUBECONFIG_ENV
            ))
        })?;
        Self::read_from(path)
    }

    /// Replace `certificate-authority`, `client-certificate`, `client-key` and
    /// `tokenFile` references with the file contents
    pub fn inline_file_references(&mut self, base: &Path) -> Result<(), Error> {
        for named in &mut self.clusters {
            let cluster = &mut named.cluster;
            if cluster.certificate_authority_data.is_none() {
                if let Some(file) = cluster.certificate_authority.take() {
                    cluster.certificate_authority_data = Some(read_base64(base, &file)?);
                }
            }
        }
        for named in &mut self.users {
            let user = &mut named.user;
            if user.client_certificate_data.is_none() {
                if let Some(file) = user.client_certificate.take() {
                    user.client_certificate_data = Some(read_base64(base, &file)?);
                }
            }
            if user.client_key_data.is_none() {
                if let Some(file) = user.client_key.take() {
                    user.client_key_data = Some(read_base64(base, &file)?);
                }
            }
            if user.token.is_none() {
                if let Some(file) = user.token_file.take() {
                    let path = resolve(base, &file);
                    let token = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
                    user.token = Some(token.trim().to_string());
                }
            }
        }
        Ok(())
    }

    /// Context by name
    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts.iter().find(|c| c.name == name).map(|c| &c.context)
    }

    /// Cluster by name
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name).map(|c| &c.cluster)
    }

    /// User by name
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.iter().find(|u| u.name == name).map(|u| &u.user)
    }
}

fn default_path() -> Option<PathBuf> {
    if let Some(value) = std::env::var_os(KUBECONFIG_ENV) {
        if let Some(first) = std::env::split_paths(&value).find(|p| !p.as_os_str().is_empty()) {
            return Some(first);
        }
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".kube").join("config"))
}

fn resolve(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn read_base64(base: &Path, file: &str) -> Result<String, Error> {
    let path = resolve(base, file);
    let bytes = std::fs::read(&path).map_err(|e| Error::io(&path, e))?;
    Ok(STANDARD.encode(bytes))
}
