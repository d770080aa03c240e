//! Connection configuration
//!
//! A kubeconfig document (or the pod's service account) is resolved into one
//! [`ConnectionProfile`]: server URL, trust anchor, client identity, header
//! credentials and default namespace. Resolution is pure; file and
//! environment access lives in [`Kubeconfig::read_from`],
//! [`Kubeconfig::read`] and [`ConnectionProfile::in_cluster`].

mod in_cluster;
pub mod kubeconfig;

pub use in_cluster::SERVICE_ACCOUNT_DIR;
pub use kubeconfig::{Cluster, Context, Kubeconfig, NamedCluster, NamedContext, NamedUser, User};

use crate::error::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::debug;

/// Namespace used when the context does not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// PEM client certificate and private key
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// PEM certificate (chain)
    pub certificate_pem: Vec<u8>,
    /// PEM private key
    pub key_pem: Vec<u8>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("certificate_pem", &format!("<{} bytes>", self.certificate_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Username/password credentials
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to reach one API server as one identity
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// API server base URL, without trailing slash
    pub server: String,
    /// PEM trust anchor(s); when set, the only roots trusted
    pub certificate_authority: Option<Vec<u8>>,
    /// Skip server certificate verification
    pub insecure_skip_tls_verify: bool,
    /// TLS client identity
    pub client_identity: Option<ClientIdentity>,
    /// Bearer token
    pub token: Option<String>,
    /// Basic credentials
    pub basic_auth: Option<BasicAuth>,
    /// Namespace used when a request does not name one
    pub namespace: String,
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("server", &self.server)
            .field("certificate_authority", &self.certificate_authority.as_ref().map(|ca| format!("<{} bytes>", ca.len())))
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("client_identity", &self.client_identity)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("basic_auth", &self.basic_auth)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ConnectionProfile {
    /// Profile with only a server URL; useful for plain-HTTP test servers
    pub fn new(server: impl Into<String>) -> Result<Self, Error> {
        Ok(Self {
            server: parse_server(&server.into())?,
            certificate_authority: None,
            insecure_skip_tls_verify: false,
            client_identity: None,
            token: None,
            basic_auth: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    /// Resolve the current context
    pub fn from_kubeconfig(config: &Kubeconfig) -> Result<Self, Error> {
        let name = config
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Config("current-context is not set".to_string()))?;
        Self::from_kubeconfig_context(config, name)
    }

    /// Resolve a named context
    pub fn from_kubeconfig_context(config: &Kubeconfig, context_name: &str) -> Result<Self, Error> {
        let context = config
            .context(context_name)
            .ok_or_else(|| Error::Config(format!("context {:?} not found", context_name)))?;
        if context.cluster.is_empty() {
            return Err(Error::Config(format!("context {:?} names no cluster", context_name)));
        }
        let cluster = config.cluster(&context.cluster).ok_or_else(|| {
            Error::Config(format!(
                "context {:?} refers to unknown cluster {:?}",
                context_name, context.cluster
            ))
        })?;
        let user = match context.user.as_deref().filter(|u| !u.is_empty()) {
            Some(name) => Some(config.user(name).ok_or_else(|| {
                Error::Config(format!(
                    "context {:?} refers to unknown user {:?}",
                    context_name, name
                ))
            })?),
            None => None,
        };

        let server = cluster
            .server
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("cluster {:?} has no server", context.cluster)))?;
        let server = parse_server(server)?;

        let certificate_authority = cluster
            .certificate_authority_data
            .as_deref()
            .map(|data| decode_pem("certificate-authority-data", data))
            .transpose()?;
        let insecure_skip_tls_verify = cluster.insecure_skip_tls_verify.unwrap_or(false);
        if insecure_skip_tls_verify && certificate_authority.is_some() {
            return Err(Error::Config(format!(
                "cluster {:?}: certificate-authority-data cannot be combined with insecure-skip-tls-verify",
                context.cluster
            )));
        }

        let (client_identity, token, basic_auth) = match user {
            Some(user) => resolve_user(user)?,
            None => (None, None, None),
        };

        let namespace = context
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        debug!(
            "Resolved kubeconfig context {} (cluster {}, server {}, namespace {})",
            context_name, context.cluster, server, namespace
        );

        Ok(Self {
            server,
            certificate_authority,
            insecure_skip_tls_verify,
            client_identity,
            token,
            basic_auth,
            namespace,
        })
    }
}

type Credentials = (Option<ClientIdentity>, Option<String>, Option<BasicAuth>);

fn resolve_user(user: &User) -> Result<Credentials, Error> {
    let certificate = user
        .client_certificate_data
        .as_deref()
        .map(|data| decode_pem("client-certificate-data", data))
        .transpose()?;
    let key = user
        .client_key_data
        .as_deref()
        .map(|data| decode_pem("client-key-data", data))
        .transpose()?;
    let client_identity = match (certificate, key) {
        (Some(certificate_pem), Some(key_pem)) => Some(ClientIdentity {
            certificate_pem,
            key_pem,
        }),
        (None, None) => None,
        (Some(_), None) => {
            return Err(Error::Config(
                "client-certificate-data is set but client-key-data is missing".to_string(),
            ));
        }
        (None, Some(_)) => {
            return Err(Error::Config(
                "client-key-data is set but client-certificate-data is missing".to_string(),
            ));
        }
    };

    let token = user.token.clone().filter(|t| !t.is_empty());
    let basic_auth = match (&user.username, &user.password) {
        (Some(username), password) if !username.is_empty() => Some(BasicAuth {
            username: username.clone(),
            password: password.clone().unwrap_or_default(),
        }),
        _ => None,
    };
    if token.is_some() && basic_auth.is_some() {
        return Err(Error::Config(
            "token and username/password cannot both be set".to_string(),
        ));
    }

    Ok((client_identity, token, basic_auth))
}

fn parse_server(server: &str) -> Result<String, Error> {
    let url = reqwest::Url::parse(server)
        .map_err(|e| Error::Config(format!("invalid server URL {:?}: {}", server, e)))?;
    if !matches!(url.scheme(), "https" | "http") || url.host_str().is_none() {
        return Err(Error::Config(format!("invalid server URL {:?}", server)));
    }
    Ok(server.trim_end_matches('/').to_string())
}

fn decode_pem(field: &str, data: &str) -> Result<Vec<u8>, Error> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| Error::Config(format!("{} is not valid base64: {}", field, e)))?;
    if !is_pem(&bytes) {
        return Err(Error::Config(format!("{} is not PEM encoded", field)));
    }
    Ok(bytes)
}

pub(crate) fn is_pem(bytes: &[u8]) -> bool {
    bytes.windows(11).any(|w| w == b"-----BEGIN ")
}
