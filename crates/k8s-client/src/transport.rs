//! HTTPS transport
//!
//! Turns a [`ConnectionProfile`] into a configured `reqwest::Client` plus an
//! [`AuthDecorator`] that adds the `Authorization` header to every request.
//! Client certificates and header credentials may be used together.

use crate::config::{ConnectionProfile, is_pem};
use crate::error::Error;
use reqwest::{Certificate, Client, Identity, Method, RequestBuilder};
use std::time::Duration;
use tracing::debug;

/// Ambient transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// TCP + TLS connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout for everything except watches
    pub request_timeout: Duration,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("k8s-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Per-request credential injection
#[derive(Clone, PartialEq, Eq)]
pub enum AuthDecorator {
    /// No `Authorization` header (client certificate only, or anonymous)
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `Authorization: Basic <base64(user:password)>`
    Basic {
        /// User name
        username: String,
        /// Password
        password: String,
    },
}

impl AuthDecorator {
    /// Header credentials carried by the profile
    pub fn from_profile(profile: &ConnectionProfile) -> Self {
        if let Some(token) = &profile.token {
            AuthDecorator::Bearer(token.clone())
        } else if let Some(basic) = &profile.basic_auth {
            AuthDecorator::Basic {
                username: basic.username.clone(),
                password: basic.password.clone(),
            }
        } else {
            AuthDecorator::None
        }
    }

    /// Add the `Authorization` header, if any
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            AuthDecorator::None => request,
            AuthDecorator::Bearer(token) => request.bearer_auth(token),
            AuthDecorator::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }
}

impl std::fmt::Debug for AuthDecorator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthDecorator::None => f.write_str("None"),
            AuthDecorator::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            AuthDecorator::Basic { username, .. } => write!(f, "Basic({}, <redacted>)", username),
        }
    }
}

/// Configured HTTP client bound to one API server
#[derive(Clone, Debug)]
pub struct Transport {
    http: Client,
    base_url: String,
    auth: AuthDecorator,
    request_timeout: Duration,
}

impl Transport {
    /// Build the TLS configuration and HTTP client for `profile`
    pub fn new(profile: &ConnectionProfile, options: &TransportOptions) -> Result<Self, Error> {
        let http = build_http_client(profile, options)?;
        Ok(Self {
            http,
            base_url: profile.server.trim_end_matches('/').to_string(),
            auth: AuthDecorator::from_profile(profile),
            request_timeout: options.request_timeout,
        })
    }

    /// API server URL without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Header credentials applied to each request
    pub fn auth(&self) -> &AuthDecorator {
        &self.auth
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated request with the per-request timeout applied
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.streaming_request(method, path)
            .timeout(self.request_timeout)
    }

    /// Authenticated request without a whole-request timeout, for watches
    pub fn streaming_request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.build_url(path);
        debug!("{} {}", method, url);
        let request = self
            .http
            .request(method, url)
            .header("Accept", "application/json");
        self.auth.apply(request)
    }
}

fn build_http_client(profile: &ConnectionProfile, options: &TransportOptions) -> Result<Client, Error> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .connect_timeout(options.connect_timeout)
        .user_agent(options.user_agent.clone());

    if profile.insecure_skip_tls_verify {
        builder = builder.danger_accept_invalid_certs(true);
    } else if let Some(ca) = &profile.certificate_authority {
        for certificate in parse_trust_anchors(ca)? {
            builder = builder.add_root_certificate(certificate);
        }
        builder = builder.tls_built_in_root_certs(false);
    }

    if let Some(identity) = &profile.client_identity {
        if !is_pem(&identity.certificate_pem) || !is_pem(&identity.key_pem) {
            return Err(Error::TlsConfig(
                "client certificate and key must be PEM encoded".to_string(),
            ));
        }
        let mut pem = identity.certificate_pem.clone();
        pem.push(b'\n');
        pem.extend_from_slice(&identity.key_pem);
        let identity = Identity::from_pem(&pem)
            .map_err(|e| Error::TlsConfig(format!("invalid client certificate or key: {}", e)))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| Error::TlsConfig(format!("failed to build HTTP client: {}", e)))
}

fn parse_trust_anchors(pem: &[u8]) -> Result<Vec<Certificate>, Error> {
    if !is_pem(pem) {
        return Err(Error::TlsConfig("certificate authority is not PEM encoded".to_string()));
    }
    let certificates = Certificate::from_pem_bundle(pem)
        .map_err(|e| Error::TlsConfig(format!("invalid certificate authority: {}", e)))?;
    if certificates.is_empty() {
        return Err(Error::TlsConfig(
            "certificate authority contains no certificates".to_string(),
        ));
    }
    Ok(certificates)
}
