//! In-cluster configuration from the pod service account

use super::{ConnectionProfile, DEFAULT_NAMESPACE, is_pem};
use crate::error::Error;
use std::path::Path;
use tracing::debug;

/// Where Kubernetes mounts the service account into every pod
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORT_ENV: &str = "KUBERNETES_SERVICE_PORT";

impl ConnectionProfile {
    /// Whether the process appears to run inside a pod
    pub fn in_cluster_env_present() -> bool {
        std::env::var_os(SERVICE_HOST_ENV).is_some()
    }

    /// Build a profile from the mounted service account
    pub fn in_cluster() -> Result<Self, Error> {
        let host = std::env::var(SERVICE_HOST_ENV)
            .map_err(|_| Error::Config(format!("{} is not set; not running in a cluster", SERVICE_HOST_ENV)))?;
        let port = std::env::var(SERVICE_PORT_ENV)
            .map_err(|_| Error::Config(format!("{} is not set; not running in a cluster", SERVICE_PORT_ENV)))?;
        Self::from_service_account(Path::new(SERVICE_ACCOUNT_DIR), &host, &port)
    }

    /// Build a profile from a service account directory (`token`, `ca.crt`,
    /// optional `namespace`) and the API service address
    pub fn from_service_account(dir: &Path, host: &str, port: &str) -> Result<Self, Error> {
        let token_path = dir.join("token");
        let token = std::fs::read_to_string(&token_path).map_err(|e| Error::io(&token_path, e))?;
        let token = token.trim().to_string();
        if token.is_empty() {
            return Err(Error::Config(format!("{} is empty", token_path.display())));
        }

        let ca_path = dir.join("ca.crt");
        let ca = std::fs::read(&ca_path).map_err(|e| Error::io(&ca_path, e))?;
        if !is_pem(&ca) {
            return Err(Error::Config(format!("{} is not PEM encoded", ca_path.display())));
        }

        let namespace = std::fs::read_to_string(dir.join("namespace"))
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        let mut profile = Self::new(format!("https://{}:{}", host, port))?;
        profile.certificate_authority = Some(ca);
        profile.token = Some(token);
        profile.namespace = namespace;

        debug!("Using in-cluster service account (server {}, namespace {})", profile.server, profile.namespace);
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_account(namespace: Option<&str>) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token"), "eyJhbGciOi\n").unwrap();
        std::fs::write(dir.path().join("ca.crt"), "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n").unwrap();
        if let Some(ns) = namespace {
            std::fs::write(dir.path().join("namespace"), ns).unwrap();
        }
        dir
    }

    #[test]
    fn test_service_account_profile() {
        let dir = service_account(Some("kube-system"));
        let profile = ConnectionProfile::from_service_account(dir.path(), "10.96.0.1", "443").unwrap();
        assert_eq!(profile.server, "https://10.96.0.1:443");
        assert_eq!(profile.token.as_deref(), Some("eyJhbGciOi"));
        assert_eq!(profile.namespace, "kube-system");
        assert!(profile.certificate_authority.is_some());
    }

    #[test]
    fn test_ipv6_host_and_default_namespace() {
        let dir = service_account(None);
        let profile = ConnectionProfile::from_service_account(dir.path(), "fd00::1", "6443").unwrap();
        assert_eq!(profile.server, "https://[fd00::1]:6443");
        assert_eq!(profile.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_missing_token_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConnectionProfile::from_service_account(dir.path(), "10.96.0.1", "443").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
