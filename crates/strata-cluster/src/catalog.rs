//! Cluster administrative (metadata catalog) client.
//!
//! The running Strata cluster keeps its own topology metadata (racks,
//! datacenters, host and node attributes) in its catalog. The operator pushes
//! derived topology facts through this client; the catalog is the system of
//! record, the operator never stores them.
//!
//! Creation races are expected: a concurrent pass may have created the same
//! rack already. The client surfaces those as a distinguishable
//! already-exists error so callers can treat them as success.

use async_trait::async_trait;
use tracing::debug;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

use strata_common::{Error, Result};

/// Kinds of catalog objects the operator creates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogKind {
    /// A rack failure domain
    Rack,
    /// A datacenter failure domain
    Datacenter,
}

impl CatalogKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Rack => "rack",
            CatalogKind::Datacenter => "datacenter",
        }
    }

    /// Catalog directory holding objects of this kind
    pub fn directory(&self) -> &'static str {
        match self {
            CatalogKind::Rack => "/racks",
            CatalogKind::Datacenter => "/datacenters",
        }
    }
}

/// Trait abstracting the cluster's administrative API.
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// True if an object exists at the given catalog path
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create a named object of the given kind.
    ///
    /// Returns an already-exists error (see [`Error::is_already_exists`])
    /// when the object was created concurrently.
    async fn create(&self, kind: CatalogKind, name: &str) -> Result<()>;

    /// Set an attribute on the object at the given path
    async fn set_attribute(&self, path: &str, attribute: &str, value: &str) -> Result<()>;
}

/// Production implementation talking to the cluster's HTTP admin API.
///
/// The base URL points at the cluster's HTTP proxy endpoint
/// (e.g., `http://<cluster>-strata-http-proxy.<ns>.svc`).
pub struct HttpCatalogClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogClient {
    /// Create a client for the given admin endpoint
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, op: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, op)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .http
            .get(self.url("exists"))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| Error::catalog(path, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::catalog(
                path,
                format!("exists returned {}", response.status()),
            ));
        }

        let exists: bool = response
            .json()
            .await
            .map_err(|e| Error::catalog(path, e.to_string()))?;
        Ok(exists)
    }

    async fn create(&self, kind: CatalogKind, name: &str) -> Result<()> {
        let path = format!("{}/{}", kind.directory(), name);
        let body = serde_json::json!({
            "kind": kind.as_str(),
            "attributes": { "name": name },
        });

        let response = self
            .http
            .post(self.url("create"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::catalog(&path, e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                debug!(path = %path, "created catalog object");
                Ok(())
            }
            reqwest::StatusCode::CONFLICT => Err(Error::catalog_already_exists(path)),
            status => Err(Error::catalog(&path, format!("create returned {status}"))),
        }
    }

    async fn set_attribute(&self, path: &str, attribute: &str, value: &str) -> Result<()> {
        let body = serde_json::json!({
            "path": path,
            "attribute": attribute,
            "value": value,
        });

        let response = self
            .http
            .post(self.url("set"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::catalog(path, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::catalog(
                path,
                format!("set @{attribute} returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_paths() {
        assert_eq!(CatalogKind::Rack.directory(), "/racks");
        assert_eq!(CatalogKind::Datacenter.directory(), "/datacenters");
        assert_eq!(CatalogKind::Rack.as_str(), "rack");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpCatalogClient::new("http://demo-strata-http-proxy.strata.svc/");
        assert_eq!(
            client.url("exists"),
            "http://demo-strata-http-proxy.strata.svc/api/v1/exists"
        );
    }
}
