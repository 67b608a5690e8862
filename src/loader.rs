//! Schema loading from various sources.
//!
//! Turns files, strings and HTTP URLs into `Value`s, and provides the
//! [`DocumentFetcher`]s a [`SchemaRegistry`](crate::SchemaRegistry) can use
//! for documents nobody registered.

use std::path::{Path, PathBuf};

use serde_json::Value;
use url::Url;

use crate::error::LoadError;
use crate::registry::DocumentFetcher;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a schema from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_schema(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a schema from a JSON string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_schema_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load a schema from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the server
/// answers with an error status or a body that isn't JSON.
#[cfg(feature = "remote")]
pub fn load_schema_url(url: &str) -> Result<Value, LoadError> {
    HttpFetcher::new()?.get(url)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a schema from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
pub fn load_schema_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_schema_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::Unsupported {
                uri: source.to_string(),
            })
        }
    } else {
        load_schema(Path::new(source))
    }
}

/// Serves documents under a remote URL prefix from a local directory.
///
/// `https://example.com/schemas/a.json` with remote base
/// `https://example.com/schemas` and local base `site/` reads `site/a.json`.
/// `file:` URLs are read directly.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    remote_base: String,
    local_base: PathBuf,
}

impl MirrorFetcher {
    pub fn new(remote_base: impl Into<String>, local_base: impl Into<PathBuf>) -> Self {
        Self {
            remote_base: remote_base.into(),
            local_base: local_base.into(),
        }
    }

    /// Local path for `uri`, if this mirror covers it.
    pub fn mirror_path(&self, uri: &Url) -> Option<PathBuf> {
        if let Some(remainder) = uri.as_str().strip_prefix(self.remote_base.as_str()) {
            // prefix must end at a path boundary
            if self.remote_base.ends_with('/') || remainder.is_empty() || remainder.starts_with('/') {
                return Some(self.local_base.join(remainder.trim_start_matches('/')));
            }
        }
        if uri.scheme() == "file" {
            return uri.to_file_path().ok();
        }
        None
    }
}

impl DocumentFetcher for MirrorFetcher {
    fn fetch(&self, uri: &Url) -> Result<Value, LoadError> {
        let path = self.mirror_path(uri).ok_or_else(|| LoadError::Unsupported {
            uri: uri.to_string(),
        })?;
        tracing::debug!(%uri, path = %path.display(), "loading mirrored schema");
        load_schema(&path)
    }
}

/// Fetches `http` and `https` documents with a blocking client.
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    /// A client with a 10 second timeout.
    pub fn new() -> Result<Self, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|source| LoadError::NetworkError {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<Value, LoadError> {
        let network = |source| LoadError::NetworkError {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .map_err(network)?
            // Check for HTTP errors before parsing
            .error_for_status()
            .map_err(network)?
            .json()
            .map_err(network)
    }
}

#[cfg(feature = "remote")]
impl DocumentFetcher for HttpFetcher {
    fn fetch(&self, uri: &Url) -> Result<Value, LoadError> {
        if !matches!(uri.scheme(), "http" | "https") {
            return Err(LoadError::Unsupported {
                uri: uri.to_string(),
            });
        }
        tracing::debug!(%uri, "fetching remote schema");
        self.get(uri.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn load_schema_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "object"}}"#).unwrap();

        let schema = load_schema(file.path()).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_schema_file_not_found() {
        let result = load_schema(Path::new("/nonexistent/path.json"));
        assert!(matches!(result, Err(LoadError::FileNotFound { .. })));
    }

    #[test]
    fn load_schema_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid json").unwrap();

        let result = load_schema(file.path());
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn load_schema_str_valid() {
        let schema = load_schema_str(r#"{"type": "object"}"#).unwrap();
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn load_schema_str_invalid() {
        let result = load_schema_str("not json");
        assert!(matches!(result, Err(LoadError::InvalidJson { .. })));
    }

    #[test]
    fn is_url_schemes() {
        assert!(is_url("https://example.com/schema.json"));
        assert!(is_url("http://example.com/schema.json"));
        assert!(!is_url("/path/to/schema.json"));
        assert!(!is_url("./schema.json"));
    }

    #[test]
    fn load_schema_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"type": "string"}}"#).unwrap();

        let schema = load_schema_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(schema["type"], "string");
    }

    #[test]
    fn mirror_maps_remote_prefix() {
        let mirror = MirrorFetcher::new("https://example.com/draft", "/local/schemas");
        assert_eq!(
            mirror.mirror_path(&url("https://example.com/draft/types/buyer.json")),
            Some(PathBuf::from("/local/schemas/types/buyer.json"))
        );
        assert_eq!(mirror.mirror_path(&url("https://example.com/drafts/x.json")), None);
        assert_eq!(mirror.mirror_path(&url("https://other.com/draft/x.json")), None);
    }

    #[test]
    fn mirror_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("item.json"), r#"{"type": "integer"}"#).unwrap();
        let mirror = MirrorFetcher::new("https://example.com/schemas/", dir.path());

        let value = mirror.fetch(&url("https://example.com/schemas/item.json")).unwrap();
        assert_eq!(value["type"], "integer");

        let err = mirror.fetch(&url("https://elsewhere.com/item.json")).unwrap_err();
        assert!(matches!(err, LoadError::Unsupported { .. }));
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn http_fetcher_reads_json() {
            let mut server = mockito::Server::new();
            let mock = server
                .mock("GET", "/schema.json")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(r#"{"type": "boolean"}"#)
                .create();

            let fetcher = HttpFetcher::new().unwrap();
            let value = fetcher
                .fetch(&url(&format!("{}/schema.json", server.url())))
                .unwrap();
            assert_eq!(value["type"], "boolean");
            mock.assert();
        }

        #[test]
        fn http_error_status_is_a_network_error() {
            let mut server = mockito::Server::new();
            let _missing = server.mock("GET", "/missing.json").with_status(404).create();

            let result = load_schema_url(&format!("{}/missing.json", server.url()));
            assert!(matches!(result, Err(LoadError::NetworkError { .. })));
        }

        #[test]
        fn http_fetcher_rejects_other_schemes() {
            let fetcher = HttpFetcher::new().unwrap();
            let err = fetcher.fetch(&url("urn:example:schema")).unwrap_err();
            assert!(matches!(err, LoadError::Unsupported { .. }));
        }
    }
}
