//! Provider adapter trait and structured error types.
//!
//! Adapters own everything provider-specific: network calls, retries,
//! authentication. They hand the engine a raw [`ProviderPayload`]; the engine
//! never sees an adapter error, only an `Empty` payload carrying its message.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use reconcile_core::data::ProviderPayload;
use reconcile_core::domain::{ProviderId, RequestIdentity};

/// Errors an adapter may report for one fetch.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("read payload {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decode payload {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A source of raw payloads for one provider.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> &ProviderId;

    fn fetch(&self, request: &RequestIdentity) -> Result<ProviderPayload, AdapterError>;

    /// False when the provider is known to be down or blocking requests.
    fn is_available(&self) -> bool {
        true
    }
}

/// Serves a payload saved to disk.
///
/// `.csv` files become a [`ProviderPayload::Csv`]; anything else is decoded as
/// a JSON `ProviderPayload`.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    provider: ProviderId,
    path: PathBuf,
}

impl FileAdapter {
    pub fn new(provider: impl Into<ProviderId>, path: impl Into<PathBuf>) -> Self {
        Self {
            provider: provider.into(),
            path: path.into(),
        }
    }

    /// Parse `provider=path`, the form used on the command line.
    pub fn parse_spec(spec: &str) -> Option<Self> {
        let (provider, path) = spec.split_once('=')?;
        let provider = provider.trim();
        let path = path.trim();
        if provider.is_empty() || path.is_empty() {
            return None;
        }
        Some(Self::new(ProviderId::new(provider), path))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ProviderAdapter for FileAdapter {
    fn provider(&self) -> &ProviderId {
        &self.provider
    }

    fn fetch(&self, _request: &RequestIdentity) -> Result<ProviderPayload, AdapterError> {
        let text = fs::read_to_string(&self.path).map_err(|source| AdapterError::Read {
            path: self.path.clone(),
            source,
        })?;

        let is_csv = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            return Ok(ProviderPayload::Csv { text });
        }

        serde_json::from_str(&text).map_err(|source| AdapterError::Decode {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::domain::RequestKind;
    use reconcile_core::EngineConfig;

    fn request() -> RequestIdentity {
        EngineConfig::default().request("AAPL", RequestKind::Indicators, None)
    }

    #[test]
    fn parse_spec_splits_provider_and_path() {
        let adapter = FileAdapter::parse_spec("yfinance=data/aapl.json").unwrap();
        assert_eq!(adapter.provider().as_str(), "yfinance");
        assert_eq!(adapter.path(), std::path::Path::new("data/aapl.json"));
        assert!(FileAdapter::parse_spec("no-separator").is_none());
        assert!(FileAdapter::parse_spec("=path").is_none());
    }

    #[test]
    fn reads_json_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tv.json");
        fs::write(&path, r#"{"type":"snapshot","values":{"RSI":55.0}}"#).unwrap();

        let adapter = FileAdapter::new("tradingview", &path);
        let payload = adapter.fetch(&request()).unwrap();
        assert_eq!(payload.shape(), "snapshot");
    }

    #[test]
    fn csv_extension_yields_csv_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yf.CSV");
        fs::write(&path, "Date,Close\n2024-01-02,185.6\n").unwrap();

        let payload = FileAdapter::new("yfinance", &path).fetch(&request()).unwrap();
        assert!(matches!(payload, ProviderPayload::Csv { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let adapter = FileAdapter::new("twelvedata", "/nonexistent/td.json");
        assert!(matches!(adapter.fetch(&request()), Err(AdapterError::Read { .. })));
    }

    #[test]
    fn bad_json_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let adapter = FileAdapter::new("x", &path);
        assert!(matches!(adapter.fetch(&request()), Err(AdapterError::Decode { .. })));
    }
}
