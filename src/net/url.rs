//! Caller URL resolution.
//!
//! The caller URL is the origin the request claims to come from. It is taken
//! from `X-Client-Origin`, `Origin` or `Referer`, in that order, reduced to
//! `scheme://host[:port]/`. Requests without one get a synthetic URL built
//! from the client address.

use axum::http::HeaderMap;
use std::net::IpAddr;
use url::Url;

use crate::config::UrlConfig;
use crate::net::ip::IpType;

const URL_HEADERS: &[&str] = &["x-client-origin", "origin", "referer"];

/// Where the caller URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    Header(&'static str),
    /// Built for a local client with no origin header.
    Localhost,
    /// Built from the client address.
    Address,
}

impl UrlSource {
    pub fn label(&self) -> &'static str {
        match self {
            UrlSource::Header(name) => name,
            UrlSource::Localhost => "localhost",
            UrlSource::Address => "address",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerUrl {
    pub url: String,
    pub source: UrlSource,
}

/// Reduce `raw` to its lowercase origin with a trailing slash.
///
/// Returns `None` for anything that is not an absolute URL with a host.
pub fn normalize(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let host = parsed.host_str()?;
    let port = parsed
        .port()
        .map(|port| format!(":{port}"))
        .unwrap_or_default();
    Some(format!("{}://{}{}/", parsed.scheme(), host, port))
}

#[derive(Debug, Clone, Default)]
pub struct UrlClassifier {
    blacklist: Vec<String>,
    internal: Vec<String>,
}

impl UrlClassifier {
    pub fn from_config(config: &UrlConfig) -> Self {
        let lower = |entries: &[String]| -> Vec<String> {
            entries
                .iter()
                .map(|entry| entry.trim().to_ascii_lowercase())
                .filter(|entry| !entry.is_empty())
                .collect()
        };
        Self {
            blacklist: lower(&config.blacklist),
            internal: lower(&config.internal_urls),
        }
    }

    /// Determine the caller URL for a request.
    pub fn resolve(
        &self,
        headers: &HeaderMap,
        client_ip: IpAddr,
        ip_type: IpType,
        https: bool,
        server_port: Option<u16>,
    ) -> CallerUrl {
        for name in URL_HEADERS {
            let normalized = headers
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .and_then(normalize);
            if let Some(url) = normalized {
                return CallerUrl {
                    url,
                    source: UrlSource::Header(*name),
                };
            }
        }

        if ip_type == IpType::Local {
            let scheme = if https { "https" } else { "http" };
            let port = match (https, server_port) {
                (false, Some(80)) | (true, Some(443)) | (_, None) => String::new(),
                (_, Some(port)) => format!(":{port}"),
            };
            return CallerUrl {
                url: format!("{scheme}://localhost{port}/"),
                source: UrlSource::Localhost,
            };
        }

        CallerUrl {
            url: format!("ip://{client_ip}"),
            source: UrlSource::Address,
        }
    }

    /// Classify a caller URL. Anything not recognisably local or internal
    /// takes the class of the client address.
    pub fn classify(&self, url: &str, ip_type: IpType) -> IpType {
        let url = url.to_ascii_lowercase();
        if url.contains("localhost") || url.contains("127.0.0.1") {
            IpType::Local
        } else if self.internal.iter().any(|entry| url.contains(entry.as_str())) {
            IpType::Internal
        } else {
            ip_type
        }
    }

    /// Prefix match against the URL blacklist.
    pub fn is_blacklisted(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        self.blacklist
            .iter()
            .any(|entry| url.starts_with(entry.as_str()))
    }
}
