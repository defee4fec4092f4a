use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A URL in comparison-stable form: absolute, lowercase scheme and host,
/// no default port, no trailing slash, no fragment, no userinfo.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.0)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
    }

    pub fn in_scope(&self, origin_host: &str) -> bool {
        in_scope(&self.0, origin_host)
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize `raw`, resolving it against `base` when it is relative.
///
/// Fails with `MalformedUrl` when the input (or the base) cannot be parsed or
/// has no host; callers skip such links rather than enqueueing them.
pub fn normalize(raw: &str, base: Option<&str>) -> Result<CanonicalUrl> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScanError::MalformedUrl("empty URL".to_string()));
    }

    let parsed = match base {
        Some(base) => {
            let base_url = Url::parse(base)
                .map_err(|e| ScanError::MalformedUrl(format!("{}: {}", base, e)))?;
            base_url.join(raw)
        }
        None => Url::parse(raw),
    }
    .map_err(|e| ScanError::MalformedUrl(format!("{}: {}", raw, e)))?;

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ScanError::MalformedUrl(format!("{} has no host", raw)))?
        .to_lowercase();

    let mut canonical = format!("{}://{}", parsed.scheme().to_lowercase(), host);
    // Url::port() is None when the port is the scheme's default
    if let Some(port) = parsed.port() {
        canonical.push_str(&format!(":{}", port));
    }
    canonical.push_str(parsed.path().trim_end_matches('/'));
    if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
        canonical.push('?');
        canonical.push_str(query);
    }

    Ok(CanonicalUrl(canonical))
}

/// True when `url` is http(s) and its host is `origin_host` or a subdomain of it.
pub fn in_scope(url: &str, origin_host: &str) -> bool {
    let origin = origin_host.trim().trim_end_matches('.').to_lowercase();
    if origin.is_empty() {
        return false;
    }

    if let Ok(parsed) = Url::parse(url)
        && matches!(parsed.scheme(), "http" | "https")
        && let Some(host) = parsed.host_str()
    {
        let host = host.trim_end_matches('.').to_lowercase();
        return host == origin || host.ends_with(&format!(".{}", origin));
    }
    false
}
