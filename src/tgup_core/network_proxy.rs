use std::time::Duration;

use anyhow::{Context, Result};

/// Pick the outbound HTTPS proxy from the conventional environment pair.
pub(crate) fn proxy_from_env() -> Option<String> {
    select_proxy(
        std::env::var("HTTPS_PROXY").ok(),
        std::env::var("https_proxy").ok(),
    )
}

fn select_proxy(upper: Option<String>, lower: Option<String>) -> Option<String> {
    for candidate in [upper, lower].into_iter().flatten() {
        let trimmed = candidate.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }
    None
}

/// Blocking HTTP client for API calls, routed through the HTTPS proxy when
/// the environment configures one. An unparseable proxy URL falls back to a
/// direct connection with a warning rather than disabling sends entirely.
pub(crate) fn blocking_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::Client::builder().timeout(timeout);
    if let Some(url) = proxy_from_env() {
        match reqwest::Proxy::all(url.as_str()) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(err) => eprintln!("ignoring invalid HTTPS proxy {url}: {err}"),
        }
    }
    builder.build().context("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_proxy_prefers_the_uppercase_variant() {
        let picked = select_proxy(
            Some("http://corp-proxy:8080".to_string()),
            Some("http://other:1".to_string()),
        );
        assert_eq!(picked.as_deref(), Some("http://corp-proxy:8080"));
    }

    #[test]
    fn select_proxy_skips_blank_values() {
        let picked = select_proxy(Some("   ".to_string()), Some(" http://p:1 ".to_string()));
        assert_eq!(picked.as_deref(), Some("http://p:1"));
        assert!(select_proxy(None, None).is_none());
    }
}
