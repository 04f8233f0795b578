use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

/// Parsed credentials file: a `[Telegram]` section with a comma-separated
/// `api_url` list, and one `[Token*]` section per bot token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_urls: Vec<String>,
    pub tokens: Vec<String>,
}

pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file {}", path.display()))?;
    parse_credentials(&text)
        .with_context(|| format!("failed to parse credentials file {}", path.display()))
}

pub fn parse_credentials(text: &str) -> Result<Credentials> {
    let mut section = String::new();
    let mut credentials = Credentials::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            section = name.trim().to_string();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if section.eq_ignore_ascii_case("telegram") && key.eq_ignore_ascii_case("api_url") {
            credentials.api_urls.extend(
                value
                    .split(',')
                    .map(normalize_base_url)
                    .filter(|url| !url.is_empty()),
            );
        } else if section.to_ascii_lowercase().starts_with("token")
            && key.eq_ignore_ascii_case("token")
            && !value.is_empty()
        {
            credentials.tokens.push(value.to_string());
        }
    }

    if credentials.tokens.is_empty() {
        bail!("no [Token*] section with a token key found");
    }
    Ok(credentials)
}

/// Trim whitespace, prepend `https://` when no scheme is given, and strip
/// any trailing slash.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    with_scheme.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_urls_and_tokens() {
        let text = "\
# primary API plus a self-hosted mirror
[Telegram]
api_url = api.telegram.org, https://tg-mirror.example.com/

[Token1]
token = 111:aaa

; backup bot
[TokenBackup]
token = 222:bbb
";
        let credentials = parse_credentials(text).expect("parse credentials");
        assert_eq!(
            credentials.api_urls,
            vec![
                "https://api.telegram.org".to_string(),
                "https://tg-mirror.example.com".to_string(),
            ]
        );
        assert_eq!(credentials.tokens, vec!["111:aaa".to_string(), "222:bbb".to_string()]);
    }

    #[test]
    fn missing_api_url_leaves_the_list_empty() {
        let text = "[Token1]\ntoken = 111:aaa\n";
        let credentials = parse_credentials(text).expect("parse credentials");
        assert!(credentials.api_urls.is_empty());
        assert_eq!(credentials.tokens.len(), 1);
    }

    #[test]
    fn a_file_without_tokens_is_a_configuration_error() {
        let text = "[Telegram]\napi_url = api.telegram.org\n";
        assert!(parse_credentials(text).is_err());
    }

    #[test]
    fn base_url_normalization_adds_scheme_and_strips_slash() {
        assert_eq!(normalize_base_url(" api.telegram.org "), "https://api.telegram.org");
        assert_eq!(
            normalize_base_url("https://tg.example.com/"),
            "https://tg.example.com"
        );
        assert_eq!(normalize_base_url("http://127.0.0.1:8081/"), "http://127.0.0.1:8081");
        assert_eq!(normalize_base_url("   "), "");
    }
}
