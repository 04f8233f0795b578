use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;

use super::cancel::CancelToken;
use super::endpoint_pool::EndpointPool;
use super::network_proxy;
use super::remote::{OutboundFile, RemoteClient};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// The media-group endpoint accepts at most ten files per call.
pub const MAX_MEDIA_GROUP_SIZE: usize = 10;

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per call, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTarget {
    /// `@channelname` or a numeric chat id.
    pub chat: String,
    /// Forum topic / message thread id, when the chat uses threads.
    pub thread: Option<i64>,
}

/// Production `RemoteClient`: every attempt draws one base URL and one bot
/// token from the least-used pools, the base-URL counter counts every send,
/// the token counter only successful ones, and a token the API declares
/// unauthorized is quarantined for the rest of the run.
pub struct TelegramClient {
    http: reqwest::blocking::Client,
    base_urls: EndpointPool,
    tokens: EndpointPool,
    target: ChatTarget,
    retry: RetryPolicy,
    cancel: CancelToken,
}

impl TelegramClient {
    pub fn new(
        base_urls: Vec<String>,
        tokens: Vec<String>,
        target: ChatTarget,
        retry: RetryPolicy,
        cancel: CancelToken,
    ) -> Result<Self> {
        let base_urls = if base_urls.is_empty() {
            vec![DEFAULT_API_BASE_URL.to_string()]
        } else {
            base_urls
        };
        let base_urls = EndpointPool::new(base_urls);
        let tokens = EndpointPool::new(tokens);
        if tokens.is_empty() {
            bail!("no bot tokens configured");
        }
        if target.chat.trim().is_empty() {
            bail!("chat target must not be empty");
        }
        Ok(Self {
            http: network_proxy::blocking_client(HTTP_TIMEOUT)?,
            base_urls,
            tokens,
            target,
            retry,
            cancel,
        })
    }

    fn call<F>(&self, method: &'static str, build: F) -> Result<()>
    where
        F: Fn(reqwest::blocking::RequestBuilder) -> Result<reqwest::blocking::RequestBuilder>,
    {
        let attempts = self.retry.max_retries.max(1);
        let mut last_error = anyhow!("{method} was never attempted");

        for attempt in 1..=attempts {
            if self.cancel.is_cancelled() {
                bail!("cancelled before {method} attempt {attempt}");
            }
            let base = self.base_urls.get().context("no API base URLs available")?;
            let token = self.tokens.get().context("no valid bot tokens remain")?;
            self.base_urls.increment(&base);
            let url = format!("{base}/bot{token}/{method}");

            let mut cool_off: Option<Duration> = None;
            let outcome = build(self.http.post(url.as_str())).and_then(|request| {
                request
                    .send()
                    .with_context(|| format!("{method} request failed"))
            });
            match outcome {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.bytes().map(|b| b.to_vec()).unwrap_or_default();
                    match parse_api_body(method, status, &body) {
                        Ok(()) => {
                            self.tokens.increment(&token);
                            return Ok(());
                        }
                        Err(failure) => {
                            if failure.credential_invalid {
                                eprintln!("removing rejected bot token from the pool");
                                self.tokens.remove(&token);
                            }
                            cool_off = failure.retry_after;
                            last_error = failure.error;
                        }
                    }
                }
                Err(err) => last_error = err,
            }

            if attempt < attempts {
                let delay = cool_off.unwrap_or(self.retry.retry_delay);
                if !self.cancel.sleep_for(delay) {
                    bail!("cancelled while waiting to retry {method}");
                }
            }
        }

        Err(last_error.context(format!("{method} failed after {attempts} attempt(s)")))
    }

    fn chat_fields(&self, mut form: Form) -> Form {
        form = form.text("chat_id", self.target.chat.clone());
        if let Some(thread) = self.target.thread {
            form = form.text("message_thread_id", thread.to_string());
        }
        form
    }

    fn send_single_part(
        &self,
        method: &'static str,
        part_name: &'static str,
        file: &OutboundFile,
    ) -> Result<()> {
        self.call(method, |request| {
            let part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
            let form = self.chat_fields(Form::new()).part(part_name, part);
            Ok(request.multipart(form))
        })
    }
}

impl RemoteClient for TelegramClient {
    fn send_text(&self, text: &str) -> Result<()> {
        self.call("sendMessage", |request| {
            let mut body = serde_json::json!({
                "chat_id": self.target.chat,
                "text": text,
            });
            if let Some(thread) = self.target.thread {
                body["message_thread_id"] = serde_json::json!(thread);
            }
            Ok(request.json(&body))
        })
    }

    fn send_media_batch(&self, files: &[OutboundFile]) -> Result<()> {
        match files.len() {
            0 => Ok(()),
            // The group endpoint requires at least two entries.
            1 => self.send_single_part("sendPhoto", "photo", &files[0]),
            n if n <= MAX_MEDIA_GROUP_SIZE => self.call("sendMediaGroup", |request| {
                let media: Vec<serde_json::Value> = (0..files.len())
                    .map(|i| {
                        serde_json::json!({
                            "type": "photo",
                            "media": format!("attach://file{i}"),
                        })
                    })
                    .collect();
                let media =
                    serde_json::to_string(&media).context("failed to encode media group")?;
                let mut form = self.chat_fields(Form::new()).text("media", media);
                for (i, file) in files.iter().enumerate() {
                    let part = Part::bytes(file.bytes.clone()).file_name(file.filename.clone());
                    form = form.part(format!("file{i}"), part);
                }
                Ok(request.multipart(form))
            }),
            n => bail!("media batch of {n} exceeds the wire limit of {MAX_MEDIA_GROUP_SIZE}"),
        }
    }

    fn send_document(&self, file: &OutboundFile) -> Result<()> {
        self.send_single_part("sendDocument", "document", file)
    }

    fn send_video(&self, file: &OutboundFile) -> Result<()> {
        self.send_single_part("sendVideo", "video", file)
    }

    fn send_audio(&self, file: &OutboundFile) -> Result<()> {
        self.send_single_part("sendAudio", "audio", file)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ApiResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

struct ApiFailure {
    error: anyhow::Error,
    credential_invalid: bool,
    retry_after: Option<Duration>,
}

fn parse_api_body(method: &str, status: u16, body: &[u8]) -> Result<(), ApiFailure> {
    match serde_json::from_slice::<ApiResponse>(body) {
        Ok(api) if api.ok => Ok(()),
        Ok(api) => {
            let code = api.error_code.unwrap_or(i64::from(status));
            let description = api
                .description
                .unwrap_or_else(|| format!("HTTP {status} with no description"));
            Err(ApiFailure {
                credential_invalid: matches!(code, 401 | 403),
                retry_after: api
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
                error: anyhow!("{method} rejected: {description} (error_code {code})"),
            })
        }
        Err(err) => Err(ApiFailure {
            credential_invalid: false,
            retry_after: None,
            error: anyhow!("{method} returned an unparseable response (HTTP {status}): {err}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_parses_as_success() {
        let body = br#"{"ok":true,"result":{"message_id":5}}"#;
        assert!(parse_api_body("sendMessage", 200, body).is_ok());
    }

    #[test]
    fn unauthorized_response_flags_the_credential() {
        let body = br#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let failure = parse_api_body("sendMessage", 401, body).expect_err("401 must fail");
        assert!(failure.credential_invalid);
        assert!(failure.retry_after.is_none());
        assert!(failure.error.to_string().contains("Unauthorized"));

        let body = br#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked"}"#;
        let failure = parse_api_body("sendMessage", 403, body).expect_err("403 must fail");
        assert!(failure.credential_invalid);
    }

    #[test]
    fn error_code_falls_back_to_the_http_status() {
        let body = br#"{"ok":false,"description":"upstream trouble"}"#;
        let failure = parse_api_body("sendPhoto", 500, body).expect_err("500 must fail");
        assert!(!failure.credential_invalid);
        assert!(failure.error.to_string().contains("error_code 500"));
    }

    #[test]
    fn rate_limit_response_carries_the_cool_off() {
        let body = br#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 31","parameters":{"retry_after":31}}"#;
        let failure = parse_api_body("sendMediaGroup", 429, body).expect_err("429 must fail");
        assert!(!failure.credential_invalid);
        assert_eq!(failure.retry_after, Some(Duration::from_secs(31)));
    }

    #[test]
    fn non_json_body_is_a_transient_error() {
        let failure =
            parse_api_body("sendPhoto", 502, b"<html>bad gateway</html>").expect_err("502");
        assert!(!failure.credential_invalid);
        assert!(failure.error.to_string().contains("HTTP 502"));
    }

    #[test]
    fn client_requires_a_token_and_a_chat() {
        let cancel = CancelToken::new();
        let no_tokens = TelegramClient::new(
            vec![DEFAULT_API_BASE_URL.to_string()],
            Vec::new(),
            ChatTarget {
                chat: "@target".to_string(),
                thread: None,
            },
            RetryPolicy::default(),
            cancel.clone(),
        );
        assert!(no_tokens.is_err());

        let no_chat = TelegramClient::new(
            Vec::new(),
            vec!["123:abc".to_string()],
            ChatTarget {
                chat: "  ".to_string(),
                thread: None,
            },
            RetryPolicy::default(),
            cancel,
        );
        assert!(no_chat.is_err());
    }
}
