//! Error and moderation reporting sinks.
//!
//! Harvest failures and image reports are forwarded to an [`ErrorSink`].
//! Sinks are optional everywhere they are accepted; with none configured
//! the messages still reach the tracing log.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ReportingConfig;
use crate::error::{HanError, Result};

/// Destination for operator-facing messages.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn log(&self, message: &str);
}

/// Send `message` to `sink` if there is one.
pub async fn report(sink: Option<&Arc<dyn ErrorSink>>, message: &str) {
    if let Some(sink) = sink {
        sink.log(message).await;
    }
}

/// Writes messages to the tracing log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ErrorSink for TracingSink {
    async fn log(&self, message: &str) {
        tracing::warn!(target: "hanserver::report", "{message}");
    }
}

/// Posts messages to a Slack channel through `chat.postMessage`.
pub struct SlackSink {
    client: reqwest::Client,
    token: String,
    channel: String,
    base_url: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackSink {
    pub const DEFAULT_BASE_URL: &'static str = "https://slack.com/api";

    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, channel, Self::DEFAULT_BASE_URL)
    }

    /// Point the sink at a different API root, such as a mock server.
    pub fn with_base_url(
        token: impl Into<String>,
        channel: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HanError::Config(format!("failed to build Slack client: {e}")))?;
        Ok(Self {
            client,
            token: token.into(),
            channel: channel.into(),
            base_url: base_url.into(),
        })
    }

    async fn post(&self, text: &str) -> std::result::Result<(), String> {
        let url = format!("{}/chat.postMessage", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&PostMessage {
                channel: &self.channel,
                text,
            })
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let body: SlackResponse = response.json().await.map_err(|e| e.without_url().to_string())?;
        if body.ok {
            Ok(())
        } else {
            Err(body.error.unwrap_or_else(|| "unknown error".into()))
        }
    }
}

#[async_trait]
impl ErrorSink for SlackSink {
    async fn log(&self, message: &str) {
        if let Err(e) = self.post(message).await {
            tracing::warn!(error = %e, %message, "Slack notification failed");
        }
    }
}

/// Build the sink described by `config`.
///
/// A Slack token selects [`SlackSink`]; otherwise messages go to
/// [`TracingSink`].
pub fn sink_from_config(config: &ReportingConfig) -> Result<Arc<dyn ErrorSink>> {
    match config.slack_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            let mut sink = SlackSink::new(token, config.slack_channel.clone())?;
            if let Some(base_url) = &config.slack_base_url {
                sink.base_url = base_url.clone();
            }
            tracing::info!(channel = %config.slack_channel, "reporting to Slack");
            Ok(Arc::new(sink))
        }
        None => {
            tracing::warn!("no Slack token configured, reports go to the log only");
            Ok(Arc::new(TracingSink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<String>>);

    #[async_trait]
    impl ErrorSink for RecordingSink {
        async fn log(&self, message: &str) {
            self.0.lock().unwrap().push(message.to_owned());
        }
    }

    #[tokio::test]
    async fn report_without_sink_is_noop() {
        report(None, "nobody listening").await;
    }

    #[tokio::test]
    async fn report_forwards_to_sink() {
        let recorder = Arc::new(RecordingSink::default());
        let sink: Arc<dyn ErrorSink> = recorder.clone();
        report(Some(&sink), "hello").await;
        assert_eq!(*recorder.0.lock().unwrap(), vec!["hello".to_owned()]);
    }

    #[tokio::test]
    async fn slack_sink_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(serde_json::json!({"channel": "hanserver", "text": "flickr Error: boom"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let sink = SlackSink::with_base_url("xoxb-test", "hanserver", server.uri()).unwrap();
        sink.log("flickr Error: boom").await;
    }

    #[tokio::test]
    async fn slack_api_error_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": false, "error": "channel_not_found"})),
            )
            .mount(&server)
            .await;

        let sink = SlackSink::with_base_url("t", "missing", server.uri()).unwrap();
        assert_eq!(sink.post("x").await.unwrap_err(), "channel_not_found");
        // `log` only warns.
        sink.log("x").await;
    }

    #[test]
    fn config_without_token_uses_tracing() {
        let config = ReportingConfig::default();
        assert!(sink_from_config(&config).is_ok());
    }
}
