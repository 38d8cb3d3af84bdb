use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{drain_records, push_utf8, Availability, GenerateOptions, StreamEvent};
use crate::error::ClientError;
use crate::provider::Provider;
use crate::state::ChatMessage;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIChunk {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAIClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// There is nothing to check locally; a configured key is enough.
    pub fn detect(&self) -> Availability {
        if self.api_key.is_some() {
            Availability::Available {
                provider: Provider::OpenAI,
                detail: self.base_url.clone(),
            }
        } else {
            Availability::Missing {
                provider: Provider::OpenAI,
                reason: "no API key configured".to_string(),
            }
        }
    }

    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), ClientError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ClientError::MissingApiKey(Provider::OpenAI))?;

        let request = OpenAIRequest {
            model,
            messages,
            stream: true,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(60 * 5))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                provider: Provider::OpenAI,
                status,
                body,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut pending = Vec::new();
        let mut forwarded = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            // SSE events can be split across frames
            push_utf8(&mut buffer, &mut pending, &chunk);
            if buffer.contains("\r\n") {
                buffer = buffer.replace("\r\n", "\n");
            }

            for event in drain_records(&mut buffer, "\n\n") {
                if Self::forward_event(&event, tx, &mut forwarded)? {
                    return Ok(());
                }
            }
        }

        // Last event without the blank line after it
        let tail = buffer.replace('\r', "");
        if Self::forward_event(&tail, tx, &mut forwarded)? {
            return Ok(());
        }

        if forwarded == 0 {
            return Err(ClientError::Provider(
                "the stream ended without a reply".to_string(),
            ));
        }
        Ok(())
    }

    /// Forward the `data:` lines of one event. Returns true on `[DONE]`.
    fn forward_event(
        event: &str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
        forwarded: &mut usize,
    ) -> Result<bool, ClientError> {
        for line in event.lines() {
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                return Ok(true);
            }

            let chunk: OpenAIChunk = serde_json::from_str(data).inspect_err(|e| {
                tracing::error!("Parsing completion chunk failed for {}: {}", data, e)
            })?;
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content);
            if let Some(content) = content.filter(|c| !c.is_empty()) {
                let _ = tx.send(StreamEvent::Chunk(content));
                *forwarded += 1;
            }
        }
        Ok(false)
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o-mini".to_string(),
            "gpt-4o".to_string(),
            "gpt-4-turbo".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChatRole;

    #[test]
    fn test_detect_requires_key() {
        assert!(!OpenAIClient::new(DEFAULT_OPENAI_URL, None).detect().is_available());
        assert!(!OpenAIClient::new(DEFAULT_OPENAI_URL, Some("  ".into())).detect().is_available());
        assert!(OpenAIClient::new(DEFAULT_OPENAI_URL, Some("sk-test".into())).detect().is_available());
    }

    #[tokio::test]
    async fn test_chat_stream_without_key_fails_before_request() {
        let client = OpenAIClient::new("http://127.0.0.1:9", None);
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = client
            .chat_stream("gpt-4o-mini", &[], GenerateOptions::default(), &tx)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MissingApiKey(Provider::OpenAI)));
    }

    #[tokio::test]
    async fn test_chat_stream_sse() {
        let mut server = mockito::Server::new_async().await;
        let sse_response = r#"data: {"id":"c1","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}

data: {"id":"c1","choices":[{"index":0,"delta":{"content":"West of"},"finish_reason":null}]}

data: {"id":"c1","choices":[{"index":0,"delta":{"content":" House"},"finish_reason":"stop"}]}

data: [DONE]

"#;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"stream":true,"max_tokens":800}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let client = OpenAIClient::new(&server.url(), Some("sk-test".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let messages = vec![ChatMessage::new(ChatRole::User, "look")];

        client
            .chat_stream("gpt-4o-mini", &messages, GenerateOptions::default(), &tx)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Chunk("West of".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Chunk(" House".into()));
        assert!(rx.try_recv().is_err());
    }

    async fn stream_body(body: &str) -> (Result<(), ClientError>, Vec<StreamEvent>) {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = OpenAIClient::new(&server.url(), Some("sk-test".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = client
            .chat_stream("gpt-4o-mini", &[], GenerateOptions::default(), &tx)
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }

    #[tokio::test]
    async fn test_chat_stream_crlf_framing() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"A troll\"}}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" blocks the bridge.\"}}]}\r\n\r\n",
            "data: [DONE]\r\n\r\n",
        );
        let (result, events) = stream_body(body).await;

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("A troll".into()),
                StreamEvent::Chunk(" blocks the bridge.".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_last_event_without_blank_line() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"The door\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" creaks open.\"}}]}\n",
        );
        let (result, events) = stream_body(body).await;

        assert!(result.is_ok());
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("The door".into()),
                StreamEvent::Chunk(" creaks open.".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_stream_without_events_fails() {
        let (result, events) = stream_body(": keep-alive\r\n\r\n").await;

        assert!(matches!(result, Err(ClientError::Provider(_))));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_chat_stream_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"bad key"}}"#)
            .create_async()
            .await;

        let client = OpenAIClient::new(&server.url(), Some("sk-bad".into()));
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = client
            .chat_stream("gpt-4o-mini", &[], GenerateOptions::default(), &tx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
