use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{drain_records, push_utf8, Availability, GenerateOptions, StreamEvent};
use crate::error::ClientError;
use crate::provider::Provider;
use crate::state::ChatMessage;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const DETECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Check for the daemon once. Any answer from `/api/tags` counts as present.
    pub async fn detect(&self) -> Availability {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(DETECT_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => Availability::Available {
                provider: Provider::Ollama,
                detail: self.base_url.clone(),
            },
            Ok(response) => Availability::Missing {
                provider: Provider::Ollama,
                reason: format!("{} answered with {}", self.base_url, response.status()),
            },
            Err(e) => {
                tracing::info!(url = %self.base_url, error = %e, "ollama not reachable");
                Availability::Missing {
                    provider: Provider::Ollama,
                    reason: format!("could not reach {}", self.base_url),
                }
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
        let url = format!("{}/api/chat", self.base_url);

        let request = OllamaChatRequest {
            model,
            messages,
            stream: true,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                provider: Provider::Ollama,
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
            push_utf8(&mut buffer, &mut pending, &chunk);

            for line in drain_records(&mut buffer, "\n") {
                if Self::forward_line(&line, tx, &mut forwarded)? {
                    return Ok(());
                }
            }
        }

        // Trailing line without a newline
        if Self::forward_line(&buffer, tx, &mut forwarded)? {
            return Ok(());
        }

        if forwarded == 0 {
            return Err(ClientError::Provider(
                "the stream ended without a reply".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true once the response is complete.
    fn forward_line(
        line: &str,
        tx: &mpsc::UnboundedSender<StreamEvent>,
        forwarded: &mut usize,
    ) -> Result<bool, ClientError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(false);
        }

        let chunk: OllamaChatChunk = serde_json::from_str(line)?;
        if let Some(error) = chunk.error {
            return Err(ClientError::Provider(error));
        }
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                let _ = tx.send(StreamEvent::Chunk(message.content));
                *forwarded += 1;
            }
        }
        Ok(chunk.done)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ClientError::Status {
                provider: Provider::Ollama,
                status,
                body: String::new(),
            });
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}
