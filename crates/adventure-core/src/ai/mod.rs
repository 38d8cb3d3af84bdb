//! Model providers and the streaming generate call.
//!
//! Every provider streams into an unbounded channel of [`StreamEvent`]s.
//! A generation always ends with exactly one `Done` or `Failed` event.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAIClient;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ClientError;
use crate::provider::Provider;
use crate::state::ChatMessage;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 800;

/// Sampling options passed along with every generate call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Done,
    Failed(String),
}

/// Result of the startup provider check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Available { provider: Provider, detail: String },
    Missing { provider: Provider, reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available { .. })
    }
}

#[derive(Clone)]
pub enum ModelClient {
    Ollama(OllamaClient),
    OpenAI(OpenAIClient),
}

impl ModelClient {
    pub fn provider(&self) -> Provider {
        match self {
            ModelClient::Ollama(_) => Provider::Ollama,
            ModelClient::OpenAI(_) => Provider::OpenAI,
        }
    }

    pub async fn detect(&self) -> Availability {
        match self {
            ModelClient::Ollama(client) => client.detect().await,
            ModelClient::OpenAI(client) => client.detect(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, ClientError> {
        match self {
            ModelClient::Ollama(client) => client.list_models().await,
            ModelClient::OpenAI(_) => Ok(OpenAIClient::list_models()),
        }
    }

    /// Stream chunks into `tx`. Returns once the provider signals the end of
    /// the response; the terminal event is left to the caller.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: GenerateOptions,
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<(), ClientError> {
        match self {
            ModelClient::Ollama(client) => client.chat_stream(model, messages, options, tx).await,
            ModelClient::OpenAI(client) => client.chat_stream(model, messages, options, tx).await,
        }
    }
}

/// Run one generation in the background, finishing with `Done` or `Failed`.
pub fn spawn_generation(
    client: ModelClient,
    model: String,
    messages: Vec<ChatMessage>,
    options: GenerateOptions,
    tx: mpsc::UnboundedSender<StreamEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!(provider = %client.provider(), %model, messages = messages.len(), "generation started");
        let terminal = match client.chat_stream(&model, &messages, options, &tx).await {
            Ok(()) => StreamEvent::Done,
            Err(e) => {
                tracing::warn!(provider = %client.provider(), error = %e, "generation failed");
                StreamEvent::Failed(e.to_string())
            }
        };
        let _ = tx.send(terminal);
    })
}

/// Decode `bytes` into `buffer`, holding back a UTF-8 sequence cut off at
/// the end of a network frame until the rest arrives.
pub(crate) fn push_utf8(buffer: &mut String, pending: &mut Vec<u8>, bytes: &[u8]) {
    pending.extend_from_slice(bytes);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            buffer.push_str(text);
            pending.clear();
        }
        Err(e) => {
            let valid = e.valid_up_to();
            buffer.push_str(&String::from_utf8_lossy(&pending[..valid]));
            if e.error_len().is_some() {
                // Genuinely invalid, not just truncated
                buffer.push_str(&String::from_utf8_lossy(&pending[valid..]));
                pending.clear();
            } else {
                pending.drain(..valid);
            }
        }
    }
}

/// Remove and return every complete `delim`-terminated record in `buffer`.
pub(crate) fn drain_records(buffer: &mut String, delim: &str) -> Vec<String> {
    let mut records = Vec::new();
    while let Some(end) = buffer.find(delim) {
        records.push(buffer[..end].to_string());
        buffer.drain(..end + delim.len());
    }
    records
}
