pub mod ai;
pub mod config;
pub mod error;
pub mod game;
pub mod provider;
pub mod state;

// Re-export main types for convenience
pub use ai::{
    spawn_generation, Availability, GenerateOptions, ModelClient, OllamaClient, OpenAIClient,
    StreamEvent,
};
pub use config::Config;
pub use error::{ClientError, GameError};
pub use game::{GameSession, GenerationRequest, OPENING_MESSAGE, SYSTEM_PROMPT};
pub use provider::Provider;
pub use state::{ChatMessage, ChatRole, Transcript};
