//! Game session: the transcript plus the started/loading flags.
//!
//! All game rules live in [`SYSTEM_PROMPT`]; this module only decides when a
//! request may be sent and how streamed text lands in the transcript.

use crate::ai::{Availability, GenerateOptions};
use crate::error::GameError;
use crate::state::{ChatMessage, ChatRole, Transcript};

pub const SYSTEM_PROMPT: &str = "\
You are the narrator of a classic interactive fiction text adventure game. \
Begin by describing where the player is, what they can see, and any obvious exits. \
The player types short commands such as \"look\", \"go north\", \"take lamp\", \
\"open door\" or \"inventory\", or free-form actions. \
After each command, describe the outcome in the second person and present tense, \
in a few vivid sentences. \
Keep the world consistent: remember rooms, items the player carries, and what has already happened. \
Include puzzles, hidden items and obstacles; the player can win or lose. \
Never act or speak for the player and never list the commands they should type. \
If a command makes no sense, say so briefly in character.";

/// Sent on behalf of the player when the game begins
pub const OPENING_MESSAGE: &str = "Start the game.";

/// Everything needed for one generate call
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone)]
pub struct GameSession {
    transcript: Transcript,
    availability: Availability,
    options: GenerateOptions,
    started: bool,
    loading: bool,
}

impl GameSession {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            transcript: Transcript::new(),
            availability: Availability::Unknown,
            options,
            started: false,
            loading: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    pub fn set_availability(&mut self, availability: Availability) {
        self.availability = availability;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True while loading and the narrator hasn't produced any text yet
    pub fn awaiting_first_chunk(&self) -> bool {
        self.loading
            && self
                .transcript
                .last()
                .map_or(true, |m| m.role != ChatRole::Assistant)
    }

    fn ensure_available(&self) -> Result<(), GameError> {
        match &self.availability {
            Availability::Available { .. } => Ok(()),
            Availability::Missing { provider, reason } => Err(GameError::ExtensionMissing {
                provider: *provider,
                reason: reason.clone(),
            }),
            Availability::Unknown => Err(GameError::StillChecking),
        }
    }

    pub fn start_game(&mut self) -> Result<GenerationRequest, GameError> {
        self.ensure_available()?;
        if self.started {
            return Err(GameError::AlreadyStarted);
        }

        self.started = true;
        Ok(self.send(OPENING_MESSAGE))
    }

    pub fn submit(&mut self, input: &str) -> Result<GenerationRequest, GameError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(GameError::EmptyInput);
        }
        if !self.started {
            return Err(GameError::NotStarted);
        }
        self.ensure_available()?;
        if self.loading {
            return Err(GameError::Busy);
        }

        Ok(self.send(input))
    }

    fn send(&mut self, content: &str) -> GenerationRequest {
        self.transcript.push(ChatRole::User, content);
        self.loading = true;
        GenerationRequest {
            messages: self.transcript.request_messages(SYSTEM_PROMPT),
            options: self.options,
        }
    }

    /// Streaming callback. Text that arrives after the generation ended is
    /// dropped.
    pub fn apply_chunk(&mut self, chunk: &str) -> bool {
        if !self.loading {
            tracing::debug!(len = chunk.len(), "dropping chunk outside of a generation");
            return false;
        }
        self.transcript.append_stream_chunk(chunk);
        true
    }

    pub fn finish(&mut self) {
        self.loading = false;
    }

    pub fn fail(&mut self, message: &str) {
        tracing::warn!(%message, "generation failed");
        self.loading = false;
    }

    /// Throw away the transcript and go back to the start screen
    pub fn restart(&mut self) -> Result<(), GameError> {
        if self.loading {
            return Err(GameError::Busy);
        }
        self.transcript.clear();
        self.started = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;

    fn available() -> Availability {
        Availability::Available {
            provider: Provider::Ollama,
            detail: "http://localhost:11434".to_string(),
        }
    }

    fn running_session() -> GameSession {
        let mut session = GameSession::new(GenerateOptions::default());
        session.set_availability(available());
        session.start_game().unwrap();
        session.apply_chunk("You wake in a cellar.");
        session.finish();
        session
    }

    #[test]
    fn test_start_without_extension_sends_nothing() {
        let mut session = GameSession::new(GenerateOptions::default());
        session.set_availability(Availability::Missing {
            provider: Provider::Ollama,
            reason: "could not reach http://localhost:11434".to_string(),
        });

        let err = session.start_game().unwrap_err();
        assert!(matches!(err, GameError::ExtensionMissing { provider: Provider::Ollama, .. }));
        assert!(session.transcript().is_empty());
        assert!(!session.is_started());
        assert!(!session.is_loading());
    }

    #[test]
    fn test_start_while_detection_is_pending() {
        let mut session = GameSession::new(GenerateOptions::default());
        let err = session.start_game().unwrap_err();
        assert_eq!(err, GameError::StillChecking);
        assert_eq!(err.to_string(), "still checking for a model provider");
        assert!(session.transcript().is_empty());
        assert!(!session.is_started());
    }

    #[test]
    fn test_start_builds_request_with_system_prompt() {
        let mut session = GameSession::new(GenerateOptions::default());
        session.set_availability(available());

        let request = session.start_game().unwrap();
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], ChatMessage::new(ChatRole::System, SYSTEM_PROMPT));
        assert_eq!(request.messages[1], ChatMessage::new(ChatRole::User, OPENING_MESSAGE));
        assert_eq!(request.options, GenerateOptions::default());
        assert!(session.is_started());
        assert!(session.is_loading());
        assert!(session.awaiting_first_chunk());
    }

    #[test]
    fn test_start_twice() {
        let mut session = running_session();
        assert_eq!(session.start_game(), Err(GameError::AlreadyStarted));
    }

    #[test]
    fn test_stream_grows_single_assistant_message() {
        let mut session = running_session();
        session.submit("open the hatch").unwrap();
        assert!(session.apply_chunk("The hatch "));
        assert!(!session.awaiting_first_chunk());
        assert!(session.apply_chunk("creaks open."));
        session.finish();

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], ChatMessage::new(ChatRole::User, "open the hatch"));
        assert_eq!(messages[3], ChatMessage::new(ChatRole::Assistant, "The hatch creaks open."));
    }

    #[test]
    fn test_submit_while_streaming_is_rejected() {
        let mut session = running_session();
        session.submit("look").unwrap();
        session.apply_chunk("Dust");

        let before = session.transcript().len();
        assert_eq!(session.submit("go north"), Err(GameError::Busy));
        assert_eq!(session.transcript().len(), before);
    }

    #[test]
    fn test_submit_rules() {
        let mut session = GameSession::new(GenerateOptions::default());
        session.set_availability(available());
        assert_eq!(session.submit("look"), Err(GameError::NotStarted));

        let mut session = running_session();
        assert_eq!(session.submit("   "), Err(GameError::EmptyInput));

        let request = session.submit("  take lamp ").unwrap();
        assert_eq!(request.messages.last().map(|m| m.content.as_str()), Some("take lamp"));
    }

    #[test]
    fn test_chunks_after_finish_are_dropped() {
        let mut session = running_session();
        let before = session.transcript().messages().to_vec();
        assert!(!session.apply_chunk("late"));
        assert_eq!(session.transcript().messages(), before.as_slice());
    }

    #[test]
    fn test_failure_clears_loading_and_keeps_transcript() {
        let mut session = running_session();
        session.submit("xyzzy").unwrap();
        session.fail("connection reset");

        assert!(!session.is_loading());
        assert_eq!(session.transcript().last().map(|m| m.role), Some(ChatRole::User));
        // no retry, the player may send again
        assert!(session.submit("xyzzy").is_ok());
    }

    #[test]
    fn test_restart() {
        let mut session = running_session();
        session.submit("look").unwrap();
        assert_eq!(session.restart(), Err(GameError::Busy));

        session.finish();
        session.restart().unwrap();
        assert!(session.transcript().is_empty());
        assert!(!session.is_started());
        assert!(session.start_game().is_ok());
    }
}
