use adventure_core::{
    spawn_generation, Availability, Config, GameError, GameSession, GenerationRequest,
    ModelClient, StreamEvent,
};
use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::tui::{AppEvent, EventSender};

/// Ticks a notification stays on screen (~5s at 300ms per tick)
pub const NOTIFICATION_TICKS: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Transient message in the footer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub ticks_left: u16,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub session: GameSession,

    // Provider
    pub client: ModelClient,
    pub selected_model: String,
    pub generation: Option<JoinHandle<()>>,

    // Player input
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Transcript view
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_output: bool,

    pub notification: Option<Notification>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    events: EventSender,
}

impl App {
    pub fn new(config: &Config, client: ModelClient, selected_model: String, events: EventSender) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Normal,
            session: GameSession::new(config.generate_options()),

            client,
            selected_model,
            generation: None,

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_output: true,

            notification: None,
            animation_frame: 0,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            events,
        }
    }

    /// Look for the provider once; the answer arrives as `AppEvent::Detected`.
    pub fn spawn_detection(&self) {
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let availability = client.detect().await;
            let _ = tx.send(AppEvent::Detected(availability));
        });
    }

    pub fn set_availability(&mut self, availability: Availability) {
        match &availability {
            Availability::Available { provider, detail } => {
                tracing::info!(%provider, %detail, "model provider detected");
            }
            Availability::Missing { provider, reason } => {
                tracing::warn!(%provider, %reason, "model provider not available");
            }
            Availability::Unknown => {}
        }
        self.session.set_availability(availability);
    }

    pub fn start_game(&mut self) {
        match self.session.start_game() {
            Ok(request) => {
                self.input_mode = InputMode::Editing;
                self.begin_generation(request);
            }
            // The install prompt is already on screen
            Err(GameError::ExtensionMissing { .. })
                if matches!(self.session.availability(), Availability::Missing { .. }) => {}
            Err(e) => self.notify(e.to_string()),
        }
    }

    pub fn submit_input(&mut self) {
        match self.session.submit(&self.input) {
            Ok(request) => {
                self.input.clear();
                self.input_cursor = 0;
                self.begin_generation(request);
            }
            Err(GameError::EmptyInput) => {}
            Err(e) => self.notify(e.to_string()),
        }
    }

    pub fn new_game(&mut self) {
        match self.session.restart() {
            Ok(()) => {
                self.input.clear();
                self.input_cursor = 0;
                self.chat_scroll = 0;
                self.follow_output = true;
                self.input_mode = InputMode::Normal;
            }
            Err(e) => self.notify(e.to_string()),
        }
    }

    fn begin_generation(&mut self, request: GenerationRequest) {
        let (stream_tx, mut stream_rx) = mpsc::unbounded_channel();
        let handle = spawn_generation(
            self.client.clone(),
            self.selected_model.clone(),
            request.messages,
            request.options,
            stream_tx,
        );

        // Forward stream events into the UI loop
        let tx = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = stream_rx.recv().await {
                if tx.send(AppEvent::Stream(event)).is_err() {
                    break;
                }
            }
        });

        self.generation = Some(handle);
        self.follow_output = true;
        self.scroll_to_bottom();
    }

    pub fn handle_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Chunk(chunk) => {
                if self.session.apply_chunk(&chunk) && self.follow_output {
                    self.scroll_to_bottom();
                }
            }
            StreamEvent::Done => {
                self.session.finish();
                self.generation = None;
            }
            StreamEvent::Failed(message) => {
                self.session.fail(&message);
                self.generation = None;
                self.notify(format!("Generation failed: {}", message));
            }
        }
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.notification = Some(Notification {
            message: message.into(),
            ticks_left: NOTIFICATION_TICKS,
        });
    }

    /// Tick animation frame and expire notifications (called by Tick event)
    pub fn tick(&mut self) {
        if self.session.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some(notification) = &mut self.notification {
            notification.ticks_left = notification.ticks_left.saturating_sub(1);
            if notification.ticks_left == 0 {
                self.notification = None;
            }
        }
    }

    pub fn abort_generation(&mut self) {
        if let Some(handle) = self.generation.take() {
            handle.abort();
        }
    }

    // Model picker
    pub fn open_model_picker(&mut self) {
        let client = self.client.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let models = client.list_models().await.map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::Models(models));
        });
    }

    pub fn show_models(&mut self, models: Vec<String>) {
        if models.is_empty() {
            self.notify("No models found. Pull one with: ollama pull llama3.2");
            return;
        }
        let current = models.iter().position(|m| *m == self.selected_model).unwrap_or(0);
        self.available_models = models;
        self.model_picker_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let selected = self
            .model_picker_state
            .selected()
            .and_then(|i| self.available_models.get(i))
            .cloned();
        if let Some(model) = selected {
            if let Err(e) = Config::save_default_model(&model) {
                tracing::warn!(error = %e, "could not save default model");
            }
            tracing::info!(%model, "model selected");
            self.selected_model = model;
        }
        self.show_model_picker = false;
    }

    // Scrolling
    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.chat_scroll = (self.chat_scroll + lines).min(max);
        self.follow_output = self.chat_scroll >= max;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn half_page(&self) -> u16 {
        (self.chat_height / 2).max(1)
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
        self.follow_output = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.chat_scroll = self.max_scroll();
        self.follow_output = true;
    }

    fn max_scroll(&self) -> u16 {
        self.transcript_line_count().saturating_sub(self.chat_height)
    }

    /// Wrapped line count of the transcript as rendered
    pub fn transcript_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let total_lines = crate::ui::transcript_lines(self, wrap_width).len();
        total_lines.min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use adventure_core::{ChatRole, OllamaClient, Provider};

    pub(crate) fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ModelClient::Ollama(OllamaClient::new("http://127.0.0.1:9"));
        let app = App::new(&Config::new(), client, "llama3.2:latest".to_string(), tx);
        (app, rx)
    }

    pub(crate) fn available() -> Availability {
        Availability::Available {
            provider: Provider::Ollama,
            detail: "http://127.0.0.1:9".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_without_provider_keeps_install_prompt() {
        let (mut app, _rx) = test_app();
        app.set_availability(Availability::Missing {
            provider: Provider::Ollama,
            reason: "could not reach http://127.0.0.1:9".to_string(),
        });

        app.start_game();

        assert!(app.generation.is_none());
        assert!(app.session.transcript().is_empty());
        assert!(app.notification.is_none());
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[tokio::test]
    async fn test_start_while_detecting_notifies() {
        let (mut app, _rx) = test_app();
        app.start_game();
        assert!(app.generation.is_none());
        assert!(app.notification.is_some());
    }

    #[tokio::test]
    async fn test_start_spawns_generation() {
        let (mut app, _rx) = test_app();
        app.set_availability(available());

        app.start_game();

        assert!(app.generation.is_some());
        assert!(app.session.is_loading());
        assert_eq!(app.input_mode, InputMode::Editing);
        app.abort_generation();
    }

    #[tokio::test]
    async fn test_stream_events_update_session() {
        let (mut app, _rx) = test_app();
        app.set_availability(available());
        app.start_game();
        app.abort_generation();

        app.handle_stream(StreamEvent::Chunk("You are in ".into()));
        app.handle_stream(StreamEvent::Chunk("a maze.".into()));
        app.handle_stream(StreamEvent::Done);

        assert!(!app.session.is_loading());
        let last = app.session.transcript().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "You are in a maze.");
    }

    #[tokio::test]
    async fn test_failure_raises_transient_notification() {
        let (mut app, _rx) = test_app();
        app.set_availability(available());
        app.start_game();
        app.abort_generation();

        app.handle_stream(StreamEvent::Failed("connection refused".into()));
        assert!(!app.session.is_loading());
        let notification = app.notification.clone().unwrap();
        assert!(notification.message.contains("connection refused"));

        for _ in 0..NOTIFICATION_TICKS {
            app.tick();
        }
        assert!(app.notification.is_none());
    }

    #[tokio::test]
    async fn test_submit_while_loading_keeps_input() {
        let (mut app, _rx) = test_app();
        app.set_availability(available());
        app.start_game();
        app.abort_generation();

        app.input = "go north".to_string();
        app.submit_input();

        assert_eq!(app.input, "go north");
        assert_eq!(app.session.transcript().len(), 1);
        assert!(app.notification.is_some());
    }

    #[test]
    fn test_transcript_line_count_wraps() {
        let (mut app, _rx) = test_app();
        app.chat_width = 10;
        assert_eq!(app.transcript_line_count(), 0);

        app.session.set_availability(available());
        app.session.start_game().unwrap();
        // "You:" + "Start the" / "game." + blank, then the pending narrator lines
        assert_eq!(app.transcript_line_count(), 4 + 2);

        // Three 6-letter words fit 20 characters but need three rows of 10
        app.session.apply_chunk("aaaaaa bbbbbb cccccc");
        assert_eq!(app.transcript_line_count(), 4 + 1 + 3 + 1);
    }
}
