use anyhow::Result;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::conversation::{Conversation, Message, Subject, SYSTEM_PROMPT};
use crate::openai::OpenAIClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    SubjectSelect,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Session state
    pub subject: Option<Subject>,
    pub conversation: Conversation,

    // Chat input
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Outstanding request (at most one per session)
    pub pending: Option<JoinHandle<Result<String>>>,
    pub loading: bool,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Chat viewport
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Subject selection
    pub subject_state: ListState,

    // Model picker state
    pub show_model_picker: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // External collaborator
    pub client: OpenAIClient,
    pub model: String,
    pub max_turns: usize,
}

impl App {
    pub fn new(client: OpenAIClient, model: String, max_turns: usize) -> Self {
        let mut subject_state = ListState::default();
        subject_state.select(Some(0));

        Self {
            should_quit: false,
            screen: Screen::SubjectSelect,
            input_mode: InputMode::Normal,

            subject: None,
            conversation: Conversation::new(SYSTEM_PROMPT),

            input: String::new(),
            cursor: 0,

            pending: None,
            loading: false,
            animation_frame: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            subject_state,

            show_model_picker: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            client,
            model,
            max_turns,
        }
    }

    // Subject selection
    pub fn subject_nav_down(&mut self) {
        let len = Subject::all().len();
        let i = self.subject_state.selected().unwrap_or(0);
        self.subject_state.select(Some((i + 1).min(len - 1)));
    }

    pub fn subject_nav_up(&mut self) {
        let i = self.subject_state.selected().unwrap_or(0);
        self.subject_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_subject(&self) -> Option<Subject> {
        self.subject_state
            .selected()
            .and_then(|i| Subject::all().get(i).copied())
    }

    /// Enter the chat with the chosen subject; the conversation is reseeded to
    /// the system instruction plus the subject greeting.
    pub fn choose_subject(&mut self, subject: Subject) {
        info!(subject = subject.as_str(), "subject selected");
        self.subject = Some(subject);
        self.conversation.reset(Some(subject));
        self.chat_scroll = 0;
        self.screen = Screen::Chat;
        self.input_mode = InputMode::Editing;
    }

    /// Back to the subject screen; the conversation drops to the system
    /// instruction only.
    pub fn change_subject(&mut self) {
        self.subject = None;
        self.conversation.reset(None);
        self.chat_scroll = 0;
        self.input.clear();
        self.cursor = 0;
        self.screen = Screen::SubjectSelect;
        self.input_mode = InputMode::Normal;
    }

    /// Fresh conversation under the current subject.
    pub fn new_chat(&mut self) {
        self.conversation.reset(self.subject);
        self.chat_scroll = 0;
    }

    /// Whether a new turn may be submitted right now.
    pub fn can_submit(&self) -> bool {
        !self.loading && self.pending.is_none()
    }

    /// Entry into the awaiting-response state: append the user message, trim
    /// the history to the window, and hand back the request snapshot. The
    /// caller dispatches the snapshot and parks the handle in `pending`.
    pub fn queue_user_message(&mut self, message: Message) -> Vec<Message> {
        self.conversation.push(message);
        self.conversation.trim_to_window(self.max_turns);
        self.loading = true;
        self.scroll_to_bottom();
        info!(model = %self.model, len = self.conversation.len(), "dispatching turn");
        self.conversation.messages().to_vec()
    }

    /// Exit from the awaiting-response state: exactly one assistant message is
    /// appended — the reply, or the inline error line — and the session is
    /// ready for the next turn.
    pub fn finish_turn(&mut self, result: Result<String>) {
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                error!("chat request failed: {e}");
                format!("Oops! Something went wrong: {}", e)
            }
        };
        self.conversation.push(Message::assistant(&text));
        self.loading = false;
        self.pending = None;
        self.scroll_to_bottom();
    }

    /// Inline notice rendered as an assistant message (no request involved).
    pub fn push_notice(&mut self, text: &str) {
        self.conversation.push(Message::assistant(text));
        self.scroll_to_bottom();
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling
    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.transcript_lines().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll += 1;
        }
    }

    /// Scroll so the newest message (and the thinking line) is visible.
    pub fn scroll_to_bottom(&mut self) {
        let visible = if self.chat_height > 0 { self.chat_height } else { 20 };
        let total = self.transcript_lines();
        self.chat_scroll = total.saturating_sub(visible);
    }

    /// Rendered line count of the transcript, accounting for wrapping.
    fn transcript_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for msg in self.conversation.transcript() {
            total += 1; // Role line ("You:" or "Tutor:")
            for line in msg.display_text().lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let chars = line.chars().count();
                total += ((chars / wrap_width) + 1) as u16;
            }
            if msg.has_image() {
                total += 1; // Attachment marker line
            }
            total += 1; // Blank line after message
        }

        if self.loading {
            total += 2; // "Tutor:" + "Thinking..."
        }

        total
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        self.available_models = OpenAIClient::list_models();
        let current = self
            .available_models
            .iter()
            .position(|m| m == &self.model)
            .unwrap_or(0);
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
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                self.model = model.clone();
                self.show_model_picker = false;
                // Save to config
                let _ = Config::save_default_model(&self.model);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, DEFAULT_MAX_TURNS};
    use anyhow::anyhow;

    fn test_app() -> App {
        App::new(
            OpenAIClient::new("sk-test"),
            "gpt-4o-mini".to_string(),
            DEFAULT_MAX_TURNS,
        )
    }

    #[test]
    fn choosing_a_subject_seeds_the_greeting() {
        let mut app = test_app();
        app.choose_subject(Subject::Math);
        assert_eq!(app.screen, Screen::Chat);
        let messages = app.conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].display_text(), Subject::Math.greeting());
    }

    #[test]
    fn changing_subject_resets_to_system_only() {
        let mut app = test_app();
        app.choose_subject(Subject::Science);
        app.queue_user_message(Message::user_text("why is the sky blue"));
        app.finish_turn(Ok("What do you think happens to sunlight?".to_string()));

        app.change_subject();
        assert_eq!(app.screen, Screen::SubjectSelect);
        assert!(app.subject.is_none());
        assert_eq!(app.conversation.len(), 1);
        assert_eq!(app.conversation.messages()[0].role, Role::System);
    }

    #[test]
    fn new_chat_reseeds_current_subject() {
        let mut app = test_app();
        app.choose_subject(Subject::Math);
        app.queue_user_message(Message::user_text("help with fractions"));
        app.finish_turn(Ok("Sure — what do you already know?".to_string()));

        app.new_chat();
        assert_eq!(app.conversation.len(), 2);
        assert_eq!(
            app.conversation.messages()[1].display_text(),
            Subject::Math.greeting()
        );
    }

    #[test]
    fn queue_appends_trims_and_blocks_further_input() {
        let mut app = test_app();
        app.max_turns = 4;
        app.choose_subject(Subject::Math);
        for i in 0..6 {
            app.conversation.push(Message::user_text(&format!("msg {}", i)));
        }

        assert!(app.can_submit());
        let snapshot = app.queue_user_message(Message::user_text("latest"));

        assert!(app.loading);
        assert!(!app.can_submit());
        // System message plus the last 4 non-system messages.
        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot[0].role, Role::System);
        assert_eq!(snapshot[4].display_text(), "latest");
    }

    #[test]
    fn successful_turn_appends_one_assistant_message() {
        let mut app = test_app();
        app.choose_subject(Subject::Math);
        app.queue_user_message(Message::user_text("what is 2+2"));
        let before = app.conversation.len();

        app.finish_turn(Ok("What do you get if you count up from 2?".to_string()));

        assert_eq!(app.conversation.len(), before + 1);
        let last = app.conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.display_text(), "What do you get if you count up from 2?");
        assert!(app.can_submit());
    }

    #[test]
    fn failed_turn_appends_error_line_and_session_stays_usable() {
        let mut app = test_app();
        app.choose_subject(Subject::Science);
        app.queue_user_message(Message::user_text("hello"));
        let before = app.conversation.len();

        app.finish_turn(Err(anyhow!("connection refused")));

        assert_eq!(app.conversation.len(), before + 1);
        let last = app.conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(
            last.display_text(),
            "Oops! Something went wrong: connection refused"
        );

        // Next turn goes through normally.
        assert!(app.can_submit());
        app.queue_user_message(Message::user_text("still there?"));
        app.finish_turn(Ok("Yes! Where were we?".to_string()));
        let last = app.conversation.messages().last().unwrap();
        assert_eq!(last.display_text(), "Yes! Where were we?");
    }

    #[test]
    fn math_scenario_grows_conversation_by_two() {
        let mut app = test_app();
        app.choose_subject(Subject::Math);
        assert_eq!(app.conversation.len(), 2);

        app.queue_user_message(Message::user_text("what is 2+2"));
        app.finish_turn(Ok("Try counting 2 steps past 2 — what do you land on?".to_string()));

        assert_eq!(app.conversation.len(), 4);
    }
}
