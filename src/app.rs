use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{Config, KeyStore};
use crate::conversation::Conversation;
use crate::gemini::GeminiClient;
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation core and its collaborators
    pub conversation: Conversation,
    pub gemini: GeminiClient,
    pub keys: KeyStore,

    // Message input line (char-indexed cursor for UTF-8 editing)
    pub input: String,
    pub cursor: usize,

    // Scroll state; autoscroll keeps the transcript pinned to the newest
    // message until the user scrolls away
    pub chat_scroll: u16,
    pub chat_autoscroll: bool,
    pub result_scroll: u16,

    // Settings popup (API key entry)
    pub show_settings: bool,
    pub settings_input: String,
    pub settings_cursor: usize,

    // Animation state
    pub animation_frame: u8,
    pub copied_ticks: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub result_area: Option<Rect>,

    pub events_tx: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: &Config, events_tx: UnboundedSender<AppEvent>) -> Self {
        let keys = KeyStore::new();
        let gemini = GeminiClient::new(
            keys.clone(),
            config.model.clone(),
            config.api_base.clone(),
        );

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            conversation: Conversation::new(),
            gemini,
            keys,

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_autoscroll: true,
            result_scroll: 0,

            show_settings: false,
            settings_input: String::new(),
            settings_cursor: 0,

            animation_frame: 0,
            copied_ticks: 0,

            chat_area: None,
            result_area: None,

            events_tx,
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick(&mut self) {
        if self.conversation.busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.copied_ticks = self.copied_ticks.saturating_sub(1);
    }

    /// Re-pin the transcript to its newest message.
    pub fn follow_transcript(&mut self) {
        self.chat_autoscroll = true;
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_autoscroll = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        self.chat_autoscroll = false;
        // clamped against the rendered height on the next draw
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
    }

    pub fn scroll_result_up(&mut self, lines: u16) {
        self.result_scroll = self.result_scroll.saturating_sub(lines);
    }

    pub fn scroll_result_down(&mut self, lines: u16) {
        self.result_scroll = self.result_scroll.saturating_add(lines);
    }

    pub fn open_settings(&mut self) {
        self.settings_input = self.keys.get().unwrap_or_default();
        self.settings_cursor = self.settings_input.chars().count();
        self.show_settings = true;
    }

    pub fn close_settings(&mut self) {
        self.show_settings = false;
        self.settings_input.clear();
        self.settings_cursor = 0;
    }

    pub fn mark_copied(&mut self) {
        // roughly two seconds at the 300ms tick rate
        self.copied_ticks = 7;
    }
}
